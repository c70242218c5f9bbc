//! Stash CLI entrypoint.

use clap::Parser;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod handlers;
mod input;


use commands::{Commands, ConfigCommands, DataCommands, ZipCommands};
use config::{CliConfig, OutputFormat};
use handlers::Context;
use stash_cache::{CacheConfig, StorageMode};
use stash_core::Namespace;

#[derive(Parser)]
#[command(name = "stash")]
#[command(author, version, about = "Content-addressable cache store", long_about = None)]
struct Cli {
    /// Engine configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Namespace to operate in
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// Output format
    #[arg(short, long, global = true, value_enum)]
    output: Option<OutputFormat>,

    #[command(subcommand)]
    command: Commands,
}

/// Engine configuration for a CLI run.
fn engine_config(cli: &Cli, cli_config: &CliConfig) -> Result<CacheConfig, Box<dyn std::error::Error>> {
    let path = cli.config.clone().or_else(|| cli_config.engine_config.clone());
    let mut config = CacheConfig::load(path.as_deref())?;
    // Memory storage does not outlive one invocation.
    if config.storage.mode.is_none() && config.storage.resolved_mode() == StorageMode::Memory {
        config.storage.mode = Some(StorageMode::LocalDisk);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cli_config = CliConfig::load().unwrap_or_default();

    // Commands that never touch the store.
    match &cli.command {
        Commands::Config {
            command: ConfigCommands::Set { key, value },
        } => return handlers::set_config(key, value),
        Commands::Schema { record } => return handlers::schema(*record),
        _ => {}
    }

    let engine = engine_config(&cli, &cli_config)?;
    let namespace = match cli.namespace.clone().or_else(|| cli_config.namespace.clone()) {
        Some(ns) => Namespace::new(ns)?,
        None => engine.default_namespace(),
    };
    let format = cli.output.unwrap_or(cli_config.output_format);
    let ctx = Context::new(engine, namespace, format)?;
    debug!(
        provider = ctx.service.provider().name(),
        namespace = %ctx.namespace,
        "CLI context ready"
    );

    match cli.command {
        Commands::Store {
            input,
            strategy,
            id,
            hash,
            encoding,
            json_field,
            placement,
        } => {
            handlers::store(&ctx, &input, strategy, id, hash, encoding, json_field, placement).await?
        }
        Commands::Lookup {
            cache_key,
            file_id,
            as_type,
            full,
        } => handlers::lookup(&ctx, &cache_key, &file_id, as_type, full).await?,
        Commands::Get {
            key,
            as_type,
            out,
            full,
        } => handlers::get(&ctx, &key, as_type, out, full).await?,
        Commands::Delete { id, yes } => handlers::delete(&ctx, &id, yes).await?,
        Commands::Exists { key } => handlers::exists(&ctx, &key).await?,
        Commands::Update { id, input } => handlers::update(&ctx, &id, &input).await?,
        Commands::Version { id, number } => handlers::version(&ctx, &id, number).await?,
        Commands::Data { command } => match command {
            DataCommands::Put {
                id,
                file_id,
                key,
                input,
            } => handlers::data_put(&ctx, &id, file_id, key, &input).await?,
            DataCommands::Get { id, file_id, key } => {
                handlers::data_get(&ctx, &id, &file_id, key).await?
            }
            DataCommands::List { id, key } => handlers::data_list(&ctx, &id, key).await?,
            DataCommands::Delete {
                id,
                file_id,
                key,
                yes,
            } => handlers::data_delete(&ctx, &id, file_id, key, yes).await?,
        },
        Commands::Zip { command } => match command {
            ZipCommands::Store {
                file,
                strategy,
                placement,
            } => handlers::zip_store(&ctx, &file, strategy, placement).await?,
            ZipCommands::List { id } => handlers::zip_list(&ctx, &id).await?,
        },
        Commands::Namespaces => handlers::namespaces(&ctx).await?,
        Commands::Ids => handlers::ids(&ctx).await?,
        Commands::Hashes => handlers::hashes(&ctx).await?,
        Commands::Stats => handlers::stats(&ctx).await?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&ctx, &cli_config)?,
            ConfigCommands::Set { key, value } => handlers::set_config(&key, &value)?,
        },
        Commands::Schema { record } => handlers::schema(record)?,
    }

    Ok(())
}
