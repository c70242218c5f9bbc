//! Command handlers.

use crate::commands::{EncodingArg, KeyArgs, PayloadArgs, SchemaRecord, StrategyArg, TypeArg};
use crate::config::{CliConfig, OutputFormat};
use crate::input::{parse_id, read_payload};
use console::style;
use serde::Serialize;
use stash_cache::{
    CacheConfig, CacheService, CachedEntry, DeleteReport, StoreRequest, StoreResult, ZipStoreResult,
};
use stash_core::{
    CacheHash, CacheId, DataFileId, DataKey, DataType, EntryMetadata, HashRefs, IdRef,
    LatestPointer, Namespace, Payload,
};
use std::io::Write;
use std::path::{Path, PathBuf};

type HandlerResult = Result<(), Box<dyn std::error::Error>>;

/// Everything a command needs to talk to the store.
pub struct Context {
    pub service: CacheService,
    pub engine: CacheConfig,
    pub namespace: Namespace,
    pub format: OutputFormat,
}

impl Context {
    pub fn new(
        engine: CacheConfig,
        namespace: Namespace,
        format: OutputFormat,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            service: CacheService::from_config(&engine)?,
            engine,
            namespace,
            format,
        })
    }
}

/// Print a value as JSON or YAML, or fall back to the table renderer.
fn render<T: Serialize>(format: OutputFormat, value: &T, table: impl FnOnce(&T)) -> HandlerResult {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
        OutputFormat::Table => table(value),
    }
    Ok(())
}

fn not_found(what: &str) {
    println!("{} {} not found", style("!").yellow(), what);
}

fn confirm(prompt: String) -> Result<bool, Box<dyn std::error::Error>> {
    use dialoguer::Confirm;

    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

fn print_store_result(result: &StoreResult) {
    println!("{} Stored {}", style("✓").green(), style(result.cache_id).bold());
    println!("  hash: {}", result.cache_hash);
    println!("  namespace: {}", result.namespace);
    println!("  strategy: {}", result.strategy);
    println!("  type: {}", result.data_type);
    println!("  size: {} bytes", result.size);
    if let Some(version) = result.version {
        println!("  version: {}", version);
    }
    for path in result.paths.all() {
        println!("    {}", style(path).dim());
    }
}

fn print_delete_report(report: &DeleteReport, what: &str) {
    if !report.is_success() {
        not_found(what);
        return;
    }
    println!(
        "{} Deleted {} paths for {}",
        style("✓").green(),
        report.deleted_count,
        style(what).bold()
    );
    for path in &report.failed_paths {
        println!("  {} {}", style("✗").red(), path);
    }
}

/// Print a payload on stdout. Binary goes out raw.
fn print_payload(payload: &Payload) -> HandlerResult {
    match payload {
        Payload::Text(s) => println!("{}", s),
        Payload::Json(v) => println!("{}", serde_json::to_string_pretty(v)?),
        Payload::Binary(b) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(b)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn print_entry(ctx: &Context, entry: &CachedEntry, as_type: Option<TypeArg>, full: bool) -> HandlerResult {
    if let Some(as_type) = as_type {
        return print_payload(&entry.coerce(DataType::from(as_type)));
    }
    if full || ctx.format != OutputFormat::Table {
        let response = entry.to_response();
        return render(
            if ctx.format == OutputFormat::Table { OutputFormat::Json } else { ctx.format },
            &response,
            |_| {},
        );
    }
    match &entry.content {
        Payload::Binary(_) => {
            println!(
                "{} Binary entry ({} bytes). Use --out <file> or --as string",
                style("i").blue(),
                entry.size()
            );
            Ok(())
        }
        content => print_payload(content),
    }
}

/// Move a request to `--key`/`--file-id` when given.
fn place(request: StoreRequest, placement: KeyArgs) -> StoreRequest {
    match placement.key {
        Some(key) => request.with_cache_key(key, placement.file_id.map(DataFileId::new)),
        None => request,
    }
}

/// Store a value.
#[allow(clippy::too_many_arguments)]
pub async fn store(
    ctx: &Context,
    input: &PayloadArgs,
    strategy: StrategyArg,
    id: Option<String>,
    hash: Option<String>,
    encoding: Option<EncodingArg>,
    json_field: Option<String>,
    placement: KeyArgs,
) -> HandlerResult {
    let request = StoreRequest::new(read_payload(input)?)
        .with_data_type(DataType::from(input.data_type))
        .with_namespace(ctx.namespace.clone())
        .with_strategy(strategy.into());
    let mut request = place(request, placement);
    if let Some(id) = id {
        request = request.with_cache_id(parse_id(&id)?);
    }
    if let Some(hash) = hash {
        request = request.with_cache_hash(CacheHash::new(hash));
    }
    if let Some(encoding) = encoding {
        request = request.with_content_encoding(encoding.into());
    }
    if let Some(field) = json_field {
        request = request.with_json_field_path(field);
    }

    let result = ctx.service.store(request).await?;
    render(ctx.format, &result, print_store_result)
}

/// Retrieve by cache ID, falling back to cache hash.
pub async fn get(
    ctx: &Context,
    key: &str,
    as_type: Option<TypeArg>,
    out: Option<PathBuf>,
    full: bool,
) -> HandlerResult {
    let by_id = match key.parse::<CacheId>() {
        Ok(id) => ctx.service.retrieve_by_id(&id, &ctx.namespace).await?,
        Err(_) => None,
    };
    let entry = match by_id {
        Some(entry) => Some(entry),
        None => {
            ctx.service
                .retrieve_by_hash(&CacheHash::new(key), &ctx.namespace)
                .await?
        }
    };
    let Some(entry) = entry else {
        not_found(key);
        return Ok(());
    };

    if let Some(path) = out {
        let bytes = entry.decoded_bytes()?;
        std::fs::write(&path, &bytes)?;
        println!(
            "{} Wrote {} bytes to {}",
            style("✓").green(),
            bytes.len(),
            path.display()
        );
        return Ok(());
    }
    print_entry(ctx, &entry, as_type, full)
}

/// Retrieve the entry stored at a cache key.
pub async fn lookup(
    ctx: &Context,
    cache_key: &str,
    file_id: &str,
    as_type: Option<TypeArg>,
    full: bool,
) -> HandlerResult {
    match ctx
        .service
        .retrieve_by_key(&DataKey::new(cache_key), &DataFileId::new(file_id), &ctx.namespace)
        .await?
    {
        Some(entry) => print_entry(ctx, &entry, as_type, full),
        None => {
            not_found(&format!("{}/{}", cache_key, file_id));
            Ok(())
        }
    }
}

/// Store a zip archive read from disk.
pub async fn zip_store(
    ctx: &Context,
    file: &Path,
    strategy: StrategyArg,
    placement: KeyArgs,
) -> HandlerResult {
    let bytes = std::fs::read(file)
        .map_err(|e| format!("Could not read {}: {}", file.display(), e))?;
    let request = StoreRequest::new(bytes)
        .with_namespace(ctx.namespace.clone())
        .with_strategy(strategy.into());
    let result = ctx.service.store_zip(place(request, placement)).await?;
    render(ctx.format, &result, |r: &ZipStoreResult| {
        print_store_result(&r.stored);
        println!("  files: {}", r.file_count);
    })
}

/// List the files of a stored zip archive.
pub async fn zip_list(ctx: &Context, id: &str) -> HandlerResult {
    let cache_id = parse_id(id)?;
    match ctx.service.list_zip_files(&cache_id, &ctx.namespace).await? {
        Some(files) => render(ctx.format, &files, |files| {
            for file in files {
                println!("{}", file);
            }
        }),
        None => {
            not_found(id);
            Ok(())
        }
    }
}

/// Delete an entry.
pub async fn delete(ctx: &Context, id: &str, yes: bool) -> HandlerResult {
    let cache_id = parse_id(id)?;
    if !yes && !confirm(format!("Delete {} from {}?", id, ctx.namespace))? {
        println!("{} Cancelled", style("!").yellow());
        return Ok(());
    }
    let report = ctx.service.delete_by_id(&cache_id, &ctx.namespace).await?;
    render(ctx.format, &report, |r| print_delete_report(r, id))
}

/// Check existence of an ID or hash.
pub async fn exists(ctx: &Context, key: &str) -> HandlerResult {
    let found = ctx.service.exists(key, &ctx.namespace).await?;
    render(
        ctx.format,
        &serde_json::json!({ "key": key, "exists": found }),
        |_| println!("{}", found),
    )
}

/// Replace an entry's current value.
pub async fn update(ctx: &Context, id: &str, input: &PayloadArgs) -> HandlerResult {
    let cache_id = parse_id(id)?;
    match ctx
        .service
        .update_by_id(&cache_id, &ctx.namespace, read_payload(input)?)
        .await?
    {
        Some(result) => render(ctx.format, &result, print_store_result),
        None => {
            not_found(id);
            Ok(())
        }
    }
}

/// Retrieve one version.
pub async fn version(ctx: &Context, id: &str, version: u32) -> HandlerResult {
    let cache_id = parse_id(id)?;
    match ctx
        .service
        .retrieve_version(&cache_id, &ctx.namespace, version)
        .await?
    {
        Some(entry) => print_entry(ctx, &entry, None, false),
        None => {
            not_found(&format!("{} v{}", id, version));
            Ok(())
        }
    }
}

/// Attach a data file.
pub async fn data_put(
    ctx: &Context,
    id: &str,
    file_id: Option<String>,
    key: Option<String>,
    input: &PayloadArgs,
) -> HandlerResult {
    let cache_id = parse_id(id)?;
    let key = key.map(DataKey::new);
    let stored = ctx
        .service
        .store_data_file(
            &cache_id,
            &ctx.namespace,
            key.as_ref(),
            file_id.map(DataFileId::new),
            read_payload(input)?,
        )
        .await?;
    match stored {
        Some(file) => render(ctx.format, &file, |f| {
            println!("{} Stored data file {}", style("✓").green(), style(&f.file_id).bold());
            println!("    {}", style(&f.path).dim());
        }),
        None => {
            not_found(id);
            Ok(())
        }
    }
}

/// Print a data file.
pub async fn data_get(ctx: &Context, id: &str, file_id: &str, key: Option<String>) -> HandlerResult {
    let cache_id = parse_id(id)?;
    let key = key.map(DataKey::new);
    match ctx
        .service
        .retrieve_data_file(&cache_id, &ctx.namespace, key.as_ref(), &DataFileId::new(file_id))
        .await?
    {
        Some(file) => print_payload(&file.content),
        None => {
            not_found(file_id);
            Ok(())
        }
    }
}

/// List data files.
pub async fn data_list(ctx: &Context, id: &str, key: Option<String>) -> HandlerResult {
    let cache_id = parse_id(id)?;
    let key = key.map(DataKey::new);
    let Some(files) = ctx
        .service
        .list_data_files(&cache_id, &ctx.namespace, key.as_ref())
        .await?
    else {
        not_found(id);
        return Ok(());
    };
    render(ctx.format, &files, |files| {
        if files.is_empty() {
            println!("{} No data files", style("i").blue());
        }
        for file in files {
            let key = file.data_key.as_ref().map(|k| k.as_str()).unwrap_or("-");
            println!(
                "  {:<36}  {:<6}  {}",
                file.file_id.as_str(),
                file.data_type.as_str(),
                key
            );
        }
    })
}

/// Delete one or all data files.
pub async fn data_delete(
    ctx: &Context,
    id: &str,
    file_id: Option<String>,
    key: Option<String>,
    yes: bool,
) -> HandlerResult {
    let cache_id = parse_id(id)?;
    let key = key.map(DataKey::new);
    match file_id {
        Some(file_id) => {
            let deleted = ctx
                .service
                .delete_data_file(&cache_id, &ctx.namespace, key.as_ref(), &DataFileId::new(&file_id))
                .await?;
            if deleted {
                println!("{} Deleted data file {}", style("✓").green(), file_id);
            } else {
                not_found(&file_id);
            }
            Ok(())
        }
        None => {
            if !yes && !confirm(format!("Delete all data files of {}?", id))? {
                println!("{} Cancelled", style("!").yellow());
                return Ok(());
            }
            let report = ctx
                .service
                .delete_data_files(&cache_id, &ctx.namespace, key.as_ref())
                .await?;
            render(ctx.format, &report, |r| print_delete_report(r, id))
        }
    }
}

/// List namespaces.
pub async fn namespaces(ctx: &Context) -> HandlerResult {
    let namespaces = ctx.service.list_namespaces().await?;
    render(ctx.format, &namespaces, |list| {
        if list.is_empty() {
            println!("{} No namespaces", style("i").blue());
        }
        for ns in list {
            println!("  {}", ns);
        }
    })
}

/// List cache IDs.
pub async fn ids(ctx: &Context) -> HandlerResult {
    let ids = ctx.service.file_ids(&ctx.namespace).await?;
    render(ctx.format, &ids, |list| {
        for id in list {
            println!("  {}", id);
        }
        println!("{} {} IDs in {}", style("i").blue(), list.len(), ctx.namespace);
    })
}

/// List cache hashes.
pub async fn hashes(ctx: &Context) -> HandlerResult {
    let hashes = ctx.service.file_hashes(&ctx.namespace).await?;
    render(ctx.format, &hashes, |list| {
        for hash in list {
            println!("  {}", hash);
        }
        println!("{} {} hashes in {}", style("i").blue(), list.len(), ctx.namespace);
    })
}

/// Show namespace statistics.
pub async fn stats(ctx: &Context) -> HandlerResult {
    let stats = ctx.service.stats(&ctx.namespace).await?;
    render(ctx.format, &stats, |s| {
        println!("Namespace {}", style(&s.namespace).bold());
        println!("  ttl_hours: {}", s.ttl_hours);
        println!("  refs/by-hash: {}", s.refs_by_hash);
        println!("  refs/by-id: {}", s.refs_by_id);
        println!("  data/direct: {}", s.data_direct);
        println!("  data/temporal: {}", s.data_temporal);
        println!("  data/temporal-latest: {}", s.data_temporal_latest);
        println!("  data/temporal-versioned: {}", s.data_temporal_versioned);
        println!("  data/key-based: {}", s.data_key_based);
        println!("  data/files: {}", s.data_files);
        println!("  total: {}", s.total_files);
    })
}

/// Show configuration.
pub fn show_config(ctx: &Context, cli: &CliConfig) -> HandlerResult {
    println!("Current configuration:");
    println!("  provider: {}", ctx.service.provider().name());
    println!("  namespace: {}", ctx.namespace);
    println!("  output_format: {:?}", ctx.format);
    println!("\nEngine:");
    for line in serde_yaml::to_string(&ctx.engine)?.lines() {
        println!("  {}", line);
    }
    println!(
        "\nengine_config: {}",
        cli.engine_config
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );

    if let Ok(path) = CliConfig::config_path() {
        println!("Config file: {}", path.display());
    }

    Ok(())
}

/// Set configuration.
pub fn set_config(key: &str, value: &str) -> HandlerResult {
    let mut config = CliConfig::load().unwrap_or_default();
    config.set(key, value)?;
    config.save()?;

    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(())
}

/// Print a record's JSON schema.
pub fn schema(record: SchemaRecord) -> HandlerResult {
    let schema = match record {
        SchemaRecord::Metadata => schemars::schema_for!(EntryMetadata),
        SchemaRecord::IdRef => schemars::schema_for!(IdRef),
        SchemaRecord::HashRefs => schemars::schema_for!(HashRefs),
        SchemaRecord::LatestPointer => schemars::schema_for!(LatestPointer),
    };
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
