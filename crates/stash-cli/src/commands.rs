//! CLI command definitions.

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Store a value
    Store {
        #[command(flatten)]
        input: PayloadArgs,

        /// Storage strategy
        #[arg(short, long, value_enum, default_value_t = StrategyArg::Direct)]
        strategy: StrategyArg,

        /// Reuse an existing cache ID
        #[arg(long)]
        id: Option<String>,

        /// Use this hash instead of hashing the content
        #[arg(long)]
        hash: Option<String>,

        /// Encoding already applied to binary input
        #[arg(long, value_enum)]
        encoding: Option<EncodingArg>,

        /// Hash only this dot-separated JSON field
        #[arg(long)]
        json_field: Option<String>,

        #[command(flatten)]
        placement: KeyArgs,
    },

    /// Retrieve the entry stored at a cache key
    Lookup {
        /// Cache key folder, e.g. reports/2025/q1
        cache_key: String,

        /// Final path segment under the key
        file_id: String,

        /// Coerce the value to this type
        #[arg(long = "as", value_enum)]
        as_type: Option<TypeArg>,

        /// Show the full entry instead of only the value
        #[arg(long)]
        full: bool,
    },

    /// Retrieve a value by cache ID or hash
    Get {
        /// Cache ID or cache hash
        key: String,

        /// Coerce the value to this type
        #[arg(long = "as", value_enum)]
        as_type: Option<TypeArg>,

        /// Write the decoded bytes to a file instead of printing
        #[arg(long)]
        out: Option<PathBuf>,

        /// Show the full entry instead of only the value
        #[arg(long)]
        full: bool,
    },

    /// Delete an entry and everything stored for it
    Delete {
        /// Cache ID
        id: String,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Check whether a cache ID or hash exists
    Exists {
        /// Cache ID or cache hash
        key: String,
    },

    /// Replace the current value of an entry in place
    Update {
        /// Cache ID
        id: String,

        #[command(flatten)]
        input: PayloadArgs,
    },

    /// Retrieve one version of a versioned entry
    Version {
        /// Cache ID
        id: String,

        /// Version number
        #[arg(value_name = "VERSION")]
        number: u32,
    },

    /// Manage data files attached to an entry
    Data {
        #[command(subcommand)]
        command: DataCommands,
    },

    /// Store and inspect zip archives
    Zip {
        #[command(subcommand)]
        command: ZipCommands,
    },

    /// List namespaces
    Namespaces,

    /// List cache IDs in the namespace
    Ids,

    /// List cache hashes in the namespace
    Hashes,

    /// Show file counts for the namespace
    Stats,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Print the JSON schema of a stored record
    Schema {
        #[arg(value_enum)]
        record: SchemaRecord,
    },
}

/// Where a value comes from: an argument, a file, or stdin.
#[derive(Args, Debug, Clone)]
pub struct PayloadArgs {
    /// Value to store (reads stdin when neither this nor --file is given)
    pub value: Option<String>,

    /// Read the value from a file
    #[arg(short, long, conflicts_with = "value")]
    pub file: Option<PathBuf>,

    /// Data type of the value
    #[arg(short = 't', long = "type", value_enum, default_value_t = TypeArg::String)]
    pub data_type: TypeArg,
}

/// Caller-chosen location for a `key-based` store.
#[derive(Args, Debug, Clone, Default)]
pub struct KeyArgs {
    /// Store under this cache key folder (implies --strategy key-based)
    #[arg(long)]
    pub key: Option<String>,

    /// Final path segment under --key (defaults to the cache ID)
    #[arg(long, requires = "key")]
    pub file_id: Option<String>,
}

#[derive(Subcommand)]
pub enum ZipCommands {
    /// Store a zip archive
    Store {
        /// Archive to read
        file: PathBuf,

        /// Storage strategy
        #[arg(short, long, value_enum, default_value_t = StrategyArg::Direct)]
        strategy: StrategyArg,

        #[command(flatten)]
        placement: KeyArgs,
    },

    /// List the files in a stored archive
    List {
        /// Cache ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum DataCommands {
    /// Attach a data file
    Put {
        /// Parent cache ID
        id: String,

        /// File ID (generated when omitted)
        #[arg(long)]
        file_id: Option<String>,

        /// Data key folder, e.g. analysis/v1
        #[arg(short, long)]
        key: Option<String>,

        #[command(flatten)]
        input: PayloadArgs,
    },

    /// Print a data file
    Get {
        id: String,
        file_id: String,
        #[arg(short, long)]
        key: Option<String>,
    },

    /// List data files
    List {
        id: String,
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Delete one data file, or all of them
    Delete {
        id: String,

        /// File ID (all files under the key when omitted)
        file_id: Option<String>,

        #[arg(short, long)]
        key: Option<String>,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set a CLI configuration value
    Set {
        /// Key
        key: String,

        /// Value
        value: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Direct,
    Temporal,
    TemporalLatest,
    TemporalVersioned,
    KeyBased,
}

impl From<StrategyArg> for stash_core::StoreStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Direct => Self::Direct,
            StrategyArg::Temporal => Self::Temporal,
            StrategyArg::TemporalLatest => Self::TemporalLatest,
            StrategyArg::TemporalVersioned => Self::TemporalVersioned,
            StrategyArg::KeyBased => Self::KeyBased,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TypeArg {
    String,
    Json,
    Binary,
}

impl From<TypeArg> for stash_core::DataType {
    fn from(value: TypeArg) -> Self {
        match value {
            TypeArg::String => Self::String,
            TypeArg::Json => Self::Json,
            TypeArg::Binary => Self::Binary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EncodingArg {
    Gzip,
    Zstd,
    Lz4,
}

impl From<EncodingArg> for stash_core::ContentEncoding {
    fn from(value: EncodingArg) -> Self {
        match value {
            EncodingArg::Gzip => Self::Gzip,
            EncodingArg::Zstd => Self::Zstd,
            EncodingArg::Lz4 => Self::Lz4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemaRecord {
    Metadata,
    IdRef,
    HashRefs,
    LatestPointer,
}
