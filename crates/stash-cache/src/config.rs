//! Engine configuration.
//!
//! Values come from an optional YAML file and `STASH__`-prefixed environment
//! variables (`STASH__STORAGE__MODE=local_disk`, `STASH__HASH__LENGTH=20`).

use serde::{Deserialize, Serialize};
use stash_core::{Error, Namespace, Result};
use std::path::{Path, PathBuf};

/// Top-level configuration for a cache service instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Storage backend selection.
    pub storage: StorageConfig,
    /// Hash algorithm and truncation. Part of the persisted format.
    pub hash: HashConfig,
    /// Directory sharding of ids and hashes. Part of the persisted format.
    pub sharding: ShardConfig,
    /// Namespace used when a caller does not name one.
    pub default_namespace: String,
    /// Recorded in metadata; never enforced.
    pub ttl_hours: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            hash: HashConfig::default(),
            sharding: ShardConfig::default(),
            default_namespace: default_namespace(),
            ttl_hours: default_ttl_hours(),
        }
    }
}

fn default_namespace() -> String {
    stash_core::DEFAULT_NAMESPACE.to_string()
}

fn default_ttl_hours() -> u32 {
    24
}

impl CacheConfig {
    /// Load configuration from an optional file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("STASH")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file only.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self =
            serde_yaml::from_str(&contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.hash.validate()?;
        self.sharding.validate()?;
        Namespace::new(self.default_namespace.clone())
            .map_err(|e| Error::Config(format!("default_namespace: {e}")))?;
        Ok(())
    }

    pub fn default_namespace(&self) -> Namespace {
        Namespace::sanitize(&self.default_namespace)
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_hash(mut self, hash: HashConfig) -> Self {
        self.hash = hash;
        self
    }

    pub fn with_sharding(mut self, sharding: ShardConfig) -> Self {
        self.sharding = sharding;
        self
    }
}

/// Storage backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    Memory,
    LocalDisk,
    Sqlite,
    Archive,
    S3,
}

impl std::str::FromStr for StorageMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageMode::Memory),
            "local_disk" | "disk" => Ok(StorageMode::LocalDisk),
            "sqlite" => Ok(StorageMode::Sqlite),
            "archive" | "tar" => Ok(StorageMode::Archive),
            "s3" => Ok(StorageMode::S3),
            other => Err(Error::Config(format!("Unknown storage mode: {other}"))),
        }
    }
}

/// Storage backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Explicit backend. Auto-detected when unset.
    pub mode: Option<StorageMode>,
    /// Root directory for `local_disk`.
    pub local_disk_path: PathBuf,
    /// Database file for `sqlite` (`:memory:` for a private in-memory db).
    pub sqlite_path: String,
    /// Archive file for `archive` (`.tar` or `.tar.zst`).
    pub archive_path: PathBuf,
    /// Bucket for `s3`.
    pub bucket_name: Option<String>,
    /// Key prefix inside the bucket.
    pub prefix: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mode: None,
            local_disk_path: PathBuf::from("/tmp/stash"),
            sqlite_path: ":memory:".to_string(),
            archive_path: PathBuf::from("/tmp/stash.tar"),
            bucket_name: None,
            prefix: None,
        }
    }
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            mode: Some(StorageMode::Memory),
            ..Self::default()
        }
    }

    pub fn local_disk(path: impl Into<PathBuf>) -> Self {
        Self {
            mode: Some(StorageMode::LocalDisk),
            local_disk_path: path.into(),
            ..Self::default()
        }
    }

    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            mode: Some(StorageMode::Sqlite),
            sqlite_path: path.into(),
            ..Self::default()
        }
    }

    pub fn archive(path: impl Into<PathBuf>) -> Self {
        Self {
            mode: Some(StorageMode::Archive),
            archive_path: path.into(),
            ..Self::default()
        }
    }

    /// The backend to use, falling back to detection from the process environment.
    pub fn resolved_mode(&self) -> StorageMode {
        self.resolve_mode_with(|key| std::env::var(key).ok())
    }

    /// Pick `s3` when AWS credentials and a bucket are available, else `memory`.
    pub fn resolve_mode_with(&self, env: impl Fn(&str) -> Option<String>) -> StorageMode {
        if let Some(mode) = self.mode {
            return mode;
        }
        let present = |key: &str| env(key).is_some_and(|v| !v.is_empty());
        let has_bucket = self.bucket_name.as_deref().is_some_and(|b| !b.is_empty());
        if present("AWS_ACCESS_KEY_ID") && present("AWS_SECRET_ACCESS_KEY") && has_bucket {
            StorageMode::S3
        } else {
            StorageMode::Memory
        }
    }
}

/// Digest used for content hashes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Length of the full digest in hex characters.
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha384 => 96,
            HashAlgorithm::Sha512 => 128,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HashConfig {
    pub algorithm: HashAlgorithm,
    /// Hex characters kept from the digest.
    pub length: usize,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::Sha256,
            length: 16,
        }
    }
}

impl HashConfig {
    pub fn validate(&self) -> Result<()> {
        let max = self.algorithm.hex_len();
        if self.length == 0 || self.length > max {
            return Err(Error::Config(format!(
                "hash.length must be between 1 and {max}, got {}",
                self.length
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShardConfig {
    /// Number of prefix directories.
    pub depth: usize,
    /// Characters per prefix directory.
    pub width: usize,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self { depth: 2, width: 2 }
    }
}

impl ShardConfig {
    pub fn new(depth: usize, width: usize) -> Self {
        Self { depth, width }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 {
            return Err(Error::Config("sharding.width must be at least 1".into()));
        }
        if self.depth > 8 {
            return Err(Error::Config(format!(
                "sharding.depth must be at most 8, got {}",
                self.depth
            )));
        }
        Ok(())
    }
}
