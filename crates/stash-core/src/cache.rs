//! Cache entry types and persisted records.

use crate::ids::{CacheHash, CacheId, Namespace};
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Storage-layout policy, fixed when an entry is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StoreStrategy {
    /// One fixed path per id; re-storing the id overwrites it.
    #[default]
    Direct,
    /// Time-bucketed paths; every store keeps its own copy.
    Temporal,
    /// Temporal layout plus a pointer to the newest copy.
    TemporalLatest,
    /// Numbered versions plus a pointer to the current one.
    TemporalVersioned,
    /// Caller-chosen `<cache_key>/<file_id>` path; re-storing it overwrites.
    KeyBased,
}

impl StoreStrategy {
    pub const ALL: [StoreStrategy; 5] = [
        StoreStrategy::Direct,
        StoreStrategy::Temporal,
        StoreStrategy::TemporalLatest,
        StoreStrategy::TemporalVersioned,
        StoreStrategy::KeyBased,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreStrategy::Direct => "direct",
            StoreStrategy::Temporal => "temporal",
            StoreStrategy::TemporalLatest => "temporal_latest",
            StoreStrategy::TemporalVersioned => "temporal_versioned",
            StoreStrategy::KeyBased => "key_based",
        }
    }

    /// Directory token under `<namespace>/data/`.
    pub fn path_token(&self) -> &'static str {
        match self {
            StoreStrategy::Direct => "direct",
            StoreStrategy::Temporal => "temporal",
            StoreStrategy::TemporalLatest => "temporal-latest",
            StoreStrategy::TemporalVersioned => "temporal-versioned",
            StoreStrategy::KeyBased => "key-based",
        }
    }

    /// Whether a pointer file tracks the newest data path.
    pub fn has_latest_pointer(&self) -> bool {
        matches!(
            self,
            StoreStrategy::TemporalLatest | StoreStrategy::TemporalVersioned
        )
    }

    pub fn is_temporal(&self) -> bool {
        !matches!(self, StoreStrategy::Direct | StoreStrategy::KeyBased)
    }
}

impl fmt::Display for StoreStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StoreStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "direct" => Ok(StoreStrategy::Direct),
            "temporal" => Ok(StoreStrategy::Temporal),
            "temporal_latest" => Ok(StoreStrategy::TemporalLatest),
            "temporal_versioned" => Ok(StoreStrategy::TemporalVersioned),
            "key_based" => Ok(StoreStrategy::KeyBased),
            other => Err(Error::Other(format!("Unknown strategy: {other}"))),
        }
    }
}

/// How a payload is serialized and returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    String,
    Json,
    Binary,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Json => "json",
            DataType::Binary => "binary",
        }
    }

    /// File extension used for child data files.
    pub fn extension(&self) -> &'static str {
        match self {
            DataType::String => "txt",
            DataType::Json => "json",
            DataType::Binary => "bin",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "txt" => Some(DataType::String),
            "json" => Some(DataType::Json),
            "bin" => Some(DataType::Binary),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            DataType::String => "text/plain; charset=utf-8",
            DataType::Json => "application/json",
            DataType::Binary => "application/octet-stream",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" | "text" => Ok(DataType::String),
            "json" => Ok(DataType::Json),
            "binary" | "bytes" => Ok(DataType::Binary),
            other => Err(Error::Other(format!("Unknown data type: {other}"))),
        }
    }
}

/// Encoding applied to binary content before it reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    Gzip,
    Zstd,
    Lz4,
}

impl std::str::FromStr for ContentEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gzip" => Ok(ContentEncoding::Gzip),
            "zstd" => Ok(ContentEncoding::Zstd),
            "lz4" => Ok(ContentEncoding::Lz4),
            other => Err(Error::Other(format!("Unknown content encoding: {other}"))),
        }
    }
}

/// A value handed to or returned from the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(serde_json::Value),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn data_type(&self) -> DataType {
        match self {
            Payload::Text(_) => DataType::String,
            Payload::Json(_) => DataType::Json,
            Payload::Binary(_) => DataType::Binary,
        }
    }

    /// Interpret raw bytes as the given data type.
    pub fn from_bytes(bytes: Vec<u8>, data_type: DataType) -> Result<Self> {
        match data_type {
            DataType::Binary => Ok(Payload::Binary(bytes)),
            DataType::String => String::from_utf8(bytes)
                .map(Payload::Text)
                .map_err(|e| Error::InvalidPayload(format!("string payload is not UTF-8: {e}"))),
            DataType::Json => serde_json::from_slice(&bytes)
                .map(Payload::Json)
                .map_err(|e| Error::InvalidPayload(format!("json payload does not parse: {e}"))),
        }
    }

    /// Bytes written to the data path.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Payload::Text(s) => Ok(s.as_bytes().to_vec()),
            Payload::Json(v) => Ok(serde_json::to_vec(v)?),
            Payload::Binary(b) => Ok(b.clone()),
        }
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Binary(value)
    }
}

/// Sidecar written next to every data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntryMetadata {
    pub cache_id: CacheId,
    pub cache_hash: CacheHash,
    pub namespace: Namespace,
    pub strategy: StoreStrategy,
    #[serde(default)]
    pub data_type: DataType,
    /// Size of the stored bytes (after any content encoding).
    pub content_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<ContentEncoding>,
    pub stored_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Recorded for callers; expiry is not enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_hours: Option<u32>,
    /// JSON field the hash was computed from, when not the whole payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_field_path: Option<String>,
}

impl EntryMetadata {
    /// When the entry would expire if ttl were enforced.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.ttl_hours
            .map(|hours| self.stored_at + Duration::hours(i64::from(hours)))
    }
}

/// One id recorded under a hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HashRefEntry {
    pub cache_id: CacheId,
    pub stored_at: DateTime<Utc>,
}

/// By-hash reference: every id in a namespace whose content has this hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HashRefs {
    pub cache_hash: CacheHash,
    #[serde(default)]
    pub cache_ids: Vec<HashRefEntry>,
    #[serde(default)]
    pub latest_id: Option<CacheId>,
    #[serde(default)]
    pub total_versions: u32,
}

impl HashRefs {
    pub fn new(cache_hash: CacheHash) -> Self {
        Self {
            cache_hash,
            cache_ids: vec![],
            latest_id: None,
            total_versions: 0,
        }
    }

    /// Record `cache_id` under this hash, replacing any earlier record of it.
    pub fn link(&mut self, cache_id: CacheId, stored_at: DateTime<Utc>) {
        self.cache_ids.retain(|e| e.cache_id != cache_id);
        self.cache_ids.push(HashRefEntry {
            cache_id,
            stored_at,
        });
        self.refresh();
    }

    /// Drop `cache_id`. Returns whether it was present.
    pub fn unlink(&mut self, cache_id: &CacheId) -> bool {
        let before = self.cache_ids.len();
        self.cache_ids.retain(|e| &e.cache_id != cache_id);
        let removed = self.cache_ids.len() != before;
        if removed {
            self.refresh();
        }
        removed
    }

    /// Ids ordered by `stored_at`, newest first.
    pub fn newest_first(&self) -> Vec<&HashRefEntry> {
        let mut entries: Vec<&HashRefEntry> = self.cache_ids.iter().collect();
        entries.sort_by(|a, b| b.stored_at.cmp(&a.stored_at));
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.cache_ids.is_empty()
    }

    fn refresh(&mut self) {
        self.latest_id = self.newest_first().first().map(|e| e.cache_id);
        self.total_versions = self.cache_ids.len() as u32;
    }
}

/// One data path an id has been written to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HistoryRecord {
    pub data_path: String,
    pub cache_hash: CacheHash,
    pub stored_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

/// By-id reference: where an id's current content lives, plus everything
/// it has ever written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IdRef {
    pub cache_id: CacheId,
    pub cache_hash: CacheHash,
    pub namespace: Namespace,
    pub strategy: StoreStrategy,
    #[serde(default)]
    pub data_type: DataType,
    pub data_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<u32>,
    #[serde(default)]
    pub history: Vec<HistoryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<ContentEncoding>,
    pub stored_at: DateTime<Utc>,
}

impl IdRef {
    /// Every distinct hash this id has been stored under.
    pub fn hashes(&self) -> BTreeSet<&CacheHash> {
        std::iter::once(&self.cache_hash)
            .chain(self.history.iter().map(|h| &h.cache_hash))
            .collect()
    }

    /// Every distinct data path, current one included.
    pub fn data_paths(&self) -> BTreeSet<&str> {
        std::iter::once(self.data_path.as_str())
            .chain(self.history.iter().map(|h| h.data_path.as_str()))
            .collect()
    }

    /// History record of a stored version.
    pub fn version(&self, version: u32) -> Option<&HistoryRecord> {
        self.history.iter().find(|h| h.version == Some(version))
    }

    pub fn versions(&self) -> Vec<u32> {
        let mut versions: Vec<u32> = self.history.iter().filter_map(|h| h.version).collect();
        versions.sort_unstable();
        versions.dedup();
        versions
    }
}

/// Pointer file for strategies that track their newest copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LatestPointer {
    pub cache_id: CacheId,
    pub data_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub stored_at: DateTime<Utc>,
}
