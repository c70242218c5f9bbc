//! Path strategy resolution.
//!
//! Every location the engine touches is computed here from the namespace,
//! strategy, identifiers and store timestamp. Nothing in this module does I/O.

use crate::config::ShardConfig;
use chrono::{DateTime, Utc};
use stash_core::{
    CacheHash, CacheId, DataFileId, DataKey, DataType, Error, Namespace, Result, StoreStrategy,
};

pub const REFS_BY_HASH: &str = "refs/by-hash";
pub const REFS_BY_ID: &str = "refs/by-id";
pub const DATA: &str = "data";
pub const DATA_FILES: &str = "data/files";
pub const VERSIONS_DIR: &str = "versions";
pub const LATEST_DIR: &str = "latest";

pub const METADATA_SUFFIX: &str = ".metadata";
pub const HASH_REFS_SUFFIX: &str = ".refs.json";
pub const ID_REF_SUFFIX: &str = ".ref.json";
pub const LATEST_SUFFIX: &str = ".latest.json";

/// Every path a single store touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub data_path: String,
    pub metadata_path: String,
    pub by_hash_ref_path: String,
    pub by_id_ref_path: String,
    /// Pointer file for `temporal_latest` and `temporal_versioned`.
    pub latest_path: Option<String>,
    /// Version number baked into `data_path`.
    pub version: Option<u32>,
}

impl ResolvedPaths {
    pub fn all(&self) -> Vec<&str> {
        let mut paths = vec![
            self.data_path.as_str(),
            self.metadata_path.as_str(),
            self.by_hash_ref_path.as_str(),
            self.by_id_ref_path.as_str(),
        ];
        if let Some(latest) = &self.latest_path {
            paths.push(latest);
        }
        paths
    }
}

/// Maps identifiers to sharded, namespace-scoped paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver {
    sharding: ShardConfig,
}

impl PathResolver {
    pub fn new(sharding: ShardConfig) -> Self {
        Self { sharding }
    }

    pub fn sharding(&self) -> &ShardConfig {
        &self.sharding
    }

    /// Split an identifier into shard directories plus a final segment.
    ///
    /// `depth` groups of `width` characters are taken from the front and the
    /// remainder becomes the last segment. When nothing remains (identifier
    /// too short or exactly consumed) the whole identifier is the last segment.
    pub fn shard(&self, identifier: &str) -> Vec<String> {
        let width = self.sharding.width.max(1);
        let chars: Vec<char> = identifier.chars().collect();
        let depth = self.sharding.depth.min(chars.len() / width);

        let mut segments: Vec<String> = (0..depth)
            .map(|i| chars[i * width..(i + 1) * width].iter().collect())
            .collect();
        let remainder: String = chars[depth * width..].iter().collect();
        if remainder.is_empty() {
            segments.push(identifier.to_string());
        } else {
            segments.push(remainder);
        }
        segments
    }

    fn sharded(&self, identifier: &str) -> String {
        self.shard(identifier).join("/")
    }

    /// Resolve every path for one store.
    ///
    /// `timestamp` shapes temporal paths; `version` is required for
    /// `temporal_versioned` and ignored otherwise.
    pub fn resolve(
        &self,
        namespace: &Namespace,
        strategy: StoreStrategy,
        cache_id: &CacheId,
        cache_hash: &CacheHash,
        timestamp: DateTime<Utc>,
        version: Option<u32>,
    ) -> Result<ResolvedPaths> {
        let data_path = self.data_path(namespace, strategy, cache_id, timestamp, version)?;
        self.assemble(namespace, strategy, cache_id, cache_hash, data_path, version)
    }

    /// Resolve every path for a `key_based` store.
    pub fn resolve_keyed(
        &self,
        namespace: &Namespace,
        cache_id: &CacheId,
        cache_hash: &CacheHash,
        cache_key: Option<&DataKey>,
        file_id: Option<&DataFileId>,
    ) -> Result<ResolvedPaths> {
        let id = cache_id.to_string();
        let file_id = file_id.map(DataFileId::as_str).unwrap_or(&id);
        let data_path = self.key_based_path(namespace, cache_key, file_id)?;
        self.assemble(namespace, StoreStrategy::KeyBased, cache_id, cache_hash, data_path, None)
    }

    fn assemble(
        &self,
        namespace: &Namespace,
        strategy: StoreStrategy,
        cache_id: &CacheId,
        cache_hash: &CacheHash,
        data_path: String,
        version: Option<u32>,
    ) -> Result<ResolvedPaths> {
        Ok(ResolvedPaths {
            metadata_path: metadata_path(&data_path),
            data_path,
            by_hash_ref_path: self.by_hash_ref_path(namespace, cache_hash)?,
            by_id_ref_path: self.by_id_ref_path(namespace, cache_id),
            latest_path: self.latest_path(namespace, strategy, cache_id),
            version: match strategy {
                StoreStrategy::TemporalVersioned => version,
                _ => None,
            },
        })
    }

    pub fn by_hash_ref_path(&self, namespace: &Namespace, cache_hash: &CacheHash) -> Result<String> {
        validate_identifier("cache_hash", cache_hash.as_str())?;
        Ok(format!(
            "{}/{}/{}{}",
            namespace,
            REFS_BY_HASH,
            self.sharded(cache_hash.as_str()),
            HASH_REFS_SUFFIX
        ))
    }

    pub fn by_id_ref_path(&self, namespace: &Namespace, cache_id: &CacheId) -> String {
        format!(
            "{}/{}/{}{}",
            namespace,
            REFS_BY_ID,
            self.sharded(&cache_id.to_string()),
            ID_REF_SUFFIX
        )
    }

    pub fn data_path(
        &self,
        namespace: &Namespace,
        strategy: StoreStrategy,
        cache_id: &CacheId,
        timestamp: DateTime<Utc>,
        version: Option<u32>,
    ) -> Result<String> {
        let base = self.data_prefix(namespace, strategy);
        let id = cache_id.to_string();
        match strategy {
            StoreStrategy::Direct => Ok(format!("{base}{}", self.sharded(&id))),
            StoreStrategy::Temporal | StoreStrategy::TemporalLatest => Ok(format!(
                "{base}{}/{id}/{}-{:09}",
                timestamp.format("%Y/%m/%d/%H"),
                timestamp.format("%M%S"),
                timestamp.timestamp_subsec_nanos()
            )),
            StoreStrategy::TemporalVersioned => match version {
                Some(v) if v >= 1 => Ok(format!(
                    "{base}{VERSIONS_DIR}/{}/v{v}",
                    self.sharded(&id)
                )),
                _ => Err(Error::InvalidIdentifier(format!(
                    "temporal_versioned path for {id} needs a version >= 1"
                ))),
            },
            StoreStrategy::KeyBased => self.key_based_path(namespace, None, &id),
        }
    }

    /// `<ns>/data/key-based/<cache_key>/<file_id>`. Key segments are not sharded.
    pub fn key_based_path(
        &self,
        namespace: &Namespace,
        cache_key: Option<&DataKey>,
        file_id: &str,
    ) -> Result<String> {
        validate_identifier("file_id", file_id)?;
        let mut path = self.data_prefix(namespace, StoreStrategy::KeyBased);
        if let Some(key) = cache_key {
            push_segments(&mut path, "cache_key", key)?;
        }
        path.push_str(file_id);
        Ok(path)
    }

    pub fn latest_path(
        &self,
        namespace: &Namespace,
        strategy: StoreStrategy,
        cache_id: &CacheId,
    ) -> Option<String> {
        strategy.has_latest_pointer().then(|| {
            format!(
                "{}{LATEST_DIR}/{}{LATEST_SUFFIX}",
                self.data_prefix(namespace, strategy),
                self.sharded(&cache_id.to_string())
            )
        })
    }

    /// Directory holding every `v<N>` of a versioned id, with trailing `/`.
    pub fn versions_prefix(&self, namespace: &Namespace, cache_id: &CacheId) -> String {
        format!(
            "{}{VERSIONS_DIR}/{}/",
            self.data_prefix(namespace, StoreStrategy::TemporalVersioned),
            self.sharded(&cache_id.to_string())
        )
    }

    /// Directory holding child data files of an entry, with trailing `/`.
    pub fn data_files_prefix(&self, namespace: &Namespace, cache_id: &CacheId) -> String {
        format!(
            "{}/{}/{}/",
            namespace,
            DATA_FILES,
            self.sharded(&cache_id.to_string())
        )
    }

    /// Directory for one data key (or the entry root), with trailing `/`.
    pub fn data_key_prefix(
        &self,
        namespace: &Namespace,
        cache_id: &CacheId,
        data_key: Option<&DataKey>,
    ) -> Result<String> {
        let mut prefix = self.data_files_prefix(namespace, cache_id);
        if let Some(key) = data_key {
            push_segments(&mut prefix, "data_key", key)?;
        }
        Ok(prefix)
    }

    pub fn data_file_path(
        &self,
        namespace: &Namespace,
        cache_id: &CacheId,
        data_key: Option<&DataKey>,
        file_id: &DataFileId,
        data_type: DataType,
    ) -> Result<String> {
        validate_identifier("data_file_id", file_id.as_str())?;
        Ok(format!(
            "{}{}.{}",
            self.data_key_prefix(namespace, cache_id, data_key)?,
            file_id,
            data_type.extension()
        ))
    }

    pub fn namespace_prefix(&self, namespace: &Namespace) -> String {
        format!("{namespace}/")
    }

    pub fn refs_by_hash_prefix(&self, namespace: &Namespace) -> String {
        format!("{namespace}/{REFS_BY_HASH}/")
    }

    pub fn refs_by_id_prefix(&self, namespace: &Namespace) -> String {
        format!("{namespace}/{REFS_BY_ID}/")
    }

    /// Root of one strategy's data, with trailing `/`.
    pub fn data_prefix(&self, namespace: &Namespace, strategy: StoreStrategy) -> String {
        format!("{namespace}/{DATA}/{}/", strategy.path_token())
    }
}

/// Append each `/`-separated segment of `key` followed by `/`.
fn push_segments(path: &mut String, field: &str, key: &DataKey) -> Result<()> {
    for segment in key.as_str().split('/').filter(|s| !s.is_empty()) {
        validate_identifier(field, segment)?;
        path.push_str(segment);
        path.push('/');
    }
    Ok(())
}

/// Sidecar path for a data file.
pub fn metadata_path(data_path: &str) -> String {
    format!("{data_path}{METADATA_SUFFIX}")
}

/// Reject identifiers that cannot be a single path segment.
pub fn validate_identifier(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidIdentifier(format!("{kind} is empty")));
    }
    if value == "." || value == ".." {
        return Err(Error::InvalidIdentifier(format!("{kind} {value:?} is not allowed")));
    }
    if let Some(c) = value
        .chars()
        .find(|c| *c == '/' || *c == '\\' || c.is_whitespace() || c.is_control())
    {
        return Err(Error::InvalidIdentifier(format!(
            "{kind} {value:?} contains {c:?}"
        )));
    }
    Ok(())
}
