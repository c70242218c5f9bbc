//! The cache service: one handle over a storage provider.
//!
//! Operations are split across sibling modules (`store`, `retrieve`,
//! `delete`, `update`, `data_files`, `namespace`, `zip_store`), each adding
//! an `impl` block to [`CacheService`].

use crate::config::CacheConfig;
use crate::hash::HashGenerator;
use crate::locks::KeyedLocks;
use crate::paths::{self, PathResolver};
use crate::provider;
use serde::Serialize;
use serde::de::DeserializeOwned;
use stash_core::{EntryMetadata, Error, Namespace, Result, StorageProvider};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::warn;

pub struct CacheService {
    provider: Arc<dyn StorageProvider>,
    resolver: PathResolver,
    hasher: HashGenerator,
    default_namespace: Namespace,
    ttl_hours: u32,
    locks: KeyedLocks,
}

impl CacheService {
    pub fn new(provider: Arc<dyn StorageProvider>, config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            provider,
            resolver: PathResolver::new(config.sharding),
            hasher: HashGenerator::new(config.hash)?,
            default_namespace: config.default_namespace(),
            ttl_hours: config.ttl_hours,
            locks: KeyedLocks::new(),
        })
    }

    /// Build the provider named by `config.storage` and wrap it.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let provider = provider::from_config(&config.storage)?;
        Self::new(provider, config)
    }

    pub fn provider(&self) -> &Arc<dyn StorageProvider> {
        &self.provider
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn hasher(&self) -> &HashGenerator {
        &self.hasher
    }

    pub fn default_namespace(&self) -> &Namespace {
        &self.default_namespace
    }

    pub fn ttl_hours(&self) -> u32 {
        self.ttl_hours
    }

    pub(crate) async fn lock(&self, path: &str) -> OwnedMutexGuard<()> {
        self.locks.lock(path).await
    }

    /// Read and parse a JSON record. Missing files are `None`.
    pub(crate) async fn read_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.provider.read(path).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| Error::Serialization(format!("{path}: {e}"))),
            None => Ok(None),
        }
    }

    pub(crate) async fn write_json<T: Serialize>(&self, path: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.provider.save(path, &bytes).await
    }

    /// Like `read_json`, but a record that no longer parses counts as missing.
    /// Provider failures still propagate.
    pub(crate) async fn read_json_or_skip<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>> {
        match self.read_json(path).await {
            Err(Error::Serialization(e)) => {
                warn!(path = %path, error = %e, "Ignoring unparsable record");
                Ok(None)
            }
            other => other,
        }
    }

    /// Sidecar for a data path. Missing or unparsable sidecars are `None`.
    pub(crate) async fn read_metadata(&self, data_path: &str) -> Result<Option<EntryMetadata>> {
        self.read_json_or_skip(&paths::metadata_path(data_path)).await
    }
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("provider", &self.provider.name())
            .field("resolver", &self.resolver)
            .field("hasher", &self.hasher)
            .field("default_namespace", &self.default_namespace)
            .field("ttl_hours", &self.ttl_hours)
            .finish()
    }
}
