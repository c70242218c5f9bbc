//! Test context wiring a cache service to one storage backend.

use object_store::memory::InMemory;
use stash_cache::provider::{
    ArchiveProvider, FilesystemProvider, MemoryProvider, ObjectStoreProvider, SqliteProvider,
};
use stash_cache::{CacheConfig, CacheService, StorageProvider};
use stash_core::Namespace;
use std::fmt;
use std::sync::Arc;
use tempfile::TempDir;

/// Storage backends exercised by the suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    LocalDisk,
    Sqlite,
    Archive,
    ObjectStore,
}

impl Backend {
    pub const ALL: [Backend; 5] = [
        Backend::Memory,
        Backend::LocalDisk,
        Backend::Sqlite,
        Backend::Archive,
        Backend::ObjectStore,
    ];

    /// Whether a new provider over the same location sees earlier writes.
    pub fn is_durable(&self) -> bool {
        matches!(self, Backend::LocalDisk | Backend::Sqlite | Backend::Archive)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backend::Memory => "memory",
            Backend::LocalDisk => "local_disk",
            Backend::Sqlite => "sqlite",
            Backend::Archive => "archive",
            Backend::ObjectStore => "object_store",
        };
        f.write_str(name)
    }
}

/// A cache service over a fresh backend.
///
/// Drop this to remove the backing temp directory.
pub struct TestContext {
    pub backend: Backend,
    pub service: CacheService,
    pub namespace: Namespace,
    dir: TempDir,
}

impl TestContext {
    /// Create a context for one backend with default engine settings.
    pub async fn new(backend: Backend) -> anyhow::Result<Self> {
        Self::with_config(backend, CacheConfig::default()).await
    }

    /// Create a context for one backend with custom engine settings.
    pub async fn with_config(backend: Backend, config: CacheConfig) -> anyhow::Result<Self> {
        crate::init_test_logging();

        let dir = tempfile::tempdir()?;
        let provider = open_provider(backend, &dir)?;
        let service = CacheService::new(provider, &config)?;
        tracing::debug!(%backend, root = %dir.path().display(), "Test context ready");

        Ok(Self {
            backend,
            service,
            namespace: Namespace::new("itest")?,
            dir,
        })
    }

    /// One context per backend.
    pub async fn all() -> anyhow::Result<Vec<Self>> {
        let mut contexts = Vec::with_capacity(Backend::ALL.len());
        for backend in Backend::ALL {
            contexts.push(Self::new(backend).await?);
        }
        Ok(contexts)
    }

    /// A second service over the same storage location.
    ///
    /// Only meaningful for durable backends.
    pub fn reopen(&self) -> anyhow::Result<CacheService> {
        let provider = open_provider(self.backend, &self.dir)?;
        Ok(CacheService::new(provider, &CacheConfig::default())?)
    }

    pub fn provider(&self) -> &Arc<dyn StorageProvider> {
        self.service.provider()
    }
}

fn open_provider(backend: Backend, dir: &TempDir) -> anyhow::Result<Arc<dyn StorageProvider>> {
    let provider: Arc<dyn StorageProvider> = match backend {
        Backend::Memory => Arc::new(MemoryProvider::new()),
        Backend::LocalDisk => Arc::new(FilesystemProvider::new(dir.path().join("cache"))),
        Backend::Sqlite => {
            let path = dir.path().join("cache.db");
            Arc::new(SqliteProvider::open(&path.to_string_lossy())?)
        }
        Backend::Archive => Arc::new(ArchiveProvider::open(dir.path().join("cache.tar"))?),
        Backend::ObjectStore => Arc::new(ObjectStoreProvider::new(
            Arc::new(InMemory::new()),
            Some("stash".into()),
            "object_store",
        )),
    };
    Ok(provider)
}
