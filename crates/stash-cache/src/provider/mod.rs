//! Storage provider implementations.

mod archive;
mod filesystem;
mod memory;
mod object;
mod sqlite;

pub use archive::{ArchiveFormat, ArchiveProvider};
pub use filesystem::FilesystemProvider;
pub use memory::MemoryProvider;
pub use object::ObjectStoreProvider;
pub use sqlite::SqliteProvider;
pub use stash_core::StorageProvider;

use crate::config::{StorageConfig, StorageMode};
use stash_core::{Error, Result};
use std::sync::Arc;
use tracing::info;

/// Build the provider selected by configuration.
pub fn from_config(storage: &StorageConfig) -> Result<Arc<dyn StorageProvider>> {
    let mode = storage.resolved_mode();
    let provider: Arc<dyn StorageProvider> = match mode {
        StorageMode::Memory => Arc::new(MemoryProvider::new()),
        StorageMode::LocalDisk => Arc::new(FilesystemProvider::new(&storage.local_disk_path)),
        StorageMode::Sqlite => Arc::new(SqliteProvider::open(&storage.sqlite_path)?),
        StorageMode::Archive => Arc::new(ArchiveProvider::open(&storage.archive_path)?),
        StorageMode::S3 => {
            let bucket = storage
                .bucket_name
                .as_deref()
                .filter(|b| !b.is_empty())
                .ok_or_else(|| Error::Config("storage.bucket_name is required for s3".into()))?;
            Arc::new(ObjectStoreProvider::s3(bucket, storage.prefix.clone())?)
        }
    };
    info!(provider = provider.name(), ?mode, "Storage provider ready");
    Ok(provider)
}
