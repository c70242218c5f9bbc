//! Stash cache engine.
//!
//! Content-addressable storage over a pluggable [`StorageProvider`]. Entries
//! are indexed by a truncated content hash and by a generated id, scoped to a
//! namespace, and laid out according to one of five store strategies.
//!
//! ```no_run
//! # async fn demo() -> stash_core::Result<()> {
//! use stash_cache::{CacheConfig, CacheService, StoreRequest};
//!
//! let service = CacheService::from_config(&CacheConfig::default())?;
//! let stored = service.store(StoreRequest::new("hello")).await?;
//! let entry = service.retrieve_by_id(&stored.cache_id, &stored.namespace).await?;
//! assert_eq!(entry.map(|e| e.as_text()), Some("hello".to_string()));
//! # Ok(())
//! # }
//! ```

pub mod compression;
pub mod config;
pub mod hash;
pub mod locks;
pub mod paths;
pub mod provider;
pub mod service;
pub mod types;

mod data_files;
mod delete;
mod namespace;
mod retrieve;
mod store;
mod update;
mod zip_store;

pub use config::{CacheConfig, HashAlgorithm, HashConfig, ShardConfig, StorageConfig, StorageMode};
pub use hash::HashGenerator;
pub use paths::{PathResolver, ResolvedPaths};
pub use provider::StorageProvider;
pub use service::CacheService;
pub use store::MAX_VERSION_ATTEMPTS;
pub use types::{
    CachedEntry, DataFile, DataFileRef, DeleteReport, DeleteStatus, NamespaceStats, StoreRequest,
    StoreResult, StoredPaths, ZipStoreResult,
};
