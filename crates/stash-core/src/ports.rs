//! Port traits (hexagonal architecture).
//!
//! The cache engine talks to storage only through these interfaces, so
//! backends can be swapped without touching path or reference logic.

use crate::Result;
use async_trait::async_trait;

/// Byte-level file operations over logical `/`-separated paths.
///
/// Paths never start with `/`. A single call is the only unit of atomicity
/// the engine relies on.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Create or overwrite a file.
    async fn save(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Create a file only if nothing exists at `path`.
    /// Returns `false` when the path was already taken.
    async fn save_if_absent(&self, path: &str, bytes: &[u8]) -> Result<bool>;

    /// Read a file. `None` when it does not exist.
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Check whether a file exists.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Delete a file. Returns `false` when it did not exist.
    async fn delete(&self, path: &str) -> Result<bool>;

    /// List every file whose path starts with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}
