//! In-memory storage provider.

use async_trait::async_trait;
use stash_core::{Result, StorageProvider};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Process-local storage. Contents vanish with the provider.
#[derive(Default)]
pub struct MemoryProvider {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored files.
    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn save(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.files
            .write()
            .await
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn save_if_absent(&self, path: &str, bytes: &[u8]) -> Result<bool> {
        let mut files = self.files.write().await;
        if files.contains_key(path) {
            return Ok(false);
        }
        files.insert(path.to_string(), bytes.to_vec());
        Ok(true)
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.files.read().await.get(path).cloned())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.files.read().await.contains_key(path))
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        Ok(self.files.write().await.remove(path).is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let files = self.files.read().await;
        Ok(files
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, _)| path.clone())
            .collect())
    }
}
