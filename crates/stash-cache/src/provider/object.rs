//! Object storage provider (S3 and compatibles) built on `object_store`.

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload, path::Path as ObjectPath};
use stash_core::{Error, Result, StorageProvider};
use std::sync::Arc;
use tracing::debug;

pub struct ObjectStoreProvider {
    inner: Arc<dyn ObjectStore>,
    prefix: Option<String>,
    name: String,
}

impl ObjectStoreProvider {
    /// Wrap any object store, optionally scoping every key under `prefix`.
    pub fn new(inner: Arc<dyn ObjectStore>, prefix: Option<String>, name: impl Into<String>) -> Self {
        let prefix = prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());
        Self {
            inner,
            prefix,
            name: name.into(),
        }
    }

    /// S3 bucket with credentials and region taken from the `AWS_*` environment.
    pub fn s3(bucket: &str, prefix: Option<String>) -> Result<Self> {
        let store = object_store::aws::AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| Error::Config(format!("S3 bucket {bucket}: {e}")))?;
        Ok(Self::new(Arc::new(store), prefix, "s3"))
    }

    fn key(&self, path: &str) -> ObjectPath {
        match &self.prefix {
            Some(prefix) => ObjectPath::from(format!("{prefix}/{path}")),
            None => ObjectPath::from(path),
        }
    }

    fn logical(&self, location: &ObjectPath) -> String {
        let full = location.to_string();
        match &self.prefix {
            Some(prefix) => full
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(&full)
                .to_string(),
            None => full,
        }
    }

    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.inner
            .put(&self.key(path), PutPayload::from(bytes.to_vec()))
            .await
            .map(|_| ())
            .map_err(|e| Error::storage("save", path, e))
    }
}

#[async_trait]
impl StorageProvider for ObjectStoreProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn save(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.put(path, bytes).await
    }

    async fn save_if_absent(&self, path: &str, bytes: &[u8]) -> Result<bool> {
        let opts = PutOptions::from(PutMode::Create);
        let result = self
            .inner
            .put_opts(&self.key(path), PutPayload::from(bytes.to_vec()), opts)
            .await
            .map(|_| ());
        match classify_create(path, result)? {
            CreateOutcome::Created => Ok(true),
            CreateOutcome::Taken => Ok(false),
            CreateOutcome::Unsupported => {
                // Stores without conditional puts: weaker head-then-put.
                debug!(path, "Conditional put unsupported, falling back");
                if self.exists(path).await? {
                    return Ok(false);
                }
                self.put(path, bytes).await?;
                Ok(true)
            }
        }
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.inner.get(&self.key(path)).await {
            Ok(result) => {
                let bytes = result
                    .bytes()
                    .await
                    .map_err(|e| Error::storage("read", path, e))?;
                Ok(Some(bytes.to_vec()))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(Error::storage("read", path, e)),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        match self.inner.head(&self.key(path)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(Error::storage("exists", path, e)),
        }
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        // Object store deletes succeed for missing keys, so look first.
        if !self.exists(path).await? {
            return Ok(false);
        }
        match self.inner.delete(&self.key(path)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(true),
            Err(e) => Err(Error::storage("delete", path, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // Object store prefixes are whole segments; filter the rest here.
        let dir = prefix.rfind('/').map(|idx| &prefix[..idx]).unwrap_or("");
        let dir_key = match (&self.prefix, dir.is_empty()) {
            (Some(p), true) => Some(ObjectPath::from(p.as_str())),
            (Some(_), false) | (None, false) => Some(self.key(dir)),
            (None, true) => None,
        };

        let objects: Vec<_> = self
            .inner
            .list(dir_key.as_ref())
            .try_collect()
            .await
            .map_err(|e| Error::storage("list", prefix, e))?;

        let mut paths: Vec<String> = objects
            .iter()
            .map(|meta| self.logical(&meta.location))
            .filter(|p| p.starts_with(prefix))
            .collect();
        paths.sort();
        Ok(paths)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum CreateOutcome {
    Created,
    Taken,
    Unsupported,
}

/// Outcome of a `PutMode::Create` put. Only a store that cannot do
/// conditional puts gets the fallback; every other failure is an error.
fn classify_create(path: &str, result: object_store::Result<()>) -> Result<CreateOutcome> {
    match result {
        Ok(()) => Ok(CreateOutcome::Created),
        Err(object_store::Error::AlreadyExists { .. })
        | Err(object_store::Error::Precondition { .. }) => Ok(CreateOutcome::Taken),
        Err(object_store::Error::NotSupported { .. }) | Err(object_store::Error::NotImplemented) => {
            Ok(CreateOutcome::Unsupported)
        }
        Err(e) => Err(Error::storage("create", path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn provider(prefix: Option<&str>) -> ObjectStoreProvider {
        ObjectStoreProvider::new(Arc::new(InMemory::new()), prefix.map(String::from), "memory-object")
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let provider = provider(None);
        provider.save("ns1/data/direct/ab/cd/x", b"payload").await.unwrap();
        assert_eq!(
            provider.read("ns1/data/direct/ab/cd/x").await.unwrap(),
            Some(b"payload".to_vec())
        );
        assert!(provider.exists("ns1/data/direct/ab/cd/x").await.unwrap());
        assert!(provider.delete("ns1/data/direct/ab/cd/x").await.unwrap());
        assert!(!provider.delete("ns1/data/direct/ab/cd/x").await.unwrap());
        assert_eq!(provider.read("ns1/data/direct/ab/cd/x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_conditional_create() {
        let provider = provider(None);
        assert!(provider.save_if_absent("ns/v1", b"a").await.unwrap());
        assert!(!provider.save_if_absent("ns/v1", b"b").await.unwrap());
        assert_eq!(provider.read("ns/v1").await.unwrap(), Some(b"a".to_vec()));
    }

    #[tokio::test]
    async fn test_prefix_scoping_and_listing() {
        let provider = provider(Some("/cache-root/"));
        for path in ["ns1/refs/a.json", "ns1/refs/b.json", "ns10/refs/a.json"] {
            provider.save(path, b"{}").await.unwrap();
        }
        assert_eq!(
            provider.list("ns1/").await.unwrap(),
            vec!["ns1/refs/a.json", "ns1/refs/b.json"]
        );
        assert_eq!(provider.list("").await.unwrap().len(), 3);
        assert_eq!(provider.list("ns1/refs/b").await.unwrap(), vec!["ns1/refs/b.json"]);
    }

    #[test]
    fn test_conditional_put_failures_are_not_retried_blindly() {
        let throttled = object_store::Error::Generic {
            store: "S3",
            source: "503 Slow Down".into(),
        };
        let err = classify_create("ns/versions/v1", Err(throttled)).unwrap_err();
        assert!(matches!(&err, Error::Storage { operation, .. } if operation == "create"));
        assert_eq!(err.path(), Some("ns/versions/v1"));

        let taken = object_store::Error::AlreadyExists {
            path: "ns/versions/v1".into(),
            source: "exists".into(),
        };
        assert_eq!(classify_create("ns/versions/v1", Err(taken)).unwrap(), CreateOutcome::Taken);

        let unsupported = object_store::Error::NotSupported {
            source: "no conditional put".into(),
        };
        assert_eq!(
            classify_create("ns/versions/v1", Err(unsupported)).unwrap(),
            CreateOutcome::Unsupported
        );
        assert_eq!(
            classify_create("ns/versions/v1", Err(object_store::Error::NotImplemented)).unwrap(),
            CreateOutcome::Unsupported
        );
    }
}
