//! Child data files attached to a cache entry.
//!
//! Files live under `<ns>/data/files/<id shards>/[<data_key>/]<file_id>.<ext>`
//! where the extension records the data type. Every operation requires the
//! parent entry to exist in the namespace.

use crate::retrieve::decode_content;
use crate::service::CacheService;
use crate::types::{DataFile, DataFileRef, DeleteReport};
use stash_core::{CacheId, DataFileId, DataKey, DataType, Namespace, Payload, Result};
use tracing::{debug, info};

const DATA_TYPES: [DataType; 3] = [DataType::String, DataType::Json, DataType::Binary];

impl CacheService {
    /// Attach a file to an entry. `None` when the entry does not exist.
    ///
    /// A file id that already exists is replaced, whatever its old type.
    pub async fn store_data_file(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
        data_key: Option<&DataKey>,
        file_id: Option<DataFileId>,
        payload: Payload,
    ) -> Result<Option<DataFileRef>> {
        if !self.exists_by_id(cache_id, namespace).await? {
            debug!(namespace = %namespace, cache_id = %cache_id, "Data file parent missing");
            return Ok(None);
        }

        let file_id = file_id.unwrap_or_else(DataFileId::generate);
        let data_type = payload.data_type();
        let path = self
            .resolver()
            .data_file_path(namespace, cache_id, data_key, &file_id, data_type)?;

        for other in DATA_TYPES.into_iter().filter(|t| *t != data_type) {
            let stale = self
                .resolver()
                .data_file_path(namespace, cache_id, data_key, &file_id, other)?;
            self.provider().delete(&stale).await?;
        }
        self.provider().save(&path, &payload.to_bytes()?).await?;

        info!(
            namespace = %namespace,
            cache_id = %cache_id,
            file_id = %file_id,
            path = %path,
            "Stored data file"
        );
        Ok(Some(DataFileRef {
            cache_id: *cache_id,
            data_key: data_key.cloned(),
            file_id,
            data_type,
            path,
        }))
    }

    pub async fn retrieve_data_file(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
        data_key: Option<&DataKey>,
        file_id: &DataFileId,
    ) -> Result<Option<DataFile>> {
        if !self.exists_by_id(cache_id, namespace).await? {
            return Ok(None);
        }
        for data_type in DATA_TYPES {
            let path = self
                .resolver()
                .data_file_path(namespace, cache_id, data_key, file_id, data_type)?;
            if let Some(bytes) = self.provider().read(&path).await? {
                return Ok(Some(DataFile {
                    content: decode_content(bytes, data_type),
                    reference: DataFileRef {
                        cache_id: *cache_id,
                        data_key: data_key.cloned(),
                        file_id: file_id.clone(),
                        data_type,
                        path,
                    },
                }));
            }
        }
        debug!(cache_id = %cache_id, file_id = %file_id, "Data file missing");
        Ok(None)
    }

    /// Files under an entry, or under one data key (nested keys included).
    pub async fn list_data_files(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
        data_key: Option<&DataKey>,
    ) -> Result<Option<Vec<DataFileRef>>> {
        if !self.exists_by_id(cache_id, namespace).await? {
            return Ok(None);
        }
        let root = self.resolver().data_files_prefix(namespace, cache_id);
        let prefix = self.resolver().data_key_prefix(namespace, cache_id, data_key)?;

        let files = self
            .provider()
            .list(&prefix)
            .await?
            .into_iter()
            .filter_map(|path| parse_data_file(*cache_id, &root, path))
            .collect();
        Ok(Some(files))
    }

    /// Remove one file. `false` when the parent or the file is missing.
    pub async fn delete_data_file(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
        data_key: Option<&DataKey>,
        file_id: &DataFileId,
    ) -> Result<bool> {
        if !self.exists_by_id(cache_id, namespace).await? {
            return Ok(false);
        }
        let mut deleted = false;
        for data_type in DATA_TYPES {
            let path = self
                .resolver()
                .data_file_path(namespace, cache_id, data_key, file_id, data_type)?;
            deleted |= self.provider().delete(&path).await?;
        }
        Ok(deleted)
    }

    /// Remove every file under an entry or one of its data keys.
    pub async fn delete_data_files(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
        data_key: Option<&DataKey>,
    ) -> Result<DeleteReport> {
        if !self.exists_by_id(cache_id, namespace).await? {
            return Ok(DeleteReport::not_found(*cache_id, namespace.clone()));
        }
        let prefix = self.resolver().data_key_prefix(namespace, cache_id, data_key)?;
        let mut report = DeleteReport::success(*cache_id, namespace.clone());
        for path in self.provider().list(&prefix).await? {
            self.remove(&mut report, &path).await;
        }
        info!(
            namespace = %namespace,
            cache_id = %cache_id,
            deleted = report.deleted_count,
            "Deleted data files"
        );
        Ok(report)
    }
}

fn parse_data_file(cache_id: CacheId, root: &str, path: String) -> Option<DataFileRef> {
    let relative = path.strip_prefix(root)?;
    let (key, name) = match relative.rsplit_once('/') {
        Some((key, name)) => (Some(DataKey::new(key)), name),
        None => (None, relative),
    };
    let (stem, ext) = name.rsplit_once('.')?;
    let data_type = DataType::from_extension(ext)?;
    Some(DataFileRef {
        cache_id,
        data_key: key,
        file_id: DataFileId::new(stem),
        data_type,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::{ns, service};
    use crate::types::{DeleteStatus, StoreRequest};
    use serde_json::json;

    async fn parent(service: &CacheService) -> (CacheId, Namespace) {
        let stored = service
            .store(StoreRequest::new("parent").with_namespace(ns("ns1")))
            .await
            .unwrap();
        (stored.cache_id, stored.namespace)
    }

    #[tokio::test]
    async fn test_store_and_retrieve_data_file() {
        let service = service();
        let (cache_id, namespace) = parent(&service).await;
        let key = DataKey::new("analysis/v1");

        let stored = service
            .store_data_file(
                &cache_id,
                &namespace,
                Some(&key),
                Some(DataFileId::new("summary")),
                Payload::Json(json!({"score": 3})),
            )
            .await
            .unwrap()
            .unwrap();
        assert!(stored.path.ends_with("/analysis/v1/summary.json"));

        let file = service
            .retrieve_data_file(&cache_id, &namespace, Some(&key), &DataFileId::new("summary"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.content, Payload::Json(json!({"score": 3})));
        assert_eq!(file.reference, stored);
    }

    #[tokio::test]
    async fn test_generated_ids_and_listing() {
        let service = service();
        let (cache_id, namespace) = parent(&service).await;
        let generated = service
            .store_data_file(&cache_id, &namespace, None, None, Payload::Binary(vec![1, 2]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(generated.file_id.as_str().len(), 36);
        service
            .store_data_file(
                &cache_id,
                &namespace,
                Some(&DataKey::new("logs")),
                Some(DataFileId::new("run")),
                Payload::Text("ok".into()),
            )
            .await
            .unwrap();

        let all = service
            .list_data_files(&cache_id, &namespace, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(all.len(), 2);

        let logs = service
            .list_data_files(&cache_id, &namespace, Some(&DataKey::new("logs")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].data_key, Some(DataKey::new("logs")));
        assert_eq!(logs[0].file_id.as_str(), "run");
        assert_eq!(logs[0].data_type, DataType::String);
    }

    #[tokio::test]
    async fn test_restore_with_new_type_replaces_file() {
        let service = service();
        let (cache_id, namespace) = parent(&service).await;
        let file_id = DataFileId::new("f");
        for payload in [Payload::Text("a".into()), Payload::Binary(vec![9])] {
            service
                .store_data_file(&cache_id, &namespace, None, Some(file_id.clone()), payload)
                .await
                .unwrap();
        }
        let files = service
            .list_data_files(&cache_id, &namespace, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].data_type, DataType::Binary);
    }

    #[tokio::test]
    async fn test_missing_parent() {
        let service = service();
        let missing = CacheId::new();
        let namespace = ns("ns1");
        assert!(service
            .store_data_file(&missing, &namespace, None, None, Payload::Text("x".into()))
            .await
            .unwrap()
            .is_none());
        assert!(service
            .list_data_files(&missing, &namespace, None)
            .await
            .unwrap()
            .is_none());
        assert!(!service
            .delete_data_file(&missing, &namespace, None, &DataFileId::new("x"))
            .await
            .unwrap());
        let report = service
            .delete_data_files(&missing, &namespace, None)
            .await
            .unwrap();
        assert_eq!(report.status, DeleteStatus::NotFound);
    }

    #[tokio::test]
    async fn test_delete_one_and_all() {
        let service = service();
        let (cache_id, namespace) = parent(&service).await;
        for name in ["a", "b", "c"] {
            service
                .store_data_file(
                    &cache_id,
                    &namespace,
                    None,
                    Some(DataFileId::new(name)),
                    Payload::Text(name.into()),
                )
                .await
                .unwrap();
        }

        assert!(service
            .delete_data_file(&cache_id, &namespace, None, &DataFileId::new("a"))
            .await
            .unwrap());
        assert!(!service
            .delete_data_file(&cache_id, &namespace, None, &DataFileId::new("a"))
            .await
            .unwrap());

        let report = service
            .delete_data_files(&cache_id, &namespace, None)
            .await
            .unwrap();
        assert_eq!(report.deleted_count, 2);
        assert!(service
            .retrieve_by_id(&cache_id, &namespace)
            .await
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_parse_data_file_skips_unknown_extensions() {
        let root = "ns1/data/files/ab/cd/x/";
        let id = CacheId::new();
        assert!(parse_data_file(id, root, format!("{root}notes.md")).is_none());
        let parsed = parse_data_file(id, root, format!("{root}k/f.bin")).unwrap();
        assert_eq!(parsed.data_key, Some(DataKey::new("k")));
        assert_eq!(parsed.data_type, DataType::Binary);
    }
}
