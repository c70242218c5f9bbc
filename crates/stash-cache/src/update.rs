//! In-place updates of an entry's current content.

use crate::paths::metadata_path;
use crate::service::CacheService;
use crate::store::{encode_payload, owned_hashes};
use crate::types::{StoreResult, StoredPaths};
use chrono::Utc;
use stash_core::{
    CacheId, DataType, EntryMetadata, HistoryRecord, IdRef, LatestPointer, Namespace, Payload,
    Result,
};
use tracing::{debug, info};

impl CacheService {
    /// Overwrite the current content of an id without creating a new version.
    ///
    /// The hash is recomputed and the id moves between by-hash refs when the
    /// content changed. Returns `None` when the id does not exist.
    pub async fn update_by_id(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
        payload: impl Into<Payload>,
    ) -> Result<Option<StoreResult>> {
        let payload = payload.into();
        let by_id_path = self.resolver().by_id_ref_path(namespace, cache_id);
        let _guard = self.lock(&by_id_path).await;
        let Some(mut id_ref) = self.read_json::<IdRef>(&by_id_path).await? else {
            debug!(namespace = %namespace, cache_id = %cache_id, "Nothing to update");
            return Ok(None);
        };

        let (data_path, version) = self.current_location(&id_ref).await?;
        let data_type = payload.data_type();
        let json_field_path = match data_type {
            DataType::Json => self
                .read_metadata(&data_path)
                .await?
                .and_then(|m| m.json_field_path),
            _ => None,
        };
        let bytes = encode_payload(&payload, data_type)?;
        let cache_hash =
            self.content_hash(&payload, data_type, &bytes, None, json_field_path.as_deref())?;
        let stored_at = Utc::now();

        self.provider().save(&data_path, &bytes).await?;
        let metadata = EntryMetadata {
            cache_id: *cache_id,
            cache_hash: cache_hash.clone(),
            namespace: namespace.clone(),
            strategy: id_ref.strategy,
            data_type,
            content_size: bytes.len() as u64,
            content_encoding: None,
            stored_at,
            version,
            ttl_hours: Some(self.ttl_hours()),
            json_field_path,
        };
        let sidecar = metadata_path(&data_path);
        self.write_json(&sidecar, &metadata).await?;

        if let Some(latest_path) = &id_ref.latest_path {
            let pointer = LatestPointer {
                cache_id: *cache_id,
                data_path: data_path.clone(),
                version,
                stored_at,
            };
            self.write_json(latest_path, &pointer).await?;
        }

        let by_hash_path = self.resolver().by_hash_ref_path(namespace, &cache_hash)?;
        self.link_hash(&by_hash_path, &cache_hash, *cache_id, stored_at)
            .await?;

        let old_hashes = owned_hashes(id_ref.hashes());
        let mut matched = false;
        for record in id_ref.history.iter_mut().filter(|h| h.data_path == data_path) {
            record.cache_hash = cache_hash.clone();
            record.stored_at = stored_at;
            matched = true;
        }
        if !matched {
            id_ref.history.push(HistoryRecord {
                data_path: data_path.clone(),
                cache_hash: cache_hash.clone(),
                stored_at,
                version,
            });
        }
        id_ref.cache_hash = cache_hash.clone();
        id_ref.data_type = data_type;
        id_ref.content_encoding = None;
        id_ref.stored_at = stored_at;

        let live = id_ref.hashes();
        let stale: Vec<_> = old_hashes
            .into_iter()
            .filter(|h| !live.contains(h))
            .collect();
        self.unlink_hashes(namespace, &stale, cache_id).await?;
        self.write_json(&by_id_path, &id_ref).await?;

        info!(
            namespace = %namespace,
            cache_id = %cache_id,
            cache_hash = %cache_hash,
            "Updated cache entry"
        );

        let mut data = vec![data_path, sidecar];
        data.extend(id_ref.latest_path.clone());
        Ok(Some(StoreResult {
            cache_id: *cache_id,
            cache_hash,
            namespace: namespace.clone(),
            strategy: id_ref.strategy,
            data_type,
            paths: StoredPaths {
                data,
                by_hash: vec![by_hash_path],
                by_id: vec![by_id_path],
            },
            size: bytes.len() as u64,
            version,
            stored_at,
        }))
    }
}
