//! Store orchestration.

use crate::compression;
use crate::hash::canonical_json;
use crate::paths::validate_identifier;
use crate::service::CacheService;
use crate::types::{StoreRequest, StoreResult, StoredPaths};
use chrono::{DateTime, Utc};
use serde_json::Value;
use stash_core::{
    CacheHash, CacheId, ContentEncoding, DataType, EntryMetadata, Error, HashRefs, HistoryRecord,
    IdRef, LatestPointer, Namespace, Payload, Result, StoreStrategy,
};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Conditional creates tried before a versioned store gives up.
pub const MAX_VERSION_ATTEMPTS: u32 = 32;

impl CacheService {
    /// Store a payload and index it by hash and by id.
    ///
    /// Writes happen in order: data, metadata sidecar, latest pointer,
    /// by-hash refs, by-id ref. The first failing write aborts the store and
    /// earlier writes are left in place.
    pub async fn store(&self, request: StoreRequest) -> Result<StoreResult> {
        let StoreRequest {
            payload,
            data_type,
            namespace,
            strategy,
            cache_id,
            cache_hash,
            content_encoding,
            json_field_path,
            cache_key,
            file_id,
        } = request;

        if strategy != StoreStrategy::KeyBased && (cache_key.is_some() || file_id.is_some()) {
            return Err(Error::InvalidIdentifier(format!(
                "cache_key and file_id apply to key_based stores, got {strategy}"
            )));
        }
        let data_type = data_type.unwrap_or_else(|| payload.data_type());
        if content_encoding.is_some() && data_type != DataType::Binary {
            return Err(Error::InvalidPayload(format!(
                "content encoding applies to binary data, got {data_type}"
            )));
        }
        let bytes = encode_payload(&payload, data_type)?;
        let cache_hash = match cache_hash {
            Some(hash) => {
                validate_identifier("cache_hash", hash.as_str())?;
                hash
            }
            None => self.content_hash(
                &payload,
                data_type,
                &bytes,
                content_encoding,
                json_field_path.as_deref(),
            )?,
        };
        let cache_id = cache_id.unwrap_or_default();

        let by_id_path = self.resolver().by_id_ref_path(&namespace, &cache_id);
        let _id_guard = self.lock(&by_id_path).await;
        let previous: Option<IdRef> = self.read_json(&by_id_path).await?;

        let stored_at = Utc::now();
        let version = match strategy {
            StoreStrategy::TemporalVersioned => Some(
                self.claim_version(&namespace, &cache_id, previous.as_ref(), &bytes)
                    .await?,
            ),
            _ => None,
        };
        let paths = match strategy {
            StoreStrategy::KeyBased => self.resolver().resolve_keyed(
                &namespace,
                &cache_id,
                &cache_hash,
                cache_key.as_ref(),
                file_id.as_ref(),
            )?,
            _ => self.resolver().resolve(
                &namespace,
                strategy,
                &cache_id,
                &cache_hash,
                stored_at,
                version,
            )?,
        };
        debug!(
            namespace = %namespace,
            cache_id = %cache_id,
            strategy = %strategy,
            path = %paths.data_path,
            "Resolved store paths"
        );

        if version.is_none() {
            self.provider().save(&paths.data_path, &bytes).await?;
        }

        let metadata = EntryMetadata {
            cache_id,
            cache_hash: cache_hash.clone(),
            namespace: namespace.clone(),
            strategy,
            data_type,
            content_size: bytes.len() as u64,
            content_encoding,
            stored_at,
            version,
            ttl_hours: Some(self.ttl_hours()),
            json_field_path,
        };
        self.write_json(&paths.metadata_path, &metadata).await?;

        if let Some(latest_path) = &paths.latest_path {
            let pointer = LatestPointer {
                cache_id,
                data_path: paths.data_path.clone(),
                version,
                stored_at,
            };
            self.write_json(latest_path, &pointer).await?;
        }

        self.link_hash(&paths.by_hash_ref_path, &cache_hash, cache_id, stored_at)
            .await?;

        let record = HistoryRecord {
            data_path: paths.data_path.clone(),
            cache_hash: cache_hash.clone(),
            stored_at,
            version,
        };
        let mut history = previous
            .as_ref()
            .map(|p| p.history.clone())
            .unwrap_or_default();
        if !strategy.is_temporal() {
            history.retain(|h| h.data_path != record.data_path);
        }
        history.push(record);

        let id_ref = IdRef {
            cache_id,
            cache_hash: cache_hash.clone(),
            namespace: namespace.clone(),
            strategy,
            data_type,
            data_path: paths.data_path.clone(),
            latest_path: paths.latest_path.clone(),
            current_version: version,
            history,
            content_encoding,
            stored_at,
        };

        if let Some(previous) = &previous {
            let live = id_ref.hashes();
            let stale: Vec<CacheHash> = previous
                .hashes()
                .into_iter()
                .filter(|h| !live.contains(h))
                .cloned()
                .collect();
            self.unlink_hashes(&namespace, &stale, &cache_id).await?;
        }

        self.write_json(&by_id_path, &id_ref).await?;

        let mut data = vec![paths.data_path.clone(), paths.metadata_path.clone()];
        data.extend(paths.latest_path.clone());
        let result = StoreResult {
            cache_id,
            cache_hash,
            namespace,
            strategy,
            data_type,
            paths: StoredPaths {
                data,
                by_hash: vec![paths.by_hash_ref_path],
                by_id: vec![by_id_path],
            },
            size: bytes.len() as u64,
            version,
            stored_at,
        };

        info!(
            namespace = %result.namespace,
            cache_id = %result.cache_id,
            cache_hash = %result.cache_hash,
            strategy = %result.strategy,
            size = result.size,
            "Stored cache entry"
        );
        Ok(result)
    }

    /// Hash the content the way the request asks for.
    pub(crate) fn content_hash(
        &self,
        payload: &Payload,
        data_type: DataType,
        bytes: &[u8],
        content_encoding: Option<ContentEncoding>,
        json_field_path: Option<&str>,
    ) -> Result<CacheHash> {
        if let Some(field_path) = json_field_path {
            let value = match payload {
                Payload::Json(v) => v.clone(),
                _ if data_type == DataType::Json => serde_json::from_slice::<Value>(bytes)
                    .map_err(|e| Error::InvalidPayload(format!("json payload does not parse: {e}")))?,
                _ => {
                    return Err(Error::InvalidPayload(format!(
                        "json_field_path needs json data, got {data_type}"
                    )));
                }
            };
            return self.hasher().hash_json_field(&value, field_path);
        }
        match content_encoding {
            Some(encoding) => Ok(self
                .hasher()
                .calculate(&compression::decode(bytes, encoding)?)),
            None => self.hasher().hash(payload, data_type),
        }
    }

    /// Next free `v<N>` for an id, claimed with a conditional create.
    async fn claim_version(
        &self,
        namespace: &Namespace,
        cache_id: &CacheId,
        previous: Option<&IdRef>,
        bytes: &[u8],
    ) -> Result<u32> {
        let mut version = self.next_version(namespace, cache_id, previous).await?;
        for attempt in 1..=MAX_VERSION_ATTEMPTS {
            let path = self.resolver().data_path(
                namespace,
                StoreStrategy::TemporalVersioned,
                cache_id,
                Utc::now(),
                Some(version),
            )?;
            if self.provider().save_if_absent(&path, bytes).await? {
                if attempt > 1 {
                    warn!(cache_id = %cache_id, version, attempt, "Version claimed after contention");
                }
                return Ok(version);
            }
            debug!(cache_id = %cache_id, version, path = %path, "Version already taken");
            version += 1;
        }
        warn!(cache_id = %cache_id, attempts = MAX_VERSION_ATTEMPTS, "Version allocation exhausted");
        Err(Error::VersionConflict {
            cache_id: cache_id.to_string(),
            attempts: MAX_VERSION_ATTEMPTS,
        })
    }

    async fn next_version(
        &self,
        namespace: &Namespace,
        cache_id: &CacheId,
        previous: Option<&IdRef>,
    ) -> Result<u32> {
        let from_ref = previous
            .map(|r| {
                r.current_version
                    .into_iter()
                    .chain(r.versions())
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        let from_pointer = match self.resolver().latest_path(
            namespace,
            StoreStrategy::TemporalVersioned,
            cache_id,
        ) {
            Some(path) => self
                .read_json_or_skip::<LatestPointer>(&path)
                .await?
                .and_then(|p| p.version)
                .unwrap_or(0),
            None => 0,
        };
        Ok(from_ref.max(from_pointer) + 1)
    }

    /// Record `cache_id` under a hash.
    pub(crate) async fn link_hash(
        &self,
        by_hash_path: &str,
        cache_hash: &CacheHash,
        cache_id: CacheId,
        stored_at: DateTime<Utc>,
    ) -> Result<()> {
        let _guard = self.lock(by_hash_path).await;
        let mut refs = self
            .read_json::<HashRefs>(by_hash_path)
            .await?
            .unwrap_or_else(|| HashRefs::new(cache_hash.clone()));
        refs.link(cache_id, stored_at);
        self.write_json(by_hash_path, &refs).await
    }

    /// Drop `cache_id` from each hash's refs. Empty refs files are removed.
    pub(crate) async fn unlink_hashes(
        &self,
        namespace: &Namespace,
        hashes: &[CacheHash],
        cache_id: &CacheId,
    ) -> Result<()> {
        for hash in hashes {
            let path = self.resolver().by_hash_ref_path(namespace, hash)?;
            let _guard = self.lock(&path).await;
            let Some(mut refs) = self.read_json::<HashRefs>(&path).await? else {
                continue;
            };
            if !refs.unlink(cache_id) {
                continue;
            }
            if refs.is_empty() {
                self.provider().delete(&path).await?;
            } else {
                self.write_json(&path, &refs).await?;
            }
            debug!(cache_hash = %hash, cache_id = %cache_id, "Unlinked stale hash");
        }
        Ok(())
    }
}

/// Bytes written for a payload stored as `data_type`.
pub(crate) fn encode_payload(payload: &Payload, data_type: DataType) -> Result<Vec<u8>> {
    match (data_type, payload) {
        (DataType::Binary, Payload::Binary(b)) => Ok(b.clone()),
        (DataType::Binary, other) => Err(Error::InvalidPayload(format!(
            "binary data required, got {}",
            other.data_type()
        ))),
        (DataType::String, Payload::Text(s)) => Ok(s.as_bytes().to_vec()),
        (DataType::String, Payload::Json(v)) => Ok(canonical_json(v).into_bytes()),
        (DataType::String, Payload::Binary(b)) => std::str::from_utf8(b)
            .map(|_| b.clone())
            .map_err(|e| Error::InvalidPayload(format!("string payload is not UTF-8: {e}"))),
        (DataType::Json, Payload::Json(v)) => Ok(serde_json::to_vec(v)?),
        (DataType::Json, Payload::Text(s)) => serde_json::from_str::<Value>(s)
            .map(|_| s.as_bytes().to_vec())
            .map_err(|e| Error::InvalidPayload(format!("json payload does not parse: {e}"))),
        (DataType::Json, Payload::Binary(b)) => serde_json::from_slice::<Value>(b)
            .map(|_| b.clone())
            .map_err(|e| Error::InvalidPayload(format!("json payload does not parse: {e}"))),
    }
}

/// Distinct hashes, for callers that hold a borrowed set.
pub(crate) fn owned_hashes(hashes: BTreeSet<&CacheHash>) -> Vec<CacheHash> {
    hashes.into_iter().cloned().collect()
}
