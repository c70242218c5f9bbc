//! Retrieval by id, hash and version, plus existence checks.

use crate::paths::validate_identifier;
use crate::service::CacheService;
use crate::types::CachedEntry;
use stash_core::{
    CacheHash, CacheId, DataFileId, DataKey, DataType, EntryMetadata, HashRefs, IdRef,
    LatestPointer, Namespace, Payload, Result,
};
use tracing::debug;

impl CacheService {
    /// Current content of an id. Missing entries are `None`.
    pub async fn retrieve_by_id(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
    ) -> Result<Option<CachedEntry>> {
        let Some(id_ref) = self.retrieve_refs_by_id(cache_id, namespace).await? else {
            debug!(namespace = %namespace, cache_id = %cache_id, "No by-id ref");
            return Ok(None);
        };
        let (data_path, version) = self.current_location(&id_ref).await?;
        self.load_entry(&id_ref, &data_path, id_ref.cache_hash.clone(), version)
            .await
    }

    /// Newest entry whose content has this hash.
    ///
    /// Candidates are tried newest `stored_at` first; ids whose refs or data
    /// have gone missing are skipped.
    pub async fn retrieve_by_hash(
        &self,
        cache_hash: &CacheHash,
        namespace: &Namespace,
    ) -> Result<Option<CachedEntry>> {
        let Some(refs) = self.retrieve_refs_by_hash(cache_hash, namespace).await? else {
            debug!(namespace = %namespace, cache_hash = %cache_hash, "No by-hash refs");
            return Ok(None);
        };

        for candidate in refs.newest_first() {
            let Some(id_ref) = self
                .retrieve_refs_by_id(&candidate.cache_id, namespace)
                .await?
            else {
                debug!(cache_id = %candidate.cache_id, "Hash points at a missing id");
                continue;
            };

            let entry = if &id_ref.cache_hash == cache_hash {
                let (data_path, version) = self.current_location(&id_ref).await?;
                self.load_entry(&id_ref, &data_path, cache_hash.clone(), version)
                    .await?
            } else {
                // Older content of an id that has since moved on.
                match id_ref
                    .history
                    .iter()
                    .filter(|h| &h.cache_hash == cache_hash)
                    .max_by_key(|h| h.stored_at)
                {
                    Some(record) => {
                        self.load_entry(&id_ref, &record.data_path, cache_hash.clone(), record.version)
                            .await?
                    }
                    None => None,
                }
            };

            if entry.is_some() {
                return Ok(entry);
            }
        }
        Ok(None)
    }

    /// Entry stored at a `key_based` location.
    ///
    /// The sidecar names the id that wrote the path last; `None` when either
    /// the sidecar or that id's ref is gone.
    pub async fn retrieve_by_key(
        &self,
        cache_key: &DataKey,
        file_id: &DataFileId,
        namespace: &Namespace,
    ) -> Result<Option<CachedEntry>> {
        let data_path =
            self.resolver()
                .key_based_path(namespace, Some(cache_key), file_id.as_str())?;
        let Some(metadata) = self.read_metadata(&data_path).await? else {
            debug!(path = %data_path, "No sidecar at key");
            return Ok(None);
        };
        let Some(id_ref) = self
            .retrieve_refs_by_id(&metadata.cache_id, namespace)
            .await?
        else {
            debug!(cache_id = %metadata.cache_id, "Key points at a missing id");
            return Ok(None);
        };
        self.load_entry(&id_ref, &data_path, metadata.cache_hash, None)
            .await
    }

    /// One numbered version of a `temporal_versioned` entry.
    pub async fn retrieve_version(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
        version: u32,
    ) -> Result<Option<CachedEntry>> {
        let Some(id_ref) = self.retrieve_refs_by_id(cache_id, namespace).await? else {
            return Ok(None);
        };
        let Some(record) = id_ref.version(version) else {
            debug!(cache_id = %cache_id, version, "No such version");
            return Ok(None);
        };
        self.load_entry(&id_ref, &record.data_path, record.cache_hash.clone(), Some(version))
            .await
    }

    /// Sidecar of an id's current content.
    pub async fn retrieve_metadata(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
    ) -> Result<Option<EntryMetadata>> {
        let Some(id_ref) = self.retrieve_refs_by_id(cache_id, namespace).await? else {
            return Ok(None);
        };
        let (data_path, _) = self.current_location(&id_ref).await?;
        self.read_metadata(&data_path).await
    }

    pub async fn retrieve_refs_by_id(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
    ) -> Result<Option<IdRef>> {
        let path = self.resolver().by_id_ref_path(namespace, cache_id);
        self.read_json(&path).await
    }

    pub async fn retrieve_refs_by_hash(
        &self,
        cache_hash: &CacheHash,
        namespace: &Namespace,
    ) -> Result<Option<HashRefs>> {
        let path = self.resolver().by_hash_ref_path(namespace, cache_hash)?;
        self.read_json(&path).await
    }

    /// Whether `hash_or_id` names a hash or an id in the namespace.
    pub async fn exists(&self, hash_or_id: &str, namespace: &Namespace) -> Result<bool> {
        if validate_identifier("cache_hash", hash_or_id).is_ok()
            && self
                .exists_by_hash(&CacheHash::new(hash_or_id), namespace)
                .await?
        {
            return Ok(true);
        }
        match hash_or_id.parse::<CacheId>() {
            Ok(cache_id) => self.exists_by_id(&cache_id, namespace).await,
            Err(_) => Ok(false),
        }
    }

    pub async fn exists_by_hash(&self, cache_hash: &CacheHash, namespace: &Namespace) -> Result<bool> {
        let path = self.resolver().by_hash_ref_path(namespace, cache_hash)?;
        self.provider().exists(&path).await
    }

    pub async fn exists_by_id(&self, cache_id: &CacheId, namespace: &Namespace) -> Result<bool> {
        let path = self.resolver().by_id_ref_path(namespace, cache_id);
        self.provider().exists(&path).await
    }

    /// Where an id's current content lives: the latest pointer when one is
    /// present and parses, otherwise the ref's own `data_path`.
    pub(crate) async fn current_location(&self, id_ref: &IdRef) -> Result<(String, Option<u32>)> {
        if let Some(latest_path) = &id_ref.latest_path {
            match self.read_json_or_skip::<LatestPointer>(latest_path).await? {
                Some(pointer) if pointer.cache_id == id_ref.cache_id => {
                    return Ok((pointer.data_path, pointer.version));
                }
                _ => debug!(path = %latest_path, "No usable latest pointer, using ref"),
            }
        }
        Ok((id_ref.data_path.clone(), id_ref.current_version))
    }

    async fn load_entry(
        &self,
        id_ref: &IdRef,
        data_path: &str,
        cache_hash: CacheHash,
        version: Option<u32>,
    ) -> Result<Option<CachedEntry>> {
        let Some(bytes) = self.provider().read(data_path).await? else {
            debug!(path = %data_path, "Data file missing");
            return Ok(None);
        };
        let metadata = self.read_metadata(data_path).await?;
        let stored_type = metadata
            .as_ref()
            .map(|m| m.data_type)
            .unwrap_or(id_ref.data_type);
        let content = decode_content(bytes, stored_type);

        Ok(Some(CachedEntry {
            cache_id: id_ref.cache_id,
            cache_hash: metadata
                .as_ref()
                .map(|m| m.cache_hash.clone())
                .unwrap_or(cache_hash),
            namespace: id_ref.namespace.clone(),
            strategy: metadata.as_ref().map(|m| m.strategy).unwrap_or(id_ref.strategy),
            data_type: content.data_type(),
            data_path: data_path.to_string(),
            content_encoding: metadata
                .as_ref()
                .map(|m| m.content_encoding)
                .unwrap_or(id_ref.content_encoding),
            version: metadata.as_ref().and_then(|m| m.version).or(version),
            content,
            metadata,
        }))
    }
}

/// Stored bytes as the recorded type, degrading to text or binary when the
/// bytes do not fit it.
pub(crate) fn decode_content(bytes: Vec<u8>, data_type: DataType) -> Payload {
    let as_text = |bytes: Vec<u8>| match String::from_utf8(bytes) {
        Ok(s) => Payload::Text(s),
        Err(e) => Payload::Binary(e.into_bytes()),
    };
    match data_type {
        DataType::Binary => Payload::Binary(bytes),
        DataType::String => as_text(bytes),
        DataType::Json => match serde_json::from_slice(&bytes) {
            Ok(value) => Payload::Json(value),
            Err(_) => as_text(bytes),
        },
    }
}
