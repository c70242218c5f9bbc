//! Cache requests and results.

use crate::compression;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use stash_core::{
    CacheHash, CacheId, ContentEncoding, DataFileId, DataKey, DataType, EntryMetadata, Namespace,
    Payload, Result, StoreStrategy,
};

/// Request to store a payload.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    pub payload: Payload,
    /// Stored type; defaults to the payload's own type.
    pub data_type: Option<DataType>,
    pub namespace: Namespace,
    pub strategy: StoreStrategy,
    /// Reuse an id (overwrite under `direct`, new history otherwise).
    pub cache_id: Option<CacheId>,
    /// Accept a caller-computed hash instead of hashing the payload.
    pub cache_hash: Option<CacheHash>,
    /// Encoding already applied to a binary payload.
    pub content_encoding: Option<ContentEncoding>,
    /// Hash only this dot-separated field of a JSON payload.
    pub json_field_path: Option<String>,
    /// Folder path of a `key_based` store.
    pub cache_key: Option<DataKey>,
    /// Final segment of a `key_based` store; defaults to the cache id.
    pub file_id: Option<DataFileId>,
}

impl StoreRequest {
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self {
            payload: payload.into(),
            data_type: None,
            namespace: Namespace::default(),
            strategy: StoreStrategy::default(),
            cache_id: None,
            cache_hash: None,
            content_encoding: None,
            json_field_path: None,
            cache_key: None,
            file_id: None,
        }
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_strategy(mut self, strategy: StoreStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_cache_id(mut self, cache_id: CacheId) -> Self {
        self.cache_id = Some(cache_id);
        self
    }

    pub fn with_cache_hash(mut self, cache_hash: CacheHash) -> Self {
        self.cache_hash = Some(cache_hash);
        self
    }

    pub fn with_content_encoding(mut self, encoding: ContentEncoding) -> Self {
        self.content_encoding = Some(encoding);
        self
    }

    pub fn with_json_field_path(mut self, field_path: impl Into<String>) -> Self {
        self.json_field_path = Some(field_path.into());
        self
    }

    /// Place the entry at `<cache_key>/<file_id>` under the `key_based` strategy.
    pub fn with_cache_key(mut self, cache_key: impl Into<DataKey>, file_id: Option<DataFileId>) -> Self {
        self.strategy = StoreStrategy::KeyBased;
        self.cache_key = Some(cache_key.into());
        self.file_id = file_id;
        self
    }
}

/// Paths written by a store, grouped by role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPaths {
    /// Data file, metadata sidecar and latest pointer.
    pub data: Vec<String>,
    pub by_hash: Vec<String>,
    pub by_id: Vec<String>,
}

impl StoredPaths {
    pub fn all(&self) -> Vec<&str> {
        self.data
            .iter()
            .chain(&self.by_hash)
            .chain(&self.by_id)
            .map(String::as_str)
            .collect()
    }
}

/// Summary of a completed store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreResult {
    pub cache_id: CacheId,
    pub cache_hash: CacheHash,
    pub namespace: Namespace,
    pub strategy: StoreStrategy,
    pub data_type: DataType,
    pub paths: StoredPaths,
    /// Bytes written to the data path.
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub stored_at: DateTime<Utc>,
}

/// Summary of a stored zip archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZipStoreResult {
    #[serde(flatten)]
    pub stored: StoreResult,
    /// Files in the archive, directories excluded.
    pub file_count: usize,
}

/// An entry loaded from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry {
    pub cache_id: CacheId,
    pub cache_hash: CacheHash,
    pub namespace: Namespace,
    pub strategy: StoreStrategy,
    pub data_type: DataType,
    pub data_path: String,
    pub content: Payload,
    /// `None` when the sidecar is missing or unreadable.
    pub metadata: Option<EntryMetadata>,
    pub content_encoding: Option<ContentEncoding>,
    pub version: Option<u32>,
}

impl CachedEntry {
    pub fn size(&self) -> u64 {
        match &self.content {
            Payload::Text(s) => s.len() as u64,
            Payload::Json(v) => v.to_string().len() as u64,
            Payload::Binary(b) => b.len() as u64,
        }
    }

    /// Content as text. Binary that is not UTF-8 comes back base64-encoded.
    pub fn as_text(&self) -> String {
        match &self.content {
            Payload::Text(s) => s.clone(),
            Payload::Json(v) => v.to_string(),
            Payload::Binary(b) => match std::str::from_utf8(b) {
                Ok(s) => s.to_string(),
                Err(_) => BASE64.encode(b),
            },
        }
    }

    /// Content as JSON. Values that do not parse are wrapped rather than rejected.
    pub fn as_json(&self) -> Value {
        match &self.content {
            Payload::Json(v) => v.clone(),
            Payload::Text(s) => serde_json::from_str(s).unwrap_or_else(|_| {
                json!({
                    "error": "Data is not valid JSON",
                    "data": s,
                })
            }),
            Payload::Binary(b) => serde_json::from_slice(b).unwrap_or_else(|_| {
                json!({
                    "data_type": "binary",
                    "encoding": "base64",
                    "data": BASE64.encode(b),
                })
            }),
        }
    }

    /// Content as bytes, exactly as stored.
    pub fn as_bytes(&self) -> Vec<u8> {
        match &self.content {
            Payload::Text(s) => s.as_bytes().to_vec(),
            Payload::Json(v) => v.to_string().into_bytes(),
            Payload::Binary(b) => b.clone(),
        }
    }

    /// Content as bytes with any content encoding undone.
    pub fn decoded_bytes(&self) -> Result<Vec<u8>> {
        match (self.content_encoding, &self.content) {
            (Some(encoding), Payload::Binary(b)) => compression::decode(b, encoding),
            _ => Ok(self.as_bytes()),
        }
    }

    /// Content coerced to a requested data type.
    pub fn coerce(&self, data_type: DataType) -> Payload {
        match data_type {
            DataType::String => Payload::Text(self.as_text()),
            DataType::Json => Payload::Json(self.as_json()),
            DataType::Binary => Payload::Binary(self.as_bytes()),
        }
    }

    /// Where a type-specific binary download of this entry lives.
    pub fn binary_url(&self) -> String {
        format!("/{}/retrieve/{}/binary", self.namespace, self.cache_id)
    }

    /// Type-agnostic structured view. Binary content is never embedded;
    /// it is reported as a pointer to [`CachedEntry::binary_url`].
    pub fn to_response(&self) -> Value {
        let metadata = self
            .metadata
            .as_ref()
            .and_then(|m| serde_json::to_value(m).ok())
            .unwrap_or(Value::Null);
        match &self.content {
            Payload::Binary(_) => json!({
                "status": "binary_data",
                "message": "Binary data cannot be returned in JSON response",
                "data_type": "binary",
                "size": self.size(),
                "metadata": metadata,
                "binary_url": self.binary_url(),
            }),
            Payload::Text(s) => json!({
                "data": s,
                "data_type": "string",
                "metadata": metadata,
            }),
            Payload::Json(v) => json!({
                "data": v,
                "data_type": "json",
                "metadata": metadata,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStatus {
    Success,
    NotFound,
}

/// Per-path outcome of a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub status: DeleteStatus,
    pub cache_id: CacheId,
    pub namespace: Namespace,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub deleted_count: usize,
    pub failed_count: usize,
    pub deleted_paths: Vec<String>,
    pub failed_paths: Vec<String>,
}

impl DeleteReport {
    pub fn success(cache_id: CacheId, namespace: Namespace) -> Self {
        Self {
            status: DeleteStatus::Success,
            cache_id,
            namespace,
            message: None,
            deleted_count: 0,
            failed_count: 0,
            deleted_paths: vec![],
            failed_paths: vec![],
        }
    }

    pub fn not_found(cache_id: CacheId, namespace: Namespace) -> Self {
        Self {
            status: DeleteStatus::NotFound,
            message: Some(format!("Cache ID {cache_id} not found")),
            ..Self::success(cache_id, namespace)
        }
    }

    pub fn record_deleted(&mut self, path: impl Into<String>) {
        self.deleted_paths.push(path.into());
        self.deleted_count = self.deleted_paths.len();
    }

    pub fn record_failed(&mut self, path: impl Into<String>) {
        self.failed_paths.push(path.into());
        self.failed_count = self.failed_paths.len();
    }

    pub fn is_success(&self) -> bool {
        self.status == DeleteStatus::Success
    }
}

/// A child data file attached to an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFileRef {
    pub cache_id: CacheId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_key: Option<DataKey>,
    pub file_id: DataFileId,
    pub data_type: DataType,
    pub path: String,
}

/// A child data file with its content.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFile {
    pub reference: DataFileRef,
    pub content: Payload,
}

/// File counts for one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub namespace: String,
    pub ttl_hours: u32,
    pub refs_by_hash: usize,
    pub refs_by_id: usize,
    pub data_direct: usize,
    pub data_temporal: usize,
    pub data_temporal_latest: usize,
    pub data_temporal_versioned: usize,
    #[serde(default)]
    pub data_key_based: usize,
    pub data_files: usize,
    pub total_files: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(content: Payload) -> CachedEntry {
        CachedEntry {
            cache_id: CacheId::new(),
            cache_hash: CacheHash::new("2cf24dba5fb0a30e"),
            namespace: Namespace::new("ns1").unwrap(),
            strategy: StoreStrategy::Direct,
            data_type: content.data_type(),
            data_path: "ns1/data/direct/x".into(),
            content,
            metadata: None,
            content_encoding: None,
            version: None,
        }
    }

    #[test]
    fn test_binary_as_text_falls_back_to_base64() {
        let e = entry(Payload::Binary(vec![0x00, 0x01]));
        assert_eq!(e.as_text(), "AAE=");
        assert_eq!(e.as_bytes(), vec![0x00, 0x01]);

        let utf8 = entry(Payload::Binary(b"plain".to_vec()));
        assert_eq!(utf8.as_text(), "plain");
    }

    #[test]
    fn test_as_json_wraps_invalid_values() {
        let text = entry(Payload::Text("not json".into()));
        assert_eq!(text.as_json()["error"], "Data is not valid JSON");
        assert_eq!(text.as_json()["data"], "not json");

        let parsed = entry(Payload::Text(r#"{"a":1}"#.into()));
        assert_eq!(parsed.as_json(), json!({"a": 1}));

        let binary = entry(Payload::Binary(vec![0xff]));
        assert_eq!(binary.as_json()["encoding"], "base64");
    }

    #[test]
    fn test_generic_response_points_at_binary_url() {
        let e = entry(Payload::Binary(vec![0, 1, 2, 3, 4, 5]));
        let response = e.to_response();
        assert_eq!(response["status"], "binary_data");
        assert_eq!(response["size"], 6);
        assert_eq!(
            response["binary_url"],
            format!("/ns1/retrieve/{}/binary", e.cache_id)
        );
        assert!(response.get("data").is_none());

        let text = entry(Payload::Text("hello".into())).to_response();
        assert_eq!(text["data"], "hello");
    }

    #[test]
    fn test_delete_report_counts() {
        let mut report = DeleteReport::success(CacheId::new(), Namespace::default());
        report.record_deleted("a");
        report.record_deleted("b");
        report.record_failed("c");
        assert_eq!((report.deleted_count, report.failed_count), (2, 1));

        let missing = DeleteReport::not_found(CacheId::new(), Namespace::default());
        assert_eq!(missing.status, DeleteStatus::NotFound);
        assert_eq!(missing.deleted_count, 0);
        assert!(missing.message.unwrap().starts_with("Cache ID "));
    }

    #[test]
    fn test_decoded_bytes_undoes_encoding() {
        let original = b"compress me ".repeat(20);
        let encoded = compression::encode(&original, ContentEncoding::Gzip).unwrap();
        let mut e = entry(Payload::Binary(encoded));
        e.content_encoding = Some(ContentEncoding::Gzip);
        assert_eq!(e.decoded_bytes().unwrap(), original);
    }
}
