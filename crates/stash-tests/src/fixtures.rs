//! Sample payloads and requests.

use serde_json::{Value, json};
use stash_cache::StoreRequest;
use stash_core::{DataFileId, Namespace, Payload, StoreStrategy};

/// Factory for test payloads.
pub struct PayloadFixture;

impl PayloadFixture {
    pub fn text() -> Payload {
        Payload::Text("hello".to_string())
    }

    /// Nested document with a stable `request.id` field.
    pub fn document() -> Value {
        json!({
            "request": {"id": "req-42", "model": "small"},
            "response": {"tokens": [1, 2, 3], "finished": true},
        })
    }

    pub fn json() -> Payload {
        Payload::Json(Self::document())
    }

    /// Bytes that are neither UTF-8 nor JSON.
    pub fn binary() -> Payload {
        Payload::Binary(vec![0x00, 0x9f, 0x92, 0x96, 0xff, 0x10])
    }

    pub fn all() -> Vec<Payload> {
        vec![Self::text(), Self::json(), Self::binary()]
    }
}

/// Factory for store requests.
pub struct RequestFixture;

impl RequestFixture {
    pub fn direct(payload: impl Into<Payload>, namespace: &Namespace) -> StoreRequest {
        StoreRequest::new(payload).with_namespace(namespace.clone())
    }

    pub fn with_strategy(
        payload: impl Into<Payload>,
        namespace: &Namespace,
        strategy: StoreStrategy,
    ) -> StoreRequest {
        Self::direct(payload, namespace).with_strategy(strategy)
    }

    /// `key_based` store at `<cache_key>/<file_id>`.
    pub fn keyed(
        payload: impl Into<Payload>,
        namespace: &Namespace,
        cache_key: &str,
        file_id: &str,
    ) -> StoreRequest {
        Self::direct(payload, namespace).with_cache_key(cache_key, Some(DataFileId::new(file_id)))
    }
}
