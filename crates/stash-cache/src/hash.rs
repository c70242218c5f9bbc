//! Content hashing.

use crate::config::{HashAlgorithm, HashConfig};
use serde_json::Value;
use sha2::{Digest, Sha256, Sha384, Sha512};
use stash_core::{CacheHash, DataType, Error, Payload, Result};

/// Deterministic, truncated content hashes.
#[derive(Debug, Clone, Copy)]
pub struct HashGenerator {
    config: HashConfig,
}

impl Default for HashGenerator {
    fn default() -> Self {
        Self {
            config: HashConfig::default(),
        }
    }
}

impl HashGenerator {
    pub fn new(config: HashConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &HashConfig {
        &self.config
    }

    /// Hash raw bytes.
    pub fn calculate(&self, data: &[u8]) -> CacheHash {
        let full = match self.config.algorithm {
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
            HashAlgorithm::Sha384 => hex::encode(Sha384::digest(data)),
            HashAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
        };
        CacheHash::new(&full[..self.config.length])
    }

    pub fn from_text(&self, data: &str) -> CacheHash {
        self.calculate(data.as_bytes())
    }

    /// Hash the canonical form of a JSON value.
    pub fn from_json(&self, value: &Value) -> CacheHash {
        self.from_text(&canonical_json(value))
    }

    /// Hash a payload interpreted as `data_type`.
    pub fn hash(&self, payload: &Payload, data_type: DataType) -> Result<CacheHash> {
        match (data_type, payload) {
            (DataType::Binary, Payload::Binary(b)) => Ok(self.calculate(b)),
            (DataType::Binary, other) => Err(Error::InvalidPayload(format!(
                "binary data required, got {}",
                other.data_type()
            ))),
            (DataType::String, Payload::Text(s)) => Ok(self.from_text(s)),
            (DataType::String, Payload::Json(v)) => Ok(self.from_text(&canonical_json(v))),
            (DataType::String, Payload::Binary(b)) => std::str::from_utf8(b)
                .map(|s| self.from_text(s))
                .map_err(|e| Error::InvalidPayload(format!("string payload is not UTF-8: {e}"))),
            (DataType::Json, Payload::Json(v)) => Ok(self.from_json(v)),
            (DataType::Json, Payload::Text(s)) => serde_json::from_str::<Value>(s)
                .map(|v| self.from_json(&v))
                .map_err(|e| Error::InvalidPayload(format!("json payload does not parse: {e}"))),
            (DataType::Json, Payload::Binary(b)) => serde_json::from_slice::<Value>(b)
                .map(|v| self.from_json(&v))
                .map_err(|e| Error::InvalidPayload(format!("json payload does not parse: {e}"))),
        }
    }

    /// Hash only the value found at a dot-separated field path.
    pub fn hash_json_field(&self, value: &Value, field_path: &str) -> Result<CacheHash> {
        let field = extract_field(value, field_path).ok_or_else(|| {
            Error::InvalidPayload(format!("Field '{field_path}' not found in data"))
        })?;
        match field {
            Value::String(s) => Ok(self.from_text(s)),
            Value::Number(n) => Ok(self.from_text(&n.to_string())),
            Value::Bool(b) => Ok(self.from_text(&b.to_string())),
            Value::Object(_) | Value::Array(_) => Ok(self.from_json(field)),
            Value::Null => Err(Error::InvalidPayload(format!(
                "Field '{field_path}' is null"
            ))),
        }
    }

    /// Hash a JSON object with some top-level fields left out.
    pub fn hash_json_excluding(&self, value: &Value, exclude: &[&str]) -> CacheHash {
        match value {
            Value::Object(map) => {
                let kept: serde_json::Map<String, Value> = map
                    .iter()
                    .filter(|(k, _)| !exclude.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                self.from_json(&Value::Object(kept))
            }
            other => self.from_json(other),
        }
    }
}

fn extract_field<'a>(value: &'a Value, field_path: &str) -> Option<&'a Value> {
    if field_path.is_empty() {
        return None;
    }
    field_path
        .split('.')
        .try_fold(value, |current, part| current.as_object()?.get(part))
}

/// Compact JSON with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_known_sha256_prefix() {
        let hasher = HashGenerator::default();
        assert_eq!(hasher.from_text("hello").as_str(), "2cf24dba5fb0a30e");
    }

    #[test]
    fn test_length_is_configurable() {
        let hasher = HashGenerator::new(HashConfig {
            algorithm: HashAlgorithm::Sha512,
            length: 40,
        })
        .unwrap();
        assert_eq!(hasher.from_text("hello").as_str().len(), 40);
    }

    #[test]
    fn test_json_formatting_does_not_matter() {
        let hasher = HashGenerator::default();
        let compact: Value = serde_json::from_str(r#"{"a":1}"#).unwrap();
        let spaced: Value = serde_json::from_str(r#"{ "a" : 1 }"#).unwrap();
        assert_eq!(hasher.from_json(&compact), hasher.from_json(&spaced));

        let ordered = json!({"a": 1, "b": {"x": true, "y": [1, 2]}});
        let reordered: Value =
            serde_json::from_str(r#"{"b": {"y": [1, 2], "x": true}, "a": 1}"#).unwrap();
        assert_eq!(hasher.from_json(&ordered), hasher.from_json(&reordered));
    }

    #[test]
    fn test_canonical_json_shape() {
        let value = json!({"b": 1, "a": {"d": "x", "c": null}});
        assert_eq!(canonical_json(&value), r#"{"a":{"c":null,"d":"x"},"b":1}"#);
    }

    #[test]
    fn test_binary_requires_bytes() {
        let hasher = HashGenerator::default();
        let err = hasher
            .hash(&Payload::Text("hello".into()), DataType::Binary)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPayload(_)));
        assert!(hasher.hash(&Payload::Binary(vec![0, 1]), DataType::Binary).is_ok());
    }

    #[test]
    fn test_cross_type_interpretation() {
        let hasher = HashGenerator::default();
        let as_text = hasher
            .hash(&Payload::Binary(b"hello".to_vec()), DataType::String)
            .unwrap();
        assert_eq!(as_text, hasher.from_text("hello"));

        let as_json = hasher
            .hash(&Payload::Text(r#"{"a": 1}"#.into()), DataType::Json)
            .unwrap();
        assert_eq!(as_json, hasher.from_json(&json!({"a": 1})));

        assert!(hasher
            .hash(&Payload::Binary(vec![0xff]), DataType::String)
            .is_err());
    }

    #[test]
    fn test_json_field_hashing() {
        let hasher = HashGenerator::default();
        let doc = json!({"user": {"id": "u-1", "age": 30, "tags": ["a"]}, "noise": 1});

        assert_eq!(
            hasher.hash_json_field(&doc, "user.id").unwrap(),
            hasher.from_text("u-1")
        );
        assert_eq!(
            hasher.hash_json_field(&doc, "user.age").unwrap(),
            hasher.from_text("30")
        );
        assert!(hasher.hash_json_field(&doc, "user.missing").is_err());
        assert!(hasher.hash_json_field(&doc, "noise.deeper").is_err());
    }

    #[test]
    fn test_excluding_fields() {
        let hasher = HashGenerator::default();
        let a = json!({"body": "x", "timestamp": 1});
        let b = json!({"body": "x", "timestamp": 2});
        assert_eq!(
            hasher.hash_json_excluding(&a, &["timestamp"]),
            hasher.hash_json_excluding(&b, &["timestamp"])
        );
        assert_ne!(hasher.from_json(&a), hasher.from_json(&b));
    }

    proptest! {
        #[test]
        fn prop_hash_is_deterministic(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let hasher = HashGenerator::default();
            let first = hasher.calculate(&data);
            prop_assert_eq!(first.as_str().len(), 16);
            prop_assert_eq!(first, hasher.calculate(&data));
        }
    }
}
