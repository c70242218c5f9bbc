//! Zip archives stored as cache entries.
//!
//! An archive is stored as a binary entry under any strategy. Its hash covers
//! the file names and contents in name order rather than the raw bytes, so
//! repacking the same files with other timestamps or compression keeps it.

use crate::service::CacheService;
use crate::types::{StoreRequest, ZipStoreResult};
use stash_core::{CacheId, DataType, Error, Namespace, Payload, Result};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use tracing::{debug, info};

impl CacheService {
    /// Store a zip archive after checking that it opens.
    pub async fn store_zip(&self, request: StoreRequest) -> Result<ZipStoreResult> {
        let Payload::Binary(bytes) = &request.payload else {
            return Err(Error::InvalidPayload(format!(
                "zip archives are binary data, got {}",
                request.payload.data_type()
            )));
        };
        if bytes.is_empty() {
            return Err(Error::InvalidPayload("zip bytes cannot be empty".into()));
        }
        if request.content_encoding.is_some() || request.json_field_path.is_some() {
            return Err(Error::InvalidPayload(
                "zip archives take neither a content encoding nor a json field path".into(),
            ));
        }

        let files = read_zip(bytes)?;
        let cache_hash = self.hasher().calculate(&content_digest_input(&files));
        let file_count = files.len();

        let stored = self
            .store(
                request
                    .with_data_type(DataType::Binary)
                    .with_cache_hash(cache_hash),
            )
            .await?;
        info!(
            namespace = %stored.namespace,
            cache_id = %stored.cache_id,
            file_count,
            "Stored zip archive"
        );
        Ok(ZipStoreResult { stored, file_count })
    }

    /// Sorted file names of a stored archive. `None` when the id is missing.
    pub async fn list_zip_files(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
    ) -> Result<Option<Vec<String>>> {
        let Some(entry) = self.retrieve_by_id(cache_id, namespace).await? else {
            debug!(namespace = %namespace, cache_id = %cache_id, "No zip entry");
            return Ok(None);
        };
        let Payload::Binary(bytes) = &entry.content else {
            return Err(Error::InvalidPayload(format!(
                "entry {cache_id} holds {} data, not a zip archive",
                entry.data_type
            )));
        };
        Ok(Some(read_zip(bytes)?.into_keys().collect()))
    }
}

/// Every file of an archive by name. Directory entries are skipped.
fn read_zip(bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>> {
    let invalid = |e: zip::result::ZipError| Error::InvalidPayload(format!("invalid zip archive: {e}"));
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(invalid)?;
    let mut files = BTreeMap::new();
    for index in 0..archive.len() {
        let mut file = archive.by_index(index).map_err(invalid)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut content = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut content)
            .map_err(|e| Error::InvalidPayload(format!("invalid zip archive: {name}: {e}")))?;
        files.insert(name, content);
    }
    Ok(files)
}

/// `name \0 content \0` for each file in name order.
fn content_digest_input(files: &BTreeMap<String, Vec<u8>>) -> Vec<u8> {
    let mut input = Vec::new();
    for (name, content) in files {
        input.extend_from_slice(name.as_bytes());
        input.push(0);
        input.extend_from_slice(content);
        input.push(0);
    }
    input
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::{ns, service};
    use stash_core::{DataFileId, StoreStrategy};
    use std::io::Write;
    use zip::CompressionMethod;
    use zip::write::SimpleFileOptions;

    fn zip_bytes(files: &[(&str, &[u8])], method: CompressionMethod) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(method);
        writer.add_directory("docs/", options).unwrap();
        for (name, content) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn test_store_zip_counts_files_and_keeps_bytes() {
        let service = service();
        let bytes = zip_bytes(
            &[("docs/readme.md", b"# hi"), ("data.json", b"{}")],
            CompressionMethod::Deflated,
        );
        let stored = service
            .store_zip(StoreRequest::new(bytes.clone()).with_namespace(ns("ns1")))
            .await
            .unwrap();
        assert_eq!(stored.file_count, 2);
        assert_eq!(stored.stored.data_type, DataType::Binary);
        assert_eq!(stored.stored.size, bytes.len() as u64);

        let entry = service
            .retrieve_by_id(&stored.stored.cache_id, &ns("ns1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.content, Payload::Binary(bytes));
        assert_eq!(
            service
                .list_zip_files(&stored.stored.cache_id, &ns("ns1"))
                .await
                .unwrap(),
            Some(vec!["data.json".to_string(), "docs/readme.md".to_string()])
        );
    }

    #[tokio::test]
    async fn test_zip_hash_ignores_packing() {
        let service = service();
        let deflated = zip_bytes(&[("a.txt", b"one"), ("b.txt", b"two")], CompressionMethod::Deflated);
        let stored = zip_bytes(&[("b.txt", b"two"), ("a.txt", b"one")], CompressionMethod::Stored);
        assert_ne!(deflated, stored);

        let first = service.store_zip(StoreRequest::new(deflated)).await.unwrap();
        let second = service.store_zip(StoreRequest::new(stored)).await.unwrap();
        assert_eq!(first.stored.cache_hash, second.stored.cache_hash);

        let changed = zip_bytes(&[("a.txt", b"one"), ("b.txt", b"TWO")], CompressionMethod::Stored);
        let third = service.store_zip(StoreRequest::new(changed)).await.unwrap();
        assert_ne!(first.stored.cache_hash, third.stored.cache_hash);
    }

    #[tokio::test]
    async fn test_invalid_archives_write_nothing() {
        let service = service();
        for request in [
            StoreRequest::new(Vec::<u8>::new()),
            StoreRequest::new(b"PK not really".to_vec()),
            StoreRequest::new("text"),
        ] {
            let err = service.store_zip(request).await.unwrap_err();
            assert!(matches!(err, Error::InvalidPayload(_)), "{err}");
        }
        assert!(service.provider().list("default/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zip_under_a_cache_key() {
        let service = service();
        let bytes = zip_bytes(&[("a.txt", b"one")], CompressionMethod::Deflated);
        let stored = service
            .store_zip(
                StoreRequest::new(bytes)
                    .with_cache_key("bundles/site", Some(DataFileId::new("v1"))),
            )
            .await
            .unwrap();
        assert_eq!(stored.stored.strategy, StoreStrategy::KeyBased);
        assert_eq!(stored.stored.paths.data[0], "default/data/key-based/bundles/site/v1");
    }

    #[tokio::test]
    async fn test_listing_a_non_archive_fails() {
        let service = service();
        let text = service.store(StoreRequest::new("plain")).await.unwrap();
        assert!(service
            .list_zip_files(&text.cache_id, &text.namespace)
            .await
            .is_err());
        assert_eq!(
            service
                .list_zip_files(&CacheId::new(), &text.namespace)
                .await
                .unwrap(),
            None
        );
    }
}
