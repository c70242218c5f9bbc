//! Store and retrieve integration tests.
//!
//! Run with: `cargo test -p stash-tests --test store_retrieve_tests`

use serde_json::json;
use stash_cache::StoreRequest;
use stash_core::{CacheHash, CacheId, DataType, Payload, StoreStrategy};
use stash_tests::{Backend, PayloadFixture, RequestFixture, TestContext, assert_paths_exist};

#[tokio::test]
async fn test_round_trip_every_type() {
    for ctx in TestContext::all().await.expect("Failed to create contexts") {
        for payload in PayloadFixture::all() {
            let stored = ctx
                .service
                .store(RequestFixture::direct(payload.clone(), &ctx.namespace))
                .await
                .unwrap();
            assert_eq!(stored.data_type, payload.data_type());
            assert_paths_exist(ctx.provider().as_ref(), stored.paths.all()).await;

            let by_id = ctx
                .service
                .retrieve_by_id(&stored.cache_id, &ctx.namespace)
                .await
                .unwrap()
                .expect("stored id should resolve");
            assert_eq!(by_id.content, payload, "{}", ctx.backend);
            assert_eq!(by_id.cache_hash, stored.cache_hash);

            let by_hash = ctx
                .service
                .retrieve_by_hash(&stored.cache_hash, &ctx.namespace)
                .await
                .unwrap()
                .expect("stored hash should resolve");
            assert_eq!(by_hash.cache_id, stored.cache_id, "{}", ctx.backend);
            assert_eq!(by_hash.content, payload);

            let metadata = ctx
                .service
                .retrieve_metadata(&stored.cache_id, &ctx.namespace)
                .await
                .unwrap()
                .expect("metadata sidecar");
            assert_eq!(metadata.cache_hash, stored.cache_hash);
            assert_eq!(metadata.data_type, payload.data_type());
        }
    }
}

#[tokio::test]
async fn test_same_content_shares_hash() {
    for ctx in TestContext::all().await.expect("Failed to create contexts") {
        let first = ctx
            .service
            .store(RequestFixture::direct("hello", &ctx.namespace))
            .await
            .unwrap();
        let second = ctx
            .service
            .store(RequestFixture::direct("hello", &ctx.namespace))
            .await
            .unwrap();

        assert_ne!(first.cache_id, second.cache_id);
        assert_eq!(first.cache_hash, second.cache_hash);
        assert_eq!(first.cache_hash.as_str(), "2cf24dba5fb0a30e");

        let refs = ctx
            .service
            .retrieve_refs_by_hash(&first.cache_hash, &ctx.namespace)
            .await
            .unwrap()
            .expect("hash refs");
        assert_eq!(refs.cache_ids.len(), 2, "{}", ctx.backend);

        let found = ctx
            .service
            .retrieve_by_hash(&first.cache_hash, &ctx.namespace)
            .await
            .unwrap()
            .unwrap();
        assert!([first.cache_id, second.cache_id].contains(&found.cache_id));
    }
}

#[tokio::test]
async fn test_direct_reuse_overwrites_and_unlinks_old_hash() {
    for ctx in TestContext::all().await.expect("Failed to create contexts") {
        let first = ctx
            .service
            .store(RequestFixture::direct("draft", &ctx.namespace))
            .await
            .unwrap();
        let second = ctx
            .service
            .store(RequestFixture::direct("final", &ctx.namespace).with_cache_id(first.cache_id))
            .await
            .unwrap();

        assert_eq!(second.cache_id, first.cache_id);
        assert_eq!(second.paths.data[0], first.paths.data[0]);

        let entry = ctx
            .service
            .retrieve_by_id(&first.cache_id, &ctx.namespace)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.content, Payload::Text("final".into()), "{}", ctx.backend);
        assert!(
            !ctx.service
                .exists_by_hash(&first.cache_hash, &ctx.namespace)
                .await
                .unwrap()
        );
        assert!(
            ctx.service
                .exists_by_hash(&second.cache_hash, &ctx.namespace)
                .await
                .unwrap()
        );
    }
}

#[tokio::test]
async fn test_json_field_path_hashes_one_field() {
    let ctx = TestContext::new(Backend::Sqlite).await.unwrap();
    let mut other = PayloadFixture::document();
    other["response"] = json!({"tokens": [9], "finished": false});

    let a = ctx
        .service
        .store(
            RequestFixture::direct(PayloadFixture::document(), &ctx.namespace)
                .with_json_field_path("request.id"),
        )
        .await
        .unwrap();
    let b = ctx
        .service
        .store(RequestFixture::direct(other, &ctx.namespace).with_json_field_path("request.id"))
        .await
        .unwrap();
    assert_eq!(a.cache_hash, b.cache_hash);

    let missing = ctx
        .service
        .store(
            RequestFixture::direct(PayloadFixture::document(), &ctx.namespace)
                .with_json_field_path("request.nope"),
        )
        .await;
    assert!(missing.is_err());
}

#[tokio::test]
async fn test_caller_supplied_hash_is_validated() {
    let ctx = TestContext::new(Backend::Memory).await.unwrap();
    let stored = ctx
        .service
        .store(
            RequestFixture::direct("hello", &ctx.namespace)
                .with_cache_hash(CacheHash::new("feedfacecafebeef")),
        )
        .await
        .unwrap();
    assert_eq!(stored.cache_hash.as_str(), "feedfacecafebeef");

    let bad = ctx
        .service
        .store(
            RequestFixture::direct("hello", &ctx.namespace)
                .with_cache_hash(CacheHash::new("../escape")),
        )
        .await;
    assert!(bad.is_err());
}

#[tokio::test]
async fn test_text_stored_as_binary_type() {
    for ctx in TestContext::all().await.expect("Failed to create contexts") {
        let stored = ctx
            .service
            .store(
                StoreRequest::new(Payload::Binary(b"plain".to_vec()))
                    .with_namespace(ctx.namespace.clone())
                    .with_strategy(StoreStrategy::TemporalLatest),
            )
            .await
            .unwrap();
        assert_eq!(stored.data_type, DataType::Binary);

        let entry = ctx
            .service
            .retrieve_by_id(&stored.cache_id, &ctx.namespace)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.as_bytes(), b"plain".to_vec(), "{}", ctx.backend);
        assert_eq!(entry.as_text(), "plain");
    }
}

#[tokio::test]
async fn test_exists_accepts_id_or_hash() {
    for ctx in TestContext::all().await.expect("Failed to create contexts") {
        let stored = ctx
            .service
            .store(RequestFixture::direct(PayloadFixture::json(), &ctx.namespace))
            .await
            .unwrap();

        let by_id = stored.cache_id.to_string();
        assert!(ctx.service.exists(&by_id, &ctx.namespace).await.unwrap());
        assert!(
            ctx.service
                .exists(stored.cache_hash.as_str(), &ctx.namespace)
                .await
                .unwrap()
        );
        assert!(!ctx.service.exists("0000000000000000", &ctx.namespace).await.unwrap());
        assert!(
            !ctx.service
                .exists(&CacheId::new().to_string(), &ctx.namespace)
                .await
                .unwrap(),
            "{}",
            ctx.backend
        );
    }
}

#[tokio::test]
async fn test_missing_lookups_return_none() {
    for ctx in TestContext::all().await.expect("Failed to create contexts") {
        let id = CacheId::new();
        assert!(ctx.service.retrieve_by_id(&id, &ctx.namespace).await.unwrap().is_none());
        assert!(
            ctx.service
                .retrieve_by_hash(&CacheHash::new("0123456789abcdef"), &ctx.namespace)
                .await
                .unwrap()
                .is_none()
        );
        assert!(ctx.service.retrieve_version(&id, &ctx.namespace, 1).await.unwrap().is_none());
        assert!(ctx.service.retrieve_metadata(&id, &ctx.namespace).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_durable_backends_keep_entries() {
    for backend in Backend::ALL.into_iter().filter(Backend::is_durable) {
        let ctx = TestContext::new(backend).await.unwrap();
        let stored = ctx
            .service
            .store(RequestFixture::direct(PayloadFixture::json(), &ctx.namespace))
            .await
            .unwrap();

        let reopened = ctx.reopen().unwrap();
        let entry = reopened
            .retrieve_by_hash(&stored.cache_hash, &ctx.namespace)
            .await
            .unwrap()
            .expect("entry survives reopen");
        assert_eq!(entry.content, PayloadFixture::json(), "{}", backend);
    }
}

#[tokio::test]
async fn test_namespaces_are_isolated() {
    for ctx in TestContext::all().await.expect("Failed to create contexts") {
        let other = stash_core::Namespace::new("tenant-b").unwrap();
        let id = CacheId::new();
        let a = ctx
            .service
            .store(RequestFixture::direct("same", &ctx.namespace).with_cache_id(id))
            .await
            .unwrap();
        let b = ctx
            .service
            .store(RequestFixture::direct("same", &other).with_cache_id(id))
            .await
            .unwrap();
        assert_eq!(a.cache_hash, b.cache_hash);
        assert_ne!(a.paths.data[0], b.paths.data[0]);

        ctx.service.delete_by_id(&id, &ctx.namespace).await.unwrap();
        let entry = ctx
            .service
            .retrieve_by_id(&id, &other)
            .await
            .unwrap()
            .expect("other namespace untouched");
        assert_eq!(entry.namespace, other, "{}", ctx.backend);
        assert!(ctx.service.retrieve_by_id(&id, &ctx.namespace).await.unwrap().is_none());
    }
}
