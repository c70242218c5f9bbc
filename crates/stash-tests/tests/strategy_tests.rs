//! Storage strategy integration tests.
//!
//! Run with: `cargo test -p stash-tests --test strategy_tests`

use futures::future::join_all;
use serde_json::json;
use stash_core::{CacheId, DataFileId, DataKey, Payload, StoreStrategy};
use stash_tests::{Backend, RequestFixture, TestContext, assert_paths_exist};

#[tokio::test]
async fn test_temporal_keeps_every_copy() {
    for ctx in TestContext::all().await.expect("Failed to create contexts") {
        let first = ctx
            .service
            .store(RequestFixture::with_strategy("one", &ctx.namespace, StoreStrategy::Temporal))
            .await
            .unwrap();
        let second = ctx
            .service
            .store(
                RequestFixture::with_strategy("two", &ctx.namespace, StoreStrategy::Temporal)
                    .with_cache_id(first.cache_id),
            )
            .await
            .unwrap();
        assert_ne!(first.paths.data[0], second.paths.data[0]);
        assert_paths_exist(ctx.provider().as_ref(), first.paths.data.iter().map(String::as_str))
            .await;

        let id_ref = ctx
            .service
            .retrieve_refs_by_id(&first.cache_id, &ctx.namespace)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(id_ref.history.len(), 2, "{}", ctx.backend);
        assert_eq!(id_ref.cache_hash, second.cache_hash);

        let current = ctx
            .service
            .retrieve_by_id(&first.cache_id, &ctx.namespace)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.content, Payload::Text("two".into()));

        // The older hash still reaches the older copy.
        let older = ctx
            .service
            .retrieve_by_hash(&first.cache_hash, &ctx.namespace)
            .await
            .unwrap()
            .expect("older hash resolves");
        assert_eq!(older.cache_id, first.cache_id);
        assert_eq!(older.content, Payload::Text("one".into()), "{}", ctx.backend);
    }
}

#[tokio::test]
async fn test_temporal_latest_writes_pointer() {
    for ctx in TestContext::all().await.expect("Failed to create contexts") {
        let first = ctx
            .service
            .store(RequestFixture::with_strategy(
                "alpha",
                &ctx.namespace,
                StoreStrategy::TemporalLatest,
            ))
            .await
            .unwrap();
        assert_eq!(first.paths.data.len(), 3);
        assert_paths_exist(ctx.provider().as_ref(), first.paths.all()).await;

        let second = ctx
            .service
            .store(
                RequestFixture::with_strategy("beta", &ctx.namespace, StoreStrategy::TemporalLatest)
                    .with_cache_id(first.cache_id),
            )
            .await
            .unwrap();
        // One pointer per id, rewritten in place.
        assert_eq!(first.paths.data[2], second.paths.data[2]);

        let entry = ctx
            .service
            .retrieve_by_id(&first.cache_id, &ctx.namespace)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.content, Payload::Text("beta".into()), "{}", ctx.backend);
        assert_eq!(entry.data_path, second.paths.data[0]);
    }
}

#[tokio::test]
async fn test_key_based_paths_follow_the_key() {
    for ctx in TestContext::all().await.expect("Failed to create contexts") {
        let sales = ctx
            .service
            .store(RequestFixture::keyed(
                json!({"revenue": 1250000}),
                &ctx.namespace,
                "reports/2025/q1",
                "sales",
            ))
            .await
            .unwrap();
        ctx.service
            .store(RequestFixture::keyed(
                json!({"active": 89340}),
                &ctx.namespace,
                "reports/2025/q1",
                "users",
            ))
            .await
            .unwrap();
        assert_eq!(
            sales.paths.data[0],
            format!("{}/data/key-based/reports/2025/q1/sales", ctx.namespace)
        );
        assert_paths_exist(ctx.provider().as_ref(), sales.paths.all()).await;

        let listed = ctx
            .provider()
            .list(&format!("{}/data/key-based/reports/2025/q1/", ctx.namespace))
            .await
            .unwrap();
        assert_eq!(listed.len(), 4, "{}", ctx.backend);

        let entry = ctx
            .service
            .retrieve_by_key(
                &DataKey::new("reports/2025/q1"),
                &DataFileId::new("sales"),
                &ctx.namespace,
            )
            .await
            .unwrap()
            .expect("key resolves");
        assert_eq!(entry.cache_id, sales.cache_id);
        assert_eq!(entry.content, Payload::Json(json!({"revenue": 1250000})));
    }
}

#[tokio::test]
async fn test_versioned_numbers_and_lookup() {
    for ctx in TestContext::all().await.expect("Failed to create contexts") {
        let id = CacheId::new();
        for (i, value) in ["v1", "v2", "v3"].into_iter().enumerate() {
            let stored = ctx
                .service
                .store(
                    RequestFixture::with_strategy(
                        value,
                        &ctx.namespace,
                        StoreStrategy::TemporalVersioned,
                    )
                    .with_cache_id(id),
                )
                .await
                .unwrap();
            assert_eq!(stored.version, Some(i as u32 + 1), "{}", ctx.backend);
        }

        let second = ctx
            .service
            .retrieve_version(&id, &ctx.namespace, 2)
            .await
            .unwrap()
            .expect("version 2");
        assert_eq!(second.content, Payload::Text("v2".into()));
        assert_eq!(second.version, Some(2));

        let current = ctx
            .service
            .retrieve_by_id(&id, &ctx.namespace)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.content, Payload::Text("v3".into()));
        assert_eq!(current.version, Some(3));

        assert!(
            ctx.service
                .retrieve_version(&id, &ctx.namespace, 9)
                .await
                .unwrap()
                .is_none()
        );

        let id_ref = ctx
            .service
            .retrieve_refs_by_id(&id, &ctx.namespace)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(id_ref.versions(), vec![1, 2, 3]);
    }
}

#[tokio::test]
async fn test_concurrent_versioned_stores_get_distinct_versions() {
    for ctx in TestContext::all().await.expect("Failed to create contexts") {
        let id = CacheId::new();
        let stores = (0..8).map(|i| {
            ctx.service.store(
                RequestFixture::with_strategy(
                    format!("payload-{i}"),
                    &ctx.namespace,
                    StoreStrategy::TemporalVersioned,
                )
                .with_cache_id(id),
            )
        });

        let mut versions: Vec<u32> = join_all(stores)
            .await
            .into_iter()
            .map(|r| r.unwrap().version.unwrap())
            .collect();
        versions.sort_unstable();
        assert_eq!(versions, (1..=8).collect::<Vec<_>>(), "{}", ctx.backend);
    }
}

#[tokio::test]
async fn test_update_rewrites_current_content() {
    for ctx in TestContext::all().await.expect("Failed to create contexts") {
        let stored = ctx
            .service
            .store(RequestFixture::direct("before", &ctx.namespace))
            .await
            .unwrap();

        let updated = ctx
            .service
            .update_by_id(&stored.cache_id, &ctx.namespace, "after")
            .await
            .unwrap()
            .expect("id exists");
        assert_eq!(updated.cache_id, stored.cache_id);
        assert_ne!(updated.cache_hash, stored.cache_hash);
        assert_eq!(updated.paths.data[0], stored.paths.data[0]);

        let entry = ctx
            .service
            .retrieve_by_hash(&updated.cache_hash, &ctx.namespace)
            .await
            .unwrap()
            .expect("new hash resolves");
        assert_eq!(entry.content, Payload::Text("after".into()), "{}", ctx.backend);
        assert!(
            ctx.service
                .retrieve_by_hash(&stored.cache_hash, &ctx.namespace)
                .await
                .unwrap()
                .is_none()
        );

        let missing = ctx
            .service
            .update_by_id(&CacheId::new(), &ctx.namespace, "nothing")
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}

#[tokio::test]
async fn test_stats_count_each_area() {
    let ctx = TestContext::new(Backend::LocalDisk).await.unwrap();
    for strategy in StoreStrategy::ALL {
        ctx.service
            .store(RequestFixture::with_strategy(
                format!("{strategy}"),
                &ctx.namespace,
                strategy,
            ))
            .await
            .unwrap();
    }

    let stats = ctx.service.stats(&ctx.namespace).await.unwrap();
    assert_eq!(stats.refs_by_id, 5);
    assert_eq!(stats.refs_by_hash, 5);
    assert_eq!(stats.data_direct, 2);
    assert_eq!(stats.data_temporal, 2);
    // Data, sidecar and pointer.
    assert_eq!(stats.data_temporal_latest, 3);
    assert_eq!(stats.data_temporal_versioned, 3);
    assert_eq!(stats.data_key_based, 2);
    assert_eq!(stats.total_files, 22);

    let namespaces = ctx.service.list_namespaces().await.unwrap();
    assert_eq!(namespaces, vec![ctx.namespace.clone()]);
}
