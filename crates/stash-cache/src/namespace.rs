//! Namespace listings and statistics.

use crate::paths::{DATA_FILES, HASH_REFS_SUFFIX, ID_REF_SUFFIX};
use crate::service::CacheService;
use crate::types::NamespaceStats;
use stash_core::{CacheHash, CacheId, HashRefs, IdRef, Namespace, Result, StoreStrategy};
use std::collections::BTreeSet;
use tracing::warn;

impl CacheService {
    /// Namespaces with at least one stored file.
    pub async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let namespaces: BTreeSet<Namespace> = self
            .provider()
            .list("")
            .await?
            .iter()
            .filter_map(|path| path.split_once('/').map(|(first, _)| first))
            .filter_map(|first| Namespace::new(first).ok())
            .collect();
        Ok(namespaces.into_iter().collect())
    }

    /// Every id with a by-id ref in the namespace, sorted.
    pub async fn file_ids(&self, namespace: &Namespace) -> Result<Vec<CacheId>> {
        let prefix = self.resolver().refs_by_id_prefix(namespace);
        let mut ids = BTreeSet::new();
        for path in self.provider().list(&prefix).await? {
            if !path.ends_with(ID_REF_SUFFIX) {
                continue;
            }
            match self.read_json::<IdRef>(&path).await {
                Ok(Some(id_ref)) => {
                    ids.insert(id_ref.cache_id);
                }
                Ok(None) => {}
                Err(e) => warn!(path = %path, error = %e, "Skipping unreadable by-id ref"),
            }
        }
        Ok(ids.into_iter().collect())
    }

    /// Every hash with a by-hash ref in the namespace, sorted.
    pub async fn file_hashes(&self, namespace: &Namespace) -> Result<Vec<CacheHash>> {
        let prefix = self.resolver().refs_by_hash_prefix(namespace);
        let mut hashes = BTreeSet::new();
        for path in self.provider().list(&prefix).await? {
            if !path.ends_with(HASH_REFS_SUFFIX) {
                continue;
            }
            match self.read_json::<HashRefs>(&path).await {
                Ok(Some(refs)) => {
                    hashes.insert(refs.cache_hash);
                }
                Ok(None) => {}
                Err(e) => warn!(path = %path, error = %e, "Skipping unreadable by-hash refs"),
            }
        }
        Ok(hashes.into_iter().collect())
    }

    /// File counts per area of a namespace.
    pub async fn stats(&self, namespace: &Namespace) -> Result<NamespaceStats> {
        let resolver = self.resolver();
        let by_hash = resolver.refs_by_hash_prefix(namespace);
        let by_id = resolver.refs_by_id_prefix(namespace);
        let files = format!("{namespace}/{DATA_FILES}/");
        let data: Vec<(StoreStrategy, String)> = StoreStrategy::ALL
            .into_iter()
            .map(|s| (s, resolver.data_prefix(namespace, s)))
            .collect();

        let mut stats = NamespaceStats {
            namespace: namespace.to_string(),
            ttl_hours: self.ttl_hours(),
            ..NamespaceStats::default()
        };
        for path in self.provider().list(&resolver.namespace_prefix(namespace)).await? {
            stats.total_files += 1;
            if path.starts_with(&by_hash) {
                stats.refs_by_hash += 1;
            } else if path.starts_with(&by_id) {
                stats.refs_by_id += 1;
            } else if path.starts_with(&files) {
                stats.data_files += 1;
            } else if let Some((strategy, _)) = data.iter().find(|(_, p)| path.starts_with(p)) {
                match strategy {
                    StoreStrategy::Direct => stats.data_direct += 1,
                    StoreStrategy::Temporal => stats.data_temporal += 1,
                    StoreStrategy::TemporalLatest => stats.data_temporal_latest += 1,
                    StoreStrategy::TemporalVersioned => stats.data_temporal_versioned += 1,
                    StoreStrategy::KeyBased => stats.data_key_based += 1,
                }
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use crate::service::test_support::{ns, service};
    use crate::types::StoreRequest;
    use stash_core::{DataFileId, Payload, StoreStrategy};

    #[tokio::test]
    async fn test_listings_are_sorted_and_unique() {
        let service = service();
        let a = service
            .store(StoreRequest::new("same").with_namespace(ns("ns1")))
            .await
            .unwrap();
        let b = service
            .store(StoreRequest::new("same").with_namespace(ns("ns1")))
            .await
            .unwrap();
        service
            .store(StoreRequest::new("other").with_namespace(ns("ns2")))
            .await
            .unwrap();

        let namespaces = service.list_namespaces().await.unwrap();
        assert_eq!(namespaces, vec![ns("ns1"), ns("ns2")]);

        let mut expected = vec![a.cache_id, b.cache_id];
        expected.sort();
        assert_eq!(service.file_ids(&ns("ns1")).await.unwrap(), expected);
        assert_eq!(
            service.file_hashes(&ns("ns1")).await.unwrap(),
            vec![a.cache_hash]
        );
        assert!(service.file_ids(&ns("empty")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stats_count_each_area() {
        let service = service();
        let namespace = ns("ns1");
        let direct = service
            .store(StoreRequest::new("d").with_namespace(namespace.clone()))
            .await
            .unwrap();
        service
            .store(
                StoreRequest::new("t")
                    .with_namespace(namespace.clone())
                    .with_strategy(StoreStrategy::Temporal),
            )
            .await
            .unwrap();
        service
            .store(
                StoreRequest::new("v")
                    .with_namespace(namespace.clone())
                    .with_strategy(StoreStrategy::TemporalVersioned),
            )
            .await
            .unwrap();
        service
            .store(
                StoreRequest::new("k")
                    .with_namespace(namespace.clone())
                    .with_cache_key("app/settings", None),
            )
            .await
            .unwrap();
        service
            .store_data_file(
                &direct.cache_id,
                &namespace,
                None,
                Some(DataFileId::new("f")),
                Payload::Text("f".into()),
            )
            .await
            .unwrap();

        let stats = service.stats(&namespace).await.unwrap();
        assert_eq!(stats.ttl_hours, 24);
        assert_eq!(stats.refs_by_hash, 4);
        assert_eq!(stats.refs_by_id, 4);
        assert_eq!(stats.data_direct, 2);
        assert_eq!(stats.data_temporal, 2);
        assert_eq!(stats.data_temporal_latest, 0);
        // data, sidecar and latest pointer
        assert_eq!(stats.data_temporal_versioned, 3);
        assert_eq!(stats.data_key_based, 2);
        assert_eq!(stats.data_files, 1);
        assert_eq!(stats.total_files, 18);
    }
}
