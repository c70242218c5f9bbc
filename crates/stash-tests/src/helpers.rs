//! Assertions over what a backend actually holds.

use stash_cache::StorageProvider;
use stash_core::Namespace;

/// Every path currently stored under a namespace.
pub async fn namespace_paths(
    provider: &dyn StorageProvider,
    namespace: &Namespace,
) -> anyhow::Result<Vec<String>> {
    Ok(provider.list(&format!("{namespace}/")).await?)
}

/// Assert that a namespace holds nothing at all.
pub async fn assert_namespace_empty(provider: &dyn StorageProvider, namespace: &Namespace) {
    let paths = namespace_paths(provider, namespace)
        .await
        .expect("listing failed");
    assert!(
        paths.is_empty(),
        "{} still holds {:?} in {}",
        provider.name(),
        paths,
        namespace
    );
}

/// Assert that every path exists on the backend.
pub async fn assert_paths_exist<'a>(
    provider: &dyn StorageProvider,
    paths: impl IntoIterator<Item = &'a str>,
) {
    for path in paths {
        assert!(
            provider.exists(path).await.expect("exists failed"),
            "{} is missing {}",
            provider.name(),
            path
        );
    }
}
