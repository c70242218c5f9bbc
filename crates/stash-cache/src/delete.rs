//! Delete orchestration.

use crate::paths::metadata_path;
use crate::service::CacheService;
use crate::store::owned_hashes;
use crate::types::DeleteReport;
use stash_core::{CacheHash, CacheId, HashRefs, IdRef, Namespace, Result, StoreStrategy};
use tracing::{debug, info, warn};

impl CacheService {
    /// Remove everything a store could have written for an id.
    ///
    /// Each path is attempted on its own. Paths that are already gone are
    /// skipped; failures are collected in the report and do not stop the
    /// remaining removals. The by-id ref goes last so a partial delete can be
    /// retried.
    pub async fn delete_by_id(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
    ) -> Result<DeleteReport> {
        let by_id_path = self.resolver().by_id_ref_path(namespace, cache_id);
        let _guard = self.lock(&by_id_path).await;
        let Some(id_ref) = self.read_json::<IdRef>(&by_id_path).await? else {
            debug!(namespace = %namespace, cache_id = %cache_id, "Nothing to delete");
            return Ok(DeleteReport::not_found(*cache_id, namespace.clone()));
        };

        let mut report = DeleteReport::success(*cache_id, namespace.clone());

        for data_path in id_ref.data_paths() {
            self.remove(&mut report, data_path).await;
            self.remove(&mut report, &metadata_path(data_path)).await;
        }

        // Pointers of every strategy, in case the id switched strategy.
        for strategy in StoreStrategy::ALL {
            if let Some(latest_path) = self.resolver().latest_path(namespace, strategy, cache_id) {
                self.remove(&mut report, &latest_path).await;
            }
        }

        // Versions claimed by stores that never reached the ref, then child files.
        let versions_prefix = self.resolver().versions_prefix(namespace, cache_id);
        self.remove_listed(&mut report, &versions_prefix).await;
        let files_prefix = self.resolver().data_files_prefix(namespace, cache_id);
        self.remove_listed(&mut report, &files_prefix).await;

        for hash in owned_hashes(id_ref.hashes()) {
            self.detach_hash(&mut report, namespace, &hash, cache_id).await;
        }

        self.remove(&mut report, &by_id_path).await;

        if report.failed_count > 0 {
            warn!(
                namespace = %namespace,
                cache_id = %cache_id,
                failed = report.failed_count,
                "Delete left paths behind"
            );
        }
        info!(
            namespace = %namespace,
            cache_id = %cache_id,
            deleted = report.deleted_count,
            "Deleted cache entry"
        );
        Ok(report)
    }

    pub(crate) async fn remove(&self, report: &mut DeleteReport, path: &str) {
        match self.provider().delete(path).await {
            Ok(true) => report.record_deleted(path),
            Ok(false) => {}
            Err(e) => {
                warn!(path = %path, error = %e, "Delete failed");
                report.record_failed(path);
            }
        }
    }

    /// Remove every path under `prefix`.
    async fn remove_listed(&self, report: &mut DeleteReport, prefix: &str) {
        match self.provider().list(prefix).await {
            Ok(paths) => {
                for path in paths {
                    self.remove(report, &path).await;
                }
            }
            Err(e) => {
                warn!(path = %prefix, error = %e, "Could not list paths to delete");
                report.record_failed(prefix);
            }
        }
    }

    /// Drop the id from one hash's refs, removing the file once it is empty.
    async fn detach_hash(
        &self,
        report: &mut DeleteReport,
        namespace: &Namespace,
        cache_hash: &CacheHash,
        cache_id: &CacheId,
    ) {
        let path = match self.resolver().by_hash_ref_path(namespace, cache_hash) {
            Ok(path) => path,
            Err(e) => {
                warn!(cache_hash = %cache_hash, error = %e, "Unusable hash in by-id ref");
                report.record_failed(cache_hash.as_str());
                return;
            }
        };

        let _guard = self.lock(&path).await;
        let mut refs = match self.read_json::<HashRefs>(&path).await {
            Ok(Some(refs)) => refs,
            Ok(None) => return,
            Err(e) => {
                warn!(path = %path, error = %e, "Unreadable by-hash refs");
                report.record_failed(path);
                return;
            }
        };
        if !refs.unlink(cache_id) {
            return;
        }
        if refs.is_empty() {
            self.remove(report, &path).await;
        } else if let Err(e) = self.write_json(&path, &refs).await {
            warn!(path = %path, error = %e, "Could not rewrite by-hash refs");
            report.record_failed(path);
        }
    }
}
