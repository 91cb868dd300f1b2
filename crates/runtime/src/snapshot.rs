//! Read-through cache of remote datasets on local disk.
//!
//! Each dataset is downloaded at most once per process. Concurrent callers for
//! the same uncached dataset share one in-flight fetch; unrelated datasets
//! fetch in parallel. Entries are never invalidated.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ghgp_error::{GhgpError, Result};
use moka::future::Cache;
use tracing::{debug, error, info};

use crate::catalog::{Catalog, Dataset};
use crate::remote::RemoteStore;

// Above the number of datasets in the catalog; entries are never evicted.
const MAX_DATASETS: u64 = 16;

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotCounts {
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
struct SnapshotStats {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    failures: AtomicU64,
}

struct Inner {
    catalog: Catalog,
    remote: Arc<dyn RemoteStore>,
    fetch_timeout: Duration,
    entries: Cache<&'static str, PathBuf>,
    stats: SnapshotStats,
}

#[derive(Clone)]
pub struct SnapshotCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCache")
            .field("catalog", &self.inner.catalog)
            .field("remote", &self.inner.remote)
            .field("counts", &self.counts())
            .finish()
    }
}

impl SnapshotCache {
    pub fn new(catalog: Catalog, remote: Arc<dyn RemoteStore>, fetch_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog,
                remote,
                fetch_timeout,
                entries: Cache::builder().max_capacity(MAX_DATASETS).build(),
                stats: SnapshotStats::default(),
            }),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.inner.remote
    }

    pub fn counts(&self) -> SnapshotCounts {
        let stats = &self.inner.stats;
        SnapshotCounts {
            hits: stats.hits.load(Ordering::Relaxed),
            misses: stats.misses.load(Ordering::Relaxed),
            fetches: stats.fetches.load(Ordering::Relaxed),
            failures: stats.failures.load(Ordering::Relaxed),
        }
    }

    /// Local path recorded for `dataset`, without triggering a fetch.
    pub async fn cached_path(&self, dataset: Dataset) -> Option<PathBuf> {
        self.inner.entries.get(dataset.name()).await
    }

    /// Local path of `dataset`, fetching it on first reference.
    pub async fn acquire(&self, dataset: impl Into<Dataset>) -> Result<PathBuf> {
        let dataset = dataset.into();
        let name = dataset.name();

        if let Some(path) = self.inner.entries.get(name).await {
            self.inner.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(path);
        }

        // try_get_with runs one init per key; other callers wait on it and a
        // failed init is not cached.
        let inner = self.inner.clone();
        self.inner
            .entries
            .try_get_with(name, async move {
                inner.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(target: "snapshot", dataset = name, "Snapshot miss");

                // Detached so that a cancelled request still populates the cache.
                let task = inner.clone();
                let handle = tokio::spawn(async move {
                    let result = task.materialize(dataset).await;
                    task.settle(dataset, &result).await;
                    result
                });

                match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(GhgpError::internal(format!(
                        "Snapshot fetch task failed: {}",
                        e
                    ))),
                }
            })
            .await
            .map_err(|e| (*e).clone())
    }
}

impl Inner {
    async fn materialize(&self, dataset: Dataset) -> Result<PathBuf> {
        let name = dataset.name();
        let key = self.catalog.remote_key(dataset);
        let local = self.catalog.local_path(dataset);

        // Left behind by an earlier process on the same disk
        if tokio::fs::try_exists(&local).await.unwrap_or(false) {
            info!(target: "snapshot", dataset = name, path = %local.display(), "Adopted existing snapshot");
            return Ok(local);
        }

        self.stats.fetches.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        if let Some(dir) = local.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| GhgpError::dataset_unavailable(name, &key, e))?;
        }

        let partial = partial_path(&local);
        let outcome = tokio::time::timeout(
            self.fetch_timeout,
            self.remote.fetch_to(&key, &partial),
        )
        .await;

        let result = match outcome {
            Ok(Ok(())) => tokio::fs::rename(&partial, &local)
                .await
                .map_err(|e| GhgpError::dataset_unavailable(name, &key, e)),
            Ok(Err(e)) => Err(GhgpError::dataset_unavailable(name, &key, &e.message)),
            Err(_) => Err(GhgpError::dataset_unavailable(
                name,
                &key,
                format!("timed out after {}s", self.fetch_timeout.as_secs()),
            )),
        };

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        info!(
            target: "snapshot",
            dataset = name,
            key = %key,
            duration_ms = start.elapsed().as_millis() as u64,
            "Fetched snapshot"
        );
        Ok(local)
    }

    async fn settle(&self, dataset: Dataset, result: &Result<PathBuf>) {
        let name = dataset.name();
        match result {
            Ok(path) => self.entries.insert(name, path.clone()).await,
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                error!(target: "errors", dataset = name, error = %e, "Snapshot fetch failed");
            }
        }
    }
}

fn partial_path(local: &Path) -> PathBuf {
    let file_name = local
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    local.with_file_name(format!(".{}.{}.part", file_name, std::process::id()))
}
