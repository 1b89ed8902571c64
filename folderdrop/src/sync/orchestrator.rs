use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};

use raindrop_core::{NewRaindrop, RaindropClient};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use super::backoff::RetryPolicy;
use super::cache::{DEFAULT_PAGE_SIZE, FetchError, Lookup, LookupCache};
use super::link::{LinkError, compose_link};
use super::matcher::PatternMatcher;
use super::queue::{Flush, MAX_BATCH_SIZE, QueueError, WriteQueue};

/// A validated mount: one local directory mirrored into one collection.
#[derive(Debug, Clone)]
pub struct MountSpec {
    pub collection_id: i64,
    pub link_prefix: Url,
    pub local_path: PathBuf,
    pub tags: Vec<String>,
    pub patterns: PatternMatcher,
}

pub type Mounts = BTreeMap<String, MountSpec>;

/// Remote id recorded for links a dry run only pretended to create.
pub const PLANNED_ID: u64 = 0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub created: usize,
    pub skipped: usize,
    pub excluded: usize,
}

impl AddAssign for RunStats {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.skipped += other.skipped;
        self.excluded += other.excluded;
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created {} / excluded {} / skipped {}",
            self.created, self.excluded, self.skipped
        )
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("cannot build link for {path}: {source}")]
    InvalidUrl {
        path: PathBuf,
        #[source]
        source: LinkError,
    },
    #[error(transparent)]
    Create(#[from] QueueError),
    #[error("failed to read directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Fetch(_) => "fetch",
            SyncError::InvalidUrl { .. } => "invalid-url",
            SyncError::Create(_) => "create",
            SyncError::Io { .. } => "io",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub page_size: u32,
    pub max_batch_size: usize,
    pub dry_run: bool,
    pub fail_fast: bool,
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_batch_size: MAX_BATCH_SIZE,
            dry_run: false,
            fail_fast: false,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug)]
pub struct MountFailure {
    pub mount: String,
    pub error: SyncError,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub total: RunStats,
    pub mounts: Vec<(String, RunStats)>,
    pub failures: Vec<MountFailure>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Drives mounts one after another against a single lookup cache, so mounts
/// sharing a collection reuse the pages already fetched.
pub struct SyncOrchestrator {
    client: RaindropClient,
    cache: LookupCache,
    options: SyncOptions,
}

impl SyncOrchestrator {
    pub fn new(client: RaindropClient, options: SyncOptions) -> Self {
        let cache = LookupCache::new(client.clone(), options.page_size).with_retry(options.retry);
        Self {
            client,
            cache,
            options,
        }
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    /// Syncs one mount. Whatever is still queued when the scan stops is
    /// offloaded before returning, also when the scan failed.
    pub async fn run_mount(
        &mut self,
        name: &str,
        mount: &MountSpec,
    ) -> Result<RunStats, SyncError> {
        info!(
            mount = name,
            path = %mount.local_path.display(),
            collection_id = mount.collection_id,
            "syncing mount"
        );
        let mut queue = WriteQueue::new(
            self.client.clone(),
            mount.collection_id,
            mount.tags.clone(),
        )
        .with_max_batch_size(self.options.max_batch_size)
        .with_dry_run(self.options.dry_run)
        .with_retry(self.options.retry);

        let mut stats = RunStats::default();
        let scanned = scan_mount(&mut self.cache, &mut queue, mount, &mut stats).await;
        let flushed = queue.offload().await;

        match (scanned, flushed) {
            (Ok(()), Ok(flush)) => {
                absorb_flush(&mut self.cache, mount.collection_id, flush, &mut stats);
                Ok(stats)
            }
            (Ok(()), Err(err)) => Err(err.into()),
            (Err(err), flushed) => {
                match flushed {
                    Ok(flush) => {
                        absorb_flush(&mut self.cache, mount.collection_id, flush, &mut stats)
                    }
                    Err(flush_err) => {
                        warn!(mount = name, error = %flush_err, "final offload failed")
                    }
                }
                Err(err)
            }
        }
    }

    /// Runs every mount in name order. A failed mount is recorded and the run
    /// moves on, unless `fail_fast` is set.
    pub async fn run_all(&mut self, mounts: &Mounts) -> RunSummary {
        let mut summary = RunSummary::default();
        for (name, mount) in mounts {
            match self.run_mount(name, mount).await {
                Ok(stats) => {
                    info!(mount = %name, %stats, "mount done");
                    summary.total += stats;
                    summary.mounts.push((name.clone(), stats));
                }
                Err(err) => {
                    error!(mount = %name, kind = err.kind(), error = %err, "mount failed");
                    summary.failures.push(MountFailure {
                        mount: name.clone(),
                        error: err,
                    });
                    if self.options.fail_fast {
                        warn!("stopping after first failed mount");
                        break;
                    }
                }
            }
        }
        summary
    }
}

async fn scan_mount(
    cache: &mut LookupCache,
    queue: &mut WriteQueue,
    mount: &MountSpec,
    stats: &mut RunStats,
) -> Result<(), SyncError> {
    let io_error = |source| SyncError::Io {
        path: mount.local_path.clone(),
        source,
    };
    let mut dir = tokio::fs::read_dir(&mount.local_path)
        .await
        .map_err(io_error)?;
    let mut entries = Vec::new();
    while let Some(entry) = dir.next_entry().await.map_err(io_error)? {
        entries.push(entry);
    }
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        // Follows symlinks, so a link to a file counts as a file.
        let is_file = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata.is_file(),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "cannot stat entry");
                false
            }
        };
        if !is_file {
            debug!(path = %path.display(), "excluding non-regular file");
            stats.excluded += 1;
            continue;
        }

        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            warn!(path = %path.display(), "excluding file with non UTF-8 name");
            stats.excluded += 1;
            continue;
        };
        if !mount.patterns.is_match(name) {
            debug!(file = name, "not matched against patterns");
            stats.excluded += 1;
            continue;
        }

        let link = compose_link(&mount.link_prefix, Path::new(name))
            .map_err(|source| SyncError::InvalidUrl { path: path.clone(), source })?;

        match cache.find(mount.collection_id, link.as_str()).await? {
            Lookup::Found(remote_id) => {
                debug!(file = name, remote_id, "already bookmarked");
                stats.skipped += 1;
            }
            Lookup::NotFound => {
                debug!(link = %link, "will create");
                let item = NewRaindrop::new(link.as_str()).with_title(name);
                let flush = queue.append(item).await?;
                absorb_flush(cache, mount.collection_id, flush, stats);
            }
        }
    }
    Ok(())
}

fn absorb_flush(
    cache: &mut LookupCache,
    collection_id: i64,
    flush: Option<Flush>,
    stats: &mut RunStats,
) {
    let Some(flush) = flush else {
        return;
    };
    stats.created += flush.created_count();
    // A dry run has no ids, but later mounts must still see the links as taken.
    for link in flush.planned() {
        cache.record(collection_id, link, PLANNED_ID);
    }
    let created = flush.created();
    if created.is_empty() {
        return;
    }
    for item in created {
        cache.record(collection_id, &item.link, item.id);
    }
    let ids: Vec<u64> = created.iter().map(|item| item.id).collect();
    info!(collection_id, ?ids, "created bookmarks");
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
