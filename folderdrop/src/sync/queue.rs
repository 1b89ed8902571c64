use raindrop_core::{ApiErrorClass, NewRaindrop, Raindrop, RaindropClient, RaindropError};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::backoff::RetryPolicy;

/// Largest batch the create-many endpoint accepts.
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Error)]
#[error("failed to create {count} bookmarks in collection {collection_id}: {source}")]
pub struct QueueError {
    pub collection_id: i64,
    pub count: usize,
    #[source]
    pub source: RaindropError,
}

/// Result of submitting one batch.
#[derive(Debug)]
pub enum Flush {
    Created {
        submitted: usize,
        items: Vec<Raindrop>,
    },
    /// Nothing was sent; the batch was only logged.
    DryRun { links: Vec<String> },
}

impl Flush {
    pub fn submitted(&self) -> usize {
        match self {
            Flush::Created { submitted, .. } => *submitted,
            Flush::DryRun { links } => links.len(),
        }
    }

    /// Bookmarks that exist remotely because of this flush (or would, for a dry run).
    pub fn created_count(&self) -> usize {
        match self {
            Flush::Created { items, .. } => items.len(),
            Flush::DryRun { links } => links.len(),
        }
    }

    pub fn created(&self) -> &[Raindrop] {
        match self {
            Flush::Created { items, .. } => items,
            Flush::DryRun { .. } => &[],
        }
    }

    /// Links a dry run would have created.
    pub fn planned(&self) -> &[String] {
        match self {
            Flush::Created { .. } => &[],
            Flush::DryRun { links } => links,
        }
    }
}

/// Pending bookmark creations for one mount, sent in batches of at most
/// `max_batch_size` items.
///
/// The owner must call [`WriteQueue::offload`] once more before dropping the
/// queue. Dropping it with pending items loses them; the drop only logs a
/// warning about it.
pub struct WriteQueue {
    client: RaindropClient,
    collection_id: i64,
    tags: Vec<String>,
    pending: Vec<NewRaindrop>,
    max_batch_size: usize,
    dry_run: bool,
    retry: RetryPolicy,
}

impl WriteQueue {
    pub fn new(client: RaindropClient, collection_id: i64, tags: Vec<String>) -> Self {
        Self {
            client,
            collection_id,
            tags,
            pending: Vec::new(),
            max_batch_size: MAX_BATCH_SIZE,
            dry_run: false,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Queues `item`, filling in the queue collection and tags. Sends the batch
    /// as soon as it is full and returns what that flush produced.
    pub async fn append(&mut self, mut item: NewRaindrop) -> Result<Option<Flush>, QueueError> {
        if item.collection.is_none() {
            item = item.with_collection(self.collection_id);
        }
        for tag in &self.tags {
            item.add_tag(tag);
        }
        self.pending.push(item);

        if self.pending.len() >= self.max_batch_size {
            return self.offload().await;
        }
        Ok(None)
    }

    /// Sends everything pending in one request. A failed batch is not kept:
    /// resending it could duplicate whatever the service already created.
    pub async fn offload(&mut self) -> Result<Option<Flush>, QueueError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let batch = std::mem::take(&mut self.pending);
        let submitted = batch.len();

        if self.dry_run {
            info!(
                collection_id = self.collection_id,
                submitted, "dry run: skipping bookmark creation"
            );
            let links: Vec<String> = batch.into_iter().map(|item| item.link).collect();
            for link in &links {
                info!(%link, "dry run: would create");
            }
            return Ok(Some(Flush::DryRun { links }));
        }

        debug!(
            collection_id = self.collection_id,
            submitted,
            request = %serde_json::to_string(&batch).unwrap_or_default(),
            "offloading batch"
        );
        let client = &self.client;
        let response = self
            .retry
            .run(is_rate_limited, || client.create_raindrops(&batch))
            .await
            .map_err(|source| QueueError {
                collection_id: self.collection_id,
                count: submitted,
                source,
            })?;

        if response.items.len() != submitted {
            warn!(
                collection_id = self.collection_id,
                expected = submitted,
                created = response.items.len(),
                "service created fewer bookmarks than requested"
            );
        }
        debug!(created = response.items.len(), "batch offloaded");

        Ok(Some(Flush::Created {
            submitted,
            items: response.items,
        }))
    }
}

impl Drop for WriteQueue {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                collection_id = self.collection_id,
                pending = self.pending.len(),
                "write queue dropped without offloading"
            );
        }
    }
}

// A rate limited request was rejected before any item was created.
fn is_rate_limited(err: &RaindropError) -> bool {
    err.classification() == Some(ApiErrorClass::RateLimit)
}
