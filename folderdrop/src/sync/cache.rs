use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{self, Write};

use raindrop_core::{RaindropClient, RaindropError};
use thiserror::Error;
use tracing::debug;

use super::backoff::RetryPolicy;

pub const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Debug, Error)]
#[error("failed to fetch page {page} of collection {collection_id}: {source}")]
pub struct FetchError {
    pub collection_id: i64,
    pub page: u32,
    #[source]
    pub source: RaindropError,
}

/// Next page to request for a collection listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCursor {
    Next(u32),
    Exhausted,
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageCursor::Next(page) => write!(f, "{page}"),
            PageCursor::Exhausted => f.write_str("exhausted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub link: String,
    pub remote_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Found(u64),
    NotFound,
}

/// Everything learned so far about one remote collection. Entries keep the
/// order they were discovered in and never repeat a link.
#[derive(Debug)]
pub struct CollectionCache {
    cursor: PageCursor,
    entries: Vec<CacheEntry>,
    by_link: HashMap<String, u64>,
}

impl CollectionCache {
    fn new() -> Self {
        Self {
            cursor: PageCursor::Next(0),
            entries: Vec::new(),
            by_link: HashMap::new(),
        }
    }

    pub fn cursor(&self) -> PageCursor {
        self.cursor
    }

    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    fn get(&self, link: &str) -> Option<u64> {
        self.by_link.get(link).copied()
    }

    fn insert(&mut self, link: String, remote_id: u64) -> bool {
        if self.by_link.contains_key(&link) {
            return false;
        }
        self.by_link.insert(link.clone(), remote_id);
        self.entries.push(CacheEntry { link, remote_id });
        true
    }
}

/// Incrementally learned link -> id index of remote collections. Pages are
/// fetched only when a lookup misses and are never fetched twice.
pub struct LookupCache {
    client: RaindropClient,
    page_size: u32,
    retry: RetryPolicy,
    collections: BTreeMap<i64, CollectionCache>,
    fetches: u64,
}

impl LookupCache {
    pub fn new(client: RaindropClient, page_size: u32) -> Self {
        Self {
            client,
            page_size: page_size.max(1),
            retry: RetryPolicy::default(),
            collections: BTreeMap::new(),
            fetches: 0,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of pages fetched from the remote so far.
    pub fn fetches(&self) -> u64 {
        self.fetches
    }

    pub fn collection(&self, collection_id: i64) -> Option<&CollectionCache> {
        self.collections.get(&collection_id)
    }

    pub fn collections(&self) -> impl Iterator<Item = (i64, &CollectionCache)> {
        self.collections.iter().map(|(id, cache)| (*id, cache))
    }

    pub async fn find(&mut self, collection_id: i64, link: &str) -> Result<Lookup, FetchError> {
        debug!(collection_id, link, "looking up link");
        let collection = self.collections.entry(collection_id).or_insert_with(|| {
            debug!(collection_id, "creating collection cache");
            CollectionCache::new()
        });

        if let Some(remote_id) = collection.get(link) {
            debug!(collection_id, remote_id, "cache hit");
            return Ok(Lookup::Found(remote_id));
        }

        while let PageCursor::Next(page) = collection.cursor {
            debug!(collection_id, page, "fetching more entries");
            let client = &self.client;
            let page_size = self.page_size;
            let fetched = self
                .retry
                .run(RaindropError::is_retryable, || {
                    client.list_raindrops(collection_id, page, page_size)
                })
                .await
                .map_err(|source| FetchError {
                    collection_id,
                    page,
                    source,
                })?;
            self.fetches += 1;

            let fetched_records =
                u64::from(page_size) * u64::from(page) + fetched.items.len() as u64;
            let has_more = !fetched.items.is_empty() && fetched_records < fetched.count;

            // Only the fresh page can hold the link; older ones were checked above.
            let mut hit = None;
            for item in fetched.items {
                if hit.is_none() && item.link == link {
                    hit = Some(item.id);
                }
                collection.insert(item.link, item.id);
            }
            collection.cursor = if has_more {
                PageCursor::Next(page + 1)
            } else {
                PageCursor::Exhausted
            };

            if let Some(remote_id) = hit {
                debug!(collection_id, remote_id, page, "found on fetched page");
                return Ok(Lookup::Found(remote_id));
            }
        }

        debug!(collection_id, link, "link not present in collection");
        Ok(Lookup::NotFound)
    }

    /// Remembers a bookmark created during this run. Returns false when the
    /// link was already known.
    pub fn record(&mut self, collection_id: i64, link: &str, remote_id: u64) -> bool {
        self.collections
            .entry(collection_id)
            .or_insert_with(CollectionCache::new)
            .insert(link.to_string(), remote_id)
    }

    /// Plain text dump of every collection, for diagnostics.
    pub fn write_report<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (collection_id, cache) in &self.collections {
            writeln!(
                out,
                "Cache for collection {collection_id} (stopped at page {})",
                cache.cursor
            )?;
            if cache.entries.is_empty() {
                writeln!(out, "EMPTY")?;
                continue;
            }
            for entry in &cache.entries {
                writeln!(out, "- {} | {}", entry.remote_id, entry.link)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
