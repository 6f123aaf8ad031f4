//! In-process change feed
//!
//! Keeps each map's entries in memory and bumps a version on every push, so
//! long-polling listeners wake up exactly like they would against the remote
//! service. Used for integration testing and demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{watch, Notify};

use super::transport::{entries_after, FeedEntry, FeedKey, MapFeed, Watermark};
use super::FeedError;

type StreamKey = (String, String);

struct SimStream {
    entries: Vec<FeedEntry>,
    version: watch::Sender<u64>,
}

impl SimStream {
    fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            entries: Vec::new(),
            version,
        }
    }

    fn watermark(&self) -> Watermark {
        Watermark {
            last_value: self.entries.last().map(|e| e.key.offset().to_string()),
            version: self.entries.len().to_string(),
        }
    }
}

/// An in-memory feed holding any number of `(map id, kv prefix)` streams.
pub struct SimMapFeed {
    streams: Mutex<HashMap<StreamKey, SimStream>>,
    wait_timeout: Duration,
    /// Signalled whenever a listener starts long-polling.
    waiting: Notify,
    fetches: AtomicUsize,
    pending_failures: AtomicUsize,
}

impl SimMapFeed {
    /// Create a feed whose long-polls never time out in practice.
    pub fn new() -> Arc<Self> {
        Self::with_wait_timeout(Duration::from_secs(3600))
    }

    /// Create a feed whose long-polls give up after `wait_timeout`.
    pub fn with_wait_timeout(wait_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            streams: Mutex::new(HashMap::new()),
            wait_timeout,
            waiting: Notify::new(),
            fetches: AtomicUsize::new(0),
            pending_failures: AtomicUsize::new(0),
        })
    }

    fn streams(&self) -> MutexGuard<'_, HashMap<StreamKey, SimStream>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry and bump the stream's version.
    pub fn push(&self, map_id: &str, kv_prefix: &str, key: FeedKey, value: Value) {
        let mut streams = self.streams();
        let stream = streams
            .entry((map_id.to_string(), kv_prefix.to_string()))
            .or_insert_with(SimStream::new);
        stream.entries.push(FeedEntry::new(key, value));
        let version = stream.entries.len() as u64;
        stream.version.send_replace(version);
    }

    /// Append a single-component entry at `offset`.
    pub fn push_at(&self, map_id: &str, kv_prefix: &str, offset: &str, value: Value) {
        self.push(map_id, kv_prefix, FeedKey::from_offset(offset), value);
    }

    /// Make the next `count` feed calls fail with `FeedError::Unavailable`.
    pub fn fail_next(&self, count: usize) {
        self.pending_failures.fetch_add(count, Ordering::SeqCst);
    }

    /// Number of `get_entries` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Resolve once some listener is blocked in `wait_for_watermark_change`.
    pub async fn wait_until_waiting(&self) {
        self.waiting.notified().await;
    }

    fn take_failure(&self) -> Result<(), FeedError> {
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            Err(FeedError::Unavailable("injected failure".into()))
        } else {
            Ok(())
        }
    }

    fn watermark_of(&self, map_id: &str, kv_prefix: &str) -> Watermark {
        let mut streams = self.streams();
        streams
            .entry((map_id.to_string(), kv_prefix.to_string()))
            .or_insert_with(SimStream::new)
            .watermark()
    }
}

#[async_trait]
impl MapFeed for SimMapFeed {
    async fn get_watermark(&self, map_id: &str, kv_prefix: &str) -> Result<Watermark, FeedError> {
        self.take_failure()?;
        Ok(self.watermark_of(map_id, kv_prefix))
    }

    async fn get_entries(
        &self,
        map_id: &str,
        kv_prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<FeedEntry>, FeedError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;

        let streams = self.streams();
        let Some(stream) = streams.get(&(map_id.to_string(), kv_prefix.to_string())) else {
            return Ok(Vec::new());
        };
        Ok(entries_after(stream.entries.iter().cloned(), after, limit))
    }

    async fn wait_for_watermark_change(
        &self,
        map_id: &str,
        kv_prefix: &str,
        known_version: &str,
    ) -> Result<Option<Watermark>, FeedError> {
        self.take_failure()?;

        let mut version_rx = {
            let mut streams = self.streams();
            streams
                .entry((map_id.to_string(), kv_prefix.to_string()))
                .or_insert_with(SimStream::new)
                .version
                .subscribe()
        };
        self.waiting.notify_one();

        let changed = matches!(
            tokio::time::timeout(
                self.wait_timeout,
                version_rx.wait_for(|version| version.to_string() != known_version),
            )
            .await,
            Ok(Ok(_))
        );

        if changed {
            Ok(Some(self.watermark_of(map_id, kv_prefix)))
        } else {
            Ok(None)
        }
    }
}
