//! The per-stream consumption loop.
//!
//! ```text
//!   Starting ──▶ CatchingUp ──▶ Drained ──▶ Waiting
//!      ▲             ▲  │                      │
//!      │             │  └── full batch ──┐     │ watermark moved
//!      │             └───────────────────┴─────┘
//!      │
//!   BackingOff ◀── any feed, decode, or consumer failure
//! ```
//!
//! A stop request is honoured at every suspension point and between entries,
//! never in the middle of an entry.

use std::sync::Arc;

use tokio::sync::watch;

use super::consumer::EventConsumer;
use super::cursor::{offset_timestamp, StreamCursor};
use super::{ListenerConfig, ListenerError};
use crate::events::expand;
use crate::feed::{FeedEntry, MapFeed};

/// Identity of one stream within a feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MapStream {
    pub map_id: String,
    pub kv_prefix: String,
}

impl MapStream {
    pub fn new(map_id: impl Into<String>, kv_prefix: impl Into<String>) -> Self {
        Self {
            map_id: map_id.into(),
            kv_prefix: kv_prefix.into(),
        }
    }
}

/// Observable phase of a stream loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Reading the watermark.
    Starting,
    /// Fetching and delivering entries after the cursor.
    CatchingUp,
    /// The last fetch returned a short batch.
    Drained,
    /// Long-polling for a watermark change.
    Waiting,
    /// Sleeping after a failure.
    BackingOff,
    /// Terminal.
    Stopped,
}

/// Handle to a running [`StreamLoop`]. Dropping it stops the loop.
#[derive(Debug)]
pub struct StreamControl {
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<StreamState>,
}

impl StreamControl {
    /// Ask the loop to stop at its next safe point.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn state(&self) -> StreamState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.state_rx.clone()
    }
}

/// Consumes one stream of a [`MapFeed`] into one [`EventConsumer`].
pub struct StreamLoop {
    stream: MapStream,
    feed: Arc<dyn MapFeed>,
    consumer: Arc<dyn EventConsumer>,
    config: ListenerConfig,
    cursor: StreamCursor,
    stop_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<StreamState>,
}

impl StreamLoop {
    pub fn new(
        stream: MapStream,
        feed: Arc<dyn MapFeed>,
        consumer: Arc<dyn EventConsumer>,
        config: ListenerConfig,
        initial_offset: Option<String>,
    ) -> (Self, StreamControl) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(StreamState::Starting);
        let stream_loop = Self {
            stream,
            feed,
            consumer,
            config: config.normalized(),
            cursor: StreamCursor::new(initial_offset),
            stop_rx,
            state_tx,
        };
        (stream_loop, StreamControl { stop_tx, state_rx })
    }

    pub fn stream(&self) -> &MapStream {
        &self.stream
    }

    pub fn cursor(&self) -> &StreamCursor {
        &self.cursor
    }

    /// Drive the stream until stopped. Returns the final cursor.
    pub async fn run(mut self) -> StreamCursor {
        log::info!(
            "[{}] Map listener started (prefix {})",
            self.stream.map_id,
            self.stream.kv_prefix
        );

        let mut state = StreamState::Starting;
        loop {
            if self.stop_requested() {
                state = StreamState::Stopped;
            }
            self.state_tx.send_replace(state);

            state = match state {
                StreamState::Starting => self.start().await,
                StreamState::CatchingUp => self.catch_up().await,
                StreamState::Drained => StreamState::Waiting,
                StreamState::Waiting => self.wait().await,
                StreamState::BackingOff => self.back_off().await,
                StreamState::Stopped => break,
            };
        }

        self.consumer.close().await;
        log::info!(
            "[{}] Map listener stopped at offset {:?}",
            self.stream.map_id,
            self.cursor.offset()
        );
        self.cursor
    }

    // ------------------------------------------------------------------
    // States
    // ------------------------------------------------------------------

    async fn start(&mut self) -> StreamState {
        let result = tokio::select! {
            biased;
            _ = stop_signal(&mut self.stop_rx) => return StreamState::Stopped,
            result = self.feed.get_watermark(&self.stream.map_id, &self.stream.kv_prefix) => result,
        };

        match result {
            Ok(watermark) => {
                self.cursor.start(watermark);
                log::info!(
                    "[{}] Initial kv offset = {:?}",
                    self.stream.map_id,
                    self.cursor.offset()
                );
                StreamState::CatchingUp
            }
            Err(e) => self.fail(e.into()),
        }
    }

    async fn catch_up(&mut self) -> StreamState {
        let result = tokio::select! {
            biased;
            _ = stop_signal(&mut self.stop_rx) => return StreamState::Stopped,
            result = self.feed.get_entries(
                &self.stream.map_id,
                &self.stream.kv_prefix,
                self.cursor.offset(),
                self.config.batch_size,
            ) => result,
        };

        let entries = match result {
            Ok(entries) => entries,
            Err(e) => return self.fail(e.into()),
        };
        log::debug!("[{}] Read {} events", self.stream.map_id, entries.len());

        let full_batch = !entries.is_empty() && entries.len() >= self.config.batch_size;
        for entry in entries {
            if self.stop_requested() {
                return StreamState::Stopped;
            }
            if let Err(e) = self.process_entry(entry).await {
                return self.fail(e);
            }
        }

        if full_batch {
            StreamState::CatchingUp
        } else {
            StreamState::Drained
        }
    }

    async fn wait(&mut self) -> StreamState {
        let version = self
            .cursor
            .watermark()
            .map(|w| w.version.clone())
            .unwrap_or_default();

        let result = tokio::select! {
            biased;
            _ = stop_signal(&mut self.stop_rx) => return StreamState::Stopped,
            result = self.feed.wait_for_watermark_change(
                &self.stream.map_id,
                &self.stream.kv_prefix,
                &version,
            ) => result,
        };

        match result {
            Ok(Some(watermark)) => {
                log::debug!(
                    "[{}] New notify last version = {}",
                    self.stream.map_id,
                    watermark.version
                );
                self.cursor.observe(watermark);
                StreamState::CatchingUp
            }
            Ok(None) => StreamState::Waiting,
            Err(e) => self.fail(e.into()),
        }
    }

    async fn back_off(&mut self) -> StreamState {
        tokio::select! {
            biased;
            _ = stop_signal(&mut self.stop_rx) => StreamState::Stopped,
            _ = tokio::time::sleep(self.config.retry_delay) => StreamState::Starting,
        }
    }

    fn fail(&self, error: ListenerError) -> StreamState {
        log::error!("[{}] Error in events loop: {}", self.stream.map_id, error);
        StreamState::BackingOff
    }

    // ------------------------------------------------------------------
    // Entry processing
    // ------------------------------------------------------------------

    /// Deliver every event of one entry, commit it, then advance the cursor.
    /// Any failure leaves the cursor where it was so the entry is redelivered.
    /// An entry at or before the cursor is dropped without delivery or commit.
    async fn process_entry(&mut self, entry: FeedEntry) -> Result<(), ListenerError> {
        let policy = self.config.unknown_events;
        let offset = entry.key.offset().to_string();
        if !self.cursor.is_past(&offset) {
            log::warn!(
                "[{}] Skipping entry {} not past offset {:?}",
                self.stream.map_id,
                offset,
                self.cursor.offset()
            );
            return Ok(());
        }

        let events: Vec<_> = match offset_timestamp(&offset) {
            Ok(timestamp) => {
                let events = expand(&self.stream.map_id, entry.value, policy)?;
                events.into_iter().map(|event| (timestamp, event)).collect()
            }
            Err(e) => {
                policy.tolerate(&self.stream.map_id, e)?;
                Vec::new()
            }
        };

        for (timestamp, event) in events {
            self.consumer
                .consume(timestamp, event)
                .await
                .map_err(|source| ListenerError::Consumer {
                    offset: offset.clone(),
                    source,
                })?;
        }

        self.consumer
            .commit(&offset)
            .await
            .map_err(|source| ListenerError::Consumer {
                offset: offset.clone(),
                source,
            })?;

        if self.cursor.advance(&offset) {
            log::debug!("[{}] New KV offset = {}", self.stream.map_id, offset);
        }
        Ok(())
    }

    fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow() || self.stop_rx.has_changed().is_err()
    }
}

/// Resolves once a stop was requested or the control handle was dropped.
async fn stop_signal(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::events::{EventKind, MapEvent, UnknownEventPolicy};
    use crate::feed::{FeedError, FeedKey, SimMapFeed, Watermark};

    struct Recorder {
        events: mpsc::UnboundedSender<(DateTime<Utc>, MapEvent)>,
        commits: Mutex<Vec<String>>,
        failures_left: Mutex<usize>,
        closed: Mutex<bool>,
    }

    impl Recorder {
        fn new(failures: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<(DateTime<Utc>, MapEvent)>) {
            let (events, rx) = mpsc::unbounded_channel();
            let recorder = Arc::new(Self {
                events,
                commits: Mutex::new(Vec::new()),
                failures_left: Mutex::new(failures),
                closed: Mutex::new(false),
            });
            (recorder, rx)
        }

        fn commits(&self) -> Vec<String> {
            self.commits.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventConsumer for Recorder {
        async fn consume(&self, timestamp: DateTime<Utc>, event: MapEvent) -> anyhow::Result<()> {
            let _ = self.events.send((timestamp, event));
            let mut failures_left = self.failures_left.lock().unwrap();
            if *failures_left > 0 {
                *failures_left -= 1;
                anyhow::bail!("consumer rejected event");
            }
            Ok(())
        }

        async fn commit(&self, offset: &str) -> anyhow::Result<()> {
            self.commits.lock().unwrap().push(offset.to_string());
            Ok(())
        }

        async fn close(&self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    fn spawn_loop(
        feed: &Arc<SimMapFeed>,
        consumer: &Arc<Recorder>,
        config: ListenerConfig,
        initial_offset: Option<&str>,
    ) -> (tokio::task::JoinHandle<StreamCursor>, StreamControl) {
        let (stream_loop, control) = StreamLoop::new(
            MapStream::new("map", "prefix"),
            feed.clone(),
            consumer.clone(),
            config,
            initial_offset.map(str::to_string),
        );
        (tokio::spawn(stream_loop.run()), control)
    }

    async fn reach(control: &StreamControl, state: StreamState) {
        let mut rx = control.subscribe();
        rx.wait_for(|s| *s == state).await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_stream_waits_and_stops() {
        let feed = SimMapFeed::new();
        let (consumer, _rx) = Recorder::new(0);
        let (handle, control) = spawn_loop(&feed, &consumer, ListenerConfig::default(), None);

        reach(&control, StreamState::Waiting).await;
        control.stop();

        let cursor = handle.await.unwrap();
        assert_eq!(cursor.offset(), None);
        assert_eq!(control.state(), StreamState::Stopped);
        assert!(*consumer.closed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_dropping_control_stops_loop() {
        let feed = SimMapFeed::new();
        let (consumer, _rx) = Recorder::new(0);
        let (handle, control) = spawn_loop(&feed, &consumer, ListenerConfig::default(), None);

        reach(&control, StreamState::Waiting).await;
        drop(control);

        handle.await.unwrap();
        assert!(*consumer.closed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_compound_entry_commits_once() {
        let feed = SimMapFeed::new();
        feed.push_at(
            "map",
            "prefix",
            "5",
            json!({
                "type": "node_created",
                "what": "a",
                "additional": [
                    { "type": "node_updated", "what": "b" },
                    { "type": "node_moved", "what": "c" },
                ],
            }),
        );
        feed.push_at("map", "prefix", "7", json!({ "type": "node_deleted", "what": "d" }));

        let (consumer, mut rx) = Recorder::new(0);
        let (handle, control) = spawn_loop(&feed, &consumer, ListenerConfig::default(), Some("1"));

        let mut seen = Vec::new();
        for _ in 0..4 {
            let (timestamp, event) = rx.recv().await.unwrap();
            seen.push((timestamp.timestamp_millis(), event.kind(), event.what().to_string()));
        }
        assert_eq!(
            seen,
            vec![
                (5, EventKind::NodeCreated, "a".to_string()),
                (5, EventKind::NodeUpdated, "b".to_string()),
                (5, EventKind::NodeMoved, "c".to_string()),
                (7, EventKind::NodeDeleted, "d".to_string()),
            ]
        );

        reach(&control, StreamState::Waiting).await;
        assert_eq!(consumer.commits(), vec!["5".to_string(), "7".to_string()]);

        control.stop();
        assert_eq!(handle.await.unwrap().offset(), Some("7"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_failure_redelivers_entry() {
        let feed = SimMapFeed::new();
        let (consumer, mut rx) = Recorder::new(1);
        let config = ListenerConfig {
            retry_delay: Duration::from_secs(60),
            ..ListenerConfig::default()
        };
        let (handle, control) = spawn_loop(&feed, &consumer, config, None);

        reach(&control, StreamState::Waiting).await;
        feed.push_at("map", "prefix", "0", json!({ "type": "node_updated", "what": "a" }));

        let (_, first) = rx.recv().await.unwrap();
        let (_, second) = rx.recv().await.unwrap();
        assert_eq!(first, second);

        reach(&control, StreamState::Waiting).await;
        assert_eq!(consumer.commits(), vec!["0".to_string()]);

        control.stop();
        assert_eq!(handle.await.unwrap().offset(), Some("0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_policy_backs_off_without_advancing() {
        let feed = SimMapFeed::new();
        feed.push_at("map", "prefix", "3", json!({ "type": "unknown_event" }));

        let (consumer, _rx) = Recorder::new(0);
        let config = ListenerConfig {
            unknown_events: UnknownEventPolicy::Strict,
            ..ListenerConfig::default()
        };
        let (handle, control) = spawn_loop(&feed, &consumer, config, Some("0"));

        reach(&control, StreamState::BackingOff).await;
        control.stop();

        let cursor = handle.await.unwrap();
        assert_eq!(cursor.offset(), Some("0"));
        assert!(consumer.commits().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_offset_is_skipped() {
        let feed = SimMapFeed::new();
        feed.push_at("map", "prefix", "x", json!({ "type": "node_updated", "what": "a" }));

        let (consumer, _rx) = Recorder::new(0);
        let (handle, control) = spawn_loop(&feed, &consumer, ListenerConfig::default(), Some("0"));

        reach(&control, StreamState::Waiting).await;
        control.stop();

        assert_eq!(handle.await.unwrap().offset(), Some("x"));
        assert_eq!(consumer.commits(), vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn test_zero_batch_size_still_drains() {
        let feed = SimMapFeed::new();
        feed.push_at("map", "prefix", "5", json!({ "type": "node_updated", "what": "a" }));
        feed.push_at("map", "prefix", "7", json!({ "type": "node_updated", "what": "b" }));

        let (consumer, _rx) = Recorder::new(0);
        let config = ListenerConfig {
            batch_size: 0,
            ..ListenerConfig::default()
        };
        let (handle, control) = spawn_loop(&feed, &consumer, config, Some("0"));

        reach(&control, StreamState::Waiting).await;
        assert_eq!(consumer.commits(), vec!["5".to_string(), "7".to_string()]);

        control.stop();
        assert_eq!(handle.await.unwrap().offset(), Some("7"));
    }

    /// Serves one batch with an entry behind its predecessor, then nothing.
    struct OutOfOrderFeed {
        served: Mutex<bool>,
    }

    #[async_trait]
    impl MapFeed for OutOfOrderFeed {
        async fn get_watermark(&self, _map_id: &str, _kv_prefix: &str) -> Result<Watermark, FeedError> {
            Ok(Watermark {
                last_value: None,
                version: "0".to_string(),
            })
        }

        async fn get_entries(
            &self,
            _map_id: &str,
            _kv_prefix: &str,
            _after: Option<&str>,
            _limit: usize,
        ) -> Result<Vec<FeedEntry>, FeedError> {
            if std::mem::replace(&mut *self.served.lock().unwrap(), true) {
                return Ok(Vec::new());
            }
            Ok(["3", "2", "4"]
                .into_iter()
                .map(|offset| {
                    FeedEntry::new(
                        FeedKey::from_offset(offset),
                        json!({ "type": "node_updated", "what": offset }),
                    )
                })
                .collect())
        }

        async fn wait_for_watermark_change(
            &self,
            _map_id: &str,
            _kv_prefix: &str,
            _known_version: &str,
        ) -> Result<Option<Watermark>, FeedError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_entry_behind_cursor_is_neither_delivered_nor_committed() {
        let feed = Arc::new(OutOfOrderFeed {
            served: Mutex::new(false),
        });
        let (consumer, mut rx) = Recorder::new(0);
        let (stream_loop, control) = StreamLoop::new(
            MapStream::new("map", "prefix"),
            feed,
            consumer.clone(),
            ListenerConfig::default(),
            None,
        );
        let handle = tokio::spawn(stream_loop.run());

        reach(&control, StreamState::Waiting).await;
        let mut delivered = Vec::new();
        while let Ok((_, event)) = rx.try_recv() {
            delivered.push(event.what().to_string());
        }
        assert_eq!(delivered, vec!["3".to_string(), "4".to_string()]);
        assert_eq!(consumer.commits(), vec!["3".to_string(), "4".to_string()]);

        control.stop();
        assert_eq!(handle.await.unwrap().offset(), Some("4"));
    }
}
