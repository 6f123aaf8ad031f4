//! Registry of running stream loops, keyed by map id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::consumer::EventConsumer;
use super::cursor::StreamCursor;
use super::stream_loop::{MapStream, StreamControl, StreamLoop, StreamState};
use super::ListenerConfig;
use crate::feed::MapFeed;

struct RunningStream {
    stream: MapStream,
    control: StreamControl,
    task: JoinHandle<StreamCursor>,
}

/// Owns one [`StreamLoop`] task per map id, all reading the same feed.
///
/// Dropping the registry stops every loop it still owns.
pub struct StreamRegistry {
    feed: Arc<dyn MapFeed>,
    config: ListenerConfig,
    streams: Mutex<HashMap<String, RunningStream>>,
}

impl StreamRegistry {
    pub fn new(feed: Arc<dyn MapFeed>) -> Self {
        Self::with_config(feed, ListenerConfig::default())
    }

    pub fn with_config(feed: Arc<dyn MapFeed>, config: ListenerConfig) -> Self {
        Self {
            feed,
            config: config.normalized(),
            streams: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    fn streams(&self) -> MutexGuard<'_, HashMap<String, RunningStream>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start consuming `map_id` into `consumer`.
    ///
    /// Returns `false` and changes nothing when a loop for `map_id` is
    /// already running. A finished loop left in the registry is replaced.
    /// Must be called from within a tokio runtime.
    pub fn add_stream(
        &self,
        map_id: &str,
        kv_prefix: &str,
        consumer: Arc<dyn EventConsumer>,
        initial_offset: Option<String>,
    ) -> bool {
        let mut streams = self.streams();
        if let Some(running) = streams.get(map_id) {
            if !running.task.is_finished() {
                log::debug!("[{}] Map listener already running", map_id);
                return false;
            }
        }

        let stream = MapStream::new(map_id, kv_prefix);
        let (stream_loop, control) = StreamLoop::new(
            stream.clone(),
            Arc::clone(&self.feed),
            consumer,
            self.config.clone(),
            initial_offset,
        );
        let task = tokio::spawn(stream_loop.run());
        streams.insert(
            map_id.to_string(),
            RunningStream {
                stream,
                control,
                task,
            },
        );
        true
    }

    /// Ask the loop for `map_id` to stop and forget it.
    ///
    /// The loop finishes the entry it is processing, closes its consumer and
    /// exits. Await the returned handle to get its final cursor.
    pub fn remove_stream(&self, map_id: &str) -> Option<JoinHandle<StreamCursor>> {
        let running = self.streams().remove(map_id)?;
        running.control.stop();
        log::info!(
            "[{}] Map listener removed (prefix {})",
            map_id,
            running.stream.kv_prefix
        );
        Some(running.task)
    }

    /// Whether a loop for `map_id` is registered and has not exited.
    pub fn is_running(&self, map_id: &str) -> bool {
        self.streams()
            .get(map_id)
            .map_or(false, |running| !running.task.is_finished())
    }

    /// Registered map ids, sorted.
    pub fn stream_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.streams().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Current phase of the loop for `map_id`.
    pub fn state(&self, map_id: &str) -> Option<StreamState> {
        self.streams().get(map_id).map(|running| running.control.state())
    }

    /// Receiver observing the phases of the loop for `map_id`.
    pub fn watch_state(&self, map_id: &str) -> Option<watch::Receiver<StreamState>> {
        self.streams().get(map_id).map(|running| running.control.subscribe())
    }

    /// Stop every loop and wait for all of them to exit.
    pub async fn shutdown(&self) {
        let running: Vec<(String, RunningStream)> = self.streams().drain().collect();
        for (_, stream) in &running {
            stream.control.stop();
        }

        for (map_id, stream) in running {
            match stream.task.await {
                Ok(cursor) => log::info!(
                    "[{}] Map listener shut down at offset {:?}",
                    map_id,
                    cursor.offset()
                ),
                Err(e) => log::error!("[{}] Map listener task failed: {}", map_id, e),
            }
        }
    }
}

impl Drop for StreamRegistry {
    fn drop(&mut self) {
        for running in self.streams().values() {
            running.control.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    use crate::events::MapEvent;
    use crate::feed::SimMapFeed;
    use crate::listener::FnConsumer;

    fn noop_consumer() -> Arc<dyn EventConsumer> {
        Arc::new(FnConsumer::new(|_timestamp: DateTime<Utc>, _event: MapEvent| async {
            Ok::<(), anyhow::Error>(())
        }))
    }

    async fn reach(registry: &StreamRegistry, map_id: &str, state: StreamState) {
        let mut rx = registry.watch_state(map_id).unwrap();
        rx.wait_for(|s| *s == state).await.unwrap();
    }

    #[tokio::test]
    async fn test_add_stream_is_idempotent() {
        let registry = StreamRegistry::new(SimMapFeed::new());

        assert!(registry.add_stream("map-a", "prefix", noop_consumer(), None));
        assert!(!registry.add_stream("map-a", "prefix", noop_consumer(), None));
        assert!(registry.add_stream("map-b", "prefix", noop_consumer(), None));

        assert_eq!(registry.stream_ids(), vec!["map-a".to_string(), "map-b".to_string()]);
        assert!(registry.is_running("map-a"));

        registry.shutdown().await;
        assert!(registry.stream_ids().is_empty());
    }

    #[test]
    fn test_zero_batch_size_is_raised() {
        let config = ListenerConfig {
            batch_size: 0,
            ..ListenerConfig::default()
        };
        let registry = StreamRegistry::with_config(SimMapFeed::new(), config);
        assert_eq!(registry.config().batch_size, 1);
    }

    #[tokio::test]
    async fn test_remove_stream_stops_loop() {
        let registry = StreamRegistry::new(SimMapFeed::new());
        registry.add_stream("map", "prefix", noop_consumer(), None);
        reach(&registry, "map", StreamState::Waiting).await;

        let handle = registry.remove_stream("map").unwrap();
        let cursor = handle.await.unwrap();

        assert_eq!(cursor.offset(), None);
        assert!(!registry.is_running("map"));
        assert_eq!(registry.state("map"), None);
        assert!(registry.remove_stream("map").is_none());
    }

    #[tokio::test]
    async fn test_stream_can_be_added_again_after_removal() {
        let registry = StreamRegistry::new(SimMapFeed::new());
        registry.add_stream("map", "prefix", noop_consumer(), None);
        registry.remove_stream("map").unwrap().await.unwrap();

        assert!(registry.add_stream("map", "prefix", noop_consumer(), Some("5".into())));
        reach(&registry, "map", StreamState::Waiting).await;

        let cursor = registry.remove_stream("map").unwrap().await.unwrap();
        assert_eq!(cursor.offset(), Some("5"));
    }
}
