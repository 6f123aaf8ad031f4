//! Map listeners
//!
//! Consumes any number of map feeds concurrently. Each registered map gets
//! its own [`StreamLoop`] task that fetches entries after its cursor, expands
//! them into typed events, hands them to an [`EventConsumer`] in feed order,
//! and long-polls the feed once it has caught up. Failures never leave the
//! loop: they are logged and retried after a fixed delay.

pub mod consumer;
pub mod cursor;
pub mod registry;
pub mod stream_loop;

use std::time::Duration;

use thiserror::Error;

use crate::events::{EventError, UnknownEventPolicy};
use crate::feed::FeedError;

pub use consumer::{EventConsumer, FnConsumer};
pub use cursor::{offset_timestamp, StreamCursor};
pub use registry::StreamRegistry;
pub use stream_loop::{MapStream, StreamControl, StreamLoop, StreamState};

/// Settings shared by every stream of a registry.
#[derive(Clone, Debug)]
pub struct ListenerConfig {
    /// Maximum entries fetched per request.
    pub batch_size: usize,
    /// Pause after a failure before restarting the stream.
    pub retry_delay: Duration,
    pub unknown_events: UnknownEventPolicy,
}

impl ListenerConfig {
    /// Raise a zero `batch_size` to one. A zero-sized fetch never drains the
    /// stream, so the loop would keep catching up without ever waiting.
    pub fn normalized(mut self) -> Self {
        if self.batch_size == 0 {
            log::warn!("Listener batch_size of 0 is unusable, using 1");
            self.batch_size = 1;
        }
        self
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            retry_delay: Duration::from_secs(60),
            unknown_events: UnknownEventPolicy::SkipUnknown,
        }
    }
}

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Consumer failed at offset {offset}: {source}")]
    Consumer {
        offset: String,
        #[source]
        source: anyhow::Error,
    },
}
