//! The consumer side of a stream: where decoded events are delivered.

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::events::MapEvent;

/// Receives the events of one stream, in feed order.
///
/// A failing `consume` or `commit` makes the listener back off and redeliver
/// the whole entry later, so implementations must tolerate duplicates.
#[async_trait]
pub trait EventConsumer: Send + Sync {
    /// Handle one event. `timestamp` is the entry offset read as epoch
    /// milliseconds.
    async fn consume(&self, timestamp: DateTime<Utc>, event: MapEvent) -> anyhow::Result<()>;

    /// Called after every event of the entry at `offset` was consumed.
    /// Override to persist progress.
    async fn commit(&self, _offset: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once when the stream stops.
    async fn close(&self) {}
}

/// Adapts an async closure into an [`EventConsumer`].
pub struct FnConsumer<F> {
    f: F,
}

impl<F> FnConsumer<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> EventConsumer for FnConsumer<F>
where
    F: Fn(DateTime<Utc>, MapEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn consume(&self, timestamp: DateTime<Utc>, event: MapEvent) -> anyhow::Result<()> {
        (self.f)(timestamp, event).await
    }
}
