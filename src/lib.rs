// Mapstream - typed consumer for map change feeds

pub mod events;
pub mod feed;
pub mod listener;

pub use events::{EventError, EventKind, EventVisitor, MapEvent, UnknownEventPolicy};
pub use feed::{FeedError, HttpMapFeed, MapFeed, SimMapFeed};
pub use listener::{EventConsumer, ListenerConfig, ListenerError, StreamRegistry, StreamState};
