//! Change-feed collaborators
//!
//! Provides the feed abstraction the listener polls, an in-process simulated
//! feed for tests and demos, and an HTTP client for the remote KV service.

pub mod http;
pub mod simulated;
pub mod transport;

use thiserror::Error;

pub use http::{HttpFeedConfig, HttpMapFeed};
pub use simulated::SimMapFeed;
pub use transport::{entries_after, FeedEntry, FeedKey, MapFeed, Watermark};

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid feed response: {0}")]
    InvalidResponse(String),

    #[error("Invalid feed configuration: {0}")]
    InvalidConfig(String),
}
