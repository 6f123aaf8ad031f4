//! Typed map events
//!
//! Feed entries arrive as loosely shaped JSON envelopes (`type`, `what`,
//! `sessionId`, `who`, `data`, `additional`). This module turns them into a
//! closed set of typed events:
//!
//! - [`EventKind`]: every category a feed can emit.
//! - [`MapEvent`] / [`EventBody`]: the decoded event with its kind-specific
//!   payload.
//! - [`EventVisitor`]: per-kind handlers with a shared default.
//! - [`expand`]: flattening of a bundled entry into `[primary, additional...]`.

pub mod compound;
pub mod event;
pub mod kind;
pub mod payload;
pub mod visitor;

use std::fmt;

use thiserror::Error;

pub use compound::{expand, CompoundEntry, UnknownEventPolicy};
pub use event::{decode, EventBody, MapEvent, RawEnvelope};
pub use kind::EventKind;
pub use payload::{
    BufferCommand, BufferCommandMeta, BufferCommandType, CommandPushedData, EventUser, MapRef,
    NodeTaggedData, SearchQuerySavedData, TaggedNode, TaggedNodeType,
};
pub use visitor::{dispatch, EventVisitor};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),

    #[error("Malformed {kind} payload: {reason}")]
    MalformedPayload { kind: String, reason: String },
}

impl EventError {
    pub(crate) fn malformed(kind: &str, reason: impl fmt::Display) -> Self {
        EventError::MalformedPayload {
            kind: kind.to_string(),
            reason: reason.to_string(),
        }
    }
}
