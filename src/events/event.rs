//! Raw envelopes and their decoding into typed map events.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::kind::EventKind;
use super::payload::{CommandPushedData, EventUser, NodeTaggedData, SearchQuerySavedData};
use super::EventError;

/// The generic, not yet validated form of a single event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub what: Option<String>,
    #[serde(
        default,
        rename = "sessionId",
        alias = "session_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub who: Option<EventUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RawEnvelope {
    /// Parse an envelope out of a JSON value.
    ///
    /// The `type` field is inspected first: an unrecognised kind is reported
    /// as `UnknownEventKind` even when the rest of the envelope is broken.
    pub fn from_value(value: Value) -> Result<Self, EventError> {
        let kind = value.get("type").and_then(Value::as_str).map(str::to_string);
        serde_json::from_value(value).map_err(|e| match kind {
            Some(kind) => match kind.parse::<EventKind>() {
                Err(unknown) => unknown,
                Ok(_) => EventError::malformed(&kind, e),
            },
            None => EventError::malformed("envelope", e),
        })
    }
}

/// Kind-specific payload of a [`MapEvent`].
///
/// Kinds without a fixed schema keep their `data` as raw JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    NodeUpdated(Option<Value>),
    NodeTypeUpdated(Option<Value>),
    NodeCreated(Option<Value>),
    NodeDeleted(Option<Value>),
    NodeTagged(NodeTaggedData),
    NodeUntagged(Option<Value>),
    NodeMoved(Option<Value>),
    BranchDeleted(Option<Value>),
    BranchMoved(Option<Value>),
    CommentPushed(Option<Value>),
    CommentUpdated(Option<Value>),
    CommentDeleted(Option<Value>),
    CommentAllRead(Option<Value>),
    DialogShow(Option<Value>),
    DialogResult(Option<Value>),
    NotificationShow(Option<Value>),
    UrlShow(Option<Value>),
    SearchQuerySaved(SearchQuerySavedData),
    SearchQueryDeleted(Option<Value>),
    CommandPushed(CommandPushedData),
    CommandDeleted(Option<Value>),
    NodeCopied(Option<Value>),
    BranchCopied(Option<Value>),
    BranchAccessDenied(Option<Value>),
    NodeAccessDenied(Option<Value>),
    BranchAccessGranted(Option<Value>),
    NodeAccessGranted(Option<Value>),
    BranchSubscriptionGranted(Option<Value>),
    BranchSubscriptionDenied(Option<Value>),
    NodeSubscriptionGranted(Option<Value>),
    NodeSubscriptionDenied(Option<Value>),
}

fn typed<T: DeserializeOwned>(kind: EventKind, data: Option<Value>) -> Result<T, EventError> {
    let data = data.ok_or_else(|| EventError::malformed(kind.as_str(), "missing `data`"))?;
    serde_json::from_value(data).map_err(|e| EventError::malformed(kind.as_str(), e))
}

impl EventBody {
    /// Re-type a raw `data` value according to `kind`.
    pub fn decode(kind: EventKind, data: Option<Value>) -> Result<Self, EventError> {
        let body = match kind {
            EventKind::NodeUpdated => EventBody::NodeUpdated(data),
            EventKind::NodeTypeUpdated => EventBody::NodeTypeUpdated(data),
            EventKind::NodeCreated => EventBody::NodeCreated(data),
            EventKind::NodeDeleted => EventBody::NodeDeleted(data),
            EventKind::NodeTagged => EventBody::NodeTagged(typed(kind, data)?),
            EventKind::NodeUntagged => EventBody::NodeUntagged(data),
            EventKind::NodeMoved => EventBody::NodeMoved(data),
            EventKind::BranchDeleted => EventBody::BranchDeleted(data),
            EventKind::BranchMoved => EventBody::BranchMoved(data),
            EventKind::CommentPushed => EventBody::CommentPushed(data),
            EventKind::CommentUpdated => EventBody::CommentUpdated(data),
            EventKind::CommentDeleted => EventBody::CommentDeleted(data),
            EventKind::CommentAllRead => EventBody::CommentAllRead(data),
            EventKind::DialogShow => EventBody::DialogShow(data),
            EventKind::DialogResult => EventBody::DialogResult(data),
            EventKind::NotificationShow => EventBody::NotificationShow(data),
            EventKind::UrlShow => EventBody::UrlShow(data),
            EventKind::SearchQuerySaved => EventBody::SearchQuerySaved(typed(kind, data)?),
            EventKind::SearchQueryDeleted => EventBody::SearchQueryDeleted(data),
            EventKind::CommandPushed => EventBody::CommandPushed(typed(kind, data)?),
            EventKind::CommandDeleted => EventBody::CommandDeleted(data),
            EventKind::NodeCopied => EventBody::NodeCopied(data),
            EventKind::BranchCopied => EventBody::BranchCopied(data),
            EventKind::BranchAccessDenied => EventBody::BranchAccessDenied(data),
            EventKind::NodeAccessDenied => EventBody::NodeAccessDenied(data),
            EventKind::BranchAccessGranted => EventBody::BranchAccessGranted(data),
            EventKind::NodeAccessGranted => EventBody::NodeAccessGranted(data),
            EventKind::BranchSubscriptionGranted => EventBody::BranchSubscriptionGranted(data),
            EventKind::BranchSubscriptionDenied => EventBody::BranchSubscriptionDenied(data),
            EventKind::NodeSubscriptionGranted => EventBody::NodeSubscriptionGranted(data),
            EventKind::NodeSubscriptionDenied => EventBody::NodeSubscriptionDenied(data),
        };
        Ok(body)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            EventBody::NodeUpdated(_) => EventKind::NodeUpdated,
            EventBody::NodeTypeUpdated(_) => EventKind::NodeTypeUpdated,
            EventBody::NodeCreated(_) => EventKind::NodeCreated,
            EventBody::NodeDeleted(_) => EventKind::NodeDeleted,
            EventBody::NodeTagged(_) => EventKind::NodeTagged,
            EventBody::NodeUntagged(_) => EventKind::NodeUntagged,
            EventBody::NodeMoved(_) => EventKind::NodeMoved,
            EventBody::BranchDeleted(_) => EventKind::BranchDeleted,
            EventBody::BranchMoved(_) => EventKind::BranchMoved,
            EventBody::CommentPushed(_) => EventKind::CommentPushed,
            EventBody::CommentUpdated(_) => EventKind::CommentUpdated,
            EventBody::CommentDeleted(_) => EventKind::CommentDeleted,
            EventBody::CommentAllRead(_) => EventKind::CommentAllRead,
            EventBody::DialogShow(_) => EventKind::DialogShow,
            EventBody::DialogResult(_) => EventKind::DialogResult,
            EventBody::NotificationShow(_) => EventKind::NotificationShow,
            EventBody::UrlShow(_) => EventKind::UrlShow,
            EventBody::SearchQuerySaved(_) => EventKind::SearchQuerySaved,
            EventBody::SearchQueryDeleted(_) => EventKind::SearchQueryDeleted,
            EventBody::CommandPushed(_) => EventKind::CommandPushed,
            EventBody::CommandDeleted(_) => EventKind::CommandDeleted,
            EventBody::NodeCopied(_) => EventKind::NodeCopied,
            EventBody::BranchCopied(_) => EventKind::BranchCopied,
            EventBody::BranchAccessDenied(_) => EventKind::BranchAccessDenied,
            EventBody::NodeAccessDenied(_) => EventKind::NodeAccessDenied,
            EventBody::BranchAccessGranted(_) => EventKind::BranchAccessGranted,
            EventBody::NodeAccessGranted(_) => EventKind::NodeAccessGranted,
            EventBody::BranchSubscriptionGranted(_) => EventKind::BranchSubscriptionGranted,
            EventBody::BranchSubscriptionDenied(_) => EventKind::BranchSubscriptionDenied,
            EventBody::NodeSubscriptionGranted(_) => EventKind::NodeSubscriptionGranted,
            EventBody::NodeSubscriptionDenied(_) => EventKind::NodeSubscriptionDenied,
        }
    }

    /// Untyped `data`, for kinds without a fixed payload schema.
    pub fn raw_data(&self) -> Option<&Value> {
        match self {
            EventBody::NodeTagged(_) | EventBody::SearchQuerySaved(_) | EventBody::CommandPushed(_) => {
                None
            }
            EventBody::NodeUpdated(data)
            | EventBody::NodeTypeUpdated(data)
            | EventBody::NodeCreated(data)
            | EventBody::NodeDeleted(data)
            | EventBody::NodeUntagged(data)
            | EventBody::NodeMoved(data)
            | EventBody::BranchDeleted(data)
            | EventBody::BranchMoved(data)
            | EventBody::CommentPushed(data)
            | EventBody::CommentUpdated(data)
            | EventBody::CommentDeleted(data)
            | EventBody::CommentAllRead(data)
            | EventBody::DialogShow(data)
            | EventBody::DialogResult(data)
            | EventBody::NotificationShow(data)
            | EventBody::UrlShow(data)
            | EventBody::SearchQueryDeleted(data)
            | EventBody::CommandDeleted(data)
            | EventBody::NodeCopied(data)
            | EventBody::BranchCopied(data)
            | EventBody::BranchAccessDenied(data)
            | EventBody::NodeAccessDenied(data)
            | EventBody::BranchAccessGranted(data)
            | EventBody::NodeAccessGranted(data)
            | EventBody::BranchSubscriptionGranted(data)
            | EventBody::BranchSubscriptionDenied(data)
            | EventBody::NodeSubscriptionGranted(data)
            | EventBody::NodeSubscriptionDenied(data) => data.as_ref(),
        }
    }

    fn wire_data(&self) -> Option<WireData<'_>> {
        match self {
            EventBody::NodeTagged(data) => Some(WireData::NodeTagged(data)),
            EventBody::SearchQuerySaved(data) => Some(WireData::SearchQuerySaved(data)),
            EventBody::CommandPushed(data) => Some(WireData::CommandPushed(data)),
            other => other.raw_data().map(WireData::Raw),
        }
    }
}

/// A decoded, strongly typed map event.
///
/// Built once by [`decode`] (or the builder methods in tests and tooling) and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawEnvelope")]
pub struct MapEvent {
    what: String,
    session_id: Option<String>,
    who: Option<EventUser>,
    body: EventBody,
}

impl MapEvent {
    pub fn new(what: impl Into<String>, body: EventBody) -> Self {
        Self {
            what: what.into(),
            session_id: None,
            who: None,
            body,
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_who(mut self, who: EventUser) -> Self {
        self.who = Some(who);
        self
    }

    pub fn kind(&self) -> EventKind {
        self.body.kind()
    }

    /// Opaque identifier of the event's subject (usually a node id).
    pub fn what(&self) -> &str {
        &self.what
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn who(&self) -> Option<&EventUser> {
        self.who.as_ref()
    }

    pub fn body(&self) -> &EventBody {
        &self.body
    }

    /// Raw payload of kinds without a fixed schema.
    pub fn data(&self) -> Option<&Value> {
        self.body.raw_data()
    }

    /// Encode back into the wire envelope shape.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

impl TryFrom<RawEnvelope> for MapEvent {
    type Error = EventError;

    fn try_from(envelope: RawEnvelope) -> Result<Self, Self::Error> {
        decode(envelope)
    }
}

/// Map `envelope.kind` to its concrete variant and re-type its fields.
pub fn decode(envelope: RawEnvelope) -> Result<MapEvent, EventError> {
    let kind: EventKind = envelope.kind.parse()?;
    let what = envelope
        .what
        .ok_or_else(|| EventError::malformed(kind.as_str(), "missing `what`"))?;
    let body = EventBody::decode(kind, envelope.data)?;
    Ok(MapEvent {
        what,
        session_id: envelope.session_id,
        who: envelope.who,
        body,
    })
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireData<'a> {
    Raw(&'a Value),
    NodeTagged(&'a NodeTaggedData),
    SearchQuerySaved(&'a SearchQuerySavedData),
    CommandPushed(&'a CommandPushedData),
}

#[derive(Serialize)]
struct WireEvent<'a> {
    #[serde(rename = "type")]
    kind: EventKind,
    what: &'a str,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    who: Option<&'a EventUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<WireData<'a>>,
}

impl Serialize for MapEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireEvent {
            kind: self.kind(),
            what: &self.what,
            session_id: self.session_id.as_deref(),
            who: self.who.as_ref(),
            data: self.body.wire_data(),
        }
        .serialize(serializer)
    }
}
