//! Expansion of bundled feed entries into ordered event sequences.
//!
//! One feed entry carries a primary event and, optionally, an `additional`
//! list of events produced by the same operation. Consumers always see the
//! primary first, then the additional events in bundle order.

use serde::Serialize;
use serde_json::Value;

use super::event::{decode, MapEvent, RawEnvelope};
use super::EventError;

/// What to do with events that cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownEventPolicy {
    /// Fail the whole entry.
    Strict,
    /// Drop the offending event (or the whole entry when the primary event is
    /// the one that fails) and keep going.
    #[default]
    SkipUnknown,
}

impl UnknownEventPolicy {
    pub(crate) fn tolerate(self, map_id: &str, error: EventError) -> Result<(), EventError> {
        match self {
            UnknownEventPolicy::Strict => Err(error),
            UnknownEventPolicy::SkipUnknown => {
                log::warn!("[{}] Skipping event: {}", map_id, error);
                Ok(())
            }
        }
    }
}

/// Raw decoded form of one feed entry. Never delivered directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundEntry {
    #[serde(flatten)]
    pub primary: RawEnvelope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional: Option<Vec<Value>>,
}

impl CompoundEntry {
    /// Split an entry value into its primary envelope and the raw additional
    /// envelopes. Additional envelopes stay undecoded so each one can fail on
    /// its own.
    pub fn from_value(mut value: Value) -> Result<Self, EventError> {
        let additional = match value.as_object_mut().and_then(|fields| fields.remove("additional")) {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(items),
            Some(other) => {
                return Err(EventError::malformed(
                    "envelope",
                    format!("`additional` must be a list, got {}", other),
                ))
            }
        };
        let primary = RawEnvelope::from_value(value)?;
        Ok(Self { primary, additional })
    }
}

/// Decode one feed entry into `[primary, additional[0], additional[1], ...]`.
///
/// Additional events without an actor inherit the primary event's `who`.
pub fn expand(
    map_id: &str,
    value: Value,
    policy: UnknownEventPolicy,
) -> Result<Vec<MapEvent>, EventError> {
    let entry = match CompoundEntry::from_value(value) {
        Ok(entry) => entry,
        Err(e) => {
            policy.tolerate(map_id, e)?;
            return Ok(Vec::new());
        }
    };

    let who = entry.primary.who.clone();
    let additional = entry.additional.unwrap_or_default();
    let mut events = Vec::with_capacity(1 + additional.len());

    match decode(entry.primary) {
        Ok(event) => events.push(event),
        Err(e) => {
            policy.tolerate(map_id, e)?;
            return Ok(events);
        }
    }

    for raw in additional {
        let decoded = RawEnvelope::from_value(raw).and_then(|mut envelope| {
            if envelope.who.is_none() {
                envelope.who = who.clone();
            }
            decode(envelope)
        });
        match decoded {
            Ok(event) => events.push(event),
            Err(e) => policy.tolerate(map_id, e)?,
        }
    }

    Ok(events)
}
