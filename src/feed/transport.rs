//! Feed transport trait definitions and core types
//!
//! Defines the abstract change-feed interface that both the simulated feed
//! and the HTTP client conform to.

use std::cmp::Ordering;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::FeedError;

/// Position of an entry in a feed.
///
/// Keys compare component-wise as strings. The last component is the entry
/// offset; a key always has at least one component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeedKey(Vec<String>);

impl FeedKey {
    pub fn new(components: Vec<String>) -> Result<Self, FeedError> {
        if components.is_empty() {
            return Err(FeedError::InvalidResponse("feed key has no components".into()));
        }
        Ok(Self(components))
    }

    /// Single-component key.
    pub fn from_offset(offset: impl Into<String>) -> Self {
        Self(vec![offset.into()])
    }

    pub fn components(&self) -> &[String] {
        &self.0
    }

    /// The last component.
    pub fn offset(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }
}

impl TryFrom<Vec<String>> for FeedKey {
    type Error = FeedError;

    fn try_from(components: Vec<String>) -> Result<Self, Self::Error> {
        FeedKey::new(components)
    }
}

impl From<FeedKey> for Vec<String> {
    fn from(key: FeedKey) -> Self {
        key.0
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// One entry as returned by a feed: its key and the undecoded value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub key: FeedKey,
    pub value: Value,
}

impl FeedEntry {
    pub fn new(key: FeedKey, value: Value) -> Self {
        Self { key, value }
    }

    /// Orders by offset first so that selection and ordering agree on
    /// multi-component keys. Ties fall back to the full key.
    pub fn offset_order(&self, other: &Self) -> Ordering {
        self.key
            .offset()
            .cmp(other.key.offset())
            .then_with(|| self.key.cmp(&other.key))
    }
}

/// Keep the entries whose offset is strictly after `after`, ascending by
/// offset, at most `limit` of them.
pub fn entries_after(
    entries: impl IntoIterator<Item = FeedEntry>,
    after: Option<&str>,
    limit: usize,
) -> Vec<FeedEntry> {
    let mut selected: Vec<FeedEntry> = entries
        .into_iter()
        .filter(|entry| after.map_or(true, |after| entry.key.offset() > after))
        .collect();
    selected.sort_by(FeedEntry::offset_order);
    selected.truncate(limit);
    selected
}

/// The feed's notion of its most recent position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    /// Offset of the newest entry, or `None` for an empty feed.
    #[serde(rename = "value")]
    pub last_value: Option<String>,
    /// Opaque token to long-poll past.
    pub version: String,
}

/// Remote, offset-addressable change feed of one or more maps.
#[async_trait]
pub trait MapFeed: Send + Sync {
    /// Current newest offset and version token.
    async fn get_watermark(&self, map_id: &str, kv_prefix: &str) -> Result<Watermark, FeedError>;

    /// Up to `limit` entries whose offset is strictly after `after`,
    /// ascending by offset.
    async fn get_entries(
        &self,
        map_id: &str,
        kv_prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<FeedEntry>, FeedError>;

    /// Block until the version differs from `known_version`.
    /// Returns `None` when the wait timed out without a change.
    async fn wait_for_watermark_change(
        &self,
        map_id: &str,
        kv_prefix: &str,
        known_version: &str,
    ) -> Result<Option<Watermark>, FeedError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feed_key_orders_component_wise() {
        let a = FeedKey::new(vec!["a".into(), "2".into()]).unwrap();
        let b = FeedKey::new(vec!["a".into(), "10".into()]).unwrap();
        let c = FeedKey::new(vec!["b".into(), "0".into()]).unwrap();

        // string comparison, not numeric
        assert!(b < a);
        assert!(a < c);
        assert_eq!(a.offset(), "2");
    }

    #[test]
    fn test_empty_feed_key_is_rejected() {
        assert!(FeedKey::new(Vec::new()).is_err());
        assert!(serde_json::from_value::<FeedKey>(json!([])).is_err());
    }

    #[test]
    fn test_feed_entry_wire_shape() {
        let entry: FeedEntry = serde_json::from_value(json!({
            "key": ["prefix", "1600000000000"],
            "value": { "type": "node_updated", "what": "n" },
        }))
        .unwrap();
        assert_eq!(entry.key.offset(), "1600000000000");
        assert_eq!(entry.key.to_string(), "prefix/1600000000000");
    }

    fn entry(components: &[&str]) -> FeedEntry {
        let key = FeedKey::new(components.iter().map(|c| c.to_string()).collect()).unwrap();
        FeedEntry::new(key, json!({}))
    }

    #[test]
    fn test_entries_after_orders_by_offset() {
        let entries = vec![entry(&["b", "1"]), entry(&["a", "2"]), entry(&["c", "0"])];

        let selected = entries_after(entries, Some("0"), 10);
        let offsets: Vec<&str> = selected.iter().map(|e| e.key.offset()).collect();
        assert_eq!(offsets, vec!["1", "2"]);
    }

    #[test]
    fn test_entries_after_applies_limit_after_filtering() {
        let entries = vec![entry(&["0"]), entry(&["1"]), entry(&["2"]), entry(&["3"])];

        let selected = entries_after(entries, Some("1"), 1);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].key.offset(), "2");
        assert_eq!(entries_after(vec![entry(&["0"])], None, 5).len(), 1);
    }

    #[test]
    fn test_watermark_wire_shape() {
        let watermark: Watermark =
            serde_json::from_value(json!({ "value": null, "version": "0" })).unwrap();
        assert_eq!(watermark.last_value, None);
        assert_eq!(watermark.version, "0");
    }
}
