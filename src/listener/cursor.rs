//! Per-stream offset bookkeeping.

use chrono::{DateTime, TimeZone, Utc};

use crate::events::EventError;
use crate::feed::Watermark;

/// Progress of one stream: the last fully processed offset and the last
/// watermark seen. Owned by that stream's loop only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamCursor {
    offset: Option<String>,
    watermark: Option<Watermark>,
    seeded: bool,
}

impl StreamCursor {
    /// `initial_offset` of `None` means "start at the current watermark".
    pub fn new(initial_offset: Option<String>) -> Self {
        Self {
            offset: initial_offset,
            watermark: None,
            seeded: false,
        }
    }

    pub fn offset(&self) -> Option<&str> {
        self.offset.as_deref()
    }

    pub fn watermark(&self) -> Option<&Watermark> {
        self.watermark.as_ref()
    }

    /// Record a freshly read watermark at (re)start.
    ///
    /// On the first start without an initial offset the stream begins after
    /// the watermark's last value. Restarts keep whatever offset was reached,
    /// including "nothing processed yet", so entries are never skipped.
    pub fn start(&mut self, watermark: Watermark) {
        if !self.seeded {
            if self.offset.is_none() {
                self.offset = watermark.last_value.clone();
            }
            self.seeded = true;
        }
        self.watermark = Some(watermark);
    }

    /// Record a watermark returned by a long-poll.
    pub fn observe(&mut self, watermark: Watermark) {
        self.watermark = Some(watermark);
    }

    /// Move the offset forward to `offset`.
    ///
    /// Offsets compare as strings. Returns `false`, leaving the cursor as is,
    /// when `offset` is not past the current one.
    pub fn advance(&mut self, offset: &str) -> bool {
        if !self.is_past(offset) {
            log::warn!("Ignoring offset {} not past current offset {:?}", offset, self.offset);
            return false;
        }
        self.offset = Some(offset.to_string());
        true
    }

    /// Whether `offset` is strictly after the current offset.
    pub fn is_past(&self, offset: &str) -> bool {
        self.offset.as_deref().map_or(true, |current| offset > current)
    }
}

/// Interpret an entry offset as epoch milliseconds.
pub fn offset_timestamp(offset: &str) -> Result<DateTime<Utc>, EventError> {
    let millis: i64 = offset
        .parse()
        .map_err(|e| EventError::malformed("offset", format!("{:?}: {}", offset, e)))?;
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| EventError::malformed("offset", format!("{} is out of range", millis)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watermark(last_value: Option<&str>, version: &str) -> Watermark {
        Watermark {
            last_value: last_value.map(str::to_string),
            version: version.to_string(),
        }
    }

    #[test]
    fn test_start_seeds_offset_from_watermark() {
        let mut cursor = StreamCursor::new(None);
        cursor.start(watermark(Some("5"), "6"));
        assert_eq!(cursor.offset(), Some("5"));
        assert_eq!(cursor.watermark().map(|w| w.version.as_str()), Some("6"));
    }

    #[test]
    fn test_start_keeps_initial_offset() {
        let mut cursor = StreamCursor::new(Some("1".into()));
        cursor.start(watermark(Some("5"), "6"));
        assert_eq!(cursor.offset(), Some("1"));
    }

    #[test]
    fn test_start_on_empty_stream_leaves_offset_unset() {
        let mut cursor = StreamCursor::new(None);
        cursor.start(watermark(None, "0"));
        assert_eq!(cursor.offset(), None);
    }

    #[test]
    fn test_restart_does_not_reseed_offset() {
        let mut cursor = StreamCursor::new(None);
        cursor.start(watermark(None, "0"));
        cursor.start(watermark(Some("0"), "1"));
        assert_eq!(cursor.offset(), None);
    }

    #[test]
    fn test_advance_only_moves_forward() {
        let mut cursor = StreamCursor::new(None);
        assert!(cursor.advance("1"));
        assert!(cursor.advance("2"));
        assert!(!cursor.advance("2"));
        assert!(!cursor.advance("1"));
        assert_eq!(cursor.offset(), Some("2"));
    }

    #[test]
    fn test_is_past() {
        let mut cursor = StreamCursor::new(None);
        assert!(cursor.is_past("0"));

        cursor.advance("5");
        assert!(cursor.is_past("6"));
        assert!(!cursor.is_past("5"));
        assert!(!cursor.is_past("4"));
    }

    #[test]
    fn test_observe_replaces_watermark_only() {
        let mut cursor = StreamCursor::new(Some("3".into()));
        cursor.observe(watermark(Some("9"), "10"));
        assert_eq!(cursor.offset(), Some("3"));
        assert_eq!(cursor.watermark().and_then(|w| w.last_value.as_deref()), Some("9"));
    }

    #[test]
    fn test_offset_timestamp() {
        assert_eq!(offset_timestamp("0").unwrap().timestamp_millis(), 0);
        assert_eq!(offset_timestamp("1600000000123").unwrap().timestamp_millis(), 1_600_000_000_123);
        assert!(matches!(
            offset_timestamp("abc"),
            Err(EventError::MalformedPayload { .. })
        ));
    }
}
