//! The closed set of event kinds carried by a map feed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::EventError;

/// Every event category a map feed can emit.
///
/// The wire name of each kind is its snake_case spelling (`node_updated`,
/// `branch_access_denied`, ...). Adding a kind here forces every match over
/// `EventKind` and [`EventBody`](super::EventBody) to be extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NodeUpdated,
    NodeTypeUpdated,
    NodeCreated,
    NodeDeleted,
    NodeTagged,
    NodeUntagged,
    NodeMoved,
    BranchDeleted,
    BranchMoved,
    CommentPushed,
    CommentUpdated,
    CommentDeleted,
    CommentAllRead,
    DialogShow,
    DialogResult,
    NotificationShow,
    UrlShow,
    SearchQuerySaved,
    SearchQueryDeleted,
    CommandPushed,
    CommandDeleted,
    NodeCopied,
    BranchCopied,
    BranchAccessDenied,
    NodeAccessDenied,
    BranchAccessGranted,
    NodeAccessGranted,
    BranchSubscriptionGranted,
    BranchSubscriptionDenied,
    NodeSubscriptionGranted,
    NodeSubscriptionDenied,
}

impl EventKind {
    /// All kinds, in declaration order.
    pub const ALL: [EventKind; 31] = [
        EventKind::NodeUpdated,
        EventKind::NodeTypeUpdated,
        EventKind::NodeCreated,
        EventKind::NodeDeleted,
        EventKind::NodeTagged,
        EventKind::NodeUntagged,
        EventKind::NodeMoved,
        EventKind::BranchDeleted,
        EventKind::BranchMoved,
        EventKind::CommentPushed,
        EventKind::CommentUpdated,
        EventKind::CommentDeleted,
        EventKind::CommentAllRead,
        EventKind::DialogShow,
        EventKind::DialogResult,
        EventKind::NotificationShow,
        EventKind::UrlShow,
        EventKind::SearchQuerySaved,
        EventKind::SearchQueryDeleted,
        EventKind::CommandPushed,
        EventKind::CommandDeleted,
        EventKind::NodeCopied,
        EventKind::BranchCopied,
        EventKind::BranchAccessDenied,
        EventKind::NodeAccessDenied,
        EventKind::BranchAccessGranted,
        EventKind::NodeAccessGranted,
        EventKind::BranchSubscriptionGranted,
        EventKind::BranchSubscriptionDenied,
        EventKind::NodeSubscriptionGranted,
        EventKind::NodeSubscriptionDenied,
    ];

    /// The wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NodeUpdated => "node_updated",
            EventKind::NodeTypeUpdated => "node_type_updated",
            EventKind::NodeCreated => "node_created",
            EventKind::NodeDeleted => "node_deleted",
            EventKind::NodeTagged => "node_tagged",
            EventKind::NodeUntagged => "node_untagged",
            EventKind::NodeMoved => "node_moved",
            EventKind::BranchDeleted => "branch_deleted",
            EventKind::BranchMoved => "branch_moved",
            EventKind::CommentPushed => "comment_pushed",
            EventKind::CommentUpdated => "comment_updated",
            EventKind::CommentDeleted => "comment_deleted",
            EventKind::CommentAllRead => "comment_all_read",
            EventKind::DialogShow => "dialog_show",
            EventKind::DialogResult => "dialog_result",
            EventKind::NotificationShow => "notification_show",
            EventKind::UrlShow => "url_show",
            EventKind::SearchQuerySaved => "search_query_saved",
            EventKind::SearchQueryDeleted => "search_query_deleted",
            EventKind::CommandPushed => "command_pushed",
            EventKind::CommandDeleted => "command_deleted",
            EventKind::NodeCopied => "node_copied",
            EventKind::BranchCopied => "branch_copied",
            EventKind::BranchAccessDenied => "branch_access_denied",
            EventKind::NodeAccessDenied => "node_access_denied",
            EventKind::BranchAccessGranted => "branch_access_granted",
            EventKind::NodeAccessGranted => "node_access_granted",
            EventKind::BranchSubscriptionGranted => "branch_subscription_granted",
            EventKind::BranchSubscriptionDenied => "branch_subscription_denied",
            EventKind::NodeSubscriptionGranted => "node_subscription_granted",
            EventKind::NodeSubscriptionDenied => "node_subscription_denied",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EventError::UnknownEventKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip_through_from_str() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_wire_names_match_serde() {
        for kind in EventKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::Value::String(kind.as_str().to_string()));
        }
    }

    #[test]
    fn test_all_kinds_are_distinct() {
        let mut names: Vec<&str> = EventKind::ALL.iter().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), EventKind::ALL.len());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        match "unknown_event".parse::<EventKind>() {
            Err(EventError::UnknownEventKind(name)) => assert_eq!(name, "unknown_event"),
            other => panic!("expected UnknownEventKind, got {:?}", other),
        }
    }
}
