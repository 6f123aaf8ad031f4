//! Single dispatch of typed events to per-kind handlers.

use super::event::{EventBody, MapEvent};
use super::payload::{CommandPushedData, NodeTaggedData, SearchQuerySavedData};

/// Handler with one method per [`EventKind`](super::EventKind).
///
/// Every method falls back to [`EventVisitor::default_result`], so an
/// implementation only overrides the kinds it cares about and keeps compiling
/// when new kinds are added.
pub trait EventVisitor {
    type Output;

    /// Result for kinds the visitor does not handle.
    fn default_result(&mut self, event: &MapEvent) -> Self::Output;

    fn node_updated(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn node_type_updated(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn node_created(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn node_deleted(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn node_tagged(&mut self, event: &MapEvent, _data: &NodeTaggedData) -> Self::Output {
        self.default_result(event)
    }

    fn node_untagged(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn node_moved(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn branch_deleted(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn branch_moved(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn comment_pushed(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn comment_updated(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn comment_deleted(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn comment_all_read(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn dialog_show(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn dialog_result(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn notification_show(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn url_show(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn search_query_saved(&mut self, event: &MapEvent, _data: &SearchQuerySavedData) -> Self::Output {
        self.default_result(event)
    }

    fn search_query_deleted(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn command_pushed(&mut self, event: &MapEvent, _data: &CommandPushedData) -> Self::Output {
        self.default_result(event)
    }

    fn command_deleted(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn node_copied(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn branch_copied(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn branch_access_denied(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn node_access_denied(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn branch_access_granted(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn node_access_granted(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn branch_subscription_granted(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn branch_subscription_denied(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn node_subscription_granted(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }

    fn node_subscription_denied(&mut self, event: &MapEvent) -> Self::Output {
        self.default_result(event)
    }
}

impl MapEvent {
    /// Call the visitor method matching this event's kind.
    pub fn visit<V: EventVisitor + ?Sized>(&self, visitor: &mut V) -> V::Output {
        dispatch(self, visitor)
    }
}

pub fn dispatch<V: EventVisitor + ?Sized>(event: &MapEvent, visitor: &mut V) -> V::Output {
    match event.body() {
        EventBody::NodeUpdated(_) => visitor.node_updated(event),
        EventBody::NodeTypeUpdated(_) => visitor.node_type_updated(event),
        EventBody::NodeCreated(_) => visitor.node_created(event),
        EventBody::NodeDeleted(_) => visitor.node_deleted(event),
        EventBody::NodeTagged(data) => visitor.node_tagged(event, data),
        EventBody::NodeUntagged(_) => visitor.node_untagged(event),
        EventBody::NodeMoved(_) => visitor.node_moved(event),
        EventBody::BranchDeleted(_) => visitor.branch_deleted(event),
        EventBody::BranchMoved(_) => visitor.branch_moved(event),
        EventBody::CommentPushed(_) => visitor.comment_pushed(event),
        EventBody::CommentUpdated(_) => visitor.comment_updated(event),
        EventBody::CommentDeleted(_) => visitor.comment_deleted(event),
        EventBody::CommentAllRead(_) => visitor.comment_all_read(event),
        EventBody::DialogShow(_) => visitor.dialog_show(event),
        EventBody::DialogResult(_) => visitor.dialog_result(event),
        EventBody::NotificationShow(_) => visitor.notification_show(event),
        EventBody::UrlShow(_) => visitor.url_show(event),
        EventBody::SearchQuerySaved(data) => visitor.search_query_saved(event, data),
        EventBody::SearchQueryDeleted(_) => visitor.search_query_deleted(event),
        EventBody::CommandPushed(data) => visitor.command_pushed(event, data),
        EventBody::CommandDeleted(_) => visitor.command_deleted(event),
        EventBody::NodeCopied(_) => visitor.node_copied(event),
        EventBody::BranchCopied(_) => visitor.branch_copied(event),
        EventBody::BranchAccessDenied(_) => visitor.branch_access_denied(event),
        EventBody::NodeAccessDenied(_) => visitor.node_access_denied(event),
        EventBody::BranchAccessGranted(_) => visitor.branch_access_granted(event),
        EventBody::NodeAccessGranted(_) => visitor.node_access_granted(event),
        EventBody::BranchSubscriptionGranted(_) => visitor.branch_subscription_granted(event),
        EventBody::BranchSubscriptionDenied(_) => visitor.branch_subscription_denied(event),
        EventBody::NodeSubscriptionGranted(_) => visitor.node_subscription_granted(event),
        EventBody::NodeSubscriptionDenied(_) => visitor.node_subscription_denied(event),
    }
}
