//! Kind-specific payload schemas and the actor attached to events.

use serde::{Deserialize, Serialize};

/// The user that caused an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventUser {
    pub id: String,
    pub username: String,
}

impl EventUser {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}

/// A map reference embedded in payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedNodeType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Descriptor of the node a tag was applied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedNode {
    pub id: String,
    pub title: String,
    pub map: MapRef,
    #[serde(default)]
    pub node_type: Option<TaggedNodeType>,
    #[serde(default)]
    pub parent_title: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// Payload of `node_tagged`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTaggedData {
    pub node: TaggedNode,
    pub order: i64,
    pub tag_id: String,
}

/// Payload of `search_query_saved`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuerySavedData {
    pub id: String,
    pub title: String,
    pub query: String,
    pub timestamp: i64,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Clipboard operation recorded in a command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferCommandType {
    Copy,
    Cut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferCommandMeta {
    pub map: MapRef,
    pub titles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferCommand {
    pub id: String,
    #[serde(rename = "type")]
    pub command_type: BufferCommandType,
    pub nodes: Vec<String>,
    pub branch: bool,
    pub oneshot: bool,
    pub meta: BufferCommandMeta,
}

/// Payload of `command_pushed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPushedData {
    pub cmd: BufferCommand,
    pub position: i64,
}
