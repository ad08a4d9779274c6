use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique session identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session-scoped flags shared between nodes.
pub type FlagMap = BTreeMap<String, String>;

/// One concrete run of a workflow, bound to a guild.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub guild_id: String,
    #[serde(default)]
    pub game_flags: FlagMap,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(name: impl Into<String>, guild_id: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            name: name.into(),
            guild_id: guild_id.into(),
            game_flags: FlagMap::new(),
            created_at: Utc::now(),
        }
    }
}

/// Kind of platform resource tracked in the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Role,
    Category,
    Channel,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Role => "role",
            ResourceKind::Category => "category",
            ResourceKind::Channel => "channel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "role" => Some(ResourceKind::Role),
            "category" => Some(ResourceKind::Category),
            "channel" => Some(ResourceKind::Channel),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel flavour on the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    #[default]
    Text,
    Voice,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Text => "text",
            ChannelType::Voice => "voice",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(ChannelType::Text),
            "voice" => Some(ChannelType::Voice),
            _ => None,
        }
    }
}

/// A platform resource created during a session, as recorded locally.
///
/// Records map the names used in workflows to the ids the platform assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: String,
    pub name: String,
    pub kind: ResourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_type: Option<ChannelType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub writer_role_ids: Vec<String>,
    #[serde(default)]
    pub reader_role_ids: Vec<String>,
}

impl ResourceRecord {
    pub fn role(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::bare(ResourceKind::Role, id.into(), name.into())
    }

    pub fn category(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::bare(ResourceKind::Category, id.into(), name.into())
    }

    pub fn channel(
        id: impl Into<String>,
        name: impl Into<String>,
        channel_type: ChannelType,
        parent_id: Option<String>,
    ) -> Self {
        Self {
            channel_type: Some(channel_type),
            parent_id,
            ..Self::bare(ResourceKind::Channel, id.into(), name.into())
        }
    }

    fn bare(kind: ResourceKind, id: String, name: String) -> Self {
        Self {
            id,
            name,
            kind,
            channel_type: None,
            parent_id: None,
            writer_role_ids: vec![],
            reader_role_ids: vec![],
        }
    }
}

/// Identity of a resource the platform just created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedResource {
    pub id: String,
    pub name: String,
}

/// Everything needed to create one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpec {
    pub name: String,
    pub channel_type: ChannelType,
    pub parent_id: Option<String>,
    pub writer_role_ids: Vec<String>,
    pub reader_role_ids: Vec<String>,
}

/// A file to upload alongside a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_name: String,
    pub path: PathBuf,
}

/// One message as handed to the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub content: String,
    pub attachments: Vec<Attachment>,
}

/// A guild member as returned by member listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildMember {
    pub user_id: String,
    pub role_ids: Vec<String>,
    pub bot: bool,
}
