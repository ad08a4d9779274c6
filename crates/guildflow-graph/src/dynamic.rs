use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use guildflow_core::types::FlagMap;

/// A value that is only known once a node runs inside a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DynamicValue {
    #[serde(rename = "literal")]
    Literal { value: String },
    #[serde(rename = "session.name")]
    SessionName,
    #[serde(rename = "roleRef")]
    RoleRef {
        #[serde(rename = "roleName")]
        role_name: String,
    },
    #[serde(rename = "channelRef")]
    ChannelRef {
        #[serde(rename = "channelName")]
        channel_name: String,
    },
    #[serde(rename = "gameFlag")]
    GameFlag {
        #[serde(rename = "flagKey")]
        flag_key: String,
    },
    /// Any tag this build does not know. Resolves to the empty string.
    #[serde(other)]
    Unknown,
}

impl DynamicValue {
    pub fn literal(value: impl Into<String>) -> Self {
        DynamicValue::Literal {
            value: value.into(),
        }
    }

    pub fn role(name: impl Into<String>) -> Self {
        DynamicValue::RoleRef {
            role_name: name.into(),
        }
    }

    pub fn channel(name: impl Into<String>) -> Self {
        DynamicValue::ChannelRef {
            channel_name: name.into(),
        }
    }

    pub fn flag(key: impl Into<String>) -> Self {
        DynamicValue::GameFlag {
            flag_key: key.into(),
        }
    }

    /// Short human-readable form for logs and error messages.
    pub fn describe(&self) -> String {
        match self {
            DynamicValue::Literal { value } => format!("\"{}\"", value),
            DynamicValue::SessionName => "session name".to_string(),
            DynamicValue::RoleRef { role_name } => format!("@{}", role_name),
            DynamicValue::ChannelRef { channel_name } => format!("#{}", channel_name),
            DynamicValue::GameFlag { flag_key } => format!("flag {}", flag_key),
            DynamicValue::Unknown => "unknown value".to_string(),
        }
    }
}

/// What a dynamic value may resolve against.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    pub session_name: Option<String>,
    /// Role name -> platform id.
    pub roles: HashMap<String, String>,
    /// Channel name -> platform id.
    pub channels: HashMap<String, String>,
    pub game_flags: FlagMap,
}

/// Resolve a dynamic value to a concrete string. Never fails.
///
/// Role and channel references that cannot be mapped to an id come back as
/// the raw name. Authors may reference resources that do not exist yet; the
/// node consuming the value reports the missing resource when it runs.
pub fn resolve(value: &DynamicValue, ctx: &ResolveContext) -> String {
    match value {
        DynamicValue::Literal { value } => value.clone(),
        DynamicValue::SessionName => ctx.session_name.clone().unwrap_or_default(),
        DynamicValue::RoleRef { role_name } => ctx
            .roles
            .get(role_name)
            .cloned()
            .unwrap_or_else(|| role_name.clone()),
        DynamicValue::ChannelRef { channel_name } => ctx
            .channels
            .get(channel_name)
            .cloned()
            .unwrap_or_else(|| channel_name.clone()),
        DynamicValue::GameFlag { flag_key } => {
            ctx.game_flags.get(flag_key).cloned().unwrap_or_default()
        }
        DynamicValue::Unknown => String::new(),
    }
}
