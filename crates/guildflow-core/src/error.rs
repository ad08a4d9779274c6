use thiserror::Error;

use crate::types::ResourceKind;

#[derive(Debug, Error)]
pub enum GuildflowError {
    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unresolved {kind} names: {}", .names.join(", "))]
    Unresolved {
        kind: ResourceKind,
        names: Vec<String>,
    },

    // Graph errors
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Node already exists: {0}")]
    DuplicateNode(String),

    #[error("Edge already exists: {0}")]
    DuplicateEdge(String),

    #[error("Edge {edge_id} references missing node {node_id}")]
    DanglingEdge { edge_id: String, node_id: String },

    #[error("Node already executed: {0}")]
    AlreadyExecuted(String),

    #[error("Node {node_id} of type {kind} is not executable")]
    NotExecutable { node_id: String, kind: String },

    #[error("Unsupported workflow document version {found} (newest supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    // Platform errors
    #[error("Platform call failed: {operation}: {message}")]
    Platform { operation: String, message: String },

    // Session errors
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GuildflowError {
    /// Shorthand for a failed call against the chat platform.
    pub fn platform(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Platform {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error was raised before any remote call was made.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Unresolved { .. })
    }
}

pub type Result<T> = std::result::Result<T, GuildflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_lists_every_name() {
        let err = GuildflowError::Unresolved {
            kind: ResourceKind::Role,
            names: vec!["GM".into(), "Spectator".into()],
        };
        assert_eq!(err.to_string(), "Unresolved role names: GM, Spectator");
        assert!(err.is_validation());
    }

    #[test]
    fn test_platform_helper() {
        let err = GuildflowError::platform("create_role", "429 Too Many Requests");
        assert_eq!(
            err.to_string(),
            "Platform call failed: create_role: 429 Too Many Requests"
        );
        assert!(!err.is_validation());
    }
}
