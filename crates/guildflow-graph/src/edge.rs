use serde::{Deserialize, Serialize};

/// A directed link between two nodes.
///
/// Edges carry data dependencies (what a node can see) and, for multi-output
/// nodes, which output port they leave from. They never trigger execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Output port on the source (condition id, `default`, option id).
    #[serde(default)]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub target_handle: Option<String>,
}

impl Edge {
    /// Create an edge from the default output of `source`.
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    /// Create an edge leaving a specific output port.
    pub fn from_handle(
        id: impl Into<String>,
        source: impl Into<String>,
        handle: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source_handle: Some(handle.into()),
            ..Self::new(id, source, target)
        }
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}
