use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use guildflow_core::error::{GuildflowError, Result};

use crate::edge::Edge;
use crate::node::Node;
use crate::store::{GraphState, GraphStore, Viewport};

/// Schema version written by this build.
pub const DOCUMENT_VERSION: u32 = 2;

/// The persisted form of a workflow: nodes, edges and viewport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub version: u32,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub viewport: Viewport,
}

impl Default for WorkflowDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            nodes: vec![],
            edges: vec![],
            viewport: Viewport::default(),
        }
    }
}

impl WorkflowDocument {
    pub fn from_state(state: &GraphState) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            nodes: state.nodes.clone(),
            edges: state.edges.clone(),
            viewport: state.viewport,
        }
    }

    pub fn into_state(self) -> GraphState {
        GraphState {
            nodes: self.nodes,
            edges: self.edges,
            viewport: self.viewport,
        }
    }

    /// Build a validated graph store from this document.
    pub fn into_store(self) -> Result<GraphStore> {
        GraphStore::from_state(self.into_state())
    }

    /// Parse a document, upgrading older schema versions.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut raw: Value = serde_json::from_str(json)?;
        let found = match raw.get("version").and_then(Value::as_u64) {
            Some(v) => u32::try_from(v).map_err(|_| GuildflowError::UnsupportedVersion {
                found: u32::MAX,
                supported: DOCUMENT_VERSION,
            })?,
            None => 1,
        };

        if found > DOCUMENT_VERSION {
            return Err(GuildflowError::UnsupportedVersion {
                found,
                supported: DOCUMENT_VERSION,
            });
        }
        if found < 2 {
            debug!(from = found, to = DOCUMENT_VERSION, "Upgrading workflow document");
            upgrade_v1(&mut raw)?;
        }

        Ok(serde_json::from_value(raw)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let doc = Self::from_json(&content)?;
        info!(
            path = %path.display(),
            nodes = doc.nodes.len(),
            edges = doc.edges.len(),
            "Loaded workflow"
        );
        Ok(doc)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Version 1 kept the execution stamp inside each node's `data` and had no
/// version field.
fn upgrade_v1(raw: &mut Value) -> Result<()> {
    let root = raw
        .as_object_mut()
        .ok_or_else(|| GuildflowError::Validation("workflow document must be an object".into()))?;

    if let Some(Value::Array(nodes)) = root.get_mut("nodes") {
        for node in nodes.iter_mut() {
            let Some(node) = node.as_object_mut() else {
                continue;
            };
            let stamp = node
                .get_mut("data")
                .and_then(Value::as_object_mut)
                .and_then(|data| data.remove("executedAt"));
            if let Some(stamp) = stamp.filter(|s| !s.is_null()) {
                node.entry("executedAt").or_insert(stamp);
            }
        }
    }
    root.insert("version".into(), Value::from(DOCUMENT_VERSION));
    Ok(())
}
