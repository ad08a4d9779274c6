use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use guildflow_core::error::{GuildflowError, Result};

use crate::edge::Edge;
use crate::node::{Node, NodeData, Position};

/// Canvas viewport, persisted with the graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

/// An immutable snapshot of the whole graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphState {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub viewport: Viewport,
}

impl GraphState {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn node_mut(&mut self, id: &str) -> Result<&mut Node> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| GuildflowError::NodeNotFound(id.to_string()))
    }

    /// Targets of the edges leaving `node_id` through `handle`.
    pub fn targets_from(&self, node_id: &str, handle: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.source == node_id && e.source_handle.as_deref() == Some(handle))
            .map(|e| e.target.as_str())
            .collect()
    }

    /// Check the structural invariants: unique ids, no dangling edges.
    pub fn validate(&self) -> Result<()> {
        let mut node_ids = HashSet::new();
        for node in &self.nodes {
            if !node_ids.insert(node.id.as_str()) {
                return Err(GuildflowError::DuplicateNode(node.id.clone()));
            }
        }
        let mut edge_ids = HashSet::new();
        for edge in &self.edges {
            if !edge_ids.insert(edge.id.as_str()) {
                return Err(GuildflowError::DuplicateEdge(edge.id.clone()));
            }
            for endpoint in [&edge.source, &edge.target] {
                if !node_ids.contains(endpoint.as_str()) {
                    return Err(GuildflowError::DanglingEdge {
                        edge_id: edge.id.clone(),
                        node_id: endpoint.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Incremental node edits, as produced by an editor.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeChange {
    Add(Node),
    /// Remove a node and every edge touching it.
    Remove(String),
    Move { id: String, position: Position },
    /// Swap in an edited node; execution state is kept from the old one.
    Replace(Node),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EdgeChange {
    Add(Edge),
    Remove(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GraphChange {
    Loaded,
    Nodes,
    Edges,
    NodeData { node_id: String },
    NodeExecuted { node_id: String },
    Viewport,
    Reset,
}

/// Sent to subscribers after every committed mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEvent {
    pub revision: u64,
    pub change: GraphChange,
}

/// Single source of truth for the workflow graph.
///
/// Every mutation builds a new [`GraphState`] and swaps it in whole; a
/// mutation that fails leaves the previous state in place. Readers hold
/// cheap `Arc` snapshots.
pub struct GraphStore {
    state: Arc<GraphState>,
    revision: u64,
    tx: broadcast::Sender<GraphEvent>,
}

impl GraphStore {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            state: Arc::new(GraphState::default()),
            revision: 0,
            tx,
        }
    }

    /// Build a store around an existing graph, checking its invariants.
    pub fn from_state(state: GraphState) -> Result<Self> {
        let mut store = Self::new();
        store.load(state)?;
        Ok(store)
    }

    /// Replace the whole graph.
    pub fn load(&mut self, state: GraphState) -> Result<()> {
        state.validate()?;
        self.commit(state, GraphChange::Loaded);
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> Arc<GraphState> {
        Arc::clone(&self.state)
    }

    pub fn state(&self) -> &GraphState {
        &self.state
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.state.node(id)
    }

    fn commit(&mut self, next: GraphState, change: GraphChange) {
        self.state = Arc::new(next);
        self.revision += 1;
        debug!(revision = self.revision, change = ?change, "Graph updated");
        // Ignore error if no receivers
        let _ = self.tx.send(GraphEvent {
            revision: self.revision,
            change,
        });
    }

    pub fn apply_node_changes(&mut self, changes: Vec<NodeChange>) -> Result<()> {
        let mut next = (*self.state).clone();
        for change in changes {
            match change {
                NodeChange::Add(node) => {
                    if next.node(&node.id).is_some() {
                        return Err(GuildflowError::DuplicateNode(node.id));
                    }
                    next.nodes.push(node);
                }
                NodeChange::Remove(id) => {
                    if next.node(&id).is_none() {
                        return Err(GuildflowError::NodeNotFound(id));
                    }
                    next.nodes.retain(|n| n.id != id);
                    next.edges.retain(|e| !e.touches(&id));
                }
                NodeChange::Move { id, position } => {
                    next.node_mut(&id)?.position = position;
                }
                NodeChange::Replace(node) => {
                    let current = next.node_mut(&node.id)?;
                    if current.is_executed() {
                        return Err(GuildflowError::AlreadyExecuted(node.id));
                    }
                    let executed_at = current.executed_at;
                    *current = Node { executed_at, ..node };
                }
            }
        }
        next.validate()?;
        self.commit(next, GraphChange::Nodes);
        Ok(())
    }

    pub fn apply_edge_changes(&mut self, changes: Vec<EdgeChange>) -> Result<()> {
        let mut next = (*self.state).clone();
        for change in changes {
            match change {
                EdgeChange::Add(edge) => next.edges.push(edge),
                EdgeChange::Remove(id) => next.edges.retain(|e| e.id != id),
            }
        }
        next.validate()?;
        self.commit(next, GraphChange::Edges);
        Ok(())
    }

    pub fn add_node(&mut self, node: Node) -> Result<()> {
        self.apply_node_changes(vec![NodeChange::Add(node)])
    }

    pub fn delete_node(&mut self, id: &str) -> Result<()> {
        self.apply_node_changes(vec![NodeChange::Remove(id.to_string())])
    }

    /// Connect two nodes and return the new edge id.
    pub fn connect(
        &mut self,
        source: &str,
        target: &str,
        source_handle: Option<&str>,
    ) -> Result<String> {
        let edge = Edge {
            id: format!("e-{}", Uuid::new_v4()),
            source: source.to_string(),
            target: target.to_string(),
            source_handle: source_handle.map(str::to_string),
            target_handle: None,
        };
        let id = edge.id.clone();
        self.apply_edge_changes(vec![EdgeChange::Add(edge)])?;
        Ok(id)
    }

    /// Copy a node (without its execution results) next to the original.
    pub fn duplicate_node(&mut self, id: &str) -> Result<String> {
        let original = self
            .node(id)
            .ok_or_else(|| GuildflowError::NodeNotFound(id.to_string()))?;
        let mut copy = original.clone();
        copy.id = format!("{}-{}", original.type_name(), Uuid::new_v4());
        copy.executed_at = None;
        copy.data.clear_results();
        copy.position.x += 40.0;
        copy.position.y += 40.0;
        let new_id = copy.id.clone();
        self.add_node(copy)?;
        Ok(new_id)
    }

    /// Edit a node's payload. Executed nodes are frozen.
    pub fn update_node_data<F>(&mut self, id: &str, edit: F) -> Result<()>
    where
        F: FnOnce(&mut NodeData) -> Result<()>,
    {
        let mut next = (*self.state).clone();
        let node = next.node_mut(id)?;
        if node.is_executed() {
            return Err(GuildflowError::AlreadyExecuted(id.to_string()));
        }
        edit(&mut node.data)?;
        self.commit(
            next,
            GraphChange::NodeData {
                node_id: id.to_string(),
            },
        );
        Ok(())
    }

    /// Store the payload an execution produced and, if it finished, stamp it.
    pub fn commit_execution(
        &mut self,
        id: &str,
        data: NodeData,
        executed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut next = (*self.state).clone();
        let node = next.node_mut(id)?;
        if node.is_executed() {
            return Err(GuildflowError::AlreadyExecuted(id.to_string()));
        }
        node.data = data;
        node.executed_at = executed_at;
        let change = match executed_at {
            Some(_) => GraphChange::NodeExecuted {
                node_id: id.to_string(),
            },
            None => GraphChange::NodeData {
                node_id: id.to_string(),
            },
        };
        self.commit(next, change);
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        let mut next = (*self.state).clone();
        next.viewport = viewport;
        self.commit(next, GraphChange::Viewport);
    }

    /// Clear every execution stamp and result so the workflow can be replayed.
    pub fn reset_execution(&mut self) {
        let mut next = (*self.state).clone();
        for node in &mut next.nodes {
            node.executed_at = None;
            node.data.clear_results();
        }
        self.commit(next, GraphChange::Reset);
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}
