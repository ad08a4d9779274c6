//! Workflow graph engine.
//!
//! A workflow is a directed graph of [`Node`]s joined by [`Edge`]s. Edges carry
//! data dependencies only: they decide which roles, channels and flags a node
//! can see ([`resources_before`]) and which outputs a branch activates, but
//! never run a node by themselves. Nodes run one at a time through
//! [`Engine::execute`].

pub mod combination;
pub mod condition;
pub mod document;
pub mod dynamic;
pub mod edge;
pub mod edit;
pub mod exec;
pub mod node;
pub mod predecessors;
pub mod resources;
pub mod shuffle;
pub mod store;

pub use combination::{
    filtered_target_options, validate_pair, CombinationConfig, CombinationMode, PairRejection,
    RecordedPair,
};
pub use condition::{evaluate_condition, evaluate_conditions, Condition, ConditionOperator};
pub use document::{WorkflowDocument, DOCUMENT_VERSION};
pub use dynamic::{resolve, DynamicValue, ResolveContext};
pub use edge::Edge;
pub use exec::{Engine, ExecutionReport, ItemFailure};
pub use node::{Node, NodeData};
pub use predecessors::predecessors;
pub use resources::{extract, resources_before, ResourceCatalog};
pub use shuffle::{fisher_yates_shuffle, shuffle_assign};
pub use store::{EdgeChange, GraphChange, GraphEvent, GraphState, GraphStore, NodeChange, Viewport};
