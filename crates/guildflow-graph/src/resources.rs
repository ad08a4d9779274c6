use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use guildflow_core::types::ChannelType;

use crate::edge::Edge;
use crate::node::{Node, NodeData};
use crate::predecessors::predecessors;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleResource {
    pub name: String,
    pub source_node_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelResource {
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub source_node_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagResource {
    pub key: String,
    pub source_node_id: String,
}

/// Named resources produced by a set of nodes, with their producers.
///
/// The same name may appear several times when several nodes produce it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCatalog {
    pub roles: Vec<RoleResource>,
    pub channels: Vec<ChannelResource>,
    pub game_flags: Vec<FlagResource>,
}

impl ResourceCatalog {
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.channels.is_empty() && self.game_flags.is_empty()
    }

    /// Append another catalog, keeping producer attribution.
    pub fn merge(&mut self, other: ResourceCatalog) {
        self.roles.extend(other.roles);
        self.channels.extend(other.channels);
        self.game_flags.extend(other.game_flags);
    }

    /// Role names for a picker: exact-name de-duplication, first producer wins.
    pub fn role_options(&self) -> Vec<&RoleResource> {
        let mut seen = HashSet::new();
        self.roles
            .iter()
            .filter(|r| seen.insert(r.name.as_str()))
            .collect()
    }

    pub fn channel_options(&self) -> Vec<&ChannelResource> {
        let mut seen = HashSet::new();
        self.channels
            .iter()
            .filter(|c| seen.insert(c.name.as_str()))
            .collect()
    }

    pub fn flag_options(&self) -> Vec<&FlagResource> {
        let mut seen = HashSet::new();
        self.game_flags
            .iter()
            .filter(|f| seen.insert(f.key.as_str()))
            .collect()
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.name == name)
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.iter().any(|c| c.name == name)
    }
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Resources a node produces when it runs.
pub fn extract(node: &Node) -> ResourceCatalog {
    let mut catalog = ResourceCatalog::default();
    let source = || node.id.clone();

    match &node.data {
        NodeData::CreateRole(data) => {
            catalog.roles = data
                .role_names
                .iter()
                .filter_map(|n| non_blank(n))
                .map(|name| RoleResource {
                    name,
                    source_node_id: source(),
                })
                .collect();
        }
        NodeData::CreateChannel(data) => {
            catalog.channels = data
                .channels
                .iter()
                .filter_map(|item| {
                    non_blank(&item.name).map(|name| ChannelResource {
                        name,
                        channel_type: item.channel_type,
                        source_node_id: source(),
                    })
                })
                .collect();
        }
        NodeData::SetGameFlag(data) => {
            if let Some(key) = non_blank(&data.flag_key) {
                catalog.game_flags.push(FlagResource {
                    key,
                    source_node_id: source(),
                });
            }
        }
        NodeData::SelectBranch(data) => {
            if let Some(key) = data.flag_key.as_deref().and_then(non_blank) {
                catalog.game_flags.push(FlagResource {
                    key,
                    source_node_id: source(),
                });
            }
        }
        NodeData::ShuffleAssign(data) => {
            if let Some(prefix) = non_blank(&data.prefix) {
                catalog.game_flags = data
                    .targets
                    .iter()
                    .filter_map(|t| non_blank(t))
                    .map(|target| FlagResource {
                        key: crate::shuffle::flag_key(&prefix, &target),
                        source_node_id: source(),
                    })
                    .collect();
            }
        }
        _ => {}
    }

    catalog
}

/// Resources visible to `target_id`: everything produced by its predecessors.
///
/// The target's own output is never included, even when a cycle makes the
/// target its own predecessor.
pub fn resources_before(target_id: &str, nodes: &[Node], edges: &[Edge]) -> ResourceCatalog {
    let upstream = predecessors(target_id, edges);
    let mut catalog = ResourceCatalog::default();
    for node in nodes
        .iter()
        .filter(|n| n.id != target_id && upstream.contains(&n.id))
    {
        catalog.merge(extract(node));
    }
    catalog
}
