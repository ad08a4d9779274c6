//! Operator edits that change node payloads between executions.

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use guildflow_core::error::{GuildflowError, Result};

use crate::combination::{check_assignment, validate_pair, RecordedPair};
use crate::node::NodeData;
use crate::store::GraphStore;

fn wrong_kind(node_id: &str, expected: &str, found: &str) -> GuildflowError {
    GuildflowError::Validation(format!(
        "node {} is a {} node, expected {}",
        node_id, found, expected
    ))
}

/// Choose an option on a select-branch node. The choice is pinned once the
/// node executes.
pub fn select_option(store: &mut GraphStore, node_id: &str, option_id: &str) -> Result<()> {
    store.update_node_data(node_id, |data| match data {
        NodeData::SelectBranch(d) => {
            if d.options.get(option_id).is_none() {
                return Err(GuildflowError::Validation(format!(
                    "unknown option: {}",
                    option_id
                )));
            }
            d.selected = Some(option_id.to_string());
            Ok(())
        }
        other => Err(wrong_kind(node_id, "selectBranch", other.type_name())),
    })
}

/// Append a pair to a record-combination node and return its id.
pub fn record_pair(
    store: &mut GraphStore,
    node_id: &str,
    source_id: &str,
    target_id: &str,
    memo: Option<String>,
) -> Result<String> {
    let pair_id = Uuid::new_v4().to_string();
    store.update_node_data(node_id, |data| match data {
        NodeData::RecordCombination(d) => {
            validate_pair(&d.config, &d.pairs, source_id, target_id)
                .and_then(|_| check_assignment(&d.config, &d.pairs, target_id))
                .map_err(|r| GuildflowError::Validation(r.to_string()))?;
            d.pairs.push(RecordedPair {
                id: pair_id.clone(),
                source_id: source_id.to_string(),
                target_id: target_id.to_string(),
                recorded_at: Utc::now(),
                memo: memo.filter(|m| !m.trim().is_empty()),
            });
            Ok(())
        }
        other => Err(wrong_kind(node_id, "recordCombination", other.type_name())),
    })?;
    debug!(node_id, pair_id = %pair_id, source_id, target_id, "Recorded pair");
    Ok(pair_id)
}

pub fn remove_pair(store: &mut GraphStore, node_id: &str, pair_id: &str) -> Result<()> {
    store.update_node_data(node_id, |data| match data {
        NodeData::RecordCombination(d) => {
            let before = d.pairs.len();
            d.pairs.retain(|p| p.id != pair_id);
            if d.pairs.len() == before {
                return Err(GuildflowError::Validation(format!(
                    "no recorded pair {}",
                    pair_id
                )));
            }
            Ok(())
        }
        other => Err(wrong_kind(node_id, "recordCombination", other.type_name())),
    })
}
