use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CombinationMode {
    /// Both sides of a pair come from the same list.
    #[default]
    SameSet,
    DifferentSet,
}

/// Pairing rules of one record-combination node. Fixed once the node exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinationConfig {
    #[serde(default)]
    pub mode: CombinationMode,
    #[serde(default)]
    pub allow_self_pairing: bool,
    #[serde(default)]
    pub allow_duplicates: bool,
    /// When false, (A, B) and (B, A) are the same pair.
    #[serde(default)]
    pub distinguish_order: bool,
    /// When false, a target may appear in at most one recorded pair.
    #[serde(default = "default_true")]
    pub allow_multiple_assignments: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CombinationConfig {
    fn default() -> Self {
        Self {
            mode: CombinationMode::SameSet,
            allow_self_pairing: false,
            allow_duplicates: false,
            distinguish_order: false,
            allow_multiple_assignments: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedPair {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairOption {
    pub id: String,
    pub label: String,
}

/// Why a pair may not be recorded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairRejection {
    #[error("Both a source and a target must be selected")]
    MissingSelection,
    #[error("Cannot pair an entry with itself")]
    SelfPairing,
    #[error("This combination has already been recorded")]
    Duplicate,
    #[error("This target has already been assigned")]
    AlreadyAssigned,
}

fn is_recorded(config: &CombinationConfig, pairs: &[RecordedPair], source: &str, target: &str) -> bool {
    pairs.iter().any(|p| {
        (p.source_id == source && p.target_id == target)
            || (!config.distinguish_order && p.source_id == target && p.target_id == source)
    })
}

/// Check a candidate pair against the node's rules and the existing log.
pub fn validate_pair(
    config: &CombinationConfig,
    pairs: &[RecordedPair],
    source_id: &str,
    target_id: &str,
) -> Result<(), PairRejection> {
    if source_id.is_empty() || target_id.is_empty() {
        return Err(PairRejection::MissingSelection);
    }
    if config.mode == CombinationMode::SameSet
        && !config.allow_self_pairing
        && source_id == target_id
    {
        return Err(PairRejection::SelfPairing);
    }
    if !config.allow_duplicates && is_recorded(config, pairs, source_id, target_id) {
        return Err(PairRejection::Duplicate);
    }
    Ok(())
}

/// Check the one-pair-per-target rule.
pub fn check_assignment(
    config: &CombinationConfig,
    pairs: &[RecordedPair],
    target_id: &str,
) -> Result<(), PairRejection> {
    if !config.allow_multiple_assignments && pairs.iter().any(|p| p.target_id == target_id) {
        return Err(PairRejection::AlreadyAssigned);
    }
    Ok(())
}

/// A target choice as shown in a picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetOption {
    pub id: String,
    pub label: String,
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Target options with invalid choices disabled for the selected source.
///
/// Applies the same rules as [`validate_pair`] and [`check_assignment`], and
/// explains each disabled entry.
pub fn filtered_target_options(
    config: &CombinationConfig,
    pairs: &[RecordedPair],
    options: &[PairOption],
    selected_source: Option<&str>,
) -> Vec<TargetOption> {
    let source = selected_source.filter(|s| !s.is_empty());
    options
        .iter()
        .map(|option| {
            let rejection = match source {
                Some(source) => validate_pair(config, pairs, source, &option.id)
                    .and_then(|_| check_assignment(config, pairs, &option.id))
                    .err(),
                None => check_assignment(config, pairs, &option.id).err(),
            };
            TargetOption {
                id: option.id.clone(),
                label: option.label.clone(),
                disabled: rejection.is_some(),
                reason: rejection.map(|r| r.to_string()),
            }
        })
        .collect()
}
