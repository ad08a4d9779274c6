use tracing::{debug, info};

use guildflow_core::error::{GuildflowError, Result};

use super::{valid_names, NodeRun};
use crate::dynamic::resolve;
use crate::node::{
    BranchMatch, ConditionalBranchData, SelectBranchData, SetGameFlagData, ShuffleAssignData,
};
use crate::shuffle::{assignment_flags, shuffle_assign as deal};

pub(super) async fn set_flag(run: &mut NodeRun<'_>, data: &mut SetGameFlagData) -> Result<bool> {
    let key = data.flag_key.trim().to_string();
    if key.is_empty() {
        return Err(GuildflowError::Validation("flag key is required".into()));
    }
    let ctx = run.resolve_context().await?;
    let value = resolve(&data.value, &ctx);
    run.write_flags(vec![(key, value)]).await?;
    Ok(true)
}

/// Follow the operator's choice; optionally record its label as a flag.
pub(super) async fn select_branch(
    run: &mut NodeRun<'_>,
    data: &mut SelectBranchData,
) -> Result<bool> {
    let selected = data
        .selected
        .as_deref()
        .ok_or_else(|| GuildflowError::Validation("no option selected".into()))?;
    let option = data.options.get(selected).ok_or_else(|| {
        GuildflowError::Validation(format!("selected option {} does not exist", selected))
    })?;

    if let Some(key) = data.flag_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        run.write_flags(vec![(key.to_string(), option.label.clone())])
            .await?;
    }
    run.report.activated_handle = Some(option.id.clone());
    Ok(true)
}

/// Activate the first matching condition, else the default output if the
/// node has one. With neither, nothing is recorded and the node stays open.
pub(super) async fn conditional_branch(
    run: &mut NodeRun<'_>,
    data: &mut ConditionalBranchData,
) -> Result<bool> {
    let matched = match data.conditions.first_match(&run.session.game_flags) {
        Some(id) => Some(BranchMatch::Condition {
            condition_id: id.to_string(),
        }),
        None if data.has_default => Some(BranchMatch::Default),
        None => None,
    };

    match matched {
        Some(m) => {
            info!(node_id = run.node_id, handle = m.handle(), "Branch matched");
            run.report.activated_handle = Some(m.handle().to_string());
            data.matched = Some(m);
            Ok(true)
        }
        None => {
            debug!(node_id = run.node_id, "No condition matched and no default output");
            Ok(false)
        }
    }
}

/// Deal shuffled items round-robin over shuffled targets. A cached result
/// from an earlier run is reused so the flags never reshuffle.
pub(super) async fn shuffle_assign(
    run: &mut NodeRun<'_>,
    data: &mut ShuffleAssignData,
) -> Result<bool> {
    let prefix = data.prefix.trim().to_string();
    if prefix.is_empty() {
        return Err(GuildflowError::Validation("flag prefix is required".into()));
    }
    let items: Vec<String> = valid_names(&data.items).into_iter().map(|(_, s)| s).collect();
    let targets: Vec<String> = valid_names(&data.targets)
        .into_iter()
        .map(|(_, s)| s)
        .collect();
    if items.is_empty() || targets.is_empty() {
        return Err(GuildflowError::Validation(
            "shuffle needs at least one item and one target".into(),
        ));
    }

    let assignments = match &data.result {
        Some(cached) => cached.clone(),
        None => {
            let mut rng = run
                .engine
                .rng
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            deal(&items, &targets, &mut *rng)
        }
    };
    data.result = Some(assignments.clone());
    run.write_flags(assignment_flags(&prefix, &assignments))
        .await?;
    Ok(true)
}
