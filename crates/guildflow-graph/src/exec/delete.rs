use std::collections::HashSet;

use tracing::debug;

use guildflow_core::error::{GuildflowError, Result};
use guildflow_core::types::ResourceKind;

use super::{valid_names, NodeRun};
use crate::node::DeleteResourcesData;

/// Delete recorded roles, channels or categories by name.
///
/// Every pending name must have a local record before anything is deleted.
/// Names deleted by an earlier run are skipped.
pub(super) async fn delete_resources(
    run: &mut NodeRun<'_>,
    kind: ResourceKind,
    data: &mut DeleteResourcesData,
) -> Result<bool> {
    let mut names: Vec<String> = valid_names(&data.names)
        .into_iter()
        .map(|(_, name)| name)
        .collect();
    let mut seen = HashSet::new();
    names.retain(|n| seen.insert(n.clone()));
    if names.is_empty() {
        return Err(GuildflowError::Validation(format!(
            "at least one {} name is required",
            kind
        )));
    }

    let pending: Vec<String> = names
        .iter()
        .filter(|n| !data.deleted.contains(n))
        .cloned()
        .collect();
    let ids = run.resolve_names(kind, &pending).await?;

    let total = names.len();
    let mut done = total - pending.len();
    let guild_id = run.guild_id();
    let session_id = run.session.id.clone();

    for (name, id) in pending.into_iter().zip(ids) {
        let result = match kind {
            ResourceKind::Role => run.client().delete_role(&guild_id, &id).await,
            ResourceKind::Channel => run.client().delete_channel(&guild_id, &id).await,
            ResourceKind::Category => run.client().delete_category(&guild_id, &id).await,
        };

        match result {
            Ok(()) => {
                debug!(node_id = run.node_id, kind = %kind, name = %name, id = %id, "Deleted");
                data.deleted.push(name.clone());
                let removed = run.store().remove_resource(&session_id, kind, &id).await;
                match removed {
                    Ok(()) => run.item_ok(&name),
                    Err(e) => run.item_failed(&name, &e),
                }
            }
            Err(e) => run.item_failed(&name, &e),
        }
        done += 1;
        run.progress(done, total);
    }
    Ok(true)
}
