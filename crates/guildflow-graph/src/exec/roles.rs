use tracing::debug;

use guildflow_core::error::{GuildflowError, Result};
use guildflow_core::types::{ResourceKind, ResourceRecord};

use super::{valid_names, NodeRun};
use crate::node::{CreateRoleData, CreatedEntry};

/// Create each named role in list order.
///
/// Names are not de-duplicated: two equal names make two platform roles and
/// the local record keeps the later one. Positions already created by an
/// earlier run are not created again, but their local record is rewritten if
/// it went missing.
pub(super) async fn create_roles(run: &mut NodeRun<'_>, data: &mut CreateRoleData) -> Result<bool> {
    let names = valid_names(&data.role_names);
    if names.is_empty() {
        return Err(GuildflowError::Validation(
            "at least one role name is required".into(),
        ));
    }

    let total = names.len();
    let guild_id = run.guild_id();
    let mut recorded = if data.created.is_empty() {
        Default::default()
    } else {
        run.recorded_names(ResourceKind::Role).await?
    };
    let mut done = names
        .iter()
        .filter(|(i, _)| data.created.iter().any(|c| c.index == *i))
        .count();

    for (index, name) in names {
        if data.created.iter().any(|c| c.index == index) {
            if recorded.contains(&name) {
                debug!(index, role = %name, "Role already created, skipping");
            } else if let Some(latest) = data
                .created
                .iter()
                .filter(|c| c.name == name)
                .max_by_key(|c| c.index)
            {
                // Created on the platform, but the local write failed.
                let record = ResourceRecord::role(latest.id.clone(), &name);
                if run.record(&name, record).await {
                    recorded.insert(name.clone());
                    run.item_ok(&name);
                }
            }
            continue;
        }

        let result = run.client().create_role(&guild_id, &name).await;
        match result {
            Ok(created) => {
                data.created.push(CreatedEntry {
                    index,
                    id: created.id.clone(),
                    name: name.clone(),
                });
                if run.record(&name, ResourceRecord::role(created.id, &name)).await {
                    recorded.insert(name.clone());
                    run.item_ok(&name);
                }
            }
            Err(e) => run.item_failed(&name, &e),
        }
        done += 1;
        run.progress(done, total);
    }

    Ok(true)
}
