use tracing::debug;

use guildflow_core::error::{GuildflowError, Result};
use guildflow_core::types::ResourceKind;

use super::NodeRun;
use crate::node::AddRoleToMembersData;

/// Grant a role to every matching member, paging through the member list.
///
/// Without a filter role every human member matches. Members that already
/// hold the role are counted without a call.
pub(super) async fn add_role_to_members(
    run: &mut NodeRun<'_>,
    data: &mut AddRoleToMembersData,
) -> Result<bool> {
    let role_name = data.role_name.trim().to_string();
    if role_name.is_empty() {
        return Err(GuildflowError::Validation("role name is required".into()));
    }
    let filter_name = data
        .member_role_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    let mut wanted = vec![role_name.clone()];
    wanted.extend(filter_name.iter().cloned());
    let ids = run.resolve_names(ResourceKind::Role, &wanted).await?;
    let role_id = ids[0].clone();
    let filter_id = ids.get(1).cloned();

    let guild_id = run.guild_id();
    let page_size = run.engine.member_page_size;
    let mut after: Option<String> = None;

    loop {
        let page = match run
            .client()
            .list_members(&guild_id, page_size, after.as_deref())
            .await
        {
            Ok(page) => page,
            Err(e) => {
                // Can't know who is left; retry from the start.
                run.item_failed("member list", &e);
                break;
            }
        };
        debug!(node_id = run.node_id, count = page.len(), after = ?after, "Fetched members");
        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.user_id.clone());
        let full_page = page.len() as u64 >= page_size;

        for member in page {
            if member.bot {
                continue;
            }
            if let Some(filter) = &filter_id {
                if !member.role_ids.contains(filter) {
                    continue;
                }
            }
            if data.assigned.contains(&member.user_id) {
                continue;
            }
            if member.role_ids.contains(&role_id) {
                data.assigned.push(member.user_id);
                continue;
            }
            match run
                .client()
                .add_role_to_member(&guild_id, &member.user_id, &role_id)
                .await
            {
                Ok(()) => {
                    run.item_ok(&member.user_id);
                    data.assigned.push(member.user_id);
                }
                Err(e) => run.item_failed(&member.user_id, &e),
            }
        }

        if !full_page {
            break;
        }
    }
    Ok(true)
}
