use tracing::{debug, info};

use guildflow_core::error::{GuildflowError, Result};
use guildflow_core::types::{ChannelSpec, ResourceKind, ResourceRecord};

use super::NodeRun;
use crate::dynamic::{resolve, DynamicValue, ResolveContext};
use crate::node::{ChangePermissionData, CreateCategoryData, CreateChannelData, CreatedEntry};

pub(super) async fn create_category(
    run: &mut NodeRun<'_>,
    data: &mut CreateCategoryData,
) -> Result<bool> {
    let name = data.category_name.trim().to_string();
    if name.is_empty() {
        return Err(GuildflowError::Validation(
            "category name is required".into(),
        ));
    }
    if let Some(entry) = &data.created {
        // Created on the platform; make sure the local write landed too.
        if !run.recorded_names(ResourceKind::Category).await?.contains(&name) {
            let record = ResourceRecord::category(entry.id.clone(), &name);
            if run.record(&name, record).await {
                run.item_ok(&name);
            }
        }
        return Ok(true);
    }

    let guild_id = run.guild_id();
    let result = run.client().create_category(&guild_id, &name).await;
    match result {
        Ok(created) => {
            data.created = Some(CreatedEntry {
                index: 0,
                id: created.id.clone(),
                name: name.clone(),
            });
            if run.record(&name, ResourceRecord::category(created.id, &name)).await {
                run.item_ok(&name);
            }
        }
        Err(e) => run.item_failed(&name, &e),
    }
    Ok(true)
}

/// Create channels under an optional category.
///
/// The category and every writer/reader role are resolved before the first
/// call; one unknown name aborts the whole node.
pub(super) async fn create_channels(
    run: &mut NodeRun<'_>,
    data: &mut CreateChannelData,
) -> Result<bool> {
    let items: Vec<(usize, String)> = data
        .channels
        .iter()
        .enumerate()
        .filter_map(|(i, c)| {
            let name = c.name.trim();
            (!name.is_empty()).then(|| (i, name.to_string()))
        })
        .collect();
    if items.is_empty() {
        return Err(GuildflowError::Validation(
            "at least one channel name is required".into(),
        ));
    }

    let parent_id = match data.category_name.as_deref().map(str::trim) {
        Some(category) if !category.is_empty() => run
            .resolve_names(ResourceKind::Category, &[category.to_string()])
            .await?
            .into_iter()
            .next(),
        _ => None,
    };

    let mut all_roles: Vec<String> = data
        .channels
        .iter()
        .flat_map(|c| c.writer_roles.iter().chain(c.reader_roles.iter()))
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
    all_roles.sort();
    all_roles.dedup();
    let role_ids = run.resolve_names(ResourceKind::Role, &all_roles).await?;
    let role_id = |name: &String| -> Option<String> {
        all_roles
            .iter()
            .position(|r| r == name.trim())
            .map(|i| role_ids[i].clone())
    };

    let total = items.len();
    let guild_id = run.guild_id();
    let mut recorded = if data.created.is_empty() {
        Default::default()
    } else {
        run.recorded_names(ResourceKind::Channel).await?
    };
    let mut done = items
        .iter()
        .filter(|(i, _)| data.created.iter().any(|c| c.index == *i))
        .count();

    for (index, name) in items {
        let item = &data.channels[index];
        let spec = ChannelSpec {
            name: name.clone(),
            channel_type: item.channel_type,
            parent_id: parent_id.clone(),
            writer_role_ids: item.writer_roles.iter().filter_map(role_id).collect(),
            reader_role_ids: item.reader_roles.iter().filter_map(role_id).collect(),
        };

        if let Some(entry) = data.created.iter().find(|c| c.index == index) {
            if recorded.contains(&name) {
                debug!(index, channel = %name, "Channel already created, skipping");
            } else {
                // Created on the platform, but the local write failed.
                let record = channel_record(entry.id.clone(), spec);
                if run.record(&name, record).await {
                    recorded.insert(name.clone());
                    run.item_ok(&name);
                }
            }
            continue;
        }

        let result = run.client().create_channel(&guild_id, &spec).await;
        match result {
            Ok(created) => {
                data.created.push(CreatedEntry {
                    index,
                    id: created.id.clone(),
                    name: name.clone(),
                });
                if run.record(&name, channel_record(created.id, spec)).await {
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

fn channel_record(id: String, spec: ChannelSpec) -> ResourceRecord {
    let mut record = ResourceRecord::channel(id, &spec.name, spec.channel_type, spec.parent_id);
    record.writer_role_ids = spec.writer_role_ids;
    record.reader_role_ids = spec.reader_role_ids;
    record
}

/// Resolve a channel target to the id of one of the session's channels.
///
/// Channel references only resolve through the context, so they must name a
/// channel produced upstream. Any other value resolves to a string that is
/// matched against recorded channel ids, then names.
pub(super) fn channel_target(
    value: &DynamicValue,
    ctx: &ResolveContext,
    channels: &[ResourceRecord],
) -> Option<String> {
    if let DynamicValue::ChannelRef { channel_name } = value {
        return ctx.channels.get(channel_name).cloned();
    }
    let resolved = resolve(value, ctx);
    let resolved = resolved.trim();
    if resolved.is_empty() {
        return None;
    }
    channels
        .iter()
        .find(|c| c.id == resolved)
        .or_else(|| channels.iter().find(|c| c.name == resolved))
        .map(|c| c.id.clone())
}

/// Replace a channel's role overwrites.
///
/// Roles left out of both lists lose their overwrite, on the platform and in
/// the local record.
pub(super) async fn change_permissions(
    run: &mut NodeRun<'_>,
    data: &mut ChangePermissionData,
) -> Result<bool> {
    let ctx = run.resolve_context().await?;
    let channels = run.records(ResourceKind::Channel).await?;
    let channel_id = channel_target(&data.channel, &ctx, &channels).ok_or_else(|| {
        GuildflowError::Unresolved {
            kind: ResourceKind::Channel,
            names: vec![data.channel.describe()],
        }
    })?;

    let writers: Vec<String> = data
        .writer_roles
        .iter()
        .filter(|r| !r.trim().is_empty())
        .cloned()
        .collect();
    let readers: Vec<String> = data
        .reader_roles
        .iter()
        .filter(|r| !r.trim().is_empty())
        .cloned()
        .collect();

    // Resolved together so every unknown role lands in one error.
    let mut wanted = writers;
    let writer_count = wanted.len();
    wanted.extend(readers);
    let mut writer_ids = run.resolve_names(ResourceKind::Role, &wanted).await?;
    let reader_ids = writer_ids.split_off(writer_count);

    let guild_id = run.guild_id();
    let item = data.channel.describe();
    if let Err(e) = run
        .client()
        .set_channel_permissions(&guild_id, &channel_id, &writer_ids, &reader_ids)
        .await
    {
        run.item_failed(&item, &e);
        return Ok(true);
    }

    let session_id = run.session.id.clone();
    match run
        .store()
        .set_channel_permissions(&session_id, &channel_id, writer_ids, reader_ids)
        .await
    {
        Ok(()) => {
            info!(node_id = run.node_id, channel_id = %channel_id, "Channel permissions replaced");
            run.item_ok(&item);
        }
        Err(e) => run.item_failed(&item, &e),
    }
    Ok(true)
}
