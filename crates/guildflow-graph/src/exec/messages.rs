use guildflow_core::error::{GuildflowError, Result};
use guildflow_core::types::{OutgoingMessage, ResourceKind};

use super::channels::channel_target;
use super::NodeRun;
use crate::node::{SendMessageData, MAX_ATTACHMENTS};

/// Send every non-empty block to every target channel, channel by channel.
pub(super) async fn send_messages(
    run: &mut NodeRun<'_>,
    data: &mut SendMessageData,
) -> Result<bool> {
    if data.channels.is_empty() {
        return Err(GuildflowError::Validation(
            "at least one target channel is required".into(),
        ));
    }
    let blocks: Vec<(usize, OutgoingMessage)> = data
        .messages
        .iter()
        .enumerate()
        .filter(|(_, b)| !b.is_empty())
        .map(|(i, b)| {
            (
                i,
                OutgoingMessage {
                    content: b.content.clone(),
                    attachments: b.attachments.clone(),
                },
            )
        })
        .collect();
    if blocks.is_empty() {
        return Err(GuildflowError::Validation(
            "at least one message needs content or attachments".into(),
        ));
    }
    if let Some((i, _)) = blocks
        .iter()
        .find(|(_, m)| m.attachments.len() > MAX_ATTACHMENTS)
    {
        return Err(GuildflowError::Validation(format!(
            "message {} has more than {} attachments",
            i + 1,
            MAX_ATTACHMENTS
        )));
    }

    let ctx = run.resolve_context().await?;
    let records = run.records(ResourceKind::Channel).await?;
    let mut targets = Vec::with_capacity(data.channels.len());
    let mut missing = Vec::new();
    for value in &data.channels {
        match channel_target(value, &ctx, &records) {
            Some(id) => targets.push((value.describe(), id)),
            None => missing.push(value.describe()),
        }
    }
    if !missing.is_empty() {
        return Err(GuildflowError::Unresolved {
            kind: ResourceKind::Channel,
            names: missing,
        });
    }

    let total = targets.len() * blocks.len();
    let mut done = 0;
    for (label, channel_id) in &targets {
        for (index, message) in &blocks {
            let item = format!("{} message {}", label, index + 1);
            let result = run.client().send_message(channel_id, message).await;
            match result {
                Ok(()) => run.item_ok(&item),
                Err(e) => run.item_failed(&item, &e),
            }
            done += 1;
            run.progress(done, total);
        }
    }
    Ok(true)
}
