use std::num::NonZeroU64;
use std::sync::Arc;

use futures::future::BoxFuture;
use serenity::all::{
    ChannelId, ChannelType as DiscordChannelType, CreateAttachment, CreateChannel,
    CreateMessage, EditChannel, EditRole, GuildId, PermissionOverwrite, PermissionOverwriteType,
    Permissions, RoleId, UserId,
};
use serenity::http::Http;
use tracing::{debug, info};

use guildflow_core::error::{GuildflowError, Result};
use guildflow_core::traits::GuildClient;
use guildflow_core::types::{
    ChannelSpec, ChannelType, CreatedResource, GuildMember, OutgoingMessage,
};

/// Guild client over Discord's REST API. No gateway connection is opened.
pub struct DiscordClient {
    http: Arc<Http>,
}

impl DiscordClient {
    pub fn new(bot_token: &str) -> Self {
        Self {
            http: Arc::new(Http::new(bot_token)),
        }
    }
}

fn parse_id<T: From<NonZeroU64>>(kind: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<NonZeroU64>()
        .map(T::from)
        .map_err(|_| GuildflowError::Validation(format!("invalid {} id: {:?}", kind, raw)))
}

fn failed(operation: &'static str) -> impl Fn(serenity::Error) -> GuildflowError {
    move |e| GuildflowError::platform(operation, e)
}

fn discord_channel_type(channel_type: ChannelType) -> DiscordChannelType {
    match channel_type {
        ChannelType::Text => DiscordChannelType::Text,
        ChannelType::Voice => DiscordChannelType::Voice,
    }
}

fn role_overwrite(role: RoleId, allow: Permissions, deny: Permissions) -> PermissionOverwrite {
    PermissionOverwrite {
        allow,
        deny,
        kind: PermissionOverwriteType::Role(role),
    }
}

/// Overwrites for a private channel: hidden from @everyone, writers may talk,
/// readers may only look.
///
/// With no roles at all the channel is left open.
fn build_overwrites(
    guild: GuildId,
    writers: &[RoleId],
    readers: &[RoleId],
) -> Vec<PermissionOverwrite> {
    if writers.is_empty() && readers.is_empty() {
        return vec![];
    }
    let view = Permissions::VIEW_CHANNEL | Permissions::CONNECT;
    let talk = Permissions::SEND_MESSAGES | Permissions::SPEAK;

    // @everyone shares the guild's id.
    let everyone = RoleId::new(guild.get());
    let mut overwrites = vec![role_overwrite(everyone, Permissions::empty(), view)];
    overwrites.extend(
        writers
            .iter()
            .map(|r| role_overwrite(*r, view | talk, Permissions::empty())),
    );
    overwrites.extend(
        readers
            .iter()
            .filter(|r| !writers.contains(r))
            .map(|r| role_overwrite(*r, view, talk)),
    );
    overwrites
}

fn parse_roles(ids: &[String]) -> Result<Vec<RoleId>> {
    ids.iter().map(|id| parse_id("role", id)).collect()
}

impl GuildClient for DiscordClient {
    fn create_role(&self, guild_id: &str, name: &str) -> BoxFuture<'_, Result<CreatedResource>> {
        let guild_id = guild_id.to_string();
        let name = name.to_string();

        Box::pin(async move {
            let guild: GuildId = parse_id("guild", &guild_id)?;
            let role = guild
                .create_role(&self.http, EditRole::new().name(&name))
                .await
                .map_err(failed("create_role"))?;
            info!(guild = %guild, role = %role.id, name = %name, "Created role");
            Ok(CreatedResource {
                id: role.id.to_string(),
                name: role.name,
            })
        })
    }

    fn delete_role(&self, guild_id: &str, role_id: &str) -> BoxFuture<'_, Result<()>> {
        let guild_id = guild_id.to_string();
        let role_id = role_id.to_string();

        Box::pin(async move {
            let guild: GuildId = parse_id("guild", &guild_id)?;
            let role: RoleId = parse_id("role", &role_id)?;
            guild
                .delete_role(&self.http, role)
                .await
                .map_err(failed("delete_role"))?;
            info!(guild = %guild, role = %role, "Deleted role");
            Ok(())
        })
    }

    fn create_category(&self, guild_id: &str, name: &str) -> BoxFuture<'_, Result<CreatedResource>> {
        let guild_id = guild_id.to_string();
        let name = name.to_string();

        Box::pin(async move {
            let guild: GuildId = parse_id("guild", &guild_id)?;
            let channel = guild
                .create_channel(
                    &self.http,
                    CreateChannel::new(&name).kind(DiscordChannelType::Category),
                )
                .await
                .map_err(failed("create_category"))?;
            info!(guild = %guild, category = %channel.id, name = %name, "Created category");
            Ok(CreatedResource {
                id: channel.id.to_string(),
                name: channel.name,
            })
        })
    }

    fn delete_category(&self, guild_id: &str, category_id: &str) -> BoxFuture<'_, Result<()>> {
        self.delete_channel(guild_id, category_id)
    }

    fn create_channel(
        &self,
        guild_id: &str,
        spec: &ChannelSpec,
    ) -> BoxFuture<'_, Result<CreatedResource>> {
        let guild_id = guild_id.to_string();
        let spec = spec.clone();

        Box::pin(async move {
            let guild: GuildId = parse_id("guild", &guild_id)?;
            let writers = parse_roles(&spec.writer_role_ids)?;
            let readers = parse_roles(&spec.reader_role_ids)?;

            let mut builder = CreateChannel::new(&spec.name)
                .kind(discord_channel_type(spec.channel_type))
                .permissions(build_overwrites(guild, &writers, &readers));
            if let Some(parent) = &spec.parent_id {
                let parent: ChannelId = parse_id("category", parent)?;
                builder = builder.category(parent);
            }

            let channel = guild
                .create_channel(&self.http, builder)
                .await
                .map_err(failed("create_channel"))?;
            info!(guild = %guild, channel = %channel.id, name = %spec.name, "Created channel");
            Ok(CreatedResource {
                id: channel.id.to_string(),
                name: channel.name,
            })
        })
    }

    fn delete_channel(&self, _guild_id: &str, channel_id: &str) -> BoxFuture<'_, Result<()>> {
        let channel_id = channel_id.to_string();

        Box::pin(async move {
            let channel: ChannelId = parse_id("channel", &channel_id)?;
            channel
                .delete(&self.http)
                .await
                .map_err(failed("delete_channel"))?;
            info!(channel = %channel, "Deleted channel");
            Ok(())
        })
    }

    fn set_channel_permissions(
        &self,
        guild_id: &str,
        channel_id: &str,
        writer_role_ids: &[String],
        reader_role_ids: &[String],
    ) -> BoxFuture<'_, Result<()>> {
        let guild_id = guild_id.to_string();
        let channel_id = channel_id.to_string();
        let writer_role_ids = writer_role_ids.to_vec();
        let reader_role_ids = reader_role_ids.to_vec();

        Box::pin(async move {
            let guild: GuildId = parse_id("guild", &guild_id)?;
            let channel: ChannelId = parse_id("channel", &channel_id)?;
            let writers = parse_roles(&writer_role_ids)?;
            let readers = parse_roles(&reader_role_ids)?;

            // Replacing the full overwrite list drops any role not named here.
            channel
                .edit(
                    &self.http,
                    EditChannel::new().permissions(build_overwrites(guild, &writers, &readers)),
                )
                .await
                .map_err(failed("set_channel_permissions"))?;
            debug!(channel = %channel, writers = writers.len(), readers = readers.len(), "Replaced overwrites");
            Ok(())
        })
    }

    fn send_message(&self, channel_id: &str, message: &OutgoingMessage) -> BoxFuture<'_, Result<()>> {
        let channel_id = channel_id.to_string();
        let message = message.clone();

        Box::pin(async move {
            let channel: ChannelId = parse_id("channel", &channel_id)?;

            let mut files = Vec::with_capacity(message.attachments.len());
            for attachment in &message.attachments {
                let mut file = CreateAttachment::path(&attachment.path)
                    .await
                    .map_err(failed("send_message"))?;
                file.filename = attachment.file_name.clone();
                files.push(file);
            }

            let mut builder = CreateMessage::new().add_files(files);
            if !message.content.trim().is_empty() {
                builder = builder.content(&message.content);
            }
            channel
                .send_message(&self.http, builder)
                .await
                .map_err(failed("send_message"))?;
            debug!(channel = %channel, attachments = message.attachments.len(), "Message sent");
            Ok(())
        })
    }

    fn list_members(
        &self,
        guild_id: &str,
        limit: u64,
        after: Option<&str>,
    ) -> BoxFuture<'_, Result<Vec<GuildMember>>> {
        let guild_id = guild_id.to_string();
        let after = after.map(str::to_string);

        Box::pin(async move {
            let guild: GuildId = parse_id("guild", &guild_id)?;
            let after: Option<UserId> = after
                .as_deref()
                .map(|id| parse_id("user", id))
                .transpose()?;
            let members = guild
                .members(&self.http, Some(limit), after)
                .await
                .map_err(failed("list_members"))?;

            Ok(members
                .into_iter()
                .map(|m| GuildMember {
                    user_id: m.user.id.to_string(),
                    role_ids: m.roles.iter().map(|r| r.to_string()).collect(),
                    bot: m.user.bot,
                })
                .collect())
        })
    }

    fn add_role_to_member(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> BoxFuture<'_, Result<()>> {
        let guild_id = guild_id.to_string();
        let user_id = user_id.to_string();
        let role_id = role_id.to_string();

        Box::pin(async move {
            let guild: GuildId = parse_id("guild", &guild_id)?;
            let user: UserId = parse_id("user", &user_id)?;
            let role: RoleId = parse_id("role", &role_id)?;
            self.http
                .add_member_role(guild, user, role, None)
                .await
                .map_err(failed("add_role_to_member"))?;
            Ok(())
        })
    }
}
