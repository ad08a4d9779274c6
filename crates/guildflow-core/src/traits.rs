use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// Platform operations that workflow nodes perform against a guild.
///
/// Every call may fail with a transport or platform error; callers treat a
/// failure as "this item failed" and carry on with the rest of the batch.
pub trait GuildClient: Send + Sync + 'static {
    /// Create a role and return its platform id.
    fn create_role(&self, guild_id: &str, name: &str) -> BoxFuture<'_, Result<CreatedResource>>;

    fn delete_role(&self, guild_id: &str, role_id: &str) -> BoxFuture<'_, Result<()>>;

    fn create_category(
        &self,
        guild_id: &str,
        name: &str,
    ) -> BoxFuture<'_, Result<CreatedResource>>;

    fn delete_category(&self, guild_id: &str, category_id: &str) -> BoxFuture<'_, Result<()>>;

    fn create_channel(
        &self,
        guild_id: &str,
        spec: &ChannelSpec,
    ) -> BoxFuture<'_, Result<CreatedResource>>;

    fn delete_channel(&self, guild_id: &str, channel_id: &str) -> BoxFuture<'_, Result<()>>;

    /// Replace every role overwrite on a channel.
    ///
    /// Roles missing from both lists lose their explicit overwrite.
    fn set_channel_permissions(
        &self,
        guild_id: &str,
        channel_id: &str,
        writer_role_ids: &[String],
        reader_role_ids: &[String],
    ) -> BoxFuture<'_, Result<()>>;

    fn send_message(
        &self,
        channel_id: &str,
        message: &OutgoingMessage,
    ) -> BoxFuture<'_, Result<()>>;

    /// List up to `limit` members with ids greater than `after`.
    fn list_members(
        &self,
        guild_id: &str,
        limit: u64,
        after: Option<&str>,
    ) -> BoxFuture<'_, Result<Vec<GuildMember>>>;

    fn add_role_to_member(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> BoxFuture<'_, Result<()>>;
}

/// Name/id mappings of created resources, per session.
pub trait ResourceStore: Send + Sync + 'static {
    fn list_resources(
        &self,
        session: &SessionId,
        kind: ResourceKind,
    ) -> BoxFuture<'_, Result<Vec<ResourceRecord>>>;

    /// Insert a record, replacing any record of the same kind and name.
    fn upsert_resource(
        &self,
        session: &SessionId,
        record: ResourceRecord,
    ) -> BoxFuture<'_, Result<()>>;

    fn remove_resource(
        &self,
        session: &SessionId,
        kind: ResourceKind,
        id: &str,
    ) -> BoxFuture<'_, Result<()>>;

    /// Overwrite the recorded permission lists of a channel.
    fn set_channel_permissions(
        &self,
        session: &SessionId,
        channel_id: &str,
        writer_role_ids: Vec<String>,
        reader_role_ids: Vec<String>,
    ) -> BoxFuture<'_, Result<()>>;
}

/// Sessions and their flag maps.
pub trait SessionStore: Send + Sync + 'static {
    fn save_session(&self, session: &Session) -> BoxFuture<'_, Result<()>>;

    fn load_session(&self, id: &SessionId) -> BoxFuture<'_, Result<Option<Session>>>;

    fn find_session(&self, name: &str) -> BoxFuture<'_, Result<Option<Session>>>;

    /// Persist the full flag map of a session.
    fn save_flags(&self, id: &SessionId, flags: &FlagMap) -> BoxFuture<'_, Result<()>>;
}
