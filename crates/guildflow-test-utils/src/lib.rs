//! In-memory collaborators for exercising the engine without a guild or a
//! database.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;

use guildflow_core::error::{GuildflowError, Result};
use guildflow_core::traits::{GuildClient, ResourceStore, SessionStore};
use guildflow_core::types::*;

/// A platform call as seen by [`MockGuildClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateRole { name: String },
    DeleteRole { id: String },
    CreateCategory { name: String },
    DeleteCategory { id: String },
    CreateChannel {
        name: String,
        parent_id: Option<String>,
        writer_role_ids: Vec<String>,
        reader_role_ids: Vec<String>,
    },
    DeleteChannel { id: String },
    SetPermissions {
        channel_id: String,
        writer_role_ids: Vec<String>,
        reader_role_ids: Vec<String>,
    },
    SendMessage {
        channel_id: String,
        content: String,
        attachments: usize,
    },
    ListMembers { after: Option<String> },
    AddRole { user_id: String, role_id: String },
}

/// Guild client that records every call and hands out sequential ids.
///
/// Calls mentioning a name, id or user registered with [`fail_times`] fail
/// that many times before succeeding.
///
/// [`fail_times`]: MockGuildClient::fail_times
pub struct MockGuildClient {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<String, usize>>,
    members: Mutex<Vec<GuildMember>>,
    next_id: AtomicU64,
}

impl MockGuildClient {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(vec![]),
            failures: Mutex::new(HashMap::new()),
            members: Mutex::new(vec![]),
            next_id: AtomicU64::new(1000),
        }
    }

    pub fn with_members(self, members: Vec<GuildMember>) -> Self {
        *self.members.lock().unwrap() = members;
        self
    }

    /// Make calls touching `key` fail the next `times` times.
    pub fn fail_times(&self, key: &str, times: usize) {
        self.failures.lock().unwrap().insert(key.to_string(), times);
    }

    /// Make calls touching `key` fail until cleared.
    pub fn fail_always(&self, key: &str) {
        self.fail_times(key, usize::MAX);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn check(&self, operation: &str, keys: &[&str]) -> Result<()> {
        let mut failures = self.failures.lock().unwrap();
        for key in keys {
            if let Some(remaining) = failures.get_mut(*key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(GuildflowError::platform(
                        operation,
                        format!("injected failure for {}", key),
                    ));
                }
            }
        }
        Ok(())
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn created(&self, name: &str) -> CreatedResource {
        CreatedResource {
            id: self.next_id.fetch_add(1, Ordering::SeqCst).to_string(),
            name: name.to_string(),
        }
    }

    fn create(&self, operation: &str, name: &str, call: Call) -> BoxFuture<'_, Result<CreatedResource>> {
        self.record(call);
        let result = self.check(operation, &[name]).map(|_| self.created(name));
        Box::pin(async move { result })
    }

    fn simple(&self, operation: &str, keys: &[&str], call: Call) -> BoxFuture<'_, Result<()>> {
        self.record(call);
        let result = self.check(operation, keys);
        Box::pin(async move { result })
    }
}

impl Default for MockGuildClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GuildClient for MockGuildClient {
    fn create_role(&self, _guild_id: &str, name: &str) -> BoxFuture<'_, Result<CreatedResource>> {
        self.create("create_role", name, Call::CreateRole { name: name.into() })
    }

    fn delete_role(&self, _guild_id: &str, role_id: &str) -> BoxFuture<'_, Result<()>> {
        self.simple("delete_role", &[role_id], Call::DeleteRole { id: role_id.into() })
    }

    fn create_category(&self, _guild_id: &str, name: &str) -> BoxFuture<'_, Result<CreatedResource>> {
        self.create("create_category", name, Call::CreateCategory { name: name.into() })
    }

    fn delete_category(&self, _guild_id: &str, category_id: &str) -> BoxFuture<'_, Result<()>> {
        self.simple(
            "delete_category",
            &[category_id],
            Call::DeleteCategory {
                id: category_id.into(),
            },
        )
    }

    fn create_channel(
        &self,
        _guild_id: &str,
        spec: &ChannelSpec,
    ) -> BoxFuture<'_, Result<CreatedResource>> {
        self.create(
            "create_channel",
            &spec.name,
            Call::CreateChannel {
                name: spec.name.clone(),
                parent_id: spec.parent_id.clone(),
                writer_role_ids: spec.writer_role_ids.clone(),
                reader_role_ids: spec.reader_role_ids.clone(),
            },
        )
    }

    fn delete_channel(&self, _guild_id: &str, channel_id: &str) -> BoxFuture<'_, Result<()>> {
        self.simple(
            "delete_channel",
            &[channel_id],
            Call::DeleteChannel {
                id: channel_id.into(),
            },
        )
    }

    fn set_channel_permissions(
        &self,
        _guild_id: &str,
        channel_id: &str,
        writer_role_ids: &[String],
        reader_role_ids: &[String],
    ) -> BoxFuture<'_, Result<()>> {
        self.simple(
            "set_channel_permissions",
            &[channel_id],
            Call::SetPermissions {
                channel_id: channel_id.into(),
                writer_role_ids: writer_role_ids.to_vec(),
                reader_role_ids: reader_role_ids.to_vec(),
            },
        )
    }

    fn send_message(&self, channel_id: &str, message: &OutgoingMessage) -> BoxFuture<'_, Result<()>> {
        self.simple(
            "send_message",
            &[channel_id, &message.content],
            Call::SendMessage {
                channel_id: channel_id.into(),
                content: message.content.clone(),
                attachments: message.attachments.len(),
            },
        )
    }

    fn list_members(
        &self,
        _guild_id: &str,
        limit: u64,
        after: Option<&str>,
    ) -> BoxFuture<'_, Result<Vec<GuildMember>>> {
        self.record(Call::ListMembers {
            after: after.map(str::to_string),
        });
        let members = self.members.lock().unwrap();
        let start = match after {
            Some(after) => members
                .iter()
                .position(|m| m.user_id == after)
                .map_or(members.len(), |i| i + 1),
            None => 0,
        };
        let page: Vec<GuildMember> = members
            .iter()
            .skip(start)
            .take(limit as usize)
            .cloned()
            .collect();
        let result = self.check("list_members", &["list_members"]).map(|_| page);
        Box::pin(async move { result })
    }

    fn add_role_to_member(
        &self,
        _guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> BoxFuture<'_, Result<()>> {
        self.simple(
            "add_role_to_member",
            &[user_id],
            Call::AddRole {
                user_id: user_id.into(),
                role_id: role_id.into(),
            },
        )
    }
}

/// Resource and session store held in memory.
#[derive(Default)]
pub struct MemoryStore {
    resources: Mutex<HashMap<SessionId, Vec<ResourceRecord>>>,
    sessions: Mutex<HashMap<SessionId, Session>>,
    upsert_failures: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing the engine.
    pub fn insert(&self, session: &SessionId, record: ResourceRecord) {
        let mut resources = self.resources.lock().unwrap();
        let list = resources.entry(session.clone()).or_default();
        list.retain(|r| !(r.kind == record.kind && r.name == record.name));
        list.push(record);
    }

    /// Make the next `times` upserts fail without writing anything.
    pub fn fail_upserts(&self, times: usize) {
        *self.upsert_failures.lock().unwrap() = times;
    }

    pub fn all(&self, session: &SessionId) -> Vec<ResourceRecord> {
        self.resources
            .lock()
            .unwrap()
            .get(session)
            .cloned()
            .unwrap_or_default()
    }
}

impl ResourceStore for MemoryStore {
    fn list_resources(
        &self,
        session: &SessionId,
        kind: ResourceKind,
    ) -> BoxFuture<'_, Result<Vec<ResourceRecord>>> {
        let list: Vec<ResourceRecord> = self
            .all(session)
            .into_iter()
            .filter(|r| r.kind == kind)
            .collect();
        Box::pin(async move { Ok(list) })
    }

    fn upsert_resource(
        &self,
        session: &SessionId,
        record: ResourceRecord,
    ) -> BoxFuture<'_, Result<()>> {
        let mut failures = self.upsert_failures.lock().unwrap();
        let result = if *failures > 0 {
            *failures -= 1;
            Err(GuildflowError::Database("injected upsert failure".into()))
        } else {
            self.insert(session, record);
            Ok(())
        };
        Box::pin(async move { result })
    }

    fn remove_resource(
        &self,
        session: &SessionId,
        kind: ResourceKind,
        id: &str,
    ) -> BoxFuture<'_, Result<()>> {
        if let Some(list) = self.resources.lock().unwrap().get_mut(session) {
            list.retain(|r| !(r.kind == kind && r.id == id));
        }
        Box::pin(async move { Ok(()) })
    }

    fn set_channel_permissions(
        &self,
        session: &SessionId,
        channel_id: &str,
        writer_role_ids: Vec<String>,
        reader_role_ids: Vec<String>,
    ) -> BoxFuture<'_, Result<()>> {
        let mut resources = self.resources.lock().unwrap();
        let found = resources.get_mut(session).and_then(|list| {
            list.iter_mut()
                .find(|r| r.kind == ResourceKind::Channel && r.id == channel_id)
        });
        let result = match found {
            Some(record) => {
                record.writer_role_ids = writer_role_ids;
                record.reader_role_ids = reader_role_ids;
                Ok(())
            }
            None => Err(GuildflowError::Database(format!(
                "no channel record {}",
                channel_id
            ))),
        };
        Box::pin(async move { result })
    }
}

impl SessionStore for MemoryStore {
    fn save_session(&self, session: &Session) -> BoxFuture<'_, Result<()>> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session.clone());
        Box::pin(async move { Ok(()) })
    }

    fn load_session(&self, id: &SessionId) -> BoxFuture<'_, Result<Option<Session>>> {
        let found = self.sessions.lock().unwrap().get(id).cloned();
        Box::pin(async move { Ok(found) })
    }

    fn find_session(&self, name: &str) -> BoxFuture<'_, Result<Option<Session>>> {
        let found = self
            .sessions
            .lock()
            .unwrap()
            .values()
            .find(|s| s.name == name)
            .cloned();
        Box::pin(async move { Ok(found) })
    }

    fn save_flags(&self, id: &SessionId, flags: &FlagMap) -> BoxFuture<'_, Result<()>> {
        let mut sessions = self.sessions.lock().unwrap();
        let result = match sessions.get_mut(id) {
            Some(session) => {
                session.game_flags = flags.clone();
                Ok(())
            }
            None => Err(GuildflowError::SessionNotFound(id.to_string())),
        };
        Box::pin(async move { result })
    }
}

/// A human member holding the given roles.
pub fn member(user_id: &str, role_ids: &[&str]) -> GuildMember {
    GuildMember {
        user_id: user_id.to_string(),
        role_ids: role_ids.iter().map(|r| r.to_string()).collect(),
        bot: false,
    }
}

pub fn bot(user_id: &str) -> GuildMember {
    GuildMember {
        bot: true,
        ..member(user_id, &[])
    }
}

/// Scratch directory that is removed on drop.
pub struct TempWorkspace {
    dir: tempfile::TempDir,
}

impl TempWorkspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write a file and return its path.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, content).expect("write temp file");
        path
    }
}

impl Default for TempWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
