use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use guildflow_core::error::{GuildflowError, Result};
use guildflow_core::traits::{ResourceStore, SessionStore};
use guildflow_core::types::{
    ChannelType, FlagMap, ResourceKind, ResourceRecord, Session, SessionId,
};

const SCHEMA_VERSION: i32 = 1;

fn db_err(e: impl ToString) -> GuildflowError {
    GuildflowError::Database(e.to_string())
}

/// SQLite-backed store for sessions and the resources they created.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GuildflowError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        migrate(&conn)?;

        debug!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// All sessions, newest first.
    pub fn list_sessions(&self) -> Result<Vec<Session>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, guild_id, game_flags, created_at FROM sessions
                 ORDER BY created_at DESC",
            )
            .map_err(db_err)?;
        let rows = stmt.query_map([], session_from_row).map_err(db_err)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row.map_err(db_err)??);
        }
        Ok(sessions)
    }
}

/// Bring the schema up to date, tracked with `PRAGMA user_version`.
fn migrate(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(db_err)?;

    if version > SCHEMA_VERSION {
        return Err(GuildflowError::Database(format!(
            "database schema version {} is newer than supported version {}",
            version, SCHEMA_VERSION
        )));
    }

    if version < 1 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                guild_id TEXT NOT NULL,
                game_flags TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_name ON sessions(name);

            CREATE TABLE IF NOT EXISTS resources (
                session_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                id TEXT NOT NULL,
                channel_type TEXT,
                parent_id TEXT,
                writer_role_ids TEXT NOT NULL DEFAULT '[]',
                reader_role_ids TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (session_id, kind, name)
            );

            CREATE INDEX IF NOT EXISTS idx_resources_id ON resources(session_id, kind, id);

            PRAGMA user_version = 1;",
        )
        .map_err(db_err)?;
        info!(from = version, to = SCHEMA_VERSION, "Database schema migrated");
    }
    Ok(())
}

type Parsed<T> = std::result::Result<Result<T>, rusqlite::Error>;

fn session_from_row(row: &Row<'_>) -> Parsed<Session> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let guild_id: String = row.get(2)?;
    let flags: String = row.get(3)?;
    let created_at: String = row.get(4)?;

    let build = || -> Result<Session> {
        let game_flags: FlagMap = serde_json::from_str(&flags)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(db_err)?;
        Ok(Session {
            id: SessionId(id),
            name,
            guild_id,
            game_flags,
            created_at,
        })
    };
    Ok(build())
}

fn resource_from_row(row: &Row<'_>) -> Parsed<ResourceRecord> {
    let kind: String = row.get(0)?;
    let name: String = row.get(1)?;
    let id: String = row.get(2)?;
    let channel_type: Option<String> = row.get(3)?;
    let parent_id: Option<String> = row.get(4)?;
    let writers: String = row.get(5)?;
    let readers: String = row.get(6)?;

    let build = || -> Result<ResourceRecord> {
        let kind = ResourceKind::parse(&kind)
            .ok_or_else(|| GuildflowError::Database(format!("unknown resource kind: {}", kind)))?;
        Ok(ResourceRecord {
            id,
            name,
            kind,
            channel_type: channel_type.as_deref().and_then(ChannelType::parse),
            parent_id,
            writer_role_ids: serde_json::from_str(&writers)?,
            reader_role_ids: serde_json::from_str(&readers)?,
        })
    };
    Ok(build())
}

impl ResourceStore for SqliteStore {
    fn list_resources(
        &self,
        session: &SessionId,
        kind: ResourceKind,
    ) -> BoxFuture<'_, Result<Vec<ResourceRecord>>> {
        let sid = session.0.clone();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let mut stmt = conn
                .prepare(
                    "SELECT kind, name, id, channel_type, parent_id, writer_role_ids, reader_role_ids
                     FROM resources
                     WHERE session_id = ?1 AND kind = ?2
                     ORDER BY rowid ASC",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![sid, kind.as_str()], resource_from_row)
                .map_err(db_err)?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row.map_err(db_err)??);
            }
            Ok(records)
        })
    }

    fn upsert_resource(
        &self,
        session: &SessionId,
        record: ResourceRecord,
    ) -> BoxFuture<'_, Result<()>> {
        let sid = session.0.clone();

        Box::pin(async move {
            let writers = serde_json::to_string(&record.writer_role_ids)?;
            let readers = serde_json::to_string(&record.reader_role_ids)?;
            let conn = self.conn.lock().map_err(db_err)?;
            conn.execute(
                "INSERT INTO resources
                    (session_id, kind, name, id, channel_type, parent_id, writer_role_ids, reader_role_ids)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(session_id, kind, name) DO UPDATE SET
                    id = excluded.id,
                    channel_type = excluded.channel_type,
                    parent_id = excluded.parent_id,
                    writer_role_ids = excluded.writer_role_ids,
                    reader_role_ids = excluded.reader_role_ids",
                params![
                    sid,
                    record.kind.as_str(),
                    record.name,
                    record.id,
                    record.channel_type.map(|t| t.as_str()),
                    record.parent_id,
                    writers,
                    readers,
                ],
            )
            .map_err(db_err)?;
            debug!(session = %sid, kind = %record.kind, name = %record.name, id = %record.id, "Resource recorded");
            Ok(())
        })
    }

    fn remove_resource(
        &self,
        session: &SessionId,
        kind: ResourceKind,
        id: &str,
    ) -> BoxFuture<'_, Result<()>> {
        let sid = session.0.clone();
        let id = id.to_string();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            conn.execute(
                "DELETE FROM resources WHERE session_id = ?1 AND kind = ?2 AND id = ?3",
                params![sid, kind.as_str(), id],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn set_channel_permissions(
        &self,
        session: &SessionId,
        channel_id: &str,
        writer_role_ids: Vec<String>,
        reader_role_ids: Vec<String>,
    ) -> BoxFuture<'_, Result<()>> {
        let sid = session.0.clone();
        let channel_id = channel_id.to_string();

        Box::pin(async move {
            let writers = serde_json::to_string(&writer_role_ids)?;
            let readers = serde_json::to_string(&reader_role_ids)?;
            let conn = self.conn.lock().map_err(db_err)?;
            let changed = conn
                .execute(
                    "UPDATE resources SET writer_role_ids = ?1, reader_role_ids = ?2
                     WHERE session_id = ?3 AND kind = 'channel' AND id = ?4",
                    params![writers, readers, sid, channel_id],
                )
                .map_err(db_err)?;
            if changed == 0 {
                return Err(GuildflowError::Database(format!(
                    "no channel record {}",
                    channel_id
                )));
            }
            Ok(())
        })
    }
}

impl SessionStore for SqliteStore {
    fn save_session(&self, session: &Session) -> BoxFuture<'_, Result<()>> {
        let session = session.clone();

        Box::pin(async move {
            let flags = serde_json::to_string(&session.game_flags)?;
            let conn = self.conn.lock().map_err(db_err)?;
            conn.execute(
                "INSERT INTO sessions (id, name, guild_id, game_flags, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    guild_id = excluded.guild_id,
                    game_flags = excluded.game_flags",
                params![
                    session.id.0,
                    session.name,
                    session.guild_id,
                    flags,
                    session.created_at.to_rfc3339(),
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn load_session(&self, id: &SessionId) -> BoxFuture<'_, Result<Option<Session>>> {
        let sid = id.0.clone();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let found = conn
                .query_row(
                    "SELECT id, name, guild_id, game_flags, created_at FROM sessions WHERE id = ?1",
                    params![sid],
                    session_from_row,
                )
                .optional()
                .map_err(db_err)?;
            found.transpose()
        })
    }

    fn find_session(&self, name: &str) -> BoxFuture<'_, Result<Option<Session>>> {
        let name = name.to_string();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let found = conn
                .query_row(
                    "SELECT id, name, guild_id, game_flags, created_at FROM sessions
                     WHERE name = ?1 ORDER BY created_at DESC LIMIT 1",
                    params![name],
                    session_from_row,
                )
                .optional()
                .map_err(db_err)?;
            found.transpose()
        })
    }

    fn save_flags(&self, id: &SessionId, flags: &FlagMap) -> BoxFuture<'_, Result<()>> {
        let sid = id.0.clone();
        let flags = flags.clone();

        Box::pin(async move {
            let json = serde_json::to_string(&flags)?;
            let conn = self.conn.lock().map_err(db_err)?;
            let changed = conn
                .execute(
                    "UPDATE sessions SET game_flags = ?1 WHERE id = ?2",
                    params![json, sid],
                )
                .map_err(db_err)?;
            if changed == 0 {
                return Err(GuildflowError::SessionNotFound(sid));
            }
            Ok(())
        })
    }
}
