//! SQLite-backed store

use super::{Chat, ChatStore, MessageStore, StoreError, StoreResult, StoredMessage};
use crate::message::Role;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS chats (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chats_user ON chats(user_id, created_at DESC);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    chat_id TEXT NOT NULL,
    sequence_id INTEGER NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id, sequence_id);
";

/// Thread-safe database handle
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

fn parse_role(idx: usize, s: &str) -> rusqlite::Result<Role> {
    s.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn chat_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn append_message(
        &self,
        chat_id: &str,
        content: &str,
        role: Role,
    ) -> StoreResult<StoredMessage> {
        let conn = self.conn();
        let exists: Option<String> = conn
            .query_row("SELECT id FROM chats WHERE id = ?1", params![chat_id], |row| row.get(0))
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::ChatNotFound(chat_id.to_string()));
        }

        let sequence_id: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence_id), 0) + 1 FROM messages WHERE chat_id = ?1",
            params![chat_id],
            |row| row.get(0),
        )?;
        let message = StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        conn.execute(
            "INSERT INTO messages (id, chat_id, sequence_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id,
                chat_id,
                sequence_id,
                role.as_str(),
                content,
                message.created_at.to_rfc3339()
            ],
        )?;
        Ok(message)
    }

    async fn list_messages(&self, chat_id: &str) -> StoreResult<Vec<StoredMessage>> {
        let conn = self.conn();
        let exists: Option<String> = conn
            .query_row("SELECT id FROM chats WHERE id = ?1", params![chat_id], |row| row.get(0))
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::ChatNotFound(chat_id.to_string()));
        }

        let mut stmt = conn.prepare(
            "SELECT id, chat_id, role, content, created_at FROM messages
             WHERE chat_id = ?1 ORDER BY sequence_id",
        )?;
        let messages = stmt
            .query_map(params![chat_id], |row| {
                Ok(StoredMessage {
                    id: row.get(0)?,
                    chat_id: row.get(1)?,
                    role: parse_role(2, &row.get::<_, String>(2)?)?,
                    content: row.get(3)?,
                    created_at: parse_datetime(&row.get::<_, String>(4)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn create_chat(&self, user_id: &str, title: &str) -> StoreResult<Chat> {
        let chat = Chat {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
        };
        self.conn().execute(
            "INSERT INTO chats (id, user_id, title, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![chat.id, chat.user_id, chat.title, chat.created_at.to_rfc3339()],
        )?;
        Ok(chat)
    }

    async fn get_chat(&self, chat_id: &str) -> StoreResult<Chat> {
        self.conn()
            .query_row(
                "SELECT id, user_id, title, created_at FROM chats WHERE id = ?1",
                params![chat_id],
                chat_from_row,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::ChatNotFound(chat_id.to_string()),
                other => other.into(),
            })
    }

    async fn list_chats(&self, user_id: &str) -> StoreResult<Vec<Chat>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, created_at FROM chats
             WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;
        let chats = stmt
            .query_map(params![user_id], chat_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(chats)
    }

    async fn delete_chat(&self, user_id: &str, chat_id: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let owner: Option<String> = conn
            .query_row("SELECT user_id FROM chats WHERE id = ?1", params![chat_id], |row| row.get(0))
            .optional()?;
        match owner {
            None => return Err(StoreError::ChatNotFound(chat_id.to_string())),
            Some(owner) if owner != user_id => return Err(StoreError::Forbidden(chat_id.to_string())),
            Some(_) => {}
        }

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM messages WHERE chat_id = ?1", params![chat_id])?;
        tx.execute("DELETE FROM chats WHERE id = ?1", params![chat_id])?;
        tx.commit()?;
        Ok(())
    }
}
