//! SQLite-backed session store
//!
//! Survives a process restart, which is how a terminal client "reloads".

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, instrument};

use crate::error::Result;
use crate::models::StartPayload;
use crate::room_id::RoomId;

use super::schema::SCHEMA;
use super::SessionStore;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create the store at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

impl SessionStore for SqliteStore {
    fn load_start(&self, room_id: &RoomId) -> Result<Option<StartPayload>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM start_payloads WHERE room_id = ?1",
                params![room_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save_start(&mut self, room_id: &RoomId, payload: &StartPayload) -> Result<()> {
        let json = serde_json::to_string(payload)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO start_payloads (room_id, payload, saved_at)
             VALUES (?1, ?2, ?3)",
            params![room_id.as_str(), json, Utc::now().to_rfc3339()],
        )?;
        debug!(room_id = %room_id, start_at = payload.start_at, "Persisted start payload");
        Ok(())
    }

    fn load_draft(&self, room_id: &RoomId) -> Result<Option<String>> {
        let body = self
            .conn
            .query_row(
                "SELECT body FROM drafts WHERE room_id = ?1",
                params![room_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    fn save_draft(&mut self, room_id: &RoomId, text: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO drafts (room_id, body, updated_at) VALUES (?1, ?2, ?3)",
            params![room_id.as_str(), text, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn clear_room(&mut self, room_id: &RoomId) -> Result<()> {
        self.conn.execute(
            "DELETE FROM start_payloads WHERE room_id = ?1",
            params![room_id.as_str()],
        )?;
        self.conn.execute(
            "DELETE FROM drafts WHERE room_id = ?1",
            params![room_id.as_str()],
        )?;
        Ok(())
    }

    fn clear_all(&mut self) -> Result<()> {
        self.conn
            .execute_batch("DELETE FROM start_payloads; DELETE FROM drafts;")?;
        Ok(())
    }
}
