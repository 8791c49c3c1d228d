//! Session-scoped local state
//!
//! Holds the most recent StartPayload per room so a restarted client can
//! resume its countdown without hearing from the host again, plus the
//! local writing draft. Nothing here is shared with other participants.

mod memory;
mod schema;
mod sqlite;

use crate::error::Result;
use crate::models::StartPayload;
use crate::room_id::RoomId;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Per-room persisted state
pub trait SessionStore: Send {
    /// Most recent start payload for a room
    fn load_start(&self, room_id: &RoomId) -> Result<Option<StartPayload>>;

    /// Overwrite the start payload for a room
    fn save_start(&mut self, room_id: &RoomId, payload: &StartPayload) -> Result<()>;

    /// Local draft text for a room
    fn load_draft(&self, room_id: &RoomId) -> Result<Option<String>>;

    fn save_draft(&mut self, room_id: &RoomId, text: &str) -> Result<()>;

    /// Forget everything stored for one room
    fn clear_room(&mut self, room_id: &RoomId) -> Result<()>;

    /// End the session scope: forget every room
    fn clear_all(&mut self) -> Result<()>;
}
