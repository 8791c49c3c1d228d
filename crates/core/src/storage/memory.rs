//! In-memory session store, lost when the process exits

use std::collections::HashMap;

use crate::error::Result;
use crate::models::StartPayload;
use crate::room_id::RoomId;

use super::SessionStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    starts: HashMap<RoomId, StartPayload>,
    drafts: HashMap<RoomId, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn load_start(&self, room_id: &RoomId) -> Result<Option<StartPayload>> {
        Ok(self.starts.get(room_id).cloned())
    }

    fn save_start(&mut self, room_id: &RoomId, payload: &StartPayload) -> Result<()> {
        self.starts.insert(room_id.clone(), payload.clone());
        Ok(())
    }

    fn load_draft(&self, room_id: &RoomId) -> Result<Option<String>> {
        Ok(self.drafts.get(room_id).cloned())
    }

    fn save_draft(&mut self, room_id: &RoomId, text: &str) -> Result<()> {
        self.drafts.insert(room_id.clone(), text.to_string());
        Ok(())
    }

    fn clear_room(&mut self, room_id: &RoomId) -> Result<()> {
        self.starts.remove(room_id);
        self.drafts.remove(room_id);
        Ok(())
    }

    fn clear_all(&mut self) -> Result<()> {
        self.starts.clear();
        self.drafts.clear();
        Ok(())
    }
}
