//! Application messages carried on a room channel

use serde_json::Value;

use crate::error::Result;
use crate::models::{RoomSettings, StartPayload};

/// Event name for host settings broadcasts
pub const ROOM_SETTINGS_EVENT: &str = "room-settings";

/// Event name for the synchronized start broadcast
pub const START_GAME_EVENT: &str = "start-game";

/// A decoded room message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    Settings(RoomSettings),
    StartGame(StartPayload),
}

impl RoomEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::Settings(_) => ROOM_SETTINGS_EVENT,
            RoomEvent::StartGame(_) => START_GAME_EVENT,
        }
    }

    /// JSON body sent on the wire
    pub fn to_data(&self) -> Result<Value> {
        let data = match self {
            RoomEvent::Settings(settings) => serde_json::to_value(settings)?,
            RoomEvent::StartGame(payload) => serde_json::to_value(payload)?,
        };
        Ok(data)
    }

    /// Decode a channel event. `Ok(None)` for events this protocol ignores.
    pub fn decode(name: &str, data: Value) -> Result<Option<Self>> {
        let event = match name {
            ROOM_SETTINGS_EVENT => Some(RoomEvent::Settings(serde_json::from_value(data)?)),
            START_GAME_EVENT => Some(RoomEvent::StartGame(serde_json::from_value(data)?)),
            _ => None,
        };
        Ok(event)
    }
}
