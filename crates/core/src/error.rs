//! Error types for WordArena Core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid room code: {0}")]
    InvalidRoomCode(String),

    #[error("Only the host can {0}")]
    NotHost(&'static str),

    #[error("Not joined to a room")]
    NotJoined,

    #[error("Session is locked")]
    SessionLocked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
