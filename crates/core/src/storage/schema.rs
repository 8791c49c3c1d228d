//! SQLite schema for the session store

/// Tables are created idempotently on every open
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS start_payloads (
    room_id TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    saved_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS drafts (
    room_id TEXT PRIMARY KEY,
    body TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;
