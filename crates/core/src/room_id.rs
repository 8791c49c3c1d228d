//! Room code generation and parsing
//!
//! Room code format: W-XXXX, where each X is drawn from an alphabet of
//! uppercase letters and digits without the look-alikes I, O, 0 and 1.

use std::str::FromStr;

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Prefix shared by every room code
pub const ROOM_ID_PREFIX: &str = "W-";

/// Symbols allowed after the prefix
pub const ROOM_ID_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Number of alphabet symbols after the prefix
pub const ROOM_CODE_LEN: usize = 4;

/// Namespace that tells the transport to track membership
pub const PRESENCE_CHANNEL_PREFIX: &str = "presence-room-";

/// A validated room code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    /// Draw a fresh room code from the OS random source
    pub fn generate() -> Self {
        let alphabet = ROOM_ID_ALPHABET.as_bytes();
        let mut rng = OsRng;
        let mut code = String::with_capacity(ROOM_ID_PREFIX.len() + ROOM_CODE_LEN);
        code.push_str(ROOM_ID_PREFIX);
        for _ in 0..ROOM_CODE_LEN {
            let idx = rng.gen_range(0..alphabet.len());
            code.push(alphabet[idx] as char);
        }
        debug_assert!(is_valid(&code));
        Self(code)
    }

    /// Normalize user input and accept it only if it is a valid code
    pub fn parse(input: &str) -> Result<Self> {
        let normalized = normalize(input);
        if is_valid(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(Error::InvalidRoomCode(input.trim().to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the presence channel bound to this room
    pub fn channel_name(&self) -> String {
        format!("{}{}", PRESENCE_CHANNEL_PREFIX, self.0)
    }
}

/// Clean up free-text input into the canonical room code shape.
///
/// Trims, uppercases and strips all whitespace. The dashless form `WXXXX` is
/// rewritten to `W-XXXX`; anything else is returned cleaned but otherwise
/// untouched, so the result may still be invalid.
pub fn normalize(input: &str) -> String {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect();

    match cleaned.strip_prefix('W') {
        Some(rest) if rest.chars().count() == ROOM_CODE_LEN && rest.chars().all(in_alphabet) => {
            format!("{}{}", ROOM_ID_PREFIX, rest)
        }
        _ => cleaned,
    }
}

/// Exact check for `W-` followed by four alphabet symbols
pub fn is_valid(candidate: &str) -> bool {
    match candidate.strip_prefix(ROOM_ID_PREFIX) {
        Some(rest) => rest.chars().count() == ROOM_CODE_LEN && rest.chars().all(in_alphabet),
        None => false,
    }
}

fn in_alphabet(c: char) -> bool {
    ROOM_ID_ALPHABET.contains(c)
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}
