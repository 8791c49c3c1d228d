//! Data models for WordArena rooms

mod member;
mod settings;
mod start;

pub use member::*;
pub use settings::*;
pub use start::*;
