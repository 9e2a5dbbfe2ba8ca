//! Messaging transport port and the update/keyboard model the engine speaks.

pub mod port;
pub mod throttled;
pub mod types;
