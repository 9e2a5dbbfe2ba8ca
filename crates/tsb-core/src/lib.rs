//! Core of the group-logging Telegram console.
//!
//! Everything here is transport-agnostic: Telegram, the database and the
//! report generator sit behind ports implemented in the adapter crates.

pub mod action;
pub mod cache;
pub mod config;
pub mod directory;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod formatting;
pub mod log_pipeline;
pub mod logging;
pub mod messaging;
pub mod pagination;
pub mod pending;
pub mod permissions;
pub mod report;
pub mod store;
pub mod texts;

pub use errors::{Error, Result};
