//! Infrastructure adapters for Confab.
//!
//! Implements the port traits from `confab-core`: SQLite-backed session and
//! message repositories with a change feed that pushes full per-session
//! snapshots after every committed write, an HTTP client for the inference
//! endpoint, and configuration loading from the data directory.

pub mod config;
pub mod feed;
pub mod inference;
pub mod sqlite;
