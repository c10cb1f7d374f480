//! Shared domain types for Confab.
//!
//! This crate contains the core domain types used across the Confab engine:
//! sessions, messages, inference request/response shapes, engine events,
//! configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod inference;
pub mod message;
pub mod session;
