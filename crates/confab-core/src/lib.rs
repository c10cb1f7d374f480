//! Business logic and port trait definitions for Confab.
//!
//! This crate defines the "ports" (repository and client traits) that the
//! infrastructure layer implements, plus the engine components themselves:
//! Response Gateway, Streaming Revealer, Session Registry, Message Ledger,
//! Sync Reconciler, Read-Tracker, and the conversation orchestrator.
//! It depends only on `confab-types` -- never on `confab-infra` or any
//! database/HTTP crate.

pub mod conversation;
pub mod event;
pub mod gateway;
pub mod ledger;
pub mod read_tracker;
pub mod registry;
pub mod reveal;
pub mod sync;
