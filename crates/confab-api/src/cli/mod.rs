//! CLI command definitions and dispatch for the `confab` binary.
//!
//! Uses clap derive macros for argument parsing. The CLI follows a
//! verb-noun pattern (e.g., `confab chat`, `confab list`, `confab rename`).

pub mod chat;
pub mod session;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Chat sessions with a synchronized, streaming assistant.
#[derive(Parser)]
#[command(name = "confab", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export traces via OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start or resume an interactive chat session.
    Chat {
        /// Session id to resume; a new session is created when omitted.
        #[arg(long)]
        session: Option<Uuid>,

        /// Title for a newly created session.
        #[arg(long)]
        title: Option<String>,
    },

    /// Ask a one-shot question outside any session; nothing is persisted.
    Ask {
        /// The question to ask.
        question: Vec<String>,
    },

    /// List sessions, most recently updated first.
    #[command(alias = "ls")]
    List {
        /// Include archived sessions.
        #[arg(long)]
        all: bool,

        /// Show archived sessions only.
        #[arg(long, conflicts_with = "all")]
        archived: bool,
    },

    /// Rename a session.
    Rename {
        session: Uuid,
        title: String,
    },

    /// Pin a session.
    Pin { session: Uuid },

    /// Unpin a session.
    Unpin { session: Uuid },

    /// Archive a session.
    Archive { session: Uuid },

    /// Restore an archived session.
    Unarchive { session: Uuid },

    /// Delete a session and all of its messages.
    #[command(alias = "rm")]
    Delete {
        session: Uuid,

        /// Skip the confirmation prompt.
        #[arg(long, short)]
        force: bool,
    },

    /// Show message history for a session, oldest first.
    History {
        session: Uuid,

        /// How many pages of history to fetch, walking backwards.
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
}
