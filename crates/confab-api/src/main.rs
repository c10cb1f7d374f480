//! Confab CLI entry point.
//!
//! Binary name: `confab`
//!
//! Parses CLI arguments, initializes the database and services, then
//! dispatches to the appropriate command handler.

mod cli;
mod state;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use confab_types::session::SessionFilter;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,confab=debug",
        _ => "trace",
    };

    if cli.otel {
        confab_observe::tracing_setup::init_tracing(true)
            .map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_target(false)
            .init();
    }

    // Initialize application state (DB, services)
    let state = AppState::init().await?;

    match cli.command {
        Commands::Chat { session, title } => {
            cli::chat::run_chat(&state, session, title).await?;
        }

        Commands::Ask { question } => {
            cli::chat::ask(&state, &question.join(" "), cli.json).await?;
        }

        Commands::List { all, archived } => {
            let filter = if all {
                SessionFilter::All
            } else if archived {
                SessionFilter::Archived
            } else {
                SessionFilter::Active
            };
            cli::session::list_sessions(&state, filter, cli.json).await?;
        }

        Commands::Rename { session, title } => {
            cli::session::rename_session(&state, session, &title).await?;
        }

        Commands::Pin { session } => {
            cli::session::set_pinned(&state, session, true).await?;
        }

        Commands::Unpin { session } => {
            cli::session::set_pinned(&state, session, false).await?;
        }

        Commands::Archive { session } => {
            cli::session::set_archived(&state, session, true).await?;
        }

        Commands::Unarchive { session } => {
            cli::session::set_archived(&state, session, false).await?;
        }

        Commands::Delete { session, force } => {
            cli::session::delete_session(&state, session, force).await?;
        }

        Commands::History { session, pages } => {
            cli::session::show_history(&state, session, pages).await?;
        }
    }

    if cli.otel {
        confab_observe::tracing_setup::shutdown_tracing();
    }

    Ok(())
}
