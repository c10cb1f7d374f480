//! Interactive chat loop.
//!
//! Coordinates one session's conversation lifecycle: session creation or
//! resume, history replay, the input loop with progressively revealed
//! responses, stop-on-ctrl-c mid-reveal, feedback commands, and read
//! tracking for displayed assistant replies.

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use console::style;
use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use confab_core::conversation::SendResult;
use confab_core::read_tracker::ReadTracker;
use confab_core::reveal::{RevealOutcome, RevealStep};
use confab_observe::latency::LatencyObserver;
use confab_types::message::{DeliveryStatus, Feedback, Sender};
use confab_types::session::ChatSession;

use crate::state::AppState;

pub async fn run_chat(
    state: &AppState,
    session_id: Option<Uuid>,
    title: Option<String>,
) -> anyhow::Result<()> {
    let session = resolve_session(state, session_id, title).await?;
    print_banner(&session);

    // Seed the view with stored history so a resumed session picks up
    // where it left off.
    state.ledger.hydrate(session.id).await?;

    // Keep the view merged with authoritative snapshots for the whole
    // chat; the drain task ends when the subscription is torn down.
    let view = state.ledger.view(session.id);
    let mut subscription = state.reconciler.subscribe(view);
    tokio::spawn(async move { while subscription.changed().await.is_some() {} });

    let cancel = CancellationToken::new();

    let tracker = Arc::new(ReadTracker::new(
        state.ledger.clone(),
        session.id,
        Duration::from_millis(state.config.read_tracker.debounce_ms),
    ));
    {
        let tracker = tracker.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { tracker.run(cancel).await });
    }

    let observer = Arc::new(LatencyObserver::new());
    {
        let observer = observer.clone();
        let events = state.events.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { observer.run(&events, cancel).await });
    }

    replay_history(state, session.id).await?;

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        // Everything currently displayed counts as visible to the tracker.
        for message in state.ledger.messages(session.id).await {
            tracker.observe(&message);
        }

        print!("{} ", style("you>").cyan().bold());
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        match line.as_str() {
            "/quit" | "/exit" => break,
            "/like" => {
                apply_feedback(state, session.id, Feedback::Like).await?;
                continue;
            }
            "/dislike" => {
                apply_feedback(state, session.id, Feedback::Dislike).await?;
                continue;
            }
            "/retry" => {
                retry_failed(state, session.id).await?;
                continue;
            }
            _ => {}
        }

        send_turn(state, session.id, &line).await?;
    }

    cancel.cancel();
    let _ = tracker.flush_due().await;
    debug!(session_id = %session.id, "chat loop ended");
    println!("bye");
    Ok(())
}

/// One-shot session-less question. Goes through the gateway's cacheable
/// path and persists nothing.
pub async fn ask(state: &AppState, question: &str, json: bool) -> anyhow::Result<()> {
    let spinner = thinking_spinner();

    let result = state.gateway.send(question, None).await;
    spinner.finish_and_clear();

    let answer = result?;
    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    println!("{}", answer.text);
    for source in &answer.source_refs {
        let line = match &source.url {
            Some(url) => format!("  [{}] {url}", source.title),
            None => format!("  [{}]", source.title),
        };
        println!("{}", style(line).dim());
    }
    Ok(())
}

async fn resolve_session(
    state: &AppState,
    session_id: Option<Uuid>,
    title: Option<String>,
) -> anyhow::Result<ChatSession> {
    match session_id {
        Some(id) => state
            .registry
            .get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("session {id} not found")),
        None => Ok(state.registry.create(&state.owner_id(), title).await?),
    }
}

fn print_banner(session: &ChatSession) {
    println!(
        "{} {}",
        style(&session.title).bold(),
        style(format!("({})", session.id)).dim()
    );
    println!("{}", style("type /quit to leave, ctrl-c to stop a reply").dim());
}

async fn replay_history(state: &AppState, session_id: Uuid) -> anyhow::Result<()> {
    let page = state.ledger.page(session_id, None).await?;
    if page.has_more {
        println!("{}", style("(older messages omitted; see confab history)").dim());
    }
    for message in &page.messages {
        let who = match message.sender {
            Sender::User => style("you>").cyan().bold(),
            Sender::Assistant => style("assistant>").magenta().bold(),
        };
        println!("{who} {}", message.content);
    }
    Ok(())
}

async fn apply_feedback(
    state: &AppState,
    session_id: Uuid,
    feedback: Feedback,
) -> anyhow::Result<()> {
    let last_reply = state
        .ledger
        .messages(session_id)
        .await
        .into_iter()
        .rev()
        .find(|m| m.sender == Sender::Assistant);
    match last_reply {
        Some(reply) => {
            state
                .ledger
                .set_feedback(session_id, reply.id, Some(feedback))
                .await?;
            println!("{} feedback recorded", style("ok").green().bold());
        }
        None => println!("nothing to rate yet"),
    }
    Ok(())
}

/// Retry the durable write for the most recent message stuck in the
/// error state.
async fn retry_failed(state: &AppState, session_id: Uuid) -> anyhow::Result<()> {
    let failed = state
        .ledger
        .messages(session_id)
        .await
        .into_iter()
        .rev()
        .find(|m| m.status == DeliveryStatus::Error);
    match failed {
        Some(message) => {
            state.ledger.retry(session_id, message.id).await?;
            println!("{} message saved", style("ok").green().bold());
        }
        None => println!("nothing to retry"),
    }
    Ok(())
}

fn thinking_spinner() -> indicatif::ProgressBar {
    let spinner = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")
    {
        spinner.set_style(style);
    }
    spinner.set_message("thinking...");
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

async fn send_turn(state: &AppState, session_id: Uuid, question: &str) -> anyhow::Result<()> {
    let spinner = thinking_spinner();

    let result = state.conversation.send(session_id, question).await;
    spinner.finish_and_clear();

    let mut turn = match result {
        Ok(SendResult::Streaming(turn)) => turn,
        Ok(SendResult::Failed { notice, .. }) => {
            println!(
                "{} {}",
                style("assistant>").magenta().bold(),
                style(&notice.content).yellow()
            );
            return Ok(());
        }
        Err(err) => {
            println!("{} {err}", style("!").yellow().bold());
            return Ok(());
        }
    };

    print!("{} ", style("assistant>").magenta().bold());
    std::io::stdout().flush()?;

    let stop = turn.reveal.cancellation_token();
    let mut printed = 0usize;
    let outcome = loop {
        tokio::select! {
            step = turn.reveal.next() => match step {
                Some(RevealStep::Partial(prefix)) => {
                    print_delta(&prefix, &mut printed)?;
                }
                Some(RevealStep::Done(outcome)) => break outcome,
                None => break RevealOutcome::Cancelled { partial: String::new() },
            },
            _ = tokio::signal::ctrl_c() => {
                // The terminal outcome still arrives with the partial text.
                stop.cancel();
            }
        }
    };

    let text = match outcome {
        RevealOutcome::Completed(text) => {
            print_delta(&text, &mut printed)?;
            println!();
            text
        }
        RevealOutcome::Cancelled { partial } => {
            println!(" {}", style("[stopped]").dim());
            partial
        }
    };

    state.conversation.finalize(turn.meta, text).await;
    Ok(())
}

fn print_delta(prefix: &str, printed: &mut usize) -> anyhow::Result<()> {
    let delta: String = prefix.chars().skip(*printed).collect();
    *printed = prefix.chars().count();
    print!("{delta}");
    std::io::stdout().flush()?;
    Ok(())
}
