//! Session management commands: list, rename, pin, archive, delete,
//! history.

use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use console::style;
use uuid::Uuid;

use confab_core::ledger::PageCursor;
use confab_types::message::Sender;
use confab_types::session::{ChatSession, SessionFilter};

use crate::state::AppState;

pub async fn list_sessions(state: &AppState, filter: SessionFilter, json: bool) -> anyhow::Result<()> {
    let mut sessions = state.registry.list(&state.owner_id(), filter).await?;
    // Pinned sessions float to the top; within each group the repository
    // order (most recently updated first) is preserved.
    sessions.sort_by_key(|s| !s.pinned);

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("No sessions. Start one with: confab chat");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["", "Title", "Id", "Messages", "Last message", "Updated"]);

    for session in &sessions {
        table.add_row(vec![
            Cell::new(flags(session)),
            Cell::new(&session.title),
            Cell::new(session.id),
            Cell::new(session.message_count),
            Cell::new(
                session
                    .last_message
                    .as_ref()
                    .map(|p| p.excerpt.as_str())
                    .unwrap_or("-"),
            ),
            Cell::new(session.updated_at.format("%Y-%m-%d %H:%M")),
        ]);
    }

    println!("{table}");
    Ok(())
}

fn flags(session: &ChatSession) -> String {
    let mut flags = String::new();
    if session.pinned {
        flags.push('*');
    }
    if session.archived {
        flags.push('a');
    }
    flags
}

pub async fn rename_session(state: &AppState, id: Uuid, title: &str) -> anyhow::Result<()> {
    state.registry.rename(id, title).await?;
    println!("{} renamed to \"{title}\"", style("ok").green().bold());
    Ok(())
}

pub async fn set_pinned(state: &AppState, id: Uuid, pinned: bool) -> anyhow::Result<()> {
    state.registry.set_pinned(id, pinned).await?;
    let verb = if pinned { "pinned" } else { "unpinned" };
    println!("{} session {verb}", style("ok").green().bold());
    Ok(())
}

pub async fn set_archived(state: &AppState, id: Uuid, archived: bool) -> anyhow::Result<()> {
    state.registry.set_archived(id, archived).await?;
    let verb = if archived { "archived" } else { "restored" };
    println!("{} session {verb}", style("ok").green().bold());
    Ok(())
}

pub async fn delete_session(state: &AppState, id: Uuid, force: bool) -> anyhow::Result<()> {
    let Some(session) = state.registry.get(id).await? else {
        anyhow::bail!("session {id} not found");
    };

    if !force {
        print!(
            "Delete \"{}\" and its {} messages? [y/N] ",
            session.title, session.message_count
        );
        use std::io::Write;
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("aborted");
            return Ok(());
        }
    }

    state.registry.delete(id).await?;
    state.ledger.forget(id);
    println!("{} session deleted", style("ok").green().bold());
    Ok(())
}

pub async fn show_history(state: &AppState, id: Uuid, pages: u32) -> anyhow::Result<()> {
    let Some(session) = state.registry.get(id).await? else {
        anyhow::bail!("session {id} not found");
    };

    // Walk backwards page by page, then print oldest first.
    let mut collected = Vec::new();
    let mut cursor = None;
    for _ in 0..pages.max(1) {
        let page = state.ledger.page(id, cursor).await?;
        if page.messages.is_empty() {
            break;
        }
        cursor = page.messages.first().map(PageCursor::from);
        let more = page.has_more;
        collected.push(page.messages);
        if !more {
            break;
        }
    }

    println!(
        "{} ({} messages)",
        style(&session.title).bold(),
        session.message_count
    );
    for page in collected.iter().rev() {
        for message in page {
            print_message(message);
        }
    }
    Ok(())
}

fn print_message(message: &confab_types::message::ChatMessage) {
    let who = match message.sender {
        Sender::User => style("you").cyan().bold(),
        Sender::Assistant => style("assistant").magenta().bold(),
    };
    let stamp = message.created_at.format("%Y-%m-%d %H:%M");
    println!("[{stamp}] {who}: {}", message.content);
}
