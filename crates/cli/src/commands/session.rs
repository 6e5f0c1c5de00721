//! `rigchat history`, `rigchat end`, `rigchat escalate`, `rigchat feedback`.

use rigchat_core::message::Role;
use rigchat_pipeline::{FeedbackInput, SessionEnded};

use crate::runtime::{self, CliResult};

async fn service() -> CliResult<rigchat_pipeline::ChatService> {
    let config = runtime::load_config()?;
    runtime::chat_service(&config).await
}

pub async fn history(session: &str, page: usize, limit: usize) -> CliResult<()> {
    let config = runtime::load_config()?;
    if config.storage.backend == "memory" {
        eprintln!("  Note: storage.backend = \"memory\" keeps nothing between runs.");
    }
    let page = runtime::chat_service(&config)
        .await?
        .get_history(session, page, limit)
        .await?;

    let p = &page.pagination;
    println!(
        "  Session {session}, page {}/{} ({} messages)",
        p.page,
        p.total_pages.max(1),
        p.total
    );
    println!();
    for message in &page.messages {
        let who = match message.role {
            Role::User => "You",
            Role::Assistant => "Assistant",
            Role::System => "System",
        };
        let when = message.timestamp.format("%Y-%m-%d %H:%M");
        for (i, line) in message.content.lines().enumerate() {
            if i == 0 {
                println!("  [{when}] {who} > {line}");
            } else {
                println!("      {line}");
            }
        }
    }
    if p.has_more {
        println!();
        println!("  More: rigchat history {session} --page {}", p.page + 1);
    }
    Ok(())
}

pub async fn end(session: &str) -> CliResult<()> {
    let ended = service().await?.end_session(session).await?;
    print_closed(&ended);
    Ok(())
}

pub async fn escalate(session: &str) -> CliResult<()> {
    let escalated = service().await?.escalate_session(session).await?;
    print_closed(&escalated);
    println!("  A support agent takes it from here; the bot no longer replies.");
    Ok(())
}

fn print_closed(closed: &SessionEnded) {
    println!("✅ Session {} {}", closed.session_id, closed.status);
    if let Some(ms) = closed.duration_ms {
        println!("  Duration: {}s", ms / 1000);
    }
}

pub async fn feedback(session: &str, input: FeedbackInput) -> CliResult<()> {
    let feedback = service().await?.submit_feedback(session, input).await?;
    println!("✅ Feedback recorded for {session}");
    println!("{}", serde_json::to_string_pretty(&feedback)?);
    Ok(())
}
