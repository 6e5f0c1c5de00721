//! `rigchat chat`: single-message or interactive chat.

use std::io::Write;

use futures::StreamExt;
use rigchat_core::intent::Intent;
use rigchat_core::message::TokenUsage;
use rigchat_pipeline::{ChatService, TurnEvent};
use tokio::io::{self, AsyncBufReadExt, BufReader};

use crate::runtime::{self, CliResult};

pub async fn run(
    session: Option<String>,
    stream: bool,
    message: Option<String>,
    user: Option<String>,
) -> CliResult<()> {
    let config = runtime::load_config()?;
    let service = runtime::chat_service(&config).await?;

    let session_id = match session {
        Some(id) => id,
        None => service.create_session(user.clone()).await?.session_id.to_string(),
    };

    if let Some(msg) = message {
        // Single message mode
        if stream {
            stream_turn(&service, &session_id, &msg, user).await?;
        } else {
            eprint!("  Thinking...");
            let response = service.send_message(&session_id, &msg, user).await;
            eprint!("\r              \r");
            let response = response?;
            println!("{}", response.reply);
        }
        eprintln!("  session: {session_id}");
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║        RigChat · PC Build Assistant          ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:     {}", config.completion.model);
    println!("  Storage:   {}", config.storage.backend);
    println!("  Session:   {session_id}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(io::stdin()).lines();

    print!("  You > ");
    std::io::stdout().flush()?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            print!("  You > ");
            std::io::stdout().flush()?;
            continue;
        }
        if matches!(line, "exit" | "quit" | "/exit" | "/quit") {
            break;
        }

        let result: CliResult<()> = if stream {
            stream_turn(&service, &session_id, line, user.clone()).await
        } else {
            eprint!("  ...");
            let response = service.send_message(&session_id, line, user.clone()).await;
            eprint!("\r     \r");
            response.map(|r| {
                println!();
                for reply_line in r.reply.lines() {
                    println!("  Assistant > {reply_line}");
                }
                print_meta(r.intent, &r.metadata.tokens, r.metadata.response_time_ms, &r.metadata.sources);
            })
            .map_err(Into::into)
        };

        if let Err(e) = result {
            eprintln!("  [Error] {e}");
        }
        println!();

        print!("  You > ");
        std::io::stdout().flush()?;
    }

    println!();
    println!("  Goodbye! Session {session_id} stays open; resume with --session.");
    println!();

    Ok(())
}

/// Print fragments as they arrive, then the turn's metadata.
async fn stream_turn(
    service: &ChatService,
    session_id: &str,
    message: &str,
    user: Option<String>,
) -> CliResult<()> {
    let mut turn = service.stream_message(session_id, message, user).await?;

    print!("  Assistant > ");
    std::io::stdout().flush()?;
    while let Some(event) = turn.next().await {
        match event? {
            TurnEvent::Fragment(text) => {
                print!("{text}");
                std::io::stdout().flush()?;
            }
            TurnEvent::Done(outcome) => {
                println!();
                print_meta(
                    outcome.intent.intent,
                    &outcome.tokens,
                    outcome.response_time_ms,
                    &outcome.sources,
                );
            }
        }
    }
    Ok(())
}

fn print_meta(intent: Intent, tokens: &TokenUsage, response_time_ms: u64, sources: &[String]) {
    let mut meta = format!(
        "  [{} · {} tokens · {} ms",
        intent.as_str(),
        tokens.total,
        response_time_ms
    );
    if !sources.is_empty() {
        meta.push_str(&format!(" · sources: {}", sources.join(", ")));
    }
    meta.push(']');
    eprintln!("{meta}");
}
