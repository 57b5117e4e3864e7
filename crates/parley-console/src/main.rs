use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use uuid::Uuid;

use parley_chat::{ChatError, ChatSession, SendOutcome};
use parley_client::HttpBackend;
use parley_types::models::Counterpart;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug".into()),
        )
        .init();

    // Config
    let base_url =
        std::env::var("PARLEY_API_URL").unwrap_or_else(|_| "http://localhost:3000".into());
    let token = std::env::var("PARLEY_API_TOKEN").context("PARLEY_API_TOKEN must be set")?;
    let user_id: Uuid = std::env::var("PARLEY_USER_ID")
        .context("PARLEY_USER_ID must be set")?
        .parse()
        .context("PARLEY_USER_ID must be a UUID")?;

    let backend = HttpBackend::new(base_url.as_str(), token)?;
    let session = ChatSession::new(Arc::new(backend), user_id);
    info!(%base_url, %user_id, "session starting");

    // Both directories load independently at session start; either
    // failure is retryable via the `refresh` command.
    let mut roster: Vec<Counterpart> = Vec::new();
    match session.load_counterparts().await {
        Ok(list) => roster = list,
        Err(err) => print_error(&err),
    }
    if let Err(err) = session.refresh_conversations().await {
        print_error(&err);
    }

    println!("parley console — commands: contacts, convos, open <n>, send <text>, history, refresh, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "contacts" => print_contacts(&roster),
            "convos" => {
                for conversation in session.conversations().await {
                    let preview = conversation
                        .last_message
                        .map(|p| p.content)
                        .unwrap_or_else(|| "(no messages)".into());
                    println!("{}  {}", conversation.id, preview);
                }
            }
            "open" => match rest.parse::<usize>() {
                Ok(n) if n < roster.len() => {
                    let counterpart = roster[n].clone();
                    match session.open(&counterpart).await {
                        Ok(conversation) => {
                            println!("opened {} with {}", conversation.id, counterpart.display_name());
                            print_history(&session, conversation.id).await;
                        }
                        Err(err) => print_error(&err),
                    }
                }
                _ => println!("usage: open <index from `contacts`>"),
            },
            "send" => {
                let Some(conversation) = session.selected_conversation().await else {
                    println!("no conversation open — `open <n>` first");
                    continue;
                };
                session.set_draft(conversation.id, rest).await;
                match session.submit(conversation.id).await {
                    Ok(SendOutcome::Sent(message)) => println!("sent {}", message.id),
                    Ok(SendOutcome::NothingToSend) => println!("nothing to send"),
                    Ok(SendOutcome::AlreadySending) => println!("a send is already in flight"),
                    Err(err) => print_error(&err),
                }
            }
            "history" => {
                if let Some(conversation) = session.selected_conversation().await {
                    print_history(&session, conversation.id).await;
                } else {
                    println!("no conversation open");
                }
            }
            "refresh" => {
                match session.load_counterparts().await {
                    Ok(list) => roster = list,
                    Err(err) => print_error(&err),
                }
                if let Err(err) = session.refresh_conversations().await {
                    print_error(&err);
                }
            }
            "quit" | "exit" => break,
            "" => {}
            other => println!("unknown command: {other}"),
        }
    }

    Ok(())
}

fn print_contacts(roster: &[Counterpart]) {
    if roster.is_empty() {
        println!("no contacts");
    }
    for (index, counterpart) in roster.iter().enumerate() {
        println!("[{index}] {} ({})", counterpart.display_name(), counterpart.role);
    }
}

async fn print_history(session: &ChatSession, conversation_id: Uuid) {
    for group in session.day_groups(conversation_id).await {
        println!("── {} ──", group.label);
        for run in parley_chat::grouper::sender_runs(&group.messages) {
            println!("  {}:", run.sender_id);
            for message in &run.messages {
                let marker = if message.is_pending() { " (sending…)" } else { "" };
                println!("    {}{}", message.content, marker);
            }
        }
    }
}

fn print_error(err: &ChatError) {
    match err {
        ChatError::DirectoryUnavailable(_) => println!("directory unavailable — `refresh` to retry"),
        ChatError::ConversationCreateFailed(_) => {
            println!("could not start the conversation — try opening the contact again")
        }
        ChatError::HistoryUnavailable(_) => {
            println!("could not load messages — `history` to retry; cached messages remain")
        }
        ChatError::SendFailed { content, .. } => {
            println!("send failed, message removed — resend with: send {content}")
        }
    }
}
