//! Conversation management: list, history, stats, archive, delete.

use crate::runtime;
use helmsman_config::AppConfig;
use helmsman_core::message::{Message, Role};
use helmsman_core::transcript::TranscriptStore;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

pub async fn list(config: &AppConfig, user: &str, include_archived: bool) -> CmdResult {
    let store = runtime::open_store(config).await?;
    let conversations = store.list_conversations(user, include_archived).await?;
    if conversations.is_empty() {
        println!("No conversations for {user}.");
        return Ok(());
    }

    println!("{:<38} {:<9} {:<20} PROJECT", "ID", "STATUS", "UPDATED");
    for conversation in conversations {
        println!(
            "{:<38} {:<9} {:<20} {}",
            conversation.id.as_str(),
            conversation.status.as_str(),
            conversation.updated_at.format("%Y-%m-%d %H:%M:%S"),
            conversation.project_id.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn print_message(message: &Message) {
    let time = message.created_at.format("%H:%M:%S");
    match message.role {
        Role::Tool => println!(
            "[{time}] tool ({}): {}",
            message.tool_call_id.as_deref().unwrap_or("?"),
            message.content
        ),
        role => {
            if !message.content.is_empty() {
                println!("[{time}] {}: {}", role.as_str(), message.content);
            }
            for call in &message.tool_calls {
                println!(
                    "[{time}] {} -> {}({}) [{}]",
                    role.as_str(),
                    call.name,
                    call.arguments,
                    call.id
                );
            }
        }
    }
}

pub async fn history(config: &AppConfig, user: &str, id: &str, model_view: bool) -> CmdResult {
    let store = runtime::open_store(config).await?;
    let conversation = runtime::owned_conversation(&store, user, id).await?;

    let messages = if model_view {
        store
            .build_model_history(conversation.id.as_str(), config.orchestrator.history_limit)
            .await?
    } else {
        store.get_messages(conversation.id.as_str()).await?
    };

    println!("Conversation {} ({})", conversation.id.as_str(), conversation.status.as_str());
    for message in &messages {
        print_message(message);
    }
    Ok(())
}

pub async fn stats(config: &AppConfig, user: &str, id: &str) -> CmdResult {
    let store = runtime::open_store(config).await?;
    let conversation = runtime::owned_conversation(&store, user, id).await?;
    let stats = store.compute_stats(conversation.id.as_str()).await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

pub async fn archive(config: &AppConfig, user: &str, id: &str) -> CmdResult {
    let store = runtime::open_store(config).await?;
    runtime::owned_conversation(&store, user, id).await?;
    if store.archive_conversation(id).await? {
        println!("Archived {id}");
    }
    Ok(())
}

pub async fn delete(config: &AppConfig, user: &str, id: &str) -> CmdResult {
    let store = runtime::open_store(config).await?;
    runtime::owned_conversation(&store, user, id).await?;
    if store.delete_conversation(id).await? {
        println!("Deleted {id} and its messages");
    }
    Ok(())
}
