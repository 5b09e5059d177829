//! `helmsman chat`: interactive or single-message chat mode.

use crate::runtime;
use helmsman_agent::{ChatRequest, ChatResponse};
use helmsman_config::AppConfig;
use helmsman_core::event::{DomainEvent, EventBus};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

fn print_missing_key() {
    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    HELMSMAN_API_KEY     (generic)");
    eprintln!("    OPENAI_API_KEY       (OpenAI direct)");
    eprintln!("    OPENROUTER_API_KEY   (OpenRouter)");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
}

/// Print tool activity to stderr while a request runs.
fn spawn_progress(events: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let DomainEvent::ToolExecuted {
                tool_name,
                success,
                duration_ms,
                ..
            } = event.as_ref()
            {
                let mark = if *success { "ok" } else { "failed" };
                eprintln!("  [tool] {tool_name} {mark} ({duration_ms}ms)");
            }
        }
    })
}

fn print_response(response: &ChatResponse) {
    for line in response.message.lines() {
        println!("  Assistant > {line}");
    }
    let meta = &response.metadata;
    eprintln!(
        "  ({} round(s), {} tool call(s), {} tokens, {}ms)",
        meta.rounds,
        meta.tools_used.len(),
        meta.tokens.map_or_else(|| "?".to_string(), |t| t.to_string()),
        meta.latency_ms
    );
}

pub async fn run(
    config: &AppConfig,
    user: &str,
    message: Option<String>,
    conversation: Option<String>,
    project: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if !config.has_api_key() {
        print_missing_key();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider = helmsman_providers::build_from_config(config)?;
    let store = runtime::open_store(config).await?;
    let events = Arc::new(EventBus::default());
    let orchestrator = runtime::build_orchestrator(config, provider, store, events.clone());
    let progress = spawn_progress(&events);

    let request_for = |text: String, conversation: Option<String>| {
        let mut request = ChatRequest::new(user, text);
        request.project_id = project.clone();
        request.conversation_id = conversation;
        request
    };

    if let Some(msg) = message {
        // Single message mode
        let response = orchestrator.handle(request_for(msg, conversation)).await?;
        println!("{}", response.message);
        eprintln!("  conversation: {}", response.conversation_id);
        progress.abort();
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  Helmsman - interactive mode");
    println!();
    println!("  Provider:  {}", config.provider.name);
    println!("  Model:     {}", config.provider.model);
    println!("  Project:   {}", project.as_deref().unwrap_or("(none)"));
    println!("  Tools:     {}", orchestrator.executor().registry().names().join(", "));
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut conversation_id = conversation;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "exit" | "quit") {
            break;
        }

        match orchestrator
            .handle(request_for(text.to_string(), conversation_id.clone()))
            .await
        {
            Ok(response) => {
                println!();
                print_response(&response);
                println!();
                conversation_id = Some(response.conversation_id);
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    progress.abort();
    if let Some(id) = conversation_id {
        println!();
        println!("  Conversation saved as {id}");
    }
    println!();
    Ok(())
}
