//! End-to-end tests for the Helmsman pipeline.
//!
//! SQLite transcript and audit log, the built-in tools over a seeded project
//! database, and a scripted provider standing in for the model.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use helmsman_agent::{ChatRequest, FALLBACK_MESSAGE, Orchestrator, OrchestratorSettings};
use helmsman_core::audit::{ActionKind, AuditFilter, AuditLog};
use helmsman_core::error::ProviderError;
use helmsman_core::event::EventBus;
use helmsman_core::message::{Message, MessageToolCall, NewMessage, Role};
use helmsman_core::project::ProjectStoreResolver;
use helmsman_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use helmsman_core::transcript::TranscriptStore;
use helmsman_store::{SqliteProjectResolver, SqliteStore};
use helmsman_tools::{ToolExecutor, default_registry};
use serde_json::json;

// ── Mock Provider ────────────────────────────────────────────────────────

/// Plays back scripted turns and records every request it receives.
struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedProvider exhausted")
    }
}

fn text(content: &str) -> Result<ProviderResponse, ProviderError> {
    Ok(ProviderResponse {
        message: Message::assistant(content),
        usage: Some(Usage {
            prompt_tokens: 20,
            completion_tokens: 10,
            total_tokens: 30,
        }),
        model: "mock-model".into(),
    })
}

fn tools(calls: &[(&str, &str, serde_json::Value)]) -> Result<ProviderResponse, ProviderError> {
    let mut message = Message::assistant("");
    message.tool_calls = calls
        .iter()
        .map(|(id, name, args)| MessageToolCall {
            id: (*id).into(),
            name: (*name).into(),
            arguments: args.to_string(),
        })
        .collect();
    Ok(ProviderResponse {
        message,
        usage: Some(Usage {
            prompt_tokens: 20,
            completion_tokens: 10,
            total_tokens: 30,
        }),
        model: "mock-model".into(),
    })
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Pipeline {
    orchestrator: Orchestrator,
    provider: Arc<ScriptedProvider>,
    store: Arc<SqliteStore>,
    projects: Arc<SqliteProjectResolver>,
    _dir: tempfile::TempDir,
}

async fn pipeline(script: Vec<Result<ProviderResponse, ProviderError>>) -> Pipeline {
    let dir = tempfile::tempdir().unwrap();
    let projects = Arc::new(SqliteProjectResolver::new(dir.path()).create_missing(true));
    let acme = projects.resolve("acme").await.unwrap();
    acme.execute(
        "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL, tier TEXT NOT NULL)",
        &[],
    )
    .await
    .unwrap();
    for (id, name, tier) in [(1, "Ada", "gold"), (2, "Grace", "silver"), (3, "Linus", "gold")] {
        acme.execute(
            "INSERT INTO customers (id, name, tier) VALUES (?1, ?2, ?3)",
            &[json!(id), json!(name), json!(tier)],
        )
        .await
        .unwrap();
    }

    let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
    let executor = Arc::new(ToolExecutor::new(Arc::new(default_registry()), store.clone()));
    let provider = Arc::new(ScriptedProvider::new(script));
    let settings = OrchestratorSettings {
        model: "mock-model".into(),
        ..OrchestratorSettings::default()
    };
    let orchestrator = Orchestrator::new(
        provider.clone(),
        executor,
        store.clone(),
        Arc::new(EventBus::default()),
        settings,
    )
    .with_projects(projects.clone());

    Pipeline {
        orchestrator,
        provider,
        store,
        projects,
        _dir: dir,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn schema_then_query_then_answer() {
    let p = pipeline(vec![
        tools(&[("c1", "get_schema", json!({}))]),
        tools(&[(
            "c2",
            "query_records",
            json!({
                "sql": "SELECT name FROM customers WHERE tier = ?1 ORDER BY id",
                "params": ["gold"],
            }),
        )]),
        text("Your gold customers are Ada and Linus."),
    ])
    .await;

    let response = p
        .orchestrator
        .handle(ChatRequest::new("alice", "Who are my gold customers?").with_project("acme"))
        .await
        .unwrap();

    assert_eq!(response.message, "Your gold customers are Ada and Linus.");
    assert_eq!(response.metadata.tools_used, vec!["get_schema", "query_records"]);
    assert_eq!(response.metadata.tokens, Some(90));
    assert_eq!(response.metadata.rounds, 3);
    let rows = &response.tool_calls[1].result.result.as_ref().unwrap()["rows"];
    assert_eq!(rows, &json!([{"name": "Ada"}, {"name": "Linus"}]));

    let messages = p.store.get_messages(&response.conversation_id).await.unwrap();
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(messages[5].metadata.token_usage, Some(90));

    let records = p
        .store
        .records(AuditFilter {
            conversation_id: Some(response.conversation_id.clone()),
            ..AuditFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].tool_name, "get_schema");
    assert_eq!(records[1].action, ActionKind::Query);
    assert_eq!(records[1].project_id.as_deref(), Some("acme"));
    assert!(records.iter().all(|r| r.success && r.user_id == "alice"));

    let stats = p.store.compute_stats(&response.conversation_id).await.unwrap();
    assert_eq!(stats.tool_calls, 2);
    assert_eq!(stats.tool_messages, 2);
}

#[tokio::test]
async fn partial_tool_group_is_never_replayed() {
    let p = pipeline(vec![text("Starting over.")]).await;
    let conversation = p
        .store
        .create_conversation("alice", Some("acme"), json!(null))
        .await
        .unwrap();
    let id = conversation.id.as_str();

    // A crash after the first of two tool responses
    p.store.append_message(NewMessage::user(id, "look both up")).await.unwrap();
    let calls = ["c1", "c2"]
        .iter()
        .map(|c| MessageToolCall {
            id: (*c).into(),
            name: "get_schema".into(),
            arguments: "{}".into(),
        })
        .collect();
    p.store
        .append_message(NewMessage::assistant(id, "").with_tool_calls(calls))
        .await
        .unwrap();
    p.store
        .append_message(NewMessage::tool(id, "c1", r#"{"tables":[]}"#))
        .await
        .unwrap();

    let response = p
        .orchestrator
        .handle(ChatRequest::new("alice", "are you there?").with_conversation(id))
        .await
        .unwrap();
    assert_eq!(response.message, "Starting over.");

    let sent = &p.provider.requests()[0].messages;
    let contents: Vec<&str> = sent.iter().skip(1).map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["look both up", "are you there?"]);
    assert!(sent.iter().all(|m| m.tool_calls.is_empty() && m.role != Role::Tool));

    // The raw transcript still holds everything
    assert_eq!(p.store.get_messages(id).await.unwrap().len(), 5);
}

#[tokio::test]
async fn write_through_read_tool_is_refused() {
    let p = pipeline(vec![
        tools(&[("c1", "query_records", json!({"sql": "DELETE FROM customers"}))]),
        text("I can't delete records with a read query."),
    ])
    .await;

    let response = p
        .orchestrator
        .handle(ChatRequest::new("alice", "delete everyone").with_project("acme"))
        .await
        .unwrap();

    let result = &response.tool_calls[0].result;
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("Permission denied"));

    let acme = p.projects.resolve("acme").await.unwrap();
    let rows = acme.query("SELECT COUNT(*) AS n FROM customers", &[]).await.unwrap();
    assert_eq!(rows[0]["n"], json!(3));

    let failures = p
        .store
        .records(AuditFilter {
            tool_name: Some("query_records".into()),
            ..AuditFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(failures.len(), 1);
    assert!(!failures[0].success);
    assert!(failures[0].output.is_none());
}

#[tokio::test]
async fn update_then_analyze() {
    let p = pipeline(vec![
        tools(&[(
            "c1",
            "update_records",
            json!({
                "sql": "UPDATE customers SET tier = 'gold' WHERE name = ?1",
                "params": ["Grace"],
            }),
        )]),
        tools(&[("c2", "analyze_conversation", json!({}))]),
        text("Grace is now gold."),
    ])
    .await;

    let response = p
        .orchestrator
        .handle(ChatRequest::new("alice", "promote Grace").with_project("acme"))
        .await
        .unwrap();

    assert_eq!(response.tool_calls[0].result.result, Some(json!({"affected_rows": 1})));
    let analysis = response.tool_calls[1].result.result.as_ref().unwrap();
    assert_eq!(analysis["conversation_id"], json!(response.conversation_id));
    assert_eq!(analysis["tools"], json!({"analyze_conversation": 1, "update_records": 1}));

    let acme = p.projects.resolve("acme").await.unwrap();
    let gold = acme
        .query("SELECT COUNT(*) AS n FROM customers WHERE tier = 'gold'", &[])
        .await
        .unwrap();
    assert_eq!(gold[0]["n"], json!(3));

    let records = p.store.records(AuditFilter::default()).await.unwrap();
    assert_eq!(records[0].action, ActionKind::Modify);
    assert_eq!(records[1].action, ActionKind::Analyze);
}

#[tokio::test]
async fn missing_project_is_a_tool_error_not_a_crash() {
    let p = pipeline(vec![
        tools(&[("c1", "get_schema", json!({}))]),
        text("No project is selected."),
    ])
    .await;

    let response = p
        .orchestrator
        .handle(ChatRequest::new("alice", "what tables do I have?"))
        .await
        .unwrap();
    assert_eq!(response.message, "No project is selected.");
    assert!(!response.tool_calls[0].result.success);

    let messages = p.store.get_messages(&response.conversation_id).await.unwrap();
    assert!(messages[2].content.contains("no project selected"));
}

#[tokio::test]
async fn round_limit_with_unusable_forced_answer_falls_back() {
    let mut script: Vec<_> = (1..=5)
        .map(|i| {
            let id = format!("c{i}");
            tools(&[(id.as_str(), "get_schema", json!({}))])
        })
        .collect();
    script.push(Err(ProviderError::InvalidResponse("No choices in response".into())));
    let p = pipeline(script).await;

    let response = p
        .orchestrator
        .handle(ChatRequest::new("alice", "keep going").with_project("acme"))
        .await
        .unwrap();
    assert_eq!(response.message, FALLBACK_MESSAGE);
    assert_eq!(p.provider.requests().len(), 6);

    // Every group is complete, so the whole exchange replays
    let history = p
        .store
        .build_model_history(&response.conversation_id, 50)
        .await
        .unwrap();
    assert_eq!(history.len(), 12);
}
