//! The bounded tool-calling loop.

use chrono::Utc;
use helmsman_config::AppConfig;
use helmsman_core::error::{Error, StoreError};
use helmsman_core::event::{DomainEvent, EventBus};
use helmsman_core::message::{Conversation, Message, MessageMetadata, MessageToolCall, NewMessage};
use helmsman_core::project::ProjectStoreResolver;
use helmsman_core::provider::{Provider, ProviderRequest, ProviderResponse};
use helmsman_core::tool::{Arguments, ExecutionContext};
use helmsman_core::transcript::TranscriptStore;
use helmsman_tools::ToolExecutor;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::request::{ChatRequest, ChatResponse, ResponseMetadata, ToolCallSummary};

/// Sent when no textual answer could be produced.
pub const FALLBACK_MESSAGE: &str =
    "I'm sorry, I wasn't able to put together an answer to that. \
     Please try rephrasing your request.";

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingModel,
    ExecutingTools,
    Done,
}

/// Knobs for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Tool-bearing model calls before the forced tools-disabled call
    pub max_rounds: u32,
    pub history_limit: usize,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub system_prompt: String,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_rounds: config.orchestrator.max_rounds,
            history_limit: config.orchestrator.history_limit,
            model: config.provider.model.clone(),
            temperature: config.provider.temperature,
            max_tokens: Some(config.provider.max_tokens),
            system_prompt: config.orchestrator.system_prompt.clone(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Running totals for one request.
#[derive(Default)]
struct Turn {
    rounds: u32,
    tokens: Option<u32>,
    model: Option<String>,
    tools_used: Vec<String>,
    tool_calls: Vec<ToolCallSummary>,
}

impl Turn {
    fn record_usage(&mut self, response: &ProviderResponse) {
        if let Some(usage) = &response.usage {
            self.tokens = Some(self.tokens.unwrap_or(0).saturating_add(usage.total_tokens));
        }
        self.model = Some(response.model.clone());
    }
}

/// Unparseable or non-object arguments become an empty map; the tool's own
/// validation then reports what is missing.
fn parse_arguments(raw: &str) -> Arguments {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => Arguments::new(),
    }
}

/// The orchestration context: explicitly constructed and shared by reference.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    executor: Arc<ToolExecutor>,
    transcript: Arc<dyn TranscriptStore>,
    projects: Option<Arc<dyn ProjectStoreResolver>>,
    event_bus: Arc<EventBus>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        executor: Arc<ToolExecutor>,
        transcript: Arc<dyn TranscriptStore>,
        event_bus: Arc<EventBus>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            provider,
            executor,
            transcript,
            projects: None,
            event_bus,
            settings,
        }
    }

    /// Give tools access to project stores.
    pub fn with_projects(mut self, projects: Arc<dyn ProjectStoreResolver>) -> Self {
        self.projects = Some(projects);
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn transcript(&self) -> &Arc<dyn TranscriptStore> {
        &self.transcript
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    /// Answer one user message.
    ///
    /// Tool failures never fail the request; they are written into the
    /// transcript for the model to react to. Provider protocol violations and
    /// exhausted transport retries abort with `Err`.
    pub async fn handle(&self, request: ChatRequest) -> Result<ChatResponse, Error> {
        let result = self.run(request).await;
        if let Err(e) = &result {
            warn!(error = %e, "Request aborted");
            self.event_bus.publish(DomainEvent::ErrorOccurred {
                context: "orchestrator".into(),
                error_message: e.to_string(),
                timestamp: Utc::now(),
            });
        }
        result
    }

    async fn resolve_conversation(&self, request: &ChatRequest) -> Result<Conversation, Error> {
        match &request.conversation_id {
            Some(id) => {
                let conversation = self
                    .transcript
                    .get_conversation(id)
                    .await?
                    .filter(|c| c.user_id == request.user_id)
                    .ok_or_else(|| StoreError::ConversationNotFound(id.clone()))?;
                Ok(conversation)
            }
            None => Ok(self
                .transcript
                .create_conversation(
                    &request.user_id,
                    request.project_id.as_deref(),
                    request.context.clone().unwrap_or(serde_json::Value::Null),
                )
                .await?),
        }
    }

    fn system_turn(
        &self,
        conversation: &Conversation,
        request: &ChatRequest,
        project_id: Option<&str>,
    ) -> Message {
        let mut prompt = self.settings.system_prompt.clone();
        if let Some(project_id) = project_id {
            prompt.push_str(&format!("\n\nActive project: {project_id}"));
        }

        let context = request.context.as_ref().unwrap_or(&conversation.context);
        let is_empty = context.is_null() || context.as_object().is_some_and(|m| m.is_empty());
        if !is_empty {
            let rendered =
                serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string());
            prompt.push_str(&format!("\n\nContext:\n{rendered}"));
        }
        Message::system(prompt)
    }

    fn model_request(&self, messages: Vec<Message>) -> ProviderRequest {
        let mut request = ProviderRequest::new(self.settings.model.clone(), messages);
        request.temperature = self.settings.temperature;
        request.max_tokens = self.settings.max_tokens;
        request
    }

    async fn call_model(
        &self,
        request: ProviderRequest,
        conversation_id: &str,
        turn: &mut Turn,
    ) -> Result<ProviderResponse, helmsman_core::error::ProviderError> {
        let started = Instant::now();
        let response = self.provider.complete(request).await?;
        turn.record_usage(&response);

        let tokens_used = response.usage.map_or(0, |u| u.total_tokens);
        debug!(
            conversation_id,
            round = turn.rounds,
            tool_calls = response.message.tool_calls.len(),
            tokens_used,
            latency_ms = started.elapsed().as_millis() as u64,
            "Model responded"
        );
        self.event_bus.publish(DomainEvent::ResponseGenerated {
            conversation_id: conversation_id.to_string(),
            round: turn.rounds,
            model: response.model.clone(),
            tokens_used,
            timestamp: Utc::now(),
        });
        Ok(response)
    }

    /// Run the requested calls in order, persisting each result as it lands.
    async fn execute_tools(
        &self,
        conversation_id: &str,
        calls: &[MessageToolCall],
        context: &ExecutionContext,
        history: &mut Vec<Message>,
        turn: &mut Turn,
    ) -> Result<(), Error> {
        for call in calls {
            let arguments = parse_arguments(&call.arguments);
            let result = self.executor.execute(&call.name, arguments.clone(), context).await;

            if !result.success {
                warn!(
                    conversation_id,
                    tool = %call.name,
                    error = result.error.as_deref().unwrap_or_default(),
                    "Tool call failed"
                );
            }
            self.event_bus.publish(DomainEvent::ToolExecuted {
                conversation_id: conversation_id.to_string(),
                tool_name: call.name.clone(),
                success: result.success,
                duration_ms: result.duration_ms,
                timestamp: Utc::now(),
            });

            let stored = self
                .transcript
                .append_message(NewMessage::tool(
                    conversation_id,
                    &call.id,
                    result.transcript_payload(),
                ))
                .await?;
            history.push(stored);

            turn.tools_used.push(call.name.clone());
            turn.tool_calls.push(ToolCallSummary {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: serde_json::Value::Object(arguments),
                result,
            });
        }
        Ok(())
    }

    /// The last call after the round limit: tools disabled, protocol errors
    /// replaced by the fallback answer.
    async fn forced_answer(
        &self,
        history: &[Message],
        conversation_id: &str,
        turn: &mut Turn,
    ) -> Result<String, Error> {
        warn!(
            conversation_id,
            max_rounds = self.settings.max_rounds,
            "Round limit reached, forcing a text answer"
        );
        let request = self.model_request(history.to_vec()).without_tools();
        match self.call_model(request, conversation_id, turn).await {
            Ok(response) => Ok(response.message.content),
            Err(e) if e.is_protocol() => {
                warn!(conversation_id, error = %e, "Forced answer unusable, using fallback");
                Ok(String::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn run(&self, request: ChatRequest) -> Result<ChatResponse, Error> {
        let started = Instant::now();
        let conversation = self.resolve_conversation(&request).await?;
        let conversation_id = conversation.id.as_str().to_string();
        let project_id = request.project_id.clone().or_else(|| conversation.project_id.clone());

        info!(
            conversation_id = %conversation_id,
            user_id = %request.user_id,
            project_id = ?project_id,
            "Processing request"
        );

        self.transcript
            .append_message(NewMessage::user(&conversation_id, request.message.clone()))
            .await?;

        let mut history = vec![self.system_turn(&conversation, &request, project_id.as_deref())];
        history.extend(
            self.transcript
                .build_model_history(&conversation_id, self.settings.history_limit)
                .await?,
        );

        let mut context = ExecutionContext::new(request.user_id.clone())
            .with_project(project_id)
            .with_conversation(conversation_id.clone())
            .with_transcript(self.transcript.clone());
        if let Some(projects) = &self.projects {
            context = context.with_stores(projects.clone());
        }

        let tools = self.executor.definitions();
        let mut turn = Turn::default();
        let mut state = LoopState::AwaitingModel;
        let mut answer = String::new();

        while state != LoopState::Done {
            turn.rounds += 1;
            let request = self.model_request(history.clone()).with_tools(tools.clone());
            let response = self.call_model(request, &conversation_id, &mut turn).await?;

            if !response.message.requests_tools() {
                answer = response.message.content;
                state = LoopState::Done;
                continue;
            }

            state = LoopState::ExecutingTools;
            let calls = response.message.tool_calls;
            debug!(
                conversation_id = %conversation_id,
                round = turn.rounds,
                tool_count = calls.len(),
                ?state,
                "Executing tool calls"
            );

            // The request is durable before any tool runs
            let assistant = self
                .transcript
                .append_message(
                    NewMessage::assistant(&conversation_id, response.message.content)
                        .with_tool_calls(calls.clone()),
                )
                .await?;
            history.push(assistant);

            self.execute_tools(&conversation_id, &calls, &context, &mut history, &mut turn)
                .await?;

            if turn.rounds >= self.settings.max_rounds {
                answer = self.forced_answer(&history, &conversation_id, &mut turn).await?;
                state = LoopState::Done;
            } else {
                state = LoopState::AwaitingModel;
            }
        }

        if answer.trim().is_empty() {
            answer = FALLBACK_MESSAGE.to_string();
        }

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.transcript
            .append_message(NewMessage::assistant(&conversation_id, answer.clone()).with_metadata(
                MessageMetadata {
                    token_usage: turn.tokens,
                    model_id: turn.model.clone(),
                    latency_ms: Some(latency_ms),
                },
            ))
            .await?;

        info!(
            conversation_id = %conversation_id,
            rounds = turn.rounds,
            tools_used = turn.tools_used.len(),
            latency_ms,
            "Request completed"
        );
        self.event_bus.publish(DomainEvent::RequestCompleted {
            conversation_id: conversation_id.clone(),
            rounds: turn.rounds,
            tools_used: turn.tools_used.clone(),
            latency_ms,
            timestamp: Utc::now(),
        });

        Ok(ChatResponse {
            conversation_id,
            message: answer,
            tool_calls: turn.tool_calls,
            metadata: ResponseMetadata {
                tokens: turn.tokens,
                model: turn.model,
                latency_ms,
                tools_used: turn.tools_used,
                rounds: turn.rounds,
            },
        })
    }
}
