//! Tool descriptors: the abstraction over agent capabilities.
//!
//! A tool is a named, schema-described handler. Descriptors are registered in
//! the [`ToolRegistry`] once at startup and resolved by name at call time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use crate::error::ToolError;
use crate::project::{ProjectStore, ProjectStoreResolver};
use crate::provider::ToolDefinition;
use crate::transcript::TranscriptStore;

/// Arguments passed to a handler, keyed by parameter name.
pub type Arguments = serde_json::Map<String, serde_json::Value>;

/// Primitive type of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    /// Whether a JSON value inhabits this type.
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub kind: ParamType,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,
}

impl ParameterSpec {
    pub fn new(kind: ParamType, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            enum_values: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::new(ParamType::String, description)
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self::new(ParamType::Number, description)
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::new(ParamType::Integer, description)
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::new(ParamType::Boolean, description)
    }

    pub fn array(description: impl Into<String>) -> Self {
        Self::new(ParamType::Array, description)
    }

    /// Restrict the parameter to a fixed set of values.
    pub fn one_of<V: Into<serde_json::Value>>(
        mut self,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

/// The parameter schema of a tool: named parameters plus the required list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub properties: BTreeMap<String, ParameterSpec>,
    pub required: Vec<String>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required_param(mut self, name: impl Into<String>, spec: ParameterSpec) -> Self {
        let name = name.into();
        if !self.required.contains(&name) {
            self.required.push(name.clone());
        }
        self.properties.insert(name, spec);
        self
    }

    pub fn optional_param(mut self, name: impl Into<String>, spec: ParameterSpec) -> Self {
        self.properties.insert(name.into(), spec);
        self
    }

    /// Required names absent from `arguments` (a JSON `null` counts as absent).
    pub fn missing_required(&self, arguments: &Arguments) -> Vec<String> {
        self.required
            .iter()
            .filter(|name| arguments.get(name.as_str()).is_none_or(|v| v.is_null()))
            .cloned()
            .collect()
    }

    /// Render as a JSON Schema object for the model.
    pub fn to_json_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }
}

/// The callable behind a tool name.
///
/// Handlers may fail with any [`ToolError`]; the executor turns failures into
/// an unsuccessful [`ExecutionResult`] and never propagates them.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(
        &self,
        arguments: Arguments,
        context: ExecutionContext,
    ) -> Result<serde_json::Value, ToolError>;
}

/// Adapter so plain async closures can serve as handlers.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Arguments, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, ToolError>> + Send,
{
    async fn call(
        &self,
        arguments: Arguments,
        context: ExecutionContext,
    ) -> Result<serde_json::Value, ToolError> {
        (self.0)(arguments, context).await
    }
}

/// Wrap an async closure as a [`ToolHandler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Arguments, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, ToolError>> + Send,
{
    FnHandler(f)
}

/// A registered tool: name, description, schema and handler.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(handler),
        }
    }

    /// Convert this descriptor into a ToolDefinition for sending to the LLM.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.to_json_schema(),
        }
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Everything a handler may need beyond its arguments.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    pub user_id: String,
    pub project_id: Option<String>,
    pub conversation_id: Option<String>,
    pub stores: Option<Arc<dyn ProjectStoreResolver>>,
    pub transcript: Option<Arc<dyn TranscriptStore>>,
}

impl ExecutionContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_project(mut self, project_id: Option<String>) -> Self {
        self.project_id = project_id;
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_stores(mut self, stores: Arc<dyn ProjectStoreResolver>) -> Self {
        self.stores = Some(stores);
        self
    }

    pub fn with_transcript(mut self, transcript: Arc<dyn TranscriptStore>) -> Self {
        self.transcript = Some(transcript);
        self
    }

    /// Resolve the store for this context's project.
    pub async fn project_store(&self) -> Result<Arc<dyn ProjectStore>, ToolError> {
        let project_id = self.project_id.as_deref().ok_or_else(|| {
            ToolError::StoreUnavailable("no project selected for this conversation".into())
        })?;
        let stores = self
            .stores
            .as_ref()
            .ok_or_else(|| ToolError::StoreUnavailable("no project stores configured".into()))?;
        Ok(stores.resolve(project_id).await?)
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("user_id", &self.user_id)
            .field("project_id", &self.project_id)
            .field("conversation_id", &self.conversation_id)
            .field("stores", &self.stores.is_some())
            .field("transcript", &self.transcript.is_some())
            .finish()
    }
}

/// Outcome of one execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn ok(result: serde_json::Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            duration_ms,
        }
    }

    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            duration_ms,
        }
    }

    /// Content for the tool-role transcript message. Never empty: a missing or
    /// null result becomes an explicit error payload.
    pub fn transcript_payload(&self) -> String {
        match (&self.result, &self.error) {
            (Some(value), _) if self.success && !value.is_null() => value.to_string(),
            (_, Some(error)) => serde_json::json!({ "error": error }).to_string(),
            _ => serde_json::json!({ "error": "Tool returned no result" }).to_string(),
        }
    }
}

/// A registry of available tools, keyed by name.
///
/// Built once at startup and shared immutably; re-registering a name replaces
/// the earlier descriptor.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, descriptor: ToolDescriptor) {
        self.tools.insert(descriptor.name.clone(), descriptor);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// All tool definitions, sorted by name (for sending to the LLM).
    pub fn list(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(ToolDescriptor::to_definition)
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_descriptor(description: &str) -> ToolDescriptor {
        ToolDescriptor::new(
            "echo",
            description,
            ParameterSchema::new().required_param("text", ParameterSpec::string("Text to echo")),
            handler_fn(|args: Arguments, _ctx| async move {
                Ok::<_, ToolError>(args.get("text").cloned().unwrap_or_default())
            }),
        )
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_descriptor("Echoes back the input"));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_descriptor("first"));
        registry.register(echo_descriptor("second"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("echo").unwrap().description, "second");
    }

    #[test]
    fn registry_definitions_carry_json_schema() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_descriptor("Echoes back the input"));
        let defs = registry.list();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[0].parameters["type"], "object");
        assert_eq!(defs[0].parameters["properties"]["text"]["type"], "string");
        assert_eq!(defs[0].parameters["required"], json!(["text"]));
    }

    #[test]
    fn enum_constraint_rendered() {
        let schema = ParameterSchema::new().optional_param(
            "format",
            ParameterSpec::string("Output format").one_of(["csv", "json"]),
        );
        let rendered = schema.to_json_schema();
        assert_eq!(rendered["properties"]["format"]["enum"], json!(["csv", "json"]));
        assert_eq!(rendered["required"], json!([]));
    }

    #[test]
    fn missing_required_treats_null_as_absent() {
        let schema = ParameterSchema::new()
            .required_param("id", ParameterSpec::string(""))
            .required_param("table", ParameterSpec::string(""));
        let mut args = Arguments::new();
        args.insert("id".into(), json!(null));
        assert_eq!(schema.missing_required(&args), vec!["id", "table"]);

        args.insert("id".into(), json!("42"));
        args.insert("table".into(), json!("orders"));
        assert!(schema.missing_required(&args).is_empty());
    }

    #[test]
    fn integer_type_rejects_fractions() {
        assert!(ParamType::Integer.matches(&json!(3)));
        assert!(!ParamType::Integer.matches(&json!(3.5)));
        assert!(ParamType::Number.matches(&json!(3.5)));
        assert!(!ParamType::String.matches(&json!(3)));
    }

    #[test]
    fn transcript_payload_never_empty() {
        assert_eq!(
            ExecutionResult::ok(json!({"value": 7}), 1).transcript_payload(),
            r#"{"value":7}"#
        );
        assert_eq!(
            ExecutionResult::ok(json!(null), 1).transcript_payload(),
            r#"{"error":"Tool returned no result"}"#
        );
        assert_eq!(
            ExecutionResult::failure("Tool not found: nope", 0).transcript_payload(),
            r#"{"error":"Tool not found: nope"}"#
        );
    }

    #[tokio::test]
    async fn context_without_project_cannot_resolve_store() {
        let ctx = ExecutionContext::new("user-1");
        let err = ctx.project_store().await.err().unwrap();
        assert!(matches!(err, ToolError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn closure_handler_receives_arguments() {
        let descriptor = echo_descriptor("echo");
        let mut args = Arguments::new();
        args.insert("text".into(), json!("hello world"));
        let out = descriptor
            .handler
            .call(args, ExecutionContext::new("user-1"))
            .await
            .unwrap();
        assert_eq!(out, json!("hello world"));
    }
}
