//! The orchestration loop: the heart of Helmsman.
//!
//! One user message becomes one final answer:
//!
//! 1. **Resolve** the conversation and append the user turn
//! 2. **Build history** from the transcript (incomplete tool-call groups dropped)
//! 3. **Call the model** with the registered tools
//! 4. **If tool calls**: persist the request, run each tool, persist each result, loop back
//! 5. **If text**: persist the answer and return it
//!
//! The loop is bounded by `max_rounds`; a model that keeps asking for tools
//! gets one last call with tools disabled.

pub mod orchestrator;
pub mod request;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use orchestrator::{FALLBACK_MESSAGE, LoopState, Orchestrator, OrchestratorSettings};
pub use request::{ChatRequest, ChatResponse, ResponseMetadata, ToolCallSummary};
