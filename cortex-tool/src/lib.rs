#![deny(missing_docs)]
//! # cortex-tool — tool dispatcher
//!
//! A registry of named tool handlers. Handlers are late-bound capability
//! values registered at construction and looked up at dispatch time; the
//! dispatcher never fabricates handlers at runtime.
//!
//! A handler failure is informational, not fatal: the dispatcher returns an
//! error-status outcome that the executor feeds back to the model as a tool
//! result, and the loop continues.

#[cfg(any(test, feature = "test-utils"))]
pub mod test_tools;

use async_trait::async_trait;
use cortex_types::{ToolApi, ToolId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Terminal status of one tool execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// The handler produced output.
    Ok,
    /// The handler failed; `error` carries the message.
    Error,
}

/// Result of one tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Terminal status.
    pub status: ToolStatus,
    /// Handler output (null on error).
    pub output: serde_json::Value,
    /// Error message when `status == error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    /// A successful outcome.
    pub fn ok(output: serde_json::Value) -> Self {
        Self {
            status: ToolStatus::Ok,
            output,
            error: None,
        }
    }

    /// A failed outcome.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            output: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }

    /// Whether this outcome is an error.
    pub fn is_error(&self) -> bool {
        self.status == ToolStatus::Error
    }

    /// The `{status, output|error}` payload fed back to the model.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// One named tool capability: execute + describe.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Tool ID as the model and the constraints refer to it.
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema of the argument object.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute with a JSON argument object.
    async fn execute(&self, arguments: serde_json::Value) -> ToolOutcome;
}

/// Registry + dispatcher, keyed by tool ID.
#[derive(Default)]
pub struct ToolDispatcher {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolDispatcher {
    /// An empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Replaces any handler with the same name.
    pub fn register(&mut self, tool: Arc<dyn ToolHandler>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a handler by ID.
    pub fn get(&self, tool_id: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(tool_id).cloned()
    }

    /// Whether a handler is registered under this ID.
    pub fn contains(&self, tool_id: &str) -> bool {
        self.tools.contains_key(tool_id)
    }

    /// The JSON-Schema descriptions the model sees, filtered to the
    /// allowed set and ordered by it.
    pub fn api_tools(&self, allowed: &[ToolId]) -> Vec<ToolApi> {
        allowed
            .iter()
            .filter_map(|id| self.tools.get(id.as_str()))
            .map(|tool| ToolApi {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }

    /// Execute a named tool with a JSON argument object.
    ///
    /// An unknown tool ID returns an error outcome, same as a handler
    /// failure — the model gets to react either way.
    pub async fn dispatch(&self, tool_id: &str, arguments: serde_json::Value) -> ToolOutcome {
        let Some(tool) = self.tools.get(tool_id) else {
            tracing::warn!(%tool_id, "dispatch to unregistered tool");
            return ToolOutcome::error(format!("unknown tool: {tool_id}"));
        };
        let args_bytes = arguments.to_string().len();
        let start = Instant::now();
        let outcome = tool.execute(arguments).await;
        let result_bytes = outcome.payload().to_string().len();
        tracing::debug!(
            %tool_id,
            status = ?outcome.status,
            args_bytes,
            result_bytes,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tool dispatched"
        );
        outcome
    }
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ToolDispatcher").field("tools", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::test_tools::{EchoTool, StaticTool};
    use super::*;
    use serde_json::json;

    fn dispatcher() -> ToolDispatcher {
        let mut d = ToolDispatcher::new();
        d.register(Arc::new(EchoTool));
        d.register(Arc::new(StaticTool::new(
            "list_packages",
            "List installed packages.",
            json!({"packages": ["cortex-core", "cortex-shell"]}),
        )));
        d
    }

    #[tokio::test]
    async fn dispatches_registered_tool() {
        let d = dispatcher();
        let outcome = d.dispatch("echo", json!({"text": "hello"})).await;
        assert_eq!(outcome.status, ToolStatus::Ok);
        assert_eq!(outcome.output["echo"], "hello");
    }

    #[tokio::test]
    async fn unknown_tool_is_error_outcome() {
        let d = dispatcher();
        let outcome = d.dispatch("nope", json!({})).await;
        assert!(outcome.is_error());
        assert!(outcome.error.unwrap().contains("unknown tool"));
    }

    #[test]
    fn api_tools_respects_allowed_set() {
        let d = dispatcher();
        let apis = d.api_tools(&[ToolId::new("list_packages")]);
        assert_eq!(apis.len(), 1);
        assert_eq!(apis[0].name, "list_packages");
        // Tools not in the allowed set are invisible to the model.
        let none = d.api_tools(&[]);
        assert!(none.is_empty());
        // Allowed but unregistered tools are skipped, not errors.
        let skipped = d.api_tools(&[ToolId::new("ghost"), ToolId::new("echo")]);
        assert_eq!(skipped.len(), 1);
    }

    #[tokio::test]
    async fn error_outcome_payload_carries_message() {
        let d = dispatcher();
        let outcome = d.dispatch("echo", json!({"wrong_key": 1})).await;
        assert!(outcome.is_error());
        let payload = outcome.payload();
        assert_eq!(payload["status"], "error");
        assert!(payload["error"].as_str().unwrap().contains("text"));
    }
}
