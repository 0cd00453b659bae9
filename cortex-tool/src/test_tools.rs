//! Simple handlers for tests and demos.

use crate::{ToolHandler, ToolOutcome};
use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::json;

/// Arguments for [`EchoTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct EchoArgs {
    /// Text to echo back.
    pub text: String,
}

/// Echoes its `text` argument back as `{"echo": text}`.
pub struct EchoTool;

#[async_trait]
impl ToolHandler for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text back."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::to_value(schema_for!(EchoArgs)).unwrap_or(json!({"type": "object"}))
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolOutcome {
        match serde_json::from_value::<EchoArgs>(arguments) {
            Ok(args) => ToolOutcome::ok(json!({"echo": args.text})),
            Err(e) => ToolOutcome::error(e.to_string()),
        }
    }
}

/// Returns a fixed payload regardless of arguments. Useful for scripting
/// collaborator tools (package lists, registries) in tests.
pub struct StaticTool {
    name: String,
    description: String,
    payload: serde_json::Value,
}

impl StaticTool {
    /// Create a static tool with the given name, description, and payload.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            payload,
        }
    }
}

#[async_trait]
impl ToolHandler for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _arguments: serde_json::Value) -> ToolOutcome {
        ToolOutcome::ok(self.payload.clone())
    }
}

/// Always fails with the configured message. For exercising the
/// tool-error-as-information path.
pub struct FailingTool {
    name: String,
    message: String,
}

impl FailingTool {
    /// Create a failing tool.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always fails."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object"})
    }

    async fn execute(&self, _arguments: serde_json::Value) -> ToolOutcome {
        ToolOutcome::error(self.message.clone())
    }
}
