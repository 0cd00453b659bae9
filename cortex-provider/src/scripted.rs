//! A provider that replays a canned script. The workhorse of kernel tests.

use crate::{fresh_request_id, Provider, ProviderCall, ProviderError, ProviderReply};
use async_trait::async_trait;
use cortex_types::{ContentPart, FinishReason};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted step: a reply or a failure.
pub type ScriptStep = Result<ProviderReply, ProviderError>;

/// Replays a queue of canned replies and records every call it receives.
///
/// When the script runs dry it answers with a plain text reply, so tests
/// only script the calls they care about.
pub struct ScriptedProvider {
    model: String,
    script: Mutex<VecDeque<ScriptStep>>,
    calls: Mutex<Vec<ProviderCall>>,
}

impl ScriptedProvider {
    /// A provider with an empty script.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a step.
    pub fn push(&self, step: ScriptStep) {
        self.script.lock().expect("script lock").push_back(step);
    }

    /// Queue a plain text reply.
    pub fn push_text(&self, content: impl Into<String>, input_tokens: u64, output_tokens: u64) {
        let content = content.into();
        self.push(Ok(ProviderReply {
            content_blocks: Some(vec![ContentPart::Text {
                text: content.clone(),
            }]),
            content,
            finish_reason: FinishReason::Stop,
            input_tokens,
            output_tokens,
            model_id: self.model.clone(),
            request_id: fresh_request_id(),
        }));
    }

    /// Queue a reply requesting one tool use.
    pub fn push_tool_use(
        &self,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
        input_tokens: u64,
        output_tokens: u64,
    ) {
        self.push(Ok(ProviderReply {
            content: String::new(),
            content_blocks: Some(vec![ContentPart::ToolUse {
                id: fresh_request_id(),
                name: tool_name.into(),
                input: arguments,
            }]),
            finish_reason: FinishReason::ToolUse,
            input_tokens,
            output_tokens,
            model_id: self.model.clone(),
            request_id: fresh_request_id(),
        }));
    }

    /// Queue a blockless reply, the way older plain-text backends answer.
    pub fn push_blockless(
        &self,
        content: impl Into<String>,
        finish_reason: FinishReason,
        input_tokens: u64,
        output_tokens: u64,
    ) {
        self.push(Ok(ProviderReply {
            content: content.into(),
            content_blocks: None,
            finish_reason,
            input_tokens,
            output_tokens,
            model_id: self.model.clone(),
            request_id: fresh_request_id(),
        }));
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn send(&self, call: ProviderCall) -> Result<ProviderReply, ProviderError> {
        self.calls.lock().expect("calls lock").push(call);
        let step = self.script.lock().expect("script lock").pop_front();
        match step {
            Some(step) => step,
            None => Ok(ProviderReply {
                content: "ok".into(),
                content_blocks: Some(vec![ContentPart::Text { text: "ok".into() }]),
                finish_reason: FinishReason::Stop,
                input_tokens: 1,
                output_tokens: 1,
                model_id: self.model.clone(),
                request_id: fresh_request_id(),
            }),
        }
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}
