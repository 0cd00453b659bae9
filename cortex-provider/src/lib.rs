#![deny(missing_docs)]
//! # cortex-provider — the LLM backend boundary
//!
//! [`Provider`] is the one trait concrete backends implement. The kernel
//! ships no wire-format providers; deployments register their own. What the
//! kernel does own is the error classification: every transport failure maps
//! to a retry hint and an [`ErrorCode`] the gateway copies onto its response.
//!
//! The trait is object-safe by design — the gateway holds a
//! [`ProviderRegistry`] of `Arc<dyn Provider>` keyed by provider ID.

#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;

use async_trait::async_trait;
use cortex_types::{ContentPart, ErrorCode, FinishReason, ProviderId, ToolApi};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// What the gateway hands a provider for one completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCall {
    /// Model to serve the call.
    pub model_id: String,
    /// The fully rendered prompt.
    pub prompt: String,
    /// Maximum output tokens.
    pub max_tokens: u64,
    /// Sampling temperature.
    pub temperature: f64,
    /// Transport timeout. Authoritative — there is no cooperative
    /// cancellation above the provider.
    pub timeout_ms: u64,
    /// Structured-output spec, when the contract asks for one.
    pub structured_output: Option<serde_json::Value>,
    /// Tools offered to the model.
    #[serde(default)]
    pub tools: Vec<ToolApi>,
}

/// What a provider returns on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderReply {
    /// Concatenated text content.
    pub content: String,
    /// Structured blocks preserving tool-use entries. Older plain-text
    /// backends omit this entirely; the executor copes.
    pub content_blocks: Option<Vec<ContentPart>>,
    /// Why generation stopped.
    pub finish_reason: FinishReason,
    /// Tokens consumed by the prompt.
    pub input_tokens: u64,
    /// Tokens generated.
    pub output_tokens: u64,
    /// Model that actually served the call.
    pub model_id: String,
    /// Provider-assigned request ID.
    pub request_id: String,
}

/// Typed transport failures with a retry-classification hint.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credentials rejected. Not retryable.
    #[error("auth failed: {0}")]
    Auth(String),

    /// HTTP 429. Retryable.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// HTTP 5xx. Retryable.
    #[error("server error: {0}")]
    Server(String),

    /// HTTP 400. Not retryable.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Transport timeout. Retryable.
    #[error("timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ProviderError {
    /// Whether retrying this request might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited(_) | ProviderError::Server(_) | ProviderError::Timeout { .. }
        )
    }

    /// The code the gateway stamps on its response for this failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ProviderError::Auth(_) => ErrorCode::AuthError,
            ProviderError::RateLimited(_) => ErrorCode::RateLimited,
            ProviderError::Server(_) => ErrorCode::ServerError,
            ProviderError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            ProviderError::Timeout { .. } => ErrorCode::Timeout,
            ProviderError::Other(_) => ErrorCode::ServerError,
        }
    }
}

/// The LLM backend interface.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send one completion call.
    async fn send(&self, call: ProviderCall) -> Result<ProviderReply, ProviderError>;

    /// Model used when neither the request nor the route names one.
    fn default_model(&self) -> &str;
}

/// Provider lookup, keyed by provider ID. Built once at startup.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under an ID.
    pub fn register(&mut self, id: ProviderId, provider: Arc<dyn Provider>) {
        self.providers.insert(id.to_string(), provider);
    }

    /// Look up a provider.
    pub fn get(&self, id: &ProviderId) -> Option<Arc<dyn Provider>> {
        self.providers.get(id.as_str()).cloned()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("ProviderRegistry").field("providers", &ids).finish()
    }
}

/// A fresh provider-style request ID (`req_<12 hex>`).
pub fn fresh_request_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("req_{}", &hex[..12])
}
