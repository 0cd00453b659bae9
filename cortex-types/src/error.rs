//! Failure taxonomy shared across tiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a work order failed.
///
/// The executor never raises to the supervisor — it returns a failed work
/// order carrying one of these kinds. Retryability is a property of the kind:
/// the supervisor may re-dispatch `RateLimited`, `ServerError`, and `Timeout`
/// within its own retry bound; everything else is terminal for the chain.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The work order named a prompt contract that is not loaded.
    ContractNotFound,
    /// `input_context` failed the contract's input schema.
    InputSchemaInvalid,
    /// The final LLM output failed the contract's output schema.
    OutputSchemaInvalid,
    /// A budget check failed in enforce mode.
    BudgetExhausted,
    /// The tool loop ran out of rounds while the model still wanted tools.
    TurnLimitExceeded,
    /// Provider rejected our credentials.
    AuthError,
    /// Provider rate-limited the call.
    RateLimited,
    /// Provider-side failure (HTTP 5xx).
    ServerError,
    /// Provider rejected the request shape (HTTP 400).
    InvalidRequest,
    /// Provider call timed out.
    Timeout,
    /// A tool handler failed in a way that could not be fed back to the model.
    ToolError,
    /// No provider registered under the resolved ID.
    UnknownProvider,
    /// Anything the kernel did not anticipate.
    Internal,
}

impl ErrorKind {
    /// Whether the supervisor may retry a work order that failed this way.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited | ErrorKind::ServerError | ErrorKind::Timeout
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ContractNotFound => "contract_not_found",
            ErrorKind::InputSchemaInvalid => "input_schema_invalid",
            ErrorKind::OutputSchemaInvalid => "output_schema_invalid",
            ErrorKind::BudgetExhausted => "budget_exhausted",
            ErrorKind::TurnLimitExceeded => "turn_limit_exceeded",
            ErrorKind::AuthError => "auth_error",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServerError => "server_error",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ToolError => "tool_error",
            ErrorKind::UnknownProvider => "unknown_provider",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Machine-readable rejection/error code on a gateway response.
///
/// A subset of [`ErrorKind`] — only the conditions the gateway itself can
/// produce. Carried on `PromptResponse.error_code` when
/// `outcome != success`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No provider registered under the resolved ID.
    UnknownProvider,
    /// Budget pre-check or debit refused the call.
    BudgetExceeded,
    /// Provider rejected our credentials.
    AuthError,
    /// Provider rate-limited the call (retryable).
    RateLimited,
    /// Provider-side failure (retryable).
    ServerError,
    /// Provider rejected the request shape.
    InvalidRequest,
    /// Provider call timed out (retryable).
    Timeout,
}

impl ErrorCode {
    /// Map a gateway error code onto the work-order failure taxonomy.
    pub fn as_error_kind(self) -> ErrorKind {
        match self {
            ErrorCode::UnknownProvider => ErrorKind::UnknownProvider,
            ErrorCode::BudgetExceeded => ErrorKind::BudgetExhausted,
            ErrorCode::AuthError => ErrorKind::AuthError,
            ErrorCode::RateLimited => ErrorKind::RateLimited,
            ErrorCode::ServerError => ErrorKind::ServerError,
            ErrorCode::InvalidRequest => ErrorKind::InvalidRequest,
            ErrorCode::Timeout => ErrorKind::Timeout,
        }
    }
}
