//! The quality gate: binary accept/reject on executor output. No LLM call.

use cortex_types::WorkOrderId;
use serde::Serialize;
use serde_json::Value;

/// What the gate checks.
#[derive(Debug, Clone)]
pub struct AcceptanceCriteria {
    /// Required top-level key in the output (`response_text` for
    /// synthesize work orders).
    pub required_key: String,
    /// Minimum length of that key's value.
    pub min_length: usize,
}

impl Default for AcceptanceCriteria {
    fn default() -> Self {
        Self {
            required_key: "response_text".into(),
            min_length: 1,
        }
    }
}

/// Binary verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    /// Output passes.
    Accept,
    /// Output fails; the supervisor retries or escalates.
    Reject,
}

/// Verdict plus the reason.
#[derive(Debug, Clone, Serialize)]
pub struct QualityVerdict {
    /// The decision.
    pub decision: GateDecision,
    /// Why.
    pub reason: String,
}

impl QualityVerdict {
    fn reject(reason: impl Into<String>) -> Self {
        Self {
            decision: GateDecision::Reject,
            reason: reason.into(),
        }
    }
}

/// The gate itself.
#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    criteria: AcceptanceCriteria,
}

impl QualityGate {
    /// A gate with the given criteria.
    pub fn new(criteria: AcceptanceCriteria) -> Self {
        Self { criteria }
    }

    /// Verify one executor output: non-null, non-empty, required key
    /// present, no error marker, minimum length satisfied.
    pub fn verify(&self, output: Option<&Value>, wo_id: &WorkOrderId) -> QualityVerdict {
        let Some(output) = output else {
            return QualityVerdict::reject(format!("{wo_id}: output is null"));
        };
        let Some(object) = output.as_object() else {
            return QualityVerdict::reject(format!("{wo_id}: output is not an object"));
        };
        if object.is_empty() {
            return QualityVerdict::reject(format!("{wo_id}: output is empty"));
        }
        let Some(value) = object.get(&self.criteria.required_key) else {
            return QualityVerdict::reject(format!(
                "{wo_id}: missing key {}",
                self.criteria.required_key
            ));
        };
        let text = match value.as_str() {
            Some(text) => text,
            None => {
                return QualityVerdict::reject(format!(
                    "{wo_id}: {} is not a string",
                    self.criteria.required_key
                ));
            }
        };
        if text.trim().len() < self.criteria.min_length {
            return QualityVerdict::reject(format!(
                "{wo_id}: response shorter than {}",
                self.criteria.min_length
            ));
        }
        if text.contains("[Error:") || text.contains("[Degradation:") {
            return QualityVerdict::reject(format!("{wo_id}: error marker in response"));
        }
        QualityVerdict {
            decision: GateDecision::Accept,
            reason: "criteria satisfied".into(),
        }
    }
}
