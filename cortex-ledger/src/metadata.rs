//! The metadata key standard: `scope.*`, `provenance.*`, `relational.*`.

use cortex_types::{LedgerId, SessionId, WorkOrderId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Provenance block stamped into entry metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Provenance {
    /// Agent instance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Agent class (config-declared).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_class: Option<String>,
    /// Owning session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Owning work order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_order_id: Option<WorkOrderId>,
    /// Turn number within the session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_number: Option<u64>,
}

impl Provenance {
    /// Provenance for a session-level event.
    pub fn session(session_id: &SessionId) -> Self {
        Self {
            session_id: Some(session_id.clone()),
            ..Self::default()
        }
    }

    /// Provenance for a work-order-level event.
    pub fn work_order(session_id: &SessionId, wo_id: &WorkOrderId) -> Self {
        Self {
            session_id: Some(session_id.clone()),
            work_order_id: Some(wo_id.clone()),
            ..Self::default()
        }
    }

    /// Set the agent class.
    #[must_use]
    pub fn agent_class(mut self, class: impl Into<String>) -> Self {
        self.agent_class = Some(class.into());
        self
    }

    /// Set the turn number.
    #[must_use]
    pub fn turn(mut self, n: u64) -> Self {
        self.turn_number = Some(n);
        self
    }

    /// Assemble a standard metadata object: `scope.tier` + `provenance.*`,
    /// merged with component-specific keys from `extra`.
    pub fn metadata(&self, tier: &str, extra: Value) -> Value {
        let mut meta = json!({
            "scope": { "tier": tier },
            "provenance": serde_json::to_value(self).unwrap_or(Value::Null),
        });
        if let (Some(target), Some(source)) = (meta.as_object_mut(), extra.as_object()) {
            for (k, v) in source {
                target.insert(k.clone(), v.clone());
            }
        }
        meta
    }
}

/// Relational block linking entries across streams.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Relational {
    /// Direct parent event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<LedgerId>,
    /// Root event of the chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_event_id: Option<LedgerId>,
    /// Related artifacts as `{type, id}` pairs.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub related_artifacts: Vec<RelatedArtifact>,
}

/// One `{type, id}` artifact reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedArtifact {
    /// Artifact kind (`overlay`, `contract`, …).
    pub r#type: String,
    /// Artifact identifier.
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_has_standard_shape() {
        let meta = Provenance::work_order(&SessionId::new("SES-1"), &WorkOrderId::new("WO-1"))
            .agent_class("assistant")
            .turn(3)
            .metadata("ho1", json!({"tokens": {"input": 10}}));
        assert_eq!(meta["scope"]["tier"], "ho1");
        assert_eq!(meta["provenance"]["session_id"], "SES-1");
        assert_eq!(meta["provenance"]["work_order_id"], "WO-1");
        assert_eq!(meta["provenance"]["turn_number"], 3);
        assert_eq!(meta["tokens"]["input"], 10);
    }

    #[test]
    fn absent_fields_are_omitted() {
        let meta = Provenance::session(&SessionId::new("SES-2")).metadata("ho2", Value::Null);
        let provenance = meta["provenance"].as_object().unwrap();
        assert!(!provenance.contains_key("work_order_id"));
        assert!(!provenance.contains_key("agent_id"));
    }
}
