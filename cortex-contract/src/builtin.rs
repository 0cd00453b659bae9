//! Built-in contracts and packs for the four work-order types.
//!
//! These ship with the kernel so a fresh deployment can serve turns before
//! any contract directory is provisioned. Deployments override them by
//! loading their own documents over the same IDs.

use crate::pack::PromptPack;
use crate::{Boundary, PromptContract};
use cortex_types::ContractId;
use serde_json::json;

/// The built-in contract set: classify, synthesize, consolidate.
pub fn builtin_contracts() -> Vec<PromptContract> {
    vec![
        PromptContract {
            contract_id: ContractId::new("PRC-CLS-001"),
            version: "1.0.0".into(),
            prompt_pack_id: "PACK-CLS-001".into(),
            boundary: Boundary {
                max_tokens: 256,
                temperature: 0.0,
                timeout_ms: 30_000,
            },
            input_schema: Some(json!({
                "type": "object",
                "required": ["user_message"],
                "properties": {
                    "user_message": {"type": "string"}
                }
            })),
            output_schema: Some(json!({
                "type": "object",
                "required": ["speech_act"],
                "properties": {
                    "speech_act": {"type": "string"},
                    "domain": {"type": "array", "items": {"type": "string"}},
                    "task": {"type": "array", "items": {"type": "string"}}
                }
            })),
            domain_tags: vec![],
            structured_output: Some(json!({
                "name": "classification",
                "schema": {
                    "type": "object",
                    "required": ["speech_act"],
                    "properties": {
                        "speech_act": {"type": "string"},
                        "domain": {"type": "array", "items": {"type": "string"}},
                        "task": {"type": "array", "items": {"type": "string"}}
                    }
                }
            })),
            tier: Some("ho1".into()),
        },
        PromptContract {
            contract_id: ContractId::new("PRC-SYN-001"),
            version: "1.0.0".into(),
            prompt_pack_id: "PACK-SYN-001".into(),
            boundary: Boundary {
                max_tokens: 1024,
                temperature: 0.7,
                timeout_ms: 60_000,
            },
            input_schema: Some(json!({
                "type": "object",
                "required": ["user_message"],
                "properties": {
                    "user_message": {"type": "string"},
                    "speech_act": {"type": "string"},
                    "bias_context": {"type": "string"},
                    "horizontal_context": {"type": "string"},
                    "tool_results": {"type": "string"}
                }
            })),
            output_schema: Some(json!({
                "type": "object",
                "required": ["response_text"],
                "properties": {
                    "response_text": {"type": "string"}
                }
            })),
            domain_tags: vec![],
            structured_output: None,
            tier: Some("ho1".into()),
        },
        PromptContract {
            contract_id: ContractId::new("PRC-CON-001"),
            version: "1.0.0".into(),
            prompt_pack_id: "PACK-CON-001".into(),
            boundary: Boundary {
                max_tokens: 512,
                temperature: 0.2,
                timeout_ms: 30_000,
            },
            input_schema: Some(json!({
                "type": "object",
                "required": ["signal_id", "count"],
                "properties": {
                    "signal_id": {"type": "string"},
                    "count": {"type": "integer"},
                    "session_count": {"type": "integer"}
                }
            })),
            output_schema: Some(json!({
                "type": "object",
                "required": ["artifact_type", "context_line"],
                "properties": {
                    "artifact_type": {
                        "type": "string",
                        "enum": ["topic_affinity", "interaction_style", "task_pattern", "constraint"]
                    },
                    "context_line": {"type": "string"},
                    "labels": {
                        "type": "object",
                        "properties": {
                            "domain": {"type": "array", "items": {"type": "string"}},
                            "task": {"type": "array", "items": {"type": "string"}}
                        }
                    },
                    "weight": {"type": "number"}
                }
            })),
            domain_tags: vec!["consolidation".into()],
            structured_output: Some(json!({
                "name": "overlay_artifact",
                "schema": {
                    "type": "object",
                    "required": ["artifact_type", "context_line"]
                }
            })),
            tier: Some("ho1".into()),
        },
    ]
}

/// The built-in pack set matching [`builtin_contracts`].
pub fn builtin_packs() -> Vec<PromptPack> {
    vec![
        PromptPack {
            pack_id: "PACK-CLS-001".into(),
            version: "1.0.0".into(),
            template: "Classify the user message below.\n\
                Reply with a JSON object: {\"speech_act\": one of \
                [\"greeting\", \"question\", \"command\", \"statement\", \"tool_query\"], \
                \"domain\": [labels], \"task\": [labels]}.\n\n\
                User message:\n{{user_message}}\n"
                .into(),
        },
        PromptPack {
            pack_id: "PACK-SYN-001".into(),
            version: "1.0.0".into(),
            template: "{{bias_context}}\n\
                Recent activity:\n{{horizontal_context}}\n\n\
                The user message was classified as: {{speech_act}}\n\
                User message:\n{{user_message}}\n\n\
                Use the available tools when they help. Reply with a JSON \
                object: {\"response_text\": \"...\"}.\n\
                {{tool_results}}"
                .into(),
        },
        PromptPack {
            pack_id: "PACK-CON-001".into(),
            version: "1.0.0".into(),
            template: "The signal {{signal_id}} fired {{count}} times across \
                {{session_count}} sessions.\n\
                Distill it into a reusable bias. Reply with a JSON object: \
                {\"artifact_type\": one of [\"topic_affinity\", \
                \"interaction_style\", \"task_pattern\", \"constraint\"], \
                \"context_line\": \"one sentence used verbatim as context\", \
                \"labels\": {\"domain\": [], \"task\": []}, \"weight\": 0.0-1.0}\n"
                .into(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_contracts_have_required_fields() {
        for contract in builtin_contracts() {
            assert!(contract.contract_id.as_str().starts_with("PRC-"));
            assert!(!contract.prompt_pack_id.is_empty());
            assert!(contract.boundary.max_tokens > 0);
        }
    }

    #[test]
    fn classify_is_structured_output_only() {
        let classify = builtin_contracts()
            .into_iter()
            .find(|c| c.contract_id.as_str() == "PRC-CLS-001")
            .unwrap();
        assert!(classify.structured_output.is_some());
    }

    #[test]
    fn consolidate_routes_to_consolidation_tag() {
        let consolidate = builtin_contracts()
            .into_iter()
            .find(|c| c.contract_id.as_str() == "PRC-CON-001")
            .unwrap();
        assert_eq!(consolidate.domain_tags, vec!["consolidation".to_string()]);
    }
}
