#![deny(missing_docs)]
//! # cortex-executor — the canonical LLM-call point
//!
//! `execute(work_order) → work_order` runs one work order end to end:
//! contract load, input validation, the bounded tool loop through the
//! gateway, output shaping, and the ho1 trace. Every terminal state writes
//! exactly one of `WO_COMPLETED` or `WO_FAILED`, and the executor never
//! re-raises to the supervisor — failures come back inside the work order.
//!
//! The tool loop is a plain bounded loop with an explicit rounds counter:
//! call the model, extract tool uses, dispatch them, feed the results back,
//! repeat. Tool handler failures are informational — they go back to the
//! model as error-status tool results and the loop continues.

pub mod extract;

use cortex_budget::{apply_policy, Budgeter, PolicyAction};
use cortex_contract::{ContractStore, LoadedContract};
use cortex_gateway::Gateway;
use cortex_ledger::{event, EntryDraft, LedgerStream, Provenance};
use cortex_tool::ToolDispatcher;
use cortex_types::{
    ErrorCode, ErrorKind, FinishReason, Outcome, PromptRequest, PromptResponse, ToolId, WoFailure,
    WoState, WoType, WorkOrder,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// The tier-L1 executor. Construct once, share via `Arc`.
pub struct Executor {
    gateway: Arc<Gateway>,
    contracts: Arc<ContractStore>,
    tools: Arc<ToolDispatcher>,
    budget: Arc<Budgeter>,
    ledger: Arc<LedgerStream>,
}

impl Executor {
    /// Wire up an executor from its collaborators. `ledger` is the ho1
    /// stream.
    pub fn new(
        gateway: Arc<Gateway>,
        contracts: Arc<ContractStore>,
        tools: Arc<ToolDispatcher>,
        budget: Arc<Budgeter>,
        ledger: Arc<LedgerStream>,
    ) -> Self {
        Self {
            gateway,
            contracts,
            tools,
            budget,
            ledger,
        }
    }

    /// Execute one work order to a terminal state.
    pub async fn execute(&self, mut wo: WorkOrder) -> WorkOrder {
        wo.state = WoState::Dispatched;
        wo.state = WoState::Executing;
        let provenance = Provenance::work_order(&wo.session_id, &wo.wo_id);
        self.ledger
            .write_lossy(
                EntryDraft::new(event::WO_EXECUTING, wo.wo_id.as_str())
                    .decision(wo.wo_type.as_str())
                    .metadata(provenance.metadata("ho1", Value::Null)),
            )
            .await;

        match self.run(&mut wo).await {
            Ok(output) => {
                wo.complete(output);
                self.ledger
                    .write_lossy(
                        EntryDraft::new(event::WO_COMPLETED, wo.wo_id.as_str())
                            .decision("completed")
                            .metadata(provenance.metadata(
                                "ho1",
                                json!({"cost": &wo.cost}),
                            )),
                    )
                    .await;
            }
            Err(failure) => {
                tracing::info!(wo = %wo.wo_id, kind = %failure.kind, message = %failure.message,
                    "work order failed");
                let (kind, message) = (failure.kind, failure.message);
                wo.fail(kind, message);
                self.ledger
                    .write_lossy(
                        EntryDraft::new(event::WO_FAILED, wo.wo_id.as_str())
                            .decision("failed")
                            .reason(kind.to_string())
                            .metadata(provenance.metadata(
                                "ho1",
                                json!({"error_kind": kind, "cost": &wo.cost}),
                            )),
                    )
                    .await;
            }
        }
        wo
    }

    async fn run(&self, wo: &mut WorkOrder) -> Result<Value, WoFailure> {
        if wo.wo_type == WoType::ToolCall {
            return self.run_direct_tool_call(wo).await;
        }

        let contract = self
            .contracts
            .get(&wo.constraints.prompt_contract_id)
            .ok_or_else(|| {
                WoFailure::new(
                    ErrorKind::ContractNotFound,
                    format!("no contract {}", wo.constraints.prompt_contract_id),
                )
            })?;

        contract.validate_input(&wo.input_context).map_err(|errors| {
            WoFailure::new(ErrorKind::InputSchemaInvalid, errors.join("; "))
        })?;

        let tools = self.tools.api_tools(&wo.constraints.tools_allowed);
        // Tools and structured output are mutually exclusive on the wire.
        let structured_output = if tools.is_empty() && wo.constraints.structured_output {
            contract.spec.structured_output.clone()
        } else {
            None
        };
        let domain_tags = if wo.constraints.domain_tags.is_empty() {
            contract.spec.domain_tags.clone()
        } else {
            wo.constraints.domain_tags.clone()
        };

        let mut variables = match &wo.input_context {
            Value::Object(_) => wo.input_context.clone(),
            other => json!({"input": other}),
        };
        if variables.get("tool_results").is_none() {
            variables["tool_results"] = json!("");
        }

        let allowed: HashSet<&str> = wo
            .constraints
            .tools_allowed
            .iter()
            .map(ToolId::as_str)
            .collect();
        let mut rounds_remaining = wo.constraints.turn_limit;

        let final_text = loop {
            let request = PromptRequest {
                contract_id: wo.constraints.prompt_contract_id.clone(),
                model_id: None,
                provider_id: None,
                max_tokens: contract.spec.boundary.max_tokens,
                temperature: contract.spec.boundary.temperature,
                timeout_ms: contract.spec.boundary.timeout_ms,
                template_variables: variables.clone(),
                tools: tools.clone(),
                structured_output: structured_output.clone(),
                domain_tags: domain_tags.clone(),
                session_id: wo.session_id.clone(),
                work_order_id: wo.wo_id.clone(),
            };

            let response = self.gateway.route(request).await;
            wo.cost.llm_calls += 1;
            wo.cost.input_tokens += response.input_tokens;
            wo.cost.output_tokens += response.output_tokens;
            self.log_llm_call(wo, &contract, &response).await;

            if response.outcome != Outcome::Success {
                let code = response.error_code.unwrap_or(ErrorCode::ServerError);
                if code == ErrorCode::BudgetExceeded
                    && self.budget.mode() == cortex_types::BudgetMode::Warn
                {
                    // warn mode: the violation is already on the ledger;
                    // treat the empty reply as final.
                    break response.content;
                }
                return Err(WoFailure::new(
                    code.as_error_kind(),
                    format!("gateway outcome {:?}", response.outcome),
                ));
            }

            let mut uses = response.tool_uses();
            if uses.is_empty()
                && response.finish_reason == FinishReason::ToolUse
                && response.content_blocks.is_none()
            {
                // Lenient fallback for blockless backends: nothing to
                // dispatch, so the reply text is final.
                tracing::warn!(wo = %wo.wo_id,
                    "finish_reason=tool_use without content_blocks; treating reply as final");
            }
            // Filter to the allowed set. An empty set drops everything,
            // including provider pseudo-tools like output_json.
            uses.retain(|(_, name, _)| allowed.contains(name.as_str()));

            if uses.is_empty() {
                break response.content;
            }
            if rounds_remaining == 0 {
                return Err(WoFailure::new(
                    ErrorKind::TurnLimitExceeded,
                    format!(
                        "model still requesting tools after {} rounds",
                        wo.constraints.turn_limit
                    ),
                ));
            }
            rounds_remaining -= 1;

            let mut round_results = String::new();
            for (use_id, name, arguments) in uses {
                let outcome = self.tools.dispatch(&name, arguments.clone()).await;
                self.log_tool_call(wo, &name, &arguments, &outcome).await;
                wo.cost.tool_ids_used.push(ToolId::new(&name));
                round_results.push_str(&format!(
                    "[{name} {use_id}] {}\n",
                    outcome.payload()
                ));
            }

            let prior = variables["tool_results"].as_str().unwrap_or("").to_string();
            variables["tool_results"] =
                json!(format!("{prior}\nTool results:\n{round_results}"));

            let remaining = self.budget.remaining(&wo.wo_id);
            let violation = remaining < wo.constraints.followup_min_remaining;
            match apply_policy(violation, self.budget.mode()) {
                PolicyAction::Fail => {
                    return Err(WoFailure::new(
                        ErrorKind::BudgetExhausted,
                        format!(
                            "remaining {remaining} below follow-up threshold {}",
                            wo.constraints.followup_min_remaining
                        ),
                    ));
                }
                PolicyAction::Warn => {
                    self.budget
                        .warn(
                            wo.wo_id.as_str(),
                            format!("follow-up with only {remaining} tokens remaining"),
                        )
                        .await;
                }
                PolicyAction::Continue => {}
            }
        };

        Ok(extract::shape_output(&final_text, &contract))
    }

    /// `tool_call` work orders bypass the LLM entirely.
    async fn run_direct_tool_call(&self, wo: &mut WorkOrder) -> Result<Value, WoFailure> {
        let tool_id = wo
            .input_context
            .get("tool_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                WoFailure::new(ErrorKind::ToolError, "tool_call work order without tool_id")
            })?;
        let arguments = wo
            .input_context
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        let outcome = self.tools.dispatch(&tool_id, arguments.clone()).await;
        self.log_tool_call(wo, &tool_id, &arguments, &outcome).await;
        wo.cost.tool_ids_used.push(ToolId::new(&tool_id));
        Ok(outcome.payload())
    }

    async fn log_llm_call(
        &self,
        wo: &WorkOrder,
        contract: &LoadedContract,
        response: &PromptResponse,
    ) {
        self.ledger
            .write_lossy(
                EntryDraft::new(event::LLM_CALL, wo.wo_id.as_str())
                    .decision(match response.outcome {
                        Outcome::Success => "success",
                        Outcome::Rejected => "rejected",
                        Outcome::Error => "error",
                    })
                    .prompts(vec![contract.spec.prompt_pack_id.clone()])
                    .metadata(
                        Provenance::work_order(&wo.session_id, &wo.wo_id).metadata(
                            "ho1",
                            json!({
                                "call": {
                                    "model_id": &response.model_id,
                                    "provider_id": &response.provider_id,
                                    "input_tokens": response.input_tokens,
                                    "output_tokens": response.output_tokens,
                                    "latency_ms": response.latency_ms,
                                    "response_chars": response.content.len(),
                                    "finish_reason": response.finish_reason,
                                    "error_code": response.error_code,
                                },
                                "relational": {
                                    "parent_event_id": &response.exchange_entry_id,
                                },
                            }),
                        ),
                    ),
            )
            .await;
    }

    async fn log_tool_call(
        &self,
        wo: &WorkOrder,
        tool_id: &str,
        arguments: &Value,
        outcome: &cortex_tool::ToolOutcome,
    ) {
        let result = outcome.payload();
        let args_bytes = arguments.to_string().len();
        let result_bytes = result.to_string().len();
        self.ledger
            .write_lossy(
                EntryDraft::new(event::TOOL_CALL, wo.wo_id.as_str())
                    .decision(if outcome.is_error() { "error" } else { "ok" })
                    .metadata(
                        Provenance::work_order(&wo.session_id, &wo.wo_id).metadata(
                            "ho1",
                            json!({
                                "tool": {
                                    "tool_id": tool_id,
                                    "arguments": arguments,
                                    "result": result,
                                    "tool_error": &outcome.error,
                                    "args_bytes": args_bytes,
                                    "result_bytes": result_bytes,
                                },
                            }),
                        ),
                    ),
            )
            .await;
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor").finish_non_exhaustive()
    }
}
