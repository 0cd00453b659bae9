//! The Kitchener loop: classify → retrieve → plan → execute → verify.

use crate::quality::{AcceptanceCriteria, GateDecision, QualityGate, QualityVerdict};
use crate::session::SessionManager;
use cortex_budget::{BudgetError, Budgeter};
use cortex_contract::ContractStore;
use cortex_executor::Executor;
use cortex_ledger::{canonical_json, event, EntryDraft, LedgerError, LedgerStream, Provenance};
use cortex_memory::{
    ArtifactType, Labels, MemoryError, MemoryPlane, OverlayDraft, OverlayScope,
};
use cortex_types::{
    ContractId, ErrorKind, KernelConfig, SessionId, ToolId, WoConstraints, WoState, WoType,
    WorkOrder, WorkOrderId,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

/// Supervisor-internal failures. These never cross the shell boundary —
/// [`Supervisor::handle_turn`] converts them into a degraded response.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The memory plane failed.
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    /// A ledger stream failed.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The budgeter refused in an unexpected place.
    #[error("budget error: {0}")]
    Budget(#[from] BudgetError),

    /// A consolidation work order failed.
    #[error("consolidation of {signal_id} failed: {kind}")]
    Consolidation {
        /// The signal being consolidated.
        signal_id: String,
        /// Why the work order failed.
        kind: ErrorKind,
    },
}

/// One-line summary of a work order in a turn's chain.
#[derive(Debug, Clone, Serialize)]
pub struct WoSummary {
    /// The work order.
    pub wo_id: WorkOrderId,
    /// Its type.
    pub wo_type: WoType,
    /// Terminal state.
    pub state: WoState,
    /// Failure kind, for failed orders.
    pub error_kind: Option<ErrorKind>,
}

impl WoSummary {
    fn of(wo: &WorkOrder) -> Self {
        Self {
            wo_id: wo.wo_id.clone(),
            wo_type: wo.wo_type,
            state: wo.state,
            error_kind: wo.error.as_ref().map(|e| e.kind),
        }
    }
}

/// Token and call totals for one turn.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CostSummary {
    /// Input tokens across the chain.
    pub input_tokens: u64,
    /// Output tokens across the chain.
    pub output_tokens: u64,
    /// LLM calls across the chain.
    pub llm_calls: u32,
    /// Tool dispatches across the chain.
    pub tool_calls: u64,
}

impl CostSummary {
    fn add(&mut self, wo: &WorkOrder) {
        self.input_tokens += wo.cost.input_tokens;
        self.output_tokens += wo.cost.output_tokens;
        self.llm_calls += wo.cost.llm_calls;
        self.tool_calls += wo.cost.tool_ids_used.len() as u64;
    }
}

/// What the shell gets back for one user turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    /// The user-visible response. Degraded paths carry an
    /// `[Error: …]` or `[Degradation: …]` marker.
    pub response: String,
    /// Summaries of the work orders dispatched for this turn.
    pub wo_chain: Vec<WoSummary>,
    /// Cost totals.
    pub cost: CostSummary,
    /// Signals whose gate crossed this turn. The shell feeds these to
    /// [`Supervisor::run_consolidation`] after delivering the response.
    pub consolidation_candidates: Vec<String>,
}

/// Outcome of one consolidation pass.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    /// Fresh or re-activated overlays.
    pub overlays_written: u32,
    /// Signals skipped, with the reason.
    pub skipped: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct Classification {
    speech_act: String,
    labels: Labels,
}

#[derive(Debug, Deserialize)]
struct OverlayProposal {
    artifact_type: Option<ArtifactType>,
    #[serde(default)]
    labels: Labels,
    weight: Option<f64>,
    context_line: Option<String>,
    scope: Option<OverlayScope>,
}

/// The tier-L2 supervisor.
pub struct Supervisor {
    executor: Arc<Executor>,
    memory: Arc<MemoryPlane>,
    sessions: Arc<SessionManager>,
    quality: QualityGate,
    budget: Arc<Budgeter>,
    contracts: Arc<ContractStore>,
    ho2: Arc<LedgerStream>,
    ho1: Arc<LedgerStream>,
    config: KernelConfig,
}

impl Supervisor {
    /// Wire up a supervisor from its collaborators. `ho1` is read for
    /// horizontal context and trace hashing; only the executor writes it.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        executor: Arc<Executor>,
        memory: Arc<MemoryPlane>,
        sessions: Arc<SessionManager>,
        budget: Arc<Budgeter>,
        contracts: Arc<ContractStore>,
        ho2: Arc<LedgerStream>,
        ho1: Arc<LedgerStream>,
        config: KernelConfig,
    ) -> Self {
        let quality = QualityGate::new(AcceptanceCriteria {
            required_key: "response_text".into(),
            min_length: config.supervisor.quality_min_length,
        });
        Self {
            executor,
            memory,
            sessions,
            quality,
            budget,
            contracts,
            ho2,
            ho1,
            config,
        }
    }

    /// Open a fresh session.
    pub async fn start_session(&self) -> SessionId {
        let id = self.sessions.start_session().await;
        self.budget
            .open_session(&id, self.config.budget.session_token_limit);
        id
    }

    /// Close a session, summarizing its cost.
    pub async fn end_session(&self, session_id: &SessionId) {
        let consumed = self.budget.session_consumed(session_id);
        self.sessions
            .end_session(session_id, json!({"total_tokens": consumed}))
            .await;
    }

    /// Process one user turn. Never panics through, never skips the
    /// TURN_RECORDED event.
    pub async fn handle_turn(&self, session_id: &SessionId, user_message: &str) -> TurnResult {
        self.sessions.ensure_session(session_id).await;
        self.budget
            .open_session(session_id, self.config.budget.session_token_limit);

        match self.run_turn(session_id, user_message).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(session = %session_id, error = %e, "turn degraded");
                self.ho2
                    .write_lossy(
                        EntryDraft::new(event::DEGRADATION, session_id.as_str())
                            .decision("degraded")
                            .reason(e.to_string())
                            .metadata(Provenance::session(session_id).metadata("ho2", Value::Null)),
                    )
                    .await;
                let response = format!("[Degradation: {e}]");
                self.sessions
                    .add_turn(session_id, user_message, &response)
                    .await;
                TurnResult {
                    response,
                    wo_chain: vec![],
                    cost: CostSummary::default(),
                    consolidation_candidates: vec![],
                }
            }
        }
    }

    async fn run_turn(
        &self,
        session_id: &SessionId,
        user_message: &str,
    ) -> Result<TurnResult, SupervisorError> {
        let mut chain: Vec<WorkOrder> = Vec::new();

        // 1–2. Classify. A failed classification is not fatal — the turn
        // proceeds with the default speech act.
        let classify = self
            .dispatch_wo(
                session_id,
                WoType::Classify,
                self.config.supervisor.classify_contract.clone(),
                self.config.budget.classify_budget,
                vec![],
                1,
                json!({"user_message": user_message}),
            )
            .await?;
        let classification = parse_classification(&classify);
        chain.push(classify);

        // 3. Priority context: matching memory biases.
        let bias_context = if self.config.memory.enabled {
            self.assemble_bias_context(&classification).await?
        } else {
            String::new()
        };

        // 4. Horizontal context: recent entries of own and lower tier.
        let horizontal_context = self.assemble_horizontal_context().await?;

        // 5. Synthesize.
        let tools = self.config.supervisor.tools_allowed.clone();
        let synthesize_input = json!({
            "user_message": user_message,
            "speech_act": classification.speech_act,
            "bias_context": bias_context,
            "horizontal_context": horizontal_context,
            "tool_results": "",
        });
        let mut synthesize = self
            .dispatch_wo(
                session_id,
                WoType::Synthesize,
                self.config.supervisor.synthesize_contract.clone(),
                self.config.budget.synthesize_budget,
                tools.clone(),
                self.config.budget.turn_limit,
                synthesize_input.clone(),
            )
            .await?;

        // Transport-level retry: one more attempt for retryable kinds.
        if synthesize.state == WoState::Failed
            && synthesize.error.as_ref().is_some_and(|e| e.kind.is_retryable())
        {
            tracing::info!(wo = %synthesize.wo_id, "retrying synthesize after retryable failure");
            chain.push(synthesize);
            synthesize = self
                .dispatch_wo(
                    session_id,
                    WoType::Synthesize,
                    self.config.supervisor.synthesize_contract.clone(),
                    self.config.budget.synthesize_budget,
                    tools.clone(),
                    self.config.budget.turn_limit,
                    synthesize_input.clone(),
                )
                .await?;
        }

        // 6. Verify. Each reject tightens the constraints and re-dispatches,
        // bounded by max_retries; exhausting the bound escalates.
        let (response, final_decision) = match synthesize.state {
            WoState::Completed => {
                let max_retries = self.config.supervisor.max_retries;
                let mut verdict = self
                    .quality
                    .verify(synthesize.output_result.as_ref(), &synthesize.wo_id);
                let mut attempt: u32 = 0;
                loop {
                    if verdict.decision == GateDecision::Accept {
                        break (response_text(&synthesize), GateDecision::Accept);
                    }
                    if attempt == max_retries {
                        self.ho2
                            .write_lossy(
                                EntryDraft::new(event::ESCALATION, session_id.as_str())
                                    .decision("escalated")
                                    .reason(verdict.reason)
                                    .metadata(
                                        Provenance::session(session_id)
                                            .metadata("ho2", Value::Null),
                                    ),
                            )
                            .await;
                        break ("[Error: quality_gate_reject]".to_string(), GateDecision::Reject);
                    }
                    attempt += 1;
                    self.log_quality_gate(
                        &synthesize.wo_id,
                        GateDecision::Reject,
                        &verdict.reason,
                        None,
                    )
                    .await;
                    // Tightened constraints: the budget halves again on every
                    // attempt and the prompt variant advances.
                    let mut retry_input = synthesize_input.clone();
                    retry_input["attempt"] = json!(attempt + 1);
                    let retry = self
                        .dispatch_wo(
                            session_id,
                            WoType::Synthesize,
                            self.config.supervisor.synthesize_contract.clone(),
                            (self.config.budget.synthesize_budget >> attempt).max(1),
                            tools.clone(),
                            self.config.budget.turn_limit,
                            retry_input,
                        )
                        .await?;
                    chain.push(synthesize);
                    synthesize = retry;
                    verdict = match synthesize.state {
                        WoState::Completed => self
                            .quality
                            .verify(synthesize.output_result.as_ref(), &synthesize.wo_id),
                        _ => QualityVerdict {
                            decision: GateDecision::Reject,
                            reason: format!(
                                "{}: retry failed with {}",
                                synthesize.wo_id,
                                synthesize
                                    .error
                                    .as_ref()
                                    .map(|e| e.kind)
                                    .unwrap_or(ErrorKind::Internal)
                            ),
                        },
                    };
                }
            }
            _ => {
                let kind = synthesize
                    .error
                    .as_ref()
                    .map(|e| e.kind)
                    .unwrap_or(ErrorKind::Internal);
                (format!("[Error: {kind}]"), GateDecision::Reject)
            }
        };
        chain.push(synthesize);

        // 7. Chain summary with trace hash over the executor's entries.
        let mut cost = CostSummary::default();
        for wo in &chain {
            cost.add(wo);
        }
        let trace_hash = self.trace_hash(&chain).await?;
        let wo_ids: Vec<&str> = chain.iter().map(|wo| wo.wo_id.as_str()).collect();
        let gate_wo_id = chain.last().map(|wo| wo.wo_id.clone());
        self.ho2
            .write_lossy(
                EntryDraft::new(event::WO_CHAIN_COMPLETE, session_id.as_str())
                    .decision("complete")
                    .metadata(Provenance::session(session_id).metadata(
                        "ho2",
                        json!({
                            "chain": { "wo_ids": wo_ids, "trace_hash": &trace_hash },
                            "cost": cost,
                        }),
                    )),
            )
            .await;
        if let Some(wo_id) = gate_wo_id {
            let reason = match final_decision {
                GateDecision::Accept => "criteria satisfied".to_string(),
                GateDecision::Reject => "degraded response".to_string(),
            };
            self.log_quality_gate(&wo_id, final_decision, &reason, Some(&trace_hash))
                .await;
        }

        // 8. Persist the turn. Always.
        self.sessions
            .add_turn(session_id, user_message, &response)
            .await;

        // 9. Extract signals and probe the gate. The turn is already
        // persisted; a memory failure here must not degrade it (and must
        // not record it twice).
        let consolidation_candidates = if self.config.memory.enabled {
            match self
                .extract_signals(session_id, &classification, &chain)
                .await
            {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::warn!(session = %session_id, error = %e,
                        "signal extraction failed after turn persisted");
                    vec![]
                }
            }
        } else {
            vec![]
        };

        Ok(TurnResult {
            response,
            wo_chain: chain.iter().map(WoSummary::of).collect(),
            cost,
            consolidation_candidates,
        })
    }

    /// Consolidate crossed signals into overlays. Runs out-of-band after
    /// the turn's response is delivered; failures are reported, never
    /// propagated back into the turn.
    pub async fn run_consolidation(
        &self,
        session_id: &SessionId,
        signal_ids: &[String],
    ) -> ConsolidationReport {
        let mut report = ConsolidationReport::default();
        for signal_id in signal_ids {
            match self.consolidate_one(session_id, signal_id).await {
                Ok(true) => report.overlays_written += 1,
                Ok(false) => report
                    .skipped
                    .push((signal_id.clone(), "gate no longer crossed".into())),
                Err(e) => {
                    tracing::warn!(%signal_id, error = %e, "consolidation failed");
                    report.skipped.push((signal_id.clone(), e.to_string()));
                }
            }
        }
        report
    }

    async fn consolidate_one(
        &self,
        session_id: &SessionId,
        signal_id: &str,
    ) -> Result<bool, SupervisorError> {
        // Idempotency barrier: the gate may have closed since the turn.
        let gate = self.memory.check_gate(signal_id, None).await?;
        if !gate.crossed {
            return Ok(false);
        }
        let accumulators = self.memory.read_signals(Some(signal_id), 0, None).await?;
        let Some(acc) = accumulators.into_iter().next() else {
            return Ok(false);
        };

        let wo = self
            .dispatch_wo(
                session_id,
                WoType::Consolidate,
                self.config.supervisor.consolidate_contract.clone(),
                self.config.budget.consolidation_budget,
                vec![],
                1,
                json!({
                    "signal_id": signal_id,
                    "count": acc.count,
                    "session_count": acc.session_ids.len(),
                }),
            )
            .await?;
        if wo.state != WoState::Completed {
            return Err(SupervisorError::Consolidation {
                signal_id: signal_id.to_string(),
                kind: wo.error.map(|e| e.kind).unwrap_or(ErrorKind::Internal),
            });
        }

        let proposal: OverlayProposal = wo
            .output_result
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(OverlayProposal {
                artifact_type: None,
                labels: Labels::default(),
                weight: None,
                context_line: None,
                scope: None,
            });

        let model = self
            .config
            .gateway
            .domain_tag_routes
            .get("consolidation")
            .and_then(|route| route.model_id.clone())
            .unwrap_or_else(|| self.config.gateway.default_provider.to_string());
        let pack_version = self
            .contracts
            .get(&self.config.supervisor.consolidate_contract)
            .map(|c| c.spec.version.clone())
            .unwrap_or_else(|| "0.0.0".into());

        let draft = OverlayDraft {
            signal_id: signal_id.to_string(),
            artifact_type: proposal.artifact_type.unwrap_or(ArtifactType::TaskPattern),
            labels: proposal.labels,
            weight: proposal.weight.unwrap_or(0.6),
            scope: proposal.scope.unwrap_or(OverlayScope::Agent),
            context_line: proposal.context_line.unwrap_or_else(|| {
                format!(
                    "Recurring signal {signal_id} seen {} times across {} sessions.",
                    acc.count,
                    acc.session_ids.len()
                )
            }),
            expires_at_event_ts: None,
            source_event_ids: acc.event_ids.clone(),
            source_signal_ids: vec![signal_id.to_string()],
            salience_weight: 1.0,
            decay_modifier: 1.0,
            window_start: acc.first_seen,
            window_end: acc.last_seen,
            gate_window_key: format!(
                "{}h@{}",
                self.config.memory.gate_window_hours,
                acc.last_seen.to_rfc3339()
            ),
            model,
            prompt_pack_version: pack_version,
            at: None,
        };
        let write = self.memory.log_overlay(draft).await?;
        Ok(write.created || write.reactivated)
    }

    /// Plan, dispatch, and settle one work order. A session exhausted at
    /// reservation time comes back as a failed order, not an error.
    async fn dispatch_wo(
        &self,
        session_id: &SessionId,
        wo_type: WoType,
        contract: ContractId,
        requested_budget: u64,
        tools: Vec<ToolId>,
        turn_limit: u32,
        input: Value,
    ) -> Result<WorkOrder, SupervisorError> {
        let wo_id = self.sessions.next_wo_id(session_id);
        let domain_tags = if wo_type == WoType::Consolidate {
            vec!["consolidation".to_string()]
        } else {
            vec![]
        };
        // Structured output only without tools; the two are exclusive.
        let structured_output = tools.is_empty();
        let mut constraints = WoConstraints {
            token_budget: 0,
            tools_allowed: tools,
            turn_limit,
            prompt_contract_id: contract,
            domain_tags,
            structured_output,
            followup_min_remaining: self.config.budget.followup_min_remaining,
        };

        let granted = match self
            .budget
            .allocate_clamped(session_id, &wo_id, requested_budget)
            .await
        {
            Ok(granted) => granted,
            Err(BudgetError::Exceeded { .. }) => {
                let mut wo =
                    WorkOrder::new(wo_id, wo_type, session_id.clone(), constraints, input);
                wo.fail(
                    ErrorKind::BudgetExhausted,
                    "session budget exhausted at reservation",
                );
                return Ok(wo);
            }
            Err(e) => return Err(e.into()),
        };
        constraints.token_budget = granted;

        let wo = WorkOrder::new(wo_id, wo_type, session_id.clone(), constraints, input);
        let done = self.executor.execute(wo).await;
        self.budget.release(&done.wo_id);
        Ok(done)
    }

    async fn assemble_bias_context(
        &self,
        classification: &Classification,
    ) -> Result<String, SupervisorError> {
        let biases = self.memory.read_active_biases(None).await?;
        let lines: Vec<String> = biases
            .iter()
            .filter(|bias| {
                let unlabeled =
                    bias.labels.domain.is_empty() && bias.labels.task.is_empty();
                unlabeled || bias.labels.intersects(&classification.labels)
            })
            .take(self.config.supervisor.attention_recent_entries)
            .map(|bias| format!("- {}", bias.context_line))
            .collect();
        Ok(lines.join("\n"))
    }

    async fn assemble_horizontal_context(&self) -> Result<String, SupervisorError> {
        let mut entries = self.ho2.read_all().await?;
        entries.extend(self.ho1.read_all().await?);
        entries.sort_by_key(|e| e.timestamp);
        let budget = self.config.supervisor.attention_recent_entries;
        let start = entries.len().saturating_sub(budget);
        let lines: Vec<String> = entries[start..]
            .iter()
            .map(|e| format!("{} {} {}", e.event_type, e.submission_id, e.decision))
            .collect();
        Ok(lines.join("\n"))
    }

    async fn extract_signals(
        &self,
        session_id: &SessionId,
        classification: &Classification,
        chain: &[WorkOrder],
    ) -> Result<Vec<String>, SupervisorError> {
        let mut signal_ids = vec![format!("intent:{}", classification.speech_act)];
        for wo in chain {
            for tool in &wo.cost.tool_ids_used {
                signal_ids.push(format!("tool:{tool}"));
            }
        }
        for signal_id in &signal_ids {
            self.memory
                .log_signal(signal_id, session_id, Value::Null, None)
                .await?;
        }

        let distinct: BTreeSet<String> = signal_ids.into_iter().collect();
        let mut candidates = Vec::new();
        for signal_id in distinct {
            let gate = self.memory.check_gate(&signal_id, None).await?;
            if gate.crossed {
                tracing::info!(%signal_id, reason = %gate.reason, "consolidation gate crossed");
                candidates.push(signal_id);
            }
        }
        Ok(candidates)
    }

    /// Hash of all executor entries for this chain, linking the ho2
    /// summary to the full underlying detail.
    async fn trace_hash(&self, chain: &[WorkOrder]) -> Result<String, SupervisorError> {
        let ids: BTreeSet<&str> = chain.iter().map(|wo| wo.wo_id.as_str()).collect();
        let mut hasher = Sha256::new();
        for entry in self.ho1.read_all().await? {
            if ids.contains(entry.submission_id.as_str()) {
                hasher.update(canonical_json(&serde_json::to_value(&entry).unwrap_or_default()));
            }
        }
        Ok(hex::encode(hasher.finalize()))
    }

    async fn log_quality_gate(
        &self,
        wo_id: &WorkOrderId,
        decision: GateDecision,
        reason: &str,
        trace_hash: Option<&str>,
    ) {
        self.ho2
            .write_lossy(
                EntryDraft::new(event::WO_QUALITY_GATE, wo_id.as_str())
                    .decision(match decision {
                        GateDecision::Accept => "accept",
                        GateDecision::Reject => "reject",
                    })
                    .reason(reason)
                    .metadata(json!({
                        "scope": { "tier": "ho2" },
                        "gate": { "trace_hash": trace_hash },
                    })),
            )
            .await;
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor").finish_non_exhaustive()
    }
}

fn parse_classification(wo: &WorkOrder) -> Classification {
    let output = match (&wo.state, &wo.output_result) {
        (WoState::Completed, Some(output)) => output.clone(),
        _ => Value::Null,
    };
    let speech_act = output["speech_act"]
        .as_str()
        .unwrap_or("statement")
        .to_string();
    let collect = |key: &str| -> Vec<String> {
        output[key]
            .as_array()
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };
    Classification {
        speech_act,
        labels: Labels {
            domain: collect("domain"),
            task: collect("task"),
        },
    }
}

fn response_text(wo: &WorkOrder) -> String {
    wo.output_result
        .as_ref()
        .and_then(|output| output["response_text"].as_str())
        .map(str::to_string)
        .unwrap_or_default()
}
