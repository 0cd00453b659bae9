#![deny(missing_docs)]
//! # cortex-gateway — provider routing under budget governance
//!
//! The gateway is the only component that talks to providers. Per call it:
//!
//! 1. Resolves the provider — explicit ID, then first matching domain-tag
//!    route, then the configured default.
//! 2. Pre-checks the budget against the request's `max_tokens`.
//! 3. Renders the contract's prompt pack with the template variables.
//! 4. Sends through the provider and classifies any transport failure.
//! 5. Debits the budget — the single authoritative debit for the call.
//! 6. Writes the `EXCHANGE` event; its ledger ID becomes
//!    `exchange_entry_id` on the response.
//!
//! Stateless per call; every outcome is encoded in the returned
//! [`PromptResponse`], never an error type.

use cortex_budget::{apply_policy, Budgeter, PolicyAction};
use cortex_contract::{ContractStore, PromptPackStore};
use cortex_ledger::{event, EntryDraft, LedgerStream, Provenance};
use cortex_provider::{ProviderCall, ProviderRegistry};
use cortex_types::{
    ErrorCode, GatewayConfig, Outcome, PromptRequest, PromptResponse, ProviderId, TokenUsage,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// The gateway. Construct once, share via `Arc`.
pub struct Gateway {
    providers: ProviderRegistry,
    contracts: Arc<ContractStore>,
    packs: Arc<PromptPackStore>,
    budget: Arc<Budgeter>,
    ledger: Arc<LedgerStream>,
    config: GatewayConfig,
}

impl Gateway {
    /// Wire up a gateway from its collaborators.
    pub fn new(
        providers: ProviderRegistry,
        contracts: Arc<ContractStore>,
        packs: Arc<PromptPackStore>,
        budget: Arc<Budgeter>,
        ledger: Arc<LedgerStream>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            providers,
            contracts,
            packs,
            budget,
            ledger,
            config,
        }
    }

    /// Resolve provider and model for a request: explicit provider first,
    /// then the first domain-tag route that matches, then the default.
    fn resolve_route(&self, request: &PromptRequest) -> (ProviderId, Option<String>) {
        if let Some(provider_id) = &request.provider_id {
            return (provider_id.clone(), request.model_id.clone());
        }
        for tag in &request.domain_tags {
            if let Some(route) = self.config.domain_tag_routes.get(tag) {
                let model = request.model_id.clone().or_else(|| route.model_id.clone());
                return (route.provider_id.clone(), model);
            }
        }
        (self.config.default_provider.clone(), request.model_id.clone())
    }

    /// Route one request. Every failure mode comes back as a response with
    /// `outcome != success` and an `error_code`.
    pub async fn route(&self, request: PromptRequest) -> PromptResponse {
        let (provider_id, model_override) = self.resolve_route(&request);

        let Some(provider) = self.providers.get(&provider_id) else {
            tracing::warn!(provider = %provider_id, wo = %request.work_order_id,
                "no provider registered under resolved id");
            return PromptResponse::rejected(
                provider_id,
                ErrorCode::UnknownProvider,
                self.budget.remaining(&request.work_order_id),
            );
        };

        // Budget pre-check against the worst case: max_tokens all consumed.
        let check = self.budget.check(&request.work_order_id, request.max_tokens);
        match apply_policy(check.violation, self.budget.mode()) {
            PolicyAction::Fail => {
                tracing::info!(wo = %request.work_order_id, reason = %check.reason,
                    "budget pre-check rejected call");
                return PromptResponse::rejected(
                    provider_id,
                    ErrorCode::BudgetExceeded,
                    check.remaining,
                );
            }
            PolicyAction::Warn => {
                self.budget
                    .warn(request.work_order_id.as_str(), check.reason.clone())
                    .await;
            }
            PolicyAction::Continue => {}
        }

        // Render the final prompt from the contract's pack.
        let Some(contract) = self.contracts.get(&request.contract_id) else {
            return PromptResponse::error(provider_id, ErrorCode::InvalidRequest, check.remaining);
        };
        let pack_id = contract.spec.prompt_pack_id.clone();
        let prompt = match self.packs.render(&pack_id, &request.template_variables) {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::warn!(contract = %request.contract_id, error = %e, "prompt render failed");
                return PromptResponse::error(
                    provider_id,
                    ErrorCode::InvalidRequest,
                    check.remaining,
                );
            }
        };

        let model_id = model_override.unwrap_or_else(|| provider.default_model().to_string());
        let call = ProviderCall {
            model_id: model_id.clone(),
            prompt: prompt.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            timeout_ms: request.timeout_ms,
            structured_output: request.structured_output.clone(),
            tools: request.tools.clone(),
        };

        let start = Instant::now();
        let reply = match provider.send(call).await {
            Ok(reply) => reply,
            Err(e) => {
                let code = e.error_code();
                tracing::warn!(provider = %provider_id, wo = %request.work_order_id,
                    error = %e, retryable = e.is_retryable(), "provider call failed");
                return PromptResponse::error(
                    provider_id,
                    code,
                    self.budget.remaining(&request.work_order_id),
                );
            }
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        // The single authoritative debit for this call. The executor MUST
        // NOT debit again.
        let debit = self
            .budget
            .debit(
                &request.work_order_id,
                TokenUsage {
                    input_tokens: reply.input_tokens,
                    output_tokens: reply.output_tokens,
                },
            )
            .await;

        let exchange_entry_id = self
            .ledger
            .write_lossy(
                EntryDraft::new(event::EXCHANGE, request.work_order_id.as_str())
                    .decision("success")
                    .prompts(vec![pack_id])
                    .metadata(
                        Provenance::work_order(&request.session_id, &request.work_order_id)
                            .metadata(
                                "hot",
                                json!({
                                    "exchange": {
                                        "provider_id": &provider_id,
                                        "model_id": &reply.model_id,
                                        "request_id": &reply.request_id,
                                        "prompt": &prompt,
                                        "response_content": &reply.content,
                                        "input_tokens": reply.input_tokens,
                                        "output_tokens": reply.output_tokens,
                                        "latency_ms": latency_ms,
                                        "finish_reason": reply.finish_reason,
                                    }
                                }),
                            ),
                    ),
            )
            .await;

        PromptResponse {
            content: reply.content,
            content_blocks: reply.content_blocks,
            finish_reason: reply.finish_reason,
            input_tokens: reply.input_tokens,
            output_tokens: reply.output_tokens,
            model_id: reply.model_id,
            provider_id,
            latency_ms,
            outcome: Outcome::Success,
            error_code: None,
            exchange_entry_id,
            cost_incurred: debit.cost_incurred,
            budget_remaining: debit.remaining,
        }
    }
}
