#![deny(missing_docs)]
//! # cortex-memory — the signal memory plane
//!
//! An addressable, append-only store with a bistable consolidation gate.
//! Signals go in as immutable events; accumulators (count, distinct
//! sessions, decay) are computed on read. When a signal's accumulator
//! crosses the gate, a consolidation work order distills it into an
//! overlay — a labeled, bounded-lifetime bias injected into future context.
//!
//! Memory is a leaf: it exposes `log_*` / `read_*` / `check_gate` and never
//! calls back into the tiers that drive it.
//!
//! Every time-dependent read accepts an `as_of` timestamp. Same inputs,
//! same outputs — streams replay deterministically from any point.

pub mod accumulator;
pub mod overlay;

pub use accumulator::{decay_factor, SignalAccumulator};
pub use overlay::{artifact_id, ArtifactType, Labels, Overlay, OverlayScope};

use chrono::{DateTime, Duration, Utc};
use cortex_ledger::{event, EntryDraft, LedgerError, LedgerStream};
use cortex_types::{MemoryConfig, SessionId};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Memory plane errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MemoryError {
    /// An overlay draft arrived with no source events.
    #[error("overlay rejected: source_event_ids is empty")]
    EmptySourceIds,

    /// The backing stream failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Outcome of the bistable gate for one signal.
#[derive(Debug, Clone, PartialEq)]
pub struct GateResult {
    /// Whether consolidation should fire.
    pub crossed: bool,
    /// Why (or why not).
    pub reason: String,
    /// Whether an overlay already covers this signal inside the window.
    pub already_consolidated: bool,
}

/// What a consolidation hands to [`MemoryPlane::log_overlay`].
#[derive(Debug, Clone)]
pub struct OverlayDraft {
    /// The signal this overlay distills.
    pub signal_id: String,
    /// What kind of learning this is.
    pub artifact_type: ArtifactType,
    /// Matching labels for injection.
    pub labels: Labels,
    /// Strength in `[0, 1]`.
    pub weight: f64,
    /// Where the overlay applies.
    pub scope: OverlayScope,
    /// Free text injected verbatim.
    pub context_line: String,
    /// Hard expiry, if any.
    pub expires_at_event_ts: Option<DateTime<Utc>>,
    /// Contributing signal events. Must be non-empty.
    pub source_event_ids: Vec<String>,
    /// Signal IDs feeding the artifact identity. Empty = `[signal_id]`.
    pub source_signal_ids: Vec<String>,
    /// Base salience before decay.
    pub salience_weight: f64,
    /// Multiplier on the decay rate.
    pub decay_modifier: f64,
    /// Start of the summarized accumulation window.
    pub window_start: DateTime<Utc>,
    /// End of the summarized accumulation window.
    pub window_end: DateTime<Utc>,
    /// Gate window key feeding the artifact identity.
    pub gate_window_key: String,
    /// Model that produced the artifact (identity input).
    pub model: String,
    /// Prompt pack version that produced it (identity input).
    pub prompt_pack_version: String,
    /// Pinned write timestamp for replay. None = wall clock.
    pub at: Option<DateTime<Utc>>,
}

/// Result of an overlay write.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayWrite {
    /// The overlay's ID (existing one on a no-op).
    pub overlay_id: String,
    /// The deterministic artifact identity.
    pub artifact_id: String,
    /// True when a fresh OVERLAY event was appended.
    pub created: bool,
    /// True when a deactivated overlay was re-activated instead.
    pub reactivated: bool,
}

#[derive(Debug, Clone)]
struct ResolvedOverlay {
    overlay: Overlay,
    active: bool,
}

/// The memory plane. Single writer per stream; reads recompute state.
pub struct MemoryPlane {
    signals: Arc<LedgerStream>,
    overlays: Arc<LedgerStream>,
    config: MemoryConfig,
}

impl MemoryPlane {
    /// Wire up the plane over its two streams.
    pub fn new(
        signals: Arc<LedgerStream>,
        overlays: Arc<LedgerStream>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            signals,
            overlays,
            config,
        }
    }

    /// The configured gate/decay parameters.
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Append one signal event. Returns the event ID.
    pub async fn log_signal(
        &self,
        signal_id: &str,
        session_id: &SessionId,
        metadata: Value,
        at: Option<DateTime<Utc>>,
    ) -> Result<String, MemoryError> {
        let event_id = format!("EVT-{}", &Uuid::new_v4().simple().to_string()[..8]);
        let mut draft = EntryDraft::new(event::SIGNAL, session_id.as_str())
            .decision("recorded")
            .metadata(json!({
                "scope": { "tier": "hot" },
                "provenance": { "session_id": session_id },
                "signal": {
                    "signal_id": signal_id,
                    "event_id": &event_id,
                    "detail": metadata,
                },
            }));
        if let Some(ts) = at {
            draft = draft.at(ts);
        }
        self.signals.write(draft).await?;
        tracing::debug!(%signal_id, session = %session_id, %event_id, "signal recorded");
        Ok(event_id)
    }

    /// Accumulate signals as of a point in time (None = wall clock).
    /// Results are sorted by signal ID; only accumulators with
    /// `count ≥ min_count` are returned.
    pub async fn read_signals(
        &self,
        signal_id: Option<&str>,
        min_count: u64,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<SignalAccumulator>, MemoryError> {
        let as_of = as_of.unwrap_or_else(Utc::now);
        let mut grouped: BTreeMap<String, SignalAccumulator> = BTreeMap::new();

        for entry in self.signals.read_all().await? {
            if entry.timestamp > as_of {
                continue;
            }
            let signal = &entry.metadata["signal"];
            let Some(id) = signal["signal_id"].as_str() else {
                continue;
            };
            if signal_id.is_some_and(|want| want != id) {
                continue;
            }
            let event_id = signal["event_id"].as_str().unwrap_or_default().to_string();
            let acc = grouped
                .entry(id.to_string())
                .or_insert_with(|| SignalAccumulator {
                    signal_id: id.to_string(),
                    count: 0,
                    first_seen: entry.timestamp,
                    last_seen: entry.timestamp,
                    session_ids: Default::default(),
                    event_ids: vec![],
                    decay: 1.0,
                });
            acc.count += 1;
            acc.first_seen = acc.first_seen.min(entry.timestamp);
            acc.last_seen = acc.last_seen.max(entry.timestamp);
            acc.session_ids.insert(entry.submission_id.clone());
            acc.event_ids.push(event_id);
        }

        let half_life = self.config.decay_half_life_hours;
        let mut result: Vec<SignalAccumulator> = grouped
            .into_values()
            .filter(|acc| acc.count >= min_count)
            .map(|mut acc| {
                acc.decay = decay_factor(acc.last_seen, as_of, half_life);
                acc
            })
            .collect();
        result.sort_by(|a, b| a.signal_id.cmp(&b.signal_id));
        Ok(result)
    }

    /// Write an overlay, idempotently.
    ///
    /// An active overlay with the same artifact ID makes this a no-op; a
    /// deactivated one is re-activated via a lifecycle event; otherwise a
    /// fresh OVERLAY event is appended. Empty `source_event_ids` is refused.
    pub async fn log_overlay(&self, draft: OverlayDraft) -> Result<OverlayWrite, MemoryError> {
        if draft.source_event_ids.is_empty() {
            return Err(MemoryError::EmptySourceIds);
        }
        let source_signal_ids = if draft.source_signal_ids.is_empty() {
            vec![draft.signal_id.clone()]
        } else {
            draft.source_signal_ids.clone()
        };
        let artifact = artifact_id(
            &source_signal_ids,
            &draft.gate_window_key,
            &draft.model,
            &draft.prompt_pack_version,
        );

        let resolved = self.resolve_overlays(None).await?;
        if let Some(existing) = resolved.get(&artifact) {
            if existing.active {
                tracing::debug!(artifact_id = %artifact, "overlay exists; consolidation is a no-op");
                return Ok(OverlayWrite {
                    overlay_id: existing.overlay.overlay_id.clone(),
                    artifact_id: artifact,
                    created: false,
                    reactivated: false,
                });
            }
            // Deactivated: re-activate through a lifecycle event.
            let mut entry = EntryDraft::new(event::OVERLAY_WEIGHT_UPDATED, artifact.clone())
                .decision("reactivated")
                .reason("re-consolidated within a new window")
                .metadata(json!({
                    "scope": { "tier": "hot" },
                    "overlay_lifecycle": {
                        "artifact_id": &artifact,
                        "weight": draft.weight,
                        "enabled": true,
                    },
                }));
            if let Some(ts) = draft.at {
                entry = entry.at(ts);
            }
            self.overlays.write(entry).await?;
            return Ok(OverlayWrite {
                overlay_id: existing.overlay.overlay_id.clone(),
                artifact_id: artifact,
                created: false,
                reactivated: true,
            });
        }

        let created_at = draft.at.unwrap_or_else(Utc::now);
        let overlay = Overlay {
            overlay_id: format!("OVL-{}", &Uuid::new_v4().simple().to_string()[..8]),
            artifact_id: artifact.clone(),
            signal_id: draft.signal_id,
            artifact_type: draft.artifact_type,
            labels: draft.labels,
            weight: draft.weight.clamp(0.0, 1.0),
            scope: draft.scope,
            context_line: draft.context_line,
            enabled: true,
            expires_at_event_ts: draft.expires_at_event_ts,
            source_event_ids: draft.source_event_ids,
            salience_weight: draft.salience_weight,
            decay_modifier: draft.decay_modifier,
            created_at,
            window_start: draft.window_start,
            window_end: draft.window_end,
        };
        let overlay_id = overlay.overlay_id.clone();
        self.overlays
            .write(
                EntryDraft::new(event::OVERLAY, artifact.clone())
                    .decision("created")
                    .metadata(json!({
                        "scope": { "tier": "hot" },
                        "overlay": overlay,
                    }))
                    .at(created_at),
            )
            .await?;
        tracing::info!(artifact_id = %artifact, %overlay_id, "overlay written");
        Ok(OverlayWrite {
            overlay_id,
            artifact_id: artifact,
            created: true,
            reactivated: false,
        })
    }

    /// The biases live at `as_of` (None = wall clock): latest lifecycle
    /// state enabled, not expired, decayed salience above the floor.
    pub async fn read_active_biases(
        &self,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<Overlay>, MemoryError> {
        let as_of_ts = as_of.unwrap_or_else(Utc::now);
        let resolved = self.resolve_overlays(Some(as_of_ts)).await?;
        let mut live: Vec<Overlay> = resolved
            .into_values()
            .filter(|r| r.active)
            .map(|r| r.overlay)
            .filter(|o| match o.expires_at_event_ts {
                Some(expiry) => expiry >= as_of_ts,
                None => true,
            })
            .filter(|o| {
                let base = decay_factor(
                    o.created_at,
                    as_of_ts,
                    self.config.decay_half_life_hours,
                );
                let salience = o.salience_weight * base.powf(o.decay_modifier.max(0.0));
                salience >= self.config.bias_salience_floor
            })
            .collect();
        live.sort_by(|a, b| {
            a.signal_id
                .cmp(&b.signal_id)
                .then_with(|| a.artifact_id.cmp(&b.artifact_id))
        });
        Ok(live)
    }

    /// Evaluate the bistable gate for one signal:
    ///
    /// ```text
    /// crossed ⇔ count ≥ C_count ∧ |sessions| ≥ C_session
    ///           ∧ ¬already_consolidated(signal, as_of − W)
    /// ```
    pub async fn check_gate(
        &self,
        signal_id: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<GateResult, MemoryError> {
        let as_of_ts = as_of.unwrap_or_else(Utc::now);
        let accumulators = self
            .read_signals(Some(signal_id), 0, Some(as_of_ts))
            .await?;
        let Some(acc) = accumulators.first() else {
            return Ok(GateResult {
                crossed: false,
                reason: format!("no events for {signal_id}"),
                already_consolidated: false,
            });
        };

        let count_ok = acc.count >= self.config.gate_count_threshold;
        let sessions_ok = acc.session_ids.len() as u64 >= self.config.gate_session_threshold;
        let already = self.already_consolidated(signal_id, as_of_ts).await?;

        let crossed = count_ok && sessions_ok && !already;
        let reason = if already {
            format!("overlay within the last {}h", self.config.gate_window_hours)
        } else if !count_ok {
            format!(
                "count {} below threshold {}",
                acc.count, self.config.gate_count_threshold
            )
        } else if !sessions_ok {
            format!(
                "{} distinct sessions below threshold {}",
                acc.session_ids.len(),
                self.config.gate_session_threshold
            )
        } else {
            format!(
                "count {} across {} sessions",
                acc.count,
                acc.session_ids.len()
            )
        };
        Ok(GateResult {
            crossed,
            reason,
            already_consolidated: already,
        })
    }

    /// Retire an overlay. Returns the lifecycle entry ID.
    pub async fn deactivate_overlay(
        &self,
        artifact_id: &str,
        reason: &str,
        event_ts: DateTime<Utc>,
    ) -> Result<cortex_types::LedgerId, MemoryError> {
        let id = self
            .overlays
            .write(
                EntryDraft::new(event::OVERLAY_DEACTIVATED, artifact_id)
                    .decision("deactivated")
                    .reason(reason)
                    .metadata(json!({
                        "scope": { "tier": "hot" },
                        "overlay_lifecycle": { "artifact_id": artifact_id, "enabled": false },
                    }))
                    .at(event_ts),
            )
            .await?;
        Ok(id)
    }

    /// Adjust an overlay's weight. Returns the lifecycle entry ID.
    pub async fn update_overlay_weight(
        &self,
        artifact_id: &str,
        new_weight: f64,
        reason: &str,
        event_ts: DateTime<Utc>,
    ) -> Result<cortex_types::LedgerId, MemoryError> {
        let id = self
            .overlays
            .write(
                EntryDraft::new(event::OVERLAY_WEIGHT_UPDATED, artifact_id)
                    .decision("updated")
                    .reason(reason)
                    .metadata(json!({
                        "scope": { "tier": "hot" },
                        "overlay_lifecycle": {
                            "artifact_id": artifact_id,
                            "weight": new_weight.clamp(0.0, 1.0),
                        },
                    }))
                    .at(event_ts),
            )
            .await?;
        Ok(id)
    }

    async fn already_consolidated(
        &self,
        signal_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<bool, MemoryError> {
        let window = Duration::milliseconds(
            (self.config.gate_window_hours * 3_600_000.0) as i64,
        );
        let cutoff = as_of - window;
        let resolved = self.resolve_overlays(Some(as_of)).await?;
        Ok(resolved.values().any(|r| {
            r.active && r.overlay.signal_id == signal_id && r.overlay.window_end >= cutoff
        }))
    }

    /// Fold the overlays stream into latest-state-per-artifact, considering
    /// only events at or before `as_of` when given.
    async fn resolve_overlays(
        &self,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<HashMap<String, ResolvedOverlay>, MemoryError> {
        let mut resolved: HashMap<String, ResolvedOverlay> = HashMap::new();
        for entry in self.overlays.read_all().await? {
            if as_of.is_some_and(|ts| entry.timestamp > ts) {
                continue;
            }
            match entry.event_type.as_str() {
                event::OVERLAY => {
                    match serde_json::from_value::<Overlay>(entry.metadata["overlay"].clone()) {
                        Ok(overlay) => {
                            let active = overlay.enabled;
                            resolved.insert(
                                overlay.artifact_id.clone(),
                                ResolvedOverlay { overlay, active },
                            );
                        }
                        Err(e) => {
                            tracing::warn!(entry = %entry.id, error = %e,
                                "skipping unreadable overlay event");
                        }
                    }
                }
                event::OVERLAY_DEACTIVATED => {
                    if let Some(r) = resolved.get_mut(&entry.submission_id) {
                        r.active = false;
                        r.overlay.enabled = false;
                    }
                }
                event::OVERLAY_WEIGHT_UPDATED => {
                    if let Some(r) = resolved.get_mut(&entry.submission_id) {
                        if let Some(weight) =
                            entry.metadata["overlay_lifecycle"]["weight"].as_f64()
                        {
                            r.overlay.weight = weight;
                        }
                        r.active = true;
                        r.overlay.enabled = true;
                    }
                }
                _ => {}
            }
        }
        Ok(resolved)
    }
}

impl std::fmt::Debug for MemoryPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPlane")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
