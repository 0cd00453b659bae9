//! Overlays (biases) — consolidated, labeled, bounded-lifetime artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What kind of learning an overlay encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    /// Recurring interest in a topic or domain.
    TopicAffinity,
    /// Preferred interaction shape (terse answers, examples first, …).
    InteractionStyle,
    /// A task the user keeps coming back to.
    TaskPattern,
    /// A standing restriction to honor.
    Constraint,
}

/// Matching labels for bias injection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Labels {
    /// Domain labels.
    #[serde(default)]
    pub domain: Vec<String>,
    /// Task labels.
    #[serde(default)]
    pub task: Vec<String>,
}

impl Labels {
    /// Whether any label intersects the other set.
    pub fn intersects(&self, other: &Labels) -> bool {
        self.domain.iter().any(|l| other.domain.contains(l))
            || self.task.iter().any(|l| other.task.contains(l))
    }
}

/// Where an overlay applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayScope {
    /// All sessions of one agent class.
    Agent,
    /// One session only.
    Session,
    /// Everywhere.
    Global,
}

/// A consolidated bias as stored in the overlays stream.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Overlay {
    /// `OVL-<8 hex>`, assigned at write time.
    pub overlay_id: String,
    /// Deterministic consolidation identity — see [`artifact_id`].
    pub artifact_id: String,
    /// The signal this overlay was distilled from.
    pub signal_id: String,
    /// What kind of learning this is.
    pub artifact_type: ArtifactType,
    /// Matching labels for injection.
    pub labels: Labels,
    /// Strength in `[0, 1]`.
    pub weight: f64,
    /// Where the overlay applies.
    pub scope: OverlayScope,
    /// Free text injected verbatim into assembled context.
    pub context_line: String,
    /// Whether the overlay is live.
    pub enabled: bool,
    /// Hard expiry; None = decays out via salience instead.
    pub expires_at_event_ts: Option<DateTime<Utc>>,
    /// Contributing signal events. Never empty.
    pub source_event_ids: Vec<String>,
    /// Base salience before decay.
    pub salience_weight: f64,
    /// Multiplier on the decay rate (1.0 = nominal).
    pub decay_modifier: f64,
    /// When the overlay was written.
    pub created_at: DateTime<Utc>,
    /// Start of the accumulation window it summarizes.
    pub window_start: DateTime<Utc>,
    /// End of the accumulation window it summarizes.
    pub window_end: DateTime<Utc>,
}

/// Deterministic consolidation identity, the basis of idempotency:
///
/// ```text
/// sha256("ART:" ‖ sort(source_signal_ids).join("|") ‖ gate_window_key
///        ‖ model ‖ prompt_pack_version) → first 12 hex
/// ```
pub fn artifact_id(
    source_signal_ids: &[String],
    gate_window_key: &str,
    model: &str,
    prompt_pack_version: &str,
) -> String {
    let mut sorted = source_signal_ids.to_vec();
    sorted.sort();
    let mut hasher = Sha256::new();
    hasher.update(b"ART:");
    hasher.update(sorted.join("|").as_bytes());
    hasher.update(gate_window_key.as_bytes());
    hasher.update(model.as_bytes());
    hasher.update(prompt_pack_version.as_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
}
