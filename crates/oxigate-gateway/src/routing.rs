//! Candidate ordering for one request.
//!
//! `order` is a pure function of its inputs — provider settings, context
//! hints, the active experiment, and the user id. No hidden state, so the
//! same inputs always produce the same candidate list.

use sha2::{Digest, Sha256};

use oxigate_core::config::{ExperimentConfig, ProviderSettings};

/// The two orderings an active experiment selects between.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Base ordering: ascending priority, name tie-break.
    PreferQuality,
    /// Cheapest combined per-1k rate first, name tie-break.
    PreferCost,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::PreferQuality => "prefer-quality",
            Variant::PreferCost => "prefer-cost",
        }
    }
}

/// Deterministically assign a user to an experiment variant.
///
/// SHA-256 keyed on user id + experiment name, so assignment is stable
/// across processes and across requests from the same user, and reshuffles
/// when the experiment name changes.
pub fn assign_variant(user_id: &str, experiment_name: &str) -> Variant {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(experiment_name.as_bytes());
    let digest = hasher.finalize();
    if digest[0] & 1 == 0 {
        Variant::PreferQuality
    } else {
        Variant::PreferCost
    }
}

/// Produce the ordered candidate list for a request.
///
/// Disabled providers are filtered out; the base order sorts by
/// (priority, name); a provider whose specialties match a context hint is
/// promoted to the front without disturbing the relative order of the
/// rest; an active experiment swaps the base ordering for the user's
/// assigned variant.
pub fn order(
    providers: &[ProviderSettings],
    hints: &[String],
    experiment: Option<&ExperimentConfig>,
    user_id: &str,
) -> Vec<ProviderSettings> {
    let mut candidates: Vec<ProviderSettings> =
        providers.iter().filter(|p| p.enabled).cloned().collect();

    let variant = match experiment {
        Some(exp) if exp.enabled => assign_variant(user_id, &exp.name),
        _ => Variant::PreferQuality,
    };

    match variant {
        Variant::PreferQuality => {
            candidates.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.name.cmp(&b.name)));
        }
        Variant::PreferCost => {
            candidates.sort_by(|a, b| {
                a.combined_rate()
                    .partial_cmp(&b.combined_rate())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.name.cmp(&b.name))
            });
        }
    }

    // Hint promotion: the first specialist moves to the front, the rest
    // keep their relative order.
    if !hints.is_empty() {
        let specialist = candidates.iter().position(|p| {
            p.specialties
                .iter()
                .any(|s| hints.iter().any(|h| h.eq_ignore_ascii_case(s)))
        });
        if let Some(index) = specialist {
            let promoted = candidates.remove(index);
            candidates.insert(0, promoted);
        }
    }

    candidates
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
