//! Confidence zones for deciding when a rule result needs a second opinion.
//!
//! - Zone A: clear winner, the rule result stands.
//! - Zone B: ambiguous, ask the reasoner.
//! - Zone C: nothing matched, ask the reasoner and flag for human review.

use super::Classification;
use crate::taxonomy::SkillGroup;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Knobs for zone B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationPolicy {
    /// Two or more matched groups whose top scores differ by at most this
    /// much are ambiguous.
    pub margin_threshold: usize,
    /// Escalate on negation, temporal or safety wording.
    pub semantic_signals: bool,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            margin_threshold: 1,
            semantic_signals: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    A,
    B,
    C,
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Zone::A => "A",
            Zone::B => "B",
            Zone::C => "C",
        })
    }
}

/// Wording that keyword counts cannot interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticSignal {
    SafetyRisk,
    Negation,
    Temporal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZoneReason {
    NoMatches,
    Semantic { signal: SemanticSignal },
    LowMargin { margin: usize },
    PrecedenceOverride { selected: SkillGroup, top: SkillGroup },
    ClearWinner { margin: usize },
}

impl fmt::Display for ZoneReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneReason::NoMatches => f.write_str("No keyword matches found"),
            ZoneReason::Semantic { signal } => match signal {
                SemanticSignal::SafetyRisk => f.write_str("Safety/risk wording detected"),
                SemanticSignal::Negation => f.write_str("Negation detected"),
                SemanticSignal::Temporal => f.write_str("Temporal/conditional wording detected"),
            },
            ZoneReason::LowMargin { margin } => write!(f, "Low margin: {margin}"),
            ZoneReason::PrecedenceOverride { selected, top } => write!(
                f,
                "Precedence picked {selected} over higher-scoring {top}"
            ),
            ZoneReason::ClearWinner { margin } => write!(f, "Clear winner: margin {margin}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceAnalysis {
    pub zone: Zone,
    pub margin: usize,
    /// Shannon entropy of the group-score distribution, normalized to 0..=1.
    pub entropy: f64,
    pub needs_llm: bool,
    pub needs_human_review: bool,
    pub reason: ZoneReason,
}

/// Place a classification in a zone.
pub fn analyze(classification: &Classification, text: &str, policy: &EscalationPolicy) -> ConfidenceAnalysis {
    if classification.is_unmatched() {
        return ConfidenceAnalysis {
            zone: Zone::C,
            margin: 0,
            entropy: 0.0,
            needs_llm: true,
            needs_human_review: true,
            reason: ZoneReason::NoMatches,
        };
    }

    let margin = classification.margin;
    let entropy = normalized_entropy(classification);
    let zone_b = |reason| ConfidenceAnalysis {
        zone: Zone::B,
        margin,
        entropy,
        needs_llm: true,
        needs_human_review: false,
        reason,
    };

    if policy.semantic_signals {
        if let Some(signal) = detect_semantic_signal(text) {
            return zone_b(ZoneReason::Semantic { signal });
        }
    }

    if classification.matched_groups().len() >= 2 && margin <= policy.margin_threshold {
        return zone_b(ZoneReason::LowMargin { margin });
    }

    if let Some(top) = classification.candidates.first() {
        let selected = classification.result.skill_group;
        if classification.score(selected) < top.score {
            return zone_b(ZoneReason::PrecedenceOverride {
                selected,
                top: top.skill_group,
            });
        }
    }

    ConfidenceAnalysis {
        zone: Zone::A,
        margin,
        entropy,
        needs_llm: false,
        needs_human_review: false,
        reason: ZoneReason::ClearWinner { margin },
    }
}

/// Max entropy over four groups is log2(4) = 2.
fn normalized_entropy(classification: &Classification) -> f64 {
    let total: usize = classification.scores.values().sum();
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    let entropy: f64 = classification
        .scores
        .values()
        .filter(|&&score| score > 0)
        .map(|&score| {
            let p = score as f64 / total;
            -p * p.log2()
        })
        .sum();
    entropy / 2.0
}

static SAFETY_RISK: LazyLock<Option<Regex>> = LazyLock::new(|| {
    signal_regex(&[
        "burnt",
        "burning",
        "spark",
        "sparking",
        "smoke",
        "overheat",
        "overheating",
        "fire",
        "electric shock",
        "blast",
    ])
});

static NEGATION: LazyLock<Option<Regex>> = LazyLock::new(|| {
    signal_regex(&[
        "no", "not", "without", "none", "never", "don't", "didn't", "wasn't", "isn't",
    ])
});

static TEMPORAL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    signal_regex(&[
        "after",
        "before",
        "only when",
        "sometimes",
        "yesterday",
        "morning",
        "every",
        "when",
    ])
});

fn signal_regex(words: &[&str]) -> Option<Regex> {
    let alternation = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    match Regex::new(&format!(r"\b(?:{alternation})\b")) {
        Ok(re) => Some(re),
        Err(e) => {
            log::error!("[signal_regex] Failed to compile signal pattern: {e}");
            None
        }
    }
}

/// Strongest signal in `text`: safety, then negation, then temporal.
pub fn detect_semantic_signal(text: &str) -> Option<SemanticSignal> {
    let lower = text.to_lowercase();
    let hit = |re: &LazyLock<Option<Regex>>| re.as_ref().is_some_and(|re| re.is_match(&lower));

    if hit(&SAFETY_RISK) {
        Some(SemanticSignal::SafetyRisk)
    } else if hit(&NEGATION) {
        Some(SemanticSignal::Negation)
    } else if hit(&TEMPORAL) {
        Some(SemanticSignal::Temporal)
    } else {
        None
    }
}
