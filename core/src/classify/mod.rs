pub mod analysis;
mod engine;

use crate::taxonomy::SkillGroup;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use analysis::{analyze, ConfidenceAnalysis, EscalationPolicy, Zone};
pub use engine::{classify, classify_result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Confidence::High => "high",
            Confidence::Low => "low",
        })
    }
}

/// The routing decision for one ticket.
///
/// Serializes as `{"issue_code": ..., "skill_group": ..., "confidence": ...}`
/// with `issue_code` present as `null` when nothing matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub issue_code: Option<String>,
    pub skill_group: SkillGroup,
    pub confidence: Confidence,
}

impl ClassificationResult {
    /// Default bucket for text that matched no keyword.
    pub fn unmatched() -> Self {
        Self {
            issue_code: None,
            skill_group: SkillGroup::DEFAULT,
            confidence: Confidence::Low,
        }
    }
}

/// One keyword found in the ticket text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordMatch {
    pub issue_code: String,
    pub skill_group: SkillGroup,
    pub keyword: String,
    /// Length in characters.
    pub keyword_len: usize,
}

/// Best issue of one skill group and that group's score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub skill_group: SkillGroup,
    pub score: usize,
    pub issue_code: Option<String>,
}

/// Engine output: the result plus everything needed to judge it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub result: ClassificationResult,
    /// Every keyword hit, in snapshot order.
    pub matches: Vec<KeywordMatch>,
    /// Keyword hits per skill group; all four groups are present.
    pub scores: BTreeMap<SkillGroup, usize>,
    /// One entry per skill group, highest score first. Equal scores keep
    /// precedence order.
    pub candidates: Vec<Candidate>,
    /// Top score minus runner-up score; 0 when nothing matched.
    pub margin: usize,
}

impl Classification {
    pub fn is_unmatched(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn score(&self, group: SkillGroup) -> usize {
        self.scores.get(&group).copied().unwrap_or(0)
    }

    pub fn top_score(&self) -> usize {
        self.candidates.first().map_or(0, |c| c.score)
    }

    /// Skill groups with at least one hit, highest score first.
    pub fn matched_groups(&self) -> Vec<SkillGroup> {
        self.candidates
            .iter()
            .filter(|c| c.score > 0)
            .map(|c| c.skill_group)
            .collect()
    }

    pub fn candidate(&self, group: SkillGroup) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.skill_group == group)
    }

    /// Distinct matched keywords, in match order.
    pub fn matched_keywords(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for m in &self.matches {
            if !seen.contains(&m.keyword.as_str()) {
                seen.push(m.keyword.as_str());
            }
        }
        seen
    }
}
