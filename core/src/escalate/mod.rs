//! Escalation of ambiguous tickets to an external reasoner.
//!
//! The reasoner only breaks ties between buckets the rule engine already
//! found (or, when nothing matched, among all four). Its answer is checked
//! against the request and the taxonomy before anyone acts on it.

pub mod command;
pub mod http;
mod prompt;
mod response;

use crate::classify::Classification;
use crate::taxonomy::{SkillGroup, TaxonomySnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub use command::CommandReasoner;
pub use http::HttpReasoner;
pub use prompt::{build_prompt, build_system_prompt, build_user_prompt};
pub use response::{extract_json, parse_answer, validate_answer, ValidatedAnswer};

#[derive(Error, Debug)]
pub enum EscalationError {
    #[error("{0} is not set")]
    MissingApiKey(String),
    #[error("Reasoner timed out after {0} ms")]
    Timeout(u64),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Reasoner API returned status {status}")]
    Status { status: u16, body: String },
    #[error("Reasoner command failed: {0}")]
    CommandFailed(String),
    #[error("Empty response from reasoner")]
    EmptyResponse,
    #[error("Failed to parse reasoner response: {0}")]
    Parse(String),
    #[error("Reasoner answer rejected: {0}")]
    Rejected(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    #[serde(alias = "low", alias = "LOW")]
    Low,
    #[serde(alias = "medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "high", alias = "HIGH")]
    High,
    #[serde(alias = "urgent", alias = "URGENT")]
    Urgent,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Urgent => "Urgent",
        })
    }
}

/// The reasoner's structured answer, as returned on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonerAnswer {
    /// Skill group code; must be one of the request's candidate buckets.
    pub primary_category: String,
    #[serde(default)]
    pub secondary_category: Option<String>,
    #[serde(default)]
    pub issue_code: Option<String>,
    pub priority: Priority,
    #[serde(default)]
    pub risk_flag: Option<String>,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReasonerResponse {
    pub answer: ReasonerAnswer,
    pub latency_ms: u64,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueSummary {
    pub code: String,
    pub name: String,
}

/// Issue codes the reasoner may pick from within one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketSchema {
    pub skill_group: SkillGroup,
    pub issues: Vec<IssueSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationRequest {
    pub ticket_text: String,
    pub candidate_buckets: Vec<SkillGroup>,
    pub rule_scores: BTreeMap<SkillGroup, usize>,
    pub schema: Vec<BucketSchema>,
}

impl EscalationRequest {
    /// Candidates are the groups with a non-zero score, highest first, or
    /// every group when nothing matched.
    pub fn new(text: &str, classification: &Classification, taxonomy: &TaxonomySnapshot) -> Self {
        let mut candidate_buckets = classification.matched_groups();
        if candidate_buckets.is_empty() {
            candidate_buckets = SkillGroup::PRECEDENCE.to_vec();
        }

        let schema = candidate_buckets
            .iter()
            .map(|&group| BucketSchema {
                skill_group: group,
                issues: taxonomy
                    .categories_in(group)
                    .map(|c| IssueSummary {
                        code: c.code.clone(),
                        name: c.name.clone(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            ticket_text: text.to_owned(),
            candidate_buckets,
            rule_scores: classification.scores.clone(),
            schema,
        }
    }

    pub fn is_candidate(&self, group: SkillGroup) -> bool {
        self.candidate_buckets.contains(&group)
    }
}

/// An external reasoning service that can settle ambiguous tickets.
///
/// Calls block; run them on a blocking thread from async code.
pub trait Reasoner: Send + Sync {
    /// Short name for logs and events.
    fn name(&self) -> &str;

    fn reason(&self, request: &EscalationRequest) -> Result<ReasonerResponse, EscalationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::taxonomy::test_support::{category, snapshot};

    fn taxonomy() -> TaxonomySnapshot {
        snapshot(vec![
            category("lift_breakdown", SkillGroup::Vendor, &["lift"]),
            category("ac_breakdown", SkillGroup::Technical, &["ac", "cooling"]),
            category("power_outage", SkillGroup::Technical, &["power"]),
            category("water_leakage", SkillGroup::Plumbing, &["leak"]),
        ])
    }

    #[test]
    fn test_request_candidates_follow_scores() {
        let taxonomy = taxonomy();
        let text = "ac cooling near the lift";
        let request = EscalationRequest::new(text, &classify(text, &taxonomy), &taxonomy);
        assert_eq!(
            request.candidate_buckets,
            vec![SkillGroup::Technical, SkillGroup::Vendor]
        );
        assert_eq!(request.schema.len(), 2);
        assert_eq!(request.schema[0].issues.len(), 2);
        assert!(!request.is_candidate(SkillGroup::Plumbing));
    }

    #[test]
    fn test_unmatched_request_offers_every_bucket() {
        let taxonomy = taxonomy();
        let text = "strange noise";
        let request = EscalationRequest::new(text, &classify(text, &taxonomy), &taxonomy);
        assert_eq!(request.candidate_buckets, SkillGroup::PRECEDENCE.to_vec());
    }

    #[test]
    fn test_priority_accepts_lowercase() {
        let priority: Priority = serde_json::from_str("\"urgent\"").unwrap();
        assert_eq!(priority, Priority::Urgent);
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"High\"");
    }
}
