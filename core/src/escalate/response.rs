use super::{EscalationError, EscalationRequest, Priority, ReasonerAnswer};
use crate::classify::Classification;
use crate::taxonomy::{SkillGroup, TaxonomySnapshot};
use serde::{Deserialize, Serialize};

/// Locate the JSON object in reasoner output.
///
/// Handles ```json fences, bare fences, a bare object, and an object
/// surrounded by prose.
pub fn extract_json(output: &str) -> Result<&str, EscalationError> {
    let trimmed = output.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_marker = &trimmed[start + 7..];
        return Ok(after_marker
            .find("```")
            .map_or(after_marker, |end| &after_marker[..end])
            .trim());
    }

    if let Some(start) = trimmed.find("```") {
        let after_marker = &trimmed[start + 3..];
        let after_newline = after_marker
            .find('\n')
            .map_or(after_marker, |i| &after_marker[i + 1..]);
        return Ok(after_newline
            .find("```")
            .map_or(after_newline, |end| &after_newline[..end])
            .trim());
    }

    if trimmed.starts_with('{') {
        return Ok(trimmed);
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => Ok(&trimmed[start..=end]),
        (Some(_), _) => Err(EscalationError::Parse(
            "Could not find complete JSON object".to_owned(),
        )),
        _ => Err(EscalationError::Parse(format!(
            "No JSON found in output: {}",
            truncate(trimmed, 200)
        ))),
    }
}

/// Extract and deserialize a [`ReasonerAnswer`].
pub fn parse_answer(output: &str) -> Result<ReasonerAnswer, EscalationError> {
    if output.trim().is_empty() {
        return Err(EscalationError::EmptyResponse);
    }
    let json_str = extract_json(output)?;
    serde_json::from_str(json_str).map_err(|e| {
        EscalationError::Parse(format!(
            "JSON parse error: {e}. Input: {}",
            truncate(json_str, 500)
        ))
    })
}

fn truncate(s: &str, max_chars: usize) -> &str {
    s.char_indices()
        .nth(max_chars)
        .map_or(s, |(i, _)| &s[..i])
}

/// A reasoner answer that passed every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedAnswer {
    pub skill_group: SkillGroup,
    /// Named by the reasoner, or else the rule engine's best issue in the
    /// chosen group.
    pub issue_code: Option<String>,
    pub secondary_group: Option<SkillGroup>,
    pub priority: Priority,
    pub risk_flag: Option<String>,
    pub reasoning: String,
}

/// Check an answer against the request and the taxonomy.
///
/// The primary category must be one of the candidate buckets. An issue code,
/// if given, must exist in that bucket. An unusable secondary category is
/// dropped rather than failing the answer.
pub fn validate_answer(
    answer: &ReasonerAnswer,
    request: &EscalationRequest,
    classification: &Classification,
    taxonomy: &TaxonomySnapshot,
) -> Result<ValidatedAnswer, EscalationError> {
    let skill_group: SkillGroup = answer.primary_category.parse().map_err(|_| {
        EscalationError::Rejected(format!(
            "unknown bucket '{}'",
            answer.primary_category
        ))
    })?;
    if !request.is_candidate(skill_group) {
        return Err(EscalationError::Rejected(format!(
            "bucket '{skill_group}' is not among the candidates"
        )));
    }

    let issue_code = match answer
        .issue_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        Some(code) => match taxonomy.category(code) {
            Some(category) if category.skill_group == skill_group => Some(code.to_owned()),
            Some(category) => {
                return Err(EscalationError::Rejected(format!(
                    "issue '{code}' belongs to {}, not {skill_group}",
                    category.skill_group
                )))
            }
            None => {
                return Err(EscalationError::Rejected(format!(
                    "unknown issue code '{code}'"
                )))
            }
        },
        None => classification
            .candidate(skill_group)
            .and_then(|c| c.issue_code.clone()),
    };

    let secondary_group = answer
        .secondary_category
        .as_deref()
        .and_then(|s| s.parse::<SkillGroup>().ok())
        .filter(|&group| group != skill_group && request.is_candidate(group));

    Ok(ValidatedAnswer {
        skill_group,
        issue_code,
        secondary_group,
        priority: answer.priority,
        risk_flag: answer
            .risk_flag
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(ToOwned::to_owned),
        reasoning: answer.reasoning.clone(),
    })
}
