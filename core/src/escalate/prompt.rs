use super::EscalationRequest;
use std::fmt::Write;

const SYSTEM_PROMPT: &str = r#"You are an expert facilities incident triage system.
Your job is to infer the primary cause, secondary contributing factors, correct priority, and safety risks of maintenance tickets.

Rules:
1. Reason about context, negation, time, and cause vs symptom.
2. Pick the PRIMARY category responsible. Use ONLY a code from the Target Categories list.
3. Pick a SECONDARY category from the same list if relevant, otherwise null.
4. If one of the listed issue codes fits, return it as issue_code, otherwise null.
5. Assign priority: Low | Medium | High | Urgent.
6. Flag safety risks explicitly (e.g. "Fire risk", "Safety exposure"), otherwise null.
7. Give a concise one-line reasoning.

Respond ONLY with a JSON object:
{"primary_category": "...", "secondary_category": null, "issue_code": null, "priority": "Medium", "risk_flag": null, "reasoning": "..."}"#;

pub fn build_system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

/// Ticket text, candidate buckets with their issue codes, and rule scores.
pub fn build_user_prompt(request: &EscalationRequest) -> String {
    let buckets: Vec<&str> = request
        .candidate_buckets
        .iter()
        .map(|group| group.as_str())
        .collect();

    let mut schema = String::new();
    for bucket in &request.schema {
        let _ = writeln!(
            schema,
            "- `{}` ({})",
            bucket.skill_group,
            bucket.skill_group.display_name()
        );
        for issue in &bucket.issues {
            let _ = writeln!(schema, "  - `{}`: {}", issue.code, issue.name);
        }
    }

    let scores = request
        .rule_scores
        .iter()
        .map(|(group, score)| format!("{group}={score}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"Target Categories: {buckets}

Issue codes per category:
{schema}
Ticket Description:
"{ticket}"

Rule Engine Context:
Scores: {scores}

Analyze the situation and return structured JSON."#,
        buckets = serde_json::to_string(&buckets).unwrap_or_default(),
        schema = schema,
        ticket = request.ticket_text,
        scores = scores
    )
}

/// Single-string form for reasoners without a system role.
pub fn build_prompt(request: &EscalationRequest) -> String {
    format!("{}\n\n{}", build_system_prompt(), build_user_prompt(request))
}
