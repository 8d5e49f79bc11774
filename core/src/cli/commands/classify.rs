use super::{open_classifier, print_json};
use crate::classify::{Confidence, Zone};
use crate::cli::OutputFormat;
use crate::config::TriageConfig;
use crate::resolver::{DecisionSource, ResolvedClassification, TicketInput};
use crate::taxonomy::dictionary::issue_display_name;
use colored::Colorize;

pub fn run(
    config: TriageConfig,
    ticket_id: &str,
    title: &str,
    description: &str,
    rules_only: bool,
    format: OutputFormat,
) -> Result<(), String> {
    let classifier = open_classifier(config, rules_only)?;
    let resolved = classifier.resolve(&TicketInput::new(ticket_id, title, description));
    classifier.flush_events();

    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "result": resolved.result,
            "decision_source": resolved.decision_source,
            "zone": resolved.analysis.zone,
            "zone_reason": resolved.analysis.reason.to_string(),
            "needs_human_review": resolved.analysis.needs_human_review,
            "matched_keywords": resolved.rule.matched_keywords(),
            "scores": resolved.rule.scores,
            "margin": resolved.rule.margin,
            "entropy": resolved.analysis.entropy,
            "priority": resolved.priority(),
            "risk_flag": resolved.risk_flag(),
            "escalation": resolved.escalation,
            "taxonomy_origin": resolved.taxonomy_origin.to_string(),
        }));
    }

    print_resolution(&resolved);
    Ok(())
}

fn print_resolution(resolved: &ResolvedClassification) {
    let result = &resolved.result;
    let confidence = match result.confidence {
        Confidence::High => "high".green(),
        Confidence::Low => "low".yellow(),
    };
    println!(
        "{} {} ({confidence} confidence)",
        "Skill group:".bold(),
        result.skill_group.display_name().cyan()
    );
    match &result.issue_code {
        Some(code) => println!("{} {} {}", "Issue:".bold(), issue_display_name(code), code.dimmed()),
        None => println!("{} {}", "Issue:".bold(), "none matched".dimmed()),
    }

    let zone = match resolved.analysis.zone {
        Zone::A => "A".green(),
        Zone::B => "B".yellow(),
        Zone::C => "C".red(),
    };
    println!(
        "{} {zone} {}",
        "Zone:".bold(),
        format!("({})", resolved.analysis.reason).dimmed()
    );

    let keywords = resolved.rule.matched_keywords();
    if !keywords.is_empty() {
        println!("{} {}", "Matched:".bold(), keywords.join(", "));
    }
    let scores: Vec<String> = resolved
        .rule
        .scores
        .iter()
        .map(|(group, score)| format!("{group}={score}"))
        .collect();
    println!("{} {}", "Scores:".bold(), scores.join(" ").dimmed());

    let source = match resolved.decision_source {
        DecisionSource::Rule => "rules".normal(),
        DecisionSource::Llm => "reasoner".cyan(),
        DecisionSource::RuleFallback => "rules (reasoner fallback)".yellow(),
    };
    println!("{} {source}", "Decided by:".bold());

    if let Some(escalation) = &resolved.escalation {
        match (&escalation.answer, &escalation.error) {
            (Some(answer), _) => {
                println!(
                    "  {} priority {}, {} ms",
                    escalation.reasoner.dimmed(),
                    answer.priority,
                    escalation.latency_ms
                );
                if let Some(flag) = &answer.risk_flag {
                    println!("  {} {flag}", "Risk:".red().bold());
                }
                if !answer.reasoning.is_empty() {
                    println!("  {}", answer.reasoning.dimmed());
                }
            }
            (None, Some(error)) => println!("  {} {error}", "Reasoner failed:".yellow()),
            (None, None) => {}
        }
    }

    if resolved.analysis.needs_human_review {
        println!("{}", "Flagged for human review".yellow());
    }
}
