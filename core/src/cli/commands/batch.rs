use super::{open_classifier, print_json};
use crate::cli::OutputFormat;
use crate::config::TriageConfig;
use crate::resolver::{DecisionSource, TicketInput};
use colored::Colorize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

pub fn run(
    config: TriageConfig,
    file: &str,
    concurrency: Option<usize>,
    rules_only: bool,
    audit: Option<&str>,
    format: OutputFormat,
) -> Result<(), String> {
    let tickets = read_tickets(Path::new(file))?;
    if tickets.is_empty() {
        if format == OutputFormat::Json {
            return print_json(&serde_json::json!({"message": "No tickets", "classified": 0}));
        }
        println!("No tickets in {file}");
        return Ok(());
    }

    let concurrency = concurrency.unwrap_or(config.escalation.max_concurrent);
    let classifier = Arc::new(open_classifier(config, rules_only)?);

    let total = tickets.len();
    let show_progress = format == OutputFormat::Text;
    if show_progress {
        println!("Classifying {} ticket(s)...", total.to_string().cyan());
    }

    let rt = tokio::runtime::Runtime::new().map_err(|e| e.to_string())?;
    let report = rt.block_on(async {
        classifier
            .resolve_batched(tickets, concurrency, move |resolved| {
                if show_progress {
                    eprintln!("  {} -> {}", resolved.ticket_id, resolved.result.skill_group);
                }
            })
            .await
    });
    classifier.flush_events();

    if let Some(path) = audit {
        write_audit(Path::new(path), &report.resolved)?;
    }

    if format == OutputFormat::Json {
        let entries: Vec<_> = report.resolved.iter().map(|r| r.log_entry()).collect();
        return print_json(&serde_json::json!({
            "classified": entries.len(),
            "errors": report.errors,
            "results": entries,
        }));
    }

    let mut by_group: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_source: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut review_count = 0;
    for resolved in &report.resolved {
        *by_group
            .entry(resolved.result.skill_group.display_name().to_owned())
            .or_default() += 1;
        *by_source
            .entry(resolved.decision_source.as_str())
            .or_default() += 1;
        if resolved.analysis.needs_human_review {
            review_count += 1;
        }
    }

    println!();
    for (group, count) in &by_group {
        println!("  {} {count}", format!("{group:<16}").bold());
    }
    println!();
    for (source, count) in &by_source {
        let label = format!("{source:<16}");
        let label = if *source == DecisionSource::Llm.as_str() {
            label.cyan()
        } else {
            label.normal()
        };
        println!("  {label} {count}");
    }
    if review_count > 0 {
        println!("{} ticket(s) flagged for human review", review_count.to_string().yellow());
    }
    for error in &report.errors {
        println!("{} {error}", "✗".red());
    }
    println!(
        "{} Classified {}/{total} ticket(s)",
        "✓".green(),
        report.resolved.len()
    );

    Ok(())
}

/// Parse a JSONL ticket file. Blank lines are skipped.
fn read_tickets(path: &Path) -> Result<Vec<TicketInput>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    parse_tickets(&content)
}

fn parse_tickets(content: &str) -> Result<Vec<TicketInput>, String> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| format!("Line {}: {e}", i + 1))
        })
        .collect()
}

fn write_audit(
    path: &Path,
    resolved: &[crate::resolver::ResolvedClassification],
) -> Result<(), String> {
    let mut file = std::fs::File::create(path)
        .map_err(|e| format!("Failed to create {}: {e}", path.display()))?;
    for entry in resolved.iter().map(|r| r.log_entry()) {
        let line = serde_json::to_string(&entry).map_err(|e| e.to_string())?;
        writeln!(file, "{line}").map_err(|e| e.to_string())?;
    }
    Ok(())
}
