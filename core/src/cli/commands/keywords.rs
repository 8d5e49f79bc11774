use super::{open_admin, print_json};
use crate::cli::{KeywordAction, OutputFormat};
use crate::config::TriageConfig;
use crate::error::AppError;
use crate::taxonomy::MatchType;
use colored::Colorize;

pub fn run(config: &TriageConfig, action: KeywordAction, format: OutputFormat) -> Result<(), String> {
    let admin = open_admin(config)?;

    match action {
        KeywordAction::Add {
            category,
            keywords,
            match_type,
        } => {
            let match_type: MatchType = match_type.parse()?;
            let inserted = admin
                .add_keywords(&category, &keywords, match_type)
                .map_err(AppError::from)?;
            if format == OutputFormat::Json {
                return print_json(&inserted);
            }
            if inserted.is_empty() {
                println!("No new keywords for {category}");
            }
            for record in &inserted {
                println!(
                    "{} {} {}",
                    "✓".green(),
                    record.keyword,
                    format!("(id {})", record.id).dimmed()
                );
            }
        }
        KeywordAction::Remove { category, keyword } => {
            admin
                .remove_keyword(&category, &keyword)
                .map_err(AppError::from)?;
            report(format, &format!("Removed '{keyword}' from {category}"))?;
        }
        KeywordAction::RemoveId { id } => {
            admin.remove_keyword_by_id(id).map_err(AppError::from)?;
            report(format, &format!("Removed keyword {id}"))?;
        }
        KeywordAction::SetMatchType { id, match_type } => {
            let match_type: MatchType = match_type.parse()?;
            let record = admin
                .update_match_type(id, match_type)
                .map_err(AppError::from)?;
            if format == OutputFormat::Json {
                return print_json(&record);
            }
            println!(
                "{} '{}' now matches by {}",
                "✓".green(),
                record.keyword,
                record.match_type
            );
        }
    }

    Ok(())
}

pub fn set_active(
    config: &TriageConfig,
    code: &str,
    active: bool,
    format: OutputFormat,
) -> Result<(), String> {
    let admin = open_admin(config)?;
    admin
        .set_category_active(code, active)
        .map_err(AppError::from)?;
    let verb = if active { "Enabled" } else { "Disabled" };
    report(format, &format!("{verb} {code}"))
}

fn report(format: OutputFormat, message: &str) -> Result<(), String> {
    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({ "message": message }));
    }
    println!("{} {message}", "✓".green());
    Ok(())
}
