use super::{open_admin, print_json};
use crate::cli::OutputFormat;
use crate::config::TriageConfig;
use crate::error::AppError;
use crate::taxonomy::dictionary;
use crate::taxonomy::IssueDictionary;
use colored::Colorize;
use std::path::Path;

pub fn run(
    config: &TriageConfig,
    status_only: bool,
    dictionary_path: Option<&str>,
    format: OutputFormat,
) -> Result<(), String> {
    let dictionary = match dictionary_path {
        Some(path) => IssueDictionary::from_path(Path::new(path)).map_err(AppError::from)?,
        None => dictionary::bundled().clone(),
    };
    let admin = open_admin(config)?;

    if status_only {
        let status = admin.seed_status(&dictionary).map_err(AppError::from)?;
        if format == OutputFormat::Json {
            return print_json(&status);
        }
        let label = if status.is_seeded {
            "seeded".green()
        } else {
            "not seeded".yellow()
        };
        println!(
            "Store is {label}: {} stored categories, {} in dictionary",
            status.stored_categories, status.dictionary_categories
        );
        return Ok(());
    }

    let report = admin.seed(&dictionary).map_err(AppError::from)?;

    if format == OutputFormat::Json {
        return print_json(&report);
    }

    println!(
        "{} Seeded: {} skill group(s), {} categor(ies), {} keyword(s)",
        "✓".green(),
        report.skill_groups_created,
        report.categories_created,
        report.keywords_created
    );
    for error in &report.errors {
        println!("  {} {error}", "✗".red());
    }

    Ok(())
}
