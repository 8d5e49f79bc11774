use super::{open_provider, print_json};
use crate::cli::OutputFormat;
use crate::config::TriageConfig;
use crate::taxonomy::SkillGroup;
use colored::Colorize;

pub fn run(
    config: &TriageConfig,
    skill_group: Option<&str>,
    format: OutputFormat,
) -> Result<(), String> {
    let groups: Vec<SkillGroup> = match skill_group {
        Some(name) => vec![name.parse::<SkillGroup>().map_err(|e| e.to_string())?],
        None => SkillGroup::PRECEDENCE.to_vec(),
    };

    let provider = open_provider(config)?;
    let taxonomy = provider.get_taxonomy();

    if format == OutputFormat::Json {
        let output: Vec<_> = groups
            .iter()
            .map(|&group| {
                serde_json::json!({
                    "skill_group": group,
                    "name": group.display_name(),
                    "categories": taxonomy.categories_in(group).collect::<Vec<_>>(),
                })
            })
            .collect();
        return print_json(&serde_json::json!({
            "origin": taxonomy.origin().to_string(),
            "fingerprint": taxonomy.fingerprint(),
            "skill_groups": output,
        }));
    }

    println!(
        "{} {} ({} categories, {} keywords)",
        "Source:".bold(),
        taxonomy.origin(),
        taxonomy.len(),
        taxonomy.keyword_count()
    );

    for group in groups {
        println!();
        println!("{}", group.display_name().bold().cyan());

        let mut any = false;
        for category in taxonomy.categories_in(group) {
            any = true;
            println!("  {} {}", category.code.green(), category.name.dimmed());
            let keywords: Vec<&str> = category.keywords.iter().map(|k| k.text.as_str()).collect();
            println!("    {}", keywords.join(", "));
        }
        if !any {
            println!("  {}", "(no categories)".dimmed());
        }
    }

    Ok(())
}
