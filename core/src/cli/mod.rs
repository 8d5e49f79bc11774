pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "triage")]
#[command(author, version, about = "Route maintenance tickets to the right team", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.triage/config.json, env: TRIAGE_HOME)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Classify one ticket
    Classify {
        /// Ticket description
        #[arg(required = true)]
        text: Vec<String>,

        /// Ticket title, classified together with the description
        #[arg(long, default_value = "")]
        title: String,

        /// Ticket ID used in events and audit output
        #[arg(long, default_value = "cli")]
        ticket_id: String,

        /// Skip the reasoner even for ambiguous tickets
        #[arg(long)]
        rules_only: bool,
    },

    /// Classify tickets from a JSONL file (one {"id", "title", "description"} per line)
    Batch {
        /// Input file
        file: String,

        /// Maximum concurrent resolutions (default from config)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Skip the reasoner even for ambiguous tickets
        #[arg(long)]
        rules_only: bool,

        /// Write one audit record per ticket to this JSONL file
        #[arg(long)]
        audit: Option<String>,
    },

    /// Show the active taxonomy
    Taxonomy {
        /// Show only one skill group
        #[arg(short, long)]
        skill_group: Option<String>,
    },

    /// Seed the taxonomy store from a dictionary file
    Seed {
        /// Only report whether the store is seeded
        #[arg(long)]
        status: bool,

        /// Dictionary to seed from (defaults to the bundled one)
        #[arg(long)]
        dictionary: Option<String>,
    },

    /// Manage keywords in the taxonomy store
    Keywords {
        #[command(subcommand)]
        action: KeywordAction,
    },

    /// Enable or disable an issue category
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum KeywordAction {
    /// Add keywords to an issue category
    Add {
        /// Issue code (e.g. water_leakage)
        category: String,

        /// Keywords to add
        #[arg(required = true)]
        keywords: Vec<String>,

        /// Match type
        #[arg(long, default_value = "contains")]
        match_type: String,
    },

    /// Remove a keyword from an issue category
    Remove {
        /// Issue code
        category: String,

        /// Keyword to remove
        keyword: String,
    },

    /// Remove a keyword by its ID
    RemoveId { id: i64 },

    /// Change how a keyword is matched
    SetMatchType { id: i64, match_type: String },
}

#[derive(Debug, Subcommand)]
pub enum CategoryAction {
    /// Make an issue category active
    Enable { code: String },

    /// Stop matching an issue category
    Disable { code: String },
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<(), String> {
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Classify {
            text,
            title,
            ticket_id,
            rules_only,
        } => commands::classify::run(
            config,
            &ticket_id,
            &title,
            &text.join(" "),
            rules_only,
            cli.format,
        ),
        Commands::Batch {
            file,
            concurrency,
            rules_only,
            audit,
        } => commands::batch::run(
            config,
            &file,
            concurrency,
            rules_only,
            audit.as_deref(),
            cli.format,
        ),
        Commands::Taxonomy { skill_group } => {
            commands::taxonomy::run(&config, skill_group.as_deref(), cli.format)
        }
        Commands::Seed { status, dictionary } => {
            commands::seed::run(&config, status, dictionary.as_deref(), cli.format)
        }
        Commands::Keywords { action } => commands::keywords::run(&config, action, cli.format),
        Commands::Category { action } => {
            let (code, active) = match action {
                CategoryAction::Enable { code } => (code, true),
                CategoryAction::Disable { code } => (code, false),
            };
            commands::keywords::set_active(&config, &code, active, cli.format)
        }
    }
}
