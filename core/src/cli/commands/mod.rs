pub mod batch;
pub mod classify;
pub mod keywords;
pub mod seed;
pub mod taxonomy;

use crate::config::TriageConfig;
use crate::error::AppError;
use crate::resolver::HybridClassifier;
use crate::taxonomy::{TaxonomyAdmin, TaxonomyProvider};
use std::path::Path;
use std::sync::Arc;

/// Load the config file given on the command line, or the default one.
pub(crate) fn load_config(path: Option<&str>) -> Result<TriageConfig, String> {
    TriageConfig::load(path.map(Path::new)).map_err(|e| AppError::from(e).into())
}

/// Read-side provider: the store is consulted only if it already exists.
fn open_provider(config: &TriageConfig) -> Result<Arc<TaxonomyProvider>, String> {
    let store = config.existing_store()?;
    Ok(Arc::new(config.build_provider(store)))
}

fn open_classifier(mut config: TriageConfig, rules_only: bool) -> Result<HybridClassifier, String> {
    if rules_only {
        config.escalation.enabled = false;
    }
    let provider = open_provider(&config)?;
    Ok(config.build_classifier(provider)?)
}

/// Write-side handle: creates the store file if needed.
fn open_admin(config: &TriageConfig) -> Result<TaxonomyAdmin, String> {
    let store = config.open_store()?;
    let provider = Arc::new(config.build_provider(Some(Arc::clone(&store))));
    Ok(TaxonomyAdmin::new(store, provider))
}

/// Serialize a value as pretty-printed JSON and print it to stdout.
fn print_json(value: &impl serde::Serialize) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}
