//! On-disk configuration.
//!
//! Lives in `~/.triage/` (or `$TRIAGE_HOME`):
//!
//! ```text
//! ~/.triage/
//!   config.json     # TriageConfig, every field optional
//!   taxonomy.db     # default SQLite taxonomy store
//! ```
//!
//! `CATEGORIZATION_WEBHOOK_URL`, when set, overrides `webhook.url`.

use crate::classify::EscalationPolicy;
use crate::error::AppError;
use crate::escalate::http::{DEFAULT_API_KEY_ENV, DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::escalate::{CommandReasoner, HttpReasoner, Reasoner};
use crate::events::{EventSink, FanoutSink, LogSink, WebhookSink, WEBHOOK_URL_ENV};
use crate::resolver::HybridClassifier;
use crate::taxonomy::{SourceChain, SqliteStore, StaticSource, TaxonomyProvider, TaxonomySource};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const HOME_ENV: &str = "TRIAGE_HOME";
const CONFIG_FILE: &str = "config.json";
const DATABASE_FILE: &str = "taxonomy.db";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonerKind {
    #[default]
    None,
    Http,
    Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerConfig {
    pub kind: ReasonerKind,
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_ms: u64,
    /// For `kind = "command"`: program and leading arguments.
    pub command: Option<String>,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            kind: ReasonerKind::None,
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            api_key_env: DEFAULT_API_KEY_ENV.to_owned(),
            timeout_ms: 5000,
            command: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub enabled: bool,
    pub margin_threshold: usize,
    pub semantic_signals: bool,
    /// Upper bound on concurrent resolutions in batch mode.
    pub max_concurrent: usize,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        let policy = EscalationPolicy::default();
        Self {
            enabled: true,
            margin_threshold: policy.margin_threshold,
            semantic_signals: policy.semantic_signals,
            max_concurrent: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// SQLite taxonomy store. Defaults to `taxonomy.db` in the triage home.
    pub database_path: Option<PathBuf>,
    /// Dictionary file tried after the store and before the bundled copy.
    pub dictionary_path: Option<PathBuf>,
    pub cache_ttl_secs: u64,
    pub escalation: EscalationConfig,
    pub reasoner: ReasonerConfig,
    pub webhook: WebhookConfig,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            dictionary_path: None,
            cache_ttl_secs: 30,
            escalation: EscalationConfig::default(),
            reasoner: ReasonerConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

/// `$TRIAGE_HOME` if set, otherwise `~/.triage/`.
pub fn triage_home() -> Result<PathBuf, ConfigError> {
    if let Ok(home) = std::env::var(HOME_ENV) {
        return Ok(PathBuf::from(home));
    }
    let home = dirs::home_dir()
        .ok_or_else(|| ConfigError::Invalid("Could not determine home directory".to_owned()))?;
    Ok(home.join(".triage"))
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(triage_home()?.join(CONFIG_FILE))
}

impl TriageConfig {
    /// Load from `path`, or from the default location. A missing file yields
    /// defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path()?,
        };
        let mut config = if path.exists() {
            Self::from_path(&path)?
        } else {
            log::debug!("[TriageConfig::load] {} not found, using defaults", path.display());
            Self::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply environment overrides, reading variables through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(WEBHOOK_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.webhook.url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reasoner.kind == ReasonerKind::Command
            && self
                .reasoner
                .command
                .as_deref()
                .is_none_or(|c| c.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "reasoner.kind is \"command\" but reasoner.command is empty".to_owned(),
            ));
        }
        if self.reasoner.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "reasoner.timeout_ms must be positive".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn escalation_policy(&self) -> EscalationPolicy {
        EscalationPolicy {
            margin_threshold: self.escalation.margin_threshold,
            semantic_signals: self.escalation.semantic_signals,
        }
    }

    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(triage_home()?.join(DATABASE_FILE)),
        }
    }

    /// Open (creating if needed) the configured store, for administration.
    pub fn open_store(&self) -> Result<Arc<SqliteStore>, AppError> {
        let path = self.database_path()?;
        Ok(Arc::new(SqliteStore::open(&path)?))
    }

    /// Open the store only if its file already exists.
    pub fn existing_store(&self) -> Result<Option<Arc<SqliteStore>>, AppError> {
        let path = self.database_path()?;
        if !path.exists() {
            log::debug!(
                "[TriageConfig::existing_store] No database at {}",
                path.display()
            );
            return Ok(None);
        }
        Ok(Some(Arc::new(SqliteStore::open(&path)?)))
    }

    /// Source chain: store (if any), dictionary file (if configured), then
    /// the bundled dictionary.
    pub fn build_provider(&self, store: Option<Arc<SqliteStore>>) -> TaxonomyProvider {
        let mut sources: Vec<Box<dyn TaxonomySource>> = Vec::new();
        if let Some(store) = store {
            sources.push(Box::new(store));
        }
        if let Some(path) = &self.dictionary_path {
            sources.push(Box::new(StaticSource::from_path(path.clone())));
        }
        TaxonomyProvider::with_ttl(SourceChain::new(sources), self.cache_ttl())
    }

    pub fn build_reasoner(&self) -> Result<Option<Arc<dyn Reasoner>>, AppError> {
        if !self.escalation.enabled {
            return Ok(None);
        }
        let timeout = Duration::from_millis(self.reasoner.timeout_ms);
        let reasoner: Arc<dyn Reasoner> = match self.reasoner.kind {
            ReasonerKind::None => return Ok(None),
            ReasonerKind::Http => Arc::new(HttpReasoner::new(
                self.reasoner.endpoint.clone(),
                self.reasoner.model.clone(),
                self.reasoner.api_key_env.clone(),
                timeout,
            )?),
            ReasonerKind::Command => Arc::new(CommandReasoner::new(
                self.reasoner.command.as_deref().unwrap_or_default(),
                timeout,
            )?),
        };
        Ok(Some(reasoner))
    }

    /// Log sink, plus a webhook sink when a URL is configured.
    pub fn build_sink(&self) -> Result<Arc<dyn EventSink>, AppError> {
        let Some(url) = self.webhook.url.as_deref() else {
            return Ok(Arc::new(LogSink));
        };
        let webhook = WebhookSink::new(url, Duration::from_millis(self.webhook.timeout_ms))
            .map_err(|e| AppError::config(format!("Webhook client: {e}")))?;
        Ok(Arc::new(FanoutSink::new(vec![
            Arc::new(LogSink),
            Arc::new(webhook),
        ])))
    }

    pub fn build_classifier(&self, provider: Arc<TaxonomyProvider>) -> Result<HybridClassifier, AppError> {
        let mut classifier = HybridClassifier::new(provider)
            .with_sink(self.build_sink()?)
            .with_policy(self.escalation_policy());
        if let Some(reasoner) = self.build_reasoner()? {
            classifier = classifier.with_reasoner(reasoner);
        }
        Ok(classifier)
    }
}
