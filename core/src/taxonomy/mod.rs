//! Issue taxonomy: skill groups, issue categories and their keywords.
//!
//! A [`TaxonomySnapshot`] is the immutable, point-in-time view that a single
//! classification call works against. Snapshots are produced by a
//! [`TaxonomySource`](source::TaxonomySource) and handed out by the
//! [`TaxonomyProvider`](provider::TaxonomyProvider), which caches them.

pub mod admin;
pub mod cache;
pub mod dictionary;
pub mod provider;
pub mod source;
pub mod sqlite;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

pub use admin::TaxonomyAdmin;
pub use cache::TaxonomyCache;
pub use dictionary::IssueDictionary;
pub use provider::TaxonomyProvider;
pub use source::{SourceChain, SourceError, StaticSource, TaxonomySource};
pub use sqlite::{SqliteStore, StoreError};

/// Responder team that owns a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillGroup {
    Vendor,
    Technical,
    Plumbing,
    SoftServices,
}

impl SkillGroup {
    /// Routing precedence. The first group with a keyword hit claims the ticket.
    pub const PRECEDENCE: [SkillGroup; 4] = [
        SkillGroup::Vendor,
        SkillGroup::Technical,
        SkillGroup::Plumbing,
        SkillGroup::SoftServices,
    ];

    /// Bucket for text that matched nothing.
    pub const DEFAULT: SkillGroup = SkillGroup::Technical;

    pub fn as_str(self) -> &'static str {
        match self {
            SkillGroup::Vendor => "vendor",
            SkillGroup::Technical => "technical",
            SkillGroup::Plumbing => "plumbing",
            SkillGroup::SoftServices => "soft_services",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SkillGroup::Vendor => "Vendor",
            SkillGroup::Technical => "Technical",
            SkillGroup::Plumbing => "Plumbing",
            SkillGroup::SoftServices => "Soft Services",
        }
    }

    /// Position in [`SkillGroup::PRECEDENCE`] (0 = highest).
    pub fn precedence_rank(self) -> usize {
        match self {
            SkillGroup::Vendor => 0,
            SkillGroup::Technical => 1,
            SkillGroup::Plumbing => 2,
            SkillGroup::SoftServices => 3,
        }
    }
}

impl fmt::Display for SkillGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown skill group: {0}")]
pub struct UnknownSkillGroup(pub String);

impl FromStr for SkillGroup {
    type Err = UnknownSkillGroup;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vendor" => Ok(SkillGroup::Vendor),
            "technical" => Ok(SkillGroup::Technical),
            "plumbing" => Ok(SkillGroup::Plumbing),
            "soft_services" | "soft services" | "soft_service" => Ok(SkillGroup::SoftServices),
            _ => Err(UnknownSkillGroup(s.to_owned())),
        }
    }
}

/// How a keyword is tested against ticket text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Case-insensitive substring test.
    #[default]
    Contains,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchType::Contains => "contains",
        }
    }

    /// Parse a stored match type. Unknown values degrade to `contains`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "contains" | "" => MatchType::Contains,
            other => {
                log::warn!("[MatchType::parse_lenient] Unknown match type '{other}', using contains");
                MatchType::Contains
            }
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "contains" => Ok(MatchType::Contains),
            other => Err(format!("Unsupported match type: {other}")),
        }
    }
}

/// A substring trigger belonging to one issue category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub text: String,
    #[serde(default)]
    pub match_type: MatchType,
}

impl Keyword {
    /// Normalize (lowercase, trim) a keyword. Returns `None` for blank input,
    /// since an empty substring would match every ticket.
    pub fn new(text: &str, match_type: MatchType) -> Option<Self> {
        let normalized = normalize_keyword(text);
        if normalized.is_empty() {
            return None;
        }
        Some(Self {
            text: normalized,
            match_type,
        })
    }

    /// Keyword length in characters; used as the specificity signal.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Lowercase and trim, the same normalization the store applies on write.
pub fn normalize_keyword(text: &str) -> String {
    text.trim().to_lowercase()
}

/// A specific problem type within a skill group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueCategory {
    pub id: String,
    pub code: String,
    pub name: String,
    pub skill_group: SkillGroup,
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "default_active")]
    pub active: bool,
    pub keywords: Vec<Keyword>,
}

fn default_active() -> bool {
    true
}

/// Where a snapshot came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "source", rename_all = "snake_case")]
pub enum TaxonomyOrigin {
    /// A configured source, named by [`TaxonomySource::name`].
    Primary(String),
    /// The dictionary bundled with the crate.
    StaticFallback,
}

impl fmt::Display for TaxonomyOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaxonomyOrigin::Primary(name) => write!(f, "primary:{name}"),
            TaxonomyOrigin::StaticFallback => f.write_str("static_fallback"),
        }
    }
}

/// Immutable view of all active categories and their keywords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxonomySnapshot {
    categories: Vec<IssueCategory>,
    origin: TaxonomyOrigin,
    fingerprint: String,
}

impl TaxonomySnapshot {
    /// Build a snapshot. Inactive categories are dropped and the rest are
    /// ordered by skill-group precedence, then issue code, so iteration
    /// order never depends on the source.
    ///
    /// Issue codes are unique within a snapshot: when a code appears more
    /// than once, only the copy in the highest-precedence group is kept.
    pub fn new(categories: Vec<IssueCategory>, origin: TaxonomyOrigin) -> Self {
        let mut categories: Vec<IssueCategory> =
            categories.into_iter().filter(|c| c.active).collect();
        categories.sort_by(|a, b| {
            a.skill_group
                .precedence_rank()
                .cmp(&b.skill_group.precedence_rank())
                .then_with(|| a.code.cmp(&b.code))
        });
        let mut seen = HashSet::new();
        categories.retain(|c| {
            let first = seen.insert(c.code.clone());
            if !first {
                log::warn!(
                    "[TaxonomySnapshot::new] Duplicate issue code '{}' in {}, ignored",
                    c.code,
                    c.skill_group
                );
            }
            first
        });
        let fingerprint = compute_fingerprint(&categories);
        Self {
            categories,
            origin,
            fingerprint,
        }
    }

    pub fn categories(&self) -> &[IssueCategory] {
        &self.categories
    }

    pub fn categories_in(&self, group: SkillGroup) -> impl Iterator<Item = &IssueCategory> {
        self.categories.iter().filter(move |c| c.skill_group == group)
    }

    pub fn category(&self, code: &str) -> Option<&IssueCategory> {
        self.categories.iter().find(|c| c.code == code)
    }

    pub fn origin(&self) -> &TaxonomyOrigin {
        &self.origin
    }

    /// Same content, attributed to `origin`.
    #[must_use]
    pub fn with_origin(mut self, origin: TaxonomyOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// SHA-256 hex digest of the normalized content.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn keyword_count(&self) -> usize {
        self.categories.iter().map(|c| c.keywords.len()).sum()
    }

    /// Issue codes, in snapshot order.
    pub fn codes(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.code.as_str()).collect()
    }
}

fn compute_fingerprint(categories: &[IssueCategory]) -> String {
    let mut hasher = Sha256::new();
    for category in categories {
        hasher.update(category.skill_group.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(category.code.as_bytes());
        hasher.update([0]);
        for keyword in &category.keywords {
            hasher.update(keyword.match_type.as_str().as_bytes());
            hasher.update([b':']);
            hasher.update(keyword.text.as_bytes());
            hasher.update([0]);
        }
        hasher.update([1]);
    }
    hex::encode(hasher.finalize())
}
