//! Triage library - keyword classification of facilities maintenance tickets.
//!
//! This crate provides:
//! - The issue taxonomy, its sources, SQLite store and TTL cache (`taxonomy`)
//! - The deterministic keyword engine and confidence analysis (`classify`)
//! - Escalation of ambiguous tickets to an external reasoner (`escalate`)
//! - Categorization events and sinks (`events`)
//! - Hybrid rule + reasoner resolution with audit records (`resolver`)
//! - On-disk configuration (`config`)
//!
//! Feature flags:
//! - `cli`: Command-line interface

// Core modules (always compiled)
pub mod classify;
pub mod config;
pub mod error;
pub mod escalate;
pub mod events;
pub mod resolver;
pub mod taxonomy;

// CLI module (feature-gated)
#[cfg(feature = "cli")]
pub mod cli;

// Re-export commonly used types
pub use classify::{classify, classify_result, Classification, ClassificationResult, Confidence};
pub use resolver::{HybridClassifier, ResolvedClassification, TicketInput};
pub use taxonomy::{SkillGroup, TaxonomyProvider, TaxonomySnapshot};
