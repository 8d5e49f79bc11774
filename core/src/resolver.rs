//! Hybrid resolution: rules first, reasoner for ambiguous tickets.
//!
//! [`HybridClassifier`] wires the taxonomy provider, the pure engine, the
//! confidence analysis, an optional [`Reasoner`] and an [`EventSink`]. A
//! reasoner failure or a rejected answer never fails resolution: the rule
//! result is kept and the failure is recorded.

use crate::classify::{
    analyze, classify, Classification, ClassificationResult, Confidence, ConfidenceAnalysis,
    EscalationPolicy, Zone,
};
use crate::escalate::{
    validate_answer, EscalationRequest, Priority, Reasoner, TokenUsage, ValidatedAnswer,
};
use crate::events::{ClassificationEvent, EventKind, EventSink, LogSink};
use crate::taxonomy::{SkillGroup, TaxonomyOrigin, TaxonomyProvider, TaxonomySnapshot};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// A ticket as submitted: classification runs on `title + " " + description`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketInput {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl TicketInput {
    pub fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.description).trim().to_owned()
    }
}

/// Who made the final call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Rule,
    Llm,
    /// The reasoner was asked but failed or was overruled; the rule result stands.
    RuleFallback,
}

impl DecisionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionSource::Rule => "rule",
            DecisionSource::Llm => "llm",
            DecisionSource::RuleFallback => "rule_fallback",
        }
    }
}

/// What happened when the reasoner was asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationOutcome {
    pub reasoner: String,
    pub answer: Option<ValidatedAnswer>,
    pub error: Option<String>,
    pub latency_ms: u64,
    pub usage: Option<TokenUsage>,
}

impl EscalationOutcome {
    pub fn succeeded(&self) -> bool {
        self.answer.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedClassification {
    pub ticket_id: String,
    pub rule: Classification,
    pub analysis: ConfidenceAnalysis,
    pub escalation: Option<EscalationOutcome>,
    pub result: ClassificationResult,
    pub decision_source: DecisionSource,
    pub taxonomy_origin: TaxonomyOrigin,
    pub taxonomy_fingerprint: String,
}

impl ResolvedClassification {
    pub fn priority(&self) -> Option<Priority> {
        self.accepted_answer().map(|a| a.priority)
    }

    pub fn risk_flag(&self) -> Option<&str> {
        self.accepted_answer().and_then(|a| a.risk_flag.as_deref())
    }

    fn accepted_answer(&self) -> Option<&ValidatedAnswer> {
        self.escalation.as_ref().and_then(|e| e.answer.as_ref())
    }

    /// Audit record for this resolution.
    pub fn log_entry(&self) -> ClassificationLogEntry {
        let escalation = self.escalation.as_ref();
        ClassificationLogEntry {
            ticket_id: self.ticket_id.clone(),
            matched_keywords: self
                .rule
                .matched_keywords()
                .into_iter()
                .map(ToOwned::to_owned)
                .collect(),
            rule_result: self.rule.result.clone(),
            scores: self.rule.scores.clone(),
            margin: self.rule.margin,
            zone: self.analysis.zone,
            zone_reason: self.analysis.reason.to_string(),
            llm_used: escalation.is_some(),
            llm_answer: escalation.and_then(|e| e.answer.clone()),
            llm_error: escalation.and_then(|e| e.error.clone()),
            llm_latency_ms: escalation.map(|e| e.latency_ms),
            token_usage: escalation.and_then(|e| e.usage),
            final_result: self.result.clone(),
            decision_source: self.decision_source,
            taxonomy_origin: self.taxonomy_origin.to_string(),
            taxonomy_fingerprint: self.taxonomy_fingerprint.clone(),
            created_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }
}

/// Flat audit record of one classification decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationLogEntry {
    pub ticket_id: String,
    pub matched_keywords: Vec<String>,
    pub rule_result: ClassificationResult,
    pub scores: BTreeMap<SkillGroup, usize>,
    pub margin: usize,
    pub zone: Zone,
    pub zone_reason: String,
    pub llm_used: bool,
    pub llm_answer: Option<ValidatedAnswer>,
    pub llm_error: Option<String>,
    pub llm_latency_ms: Option<u64>,
    pub token_usage: Option<TokenUsage>,
    pub final_result: ClassificationResult,
    pub decision_source: DecisionSource,
    pub taxonomy_origin: String,
    pub taxonomy_fingerprint: String,
    pub created_at: String,
}

/// Outcome of [`HybridClassifier::resolve_batched`], in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub resolved: Vec<ResolvedClassification>,
    pub errors: Vec<String>,
}

pub struct HybridClassifier {
    provider: Arc<TaxonomyProvider>,
    reasoner: Option<Arc<dyn Reasoner>>,
    sink: Arc<dyn EventSink>,
    policy: EscalationPolicy,
}

impl HybridClassifier {
    /// Rules only, events to the log.
    pub fn new(provider: Arc<TaxonomyProvider>) -> Self {
        Self {
            provider,
            reasoner: None,
            sink: Arc::new(LogSink),
            policy: EscalationPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_reasoner(mut self, reasoner: Arc<dyn Reasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: EscalationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn provider(&self) -> &TaxonomyProvider {
        &self.provider
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Rule engine only, against the current snapshot. No events.
    pub fn classify_text(&self, text: &str) -> Classification {
        classify(text, &self.provider.get_taxonomy())
    }

    pub fn resolve(&self, ticket: &TicketInput) -> ResolvedClassification {
        let taxonomy = self.provider.get_taxonomy();
        let text = ticket.text();
        let rule = classify(&text, &taxonomy);
        let analysis = analyze(&rule, &text, &self.policy);

        if rule.is_unmatched() {
            self.emit(
                EventKind::RuleLowConfidence,
                &ticket.id,
                serde_json::json!({
                    "reason": analysis.reason.to_string(),
                    "fallback_skill_group": rule.result.skill_group,
                    "zone": analysis.zone,
                }),
            );
        }

        let escalation = match &self.reasoner {
            Some(reasoner) if analysis.needs_llm => {
                Some(self.escalate(reasoner.as_ref(), ticket, &text, &rule, &analysis, &taxonomy))
            }
            _ => None,
        };

        let (result, decision_source) = match &escalation {
            Some(EscalationOutcome {
                answer: Some(answer),
                ..
            }) => (
                ClassificationResult {
                    issue_code: answer.issue_code.clone(),
                    skill_group: answer.skill_group,
                    confidence: if answer.issue_code.is_some() {
                        Confidence::High
                    } else {
                        Confidence::Low
                    },
                },
                DecisionSource::Llm,
            ),
            Some(_) => (rule.result.clone(), DecisionSource::RuleFallback),
            None => (rule.result.clone(), DecisionSource::Rule),
        };

        self.emit(
            EventKind::TicketCategorized,
            &ticket.id,
            serde_json::json!({
                "issue_code": result.issue_code,
                "skill_group": result.skill_group,
                "confidence": result.confidence,
                "decision_source": decision_source,
                "zone": analysis.zone,
                "matched_keywords": rule.matched_keywords(),
                "taxonomy_origin": taxonomy.origin().to_string(),
            }),
        );

        ResolvedClassification {
            ticket_id: ticket.id.clone(),
            rule,
            analysis,
            escalation,
            result,
            decision_source,
            taxonomy_origin: taxonomy.origin().clone(),
            taxonomy_fingerprint: taxonomy.fingerprint().to_owned(),
        }
    }

    fn escalate(
        &self,
        reasoner: &dyn Reasoner,
        ticket: &TicketInput,
        text: &str,
        rule: &Classification,
        analysis: &ConfidenceAnalysis,
        taxonomy: &TaxonomySnapshot,
    ) -> EscalationOutcome {
        let request = EscalationRequest::new(text, rule, taxonomy);
        let start = Instant::now();

        let (answer, error, latency_ms, usage) = match reasoner.reason(&request) {
            Ok(response) => {
                match validate_answer(&response.answer, &request, rule, taxonomy) {
                    Ok(validated) => (Some(validated), None, response.latency_ms, response.usage),
                    Err(e) => {
                        log::warn!("[HybridClassifier::escalate] Ticket {}: {e}", ticket.id);
                        (None, Some(e.to_string()), response.latency_ms, response.usage)
                    }
                }
            }
            Err(e) => {
                log::warn!(
                    "[HybridClassifier::escalate] {} failed for ticket {}, keeping rule result: {e}",
                    reasoner.name(),
                    ticket.id
                );
                (
                    None,
                    Some(e.to_string()),
                    start.elapsed().as_millis() as u64,
                    None,
                )
            }
        };

        self.emit(
            EventKind::LlmInvoked,
            &ticket.id,
            serde_json::json!({
                "reasoner": reasoner.name(),
                "success": answer.is_some(),
                "zone": analysis.zone,
                "reason": analysis.reason.to_string(),
                "candidates": request.candidate_buckets,
                "primary_category": answer.as_ref().map(|a| a.skill_group),
                "latency_ms": latency_ms,
                "usage": usage,
                "error": error,
            }),
        );

        EscalationOutcome {
            reasoner: reasoner.name().to_owned(),
            answer,
            error,
            latency_ms,
            usage,
        }
    }

    /// Wait for the event sink to deliver what has been emitted so far.
    pub fn flush_events(&self) {
        self.sink.flush();
    }

    fn emit(&self, kind: EventKind, ticket_id: &str, data: serde_json::Value) {
        self.sink
            .emit(&ClassificationEvent::new(kind, ticket_id, data));
    }

    /// Resolve many tickets with at most `max_concurrent` running at once.
    /// `on_complete` is called as each ticket finishes.
    pub async fn resolve_batched<F>(
        self: &Arc<Self>,
        tickets: Vec<TicketInput>,
        max_concurrent: usize,
        on_complete: F,
    ) -> BatchReport
    where
        F: Fn(&ResolvedClassification) + Send + Sync + 'static,
    {
        if tickets.is_empty() {
            return BatchReport::default();
        }

        let max_concurrent = max_concurrent.max(1);
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let on_complete = Arc::new(on_complete);

        log::info!(
            "[HybridClassifier::resolve_batched] Processing {} tickets (max_concurrent={max_concurrent})",
            tickets.len()
        );

        let tasks: Vec<_> = tickets
            .into_iter()
            .map(|ticket| {
                let sem = Arc::clone(&semaphore);
                let classifier = Arc::clone(self);
                let callback = Arc::clone(&on_complete);
                tokio::spawn(async move {
                    let _permit = sem
                        .acquire()
                        .await
                        .map_err(|e| format!("Ticket {}: {e}", ticket.id))?;
                    let id = ticket.id.clone();
                    // Reasoner calls block
                    let resolved = tokio::task::spawn_blocking(move || classifier.resolve(&ticket))
                        .await
                        .map_err(|e| format!("Ticket {id}: task join error: {e}"))?;
                    callback(&resolved);
                    Ok::<_, String>(resolved)
                })
            })
            .collect();

        let mut report = BatchReport::default();
        for result in join_all(tasks).await {
            match result {
                Ok(Ok(resolved)) => report.resolved.push(resolved),
                Ok(Err(e)) => report.errors.push(e),
                Err(e) => report.errors.push(format!("Task join error: {e}")),
            }
        }

        if !report.errors.is_empty() {
            log::error!(
                "[HybridClassifier::resolve_batched] {} ticket(s) failed: {:?}",
                report.errors.len(),
                report.errors
            );
        }
        report
    }
}
