//! End-to-end checks of the classifier through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use triage::taxonomy::dictionary::{self, IssueDictionary};
use triage::taxonomy::{
    SourceChain, SourceError, SqliteStore, TaxonomyAdmin, TaxonomyOrigin, TaxonomySource,
};
use triage::{
    classify_result, ClassificationResult, Confidence, HybridClassifier, SkillGroup,
    TaxonomyProvider, TaxonomySnapshot, TicketInput,
};

fn taxonomy(json: &str) -> TaxonomySnapshot {
    IssueDictionary::from_json_str(json)
        .unwrap()
        .to_snapshot(TaxonomyOrigin::Primary("test".to_owned()))
}

fn expected(code: &str, group: SkillGroup) -> ClassificationResult {
    ClassificationResult {
        issue_code: Some(code.to_owned()),
        skill_group: group,
        confidence: Confidence::High,
    }
}

#[test]
fn test_ac_ticket_end_to_end() {
    let snapshot = taxonomy(
        r#"{"technical": {"ac_breakdown": ["ac"]}, "plumbing": {"no_water_supply": ["water"]}}"#,
    );
    assert_eq!(
        classify_result("AC is not cooling in conference room", &snapshot),
        expected("ac_breakdown", SkillGroup::Technical)
    );
}

#[test]
fn test_repeated_classification_is_identical() {
    let snapshot = dictionary::bundled().to_snapshot(TaxonomyOrigin::StaticFallback);
    let text = "Lift stuck between floors and the AC is leaking water";
    let first = classify_result(text, &snapshot);
    for _ in 0..10 {
        assert_eq!(classify_result(text, &snapshot), first);
    }
}

#[test]
fn test_text_without_keywords_goes_to_default_bucket() {
    let snapshot = taxonomy(r#"{"plumbing": {"water_leakage": ["leak"]}}"#);
    for text in ["", "   ", "the printer ran out of toner"] {
        assert_eq!(
            classify_result(text, &snapshot),
            ClassificationResult::unmatched(),
            "{text:?}"
        );
    }
}

#[test]
fn test_vendor_beats_technical_with_more_hits() {
    let snapshot = taxonomy(
        r#"{"vendor": {"lift_breakdown": ["lift"]},
            "technical": {"ac_breakdown": ["ac", "cooling", "hvac"]}}"#,
    );
    let result = classify_result("lift dead, ac and hvac cooling gone too", &snapshot);
    assert_eq!(result, expected("lift_breakdown", SkillGroup::Vendor));
}

#[test]
fn test_longer_keyword_wins_equal_counts() {
    let snapshot = taxonomy(
        r#"{"plumbing": {"water_leakage": ["water"], "no_water_supply": ["no water supply"]}}"#,
    );
    assert_eq!(
        classify_result("there is no water supply on floor 3", &snapshot),
        expected("no_water_supply", SkillGroup::Plumbing)
    );
}

#[test]
fn test_more_hits_beat_longer_keyword() {
    let snapshot = taxonomy(
        r#"{"technical": {
              "power_outage": ["complete power failure"],
              "lighting_issue": ["light", "bulb", "dim"]}}"#,
    );
    let result = classify_result(
        "complete power failure? no, one light bulb is dim",
        &snapshot,
    );
    assert_eq!(result, expected("lighting_issue", SkillGroup::Technical));
}

#[test]
fn test_case_does_not_matter() {
    let snapshot = dictionary::bundled().to_snapshot(TaxonomyOrigin::StaticFallback);
    assert_eq!(
        classify_result("AC BREAKDOWN URGENT", &snapshot),
        classify_result("ac breakdown urgent", &snapshot)
    );
}

struct CountingSource {
    snapshot: TaxonomySnapshot,
    fetches: Arc<AtomicUsize>,
}

impl TaxonomySource for CountingSource {
    fn name(&self) -> &str {
        "counting"
    }

    fn fetch(&self) -> Result<TaxonomySnapshot, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.snapshot.clone())
    }
}

#[test]
fn test_cache_serves_same_snapshot_until_invalidated() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let provider = TaxonomyProvider::with_ttl(
        SourceChain::new(vec![Box::new(CountingSource {
            snapshot: taxonomy(r#"{"plumbing": {"water_leakage": ["leak"]}}"#),
            fetches: Arc::clone(&fetches),
        })]),
        Duration::from_secs(60),
    );

    let first = provider.get_taxonomy();
    let second = provider.get_taxonomy();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    provider.invalidate();
    let third = provider.get_taxonomy();
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(*first, *third);
}

struct BrokenSource;

impl TaxonomySource for BrokenSource {
    fn name(&self) -> &str {
        "broken"
    }

    fn fetch(&self) -> Result<TaxonomySnapshot, SourceError> {
        Err(SourceError::Unavailable("connection refused".to_owned()))
    }
}

fn bundled_codes() -> Vec<String> {
    let mut codes: Vec<String> = dictionary::bundled()
        .codes()
        .into_iter()
        .map(ToOwned::to_owned)
        .collect();
    codes.sort();
    codes
}

fn snapshot_codes(snapshot: &TaxonomySnapshot) -> Vec<String> {
    let mut codes: Vec<String> = snapshot.codes().into_iter().map(ToOwned::to_owned).collect();
    codes.sort();
    codes
}

#[test]
fn test_failing_primary_falls_back_to_bundled() {
    let provider = TaxonomyProvider::with_ttl(
        SourceChain::new(vec![Box::new(BrokenSource)]),
        Duration::from_secs(30),
    );
    let snapshot = provider.get_taxonomy();
    assert_eq!(snapshot.origin(), &TaxonomyOrigin::StaticFallback);
    assert_eq!(snapshot_codes(&snapshot), bundled_codes());
}

#[test]
fn test_empty_store_falls_back_then_serves_seeded_rows() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let provider = Arc::new(TaxonomyProvider::with_ttl(
        SourceChain::new(vec![Box::new(Arc::clone(&store))]),
        Duration::from_secs(300),
    ));

    let before = provider.get_taxonomy();
    assert_eq!(before.origin(), &TaxonomyOrigin::StaticFallback);
    assert_eq!(snapshot_codes(&before), bundled_codes());

    let admin = TaxonomyAdmin::new(Arc::clone(&store), Arc::clone(&provider));
    let report = admin.seed(dictionary::bundled()).unwrap();
    assert!(report.errors.is_empty(), "{:?}", report.errors);

    // Seeding invalidated the cache, so the TTL does not delay the switch.
    let after = provider.get_taxonomy();
    assert_eq!(after.origin(), &TaxonomyOrigin::Primary("sqlite".to_owned()));
    assert_eq!(snapshot_codes(&after), bundled_codes());
}

#[test]
fn test_keyword_added_through_admin_is_used_immediately() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let provider = Arc::new(TaxonomyProvider::with_ttl(
        SourceChain::new(vec![Box::new(Arc::clone(&store))]),
        Duration::from_secs(300),
    ));
    let admin = TaxonomyAdmin::new(Arc::clone(&store), Arc::clone(&provider));
    admin.seed(dictionary::bundled()).unwrap();

    let classifier = HybridClassifier::new(Arc::clone(&provider));
    let ticket = TicketInput::new("T-100", "Gurgling", "strange gurgling sound from the pantry");
    assert_eq!(classifier.resolve(&ticket).result, ClassificationResult::unmatched());

    admin
        .add_keywords(
            "water_leakage",
            &["  GURGLING ".to_owned()],
            triage::taxonomy::MatchType::Contains,
        )
        .unwrap();
    assert_eq!(
        classifier.resolve(&ticket).result,
        expected("water_leakage", SkillGroup::Plumbing)
    );

    admin.set_category_active("water_leakage", false).unwrap();
    assert_eq!(classifier.resolve(&ticket).result, ClassificationResult::unmatched());
}
