//! Deterministic keyword classifier.
//!
//! Pure function of `(text, snapshot)`: no I/O, no shared state. The text is
//! lowercased once and every keyword of every category is tested as a
//! substring. Resolution order:
//!
//! 1. no match: default bucket, `low` confidence
//! 2. first skill group in precedence order with any match
//! 3. within it, the issue code with the most distinct keyword hits
//! 4. tie: the issue whose longest matching keyword is longer
//! 5. still tied: the lexicographically smallest issue code

use super::{Candidate, Classification, ClassificationResult, Confidence, KeywordMatch};
use crate::taxonomy::{SkillGroup, TaxonomySnapshot};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Classify `text` and return the full match detail.
pub fn classify(text: &str, taxonomy: &TaxonomySnapshot) -> Classification {
    let haystack = text.to_lowercase();
    let matches = collect_matches(&haystack, taxonomy);

    let scores: BTreeMap<SkillGroup, usize> = SkillGroup::PRECEDENCE
        .into_iter()
        .map(|group| {
            let hits = matches.iter().filter(|m| m.skill_group == group).count();
            (group, hits)
        })
        .collect();

    let mut candidates: Vec<Candidate> = SkillGroup::PRECEDENCE
        .into_iter()
        .map(|group| Candidate {
            skill_group: group,
            score: scores.get(&group).copied().unwrap_or(0),
            issue_code: best_issue_in_group(&matches, group),
        })
        .collect();
    // Stable: equal scores stay in precedence order.
    candidates.sort_by(|a, b| b.score.cmp(&a.score));

    if matches.is_empty() {
        return Classification {
            result: ClassificationResult::unmatched(),
            matches,
            scores,
            candidates,
            margin: 0,
        };
    }

    let top = candidates.first().map_or(0, |c| c.score);
    let second = candidates.get(1).map_or(0, |c| c.score);

    let result = SkillGroup::PRECEDENCE
        .into_iter()
        .find(|group| scores.get(group).is_some_and(|&hits| hits > 0))
        .map_or_else(ClassificationResult::unmatched, |group| ClassificationResult {
            issue_code: best_issue_in_group(&matches, group),
            skill_group: group,
            confidence: Confidence::High,
        });

    Classification {
        result,
        matches,
        scores,
        candidates,
        margin: top - second,
    }
}

/// Short form of [`classify`]: just the routing decision.
pub fn classify_result(text: &str, taxonomy: &TaxonomySnapshot) -> ClassificationResult {
    classify(text, taxonomy).result
}

fn collect_matches(haystack: &str, taxonomy: &TaxonomySnapshot) -> Vec<KeywordMatch> {
    let mut matches = Vec::new();
    for category in taxonomy.categories() {
        for keyword in &category.keywords {
            // Keyword::new rejects blanks; guard anyway since "" matches everything.
            if keyword.is_empty() || !haystack.contains(keyword.text.as_str()) {
                continue;
            }
            // Duplicate keyword rows on one category count once.
            if matches.iter().any(|m: &KeywordMatch| {
                m.issue_code == category.code && m.keyword == keyword.text
            }) {
                continue;
            }
            matches.push(KeywordMatch {
                issue_code: category.code.clone(),
                skill_group: category.skill_group,
                keyword: keyword.text.clone(),
                keyword_len: keyword.len(),
            });
        }
    }
    matches
}

struct IssueTally<'a> {
    code: &'a str,
    hits: usize,
    longest: usize,
}

fn best_issue_in_group(matches: &[KeywordMatch], group: SkillGroup) -> Option<String> {
    let mut tallies: Vec<IssueTally<'_>> = Vec::new();
    for m in matches.iter().filter(|m| m.skill_group == group) {
        if let Some(tally) = tallies.iter_mut().find(|t| t.code == m.issue_code) {
            tally.hits += 1;
            tally.longest = tally.longest.max(m.keyword_len);
        } else {
            tallies.push(IssueTally {
                code: &m.issue_code,
                hits: 1,
                longest: m.keyword_len,
            });
        }
    }

    tallies
        .into_iter()
        .min_by(|a, b| compare_tallies(a, b))
        .map(|t| t.code.to_owned())
}

/// `Less` means `a` beats `b`.
fn compare_tallies(a: &IssueTally<'_>, b: &IssueTally<'_>) -> Ordering {
    b.hits
        .cmp(&a.hits)
        .then_with(|| b.longest.cmp(&a.longest))
        .then_with(|| a.code.cmp(b.code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::dictionary;
    use crate::taxonomy::test_support::{category, snapshot};
    use crate::taxonomy::TaxonomyOrigin;

    fn bundled() -> TaxonomySnapshot {
        dictionary::bundled().to_snapshot(TaxonomyOrigin::StaticFallback)
    }

    #[test]
    fn test_ac_not_cooling_end_to_end() {
        let taxonomy = snapshot(vec![
            category("ac_breakdown", SkillGroup::Technical, &["ac"]),
            category("no_water_supply", SkillGroup::Plumbing, &["water"]),
        ]);
        let result = classify_result("AC is not cooling in conference room", &taxonomy);
        assert_eq!(
            result,
            ClassificationResult {
                issue_code: Some("ac_breakdown".to_owned()),
                skill_group: SkillGroup::Technical,
                confidence: Confidence::High,
            }
        );
    }

    #[test]
    fn test_no_match_yields_default_bucket() {
        let taxonomy = snapshot(vec![category(
            "ac_breakdown",
            SkillGroup::Technical,
            &["ac"],
        )]);
        let classification = classify("the door squeaks", &taxonomy);
        assert_eq!(classification.result, ClassificationResult::unmatched());
        assert!(classification.is_unmatched());
        assert_eq!(classification.margin, 0);
        assert_eq!(classification.top_score(), 0);
    }

    #[test]
    fn test_empty_text_yields_default_bucket() {
        assert_eq!(
            classify_result("", &bundled()),
            ClassificationResult::unmatched()
        );
    }

    #[test]
    fn test_empty_taxonomy_yields_default_bucket() {
        assert_eq!(
            classify_result("ac broken", &snapshot(vec![])),
            ClassificationResult::unmatched()
        );
    }

    #[test]
    fn test_vendor_beats_technical_even_with_fewer_hits() {
        let taxonomy = snapshot(vec![
            category("lift_breakdown", SkillGroup::Vendor, &["lift"]),
            category(
                "power_outage",
                SkillGroup::Technical,
                &["power", "no power", "electricity"],
            ),
        ]);
        let classification = classify("no power and electricity near the lift", &taxonomy);
        assert_eq!(classification.result.skill_group, SkillGroup::Vendor);
        assert_eq!(
            classification.result.issue_code.as_deref(),
            Some("lift_breakdown")
        );
        assert_eq!(classification.score(SkillGroup::Technical), 3);
        assert_eq!(classification.score(SkillGroup::Vendor), 1);
    }

    #[test]
    fn test_longer_keyword_breaks_count_tie() {
        let taxonomy = snapshot(vec![
            category("water_leakage", SkillGroup::Plumbing, &["water"]),
            category("no_water_supply", SkillGroup::Plumbing, &["no water supply"]),
        ]);
        let result = classify_result("there is no water supply on floor 3", &taxonomy);
        assert_eq!(result.issue_code.as_deref(), Some("no_water_supply"));
        assert_eq!(result.skill_group, SkillGroup::Plumbing);
    }

    #[test]
    fn test_more_hits_beat_longer_keyword() {
        let taxonomy = snapshot(vec![
            category(
                "washroom_hygiene",
                SkillGroup::Plumbing,
                &["extremely long keyword phrase that matches"],
            ),
            category("water_leakage", SkillGroup::Plumbing, &["leak", "drip", "seep"]),
        ]);
        let result = classify_result(
            "extremely long keyword phrase that matches: leak, drip and seep",
            &taxonomy,
        );
        assert_eq!(result.issue_code.as_deref(), Some("water_leakage"));
    }

    #[test]
    fn test_full_tie_picks_smallest_code() {
        let forward = snapshot(vec![
            category("zeta_issue", SkillGroup::Technical, &["buzz"]),
            category("alpha_issue", SkillGroup::Technical, &["hiss"]),
        ]);
        let result = classify_result("buzz and hiss", &forward);
        assert_eq!(result.issue_code.as_deref(), Some("alpha_issue"));

        let reversed = snapshot(vec![
            category("alpha_issue", SkillGroup::Technical, &["hiss"]),
            category("zeta_issue", SkillGroup::Technical, &["buzz"]),
        ]);
        assert_eq!(classify_result("buzz and hiss", &reversed), result);
    }

    #[test]
    fn test_case_insensitive() {
        let taxonomy = bundled();
        assert_eq!(
            classify_result("AC BREAKDOWN URGENT", &taxonomy),
            classify_result("ac breakdown urgent", &taxonomy)
        );
    }

    #[test]
    fn test_deterministic() {
        let taxonomy = bundled();
        let text = "Washroom tap broken and lights flickering near the lift";
        let first = classify(text, &taxonomy);
        for _ in 0..10 {
            assert_eq!(classify(text, &taxonomy), first);
        }
    }

    #[test]
    fn test_repeated_keyword_counts_once() {
        let taxonomy = snapshot(vec![
            category("leak", SkillGroup::Plumbing, &["leak"]),
            category("seepage", SkillGroup::Plumbing, &["seepage", "damp"]),
        ]);
        let classification = classify("leak leak leak, seepage and damp walls", &taxonomy);
        assert_eq!(classification.score(SkillGroup::Plumbing), 3);
        assert_eq!(
            classification.result.issue_code.as_deref(),
            Some("seepage")
        );
    }

    #[test]
    fn test_duplicate_keyword_rows_count_once() {
        let taxonomy = snapshot(vec![category(
            "leak",
            SkillGroup::Plumbing,
            &["leak", "LEAK ", "leak"],
        )]);
        let classification = classify("pipe leak", &taxonomy);
        assert_eq!(classification.matches.len(), 1);
    }

    #[test]
    fn test_scores_candidates_and_margin() {
        let taxonomy = snapshot(vec![
            category("stuck_lift", SkillGroup::Vendor, &["lift"]),
            category("power_outage", SkillGroup::Technical, &["power", "switch"]),
            category("water_leakage", SkillGroup::Plumbing, &["leak", "drip", "seep"]),
        ]);
        let classification = classify("lift power switch leak drip seep", &taxonomy);

        assert_eq!(classification.scores.len(), 4);
        assert_eq!(classification.score(SkillGroup::SoftServices), 0);

        let order: Vec<SkillGroup> = classification
            .candidates
            .iter()
            .map(|c| c.skill_group)
            .collect();
        assert_eq!(
            order,
            vec![
                SkillGroup::Plumbing,
                SkillGroup::Technical,
                SkillGroup::Vendor,
                SkillGroup::SoftServices
            ]
        );
        assert_eq!(classification.margin, 1);
        assert_eq!(classification.result.skill_group, SkillGroup::Vendor);
        assert_eq!(
            classification
                .candidate(SkillGroup::Plumbing)
                .and_then(|c| c.issue_code.as_deref()),
            Some("water_leakage")
        );
        assert!(classification
            .candidate(SkillGroup::SoftServices)
            .is_some_and(|c| c.issue_code.is_none()));
        assert_eq!(
            classification.matched_groups(),
            vec![SkillGroup::Plumbing, SkillGroup::Technical, SkillGroup::Vendor]
        );
    }

    #[test]
    fn test_keyword_len_counts_characters() {
        let taxonomy = snapshot(vec![category("cafe", SkillGroup::SoftServices, &["café"])]);
        let classification = classify("Café is dirty", &taxonomy);
        assert_eq!(classification.matches[0].keyword_len, 4);
    }

    #[test]
    fn test_bundled_dictionary_routes_common_tickets() {
        let taxonomy = bundled();
        let cases = [
            ("People trapped in lift on floor 4", "stuck_lift", SkillGroup::Vendor),
            ("No water supply in the pantry", "no_water_supply", SkillGroup::Plumbing),
            ("Broken chair at bay 12", "chair_broken", SkillGroup::SoftServices),
        ];
        for (text, code, group) in cases {
            let result = classify_result(text, &taxonomy);
            assert_eq!(result.skill_group, group, "{text}");
            assert_eq!(result.issue_code.as_deref(), Some(code), "{text}");
        }
    }
}
