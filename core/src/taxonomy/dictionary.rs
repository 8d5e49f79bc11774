//! Static issue dictionary: the bundled fallback taxonomy.
//!
//! File format (kept bit-compatible with the dictionary shipped alongside the
//! ticketing service):
//!
//! ```json
//! {
//!   "technical": { "ac_breakdown": ["ac", "air conditioner"] },
//!   "plumbing":  { "no_water_supply": ["no water", "water supply"] },
//!   "vendor": { },
//!   "soft_services": { }
//! }
//! ```
//!
//! Other top-level keys (`precedence_order`, `defaults`) are ignored.

use super::{IssueCategory, Keyword, MatchType, SkillGroup, TaxonomyOrigin, TaxonomySnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DictionaryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Issue code -> keyword list.
pub type IssueKeywords = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDictionary {
    #[serde(default)]
    pub vendor: IssueKeywords,
    #[serde(default)]
    pub technical: IssueKeywords,
    #[serde(default)]
    pub plumbing: IssueKeywords,
    #[serde(default)]
    pub soft_services: IssueKeywords,
}

impl IssueDictionary {
    pub fn from_json_str(json: &str) -> Result<Self, DictionaryError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, DictionaryError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn issues(&self, group: SkillGroup) -> &IssueKeywords {
        match group {
            SkillGroup::Vendor => &self.vendor,
            SkillGroup::Technical => &self.technical,
            SkillGroup::Plumbing => &self.plumbing,
            SkillGroup::SoftServices => &self.soft_services,
        }
    }

    /// `(group, issues)` pairs in precedence order.
    pub fn groups(&self) -> impl Iterator<Item = (SkillGroup, &IssueKeywords)> {
        SkillGroup::PRECEDENCE
            .into_iter()
            .map(move |group| (group, self.issues(group)))
    }

    pub fn category_count(&self) -> usize {
        self.groups().map(|(_, issues)| issues.len()).sum()
    }

    /// Every issue code in the dictionary, in precedence then key order.
    pub fn codes(&self) -> Vec<&str> {
        self.groups()
            .flat_map(|(_, issues)| issues.keys().map(String::as_str))
            .collect()
    }

    /// Materialize as a snapshot. Category identifiers are synthesized from
    /// the dictionary keys as `static:<code>`.
    pub fn to_snapshot(&self, origin: TaxonomyOrigin) -> TaxonomySnapshot {
        let categories = self
            .groups()
            .flat_map(|(group, issues)| {
                issues.iter().map(move |(code, keywords)| IssueCategory {
                    id: format!("static:{code}"),
                    code: code.clone(),
                    name: issue_display_name(code),
                    skill_group: group,
                    priority: 0,
                    active: true,
                    keywords: keywords
                        .iter()
                        .filter_map(|k| Keyword::new(k, MatchType::Contains))
                        .collect(),
                })
            })
            .collect();
        TaxonomySnapshot::new(categories, origin)
    }
}

static BUNDLED: OnceLock<IssueDictionary> = OnceLock::new();

/// The dictionary shipped with the crate (parsed once).
pub fn bundled() -> &'static IssueDictionary {
    BUNDLED.get_or_init(|| {
        let json_str = include_str!("../../resources/issue_dictionary.json");
        match IssueDictionary::from_json_str(json_str) {
            Ok(dictionary) => dictionary,
            Err(e) => {
                log::error!("[dictionary::bundled] Failed to parse bundled dictionary: {e}");
                minimal_dictionary()
            }
        }
    })
}

/// Human-readable name for an issue code.
pub fn issue_display_name(code: &str) -> String {
    let known = match code {
        "ac_breakdown" => Some("AC Breakdown"),
        "power_outage" => Some("Power/Electrical Issue"),
        "wifi_down" => Some("Network/WiFi Issue"),
        "lighting_issue" => Some("Lighting Issue"),
        "dg_issue" => Some("DG/Generator Issue"),
        "water_leakage" => Some("Water Leakage"),
        "no_water_supply" => Some("No Water Supply"),
        "washroom_hygiene" => Some("Washroom Hygiene"),
        "stuck_lift" => Some("Stuck Lift (Emergency)"),
        "lift_breakdown" => Some("Lift Breakdown"),
        "fire_alarm" => Some("Fire/Safety Issue"),
        "wall_painting" => Some("Wall Painting"),
        "chair_broken" => Some("Broken Chair"),
        "desk_alignment" => Some("Desk/Furniture Issue"),
        "deep_cleaning" => Some("Deep Cleaning"),
        "cleaning_required" => Some("Cleaning Required"),
        _ => None,
    };
    known.map_or_else(|| title_case(code), ToOwned::to_owned)
}

/// `no_water_supply` -> `No Water Supply`.
fn title_case(code: &str) -> String {
    code.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Last-resort dictionary if the bundled file cannot be parsed.
fn minimal_dictionary() -> IssueDictionary {
    fn issues(entries: &[(&str, &[&str])]) -> IssueKeywords {
        entries
            .iter()
            .map(|(code, keywords)| {
                (
                    (*code).to_owned(),
                    keywords.iter().map(|k| (*k).to_owned()).collect(),
                )
            })
            .collect()
    }

    IssueDictionary {
        vendor: issues(&[
            ("stuck_lift", &["lift stuck", "stuck lift", "trapped"]),
            ("fire_alarm", &["fire", "fire alarm", "smoke detector"]),
        ]),
        technical: issues(&[
            ("ac_breakdown", &["ac", "air conditioner", "hvac"]),
            ("power_outage", &["power", "no power", "short circuit"]),
        ]),
        plumbing: issues(&[
            ("water_leakage", &["leak", "leakage", "seepage"]),
            ("no_water_supply", &["no water", "water supply"]),
        ]),
        soft_services: issues(&[("cleaning_required", &["clean", "cleaning", "trash"])]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_dictionary_has_all_groups() {
        let dictionary = bundled();
        for group in SkillGroup::PRECEDENCE {
            assert!(
                !dictionary.issues(group).is_empty(),
                "{group} should have issues"
            );
        }
        assert_eq!(dictionary.category_count(), 16);
    }

    #[test]
    fn test_extra_top_level_keys_are_ignored() {
        let json = r#"{
            "precedence_order": ["vendor", "technical", "plumbing", "soft_services"],
            "defaults": {"fallback_skill_group": "technical"},
            "plumbing": {"no_water_supply": ["no water"]}
        }"#;
        let dictionary = IssueDictionary::from_json_str(json).unwrap();
        assert_eq!(dictionary.codes(), vec!["no_water_supply"]);
        assert!(dictionary.vendor.is_empty());
    }

    #[test]
    fn test_snapshot_synthesizes_ids_from_keys() {
        let json = r#"{"technical": {"ac_breakdown": ["AC ", "hvac"]}}"#;
        let dictionary = IssueDictionary::from_json_str(json).unwrap();
        let snapshot = dictionary.to_snapshot(TaxonomyOrigin::StaticFallback);
        let category = snapshot.category("ac_breakdown").unwrap();
        assert_eq!(category.id, "static:ac_breakdown");
        assert_eq!(category.name, "AC Breakdown");
        assert_eq!(category.skill_group, SkillGroup::Technical);
        assert_eq!(category.keywords[0].text, "ac");
    }

    #[test]
    fn test_snapshot_codes_match_dictionary_codes() {
        let dictionary = bundled();
        let snapshot = dictionary.to_snapshot(TaxonomyOrigin::StaticFallback);
        let mut from_snapshot = snapshot.codes();
        let mut from_dictionary = dictionary.codes();
        from_snapshot.sort_unstable();
        from_dictionary.sort_unstable();
        assert_eq!(from_snapshot, from_dictionary);
    }

    #[test]
    fn test_display_name_falls_back_to_title_case() {
        assert_eq!(issue_display_name("stuck_lift"), "Stuck Lift (Emergency)");
        assert_eq!(issue_display_name("pest_control"), "Pest Control");
    }

    #[test]
    fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dictionary.json");
        std::fs::write(&path, r#"{"vendor": {"lift_breakdown": ["lift"]}}"#).unwrap();
        let dictionary = IssueDictionary::from_path(&path).unwrap();
        assert_eq!(dictionary.codes(), vec!["lift_breakdown"]);
    }

    #[test]
    fn test_minimal_dictionary_is_usable() {
        let dictionary = minimal_dictionary();
        assert!(dictionary.category_count() > 0);
    }
}
