//! SQLite-backed taxonomy store.
//!
//! The primary configuration source: active skill groups, their active issue
//! categories, and each category's keywords. Also carries the administrative
//! writes (seeding, keyword edits); callers go through
//! [`TaxonomyAdmin`](super::admin::TaxonomyAdmin) so the provider cache is
//! invalidated after every change.

use super::dictionary::{issue_display_name, IssueDictionary};
use super::source::{SourceError, TaxonomySource};
use super::{
    normalize_keyword, IssueCategory, Keyword, MatchType, SkillGroup, TaxonomyOrigin,
    TaxonomySnapshot,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid request: {0}")]
    Invalid(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Store lock poisoned")]
    Poisoned,
}

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS skill_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT,
    is_active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS issue_categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT,
    skill_group_id INTEGER REFERENCES skill_groups(id),
    priority INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS issue_keywords (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_category_id INTEGER NOT NULL REFERENCES issue_categories(id) ON DELETE CASCADE,
    keyword TEXT NOT NULL,
    match_type TEXT NOT NULL DEFAULT 'contains',
    UNIQUE(issue_category_id, keyword)
);
CREATE INDEX IF NOT EXISTS idx_issue_keywords_category ON issue_keywords(issue_category_id);
";

const ACTIVE_TAXONOMY_QUERY: &str = r"
SELECT c.id, c.code, c.name, c.priority, sg.code, k.keyword, k.match_type
FROM issue_categories c
LEFT JOIN skill_groups sg ON sg.id = c.skill_group_id
LEFT JOIN issue_keywords k ON k.issue_category_id = c.id
WHERE c.is_active = 1 AND (sg.id IS NULL OR sg.is_active = 1)
ORDER BY c.id, k.id
";

/// A stored keyword row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordRecord {
    pub id: i64,
    pub issue_category_id: i64,
    pub keyword: String,
    pub match_type: MatchType,
}

/// Outcome of seeding the store from a dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub skill_groups_created: usize,
    pub categories_created: usize,
    pub keywords_created: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedStatus {
    pub is_seeded: bool,
    pub stored_categories: usize,
    pub dictionary_categories: usize,
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open or create the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(path.to_path_buf()),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            db_path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Read all active categories with their keywords.
    ///
    /// Categories without a skill group land in the default bucket;
    /// categories whose skill group code is unknown are skipped.
    pub fn load_snapshot(&self) -> Result<TaxonomySnapshot, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(ACTIVE_TAXONOMY_QUERY)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?;

        let mut categories: Vec<IssueCategory> = Vec::new();
        let mut index: HashMap<i64, usize> = HashMap::new();
        let mut skipped: HashMap<i64, String> = HashMap::new();

        for row in rows {
            let (id, code, name, priority, group_code, keyword, match_type) = row?;
            if skipped.contains_key(&id) {
                continue;
            }

            let slot = if let Some(&slot) = index.get(&id) {
                slot
            } else {
                let skill_group = match group_code.as_deref() {
                    None => SkillGroup::DEFAULT,
                    Some(code_str) => match code_str.parse::<SkillGroup>() {
                        Ok(group) => group,
                        Err(e) => {
                            log::warn!("[SqliteStore::load_snapshot] Skipping category {code}: {e}");
                            skipped.insert(id, code);
                            continue;
                        }
                    },
                };
                categories.push(IssueCategory {
                    id: id.to_string(),
                    code,
                    name,
                    skill_group,
                    priority,
                    active: true,
                    keywords: Vec::new(),
                });
                index.insert(id, categories.len() - 1);
                categories.len() - 1
            };

            if let Some(text) = keyword {
                let match_type = MatchType::parse_lenient(match_type.as_deref().unwrap_or(""));
                if let Some(keyword) = Keyword::new(&text, match_type) {
                    categories[slot].keywords.push(keyword);
                }
            }
        }

        Ok(TaxonomySnapshot::new(
            categories,
            TaxonomyOrigin::Primary(self.name().to_owned()),
        ))
    }

    /// Create missing skill groups, categories and keywords from a dictionary.
    ///
    /// Existing categories are kept; their keyword lists are extended with
    /// any dictionary keywords they lack. Per-item failures are collected in
    /// the report rather than aborting the run.
    pub fn seed_from_dictionary(&self, dictionary: &IssueDictionary) -> Result<SeedReport, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut report = SeedReport::default();

        for (group, issues) in dictionary.groups() {
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM skill_groups WHERE code = ?1",
                    params![group.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let group_id = if let Some(id) = existing {
                id
            } else {
                match tx.execute(
                    "INSERT INTO skill_groups (code, name, description) VALUES (?1, ?2, ?3)",
                    params![
                        group.as_str(),
                        group.display_name(),
                        format!("Auto-created skill group for {group}")
                    ],
                ) {
                    Ok(_) => {
                        report.skill_groups_created += 1;
                        tx.last_insert_rowid()
                    }
                    Err(e) => {
                        report
                            .errors
                            .push(format!("Failed to create skill group {group}: {e}"));
                        continue;
                    }
                }
            };

            for (code, keywords) in issues {
                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM issue_categories WHERE code = ?1",
                        params![code],
                        |row| row.get(0),
                    )
                    .optional()?;
                let category_id = if let Some(id) = existing {
                    id
                } else {
                    match tx.execute(
                        "INSERT INTO issue_categories (code, name, description, skill_group_id, priority)
                         VALUES (?1, ?2, ?3, ?4, 0)",
                        params![
                            code,
                            issue_display_name(code),
                            format!("Category for {code} issues"),
                            group_id
                        ],
                    ) {
                        Ok(_) => {
                            report.categories_created += 1;
                            tx.last_insert_rowid()
                        }
                        Err(e) => {
                            report
                                .errors
                                .push(format!("Failed to create category {code}: {e}"));
                            continue;
                        }
                    }
                };

                for keyword in keywords {
                    let normalized = normalize_keyword(keyword);
                    if normalized.is_empty() {
                        continue;
                    }
                    match tx.execute(
                        "INSERT OR IGNORE INTO issue_keywords (issue_category_id, keyword, match_type)
                         VALUES (?1, ?2, ?3)",
                        params![category_id, normalized, MatchType::Contains.as_str()],
                    ) {
                        Ok(changed) => report.keywords_created += changed,
                        Err(e) => report.errors.push(format!(
                            "Failed to insert keyword '{normalized}' for {code}: {e}"
                        )),
                    }
                }
            }
        }

        tx.commit()?;
        log::info!(
            "[SqliteStore::seed_from_dictionary] Created {} groups, {} categories, {} keywords ({} errors)",
            report.skill_groups_created,
            report.categories_created,
            report.keywords_created,
            report.errors.len()
        );
        Ok(report)
    }

    pub fn seed_status(&self, dictionary: &IssueDictionary) -> Result<SeedStatus, StoreError> {
        let conn = self.lock()?;
        let stored: i64 = conn.query_row("SELECT COUNT(*) FROM issue_categories", [], |row| {
            row.get(0)
        })?;
        let stored = usize::try_from(stored).unwrap_or(0);
        Ok(SeedStatus {
            is_seeded: stored > 0,
            stored_categories: stored,
            dictionary_categories: dictionary.category_count(),
        })
    }

    pub fn category_id(&self, code: &str) -> Result<Option<i64>, StoreError> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT id FROM issue_categories WHERE code = ?1",
                params![code],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Add keywords to a category. Keywords are lowercased and trimmed;
    /// duplicates of existing `(category, keyword)` pairs are ignored.
    /// Returns the rows that were actually inserted.
    pub fn add_keywords(
        &self,
        category_id: i64,
        keywords: &[String],
        match_type: MatchType,
    ) -> Result<Vec<KeywordRecord>, StoreError> {
        let normalized: Vec<String> = keywords
            .iter()
            .map(|k| normalize_keyword(k))
            .filter(|k| !k.is_empty())
            .collect();
        if normalized.is_empty() {
            return Err(StoreError::Invalid("keywords array is required".to_owned()));
        }

        let mut conn = self.lock()?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM issue_categories WHERE id = ?1",
                params![category_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound(format!("issue category {category_id}")));
        }

        let tx = conn.transaction()?;
        let mut inserted = Vec::new();
        for keyword in normalized {
            let changed = tx.execute(
                "INSERT OR IGNORE INTO issue_keywords (issue_category_id, keyword, match_type)
                 VALUES (?1, ?2, ?3)",
                params![category_id, keyword, match_type.as_str()],
            )?;
            if changed > 0 {
                inserted.push(KeywordRecord {
                    id: tx.last_insert_rowid(),
                    issue_category_id: category_id,
                    keyword,
                    match_type,
                });
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Returns whether a row was removed.
    pub fn remove_keyword_by_id(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM issue_keywords WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Remove by `(category, keyword)`; the keyword is normalized first.
    pub fn remove_keyword(&self, category_id: i64, keyword: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM issue_keywords WHERE issue_category_id = ?1 AND keyword = ?2",
            params![category_id, normalize_keyword(keyword)],
        )?;
        Ok(changed > 0)
    }

    pub fn update_match_type(&self, id: i64, match_type: MatchType) -> Result<KeywordRecord, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE issue_keywords SET match_type = ?1 WHERE id = ?2",
            params![match_type.as_str(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("keyword {id}")));
        }
        let record = conn.query_row(
            "SELECT id, issue_category_id, keyword, match_type FROM issue_keywords WHERE id = ?1",
            params![id],
            |row| {
                Ok(KeywordRecord {
                    id: row.get(0)?,
                    issue_category_id: row.get(1)?,
                    keyword: row.get(2)?,
                    match_type: MatchType::parse_lenient(&row.get::<_, String>(3)?),
                })
            },
        )?;
        Ok(record)
    }

    /// Returns whether a category with `code` exists.
    pub fn set_category_active(&self, code: &str, active: bool) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE issue_categories SET is_active = ?1 WHERE code = ?2",
            params![active, code],
        )?;
        Ok(changed > 0)
    }
}

impl TaxonomySource for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn fetch(&self) -> Result<TaxonomySnapshot, SourceError> {
        Ok(self.load_snapshot()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::dictionary;

    fn seeded() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.seed_from_dictionary(dictionary::bundled()).unwrap();
        store
    }

    #[test]
    fn test_empty_store_yields_empty_snapshot() {
        let store = SqliteStore::open_in_memory().unwrap();
        let snapshot = store.load_snapshot().unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_seed_creates_dictionary_taxonomy() {
        let store = SqliteStore::open_in_memory().unwrap();
        let report = store.seed_from_dictionary(dictionary::bundled()).unwrap();
        assert_eq!(report.skill_groups_created, 4);
        assert_eq!(report.categories_created, 16);
        assert!(report.errors.is_empty());

        let snapshot = store.load_snapshot().unwrap();
        let mut codes = snapshot.codes();
        codes.sort_unstable();
        let mut expected = dictionary::bundled().codes();
        expected.sort_unstable();
        assert_eq!(codes, expected);
        assert_eq!(
            snapshot.origin(),
            &TaxonomyOrigin::Primary("sqlite".to_owned())
        );
        assert_eq!(
            snapshot.category("ac_breakdown").unwrap().name,
            "AC Breakdown"
        );
    }

    #[test]
    fn test_seed_is_idempotent() {
        let store = seeded();
        let second = store.seed_from_dictionary(dictionary::bundled()).unwrap();
        assert_eq!(second.skill_groups_created, 0);
        assert_eq!(second.categories_created, 0);
        assert_eq!(second.keywords_created, 0);
    }

    #[test]
    fn test_seed_status() {
        let store = SqliteStore::open_in_memory().unwrap();
        let before = store.seed_status(dictionary::bundled()).unwrap();
        assert!(!before.is_seeded);
        assert_eq!(before.dictionary_categories, 16);

        store.seed_from_dictionary(dictionary::bundled()).unwrap();
        let after = store.seed_status(dictionary::bundled()).unwrap();
        assert!(after.is_seeded);
        assert_eq!(after.stored_categories, 16);
    }

    #[test]
    fn test_add_keywords_normalizes_and_ignores_duplicates() {
        let store = seeded();
        let id = store.category_id("no_water_supply").unwrap().unwrap();
        let inserted = store
            .add_keywords(
                id,
                &["  Tank Empty ".to_owned(), "no water".to_owned()],
                MatchType::Contains,
            )
            .unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].keyword, "tank empty");

        let snapshot = store.load_snapshot().unwrap();
        let category = snapshot.category("no_water_supply").unwrap();
        assert!(category.keywords.iter().any(|k| k.text == "tank empty"));
    }

    #[test]
    fn test_add_keywords_rejects_empty_list() {
        let store = seeded();
        let id = store.category_id("no_water_supply").unwrap().unwrap();
        let err = store
            .add_keywords(id, &["   ".to_owned()], MatchType::Contains)
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn test_add_keywords_unknown_category() {
        let store = seeded();
        let err = store
            .add_keywords(9999, &["x".to_owned()], MatchType::Contains)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_remove_keyword_by_pair_and_id() {
        let store = seeded();
        let id = store.category_id("no_water_supply").unwrap().unwrap();
        assert!(store.remove_keyword(id, " NO WATER ").unwrap());
        assert!(!store.remove_keyword(id, "no water").unwrap());

        let added = store
            .add_keywords(id, &["dry taps".to_owned()], MatchType::Contains)
            .unwrap();
        assert!(store.remove_keyword_by_id(added[0].id).unwrap());

        let snapshot = store.load_snapshot().unwrap();
        let category = snapshot.category("no_water_supply").unwrap();
        assert!(!category.keywords.iter().any(|k| k.text == "no water"));
        assert!(!category.keywords.iter().any(|k| k.text == "dry taps"));
    }

    #[test]
    fn test_update_match_type() {
        let store = seeded();
        let id = store.category_id("chair_broken").unwrap().unwrap();
        let added = store
            .add_keywords(id, &["stool".to_owned()], MatchType::Contains)
            .unwrap();
        let record = store
            .update_match_type(added[0].id, MatchType::Contains)
            .unwrap();
        assert_eq!(record.keyword, "stool");
        assert!(matches!(
            store.update_match_type(424_242, MatchType::Contains),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_inactive_category_is_excluded() {
        let store = seeded();
        assert!(store.set_category_active("stuck_lift", false).unwrap());
        let snapshot = store.load_snapshot().unwrap();
        assert!(snapshot.category("stuck_lift").is_none());
        assert!(!store.set_category_active("missing", false).unwrap());
    }

    #[test]
    fn test_unknown_skill_group_is_skipped_and_missing_group_defaults() {
        let store = SqliteStore::open_in_memory().unwrap();
        {
            let conn = store.lock().unwrap();
            conn.execute_batch(
                "INSERT INTO skill_groups (code, name) VALUES ('electrical', 'Electrical');
                 INSERT INTO issue_categories (code, name, skill_group_id) VALUES ('sparks', 'Sparks', 1);
                 INSERT INTO issue_categories (code, name, skill_group_id) VALUES ('orphan', 'Orphan', NULL);
                 INSERT INTO issue_keywords (issue_category_id, keyword) VALUES (1, 'spark');
                 INSERT INTO issue_keywords (issue_category_id, keyword) VALUES (2, 'orphan');",
            )
            .unwrap();
        }
        let snapshot = store.load_snapshot().unwrap();
        assert_eq!(snapshot.codes(), vec!["orphan"]);
        assert_eq!(
            snapshot.category("orphan").unwrap().skill_group,
            SkillGroup::Technical
        );
    }

    #[test]
    fn test_open_on_disk_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("taxonomy.db");
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        assert!(path.exists());
    }
}
