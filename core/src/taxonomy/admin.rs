use super::dictionary::IssueDictionary;
use super::provider::TaxonomyProvider;
use super::sqlite::{KeywordRecord, SeedReport, SeedStatus, SqliteStore, StoreError};
use super::MatchType;
use std::sync::Arc;

/// Write path for the taxonomy.
///
/// Every successful mutation invalidates the provider cache, so the next
/// classification sees the change instead of waiting out the TTL.
pub struct TaxonomyAdmin {
    store: Arc<SqliteStore>,
    provider: Arc<TaxonomyProvider>,
}

impl TaxonomyAdmin {
    pub fn new(store: Arc<SqliteStore>, provider: Arc<TaxonomyProvider>) -> Self {
        Self { store, provider }
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn seed(&self, dictionary: &IssueDictionary) -> Result<SeedReport, StoreError> {
        let report = self.store.seed_from_dictionary(dictionary)?;
        self.provider.invalidate();
        Ok(report)
    }

    pub fn seed_status(&self, dictionary: &IssueDictionary) -> Result<SeedStatus, StoreError> {
        self.store.seed_status(dictionary)
    }

    /// Resolve a category by its issue code.
    pub fn category_id(&self, code: &str) -> Result<i64, StoreError> {
        self.store
            .category_id(code)?
            .ok_or_else(|| StoreError::NotFound(format!("issue category '{code}'")))
    }

    pub fn add_keywords(
        &self,
        category_code: &str,
        keywords: &[String],
        match_type: MatchType,
    ) -> Result<Vec<KeywordRecord>, StoreError> {
        let category_id = self.category_id(category_code)?;
        let inserted = self.store.add_keywords(category_id, keywords, match_type)?;
        log::info!(
            "[TaxonomyAdmin::add_keywords] Added {} keyword(s) to {category_code}",
            inserted.len()
        );
        self.provider.invalidate();
        Ok(inserted)
    }

    pub fn remove_keyword_by_id(&self, id: i64) -> Result<(), StoreError> {
        if !self.store.remove_keyword_by_id(id)? {
            return Err(StoreError::NotFound(format!("keyword {id}")));
        }
        self.provider.invalidate();
        Ok(())
    }

    pub fn remove_keyword(&self, category_code: &str, keyword: &str) -> Result<(), StoreError> {
        let category_id = self.category_id(category_code)?;
        if !self.store.remove_keyword(category_id, keyword)? {
            return Err(StoreError::NotFound(format!(
                "keyword '{keyword}' in {category_code}"
            )));
        }
        self.provider.invalidate();
        Ok(())
    }

    pub fn update_match_type(&self, id: i64, match_type: MatchType) -> Result<KeywordRecord, StoreError> {
        let record = self.store.update_match_type(id, match_type)?;
        self.provider.invalidate();
        Ok(record)
    }

    pub fn set_category_active(&self, code: &str, active: bool) -> Result<(), StoreError> {
        if !self.store.set_category_active(code, active)? {
            return Err(StoreError::NotFound(format!("issue category '{code}'")));
        }
        self.provider.invalidate();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::dictionary;
    use crate::taxonomy::source::{SourceChain, TaxonomySource};
    use crate::taxonomy::TaxonomyOrigin;
    use std::time::Duration;

    fn admin() -> (TaxonomyAdmin, Arc<TaxonomyProvider>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let source: Box<dyn TaxonomySource> = Box::new(Arc::clone(&store));
        let provider = Arc::new(TaxonomyProvider::with_ttl(
            SourceChain::new(vec![source]),
            Duration::from_secs(3600),
        ));
        (
            TaxonomyAdmin::new(store, Arc::clone(&provider)),
            provider,
        )
    }

    #[test]
    fn test_seed_invalidates_fallback_snapshot() {
        let (admin, provider) = admin();
        assert_eq!(provider.get_taxonomy().origin(), &TaxonomyOrigin::StaticFallback);

        admin.seed(dictionary::bundled()).unwrap();
        assert_eq!(
            provider.get_taxonomy().origin(),
            &TaxonomyOrigin::Primary("sqlite".to_owned())
        );
    }

    #[test]
    fn test_keyword_edit_is_visible_immediately() {
        let (admin, provider) = admin();
        admin.seed(dictionary::bundled()).unwrap();
        let before = provider.get_taxonomy();

        admin
            .add_keywords("no_water_supply", &["tank empty".to_owned()], MatchType::Contains)
            .unwrap();
        let after = provider.get_taxonomy();
        assert_ne!(before.fingerprint(), after.fingerprint());
        assert!(after
            .category("no_water_supply")
            .unwrap()
            .keywords
            .iter()
            .any(|k| k.text == "tank empty"));
    }

    #[test]
    fn test_remove_missing_keyword_is_not_found() {
        let (admin, _) = admin();
        admin.seed(dictionary::bundled()).unwrap();
        let err = admin.remove_keyword("no_water_supply", "not there").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(matches!(
            admin.remove_keyword_by_id(987_654),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_unknown_category_code() {
        let (admin, _) = admin();
        let err = admin
            .add_keywords("nope", &["x".to_owned()], MatchType::Contains)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_deactivate_category_hides_it() {
        let (admin, provider) = admin();
        admin.seed(dictionary::bundled()).unwrap();
        assert!(provider.get_taxonomy().category("wall_painting").is_some());
        admin.set_category_active("wall_painting", false).unwrap();
        assert!(provider.get_taxonomy().category("wall_painting").is_none());
    }
}
