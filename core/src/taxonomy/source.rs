use super::dictionary::{self, DictionaryError, IssueDictionary};
use super::{TaxonomyOrigin, TaxonomySnapshot};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),
    #[error("Store error: {0}")]
    Store(#[from] super::sqlite::StoreError),
    #[error("Dictionary error: {0}")]
    Dictionary(#[from] DictionaryError),
}

/// Something that can produce a taxonomy snapshot on demand.
pub trait TaxonomySource: Send + Sync {
    /// Short name used in logs and in [`TaxonomyOrigin::Primary`].
    fn name(&self) -> &str;

    fn fetch(&self) -> Result<TaxonomySnapshot, SourceError>;
}

impl<T: TaxonomySource + ?Sized> TaxonomySource for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self) -> Result<TaxonomySnapshot, SourceError> {
        (**self).fetch()
    }
}

/// Dictionary-backed source: the bundled file, or a dictionary file on disk.
pub struct StaticSource {
    path: Option<PathBuf>,
}

impl StaticSource {
    pub fn bundled() -> Self {
        Self { path: None }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

impl TaxonomySource for StaticSource {
    fn name(&self) -> &str {
        if self.path.is_some() {
            "dictionary_file"
        } else {
            "bundled_dictionary"
        }
    }

    fn fetch(&self) -> Result<TaxonomySnapshot, SourceError> {
        match &self.path {
            Some(path) => {
                let dictionary = IssueDictionary::from_path(path)?;
                Ok(dictionary.to_snapshot(TaxonomyOrigin::Primary(self.name().to_owned())))
            }
            None => Ok(dictionary::bundled().to_snapshot(TaxonomyOrigin::StaticFallback)),
        }
    }
}

/// Priority-ordered list of sources, fixed at construction.
///
/// The first source yielding a non-empty snapshot wins. The bundled
/// dictionary is always the last resort, so [`SourceChain::fetch`] cannot fail.
pub struct SourceChain {
    sources: Vec<Box<dyn TaxonomySource>>,
}

impl SourceChain {
    pub fn new(sources: Vec<Box<dyn TaxonomySource>>) -> Self {
        Self { sources }
    }

    /// A chain with no configured source; always yields the bundled dictionary.
    pub fn static_only() -> Self {
        Self::new(Vec::new())
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn fetch(&self) -> TaxonomySnapshot {
        for source in &self.sources {
            match source.fetch() {
                Ok(snapshot) if !snapshot.is_empty() => {
                    log::debug!(
                        "[SourceChain::fetch] Loaded {} categories from {}",
                        snapshot.len(),
                        source.name()
                    );
                    return snapshot.with_origin(TaxonomyOrigin::Primary(source.name().to_owned()));
                }
                Ok(_) => {
                    log::info!(
                        "[SourceChain::fetch] {} returned no active categories, trying next source",
                        source.name()
                    );
                }
                Err(e) => {
                    log::warn!(
                        "[SourceChain::fetch] {} failed, trying next source: {e}",
                        source.name()
                    );
                }
            }
        }

        log::info!("[SourceChain::fetch] Using bundled dictionary");
        dictionary::bundled().to_snapshot(TaxonomyOrigin::StaticFallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::test_support::{category, snapshot};
    use crate::taxonomy::SkillGroup;

    struct FailingSource;

    impl TaxonomySource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        fn fetch(&self) -> Result<TaxonomySnapshot, SourceError> {
            Err(SourceError::Unavailable("connection refused".to_owned()))
        }
    }

    struct FixedSource(TaxonomySnapshot);

    impl TaxonomySource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        fn fetch(&self) -> Result<TaxonomySnapshot, SourceError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_first_non_empty_source_wins() {
        let chain = SourceChain::new(vec![
            Box::new(FailingSource),
            Box::new(FixedSource(snapshot(vec![]))),
            Box::new(FixedSource(snapshot(vec![category(
                "ac_breakdown",
                SkillGroup::Technical,
                &["ac"],
            )]))),
        ]);
        let snap = chain.fetch();
        assert_eq!(snap.codes(), vec!["ac_breakdown"]);
        assert_eq!(snap.origin(), &TaxonomyOrigin::Primary("fixed".to_owned()));
    }

    #[test]
    fn test_chain_falls_back_to_bundled() {
        let chain = SourceChain::new(vec![Box::new(FailingSource)]);
        let snap = chain.fetch();
        assert_eq!(snap.origin(), &TaxonomyOrigin::StaticFallback);
        assert_eq!(snap.len(), dictionary::bundled().category_count());
    }

    #[test]
    fn test_missing_dictionary_file_is_an_error() {
        let source = StaticSource::from_path("/nonexistent/dictionary.json");
        assert!(matches!(source.fetch(), Err(SourceError::Dictionary(_))));
    }

    #[test]
    fn test_source_names() {
        let chain = SourceChain::new(vec![
            Box::new(StaticSource::from_path("x.json")),
            Box::new(StaticSource::bundled()),
        ]);
        assert_eq!(
            chain.source_names(),
            vec!["dictionary_file", "bundled_dictionary"]
        );
    }
}
