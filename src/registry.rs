use crate::config::ResolvedConfig;
use crate::domain::{Source, SourceId, SourceInfo};
use crate::error::CatalogError;

/// The configured sources, loaded once and never mutated afterwards.
///
/// Iteration follows configuration order; cross-source lookups rely on it.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<Source>) -> Self {
        Self { sources }
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(config.sources.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn get(&self, id: &str) -> Result<&Source, CatalogError> {
        self.sources
            .iter()
            .find(|source| source.id.as_str() == id)
            .ok_or_else(|| CatalogError::SourceNotFound(id.to_string()))
    }

    pub fn get_by_id(&self, id: &SourceId) -> Result<&Source, CatalogError> {
        self.get(id.as_str())
    }

    pub fn infos(&self) -> Vec<SourceInfo> {
        self.sources.iter().map(SourceInfo::from).collect()
    }
}
