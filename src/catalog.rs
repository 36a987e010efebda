use camino::Utf8PathBuf;
use tracing::{debug, info, warn};

use crate::domain::Source;
use crate::error::CatalogError;
use crate::feature::{Feature, FeatureCollection, to_feature};
use crate::parser::parse_station_as;
use crate::registry::SourceRegistry;
use crate::store::{StationFile, Store};

/// A raw file left out of a catalog.
#[derive(Debug)]
pub struct BuildFailure {
    pub path: Utf8PathBuf,
    pub error: CatalogError,
}

#[derive(Debug)]
pub struct BuildOutcome {
    pub catalog: FeatureCollection,
    pub failures: Vec<BuildFailure>,
}

/// Turns the raw files of a source into its `stations.json` catalog.
#[derive(Debug, Clone, Copy)]
pub struct CatalogBuilder<'a> {
    store: &'a Store,
}

impl<'a> CatalogBuilder<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Parses every file in order. A file that fails to parse is logged
    /// and left out; the rest of the catalog is still built.
    pub fn build(&self, source: &Source, files: &[StationFile]) -> BuildOutcome {
        let mut features = Vec::with_capacity(files.len());
        let mut failures = Vec::new();
        for file in files {
            match parse_station_as(file.id.clone(), &file.path).and_then(|record| to_feature(&record)) {
                Ok(feature) => features.push(self.decorate(source, feature, file)),
                Err(error) => {
                    warn!(source = %source.id, path = %file.path, error = %error, "station skipped");
                    failures.push(BuildFailure {
                        path: file.path.clone(),
                        error,
                    });
                }
            }
        }
        BuildOutcome {
            catalog: FeatureCollection::new(features),
            failures,
        }
    }

    /// Builds from whatever raw files are currently on disk.
    pub fn build_source(&self, source: &Source) -> Result<BuildOutcome, CatalogError> {
        let files = self.store.station_files(source)?;
        Ok(self.build(source, &files))
    }

    pub fn build_and_write(&self, source: &Source) -> Result<BuildOutcome, CatalogError> {
        let outcome = self.build_source(source)?;
        let path = self.store.catalog_path(&source.id);
        Store::write_json_atomic(&path, &outcome.catalog)?;
        info!(
            source = %source.id,
            features = outcome.catalog.len(),
            skipped = outcome.failures.len(),
            path = %path,
            "catalog written"
        );
        Ok(outcome)
    }

    /// Rebuilds and persists every source, returning the concatenation.
    pub fn build_all(&self, registry: &SourceRegistry) -> Result<FeatureCollection, CatalogError> {
        let mut catalogs = Vec::with_capacity(registry.len());
        for source in registry.iter() {
            catalogs.push(self.build_and_write(source)?.catalog);
        }
        Ok(FeatureCollection::concat(catalogs))
    }

    /// Persisted catalog of `source`.
    pub fn load(&self, source: &Source) -> Result<FeatureCollection, CatalogError> {
        Store::read_json(&self.store.catalog_path(&source.id))?
            .ok_or_else(|| CatalogError::CatalogNotFound(source.id.to_string()))
    }

    /// Persisted catalogs of all sources in registry order. Sources that
    /// were never built, or whose catalog cannot be read, contribute nothing.
    pub fn load_all<'r>(
        &self,
        registry: &'r SourceRegistry,
    ) -> Result<Vec<(&'r Source, FeatureCollection)>, CatalogError> {
        let mut catalogs = Vec::with_capacity(registry.len());
        for source in registry.iter() {
            match self.load(source) {
                Ok(catalog) => catalogs.push((source, catalog)),
                Err(CatalogError::CatalogNotFound(_)) => {
                    debug!(source = %source.id, "no catalog on disk");
                }
                Err(err) => {
                    warn!(source = %source.id, error = %err, "catalog unreadable, skipped");
                }
            }
        }
        Ok(catalogs)
    }

    fn decorate(&self, source: &Source, mut feature: Feature, file: &StationFile) -> Feature {
        feature.properties.collection = source.name.clone();
        feature.properties.thumbnail = Some(match &source.thumbnails {
            Some(template) => template.expand(&file.id),
            None => self.store.thumbnail_path(&source.id, &file.id).to_string(),
        });
        feature
    }
}
