use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::warn;

use crate::catalog::CatalogBuilder;
use crate::client::SourceClient;
use crate::config::Settings;
use crate::domain::{Source, SourceInfo, StationId};
use crate::error::CatalogError;
use crate::feature::{Feature, FeatureCollection};
use crate::parser::{TimeSeries, parse_station_as};
use crate::query::{NearbyQuery, locate, nearest};
use crate::registry::SourceRegistry;
use crate::store::Store;
use crate::sync::{SyncOptions, SyncResult, Synchronizer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StationScope {
    /// The station's catalog feature.
    #[default]
    Feature,
    /// The station's full time series, read from its raw file.
    Data,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StationView {
    Feature(Feature),
    Data(TimeSeries),
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateResult {
    pub sources: Vec<SourceUpdate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceUpdate {
    pub source: String,
    pub sync: Option<SyncResult>,
    pub sync_error: Option<String>,
    pub catalog: SourceBuild,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub sources: Vec<SourceBuild>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceBuild {
    pub source: String,
    pub path: Utf8PathBuf,
    pub features: usize,
    pub skipped: Vec<Utf8PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Query and batch operations over the configured sources.
pub struct App<C: SourceClient> {
    registry: SourceRegistry,
    store: Store,
    client: C,
    settings: Settings,
}

impl<C: SourceClient> App<C> {
    pub fn new(registry: SourceRegistry, store: Store, client: C, settings: Settings) -> Self {
        Self {
            registry,
            store,
            client,
            settings,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn list_sources(&self) -> Vec<SourceInfo> {
        self.registry.infos()
    }

    pub fn get_source(&self, id: &str) -> Result<SourceInfo, CatalogError> {
        self.registry.get(id).map(SourceInfo::from)
    }

    pub fn list_stations(&self, source_id: &str) -> Result<FeatureCollection, CatalogError> {
        let source = self.registry.get(source_id)?;
        self.catalogs().load(source)
    }

    pub fn get_station(
        &self,
        source_id: &str,
        station: &str,
        scope: StationScope,
    ) -> Result<StationView, CatalogError> {
        let source = self.registry.get(source_id)?;
        let not_found = || CatalogError::StationNotFound {
            source_id: source_id.to_string(),
            station: station.to_string(),
        };
        match scope {
            StationScope::Feature => {
                let catalog = self.catalogs().load(source)?;
                catalog
                    .find(station)
                    .cloned()
                    .map(StationView::Feature)
                    .ok_or_else(not_found)
            }
            StationScope::Data => {
                let id: StationId = station.parse().map_err(|_| not_found())?;
                let path = self.store.station_path(source, &id);
                match parse_station_as(id, &path) {
                    Ok(record) => Ok(StationView::Data(record.series)),
                    Err(CatalogError::RawFileNotFound(_)) => Err(not_found()),
                    Err(err) => Err(err),
                }
            }
        }
    }

    /// First source, in registry order, whose catalog holds `station`.
    pub fn get_station_across_sources(&self, station: &str) -> Result<Feature, CatalogError> {
        let catalogs = self.catalogs().load_all(&self.registry)?;
        locate(catalogs.iter().flat_map(|(_, c)| &c.features), station)
            .cloned()
            .ok_or_else(|| CatalogError::StationNotFoundAnywhere(station.to_string()))
    }

    pub fn get_nearby(
        &self,
        station: &str,
        limit: Option<usize>,
        radius: Option<f64>,
    ) -> Result<FeatureCollection, CatalogError> {
        let query = NearbyQuery {
            limit: limit.unwrap_or(self.settings.nearby_limit),
            radius,
        };
        let catalogs = self.catalogs().load_all(&self.registry)?;
        let features = nearest(catalogs.iter().flat_map(|(_, c)| &c.features), station, &query)?;
        Ok(FeatureCollection::new(features))
    }

    /// Full batch pass: for each selected source, synchronize its mirror
    /// and rebuild its catalog from what is on disk afterwards. A source
    /// whose inventory cannot be fetched keeps its previous raw files.
    pub fn update(
        &self,
        source_id: Option<&str>,
        options: SyncOptions,
        sink: &dyn ProgressSink,
    ) -> Result<UpdateResult, CatalogError> {
        let sources = self.select(source_id)?;
        let synchronizer = Synchronizer::new(&self.client, &self.store, &self.settings);
        let mut results = Vec::with_capacity(sources.len());
        for (index, source) in sources.into_iter().enumerate() {
            if index > 0 {
                thread::sleep(synchronizer.inter_source_pause());
            }
            let started = Instant::now();
            let (sync, sync_error) = match synchronizer.sync(source, options) {
                Ok(result) => (Some(result), None),
                Err(err) => {
                    warn!(source = %source.id, error = %err, "source synchronization failed");
                    (None, Some(err.to_string()))
                }
            };
            let catalog = self.build_one(source)?;
            sink.event(ProgressEvent {
                message: format!("{}: {} stations in catalog", source.id, catalog.features),
                elapsed: Some(started.elapsed()),
            });
            results.push(SourceUpdate {
                source: source.id.to_string(),
                sync,
                sync_error,
                catalog,
            });
        }
        Ok(UpdateResult { sources: results })
    }

    /// Rebuilds catalogs from the raw files already on disk.
    pub fn build(
        &self,
        source_id: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<BuildResult, CatalogError> {
        let mut results = Vec::new();
        for source in self.select(source_id)? {
            let started = Instant::now();
            let build = self.build_one(source)?;
            sink.event(ProgressEvent {
                message: format!("{}: {} stations in catalog", source.id, build.features),
                elapsed: Some(started.elapsed()),
            });
            results.push(build);
        }
        Ok(BuildResult { sources: results })
    }

    fn build_one(&self, source: &Source) -> Result<SourceBuild, CatalogError> {
        let outcome = self.catalogs().build_and_write(source)?;
        Ok(SourceBuild {
            source: source.id.to_string(),
            path: self.store.catalog_path(&source.id),
            features: outcome.catalog.len(),
            skipped: outcome.failures.into_iter().map(|f| f.path).collect(),
        })
    }

    fn select(&self, source_id: Option<&str>) -> Result<Vec<&Source>, CatalogError> {
        match source_id {
            Some(id) => Ok(vec![self.registry.get(id)?]),
            None => Ok(self.registry.iter().collect()),
        }
    }

    fn catalogs(&self) -> CatalogBuilder<'_> {
        CatalogBuilder::new(&self.store)
    }
}
