use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::client::SourceClient;
use crate::config::Settings;
use crate::domain::{Source, SourceKind, StationId};
use crate::error::CatalogError;
use crate::retry::RetryPolicy;
use crate::store::Store;
use crate::template::UriTemplate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    pub force_update: bool,
    pub clean_deprecated: bool,
}

impl SyncOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            force_update: settings.force_update,
            clean_deprecated: settings.clean_deprecated_stations,
        }
    }
}

/// Outcome of one source pass, as raw-file paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub unchanged: Vec<Utf8PathBuf>,
    pub new: Vec<Utf8PathBuf>,
    pub removed: Vec<Utf8PathBuf>,
    /// Listed stations whose download failed; their old file, if any, is kept.
    pub failed: Vec<Utf8PathBuf>,
}

/// Mirrors remote station files into the store.
pub struct Synchronizer<'a, C: SourceClient + ?Sized> {
    client: &'a C,
    store: &'a Store,
    retry: RetryPolicy,
    download_pause: Duration,
    inter_source_pause: Duration,
}

impl<'a, C: SourceClient + ?Sized> Synchronizer<'a, C> {
    pub fn new(client: &'a C, store: &'a Store, settings: &Settings) -> Self {
        Self {
            client,
            store,
            retry: RetryPolicy::from_settings(settings),
            download_pause: settings.download_pause(),
            inter_source_pause: settings.inter_source_pause(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pauses(mut self, download: Duration, inter_source: Duration) -> Self {
        self.download_pause = download;
        self.inter_source_pause = inter_source;
        self
    }

    /// One pass over `source`. Only a failure to create the mirror or to
    /// fetch the inventory is an error; per-station failures are reported
    /// in [`SyncResult::failed`].
    pub fn sync(&self, source: &Source, options: SyncOptions) -> Result<SyncResult, CatalogError> {
        self.store.ensure_source_dirs(&source.id)?;

        let (list_url, details) = match &source.kind {
            SourceKind::Local { .. } => return self.sync_local(source),
            SourceKind::Remote { list_url, details } => (list_url, details),
        };

        let list_url = resolve(&source.id.to_string(), &UriTemplate::new(list_url.as_str()));
        let details = resolve(&source.id.to_string(), details);

        let inventory = self
            .retry
            .run(&format!("{} inventory", source.id), |_| {
                self.client.fetch_inventory(list_url.as_str())
            })?;
        info!(
            source = %source.id,
            stations = inventory.stations.len(),
            "fetched station inventory"
        );

        let mut result = SyncResult::default();
        let listed: BTreeSet<&StationId> = inventory.stations.iter().collect();
        for station in &inventory.stations {
            let path = self.store.raw_path(&source.id, station);
            if !options.force_update && path.as_std_path().is_file() {
                result.unchanged.push(path);
                continue;
            }
            let url = details.expand(station);
            let downloaded = self
                .retry
                .run(&format!("{}/{station}", source.id), |_| self.client.fetch_station(&url))
                .and_then(|bytes| Store::write_bytes_atomic(&path, &bytes));
            match downloaded {
                Ok(()) => {
                    debug!(source = %source.id, station = %station, "downloaded station");
                    result.new.push(path);
                    thread::sleep(self.download_pause);
                }
                Err(err) => {
                    warn!(
                        source = %source.id,
                        station = %station,
                        error = %err,
                        "station download failed"
                    );
                    result.failed.push(path);
                }
            }
        }

        if options.clean_deprecated {
            for file in self.store.station_files(source)? {
                if listed.contains(&file.id) {
                    continue;
                }
                match Store::remove_file(&file.path) {
                    Ok(()) => {
                        info!(source = %source.id, station = %file.id, "removed deprecated station");
                        result.removed.push(file.path);
                    }
                    Err(err) => warn!(source = %source.id, error = %err, "cleanup failed"),
                }
            }
        }

        info!(
            source = %source.id,
            unchanged = result.unchanged.len(),
            new = result.new.len(),
            removed = result.removed.len(),
            failed = result.failed.len(),
            "source synchronized"
        );
        Ok(result)
    }

    /// Pause to observe between two sources of a sequential run.
    pub fn inter_source_pause(&self) -> Duration {
        self.inter_source_pause
    }

    fn sync_local(&self, source: &Source) -> Result<SyncResult, CatalogError> {
        let unchanged: Vec<_> = self
            .store
            .station_files(source)?
            .into_iter()
            .map(|file| file.path)
            .collect();
        debug!(source = %source.id, stations = unchanged.len(), "local source, nothing to fetch");
        Ok(SyncResult {
            unchanged,
            ..SyncResult::default()
        })
    }
}

fn resolve(source: &str, template: &UriTemplate) -> UriTemplate {
    let resolution = template.resolve_from_process_env();
    if !resolution.unresolved.is_empty() {
        warn!(
            source,
            placeholders = ?resolution.unresolved,
            "unresolved environment placeholders left verbatim"
        );
    }
    resolution.template
}
