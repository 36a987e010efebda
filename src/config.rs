use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{KindName, Source, SourceId, SourceKind, infer_kind};
use crate::error::CatalogError;
use crate::template::UriTemplate;

pub const DEFAULT_CONFIG_FILE: &str = "hydrocat.json";
pub const CONFIG_ENV_VAR: &str = "HYDROCAT_CONFIG";

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub storage_path: Option<String>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SourceEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub list_uri: String,
    pub details_uri: String,
    #[serde(default)]
    pub kind: Option<KindName>,
    #[serde(default)]
    pub thumbnails_uri: Option<String>,
    /// Environment variables that must be set for this source to work.
    #[serde(default)]
    pub required_env: Vec<String>,
}

/// Tunable knobs of a synchronization pass.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub max_retries: u32,
    pub retry_pause_seconds: f64,
    pub download_pause_millis: u64,
    pub inter_source_pause_seconds: f64,
    pub request_timeout_seconds: u64,
    pub force_update: bool,
    pub clean_deprecated_stations: bool,
    pub nearby_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_pause_seconds: 5.0,
            download_pause_millis: 200,
            inter_source_pause_seconds: 0.0,
            request_timeout_seconds: 60,
            force_update: false,
            clean_deprecated_stations: false,
            nearby_limit: 5,
        }
    }
}

impl Settings {
    pub fn retry_pause(&self) -> Duration {
        seconds(self.retry_pause_seconds)
    }

    pub fn download_pause(&self) -> Duration {
        Duration::from_millis(self.download_pause_millis)
    }

    pub fn inter_source_pause(&self) -> Duration {
        seconds(self.inter_source_pause_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn seconds(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub storage_path: Option<Utf8PathBuf>,
    pub settings: Settings,
    pub sources: Vec<Source>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the configuration from `path`, else `$HYDROCAT_CONFIG`, else
    /// `hydrocat.json` in the working directory.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CatalogError> {
        let from_env = std::env::var(CONFIG_ENV_VAR)
            .ok()
            .filter(|value| !value.trim().is_empty());
        let explicit = path.map(str::to_string).or(from_env);
        let config_path = match &explicit {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if explicit.is_none() && !config_path.exists() {
            return Err(CatalogError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CatalogError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CatalogError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CatalogError> {
        Self::resolve_config_with_env(config, |name| std::env::var(name).ok())
    }

    pub fn resolve_config_with_env<F>(
        config: Config,
        lookup: F,
    ) -> Result<ResolvedConfig, CatalogError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut seen = HashSet::new();
        let sources = config
            .sources
            .into_iter()
            .map(|entry| {
                let source = resolve_source(entry, &lookup)?;
                if !seen.insert(source.id.clone()) {
                    return Err(CatalogError::Configuration(format!(
                        "duplicate source id {}",
                        source.id
                    )));
                }
                Ok(source)
            })
            .collect::<Result<Vec<_>, CatalogError>>()?;

        Ok(ResolvedConfig {
            storage_path: config
                .storage_path
                .filter(|value| !value.trim().is_empty())
                .map(Utf8PathBuf::from),
            settings: config.settings,
            sources,
        })
    }
}

fn resolve_source<F>(entry: SourceEntry, lookup: &F) -> Result<Source, CatalogError>
where
    F: Fn(&str) -> Option<String>,
{
    let id: SourceId = entry
        .id
        .parse()
        .map_err(|_| CatalogError::Configuration(format!("invalid source id {:?}", entry.id)))?;

    for name in &entry.required_env {
        if lookup(name).is_none_or(|value| value.is_empty()) {
            return Err(CatalogError::Configuration(format!(
                "source {id} requires environment variable {name}"
            )));
        }
    }

    let details = UriTemplate::new(entry.details_uri);
    let kind = match entry.kind.unwrap_or_else(|| infer_kind(&entry.list_uri)) {
        KindName::Remote => {
            if !details.has_station_placeholder() {
                return Err(CatalogError::Configuration(format!(
                    "source {id}: details_uri must contain {{id}}"
                )));
            }
            SourceKind::Remote {
                list_url: entry.list_uri.clone(),
                details,
            }
        }
        KindName::Local => {
            if details.local_pattern().is_none() {
                return Err(CatalogError::Configuration(format!(
                    "source {id}: details_uri must contain {{id}} in its file name"
                )));
            }
            SourceKind::Local { details }
        }
    };

    Ok(Source {
        name: entry.name.unwrap_or_else(|| id.to_string()),
        id,
        list_uri: entry.list_uri,
        kind,
        thumbnails: entry.thumbnails_uri.map(UriTemplate::new),
    })
}
