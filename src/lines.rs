//! Tab-separated track files (one position per line) into a GeoJSON
//! collection of line strings, one feature per file.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CatalogError;
use crate::feature::{CollectionType, FeatureType, LineString};
use crate::store::{RAW_EXTENSION, Store};

const COMMENT_MARKER: char = '#';

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackProperties {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackFeature {
    #[serde(rename = "type")]
    pub kind: FeatureType,
    pub geometry: LineString,
    pub properties: TrackProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackCollection {
    #[serde(rename = "type")]
    pub kind: CollectionType,
    pub features: Vec<TrackFeature>,
}

impl TrackCollection {
    pub fn new(features: Vec<TrackFeature>) -> Self {
        Self {
            kind: CollectionType::FeatureCollection,
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Parses one track. Blank lines and lines starting with `#` are ignored;
/// every other line must hold at least two tab-separated numbers.
pub fn parse_track(name: &str, path: &Utf8Path, content: &str) -> Result<TrackFeature, CatalogError> {
    let mut coordinates = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(COMMENT_MARKER) {
            continue;
        }
        let position = trimmed
            .split('\t')
            .map(str::trim)
            .filter(|column| !column.is_empty())
            .map(|column| {
                column.parse::<f64>().map_err(|_| {
                    CatalogError::parse(path, Some(index + 1), format!("{column:?} is not a number"))
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;
        if position.len() < 2 {
            return Err(CatalogError::parse(
                path,
                Some(index + 1),
                "expected longitude and latitude",
            ));
        }
        coordinates.push(position);
    }
    Ok(TrackFeature {
        kind: FeatureType::Feature,
        geometry: LineString::new(coordinates),
        properties: TrackProperties {
            name: name.to_string(),
        },
    })
}

/// Every `*.txt` file of `dir`, sorted by file name, each named after its stem.
pub fn collect_tracks(dir: &Utf8Path) -> Result<TrackCollection, CatalogError> {
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| CatalogError::Filesystem(format!("read {dir}: {err}")))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
            debug!(dir = %dir, "skipping non UTF-8 file name");
            continue;
        };
        if path.is_file() && path.extension() == Some(RAW_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut features = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path.file_stem().unwrap_or_default();
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(format!("read {path}: {err}")))?;
        let feature = parse_track(name, &path, &content)?;
        info!(track = name, points = feature.geometry.len(), "track parsed");
        features.push(feature);
    }
    Ok(TrackCollection::new(features))
}

pub fn write_tracks(dir: &Utf8Path, out: &Utf8Path) -> Result<TrackCollection, CatalogError> {
    let collection = collect_tracks(dir)?;
    Store::write_json_atomic(out, &collection)?;
    info!(tracks = collection.len(), path = %out, "tracks written");
    Ok(collection)
}
