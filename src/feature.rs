use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CatalogError;
use crate::parser::{StationDate, StationRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeatureType {
    #[default]
    Feature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeometryType {
    #[default]
    Point,
    LineString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CollectionType {
    #[default]
    FeatureCollection,
}

/// GeoJSON point; `coordinates` is `[longitude, latitude]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type", default)]
    pub kind: GeometryType,
    pub coordinates: [f64; 2],
}

impl Geometry {
    pub fn point(lon: f64, lat: f64) -> Self {
        Self {
            kind: GeometryType::Point,
            coordinates: [lon, lat],
        }
    }

    pub fn lon(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn lat(&self) -> f64 {
        self.coordinates[1]
    }

    /// Planar distance in degrees. No geodesic correction.
    pub fn planar_distance(&self, other: &Geometry) -> f64 {
        (self.lon() - other.lon()).hypot(self.lat() - other.lat())
    }
}

/// GeoJSON line string. Positions keep every column of their source line,
/// longitude and latitude first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineString {
    #[serde(rename = "type")]
    pub kind: GeometryType,
    pub coordinates: Vec<Vec<f64>>,
}

impl LineString {
    pub fn new(coordinates: Vec<Vec<f64>>) -> Self {
        Self {
            kind: GeometryType::LineString,
            coordinates,
        }
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureProperties {
    pub name: String,
    #[serde(default)]
    pub start_date: StationDate,
    #[serde(default)]
    pub completion_date: StationDate,
    #[serde(default)]
    pub status: String,
    /// Same value as `status`, under the older property name.
    #[serde(rename = "type", default)]
    pub station_type: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub river: String,
    #[serde(default)]
    pub lake: String,
    #[serde(default)]
    pub basin: String,
    pub product_identifier: String,
    #[serde(default)]
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Only set on nearest-station results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default)]
    pub kind: FeatureType,
    pub id: String,
    pub geometry: Geometry,
    pub properties: FeatureProperties,
}

impl Feature {
    pub fn station_id(&self) -> &str {
        &self.properties.product_identifier
    }
}

/// Projects a parsed station onto its catalog feature. `collection` and
/// `thumbnail` are left for the caller to fill in.
pub fn to_feature(record: &StationRecord) -> Result<Feature, CatalogError> {
    if !record.longitude.is_finite() || !record.latitude.is_finite() {
        return Err(CatalogError::InvalidCoordinate {
            station: record.id.to_string(),
            lon: record.longitude,
            lat: record.latitude,
        });
    }
    Ok(Feature {
        kind: FeatureType::Feature,
        id: record.id.to_string(),
        geometry: Geometry::point(record.longitude, record.latitude),
        properties: FeatureProperties {
            name: record.name.clone(),
            start_date: record.start_date.clone(),
            completion_date: record.completion_date.clone(),
            status: record.status.clone(),
            station_type: record.status.clone(),
            country: record.country.clone(),
            river: record.river.clone(),
            lake: record.lake.clone(),
            basin: record.basin.clone(),
            product_identifier: record.id.to_string(),
            collection: String::new(),
            thumbnail: None,
            distance: None,
        },
    })
}

/// Catalog of features, as persisted per source and returned by queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureCollection {
    #[serde(rename = "type", default)]
    pub kind: CollectionType,
    pub total_results: usize,
    #[serde(default)]
    pub properties: Map<String, Value>,
    pub features: Vec<Feature>,
}

impl Default for FeatureCollection {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: CollectionType::FeatureCollection,
            total_results: features.len(),
            properties: Map::new(),
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn find(&self, station_id: &str) -> Option<&Feature> {
        self.features
            .iter()
            .find(|feature| feature.station_id() == station_id)
    }

    /// Flat concatenation, no deduplication.
    pub fn concat<I>(collections: I) -> Self
    where
        I: IntoIterator<Item = FeatureCollection>,
    {
        Self::new(
            collections
                .into_iter()
                .flat_map(|collection| collection.features)
                .collect(),
        )
    }
}
