//! Nearest-station search over the aggregated catalog.
//!
//! Distances are planar, in degrees, between `[lon, lat]` points. Ranking
//! covers every known feature, the reference included at distance zero;
//! ties keep catalog order. The reference itself is never returned.

use tracing::debug;

use crate::error::CatalogError;
use crate::feature::Feature;

pub const DEFAULT_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyQuery {
    pub limit: usize,
    /// Keep features strictly closer than this. When nothing matches, the
    /// `limit` nearest are returned instead.
    pub radius: Option<f64>,
}

impl Default for NearbyQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            radius: None,
        }
    }
}

/// First feature whose station id matches, in iteration order.
pub fn locate<'f, I>(features: I, station_id: &str) -> Option<&'f Feature>
where
    I: IntoIterator<Item = &'f Feature>,
{
    features
        .into_iter()
        .find(|feature| feature.station_id() == station_id)
}

pub fn nearest<'f, I>(
    features: I,
    station_id: &str,
    query: &NearbyQuery,
) -> Result<Vec<Feature>, CatalogError>
where
    I: IntoIterator<Item = &'f Feature>,
{
    let features: Vec<&Feature> = features.into_iter().collect();
    let reference = features
        .iter()
        .position(|feature| feature.station_id() == station_id)
        .ok_or_else(|| CatalogError::StationNotFoundAnywhere(station_id.to_string()))?;
    let origin = &features[reference].geometry;

    let mut ranked: Vec<(usize, f64)> = features
        .iter()
        .enumerate()
        .map(|(index, feature)| (index, origin.planar_distance(&feature.geometry)))
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

    let within = query
        .radius
        .map(|radius| {
            ranked
                .iter()
                .copied()
                .filter(|(_, distance)| *distance < radius)
                .collect::<Vec<_>>()
        })
        .filter(|within| !within.is_empty());

    let selected: Vec<(usize, f64)> = match within {
        Some(within) => within
            .into_iter()
            .filter(|(index, _)| *index != reference)
            .collect(),
        None => ranked
            .into_iter()
            .filter(|(index, _)| *index != reference)
            .take(query.limit)
            .collect(),
    };
    debug!(
        station = station_id,
        candidates = features.len(),
        returned = selected.len(),
        "nearest stations ranked"
    );

    Ok(selected
        .into_iter()
        .map(|(index, distance)| {
            let mut feature = features[index].clone();
            feature.properties.distance = Some(distance);
            feature
        })
        .collect())
}
