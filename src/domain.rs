use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::template::UriTemplate;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceId(String);

impl SourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SourceId {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !is_path_safe(trimmed) {
            return Err(CatalogError::InvalidSourceId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for SourceId {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SourceId> for String {
    fn from(value: SourceId) -> Self {
        value.0
    }
}

/// Station identifier, also the stem of the raw file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StationId(String);

impl StationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StationId {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !is_path_safe(trimmed) {
            return Err(CatalogError::InvalidStationId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for StationId {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StationId> for String {
    fn from(value: StationId) -> Self {
        value.0
    }
}

// Ids end up as file and directory names in the mirror.
fn is_path_safe(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindName {
    Remote,
    Local,
}

/// Where a source's per-station files come from, fixed once at registry load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Inventory fetched from `list_url`, stations downloaded from `details`.
    Remote {
        list_url: String,
        details: UriTemplate,
    },
    /// Raw files already on disk at `details` (a path template).
    Local { details: UriTemplate },
}

impl SourceKind {
    pub fn name(&self) -> KindName {
        match self {
            SourceKind::Remote { .. } => KindName::Remote,
            SourceKind::Local { .. } => KindName::Local,
        }
    }

    pub fn details(&self) -> &UriTemplate {
        match self {
            SourceKind::Remote { details, .. } | SourceKind::Local { details } => details,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, SourceKind::Remote { .. })
    }
}

impl fmt::Display for KindName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KindName::Remote => write!(f, "remote"),
            KindName::Local => write!(f, "local"),
        }
    }
}

/// `list_uri` values with a network scheme make a remote source.
pub fn infer_kind(list_uri: &str) -> KindName {
    let lower = list_uri.trim_start().to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        KindName::Remote
    } else {
        KindName::Local
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub list_uri: String,
    pub kind: SourceKind,
    pub thumbnails: Option<UriTemplate>,
}

/// Public view of a source, as returned by `listSources`/`getSource`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
    pub list_uri: String,
    pub details_uri: String,
    pub kind: KindName,
}

impl From<&Source> for SourceInfo {
    fn from(source: &Source) -> Self {
        Self {
            id: source.id.to_string(),
            name: source.name.clone(),
            list_uri: source.list_uri.clone(),
            details_uri: source.kind.details().as_str().to_string(),
            kind: source.kind.name(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatVersion {
    V1,
    V2,
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatVersion::V1 => write!(f, "v1"),
            FormatVersion::V2 => write!(f, "v2"),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_station_id_valid() {
        let id: StationId = " R_AMAZONAS_SOLIMOES_KM3305 ".parse().unwrap();
        assert_eq!(id.as_str(), "R_AMAZONAS_SOLIMOES_KM3305");
    }

    #[test]
    fn parse_station_id_rejects_paths() {
        assert_matches!(
            "../etc/passwd".parse::<StationId>(),
            Err(CatalogError::InvalidStationId(_))
        );
        assert_matches!("..".parse::<StationId>(), Err(CatalogError::InvalidStationId(_)));
        assert_matches!("".parse::<StationId>(), Err(CatalogError::InvalidStationId(_)));
    }

    #[test]
    fn parse_source_id_invalid() {
        let err = "hydro web".parse::<SourceId>().unwrap_err();
        assert_matches!(err, CatalogError::InvalidSourceId(_));
    }

    #[test]
    fn kind_inferred_from_scheme() {
        assert_eq!(infer_kind("https://hydroweb.example/list"), KindName::Remote);
        assert_eq!(infer_kind("HTTP://hydroweb.example/list"), KindName::Remote);
        assert_eq!(infer_kind("/mnt/data/stations.json"), KindName::Local);
        assert_eq!(infer_kind("httpdocs/stations.json"), KindName::Local);
    }
}
