//! Raw station files, `;`-separated v1 or `#`-headed v2, into [`StationRecord`].

use std::collections::HashMap;
use std::fmt;
use std::fs;

use camino::Utf8Path;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use crate::domain::{FormatVersion, StationId};
use crate::error::CatalogError;

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";
const DATE_ONLY_FORMAT: &str = "%Y-%m-%d";
const SERIALIZED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const COMMENT_MARKER: char = '#';
const V2_SEPARATOR: &str = "::";

/// A date as found in a raw file. Unparsable values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StationDate {
    #[default]
    Missing,
    Timestamp(NaiveDateTime),
    Unparsed(String),
}

impl StationDate {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return StationDate::Missing;
        }
        let normalized = trimmed
            .replace('/', "-")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if let Ok(value) = NaiveDateTime::parse_from_str(&normalized, DATE_FORMAT) {
            return StationDate::Timestamp(value);
        }
        if let Ok(value) = NaiveDate::parse_from_str(&normalized, DATE_ONLY_FORMAT) {
            return StationDate::Timestamp(value.and_time(NaiveTime::MIN));
        }
        StationDate::Unparsed(trimmed.to_string())
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            StationDate::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_unparsed(&self) -> bool {
        matches!(self, StationDate::Unparsed(_))
    }
}

impl fmt::Display for StationDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationDate::Missing => Ok(()),
            StationDate::Timestamp(value) => write!(f, "{}", value.format(SERIALIZED_FORMAT)),
            StationDate::Unparsed(raw) => write!(f, "{raw}"),
        }
    }
}

impl Serialize for StationDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StationDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() {
            return Ok(StationDate::Missing);
        }
        match NaiveDateTime::parse_from_str(&raw, SERIALIZED_FORMAT) {
            Ok(value) => Ok(StationDate::Timestamp(value)),
            Err(_) => Ok(StationDate::Unparsed(raw)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub timestamp: StationDate,
    pub height: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TimeSeries {
    pub station: String,
    pub measurements: Vec<Measurement>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn first(&self) -> Option<&Measurement> {
        self.measurements.first()
    }

    pub fn last(&self) -> Option<&Measurement> {
        self.measurements.last()
    }
}

/// Canonical form of one raw station file.
#[derive(Debug, Clone, PartialEq)]
pub struct StationRecord {
    pub id: StationId,
    pub format_version: FormatVersion,
    pub product_version: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub river: String,
    pub lake: String,
    pub basin: String,
    pub country: String,
    pub status: String,
    pub start_date: StationDate,
    pub completion_date: StationDate,
    pub series: TimeSeries,
}

#[derive(Debug, Default)]
struct Header {
    product_version: String,
    name: String,
    latitude: Option<String>,
    longitude: Option<String>,
    river: String,
    lake: String,
    basin: String,
    country: String,
    status: String,
    first_date: String,
    last_date: String,
}

pub fn detect_format(first_line: &str) -> FormatVersion {
    if first_line.trim_start().starts_with(COMMENT_MARKER) {
        FormatVersion::V2
    } else {
        FormatVersion::V1
    }
}

/// Parses the raw file at `path`; the station id is the file stem.
pub fn parse_station(path: &Utf8Path) -> Result<StationRecord, CatalogError> {
    parse_station_as(station_id_from_path(path)?, path)
}

/// Parses the raw file at `path` under an explicit station id, for local
/// sources whose file names wrap the id in a prefix or suffix.
pub fn parse_station_as(id: StationId, path: &Utf8Path) -> Result<StationRecord, CatalogError> {
    let bytes = fs::read(path.as_std_path()).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => CatalogError::RawFileNotFound(path.as_std_path().to_path_buf()),
        _ => CatalogError::Filesystem(format!("read {path}: {err}")),
    })?;
    let content = String::from_utf8(bytes)
        .map_err(|_| CatalogError::parse(path, None, "file is not valid UTF-8 text"))?;
    parse_content(id, path, &content)
}

pub fn station_id_from_path(path: &Utf8Path) -> Result<StationId, CatalogError> {
    path.file_stem()
        .ok_or_else(|| CatalogError::parse(path, None, "path has no file name"))?
        .parse()
        .map_err(|_| CatalogError::parse(path, None, "file name is not a valid station id"))
}

/// Parses raw file `content`. `path` is only used in error messages.
pub fn parse_content(
    id: StationId,
    path: &Utf8Path,
    content: &str,
) -> Result<StationRecord, CatalogError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    if content.trim().is_empty() {
        return Err(CatalogError::parse(path, None, "empty file"));
    }
    let mut lines = content.lines().enumerate().map(|(idx, line)| (idx + 1, line));
    let Some((_, first)) = lines.next().filter(|(_, line)| !line.trim().is_empty()) else {
        return Err(CatalogError::parse(path, Some(1), "first line is blank, expected a header"));
    };

    let format_version = detect_format(first);
    let (header, measurements) = match format_version {
        FormatVersion::V2 => {
            let mut entries = HashMap::new();
            collect_v2_entry(first, &mut entries);
            let mut data_lines = Vec::new();
            let mut in_header = true;
            for (number, line) in lines {
                if in_header && line.trim_start().starts_with(COMMENT_MARKER) {
                    collect_v2_entry(line, &mut entries);
                    continue;
                }
                in_header = false;
                data_lines.push((number, line));
            }
            if entries.is_empty() {
                return Err(CatalogError::parse(
                    path,
                    Some(1),
                    "comment header holds no `KEY :: value` entries",
                ));
            }
            let measurements = parse_data_lines(path, &id, data_lines, parse_v2_data_line);
            (v2_header(&entries, &id), measurements)
        }
        FormatVersion::V1 => {
            let entries = parse_v1_header(path, first)?;
            let measurements = parse_data_lines(path, &id, lines, parse_v1_data_line);
            (v1_header(path, &entries)?, measurements)
        }
    };

    let latitude = parse_coordinate(path, &id, "latitude", header.latitude.as_deref())?;
    let longitude = parse_coordinate(path, &id, "longitude", header.longitude.as_deref())?;

    // First and last well-formed data lines; headers only fill in without data.
    let start_date = match measurements.first() {
        Some(first) => first.timestamp.clone(),
        None => StationDate::parse(&header.first_date),
    };
    let completion_date = match measurements.last() {
        Some(last) => last.timestamp.clone(),
        None => StationDate::parse(&header.last_date),
    };
    for (field, date) in [("start_date", &start_date), ("completion_date", &completion_date)] {
        if let StationDate::Unparsed(raw) = date {
            warn!(
                station = %id,
                field,
                value = %raw,
                expected = DATE_FORMAT,
                "unparsable date kept verbatim"
            );
        }
    }
    let unparsed = measurements
        .iter()
        .filter(|measurement| measurement.timestamp.is_unparsed())
        .count();
    if unparsed > 0 {
        warn!(station = %id, count = unparsed, "measurements with unparsable timestamps");
    }

    Ok(StationRecord {
        series: TimeSeries {
            station: id.to_string(),
            measurements,
        },
        id,
        format_version,
        product_version: header.product_version,
        name: header.name,
        latitude,
        longitude,
        river: capitalize(&header.river),
        lake: capitalize(&header.lake),
        basin: capitalize(&header.basin),
        country: capitalize(&header.country),
        status: header.status.to_lowercase(),
        start_date,
        completion_date,
    })
}

fn collect_v2_entry(line: &str, entries: &mut HashMap<String, String>) {
    let body = line.trim_start().trim_start_matches(COMMENT_MARKER);
    if let Some((key, value)) = body.split_once(V2_SEPARATOR) {
        let key = key.trim().to_uppercase();
        if !key.is_empty() {
            entries.insert(key, value.trim().to_string());
        }
    }
}

fn v2_header(entries: &HashMap<String, String>, id: &StationId) -> Header {
    let get = |key: &str| entries.get(key).cloned().unwrap_or_default();
    Header {
        product_version: entries
            .get("PRODUCT VERSION")
            .filter(|value| !value.is_empty())
            .cloned()
            .unwrap_or_else(|| "2.0".to_string()),
        name: id.to_string(),
        latitude: entries.get("REFERENCE LATITUDE").cloned(),
        longitude: entries.get("REFERENCE LONGITUDE").cloned(),
        river: get("RIVER"),
        lake: get("LAKE"),
        basin: get("BASIN"),
        country: get("COUNTRY"),
        status: get("STATUS"),
        first_date: get("FIRST DATE IN DATASET"),
        last_date: get("LAST DATE IN DATASET"),
    }
}

fn parse_v1_header(path: &Utf8Path, line: &str) -> Result<HashMap<String, String>, CatalogError> {
    let mut entries = HashMap::new();
    for item in line.split(';').map(str::trim).filter(|item| !item.is_empty()) {
        let (key, value) = item.split_once('=').ok_or_else(|| {
            CatalogError::parse(path, Some(1), format!("header entry {item:?} is not key=value"))
        })?;
        entries.insert(key.trim().to_lowercase(), value.trim().to_string());
    }
    Ok(entries)
}

fn v1_header(path: &Utf8Path, entries: &HashMap<String, String>) -> Result<Header, CatalogError> {
    let get = |key: &str| entries.get(key).cloned().unwrap_or_default();
    let name = entries
        .get("station")
        .or_else(|| entries.get("lake"))
        .filter(|value| !value.is_empty())
        .cloned()
        .ok_or_else(|| CatalogError::parse(path, Some(1), "header names neither station nor lake"))?;
    Ok(Header {
        product_version: "1.0".to_string(),
        name,
        latitude: entries.get("lat").cloned(),
        longitude: entries.get("lon").cloned(),
        river: get("river"),
        lake: get("lake"),
        basin: get("basin"),
        country: get("country"),
        status: get("type"),
        first_date: String::new(),
        last_date: get("date"),
    })
}

fn parse_data_lines<'a, I, F>(
    path: &Utf8Path,
    id: &StationId,
    lines: I,
    parse_line: F,
) -> Vec<Measurement>
where
    I: IntoIterator<Item = (usize, &'a str)>,
    F: Fn(&str) -> Result<Measurement, String>,
{
    let mut measurements = Vec::new();
    for (number, line) in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(COMMENT_MARKER) {
            continue;
        }
        match parse_line(trimmed) {
            Ok(measurement) => measurements.push(measurement),
            Err(message) => warn!(
                station = %id,
                path = %path,
                line = number,
                error = %message,
                "malformed data line skipped"
            ),
        }
    }
    measurements
}

/// `time; date; clock; height; uncertainty; observations; cycle`
fn parse_v1_data_line(line: &str) -> Result<Measurement, String> {
    let fields: Vec<&str> = line.split(';').map(str::trim).collect();
    if fields.len() < 4 {
        return Err(format!("expected at least 4 `;` separated fields, got {}", fields.len()));
    }
    Ok(Measurement {
        timestamp: StationDate::parse(&format!("{} {}", fields[1], fields[2])),
        height: parse_number("height", fields[3])?,
        uncertainty: optional_number("uncertainty", fields.get(4).copied())?,
    })
}

/// `date time height uncertainty`
fn parse_v2_data_line(line: &str) -> Result<Measurement, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 {
        return Err(format!("expected at least 3 whitespace separated fields, got {}", fields.len()));
    }
    Ok(Measurement {
        timestamp: StationDate::parse(&format!("{} {}", fields[0], fields[1])),
        height: parse_number("height", fields[2])?,
        uncertainty: optional_number("uncertainty", fields.get(3).copied())?,
    })
}

fn parse_number(field: &str, value: &str) -> Result<f64, String> {
    value
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
        .ok_or_else(|| format!("{field} {value:?} is not a number"))
}

fn optional_number(field: &str, value: Option<&str>) -> Result<Option<f64>, String> {
    match value.filter(|value| !value.is_empty()) {
        Some(value) => parse_number(field, value).map(Some),
        None => Ok(None),
    }
}

/// Absent or empty coordinates default to `0` so geometry always exists.
fn parse_coordinate(
    path: &Utf8Path,
    id: &StationId,
    field: &str,
    value: Option<&str>,
) -> Result<f64, CatalogError> {
    let value = value.map(str::trim).filter(|value| !value.is_empty()).unwrap_or("0");
    parse_number(field, value)
        .map_err(|message| CatalogError::parse(path, None, format!("station {id}: {message}")))
}

pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::NaiveDate;

    use super::*;

    const V1: &str = "station=NIGER_KOULIKORO;river=NIGER;basin=NIGER;lat=12.87;lon=-7.55;type=operational
2008.45 ; 2008/06/14 ; 10:05 ; 301.25 ; 0.21 ; 3 ; 64
2008.49 ; 2008/06/28 ; 10:07 ; 301.62 ; 0.18 ; 4 ; 65
2008.53 ; 2008/07/12 ; 10:06 ; 302.10 ; 0.25 ; 2 ; 66
";

    const V2: &str = "#BASIN:: AMAZONAS
#RIVER:: SOLIMOES
#REFERENCE LONGITUDE:: -65.31
#REFERENCE LATITUDE:: -3.36
#STATUS:: Operational
#PRODUCT VERSION:: 2.1
#COL 1 : Date (YYYY-MM-DD)
2016-03-05 04:12 24.31 0.12
2016-04-01 04:13 25.02 0.09
2016-04-28 04:11 25.90 0.14
";

    fn parse(id: &str, content: &str) -> Result<StationRecord, CatalogError> {
        parse_content(id.parse().unwrap(), Utf8Path::new("/tmp/test.txt"), content)
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> StationDate {
        StationDate::Timestamp(
            NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(h, min, 0)
                .unwrap(),
        )
    }

    #[test]
    fn parses_v1_file() {
        let record = parse("R_NIGER_KOULIKORO", V1).unwrap();
        assert_eq!(record.format_version, FormatVersion::V1);
        assert_eq!(record.product_version, "1.0");
        assert_eq!(record.name, "NIGER_KOULIKORO");
        assert_eq!(record.latitude, 12.87);
        assert_eq!(record.longitude, -7.55);
        assert_eq!(record.river, "Niger");
        assert_eq!(record.basin, "Niger");
        assert_eq!(record.lake, "");
        assert_eq!(record.status, "operational");
        assert_eq!(record.start_date, at(2008, 6, 14, 10, 5));
        assert_eq!(record.completion_date, at(2008, 7, 12, 10, 6));
        assert_eq!(record.series.len(), 3);
        assert_eq!(record.series.measurements[1].height, 301.62);
        assert_eq!(record.series.measurements[1].uncertainty, Some(0.18));
    }

    #[test]
    fn parses_v2_file() {
        let record = parse("R_AMAZONAS_SOLIMOES_KM2000", V2).unwrap();
        assert_eq!(record.format_version, FormatVersion::V2);
        assert_eq!(record.product_version, "2.1");
        assert_eq!(record.name, "R_AMAZONAS_SOLIMOES_KM2000");
        assert_eq!(record.latitude, -3.36);
        assert_eq!(record.longitude, -65.31);
        assert_eq!(record.river, "Solimoes");
        assert_eq!(record.basin, "Amazonas");
        assert_eq!(record.status, "operational");
        assert_eq!(record.start_date, at(2016, 3, 5, 4, 12));
        assert_eq!(record.completion_date, at(2016, 4, 28, 4, 11));
        assert_eq!(record.series.len(), 3);
    }

    #[test]
    fn comment_marker_always_selects_v2() {
        let content = "# RIVER :: congo
station=X;lat=1;lon=2
";
        let record = parse("X", content).unwrap();
        assert_eq!(record.format_version, FormatVersion::V2);
        assert_eq!(record.river, "Congo");
        assert_eq!(record.latitude, 0.0);
        assert!(record.series.is_empty());
    }

    #[test]
    fn malformed_data_lines_are_skipped() {
        let content = "station=NIGER;lat=12.87;lon=-7.55
2008.45 ; 2008/06/14 ; 10:05 ; 301.25 ; 0.21
2454010.5;2006/01/11;12:00
2008.49 ; 2008/06/28 ; 10:07 ; not-a-height
2008.53 ; 2008/07/12 ; 10:06 ; 302.10 ; 0.25
2008.57 ; 2008/07/26
";
        let record = parse("R_NIGER", content).unwrap();
        assert_eq!(record.series.len(), 2);
        assert_eq!(record.start_date, at(2008, 6, 14, 10, 5));
        assert_eq!(record.completion_date, at(2008, 7, 12, 10, 6));
    }

    #[test]
    fn missing_coordinates_default_to_zero() {
        let record = parse("L_TANA", "lake=TANA;type=research\n").unwrap();
        assert_eq!(record.latitude, 0.0);
        assert_eq!(record.longitude, 0.0);
        assert_eq!(record.name, "TANA");
        assert_eq!(record.lake, "Tana");
        assert!(record.series.is_empty());
        assert_eq!(record.start_date, StationDate::Missing);
    }

    #[test]
    fn invalid_coordinate_is_a_parse_error() {
        let err = parse("X", "station=X;lat=north;lon=1\n").unwrap_err();
        assert_matches!(err, CatalogError::Parse { .. });
    }

    #[test]
    fn empty_file_is_a_parse_error() {
        assert_matches!(parse("X", ""), Err(CatalogError::Parse { line: None, .. }));
        assert_matches!(parse("X", "\n\n"), Err(CatalogError::Parse { line: None, .. }));
        assert_matches!(
            parse("X", "\nstation=X\n"),
            Err(CatalogError::Parse { line: Some(1), .. })
        );
    }

    #[test]
    fn malformed_v1_header_is_rejected() {
        assert_matches!(
            parse("X", "this is not a header\n"),
            Err(CatalogError::Parse { line: Some(1), .. })
        );
        assert_matches!(
            parse("X", "river=NIGER;lat=1;lon=2\n"),
            Err(CatalogError::Parse { line: Some(1), .. })
        );
    }

    #[test]
    fn unparsable_dates_are_kept_verbatim() {
        let content = "station=X;lat=1;lon=2
2008.45 ; sometime ; later ; 301.25 ; 0.21 ; 3 ; 64
";
        let record = parse("X", content).unwrap();
        assert_eq!(
            record.start_date,
            StationDate::Unparsed("sometime later".to_string())
        );
        assert_eq!(record.completion_date, record.start_date);
    }

    #[test]
    fn v2_header_dates_fill_in_without_data() {
        let content = "#REFERENCE LATITUDE:: 1.5
#FIRST DATE IN DATASET:: 2002-07-25
#LAST DATE IN DATASET:: 2019-01-02
";
        let record = parse("X", content).unwrap();
        assert_eq!(record.start_date, at(2002, 7, 25, 0, 0));
        assert_eq!(record.completion_date, at(2019, 1, 2, 0, 0));
        assert_eq!(record.product_version, "2.0");
    }

    #[test]
    fn last_data_line_wins_despite_trailing_blank_lines() {
        let content = format!("{V2}\n\n   \n");
        let record = parse("X", &content).unwrap();
        assert_eq!(record.completion_date, at(2016, 4, 28, 4, 11));
    }

    #[test]
    fn date_serialization_round_trips() {
        let date = at(2016, 4, 28, 4, 11);
        let json = serde_json::to_string(&date).unwrap();
        assert_eq!(json, "\"2016-04-28T04:11:00\"");
        assert_eq!(serde_json::from_str::<StationDate>(&json).unwrap(), date);
        assert_eq!(serde_json::to_string(&StationDate::Missing).unwrap(), "\"\"");
    }

    #[test]
    fn capitalizes_like_place_names() {
        assert_eq!(capitalize("AMAZONAS"), "Amazonas");
        assert_eq!(capitalize("rio negro"), "Rio negro");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn missing_file_is_distinguished() {
        let err = parse_station(Utf8Path::new("/nonexistent/dir/X.txt")).unwrap_err();
        assert_matches!(err, CatalogError::RawFileNotFound(_));
    }
}
