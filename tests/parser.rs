use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use hydrocat::domain::FormatVersion;
use hydrocat::error::CatalogError;
use hydrocat::feature::to_feature;
use hydrocat::parser::{StationDate, parse_station};

const HYDROWEB_V2: &str = "#BASIN:: AMAZONAS
#RIVER:: NEGRO
#ID:: R_AMAZONAS_NEGRO_KM0890
#REFERENCE LONGITUDE:: -62.4311
#REFERENCE LATITUDE:: -0.4621
#COUNTRY:: BRAZIL
#STATUS:: OPERATIONAL
#PRODUCT VERSION:: 2.1
#FIRST DATE IN DATASET:: 2002-07-25
#LAST DATE IN DATASET:: 2016-04-28
2002-07-25 03:14 21.43 0.21
2002-08-29 03:14 22.80 0.18
2016-04-28 04:11 25.02 0.30
";

const HYDROWEB_V1: &str = "station=CONGO;river=CONGO;basin=CONGO;lat=-4.31;lon=15.28;country=CONGO;type=operational
2452850.43;2003/07/31;22:19;271.66;0.11;3;10
2452885.43;2003/09/04;22:19;272.01;0.09;3;11
";

fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> Utf8PathBuf {
    let path = Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap();
    std::fs::write(path.as_std_path(), content).unwrap();
    path
}

#[test]
fn parses_v2_file_into_feature() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "R_AMAZONAS_NEGRO_KM0890.txt", HYDROWEB_V2);

    let record = parse_station(&path).unwrap();
    let feature = to_feature(&record).unwrap();

    assert_eq!(record.format_version, FormatVersion::V2);
    assert_eq!(record.product_version, "2.1");
    assert_eq!(record.series.len(), 3);
    assert_eq!(record.river, "Negro");
    assert_eq!(record.status, "operational");
    assert_eq!(feature.geometry.coordinates, [-62.4311, -0.4621]);
    assert_eq!(feature.properties.product_identifier, "R_AMAZONAS_NEGRO_KM0890");
    assert_eq!(
        serde_json::to_value(&feature.properties.completion_date).unwrap(),
        "2016-04-28T04:11:00"
    );
}

#[test]
fn parses_v1_file_into_feature() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "R_CONGO_KM0400.txt", HYDROWEB_V1);

    let record = parse_station(&path).unwrap();
    let feature = to_feature(&record).unwrap();

    assert_eq!(record.format_version, FormatVersion::V1);
    assert_eq!(record.name, "CONGO");
    assert_eq!(record.country, "Congo");
    assert_eq!(feature.geometry.coordinates, [15.28, -4.31]);
    assert_eq!(feature.properties.product_identifier, "R_CONGO_KM0400");
    assert_matches!(record.start_date, StationDate::Timestamp(_));
    assert_eq!(
        serde_json::to_value(&record.completion_date).unwrap(),
        "2003-09-04T22:19:00"
    );
}

#[test]
fn comment_marker_wins_over_v1_lookalike_lines() {
    let dir = tempfile::tempdir().unwrap();
    let content = "#RIVER:: ODD\nstation=FAKE;lat=9;lon=9\n";
    let path = write(&dir, "ODD.txt", content);

    let record = parse_station(&path).unwrap();

    assert_eq!(record.format_version, FormatVersion::V2);
    assert_eq!(record.river, "Odd");
    assert_eq!(record.latitude, 0.0);
    assert!(record.series.is_empty());
}

#[test]
fn missing_and_malformed_files_are_distinguished() {
    let dir = tempfile::tempdir().unwrap();
    let missing = Utf8PathBuf::from_path_buf(dir.path().join("GONE.txt")).unwrap();
    let empty = write(&dir, "EMPTY.txt", "");

    let missing = parse_station(&missing).unwrap_err();
    let malformed = parse_station(&empty).unwrap_err();

    assert_matches!(missing, CatalogError::RawFileNotFound(_));
    assert!(missing.is_not_found());
    assert_matches!(malformed, CatalogError::Parse { .. });
    assert!(!malformed.is_not_found());
}
