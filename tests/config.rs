use assert_matches::assert_matches;

use hydrocat::config::ConfigLoader;
use hydrocat::domain::{KindName, SourceKind};
use hydrocat::error::CatalogError;
use hydrocat::registry::SourceRegistry;

const CONFIG: &str = r#"{
  "storage_path": "/srv/hydro",
  "settings": { "max_retries": 3, "clean_deprecated_stations": true },
  "sources": [
    { "id": "hydroweb", "name": "Hydroweb",
      "list_uri": "https://hydroweb.example/search?format=json",
      "details_uri": "https://hydroweb.example/{id}.txt?token={{HYDROCAT_TEST_UNSET_TOKEN}}" },
    { "id": "archive",
      "list_uri": "/data/archive/stations.json",
      "details_uri": "/data/archive/txt/hydroprd_{id}.txt" }
  ]
}"#;

fn write_config(content: &str) -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hydrocat.json");
    std::fs::write(&path, content).unwrap();
    (dir, path.to_string_lossy().into_owned())
}

#[test]
fn loads_sources_in_file_order() {
    let (_dir, path) = write_config(CONFIG);

    let resolved = ConfigLoader::resolve(Some(&path)).unwrap();
    let registry = SourceRegistry::from_config(&resolved);

    assert_eq!(resolved.storage_path.as_deref().map(|p| p.as_str()), Some("/srv/hydro"));
    assert_eq!(resolved.settings.max_retries, 3);
    assert!(resolved.settings.clean_deprecated_stations);
    assert_eq!(resolved.settings.nearby_limit, 5);

    let ids: Vec<_> = registry.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["hydroweb", "archive"]);
    assert_matches!(registry.get("hydroweb").unwrap().kind, SourceKind::Remote { .. });
    assert_matches!(registry.get("archive").unwrap().kind, SourceKind::Local { .. });
    assert_eq!(registry.get("archive").unwrap().name, "archive");

    let infos = registry.infos();
    assert_eq!(infos[0].kind, KindName::Remote);
    assert_eq!(infos[1].kind, KindName::Local);
}

#[test]
fn unresolved_secrets_stay_in_the_template() {
    let (_dir, path) = write_config(CONFIG);

    let resolved = ConfigLoader::resolve(Some(&path)).unwrap();

    assert!(
        resolved.sources[0]
            .kind
            .details()
            .as_str()
            .contains("{{HYDROCAT_TEST_UNSET_TOKEN}}")
    );
}

#[test]
fn unreadable_and_invalid_files_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(Some(&missing.to_string_lossy())),
        Err(CatalogError::ConfigRead(_))
    );

    let (_dir, path) = write_config("{ not json");
    assert_matches!(
        ConfigLoader::resolve(Some(&path)),
        Err(CatalogError::ConfigParse(_))
    );
}

#[test]
fn required_environment_must_be_set() {
    let (_dir, path) = write_config(
        r#"{"sources": [{"id": "secure", "list_uri": "https://s.example/list",
            "details_uri": "https://s.example/{id}?k={{HYDROCAT_TEST_UNSET_KEY}}",
            "required_env": ["HYDROCAT_TEST_UNSET_KEY"]}]}"#,
    );

    assert_matches!(
        ConfigLoader::resolve(Some(&path)),
        Err(CatalogError::Configuration(message)) if message.contains("HYDROCAT_TEST_UNSET_KEY")
    );
}
