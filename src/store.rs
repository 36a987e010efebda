use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::Builder;

use crate::domain::{Source, SourceId, SourceKind, StationId};
use crate::error::CatalogError;

pub const RAW_EXTENSION: &str = "txt";
pub const CATALOG_FILE: &str = "stations.json";

/// On-disk layout of the mirror:
///
/// ```text
/// <root>/sources/<source>/stations/txt/<station>.txt
/// <root>/sources/<source>/stations/stations.json
/// <root>/sources/<source>/stations/thumbnails/<station>.png
/// ```
///
/// Local sources keep their raw files where their path template points;
/// only their catalog lives under `<root>`.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

/// One raw station file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationFile {
    pub id: StationId,
    pub path: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, CatalogError> {
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.data_local_dir().join("hydrocat")).ok()
            })
            .ok_or_else(|| {
                CatalogError::Filesystem("unable to resolve data directory".to_string())
            })?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn source_dir(&self, id: &SourceId) -> Utf8PathBuf {
        self.root.join("sources").join(id.as_str())
    }

    pub fn stations_dir(&self, id: &SourceId) -> Utf8PathBuf {
        self.source_dir(id).join("stations")
    }

    pub fn raw_dir(&self, id: &SourceId) -> Utf8PathBuf {
        self.stations_dir(id).join(RAW_EXTENSION)
    }

    pub fn raw_path(&self, id: &SourceId, station: &StationId) -> Utf8PathBuf {
        self.raw_dir(id)
            .join(format!("{}.{RAW_EXTENSION}", station.as_str()))
    }

    pub fn catalog_path(&self, id: &SourceId) -> Utf8PathBuf {
        self.stations_dir(id).join(CATALOG_FILE)
    }

    pub fn thumbnails_dir(&self, id: &SourceId) -> Utf8PathBuf {
        self.stations_dir(id).join("thumbnails")
    }

    pub fn thumbnail_path(&self, id: &SourceId, station: &StationId) -> Utf8PathBuf {
        self.thumbnails_dir(id)
            .join(format!("{}.png", station.as_str()))
    }

    /// Where the raw file of `station` lives for `source`.
    pub fn station_path(&self, source: &Source, station: &StationId) -> Utf8PathBuf {
        match &source.kind {
            SourceKind::Remote { .. } => self.raw_path(&source.id, station),
            SourceKind::Local { details } => Utf8PathBuf::from(details.expand(station)),
        }
    }

    /// Creates the directory tree of a source. Idempotent.
    pub fn ensure_source_dirs(&self, id: &SourceId) -> Result<(), CatalogError> {
        for dir in [self.raw_dir(id), self.thumbnails_dir(id)] {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| CatalogError::Filesystem(format!("create {dir}: {err}")))?;
        }
        Ok(())
    }

    /// Raw station files currently on disk for `source`, sorted by station id.
    pub fn station_files(&self, source: &Source) -> Result<Vec<StationFile>, CatalogError> {
        let mut files = match &source.kind {
            SourceKind::Remote { .. } => {
                let suffix = format!(".{RAW_EXTENSION}");
                list_matching(&self.raw_dir(&source.id), |name| {
                    name.strip_suffix(suffix.as_str())
                        .and_then(|stem| stem.parse().ok())
                })?
            }
            SourceKind::Local { details } => match details.local_pattern() {
                Some(pattern) => list_matching(&pattern.dir, |name| pattern.station_id(name))?,
                None => Vec::new(),
            },
        };
        files.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(files)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CatalogError> {
        let parent = path
            .parent()
            .ok_or_else(|| CatalogError::Filesystem(format!("invalid destination path {path}")))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".hydrocat")
            .suffix(".tmp")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(format!("persist {path}: {}", err.error)))?;
        Ok(())
    }

    pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), CatalogError> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    /// Reads a JSON document; `Ok(None)` when the file does not exist.
    pub fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<Option<T>, CatalogError> {
        let content = match fs::read(path.as_std_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CatalogError::Filesystem(format!("read {path}: {err}"))),
        };
        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|err| CatalogError::Filesystem(format!("decode {path}: {err}")))
    }

    pub fn remove_file(path: &Utf8Path) -> Result<(), CatalogError> {
        fs::remove_file(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(format!("remove {path}: {err}")))
    }
}

fn list_matching<F>(dir: &Utf8Path, station_of: F) -> Result<Vec<StationFile>, CatalogError>
where
    F: Fn(&str) -> Option<StationId>,
{
    let entries = match fs::read_dir(dir.as_std_path()) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(CatalogError::Filesystem(format!("list {dir}: {err}"))),
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        let is_file = entry
            .file_type()
            .map(|kind| kind.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if let Some(id) = station_of(&name) {
            files.push(StationFile {
                id,
                path: dir.join(&name),
            });
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::UriTemplate;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("data")).unwrap();
        (temp, Store::new_with_root(root))
    }

    #[test]
    fn layout_paths() {
        let (_temp, store) = temp_store();
        let source: SourceId = "hydroweb".parse().unwrap();
        let station: StationId = "R_NIGER_KM1200".parse().unwrap();

        assert!(
            store
                .raw_path(&source, &station)
                .ends_with("sources/hydroweb/stations/txt/R_NIGER_KM1200.txt")
        );
        assert!(
            store
                .catalog_path(&source)
                .ends_with("sources/hydroweb/stations/stations.json")
        );
        assert!(
            store
                .thumbnail_path(&source, &station)
                .ends_with("stations/thumbnails/R_NIGER_KM1200.png")
        );
    }

    #[test]
    fn ensure_dirs_is_idempotent() {
        let (_temp, store) = temp_store();
        let source: SourceId = "hydroweb".parse().unwrap();
        store.ensure_source_dirs(&source).unwrap();
        store.ensure_source_dirs(&source).unwrap();
        assert!(store.raw_dir(&source).as_std_path().is_dir());
        assert!(store.thumbnails_dir(&source).as_std_path().is_dir());
    }

    #[test]
    fn atomic_write_replaces_content() {
        let (_temp, store) = temp_store();
        let path = store.root().join("nested/file.txt");
        Store::write_bytes_atomic(&path, b"first").unwrap();
        Store::write_bytes_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read(path.as_std_path()).unwrap(), b"second");
        let leftovers = std::fs::read_dir(path.parent().unwrap().as_std_path())
            .unwrap()
            .count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn lists_local_source_files() {
        let (temp, store) = temp_store();
        let dir = Utf8PathBuf::from_path_buf(temp.path().join("local")).unwrap();
        std::fs::create_dir_all(dir.as_std_path()).unwrap();
        for name in ["hydroprd_B.txt", "hydroprd_A.txt", "notes.md", "hydroprd_C.csv"] {
            std::fs::write(dir.join(name).as_std_path(), b"x").unwrap();
        }
        let source = Source {
            id: "local".parse().unwrap(),
            name: "Local".to_string(),
            list_uri: dir.join("stations.json").to_string(),
            kind: SourceKind::Local {
                details: UriTemplate::new(format!("{dir}/hydroprd_{{id}}.txt")),
            },
            thumbnails: None,
        };

        let files = store.station_files(&source).unwrap();
        let ids: Vec<_> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(
            store.station_path(&source, &"A".parse().unwrap()),
            dir.join("hydroprd_A.txt")
        );
    }

    #[test]
    fn missing_mirror_lists_nothing() {
        let (_temp, store) = temp_store();
        let source = Source {
            id: "remote".parse().unwrap(),
            name: "Remote".to_string(),
            list_uri: "https://h.example/list".to_string(),
            kind: SourceKind::Remote {
                list_url: "https://h.example/list".to_string(),
                details: UriTemplate::new("https://h.example/{id}.txt"),
            },
            thumbnails: None,
        };
        assert!(store.station_files(&source).unwrap().is_empty());
    }
}
