//! Source templates: `{id}` for the station, `{{NAME}}` for an environment variable.

use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

use crate::domain::StationId;

pub const STATION_PLACEHOLDER: &str = "{id}";

static ENV_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder pattern")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub template: UriTemplate,
    pub unresolved: Vec<String>,
}

impl UriTemplate {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn has_station_placeholder(&self) -> bool {
        self.without_env().contains(STATION_PLACEHOLDER)
    }

    pub fn env_placeholders(&self) -> Vec<String> {
        ENV_PLACEHOLDER
            .captures_iter(&self.0)
            .map(|caps| caps[1].to_string())
            .collect()
    }

    /// Substitutes `{{NAME}}` placeholders using `lookup`. Names `lookup`
    /// cannot resolve stay verbatim and are reported in `unresolved`.
    pub fn resolve_env<F>(&self, lookup: F) -> Resolution
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut unresolved = Vec::new();
        let resolved = ENV_PLACEHOLDER.replace_all(&self.0, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match lookup(name) {
                Some(value) => value,
                None => {
                    if !unresolved.iter().any(|known| known == name) {
                        unresolved.push(name.to_string());
                    }
                    caps[0].to_string()
                }
            }
        });
        Resolution {
            template: UriTemplate(resolved.into_owned()),
            unresolved,
        }
    }

    pub fn resolve_from_process_env(&self) -> Resolution {
        self.resolve_env(|name| std::env::var(name).ok())
    }

    pub fn expand(&self, station: &StationId) -> String {
        self.0.replace(STATION_PLACEHOLDER, station.as_str())
    }

    /// `None` unless `{id}` appears once, in the file name.
    pub fn local_pattern(&self) -> Option<LocalPattern> {
        let path = Utf8Path::new(&self.0);
        let file_name = path.file_name()?;
        let (prefix, suffix) = file_name.split_once(STATION_PLACEHOLDER)?;
        if suffix.contains(STATION_PLACEHOLDER) {
            return None;
        }
        let dir = path
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| Utf8PathBuf::from("."));
        if dir.as_str().contains(STATION_PLACEHOLDER) {
            return None;
        }
        Some(LocalPattern {
            dir: if dir.as_str().is_empty() {
                Utf8PathBuf::from(".")
            } else {
                dir
            },
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }

    fn without_env(&self) -> String {
        ENV_PLACEHOLDER.replace_all(&self.0, "").into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPattern {
    pub dir: Utf8PathBuf,
    pub prefix: String,
    pub suffix: String,
}

impl LocalPattern {
    pub fn station_id(&self, file_name: &str) -> Option<StationId> {
        let rest = file_name.strip_prefix(self.prefix.as_str())?;
        let id = rest.strip_suffix(self.suffix.as_str())?;
        id.parse().ok()
    }
}
