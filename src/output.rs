use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::app::{BuildResult, ProgressEvent, ProgressSink, StationView, UpdateResult};
use crate::domain::SourceInfo;
use crate::feature::{Feature, FeatureCollection};

/// Pretty JSON on stdout; progress goes to the log on stderr.
pub struct JsonOutput;

impl JsonOutput {
    pub fn print_sources(result: &[SourceInfo]) -> io::Result<()> {
        Self::print_json(&result)
    }

    pub fn print_source(result: &SourceInfo) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_catalog(result: &FeatureCollection) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_feature(result: &Feature) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_station(result: &StationView) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_update(result: &UpdateResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_build(result: &BuildResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}
