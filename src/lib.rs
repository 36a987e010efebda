//! Hydrological station ingestion and catalog engine.
//!
//! Mirrors per-station raw files from configured sources, normalizes both
//! upstream text layouts into GeoJSON features, and answers nearest-station
//! queries over the aggregated catalogs. River track files can also be
//! converted to GeoJSON line strings.

pub mod app;
pub mod catalog;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod feature;
pub mod lines;
pub mod output;
pub mod parser;
pub mod query;
pub mod registry;
pub mod retry;
pub mod store;
pub mod sync;
pub mod template;
