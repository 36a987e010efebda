use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::warn;

use crate::domain::StationId;
use crate::error::CatalogError;
use crate::retry::is_retryable_error;

/// Network side of a remote source. One call is one attempt; retries are
/// the caller's business.
pub trait SourceClient: Send + Sync {
    fn fetch_inventory(&self, url: &str) -> Result<Inventory, CatalogError>;
    fn fetch_station(&self, url: &str) -> Result<Vec<u8>, CatalogError>;
}

/// Station identifiers listed upstream, in upstream order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    pub stations: Vec<StationId>,
}

#[derive(Debug, Deserialize)]
struct InventoryDocument {
    #[serde(default)]
    features: Vec<InventoryFeature>,
}

#[derive(Debug, Deserialize)]
struct InventoryFeature {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    properties: Option<InventoryProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InventoryProperties {
    #[serde(default)]
    product_identifier: Option<String>,
}

impl Inventory {
    /// Reads a GeoJSON-like station list; stations are identified by
    /// `properties.productIdentifier`, falling back to the feature `id`.
    pub fn from_json(bytes: &[u8]) -> Result<Self, CatalogError> {
        let document: InventoryDocument =
            serde_json::from_slice(bytes).map_err(|err| CatalogError::Inventory(err.to_string()))?;
        let mut stations = Vec::with_capacity(document.features.len());
        for feature in document.features {
            let raw = feature
                .properties
                .and_then(|props| props.product_identifier)
                .or_else(|| match feature.id {
                    Some(serde_json::Value::String(id)) => Some(id),
                    Some(serde_json::Value::Number(id)) => Some(id.to_string()),
                    _ => None,
                });
            let Some(raw) = raw else {
                warn!("inventory entry without station identifier skipped");
                continue;
            };
            match raw.parse::<StationId>() {
                Ok(id) if !stations.contains(&id) => stations.push(id),
                Ok(_) => {}
                Err(err) => warn!(station = %raw, error = %err, "inventory entry skipped"),
            }
        }
        Ok(Self { stations })
    }
}

#[derive(Clone)]
pub struct HttpSourceClient {
    client: Client,
}

impl HttpSourceClient {
    pub fn new(timeout: Duration) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("hydrocat/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CatalogError::Configuration(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| CatalogError::Http {
                message: err.to_string(),
                transient: false,
            })?;
        Ok(Self { client })
    }

    // Error messages drop the URL: it may carry credentials resolved from
    // the environment.
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, CatalogError> {
        let response = self.client.get(url).send().map_err(|err| CatalogError::Http {
            transient: is_retryable_error(&err),
            message: err.without_url().to_string(),
        })?;
        let response = handle_status(response)?;
        let bytes = response.bytes().map_err(|err| CatalogError::Http {
            transient: is_retryable_error(&err),
            message: err.without_url().to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

impl SourceClient for HttpSourceClient {
    fn fetch_inventory(&self, url: &str) -> Result<Inventory, CatalogError> {
        let bytes = self.get_bytes(url)?;
        Inventory::from_json(&bytes)
    }

    fn fetch_station(&self, url: &str) -> Result<Vec<u8>, CatalogError> {
        self.get_bytes(url)
    }
}

fn handle_status(response: Response) -> Result<Response, CatalogError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response
        .text()
        .map(|body| body.chars().take(200).collect::<String>())
        .unwrap_or_else(|_| "request failed".to_string());
    Err(CatalogError::HttpStatus { status, message })
}
