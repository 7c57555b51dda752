//! Nominatim (OpenStreetMap) geocoding provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::error::{ConfigError, GeocodeError};
use crate::geo::GeoConfig;
use crate::geo::geocoder::{GeocodeCandidate, GeocodingProvider};

const PROVIDER: &str = "nominatim";

/// Geocodes via `GET {base}/search?q=..&format=json&limit=N`.
pub struct NominatimProvider {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimProvider {
    pub fn new(config: &GeoConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: config.http_client()?,
            base_url: config.nominatim_url.clone(),
        })
    }

    fn search_url(&self) -> String {
        format!("{}/search", self.base_url)
    }
}

#[async_trait]
impl GeocodingProvider for NominatimProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<GeocodeCandidate>, GeocodeError> {
        debug!(query = %query, limit, "Nominatim search");

        let limit = limit.to_string();
        let resp = self
            .client
            .get(self.search_url())
            .query(&[("q", query), ("format", "json"), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| request_failed(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GeocodeError::RateLimited {
                provider: PROVIDER.to_string(),
                retry_after: retry_after(resp.headers()),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(request_failed(format!("HTTP {status}: {body}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| request_failed(e.to_string()))?;
        parse_search_response(&body)
    }
}

/// Decode a `format=json` search response.
pub fn parse_search_response(body: &str) -> Result<Vec<GeocodeCandidate>, GeocodeError> {
    serde_json::from_str(body).map_err(|e| GeocodeError::InvalidResponse {
        provider: PROVIDER.to_string(),
        reason: e.to_string(),
    })
}

/// `Retry-After` in seconds, if the server sent one.
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn request_failed(reason: String) -> GeocodeError {
    GeocodeError::RequestFailed {
        provider: PROVIDER.to_string(),
        reason,
    }
}
