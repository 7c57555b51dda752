//! OSRM routing provider.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ConfigError, RouteError};
use crate::geo::routing::{Route, RoutingProvider};
use crate::geo::{Coordinate, GeoConfig};

const PROVIDER: &str = "osrm";

/// `GET {base}/route/v1/driving/{lon},{lat};{lon},{lat}?overview=false`.
pub struct OsrmProvider {
    client: reqwest::Client,
    base_url: String,
}

/// Route service response.
#[derive(Debug, Deserialize)]
pub struct OsrmResponse {
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub routes: Vec<Route>,
}

impl OsrmProvider {
    pub fn new(config: &GeoConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: config.http_client()?,
            base_url: config.osrm_url.clone(),
        })
    }

    /// OSRM takes `lon,lat` pairs.
    fn route_url(&self, origin: Coordinate, destination: Coordinate) -> String {
        format!(
            "{}/route/v1/driving/{},{};{},{}",
            self.base_url, origin.lon, origin.lat, destination.lon, destination.lat
        )
    }
}

#[async_trait]
impl RoutingProvider for OsrmProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Vec<Route>, RouteError> {
        let url = self.route_url(origin, destination);
        debug!(url = %url, "OSRM route request");

        let resp = self
            .client
            .get(&url)
            .query(&[("overview", "false")])
            .send()
            .await
            .map_err(|e| request_failed(e.to_string()))?;

        // Error codes such as NoRoute come back as 4xx with a JSON body.
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| request_failed(e.to_string()))?;

        if status.is_server_error() {
            return Err(request_failed(format!("HTTP {status}: {body}")));
        }

        parse_route_response(&body)
    }
}

/// Interpret a route response: `Ok` → routes, `NoRoute` → empty, else error.
pub fn parse_route_response(body: &str) -> Result<Vec<Route>, RouteError> {
    let response: OsrmResponse =
        serde_json::from_str(body).map_err(|e| RouteError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: e.to_string(),
        })?;

    match response.code.as_str() {
        "Ok" => Ok(response.routes),
        "NoRoute" => Ok(Vec::new()),
        code => Err(request_failed(format!(
            "{code}: {}",
            response.message.unwrap_or_default()
        ))),
    }
}

fn request_failed(reason: String) -> RouteError {
    RouteError::RequestFailed {
        provider: PROVIDER.to_string(),
        reason,
    }
}
