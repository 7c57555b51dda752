//! Geocoding and routing.
//!
//! Both concerns sit behind a provider trait (`GeocodingProvider`,
//! `RoutingProvider`) with one HTTP implementation each: Nominatim for
//! place names, OSRM for driving routes.

pub mod geocoder;
pub mod nominatim;
pub mod osrm;
pub mod routing;

pub use geocoder::{GeocodeCandidate, Geocoder, GeocodingProvider, fallback_queries};
pub use nominatim::NominatimProvider;
pub use osrm::OsrmProvider;
pub use routing::{DistanceCalculator, Route, RoutingProvider};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A point in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Finite and inside the valid latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.5}, {:.5})", self.lat, self.lon)
    }
}

/// HTTP endpoints and client settings for the geo providers.
#[derive(Debug, Clone)]
pub struct GeoConfig {
    pub nominatim_url: String,
    pub osrm_url: String,
    /// Nominatim's usage policy requires an identifying User-Agent.
    pub user_agent: String,
    pub http_timeout: Duration,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            nominatim_url: "https://nominatim.openstreetmap.org".to_string(),
            osrm_url: "https://router.project-osrm.org".to_string(),
            user_agent: format!("quote-responder/{}", env!("CARGO_PKG_VERSION")),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl GeoConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            nominatim_url: lookup("NOMINATIM_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.nominatim_url),
            osrm_url: lookup("OSRM_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.osrm_url),
            user_agent: lookup("GEO_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout: Duration::from_secs(crate::config::parse_or(
                &lookup,
                "HTTP_TIMEOUT_SECS",
                defaults.http_timeout.as_secs(),
            )?),
        })
    }

    /// Shared HTTP client with timeout and User-Agent applied.
    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(self.http_timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "GEO_USER_AGENT".to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })
    }
}
