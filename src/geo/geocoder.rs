//! Geocoder — place name to coordinate, with locality fallback and bounded
//! rate-limit retry.
//!
//! Lookup order is explicit: `fallback_queries("A, B, C")` yields
//! `["A, B, C", "A, B", "A"]`. Each query is tried once (plus rate-limit
//! retries); the first query with a result wins.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::GeocodeError;
use crate::geo::Coordinate;
use crate::retry::RetryPolicy;

/// Separator between locality and region/country.
const SEGMENT_DELIMITER: char = ',';

/// One result from a geocoding provider. Coordinates arrive as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeCandidate {
    pub lat: String,
    pub lon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl GeocodeCandidate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat: lat.to_string(),
            lon: lon.to_string(),
            display_name: None,
        }
    }

    /// Parse the string coordinates; malformed or out-of-range values are an error.
    pub fn coordinate(&self, provider: &str) -> Result<Coordinate, GeocodeError> {
        let invalid = |reason: String| GeocodeError::InvalidResponse {
            provider: provider.to_string(),
            reason,
        };
        let lat: f64 = self
            .lat
            .trim()
            .parse()
            .map_err(|e| invalid(format!("latitude '{}': {e}", self.lat)))?;
        let lon: f64 = self
            .lon
            .trim()
            .parse()
            .map_err(|e| invalid(format!("longitude '{}': {e}", self.lon)))?;
        let coordinate = Coordinate::new(lat, lon);
        if !coordinate.is_valid() {
            return Err(invalid(format!("coordinate {coordinate} out of range")));
        }
        Ok(coordinate)
    }
}

/// A place-name search service.
#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Search for `query`, returning at most `limit` candidates.
    ///
    /// Rate limiting must be reported as `GeocodeError::RateLimited`.
    async fn search(&self, query: &str, limit: usize)
    -> Result<Vec<GeocodeCandidate>, GeocodeError>;
}

/// Candidate queries, most specific first: the place name as given (trimmed),
/// then the name rebuilt from its first `n` segments for `n` counting down
/// to one. Segments are trimmed and empty ones ignored; a rebuilt query equal
/// to an earlier one is skipped. A name with no non-empty segment yields
/// nothing.
pub fn fallback_queries(place: &str) -> Vec<String> {
    let segments: Vec<&str> = place
        .split(SEGMENT_DELIMITER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        return Vec::new();
    }

    let mut queries = vec![place.trim().to_string()];
    for n in (1..=segments.len()).rev() {
        let query = segments[..n].join(", ");
        if !queries.contains(&query) {
            queries.push(query);
        }
    }
    queries
}

/// Resolves place names through a provider.
pub struct Geocoder {
    provider: Arc<dyn GeocodingProvider>,
    retry: RetryPolicy,
}

impl Geocoder {
    pub fn new(provider: Arc<dyn GeocodingProvider>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    /// Coordinate for `place`, narrowing on the delimiter when nothing matches.
    ///
    /// Rate-limit exhaustion and transport errors end the lookup immediately;
    /// only an empty result moves on to the next, shorter query.
    pub async fn resolve(&self, place: &str) -> Result<Coordinate, GeocodeError> {
        let queries = fallback_queries(place);

        for (step, query) in queries.iter().enumerate() {
            if step > 0 {
                debug!(place = %place, query = %query, step, "Geocoder falling back to shorter query");
            }
            if let Some(coordinate) = self.search_with_retry(query).await? {
                info!(
                    place = %place,
                    query = %query,
                    lat = coordinate.lat,
                    lon = coordinate.lon,
                    "Geocoded place"
                );
                return Ok(coordinate);
            }
        }

        Err(GeocodeError::NotFound {
            query: place.to_string(),
        })
    }

    /// One query, retried only while the provider reports rate limiting.
    async fn search_with_retry(&self, query: &str) -> Result<Option<Coordinate>, GeocodeError> {
        let attempts = self.retry.attempts();

        for attempt in 1..=attempts {
            match self.provider.search(query, 1).await {
                Ok(candidates) => {
                    return candidates
                        .first()
                        .map(|c| c.coordinate(self.provider.name()))
                        .transpose();
                }
                Err(GeocodeError::RateLimited { retry_after, .. }) if attempt < attempts => {
                    let wait = self.retry.backoff(attempt, retry_after);
                    warn!(
                        provider = self.provider.name(),
                        query = %query,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "Geocoder rate limited, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(GeocodeError::RateLimited { .. }) => break,
                Err(e) => return Err(e),
            }
        }

        Err(GeocodeError::RetriesExhausted {
            query: query.to_string(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    /// Scripted provider: per-query queue of responses, records every call.
    #[derive(Default)]
    struct ScriptedProvider {
        responses: Mutex<HashMap<String, VecDeque<Result<Vec<GeocodeCandidate>, GeocodeError>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn respond(self, query: &str, response: Result<Vec<GeocodeCandidate>, GeocodeError>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .entry(query.to_string())
                .or_default()
                .push_back(response);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GeocodingProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn search(
            &self,
            query: &str,
            limit: usize,
        ) -> Result<Vec<GeocodeCandidate>, GeocodeError> {
            assert_eq!(limit, 1);
            self.calls.lock().unwrap().push(query.to_string());
            self.responses
                .lock()
                .unwrap()
                .get_mut(query)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Ok(vec![]))
        }
    }

    fn rate_limited() -> Result<Vec<GeocodeCandidate>, GeocodeError> {
        Err(GeocodeError::RateLimited {
            provider: "scripted".into(),
            retry_after: Some(Duration::from_secs(30)),
        })
    }

    fn geocoder(provider: &Arc<ScriptedProvider>, attempts: u32) -> Geocoder {
        Geocoder::new(provider.clone(), RetryPolicy::immediate(attempts))
    }

    // ── fallback_queries ────────────────────────────────────────────

    #[test]
    fn fallback_queries_narrow_left_to_right() {
        assert_eq!(
            fallback_queries("Nowhereville, Bern, Switzerland"),
            vec!["Nowhereville, Bern, Switzerland", "Nowhereville, Bern", "Nowhereville"]
        );
    }

    #[test]
    fn fallback_queries_single_segment() {
        assert_eq!(fallback_queries("Thun"), vec!["Thun"]);
    }

    #[test]
    fn fallback_queries_skip_blank_segments() {
        assert_eq!(
            fallback_queries(" Thun , ,CH,"),
            vec!["Thun , ,CH,", "Thun, CH", "Thun"]
        );
        assert!(fallback_queries(" , ").is_empty());
    }

    #[test]
    fn fallback_queries_start_with_name_as_written() {
        assert_eq!(
            fallback_queries("  Bern,Switzerland "),
            vec!["Bern,Switzerland", "Bern, Switzerland", "Bern"]
        );
        assert_eq!(fallback_queries(" Thun "), vec!["Thun"]);
    }

    // ── resolve ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn resolve_first_hit() {
        let provider = Arc::new(
            ScriptedProvider::default()
                .respond("Bern, Switzerland", Ok(vec![GeocodeCandidate::new(46.94, 7.44)])),
        );
        let coordinate = geocoder(&provider, 3).resolve("Bern, Switzerland").await.unwrap();
        assert_eq!(coordinate, Coordinate::new(46.94, 7.44));
        assert_eq!(provider.calls(), vec!["Bern, Switzerland"]);
    }

    #[tokio::test]
    async fn resolve_falls_back_once_then_gives_up() {
        let provider = Arc::new(ScriptedProvider::default());
        let err = geocoder(&provider, 3)
            .resolve("Nowhereville, Switzerland")
            .await
            .unwrap_err();
        assert!(matches!(err, GeocodeError::NotFound { .. }));
        assert_eq!(
            provider.calls(),
            vec!["Nowhereville, Switzerland", "Nowhereville"]
        );
    }

    #[tokio::test]
    async fn resolve_uses_fallback_hit() {
        let provider = Arc::new(
            ScriptedProvider::default()
                .respond("Thun", Ok(vec![GeocodeCandidate::new(46.75, 7.62)])),
        );
        let coordinate = geocoder(&provider, 3)
            .resolve("Thun, Bernese Oberland, CH")
            .await
            .unwrap();
        assert_eq!(coordinate, Coordinate::new(46.75, 7.62));
        assert_eq!(provider.calls().len(), 3);
    }

    #[tokio::test]
    async fn resolve_queries_name_as_written_first() {
        let provider = Arc::new(ScriptedProvider::default());
        let _ = geocoder(&provider, 3).resolve(" Bern,CH ").await;
        assert_eq!(provider.calls(), vec!["Bern,CH", "Bern, CH", "Bern"]);
    }

    #[tokio::test]
    async fn resolve_no_delimiter_no_match() {
        let provider = Arc::new(ScriptedProvider::default());
        let err = geocoder(&provider, 3).resolve("Atlantis").await.unwrap_err();
        assert!(matches!(err, GeocodeError::NotFound { .. }));
        assert_eq!(provider.calls(), vec!["Atlantis"]);
    }

    #[tokio::test]
    async fn resolve_steps_bounded_by_segment_count() {
        let provider = Arc::new(ScriptedProvider::default());
        let place = "a, b, c, d, e";
        let _ = geocoder(&provider, 3).resolve(place).await;
        assert_eq!(provider.calls().len(), 5);
    }

    #[tokio::test]
    async fn resolve_retries_rate_limit_then_succeeds() {
        let provider = Arc::new(
            ScriptedProvider::default()
                .respond("Bern", rate_limited())
                .respond("Bern", rate_limited())
                .respond("Bern", Ok(vec![GeocodeCandidate::new(46.94, 7.44)])),
        );
        let coordinate = geocoder(&provider, 3).resolve("Bern").await.unwrap();
        assert_eq!(coordinate, Coordinate::new(46.94, 7.44));
        assert_eq!(provider.calls(), vec!["Bern", "Bern", "Bern"]);
    }

    #[tokio::test]
    async fn resolve_rate_limit_exhausted() {
        let provider = Arc::new(
            ScriptedProvider::default()
                .respond("Bern, CH", rate_limited())
                .respond("Bern, CH", rate_limited()),
        );
        let err = geocoder(&provider, 2).resolve("Bern, CH").await.unwrap_err();
        match err {
            GeocodeError::RetriesExhausted { query, attempts } => {
                assert_eq!(query, "Bern, CH");
                assert_eq!(attempts, 2);
            }
            other => panic!("Expected RetriesExhausted, got {other:?}"),
        }
        // No fallback after exhaustion.
        assert_eq!(provider.calls(), vec!["Bern, CH", "Bern, CH"]);
    }

    #[tokio::test]
    async fn resolve_transport_error_not_retried() {
        let provider = Arc::new(ScriptedProvider::default().respond(
            "Bern, CH",
            Err(GeocodeError::RequestFailed {
                provider: "scripted".into(),
                reason: "connection reset".into(),
            }),
        ));
        let err = geocoder(&provider, 3).resolve("Bern, CH").await.unwrap_err();
        assert!(matches!(err, GeocodeError::RequestFailed { .. }));
        assert_eq!(provider.calls(), vec!["Bern, CH"]);
    }

    #[tokio::test]
    async fn resolve_rejects_malformed_candidate() {
        let provider = Arc::new(ScriptedProvider::default().respond(
            "Bern",
            Ok(vec![GeocodeCandidate {
                lat: "north".into(),
                lon: "7.44".into(),
                display_name: None,
            }]),
        ));
        let err = geocoder(&provider, 3).resolve("Bern").await.unwrap_err();
        assert!(matches!(err, GeocodeError::InvalidResponse { .. }));
    }

    #[test]
    fn candidate_parses_string_coordinates() {
        let candidate = GeocodeCandidate {
            lat: " 46.9480 ".into(),
            lon: "7.4474".into(),
            display_name: Some("Bern".into()),
        };
        assert_eq!(
            candidate.coordinate("t").unwrap(),
            Coordinate::new(46.948, 7.4474)
        );
    }
}
