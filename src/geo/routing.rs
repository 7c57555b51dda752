//! Driving distance between two coordinates.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::RouteError;
use crate::geo::Coordinate;
use crate::pipeline::types::DistanceKm;

/// One candidate route. Distance in metres, duration in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub distance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// A driving-route service.
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Driving routes from `origin` to `destination`, best first.
    /// An empty list means the provider found no route.
    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Vec<Route>, RouteError>;
}

/// Turns a routing request into a distance in kilometres.
pub struct DistanceCalculator {
    provider: Arc<dyn RoutingProvider>,
}

impl DistanceCalculator {
    pub fn new(provider: Arc<dyn RoutingProvider>) -> Self {
        Self { provider }
    }

    /// Distance of the first route. One request, no retry.
    ///
    /// Swapping origin and destination gives the same value only when the
    /// provider's road graph is symmetric; one-way streets can break that.
    pub async fn compute_km(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<DistanceKm, RouteError> {
        debug!(%origin, %destination, provider = self.provider.name(), "Requesting route");

        let routes = self.provider.route(origin, destination).await?;
        let first = routes.first().ok_or(RouteError::NoRoute)?;
        let distance = DistanceKm::from_meters(first.distance, self.provider.name())?;

        info!(
            km = %distance,
            candidates = routes.len(),
            "Driving distance computed"
        );
        Ok(distance)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct FixedRouter {
        result: Mutex<Option<Result<Vec<Route>, RouteError>>>,
        calls: Mutex<Vec<(Coordinate, Coordinate)>>,
    }

    impl FixedRouter {
        fn new(result: Result<Vec<Route>, RouteError>) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(result)),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RoutingProvider for FixedRouter {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn route(
            &self,
            origin: Coordinate,
            destination: Coordinate,
        ) -> Result<Vec<Route>, RouteError> {
            self.calls.lock().unwrap().push((origin, destination));
            self.result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(vec![]))
        }
    }

    fn route(meters: f64) -> Route {
        Route {
            distance: meters,
            duration: None,
        }
    }

    const BERN: Coordinate = Coordinate { lat: 46.94, lon: 7.44 };
    const THUN: Coordinate = Coordinate { lat: 46.75, lon: 7.62 };

    #[tokio::test]
    async fn first_route_in_km() {
        let router = FixedRouter::new(Ok(vec![route(25_000.0), route(31_000.0)]));
        let calc = DistanceCalculator::new(router.clone());
        let km = calc.compute_km(THUN, BERN).await.unwrap();
        assert_eq!(km.to_string(), "25.00");
        assert_eq!(router.calls.lock().unwrap().as_slice(), &[(THUN, BERN)]);
    }

    #[tokio::test]
    async fn zero_routes_is_no_route() {
        let calc = DistanceCalculator::new(FixedRouter::new(Ok(vec![])));
        let err = calc.compute_km(THUN, BERN).await.unwrap_err();
        assert!(matches!(err, RouteError::NoRoute));
    }

    #[tokio::test]
    async fn transport_error_propagates() {
        let calc = DistanceCalculator::new(FixedRouter::new(Err(RouteError::RequestFailed {
            provider: "fixed".into(),
            reason: "timeout".into(),
        })));
        let err = calc.compute_km(THUN, BERN).await.unwrap_err();
        assert!(matches!(err, RouteError::RequestFailed { .. }));
    }

    #[tokio::test]
    async fn negative_distance_rejected() {
        let calc = DistanceCalculator::new(FixedRouter::new(Ok(vec![route(-5.0)])));
        let err = calc.compute_km(THUN, BERN).await.unwrap_err();
        assert!(matches!(err, RouteError::InvalidResponse { .. }));
    }
}
