//! Shared types for the quote pipeline.

use serde::{Deserialize, Serialize};

use crate::channels::mailbox::SendReceipt;
use crate::error::RouteError;

// ── Locations ───────────────────────────────────────────────────────

/// Raw destination text captured after the marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationToken(String);

impl LocationToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Destination after misspelling corrections; what gets geocoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedLocation(String);

impl NormalizedLocation {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NormalizedLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Distance ────────────────────────────────────────────────────────

/// Non-negative driving distance in kilometres.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct DistanceKm(f64);

impl DistanceKm {
    /// Convert a router distance in metres. Rejects negative and non-finite values.
    pub fn from_meters(meters: f64, provider: &str) -> Result<Self, RouteError> {
        if !meters.is_finite() || meters < 0.0 {
            return Err(RouteError::InvalidResponse {
                provider: provider.to_string(),
                reason: format!("route distance {meters} is not a valid length"),
            });
        }
        Ok(Self(meters / 1000.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for DistanceKm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

// ── Reply ───────────────────────────────────────────────────────────

/// Generated reply, ready to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteReply {
    pub subject: String,
    pub body: String,
}

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct QuoteSummary {
    pub message_id: String,
    pub recipient: String,
    pub destination: NormalizedLocation,
    pub distance: DistanceKm,
    pub reply: QuoteReply,
    /// `None` on dry runs.
    pub receipt: Option<SendReceipt>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_converts_and_formats() {
        let d = DistanceKm::from_meters(25_000.0, "test").unwrap();
        assert!((d.value() - 25.0).abs() < f64::EPSILON);
        assert_eq!(d.to_string(), "25.00");

        let d = DistanceKm::from_meters(12_346.0, "test").unwrap();
        assert_eq!(d.to_string(), "12.35");
    }

    #[test]
    fn distance_rejects_negative_and_nan() {
        assert!(DistanceKm::from_meters(-1.0, "test").is_err());
        assert!(DistanceKm::from_meters(f64::NAN, "test").is_err());
        assert!(DistanceKm::from_meters(0.0, "test").is_ok());
    }
}
