//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::pipeline::extract::Corrections;
use crate::retry::RetryPolicy;

/// Default marker keyword for the destination line.
pub const DEFAULT_MARKER: &str = "LOCATION";

/// Default subject for every generated reply.
pub const DEFAULT_REPLY_SUBJECT: &str = "Your transport quote";

/// Immutable per-run configuration handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct QuoteConfig {
    /// Place name every route starts from.
    pub base_location: String,
    /// Keyword that introduces the destination line (`KEYWORD: place`).
    pub marker: String,
    /// Known misspellings and their corrected forms.
    pub corrections: Corrections,
    /// Folder the latest message is read from.
    pub inbox_folder: String,
    /// Subject of the outgoing reply.
    pub reply_subject: String,
    /// Static pricing/business rules merged into every prompt.
    pub template_path: PathBuf,
    /// Sender allowlist (`*`, `user@domain`, `@domain`, `domain`).
    pub allowed_senders: Vec<String>,
    /// Compose but do not send.
    pub dry_run: bool,
    /// Rate-limit retry for geocoding calls.
    pub geocode_retry: RetryPolicy,
}

impl QuoteConfig {
    /// Minimal config with defaults for everything but the base location.
    pub fn new(base_location: impl Into<String>) -> Self {
        Self {
            base_location: base_location.into(),
            marker: DEFAULT_MARKER.to_string(),
            corrections: Corrections::default(),
            inbox_folder: "INBOX".to_string(),
            reply_subject: DEFAULT_REPLY_SUBJECT.to_string(),
            template_path: PathBuf::from("./template.txt"),
            allowed_senders: vec!["*".to_string()],
            dry_run: false,
            geocode_retry: RetryPolicy::default(),
        }
    }

    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_location = lookup("QUOTE_BASE_LOCATION")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "QUOTE_BASE_LOCATION".to_string(),
                hint: "Set it to the place every route starts from, e.g. \"Thun, Switzerland\""
                    .to_string(),
            })?;

        let mut config = Self::new(base_location);

        if let Some(marker) = lookup("QUOTE_MARKER") {
            let marker = marker.trim().to_string();
            if marker.is_empty() || marker.contains(':') {
                return Err(ConfigError::InvalidValue {
                    key: "QUOTE_MARKER".to_string(),
                    message: "must be a non-empty keyword without ':'".to_string(),
                });
            }
            config.marker = marker;
        }

        if let Some(raw) = lookup("QUOTE_CORRECTIONS") {
            config.corrections = Corrections::parse(&raw)?;
        }

        if let Some(folder) = lookup("QUOTE_INBOX_FOLDER").filter(|s| !s.trim().is_empty()) {
            config.inbox_folder = folder.trim().to_string();
        }

        if let Some(subject) = lookup("QUOTE_REPLY_SUBJECT").filter(|s| !s.trim().is_empty()) {
            config.reply_subject = subject.trim().to_string();
        }

        if let Some(path) = lookup("QUOTE_TEMPLATE_PATH") {
            config.template_path = PathBuf::from(path);
        }

        if let Some(raw) = lookup("QUOTE_ALLOWED_SENDERS") {
            config.allowed_senders = parse_list(&raw);
        }

        config.dry_run = lookup("QUOTE_DRY_RUN")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let defaults = RetryPolicy::default();
        config.geocode_retry = RetryPolicy {
            max_attempts: parse_or(&lookup, "GEOCODE_MAX_ATTEMPTS", defaults.max_attempts)?,
            initial_backoff: Duration::from_millis(parse_or(
                &lookup,
                "GEOCODE_BACKOFF_MS",
                defaults.initial_backoff.as_millis() as u64,
            )?),
            max_backoff: Duration::from_millis(parse_or(
                &lookup,
                "GEOCODE_MAX_BACKOFF_MS",
                defaults.max_backoff.as_millis() as u64,
            )?),
        };

        Ok(config)
    }
}

/// Split a comma-separated list, dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse an optional numeric value, falling back to `default` when unset.
pub(crate) fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}
