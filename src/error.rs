//! Error types for the quote responder.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox fetch/send failures.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Mailbox {name} connection failed: {reason}")]
    ConnectionFailed { name: String, reason: String },

    #[error("Authentication failed for mailbox {name}")]
    AuthFailed { name: String },

    #[error("Folder {folder} contains no messages")]
    Empty { folder: String },

    #[error("Message could not be parsed: {0}")]
    InvalidMessage(String),

    #[error("Sender {sender} is not on the allowlist")]
    SenderNotAllowed { sender: String },

    #[error("Message {id} has no usable reply address")]
    NoReplyAddress { id: String },

    #[error("Failed to send via mailbox {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// Location marker extraction failures.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("No '{marker}:' line found in message body")]
    MarkerNotFound { marker: String },
}

/// Geocoding failures.
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("No coordinates found for '{query}'")]
    NotFound { query: String },

    #[error("Geocoder {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Geocoding '{query}' still rate limited after {attempts} attempts")]
    RetriesExhausted { query: String, attempts: u32 },

    #[error("Geocoder {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from geocoder {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Routing failures.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("No route found between origin and destination")]
    NoRoute,

    #[error("Router {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from router {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Template resource failures.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Failed to read template {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Template {path} is empty")]
    Empty { path: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Reply generation failures.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Model {model} returned no content")]
    EmptyCompletion { model: String },
}

/// Reply delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to send reply to {recipient}: {source}")]
    SendFailed {
        recipient: String,
        #[source]
        source: MailboxError,
    },
}

/// Which end of the route a geocoding call was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationRole {
    Origin,
    Destination,
}

impl std::fmt::Display for LocationRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Origin => f.write_str("origin"),
            Self::Destination => f.write_str("destination"),
        }
    }
}

/// A failed pipeline stage.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Geocoding {role} failed: {source}")]
    Geocode {
        role: LocationRole,
        #[source]
        source: GeocodeError,
    },

    #[error("Routing error: {0}")]
    Route(#[from] RouteError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

impl PipelineError {
    /// Short category label for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Mailbox(_) => "mailbox",
            Self::Extraction(_) => "extraction",
            Self::Geocode { .. } => "geocoding",
            Self::Route(_) => "routing",
            Self::Template(_) => "template",
            Self::Generation(_) => "generation",
            Self::Dispatch(_) => "dispatch",
        }
    }

    /// Process exit code for this failure category.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Mailbox(_) => 10,
            Self::Extraction(_) => 11,
            Self::Geocode { .. } => 12,
            Self::Route(_) => 13,
            Self::Template(_) => 14,
            Self::Generation(_) => 15,
            Self::Dispatch(_) => 16,
        }
    }
}

/// Exit code for configuration / start-up failures.
pub const CONFIG_EXIT_CODE: u8 = 2;
