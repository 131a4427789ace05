//! Error types for poma.

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Planner error: {0}")]
    Planner(#[from] PlannerError),

    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Portfolio store errors.
///
/// A failed write must never be reported as a successful mutation, so these
/// propagate out of the chat turn instead of degrading.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Model-planner errors.
///
/// These never surface to the user: the planner stack catches them and falls
/// back to the deterministic heuristic strategy.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("Model provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Balance/price lookup errors. Degrade the single affected value, never the
/// whole summary.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("{provider} request failed with HTTP {status}")]
    UpstreamStatus { provider: &'static str, status: u16 },

    #[error("{provider} RPC error: {message}")]
    Rpc { provider: &'static str, message: String },

    #[error("{provider} returned a malformed response: {reason}")]
    Malformed { provider: &'static str, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Conversion error: {0}")]
    Conversion(#[from] crate::units::ConversionError),
}
