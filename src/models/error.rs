//! Error types for freebie.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Expected failures (bad config, unparseable store data)
//! - I^B materialized: Infrastructure failures (network, timeout, session, mail)
//! - K_i violated: Internal invariant violations (bugs)

use thiserror::Error;

/// Top-level error type for freebie.
#[derive(Debug, Error)]
pub enum FreebieError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED: Belief proven wrong (expected failures)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED: Bounded ignorance became known-bad
    // ═══════════════════════════════════════════════════════════════════

    #[error("Store API error: {0}")]
    StoreApi(#[from] StoreApiError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("Session error: {message}")]
    Session {
        message: String,
        /// The service rejected the stored credentials or sentry
        credentials_rejected: bool,
    },

    #[error("Session bridge error: {0}")]
    Bridge(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED: Invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

/// Steam store API specific errors.
#[derive(Debug, Error)]
pub enum StoreApiError {
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl FreebieError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result type alias for freebie.
pub type Result<T> = std::result::Result<T, FreebieError>;
