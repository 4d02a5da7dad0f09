//! Error types for the ledger.

use std::fmt;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the ledger.
///
/// Every failure in this crate is recoverable. Variants map to the place the
/// failure surfaced so callers can pick a degraded view without string matching.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Input rejected before anything was written.
    ///
    /// Raised for an empty item name, a non-positive or non-finite price,
    /// or a malformed currency code.
    ValidationError(String),

    /// The remote store rejected a push, set, update or remove.
    ///
    /// Local state stays at the last snapshot the store delivered.
    ///
    /// **Recovery:** Retry the command; the next snapshot reconciles the view.
    WriteError(String),

    /// The remote store reported a stream-level failure for a subscription.
    ///
    /// The subscription keeps its last published records and exposes this
    /// error until a healthy snapshot arrives.
    SubscriptionError(String),

    /// Exchange-rate lookup failed (non-2xx, malformed body, missing rate,
    /// transport failure).
    ///
    /// The message is human readable and intended for display.
    ConversionError(String),

    /// Record could not be encoded for the store.
    SerializationError(String),

    /// Record from the store could not be decoded.
    DeserializationError(String),

    /// Invalid configuration (bad endpoint, HTTP client construction).
    ConfigError(String),

    /// Generic error with custom message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Error::WriteError(msg) => write!(f, "Write error: {}", msg),
            Error::SubscriptionError(msg) => write!(f, "Subscription error: {}", msg),
            // Shown to users as-is.
            Error::ConversionError(msg) => write!(f, "{}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// True for failures the caller caused and can fix by changing input.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::ValidationError(_))
    }
}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_syntax() || e.is_data() || e.is_eof() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        debug!("exchange-rate transport failure: {}", e);
        Error::ConversionError("Could not convert currency".to_string())
    }
}
