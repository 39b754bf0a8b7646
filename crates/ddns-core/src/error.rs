//! Error types for the DDNS system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for DDNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DDNS system
#[derive(Error, Debug)]
pub enum Error {
    /// Every configured IP source exhausted its retries
    #[error("IP detection failed: {0}")]
    DetectionFailed(String),

    /// A single IP source attempt failed (timeout, transport, malformed body)
    #[error("IP source error: {0}")]
    IpSource(String),

    /// Reading the DNS record from the provider failed
    #[error("DNS read error: {0}")]
    DnsRead(String),

    /// Writing the DNS record to the provider failed
    #[error("DNS write error: {0}")]
    DnsWrite(String),

    /// Provider writes are disabled (dry-run / no credentials)
    #[error("DNS writes are disabled: {0}")]
    WritesDisabled(String),

    /// Persistent state could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication errors (invalid provider credentials)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The configured zone or record is not accessible with these credentials
    #[error("Access denied: {0}")]
    Access(String),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a detection failure
    pub fn detection_failed(msg: impl Into<String>) -> Self {
        Self::DetectionFailed(msg.into())
    }

    /// Create an IP source error
    pub fn ip_source(msg: impl Into<String>) -> Self {
        Self::IpSource(msg.into())
    }

    /// Create a DNS read error
    pub fn dns_read(msg: impl Into<String>) -> Self {
        Self::DnsRead(msg.into())
    }

    /// Create a DNS write error
    pub fn dns_write(msg: impl Into<String>) -> Self {
        Self::DnsWrite(msg.into())
    }

    /// Create a "writes disabled" error
    pub fn writes_disabled(msg: impl Into<String>) -> Self {
        Self::WritesDisabled(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create an access error
    pub fn access(msg: impl Into<String>) -> Self {
        Self::Access(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
