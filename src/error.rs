// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Error types for the Remora proxy

use thiserror::Error;

/// Result type alias for Remora operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Remora proxy
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Raw HTTP request parsing failed
    #[error("Request parse error: {0}")]
    Parse(String),

    /// Configuration error (validation or persistence)
    #[error("Configuration error: {0}")]
    Config(String),

    /// TLS or certificate generation error
    #[error("TLS error: {0}")]
    Tls(String),

    /// Proxy engine error
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// Intercept gate error
    #[error("Intercept error: {0}")]
    Intercept(String),

    /// Attack plan generation error
    #[error("Attack error: {0}")]
    Attack(String),

    /// Scanner error
    #[error("Scan error: {0}")]
    Scan(String),

    /// Spider error
    #[error("Spider error: {0}")]
    Spider(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new raw-request parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Error::Parse(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new TLS error
    pub fn tls<S: Into<String>>(msg: S) -> Self {
        Error::Tls(msg.into())
    }

    /// Create a new proxy error
    pub fn proxy<S: Into<String>>(msg: S) -> Self {
        Error::Proxy(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}
