//! oparl-validator: conformance checking for OParl open-data endpoints
//!
//! This crate crawls the document graph of an OParl system starting from a
//! seed URL, validates every reachable document against its type schema and
//! the protocol's HTTP rules, and aggregates the findings into a report.

pub mod cache;
pub mod config;
pub mod crawler;
pub mod output;
pub mod schema;
pub mod state;
pub mod url;
pub mod validation;

use thiserror::Error;

/// Main error type for validator operations
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Endpoint {url} is not reachable: {reason}")]
    EndpointUnreachable { url: String, reason: String },

    #[error("Schema error: {0}")]
    Schema(#[from] schema::SchemaError),

    #[error("Cache error: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid phase transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::CrawlPhase,
        to: state::CrawlPhase,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task failed: {0}")]
    Task(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for validator operations
pub type Result<T> = std::result::Result<T, ValidatorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::CrawlEngine;
pub use output::Report;
pub use schema::SchemaStore;
pub use state::CrawlPhase;
pub use url::normalize_url;
pub use validation::{ConformanceValidator, Severity};
