//! Configuration module for the validator
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files. Every key has a default, so the validator also runs without one.
//!
//! # Example
//!
//! ```no_run
//! use oparl_validator::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("validator.toml")).unwrap();
//! println!("Validation workers: {}", config.crawler.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CacheBackendKind, CacheConfig, Config, CrawlerConfig, OutputConfig, OutputFormat,
    ValidatorConfig,
};

// Re-export parser and validation functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{normalize_protocol_version, validate, MAX_CACHE_TTL_SECS, SUPPORTED_VERSIONS};
