use crate::config::types::{CacheBackendKind, CacheConfig, Config, CrawlerConfig, OutputConfig};
use crate::ConfigError;

/// Upper bound for `ttl-secs`: ten years
pub const MAX_CACHE_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Protocol versions the bundled schemas cover
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_cache_config(&config.cache)?;
    normalize_protocol_version(&config.validator.oparl_version)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Maps the accepted spellings of a protocol version onto its canonical form
///
/// `"1"` and `"1.0"` both name version `1.0`.
pub fn normalize_protocol_version(version: &str) -> Result<&'static str, ConfigError> {
    let trimmed = version.trim();
    let canonical = if trimmed.contains('.') {
        trimmed.to_string()
    } else {
        format!("{}.0", trimmed)
    };

    SUPPORTED_VERSIONS
        .iter()
        .find(|v| **v == canonical)
        .copied()
        .ok_or_else(|| ConfigError::UnsupportedVersion(version.to_string()))
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.queue_size < 1 {
        return Err(ConfigError::Validation(
            "queue-size must be >= 1".to_string(),
        ));
    }

    if config.max_documents == Some(0) {
        return Err(ConfigError::Validation(
            "max-documents must be >= 1 when set".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.backoff_unit_ms < 1 {
        return Err(ConfigError::Validation(
            "backoff-unit-ms must be >= 1".to_string(),
        ));
    }

    if config.backoff_max_ms < config.backoff_unit_ms {
        return Err(ConfigError::Validation(format!(
            "backoff-max-ms ({}) must not be smaller than backoff-unit-ms ({})",
            config.backoff_max_ms, config.backoff_unit_ms
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.types.iter().any(|t| t.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "types cannot contain empty entries".to_string(),
        ));
    }

    Ok(())
}

fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.backend == CacheBackendKind::Sqlite
        && config.path.as_deref().map_or(true, |p| p.is_empty())
    {
        return Err(ConfigError::Validation(
            "cache backend 'sqlite' requires a path".to_string(),
        ));
    }

    if config.ttl_secs < 1 || config.ttl_secs > MAX_CACHE_TTL_SECS {
        return Err(ConfigError::Validation(format!(
            "ttl-secs must be between 1 and {}, got {}",
            MAX_CACHE_TTL_SECS, config.ttl_secs
        )));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    // Porcelain owns stderr and the report must not be mixed into it.
    if config.porcelain && config.result_path.is_none() {
        return Err(ConfigError::Validation(
            "porcelain mode requires a result path".to_string(),
        ));
    }

    if let Some(path) = &config.result_path {
        if path.is_empty() {
            return Err(ConfigError::Validation(
                "result-path cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}
