use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Main configuration structure for the validator
///
/// Every section is optional in the TOML file; missing sections and keys
/// take their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub cache: CacheConfig,
    pub validator: ValidatorConfig,
    pub output: OutputConfig,
}

/// Crawl scope and concurrency configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Number of validation workers draining the queue
    pub workers: usize,

    /// Capacity of the shared work queue
    #[serde(rename = "queue-size")]
    pub queue_size: usize,

    /// Follow links beyond the seed document
    pub recursive: bool,

    /// Maximum number of documents admitted per type
    #[serde(rename = "max-documents")]
    pub max_documents: Option<usize>,

    /// Per-type overrides of `max-documents`, keyed by type name
    #[serde(rename = "type-limits")]
    pub type_limits: HashMap<String, usize>,

    /// Only admit documents of these types (empty admits every type)
    pub types: Vec<String>,

    /// Timeout for a single HTTP request, in seconds
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Base unit of the queue-full backoff, in milliseconds
    #[serde(rename = "backoff-unit-ms")]
    pub backoff_unit_ms: u64,

    /// Upper bound of a single backoff wait, in milliseconds
    #[serde(rename = "backoff-max-ms")]
    pub backoff_max_ms: u64,

    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            queue_size: 1000,
            recursive: false,
            max_documents: None,
            type_limits: HashMap::new(),
            types: Vec::new(),
            request_timeout_secs: 10,
            backoff_unit_ms: 1000,
            backoff_max_ms: 30_000,
            user_agent: format!("oparl-validator/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl CrawlerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

/// Which cache backend stores fetched bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Memory,
    Sqlite,
}

/// Response cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,

    /// Database file for the sqlite backend
    pub path: Option<String>,

    /// Lifetime of a cached body, in seconds
    #[serde(rename = "ttl-secs")]
    pub ttl_secs: u64,

    /// Fixed key namespace. When unset, every run gets its own namespace.
    pub basekey: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            path: None,
            ttl_secs: 3600,
            basekey: None,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Which checks run and against which schemas
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Protocol version to validate against ("1" and "1.0" are accepted)
    #[serde(rename = "oparl-version")]
    pub oparl_version: String,

    /// Directory of `<Type>.json` schema files replacing the bundled set
    #[serde(rename = "schema-dir")]
    pub schema_dir: Option<String>,

    #[serde(rename = "check-compression")]
    pub check_compression: bool,

    #[serde(rename = "check-file-reachability")]
    pub check_file_reachability: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            oparl_version: "1.0".to_string(),
            schema_dir: None,
            check_compression: true,
            check_file_reachability: true,
        }
    }
}

/// Report format written to stdout or the result file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,

    /// Omit affected document ids from the text report
    pub compact: bool,

    /// Stream progress as JSON-patch operations on stderr
    pub porcelain: bool,

    /// Write the report to this file instead of stdout
    #[serde(rename = "result-path")]
    pub result_path: Option<String>,
}
