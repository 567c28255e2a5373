//! Schema store
//!
//! Loads type schemas on first use, derives their [`SchemaDescriptor`] and
//! memoizes it for the lifetime of the store. Types are addressed by their
//! canonical id: the last path segment of the type name or URI, lowercased,
//! so `Body`, `body` and `https://schema.oparl.org/1.0/Body` all resolve to
//! `body`.

mod bundled;
mod descriptor;

pub use descriptor::{CustomPredicate, LinkSpec, LinkSpecKind, SchemaDescriptor};

use crate::config::{normalize_protocol_version, ValidatorConfig};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Schema-specific errors
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("No schema for type '{0}'")]
    NotFound(String),

    #[error("Invalid schema for type '{type_id}': {reason}")]
    Invalid { type_id: String, reason: String },

    #[error("No bundled schemas for protocol version {0}")]
    UnsupportedVersion(String),

    #[error("Failed to read schema: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse schema: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for schema operations
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;

/// Where schema documents come from
#[derive(Debug, Clone)]
pub enum SchemaSource {
    /// Compiled-in schemas of a protocol version
    Bundled(&'static str),
    /// A directory of `<Type>.json` files
    Directory(PathBuf),
}

/// Reduces a type name or type URI to its canonical id
///
/// # Examples
///
/// ```
/// use oparl_validator::schema::canonical_type_id;
///
/// assert_eq!(canonical_type_id("https://schema.oparl.org/1.0/Body"), "body");
/// assert_eq!(canonical_type_id("AgendaItem"), "agendaitem");
/// ```
pub fn canonical_type_id(name: &str) -> String {
    name.trim()
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Memoizing loader of schema descriptors
pub struct SchemaStore {
    source: SchemaSource,
    memo: RwLock<HashMap<String, Arc<SchemaDescriptor>>>,
}

impl SchemaStore {
    /// Creates a store over the bundled schemas of a protocol version
    pub fn bundled(version: &str) -> SchemaResult<Self> {
        let version = normalize_protocol_version(version)
            .map_err(|_| SchemaError::UnsupportedVersion(version.to_string()))?;
        if bundled::schemas_for(version).is_none() {
            return Err(SchemaError::UnsupportedVersion(version.to_string()));
        }
        Ok(Self::with_source(SchemaSource::Bundled(version)))
    }

    /// Creates a store reading `<Type>.json` files from a directory
    pub fn from_directory(dir: &Path) -> SchemaResult<Self> {
        if !dir.is_dir() {
            return Err(SchemaError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("schema directory {} does not exist", dir.display()),
            )));
        }
        Ok(Self::with_source(SchemaSource::Directory(dir.to_path_buf())))
    }

    /// Picks the source named by the configuration
    pub fn from_config(config: &ValidatorConfig) -> SchemaResult<Self> {
        match &config.schema_dir {
            Some(dir) => Self::from_directory(Path::new(dir)),
            None => Self::bundled(&config.oparl_version),
        }
    }

    fn with_source(source: SchemaSource) -> Self {
        Self {
            source,
            memo: RwLock::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &SchemaSource {
        &self.source
    }

    /// Returns the descriptor for a type, loading it on first use
    ///
    /// Two callers racing on the same unloaded type may both build it; the
    /// first insert wins and both receive the same `Arc`.
    pub fn get(&self, type_name: &str) -> SchemaResult<Arc<SchemaDescriptor>> {
        let type_id = canonical_type_id(type_name);
        if type_id.is_empty() {
            return Err(SchemaError::NotFound(type_name.to_string()));
        }

        if let Some(descriptor) = self.memo.read().get(&type_id) {
            return Ok(Arc::clone(descriptor));
        }

        let body = self.load(&type_id)?;
        let descriptor = Arc::new(SchemaDescriptor::from_value(&type_id, body)?);
        tracing::debug!("Loaded schema for type {}", descriptor.title);

        let mut memo = self.memo.write();
        Ok(Arc::clone(memo.entry(type_id).or_insert(descriptor)))
    }

    /// Drops the memoized descriptor of one type
    pub fn invalidate(&self, type_name: &str) {
        self.memo.write().remove(&canonical_type_id(type_name));
    }

    /// Drops every memoized descriptor
    pub fn invalidate_all(&self) {
        self.memo.write().clear();
    }

    /// Number of descriptors currently memoized
    pub fn loaded_count(&self) -> usize {
        self.memo.read().len()
    }

    /// Canonical ids of every type the source provides, sorted
    pub fn known_types(&self) -> Vec<String> {
        let mut types: Vec<String> = match &self.source {
            SchemaSource::Bundled(version) => bundled::schemas_for(version)
                .map(|table| table.iter().map(|(id, _)| id.to_string()).collect())
                .unwrap_or_default(),
            SchemaSource::Directory(dir) => match std::fs::read_dir(dir) {
                Ok(entries) => entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.path())
                    .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
                    .filter_map(|path| {
                        path.file_stem()
                            .and_then(|s| s.to_str())
                            .map(canonical_type_id)
                    })
                    .collect(),
                Err(e) => {
                    tracing::warn!("Cannot list schema directory {}: {}", dir.display(), e);
                    Vec::new()
                }
            },
        };
        types.sort();
        types.dedup();
        types
    }

    fn load(&self, type_id: &str) -> SchemaResult<Value> {
        match &self.source {
            SchemaSource::Bundled(version) => {
                let table = bundled::schemas_for(version)
                    .ok_or_else(|| SchemaError::UnsupportedVersion(version.to_string()))?;
                let (_, text) = table
                    .iter()
                    .find(|(id, _)| *id == type_id)
                    .ok_or_else(|| SchemaError::NotFound(type_id.to_string()))?;
                Ok(serde_json::from_str(text)?)
            }
            SchemaSource::Directory(dir) => {
                for entry in std::fs::read_dir(dir)? {
                    let path = entry?.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    let matches = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .map(|stem| canonical_type_id(stem) == type_id)
                        .unwrap_or(false);
                    if matches {
                        let text = std::fs::read_to_string(&path)?;
                        return Ok(serde_json::from_str(&text)?);
                    }
                }
                Err(SchemaError::NotFound(type_id.to_string()))
            }
        }
    }
}
