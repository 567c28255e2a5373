//! Conformance validation
//!
//! [`ConformanceValidator`] judges one [`Document`] at a time. It runs two
//! independent groups of checks:
//!
//! - **schema checks**: type resolution, JSON Schema (draft 4), the custom
//!   predicates the schema names, recommended and custom properties
//! - **protocol checks**: HTTP status, compression negotiation, reserved
//!   query parameters, id/URL agreement and file reachability
//!
//! The validator never fails; everything it finds becomes a [`Finding`].

mod document;
mod message;
mod predicates;

pub use document::{Document, DocumentOrigin};
pub use message::{Finding, Severity, ValidationMessage};
pub use predicates::{Predicate, PredicateRegistry, KNOWN_OPARL_VERSIONS};

use crate::config::ValidatorConfig;
use crate::crawler::{DocumentFetcher, HttpMeta, SUPPORTED_ENCODINGS};
use crate::output::PropertyPresence;
use crate::schema::{canonical_type_id, SchemaDescriptor, SchemaError, SchemaStore};
use crate::url::{normalize_url, reserved_params};
use serde_json::Value;
use std::sync::Arc;

/// Type name used in the report when a document's type cannot be resolved
pub const UNKNOWN_TYPE: &str = "Unknown";

/// Warning for a fetched document whose `id` names another URL
pub const ID_MISMATCH: &str = "Document id differs from the URL it was retrieved from";

/// Everything learned about one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    /// Display name of the document's type, used to group report messages
    pub type_name: String,
    pub findings: Vec<Finding>,
    /// Present when the type resolved
    pub presence: Option<PropertyPresence>,
}

impl Validation {
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }
}

pub struct ConformanceValidator {
    schemas: Arc<SchemaStore>,
    predicates: Arc<PredicateRegistry>,
    fetcher: Option<Arc<DocumentFetcher>>,
    check_compression: bool,
    check_file_reachability: bool,
}

impl ConformanceValidator {
    /// A validator with every check enabled and no network access
    pub fn new(schemas: Arc<SchemaStore>, predicates: Arc<PredicateRegistry>) -> Self {
        Self {
            schemas,
            predicates,
            fetcher: None,
            check_compression: true,
            check_file_reachability: true,
        }
    }

    pub fn from_config(
        config: &ValidatorConfig,
        schemas: Arc<SchemaStore>,
        predicates: Arc<PredicateRegistry>,
        fetcher: Option<Arc<DocumentFetcher>>,
    ) -> Self {
        Self {
            schemas,
            predicates,
            fetcher,
            check_compression: config.check_compression,
            check_file_reachability: config.check_file_reachability,
        }
    }

    /// Lets file checks issue HEAD requests
    pub fn with_fetcher(mut self, fetcher: Arc<DocumentFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn schemas(&self) -> &Arc<SchemaStore> {
        &self.schemas
    }

    /// Runs every applicable check against the document
    pub async fn validate(&self, document: &Document) -> Validation {
        let mut findings = self.check_protocol(document);

        let (type_name, descriptor, schema_findings, presence) = self.check_schema(document);
        findings.extend(schema_findings);

        if let Some(descriptor) = descriptor {
            if descriptor.type_id == "file" {
                findings.extend(self.check_file(document).await);
            }
        }

        Validation {
            type_name,
            findings,
            presence,
        }
    }

    /// Type resolution, schema validation, predicates and property usage
    ///
    /// Returns the report type name, the resolved descriptor, the findings
    /// and the property presence.
    pub fn check_schema(
        &self,
        document: &Document,
    ) -> (
        String,
        Option<Arc<SchemaDescriptor>>,
        Vec<Finding>,
        Option<PropertyPresence>,
    ) {
        let mut findings = Vec::new();

        let Some(declared) = document.declared_type() else {
            findings.push(Finding::error("Document has no type property"));
            return (UNKNOWN_TYPE.to_string(), None, findings, None);
        };

        let descriptor = match self.schemas.get(declared) {
            Ok(descriptor) => descriptor,
            Err(SchemaError::NotFound(_)) => {
                findings.push(Finding::error(format!("Unknown type '{}'", declared)));
                return (display_type(declared), None, findings, None);
            }
            Err(e) => {
                tracing::warn!("Schema for {} unusable: {}", declared, e);
                findings.push(Finding::error(format!(
                    "Schema for type '{}' could not be loaded",
                    declared
                )));
                return (display_type(declared), None, findings, None);
            }
        };

        if !document.expected_types.is_empty()
            && !document.expected_types.contains(&descriptor.type_id)
        {
            findings.push(Finding::warning(format!(
                "Expected a document of type {}, found {}",
                self.display_expected(&document.expected_types),
                descriptor.title
            )));
        }

        findings.extend(
            descriptor
                .validate(&document.body)
                .into_iter()
                .map(Finding::error),
        );

        for rule in &descriptor.custom_predicates {
            match self.predicates.get(&rule.method) {
                Some(predicate) => {
                    if !predicate(&document.body) {
                        findings.push(
                            Finding::new(rule.severity, rule.message.clone())
                                .with_section(rule.section.clone()),
                        );
                    }
                }
                None => tracing::warn!(
                    "Schema {} names unknown predicate '{}'",
                    descriptor.title,
                    rule.method
                ),
            }
        }

        let presence = property_presence(&descriptor, &document.body);
        for missing in descriptor
            .recommended
            .iter()
            .filter(|p| document.body.get(p.as_str()).is_none())
        {
            findings.push(Finding::info(format!(
                "Recommended property '{}' is missing",
                missing
            )));
        }
        for custom in &presence.custom {
            findings.push(Finding::info(format!(
                "Property '{}' is not part of the schema",
                custom
            )));
        }

        (descriptor.title.clone(), Some(descriptor), findings, Some(presence))
    }

    /// HTTP-level checks
    ///
    /// Checks that need live response metadata are skipped for cache hits
    /// and for documents that were never fetched on their own.
    pub fn check_protocol(&self, document: &Document) -> Vec<Finding> {
        let mut findings = self.check_http(document.http.as_ref());

        let mut urls = vec![document.url.as_str()];
        if let Some(id) = document.declared_id() {
            if id != document.url {
                urls.push(id);
            }
        }
        findings.extend(reserved_param_findings(&urls));

        if document.http.is_some() {
            if let Some(id) = document.declared_id() {
                if !same_url(id, &document.url) {
                    findings.push(Finding::warning(ID_MISMATCH));
                }
            }
        }

        findings
    }

    /// Protocol checks for a response that is not itself a document
    ///
    /// External list pages go through this: status, compression and
    /// reserved query parameters of the page URL.
    pub fn check_response(&self, url: &str, http: Option<&HttpMeta>) -> Vec<Finding> {
        let mut findings = self.check_http(http);
        findings.extend(reserved_param_findings(&[url]));
        findings
    }

    fn check_http(&self, http: Option<&HttpMeta>) -> Vec<Finding> {
        let mut findings = Vec::new();
        let Some(http) = http.filter(|h| !h.from_cache) else {
            return findings;
        };

        if !(200..400).contains(&http.status) {
            findings.push(Finding::error(format!(
                "HTTP status {} is not a success status",
                http.status
            )));
        }

        if self.check_compression {
            if let Some(requested) = &http.requested_encoding {
                match http.content_encoding.as_deref() {
                    None | Some("identity") => findings.push(Finding::error(format!(
                        "Response is not compressed although '{}' was accepted",
                        requested
                    ))),
                    Some(encoding) if !SUPPORTED_ENCODINGS.contains(&encoding) => {
                        findings.push(Finding::error(format!(
                            "Response uses unsupported Content-Encoding '{}'",
                            encoding
                        )))
                    }
                    Some(_) => {}
                }
            }
        }

        findings
    }

    /// Reachability of a File's access and download URLs
    async fn check_file(&self, document: &Document) -> Vec<Finding> {
        let mut findings = Vec::new();
        let access_url = document.body.get("accessUrl").and_then(Value::as_str);
        let download_url = document.body.get("downloadUrl").and_then(Value::as_str);

        if download_url.is_none() {
            findings.push(Finding::info(
                "It is recommended to provide a separate downloadUrl",
            ));
        }

        let fetcher = match (&self.fetcher, self.check_file_reachability) {
            (Some(fetcher), true) => fetcher,
            _ => return findings,
        };

        // A missing accessUrl is already a schema error.
        if let Some(access_url) = access_url {
            match fetcher.head(access_url).await {
                Ok(head) => {
                    if head.last_modified.is_none() {
                        findings.push(Finding::warning(
                            "File accessUrl response lacks a Last-Modified header",
                        ));
                    }
                }
                Err(e) => {
                    tracing::debug!("HEAD {} failed: {}", access_url, e);
                    findings.push(Finding::warning("File accessUrl is not reachable"));
                }
            }
        }

        if let Some(download_url) = download_url {
            match fetcher.head(download_url).await {
                Ok(head) => {
                    let names_file = head
                        .content_disposition
                        .as_deref()
                        .is_some_and(|v| v.to_ascii_lowercase().contains("filename"));
                    if !names_file {
                        findings.push(Finding::warning(
                            "File downloadUrl response lacks a Content-Disposition header naming the file",
                        ));
                    }
                    if head.last_modified.is_none() {
                        findings.push(Finding::warning(
                            "File downloadUrl response lacks a Last-Modified header",
                        ));
                    }
                }
                Err(e) => {
                    tracing::debug!("HEAD {} failed: {}", download_url, e);
                    findings.push(Finding::warning("File downloadUrl is not reachable"));
                }
            }
        }

        findings
    }

    fn display_expected(&self, expected: &[String]) -> String {
        expected
            .iter()
            .map(|t| {
                self.schemas
                    .get(t)
                    .map(|d| d.title.clone())
                    .unwrap_or_else(|_| t.clone())
            })
            .collect::<Vec<_>>()
            .join(" or ")
    }
}

/// Last URI segment of a declared type, kept in its original case
fn display_type(declared: &str) -> String {
    if canonical_type_id(declared).is_empty() {
        return UNKNOWN_TYPE.to_string();
    }
    declared
        .trim()
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(UNKNOWN_TYPE)
        .to_string()
}

fn same_url(a: &str, b: &str) -> bool {
    match (normalize_url(a), normalize_url(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn reserved_param_findings(urls: &[&str]) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut reported: Vec<String> = Vec::new();
    for url in urls {
        let Ok(parsed) = normalize_url(url) else {
            continue;
        };
        for param in reserved_params(&parsed) {
            if !reported.contains(&param) {
                findings.push(Finding::error(format!(
                    "URL carries reserved query parameter '{}'",
                    param
                )));
                reported.push(param);
            }
        }
    }
    findings
}

fn property_presence(descriptor: &SchemaDescriptor, body: &Value) -> PropertyPresence {
    let mut presence = PropertyPresence::default();
    if let Some(object) = body.as_object() {
        for key in object.keys() {
            if descriptor.recommended.contains(key) {
                presence.recommended.push(key.clone());
            } else if descriptor.optional.contains(key) {
                presence.optional.push(key.clone());
            } else if !descriptor.required.contains(key) {
                presence.custom.push(key.clone());
            }
        }
    }
    presence
}
