//! Documents handed to the validator

use crate::crawler::HttpMeta;
use crate::url::normalize_url;
use serde_json::Value;

/// Where a document came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOrigin {
    /// Retrieved from its own URL
    Fetched,
    /// Carried inline in a parent document
    Embedded { parent: String, field: String },
    /// Read from standard input
    Standalone,
}

/// One parsed document awaiting validation
#[derive(Debug, Clone)]
pub struct Document {
    /// URL the document was fetched from, or its synthetic id
    pub url: String,
    pub body: Value,
    /// Canonical type ids the referring link declared
    pub expected_types: Vec<String>,
    pub http: Option<HttpMeta>,
    pub origin: DocumentOrigin,
}

impl Document {
    /// Parses a fetched body
    pub fn parse(
        url: &str,
        raw: &str,
        expected_types: Vec<String>,
        http: Option<HttpMeta>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            url: url.to_string(),
            body: serde_json::from_str(raw)?,
            expected_types,
            http,
            origin: DocumentOrigin::Fetched,
        })
    }

    /// Wraps an object found inside another document
    pub fn embedded(
        id: &str,
        body: Value,
        expected_types: Vec<String>,
        parent: &str,
        field: &str,
    ) -> Self {
        Self {
            url: id.to_string(),
            body,
            expected_types,
            http: None,
            origin: DocumentOrigin::Embedded {
                parent: parent.to_string(),
                field: field.to_string(),
            },
        }
    }

    /// Parses a document given directly, without crawl context
    pub fn standalone(raw: &str) -> Result<Self, serde_json::Error> {
        let body: Value = serde_json::from_str(raw)?;
        let url = body
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("<stdin>")
            .to_string();
        Ok(Self {
            url,
            body,
            expected_types: Vec::new(),
            http: None,
            origin: DocumentOrigin::Standalone,
        })
    }

    /// Value of the `type` property
    pub fn declared_type(&self) -> Option<&str> {
        self.body.get("type").and_then(Value::as_str)
    }

    /// Value of the `id` property
    pub fn declared_id(&self) -> Option<&str> {
        self.body.get("id").and_then(Value::as_str)
    }

    /// The id findings are recorded under
    ///
    /// A fetched document is known by the id it declares, so every URL that
    /// serves the same document lands on one report entry.
    pub fn report_id(&self) -> &str {
        match (&self.origin, self.declared_id()) {
            (DocumentOrigin::Fetched, Some(id)) if normalize_url(id).is_ok() => id,
            _ => &self.url,
        }
    }
}
