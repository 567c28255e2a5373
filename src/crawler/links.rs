//! Link mining
//!
//! Turns the linking properties a schema declares into typed edges. The
//! schema says which properties link and what type they point to, so no
//! guessing from the URL shape is needed.

use crate::schema::{LinkSpecKind, SchemaDescriptor};
use crate::url::normalize_url;
use serde_json::Value;

/// How a mined edge is followed
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeKind {
    /// Fetch the target as a document
    Reference,
    /// Fetch the target as a paginated list
    ExternalList,
    /// The target is already here
    Embedded(Box<Value>),
}

/// Where an edge was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSource {
    pub parent_url: String,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkEdge {
    /// Normalized URL, or the synthetic id of an embedded object
    pub target_url: String,
    /// Canonical type ids, most likely first
    pub expected_types: Vec<String>,
    pub source: LinkSource,
    pub kind: EdgeKind,
}

impl LinkEdge {
    /// The type quotas and the whitelist apply to
    pub fn primary_type(&self) -> Option<&str> {
        self.expected_types.first().map(String::as_str)
    }
}

pub struct LinkMiner;

impl LinkMiner {
    /// Extracts all edges of `body`, in property order
    ///
    /// URLs that do not normalize are skipped. Embedded objects without an
    /// `id` are named `parent#field` (or `parent#field[i]` inside arrays).
    pub fn mine(descriptor: &SchemaDescriptor, parent_url: &str, body: &Value) -> Vec<LinkEdge> {
        let Some(object) = body.as_object() else {
            return Vec::new();
        };

        let mut edges = Vec::new();
        for (field, value) in object {
            let Some(spec) = descriptor.link(field) else {
                continue;
            };
            let source = LinkSource {
                parent_url: parent_url.to_string(),
                field: field.clone(),
            };

            match spec.kind {
                LinkSpecKind::Reference | LinkSpecKind::List => {
                    let kind = if spec.kind == LinkSpecKind::List {
                        EdgeKind::ExternalList
                    } else {
                        EdgeKind::Reference
                    };
                    for raw in url_values(value) {
                        match normalize_url(raw) {
                            Ok(url) => edges.push(LinkEdge {
                                target_url: url.to_string(),
                                expected_types: spec.expected_types.clone(),
                                source: source.clone(),
                                kind: kind.clone(),
                            }),
                            Err(e) => {
                                tracing::debug!("Skipping link {}.{} = {}: {}", parent_url, field, raw, e)
                            }
                        }
                    }
                }
                LinkSpecKind::Embedded => {
                    for (index, item) in embedded_values(value) {
                        edges.push(embedded_edge(
                            item,
                            parent_url,
                            field,
                            index,
                            &spec.expected_types,
                            source.clone(),
                        ));
                    }
                }
            }
        }
        edges
    }
}

fn url_values(value: &Value) -> Vec<&str> {
    match value {
        Value::String(url) => vec![url.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn embedded_values(value: &Value) -> Vec<(Option<usize>, &Value)> {
    match value {
        Value::Object(_) => vec![(None, value)],
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_object())
            .map(|(i, item)| (Some(i), item))
            .collect(),
        _ => Vec::new(),
    }
}

fn embedded_edge(
    item: &Value,
    parent_url: &str,
    field: &str,
    index: Option<usize>,
    expected_types: &[String],
    source: LinkSource,
) -> LinkEdge {
    let id = item
        .get("id")
        .and_then(Value::as_str)
        .and_then(|id| normalize_url(id).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| synthetic_id(parent_url, field, index));

    LinkEdge {
        target_url: id,
        expected_types: expected_types.to_vec(),
        source,
        kind: EdgeKind::Embedded(Box::new(item.clone())),
    }
}

/// Name for an inline object that has no id of its own
pub fn synthetic_id(parent_url: &str, field: &str, index: Option<usize>) -> String {
    match index {
        Some(i) => format!("{}#{}[{}]", parent_url, field, i),
        None => format!("{}#{}", parent_url, field),
    }
}

/// One page of an external list
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage {
    pub items: Vec<Value>,
    /// Normalized URL of the following page
    pub next: Option<String>,
}

impl ListPage {
    /// Parses `{"data": [...], "links": {"next": "..."}}`
    ///
    /// A body without a `data` array is not a list page.
    pub fn parse(raw: &str) -> Result<Self, ListPageError> {
        let body: Value = serde_json::from_str(raw).map_err(|e| ListPageError::Json(e.to_string()))?;
        let items = body
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .ok_or(ListPageError::MissingData)?;
        let next = body
            .get("links")
            .and_then(|links| links.get("next"))
            .and_then(Value::as_str)
            .and_then(|next| normalize_url(next).ok())
            .map(|url| url.to_string());
        Ok(Self { items, next })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListPageError {
    #[error("List page is not valid JSON: {0}")]
    Json(String),

    #[error("List page has no data array")]
    MissingData,
}
