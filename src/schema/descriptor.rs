use crate::schema::{canonical_type_id, SchemaError};
use crate::validation::Severity;
use jsonschema::Validator;
use serde_json::Value;
use std::fmt;

/// How a linking property reaches its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSpecKind {
    /// URL (or array of URLs) of individually fetchable documents
    Reference,
    /// URL of a paginated list of documents
    List,
    /// Object (or array of objects) carried inline
    Embedded,
}

/// A typed link declared by a schema property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    pub field: String,
    /// Canonical type ids the target may have, most likely first
    pub expected_types: Vec<String>,
    pub kind: LinkSpecKind,
}

/// A named semantic rule attached to a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomPredicate {
    pub method: String,
    pub section: Option<String>,
    pub message: String,
    pub severity: Severity,
}

/// Everything the validator and the link miner need to know about one type
///
/// Built once from the schema document and shared behind an `Arc`.
pub struct SchemaDescriptor {
    pub type_id: String,
    /// Display name, taken from the schema's `title`
    pub title: String,
    pub schema_body: Value,
    pub required: Vec<String>,
    pub recommended: Vec<String>,
    /// Declared properties that are neither required nor recommended
    pub optional: Vec<String>,
    pub custom_predicates: Vec<CustomPredicate>,
    pub links: Vec<LinkSpec>,
    /// Property whose targets each get their own walker
    pub fan_out: Option<String>,
    validator: Validator,
}

impl fmt::Debug for SchemaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaDescriptor")
            .field("type_id", &self.type_id)
            .field("title", &self.title)
            .field("required", &self.required)
            .field("recommended", &self.recommended)
            .field("optional", &self.optional)
            .field("custom_predicates", &self.custom_predicates)
            .field("links", &self.links)
            .field("fan_out", &self.fan_out)
            .finish_non_exhaustive()
    }
}

impl SchemaDescriptor {
    /// Compiles a schema document and derives its property classification
    pub fn from_value(type_id: &str, schema_body: Value) -> Result<Self, SchemaError> {
        let validator =
            jsonschema::draft4::new(&schema_body).map_err(|e| SchemaError::Invalid {
                type_id: type_id.to_string(),
                reason: e.to_string(),
            })?;

        let title = schema_body
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(type_id)
            .to_string();

        let required = string_list(schema_body.get("required"));
        let recommended = string_list(schema_body.get("x-oparl-recommended"));

        let mut optional = Vec::new();
        let mut links = Vec::new();
        if let Some(properties) = schema_body.get("properties").and_then(Value::as_object) {
            for (name, property) in properties {
                if !required.contains(name) && !recommended.contains(name) {
                    optional.push(name.clone());
                }
                if let Some(link) = link_spec(name, property) {
                    links.push(link);
                }
            }
        }

        let custom_predicates = schema_body
            .get("x-oparl-validate")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| parse_predicate(type_id, entry))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let fan_out = schema_body
            .get("x-oparl-fan-out")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            type_id: type_id.to_string(),
            title,
            schema_body,
            required,
            recommended,
            optional,
            custom_predicates,
            links,
            fan_out,
            validator,
        })
    }

    /// Runs JSON Schema validation and returns one message per violation
    ///
    /// Violations below the document root are prefixed with their location,
    /// e.g. `"relatedPaper/0": 5 is not of type "string"`.
    pub fn validate(&self, instance: &Value) -> Vec<String> {
        self.validator
            .iter_errors(instance)
            .map(|error| {
                let path = error.instance_path.to_string();
                let path = path.trim_start_matches('/');
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("\"{}\": {}", path, error)
                }
            })
            .collect()
    }

    /// Returns true if the schema declares the property
    pub fn declares(&self, property: &str) -> bool {
        self.required.iter().any(|p| p == property)
            || self.recommended.iter().any(|p| p == property)
            || self.optional.iter().any(|p| p == property)
    }

    pub fn link(&self, field: &str) -> Option<&LinkSpec> {
        self.links.iter().find(|l| l.field == field)
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Accepts either a single type name or an array of them
fn type_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(name) => vec![canonical_type_id(name)],
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .map(canonical_type_id)
            .collect(),
        _ => Vec::new(),
    }
}

/// Reads the link annotation of a property, looking into `items` for arrays
fn link_spec(field: &str, property: &Value) -> Option<LinkSpec> {
    let candidates = [Some(property), property.get("items")];
    for candidate in candidates.into_iter().flatten() {
        for (keyword, kind) in [
            ("x-oparl-references", LinkSpecKind::Reference),
            ("x-oparl-list", LinkSpecKind::List),
            ("x-oparl-embedded", LinkSpecKind::Embedded),
        ] {
            if let Some(annotation) = candidate.get(keyword) {
                let expected_types = type_list(annotation);
                if !expected_types.is_empty() {
                    return Some(LinkSpec {
                        field: field.to_string(),
                        expected_types,
                        kind,
                    });
                }
            }
        }
    }
    None
}

fn parse_predicate(type_id: &str, entry: &Value) -> Result<CustomPredicate, SchemaError> {
    let invalid = |reason: &str| SchemaError::Invalid {
        type_id: type_id.to_string(),
        reason: reason.to_string(),
    };

    let method = entry
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("x-oparl-validate entry without a method"))?;
    let message = entry
        .get("message")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("x-oparl-validate entry without a message"))?;
    let severity = match entry.get("severity").and_then(Value::as_str) {
        Some(name) => Severity::parse(name)
            .ok_or_else(|| invalid(&format!("unknown severity '{}'", name)))?,
        None => Severity::Error,
    };

    Ok(CustomPredicate {
        method: method.to_string(),
        section: entry
            .get("section")
            .and_then(Value::as_str)
            .map(str::to_string),
        message: message.to_string(),
        severity,
    })
}
