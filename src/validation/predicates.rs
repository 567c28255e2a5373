//! Named semantic predicates
//!
//! Schemas reference predicates by name in `x-oparl-validate`. A predicate
//! is a pure function of the parsed document returning `false` when the rule
//! is violated. Predicates only judge what they understand: a missing or
//! unparsable field passes, since the schema check reports it already.

use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A semantic rule over one parsed document
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// `oparlVersion` values this validator understands
pub const KNOWN_OPARL_VERSIONS: &[&str] = &["https://schema.oparl.org/1.0/"];

/// Name to predicate lookup table
#[derive(Clone, Default)]
pub struct PredicateRegistry {
    predicates: HashMap<String, Predicate>,
}

impl std::fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.predicates.keys().collect();
        names.sort();
        f.debug_struct("PredicateRegistry")
            .field("predicates", &names)
            .finish()
    }
}

impl PredicateRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in predicate
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("modified_after_created", |doc| {
            datetimes_ordered(doc, "created", "modified")
        });
        registry.register("meeting_end_after_start", |doc| {
            datetimes_ordered(doc, "start", "end")
        });
        registry.register("membership_end_after_start", |doc| {
            dates_ordered(doc, "startDate", "endDate")
        });
        registry.register("term_end_after_start", |doc| {
            dates_ordered(doc, "startDate", "endDate")
        });
        registry.register("person_has_name", person_has_name);
        registry.register("id_is_http_url", id_is_http_url);
        registry.register("system_oparl_version_supported", |doc| {
            doc.get("oparlVersion")
                .and_then(Value::as_str)
                .map_or(true, |v| KNOWN_OPARL_VERSIONS.contains(&v))
        });
        registry
    }

    /// Adds or replaces a predicate
    pub fn register<F>(&mut self, name: &str, predicate: F)
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(name.to_string(), Arc::new(predicate));
    }

    pub fn get(&self, name: &str) -> Option<&Predicate> {
        self.predicates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }
}

fn datetimes_ordered(doc: &Value, earlier: &str, later: &str) -> bool {
    let parse = |field: &str| {
        doc.get(field)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    };
    match (parse(earlier), parse(later)) {
        (Some(a), Some(b)) => a <= b,
        _ => true,
    }
}

fn dates_ordered(doc: &Value, earlier: &str, later: &str) -> bool {
    let parse = |field: &str| {
        doc.get(field)
            .and_then(Value::as_str)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    };
    match (parse(earlier), parse(later)) {
        (Some(a), Some(b)) => a <= b,
        _ => true,
    }
}

fn person_has_name(doc: &Value) -> bool {
    ["name", "familyName"].iter().any(|field| {
        doc.get(*field)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty())
    })
}

fn id_is_http_url(doc: &Value) -> bool {
    doc.get("id")
        .and_then(Value::as_str)
        .map_or(true, |id| id.starts_with("https://") || id.starts_with("http://"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(name: &str, doc: Value) -> bool {
        let registry = PredicateRegistry::with_builtin();
        let predicate = registry.get(name).unwrap();
        predicate(&doc)
    }

    #[test]
    fn test_modified_after_created() {
        assert!(check(
            "modified_after_created",
            json!({"created": "2020-01-01T10:00:00+01:00", "modified": "2020-01-02T10:00:00+01:00"})
        ));
        assert!(!check(
            "modified_after_created",
            json!({"created": "2020-01-02T10:00:00+01:00", "modified": "2020-01-01T10:00:00+01:00"})
        ));
        assert!(check("modified_after_created", json!({"created": "2020-01-02T10:00:00Z"})));
    }

    #[test]
    fn test_timezones_are_respected() {
        // 10:00+02:00 is 08:00Z, so modified is later
        assert!(check(
            "modified_after_created",
            json!({"created": "2020-01-01T10:00:00+02:00", "modified": "2020-01-01T09:00:00Z"})
        ));
    }

    #[test]
    fn test_date_ranges() {
        assert!(check(
            "term_end_after_start",
            json!({"startDate": "2014-05-25", "endDate": "2019-05-26"})
        ));
        assert!(!check(
            "membership_end_after_start",
            json!({"startDate": "2019-05-26", "endDate": "2014-05-25"})
        ));
        assert!(check("membership_end_after_start", json!({"startDate": "garbage", "endDate": "2014-05-25"})));
    }

    #[test]
    fn test_meeting_times() {
        assert!(!check(
            "meeting_end_after_start",
            json!({"start": "2020-03-01T18:00:00+01:00", "end": "2020-03-01T17:00:00+01:00"})
        ));
    }

    #[test]
    fn test_person_has_name() {
        assert!(check("person_has_name", json!({"familyName": "Mustermann"})));
        assert!(check("person_has_name", json!({"name": "Max Mustermann"})));
        assert!(!check("person_has_name", json!({"givenName": "Max"})));
        assert!(!check("person_has_name", json!({"name": "  "})));
    }

    #[test]
    fn test_id_and_version() {
        assert!(check("id_is_http_url", json!({"id": "https://example.org/1"})));
        assert!(!check("id_is_http_url", json!({"id": "urn:x:1"})));
        assert!(check(
            "system_oparl_version_supported",
            json!({"oparlVersion": "https://schema.oparl.org/1.0/"})
        ));
        assert!(!check(
            "system_oparl_version_supported",
            json!({"oparlVersion": "https://schema.oparl.org/0.9/"})
        ));
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = PredicateRegistry::new();
        assert!(!registry.contains("always_false"));
        registry.register("always_false", |_| false);
        assert!(registry.contains("always_false"));
        assert!(!(registry.get("always_false").unwrap())(&json!({})));
    }
}
