//! Integration tests for schema loading and document validation
//!
//! Every bundled type has a valid fixture under `tests/fixtures/valid/`.

use oparl_validator::schema::{SchemaError, SchemaStore};
use oparl_validator::validation::{ConformanceValidator, Document, PredicateRegistry, Severity};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

const TYPES: &[&str] = &[
    "System",
    "Body",
    "LegislativeTerm",
    "Organization",
    "Person",
    "Membership",
    "Meeting",
    "AgendaItem",
    "Paper",
    "Consultation",
    "File",
    "Location",
];

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/valid")
        .join(format!("{}.json", name))
}

fn fixture(name: &str) -> Value {
    let raw = std::fs::read_to_string(fixture_path(name)).expect("fixture exists");
    serde_json::from_str(&raw).expect("fixture is JSON")
}

fn validator() -> ConformanceValidator {
    ConformanceValidator::new(
        Arc::new(SchemaStore::bundled("1.0").unwrap()),
        Arc::new(PredicateRegistry::with_builtin()),
    )
}

fn document(body: Value) -> Document {
    let url = body["id"].as_str().unwrap_or("https://oparl.example.org/x").to_string();
    Document::parse(&url, &body.to_string(), Vec::new(), None).unwrap()
}

#[tokio::test]
async fn test_every_fixture_is_valid() {
    let validator = validator();
    for name in TYPES {
        let validation = validator.validate(&document(fixture(name))).await;
        let errors: Vec<_> = validation
            .findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
            .map(|f| f.text.clone())
            .collect();
        assert!(errors.is_empty(), "{} fixture has errors: {:?}", name, errors);
        assert_eq!(validation.type_name, *name);
        assert!(validation.presence.is_some());
    }
}

#[tokio::test]
async fn test_missing_required_field_is_one_error() {
    let mut body = fixture("Organization");
    body.as_object_mut().unwrap().remove("name");

    let validation = validator().validate(&document(body)).await;
    let errors: Vec<_> = validation
        .findings
        .iter()
        .filter(|f| f.severity == Severity::Error)
        .collect();

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].text, "\"name\" is a required property");
}

#[tokio::test]
async fn test_unknown_type_stops_semantic_checks() {
    let body = serde_json::json!({
        "id": "https://oparl.example.org/thing/1",
        "type": "https://schema.oparl.org/1.0/Spaceship",
        "modified": "2000-01-01T00:00:00Z",
        "created": "2020-01-01T00:00:00Z"
    });
    let validation = validator().validate(&document(body)).await;

    assert_eq!(validation.type_name, "Spaceship");
    assert_eq!(validation.findings.len(), 1);
    assert_eq!(
        validation.findings[0].text,
        "Unknown type 'https://schema.oparl.org/1.0/Spaceship'"
    );
    assert!(validation.presence.is_none());
}

#[tokio::test]
async fn test_custom_predicate_reports_section() {
    let mut body = fixture("LegislativeTerm");
    body["endDate"] = Value::String("2010-01-01".to_string());

    let validation = validator().validate(&document(body)).await;
    let finding = validation
        .findings
        .iter()
        .find(|f| f.text == "endDate must not be earlier than startDate")
        .expect("predicate finding");
    assert_eq!(finding.severity, Severity::Error);
    assert_eq!(finding.section.as_deref(), Some("2.13"));
}

#[tokio::test]
async fn test_person_without_name_is_a_warning() {
    let mut body = fixture("Person");
    let object = body.as_object_mut().unwrap();
    object.remove("name");
    object.remove("familyName");

    let validation = validator().validate(&document(body)).await;
    assert!(!validation.has_errors());
    assert!(validation
        .findings
        .iter()
        .any(|f| f.severity == Severity::Warning && f.text.contains("either name or familyName")));
}

#[tokio::test]
async fn test_expected_type_mismatch_warns() {
    let body = fixture("Person");
    let url = body["id"].as_str().unwrap().to_string();
    let doc = Document::parse(&url, &body.to_string(), vec!["paper".to_string()], None).unwrap();

    let validation = validator().validate(&doc).await;
    assert!(validation
        .findings
        .iter()
        .any(|f| f.text == "Expected a document of type Paper, found Person"));
}

#[tokio::test]
async fn test_custom_properties_are_info() {
    let mut body = fixture("Paper");
    body["x-local-flag"] = Value::Bool(true);

    let validation = validator().validate(&document(body)).await;
    assert!(!validation.has_errors());
    assert!(validation
        .findings
        .iter()
        .any(|f| f.severity == Severity::Info && f.text == "Property 'x-local-flag' is not part of the schema"));
    assert_eq!(
        validation.presence.unwrap().custom,
        vec!["x-local-flag".to_string()]
    );
}

#[test]
fn test_schema_directory_source() {
    let dir = TempDir::new().unwrap();
    let schema_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("schema/1.0");
    std::fs::copy(schema_dir.join("Paper.json"), dir.path().join("Paper.json")).unwrap();

    let store = SchemaStore::from_directory(dir.path()).unwrap();
    let paper = store.get("https://schema.oparl.org/1.0/Paper").unwrap();
    assert_eq!(paper.title, "Paper");
    assert!(matches!(store.get("Body"), Err(SchemaError::NotFound(_))));
}

#[test]
fn test_invalid_schema_file_is_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("Paper.json"), "{ not json").unwrap();

    let store = SchemaStore::from_directory(dir.path()).unwrap();
    assert!(store.get("Paper").is_err());
}
