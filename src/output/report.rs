//! Result aggregation
//!
//! One [`ResultAggregator`] collects everything a run learns. Its state sits
//! behind a single mutex, network telemetry included, so counts and message
//! tables are always mutually consistent. [`ResultAggregator::compile`]
//! snapshots that state into a serializable [`Report`].

use crate::cache::CacheStats;
use crate::validation::{Finding, Severity, ValidationMessage};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

/// Document totals
///
/// `total == valid + failed` and `fatal <= failed` hold by construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub total: u64,
    pub valid: u64,
    pub failed: u64,
    pub fatal: u64,
}

/// What the fetcher observed about the endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    /// Moving average of response latency in milliseconds
    pub average_latency_ms: Option<f64>,
    /// Whether the endpoint is served over TLS
    pub tls: Option<bool>,
    /// Every `Content-Encoding` value seen in a response
    pub encodings: Vec<String>,
}

/// How often each property of a type was present
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyUsage {
    pub optional: BTreeMap<String, u64>,
    pub recommended: BTreeMap<String, u64>,
    /// Properties the schema does not declare
    pub custom: BTreeMap<String, u64>,
}

/// Properties present on one document, split by classification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyPresence {
    pub optional: Vec<String>,
    pub recommended: Vec<String>,
    pub custom: Vec<String>,
}

/// Final result of a validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub seed: Option<String>,
    pub protocol_version: String,
    pub timestamp: DateTime<Utc>,
    pub counts: Counts,
    /// Distinct documents recorded under each type
    #[serde(default)]
    pub docs_per_type: BTreeMap<String, u64>,
    pub messages_by_type: BTreeMap<String, Vec<ValidationMessage>>,
    #[serde(default)]
    pub property_usage: BTreeMap<String, PropertyUsage>,
    pub network: NetworkSummary,
    #[serde(default)]
    pub cache: CacheStats,
}

impl Report {
    /// Loads a report previously written with the JSON renderer
    pub fn from_file(path: &Path) -> Result<Self, crate::ValidatorError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Messages of one type, if any were recorded
    pub fn messages_for(&self, type_name: &str) -> &[ValidationMessage] {
        self.messages_by_type
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of messages of the given severity across all types
    pub fn count_severity(&self, severity: Severity) -> usize {
        self.messages_by_type
            .values()
            .flatten()
            .filter(|m| m.severity == severity)
            .count()
    }
}

#[derive(Debug, Default)]
struct AggregatorState {
    documents: HashSet<String>,
    failed: HashSet<String>,
    fatal: HashSet<String>,
    docs_per_type: BTreeMap<String, HashSet<String>>,
    messages_by_type: BTreeMap<String, Vec<ValidationMessage>>,
    message_index: HashMap<MessageKey, MessageSlot>,
    property_usage: BTreeMap<String, PropertyUsage>,
    average_latency_ms: Option<f64>,
    tls: Option<bool>,
    encodings: BTreeSet<String>,
    cache: CacheStats,
}

/// Messages merge per type, severity and text
type MessageKey = (String, Severity, String);

#[derive(Debug)]
struct MessageSlot {
    index: usize,
    affected: HashSet<String>,
}

impl AggregatorState {
    fn count_typed(&mut self, document_id: &str, type_name: &str) {
        self.documents.insert(document_id.to_string());
        self.docs_per_type
            .entry(type_name.to_string())
            .or_default()
            .insert(document_id.to_string());
    }
}

/// Thread-safe collector of validation results and network telemetry
#[derive(Debug)]
pub struct ResultAggregator {
    seed: Option<String>,
    protocol_version: String,
    state: Mutex<AggregatorState>,
}

impl ResultAggregator {
    pub fn new(protocol_version: impl Into<String>, seed: Option<String>) -> Self {
        Self {
            seed,
            protocol_version: protocol_version.into(),
            state: Mutex::new(AggregatorState::default()),
        }
    }

    /// Registers a document as validated
    pub fn count_document(&self, document_id: &str) {
        self.state.lock().documents.insert(document_id.to_string());
    }

    /// Records one finding about a document of `type_name`
    ///
    /// Findings with the same severity and text for the same type merge into
    /// one message. An error-severity finding marks the document failed.
    pub fn record(&self, document_id: &str, type_name: &str, finding: &Finding) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.count_typed(document_id, type_name);
        if finding.severity == Severity::Error {
            state.failed.insert(document_id.to_string());
        }

        let key = (type_name.to_string(), finding.severity, finding.text.clone());
        if let Some(slot) = state.message_index.get_mut(&key) {
            let new_document = slot.affected.insert(document_id.to_string());
            if let Some(message) = state
                .messages_by_type
                .get_mut(type_name)
                .and_then(|messages| messages.get_mut(slot.index))
            {
                message.merge(document_id, new_document);
            }
            return;
        }

        let messages = state
            .messages_by_type
            .entry(type_name.to_string())
            .or_default();
        messages.push(ValidationMessage::from_finding(finding, document_id));
        let slot = MessageSlot {
            index: messages.len() - 1,
            affected: HashSet::from([document_id.to_string()]),
        };
        state.message_index.insert(key, slot);
    }

    /// Registers a validated document and records all of its findings
    pub fn record_all(&self, document_id: &str, type_name: &str, findings: &[Finding]) {
        self.state.lock().count_typed(document_id, type_name);
        for finding in findings {
            self.record(document_id, type_name, finding);
        }
    }

    pub fn mark_failed(&self, document_id: &str) {
        let mut state = self.state.lock();
        state.documents.insert(document_id.to_string());
        state.failed.insert(document_id.to_string());
    }

    /// Marks a document that could not be validated at all
    pub fn mark_fatal(&self, document_id: &str) {
        let mut state = self.state.lock();
        state.documents.insert(document_id.to_string());
        state.failed.insert(document_id.to_string());
        state.fatal.insert(document_id.to_string());
    }

    pub fn record_property_usage(&self, type_name: &str, presence: &PropertyPresence) {
        let mut state = self.state.lock();
        let usage = state
            .property_usage
            .entry(type_name.to_string())
            .or_default();
        for name in &presence.optional {
            *usage.optional.entry(name.clone()).or_insert(0) += 1;
        }
        for name in &presence.recommended {
            *usage.recommended.entry(name.clone()).or_insert(0) += 1;
        }
        for name in &presence.custom {
            *usage.custom.entry(name.clone()).or_insert(0) += 1;
        }
    }

    /// Folds one response into the latency average and encoding set
    ///
    /// The average is a two-sample moving average: each new sample weighs as
    /// much as the whole history.
    pub fn record_network(&self, latency_ms: f64, content_encoding: Option<&str>) {
        let mut state = self.state.lock();
        state.average_latency_ms = Some(match state.average_latency_ms {
            Some(average) => (average + latency_ms) / 2.0,
            None => latency_ms,
        });
        if let Some(encoding) = content_encoding {
            state.encodings.insert(encoding.to_ascii_lowercase());
        }
    }

    pub fn set_tls(&self, tls: bool) {
        self.state.lock().tls = Some(tls);
    }

    pub fn record_cache_stats(&self, stats: CacheStats) {
        self.state.lock().cache = stats;
    }

    pub fn document_count(&self) -> usize {
        self.state.lock().documents.len()
    }

    /// Builds the report from the current state
    ///
    /// Does not consume anything, so calling it twice yields equal reports
    /// apart from the timestamp.
    pub fn compile(&self) -> Report {
        let state = self.state.lock();
        let total = state.documents.len() as u64;
        let failed = state.failed.len() as u64;

        Report {
            seed: self.seed.clone(),
            protocol_version: self.protocol_version.clone(),
            timestamp: Utc::now(),
            counts: Counts {
                total,
                valid: total - failed,
                failed,
                fatal: state.fatal.len() as u64,
            },
            docs_per_type: state
                .docs_per_type
                .iter()
                .map(|(type_name, ids)| (type_name.clone(), ids.len() as u64))
                .collect(),
            messages_by_type: state.messages_by_type.clone(),
            property_usage: state.property_usage.clone(),
            network: NetworkSummary {
                average_latency_ms: state.average_latency_ms,
                tls: state.tls,
                encodings: state.encodings.iter().cloned().collect(),
            },
            cache: state.cache,
        }
    }
}
