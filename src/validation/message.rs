//! Findings and their merged report form

use serde::{Deserialize, Serialize};
use std::fmt;

/// How serious a finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Parses a severity name, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Some(Self::Info),
            "warning" | "warn" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finding about one document, before aggregation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    pub text: String,
    /// Protocol section the rule comes from, if known
    pub section: Option<String>,
}

impl Finding {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
            section: None,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Severity::Error, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(Severity::Warning, text)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(Severity::Info, text)
    }

    pub fn with_section(mut self, section: Option<String>) -> Self {
        self.section = section;
        self
    }
}

/// A finding merged across every document of one type that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMessage {
    pub severity: Severity,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub affected_ids: Vec<String>,
    pub count: u64,
}

impl ValidationMessage {
    pub fn from_finding(finding: &Finding, document_id: &str) -> Self {
        Self {
            severity: finding.severity,
            text: finding.text.clone(),
            section: finding.section.clone(),
            affected_ids: vec![document_id.to_string()],
            count: 1,
        }
    }

    /// Folds another occurrence into this message
    ///
    /// The caller tracks which ids are listed already; `new_document` adds
    /// `document_id` to the affected ids.
    pub fn merge(&mut self, document_id: &str, new_document: bool) {
        self.count += 1;
        if new_document {
            self.affected_ids.push(document_id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!(Severity::parse("ERROR"), Some(Severity::Error));
        assert_eq!(Severity::parse("warn"), Some(Severity::Warning));
        assert_eq!(Severity::parse("info"), Some(Severity::Info));
        assert_eq!(Severity::parse("fatal"), None);
    }

    #[test]
    fn test_merge_counts_and_dedups_ids() {
        let finding = Finding::error("\"name\" is a required property");
        let mut message = ValidationMessage::from_finding(&finding, "https://example.org/body/1");
        message.merge("https://example.org/body/2", true);
        message.merge("https://example.org/body/2", false);

        assert_eq!(message.count, 3);
        assert_eq!(
            message.affected_ids,
            vec!["https://example.org/body/1", "https://example.org/body/2"]
        );
    }
}
