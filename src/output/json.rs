//! JSON report rendering

use crate::output::report::Report;
use crate::output::{OutputError, OutputResult};

/// Serializes a report; `Report::from_file` reads it back
pub fn format_json_report(report: &Report) -> OutputResult<String> {
    let mut json =
        serde_json::to_string_pretty(report).map_err(|e| OutputError::Format(e.to_string()))?;
    json.push('\n');
    Ok(json)
}
