//! Human-readable report rendering

use crate::output::report::Report;

/// Formats a report as plain text
///
/// # Arguments
///
/// * `report` - The compiled report
/// * `compact` - Leave out the affected document ids
///
/// # Returns
///
/// The formatted report, ending in a newline
pub fn format_text_report(report: &Report, compact: bool) -> String {
    let mut out = String::new();

    out.push_str("Validation Result\n");
    out.push_str("=================\n\n");
    if let Some(seed) = &report.seed {
        out.push_str(&format!("Endpoint:          {}\n", seed));
    }
    out.push_str(&format!("Protocol version:  {}\n", report.protocol_version));
    out.push_str(&format!(
        "Generated:         {}\n\n",
        report.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    out.push_str("Totals\n");
    out.push_str("------\n");
    out.push_str(&format!("  Documents: {}\n", report.counts.total));
    out.push_str(&format!("  Valid:     {}\n", report.counts.valid));
    out.push_str(&format!("  Failed:    {}\n", report.counts.failed));
    out.push_str(&format!("  Fatal:     {}\n", report.counts.fatal));
    if !report.docs_per_type.is_empty() {
        out.push_str("  Per type:\n");
        for (type_name, count) in &report.docs_per_type {
            out.push_str(&format!("    {:<24} {}\n", type_name, count));
        }
    }
    out.push('\n');

    out.push_str("Network\n");
    out.push_str("-------\n");
    let tls = match report.network.tls {
        Some(true) => "served over TLS",
        Some(false) => "no TLS detected",
        None => "unknown",
    };
    out.push_str(&format!("  TLS:             {}\n", tls));
    match report.network.average_latency_ms {
        Some(ms) => out.push_str(&format!("  Average latency: {:.0} ms\n", ms)),
        None => out.push_str("  Average latency: n/a\n"),
    }
    if report.network.encodings.is_empty() {
        out.push_str("  Encodings:       none\n");
    } else {
        out.push_str(&format!(
            "  Encodings:       {}\n",
            report.network.encodings.join(", ")
        ));
    }
    out.push_str(&format!(
        "  Cache:           {} lookups, {} hits, {} misses\n\n",
        report.cache.lookups, report.cache.hits, report.cache.misses
    ));

    for (type_name, messages) in &report.messages_by_type {
        out.push_str(&format!("# {}\n\n", type_name));

        let width = messages
            .iter()
            .map(|m| m.text.chars().count())
            .max()
            .unwrap_or(0)
            .clamp(7, 100);
        out.push_str(&format!(
            "  {:>3}  {:<8}  {:<width$}  {:>5}  {}\n",
            "#",
            "severity",
            "message",
            "count",
            "section",
            width = width
        ));

        for (index, message) in messages.iter().enumerate() {
            out.push_str(&format!(
                "  {:>3}  {:<8}  {:<width$}  {:>5}  {}\n",
                index + 1,
                message.severity.as_str(),
                message.text,
                message.count,
                message.section.as_deref().unwrap_or("-"),
                width = width
            ));
        }

        if !compact {
            out.push_str("\n  Affected documents:\n");
            for (index, message) in messages.iter().enumerate() {
                for id in &message.affected_ids {
                    out.push_str(&format!("  [{}] {}\n", index + 1, id));
                }
            }
        }
        out.push('\n');
    }

    if !report.property_usage.is_empty() {
        out.push_str("Property usage\n");
        out.push_str("--------------\n");
        for (type_name, usage) in &report.property_usage {
            out.push_str(&format!("  {}\n", type_name));
            for (label, counts) in [
                ("recommended", &usage.recommended),
                ("optional", &usage.optional),
                ("custom", &usage.custom),
            ] {
                if counts.is_empty() {
                    continue;
                }
                let listed = counts
                    .iter()
                    .map(|(name, count)| format!("{} ({})", name, count))
                    .collect::<Vec<_>>()
                    .join(", ");
                out.push_str(&format!("    {:<12} {}\n", label, listed));
            }
        }
    }

    out
}
