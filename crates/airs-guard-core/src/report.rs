use std::fmt::Write;

use serde::Serialize;

use crate::gateway::GatewayReport;
use crate::normalize::{Normalized, ScanResult};
use crate::transport::RawReply;

/// Format styles supported by the default reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Render a scan report. `verbose` adds the provider reply verbatim.
pub fn render_report(
    report: &GatewayReport,
    format: OutputFormat,
    verbose: bool,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_human(report, verbose),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&JsonReport {
            outcome: &report.outcome,
            trace_id: report.trace_id.as_deref(),
            raw_response: report.raw.as_ref().filter(|_| verbose),
        })?),
    }
}

fn render_human(report: &GatewayReport, verbose: bool) -> anyhow::Result<String> {
    let mut out = String::new();
    writeln!(
        out,
        "Status: {} (action: {}, exit code {})",
        label(&report.policy.status)?,
        label(&report.outcome.action())?,
        report.policy.exit_code
    )?;
    if let Some(trace_id) = &report.trace_id {
        writeln!(out, "Trace ID: {trace_id}")?;
    }

    match &report.outcome {
        Normalized::Error(error) => {
            writeln!(out, "Error ({}): {}", label(&error.kind())?, error.message())?;
        }
        Normalized::Scan(result) => render_result(&mut out, result)?,
    }

    if verbose {
        if let Some(raw) = &report.raw {
            writeln!(out, "\nRaw Response:\n{}", serde_json::to_string_pretty(raw)?)?;
        }
    }
    Ok(out)
}

fn render_result(out: &mut String, result: &ScanResult) -> anyhow::Result<()> {
    writeln!(out, "Scan ID: {}", result.scan_id)?;
    if let Some(request_id) = &result.request_id {
        writeln!(out, "Request ID: {request_id}")?;
    }
    writeln!(out, "Category: {}", result.category)?;
    if let Some(profile) = &result.profile {
        writeln!(out, "Profile: {profile}")?;
    }
    writeln!(out, "Overall Severity: {}", label(&result.overall_severity)?)?;
    if let Some(masked) = &result.masked_prompt {
        writeln!(out, "Masked Prompt: {masked}")?;
    }
    if let Some(masked) = &result.masked_response {
        writeln!(out, "Masked Response: {masked}")?;
    }
    writeln!(out)?;

    if result.findings.is_empty() {
        writeln!(out, "No threats detected.")?;
        return Ok(());
    }
    writeln!(out, "Threats:")?;
    for finding in &result.findings {
        writeln!(
            out,
            "  - {category} [{severity}] @ {location}",
            category = finding.category,
            severity = label(&finding.severity)?,
            location = label(&finding.location)?,
        )?;
        writeln!(out, "    {}", finding.description)?;
    }
    Ok(())
}

/// Serialized name of a unit enum variant, so human output matches the JSON.
fn label<T: Serialize>(value: &T) -> anyhow::Result<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(text) => Ok(text),
        other => Ok(other.to_string()),
    }
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    outcome: &'a Normalized,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_response: Option<&'a RawReply>,
}
