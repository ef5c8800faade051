use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::path::Path;

use crate::error::{AssistantError, Result};
use crate::models::InterpretedAnalysis;

/// Plain-text report of an analysis, used as the exported artifact.
pub fn render_analysis(analysis: &InterpretedAnalysis) -> String {
    let result = &analysis.result;
    let mut out = String::new();

    let _ = writeln!(out, "Summary\n{}\n", result.summary.trim());

    out.push_str("Findings\n");
    for finding in &result.findings {
        let _ = writeln!(
            out,
            "- [{}] {}: {}",
            finding.severity.as_str().to_uppercase(),
            finding.title,
            finding.description
        );
    }

    let chart = &result.chart_data;
    if !chart.is_empty() {
        out.push_str("\nChart data\n");
        for dataset in &chart.datasets {
            let points: Vec<String> = chart
                .labels
                .iter()
                .zip(&dataset.data)
                .map(|(label, value)| format!("{} = {}", label, value))
                .collect();
            let _ = writeln!(out, "- {}: {}", dataset.label, points.join(", "));
        }
    }

    push_list(&mut out, "Anomalies", &result.anomalies);
    push_list(&mut out, "Recommendations", &result.recommendations);

    if !analysis.missing_fields.is_empty() {
        let _ = writeln!(
            out,
            "\nNot provided by the model: {}",
            analysis.missing_fields.join(", ")
        );
    }

    out
}

fn push_list(out: &mut String, title: &str, items: &[String]) {
    let _ = writeln!(out, "\n{}", title);
    for item in items {
        let _ = writeln!(out, "- {}", item);
    }
}

/// Suggested download name for an export made at `at`.
pub fn export_file_name(at: DateTime<Utc>) -> String {
    format!("biochem-report-{}.txt", at.format("%Y%m%d-%H%M%S"))
}

pub async fn write_export(path: &Path, text: &str) -> Result<()> {
    tokio::fs::write(path, text)
        .await
        .map_err(|source| AssistantError::Io {
            path: path.to_path_buf(),
            source,
        })
}
