use serde_json::json;

use crate::error::Result;
use crate::models::{AnalysisRequest, InterpretedAnalysis, Language};

/// Number of findings the model is asked for.
pub const FINDINGS_COUNT: usize = 5;

/// Build the instruction for a structured analysis of `request`.
///
/// The files are embedded as JSON next to a literal description of the
/// response shape. Identical requests produce identical instructions.
pub fn build_analysis_prompt(request: &AnalysisRequest) -> Result<String> {
    let files = serde_json::to_string(&request.files)?;
    let notes = if request.notes.trim().is_empty() {
        "none"
    } else {
        request.notes.trim()
    };

    Ok(format!(
        "You are a clinical biochemistry assistant. Analyze these biochemical files: {files}.
Analysis type: {analysis_type}. Notes: {notes}. Respond in {language}.

Return only a JSON object with exactly these fields:
- \"summary\": string, a short overall interpretation of the data.
- \"findings\": array of exactly {count} objects {{\"title\": string, \"description\": string, \"severity\": \"normal\" | \"warning\" | \"critical\"}}. Severity is shown in color: normal is green, warning is yellow, critical is red.
- \"chartData\": {{\"labels\": [string], \"datasets\": [{{\"label\": string, \"data\": [number], \"color\": string}}]}}, one label per measured parameter, every data array aligned with labels, colors as CSS hex codes.
- \"anomalies\": array of strings describing values outside their reference ranges.
- \"recommendations\": array of strings with suggested follow-up actions.",
        analysis_type = request.analysis_type,
        language = request.language.prompt_name(),
        count = FINDINGS_COUNT,
    ))
}

/// Build the instruction for a single-turn question about the current result.
///
/// Only the summary and findings of `current` are passed as context; both
/// render empty when there is no result.
pub fn build_follow_up_prompt(
    question: &str,
    current: Option<&InterpretedAnalysis>,
    language: Language,
) -> Result<String> {
    let (summary, findings) = match current {
        Some(analysis) => (
            analysis.result.summary.as_str(),
            serde_json::to_string(&analysis.result.findings)?,
        ),
        None => ("", json!([]).to_string()),
    };

    Ok(format!(
        "You are an assistant for clinical biochemistry results.
Question: {question}
Context:
Summary: {summary}
Findings: {findings}
Answer concisely in {language}.",
        question = question.trim(),
        language = language.prompt_name(),
    ))
}
