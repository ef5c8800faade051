use serde_json::{Map, Value};
use std::borrow::Cow;
use tracing::{debug, warn};

use crate::error::{AssistantError, Result};
use crate::models::{AnalysisResult, InterpretedAnalysis};

/// Top-level fields of a complete analysis.
pub const ANALYSIS_FIELDS: [&str; 5] = [
    "summary",
    "findings",
    "chartData",
    "anomalies",
    "recommendations",
];

/// Text payload of a raw response body.
///
/// A `generateContent` envelope yields `candidates[0].content.parts[0].text`;
/// any other body is its own payload.
pub fn response_text(body: &str) -> Result<Cow<'_, str>> {
    match serde_json::from_str::<Value>(body) {
        Ok(envelope) if envelope.get("candidates").is_some() => envelope
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(|text| Cow::Owned(text.to_string()))
            .ok_or_else(|| {
                AssistantError::MalformedResponse("model response has no candidate text".into())
            }),
        _ => Ok(Cow::Borrowed(body)),
    }
}

/// Parse a structured analysis out of a raw response body.
///
/// The payload must be a JSON object. Absent or null top-level fields are held
/// empty and reported in `missing_fields`; anything else that does not fit the
/// shape is a [`AssistantError::MalformedResponse`].
pub fn interpret_analysis(body: &str) -> Result<InterpretedAnalysis> {
    let payload = response_text(body)?;
    let value: Value = serde_json::from_str(payload.trim()).map_err(|e| {
        warn!(error = %e, "analysis payload is not JSON");
        AssistantError::MalformedResponse(format!("payload is not JSON: {}", e))
    })?;

    let Value::Object(object) = value else {
        return Err(AssistantError::MalformedResponse(
            "payload is not a JSON object".into(),
        ));
    };

    let present: Map<String, Value> = object.into_iter().filter(|(_, v)| !v.is_null()).collect();
    let missing_fields: Vec<String> = ANALYSIS_FIELDS
        .iter()
        .filter(|field| !present.contains_key(**field))
        .map(|field| field.to_string())
        .collect();

    let result: AnalysisResult = serde_json::from_value(Value::Object(present))
        .map_err(|e| AssistantError::MalformedResponse(e.to_string()))?;

    if !missing_fields.is_empty() {
        warn!(?missing_fields, "analysis is missing fields");
    }
    debug!(findings = result.findings.len(), "analysis interpreted");

    Ok(InterpretedAnalysis {
        result,
        missing_fields,
    })
}

/// Text of a conversational reply, returned as the model wrote it.
pub fn interpret_reply(body: &str) -> Result<String> {
    response_text(body).map(Cow::into_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use serde_json::json;

    fn envelope(text: &str) -> String {
        json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
        })
        .to_string()
    }

    const FULL: &str = r##"{
        "summary": "Glucemia en ayunas elevada",
        "findings": [{"title": "Glucosa", "description": "120 mg/dL", "severity": "warning"}],
        "chartData": {"labels": ["Glucosa"], "datasets": [{"label": "mg/dL", "data": [120], "color": "#f1c40f"}]},
        "anomalies": ["Glucosa por encima de 100 mg/dL"],
        "recommendations": ["Repetir en ayunas"]
    }"##;

    #[test]
    fn parses_payload_inside_envelope() {
        let analysis = interpret_analysis(&envelope(FULL)).unwrap();
        assert!(analysis.is_displayable());
        assert_eq!(analysis.result.summary, "Glucemia en ayunas elevada");
        assert_eq!(analysis.result.findings[0].severity, Severity::Warning);
        assert_eq!(analysis.result.chart_data.datasets[0].data, vec![120.0]);
    }

    #[test]
    fn top_level_body_is_its_own_payload() {
        let analysis = interpret_analysis(FULL).unwrap();
        assert_eq!(analysis.result.anomalies.len(), 1);
    }

    #[test]
    fn missing_fields_are_empty_and_reported() {
        let analysis =
            interpret_analysis(&envelope(r#"{"summary": "ok", "anomalies": null}"#)).unwrap();
        assert_eq!(analysis.result.summary, "ok");
        assert!(analysis.result.findings.is_empty());
        assert!(analysis.result.chart_data.is_empty());
        assert_eq!(
            analysis.missing_fields,
            vec!["findings", "chartData", "anomalies", "recommendations"]
        );
        assert!(!analysis.is_displayable());
    }

    #[test]
    fn non_json_payload_is_malformed() {
        let err = interpret_analysis(&envelope("Here is your analysis: all good")).unwrap_err();
        assert!(matches!(err, AssistantError::MalformedResponse(_)));
    }

    #[test]
    fn fenced_payload_is_not_repaired() {
        let err = interpret_analysis(&envelope(&format!("```json\n{}\n```", FULL))).unwrap_err();
        assert!(matches!(err, AssistantError::MalformedResponse(_)));
    }

    #[test]
    fn wrong_field_type_is_malformed() {
        let err = interpret_analysis(&envelope(r#"{"summary": "x", "findings": "none"}"#)).unwrap_err();
        assert!(matches!(err, AssistantError::MalformedResponse(_)));
    }

    #[test]
    fn finding_without_severity_is_malformed() {
        let body = envelope(
            r#"{"summary": "Hiperpotasemia", "findings": [{"title": "Potasio", "description": "6.8 mmol/L"}],
                "chartData": {"labels": [], "datasets": []}, "anomalies": [], "recommendations": []}"#,
        );
        let err = interpret_analysis(&body).unwrap_err();
        match err {
            AssistantError::MalformedResponse(message) => assert!(message.contains("severity")),
            other => panic!("expected a malformed response, got {other:?}"),
        }
    }

    #[test]
    fn json_array_payload_is_malformed() {
        let err = interpret_analysis(&envelope("[]")).unwrap_err();
        assert!(matches!(err, AssistantError::MalformedResponse(_)));
    }

    #[test]
    fn envelope_without_candidates_text_is_malformed() {
        let err = interpret_analysis(r#"{"candidates": [], "promptFeedback": {"blockReason": "SAFETY"}}"#)
            .unwrap_err();
        assert!(matches!(err, AssistantError::MalformedResponse(_)));
    }

    #[test]
    fn reply_text_is_returned_unmodified() {
        let text = "  La glucosa está **ligeramente** elevada.\n";
        assert_eq!(interpret_reply(&envelope(text)).unwrap(), text);
        assert_eq!(interpret_reply("plain answer").unwrap(), "plain answer");
    }

    #[test]
    fn identical_bodies_give_identical_results() {
        let body = envelope(FULL);
        assert_eq!(interpret_analysis(&body).unwrap(), interpret_analysis(&body).unwrap());
    }
}
