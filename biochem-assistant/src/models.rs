use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Normalized, truncated view of one input file, used only to build a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub media_type: String,
    pub content: String,
    /// Byte length of the file before encoding and truncation
    pub size: u64,
}

/// Where an input file comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum InputSource {
    LocalPath {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
    Uploaded {
        name: String,
        media_type: String,
        #[serde(with = "base64_bytes", rename = "content_base64")]
        bytes: Vec<u8>,
    },
}

impl InputSource {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        InputSource::LocalPath {
            path: path.into(),
            media_type: None,
        }
    }

    pub fn uploaded(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        InputSource::Uploaded {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            InputSource::LocalPath { path, .. } => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            InputSource::Uploaded { name, .. } => name.clone(),
        }
    }
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.trim())
            .map_err(|e| D::Error::custom(format!("content_base64 is not valid base64: {}", e)))
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    #[default]
    #[serde(alias = "General")]
    General,
    #[serde(alias = "Blood")]
    Blood,
    #[serde(alias = "Genetic")]
    Genetic,
    #[serde(alias = "Cell")]
    Cell,
    #[serde(alias = "Proteins")]
    Proteins,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::General => "general",
            AnalysisType::Blood => "blood",
            AnalysisType::Genetic => "genetic",
            AnalysisType::Cell => "cell",
            AnalysisType::Proteins => "proteins",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language the model is asked to answer in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Es,
    En,
    Pt,
    Fr,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Es => "es",
            Language::En => "en",
            Language::Pt => "pt",
            Language::Fr => "fr",
        }
    }

    /// Name of the language as written in the prompt.
    pub fn prompt_name(&self) -> &'static str {
        match self {
            Language::Es => "español",
            Language::En => "English",
            Language::Pt => "português",
            Language::Fr => "français",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "es" => Ok(Language::Es),
            "en" => Ok(Language::En),
            "pt" => Ok(Language::Pt),
            "fr" => Ok(Language::Fr),
            other => Err(format!("unsupported language '{}' (expected es, en, pt or fr)", other)),
        }
    }
}

/// User options of one analysis action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOptions {
    #[serde(default)]
    pub analysis_type: AnalysisType,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub language: Language,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub files: Vec<FileRecord>,
    pub analysis_type: AnalysisType,
    pub notes: String,
    pub language: Language,
}

impl AnalysisRequest {
    pub fn new(files: Vec<FileRecord>, options: AnalysisOptions) -> Self {
        Self {
            files,
            analysis_type: options.analysis_type,
            notes: options.notes,
            language: options.language,
        }
    }
}

/// Severity of a finding. Required on every finding; there is no default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Severity::Normal => "green",
            Severity::Warning => "yellow",
            Severity::Critical => "red",
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Severity::Normal),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity '{}'", value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub data: Vec<f64>,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub datasets: Vec<Dataset>,
}

impl ChartData {
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.datasets.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub chart_data: ChartData,
    #[serde(default)]
    pub anomalies: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// An analysis result plus the top-level fields the model left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterpretedAnalysis {
    pub result: AnalysisResult,
    #[serde(default)]
    pub missing_fields: Vec<String>,
}

impl InterpretedAnalysis {
    pub fn is_displayable(&self) -> bool {
        self.missing_fields.is_empty()
    }
}

/// A numeric lab value read from input text, e.g. `Glucosa: 120 mg/dL`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabValue {
    pub label: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Where an action stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    #[default]
    Idle,
    Ingesting,
    PromptBuilt,
    AwaitingResponse,
    Interpreted,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Analysis,
    Demo,
    FollowUp,
}

/// Record of how the last action of a session ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: ActionKind,
    /// `Interpreted` or `Failed`
    pub stage: PipelineStage,
    /// Last stage the action got to before it ended
    pub reached: PipelineStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl ActionOutcome {
    pub fn succeeded(action: ActionKind) -> Self {
        Self {
            action,
            stage: PipelineStage::Interpreted,
            reached: PipelineStage::Interpreted,
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(action: ActionKind, reached: PipelineStage, error: impl Into<String>) -> Self {
        Self {
            action,
            stage: PipelineStage::Failed,
            reached,
            error: Some(error.into()),
            finished_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub analysis_type: AnalysisType,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub language: Option<Language>,
    /// Replaces the session's file selection when present
    #[serde(default)]
    pub files: Option<Vec<InputSource>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DemoRequest {
    #[serde(default)]
    pub language: Option<Language>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectFilesRequest {
    pub files: Vec<InputSource>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub language: Option<Language>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: String,
    pub selected_files: Vec<String>,
    pub analysis: Option<InterpretedAnalysis>,
    pub lab_values: Vec<LabValue>,
    /// Lab values from the inputs, shaped like the model's chart data
    pub input_chart: ChartData,
    pub last_response: Option<String>,
    pub last_outcome: Option<ActionOutcome>,
    pub status_message: Option<String>,
}
