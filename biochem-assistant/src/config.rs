use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AssistantError, Result};
use crate::models::Language;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_DEMO_SAMPLE: &str = "sample_data.csv";

/// Runtime settings, read from the environment.
#[derive(Clone)]
pub struct Config {
    /// Credential for the model endpoint; required to build a client.
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub request_timeout: Duration,
    pub demo_sample: PathBuf,
    pub default_language: Language,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(60),
            demo_sample: PathBuf::from(DEFAULT_DEMO_SAMPLE),
            default_language: Language::default(),
            port: 3000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unset or blank keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let request_timeout = match get("BIOCHEM_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(AssistantError::InvalidConfig(format!(
                        "BIOCHEM_TIMEOUT_SECS must be a positive whole number of seconds, got '{}'",
                        raw
                    )))
                }
            },
            None => defaults.request_timeout,
        };

        let default_language = match get("BIOCHEM_LANGUAGE") {
            Some(raw) => raw.parse::<Language>().map_err(AssistantError::InvalidConfig)?,
            None => defaults.default_language,
        };

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                AssistantError::InvalidConfig(format!("PORT must be a port number, got '{}'", raw))
            })?,
            None => defaults.port,
        };

        Ok(Self {
            api_key: get("GEMINI_API_KEY"),
            model: get("GEMINI_MODEL").unwrap_or(defaults.model),
            api_base: get("GEMINI_API_BASE")
                .map(|b| b.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            request_timeout,
            demo_sample: get("BIOCHEM_DEMO_SAMPLE")
                .map(PathBuf::from)
                .unwrap_or(defaults.demo_sample),
            default_language,
            port,
        })
    }

    pub fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or(AssistantError::MissingCredential)
    }

    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("request_timeout", &self.request_timeout)
            .field("demo_sample", &self.demo_sample)
            .field("default_language", &self.default_language)
            .field("port", &self.port)
            .finish()
    }
}
