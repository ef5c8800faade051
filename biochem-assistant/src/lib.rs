pub mod assistant;
pub mod chart;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod interpret;
pub mod models;
pub mod prompt;
pub mod service;
pub mod tasks;
pub mod workflow;

pub use assistant::Assistant;
pub use client::{GeminiClient, GenerationConfig, InferenceClient};
pub use config::Config;
pub use error::{ActionError, AssistantError};
pub use export::{render_analysis, write_export};
pub use models::*;
pub use service::{AppState, build_router, create_app};
pub use workflow::{build_analysis_workflow, build_follow_up_workflow, create_flow_runners};
