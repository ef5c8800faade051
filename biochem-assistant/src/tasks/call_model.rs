use analysis_flow::{Context, NextAction, Result, Task, TaskResult};
use async_trait::async_trait;
use std::sync::Arc;

use super::{enter_stage, failed, keys};
use crate::client::{GenerationConfig, InferenceClient};
use crate::models::PipelineStage;

/// Sends the instruction to the model and keeps the raw body.
pub struct CallModelTask {
    client: Arc<dyn InferenceClient>,
    generation: GenerationConfig,
}

impl CallModelTask {
    pub fn new(client: Arc<dyn InferenceClient>, generation: GenerationConfig) -> Self {
        Self { client, generation }
    }
}

#[async_trait]
impl Task for CallModelTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let instruction: String = context.require(keys::INSTRUCTION).await?;
        enter_stage(&context, self.id(), PipelineStage::AwaitingResponse).await?;

        let body = self
            .client
            .generate(&instruction, &self.generation)
            .await
            .map_err(|e| failed(self.id(), e))?;

        context.set(keys::RAW_RESPONSE, &body).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some("Model response received".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssistantError;
    use std::sync::Mutex;

    struct Recording {
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl InferenceClient for Recording {
        async fn generate(
            &self,
            instruction: &str,
            generation: &GenerationConfig,
        ) -> crate::error::Result<String> {
            self.seen.lock().unwrap().push((
                instruction.to_string(),
                generation.response_mime_type.clone(),
            ));
            if instruction == "fail" {
                return Err(AssistantError::UpstreamError {
                    status: 500,
                    body: "boom".into(),
                });
            }
            Ok("raw body".to_string())
        }
    }

    #[tokio::test]
    async fn stores_raw_body() {
        let client = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
        });
        let task = CallModelTask::new(client.clone(), GenerationConfig::conversational());
        let context = Context::new();
        context.set(keys::INSTRUCTION, "hola").await.unwrap();

        task.run(context.clone()).await.unwrap();

        assert_eq!(
            context.get::<String>(keys::RAW_RESPONSE).await.as_deref(),
            Some("raw body")
        );
        let seen = client.seen.lock().unwrap();
        assert_eq!(*seen, vec![("hola".to_string(), "text/plain".to_string())]);
    }

    #[tokio::test]
    async fn upstream_error_is_kept_as_source() {
        let client = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
        });
        let task = CallModelTask::new(client, GenerationConfig::analysis());
        let context = Context::new();
        context.set(keys::INSTRUCTION, "fail").await.unwrap();

        let err = task.run(context.clone()).await.unwrap_err();
        assert!(matches!(
            err.task_source::<AssistantError>(),
            Some(AssistantError::UpstreamError { status: 500, .. })
        ));
        assert!(!context.contains(keys::RAW_RESPONSE));
    }
}
