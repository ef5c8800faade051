use analysis_flow::{Context, NextAction, Result, Task, TaskResult};
use async_trait::async_trait;

use super::{enter_stage, failed, keys};
use crate::error::AssistantError;
use crate::interpret::interpret_reply;
use crate::models::{InterpretedAnalysis, Language, PipelineStage};
use crate::prompt::build_follow_up_prompt;

/// Builds a single-turn question over the current analysis, if any.
pub struct BuildFollowUpPromptTask;

#[async_trait]
impl Task for BuildFollowUpPromptTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let question: String = context.get(keys::QUESTION).await.unwrap_or_default();
        if question.trim().is_empty() {
            return Err(failed(
                self.id(),
                AssistantError::InvalidInput("Question cannot be empty".to_string()),
            ));
        }

        let language: Language = context.get(keys::LANGUAGE).await.unwrap_or_default();
        let current: Option<InterpretedAnalysis> = context.get(keys::ANALYSIS).await;

        let instruction = build_follow_up_prompt(&question, current.as_ref(), language)
            .map_err(|e| failed(self.id(), e))?;
        context.set(keys::INSTRUCTION, &instruction).await?;
        enter_stage(&context, self.id(), PipelineStage::PromptBuilt).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(format!(
                "Follow-up prompt built ({})",
                if current.is_some() { "with context" } else { "no context" }
            )),
        ))
    }
}

/// Returns the model's reply text as the session's last response.
pub struct InterpretReplyTask;

#[async_trait]
impl Task for InterpretReplyTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let body: String = context.require(keys::RAW_RESPONSE).await?;
        let reply = interpret_reply(&body).map_err(|e| failed(self.id(), e))?;

        context.set(keys::LAST_RESPONSE, &reply).await?;
        context.remove(keys::INSTRUCTION).await;
        context.remove(keys::RAW_RESPONSE).await;
        enter_stage(&context, self.id(), PipelineStage::Interpreted).await?;

        Ok(TaskResult::new_with_status(
            Some(reply),
            NextAction::End,
            Some("Follow-up answered".to_string()),
        ))
    }
}
