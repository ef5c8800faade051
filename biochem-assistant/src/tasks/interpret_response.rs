use analysis_flow::{Context, NextAction, Result, Task, TaskResult};
use async_trait::async_trait;
use tracing::info;

use super::{enter_stage, failed, keys};
use crate::export::render_analysis;
use crate::interpret::interpret_analysis;
use crate::models::PipelineStage;

/// Parses the raw body into the session's analysis result.
pub struct InterpretAnalysisTask;

#[async_trait]
impl Task for InterpretAnalysisTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let body: String = context.require(keys::RAW_RESPONSE).await?;
        let analysis = interpret_analysis(&body).map_err(|e| failed(self.id(), e))?;

        context.set(keys::ANALYSIS, &analysis).await?;
        context
            .set(keys::LAST_RESPONSE, render_analysis(&analysis))
            .await?;
        context.remove(keys::INSTRUCTION).await;
        context.remove(keys::RAW_RESPONSE).await;
        enter_stage(&context, self.id(), PipelineStage::Interpreted).await?;

        info!(
            findings = analysis.result.findings.len(),
            complete = analysis.is_displayable(),
            "analysis stored"
        );

        Ok(TaskResult::new_with_status(
            Some(analysis.result.summary.clone()),
            NextAction::End,
            Some("Analysis completed".to_string()),
        ))
    }
}
