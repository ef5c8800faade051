use analysis_flow::{Context, NextAction, Result, Task, TaskResult};
use async_trait::async_trait;
use tracing::info;

use super::{enter_stage, failed, keys};
use crate::chart::lab_values_from_records;
use crate::error::AssistantError;
use crate::ingest::ingest;
use crate::models::{InputSource, PipelineStage};

/// Reads the action's input sources into file records.
pub struct IngestFilesTask;

#[async_trait]
impl Task for IngestFilesTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        enter_stage(&context, self.id(), PipelineStage::Ingesting).await?;

        let sources: Vec<InputSource> = context.get(keys::INPUT_SOURCES).await.unwrap_or_default();
        if sources.is_empty() {
            return Err(failed(
                self.id(),
                AssistantError::InvalidInput("No files selected for analysis".to_string()),
            ));
        }

        let records = ingest(&sources).await.map_err(|e| failed(self.id(), e))?;
        let lab_values = lab_values_from_records(&records);
        info!(
            files = records.len(),
            lab_values = lab_values.len(),
            "input files ingested"
        );

        context.set(keys::FILE_RECORDS, &records).await?;
        context.set(keys::LAB_VALUES, &lab_values).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(format!("Ingested {} file(s)", records.len())),
        ))
    }
}
