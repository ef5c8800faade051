use analysis_flow::{Context, NextAction, Result, Task, TaskResult};
use async_trait::async_trait;
use tracing::debug;

use super::{enter_stage, failed, keys};
use crate::models::{AnalysisOptions, AnalysisRequest, FileRecord, PipelineStage};
use crate::prompt::build_analysis_prompt;

/// Turns the ingested records and the user's options into the instruction string.
pub struct BuildPromptTask;

#[async_trait]
impl Task for BuildPromptTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let records: Vec<FileRecord> = context.require(keys::FILE_RECORDS).await?;
        let options: AnalysisOptions = context
            .get(keys::ANALYSIS_OPTIONS)
            .await
            .unwrap_or_default();

        let request = AnalysisRequest::new(records, options);
        let instruction = build_analysis_prompt(&request).map_err(|e| failed(self.id(), e))?;
        debug!(chars = instruction.len(), "analysis instruction built");

        context.set(keys::INSTRUCTION, &instruction).await?;
        // records are only needed to build the prompt
        context.remove(keys::FILE_RECORDS).await;
        enter_stage(&context, self.id(), PipelineStage::PromptBuilt).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(format!(
                "Prompt built for {} analysis in {}",
                request.analysis_type,
                request.language.code()
            )),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::encode_record;
    use crate::models::{AnalysisType, Language};

    #[tokio::test]
    async fn replaces_records_with_instruction() {
        let context = Context::new();
        let records = vec![encode_record(
            "labs.csv".into(),
            "text/csv".into(),
            b"Hemoglobina,13.5",
        )];
        context.set(keys::FILE_RECORDS, &records).await.unwrap();
        context
            .set(
                keys::ANALYSIS_OPTIONS,
                AnalysisOptions {
                    analysis_type: AnalysisType::Proteins,
                    notes: String::new(),
                    language: Language::Fr,
                },
            )
            .await
            .unwrap();

        BuildPromptTask.run(context.clone()).await.unwrap();

        let instruction: String = context.get(keys::INSTRUCTION).await.unwrap();
        assert!(instruction.contains("Analysis type: proteins."));
        assert!(instruction.contains("Respond in français."));
        assert!(instruction.contains("Hemoglobina,13.5"));
        assert!(!context.contains(keys::FILE_RECORDS));
    }

    #[tokio::test]
    async fn missing_records_is_context_error() {
        let err = BuildPromptTask.run(Context::new()).await.unwrap_err();
        assert!(err.to_string().contains(keys::FILE_RECORDS));
    }
}
