//! FlowRunner – runs one whole action for a session and commits its effect.
//!
//! An action is a full pass through a [`Graph`]: every task from the start task
//! until one ends the chain. Tasks work on a detached working context, so a
//! failing action never leaves half-written state behind:
//!
//! 1. **begin**: bump the session's `action_seq` and fill the working context
//!    with the stored entries the caller's inputs do not override.
//! 2. **execute**: run the graph against the working context.
//! 3. **commit**: on success, apply the working context's changes to the
//!    stored session if its `action_seq` still matches. If another action
//!    began meanwhile, the older result is dropped with
//!    [`FlowError::Superseded`].
//!
//! Both the bump and the check-and-apply go through
//! [`SessionStorage::update`], so concurrent actions and other writers on the
//! same session cannot interleave with them. Writes made to the stored
//! session between begin and commit (for example a new file selection)
//! survive the commit unless the action changed the same key.

use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    context::Context,
    error::{FlowError, Result},
    graph::{ExecutionResult, Graph},
    storage::{Session, SessionStorage, SessionUpdate},
};

/// Couples a graph with the storage its sessions live in.
#[derive(Clone)]
pub struct FlowRunner {
    graph: Arc<Graph>,
    storage: Arc<dyn SessionStorage>,
}

impl FlowRunner {
    pub fn new(graph: Arc<Graph>, storage: Arc<dyn SessionStorage>) -> Self {
        Self { graph, storage }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub async fn run(&self, session_id: &str) -> Result<ExecutionResult> {
        self.run_with(session_id, Context::new()).await
    }

    /// Run the graph for `session_id` with `work` as the working context.
    ///
    /// `work` carries the caller's per-action inputs; tasks read and write it,
    /// so the caller can look at what the action got to whether or not it
    /// committed. Inputs are not persisted unless a task rewrites them.
    pub async fn run_with(&self, session_id: &str, work: Context) -> Result<ExecutionResult> {
        let mut scratch = self.begin(session_id, work).await?;
        let base = scratch.context.snapshot();

        info!(
            session_id,
            graph = %self.graph.id,
            action_seq = scratch.action_seq,
            "action started"
        );

        match self.graph.execute_session(&mut scratch).await {
            Ok(result) => {
                self.commit(scratch, &base).await?;
                Ok(result)
            }
            Err(e) => {
                warn!(session_id, graph = %self.graph.id, error = %e, "action failed");
                Err(e)
            }
        }
    }

    async fn begin(&self, session_id: &str, work: Context) -> Result<Session> {
        let start = self
            .graph
            .start_task_id()
            .ok_or_else(|| FlowError::EmptyGraph(self.graph.id.clone()))?
            .to_string();

        let bump: SessionUpdate<'_> = Box::new(|session| {
            session.action_seq += 1;
            Ok(())
        });
        let session = self.storage.update(session_id, bump).await?;
        work.fill_from(&session.context);

        Ok(Session {
            graph_id: self.graph.id.clone(),
            current_task_id: start,
            context: work,
            ..session
        })
    }

    async fn commit(&self, scratch: Session, base: &Context) -> Result<()> {
        let delta = scratch.context.changes_since(base);
        let (written, removed) = (delta.written.len(), delta.removed.len());
        let Session {
            id,
            graph_id,
            current_task_id,
            status_message,
            action_seq,
            ..
        } = scratch;

        let apply: SessionUpdate<'_> = Box::new(|stored| {
            if stored.action_seq != action_seq {
                warn!(
                    session_id = %stored.id,
                    ours = action_seq,
                    latest = stored.action_seq,
                    "discarding superseded action"
                );
                return Err(FlowError::Superseded(stored.id.clone()));
            }
            stored.context.apply(&delta);
            stored.graph_id = graph_id;
            stored.current_task_id = current_task_id;
            stored.status_message = status_message;
            Ok(())
        });
        self.storage.update(&id, apply).await?;

        info!(session_id = %id, written, removed, "action committed");
        Ok(())
    }
}
