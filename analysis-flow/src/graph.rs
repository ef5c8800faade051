use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::{
    context::Context,
    error::{FlowError, Result},
    storage::Session,
    task::{NextAction, Task, TaskResult},
};

/// A chain of tasks that make up one kind of action
pub struct Graph {
    pub id: String,
    tasks: HashMap<String, Arc<dyn Task>>,
    edges: HashMap<String, String>,
    start_task_id: Option<String>,
}

impl Graph {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: HashMap::new(),
            edges: HashMap::new(),
            start_task_id: None,
        }
    }

    /// Run the session's current task and every task it continues into.
    ///
    /// The loop stops when a task returns [`NextAction::End`] or has no
    /// outgoing edge. The session's context is shared with each task.
    pub async fn execute_session(&self, session: &mut Session) -> Result<ExecutionResult> {
        let mut task_id = session.current_task_id.clone();
        let mut executed: Vec<String> = Vec::new();

        loop {
            if executed.contains(&task_id) {
                return Err(FlowError::Cycle(task_id));
            }

            let result = self
                .execute_single_task(&task_id, session.context.clone())
                .await?;
            executed.push(task_id.clone());

            if result.status_message.is_some() {
                session.status_message = result.status_message.clone();
            }
            session.current_task_id = task_id.clone();

            let next = match result.next_action {
                NextAction::End => None,
                NextAction::ContinueAndExecute => self.next_task(&task_id),
            };

            match next {
                Some(next_task_id) => {
                    debug!(graph = %self.id, from = %task_id, to = %next_task_id, "continuing");
                    task_id = next_task_id;
                }
                None => {
                    return Ok(ExecutionResult {
                        response: result.response,
                        status_message: session.status_message.clone(),
                        executed,
                    });
                }
            }
        }
    }

    async fn execute_single_task(&self, task_id: &str, context: Context) -> Result<TaskResult> {
        let task = self
            .tasks
            .get(task_id)
            .ok_or_else(|| FlowError::TaskNotFound(task_id.to_string()))?;

        let mut result = task.run(context).await?;
        result.task_id = task_id.to_string();

        Ok(result)
    }

    pub fn next_task(&self, current_task_id: &str) -> Option<String> {
        self.edges.get(current_task_id).cloned()
    }

    pub fn start_task_id(&self) -> Option<&str> {
        self.start_task_id.as_deref()
    }

    pub fn contains_task(&self, task_id: &str) -> bool {
        self.tasks.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Builder for creating graphs
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            graph: Graph::new(id),
        }
    }

    /// Add a task. The first task added becomes the start task.
    pub fn add_task(mut self, task: Arc<dyn Task>) -> Self {
        let task_id = task.id().to_string();
        if self.graph.start_task_id.is_none() {
            self.graph.start_task_id = Some(task_id.clone());
        }
        self.graph.tasks.insert(task_id, task);
        self
    }

    /// Add an edge. A later edge from the same task replaces the earlier one.
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.graph.edges.insert(from.into(), to.into());
        self
    }

    pub fn set_start_task(mut self, task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        if self.graph.tasks.contains_key(&task_id) {
            self.graph.start_task_id = Some(task_id);
        }
        self
    }

    /// Chain `tasks` in order: each one continues into the next.
    pub fn chain(mut self, tasks: Vec<Arc<dyn Task>>) -> Self {
        let mut previous: Option<String> = None;
        for task in tasks {
            let task_id = task.id().to_string();
            self = self.add_task(task);
            if let Some(from) = previous.take() {
                self = self.add_edge(from, task_id.clone());
            }
            previous = Some(task_id);
        }
        self
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}

/// Outcome of running a graph to its end
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Response of the last task that ran
    pub response: Option<String>,
    pub status_message: Option<String>,
    /// Task ids in the order they ran
    pub executed: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Append {
        id: String,
        next_action: NextAction,
    }

    #[async_trait]
    impl Task for Append {
        fn id(&self) -> &str {
            &self.id
        }

        async fn run(&self, context: Context) -> Result<TaskResult> {
            let mut trail: Vec<String> = context.get("trail").await.unwrap_or_default();
            trail.push(self.id.clone());
            context.set("trail", &trail).await?;
            Ok(TaskResult::new_with_status(
                Some(format!("after {}", self.id)),
                self.next_action.clone(),
                Some(format!("{} done", self.id)),
            ))
        }
    }

    fn append(id: &str, next_action: NextAction) -> Arc<dyn Task> {
        Arc::new(Append {
            id: id.to_string(),
            next_action,
        })
    }

    #[tokio::test]
    async fn chained_tasks_run_in_order() {
        let graph = GraphBuilder::new("chain")
            .chain(vec![
                append("ingest", NextAction::ContinueAndExecute),
                append("prompt", NextAction::ContinueAndExecute),
                append("call", NextAction::ContinueAndExecute),
            ])
            .build();

        let mut session = Session::new_from_task("s1".to_string(), "ingest");
        let result = graph.execute_session(&mut session).await.unwrap();

        assert_eq!(result.executed, vec!["ingest", "prompt", "call"]);
        assert_eq!(result.response.as_deref(), Some("after call"));
        assert_eq!(session.current_task_id, "call");
        assert_eq!(session.status_message.as_deref(), Some("call done"));

        let trail: Vec<String> = session.context.get("trail").await.unwrap();
        assert_eq!(trail, vec!["ingest", "prompt", "call"]);
    }

    #[tokio::test]
    async fn end_stops_before_next_edge() {
        let graph = GraphBuilder::new("stop")
            .chain(vec![
                append("first", NextAction::End),
                append("second", NextAction::ContinueAndExecute),
            ])
            .build();

        let mut session = Session::new_from_task("s1".to_string(), "first");
        let result = graph.execute_session(&mut session).await.unwrap();

        assert_eq!(result.executed, vec!["first"]);
    }

    #[tokio::test]
    async fn cycles_are_rejected() {
        let graph = GraphBuilder::new("loop")
            .chain(vec![
                append("a", NextAction::ContinueAndExecute),
                append("b", NextAction::ContinueAndExecute),
            ])
            .add_edge("b", "a")
            .build();

        let mut session = Session::new_from_task("s1".to_string(), "a");
        let err = graph.execute_session(&mut session).await.unwrap_err();
        assert!(matches!(err, FlowError::Cycle(id) if id == "a"));
    }

    #[tokio::test]
    async fn unknown_task_is_reported() {
        let graph = GraphBuilder::new("empty").build();
        let mut session = Session::new_from_task("s1".to_string(), "missing");
        let err = graph.execute_session(&mut session).await.unwrap_err();
        assert!(matches!(err, FlowError::TaskNotFound(_)));
    }

    #[test]
    fn first_task_is_start() {
        let graph = GraphBuilder::new("start")
            .add_task(append("one", NextAction::End))
            .add_task(append("two", NextAction::End))
            .build();
        assert_eq!(graph.start_task_id(), Some("one"));
        assert_eq!(graph.len(), 2);
    }
}
