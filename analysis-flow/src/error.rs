use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Graph has no start task: {0}")]
    EmptyGraph(String),

    #[error("Task {0} reached twice in one action")]
    Cycle(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Context error: {0}")]
    ContextError(String),

    #[error("Session {0} started a newer action; result discarded")]
    Superseded(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Task {task_id} failed: {source}")]
    TaskFailed {
        task_id: String,
        #[source]
        source: BoxError,
    },
}

impl FlowError {
    pub fn task_failed(task_id: impl Into<String>, source: impl Into<BoxError>) -> Self {
        FlowError::TaskFailed {
            task_id: task_id.into(),
            source: source.into(),
        }
    }

    /// Takes the task's own error out when it is of type `E`; otherwise gives
    /// `self` back unchanged.
    pub fn into_task_source<E: std::error::Error + Send + Sync + 'static>(
        self,
    ) -> std::result::Result<E, FlowError> {
        match self {
            FlowError::TaskFailed { task_id, source } => match source.downcast::<E>() {
                Ok(inner) => Ok(*inner),
                Err(source) => Err(FlowError::TaskFailed { task_id, source }),
            },
            other => Err(other),
        }
    }

    /// Returns the task's own error when it is of type `E`.
    pub fn task_source<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            FlowError::TaskFailed { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
