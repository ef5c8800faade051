pub mod context;
pub mod error;
pub mod graph;
pub mod runner;
pub mod storage;
pub mod task;

// Re-export commonly used types
pub use context::{Context, ContextDelta};
pub use error::{BoxError, FlowError, Result};
pub use graph::{ExecutionResult, Graph, GraphBuilder};
pub use runner::FlowRunner;
pub use storage::{InMemorySessionStorage, Session, SessionStorage, SessionUpdate};
pub use task::{NextAction, Task, TaskResult};
