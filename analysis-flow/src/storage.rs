use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    Context,
    error::{FlowError, Result},
};

/// Session information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub graph_id: String,
    pub current_task_id: String,
    pub status_message: Option<String>,
    /// Bumped every time an action begins; only the newest action may commit.
    pub action_seq: u64,
    #[serde(skip)]
    pub context: Context,
}

impl Session {
    pub fn new(sid: impl Into<String>) -> Self {
        Self {
            id: sid.into(),
            graph_id: "default".to_string(),
            current_task_id: String::new(),
            status_message: None,
            action_seq: 0,
            context: Context::new(),
        }
    }

    pub fn new_from_task(sid: String, task_name: &str) -> Self {
        Self {
            current_task_id: task_name.to_string(),
            ..Self::new(sid)
        }
    }
}

/// In-place change to a stored session, see [`SessionStorage::update`].
pub type SessionUpdate<'a> = Box<dyn FnOnce(&mut Session) -> Result<()> + Send + 'a>;

/// Trait for storing and retrieving sessions
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn save(&self, session: Session) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Session>>;
    async fn delete(&self, id: &str) -> Result<()>;

    /// Run `apply` on the stored session with no other update in between and
    /// return the session as it was left.
    ///
    /// `apply` should check before it mutates: on error the session is kept
    /// as `apply` left it. Fails with [`FlowError::SessionNotFound`] when
    /// there is no such session.
    async fn update(&self, id: &str, apply: SessionUpdate<'_>) -> Result<Session>;
}

/// In-memory implementation of SessionStorage
#[derive(Default)]
pub struct InMemorySessionStorage {
    sessions: Arc<DashMap<String, Session>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn save(&self, session: Session) -> Result<()> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.get(id).map(|entry| entry.clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn update(&self, id: &str, apply: SessionUpdate<'_>) -> Result<Session> {
        // the shard stays write-locked until `entry` drops
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| FlowError::SessionNotFound(id.to_string()))?;
        apply(entry.value_mut())?;
        Ok(entry.value().clone())
    }
}
