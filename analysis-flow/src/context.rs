use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{FlowError, Result};

/// Key/value state shared by the tasks of one session.
///
/// Cloning a `Context` yields another handle onto the same map. Use
/// [`Context::snapshot`] when an independent copy is needed.
#[derive(Clone, Debug, Default)]
pub struct Context {
    data: Arc<DashMap<String, Value>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        self.set_sync(key, value)
    }

    pub fn set_sync(&self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| FlowError::ContextError(format!("cannot store '{}': {}", key, e)))?;
        self.data.insert(key, value);
        Ok(())
    }

    /// Typed read. Returns `None` when the key is absent or holds a value of
    /// another shape.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_sync(key)
    }

    pub fn get_sync<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Typed read of a key a task cannot proceed without.
    pub async fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .data
            .get(key)
            .map(|v| v.clone())
            .ok_or_else(|| FlowError::ContextError(format!("'{}' not found in context", key)))?;
        serde_json::from_value(value)
            .map_err(|e| FlowError::ContextError(format!("'{}' has unexpected shape: {}", key, e)))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.remove_sync(key)
    }

    pub fn remove_sync(&self, key: &str) -> Option<Value> {
        self.data.remove(key).map(|(_, v)| v)
    }

    pub async fn clear(&self) {
        self.data.clear();
    }

    /// Deep copy detached from this handle.
    pub fn snapshot(&self) -> Context {
        let data = DashMap::with_capacity(self.data.len());
        for entry in self.data.iter() {
            data.insert(entry.key().clone(), entry.value().clone());
        }
        Context {
            data: Arc::new(data),
        }
    }

    /// Copies every entry of `other` into this context, overwriting shared keys.
    pub fn merge_from(&self, other: &Context) {
        for entry in other.data.iter() {
            self.data.insert(entry.key().clone(), entry.value().clone());
        }
    }

    /// Copies the entries of `other` whose keys this context does not hold yet.
    pub fn fill_from(&self, other: &Context) {
        for entry in other.data.iter() {
            if !self.data.contains_key(entry.key()) {
                self.data.insert(entry.key().clone(), entry.value().clone());
            }
        }
    }

    /// Entries written or removed in this context relative to `base`.
    pub fn changes_since(&self, base: &Context) -> ContextDelta {
        let mut delta = ContextDelta::default();
        for entry in self.data.iter() {
            let unchanged = base
                .data
                .get(entry.key())
                .is_some_and(|old| *old == *entry.value());
            if !unchanged {
                delta
                    .written
                    .push((entry.key().clone(), entry.value().clone()));
            }
        }
        for entry in base.data.iter() {
            if !self.data.contains_key(entry.key()) {
                delta.removed.push(entry.key().clone());
            }
        }
        delta
    }

    pub fn apply(&self, delta: &ContextDelta) {
        for key in &delta.removed {
            self.data.remove(key);
        }
        for (key, value) in &delta.written {
            self.data.insert(key.clone(), value.clone());
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

/// Difference between two states of a context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextDelta {
    pub written: Vec<(String, Value)>,
    pub removed: Vec<String>,
}

impl ContextDelta {
    pub fn is_empty(&self) -> bool {
        self.written.is_empty() && self.removed.is_empty()
    }
}
