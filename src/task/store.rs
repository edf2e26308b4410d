/// Task storage
///
/// The store only tracks membership; field-level mutation goes through each
/// task's own lock.

use super::handle::Task;
use crate::error::{FlowError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Register a new task; fails if the ID is taken
    async fn insert(&self, task: Arc<Task>) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Arc<Task>>;

    async fn remove(&self, id: &str) -> Result<Arc<Task>>;

    /// All tasks, ordered by ID
    async fn list(&self) -> Result<Vec<Arc<Task>>>;
}

/// In-memory task store
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<String, Arc<Task>>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, task: Arc<Task>) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(task.id()) {
            return Err(FlowError::InvalidOperation(format!(
                "task '{}' already exists",
                task.id()
            )));
        }
        tasks.insert(task.id().to_string(), task);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Arc<Task>> {
        self.tasks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| FlowError::TaskNotFound(id.to_string()))
    }

    async fn remove(&self, id: &str) -> Result<Arc<Task>> {
        self.tasks
            .write()
            .await
            .remove(id)
            .ok_or_else(|| FlowError::TaskNotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<Arc<Task>>> {
        let mut tasks: Vec<Arc<Task>> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(tasks)
    }
}
