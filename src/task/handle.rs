/// Locked task handle
///
/// Each task owns its own reader-writer lock so operations on different tasks
/// never contend. The lock is a tokio lock because approver resolution may
/// await an HTTP call while the exclusive guard is held.

use super::state::TaskState;
use super::types::{ApprovalRecord, TaskData};
use crate::runtime::ContextCache;
use crate::template::Template;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockWriteGuard};

#[derive(Debug)]
pub struct Task {
    id: String,
    /// Template version the task was created from
    template: Arc<Template>,
    data: RwLock<TaskData>,
    cache: Arc<ContextCache>,
}

impl Task {
    pub fn new(data: TaskData, template: Arc<Template>) -> Self {
        let cache = ContextCache::new();
        cache.set("task_id", json!(data.id));
        cache.set("business_id", json!(data.business_id));
        cache.set("template_id", json!(data.template_id));

        Self {
            id: data.id.clone(),
            template,
            data: RwLock::new(data),
            cache: Arc::new(cache),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Per-task memo readable by `context` value sources
    pub fn cache(&self) -> &Arc<ContextCache> {
        &self.cache
    }

    /// Deep copy of the task for external inspection
    pub async fn snapshot(&self) -> TaskData {
        self.data.read().await.clone()
    }

    pub async fn state(&self) -> TaskState {
        self.data.read().await.state
    }

    pub async fn current_node(&self) -> String {
        self.data.read().await.current_node.clone()
    }

    pub async fn records(&self) -> Vec<ApprovalRecord> {
        self.data.read().await.records.clone()
    }

    pub async fn approvers(&self, node_id: &str) -> Vec<String> {
        self.data.read().await.approvers_of(node_id).to_vec()
    }

    pub async fn business_id(&self) -> String {
        self.data.read().await.business_id.clone()
    }

    /// Mutate under the exclusive lock; refreshes `updated_at`
    pub async fn update<R>(&self, f: impl FnOnce(&mut TaskData) -> R) -> R {
        let mut data = self.data.write().await;
        let result = f(&mut data);
        data.updated_at = Utc::now();
        result
    }

    /// Exclusive guard for compound operations that await while locked
    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, TaskData> {
        self.data.write().await
    }
}
