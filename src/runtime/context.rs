/// Node execution context and results
///
/// Everything an executor may read while a node runs, and the shape of what
/// it hands back to the graph walker.

use crate::approval::ApprovalResult;
use crate::approver::HttpClient;
use crate::config::RetryPolicy;
use crate::task::TaskData;
use crate::template::{Node, Template};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Where a condition or parameter mapping reads its value from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// The task's submitted params
    #[default]
    TaskParams,
    /// Output recorded by an earlier node
    NodeOutputs,
    /// The per-task context cache
    Context,
}

impl ValueSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskParams => "task_params",
            Self::NodeOutputs => "node_outputs",
            Self::Context => "context",
        }
    }
}

/// Follow a dotted path (`a.b.0.c`) through objects and arrays
///
/// An empty path returns `value` itself.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }

    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// JSON type name used in type-mismatch messages
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Thread-safe string-keyed memo shared by the nodes of one task
#[derive(Debug, Default)]
pub struct ContextCache {
    entries: RwLock<HashMap<String, Value>>,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Return the cached value, computing and storing it on a miss
    pub fn get_or_insert_with(&self, key: &str, init: impl FnOnce() -> Value) -> Value {
        if let Some(value) = self.get(key) {
            return value;
        }
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_insert_with(init)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read-only view handed to a node executor
#[derive(Clone)]
pub struct NodeContext<'a> {
    pub task: &'a TaskData,
    pub node: &'a Node,
    pub template: &'a Template,
    pub params: &'a Value,
    pub outputs: &'a HashMap<String, Value>,
    /// Absent cache behaves as empty; writes are dropped
    pub cache: Option<&'a ContextCache>,
    /// Transport used for dynamic approvers that do not carry their own client
    pub http_client: Option<Arc<dyn HttpClient>>,
    pub retry: RetryPolicy,
}

impl<'a> NodeContext<'a> {
    pub fn new(task: &'a TaskData, node: &'a Node, template: &'a Template) -> Self {
        Self {
            task,
            node,
            template,
            params: &task.params,
            outputs: &task.node_outputs,
            cache: None,
            http_client: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_cache(mut self, cache: &'a ContextCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_http_client(mut self, client: Option<Arc<dyn HttpClient>>) -> Self {
        self.http_client = client;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache_get(&self, key: &str) -> Option<Value> {
        self.cache.and_then(|cache| cache.get(key))
    }

    pub fn cache_set(&self, key: impl Into<String>, value: Value) {
        if let Some(cache) = self.cache {
            cache.set(key, value);
        }
    }
}

impl std::fmt::Debug for NodeContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("task_id", &self.task.id)
            .field("node_id", &self.node.id)
            .field("template_id", &self.template.id)
            .field("has_cache", &self.cache.is_some())
            .field("has_http_client", &self.http_client.is_some())
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    NodeActivated,
    NodeCompleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NodeActivated => "node_activated",
            Self::NodeCompleted => "node_completed",
        }
    }
}

/// Event emitted by an executor and appended to the task's event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub time: DateTime<Utc>,
    pub data: Value,
}

impl NodeEvent {
    pub fn new(event_type: EventType, data: Value) -> Self {
        Self {
            event_type,
            time: Utc::now(),
            data,
        }
    }
}

/// What a node produced
///
/// An empty `next_node_id` leaves routing to the walker (edge lookup), except
/// for end nodes where it means the walk is over.
#[derive(Debug, Clone, Default)]
pub struct NodeResult {
    pub next_node_id: String,
    pub output: Value,
    pub events: Vec<NodeEvent>,
    /// Set by approval nodes once complete
    pub outcome: Option<ApprovalResult>,
}
