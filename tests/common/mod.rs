#![allow(dead_code)]

use approvalflow::approver::{HttpClient, HttpRequest, HttpResponse};
use approvalflow::template::{ApprovalNodeConfig, MemoryTemplateStore, Node, Template, TemplateStore};
use approvalflow::{ApprovalMode, ApproverConfig, TaskManager};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub fn users(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

pub fn fixed(mode: ApprovalMode, approvers: &[&str]) -> ApprovalNodeConfig {
    ApprovalNodeConfig::new(mode, ApproverConfig::fixed(users(approvers)))
}

/// `start -> approve -> end` around a single approval node
pub fn linear(id: &str, approval: ApprovalNodeConfig) -> Template {
    Template::new(id, id)
        .with_node(Node::start("start"))
        .with_node(Node::approval("approve", approval))
        .with_node(Node::end("end"))
        .with_edge("start", "approve")
        .with_edge("approve", "end")
}

/// `start -> first -> second -> end`
pub fn two_step(id: &str, first: ApprovalNodeConfig, second: ApprovalNodeConfig) -> Template {
    Template::new(id, id)
        .with_node(Node::start("start"))
        .with_node(Node::approval("first", first))
        .with_node(Node::approval("second", second))
        .with_node(Node::end("end"))
        .with_edge("start", "first")
        .with_edge("first", "second")
        .with_edge("second", "end")
}

/// Manager over a fresh in-memory store holding `templates`
pub async fn manager_with(templates: Vec<Template>) -> TaskManager {
    let store = Arc::new(MemoryTemplateStore::new());
    for template in templates {
        store.create(template).await.unwrap();
    }
    TaskManager::new(store as Arc<dyn TemplateStore>)
}

/// HTTP client replaying a fixed script of replies
#[derive(Default)]
pub struct MockHttpClient {
    replies: Mutex<VecDeque<anyhow::Result<HttpResponse>>>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    pub fn new(replies: Vec<anyhow::Result<HttpResponse>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn ok(body: &str) -> anyhow::Result<HttpResponse> {
        Ok(HttpResponse::new(200, body.as_bytes().to_vec()))
    }

    pub fn status(status: u16) -> anyhow::Result<HttpResponse> {
        Ok(HttpResponse::new(status, b"{}".to_vec()))
    }

    pub fn transport_error(message: &str) -> anyhow::Result<HttpResponse> {
        Err(anyhow::anyhow!(message.to_string()))
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
        self.calls.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("mock script exhausted")))
    }
}
