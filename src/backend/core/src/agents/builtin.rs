//! Closure-backed agent behavior.
//!
//! [`FnAgent`] lets embedders plug a task body in without writing a full
//! [`AgentBehavior`] impl, and lets tests inject faults into any lifecycle
//! hook.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::agent::AgentBehavior;
use super::config::AgentConfig;
use super::health::HealthIssue;
use crate::jobs::JobKind;

type TaskFn = dyn Fn(JobKind) -> BoxFuture<'static, anyhow::Result<serde_json::Value>> + Send + Sync;
type SelfCheckFn = dyn Fn() -> Vec<HealthIssue> + Send + Sync;

/// Agent behavior built from a task closure.
pub struct FnAgent {
    task: Arc<TaskFn>,
    self_check: Option<Arc<SelfCheckFn>>,
    init_fault: Option<String>,
    start_fault: Option<String>,
    stop_fault: Option<String>,
    reconfigure_fault: Option<String>,
    runs: AtomicU64,
}

impl FnAgent {
    pub fn new<F, Fut>(task: F) -> Self
    where
        F: Fn(JobKind) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        Self {
            task: Arc::new(move |kind| Box::pin(task(kind))),
            self_check: None,
            init_fault: None,
            start_fault: None,
            stop_fault: None,
            reconfigure_fault: None,
            runs: AtomicU64::new(0),
        }
    }

    /// Task body that always succeeds, echoing the job kind.
    pub fn succeeding() -> Self {
        Self::new(|kind| async move { Ok(serde_json::json!({ "kind": kind })) })
    }

    /// Task body that always faults with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::new(move |_| {
            let message = message.clone();
            async move { Err(anyhow::anyhow!(message)) }
        })
    }

    pub fn with_self_check<F>(mut self, check: F) -> Self
    where
        F: Fn() -> Vec<HealthIssue> + Send + Sync + 'static,
    {
        self.self_check = Some(Arc::new(check));
        self
    }

    pub fn with_init_fault(mut self, message: impl Into<String>) -> Self {
        self.init_fault = Some(message.into());
        self
    }

    pub fn with_start_fault(mut self, message: impl Into<String>) -> Self {
        self.start_fault = Some(message.into());
        self
    }

    pub fn with_stop_fault(mut self, message: impl Into<String>) -> Self {
        self.stop_fault = Some(message.into());
        self
    }

    pub fn with_reconfigure_fault(mut self, message: impl Into<String>) -> Self {
        self.reconfigure_fault = Some(message.into());
        self
    }

    /// Number of task bodies started so far.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }
}

fn fault(message: &Option<String>) -> anyhow::Result<()> {
    match message {
        Some(message) => Err(anyhow::anyhow!(message.clone())),
        None => Ok(()),
    }
}

#[async_trait]
impl AgentBehavior for FnAgent {
    async fn initialize(&self) -> anyhow::Result<()> {
        fault(&self.init_fault)
    }

    async fn start(&self) -> anyhow::Result<()> {
        fault(&self.start_fault)
    }

    async fn stop(&self) -> anyhow::Result<()> {
        fault(&self.stop_fault)
    }

    async fn reconfigure(&self, _config: &AgentConfig) -> anyhow::Result<()> {
        fault(&self.reconfigure_fault)
    }

    async fn run_task(&self, kind: JobKind) -> anyhow::Result<serde_json::Value> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        (self.task)(kind).await
    }

    async fn self_check(&self) -> Vec<HealthIssue> {
        match &self.self_check {
            Some(check) => check(),
            None => Vec::new(),
        }
    }
}
