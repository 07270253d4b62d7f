//! Recurring task driver.
//!
//! Keeps one [`Ticker`] per registered agent. Each tick enqueues a
//! `Background` job for the agent, provided it is enabled and Running at
//! that moment. Registry events keep the timer set in step with the
//! registry while the driver is active.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::executor::JobExecutor;
use super::job::{Job, JobKind};
use crate::agents::{AgentEvent, ObserverId};
use crate::auth::CallSource;
use crate::ticker::Ticker;

struct DriverShared {
    executor: Arc<JobExecutor>,
    timers: Mutex<HashMap<String, Ticker>>,
    active: AtomicBool,
}

/// Per-agent interval timers feeding the executor.
pub struct RecurringDriver {
    shared: Arc<DriverShared>,
    observer: Option<ObserverId>,
}

impl std::fmt::Debug for RecurringDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecurringDriver")
            .field("active", &self.is_active())
            .field("timers", &self.active_timers())
            .finish()
    }
}

impl RecurringDriver {
    /// Create an inactive driver subscribed to the executor's registry.
    pub fn new(executor: Arc<JobExecutor>) -> Self {
        let shared = Arc::new(DriverShared {
            executor,
            timers: Mutex::new(HashMap::new()),
            active: AtomicBool::new(false),
        });

        let weak: Weak<DriverShared> = Arc::downgrade(&shared);
        let observer = shared
            .executor
            .context()
            .registry
            .subscribe(move |event| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_event(event);
                }
            });

        Self {
            shared,
            observer: Some(observer),
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Activate and start a timer for every registered agent.
    pub fn start_all(&self) {
        self.shared.active.store(true, Ordering::SeqCst);
        let ids = self.shared.executor.context().registry.ids();
        let started = ids.iter().filter(|id| self.shared.start_for(id)).count();
        info!(timers = started, "Recurring timers started");
    }

    /// Deactivate and cancel every timer.
    pub fn stop_all(&self) {
        self.shared.active.store(false, Ordering::SeqCst);
        let timers: Vec<Ticker> = self.shared.timers.lock().drain().map(|(_, t)| t).collect();
        for ticker in &timers {
            ticker.stop();
        }
        if !timers.is_empty() {
            info!(timers = timers.len(), "Recurring timers stopped");
        }
    }

    /// Start (or replace) the timer for one agent. No-op while inactive.
    pub fn start_for(&self, agent_id: &str) -> bool {
        self.shared.start_for(agent_id)
    }

    pub fn stop_for(&self, agent_id: &str) -> bool {
        self.shared.stop_for(agent_id)
    }

    /// Restart an agent's timer with its current interval.
    pub fn reschedule(&self, agent_id: &str) -> bool {
        self.shared.stop_for(agent_id);
        self.shared.start_for(agent_id)
    }

    /// One tick's worth of work for `agent_id`, run immediately.
    pub async fn fire(&self, agent_id: &str) -> Option<Job> {
        fire(&self.shared.executor, agent_id).await
    }

    pub fn active_timers(&self) -> usize {
        self.shared.timers.lock().len()
    }

    /// Period of the agent's current timer.
    pub fn timer_period(&self, agent_id: &str) -> Option<Duration> {
        self.shared.timers.lock().get(agent_id).map(Ticker::period)
    }
}

impl Drop for RecurringDriver {
    fn drop(&mut self) {
        if let Some(id) = self.observer.take() {
            self.shared.executor.context().registry.unsubscribe(id);
        }
        self.stop_all();
    }
}

impl DriverShared {
    fn on_event(&self, event: &AgentEvent) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        match event {
            AgentEvent::Registered { agent_id } => {
                self.start_for(agent_id);
            }
            AgentEvent::Unregistered { agent_id } => {
                self.stop_for(agent_id);
            }
            AgentEvent::Configured {
                agent_id,
                schedule_changed: true,
            } => {
                self.stop_for(agent_id);
                self.start_for(agent_id);
            }
            _ => {}
        }
    }

    fn start_for(&self, agent_id: &str) -> bool {
        if !self.active.load(Ordering::SeqCst) {
            return false;
        }
        let Some(agent) = self.executor.context().registry.get(agent_id) else {
            return false;
        };

        let period = agent.config().schedule_interval;
        let executor = self.executor.clone();
        let id = agent_id.to_string();
        let ticker = Ticker::spawn(format!("recurring:{}", agent_id), period, move || {
            let executor = executor.clone();
            let id = id.clone();
            async move {
                fire(&executor, &id).await;
            }
        });

        if let Some(previous) = self.timers.lock().insert(agent_id.to_string(), ticker) {
            previous.stop();
        }
        debug!(agent_id = %agent_id, period_ms = period.as_millis() as u64, "Recurring timer set");
        true
    }

    fn stop_for(&self, agent_id: &str) -> bool {
        match self.timers.lock().remove(agent_id) {
            Some(ticker) => {
                ticker.stop();
                debug!(agent_id = %agent_id, "Recurring timer cleared");
                true
            }
            None => false,
        }
    }
}

async fn fire(executor: &JobExecutor, agent_id: &str) -> Option<Job> {
    let agent = executor.context().registry.get(agent_id)?;
    if !agent.is_enabled() || !agent.state().is_running() {
        trace!(agent_id = %agent_id, state = %agent.state(), "Skipping recurring run");
        return None;
    }

    match executor
        .schedule_job(agent_id, JobKind::Background, Duration::ZERO, CallSource::System)
        .await
    {
        Ok(job) => Some(job),
        Err(e) => {
            warn!(agent_id = %agent_id, error = %e.describe(), "Recurring enqueue failed");
            None
        }
    }
}
