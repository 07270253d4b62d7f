//! Shared state handed to every component at construction.

use std::sync::Arc;

use crate::agents::AgentRegistry;
use crate::clock::{SharedClock, SystemClock};
use crate::jobs::JobStore;

/// The registry, job store and clock one scheduler instance works against.
///
/// Cloning is cheap. Independent contexts never share state, so several
/// schedulers can coexist in one process.
#[derive(Debug, Clone)]
pub struct CoreContext {
    pub registry: Arc<AgentRegistry>,
    pub jobs: Arc<JobStore>,
    pub clock: SharedClock,
}

impl CoreContext {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            registry: Arc::new(AgentRegistry::new(clock.clone())),
            jobs: Arc::new(JobStore::new()),
            clock,
        }
    }

    /// Context on the system clock.
    pub fn system() -> Self {
        Self::new(SystemClock::shared())
    }
}

impl Default for CoreContext {
    fn default() -> Self {
        Self::system()
    }
}
