//! Live-session registry.
//!
//! One entry per session with a running (or parked) loop: the driver, the
//! reasoning client, the control flags, and any safety acknowledgment
//! waiting on a human. The registry is an explicit service object handed
//! to whoever needs it; there is no global state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use webpilot_core::{Action, SafetyCheck};
use webpilot_driver::Driver;

use crate::client::ReasoningAgent;
use crate::control::SessionControl;

/// A computer call parked at the safety barrier. Holds everything needed
/// to execute and acknowledge it once a human approves.
#[derive(Debug, Clone)]
pub struct PendingSafety {
    pub response_id: String,
    pub call_id: String,
    pub action: Action,
    pub checks: Vec<SafetyCheck>,
}

pub struct ActiveSession {
    pub task_id: String,
    pub control: Arc<SessionControl>,
    pub driver: AsyncMutex<Box<dyn Driver>>,
    pub agent: Arc<dyn ReasoningAgent>,
    pub pending_safety: Mutex<Option<PendingSafety>>,
}

impl ActiveSession {
    pub fn new(task_id: String, driver: Box<dyn Driver>, agent: Arc<dyn ReasoningAgent>) -> Self {
        Self {
            task_id,
            control: Arc::new(SessionControl::new()),
            driver: AsyncMutex::new(driver),
            agent,
            pending_safety: Mutex::new(None),
        }
    }

    pub fn park_safety(&self, pending: PendingSafety) {
        *self.pending_safety.lock().expect("pending lock poisoned") = Some(pending);
    }

    pub fn take_pending_safety(&self) -> Option<PendingSafety> {
        self.pending_safety
            .lock()
            .expect("pending lock poisoned")
            .take()
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<ActiveSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session_id: &str, active: ActiveSession) -> Arc<ActiveSession> {
        let active = Arc::new(active);
        self.sessions
            .lock()
            .expect("registry poisoned")
            .insert(session_id.to_string(), active.clone());
        debug!(session_id, "Session registered");
        active
    }

    /// Remove a session and best-effort close its driver.
    pub async fn unregister(&self, session_id: &str) {
        let removed = self
            .sessions
            .lock()
            .expect("registry poisoned")
            .remove(session_id);
        if let Some(active) = removed {
            active.driver.lock().await.close().await;
            debug!(session_id, "Session unregistered");
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<ActiveSession>> {
        self.sessions
            .lock()
            .expect("registry poisoned")
            .get(session_id)
            .cloned()
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .expect("registry poisoned")
            .contains_key(session_id)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.lock().expect("registry poisoned").len()
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.sessions
            .lock()
            .expect("registry poisoned")
            .keys()
            .cloned()
            .collect()
    }
}
