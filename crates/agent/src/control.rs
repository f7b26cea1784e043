//! In-process control flags for a running session.
//!
//! The HTTP handlers flip these; the loop polls them between rounds.
//! All setters are idempotent, so repeated stop or pause requests are
//! harmless no-ops.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct SessionControl {
    stop_requested: AtomicBool,
    paused: AtomicBool,
    awaiting_safety: AtomicBool,
}

impl SessionControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_awaiting_safety(&self, awaiting: bool) {
        self.awaiting_safety.store(awaiting, Ordering::SeqCst);
    }

    pub fn awaiting_safety(&self) -> bool {
        self.awaiting_safety.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_idempotent() {
        let control = SessionControl::new();
        assert!(!control.stop_requested());
        control.request_stop();
        control.request_stop();
        assert!(control.stop_requested());
    }

    #[test]
    fn test_pause_resume_cycle() {
        let control = SessionControl::new();
        control.set_paused(true);
        control.set_paused(true);
        assert!(control.is_paused());
        control.set_paused(false);
        assert!(!control.is_paused());
    }
}
