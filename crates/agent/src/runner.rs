//! The per-session action loop.
//!
//! Each round: check control flags, act on the agent's computer call,
//! settle, screenshot, report back, receive the next call. The loop ends
//! when the agent stops emitting calls (task complete), a stop request or
//! fatal error lands, or a safety check parks the session awaiting human
//! confirmation. In the parked case the loop physically returns; a
//! confirm control call re-enters it via [`resume_after_confirmation`].

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use webpilot_storage::{SessionStatus, SessionStore, SessionUpdate};

use crate::registry::{ActiveSession, PendingSafety, SessionRegistry};
use crate::response::AgentResponse;
use crate::util::retry_with_backoff;

const PAUSE_POLL: Duration = Duration::from_secs(1);
const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Drive a registered session from its initial screenshot to a terminal
/// state or the safety barrier. Designed to run in its own spawned task.
pub async fn run_agent_loop(
    store: Arc<SessionStore>,
    registry: Arc<SessionRegistry>,
    session_id: &str,
) {
    let Some(active) = registry.get(session_id) else {
        warn!(session_id, "Loop started for unregistered session");
        return;
    };
    let Some(session) = store.get_session(session_id) else {
        warn!(session_id, "Loop started for unknown session");
        registry.unregister(session_id).await;
        return;
    };

    store.update_session(session_id, SessionUpdate::status(SessionStatus::Running));
    store.add_log(session_id, "Session started");
    info!(session_id, task = %session.task, "Agent loop starting");

    let screenshot = { active.driver.lock().await.screenshot().await };
    let screenshot_b64 = match screenshot {
        Ok(bytes) => B64.encode(bytes),
        Err(e) => {
            finish(
                &store,
                &registry,
                session_id,
                SessionStatus::Error,
                &format!("Initial screenshot failed: {}", e),
                Some(e.to_string()),
            )
            .await;
            return;
        }
    };
    store.add_screenshot(session_id, &screenshot_b64);

    // The opening request gets one retry; later rounds surface failures
    // immediately so a broken conversation does not loop forever.
    let initial = retry_with_backoff(2, Duration::from_millis(500), {
        let agent = active.agent.clone();
        let task = session.task.clone();
        let shot = screenshot_b64.clone();
        move || {
            let agent = agent.clone();
            let task = task.clone();
            let shot = shot.clone();
            async move { agent.initial_request(&task, &shot).await }
        }
    })
    .await;

    let response = match initial {
        Ok(r) => r,
        Err(e) => {
            finish(
                &store,
                &registry,
                session_id,
                SessionStatus::Error,
                &format!("Agent request failed: {}", e),
                Some(e.to_string()),
            )
            .await;
            return;
        }
    };

    drive(&store, &registry, &active, session_id, response).await;
}

/// Process agent responses until the session reaches a terminal state or
/// parks at the safety barrier.
async fn drive(
    store: &SessionStore,
    registry: &SessionRegistry,
    active: &ActiveSession,
    session_id: &str,
    mut response: AgentResponse,
) {
    loop {
        if stop_was_requested(store, active, session_id) {
            finish(
                store,
                registry,
                session_id,
                SessionStatus::Stopped,
                "Session stopped by request",
                None,
            )
            .await;
            return;
        }

        while active.control.is_paused() && !active.control.awaiting_safety() {
            if stop_was_requested(store, active, session_id) {
                finish(
                    store,
                    registry,
                    session_id,
                    SessionStatus::Stopped,
                    "Session stopped while paused",
                    None,
                )
                .await;
                return;
            }
            tokio::time::sleep(PAUSE_POLL).await;
        }

        let Some(call) = response.first_computer_call() else {
            for text in response.text_messages() {
                store.add_reasoning(session_id, &text, None);
            }
            store.update_session(session_id, SessionUpdate::status(SessionStatus::Completed));
            store.add_log(session_id, "Task completed.");
            info!(session_id, "Agent loop finished");
            registry.unregister(session_id).await;
            return;
        };

        if !call.pending_safety_checks.is_empty() {
            store.set_pending_safety(
                session_id,
                &call.pending_safety_checks,
                &response.id,
                &call.call_id,
            );
            store.add_log(session_id, "Safety check requires confirmation");
            active.control.set_awaiting_safety(true);
            active.park_safety(PendingSafety {
                response_id: response.id.clone(),
                call_id: call.call_id.clone(),
                action: call.action.clone(),
                checks: call.pending_safety_checks.clone(),
            });
            info!(
                session_id,
                checks = call.pending_safety_checks.len(),
                "Parked awaiting safety confirmation"
            );
            return;
        }

        for summary in response.reasoning_summaries() {
            store.add_reasoning(session_id, &summary, Some(call.action.kind()));
        }

        store.add_action(session_id, &call.action);
        let executed = { active.driver.lock().await.execute(&call.action).await };
        if let Err(e) = executed {
            // One failed action is not fatal; the next screenshot shows
            // the agent the page it actually has.
            warn!(session_id, error = %e, "Action failed");
            store.add_log(session_id, &format!("Action failed: {}", e));
        }

        tokio::time::sleep(SETTLE_DELAY).await;

        let screenshot = { active.driver.lock().await.screenshot().await };
        let screenshot_b64 = match screenshot {
            Ok(bytes) => B64.encode(bytes),
            Err(e) => {
                finish(
                    store,
                    registry,
                    session_id,
                    SessionStatus::Error,
                    &format!("Screenshot failed: {}", e),
                    Some(e.to_string()),
                )
                .await;
                return;
            }
        };
        store.add_screenshot(session_id, &screenshot_b64);

        match active
            .agent
            .send_screenshot(&response.id, &call.call_id, &screenshot_b64)
            .await
        {
            Ok(next) => response = next,
            Err(e) => {
                finish(
                    store,
                    registry,
                    session_id,
                    SessionStatus::Error,
                    &format!("Agent request failed: {}", e),
                    Some(e.to_string()),
                )
                .await;
                return;
            }
        }
    }
}

/// Resolve a parked safety barrier. Approval executes the gated call,
/// acknowledges the checks with a fresh screenshot and re-enters the
/// loop; rejection terminates the session.
pub async fn resume_after_confirmation(
    store: Arc<SessionStore>,
    registry: Arc<SessionRegistry>,
    session_id: &str,
    approved: bool,
) {
    let Some(active) = registry.get(session_id) else {
        warn!(session_id, "Confirmation for a session with no live loop");
        return;
    };
    let Some(pending) = active.take_pending_safety() else {
        warn!(session_id, "Confirmation with no parked safety barrier");
        return;
    };

    if !approved {
        store.clear_pending_safety(session_id);
        active.control.set_awaiting_safety(false);
        finish(
            &store,
            &registry,
            session_id,
            SessionStatus::Stopped,
            "Safety check rejected, session stopped",
            Some("safety_check_rejected".to_string()),
        )
        .await;
        return;
    }

    store.clear_pending_safety(session_id);
    store.update_session(session_id, SessionUpdate::status(SessionStatus::Running));
    store.add_log(session_id, "Safety checks acknowledged, resuming");
    active.control.set_awaiting_safety(false);

    store.add_action(session_id, &pending.action);
    let executed = { active.driver.lock().await.execute(&pending.action).await };
    if let Err(e) = executed {
        warn!(session_id, error = %e, "Confirmed action failed");
        store.add_log(session_id, &format!("Action failed: {}", e));
    }

    tokio::time::sleep(SETTLE_DELAY).await;

    let screenshot = { active.driver.lock().await.screenshot().await };
    let screenshot_b64 = match screenshot {
        Ok(bytes) => B64.encode(bytes),
        Err(e) => {
            finish(
                &store,
                &registry,
                session_id,
                SessionStatus::Error,
                &format!("Screenshot failed: {}", e),
                Some(e.to_string()),
            )
            .await;
            return;
        }
    };
    store.add_screenshot(session_id, &screenshot_b64);

    match active
        .agent
        .acknowledge_safety_checks(
            &pending.response_id,
            &pending.call_id,
            &pending.checks,
            &screenshot_b64,
        )
        .await
    {
        Ok(response) => drive(&store, &registry, &active, session_id, response).await,
        Err(e) => {
            finish(
                &store,
                &registry,
                session_id,
                SessionStatus::Error,
                &format!("Agent request failed: {}", e),
                Some(e.to_string()),
            )
            .await;
        }
    }
}

fn stop_was_requested(store: &SessionStore, active: &ActiveSession, session_id: &str) -> bool {
    active.control.stop_requested()
        || store
            .get_session(session_id)
            .map(|s| s.stop_requested)
            .unwrap_or(false)
}

async fn finish(
    store: &SessionStore,
    registry: &SessionRegistry,
    session_id: &str,
    status: SessionStatus,
    log_message: &str,
    error: Option<String>,
) {
    let is_error = error.is_some();
    store.update_session(
        session_id,
        SessionUpdate {
            status: Some(status),
            error,
            ..Default::default()
        },
    );
    store.add_log(session_id, log_message);
    if is_error {
        warn!(session_id, status = %status, "{}", log_message);
    } else {
        info!(session_id, status = %status, "{}", log_message);
    }
    registry.unregister(session_id).await;
}

/// Background task that force-terminates registered sessions whose record
/// has not been touched for longer than `timeout`. Paused sessions and
/// sessions waiting on a safety confirmation are exempt.
pub fn spawn_inactivity_sweep(
    store: Arc<SessionStore>,
    registry: Arc<SessionRegistry>,
    timeout: Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let idle_cutoff = chrono::Duration::from_std(timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            for session_id in registry.active_ids() {
                let Some(session) = store.get_session(&session_id) else {
                    debug!(session_id, "Sweep skipping unreadable session");
                    continue;
                };
                if session.status.is_terminal() {
                    registry.unregister(&session_id).await;
                    continue;
                }
                if session.paused || session.awaiting_safety_confirmation {
                    continue;
                }
                if Utc::now() - session.updated_at > idle_cutoff {
                    warn!(session_id, "Session inactive too long, forcing timeout");
                    if let Some(active) = registry.get(&session_id) {
                        active.control.request_stop();
                    }
                    store.update_session(
                        &session_id,
                        SessionUpdate {
                            status: Some(SessionStatus::Timeout),
                            error: Some("inactivity timeout".to_string()),
                            ..Default::default()
                        },
                    );
                    store.add_log(&session_id, "Session timed out due to inactivity");
                    registry.unregister(&session_id).await;
                }
            }
        }
    })
}
