//! HTTP gateway.
//!
//! Thin JSON layer over the session store, the live-session registry and
//! the action loop. Control endpoints require the task id handed out at
//! creation; a mismatch is rejected before any state changes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use webpilot_agent::{
    resume_after_confirmation, run_agent_loop, spawn_inactivity_sweep, ActiveSession,
    ComputerUseClient, SessionRegistry,
};
use webpilot_core::{Config, Environment, Paths, Priority};
use webpilot_driver::build_driver;
use webpilot_storage::{
    HistoryCaps, NewSession, Session, SessionQuery, SessionStatus, SessionStore, SessionUpdate,
    SortDirection, SortField,
};

#[derive(Clone)]
struct AppState {
    store: Arc<SessionStore>,
    registry: Arc<SessionRegistry>,
    config: Arc<Config>,
    base_url: String,
}

pub async fn run(config: Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;

    let caps = HistoryCaps {
        logs: config.sessions.log_cap,
        screenshots: config.sessions.screenshot_cap,
        actions: config.sessions.action_cap,
        reasoning: config.sessions.reasoning_cap,
    };
    let store = Arc::new(SessionStore::new(paths, caps));
    let registry = Arc::new(SessionRegistry::new());

    let sweep = spawn_inactivity_sweep(
        store.clone(),
        registry.clone(),
        Duration::from_secs(config.sessions.inactivity_timeout_secs),
        Duration::from_secs(config.sessions.sweep_interval_secs),
    );

    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let base_url = format!("http://{}:{}", host, port);

    let state = AppState {
        store,
        registry,
        config: Arc::new(config),
        base_url,
    };

    let app = Router::new()
        .route("/api/tasks", post(create_task))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/batch", post(batch_status))
        .route("/api/sessions/active", get(active_sessions))
        .route("/api/sessions/cleanup", post(cleanup_all))
        .route("/api/sessions/:id", put(update_session_meta))
        .route("/api/sessions/:id/status", get(session_status))
        .route("/api/sessions/:id/details", get(session_details))
        .route("/api/sessions/:id/stop", post(stop_session))
        .route("/api/sessions/:id/pause", post(pause_session))
        .route("/api/sessions/:id/resume", post(resume_session))
        .route("/api/sessions/:id/confirm-safety-check", post(confirm_safety))
        .route("/api/sessions/:id/cleanup", post(cleanup_session))
        .route("/api/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    info!(address = %listener.local_addr()?, "Gateway listening");
    axum::serve(listener, app).await?;
    sweep.abort();
    Ok(())
}

fn envelope(success: bool, message: &str) -> Value {
    json!({ "success": success, "message": message })
}

fn reply(status: StatusCode, success: bool, message: &str) -> Response {
    (status, Json(envelope(success, message))).into_response()
}

/// Look up a session and verify the presented task id. Control endpoints
/// all funnel through this.
fn authorize(state: &AppState, session_id: &str, task_id: Option<&str>) -> Result<Session, Response> {
    let Some(session) = state.store.get_session(session_id) else {
        return Err(reply(StatusCode::NOT_FOUND, false, "Session not found"));
    };
    match task_id {
        Some(presented) if presented == session.task_id => Ok(session),
        _ => Err(reply(
            StatusCode::FORBIDDEN,
            false,
            "Invalid or missing task credentials",
        )),
    }
}

#[derive(Deserialize)]
struct CreateTaskRequest {
    task: String,
    #[serde(default)]
    environment: Environment,
    display_width: Option<u32>,
    display_height: Option<u32>,
    headless: Option<bool>,
    starting_url: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tags: HashSet<String>,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
}

async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Response {
    if req.task.trim().is_empty() {
        return reply(StatusCode::BAD_REQUEST, false, "Task must not be empty");
    }
    let Some(api_key) = state.config.agent.resolve_api_key(req.api_key.as_deref()) else {
        return reply(StatusCode::BAD_REQUEST, false, "No API key provided");
    };

    let mut browser = state.config.driver.defaults.clone();
    if let Some(width) = req.display_width {
        browser.width = width;
    }
    if let Some(height) = req.display_height {
        browser.height = height;
    }
    if let Some(headless) = req.headless {
        browser.headless = headless;
    }
    if let Some(url) = req.starting_url {
        browser.starting_url = url;
    }

    let new = NewSession {
        task: req.task,
        environment: req.environment,
        browser_config: browser.clone(),
        name: req.name,
        tags: req.tags,
        priority: req.priority,
        user_id: req.user_id,
    };
    let (session_id, task_id) = match state.store.create_session(new) {
        Ok(ids) => ids,
        Err(e) => {
            error!(error = %e, "Failed to create session record");
            return reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                "Failed to create session",
            );
        }
    };

    state
        .store
        .update_session(&session_id, SessionUpdate::status(SessionStatus::Starting));

    let driver = match build_driver(&browser, state.config.driver.use_synthetic()).await {
        Ok(driver) => driver,
        Err(e) => {
            error!(session_id, error = %e, "Driver startup failed");
            state.store.update_session(
                &session_id,
                SessionUpdate {
                    status: Some(SessionStatus::Error),
                    error: Some(e.to_string()),
                    ..Default::default()
                },
            );
            return reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                "Failed to start a browser",
            );
        }
    };
    let agent = match ComputerUseClient::new(&state.config.agent, api_key, &browser, req.environment)
    {
        Ok(agent) => agent,
        Err(e) => {
            error!(session_id, error = %e, "Agent client setup failed");
            state.store.update_session(
                &session_id,
                SessionUpdate {
                    status: Some(SessionStatus::Error),
                    error: Some(e.to_string()),
                    ..Default::default()
                },
            );
            return reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                "Failed to reach the reasoning service",
            );
        }
    };

    state.registry.register(
        &session_id,
        ActiveSession::new(task_id.clone(), driver, Arc::new(agent)),
    );

    let store = state.store.clone();
    let registry = state.registry.clone();
    let loop_id = session_id.clone();
    tokio::spawn(async move {
        run_agent_loop(store, registry, &loop_id).await;
    });

    info!(session_id, "Task accepted");
    (
        StatusCode::CREATED,
        Json(json!({
            "session_id": session_id,
            "task_id": task_id,
            "status": SessionStatus::Starting,
            "session_url": format!("{}/?session={}", state.base_url, session_id),
        })),
    )
        .into_response()
}

#[derive(Deserialize)]
struct TaskIdQuery {
    task_id: Option<String>,
}

fn status_payload(session: &Session) -> Value {
    let recent_logs: Vec<&str> = session
        .logs
        .iter()
        .rev()
        .take(20)
        .rev()
        .map(|l| l.message.as_str())
        .collect();
    json!({
        "session_id": session.id,
        "status": session.status,
        "task": session.task,
        "paused": session.paused,
        "stop_requested": session.stop_requested,
        "awaiting_safety_confirmation": session.awaiting_safety_confirmation,
        "pending_safety_checks": session.pending_safety_checks,
        "error": session.error,
        "created_at": session.created_at,
        "updated_at": session.updated_at,
        "latest_screenshot": session.latest_screenshot(),
        "recent_logs": recent_logs,
        "reasoning": session.reasoning.iter().rev().take(10).rev().collect::<Vec<_>>(),
        "actions_taken": session.actions.len(),
    })
}

async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<TaskIdQuery>,
) -> Response {
    match authorize(&state, &session_id, query.task_id.as_deref()) {
        Ok(session) => Json(status_payload(&session)).into_response(),
        Err(resp) => resp,
    }
}

async fn session_details(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<TaskIdQuery>,
) -> Response {
    match authorize(&state, &session_id, query.task_id.as_deref()) {
        Ok(session) => Json(json!(session)).into_response(),
        Err(resp) => resp,
    }
}

#[derive(Deserialize)]
struct ControlRequest {
    task_id: String,
}

async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ControlRequest>,
) -> Response {
    let session = match authorize(&state, &session_id, Some(&req.task_id)) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    if session.status.is_terminal() {
        return reply(StatusCode::OK, false, "Session already finished");
    }

    state.store.update_session(
        &session_id,
        SessionUpdate {
            stop_requested: Some(true),
            ..Default::default()
        },
    );
    state.store.add_log(&session_id, "Stop requested");

    match state.registry.get(&session_id) {
        Some(active) => {
            active.control.request_stop();
            if session.awaiting_safety_confirmation {
                // The loop is parked at the safety barrier, so nothing will
                // poll the flag; settle the record and release resources.
                active.take_pending_safety();
                state.store.clear_pending_safety(&session_id);
                state
                    .store
                    .update_session(&session_id, SessionUpdate::status(SessionStatus::Stopped));
                let registry = state.registry.clone();
                let id = session_id.clone();
                tokio::spawn(async move {
                    registry.unregister(&id).await;
                });
            }
        }
        None => {
            // No live loop to notice the flag; settle the record directly.
            state
                .store
                .update_session(&session_id, SessionUpdate::status(SessionStatus::Stopped));
        }
    }
    reply(StatusCode::OK, true, "Stop requested")
}

async fn pause_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ControlRequest>,
) -> Response {
    let session = match authorize(&state, &session_id, Some(&req.task_id)) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    if session.status.is_terminal() {
        return reply(StatusCode::BAD_REQUEST, false, "Session already finished");
    }
    if session.awaiting_safety_confirmation {
        return reply(
            StatusCode::BAD_REQUEST,
            false,
            "Session is waiting on a safety confirmation",
        );
    }

    state.store.update_session(
        &session_id,
        SessionUpdate {
            status: Some(SessionStatus::Paused),
            paused: Some(true),
            ..Default::default()
        },
    );
    state.store.add_log(&session_id, "Session paused");
    if let Some(active) = state.registry.get(&session_id) {
        active.control.set_paused(true);
    }
    reply(StatusCode::OK, true, "Session paused")
}

async fn resume_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ControlRequest>,
) -> Response {
    let session = match authorize(&state, &session_id, Some(&req.task_id)) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    if session.status.is_terminal() {
        return reply(StatusCode::BAD_REQUEST, false, "Session already finished");
    }
    if session.awaiting_safety_confirmation {
        return reply(
            StatusCode::BAD_REQUEST,
            false,
            "Session is waiting on a safety confirmation",
        );
    }
    if !session.paused {
        return reply(StatusCode::BAD_REQUEST, false, "Session is not paused");
    }

    state.store.update_session(
        &session_id,
        SessionUpdate {
            status: Some(SessionStatus::Running),
            paused: Some(false),
            ..Default::default()
        },
    );
    state.store.add_log(&session_id, "Session resumed");
    if let Some(active) = state.registry.get(&session_id) {
        active.control.set_paused(false);
    }
    reply(StatusCode::OK, true, "Session resumed")
}

#[derive(Deserialize)]
struct ConfirmRequest {
    task_id: String,
    #[serde(alias = "approved")]
    confirm: bool,
}

async fn confirm_safety(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ConfirmRequest>,
) -> Response {
    let session = match authorize(&state, &session_id, Some(&req.task_id)) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    if !session.awaiting_safety_confirmation {
        return reply(
            StatusCode::BAD_REQUEST,
            false,
            "No safety check awaiting confirmation",
        );
    }

    let store = state.store.clone();
    let registry = state.registry.clone();
    let approved = req.confirm;
    let resume_id = session_id.clone();
    tokio::spawn(async move {
        resume_after_confirmation(store, registry, &resume_id, approved).await;
    });

    let message = if approved {
        "Safety checks acknowledged, session resuming"
    } else {
        "Safety checks rejected, session stopping"
    };
    reply(StatusCode::OK, true, message)
}

async fn cleanup_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ControlRequest>,
) -> Response {
    let session = match authorize(&state, &session_id, Some(&req.task_id)) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    state.registry.unregister(&session_id).await;
    if !session.status.is_terminal() {
        state
            .store
            .update_session(&session_id, SessionUpdate::status(SessionStatus::Stopped));
        state.store.add_log(&session_id, "Session cleaned up");
    }
    reply(StatusCode::OK, true, "Session resources released")
}

#[derive(Deserialize)]
struct ListQuery {
    status: Option<SessionStatus>,
    environment: Option<Environment>,
    user_id: Option<String>,
    tag: Option<String>,
    limit: Option<usize>,
    #[serde(default)]
    sort_by: SortField,
    #[serde(default)]
    sort_direction: SortDirection,
}

async fn list_sessions(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Response {
    let session_query = SessionQuery {
        limit: query.limit,
        status: query.status,
        environment: query.environment,
        user_id: query.user_id,
        tags: query.tag.into_iter().collect(),
        sort_by: query.sort_by,
        sort_direction: query.sort_direction,
    };
    let sessions = state.store.list_sessions(&session_query);
    Json(json!({ "count": sessions.len(), "sessions": sessions })).into_response()
}

#[derive(Deserialize)]
struct BatchRequest {
    session_ids: Vec<String>,
}

async fn batch_status(State(state): State<AppState>, Json(req): Json<BatchRequest>) -> Response {
    let mut sessions = Vec::new();
    let mut missing = Vec::new();
    for id in req.session_ids {
        match state.store.get_session(&id) {
            Some(session) => sessions.push(json!({
                "session_id": session.id,
                "status": session.status,
                "task": session.task,
                "updated_at": session.updated_at,
                "error": session.error,
            })),
            None => missing.push(id),
        }
    }
    Json(json!({ "sessions": sessions, "missing": missing })).into_response()
}

async fn active_sessions(State(state): State<AppState>) -> Response {
    let ids = state.registry.active_ids();
    Json(json!({ "count": ids.len(), "session_ids": ids })).into_response()
}

#[derive(Deserialize)]
struct MetaUpdateRequest {
    task_id: String,
    name: Option<String>,
    tags: Option<HashSet<String>>,
    priority: Option<Priority>,
    user_id: Option<String>,
}

async fn update_session_meta(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<MetaUpdateRequest>,
) -> Response {
    if let Err(resp) = authorize(&state, &session_id, Some(&req.task_id)) {
        return resp;
    }
    let updated = state.store.update_session(
        &session_id,
        SessionUpdate {
            name: req.name,
            tags: req.tags,
            priority: req.priority,
            user_id: req.user_id,
            ..Default::default()
        },
    );
    if updated {
        reply(StatusCode::OK, true, "Session updated")
    } else {
        reply(StatusCode::NOT_FOUND, false, "Session not found")
    }
}

#[derive(Deserialize)]
struct CleanupQuery {
    days_old: Option<u64>,
}

async fn cleanup_all(State(state): State<AppState>, Query(query): Query<CleanupQuery>) -> Response {
    let days = query.days_old.unwrap_or(state.config.sessions.cleanup_days);
    let removed = state.store.cleanup_old_sessions(days);
    Json(json!({ "success": true, "removed": removed })).into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "ok",
        "active_sessions": state.registry.active_count(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
    .into_response()
}
