//! Durable session records.
//!
//! One JSON document per session under the sessions directory. Reads go
//! through an in-memory cache; writes are serialized per session by a
//! lazily created lock so two workers mutating the same session never
//! interleave, while unrelated sessions stay independent.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use webpilot_core::{Action, BrowserConfig, Environment, Error, Paths, Priority, Result, SafetyCheck};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Starting,
    Running,
    Paused,
    AwaitingSafetyConfirmation,
    Completed,
    Stopped,
    Error,
    Timeout,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed
                | SessionStatus::Stopped
                | SessionStatus::Error
                | SessionStatus::Timeout
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Created => "created",
            SessionStatus::Starting => "starting",
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::AwaitingSafetyConfirmation => "awaiting_safety_confirmation",
            SessionStatus::Completed => "completed",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Error => "error",
            SessionStatus::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotEntry {
    pub timestamp: DateTime<Utc>,
    /// Base64-encoded PNG.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub timestamp: DateTime<Utc>,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningEntry {
    pub timestamp: DateTime<Utc>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_performed: Option<String>,
}

/// The full persisted state of one task execution. Self-contained: any
/// single-session read needs no other record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Assigned once at creation and never changed; control requests must
    /// present it or be rejected.
    pub task_id: String,
    pub task: String,
    pub environment: Environment,
    pub browser_config: BrowserConfig,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: HashSet<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub user_id: Option<String>,
    pub status: SessionStatus,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub stop_requested: bool,
    #[serde(default)]
    pub awaiting_safety_confirmation: bool,
    #[serde(default)]
    pub pending_safety_checks: Vec<SafetyCheck>,
    #[serde(default)]
    pub safety_response_id: Option<String>,
    #[serde(default)]
    pub safety_call_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub screenshots: Vec<ScreenshotEntry>,
    #[serde(default)]
    pub actions: Vec<ActionEntry>,
    #[serde(default)]
    pub reasoning: Vec<ReasoningEntry>,
}

impl Session {
    pub fn latest_screenshot(&self) -> Option<&str> {
        self.screenshots.last().map(|s| s.data.as_str())
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            task: self.task.clone(),
            environment: self.environment,
            status: self.status,
            name: self.name.clone(),
            tags: self.tags.clone(),
            priority: self.priority,
        }
    }
}

/// Essential fields for listings, as consumed by dashboards and the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub task: String,
    pub environment: Environment,
    pub status: SessionStatus,
    pub name: Option<String>,
    pub tags: HashSet<String>,
    pub priority: Priority,
}

/// Parameters for creating a session record.
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub task: String,
    pub environment: Environment,
    pub browser_config: BrowserConfig,
    pub name: Option<String>,
    pub tags: HashSet<String>,
    pub priority: Priority,
    pub user_id: Option<String>,
}

/// Partial update merged into a stored session. `None` fields are left
/// untouched. The task id is deliberately not representable here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionUpdate {
    pub status: Option<SessionStatus>,
    pub paused: Option<bool>,
    pub stop_requested: Option<bool>,
    pub error: Option<String>,
    pub name: Option<String>,
    pub tags: Option<HashSet<String>>,
    pub priority: Option<Priority>,
    pub user_id: Option<String>,
}

impl SessionUpdate {
    pub fn status(status: SessionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Task,
    Status,
    Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Filter/sort/paginate parameters for `list_sessions`. All filters are
/// equality matches; tags match on non-empty intersection.
#[derive(Debug, Clone, Default)]
pub struct SessionQuery {
    pub limit: Option<usize>,
    pub status: Option<SessionStatus>,
    pub environment: Option<Environment>,
    pub user_id: Option<String>,
    pub tags: Vec<String>,
    pub sort_by: SortField,
    pub sort_direction: SortDirection,
}

/// Per-history retention caps. Oldest entries are evicted first.
#[derive(Debug, Clone, Copy)]
pub struct HistoryCaps {
    pub logs: usize,
    pub screenshots: usize,
    pub actions: usize,
    pub reasoning: usize,
}

impl Default for HistoryCaps {
    fn default() -> Self {
        Self {
            logs: 1000,
            screenshots: 10,
            actions: 100,
            reasoning: 50,
        }
    }
}

fn truncate_front<T>(entries: &mut Vec<T>, cap: usize) {
    if entries.len() > cap {
        let excess = entries.len() - cap;
        entries.drain(0..excess);
    }
}

pub struct SessionStore {
    paths: Paths,
    caps: HistoryCaps,
    cache: Mutex<HashMap<String, Session>>,
    /// One lock per session id, created on first use. The outer mutex only
    /// guards map lookup/insertion, never the session mutation itself.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionStore {
    pub fn new(paths: Paths, caps: HistoryCaps) -> Self {
        Self {
            paths,
            caps,
            cache: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock registry poisoned");
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Allocate identifiers and write the initial record. Fails only when
    /// neither the primary nor the fallback location is writable.
    pub fn create_session(&self, new: NewSession) -> Result<(String, String)> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let task_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        let session = Session {
            id: session_id.clone(),
            task_id: task_id.clone(),
            task: new.task,
            environment: new.environment,
            browser_config: new.browser_config,
            name: new.name,
            tags: new.tags,
            priority: new.priority,
            user_id: new.user_id,
            status: SessionStatus::Created,
            paused: false,
            stop_requested: false,
            awaiting_safety_confirmation: false,
            pending_safety_checks: Vec::new(),
            safety_response_id: None,
            safety_call_id: None,
            error: None,
            created_at: now,
            updated_at: now,
            logs: Vec::new(),
            screenshots: Vec::new(),
            actions: Vec::new(),
            reasoning: Vec::new(),
        };

        self.persist(&session)?;
        self.cache
            .lock()
            .expect("cache poisoned")
            .insert(session_id.clone(), session);
        Ok((session_id, task_id))
    }

    /// Cache-first read. Absence and read failure look identical to the
    /// caller; both come back as `None`.
    pub fn get_session(&self, session_id: &str) -> Option<Session> {
        if let Some(session) = self
            .cache
            .lock()
            .expect("cache poisoned")
            .get(session_id)
            .cloned()
        {
            return Some(session);
        }

        let session = self.load_from_disk(session_id)?;
        self.cache
            .lock()
            .expect("cache poisoned")
            .insert(session_id.to_string(), session.clone());
        Some(session)
    }

    fn load_from_disk(&self, session_id: &str) -> Option<Session> {
        let path = self.paths.session_file(session_id);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => {
                // Primary missing or unreadable; the fallback dir may hold it.
                std::fs::read_to_string(self.paths.fallback_session_file(session_id)).ok()?
            }
        };
        match serde_json::from_str::<Session>(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(session_id, error = %e, "Failed to parse session record");
                None
            }
        }
    }

    /// Merge partial fields, stamp `updated_at`, persist, refresh cache.
    pub fn update_session(&self, session_id: &str, update: SessionUpdate) -> bool {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().expect("session lock poisoned");

        let Some(mut session) = self.get_session(session_id) else {
            return false;
        };

        if let Some(status) = update.status {
            session.status = status;
        }
        if let Some(paused) = update.paused {
            session.paused = paused;
        }
        if let Some(stop) = update.stop_requested {
            session.stop_requested = stop;
        }
        if let Some(error) = update.error {
            session.error = Some(error);
        }
        if let Some(name) = update.name {
            session.name = Some(name);
        }
        if let Some(tags) = update.tags {
            session.tags = tags;
        }
        if let Some(priority) = update.priority {
            session.priority = priority;
        }
        if let Some(user_id) = update.user_id {
            session.user_id = Some(user_id);
        }
        session.updated_at = Utc::now();

        self.store_mutation(session)
    }

    pub fn add_log(&self, session_id: &str, message: &str) -> bool {
        let cap = self.caps.logs;
        self.mutate(session_id, |session| {
            session.logs.push(LogEntry {
                timestamp: Utc::now(),
                message: message.to_string(),
            });
            truncate_front(&mut session.logs, cap);
        })
    }

    pub fn add_screenshot(&self, session_id: &str, data_base64: &str) -> bool {
        let cap = self.caps.screenshots;
        self.mutate(session_id, |session| {
            session.screenshots.push(ScreenshotEntry {
                timestamp: Utc::now(),
                data: data_base64.to_string(),
            });
            truncate_front(&mut session.screenshots, cap);
        })
    }

    pub fn add_action(&self, session_id: &str, action: &Action) -> bool {
        let cap = self.caps.actions;
        self.mutate(session_id, |session| {
            session.actions.push(ActionEntry {
                timestamp: Utc::now(),
                action: action.clone(),
            });
            truncate_front(&mut session.actions, cap);
        })
    }

    pub fn add_reasoning(&self, session_id: &str, content: &str, action: Option<&str>) -> bool {
        let cap = self.caps.reasoning;
        self.mutate(session_id, |session| {
            session.reasoning.push(ReasoningEntry {
                timestamp: Utc::now(),
                content: content.to_string(),
                action_performed: action.map(|a| a.to_string()),
            });
            truncate_front(&mut session.reasoning, cap);
        })
    }

    /// Record an unacknowledged safety gate. The session is implicitly
    /// paused until a confirm/reject control call clears it.
    pub fn set_pending_safety(
        &self,
        session_id: &str,
        checks: &[SafetyCheck],
        response_id: &str,
        call_id: &str,
    ) -> bool {
        let checks = checks.to_vec();
        let response_id = response_id.to_string();
        let call_id = call_id.to_string();
        self.mutate(session_id, move |session| {
            session.pending_safety_checks = checks;
            session.safety_response_id = Some(response_id);
            session.safety_call_id = Some(call_id);
            session.awaiting_safety_confirmation = true;
            session.paused = true;
            session.status = SessionStatus::AwaitingSafetyConfirmation;
        })
    }

    pub fn clear_pending_safety(&self, session_id: &str) -> bool {
        self.mutate(session_id, |session| {
            session.pending_safety_checks.clear();
            session.safety_response_id = None;
            session.safety_call_id = None;
            session.awaiting_safety_confirmation = false;
            session.paused = false;
        })
    }

    fn mutate<F>(&self, session_id: &str, apply: F) -> bool
    where
        F: FnOnce(&mut Session),
    {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().expect("session lock poisoned");

        let Some(mut session) = self.get_session(session_id) else {
            return false;
        };
        apply(&mut session);
        session.updated_at = Utc::now();
        self.store_mutation(session)
    }

    fn store_mutation(&self, session: Session) -> bool {
        // Session mutation is not allowed to crash the loop; a failed
        // persist is logged and the cache still reflects the new state.
        if let Err(e) = self.persist(&session) {
            warn!(session_id = %session.id, error = %e, "Failed to persist session");
        }
        self.cache
            .lock()
            .expect("cache poisoned")
            .insert(session.id.clone(), session);
        true
    }

    fn persist(&self, session: &Session) -> Result<()> {
        let content = serde_json::to_string_pretty(session)?;
        let path = self.paths.session_file(&session.id);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match std::fs::write(&path, &content) {
            Ok(()) => Ok(()),
            Err(primary_err) => {
                warn!(
                    session_id = %session.id,
                    error = %primary_err,
                    "Primary session write failed, trying fallback location"
                );
                let fallback = self.paths.fallback_session_file(&session.id);
                if let Some(parent) = fallback.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                std::fs::write(&fallback, &content)
                    .map_err(|e| Error::Storage(format!("fallback write failed: {}", e)))
            }
        }
    }

    /// Full scan over persisted records with equality filters, sort and
    /// limit. Fine at local session volumes; an indexed store would keep
    /// the same contract.
    pub fn list_sessions(&self, query: &SessionQuery) -> Vec<SessionSummary> {
        let mut sessions: Vec<SessionSummary> = self
            .scan_records()
            .into_iter()
            .filter(|s| query.status.map_or(true, |st| s.status == st))
            .filter(|s| query.environment.map_or(true, |env| s.environment == env))
            .filter(|s| {
                query.user_id.as_deref().map_or(true, |uid| {
                    // user_id is not part of the summary; re-check on the
                    // full record only when the filter is present.
                    self.get_session(&s.id)
                        .and_then(|full| full.user_id)
                        .as_deref()
                        == Some(uid)
                })
            })
            .filter(|s| {
                query.tags.is_empty() || query.tags.iter().any(|t| s.tags.contains(t))
            })
            .collect();

        sessions.sort_by(|a, b| {
            let ord = match query.sort_by {
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                SortField::Task => a.task.cmp(&b.task),
                SortField::Status => a.status.to_string().cmp(&b.status.to_string()),
                SortField::Priority => a.priority.cmp(&b.priority),
            };
            match query.sort_direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });

        if let Some(limit) = query.limit {
            sessions.truncate(limit);
        }
        sessions
    }

    /// Records that only ever reached the fallback dir still count, so
    /// both locations are scanned; the primary copy wins on duplicates.
    fn scan_records(&self) -> Vec<SessionSummary> {
        let mut summaries = Vec::new();
        let mut seen = HashSet::new();
        for dir in [self.paths.sessions_dir(), self.paths.fallback_sessions_dir()] {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Ok(content) = std::fs::read_to_string(&path) else {
                    continue;
                };
                match serde_json::from_str::<Session>(&content) {
                    Ok(session) => {
                        if seen.insert(session.id.clone()) {
                            summaries.push(session.summary());
                        }
                    }
                    Err(e) => {
                        // A single malformed record must not abort the scan.
                        debug!(path = %path.display(), error = %e, "Skipping malformed session record");
                    }
                }
            }
        }
        summaries
    }

    /// Delete records whose last update is older than `days_old` days.
    /// Returns the number of purged sessions.
    pub fn cleanup_old_sessions(&self, days_old: u64) -> usize {
        // An age too large to represent means nothing is old enough.
        let cutoff = i64::try_from(days_old)
            .ok()
            .and_then(Duration::try_days)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let stale: Vec<String> = self
            .scan_records()
            .into_iter()
            .filter(|s| s.updated_at < cutoff)
            .map(|s| s.id)
            .collect();

        let mut removed = 0;
        for id in stale {
            let primary = std::fs::remove_file(self.paths.session_file(&id)).is_ok();
            let fallback = std::fs::remove_file(self.paths.fallback_session_file(&id)).is_ok();
            if primary || fallback {
                removed += 1;
            }
            self.evict(&id);
        }
        if removed > 0 {
            debug!(removed, "Cleaned up old sessions");
        }
        removed
    }

    /// Drop a session from the in-memory cache. The durable record, if
    /// any, is untouched.
    pub fn evict(&self, session_id: &str) {
        self.cache.lock().expect("cache poisoned").remove(session_id);
        self.locks
            .lock()
            .expect("lock registry poisoned")
            .remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webpilot_core::Paths;

    fn test_store() -> (SessionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(dir.path().to_path_buf());
        paths.ensure_dirs().unwrap();
        (SessionStore::new(paths, HistoryCaps::default()), dir)
    }

    fn small_caps_store() -> (SessionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(dir.path().to_path_buf());
        paths.ensure_dirs().unwrap();
        let caps = HistoryCaps {
            logs: 3,
            screenshots: 2,
            actions: 2,
            reasoning: 2,
        };
        (SessionStore::new(paths, caps), dir)
    }

    fn new_session(task: &str) -> NewSession {
        NewSession {
            task: task.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_and_get_round_trip() {
        let (store, _dir) = test_store();
        let (id, task_id) = store.create_session(new_session("search for rust")).unwrap();

        let session = store.get_session(&id).unwrap();
        assert_eq!(session.task, "search for rust");
        assert_eq!(session.task_id, task_id);
        assert_eq!(session.status, SessionStatus::Created);
        assert!(store.get_session("no-such-id").is_none());
    }

    #[test]
    fn test_update_survives_cache_eviction() {
        let (store, _dir) = test_store();
        let (id, task_id) = store.create_session(new_session("t")).unwrap();

        let mut update = SessionUpdate::status(SessionStatus::Running);
        update.name = Some("my run".to_string());
        assert!(store.update_session(&id, update));

        store.evict(&id);
        let reloaded = store.get_session(&id).unwrap();
        assert_eq!(reloaded.status, SessionStatus::Running);
        assert_eq!(reloaded.name.as_deref(), Some("my run"));
        // The task id never changes across updates.
        assert_eq!(reloaded.task_id, task_id);
    }

    #[test]
    fn test_bounded_histories_evict_oldest_first() {
        let (store, _dir) = small_caps_store();
        let (id, _) = store.create_session(new_session("t")).unwrap();

        for i in 0..5 {
            store.add_log(&id, &format!("log {}", i));
        }
        let session = store.get_session(&id).unwrap();
        assert_eq!(session.logs.len(), 3);
        let messages: Vec<&str> = session.logs.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["log 2", "log 3", "log 4"]);

        for i in 0..4 {
            store.add_screenshot(&id, &format!("png-{}", i));
        }
        let session = store.get_session(&id).unwrap();
        assert_eq!(session.screenshots.len(), 2);
        assert_eq!(session.latest_screenshot(), Some("png-3"));
    }

    #[test]
    fn test_action_and_reasoning_history() {
        let (store, _dir) = small_caps_store();
        let (id, _) = store.create_session(new_session("t")).unwrap();

        for i in 0..3i64 {
            store.add_action(
                &id,
                &Action::Click {
                    x: i,
                    y: 0,
                    button: Default::default(),
                },
            );
        }
        store.add_reasoning(&id, "clicked the search box", Some("click"));

        let session = store.get_session(&id).unwrap();
        assert_eq!(session.actions.len(), 2);
        match &session.actions[0].action {
            Action::Click { x, .. } => assert_eq!(*x, 1),
            other => panic!("unexpected action: {:?}", other),
        }
        assert_eq!(session.reasoning[0].action_performed.as_deref(), Some("click"));
    }

    #[test]
    fn test_pending_safety_round_trip() {
        let (store, _dir) = test_store();
        let (id, _) = store.create_session(new_session("t")).unwrap();

        let checks = vec![SafetyCheck {
            id: "sc_1".to_string(),
            code: "malicious_instructions".to_string(),
            message: "Review this action".to_string(),
        }];
        assert!(store.set_pending_safety(&id, &checks, "resp_1", "call_1"));

        let session = store.get_session(&id).unwrap();
        assert!(session.awaiting_safety_confirmation);
        assert!(session.paused);
        assert_eq!(session.status, SessionStatus::AwaitingSafetyConfirmation);
        assert_eq!(session.pending_safety_checks.len(), 1);
        assert_eq!(session.safety_response_id.as_deref(), Some("resp_1"));

        assert!(store.clear_pending_safety(&id));
        let session = store.get_session(&id).unwrap();
        assert!(!session.awaiting_safety_confirmation);
        assert!(session.pending_safety_checks.is_empty());
    }

    #[test]
    fn test_list_sessions_filter_sort_limit() {
        let (store, _dir) = test_store();
        let mut completed = Vec::new();
        for i in 0..5 {
            let (id, _) = store
                .create_session(new_session(&format!("done {}", i)))
                .unwrap();
            store.update_session(&id, SessionUpdate::status(SessionStatus::Completed));
            completed.push(id);
        }
        for i in 0..3 {
            let (id, _) = store
                .create_session(new_session(&format!("running {}", i)))
                .unwrap();
            store.update_session(&id, SessionUpdate::status(SessionStatus::Running));
        }

        let query = SessionQuery {
            limit: Some(2),
            status: Some(SessionStatus::Completed),
            ..Default::default()
        };
        let listed = store.list_sessions(&query);
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|s| s.status == SessionStatus::Completed));
        // Default sort: created_at descending.
        assert!(listed[0].created_at >= listed[1].created_at);
    }

    #[test]
    fn test_list_sessions_tag_intersection() {
        let (store, _dir) = test_store();
        let mut tagged = new_session("tagged");
        tagged.tags = ["shopping".to_string(), "demo".to_string()].into();
        let (tagged_id, _) = store.create_session(tagged).unwrap();
        store.create_session(new_session("untagged")).unwrap();

        let query = SessionQuery {
            tags: vec!["demo".to_string()],
            ..Default::default()
        };
        let listed = store.list_sessions(&query);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, tagged_id);
    }

    #[test]
    fn test_malformed_record_is_skipped_not_fatal() {
        let (store, dir) = test_store();
        store.create_session(new_session("good")).unwrap();
        std::fs::write(dir.path().join("sessions/broken.json"), "{not json").unwrap();

        let listed = store.list_sessions(&SessionQuery::default());
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn test_cleanup_old_sessions() {
        let (store, _dir) = test_store();
        let (old_id, _) = store.create_session(new_session("old")).unwrap();
        let (fresh_id, _) = store.create_session(new_session("fresh")).unwrap();

        // Age the first record on disk directly.
        let mut session = store.get_session(&old_id).unwrap();
        session.updated_at = Utc::now() - Duration::days(30);
        let content = serde_json::to_string_pretty(&session).unwrap();
        std::fs::write(store.paths.session_file(&old_id), content).unwrap();
        store.evict(&old_id);

        let removed = store.cleanup_old_sessions(7);
        assert_eq!(removed, 1);
        assert!(store.get_session(&old_id).is_none());
        assert!(store.get_session(&fresh_id).is_some());
    }

    #[test]
    fn test_cleanup_with_oversized_age_purges_nothing() {
        let (store, _dir) = test_store();
        let (id, _) = store.create_session(new_session("fresh")).unwrap();

        assert_eq!(store.cleanup_old_sessions(u64::MAX), 0);
        assert!(store.get_session(&id).is_some());
        assert_eq!(store.list_sessions(&SessionQuery::default()).len(), 1);
    }

    #[test]
    fn test_fallback_records_appear_in_listings_and_cleanup() {
        let (store, _dir) = test_store();
        let (primary_id, _) = store.create_session(new_session("primary")).unwrap();

        // Simulate a record that only ever reached the fallback location.
        let mut spilled = store.get_session(&primary_id).unwrap();
        spilled.id = "spilled".to_string();
        spilled.updated_at = Utc::now() - Duration::days(30);
        std::fs::create_dir_all(store.paths.fallback_sessions_dir()).unwrap();
        std::fs::write(
            store.paths.fallback_session_file("spilled"),
            serde_json::to_string_pretty(&spilled).unwrap(),
        )
        .unwrap();

        let listed = store.list_sessions(&SessionQuery::default());
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|s| s.id == "spilled"));

        // A record present in both locations is counted once.
        let primary = store.get_session(&primary_id).unwrap();
        std::fs::write(
            store.paths.fallback_session_file(&primary_id),
            serde_json::to_string_pretty(&primary).unwrap(),
        )
        .unwrap();
        assert_eq!(store.list_sessions(&SessionQuery::default()).len(), 2);

        // The aged fallback-only record is purged and counted.
        assert_eq!(store.cleanup_old_sessions(7), 1);
        let listed = store.list_sessions(&SessionQuery::default());
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, primary_id);
    }

    #[test]
    fn test_update_missing_session_is_noop() {
        let (store, _dir) = test_store();
        assert!(!store.update_session("ghost", SessionUpdate::status(SessionStatus::Running)));
        assert!(!store.add_log("ghost", "nothing"));
    }
}
