use anyhow::{Context, Result};
use serde_json::Value;

use webpilot_core::{Config, Paths};
use webpilot_storage::{HistoryCaps, SessionQuery, SessionStatus, SessionStore};

pub fn run(config: &Config, status: Option<String>, limit: usize) -> Result<()> {
    let paths = Paths::new();
    let caps = HistoryCaps {
        logs: config.sessions.log_cap,
        screenshots: config.sessions.screenshot_cap,
        actions: config.sessions.action_cap,
        reasoning: config.sessions.reasoning_cap,
    };
    let store = SessionStore::new(paths, caps);

    let status = status
        .map(|s| {
            serde_json::from_value::<SessionStatus>(Value::String(s.clone()))
                .with_context(|| format!("Unknown status '{}'", s))
        })
        .transpose()?;

    let query = SessionQuery {
        status,
        limit: Some(limit),
        ..Default::default()
    };
    let sessions = store.list_sessions(&query);
    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!(
        "{:<38} {:<28} {:<12} {}",
        "SESSION", "CREATED", "STATUS", "TASK"
    );
    for session in sessions {
        let mut task = session.task.clone();
        if task.chars().count() > 60 {
            task = task.chars().take(57).collect();
            task.push_str("...");
        }
        println!(
            "{:<38} {:<28} {:<12} {}",
            session.id,
            session.created_at.to_rfc3339(),
            session.status.to_string(),
            task
        );
    }
    Ok(())
}
