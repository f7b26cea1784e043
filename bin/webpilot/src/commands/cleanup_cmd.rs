use anyhow::Result;

use webpilot_core::{Config, Paths};
use webpilot_storage::{HistoryCaps, SessionStore};

pub fn run(config: &Config, days_old: Option<u64>) -> Result<()> {
    let days = days_old.unwrap_or(config.sessions.cleanup_days);
    let store = SessionStore::new(Paths::new(), HistoryCaps::default());
    let removed = store.cleanup_old_sessions(days);
    println!("Removed {} session(s) older than {} day(s).", removed, days);
    Ok(())
}
