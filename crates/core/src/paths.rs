use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".webpilot"))
            .unwrap_or_else(|| PathBuf::from(".webpilot"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.base.join("sessions")
    }

    pub fn session_file(&self, session_id: &str) -> PathBuf {
        let safe_id = session_id.replace([':', '/', '\\'], "_");
        self.sessions_dir().join(format!("{}.json", safe_id))
    }

    /// Secondary write location used when the primary sessions dir is not
    /// writable. Session mutation must never crash the loop, so failed
    /// writes are retried here before being given up on. Keyed by the base
    /// path so two stores on one machine do not mix their spill files.
    pub fn fallback_sessions_dir(&self) -> PathBuf {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in self.base.to_string_lossy().bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        std::env::temp_dir().join(format!("webpilot-sessions-{:016x}", hash))
    }

    pub fn fallback_session_file(&self, session_id: &str) -> PathBuf {
        let safe_id = session_id.replace([':', '/', '\\'], "_");
        self.fallback_sessions_dir().join(format!("{}.json", safe_id))
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.sessions_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
