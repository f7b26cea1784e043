//! Browser driver capability.
//!
//! The action loop talks to a [`Driver`] and nothing else; the real
//! CDP-backed driver and the deterministic synthetic driver are
//! interchangeable behind it.

pub mod cdp;
pub mod chrome;
pub mod launch;
pub mod synthetic;

use async_trait::async_trait;
use webpilot_core::{Action, Result};

/// Contract the action loop depends on. Execution presents as a blocking
/// (awaited) call; a driver may be asynchronous internally.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Capture the current page as PNG bytes.
    async fn screenshot(&mut self) -> Result<Vec<u8>>;

    /// Execute a single primitive action. Out-of-viewport coordinates are
    /// rejected with a validation error rather than corrupting state.
    async fn execute(&mut self, action: &Action) -> Result<()>;

    /// Navigate the page to a URL.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Release browser resources. Safe to call more than once.
    async fn close(&mut self);
}

pub use chrome::ChromeDriver;
pub use synthetic::SyntheticDriver;

use webpilot_core::BrowserConfig;

/// Build a driver for the given browser configuration. The synthetic
/// stand-in satisfies the same contract when no real browser is wanted
/// (or available).
pub async fn build_driver(config: &BrowserConfig, synthetic: bool) -> Result<Box<dyn Driver>> {
    if synthetic {
        return Ok(Box::new(SyntheticDriver::new(config.clone())));
    }
    match ChromeDriver::launch(config.clone()).await {
        Ok(driver) => Ok(Box::new(driver)),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to launch browser, falling back to synthetic driver");
            Ok(Box::new(SyntheticDriver::new(config.clone())))
        }
    }
}
