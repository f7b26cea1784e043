//! Real browser driver backed by a launched Chrome process and CDP.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use std::time::Duration;
use tokio::process::Child;
use tracing::{debug, info};

use webpilot_core::{Action, BrowserConfig, Error, MouseButton, Result};

use crate::cdp::CdpClient;
use crate::launch::{launch_browser, LaunchedBrowser};
use crate::Driver;

pub struct ChromeDriver {
    config: BrowserConfig,
    process: Option<Child>,
    cdp: CdpClient,
}

impl ChromeDriver {
    /// Launch a browser, connect CDP, set the viewport and open the
    /// starting URL.
    pub async fn launch(config: BrowserConfig) -> Result<Self> {
        let LaunchedBrowser {
            process,
            page_ws_url,
            debug_port,
            ..
        } = launch_browser(&config).await?;

        let cdp = CdpClient::connect(&page_ws_url).await?;
        cdp.enable_domain("Page").await?;
        cdp.enable_domain("Runtime").await?;
        cdp.enable_domain("DOM").await?;
        cdp.set_viewport(config.width, config.height).await?;
        cdp.navigate(&config.starting_url).await?;

        info!(
            port = debug_port,
            url = %config.starting_url,
            "Browser ready"
        );

        Ok(Self {
            config,
            process: Some(process),
            cdp,
        })
    }

    fn check_bounds(&self, x: i64, y: i64) -> Result<(f64, f64)> {
        if !in_viewport(x, y, self.config.width, self.config.height) {
            return Err(Error::Validation(format!(
                "Coordinates ({}, {}) outside viewport {}x{}",
                x, y, self.config.width, self.config.height
            )));
        }
        Ok((x as f64, y as f64))
    }

    async fn click(&self, x: i64, y: i64, button: MouseButton, clicks: i32) -> Result<()> {
        let (fx, fy) = self.check_bounds(x, y)?;
        let btn = button.as_cdp();
        self.cdp
            .dispatch_mouse_event("mousePressed", fx, fy, btn, clicks)
            .await?;
        self.cdp
            .dispatch_mouse_event("mouseReleased", fx, fy, btn, clicks)
            .await?;
        Ok(())
    }

    async fn keypress(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            let key = normalize_key(key);
            self.cdp.dispatch_key_event("keyDown", &key).await?;
            self.cdp.dispatch_key_event("keyUp", &key).await?;
        }
        Ok(())
    }
}

// Compared in i64 so coordinates past u32::MAX are rejected rather than
// truncated back into range.
fn in_viewport(x: i64, y: i64, width: u32, height: u32) -> bool {
    x >= 0 && y >= 0 && x < width as i64 && y < height as i64
}

/// Map agent key names (often upper-case, e.g. "ENTER", "CTRL") onto the
/// DOM key values CDP expects.
fn normalize_key(key: &str) -> String {
    match key.to_ascii_uppercase().as_str() {
        "ENTER" | "RETURN" => "Enter".to_string(),
        "TAB" => "Tab".to_string(),
        "ESC" | "ESCAPE" => "Escape".to_string(),
        "BACKSPACE" => "Backspace".to_string(),
        "DELETE" | "DEL" => "Delete".to_string(),
        "SPACE" => " ".to_string(),
        "CTRL" | "CONTROL" => "Control".to_string(),
        "ALT" | "OPTION" => "Alt".to_string(),
        "SHIFT" => "Shift".to_string(),
        "CMD" | "META" | "SUPER" | "WIN" => "Meta".to_string(),
        "UP" | "ARROWUP" => "ArrowUp".to_string(),
        "DOWN" | "ARROWDOWN" => "ArrowDown".to_string(),
        "LEFT" | "ARROWLEFT" => "ArrowLeft".to_string(),
        "RIGHT" | "ARROWRIGHT" => "ArrowRight".to_string(),
        "PAGEUP" => "PageUp".to_string(),
        "PAGEDOWN" => "PageDown".to_string(),
        "HOME" => "Home".to_string(),
        "END" => "End".to_string(),
        _ if key.chars().count() == 1 => key.to_string(),
        other => {
            // Fall back to title-case for unknown multi-char names.
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_string() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        }
    }
}

#[async_trait]
impl Driver for ChromeDriver {
    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        let data = self.cdp.screenshot_base64().await?;
        B64.decode(data.as_bytes())
            .map_err(|e| Error::Driver(format!("Invalid screenshot base64: {}", e)))
    }

    async fn execute(&mut self, action: &Action) -> Result<()> {
        debug!(action = action.kind(), "Executing browser action");
        match action {
            Action::Click { x, y, button } => self.click(*x, *y, *button, 1).await,
            Action::DoubleClick { x, y } => self.click(*x, *y, MouseButton::Left, 2).await,
            Action::Scroll {
                x,
                y,
                scroll_x,
                scroll_y,
            } => {
                let (fx, fy) = self.check_bounds(*x, *y)?;
                self.cdp
                    .dispatch_mouse_wheel(fx, fy, *scroll_x as f64, *scroll_y as f64)
                    .await
            }
            Action::Type { text } => self.cdp.insert_text(text).await,
            Action::Keypress { keys } => self.keypress(keys).await,
            Action::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(())
            }
            Action::Navigate { url } => self.cdp.navigate(url).await,
        }
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.cdp.navigate(url).await
    }

    async fn close(&mut self) {
        if let Err(e) = self.cdp.close_browser().await {
            debug!("CDP Browser.close failed (may already be closed): {}", e);
        }
        if let Some(mut process) = self.process.take() {
            let _ = process.kill().await;
        }
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        if let Some(process) = self.process.as_mut() {
            let _ = process.start_kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_viewport_rejects_out_of_range_coordinates() {
        assert!(in_viewport(0, 0, 1024, 768));
        assert!(in_viewport(1023, 767, 1024, 768));
        assert!(!in_viewport(1024, 0, 1024, 768));
        assert!(!in_viewport(-1, 0, 1024, 768));
        // Coordinates beyond u32 must not wrap back into the viewport.
        assert!(!in_viewport(1 << 32, 10, 1024, 768));
        assert!(!in_viewport(10, (1 << 32) + 5, 1024, 768));
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("ENTER"), "Enter");
        assert_eq!(normalize_key("ctrl"), "Control");
        assert_eq!(normalize_key("a"), "a");
        assert_eq!(normalize_key("ARROWDOWN"), "ArrowDown");
        assert_eq!(normalize_key("F5"), "F5");
    }
}
