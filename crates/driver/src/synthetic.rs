//! Deterministic stand-in driver for environments without a real browser.
//!
//! Renders a placeholder page image that reflects the driver's state
//! (current URL, typed text, recent clicks), so successive screenshots
//! change predictably after actions. Every action is accepted.

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

use webpilot_core::{Action, BrowserConfig, Error, Result};

use crate::Driver;

pub struct SyntheticDriver {
    config: BrowserConfig,
    current_url: String,
    typed_text: String,
    clicked_points: Vec<(i64, i64)>,
}

impl SyntheticDriver {
    pub fn new(config: BrowserConfig) -> Self {
        let current_url = config.starting_url.clone();
        Self {
            config,
            current_url,
            typed_text: String::new(),
            clicked_points: Vec::new(),
        }
    }

    pub fn current_url(&self) -> &str {
        &self.current_url
    }

    fn render(&self) -> Result<Vec<u8>> {
        let width = self.config.width;
        let height = self.config.height;
        let mut img = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));

        // URL bar: color derived from the URL so navigation is visible.
        let url_color = tint(&self.current_url);
        fill_band(&mut img, 0, 40.min(height), url_color);

        // Content band: color derived from the typed text.
        let content_color = if self.typed_text.is_empty() {
            Rgb([230, 230, 230])
        } else {
            tint(&self.typed_text)
        };
        fill_band(&mut img, 40.min(height), 80.min(height), content_color);

        // Markers for the last five clicks.
        for &(x, y) in self.clicked_points.iter().rev().take(5) {
            draw_marker(&mut img, x, y);
        }

        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageOutputFormat::Png)
            .map_err(|e| Error::Driver(format!("Failed to encode placeholder PNG: {}", e)))?;
        Ok(buf.into_inner())
    }
}

fn fill_band(img: &mut RgbImage, y_start: u32, y_end: u32, color: Rgb<u8>) {
    for y in y_start..y_end.min(img.height()) {
        for x in 0..img.width() {
            img.put_pixel(x, y, color);
        }
    }
}

fn draw_marker(img: &mut RgbImage, cx: i64, cy: i64) {
    for dy in -4i64..=4 {
        for dx in -4i64..=4 {
            let x = cx + dx;
            let y = cy + dy;
            if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
                img.put_pixel(x as u32, y as u32, Rgb([220, 30, 30]));
            }
        }
    }
}

/// Stable color derived from a string (FNV-1a), so the same state always
/// renders the same image.
fn tint(s: &str) -> Rgb<u8> {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in s.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    let r = 120 + (hash & 0x7f) as u8;
    let g = 120 + ((hash >> 8) & 0x7f) as u8;
    let b = 120 + ((hash >> 16) & 0x7f) as u8;
    Rgb([r, g, b])
}

#[async_trait]
impl Driver for SyntheticDriver {
    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        self.render()
    }

    async fn execute(&mut self, action: &Action) -> Result<()> {
        debug!(action = action.kind(), "Synthetic driver action");
        match action {
            Action::Click { x, y, .. } | Action::DoubleClick { x, y } => {
                self.clicked_points.push((*x, *y));
            }
            Action::Type { text } => {
                self.typed_text.push_str(text);
            }
            Action::Navigate { url } => {
                self.current_url = url.clone();
            }
            Action::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis((*ms).min(50))).await;
            }
            Action::Scroll { .. } | Action::Keypress { .. } => {}
        }
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.current_url = url.to_string();
        Ok(())
    }

    async fn close(&mut self) {
        debug!("Synthetic driver closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_screenshot_is_deterministic() {
        let mut a = SyntheticDriver::new(BrowserConfig::default());
        let mut b = SyntheticDriver::new(BrowserConfig::default());
        assert_eq!(a.screenshot().await.unwrap(), b.screenshot().await.unwrap());
    }

    #[tokio::test]
    async fn test_actions_change_the_screenshot() {
        let mut driver = SyntheticDriver::new(BrowserConfig::default());
        let before = driver.screenshot().await.unwrap();

        driver
            .execute(&Action::Click {
                x: 100,
                y: 200,
                button: Default::default(),
            })
            .await
            .unwrap();
        let after = driver.screenshot().await.unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_accepts_all_actions() {
        let mut driver = SyntheticDriver::new(BrowserConfig::default());
        let actions = [
            Action::Scroll {
                x: 0,
                y: 0,
                scroll_x: 0,
                scroll_y: -200,
            },
            Action::Type {
                text: "hello".to_string(),
            },
            Action::Keypress {
                keys: vec!["ENTER".to_string()],
            },
            Action::Navigate {
                url: "https://example.com".to_string(),
            },
        ];
        for action in &actions {
            driver.execute(action).await.unwrap();
        }
        assert_eq!(driver.current_url(), "https://example.com");
    }

    #[test]
    fn test_tint_is_stable() {
        assert_eq!(tint("https://a"), tint("https://a"));
        assert_ne!(tint("https://a"), tint("https://b"));
    }
}
