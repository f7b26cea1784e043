use serde::{Deserialize, Serialize};

/// Mouse button for click actions. The wire format uses lowercase names
/// and omits the field for plain left clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Middle,
    Right,
}

impl MouseButton {
    pub fn as_cdp(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Middle => "middle",
            MouseButton::Right => "right",
        }
    }
}

/// A single primitive instruction emitted by the reasoning agent and
/// consumed by the browser driver. Parsed once at the wire boundary;
/// each variant carries only its relevant fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Click {
        x: i64,
        y: i64,
        #[serde(default)]
        button: MouseButton,
    },
    DoubleClick {
        x: i64,
        y: i64,
    },
    Scroll {
        #[serde(default)]
        x: i64,
        #[serde(default)]
        y: i64,
        #[serde(default)]
        scroll_x: i64,
        #[serde(default)]
        scroll_y: i64,
    },
    Type {
        text: String,
    },
    Keypress {
        keys: Vec<String>,
    },
    Wait {
        #[serde(default = "default_wait_ms")]
        ms: u64,
    },
    Navigate {
        url: String,
    },
}

fn default_wait_ms() -> u64 {
    1000
}

impl Action {
    /// Short name used in logs and action records.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::DoubleClick { .. } => "double_click",
            Action::Scroll { .. } => "scroll",
            Action::Type { .. } => "type",
            Action::Keypress { .. } => "keypress",
            Action::Wait { .. } => "wait",
            Action::Navigate { .. } => "navigate",
        }
    }
}

/// A concern flagged by the reasoning agent that must be explicitly
/// approved or rejected by a human before the attached action runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyCheck {
    pub id: String,
    pub code: String,
    pub message: String,
}

/// Target environment tag sent to the reasoning agent. Only `browser` is
/// backed by a real driver; the rest are semantic tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Browser,
    Mac,
    Windows,
    Ubuntu,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Browser => "browser",
            Environment::Mac => "mac",
            Environment::Windows => "windows",
            Environment::Ubuntu => "ubuntu",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Viewport and startup configuration for a session's browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_starting_url")]
    pub starting_url: String,
}

fn default_width() -> u32 {
    1024
}

fn default_height() -> u32 {
    768
}

fn default_headless() -> bool {
    true
}

fn default_starting_url() -> String {
    "https://www.google.com".to_string()
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            headless: default_headless(),
            starting_url: default_starting_url(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_click_with_default_button() {
        let action: Action = serde_json::from_str(r#"{"type":"click","x":120,"y":45}"#).unwrap();
        assert_eq!(
            action,
            Action::Click {
                x: 120,
                y: 45,
                button: MouseButton::Left
            }
        );
    }

    #[test]
    fn test_parse_right_click() {
        let action: Action =
            serde_json::from_str(r#"{"type":"click","x":5,"y":9,"button":"right"}"#).unwrap();
        match action {
            Action::Click { button, .. } => assert_eq!(button, MouseButton::Right),
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_parse_scroll_defaults_missing_deltas() {
        let action: Action =
            serde_json::from_str(r#"{"type":"scroll","x":10,"y":20,"scroll_y":-300}"#).unwrap();
        assert_eq!(
            action,
            Action::Scroll {
                x: 10,
                y: 20,
                scroll_x: 0,
                scroll_y: -300
            }
        );
    }

    #[test]
    fn test_parse_keypress_and_type() {
        let kp: Action =
            serde_json::from_str(r#"{"type":"keypress","keys":["CTRL","A"]}"#).unwrap();
        assert_eq!(kp.kind(), "keypress");
        let ty: Action = serde_json::from_str(r#"{"type":"type","text":"hello"}"#).unwrap();
        assert_eq!(ty, Action::Type { text: "hello".to_string() });
    }

    #[test]
    fn test_unknown_action_type_is_rejected() {
        let result: std::result::Result<Action, _> =
            serde_json::from_str(r#"{"type":"drag","path":[]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_browser_config_defaults() {
        let config: BrowserConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.width, 1024);
        assert_eq!(config.height, 768);
        assert!(config.headless);
    }
}
