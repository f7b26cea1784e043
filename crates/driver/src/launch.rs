//! Chrome process launch and CDP endpoint discovery.

use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::info;

use webpilot_core::{BrowserConfig, Error, Result};

/// Find a Chrome/Chromium binary on the system.
pub fn find_browser_binary() -> Option<String> {
    let candidates: Vec<&str> = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
        ]
    } else {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    };

    for candidate in candidates {
        if std::path::Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok() {
            return Some(candidate.to_string());
        }
    }
    None
}

fn build_browser_args(
    debug_port: u16,
    user_data_dir: &std::path::Path,
    config: &BrowserConfig,
) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
    ];
    if config.headless {
        args.push("--headless=new".to_string());
    }
    args.push(format!("--window-size={},{}", config.width, config.height));
    args.push("about:blank".to_string());
    args
}

async fn find_free_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| Error::Driver(format!("Failed to find free port: {}", e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::Driver(format!("Failed to get local addr: {}", e)))?
        .port();
    drop(listener);
    Ok(port)
}

/// Poll /json/version until the browser's CDP endpoint responds.
async fn wait_for_cdp_ready(port: u16, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    let url = format!("http://127.0.0.1:{}/json/version", port);

    loop {
        if start.elapsed() > timeout {
            return Err(Error::Timeout(format!(
                "Browser CDP not ready after {}s on port {}",
                timeout.as_secs(),
                port
            )));
        }
        if let Ok(resp) = reqwest::get(&url).await {
            if resp.json::<Value>().await.is_ok() {
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Resolve the first page target's WebSocket URL via /json/list. The page
/// target may not appear immediately after launch, so retry briefly.
async fn get_page_ws_url(port: u16) -> Result<String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);

    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        let Ok(resp) = reqwest::get(&url).await else {
            continue;
        };
        let Ok(targets) = resp.json::<Vec<Value>>().await else {
            continue;
        };
        for target in &targets {
            if target.get("type").and_then(|v| v.as_str()) == Some("page") {
                if let Some(ws_url) = target.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws_url.to_string());
                }
            }
        }
    }
    Err(Error::Driver("No page target found after retries".to_string()))
}

pub struct LaunchedBrowser {
    pub process: Child,
    pub page_ws_url: String,
    pub debug_port: u16,
    pub user_data_dir: PathBuf,
}

/// Launch a browser process and resolve its page target's debugger URL.
pub async fn launch_browser(config: &BrowserConfig) -> Result<LaunchedBrowser> {
    let browser_path = find_browser_binary()
        .ok_or_else(|| Error::Driver("No Chrome/Chromium binary found".to_string()))?;

    let user_data_dir = std::env::temp_dir().join(format!("webpilot-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&user_data_dir)
        .map_err(|e| Error::Driver(format!("Failed to create user data dir: {}", e)))?;

    let debug_port = find_free_port().await?;
    let args = build_browser_args(debug_port, &user_data_dir, config);

    info!(
        port = debug_port,
        headless = config.headless,
        "Launching browser"
    );

    let process = Command::new(&browser_path)
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Driver(format!("Failed to launch browser: {}", e)))?;

    wait_for_cdp_ready(debug_port, Duration::from_secs(15)).await?;
    let page_ws_url = get_page_ws_url(debug_port).await?;

    Ok(LaunchedBrowser {
        process,
        page_ws_url,
        debug_port,
        user_data_dir,
    })
}
