//! Client for the hosted computer-use reasoning service.
//!
//! Speaks the Responses API: a `computer_use_preview` tool block with the
//! display dimensions, `previous_response_id` chaining between rounds, and
//! `computer_call_output` input items carrying data-URL screenshots.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use webpilot_core::config::AgentConfig;
use webpilot_core::{BrowserConfig, Environment, Error, Result, SafetyCheck};

use crate::response::AgentResponse;

/// Seam between the action loop and the remote reasoning service. Test
/// doubles script responses; the real client talks HTTP.
#[async_trait]
pub trait ReasoningAgent: Send + Sync {
    /// Open a conversation: the task text plus the starting screenshot.
    async fn initial_request(&self, task: &str, screenshot_b64: &str) -> Result<AgentResponse>;

    /// Report the outcome of the last computer call as a fresh screenshot.
    async fn send_screenshot(
        &self,
        previous_response_id: &str,
        call_id: &str,
        screenshot_b64: &str,
    ) -> Result<AgentResponse>;

    /// Report the outcome of a call whose safety checks a human approved.
    async fn acknowledge_safety_checks(
        &self,
        previous_response_id: &str,
        call_id: &str,
        checks: &[SafetyCheck],
        screenshot_b64: &str,
    ) -> Result<AgentResponse>;
}

pub struct ComputerUseClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    display_width: u32,
    display_height: u32,
    environment: Environment,
}

impl ComputerUseClient {
    pub fn new(
        config: &AgentConfig,
        api_key: String,
        browser: &BrowserConfig,
        environment: Environment,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Agent(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            display_width: browser.width,
            display_height: browser.height,
            environment,
        })
    }

    fn tools(&self) -> Value {
        json!([{
            "type": "computer_use_preview",
            "display_width": self.display_width,
            "display_height": self.display_height,
            "environment": self.environment.as_str(),
        }])
    }

    async fn post(&self, body: Value) -> Result<AgentResponse> {
        let url = format!("{}/responses", self.api_base);
        debug!(url = %url, "Sending reasoning request");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Agent(format!("Request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(Error::Agent(format!(
                "Reasoning service returned {}: {}",
                status, detail
            )));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| Error::Agent(format!("Failed to read response body: {}", e)))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Agent(format!("Unparseable agent response: {}", e)))
    }
}

fn data_url(screenshot_b64: &str) -> String {
    format!("data:image/png;base64,{}", screenshot_b64)
}

pub(crate) fn initial_body(
    model: &str,
    tools: Value,
    task: &str,
    screenshot_b64: &str,
) -> Value {
    json!({
        "model": model,
        "tools": tools,
        "input": [{
            "role": "user",
            "content": [
                {"type": "input_text", "text": task},
                {"type": "input_image", "image_url": data_url(screenshot_b64)},
            ],
        }],
        "reasoning": {"summary": "concise"},
        "truncation": "auto",
    })
}

pub(crate) fn screenshot_body(
    model: &str,
    tools: Value,
    previous_response_id: &str,
    call_id: &str,
    screenshot_b64: &str,
    acknowledged: &[SafetyCheck],
) -> Value {
    let mut output_item = json!({
        "type": "computer_call_output",
        "call_id": call_id,
        "output": {
            "type": "input_image",
            "image_url": data_url(screenshot_b64),
        },
    });
    if !acknowledged.is_empty() {
        output_item["acknowledged_safety_checks"] = json!(acknowledged
            .iter()
            .map(|c| json!({"id": c.id, "code": c.code, "message": c.message}))
            .collect::<Vec<Value>>());
    }
    json!({
        "model": model,
        "tools": tools,
        "previous_response_id": previous_response_id,
        "input": [output_item],
        "truncation": "auto",
    })
}

#[async_trait]
impl ReasoningAgent for ComputerUseClient {
    async fn initial_request(&self, task: &str, screenshot_b64: &str) -> Result<AgentResponse> {
        let body = initial_body(&self.model, self.tools(), task, screenshot_b64);
        self.post(body).await
    }

    async fn send_screenshot(
        &self,
        previous_response_id: &str,
        call_id: &str,
        screenshot_b64: &str,
    ) -> Result<AgentResponse> {
        let body = screenshot_body(
            &self.model,
            self.tools(),
            previous_response_id,
            call_id,
            screenshot_b64,
            &[],
        );
        self.post(body).await
    }

    async fn acknowledge_safety_checks(
        &self,
        previous_response_id: &str,
        call_id: &str,
        checks: &[SafetyCheck],
        screenshot_b64: &str,
    ) -> Result<AgentResponse> {
        let body = screenshot_body(
            &self.model,
            self.tools(),
            previous_response_id,
            call_id,
            screenshot_b64,
            checks,
        );
        self.post(body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools() -> Value {
        json!([{
            "type": "computer_use_preview",
            "display_width": 1024,
            "display_height": 768,
            "environment": "browser",
        }])
    }

    #[test]
    fn test_initial_body_shape() {
        let body = initial_body("computer-use-preview", tools(), "buy socks", "QUJD");
        assert_eq!(body["model"], "computer-use-preview");
        assert_eq!(body["truncation"], "auto");
        assert_eq!(body["tools"][0]["type"], "computer_use_preview");
        let content = &body["input"][0]["content"];
        assert_eq!(content[0]["text"], "buy socks");
        assert_eq!(content[1]["image_url"], "data:image/png;base64,QUJD");
    }

    #[test]
    fn test_screenshot_body_chains_previous_response() {
        let body = screenshot_body("m", tools(), "resp_1", "call_7", "QUJD", &[]);
        assert_eq!(body["previous_response_id"], "resp_1");
        let item = &body["input"][0];
        assert_eq!(item["type"], "computer_call_output");
        assert_eq!(item["call_id"], "call_7");
        assert_eq!(item["output"]["image_url"], "data:image/png;base64,QUJD");
        assert!(item.get("acknowledged_safety_checks").is_none());
    }

    #[test]
    fn test_acknowledged_checks_are_echoed_back() {
        let checks = vec![SafetyCheck {
            id: "sc_1".to_string(),
            code: "sensitive_domain".to_string(),
            message: "Review".to_string(),
        }];
        let body = screenshot_body("m", tools(), "resp_1", "call_7", "QUJD", &checks);
        let acked = &body["input"][0]["acknowledged_safety_checks"];
        assert_eq!(acked[0]["id"], "sc_1");
        assert_eq!(acked[0]["code"], "sensitive_domain");
    }
}
