//! Typed view of a reasoning-service response.
//!
//! The service returns a flat list of output items. Only three kinds
//! matter here: a computer call to execute, assistant text, and reasoning
//! summaries. Anything else is carried as `Other` and ignored. Actions are
//! parsed into [`Action`] right here at the wire boundary; an unknown
//! action type fails the whole response rather than leaking raw JSON
//! deeper into the loop.

use serde::Deserialize;

use webpilot_core::{Action, SafetyCheck};

#[derive(Debug, Clone, Deserialize)]
pub struct AgentResponse {
    pub id: String,
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    ComputerCall {
        call_id: String,
        action: Action,
        #[serde(default)]
        pending_safety_checks: Vec<SafetyCheck>,
    },
    Message {
        #[serde(default)]
        content: Vec<MessageContent>,
    },
    Reasoning {
        #[serde(default)]
        summary: Vec<SummaryText>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageContent {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummaryText {
    #[serde(default)]
    pub text: String,
}

/// The call the loop will act on, cloned out of a response.
#[derive(Debug, Clone)]
pub struct ComputerCall {
    pub call_id: String,
    pub action: Action,
    pub pending_safety_checks: Vec<SafetyCheck>,
}

impl AgentResponse {
    /// The first computer call, if any. A response may in principle carry
    /// several; later ones are dropped and the agent re-issues them from
    /// the next screenshot.
    pub fn first_computer_call(&self) -> Option<ComputerCall> {
        self.output.iter().find_map(|item| match item {
            OutputItem::ComputerCall {
                call_id,
                action,
                pending_safety_checks,
            } => Some(ComputerCall {
                call_id: call_id.clone(),
                action: action.clone(),
                pending_safety_checks: pending_safety_checks.clone(),
            }),
            _ => None,
        })
    }

    /// All assistant text in the response, one string per message.
    pub fn text_messages(&self) -> Vec<String> {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::Message { content } => {
                    let joined: Vec<&str> = content
                        .iter()
                        .filter_map(|c| c.text.as_deref())
                        .collect();
                    if joined.is_empty() {
                        None
                    } else {
                        Some(joined.join("\n"))
                    }
                }
                _ => None,
            })
            .collect()
    }

    pub fn reasoning_summaries(&self) -> Vec<String> {
        self.output
            .iter()
            .flat_map(|item| match item {
                OutputItem::Reasoning { summary } => summary
                    .iter()
                    .filter(|s| !s.text.is_empty())
                    .map(|s| s.text.clone())
                    .collect::<Vec<String>>(),
                _ => Vec::new(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webpilot_core::MouseButton;

    #[test]
    fn test_parse_computer_call_response() {
        let raw = r#"{
            "id": "resp_abc",
            "output": [
                {
                    "type": "reasoning",
                    "summary": [{"type": "summary_text", "text": "Clicking the search box"}]
                },
                {
                    "type": "computer_call",
                    "call_id": "call_1",
                    "action": {"type": "click", "x": 150, "y": 60},
                    "pending_safety_checks": []
                }
            ]
        }"#;
        let response: AgentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.id, "resp_abc");

        let call = response.first_computer_call().unwrap();
        assert_eq!(call.call_id, "call_1");
        assert_eq!(
            call.action,
            Action::Click {
                x: 150,
                y: 60,
                button: MouseButton::Left
            }
        );
        assert!(call.pending_safety_checks.is_empty());
        assert_eq!(
            response.reasoning_summaries(),
            vec!["Clicking the search box".to_string()]
        );
    }

    #[test]
    fn test_parse_final_message_response() {
        let raw = r#"{
            "id": "resp_done",
            "output": [
                {
                    "type": "message",
                    "role": "assistant",
                    "content": [{"type": "output_text", "text": "The order is placed."}]
                }
            ]
        }"#;
        let response: AgentResponse = serde_json::from_str(raw).unwrap();
        assert!(response.first_computer_call().is_none());
        assert_eq!(
            response.text_messages(),
            vec!["The order is placed.".to_string()]
        );
    }

    #[test]
    fn test_parse_safety_checks() {
        let raw = r#"{
            "id": "resp_gate",
            "output": [
                {
                    "type": "computer_call",
                    "call_id": "call_9",
                    "action": {"type": "type", "text": "confirm purchase"},
                    "pending_safety_checks": [
                        {"id": "sc_1", "code": "malicious_instructions",
                         "message": "Confirm before typing into a payment form"}
                    ]
                }
            ]
        }"#;
        let response: AgentResponse = serde_json::from_str(raw).unwrap();
        let call = response.first_computer_call().unwrap();
        assert_eq!(call.pending_safety_checks.len(), 1);
        assert_eq!(call.pending_safety_checks[0].code, "malicious_instructions");
    }

    #[test]
    fn test_unknown_output_items_are_ignored() {
        let raw = r#"{
            "id": "resp_x",
            "output": [
                {"type": "file_search_call", "queries": ["q"]},
                {"type": "computer_call", "call_id": "c", "action": {"type": "wait"}}
            ]
        }"#;
        let response: AgentResponse = serde_json::from_str(raw).unwrap();
        let call = response.first_computer_call().unwrap();
        assert_eq!(call.action, Action::Wait { ms: 1000 });
    }

    #[test]
    fn test_unknown_action_type_fails_the_response() {
        let raw = r#"{
            "id": "resp_bad",
            "output": [
                {"type": "computer_call", "call_id": "c", "action": {"type": "drag", "path": []}}
            ]
        }"#;
        assert!(serde_json::from_str::<AgentResponse>(raw).is_err());
    }

    #[test]
    fn test_first_call_wins_over_text_and_later_calls() {
        let raw = r#"{
            "id": "resp_multi",
            "output": [
                {"type": "message", "content": [{"type": "output_text", "text": "Working on it"}]},
                {"type": "computer_call", "call_id": "first", "action": {"type": "wait"}},
                {"type": "computer_call", "call_id": "second", "action": {"type": "wait"}}
            ]
        }"#;
        let response: AgentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.first_computer_call().unwrap().call_id, "first");
    }
}
