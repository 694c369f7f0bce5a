use super::{error_text, str_field, truncate_field, type_tag, AgentProtocol, StreamEvent};
use serde_json::Value;

/// `gemini --output-format stream-json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct GeminiStream;

impl AgentProtocol for GeminiStream {
    fn name(&self) -> &'static str {
        "gemini-stream-json"
    }

    fn completion_types(&self) -> &'static [&'static str] {
        &["result", "error"]
    }

    fn interpret(&self, message: &Value) -> Vec<StreamEvent> {
        match type_tag(message) {
            "init" => str_field(message, "session_id")
                .map(|id| StreamEvent::SessionStarted(id.to_string()))
                .into_iter()
                .collect(),
            "message" if str_field(message, "role") == Some("assistant") => {
                let Some(text) = str_field(message, "content").filter(|t| !t.is_empty()) else {
                    return Vec::new();
                };
                if message.get("delta").and_then(Value::as_bool) == Some(true) {
                    vec![StreamEvent::AssistantDelta(text.to_string())]
                } else {
                    vec![StreamEvent::AssistantText(text.to_string())]
                }
            }
            "result" => {
                let mut events = Vec::new();
                if let Some(text) = str_field(message, "response").filter(|t| !t.is_empty()) {
                    events.push(StreamEvent::FinalResult(text.to_string()));
                }
                if matches!(str_field(message, "status"), Some(status) if status != "success") {
                    events.push(StreamEvent::UpstreamError(error_text(
                        message.get("error"),
                        message,
                    )));
                }
                events
            }
            "error" => {
                let payload = message.get("message").or_else(|| message.get("error"));
                vec![StreamEvent::UpstreamError(error_text(payload, message))]
            }
            _ => Vec::new(),
        }
    }

    fn redact(&self, message: &mut Value) -> bool {
        type_tag(message) == "tool_result" && truncate_field(message, "output")
    }
}
