use super::{error_text, str_field, truncate_field, type_tag, AgentProtocol, StreamEvent};
use serde_json::Value;

/// `claude -p --output-format stream-json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClaudeStream;

impl AgentProtocol for ClaudeStream {
    fn name(&self) -> &'static str {
        "claude-stream-json"
    }

    fn completion_types(&self) -> &'static [&'static str] {
        &["result", "error"]
    }

    fn interpret(&self, message: &Value) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        match type_tag(message) {
            "system" if str_field(message, "subtype") == Some("init") => {
                if let Some(id) = str_field(message, "session_id") {
                    events.push(StreamEvent::SessionStarted(id.to_string()));
                }
            }
            "assistant" => {
                for block in content_blocks(message) {
                    if type_tag(block) == "text" {
                        if let Some(text) = str_field(block, "text").filter(|t| !t.is_empty()) {
                            events.push(StreamEvent::AssistantText(text.to_string()));
                        }
                    }
                }
            }
            "result" => {
                if let Some(id) = str_field(message, "session_id") {
                    events.push(StreamEvent::SessionStarted(id.to_string()));
                }
                let result = str_field(message, "result").unwrap_or("");
                if !result.is_empty() {
                    events.push(StreamEvent::FinalResult(result.to_string()));
                }
                if message.get("is_error").and_then(Value::as_bool) == Some(true) {
                    let text = if result.is_empty() {
                        error_text(message.get("error"), message)
                    } else {
                        result.to_string()
                    };
                    events.push(StreamEvent::UpstreamError(text));
                }
            }
            "error" => {
                events.push(StreamEvent::UpstreamError(error_text(
                    message.get("error"),
                    message,
                )));
            }
            _ => {}
        }
        events
    }

    fn redact(&self, message: &mut Value) -> bool {
        if type_tag(message) != "user" {
            return false;
        }
        let Some(Value::Array(blocks)) = message
            .get_mut("message")
            .and_then(|inner| inner.get_mut("content"))
        else {
            return false;
        };
        let mut changed = false;
        for block in blocks.iter_mut() {
            if type_tag(block) == "tool_result" {
                changed |= truncate_field(block, "content");
            }
        }
        changed
    }
}

fn content_blocks(message: &Value) -> impl Iterator<Item = &Value> {
    message
        .get("message")
        .and_then(|inner| inner.get("content"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::REDACTED_MARKER;
    use serde_json::json;

    #[test]
    fn init_and_assistant_text() {
        let init = json!({"type": "system", "subtype": "init", "session_id": "abc"});
        assert_eq!(
            ClaudeStream.interpret(&init),
            vec![StreamEvent::SessionStarted("abc".into())]
        );

        let assistant = json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "text", "text": "first"},
                {"type": "tool_use", "name": "Read"},
                {"type": "text", "text": ""},
                {"type": "text", "text": "second"}
            ]}
        });
        assert_eq!(
            ClaudeStream.interpret(&assistant),
            vec![
                StreamEvent::AssistantText("first".into()),
                StreamEvent::AssistantText("second".into()),
            ]
        );
    }

    #[test]
    fn error_result_reports_upstream_failure() {
        let result = json!({"type": "result", "is_error": true, "result": "rate limited"});
        assert_eq!(
            ClaudeStream.interpret(&result),
            vec![
                StreamEvent::FinalResult("rate limited".into()),
                StreamEvent::UpstreamError("rate limited".into()),
            ]
        );

        let error = json!({"type": "error", "error": {"message": "overloaded"}});
        assert_eq!(
            ClaudeStream.interpret(&error),
            vec![StreamEvent::UpstreamError("overloaded".into())]
        );
    }

    #[test]
    fn result_carries_session_fallback() {
        let result = json!({"type": "result", "result": "done", "session_id": "s1"});
        assert_eq!(
            ClaudeStream.interpret(&result),
            vec![
                StreamEvent::SessionStarted("s1".into()),
                StreamEvent::FinalResult("done".into()),
            ]
        );
    }

    #[test]
    fn tool_results_in_user_messages_are_truncated() {
        let mut user = json!({
            "type": "user",
            "message": {"content": [
                {"type": "tool_result", "content": "x".repeat(10_000)},
                {"type": "text", "text": "keep"}
            ]}
        });
        assert!(ClaudeStream.redact(&mut user));
        assert_eq!(user["message"]["content"][0]["content"], REDACTED_MARKER);
        assert_eq!(user["message"]["content"][1]["text"], "keep");

        let mut plain = json!({"type": "user", "message": {"content": "hi"}});
        assert!(!ClaudeStream.redact(&mut plain));
    }
}
