use super::{error_text, str_field, truncate_field, type_tag, AgentProtocol, StreamEvent};
use serde_json::Value;

/// `codex exec --json` event stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct CodexExec;

impl AgentProtocol for CodexExec {
    fn name(&self) -> &'static str {
        "codex-exec-json"
    }

    fn completion_types(&self) -> &'static [&'static str] {
        &["turn.completed", "turn.failed", "error"]
    }

    fn interpret(&self, message: &Value) -> Vec<StreamEvent> {
        match type_tag(message) {
            "thread.started" => str_field(message, "thread_id")
                .map(|id| StreamEvent::SessionStarted(id.to_string()))
                .into_iter()
                .collect(),
            "item.completed" => {
                let Some(item) = message.get("item") else {
                    return Vec::new();
                };
                // Older builds tag items with `item_type`.
                let kind = str_field(item, "type").or_else(|| str_field(item, "item_type"));
                match (kind, str_field(item, "text")) {
                    (Some("agent_message"), Some(text)) if !text.is_empty() => {
                        vec![StreamEvent::AssistantText(text.to_string())]
                    }
                    _ => Vec::new(),
                }
            }
            "turn.failed" => vec![StreamEvent::UpstreamError(error_text(
                message.get("error"),
                message,
            ))],
            "error" => {
                let payload = message.get("message").or_else(|| message.get("error"));
                vec![StreamEvent::UpstreamError(error_text(payload, message))]
            }
            _ => Vec::new(),
        }
    }

    fn redact(&self, message: &mut Value) -> bool {
        if !type_tag(message).starts_with("item.") {
            return false;
        }
        match message.get_mut("item") {
            Some(item) if type_tag(item) == "command_execution" => {
                truncate_field(item, "aggregated_output")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::REDACTED_MARKER;
    use serde_json::json;

    #[test]
    fn thread_and_agent_messages() {
        let started = json!({"type": "thread.started", "thread_id": "t-1"});
        assert_eq!(
            CodexExec.interpret(&started),
            vec![StreamEvent::SessionStarted("t-1".into())]
        );

        let message = json!({
            "type": "item.completed",
            "item": {"id": "item_0", "type": "agent_message", "text": "looks fine"}
        });
        assert_eq!(
            CodexExec.interpret(&message),
            vec![StreamEvent::AssistantText("looks fine".into())]
        );

        let reasoning = json!({
            "type": "item.completed",
            "item": {"type": "reasoning", "text": "thinking"}
        });
        assert!(CodexExec.interpret(&reasoning).is_empty());
    }

    #[test]
    fn failures_are_upstream_errors() {
        let failed = json!({"type": "turn.failed", "error": {"message": "usage limit"}});
        assert_eq!(
            CodexExec.interpret(&failed),
            vec![StreamEvent::UpstreamError("usage limit".into())]
        );
        let error = json!({"type": "error", "message": "stream disconnected"});
        assert_eq!(
            CodexExec.interpret(&error),
            vec![StreamEvent::UpstreamError("stream disconnected".into())]
        );
    }

    #[test]
    fn command_output_is_truncated() {
        let mut item = json!({
            "type": "item.completed",
            "item": {"type": "command_execution", "command": "ls", "aggregated_output": "a\nb\n"}
        });
        assert!(CodexExec.redact(&mut item));
        assert_eq!(item["item"]["aggregated_output"], REDACTED_MARKER);
        assert_eq!(item["item"]["command"], "ls");
    }
}
