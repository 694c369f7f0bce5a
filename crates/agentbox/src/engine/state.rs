use crate::model::TRAILING_LINES;
use crate::protocol::{AgentProtocol, StreamEvent};
use serde_json::Value;
use std::collections::VecDeque;

/// Everything learned from one attempt's output stream.
///
/// Lines are fed in arrival order. The trailing window and the captured
/// message list hold redacted copies only.
#[derive(Debug, Default)]
pub struct RunState {
    pub session_id: Option<String>,
    final_result: String,
    assistant_parts: Vec<String>,
    delta_open: bool,
    pub had_error: bool,
    pub error_message: String,
    pub decode_errors: u64,
    trailing: VecDeque<String>,
    messages: Option<Vec<Value>>,
}

impl RunState {
    /// `capture_messages` keeps every decoded message for the caller.
    pub fn new(capture_messages: bool) -> Self {
        Self {
            messages: capture_messages.then(Vec::new),
            ..Self::default()
        }
    }

    pub fn observe(&mut self, line: &str, protocol: &dyn AgentProtocol) {
        let Ok(mut value) = serde_json::from_str::<Value>(line) else {
            self.decode_errors += 1;
            self.remember(line.to_string());
            return;
        };

        for event in protocol.interpret(&value) {
            self.apply(event);
        }

        let redacted = protocol.redact(&mut value);
        let kept = if redacted {
            serde_json::to_string(&value).unwrap_or_else(|_| line.to_string())
        } else {
            line.to_string()
        };
        self.remember(kept);
        if let Some(messages) = self.messages.as_mut() {
            messages.push(value);
        }
    }

    fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::SessionStarted(id) => {
                if self.session_id.is_none() {
                    self.session_id = Some(id);
                }
            }
            StreamEvent::AssistantText(text) => {
                self.assistant_parts.push(text);
                self.delta_open = false;
            }
            StreamEvent::AssistantDelta(text) => match self.assistant_parts.last_mut() {
                Some(part) if self.delta_open => part.push_str(&text),
                _ => {
                    self.assistant_parts.push(text);
                    self.delta_open = true;
                }
            },
            StreamEvent::FinalResult(text) => self.final_result = text,
            StreamEvent::UpstreamError(message) => {
                self.had_error = true;
                self.error_message = message;
            }
        }
    }

    fn remember(&mut self, line: String) {
        if self.trailing.len() == TRAILING_LINES {
            self.trailing.pop_front();
        }
        self.trailing.push_back(line);
    }

    /// The explicit final result, else the assistant text blocks joined by a blank line.
    pub fn result_text(&self) -> String {
        if self.final_result.is_empty() {
            self.assistant_parts.join("\n\n")
        } else {
            self.final_result.clone()
        }
    }

    /// Trailing output lines, oldest first.
    pub fn last_lines(&self) -> Vec<String> {
        self.trailing.iter().cloned().collect()
    }

    pub fn take_messages(&mut self) -> Option<Vec<Value>> {
        self.messages.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ClaudeStream, GeminiStream};

    #[test]
    fn result_falls_back_to_assistant_text() {
        let mut state = RunState::new(false);
        state.observe(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"one"}]}}"#,
            &ClaudeStream,
        );
        state.observe(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"two"}]}}"#,
            &ClaudeStream,
        );
        assert_eq!(state.result_text(), "one\n\ntwo");

        state.observe(r#"{"type":"result","result":"final"}"#, &ClaudeStream);
        assert_eq!(state.result_text(), "final");
    }

    #[test]
    fn first_session_wins() {
        let mut state = RunState::new(false);
        state.observe(r#"{"type":"system","subtype":"init","session_id":"a"}"#, &ClaudeStream);
        state.observe(r#"{"type":"result","result":"x","session_id":"b"}"#, &ClaudeStream);
        assert_eq!(state.session_id.as_deref(), Some("a"));
    }

    #[test]
    fn deltas_join_into_one_block() {
        let mut state = RunState::new(false);
        for chunk in ["Hel", "lo"] {
            state.observe(
                &format!(r#"{{"type":"message","role":"assistant","content":"{chunk}","delta":true}}"#),
                &GeminiStream,
            );
        }
        state.observe(
            r#"{"type":"message","role":"assistant","content":"Bye"}"#,
            &GeminiStream,
        );
        assert_eq!(state.result_text(), "Hello\n\nBye");
    }

    #[test]
    fn trailing_window_is_bounded_and_counts_decode_errors() {
        let mut state = RunState::new(false);
        for i in 0..60 {
            state.observe(&format!("noise {i}"), &ClaudeStream);
        }
        let lines = state.last_lines();
        assert_eq!(lines.len(), TRAILING_LINES);
        assert_eq!(lines.first().map(String::as_str), Some("noise 10"));
        assert_eq!(state.decode_errors, 60);
    }

    #[test]
    fn captured_messages_are_redacted() {
        let mut state = RunState::new(true);
        state.observe(
            r#"{"type":"user","message":{"content":[{"type":"tool_result","content":"secret"}]}}"#,
            &ClaudeStream,
        );
        let messages = state.take_messages().unwrap();
        assert_eq!(messages[0]["message"]["content"][0]["content"], "[truncated]");
        assert!(!state.last_lines()[0].contains("secret"));
    }

    #[test]
    fn upstream_error_keeps_latest_message() {
        let mut state = RunState::new(false);
        state.observe(r#"{"type":"error","error":{"message":"first"}}"#, &ClaudeStream);
        state.observe(r#"{"type":"error","error":{"message":"second"}}"#, &ClaudeStream);
        assert!(state.had_error);
        assert_eq!(state.error_message, "second");
        assert!(RunState::new(false).take_messages().is_none());
    }
}
