//! Stream protocol interpreters.
//!
//! Each supported agent CLI prints one JSON object per line. An
//! [`AgentProtocol`] turns those objects into [`StreamEvent`]s the engine
//! understands, names the type tags that end a turn, and strips bulky
//! payloads before lines are kept for diagnostics.

mod claude;
mod codex;
mod gemini;

pub use claude::ClaudeStream;
pub use codex::CodexExec;
pub use gemini::GeminiStream;

use crate::model::REDACTED_MARKER;
use serde_json::Value;

/// What a single output line means to the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// The agent announced its session identifier.
    SessionStarted(String),
    /// A complete block of assistant text.
    AssistantText(String),
    /// A streamed fragment continuing the current assistant text block.
    AssistantDelta(String),
    /// The agent's final answer for the turn.
    FinalResult(String),
    /// The agent reported a failure through its own protocol.
    UpstreamError(String),
}

pub trait AgentProtocol: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// `type` tags that mark the end of a turn.
    fn completion_types(&self) -> &'static [&'static str];

    /// Interpret one decoded message.
    fn interpret(&self, message: &Value) -> Vec<StreamEvent>;

    /// Replace large embedded payloads in place. Returns whether anything changed.
    fn redact(&self, message: &mut Value) -> bool;
}

/// Redact a raw output line, leaving undecodable or untouched lines as they are.
pub fn redact_line(protocol: &dyn AgentProtocol, line: &str) -> String {
    let Ok(mut value) = serde_json::from_str::<Value>(line) else {
        return line.to_string();
    };
    if protocol.redact(&mut value) {
        serde_json::to_string(&value).unwrap_or_else(|_| line.to_string())
    } else {
        line.to_string()
    }
}

fn type_tag(message: &Value) -> &str {
    message.get("type").and_then(Value::as_str).unwrap_or("")
}

fn str_field<'a>(message: &'a Value, key: &str) -> Option<&'a str> {
    message.get(key).and_then(Value::as_str)
}

/// Pull a human-readable message out of an error payload that may be a
/// string, an object with `message`, or something else entirely.
fn error_text(payload: Option<&Value>, whole: &Value) -> String {
    match payload {
        Some(Value::String(text)) if !text.is_empty() => text.clone(),
        Some(object @ Value::Object(_)) => str_field(object, "message")
            .map_or_else(|| object.to_string(), ToString::to_string),
        _ => whole.to_string(),
    }
}

/// Set `field` of `target` to the redaction marker if it holds anything.
fn truncate_field(target: &mut Value, field: &str) -> bool {
    match target.get_mut(field) {
        Some(slot) if *slot != Value::String(REDACTED_MARKER.to_string()) => {
            *slot = Value::String(REDACTED_MARKER.to_string());
            true
        }
        _ => false,
    }
}
