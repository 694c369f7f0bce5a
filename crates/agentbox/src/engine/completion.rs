use serde_json::Value;

/// Recognizes the line that marks the end of an agent's logical turn.
///
/// A line is a completion marker when it decodes as a JSON object whose
/// `type` field is one of the protocol's terminal tags. Anything else,
/// including undecodable text, is not a marker.
#[derive(Clone, Copy, Debug)]
pub struct CompletionDetector {
    types: &'static [&'static str],
}

impl CompletionDetector {
    pub fn new(types: &'static [&'static str]) -> Self {
        Self { types }
    }

    pub fn is_complete(&self, line: &str) -> bool {
        if self.types.is_empty() {
            return false;
        }
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            return false;
        };
        value
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|tag| self.types.contains(&tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TYPES: &[&str] = &["result", "turn.completed"];

    #[test]
    fn matches_terminal_type_tags_only() {
        let detector = CompletionDetector::new(TYPES);
        assert!(detector.is_complete(r#"{"type":"result","result":"done"}"#));
        assert!(detector.is_complete(r#"{"type":"turn.completed"}"#));
        assert!(!detector.is_complete(r#"{"type":"assistant"}"#));
        assert!(!detector.is_complete(r#"{"kind":"result"}"#));
        assert!(!detector.is_complete(r#"{"type":42}"#));
        assert!(!detector.is_complete(r#"["result"]"#));
    }

    #[test]
    fn undecodable_lines_are_not_markers() {
        let detector = CompletionDetector::new(TYPES);
        assert!(!detector.is_complete("result"));
        assert!(!detector.is_complete(r#"{"type":"result""#));
        assert!(!detector.is_complete(""));
    }

    #[test]
    fn empty_set_never_matches() {
        let detector = CompletionDetector::new(&[]);
        assert!(!detector.is_complete(r#"{"type":"result"}"#));
    }
}
