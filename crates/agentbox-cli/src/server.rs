//! Stdio tool server.
//!
//! Newline-delimited JSON-RPC 2.0 in the shape MCP clients expect. Each
//! request is answered before the next one is read, so tool calls never
//! overlap.

use agentbox::{Outcome, ToolKind, ToolParams};
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use thiserror::Error;
use tracing::{debug, warn};

/// Protocol revision reported when the client does not ask for one.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Error)]
#[error("{message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_value(&self) -> Value {
        json!({"code": self.code, "message": self.message})
    }
}

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Serve requests from `input` until it is exhausted, running tools with `runner`.
///
/// A line that is not valid UTF-8 gets a parse error reply; only I/O errors
/// end the loop early.
pub fn serve<R, W, F>(mut input: R, mut output: W, mut runner: F) -> io::Result<()>
where
    R: BufRead,
    W: Write,
    F: FnMut(ToolKind, &ToolParams) -> Outcome,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if input.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let response = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => handle_line(line.trim_end(), &mut runner),
            Err(err) => {
                warn!(error = %err, "received a line that is not UTF-8");
                Some(error_response(
                    Value::Null,
                    &RpcError::new(PARSE_ERROR, format!("parse error: {err}")),
                ))
            }
        };
        if let Some(response) = response {
            let payload = serde_json::to_string(&response)?;
            writeln!(output, "{payload}")?;
            output.flush()?;
        }
    }
    debug!("client closed the connection");
    Ok(())
}

/// Answer one raw message. Notifications get no reply.
pub fn handle_line<F>(line: &str, runner: &mut F) -> Option<Value>
where
    F: FnMut(ToolKind, &ToolParams) -> Outcome,
{
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "received malformed JSON");
            return Some(error_response(
                Value::Null,
                &RpcError::new(PARSE_ERROR, format!("parse error: {err}")),
            ));
        }
    };
    let request: Request = match serde_json::from_value(value.clone()) {
        Ok(request) => request,
        Err(err) => {
            let id = value.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                &RpcError::new(INVALID_REQUEST, format!("invalid request: {err}")),
            ));
        }
    };

    let Some(id) = request.id.clone() else {
        debug!(method = %request.method, "notification");
        return None;
    };
    match dispatch(&request, runner) {
        Ok(result) => Some(json!({"jsonrpc": "2.0", "id": id, "result": result})),
        Err(err) => Some(error_response(id, &err)),
    }
}

fn dispatch<F>(request: &Request, runner: &mut F) -> Result<Value, RpcError>
where
    F: FnMut(ToolKind, &ToolParams) -> Outcome,
{
    match request.method.as_str() {
        "initialize" => Ok(initialize(&request.params)),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({"tools": list_tools()})),
        "tools/call" => call_tool(&request.params, runner),
        other => Err(RpcError::new(
            METHOD_NOT_FOUND,
            format!("method not found: {other}"),
        )),
    }
}

fn initialize(params: &Value) -> Value {
    let version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or(PROTOCOL_VERSION);
    json!({
        "protocolVersion": version,
        "capabilities": {"tools": {"listChanged": false}},
        "serverInfo": {"name": "agentbox", "version": env!("CARGO_PKG_VERSION")}
    })
}

/// Tool descriptors as published by `tools/list`.
pub fn list_tools() -> Vec<Value> {
    ToolKind::ALL
        .into_iter()
        .map(|kind| {
            json!({
                "name": kind.name(),
                "description": kind.description(),
                "inputSchema": kind.input_schema(),
            })
        })
        .collect()
}

fn call_tool<F>(params: &Value, runner: &mut F) -> Result<Value, RpcError>
where
    F: FnMut(ToolKind, &ToolParams) -> Outcome,
{
    let call: CallParams = serde_json::from_value(params.clone())
        .map_err(|err| RpcError::new(INVALID_PARAMS, format!("invalid tools/call params: {err}")))?;
    let kind = ToolKind::from_name(&call.name)
        .map_err(|err| RpcError::new(INVALID_PARAMS, err.to_string()))?;
    let arguments = call.arguments.unwrap_or_else(|| json!({}));
    let tool_params = ToolParams::from_value(kind, arguments)
        .map_err(|err| RpcError::new(INVALID_PARAMS, err.to_string()))?;

    let outcome = runner(kind, &tool_params);
    let structured = outcome.to_value();
    let text = serde_json::to_string_pretty(&structured).unwrap_or_else(|_| structured.to_string());
    Ok(json!({
        "content": [{"type": "text", "text": text}],
        "structuredContent": structured,
        "isError": !outcome.success,
    }))
}

fn error_response(id: Value, err: &RpcError) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": err.to_value()})
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentbox::ErrorKind;
    use std::time::Duration;

    fn fake_runner(kind: ToolKind, params: &ToolParams) -> Outcome {
        if params.prompt == "fail" {
            Outcome::failure(
                kind.name(),
                ErrorKind::EmptyResult,
                agentbox::ErrorDetail::new("nothing came back"),
                Duration::ZERO,
            )
        } else {
            Outcome::success(
                kind.name(),
                Some("abc".into()),
                format!("echo: {}", params.prompt),
                Duration::ZERO,
            )
        }
    }

    fn roundtrip(requests: &[&str]) -> Vec<Value> {
        let input = requests.join("\n");
        let mut output = Vec::new();
        serve(input.as_bytes(), &mut output, fake_runner).unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn initialize_and_list() {
        let replies = roundtrip(&[
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26"}}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
        ]);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(replies[0]["result"]["serverInfo"]["name"], "agentbox");
        let names: Vec<&str> = replies[1]["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|tool| tool["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["claude", "coder", "codex", "gemini"]);
    }

    #[test]
    fn tool_call_wraps_outcome() {
        let replies = roundtrip(&[
            r#"{"jsonrpc":"2.0","id":"a","method":"tools/call","params":{"name":"claude","arguments":{"PROMPT":"hi","cd":"/tmp"}}}"#,
            r#"{"jsonrpc":"2.0","id":"b","method":"tools/call","params":{"name":"codex","arguments":{"PROMPT":"fail","cd":"/tmp"}}}"#,
        ]);
        let ok = &replies[0]["result"];
        assert_eq!(replies[0]["id"], "a");
        assert_eq!(ok["isError"], false);
        assert_eq!(ok["structuredContent"]["SESSION_ID"], "abc");
        let text: Value = serde_json::from_str(ok["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(text["result"], "echo: hi");

        let failed = &replies[1]["result"];
        assert_eq!(failed["isError"], true);
        assert_eq!(failed["structuredContent"]["error_kind"], "empty_result");
    }

    #[test]
    fn protocol_errors_use_json_rpc_codes() {
        let replies = roundtrip(&[
            "{not json",
            r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#,
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"nope","arguments":{}}}"#,
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"claude","arguments":{"cd":"/tmp"}}}"#,
            r#"{"jsonrpc":"2.0","id":6}"#,
            r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#,
        ]);
        assert_eq!(replies[0]["error"]["code"], PARSE_ERROR);
        assert_eq!(replies[0]["id"], Value::Null);
        assert_eq!(replies[1]["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(replies[2]["error"]["code"], INVALID_PARAMS);
        assert_eq!(replies[3]["error"]["code"], INVALID_PARAMS);
        assert_eq!(replies[4]["error"]["code"], INVALID_REQUEST);
        assert_eq!(replies[4]["id"], 6);
        assert_eq!(replies[5]["result"], json!({}));
    }

    #[test]
    fn invalid_utf8_line_gets_parse_error_and_serving_continues() {
        let mut input = vec![0xff, 0xfe, b'\n'];
        input.extend_from_slice(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
        input.push(b'\n');
        let mut output = Vec::new();
        serve(input.as_slice(), &mut output, fake_runner).unwrap();

        let replies: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["error"]["code"], PARSE_ERROR);
        assert_eq!(replies[0]["id"], Value::Null);
        assert_eq!(replies[1]["id"], 1);
        assert_eq!(replies[1]["result"], json!({}));
    }
}
