//! Line-delimited JSON-RPC 2.0 over stdin/stdout.
//!
//! Stdout discipline is absolute: the only bytes this process ever writes
//! to stdout are the framed responses produced here. All diagnostics go to
//! stderr through tracing. A peer that keeps sending unparseable frames or
//! non-UTF-8 input is a protocol violation and terminates the server with
//! exit code 2; everything else is answered in-band and the loop continues.

use engram_core::dispatch::{Dispatcher, ToolOutput};
use engram_core::error::EngramError;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// MCP protocol revision answered in the `initialize` handshake.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Consecutive unparseable frames tolerated before the peer is declared
/// broken.
const MAX_CONSECUTIVE_PARSE_FAILURES: u32 = 100;

/// Exit codes per the process contract.
pub const EXIT_OK: i32 = 0;
pub const EXIT_PROTOCOL_VIOLATION: i32 = 2;

/// Run the transport over stdin/stdout until EOF, `shutdown`, or a protocol
/// violation. Returns the process exit code.
pub async fn run(dispatcher: &Dispatcher) -> i32 {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve(dispatcher, stdin, stdout).await
}

/// Transport loop over arbitrary streams (tests drive this with pipes).
pub async fn serve<R, W>(dispatcher: &Dispatcher, mut reader: R, mut writer: W) -> i32
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut parse_failures: u32 = 0;
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                tracing::info!("stdin closed; shutting down");
                return EXIT_OK;
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                tracing::error!("non-UTF-8 input on stdin; protocol violation");
                return EXIT_PROTOCOL_VIOLATION;
            }
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                return EXIT_OK;
            }
        }

        if line.trim().is_empty() {
            continue;
        }

        let (response, shutdown) = handle_line(dispatcher, &line).await;
        match &response {
            Some(value) => {
                parse_failures = if is_parse_error(value) {
                    parse_failures + 1
                } else {
                    0
                };
                if write_frame(&mut writer, value).await.is_err() {
                    tracing::error!("stdout write failed; shutting down");
                    return EXIT_OK;
                }
            }
            None => parse_failures = 0,
        }

        if parse_failures >= MAX_CONSECUTIVE_PARSE_FAILURES {
            tracing::error!("peer keeps sending unparseable frames; protocol violation");
            return EXIT_PROTOCOL_VIOLATION;
        }
        if shutdown {
            return EXIT_OK;
        }
    }
}

/// One frame in, at most one frame out. Notifications produce no response.
pub async fn handle_line(dispatcher: &Dispatcher, line: &str) -> (Option<Value>, bool) {
    let request: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable frame");
            return (Some(parse_error_response(e.to_string())), false);
        }
    };

    let id = request.get("id").cloned();
    let Some(method) = request.get("method").and_then(Value::as_str) else {
        return (
            Some(error_response(
                id.unwrap_or(Value::Null),
                -32600,
                "missing 'method'",
                None,
            )),
            false,
        );
    };
    let params = request.get("params").cloned().unwrap_or(json!({}));

    // Notifications get processed where meaningful but never answered.
    let Some(id) = id else {
        if method == "notifications/initialized" || method.starts_with("notifications/") {
            return (None, false);
        }
        tracing::debug!(%method, "ignoring unknown notification");
        return (None, false);
    };

    match method {
        "initialize" => (
            Some(result_response(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": { "listChanged": true } },
                    "serverInfo": {
                        "name": "engram",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )),
            false,
        ),
        "ping" => (Some(result_response(id, json!({}))), false),
        "tools/list" => {
            let tools = dispatcher.list_tools();
            (Some(result_response(id, json!({ "tools": tools }))), false)
        }
        "tools/call" => {
            let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
            if name.is_empty() {
                return (
                    Some(error_response(id, -32602, "missing tool 'name'", None)),
                    false,
                );
            }
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
            match dispatcher.dispatch(name, arguments).await {
                Ok(output) => (Some(result_response(id, tool_result(output))), false),
                Err(e) => (Some(engram_error_response(id, &e)), false),
            }
        }
        "shutdown" => (Some(result_response(id, Value::Null)), true),
        other => (
            Some(error_response(
                id,
                -32601,
                &format!("unknown method '{other}'"),
                None,
            )),
            false,
        ),
    }
}

fn tool_result(output: ToolOutput) -> Value {
    let mut result = json!({
        "content": [ { "type": "text", "text": output.text } ],
        "isError": false,
    });
    if let Some(data) = output.data {
        result["structuredContent"] = data;
    }
    result
}

fn result_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: Value, code: i64, message: &str, data: Option<Value>) -> Value {
    let mut error = json!({ "code": code, "message": message });
    if let Some(data) = data {
        error["data"] = data;
    }
    json!({ "jsonrpc": "2.0", "id": id, "error": error })
}

fn engram_error_response(id: Value, error: &EngramError) -> Value {
    let kind = error.kind();
    let mut data = json!({ "kind": kind.as_str() });
    if let Some(field) = error.field() {
        data["field"] = Value::String(field.to_string());
    }
    error_response(id, kind.json_rpc_code(), &error.to_string(), Some(data))
}

fn parse_error_response(detail: String) -> Value {
    error_response(
        Value::Null,
        -32700,
        &format!("parse error: {detail}"),
        Some(json!({ "kind": "parse-error" })),
    )
}

fn is_parse_error(response: &Value) -> bool {
    response
        .pointer("/error/code")
        .and_then(Value::as_i64)
        .is_some_and(|code| code == -32700)
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, value: &Value) -> std::io::Result<()> {
    let mut frame = serde_json::to_string(value).map_err(std::io::Error::other)?;
    frame.push('\n');
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::Engine;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn fixture(dir: &TempDir) -> Dispatcher {
        let engine = Arc::new(
            Engine::init_with(dir.path().to_path_buf(), false, false)
                .await
                .unwrap(),
        );
        Dispatcher::new(engine)
    }

    #[tokio::test]
    async fn initialize_handshake() {
        let dir = TempDir::new().unwrap();
        let d = fixture(&dir).await;
        let (response, shutdown) = handle_line(
            &d,
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        )
        .await;
        assert!(!shutdown);
        let response = response.unwrap();
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(response["result"]["serverInfo"]["name"], "engram");
    }

    #[tokio::test]
    async fn tools_list_reports_the_catalog() {
        let dir = TempDir::new().unwrap();
        let d = fixture(&dir).await;
        let (response, _) = handle_line(
            &d,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
        )
        .await;
        let tools = response.unwrap()["result"]["tools"].clone();
        let names: Vec<&str> = tools
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"add_memory"));
        assert!(names.contains(&"generate_dropoff"));
        assert!(tools[0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn tools_call_round_trip() {
        let dir = TempDir::new().unwrap();
        let d = fixture(&dir).await;
        let (response, _) = handle_line(
            &d,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"add_memory","arguments":{"content":"Remember X"}}}"#,
        )
        .await;
        let result = response.unwrap()["result"].clone();
        assert_eq!(result["isError"], false);
        assert!(result["content"][0]["text"].as_str().unwrap().contains("✅"));
        assert!(result["structuredContent"]["id"].is_string());
    }

    #[tokio::test]
    async fn errors_carry_stable_codes_and_kinds() {
        let dir = TempDir::new().unwrap();
        let d = fixture(&dir).await;

        let (response, _) = handle_line(&d, "this is not json").await;
        let response = response.unwrap();
        assert_eq!(response["error"]["code"], -32700);
        assert_eq!(response["id"], Value::Null);

        let (response, _) = handle_line(
            &d,
            r#"{"jsonrpc":"2.0","id":4,"method":"no/such/method"}"#,
        )
        .await;
        assert_eq!(response.unwrap()["error"]["code"], -32601);

        let (response, _) = handle_line(
            &d,
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"nope","arguments":{}}}"#,
        )
        .await;
        let response = response.unwrap();
        assert_eq!(response["error"]["code"], -32006);
        assert_eq!(response["error"]["data"]["kind"], "tool-not-found");

        let (response, _) = handle_line(
            &d,
            r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{"name":"get_memory","arguments":{"id":"missing"}}}"#,
        )
        .await;
        let response = response.unwrap();
        assert_eq!(response["error"]["code"], -32001);
        assert_eq!(response["error"]["data"]["kind"], "not-found");
    }

    #[tokio::test]
    async fn notifications_produce_no_frame() {
        let dir = TempDir::new().unwrap();
        let d = fixture(&dir).await;
        let (response, _) = handle_line(
            &d,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        )
        .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn shutdown_ends_the_loop() {
        let dir = TempDir::new().unwrap();
        let d = fixture(&dir).await;
        let (response, shutdown) =
            handle_line(&d, r#"{"jsonrpc":"2.0","id":9,"method":"shutdown"}"#).await;
        assert!(shutdown);
        assert_eq!(response.unwrap()["result"], Value::Null);
    }

    /// Stdout purity: run a whole fixture of operations through the serve
    /// loop and require every byte of output to be part of a well-formed
    /// response frame.
    #[tokio::test]
    async fn serve_emits_only_wellformed_frames() {
        let dir = TempDir::new().unwrap();
        let d = fixture(&dir).await;

        let input = [
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"add_memory","arguments":{"content":"stdout purity"}}}"#,
            "garbage line that is not json",
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"list_memories","arguments":{}}}"#,
            r#"{"jsonrpc":"2.0","id":5,"method":"shutdown"}"#,
        ]
        .join("\n")
            + "\n";

        let reader = std::io::Cursor::new(input.into_bytes());
        let mut output = std::io::Cursor::new(Vec::new());
        let code = serve(&d, reader, &mut output).await;
        assert_eq!(code, EXIT_OK);

        let text = String::from_utf8(output.into_inner()).expect("stdout must be UTF-8");
        let mut ids_seen = Vec::new();
        for line in text.lines() {
            let frame: Value =
                serde_json::from_str(line).expect("every stdout line must be a JSON frame");
            assert_eq!(frame["jsonrpc"], "2.0");
            assert!(
                frame.get("result").is_some() || frame.get("error").is_some(),
                "frame must be a response: {frame}"
            );
            ids_seen.push(frame["id"].clone());
        }
        // initialize, tools/list, add, parse error, list, shutdown.
        assert_eq!(ids_seen.len(), 6);
    }
}
