/// MCP protocol conformance tests: an in-process server driven with raw
/// JSON lines, plus a smoke test of the real binary over stdio.
use agrama::mcp::McpServer;
use agrama::{AgramaConfig, HashEmbedder, PrimitiveEngine};
use serde_json::{json, Value};
use std::sync::Arc;

fn server() -> McpServer {
    let config = AgramaConfig::default()
        .vector_dimensions(32)
        .matryoshka_dims(vec![8, 32]);
    let engine = PrimitiveEngine::with_embedder(config, Arc::new(HashEmbedder::new(32))).unwrap();
    McpServer::new(engine)
}

fn roundtrip(server: &mut McpServer, line: &str) -> Value {
    let response = server.handle_line(line).expect("expected a response");
    serde_json::to_value(&response).unwrap()
}

#[test]
fn test_full_handshake_and_call() {
    let mut server = server();

    let init = roundtrip(
        &mut server,
        r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}"#,
    );
    assert_eq!(init["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(init["id"], 0);

    // The initialized notification is consumed silently
    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"initialized"}"#)
        .is_none());

    let list = roundtrip(&mut server, r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#);
    assert_eq!(list["result"]["tools"].as_array().unwrap().len(), 5);

    let call = roundtrip(
        &mut server,
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"store","arguments":{"key":"greeting","value":"hello"}}}"#,
    );
    assert_eq!(call["result"]["isError"], false);
    let payload: Value =
        serde_json::from_str(call["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(payload["success"], true);
    assert_eq!(payload["key"], "greeting");

    let retrieve = roundtrip(
        &mut server,
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"retrieve","arguments":{"key":"greeting"}}}"#,
    );
    let payload: Value =
        serde_json::from_str(retrieve["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(payload["value"], "hello");
}

#[test]
fn test_standard_error_codes() {
    let mut server = server();

    // Parse error
    let response = roundtrip(&mut server, "{not json");
    assert_eq!(response["error"]["code"], -32700);
    assert_eq!(response["id"], Value::Null);

    // Invalid request (missing jsonrpc version)
    let response = roundtrip(&mut server, r#"{"id":1,"method":"tools/list"}"#);
    assert_eq!(response["error"]["code"], -32600);

    // Method not found
    let response = roundtrip(
        &mut server,
        r#"{"jsonrpc":"2.0","id":2,"method":"resources/list"}"#,
    );
    assert_eq!(response["error"]["code"], -32601);

    // Invalid params (validation failure inside the engine)
    let response = roundtrip(
        &mut server,
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"store","arguments":{"key":""}}}"#,
    );
    assert_eq!(response["error"]["code"], -32602);

    // Server error (execution failure: history of a missing key)
    let response = roundtrip(
        &mut server,
        r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"search","arguments":{"query":"q","type":"semantic","options":{"embedding":[1.0,0.0]}}}}"#,
    );
    assert_eq!(response["error"]["code"], -32000);
    assert_eq!(response["error"]["data"], "DimensionMismatch");
}

#[test]
fn test_responses_carry_exactly_one_of_result_or_error() {
    let mut server = server();
    let lines = [
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#,
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
        r#"{"jsonrpc":"2.0","id":3,"method":"bogus"}"#,
        r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"transform","arguments":{"operation":"evil","data":"x"}}}"#,
    ];
    for line in lines {
        let value = roundtrip(&mut server, line);
        let has_result = value.get("result").is_some();
        let has_error = value.get("error").is_some();
        assert!(has_result ^ has_error, "{line}");
    }
}

#[test]
fn test_unknown_tool_name() {
    let mut server = server();
    let response = roundtrip(
        &mut server,
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"teleport","arguments":{}}}"#,
    );
    assert_eq!(response["error"]["code"], -32602);
    assert_eq!(response["error"]["data"], "UnsupportedOperation");
}

#[test]
fn test_tools_call_missing_name() {
    let mut server = server();
    let response = roundtrip(
        &mut server,
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"arguments":{}}}"#,
    );
    assert_eq!(response["error"]["code"], -32602);
}

#[test]
fn test_jsonrpc_batch_request() {
    let mut server = server();
    let batch = r#"[
        {"jsonrpc":"2.0","id":"a","method":"tools/call","params":{"name":"store","arguments":{"key":"x","value":"1"}}},
        {"jsonrpc":"2.0","id":"b","method":"tools/call","params":{"name":"store","arguments":{"key":"","value":"1"}}},
        {"jsonrpc":"2.0","id":"c","method":"tools/call","params":{"name":"retrieve","arguments":{"key":"x"}}}
    ]"#;

    let raw = server.handle_raw(batch).unwrap();
    let responses: Vec<Value> = serde_json::from_str(&raw).unwrap();
    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["id"], "a");
    assert!(responses[0]["result"].is_object());
    assert_eq!(responses[1]["error"]["code"], -32602);
    // The failed middle item did not abort the batch
    let text = responses[2]["result"]["content"][0]["text"].as_str().unwrap();
    let payload: Value = serde_json::from_str(text).unwrap();
    assert_eq!(payload["value"], "1");
}

#[test]
fn test_batch_of_lines_in_order() {
    let mut server = server();
    let mut ids = Vec::new();
    for i in 0..5 {
        let line = json!({
            "jsonrpc": "2.0",
            "id": i,
            "method": "tools/call",
            "params": {"name": "store", "arguments": {"key": format!("k{i}"), "value": "v"}}
        })
        .to_string();
        let response = roundtrip(&mut server, &line);
        ids.push(response["id"].as_i64().unwrap());
    }
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_serve_loop_over_stdio() {
    use assert_cmd::Command;
    use predicates::prelude::*;

    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","method":"initialized"}"#,
        "\n",
        "garbage line\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"store","arguments":{"key":"k","value":"v"}}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"retrieve","arguments":{"key":"k"}}}"#,
        "\n",
    );

    Command::cargo_bin("agrama")
        .unwrap()
        .args(["--dims", "32", "serve"])
        .write_stdin(input)
        .assert()
        .success()
        // The garbage line is answered in-band and the loop keeps going
        .stdout(predicate::str::contains("-32700"))
        .stdout(predicate::str::contains("\"protocolVersion\":\"2024-11-05\""))
        .stdout(predicate::str::contains("exists"));
}
