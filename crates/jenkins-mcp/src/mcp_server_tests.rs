use super::*;
use std::time::Duration;

use jmcp_client::ScriptedClient;
use tokio::io::AsyncWriteExt;

use crate::tools::test_support::scripted_app;

fn scripted_server() -> (Arc<App>, Arc<ScriptedClient>) {
    let (app, client) = scripted_app();
    (Arc::new(app), client)
}

/// Feed `input` lines through the server and parse every output line.
async fn exchange(app: &Arc<App>, input: &str) -> Vec<Value> {
    let mut output = Vec::new();
    serve(app.clone(), input.as_bytes(), &mut output).await.unwrap();
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// Responses arrive in completion order; find the one answering `id`.
fn reply(out: &[Value], id: Value) -> &Value {
    out.iter()
        .find(|response| response["id"] == id)
        .unwrap_or_else(|| panic!("no response with id {id} in {out:?}"))
}

fn tool_body(response: &Value) -> Value {
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[tokio::test]
async fn test_initialize_advertises_tools_and_resources() {
    let (app, _client) = scripted_server();
    let out = exchange(
        &app,
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
    )
    .await;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["id"], 1);
    assert_eq!(out[0]["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(out[0]["result"]["serverInfo"]["name"], "jenkins-mcp");
    assert!(out[0]["result"]["capabilities"]["resources"].is_object());
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let (app, _client) = scripted_server();
    let input = concat!(
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        "\n\n",
        r#"{"jsonrpc":"2.0","id":"x","method":"ping"}"#,
        "\n"
    );
    let out = exchange(&app, input).await;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["id"], "x");
    assert_eq!(out[0]["result"], json!({}));
}

#[tokio::test]
async fn test_parse_error_and_unknown_method() {
    let (app, _client) = scripted_server();
    let input = concat!(
        "{not json\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/destroy"}"#,
        "\n"
    );
    let out = exchange(&app, input).await;
    assert_eq!(out.len(), 2);
    assert_eq!(reply(&out, Value::Null)["error"]["code"], -32700);
    assert_eq!(reply(&out, json!(2))["error"]["code"], -32601);
}

#[tokio::test]
async fn test_wrong_protocol_version_is_invalid_request() {
    let (app, _client) = scripted_server();
    let out = exchange(&app, r#"{"jsonrpc":"1.0","id":3,"method":"ping"}"#).await;
    assert_eq!(out[0]["error"]["code"], -32600);
}

#[tokio::test]
async fn test_tools_list_matches_definitions() {
    let (app, _client) = scripted_server();
    let out = exchange(&app, r#"{"jsonrpc":"2.0","id":4,"method":"tools/list"}"#).await;
    let tools = out[0]["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), get_tools().len());
    assert!(tools.iter().all(|t| t["inputSchema"].is_object()));
}

#[tokio::test]
async fn test_tool_call_success_and_unknown_tool() {
    let (app, _client) = scripted_server();
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"trigger_job","arguments":{"job_name":"deploy"}}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{"name":"nope"}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":7,"method":"tools/call"}"#,
        "\n"
    );
    let out = exchange(&app, input).await;
    assert_eq!(out.len(), 3);

    let triggered = reply(&out, json!(5));
    assert!(triggered["result"].get("isError").is_none());
    assert_eq!(tool_body(triggered)["status"], "Triggered");
    let unknown = reply(&out, json!(6));
    assert_eq!(unknown["error"]["code"], -32602);
    assert_eq!(unknown["error"]["message"], "Unknown tool: nope");
    assert_eq!(reply(&out, json!(7))["error"]["code"], -32602);
}

#[tokio::test]
async fn test_tool_failure_is_structured_error_result() {
    let (app, _client) = scripted_server();
    let out = exchange(
        &app,
        r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"batch_monitor_jobs","arguments":{"operation_id":"6f0e4c55-3f43-4c8e-9a53-2b0b6f5d8a11"}}}"#,
    )
    .await;
    assert_eq!(out[0]["result"]["isError"], true);
    let body = tool_body(&out[0]);
    assert_eq!(body["error"]["kind"], "operation_not_found");
    assert!(out[0].get("error").is_none());
}

#[tokio::test]
async fn test_end_to_end_batch_over_json_rpc() {
    let (app, client) = scripted_server();
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":9,"method":"tools/call","params":{"name":"batch_trigger_jobs","arguments":{"operations":[{"job_name":"a","priority":1},{"job_name":"b","priority":2}],"max_concurrent":1,"wait_for_completion":true}}}"#,
        "\n"
    );
    let out = exchange(&app, input).await;
    let body = tool_body(&out[0]);
    assert_eq!(body["status"], "COMPLETED");
    assert_eq!(body["counts"]["succeeded"], 2);
    assert_eq!(client.trigger_order(), vec!["a".to_string(), "b".to_string()]);

    let id = body["operation_id"].as_str().unwrap();
    let monitor = format!(
        r#"{{"jsonrpc":"2.0","id":10,"method":"tools/call","params":{{"name":"batch_monitor_jobs","arguments":{{"operation_id":"{id}"}}}}}}"#
    );
    let out = exchange(&app, &monitor).await;
    assert_eq!(tool_body(&out[0])["status"], "COMPLETED");
}

#[tokio::test]
async fn test_health_resource() {
    let (app, _client) = scripted_server();
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":11,"method":"resources/list"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":12,"method":"resources/read","params":{"uri":"status://health"}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":13,"method":"resources/read","params":{"uri":"status://other"}}"#,
        "\n"
    );
    let out = exchange(&app, input).await;
    assert_eq!(
        reply(&out, json!(11))["result"]["resources"][0]["uri"],
        "status://health"
    );
    let text = reply(&out, json!(12))["result"]["contents"][0]["text"]
        .as_str()
        .unwrap();
    let health: Value = serde_json::from_str(text).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(reply(&out, json!(13))["error"]["code"], -32602);
}

async fn send(writer: &mut (impl AsyncWrite + Unpin), request: Value) {
    let mut line = request.to_string();
    line.push('\n');
    writer.write_all(line.as_bytes()).await.unwrap();
}

async fn next_reply(lines: &mut tokio::io::Lines<impl AsyncBufRead + Unpin>) -> Value {
    let line = lines.next_line().await.unwrap().expect("server closed output");
    serde_json::from_str(&line).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_waiting_batch_does_not_block_other_requests() {
    let (app, client) = scripted_server();
    client.set_default_trigger_delay(Duration::from_secs(3));

    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_end);
    let server = tokio::spawn(serve(app, BufReader::new(server_read), server_write));
    let (client_read, mut requests) = tokio::io::split(client_end);
    let mut replies = BufReader::new(client_read).lines();

    send(
        &mut requests,
        json!({
            "jsonrpc": "2.0", "id": 1, "method": "tools/call",
            "params": {"name": "batch_trigger_jobs", "arguments": {
                "operations": [{"job_name": "a"}, {"job_name": "b"}],
                "max_concurrent": 1,
                "wait_for_completion": true
            }}
        }),
    )
    .await;
    send(&mut requests, json!({"jsonrpc": "2.0", "id": 2, "method": "ping"})).await;
    assert_eq!(next_reply(&mut replies).await["id"], 2);

    send(
        &mut requests,
        json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": {"name": "batch_list_operations"}
        }),
    )
    .await;
    let listed = next_reply(&mut replies).await;
    assert_eq!(listed["id"], 3);
    let operation_id = tool_body(&listed)["operations"][0]["operation_id"]
        .as_str()
        .unwrap()
        .to_string();

    send(
        &mut requests,
        json!({
            "jsonrpc": "2.0", "id": 4, "method": "tools/call",
            "params": {"name": "batch_cancel_jobs", "arguments": {
                "operation_id": operation_id,
                "cancel_running_builds": true
            }}
        }),
    )
    .await;
    let cancelled = next_reply(&mut replies).await;
    assert_eq!(cancelled["id"], 4);
    assert_eq!(tool_body(&cancelled)["counts"]["cancelled"], 1);

    let waited = next_reply(&mut replies).await;
    assert_eq!(waited["id"], 1);
    let body = tool_body(&waited);
    assert_eq!(body["status"], "CANCELLED");
    assert_eq!(body["results"][0]["state"], "SUCCEEDED");
    assert_eq!(body["results"][1]["state"], "CANCELLED");
    assert_eq!(client.trigger_order(), vec!["a".to_string()]);

    drop(requests);
    server.await.unwrap().unwrap();
}
