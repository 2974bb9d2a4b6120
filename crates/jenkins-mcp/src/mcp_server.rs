use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};
use ulid::Ulid;

use crate::app::App;
use crate::tool_defs::get_tools;
use crate::tools;

const PROTOCOL_VERSION: &str = "2024-11-05";
const HEALTH_URI: &str = "status://health";

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;

/// MCP server implementation
///
/// Exposes Jenkins as MCP tools over JSON-RPC 2.0 on stdio.
pub(crate) async fn run_mcp_server(app: Arc<App>) -> Result<()> {
    info!("Starting MCP server on stdio");
    serve(app, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
    info!("MCP server shutting down");
    Ok(())
}

/// Answer newline-delimited requests from `reader` until end of input.
///
/// Every request runs in its own task, so a slow call (a batch waiting for
/// completion, a read backing off between retries) does not hold up the
/// others. Responses are written by this loop alone, one line each, in
/// completion order. Requests still in flight at end of input are answered
/// before returning.
pub(crate) async fn serve<R, W>(app: Arc<App>, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut in_flight: JoinSet<Option<JsonRpcResponse>> = JoinSet::new();
    let mut input_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => {
                let Some(line) = line.context("Failed to read line from stdin")? else {
                    debug!(pending = in_flight.len(), "End of input");
                    input_open = false;
                    continue;
                };
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                debug!("Received: {}", trimmed);

                match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                    Ok(request) => {
                        let app = app.clone();
                        in_flight.spawn(async move { handle_request(&app, request).await });
                    }
                    Err(e) => {
                        error!("Failed to parse JSON-RPC request: {}", e);
                        let response =
                            JsonRpcResponse::failure(None, PARSE_ERROR, format!("Parse error: {e}"));
                        write_response(&mut writer, &response).await?;
                    }
                }
            }
            Some(joined) = in_flight.join_next() => match joined {
                Ok(Some(response)) => write_response(&mut writer, &response).await?,
                Ok(None) => {}
                Err(e) => error!(error = %e, "Request task failed"),
            },
            else => break,
        }
    }
    Ok(())
}

/// JSON-RPC 2.0 Request
#[derive(Deserialize)]
struct JsonRpcRequest {
    #[serde(default)]
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Option<Value>,
    id: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Option<Value>,
}

/// JSON-RPC 2.0 Error
#[derive(Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    fn failure(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
            id,
        }
    }
}

/// Error answered to the caller as a JSON-RPC error object.
struct RpcFailure {
    code: i32,
    message: String,
}

impl RpcFailure {
    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: message.into(),
        }
    }
}

/// Handle one request. Notifications (no `id`) get no response.
async fn handle_request(app: &App, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
    let Some(id) = request.id else {
        debug!(method = %request.method, "Handling notification");
        return None;
    };
    let id = Some(id);

    if request.jsonrpc != "2.0" {
        return Some(JsonRpcResponse::failure(
            id,
            INVALID_REQUEST,
            "Invalid request: jsonrpc must be \"2.0\"",
        ));
    }

    let outcome = match request.method.as_str() {
        "initialize" => {
            debug!("Handling initialize");
            Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {},
                    "resources": {}
                },
                "serverInfo": {
                    "name": "jenkins-mcp",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }))
        }
        "ping" | "shutdown" => Ok(json!({})),
        "tools/list" => {
            debug!("Handling tools/list");
            Ok(json!({ "tools": get_tools() }))
        }
        "tools/call" => handle_tool_call(app, request.params).await,
        "resources/list" => Ok(json!({
            "resources": [{
                "uri": HEALTH_URI,
                "name": "health",
                "description": "Connectivity to the configured Jenkins controller",
                "mimeType": "application/json"
            }]
        })),
        "resources/read" => handle_resource_read(app, request.params).await,
        other => Err(RpcFailure {
            code: METHOD_NOT_FOUND,
            message: format!("Method not found: {other}"),
        }),
    };

    Some(match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(failure) => JsonRpcResponse::failure(id, failure.code, failure.message),
    })
}

/// Handle tool call
///
/// Tool failures are reported inside the result with `isError`; only a
/// malformed call or an unknown tool is a JSON-RPC error.
async fn handle_tool_call(app: &App, params: Option<Value>) -> Result<Value, RpcFailure> {
    let params = params.ok_or_else(|| RpcFailure::invalid_params("Missing params for tools/call"))?;
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcFailure::invalid_params("Missing tool name"))?;
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    let request_id = Ulid::new();
    let span = info_span!("tool_call", %request_id, tool = name);
    async move {
        debug!(arguments = %arguments, "tool call");
        let started = tokio::time::Instant::now();
        let Some(result) = tools::call_tool(app, name, arguments).await else {
            warn!("unknown tool");
            return Err(RpcFailure::invalid_params(format!("Unknown tool: {name}")));
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(match result {
            Ok(body) => {
                info!(elapsed_ms, "tool call succeeded");
                tools::tool_content(&body, false)
            }
            Err(e) => {
                warn!(elapsed_ms, kind = e.kind(), error = %e, "tool call failed");
                tools::tool_content(&tools::error_payload(&e), true)
            }
        })
    }
    .instrument(span)
    .await
}

async fn handle_resource_read(app: &App, params: Option<Value>) -> Result<Value, RpcFailure> {
    let uri = params
        .as_ref()
        .and_then(|p| p.get("uri"))
        .and_then(Value::as_str)
        .ok_or_else(|| RpcFailure::invalid_params("Missing resource uri"))?;
    if uri != HEALTH_URI {
        return Err(RpcFailure::invalid_params(format!("Unknown resource: {uri}")));
    }
    let body = tools::health_check(app).await;
    Ok(json!({
        "contents": [{
            "uri": HEALTH_URI,
            "mimeType": "application/json",
            "text": body.to_string()
        }]
    }))
}

/// Write JSON-RPC response
async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &JsonRpcResponse,
) -> Result<()> {
    let mut line = serde_json::to_vec(response).context("Failed to serialize response")?;
    line.push(b'\n');
    writer
        .write_all(&line)
        .await
        .context("Failed to write response")?;
    writer.flush().await.context("Failed to flush stdout")?;
    Ok(())
}

#[cfg(test)]
#[path = "mcp_server_tests.rs"]
mod tests;
