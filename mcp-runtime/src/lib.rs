use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Args, Subcommand};
use devrev_core::InvocationResult;
use devrev_core::catalog::catalog;
use serde_json::{Map, Value, json};
use tokio::io::{
    self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

mod dispatch;
mod guard;
mod normalize;
mod remote;
mod transport;
mod util;

#[cfg(test)]
mod test_support;

pub use dispatch::Dispatcher;
pub use transport::{
    HttpTransport, RemoteRequest, RemoteResponse, RemoteTransport, TransportConfig, TransportError,
};

use util::resolve_api_key;

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const MCP_SERVER_NAME: &str = "devrev-mcp";

#[derive(Subcommand)]
pub enum McpCommands {
    /// Run the DevRev MCP server over stdio
    Serve(McpServeArgs),
    /// Print the tools/list payload and exit
    Tools,
}

#[derive(Args, Clone, Debug)]
pub struct McpServeArgs {
    /// DevRev personal access token
    #[arg(long, env = "DEVREV_API_KEY", hide_env_values = true)]
    pub token: Option<String>,
    /// Per-request timeout against the DevRev API, in seconds
    #[arg(long, env = "DEVREV_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}

pub async fn run(api_url: &str, command: McpCommands) -> i32 {
    match command {
        McpCommands::Serve(args) => {
            let api_key = resolve_api_key(args.token);
            if api_key.is_none() {
                tracing::warn!("no DevRev API key configured; remote calls will fail as unauthorized");
            }
            let transport = HttpTransport::new(TransportConfig {
                api_url: api_url.to_string(),
                api_key,
                timeout: Duration::from_secs(args.timeout_secs),
            });
            let server = McpServer::new(Dispatcher::new(Arc::new(transport)));
            tracing::info!(api_url, tools = catalog().len(), "serving MCP over stdio");
            match server.serve_stdio().await {
                Ok(()) => 0,
                Err(err) => {
                    tracing::error!(error = %err, "MCP server stopped");
                    1
                }
            }
        }
        McpCommands::Tools => {
            println!("{}", to_pretty_json(&tools_list_payload()));
            0
        }
    }
}

/// Wire framing of one message. Replies use the framing of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    ContentLength,
    Line,
}

struct Inbound {
    framing: Framing,
    message: Result<Value, serde_json::Error>,
}

struct Outgoing {
    message: Value,
    framing: Framing,
}

type Outbox = mpsc::UnboundedSender<Outgoing>;

struct McpServer {
    dispatcher: Arc<Dispatcher>,
    /// tools/call tasks by JSON-RPC request id, until they answer or are cancelled.
    in_flight: Arc<Mutex<HashMap<String, AbortHandle>>>,
}

impl McpServer {
    fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn serve_stdio(&self) -> Result<(), String> {
        let mut reader = BufReader::new(io::stdin());
        let (outbox, mut outgoing) = mpsc::unbounded_channel::<Outgoing>();

        let writer = tokio::spawn(async move {
            let mut stdout = io::stdout();
            while let Some(out) = outgoing.recv().await {
                write_message(&mut stdout, &out.message, out.framing).await?;
            }
            Ok::<(), std::io::Error>(())
        });

        loop {
            let inbound = read_message(&mut reader)
                .await
                .map_err(|e| format!("Failed to read MCP message: {e}"))?;
            let Some(inbound) = inbound else {
                break;
            };

            match inbound.message {
                Ok(message) => self.route(message, inbound.framing, &outbox).await,
                Err(err) => {
                    tracing::warn!(error = %err, "discarding malformed MCP message");
                    let _ = outbox.send(Outgoing {
                        message: error_response(Value::Null, RpcError::parse_error(err.to_string())),
                        framing: inbound.framing,
                    });
                }
            }
        }

        // In-flight calls keep their own outbox handles and still get answered.
        drop(outbox);
        writer
            .await
            .map_err(|e| format!("MCP writer task failed: {e}"))?
            .map_err(|e| format!("Failed to write MCP response: {e}"))
    }

    /// tools/call requests run on their own task; everything else is answered inline.
    async fn route(&self, message: Value, framing: Framing, outbox: &Outbox) {
        if let Some((id, params)) = as_tool_call(&message) {
            self.spawn_tool_call(id, params, framing, outbox.clone());
            return;
        }
        for response in self.handle_incoming_message(message).await {
            let _ = outbox.send(Outgoing {
                message: response,
                framing,
            });
        }
    }

    fn spawn_tool_call(&self, id: Value, params: Value, framing: Framing, outbox: Outbox) {
        let key = request_key(&id);
        let dispatcher = Arc::clone(&self.dispatcher);
        let in_flight = Arc::clone(&self.in_flight);
        let task_key = key.clone();

        // Held across spawn so the task cannot finish before it is tracked.
        let mut tracked = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if tracked.contains_key(&key) {
            tracing::warn!(request_id = %key, "rejecting tools/call with an id already in flight");
            let _ = outbox.send(Outgoing {
                message: error_response(
                    id,
                    RpcError::invalid_request(format!("Request id {key} is already in flight")),
                ),
                framing,
            });
            return;
        }
        let task = tokio::spawn(async move {
            let response = match handle_tools_call(&dispatcher, params).await {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            };
            let still_wanted = in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&task_key)
                .is_some();
            if still_wanted {
                let _ = outbox.send(Outgoing {
                    message: response,
                    framing,
                });
            }
        });
        tracked.insert(key, task.abort_handle());
    }

    fn cancel(&self, params: &Value) {
        let Some(request_id) = params.get("requestId") else {
            return;
        };
        let key = request_key(request_id);
        let handle = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key);
        if let Some(handle) = handle {
            handle.abort();
            let reason = params.get("reason").and_then(|reason| reason.as_str());
            tracing::info!(request_id = %key, reason, "tool call cancelled");
        }
    }

    async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A client response; this server never issues requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            let result = self.handle_request(method, params).await;
            Some(match result {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            })
        } else {
            self.handle_notification(method, &params);
            None
        }
    }

    fn handle_notification(&self, method: &str, params: &Value) {
        if method == "notifications/cancelled" {
            self.cancel(params);
        }
        // Other notifications, including notifications/initialized, need no action.
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(tools_list_payload()),
            "tools/call" => handle_tools_call(&self.dispatcher, params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }
}

fn as_tool_call(message: &Value) -> Option<(Value, Value)> {
    let obj = message.as_object()?;
    if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0")
        || obj.get("method").and_then(Value::as_str) != Some("tools/call")
    {
        return None;
    }
    let id = obj.get("id")?.clone();
    Some((id, obj.get("params").cloned().unwrap_or(Value::Null)))
}

/// Request ids compare by their JSON text, so `1` and `"1"` stay distinct.
fn request_key(id: &Value) -> String {
    id.to_string()
}

fn initialize_payload() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {
            "tools": {
                "listChanged": false
            },
            "resources": {
                "listChanged": false
            },
            "prompts": {
                "listChanged": false
            }
        },
        "serverInfo": {
            "name": MCP_SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        },
        "instructions": "Use search to find DevRev ids, then get_/create_/update_ tools on works and parts. list_* tools return one page; pass next_cursor back as cursor until it is absent. Before changing a stage, valid_stage_transition lists the legal targets; update_work and update_part reject illegal stage changes without modifying anything."
    })
}

pub fn tools_list_payload() -> Value {
    let tools: Vec<Value> = catalog()
        .iter()
        .map(|spec| {
            json!({
                "name": spec.name(),
                "description": spec.description,
                "inputSchema": spec.input_schema(),
            })
        })
        .collect();
    json!({ "tools": tools })
}

async fn handle_tools_call(dispatcher: &Dispatcher, params: Value) -> Result<Value, RpcError> {
    let params = params
        .as_object()
        .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

    let args = match params.get("arguments") {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::Null) | None => Map::new(),
        Some(_) => {
            return Err(RpcError::invalid_params(
                "tools/call 'arguments' must be an object",
            ));
        }
    };

    let result = dispatcher.dispatch(name, &args).await;
    Ok(build_tool_call_response(name, result))
}

fn build_tool_call_response(tool_name: &str, result: InvocationResult) -> Value {
    let (envelope, is_error) = match result {
        InvocationResult::Success { payload } => (
            json!({
                "status": "complete",
                "tool": tool_name,
                "data": payload
            }),
            false,
        ),
        InvocationResult::Failure(failure) => (
            json!({
                "status": "error",
                "tool": tool_name,
                "error": failure
            }),
            true,
        ),
    };
    let text = tool_text_content(&envelope);

    if is_error {
        json!({
            "isError": true,
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    } else {
        json!({
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    }
}

fn tool_text_content(envelope: &Value) -> String {
    // Agents often read only the text block, so it carries the full envelope.
    to_pretty_json(envelope)
}

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}

/// Reads one message, either `Content-Length` framed or a single JSON line.
/// `Ok(None)` is a clean end of input.
async fn read_message<R>(reader: &mut R) -> Result<Option<Inbound>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            if !saw_header {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }

        let trimmed = line.trim();
        if !saw_header && (trimmed.starts_with('{') || trimmed.starts_with('[')) {
            return Ok(Some(Inbound {
                framing: Framing::Line,
                message: serde_json::from_str(trimmed),
            }));
        }
        if trimmed.is_empty() {
            if saw_header {
                break;
            }
            continue;
        }

        saw_header = true;
        if trimmed.to_ascii_lowercase().starts_with("content-length:") {
            let raw_len = trimmed
                .split_once(':')
                .map(|(_, right)| right.trim())
                .unwrap_or_default();
            let parsed = raw_len.parse::<usize>().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "Invalid Content-Length header",
                )
            })?;
            content_length = Some(parsed);
        }
    }

    let content_length = content_length.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Missing Content-Length header",
        )
    })?;
    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;

    Ok(Some(Inbound {
        framing: Framing::ContentLength,
        message: serde_json::from_slice(&payload),
    }))
}

async fn write_message<W>(writer: &mut W, value: &Value, framing: Framing) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
        Framing::Line => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
    }
    writer.flush().await?;
    Ok(())
}

fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
