//! MCP stdio server exposing a Transmission daemon as tools and resources.

mod args;
mod config;
mod diagnose;
mod format;
mod framing;
mod tools;

use clap::Subcommand;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio::io::{self, AsyncBufRead, AsyncWrite, BufReader};
use transmission_rpc::{ClientError, RpcClient, RpcRequest};

pub use config::DaemonArgs;

use framing::{Framing, Incoming, read_message, write_message};
use tools::{LISTING_FIELDS, tool_definitions};

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const MCP_SERVER_NAME: &str = "transmission-mcp";

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpCommands {
    /// Run the MCP server on stdin/stdout
    Serve,
    /// Check connectivity to the daemon and print a JSON report
    Diagnose,
}

pub async fn run(daemon: &DaemonArgs, command: McpCommands) -> i32 {
    let client = match daemon.build_client() {
        Ok(client) => client,
        Err(err) => {
            let payload = json!({
                "error": "invalid_configuration",
                "message": err.to_string(),
            });
            eprintln!("{}", to_pretty_json(&payload));
            return 1;
        }
    };

    match command {
        McpCommands::Serve => {
            let server = McpServer::new(client);
            match server.serve_stdio().await {
                Ok(()) => 0,
                Err(err) => {
                    let payload = json!({
                        "error": "mcp_server_error",
                        "message": err.to_string(),
                    });
                    eprintln!("{}", to_pretty_json(&payload));
                    1
                }
            }
        }
        McpCommands::Diagnose => {
            let (report, ready) = diagnose::run_diagnostics(&client).await;
            println!("{}", to_pretty_json(&report));
            if ready { 0 } else { 2 }
        }
    }
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Failed to read MCP message: {0}")]
    Read(#[source] std::io::Error),
    #[error("Failed to write MCP response: {0}")]
    Write(#[source] std::io::Error),
}

pub struct McpServer {
    client: RpcClient,
}

impl McpServer {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }

    pub async fn serve_stdio(&self) -> Result<(), ServeError> {
        let mut reader = BufReader::new(io::stdin());
        let mut stdout = io::stdout();
        self.serve(&mut reader, &mut stdout).await
    }

    /// Answer messages from `reader` until EOF.
    pub async fn serve<R, W>(&self, reader: &mut R, writer: &mut W) -> Result<(), ServeError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!(
            server = MCP_SERVER_NAME,
            version = env!("CARGO_PKG_VERSION"),
            endpoint = %self.client.endpoint(),
            "mcp server started"
        );

        loop {
            let Some(incoming) = read_message(reader).await.map_err(ServeError::Read)? else {
                break;
            };

            let (response, framing) = match incoming {
                Incoming::Message(message, framing) => {
                    (self.handle_incoming_message(message).await, framing)
                }
                Incoming::Malformed(framing, reason) => {
                    tracing::warn!(%reason, "discarding malformed mcp message");
                    (
                        Some(error_response(Value::Null, RpcError::parse_error(reason))),
                        framing,
                    )
                }
            };

            if let Some(response) = response {
                write_message(writer, &response, framing)
                    .await
                    .map_err(ServeError::Write)?;
            }
        }

        tracing::info!("mcp server stopped");
        Ok(())
    }

    /// Batches are answered with one array; `None` when nothing needs a reply.
    async fn handle_incoming_message(&self, incoming: Value) -> Option<Value> {
        let Value::Array(batch) = incoming else {
            return self.handle_single_message(incoming).await;
        };

        if batch.is_empty() {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Batch request must not be empty"),
            ));
        }

        let mut responses = Vec::new();
        for item in batch {
            if let Some(response) = self.handle_single_message(item).await {
                responses.push(response);
            }
        }
        if responses.is_empty() {
            None
        } else {
            Some(Value::Array(responses))
        }
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

        // Without a method this is a client response; we never send requests.
        let method = obj.get("method").and_then(Value::as_str)?;

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        match obj.get("id").cloned() {
            Some(id) => Some(match self.handle_request(method, params).await {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            }),
            None => {
                tracing::debug!(method, "mcp notification");
                None
            }
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(self.resources_list_payload()),
            "resources/read" => self.handle_resources_read(params).await,
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "listChanged": false },
                "prompts": { "listChanged": false }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": "Manage the Transmission daemon: add, remove, start and stop torrents, \
                inspect them with get_torrent_info or search_torrents, and tune priority and speed \
                limits. Torrent ids come from search_torrents or the transmission://torrents resource."
        })
    }

    fn tools_list_payload(&self) -> Value {
        let tools: Vec<Value> = tool_definitions()
            .into_iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": tool.input_schema,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
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

        tracing::info!(tool = name, "tool call");
        Ok(match self.execute_tool(name, &args).await {
            Ok(text) => build_tool_call_response(text, false),
            Err(err) => {
                tracing::warn!(
                    tool = name,
                    kind = err.kind(),
                    field = err.field(),
                    error = %err,
                    "tool call failed"
                );
                build_tool_call_response(err.render(name), true)
            }
        })
    }

    fn resources_list_payload(&self) -> Value {
        let resources: Vec<Value> = resource_definitions()
            .into_iter()
            .map(|res| {
                json!({
                    "uri": res.uri,
                    "name": res.name,
                    "description": res.description,
                    "mimeType": "application/json"
                })
            })
            .collect();
        json!({ "resources": resources })
    }

    async fn handle_resources_read(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("resources/read params must be an object"))?;
        let uri = params.get("uri").and_then(Value::as_str).ok_or_else(|| {
            RpcError::invalid_params("resources/read requires string field 'uri'")
        })?;

        let request = match uri {
            "transmission://session" => RpcRequest::new("session-get"),
            "transmission://torrents" => {
                RpcRequest::new("torrent-get").with_argument("fields", json!(LISTING_FIELDS))
            }
            "transmission://stats" => RpcRequest::new("session-stats"),
            _ => return Err(RpcError::invalid_params(format!("Unknown resource URI: {uri}"))),
        };

        let response = self
            .client
            .call(&request)
            .await
            .map_err(|err| resource_failure(uri, &err))?;
        if let Some(reason) = response.failure_reason() {
            return Err(RpcError::internal(format!("Failed to read {uri}: {reason}")));
        }

        Ok(json!({
            "contents": [{
                "uri": uri,
                "mimeType": "application/json",
                "text": to_pretty_json(&Value::Object(response.arguments))
            }]
        }))
    }
}

fn resource_failure(uri: &str, err: &ClientError) -> RpcError {
    tracing::warn!(uri, error = %err, "resource read failed");
    RpcError::internal(format!("Failed to read {uri}: {err}"))
}

struct ResourceDefinition {
    uri: &'static str,
    name: &'static str,
    description: &'static str,
}

fn resource_definitions() -> Vec<ResourceDefinition> {
    vec![
        ResourceDefinition {
            uri: "transmission://session",
            name: "Session",
            description: "Daemon session settings (session-get)",
        },
        ResourceDefinition {
            uri: "transmission://torrents",
            name: "Torrents",
            description: "All torrents with status, transfer rates and tracker stats",
        },
        ResourceDefinition {
            uri: "transmission://stats",
            name: "Statistics",
            description: "Current and cumulative transfer statistics (session-stats)",
        },
    ]
}

fn build_tool_call_response(text: String, is_error: bool) -> Value {
    let mut payload = json!({
        "content": [{ "type": "text", "text": text }]
    });
    if is_error {
        payload["isError"] = Value::Bool(true);
    }
    payload
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
            message: format!("Parse error: {}", message.into()),
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

    fn internal(message: impl Into<String>) -> Self {
        Self {
            code: -32603,
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

pub(crate) fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
