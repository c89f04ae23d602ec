//! MCP server lifecycle and tool dispatch.
//!
//! 1. **Initialisation**: `initialize` then `notifications/initialized`
//! 2. **Operation**: `tools/list`, `tools/call`, `ping`
//! 3. **Shutdown**: stdin EOF or a termination signal
//!
//! A tool call runs: catalogue lookup, auth guard, request build, cursor
//! check, Graph API call, cursor record, sanitiser. Tool failures are
//! returned as `isError` results carrying the structured error envelope;
//! JSON-RPC errors are reserved for protocol misuse.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::auth::AuthGuard;
use crate::error::{ApiError, ToolError};
use crate::graph::sanitize::sanitize;
use crate::graph::{CursorLedger, GraphClient, ToolRequest};
use crate::mcp::protocol::{
    parse_message, IncomingMessage, InitializeParams, JsonRpcError, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, OutgoingMessage, ToolCallParams, ToolCallResult,
    MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::transport::{LineTransport, StdioTransport};
use crate::tools::{self, ToolSpec};

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for `initialize`.
    AwaitingInit,
    /// `initialize` answered, waiting for `notifications/initialized`.
    Initialising,
    /// Serving tool calls.
    Running,
    /// Shutting down.
    ShuttingDown,
}

#[derive(Debug, Clone, Serialize)]
struct ServerInfo {
    name: &'static str,
    version: &'static str,
}

/// The Meta Ads MCP server.
#[derive(Debug)]
pub struct McpServer {
    state: ServerState,
    guard: AuthGuard,
    client: GraphClient,
    ledger: CursorLedger,
}

impl McpServer {
    /// Creates a server.
    #[must_use]
    pub fn new(guard: AuthGuard, client: GraphClient) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            guard,
            client,
            ledger: CursorLedger::new(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Serves stdio until EOF or a termination signal.
    ///
    /// # Errors
    ///
    /// Returns an error if stdio fails.
    pub async fn run(&mut self) -> std::io::Result<()> {
        let mut transport = StdioTransport::stdio();
        let result = tokio::select! {
            result = self.serve(&mut transport) => result,
            () = shutdown_signal() => Ok(()),
        };
        self.state = ServerState::ShuttingDown;
        result
    }

    /// Serves one transport until EOF.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or writing fails.
    pub async fn serve<R, W>(&mut self, transport: &mut LineTransport<R, W>) -> std::io::Result<()>
    where
        R: tokio::io::AsyncRead + Unpin,
        W: tokio::io::AsyncWrite + Unpin,
    {
        while let Some(line) = transport.read_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(reply) = self.handle_line(&line).await {
                transport.write_message(&reply).await?;
            }
        }
        tracing::info!("stdin closed");
        self.state = ServerState::ShuttingDown;
        Ok(())
    }

    /// Handles one input line; returns the reply, if any.
    pub async fn handle_line(&mut self, line: &str) -> Option<OutgoingMessage> {
        match parse_message(line) {
            Ok(IncomingMessage::Request(req)) => Some(self.handle_request(req).await.into()),
            Ok(IncomingMessage::Notification(notif)) => {
                self.handle_notification(&notif);
                None
            }
            Err(error) => Some(OutgoingMessage::Error(error)),
        }
    }

    async fn handle_request(&mut self, req: JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        tracing::debug!(id = %req.id, method = %req.method, "Request");
        match req.method.as_str() {
            "initialize" => self.handle_initialize(&req),
            "tools/list" => self.handle_tools_list(&req),
            "tools/call" => self.handle_tools_call(&req).await,
            "ping" => Ok(JsonRpcResponse::success(req.id.clone(), json!({}))),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        }
    }

    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        if notif.method == "notifications/initialized" && self.state == ServerState::Initialising {
            tracing::info!("Client initialised");
            self.state = ServerState::Running;
        }
    }

    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::invalid_request(
                Some(req.id.clone()),
                "Server already initialised",
            ));
        }

        let params: InitializeParams = req.parse_params()?;
        tracing::info!(
            client = params.client_info.as_ref().map_or("unknown", |c| c.name.as_str()),
            requested_version = %params.protocol_version,
            "Initialising"
        );

        self.state = ServerState::Initialising;
        let server_info = ServerInfo {
            name: SERVER_NAME,
            version: env!("CARGO_PKG_VERSION"),
        };
        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": server_info,
            }),
        ))
    }

    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(req)?;
        let tools: Vec<_> = tools::catalogue().iter().map(ToolSpec::definition).collect();
        Ok(JsonRpcResponse::success(req.id.clone(), json!({ "tools": tools })))
    }

    async fn handle_tools_call(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(req)?;
        let params: ToolCallParams = req.parse_params()?;

        let result = match tools::find(&params.name) {
            Some(tool) => self.call_tool(tool, params.arguments).await,
            None => ToolCallResult::error(format!("Unknown tool: {}", params.name)),
        };

        let value = serde_json::to_value(&result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool result");
            JsonRpcError::internal_error(req.id.clone(), "failed to serialise tool result")
        })?;
        Ok(JsonRpcResponse::success(req.id.clone(), value))
    }

    fn require_running(&self, req: &JsonRpcRequest) -> Result<(), JsonRpcError> {
        if self.state == ServerState::Running {
            Ok(())
        } else {
            Err(JsonRpcError::invalid_request(
                Some(req.id.clone()),
                "Server not initialised",
            ))
        }
    }

    /// Runs a tool and shapes the outcome; every payload is sanitised here.
    async fn call_tool(&mut self, tool: &'static ToolSpec, arguments: Value) -> ToolCallResult {
        match self.run_tool(tool, arguments).await {
            Ok(payload) => ToolCallResult::json(&sanitize(payload), false),
            Err(e) => {
                tracing::info!(tool = tool.name, kind = e.kind(), "Tool call failed");
                ToolCallResult::json(&sanitize(e.envelope()), true)
            }
        }
    }

    async fn run_tool(&mut self, tool: &'static ToolSpec, arguments: Value) -> Result<Value, ToolError> {
        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => return Err(ApiError::invalid_request("tool arguments must be an object").into()),
        };

        let request = ToolRequest::from_arguments(tool.name, arguments)?;
        let credential = self.guard.guard(&request)?;

        let prepared = self.client.prepare(&tool.endpoint, &request)?;
        let fingerprint = prepared.fingerprint();
        if let Some(cursor) = request.page_cursor() {
            self.ledger.check(cursor, tool.name, &fingerprint)?;
        }

        let response = self
            .client
            .send(&prepared, tool.endpoint.paginated, &credential)
            .await?;

        if let Some(ref cursor) = response.next_page_cursor {
            self.ledger.record(cursor, tool.name, &fingerprint);
        }
        Ok(response.to_value())
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (Ok(mut sigint), Ok(mut sigterm)) = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) else {
        tracing::warn!("Failed to install signal handlers");
        return std::future::pending().await;
    };

    tokio::select! {
        _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down"),
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(windows)]
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Received Ctrl+C, shutting down");
    } else {
        std::future::pending::<()>().await;
    }
}
