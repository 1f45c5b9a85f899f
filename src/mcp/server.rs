//! MCP Server Implementation
//!
//! Line-delimited JSON-RPC over stdio. Each request runs in its own task and responses
//! are serialized through a shared writer, so a slow analysis does not block `ping`.

use crate::mcp::errors::{McpError, McpResult};
use crate::mcp::protocol::*;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// MCP Server state and configuration
pub struct McpServer {
    /// Server implementation information
    pub server_info: Implementation,
    /// Server capabilities
    pub capabilities: ServerCapabilities,
    /// Registered tools
    pub tools: Arc<RwLock<HashMap<String, Tool>>>,
    /// Tool handlers
    pub tool_handlers: Arc<RwLock<HashMap<String, Arc<dyn ToolHandler>>>>,
    /// Connection state
    pub connection_state: Arc<RwLock<ConnectionState>>,
}

/// Connection state tracking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Tool handler trait for implementing tool execution
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, params: CallToolParams) -> McpResult<CallToolResult>;
}

/// Message handler for processing incoming messages
pub struct MessageHandler {
    server: Arc<McpServer>,
}

/// Parse one line of input into a JSON-RPC message
#[inline]
pub fn parse_message(line: &str) -> McpResult<JsonRpcMessage> {
    let raw: Value = serde_json::from_str(line).map_err(|e| McpError::ParseError {
        message: format!("Parse error: {}", e),
    })?;

    if raw.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(McpError::InvalidRequest {
            message: "Invalid Request: jsonrpc must be \"2.0\"".to_string(),
        });
    }

    serde_json::from_value(raw).map_err(|e| McpError::InvalidRequest {
        message: format!("Invalid Request: {}", e),
    })
}

impl McpServer {
    /// Create a new MCP server
    #[inline]
    pub fn new(name: String, version: String) -> Self {
        let server_info = Implementation { name, version };

        let capabilities = ServerCapabilities {
            logging: Some(LoggingCapability {}),
            tools: Some(ToolsCapability {
                list_changed: Some(false),
            }),
        };

        Self {
            server_info,
            capabilities,
            tools: Arc::new(RwLock::new(HashMap::new())),
            tool_handlers: Arc::new(RwLock::new(HashMap::new())),
            connection_state: Arc::new(RwLock::new(ConnectionState::Uninitialized)),
        }
    }

    /// Register a tool with the server
    #[inline]
    pub async fn register_tool<H>(&self, tool: Tool, handler: H)
    where
        H: ToolHandler + 'static,
    {
        let tool_name = tool.name.clone();

        {
            let mut tools = self.tools.write().await;
            tools.insert(tool_name.clone(), tool);
        }

        {
            let mut handlers = self.tool_handlers.write().await;
            handlers.insert(tool_name.clone(), Arc::new(handler));
        }

        debug!("Registered tool: {}", tool_name);
    }

    /// Start the server using stdio transport
    #[inline]
    pub async fn serve_stdio(self: Arc<Self>) -> Result<()> {
        info!("Starting MCP server with stdio transport");

        let reader = BufReader::new(io::stdin());
        let writer = Arc::new(Mutex::new(io::stdout()));
        self.serve(reader, writer).await
    }

    /// Serve requests read from `reader` until EOF, writing responses to `writer`.
    ///
    /// In-flight requests are awaited before returning.
    #[inline]
    pub async fn serve<R, W>(self: Arc<Self>, mut reader: R, writer: Arc<Mutex<W>>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut in_flight = JoinSet::new();
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    info!("EOF reached, closing connection");
                    break;
                }
                Ok(_) => {
                    let message = line.trim().to_string();
                    if message.is_empty() {
                        continue;
                    }

                    let handler = MessageHandler::new(Arc::clone(&self));
                    let writer = Arc::clone(&writer);
                    in_flight.spawn(async move {
                        if let Some(response) = handler.process_line(&message).await {
                            if let Err(e) = send_message(&writer, &response).await {
                                error!("Failed to write response: {}", e);
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("Error reading from stdin: {}", e);
                    break;
                }
            }

            // Reap finished tasks so the set does not grow for the whole session
            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!("Request task failed: {}", e);
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Request task failed: {}", e);
            }
        }

        {
            let mut state = self.connection_state.write().await;
            *state = ConnectionState::Closed;
        }

        info!("MCP server stopped");
        Ok(())
    }

    /// Get current connection state
    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        self.connection_state.read().await.clone()
    }

    /// Names of the registered tools, sorted
    #[inline]
    pub async fn tool_names(&self) -> Vec<String> {
        let tools = self.tools.read().await;
        let mut names: Vec<String> = tools.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Send a message to the client as one line
async fn send_message<W>(writer: &Mutex<W>, message: &JsonRpcMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut json = serde_json::to_string(message)?;
    json.push('\n');

    let mut writer = writer.lock().await;
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

impl MessageHandler {
    /// Create a new message handler
    #[inline]
    pub fn new(server: Arc<McpServer>) -> Self {
        Self { server }
    }

    /// Process one raw input line, returning the message to send back, if any
    #[inline]
    pub async fn process_line(&self, line: &str) -> Option<JsonRpcMessage> {
        match parse_message(line) {
            Ok(message) => self.process_message(message).await,
            Err(e) => {
                e.log();
                Some(e.to_error_response(None))
            }
        }
    }

    /// Process an incoming message
    #[inline]
    pub async fn process_message(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        match message {
            JsonRpcMessage::Request(request) => Some(self.handle_request(request).await),
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification).await;
                None
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::ErrorResponse(_) => {
                warn!("Received unexpected response message from client");
                None
            }
        }
    }

    /// Handle a JSON-RPC request
    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        debug!("Handling request {}", request.method);

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            _ => Err(McpError::MethodNotFound {
                method: request.method.clone(),
            }),
        };

        match response {
            Ok(result) => JsonRpcMessage::Response(JsonRpcResponse::new(result, request.id)),
            Err(e) => {
                e.log();
                e.to_error_response(Some(request.id))
            }
        }
    }

    /// Handle a JSON-RPC notification
    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "initialized" | "notifications/initialized" => {
                let mut state = self.server.connection_state.write().await;
                *state = ConnectionState::Ready;
                info!("Server ready to handle requests");
            }
            "notifications/cancelled" => {
                debug!("Received cancellation notification");
            }
            _ => {
                warn!("Unknown notification method: {}", notification.method);
            }
        }
    }

    /// Handle initialize request
    #[inline]
    pub async fn handle_initialize(&self, params: Option<Value>) -> McpResult<Value> {
        let params: InitializeParams = deserialize_params(params, "initialize")?;

        if !is_protocol_version_supported(&params.protocol_version) {
            return Err(McpError::UnsupportedProtocolVersion {
                version: params.protocol_version,
                supported: SUPPORTED_PROTOCOL_VERSIONS
                    .iter()
                    .map(|v| (*v).to_string())
                    .collect(),
            });
        }

        {
            let mut state = self.server.connection_state.write().await;
            *state = ConnectionState::Initializing;
        }

        let result = InitializeResult {
            protocol_version: params.protocol_version,
            capabilities: self.server.capabilities.clone(),
            server_info: self.server.server_info.clone(),
            instructions: Some(
                "Cancer risk scoring over free-text medical reports. Call analyze_report with the report text."
                    .to_string(),
            ),
        };

        info!("Client initialized: {}", params.client_info.name);
        to_value(&result)
    }

    /// Handle list tools request
    #[inline]
    pub async fn handle_list_tools(&self) -> McpResult<Value> {
        let tools = self.server.tools.read().await;
        let mut tools_vec: Vec<Tool> = tools.values().cloned().collect();
        tools_vec.sort_by(|a, b| a.name.cmp(&b.name));

        to_value(&ListToolsResult { tools: tools_vec })
    }

    /// Handle call tool request
    #[inline]
    pub async fn handle_call_tool(&self, params: Option<Value>) -> McpResult<Value> {
        let params: CallToolParams = deserialize_params(params, "tools/call")?;

        // Clone the handler out so the lock is not held while the tool runs
        let handler = {
            let handlers = self.server.tool_handlers.read().await;
            handlers
                .get(&params.name)
                .cloned()
                .ok_or_else(|| McpError::ToolNotFound {
                    name: params.name.clone(),
                })?
        };

        let result = handler.handle(params).await?;
        to_value(&result)
    }
}

fn deserialize_params<T>(params: Option<Value>, method: &str) -> McpResult<T>
where
    T: serde::de::DeserializeOwned,
{
    let params = params.ok_or_else(|| McpError::InvalidParameters {
        message: format!("{} request missing parameters", method),
    })?;

    serde_json::from_value(params).map_err(|e| McpError::InvalidParameters {
        message: format!("Invalid {} parameters: {}", method, e),
    })
}

fn to_value<T: serde::Serialize>(value: &T) -> McpResult<Value> {
    serde_json::to_value(value).map_err(|e| McpError::InternalError {
        message: format!("Failed to serialize result: {}", e),
    })
}
