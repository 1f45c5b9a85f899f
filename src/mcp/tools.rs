//! MCP Tools Implementation
//!
//! `analyze_report` runs a report through the scoring pipeline; `health` reports the
//! embedder the pipeline is wired to.

use crate::mcp::errors::{McpError, McpResult};
use crate::mcp::protocol::*;
use crate::mcp::server::{McpServer, ToolHandler};
use crate::pipeline::{Pipeline, PipelineError};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Report analysis tool handler
pub struct AnalyzeReportHandler {
    pipeline: Arc<Pipeline>,
}

/// Health probe tool handler
pub struct HealthHandler {
    pipeline: Arc<Pipeline>,
}

/// JSON body returned to the client when the pipeline fails
#[inline]
pub fn pipeline_error_body(error: &PipelineError) -> serde_json::Value {
    json!({
        "stage": error.stage,
        "kind": error.source.kind(),
        "status": error.status_code(),
        "message": error.source.to_string(),
        "document_id": error.document_id,
    })
}

/// Reject argument keys the tool schema does not declare
fn reject_unknown_arguments(
    tool: &str,
    args: &HashMap<String, Value>,
    allowed: &[&str],
) -> McpResult<()> {
    let mut unknown: Vec<&str> = args
        .keys()
        .map(String::as_str)
        .filter(|key| !allowed.contains(key))
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }

    unknown.sort_unstable();
    Err(McpError::InvalidToolParameters {
        tool: tool.to_string(),
        message: format!("Unknown parameter(s): {}", unknown.join(", ")),
    })
}

fn pretty<T: serde::Serialize>(value: &T) -> McpResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| McpError::InternalError {
        message: format!("Failed to serialize tool output: {}", e),
    })
}

impl AnalyzeReportHandler {
    #[inline]
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    /// Create the analyze_report tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "analyze_report".to_string(),
            description: Some(
                "Index a free-text medical report and estimate its cancer risk on a 0-10 scale"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": {
                        "type": "string",
                        "description": "Full report text"
                    }
                },
                "required": ["text"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for AnalyzeReportHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> McpResult<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        reject_unknown_arguments(&params.name, &args, &["text"])?;

        let text = match args.get("text") {
            Some(Value::String(text)) => text.as_str(),
            Some(_) => {
                return Err(McpError::InvalidToolParameters {
                    tool: params.name.clone(),
                    message: "Parameter 'text' must be a string".to_string(),
                });
            }
            None => {
                return Err(McpError::InvalidToolParameters {
                    tool: params.name.clone(),
                    message: "Missing required parameter: text".to_string(),
                });
            }
        };

        debug!("Analyzing report of {} characters", text.chars().count());

        match self.pipeline.analyze(text).await {
            Ok(report) => Ok(CallToolResult::text(pretty(&report)?)),
            Err(e) => {
                error!("Report analysis failed: {}", e);
                Ok(CallToolResult::error(pretty(&pipeline_error_body(&e))?))
            }
        }
    }
}

impl HealthHandler {
    #[inline]
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    /// Create the health tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "health".to_string(),
            description: Some("Report service status and the embedding model in use".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for HealthHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> McpResult<CallToolResult> {
        reject_unknown_arguments(&params.name, &params.arguments.unwrap_or_default(), &[])?;
        Ok(CallToolResult::text(pretty(&self.pipeline.health())?))
    }
}

/// Register every risk scoring tool on `server`
#[inline]
pub async fn register_default_tools(server: &McpServer, pipeline: &Arc<Pipeline>) {
    server
        .register_tool(
            AnalyzeReportHandler::tool_definition(),
            AnalyzeReportHandler::new(Arc::clone(pipeline)),
        )
        .await;
    server
        .register_tool(
            HealthHandler::tool_definition(),
            HealthHandler::new(Arc::clone(pipeline)),
        )
        .await;
}
