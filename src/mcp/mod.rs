//! MCP (Model Context Protocol) Server Implementation
//!
//! Exposes the risk scoring pipeline to MCP clients over stdio, following the
//! JSON-RPC 2.0 specification and MCP protocol version 2025-06-18.

#[cfg(test)]
mod tests;

pub mod errors;
pub mod protocol;
pub mod server;
pub mod tools;

pub use errors::{McpError, McpResult};
pub use server::{ConnectionState, McpServer, MessageHandler, ToolHandler};
pub use tools::{AnalyzeReportHandler, HealthHandler, register_default_tools};
