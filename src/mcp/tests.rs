//! MCP server tests: protocol handling, tool dispatch and the stdio loop

use std::sync::Arc;

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::Mutex;

use crate::mcp::protocol::*;
use crate::mcp::server::{ConnectionState, McpServer, MessageHandler};
use crate::mcp::tools::{AnalyzeReportHandler, HealthHandler, register_default_tools};
use crate::testing::{FailingQa, StaticQa, TEST_DIMENSION, pipeline_with_qa};

async fn server_with_answer(answer: &str) -> (Arc<McpServer>, TempDir) {
    let (pipeline, temp_dir) = pipeline_with_qa(Arc::new(StaticQa::new(answer))).await;
    let server = Arc::new(McpServer::new(
        "risk-rag".to_string(),
        "0.0.0-test".to_string(),
    ));
    register_default_tools(&server, &Arc::new(pipeline)).await;
    (server, temp_dir)
}

async fn call(server: &Arc<McpServer>, request: Value) -> Value {
    let handler = MessageHandler::new(Arc::clone(server));
    let response = handler
        .process_line(&request.to_string())
        .await
        .expect("request should produce a response");
    serde_json::to_value(response).expect("response should serialize")
}

fn tool_call(id: i64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    })
}

fn first_text(result: &Value) -> Value {
    let text = result["content"][0]["text"]
        .as_str()
        .expect("tool result should carry text");
    serde_json::from_str(text).expect("tool text should be JSON")
}

#[test]
fn analyze_report_tool_definition() {
    let tool = AnalyzeReportHandler::tool_definition();

    assert_eq!(tool.name, "analyze_report");
    let schema = tool.input_schema;
    assert_eq!(schema["properties"]["text"]["type"], "string");
    assert_eq!(schema["required"], json!(["text"]));
}

#[test]
fn health_tool_takes_no_parameters() {
    let tool = HealthHandler::tool_definition();

    assert_eq!(tool.name, "health");
    let properties = tool.input_schema["properties"]
        .as_object()
        .expect("has properties")
        .clone();
    assert!(properties.is_empty());
}

#[tokio::test]
async fn initialize_then_initialized_makes_server_ready() {
    let (server, _temp_dir) = server_with_answer("low").await;

    let response = call(
        &server,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": MCP_VERSION,
                "capabilities": {},
                "clientInfo": { "name": "test-client", "version": "1.0" }
            }
        }),
    )
    .await;

    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["protocolVersion"], MCP_VERSION);
    assert_eq!(response["result"]["serverInfo"]["name"], "risk-rag");
    assert_eq!(server.connection_state().await, ConnectionState::Initializing);

    let handler = MessageHandler::new(Arc::clone(&server));
    let reply = handler
        .process_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await;
    assert!(reply.is_none());
    assert_eq!(server.connection_state().await, ConnectionState::Ready);
}

#[tokio::test]
async fn unsupported_protocol_version_is_rejected() {
    let (server, _temp_dir) = server_with_answer("low").await;

    let response = call(
        &server,
        json!({
            "jsonrpc": "2.0",
            "id": "init",
            "method": "initialize",
            "params": {
                "protocolVersion": "1999-01-01",
                "capabilities": {},
                "clientInfo": { "name": "old-client", "version": "0.1" }
            }
        }),
    )
    .await;

    assert_eq!(response["id"], "init");
    assert_eq!(
        response["error"]["code"],
        mcp_error_codes::INVALID_PROTOCOL_VERSION
    );
}

#[tokio::test]
async fn tools_list_is_sorted() {
    let (server, _temp_dir) = server_with_answer("low").await;

    let response = call(
        &server,
        json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }),
    )
    .await;

    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .expect("tools array")
        .iter()
        .filter_map(|tool| tool["name"].as_str())
        .collect();
    assert_eq!(names, vec!["analyze_report", "health"]);
}

#[tokio::test]
async fn analyze_report_returns_score() {
    let (server, _temp_dir) = server_with_answer("high risk of malignancy").await;

    let response = call(
        &server,
        tool_call(
            3,
            "analyze_report",
            json!({ "text": "Patient Name: Jane Doe\nInvasive carcinoma." }),
        ),
    )
    .await;

    assert_eq!(response["result"]["isError"], false);
    let body = first_text(&response["result"]);
    assert_eq!(body["score"], 9.0);
    assert_eq!(body["stored_chunks"], 1);
    assert_eq!(body["patient"]["name"], "Jane Doe");
    assert!(
        body["document_id"]
            .as_str()
            .is_some_and(|id| id.starts_with("doc_"))
    );
}

#[tokio::test]
async fn empty_report_is_a_tool_error_with_stage() {
    let (server, _temp_dir) = server_with_answer("high").await;

    let response = call(&server, tool_call(4, "analyze_report", json!({ "text": "   " }))).await;

    assert_eq!(response["result"]["isError"], true);
    let body = first_text(&response["result"]);
    assert_eq!(body["stage"], "receive");
    assert_eq!(body["kind"], "validation");
    assert_eq!(body["status"], 400);
    assert!(body["document_id"].is_null());
}

#[tokio::test]
async fn qa_failure_is_reported_at_score_stage() {
    let (pipeline, _temp_dir) = pipeline_with_qa(Arc::new(FailingQa)).await;
    let server = Arc::new(McpServer::new("risk-rag".to_string(), "test".to_string()));
    register_default_tools(&server, &Arc::new(pipeline)).await;

    let response = call(
        &server,
        tool_call(5, "analyze_report", json!({ "text": "Biopsy: atypia." })),
    )
    .await;

    assert_eq!(response["result"]["isError"], true);
    let body = first_text(&response["result"]);
    assert_eq!(body["stage"], "score");
    assert_eq!(body["kind"], "provider");
    assert_eq!(body["status"], 500);
    assert!(body["document_id"].is_string());
}

#[tokio::test]
async fn missing_text_is_invalid_params() {
    let (server, _temp_dir) = server_with_answer("low").await;

    let response = call(&server, tool_call(6, "analyze_report", json!({}))).await;

    assert_eq!(response["error"]["code"], error_codes::INVALID_PARAMS);
}

#[tokio::test]
async fn non_string_text_and_unknown_keys_are_invalid_params() {
    let (server, _temp_dir) = server_with_answer("low").await;

    let response = call(&server, tool_call(10, "analyze_report", json!({ "text": 42 }))).await;
    assert_eq!(response["error"]["code"], error_codes::INVALID_PARAMS);
    assert!(
        response["error"]["message"]
            .as_str()
            .is_some_and(|m| m.contains("must be a string"))
    );

    let response = call(
        &server,
        tool_call(
            11,
            "analyze_report",
            json!({ "text": "Biopsy: benign.", "priority": "urgent" }),
        ),
    )
    .await;
    assert_eq!(response["error"]["code"], error_codes::INVALID_PARAMS);
    assert!(
        response["error"]["message"]
            .as_str()
            .is_some_and(|m| m.contains("priority"))
    );

    let response = call(&server, tool_call(12, "health", json!({ "verbose": true }))).await;
    assert_eq!(response["error"]["code"], error_codes::INVALID_PARAMS);
}

#[tokio::test]
async fn unknown_tool_and_method() {
    let (server, _temp_dir) = server_with_answer("low").await;

    let response = call(&server, tool_call(7, "delete_everything", json!({}))).await;
    assert_eq!(response["error"]["code"], mcp_error_codes::TOOL_NOT_FOUND);

    let response = call(
        &server,
        json!({ "jsonrpc": "2.0", "id": 8, "method": "resources/list" }),
    )
    .await;
    assert_eq!(response["error"]["code"], error_codes::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn health_tool_reports_embedder() {
    let (server, _temp_dir) = server_with_answer("low").await;

    let response = call(&server, tool_call(9, "health", json!({}))).await;

    let body = first_text(&response["result"]);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "retriever");
    assert_eq!(body["embedding_dimension"], TEST_DIMENSION);
}

#[tokio::test]
async fn malformed_lines_get_parse_and_request_errors() {
    let (server, _temp_dir) = server_with_answer("low").await;
    let handler = MessageHandler::new(Arc::clone(&server));

    let parse_error = handler
        .process_line("{not json")
        .await
        .expect("parse errors are answered");
    let parse_error = serde_json::to_value(parse_error).expect("serialize");
    assert_eq!(parse_error["error"]["code"], error_codes::PARSE_ERROR);
    assert!(parse_error["id"].is_null());

    let wrong_version = handler
        .process_line(r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#)
        .await
        .expect("invalid requests are answered");
    let wrong_version = serde_json::to_value(wrong_version).expect("serialize");
    assert_eq!(wrong_version["error"]["code"], error_codes::INVALID_REQUEST);
}

#[tokio::test]
async fn serve_answers_every_request_line() {
    let (server, _temp_dir) = server_with_answer("moderate").await;
    let input = [
        json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }).to_string(),
        String::new(),
        json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }).to_string(),
        tool_call(2, "analyze_report", json!({ "text": "Moderate dysplasia." })).to_string(),
    ]
    .join("\n");
    let writer = Arc::new(Mutex::new(Vec::<u8>::new()));

    Arc::clone(&server)
        .serve(input.as_bytes(), Arc::clone(&writer))
        .await
        .expect("serve should finish at EOF");

    let output = String::from_utf8(writer.lock().await.clone()).expect("utf-8 output");
    let mut responses: Vec<Value> = output
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line is JSON"))
        .collect();
    responses.sort_by_key(|r| r["id"].as_i64());

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["result"], json!({}));
    assert_eq!(first_text(&responses[1]["result"])["score"], 6.0);
    assert_eq!(server.connection_state().await, ConnectionState::Closed);
}
