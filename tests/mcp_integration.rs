//! Integration tests for the MCP server.
//!
//! These tests drive the server the way an MCP client would: JSON-RPC lines
//! in, JSON-RPC lines out, with a mock Graph API behind it.

use mockito::{Matcher, Server};
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;

use meta_ads_mcp::auth::{AuthGuard, CredentialStore, TokenCacheRecord};
use meta_ads_mcp::config::{Config, Environment};
use meta_ads_mcp::graph::{GraphClient, GraphSettings};
use meta_ads_mcp::mcp::protocol::{parse_message, IncomingMessage, RequestId};
use meta_ads_mcp::mcp::{LineTransport, McpServer};

const TOKEN: &str = "EAAB-session-token";

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_tools_call_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": "call-1",
        "method": "tools/call",
        "params": {"name": "list_campaigns", "arguments": {"ad_account_id": "123"}}
    }"#;

    match parse_message(json).unwrap() {
        IncomingMessage::Request(req) => {
            assert_eq!(req.method, "tools/call");
            assert_eq!(req.id, RequestId::String("call-1".into()));
        }
        IncomingMessage::Notification(_) => panic!("Expected Request"),
    }
}

#[test]
fn test_parse_notification() {
    let json = r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#;
    match parse_message(json).unwrap() {
        IncomingMessage::Notification(notif) => {
            assert_eq!(notif.method, "notifications/initialized");
        }
        IncomingMessage::Request(_) => panic!("Expected Notification"),
    }
}

#[test]
fn test_parse_missing_jsonrpc_version() {
    assert!(parse_message(r#"{"id": 1, "method": "ping"}"#).is_err());
    assert!(parse_message("not valid json").is_err());
}

// =============================================================================
// Server Sessions
// =============================================================================

fn graph_client(base_url: String) -> GraphClient {
    let mut config = Config::default();
    config.graph.base_url = base_url;
    config.graph.retry_backoff_ms = 1;
    GraphClient::new(GraphSettings::from_config(&config, &Environment::default())).unwrap()
}

fn env_token_server(base_url: String, dir: &tempfile::TempDir) -> McpServer {
    let guard = AuthGuard::with_environment(
        CredentialStore::new(dir.path().join("token_cache.json")),
        || Environment {
            access_token: Some(TOKEN.to_string()),
            ..Environment::default()
        },
    );
    McpServer::new(guard, graph_client(base_url))
}

async fn call(server: &mut McpServer, id: u64, name: &str, arguments: Value) -> (bool, Value) {
    let line = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
    .to_string();
    let reply = serde_json::to_value(server.handle_line(&line).await.unwrap()).unwrap();
    let result = &reply["result"];
    let text = result["content"][0]["text"].as_str().unwrap();
    (
        result["isError"].as_bool().unwrap_or(false),
        serde_json::from_str(text).unwrap(),
    )
}

async fn initialise(server: &mut McpServer) {
    server
        .handle_line(
            r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{}}}"#,
        )
        .await
        .unwrap();
    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await
        .is_none());
}

#[tokio::test]
async fn stdio_session_redacts_tokens_in_paging_links() {
    let mut graph = Server::new_async().await;
    let mock = graph
        .mock("GET", "/v25.0/act_123/campaigns")
        .match_header("authorization", format!("Bearer {TOKEN}").as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({
                "data": [{"id": "1", "name": "Spring"}],
                "paging": {
                    "cursors": {"before": "QVFIUb", "after": "QVFIUa"},
                    "next": format!(
                        "https://graph.facebook.com/v25.0/act_123/campaigns?access_token={TOKEN}&limit=25&after=QVFIUa"
                    )
                }
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut server = env_token_server(graph.url(), &dir);

    let input = [
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"test-client","version":"1.0.0"}}}"#,
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        "",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"list_campaigns","arguments":{"ad_account_id":"123"}}}"#,
    ]
    .join("\n")
        + "\n";

    let (mut client_end, server_end) = tokio::io::duplex(256 * 1024);
    let mut transport = LineTransport::new(input.as_bytes(), server_end);
    server.serve(&mut transport).await.unwrap();
    drop(transport);

    let mut output = String::new();
    client_end.read_to_string(&mut output).await.unwrap();
    let replies: Vec<Value> = output
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0]["id"], 1);
    assert_eq!(replies[1]["id"], 2);
    assert!(replies[1]["result"]["tools"].as_array().unwrap().len() > 10);

    assert_eq!(replies[2]["id"], 3);
    assert!(!output.contains(TOKEN));
    let payload: Value =
        serde_json::from_str(replies[2]["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(payload["status"], "success");
    assert_eq!(payload["next_page_cursor"], "QVFIUa");
    let next = payload["paging"]["next"].as_str().unwrap();
    assert!(next.contains("access_token=REDACTED"));
    assert!(next.contains("limit=25"));
    mock.assert_async().await;
}

#[tokio::test]
async fn cursor_pages_through_and_rejects_misuse() {
    let mut graph = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let mut server = env_token_server(graph.url(), &dir);
    initialise(&mut server).await;

    {
        let _first = graph
            .mock("GET", "/v25.0/act_123/campaigns")
            .match_query(Matcher::UrlEncoded("effective_status".into(), r#"["ACTIVE"]"#.into()))
            .with_status(200)
            .with_body(
                r#"{"data": [{"id": "1"}, {"id": "2"}],
                    "paging": {"cursors": {"after": "CURSOR-2"}, "next": "https://graph.facebook.com/x"}}"#,
            )
            .create_async()
            .await;

        let (is_error, page) = call(
            &mut server,
            1,
            "list_campaigns",
            json!({"ad_account_id": "123", "effective_status": ["ACTIVE"]}),
        )
        .await;
        assert!(!is_error);
        assert_eq!(page["data"], json!([{"id": "1"}, {"id": "2"}]));
        assert_eq!(page["next_page_cursor"], "CURSOR-2");
    }

    // Same cursor against another tool or other filters never reaches the API
    let (is_error, envelope) = call(
        &mut server,
        2,
        "list_ads",
        json!({"ad_account_id": "123", "page_cursor": "CURSOR-2"}),
    )
    .await;
    assert!(is_error);
    assert_eq!(envelope["error"]["kind"], "InvalidRequest");

    let (is_error, envelope) = call(
        &mut server,
        3,
        "list_campaigns",
        json!({"ad_account_id": "123", "effective_status": ["PAUSED"], "page_cursor": "CURSOR-2"}),
    )
    .await;
    assert!(is_error);
    assert_eq!(envelope["error"]["kind"], "InvalidRequest");

    let last = graph
        .mock("GET", "/v25.0/act_123/campaigns")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("after".into(), "CURSOR-2".into()),
            Matcher::UrlEncoded("effective_status".into(), r#"["ACTIVE"]"#.into()),
        ]))
        .with_status(200)
        .with_body(r#"{"data": [{"id": "3"}], "paging": {"cursors": {"before": "CURSOR-1"}}}"#)
        .expect(1)
        .create_async()
        .await;

    let (is_error, page) = call(
        &mut server,
        4,
        "list_campaigns",
        json!({"ad_account_id": "123", "effective_status": ["ACTIVE"], "page_cursor": "CURSOR-2"}),
    )
    .await;
    assert!(!is_error);
    assert_eq!(page["data"], json!([{"id": "3"}]));
    assert!(page.get("next_page_cursor").is_none());
    last.assert_async().await;
}

#[tokio::test]
async fn rejected_cached_token_points_to_login() {
    let mut graph = Server::new_async().await;
    let mock = graph
        .mock("GET", "/v25.0/42")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(
            r#"{"error": {"message": "Error validating access token: The session has been invalidated",
                "code": 190, "error_subcode": 460, "fbtrace_id": "Trace1"}}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("token_cache.json"));
    store
        .persist(&TokenCacheRecord::new("cached-login-token", "123", json!({})))
        .unwrap();
    let guard = AuthGuard::with_environment(store, Environment::default);
    let mut server = McpServer::new(guard, graph_client(graph.url()));
    initialise(&mut server).await;

    let (is_error, envelope) = call(&mut server, 1, "read_campaign", json!({"campaign_id": "42"})).await;
    assert!(is_error);
    assert_eq!(envelope["status"], "error");
    assert_eq!(envelope["error"]["kind"], "InvalidOrExpiredToken");
    assert!(envelope["error"]["remediation"].as_str().unwrap().contains("--login"));
    assert_eq!(envelope["error"]["details"]["code"], 190);
    assert_eq!(envelope["error"]["details"]["fbtrace_id"], "Trace1");
    mock.assert_async().await;
}

#[tokio::test]
async fn token_arguments_are_refused_before_any_request() {
    let mut graph = Server::new_async().await;
    let mock = graph
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut server = env_token_server(graph.url(), &dir);
    initialise(&mut server).await;

    let (is_error, envelope) = call(
        &mut server,
        1,
        "read_campaign",
        json!({"campaign_id": "42", "access_token": "smuggled-token-value"}),
    )
    .await;
    assert!(is_error);
    assert_eq!(envelope["error"]["kind"], "InvalidRequest");
    assert!(!envelope.to_string().contains("smuggled-token-value"));
    mock.assert_async().await;
}
