/// MCP Server Runners
///
/// Process-level entry points that put a `Dispatcher` behind a transport:
/// - STDIO mode: newline-framed JSON-RPC over stdin/stdout via `StreamTransport`
/// - HTTP mode: one JSON-RPC message per POST with Actix Web
///
/// Both modes share the same dispatcher and tool registry.

use actix_web::{
    App, HttpResponse, HttpServer, Result, http::header,
    middleware::{Compress, DefaultHeaders, Logger},
    web,
};
use bytes::Bytes;
use futures_util::stream;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::core::codec::LineCodec;
use crate::core::config::ServerConfig;
use crate::core::dispatcher::{Dispatcher, ServerInfo};
use crate::core::error::{RegistryError, TransportError};
use crate::core::protocol::{JsonRpcError, JsonRpcResponse};
use crate::core::registry::{ToolDescriptor, ToolRegistry};
use crate::core::transport::StreamTransport;

/// Application state shared across all HTTP worker threads.
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Total MCP requests received over HTTP
    pub request_count: AtomicU64,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            request_count: AtomicU64::new(0),
        }
    }
}

/// Build the dispatcher for `config` from a list of tools. Fails before
/// any transport starts if two tools share a name.
pub fn build_dispatcher(
    config: &ServerConfig,
    tools: Vec<ToolDescriptor>,
) -> Result<Arc<Dispatcher>, RegistryError> {
    let registry = ToolRegistry::new(tools)?;
    info!(tools = registry.len(), "tool registry ready");
    Ok(Arc::new(Dispatcher::new(
        Arc::new(registry),
        ServerInfo::new(config.server_name.clone(), config.server_version.clone()),
    )))
}

/// Health check endpoint handler.
async fn health() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "mcp-stream-server"
    })))
}

/// MCP JSON-RPC request handler.
///
/// The body is parsed here rather than through `web::Json` so that invalid
/// JSON yields a JSON-RPC parse error instead of a bare 400. Dispatch runs on
/// the blocking pool because tool calls may block for a long time. Messages
/// that get no reply (notifications) are acknowledged with 202.
async fn mcp_handler(state: web::Data<AppState>, body: web::Bytes) -> Result<HttpResponse> {
    state.request_count.fetch_add(1, Ordering::Relaxed);

    let message: Value = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "rejecting unparseable request body");
            return Ok(HttpResponse::BadRequest()
                .json(JsonRpcResponse::failure(None, JsonRpcError::parse_error(e.to_string()))));
        }
    };

    let dispatcher = Arc::clone(&state.dispatcher);
    let reply = web::block(move || dispatcher.handle(&message)).await?;
    Ok(match reply {
        Some(response) => HttpResponse::Ok().json(response),
        None => HttpResponse::Accepted().finish(),
    })
}

/// Metrics endpoint handler: requests processed since start.
async fn metrics_handler(state: web::Data<AppState>) -> Result<HttpResponse> {
    let count = state.request_count.load(Ordering::Relaxed);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "requests_total": count,
        "tools_total": state.dispatcher.registry().len(),
        "status": "ok"
    })))
}

/// Server-Sent Events endpoint for tools discovery.
///
/// Emits a single event carrying the same tool entries as `tools/list`.
async fn sse_tools_discovery(state: web::Data<AppState>) -> Result<HttpResponse> {
    let tools: Vec<Value> = state
        .dispatcher
        .registry()
        .list()
        .iter()
        .map(ToolDescriptor::to_listing)
        .collect();
    let tools_data = serde_json::json!({
        "count": tools.len(),
        "tools": tools
    });

    let event = Bytes::from(format!(
        "data: {}\n\n",
        serde_json::to_string(&tools_data).unwrap_or_else(|_| "{}".to_string())
    ));

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        // Disable caching to ensure clients always get fresh data
        .insert_header(header::CacheControl(vec![
            header::CacheDirective::NoCache,
            header::CacheDirective::NoStore,
            header::CacheDirective::MustRevalidate,
        ]))
        // Disable nginx buffering for real-time streaming
        .insert_header(("x-accel-buffering", "no"))
        .streaming(stream::once(async move { Ok::<_, Infallible>(event) })))
}

/// Register every HTTP route. Expects `web::Data<AppState>` in app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics_handler))
        .route("/sse", web::get().to(sse_tools_discovery))
        .route("/mcp", web::post().to(mcp_handler))
        .route("/", web::post().to(mcp_handler))
        .route("/", web::get().to(health));
}

/// Run the MCP server in HTTP mode.
///
/// # Configuration
/// - Worker threads: `config.workers`
/// - Max connections: 10,000 concurrent connections
/// - Connection rate limit: 1,000 connections per second
/// - Keep-alive and request timeout: 30 seconds
pub async fn run_server_http(config: ServerConfig, dispatcher: Arc<Dispatcher>) -> std::io::Result<()> {
    let bind_addr = config.bind_addr();
    let app_state = web::Data::new(AppState::new(dispatcher));

    info!(
        name = %config.server_name,
        version = %config.server_version,
        bind_addr = %bind_addr,
        workers = config.workers,
        "MCP server starting (HTTP mode)"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            // Enable compression for JSON responses (gzip/brotli)
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
            )
            // %r = request line, %s = status, %Dms = duration in milliseconds
            .wrap(Logger::new("%r %s %Dms"))
            .configure(configure)
    })
    .workers(config.workers)
    .max_connections(10000)
    .max_connection_rate(1000)
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_secs(30))
    .client_disconnect_timeout(Duration::from_secs(2))
    .shutdown_timeout(10)
    .bind(&bind_addr)?
    .run()
    .await
}

/// Run the MCP server in STDIO mode.
///
/// Requests are read from stdin and answered on stdout, one JSON document
/// per line. Requests are dispatched concurrently, so a slow tool call does
/// not hold up the ones behind it. Returns once stdin is closed and every
/// in-flight request has been answered.
pub async fn run_server_stdio(config: ServerConfig, dispatcher: Arc<Dispatcher>) -> Result<(), TransportError> {
    info!(
        name = %config.server_name,
        version = %config.server_version,
        max_frame_bytes = config.max_frame_bytes,
        "MCP server starting (STDIO mode)"
    );

    let transport = StreamTransport::new(
        tokio::io::stdin(),
        tokio::io::stdout(),
        LineCodec::new(config.max_frame_bytes),
    );
    transport.serve(dispatcher).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::ToolParameter;
    use actix_web::http::StatusCode;
    use actix_web::test::{
        TestRequest, call_and_read_body, call_and_read_body_json, call_service, init_service,
        read_body_json,
    };
    use serde_json::json;

    fn state() -> web::Data<AppState> {
        let tools = vec![
            ToolDescriptor::new("echo", |args| Ok(json!(args.str("message")?)))
                .parameter(ToolParameter::required("message", json!({"type": "string"}))),
        ];
        let dispatcher = build_dispatcher(&ServerConfig::default(), tools).unwrap();
        web::Data::new(AppState::new(dispatcher))
    }

    #[test]
    fn duplicate_tools_fail_before_serving() {
        let tools = vec![
            ToolDescriptor::new("same", |_| Ok(Value::Null)),
            ToolDescriptor::new("same", |_| Ok(Value::Null)),
        ];
        let err = build_dispatcher(&ServerConfig::default(), tools).err().unwrap();
        assert_eq!(err, RegistryError::DuplicateToolName("same".to_string()));
    }

    #[actix_rt::test]
    async fn post_mcp_dispatches_tool_calls() {
        let app = init_service(App::new().app_data(state()).configure(configure)).await;
        let req = TestRequest::post()
            .uri("/mcp")
            .set_payload(
                json!({
                    "jsonrpc": "2.0", "id": 11, "method": "tools/call",
                    "params": {"name": "echo", "arguments": {"message": "over http"}}
                })
                .to_string(),
            )
            .to_request();
        let body: Value = call_and_read_body_json(&app, req).await;
        assert_eq!(body["id"], json!(11));
        assert_eq!(body["result"]["content"][0]["text"], json!("over http"));
        assert_eq!(body["result"]["isError"], json!(false));
    }

    #[actix_rt::test]
    async fn notifications_are_accepted_without_body() {
        let app = init_service(App::new().app_data(state()).configure(configure)).await;
        let req = TestRequest::post()
            .uri("/")
            .set_payload(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }

    #[actix_rt::test]
    async fn invalid_json_is_a_parse_error() {
        let app = init_service(App::new().app_data(state()).configure(configure)).await;
        let req = TestRequest::post()
            .uri("/mcp")
            .set_payload("{not json")
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["error"]["code"], json!(-32700));
        assert_eq!(body["id"], Value::Null);
    }

    #[actix_rt::test]
    async fn metrics_count_mcp_requests() {
        let state = state();
        let app = init_service(App::new().app_data(state.clone()).configure(configure)).await;
        for id in 0..3 {
            let req = TestRequest::post()
                .uri("/mcp")
                .set_payload(json!({"jsonrpc": "2.0", "id": id, "method": "tools/list"}).to_string())
                .to_request();
            call_service(&app, req).await;
        }
        let req = TestRequest::get().uri("/metrics").to_request();
        let body: Value = call_and_read_body_json(&app, req).await;
        assert_eq!(body["requests_total"], json!(3));
        assert_eq!(body["tools_total"], json!(1));
    }

    #[actix_rt::test]
    async fn sse_lists_tools_as_single_event() {
        let app = init_service(App::new().app_data(state()).configure(configure)).await;
        let req = TestRequest::get().uri("/sse").to_request();
        let body = call_and_read_body(&app, req).await;
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.ends_with("\n\n"));
        let event: Value = serde_json::from_str(text["data: ".len()..].trim()).unwrap();
        assert_eq!(event["count"], json!(1));
        assert_eq!(event["tools"][0]["name"], json!("echo"));
    }
}
