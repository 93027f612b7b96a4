//! HTTP forwarding proxy
//!
//! Forwards every request outside the control prefix to the upstream server
//! through a reqwest client wrapped in the Sniffles tower layer. The proxy
//! never interprets request or response bodies.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use reqwest::Client;
use sniffles_core::config::defaults::CONTROL_PATH_PREFIX;
use sniffles_core::layer::simulated_fault;
use sniffles_core::{SimulatedFault, Sniffles, SnifflesService};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{BoxError, Layer, Service, ServiceExt};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info};

use crate::control;

/// Largest request body the proxy will buffer
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Hop-by-hop headers that are never forwarded
const HOP_BY_HOP: &[&str] = &[
    "host",
    "connection",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "proxy-authorization",
    "keep-alive",
];

/// The real transport: one reqwest round trip per call
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Service<axum::http::Request<Bytes>> for ReqwestTransport {
    type Response = axum::http::Response<Bytes>;
    type Error = reqwest::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: axum::http::Request<Bytes>) -> Self::Future {
        let client = self.client.clone();

        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let mut upstream = client
                .request(parts.method, parts.uri.to_string())
                .headers(strip_hop_by_hop(parts.headers));
            if !body.is_empty() {
                upstream = upstream.body(body);
            }

            let upstream = upstream.send().await?;
            let status = upstream.status();
            let version = upstream.version();
            let headers = strip_hop_by_hop(upstream.headers().clone());
            let body = upstream.bytes().await?;

            let mut response = axum::http::Response::new(body);
            *response.status_mut() = status;
            *response.version_mut() = version;
            *response.headers_mut() = headers;
            Ok(response)
        })
    }
}

/// Instrumented client type used by the proxy
pub type ProxyClient = SnifflesService<ReqwestTransport>;

/// State shared across proxy and control handlers
#[derive(Clone)]
pub struct ProxyState {
    /// The upstream server base URL
    pub upstream_url: String,
    /// Interceptor instance driven by the control API
    pub sniffles: Sniffles,
    /// Instrumented HTTP client
    pub client: ProxyClient,
}

impl ProxyState {
    pub fn new(upstream_url: String, sniffles: Sniffles, client: Client) -> Self {
        let client = sniffles.layer().layer(ReqwestTransport::new(client));
        Self {
            upstream_url,
            sniffles,
            client,
        }
    }
}

/// Build the router: control API, health check, everything else forwarded
pub fn build_router(state: ProxyState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .nest(CONTROL_PATH_PREFIX, control::routes())
        .fallback(proxy_handler)
        .with_state(state)
        .layer(cors)
}

/// Run the HTTP proxy until the server stops
pub async fn run_http_proxy(
    upstream_url: String,
    listen_port: u16,
    sniffles: Sniffles,
) -> Result<(), String> {
    let client = Client::builder()
        .build()
        .map_err(|e| format!("Failed to create HTTP client: {e}"))?;

    let state = ProxyState::new(upstream_url.clone(), sniffles, client);
    let app = build_router(state);

    // Bind to localhost
    let addr = format!("127.0.0.1:{}", listen_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {e}", addr))?;

    eprintln!("[SNIFFLES] Listening on http://{}", addr);
    eprintln!("[SNIFFLES] Proxying to {}", upstream_url);
    eprintln!("[SNIFFLES] Control API at http://{}{}", addr, CONTROL_PATH_PREFIX);
    info!("Sniffles proxy listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| format!("Server error: {e}"))
}

/// Health check endpoint
async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "Sniffles proxy is healthy")
}

/// Forward one request upstream through the instrumented client
async fn proxy_handler(State(state): State<ProxyState>, req: Request) -> Response {
    let (parts, body) = req.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = format!(
        "{}{}",
        state.upstream_url.trim_end_matches('/'),
        path_and_query
    );
    let uri: Uri = match target.parse() {
        Ok(uri) => uri,
        Err(e) => {
            error!("Invalid upstream URL {}: {}", target, e);
            return (StatusCode::BAD_REQUEST, "Invalid upstream URL").into_response();
        }
    };

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to read request body: {}", e);
            return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
        }
    };

    debug!("Proxying {} {}", parts.method, uri);

    let mut upstream_req = axum::http::Request::new(body);
    *upstream_req.method_mut() = parts.method;
    *upstream_req.uri_mut() = uri;
    *upstream_req.headers_mut() = parts.headers;

    match state.client.clone().oneshot(upstream_req).await {
        Ok(response) => response.map(Body::from),
        Err(err) => error_response(&err),
    }
}

/// Map a pipeline error to the response the proxied client sees
fn error_response(err: &BoxError) -> Response {
    let status = match simulated_fault(err) {
        Some(SimulatedFault::Network) => StatusCode::BAD_GATEWAY,
        Some(SimulatedFault::Timeout) => StatusCode::GATEWAY_TIMEOUT,
        None => match err.downcast_ref::<reqwest::Error>() {
            Some(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        },
    };

    if simulated_fault(err).is_none() {
        error!("Upstream request failed: {}", err);
    }

    (status, err.to_string()).into_response()
}

fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
    headers
}
