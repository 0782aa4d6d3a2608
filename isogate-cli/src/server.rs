//! HTTP front for the gateway.
//!
//! Every inbound request is mapped onto the configured origin and handed
//! to the gateway for interception. The request mode comes from the
//! `Sec-Fetch-Mode` header when the client sends one, with an Accept-based
//! fallback for older clients.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use url::Url;

use isogate_engine::{GatewayResponse, InterceptedRequest, IsolationGateway, RequestMode};

use crate::error::AppError;

#[derive(Clone)]
struct AppState {
    gateway: Arc<IsolationGateway>,
    origin: Url,
}

/// Serve the gateway until ctrl-c
pub async fn serve(
    gateway: Arc<IsolationGateway>,
    origin: Url,
    bind: SocketAddr,
) -> Result<(), AppError> {
    let state = AppState { gateway, origin };
    let app = Router::new()
        .fallback(handle)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}

async fn handle(State(state): State<AppState>, request: Request) -> Response {
    let method = request.method().clone();
    let mode = request_mode(&request);

    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let url = match state.origin.join(path_and_query) {
        Ok(url) => url,
        Err(e) => {
            warn!(path = path_and_query, error = %e, "request path does not map onto the origin");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let intercepted = match InterceptedRequest::new(url.as_str(), method, mode) {
        Ok(intercepted) => intercepted,
        Err(e) => {
            warn!(error = %e, "failed to build intercepted request");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match state.gateway.fetch(&intercepted).await {
        Some(response) => into_http(response),
        // Requests mapped onto the origin are same-origin by construction,
        // so the gateway always answers them.
        None => {
            warn!(path = intercepted.path(), "request fell outside the gateway origin");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

fn request_mode(request: &Request) -> RequestMode {
    if let Some(mode) = request
        .headers()
        .get("sec-fetch-mode")
        .and_then(|v| v.to_str().ok())
    {
        return if mode.eq_ignore_ascii_case("navigate") {
            RequestMode::Navigate
        } else {
            RequestMode::Subresource
        };
    }

    // Older clients: a GET that prefers HTML is a navigation.
    let accepts_html = request
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"));

    if request.method() == Method::GET && accepts_html {
        RequestMode::Navigate
    } else {
        RequestMode::Subresource
    }
}

fn into_http(response: GatewayResponse) -> Response {
    let mut http_response = Response::new(Body::from(response.body));
    *http_response.status_mut() = response.status;
    *http_response.headers_mut() = response.headers;
    http_response
}
