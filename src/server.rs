// src/server.rs

//! axum host that drives the handlers.
//!
//! Handlers are mounted as a middleware in front of the router, keyed by
//! exact request path. A handler that answers `ServeOutcome::Next` (pass-thru)
//! hands the request on to the rest of the router: `/healthz` or the JSON
//! 404 fallback.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{ConnectInfo, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::{info, warn};

use crate::exec::{ExecutionResult, ResponseBody};
use crate::handler::{Lifecycle, RequestHandler, ServeOutcome};
use crate::placeholder::RequestContext;

pub const HEALTH_PATH: &str = "/healthz";

#[derive(Clone)]
struct Routes {
    by_path: Arc<HashMap<String, Arc<RequestHandler>>>,
}

/// Build the router for a set of validated handlers.
///
/// Handlers without a `path` are not reachable over HTTP; they only run at
/// lifecycle events.
pub fn build_router(handlers: &[Arc<RequestHandler>]) -> Router {
    let by_path: HashMap<String, Arc<RequestHandler>> = handlers
        .iter()
        .filter_map(|h| h.path().map(|p| (p.to_string(), Arc::clone(h))))
        .collect();
    let routes = Routes {
        by_path: Arc::new(by_path),
    };

    Router::new()
        .route(HEALTH_PATH, get(health))
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(log_requests))
                .layer(middleware::from_fn_with_state(routes, dispatch)),
        )
}

async fn dispatch(State(routes): State<Routes>, req: Request, next: Next) -> Response {
    let Some(handler) = routes.by_path.get(req.uri().path()).cloned() else {
        return next.run(req).await;
    };

    let ctx = request_context(&req);
    match handler.serve(&ctx).await {
        ServeOutcome::Respond(result) => respond(&result),
        ServeOutcome::Next => next.run(req).await,
    }
}

/// JSON body plus 200/500 for an execution result.
pub fn respond(result: &ExecutionResult) -> Response {
    let status =
        StatusCode::from_u16(result.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(result.body())).into_response()
}

/// Copy the parts of an axum request that placeholders can reference.
pub fn request_context(req: &Request) -> RequestContext {
    let uri = req.uri();
    let mut ctx = RequestContext::new(req.method().as_str(), uri.path());
    ctx.raw_query = uri.query().map(str::to_string);
    if let Ok(Query(params)) = Query::<BTreeMap<String, String>>::try_from_uri(uri) {
        ctx.query = params;
    }

    for (name, value) in req.headers() {
        match value.to_str() {
            Ok(v) => ctx = ctx.with_header(name.as_str(), v),
            Err(_) => warn!(header = %name, "skipping non-UTF-8 header value"),
        }
    }

    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        ctx.remote_host = Some(addr.ip().to_string());
    }
    ctx
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> impl IntoResponse {
    let body = ResponseBody {
        status: None,
        error: Some("not found".to_string()),
    };
    (StatusCode::NOT_FOUND, Json(body))
}

/// Log method, path, status code, and duration for each request.
async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();

    let resp = next.run(req).await;

    info!(
        http.method = %method,
        http.path = %path,
        http.status = resp.status().as_u16(),
        http.duration_ms = start.elapsed().as_millis() as u64,
        "request completed"
    );
    resp
}

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("serve")
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received; shutting down"),
        _ = terminate => info!("SIGTERM received; shutting down"),
    }
}
