//!
//! filewarden HTTP server
//! ----------------------
//! This module defines the Axum-based HTTP API over the sandboxed
//! filesystem core.
//!
//! Responsibilities:
//! - Request-id middleware and debug-level access logs.
//! - Config and health endpoints backed by the shared runtime configuration.
//! - Filesystem routes: list, stat, download, preview, mkdir, rename, delete.
//! - Streaming multipart upload with size and type gating.
//! - Public `/files/{*path}` URLs with conditional and byte-range requests.

use std::net::SocketAddr;
use std::time::Instant;

use anyhow::Context;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::header::CONTENT_LENGTH;
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actionlog::RequestId;
use crate::config::{ConfigState, SharedConfig};
use crate::error::{AppError, AppResult};
use crate::settings;

pub mod routes_config;
pub mod routes_files;
pub mod routes_fs;
pub mod upload;

/// Shared server state injected into all handlers.
///
/// Holds the live configuration; handlers take a snapshot per request so a
/// concurrent config update never changes values mid-operation.
#[derive(Clone)]
pub struct AppState {
    pub config: SharedConfig,
}

/// Build the API router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "filewarden ok" }))
        .route("/api/health", get(routes_config::health))
        .route(
            "/api/config",
            get(routes_config::get_config).post(routes_config::update_config),
        )
        .route("/api/fs/list", get(routes_fs::list))
        .route("/api/fs/stat", get(routes_fs::stat))
        .route("/api/fs/download", get(routes_fs::download))
        .route("/api/fs/preview", get(routes_fs::preview))
        .route("/api/fs/mkdir", post(routes_fs::mkdir))
        .route("/api/fs/rename", post(routes_fs::rename))
        .route("/api/fs/delete", post(routes_fs::delete))
        // The default 2MB body cap would break uploads; the handler enforces
        // the configured limit itself while streaming.
        .route(
            "/api/fs/upload",
            post(upload::upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/files/{*path}", get(routes_files::serve_file))
        .layer(middleware::from_fn(request_context))
        .with_state(state)
}

/// Per-request context: assigns (or propagates) an `X-Request-Id` and emits a
/// debug-level access log line once the response is ready.
async fn request_context(mut req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let url = req.uri().to_string();
    let ua = req
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let mut res = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        res.headers_mut().insert("x-request-id", value);
    }
    let duration_ms = started.elapsed().as_millis() as u64;
    let length = res
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    debug!(
        target: "http",
        method = %method,
        url = %url,
        status = res.status().as_u16(),
        duration_ms,
        length = %length,
        ua = %ua,
    );
    res
}

/// Build a header value, mapping invalid bytes into the shared error taxonomy
/// instead of panicking.
pub(crate) fn header_value(value: &str) -> AppResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|err| AppError::Internal {
        code: "internal_error".into(),
        message: err.to_string(),
    })
}

fn log_startup_folders(state: &ConfigState) {
    // Gather basic environment and folder info
    let cwd = std::env::current_dir().ok();
    let exe = std::env::current_exe().ok();
    let user = std::env::var("USER").or_else(|_| std::env::var("USERNAME")).ok();
    let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")).ok();
    let root_env = std::env::var("FILEWARDEN_ROOT").ok();

    info!(
        target: "startup",
        "filewarden starting. Folder configuration: cwd={:?}, exe={:?}, user={:?}, home={:?}, root={:?}, root_real={:?}, FILEWARDEN_ROOT_env={:?}",
        cwd, exe, user, home, state.root(), state.root_real(), root_env
    );
    info!(
        target: "startup",
        "Serving configuration: port={}, max_upload_mb={}, expose_root={}, ignore_names={:?}, root_exists={}",
        state.port(),
        state.max_upload_mb(),
        state.expose_root(),
        state.ignore_names(),
        state.root_real().exists()
    );
}

/// Start the HTTP server with a prepared configuration.
pub async fn run_with_config(config: SharedConfig) -> anyhow::Result<()> {
    let snapshot = config.snapshot();
    log_startup_folders(&snapshot);

    let state = AppState { config };
    let app = router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", snapshot.port())
        .parse()
        .context("Invalid listen address")?;
    info!(
        "Starting server on {} with root {}",
        addr,
        snapshot.root_real().display()
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Convenience entry point: environment configuration plus the persisted
/// settings document found under the configured root.
pub async fn run() -> anyhow::Result<()> {
    let mut state = ConfigState::from_env()?;
    if let Some(doc) = settings::load_settings(state.root_real()) {
        if let Err(err) = state.apply_settings(&doc) {
            warn!(target: "startup", "Failed to apply persisted settings: {}", err);
        }
    }
    run_with_config(SharedConfig::new(state)).await
}
