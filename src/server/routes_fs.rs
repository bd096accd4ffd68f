//! Sandboxed filesystem endpoints: listing, stat, download, preview and
//! the mutation trio (mkdir, rename, delete).

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;

use crate::actionlog::{log_action, RequestMeta};
use crate::error::{AppError, AppResult};
use crate::fs::list::{list_directory, mime_for, stat_path, ListQuery, ListResponse, StatResponse};
use crate::fs::ops;
use crate::fs::Sandbox;
use crate::server::{header_value, AppState};
use crate::util::is_image_like;

/// Query string carrying a single sandbox path, defaulting to the root.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PathQuery {
    pub path: Option<String>,
}

pub(crate) fn api_path_or_root(query: &PathQuery) -> String {
    query
        .path
        .as_deref()
        .filter(|p| !p.is_empty())
        .unwrap_or("/")
        .to_string()
}

fn bad_body() -> AppError {
    AppError::validation("validation_error", "Invalid request data")
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<ListResponse>> {
    let cfg = state.config.snapshot();
    let sandbox = Sandbox::new(cfg.root_real());
    let listing = list_directory(&sandbox, cfg.ignore_names(), &query)?;
    Ok(Json(listing))
}

pub async fn stat(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> AppResult<Json<StatResponse>> {
    let cfg = state.config.snapshot();
    let sandbox = Sandbox::new(cfg.root_real());
    let stat = stat_path(&sandbox, &api_path_or_root(&query))?;
    Ok(Json(stat))
}

/// Stream a file as an attachment download. Directories are rejected,
/// archive-a-folder support never made it past the UI mockups.
pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
    meta: RequestMeta,
) -> AppResult<Response> {
    let cfg = state.config.snapshot();
    let sandbox = Sandbox::new(cfg.root_real());
    let abs = sandbox.resolve(&api_path_or_root(&query))?;
    let st = std::fs::metadata(&abs)?;
    if st.is_dir() {
        return Err(AppError::invalid_op(
            "not_supported",
            "Download for directories is not supported",
        ));
    }
    let name = abs
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    let mime = mime_for(&name).unwrap_or_else(|| "application/octet-stream".to_string());

    log_action(
        "download",
        json!({ "path": sandbox.api_path(&abs), "bytes": st.len() }),
        Some(meta.into_extra()),
    );

    let file = tokio::fs::File::open(&abs).await?;
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, header_value(&mime)?);
    headers.insert(header::CONTENT_LENGTH, header_value(&st.len().to_string())?);
    headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(&attachment_disposition(&name))?,
    );
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

/// Stream an image inline for the preview pane. Only image types are
/// served here; everything else is a 415 so the client falls back to
/// the download flow.
pub async fn preview(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
    meta: RequestMeta,
) -> AppResult<Response> {
    let cfg = state.config.snapshot();
    let sandbox = Sandbox::new(cfg.root_real());
    let abs = sandbox.resolve(&api_path_or_root(&query))?;
    let st = std::fs::metadata(&abs)?;
    if st.is_dir() {
        return Err(AppError::invalid_op(
            "invalid_operation",
            "Cannot preview a directory",
        ));
    }
    let name = abs
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mime = mime_for(&name)
        .filter(|m| is_image_like(m))
        .ok_or_else(|| {
            AppError::unsupported_type("unsupported_type", "Unsupported preview type")
        })?;

    log_action(
        "preview",
        json!({ "path": sandbox.api_path(&abs), "bytes": st.len() }),
        Some(meta.into_extra()),
    );

    let file = tokio::fs::File::open(&abs).await?;
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, header_value(&mime)?);
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

#[derive(Debug, Deserialize)]
pub struct MkdirBody {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameBody {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteBody {
    pub path: String,
}

pub async fn mkdir(
    State(state): State<AppState>,
    meta: RequestMeta,
    payload: Result<Json<MkdirBody>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(body) = payload.map_err(|_| bad_body())?;
    let cfg = state.config.snapshot();
    let sandbox = Sandbox::new(cfg.root_real());
    let outcome = ops::make_directory(&sandbox, &body.path)?;
    log_action(
        "mkdir",
        json!({ "path": &outcome.path, "name": &outcome.name }),
        Some(meta.into_extra()),
    );
    Ok(Json(json!({ "ok": true, "path": outcome.path, "name": outcome.name })))
}

pub async fn rename(
    State(state): State<AppState>,
    meta: RequestMeta,
    payload: Result<Json<RenameBody>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(body) = payload.map_err(|_| bad_body())?;
    let cfg = state.config.snapshot();
    let sandbox = Sandbox::new(cfg.root_real());
    let outcome = ops::rename_entry(&sandbox, &body.from, &body.to)?;
    log_action(
        "rename",
        json!({ "from": outcome.from, "to": outcome.to }),
        Some(meta.into_extra()),
    );
    Ok(Json(json!({ "ok": true })))
}

pub async fn delete(
    State(state): State<AppState>,
    meta: RequestMeta,
    payload: Result<Json<DeleteBody>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(body) = payload.map_err(|_| bad_body())?;
    let cfg = state.config.snapshot();
    let sandbox = Sandbox::new(cfg.root_real());
    let outcome = ops::delete_entry(&sandbox, &body.path)?;
    log_action(
        "delete",
        json!({ "path": outcome.path, "targetType": outcome.target_type }),
        Some(meta.into_extra()),
    );
    Ok(Json(json!({ "ok": true })))
}

/// Both the quoted ASCII fallback and the RFC 5987 encoded form, so
/// non-ASCII names survive every browser.
fn attachment_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(name)
    )
}
