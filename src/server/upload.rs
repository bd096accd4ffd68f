//! Streaming multipart upload. Each part is written to disk as it
//! arrives, with the type allow-list applied per file and the size cap
//! enforced before any byte past the limit touches the disk.

use std::path::Path;

use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::extract::{Query, State};
use axum::http::header::CONTENT_LENGTH;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::actionlog::log_action;
use crate::error::{AppError, AppResult};
use crate::fs::ops::unique_file_name;
use crate::fs::Sandbox;
use crate::server::routes_fs::{api_path_or_root, PathQuery};
use crate::server::AppState;
use crate::util::{is_allowed_type, sanitize_filename};

pub async fn upload(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    let cfg = state.config.snapshot();
    let max_bytes = cfg.max_upload_bytes();
    let max_mb = cfg.max_upload_mb();

    // When the client declares a length, reject oversized bodies before
    // consuming them.
    if let Some(declared) = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        if declared > max_bytes {
            return Err(payload_limit(max_mb));
        }
    }

    let sandbox = Sandbox::new(cfg.root_real());
    let dest_api = api_path_or_root(&query);
    // The destination chain may be several levels deep and entirely absent.
    let dest = sandbox.resolve_for_create(&dest_api)?;
    tokio::fs::create_dir_all(&dest).await?;

    let allowed = cfg.allowed_types().to_string();
    let mut files: Vec<Value> = Vec::new();
    let mut total_bytes: u64 = 0;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        if field.name() != Some("files") {
            continue;
        }
        let Some(original) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };
        if !is_allowed_type(&original, &allowed) {
            files.push(json!({
                "originalName": original,
                "ok": false,
                "error": "type_not_allowed",
            }));
            continue;
        }
        let saved = unique_file_name(&dest, &sanitize_filename(&original));
        let target = dest.join(&saved);
        let written = match write_field(field, &target, max_bytes, max_mb).await {
            Ok(written) => written,
            Err(err) => {
                discard_partial(&target).await;
                return Err(err);
            }
        };
        total_bytes += written;
        files.push(json!({
            "originalName": original,
            "savedName": saved,
            "size": written,
            "apiPath": sandbox.api_path(&target),
        }));
    }

    log_action(
        "upload",
        json!({ "count": files.len(), "totalBytes": total_bytes, "dest": dest_api }),
        Some(json!({ "files": files.clone() })),
    );
    Ok(Json(json!({ "ok": true, "files": files })))
}

async fn write_field(
    mut field: Field<'_>,
    target: &Path,
    max_bytes: u64,
    max_mb: u64,
) -> AppResult<u64> {
    let mut file = File::create(target).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = field.chunk().await.map_err(bad_multipart)? {
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(payload_limit(max_mb));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(written)
}

async fn discard_partial(target: &Path) {
    if let Err(err) = tokio::fs::remove_file(target).await {
        warn!(target: "fs", "Failed to remove partial upload {:?}: {}", target, err);
    }
}

fn payload_limit(max_mb: u64) -> AppError {
    AppError::PayloadTooLarge {
        code: "payload_too_large".into(),
        message: format!("Payload too large. Limit is {}MB", max_mb),
    }
}

fn bad_multipart(err: MultipartError) -> AppError {
    AppError::Validation {
        code: "validation_error".into(),
        message: format!("Malformed multipart body: {}", err),
    }
}
