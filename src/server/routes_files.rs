//! Public `/files/{*path}` URLs with HTTP caching semantics: weak
//! validators, conditional requests and single byte ranges.

use std::io::SeekFrom;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::actionlog::log_action;
use crate::error::{AppError, AppResult};
use crate::fs::list::{mime_for, mtime_millis};
use crate::fs::Sandbox;
use crate::server::{header_value, AppState};

/// A single byte range, `bytes=start-end` with either side optional.
static RANGE_SPEC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^bytes=(\d*)-(\d*)$").unwrap());

pub async fn serve_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let cfg = state.config.snapshot();
    let sandbox = Sandbox::new(cfg.root_real());
    let abs = sandbox.resolve(&format!("/{}", path))?;
    let st = std::fs::metadata(&abs)?;
    if st.is_dir() {
        return Err(AppError::forbidden("forbidden", "Forbidden"));
    }
    let size = st.len() as i64;
    let mtime_ms = mtime_millis(&st);
    let name = abs
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mime = mime_for(&name).unwrap_or_else(|| "application/octet-stream".to_string());
    let etag = format!("W/\"{}-{:x}\"", st.len(), mtime_ms);

    let mut base = HeaderMap::new();
    base.insert(header::CONTENT_TYPE, header_value(&mime)?);
    base.insert(header::LAST_MODIFIED, header_value(&http_date(mtime_ms))?);
    base.insert(header::ETAG, header_value(&etag)?);
    base.insert(header::ACCEPT_RANGES, header_value("bytes")?);
    base.insert(header::CACHE_CONTROL, header_value("public, max-age=86400")?);

    let inm = header_str(&headers, header::IF_NONE_MATCH);
    let ims = header_str(&headers, header::IF_MODIFIED_SINCE).and_then(parse_http_date_ms);
    let not_modified =
        inm.map(|v| v == etag).unwrap_or(false) || ims.map(|t| t >= mtime_ms).unwrap_or(false);
    if not_modified {
        return Ok((StatusCode::NOT_MODIFIED, base).into_response());
    }

    let ua = header_str(&headers, header::USER_AGENT).unwrap_or("").to_string();
    let api_out = sandbox.api_path(&abs);

    match evaluate_range(
        header_str(&headers, header::RANGE),
        header_str(&headers, header::IF_RANGE),
        size,
        mtime_ms,
        &etag,
    ) {
        RangeOutcome::Unsatisfiable => {
            base.insert(
                header::CONTENT_RANGE,
                header_value(&format!("bytes */{}", size))?,
            );
            Ok((StatusCode::RANGE_NOT_SATISFIABLE, base).into_response())
        }
        RangeOutcome::Partial { start, end } => {
            let chunk = end - start + 1;
            base.insert(
                header::CONTENT_RANGE,
                header_value(&format!("bytes {}-{}/{}", start, end, size))?,
            );
            base.insert(header::CONTENT_LENGTH, header_value(&chunk.to_string())?);
            log_action(
                "files_serve",
                json!({
                    "path": api_out,
                    "bytes": chunk,
                    "range": format!("{}-{}", start, end),
                }),
                Some(json!({ "ua": ua })),
            );
            let mut file = tokio::fs::File::open(&abs).await?;
            file.seek(SeekFrom::Start(start as u64)).await?;
            let stream = ReaderStream::new(file.take(chunk as u64));
            Ok((StatusCode::PARTIAL_CONTENT, base, Body::from_stream(stream)).into_response())
        }
        RangeOutcome::Full => {
            base.insert(header::CONTENT_LENGTH, header_value(&size.to_string())?);
            log_action(
                "files_serve",
                json!({ "path": api_out, "bytes": size }),
                Some(json!({ "ua": ua })),
            );
            let file = tokio::fs::File::open(&abs).await?;
            Ok((base, Body::from_stream(ReaderStream::new(file))).into_response())
        }
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[derive(Debug, PartialEq, Eq)]
enum RangeOutcome {
    Full,
    Partial { start: i64, end: i64 },
    Unsatisfiable,
}

/// Decide how a request's `Range` header applies to a file of `size`
/// bytes. An `If-Range` validator that no longer matches downgrades
/// the request to a full-body response rather than failing it. The
/// arithmetic stays signed so an empty file turns any byte range into
/// a 416 instead of wrapping.
fn evaluate_range(
    range: Option<&str>,
    if_range: Option<&str>,
    size: i64,
    mtime_ms: i64,
    etag: &str,
) -> RangeOutcome {
    let Some(range) = range else {
        return RangeOutcome::Full;
    };
    if let Some(validator) = if_range {
        match parse_http_date_ms(validator) {
            Some(t) => {
                if t < mtime_ms {
                    return RangeOutcome::Full;
                }
            }
            None => {
                if validator != etag {
                    return RangeOutcome::Full;
                }
            }
        }
    }
    let Some(caps) = RANGE_SPEC.captures(range) else {
        return RangeOutcome::Unsatisfiable;
    };
    let start_spec = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let end_spec = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    let (start, end) = if start_spec.is_empty() && !end_spec.is_empty() {
        // Suffix form: the last N bytes.
        let n: i64 = end_spec.parse().unwrap_or(i64::MAX);
        (size.saturating_sub(n).max(0), size - 1)
    } else {
        let start = if start_spec.is_empty() {
            0
        } else {
            start_spec.parse().unwrap_or(i64::MAX)
        };
        let end = if end_spec.is_empty() {
            size - 1
        } else {
            end_spec.parse().unwrap_or(i64::MAX)
        };
        (start, end)
    };
    if start > end || start < 0 || end >= size {
        return RangeOutcome::Unsatisfiable;
    }
    RangeOutcome::Partial { start, end }
}

fn parse_http_date_ms(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// IMF-fixdate rendering of a millisecond timestamp.
pub(crate) fn http_date(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_default()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}
