//! Action audit records.
//! Mutating and serving endpoints emit one record per completed operation:
//! a stable base payload at info level, widened with request-scoped extras
//! (user agent, addresses, request id) only when debug logging is enabled.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{enabled, info, Level};

/// Correlation id attached to every request by the server middleware and
/// echoed back in the `X-Request-Id` response header.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Request-scoped fields merged into action records at debug level.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ua: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xff: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl RequestMeta {
    pub fn into_extra(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn header_owned(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string());
        let request_id = parts.extensions.get::<RequestId>().map(|rid| rid.0.clone());
        Ok(RequestMeta {
            ua: header_owned(parts, "user-agent"),
            ip,
            xff: header_owned(parts, "x-forwarded-for"),
            host: header_owned(parts, "x-forwarded-host").or_else(|| header_owned(parts, "host")),
            request_id,
        })
    }
}

/// Emit one action record. `base` is always part of the record; `extra`
/// fields are merged in only when debug logging is on for this target.
pub fn log_action(action: &str, base: Value, extra: Option<Value>) {
    let mut payload = Map::new();
    payload.insert("action".to_string(), Value::String(action.to_string()));
    merge(&mut payload, base);
    if enabled!(target: "action", Level::DEBUG) {
        if let Some(extra) = extra {
            merge(&mut payload, extra);
        }
    }
    // The event macro brings `tracing::field::Value` into scope around its
    // arguments; an unqualified `Value` here resolves to that trait.
    info!(target: "action", "{}", serde_json::Value::Object(payload));
}

fn merge(into: &mut Map<String, Value>, value: Value) {
    if let Value::Object(fields) = value {
        into.extend(fields);
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::json;
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    #[derive(Clone, Default)]
    struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CaptureWriter {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn record_at(level: Level) -> String {
        let sink = CaptureWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(sink.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            log_action(
                "upload",
                json!({ "count": 1, "totalBytes": 4 }),
                Some(json!({ "files": ["a.png"] })),
            );
        });
        let out = String::from_utf8(sink.0.lock().clone()).unwrap();
        out
    }

    #[test]
    fn emits_base_payload_at_info() {
        let out = record_at(Level::INFO);
        assert!(out.contains("\"action\":\"upload\""));
        assert!(out.contains("\"count\":1"));
        assert!(!out.contains("\"files\""));
    }

    #[test]
    fn merges_extras_only_at_debug() {
        let out = record_at(Level::DEBUG);
        assert!(out.contains("\"action\":\"upload\""));
        assert!(out.contains("\"files\""));
    }

    #[test]
    fn meta_serializes_only_present_fields() {
        let meta = RequestMeta {
            ua: Some("curl/8.0".to_string()),
            request_id: Some("abc".to_string()),
            ..Default::default()
        };
        let value = meta.into_extra();
        assert_eq!(value["ua"], "curl/8.0");
        assert_eq!(value["requestId"], "abc");
        assert!(value.get("ip").is_none());
        assert!(value.get("xff").is_none());
    }

    #[test]
    fn merge_overlays_fields() {
        let mut payload = Map::new();
        payload.insert("action".to_string(), json!("delete"));
        merge(&mut payload, json!({ "path": "/a", "bytes": 3 }));
        merge(&mut payload, json!({ "ua": "test" }));
        assert_eq!(payload["path"], "/a");
        assert_eq!(payload["bytes"], 3);
        assert_eq!(payload["ua"], "test");
    }

    #[test]
    fn merge_ignores_non_objects() {
        let mut payload = Map::new();
        merge(&mut payload, json!("not an object"));
        assert!(payload.is_empty());
    }
}
