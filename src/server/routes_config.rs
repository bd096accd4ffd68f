//! Health and runtime configuration endpoints.

use std::path::Path;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::actionlog::{log_action, RequestMeta};
use crate::config::{ConfigState, Theme};
use crate::error::{AppError, AppResult};
use crate::server::AppState;
use crate::settings::{save_settings, SettingsDoc};

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let cfg = state.config.snapshot();
    Json(json!({ "ok": true, "root": root_out(&cfg) }))
}

/// The root path as shown to clients: masked deployments only ever see "/".
fn root_out(cfg: &ConfigState) -> String {
    if cfg.expose_root() {
        cfg.root().display().to_string()
    } else {
        "/".to_string()
    }
}

fn summarize(cfg: &ConfigState) -> Value {
    json!({
        "root": root_out(cfg),
        "rootMasked": !cfg.expose_root(),
        "maxUploadMB": cfg.max_upload_mb(),
        "allowedTypes": cfg.allowed_types(),
        "ignoreNames": cfg.ignore_names(),
        "theme": cfg.theme().as_str(),
    })
}

pub async fn get_config(State(state): State<AppState>) -> Json<Value> {
    let cfg = state.config.snapshot();
    Json(summarize(&cfg))
}

/// Apply a partial settings update. Each present field is validated on its
/// own; a root move outside the initial root fails the whole request before
/// anything is persisted. The merged result is written back to the settings
/// file inside the served root.
pub async fn update_config(
    State(state): State<AppState>,
    meta: RequestMeta,
    payload: Result<Json<SettingsDoc>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(doc) = payload
        .map_err(|_| AppError::validation("validation_error", "Invalid request data"))?;

    {
        let mut cfg = state.config.0.write();
        if let Some(root) = doc.root.as_deref() {
            let trimmed = root.trim();
            if !trimmed.is_empty() {
                cfg.set_root(Path::new(trimmed))?;
            }
        }
        if let Some(n) = doc.max_upload_mb {
            if n > 0.0 {
                cfg.set_max_upload_mb(n);
            }
        }
        if let Some(v) = doc.allowed_types.clone() {
            cfg.set_allowed_types(Some(v));
        }
        if let Some(v) = doc.ignore_names.clone() {
            cfg.set_ignore_names(v);
        }
        if let Some(theme) = doc.theme.as_deref().and_then(Theme::parse) {
            cfg.set_theme(theme);
        }
    }

    let cfg = state.config.snapshot();
    let persisted = SettingsDoc {
        root: Some(cfg.root().display().to_string()),
        max_upload_mb: Some(cfg.max_upload_mb() as f64),
        allowed_types: Some(cfg.allowed_types().to_string()),
        ignore_names: Some(cfg.ignore_names().to_vec()),
        theme: Some(cfg.theme().as_str().to_string()),
    };
    save_settings(cfg.root_real(), &persisted);

    log_action(
        "config.update",
        json!({
            "root": cfg.root().display().to_string(),
            "maxUploadMB": cfg.max_upload_mb(),
            "allowedTypes": cfg.allowed_types(),
            "ignoreNames": cfg.ignore_names(),
            "theme": cfg.theme().as_str(),
        }),
        Some(json!({ "ua": meta.ua.as_deref().unwrap_or("") })),
    );

    let mut out = summarize(&cfg);
    if let Value::Object(map) = &mut out {
        map.insert("ok".into(), Value::Bool(true));
    }
    Ok(Json(out))
}
