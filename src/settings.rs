//! Persistence for user-adjustable settings.
//! A small JSON sidecar stored inside the current root. Loading is tolerant:
//! a missing, unreadable, or malformed file just means "no saved settings".

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const SETTINGS_FILE: &str = ".settings.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsDoc {
    pub root: Option<String>,
    #[serde(rename = "maxUploadMB")]
    pub max_upload_mb: Option<f64>,
    pub allowed_types: Option<String>,
    pub ignore_names: Option<Vec<String>>,
    pub theme: Option<String>,
}

/// Load the sidecar from `dir`, or None if it is absent or unusable.
pub fn load_settings(dir: &Path) -> Option<SettingsDoc> {
    let path = dir.join(SETTINGS_FILE);
    let raw = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(doc) => Some(doc),
        Err(err) => {
            warn!(target: "fs", "Ignoring malformed settings file {}: {}", path.display(), err);
            None
        }
    }
}

/// Write the sidecar into `dir`. Failures are logged and swallowed so a
/// read-only root never breaks the request that changed the settings.
pub fn save_settings(dir: &Path, doc: &SettingsDoc) {
    let path = dir.join(SETTINGS_FILE);
    let body = match serde_json::to_string_pretty(doc) {
        Ok(s) => s,
        Err(err) => {
            warn!(target: "fs", "Failed to serialize settings: {}", err);
            return;
        }
    };
    if let Err(err) = fs::write(&path, body + "\n") {
        warn!(target: "fs", "Failed to persist settings to {}: {}", path.display(), err);
    }
}
