//! Runtime server configuration.
//! Holds the mutable state every request reads (root, upload limit, allowed
//! upload types, listing ignore list, theme) behind a shared lock, plus the
//! root-reconfiguration guard: the root may be moved at runtime, but only to
//! a directory that still resolves inside the root captured at startup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{env, fs};

use anyhow::Context;
use parking_lot::RwLock;
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::fs::paths::existing_ancestor;
use crate::settings::SettingsDoc;

pub const DEFAULT_ALLOWED_TYPES: &str = "jpg, jpeg, gif, png, webp, 7z, zip";
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl Default for Theme {
    fn default() -> Self { Theme::Light }
}

impl Theme {
    /// Accepts exactly "light" or "dark"; anything else is None.
    pub fn parse(v: &str) -> Option<Theme> {
        match v {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

/// Mutable server configuration. Handlers take a `clone()` snapshot per
/// request through `SharedConfig::snapshot`, so a config update landing
/// mid-request never changes the values that request already read.
#[derive(Debug, Clone)]
pub struct ConfigState {
    port: u16,
    /// Configured root directory (absolute).
    root: PathBuf,
    /// Canonicalized root, recomputed only when the root changes.
    root_real: PathBuf,
    /// Canonical root captured at startup; all later roots must live inside it.
    initial_root_real: PathBuf,
    max_upload_mb: u64,
    allowed_types: Option<String>,
    ignore_names: Vec<String>,
    theme: Theme,
    expose_root: bool,
}

impl ConfigState {
    /// Build a state rooted at the given directory, creating it if needed.
    /// This is the pre-settings baseline; `apply_settings` may still move the
    /// root before the server starts serving.
    pub fn bootstrap(port: u16, root: &Path, max_upload_mb: f64, expose_root: bool) -> anyhow::Result<Self> {
        let root = root
            .absolutize()
            .with_context(|| format!("Failed to absolutize root path: {}", root.display()))?
            .into_owned();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create or access root: {}", root.display()))?;
        let root_real = fs::canonicalize(&root)
            .with_context(|| format!("Failed to resolve root: {}", root.display()))?;
        let mut state = Self {
            port,
            root,
            root_real: root_real.clone(),
            initial_root_real: root_real,
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
            allowed_types: None,
            ignore_names: vec![".settings.json".to_string()],
            theme: Theme::default(),
            expose_root,
        };
        state.set_max_upload_mb(max_upload_mb);
        Ok(state)
    }

    /// Read the environment and build the pre-settings state.
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("FILEWARDEN_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8080);
        let root = env::var("FILEWARDEN_ROOT").unwrap_or_else(|_| "./data".to_string());
        let max_upload_mb = env::var("FILEWARDEN_MAX_UPLOAD_MB")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_MB as f64);
        let expose_root = env::var("FILEWARDEN_EXPOSE_ROOT").map(|v| v != "false").unwrap_or(true);
        Self::bootstrap(port, Path::new(&root), max_upload_mb, expose_root)
    }

    /// Apply the persisted settings document loaded at startup. A root found
    /// here becomes the process's initial root: it is not constrained by the
    /// pre-settings root, and the reconfiguration guard is re-anchored to it.
    pub fn apply_settings(&mut self, doc: &SettingsDoc) -> anyhow::Result<()> {
        if let Some(root) = doc.root.as_deref() {
            let trimmed = root.trim();
            if !trimmed.is_empty() {
                let resolved = Path::new(trimmed)
                    .absolutize()
                    .with_context(|| format!("Failed to absolutize settings root: {}", trimmed))?
                    .into_owned();
                fs::create_dir_all(&resolved)
                    .with_context(|| format!("Failed to create settings root: {}", resolved.display()))?;
                let real = fs::canonicalize(&resolved)
                    .with_context(|| format!("Failed to resolve settings root: {}", resolved.display()))?;
                self.root = resolved;
                self.root_real = real.clone();
                self.initial_root_real = real;
            }
        }
        if let Some(n) = doc.max_upload_mb {
            if n > 0.0 {
                self.set_max_upload_mb(n);
            }
        }
        if let Some(types) = doc.allowed_types.clone() {
            self.set_allowed_types(Some(types));
        }
        if let Some(names) = doc.ignore_names.clone() {
            self.set_ignore_names(names);
        }
        if let Some(theme) = doc.theme.as_deref().and_then(Theme::parse) {
            self.set_theme(theme);
        }
        // After startup the allow-list is always concrete, never unset or blank.
        if self.allowed_types.as_deref().map_or(true, |s| s.is_empty()) {
            self.allowed_types = Some(DEFAULT_ALLOWED_TYPES.to_string());
        }
        Ok(())
    }

    pub fn port(&self) -> u16 { self.port }
    pub fn root(&self) -> &Path { &self.root }
    pub fn root_real(&self) -> &Path { &self.root_real }
    pub fn initial_root_real(&self) -> &Path { &self.initial_root_real }
    pub fn max_upload_mb(&self) -> u64 { self.max_upload_mb }
    pub fn max_upload_bytes(&self) -> u64 { self.max_upload_mb * 1024 * 1024 }
    pub fn allowed_types(&self) -> &str { self.allowed_types.as_deref().unwrap_or(DEFAULT_ALLOWED_TYPES) }
    pub fn ignore_names(&self) -> &[String] { &self.ignore_names }
    pub fn theme(&self) -> Theme { self.theme }
    pub fn expose_root(&self) -> bool { self.expose_root }

    /// Move the root at runtime. Containment is proved before anything is
    /// created: the deepest existing ancestor of the new path must
    /// canonicalize to the initial root or a descendant. Only then is the
    /// directory created (if absent), canonicalized and adopted. A rejected
    /// move leaves both the state and the filesystem untouched.
    pub fn set_root(&mut self, new_root: &Path) -> AppResult<()> {
        let escape = || {
            AppError::forbidden(
                "forbidden",
                "New root must stay within the initial root directory",
            )
        };
        let resolved = new_root.absolutize()?.into_owned();
        let anchor_real = fs::canonicalize(existing_ancestor(&resolved))?;
        if anchor_real.strip_prefix(&self.initial_root_real).is_err() {
            return Err(escape());
        }
        fs::create_dir_all(&resolved)?;
        let real = fs::canonicalize(&resolved)?;
        if real.strip_prefix(&self.initial_root_real).is_err() {
            return Err(escape());
        }
        self.root = resolved;
        self.root_real = real;
        Ok(())
    }

    /// Clamp to [1, 1024] MB after flooring.
    pub fn set_max_upload_mb(&mut self, n: f64) {
        self.max_upload_mb = (n.floor() as u64).clamp(1, 1024);
    }

    pub fn set_allowed_types(&mut self, v: Option<String>) {
        self.allowed_types = v;
    }

    /// Empty strings are dropped from the list.
    pub fn set_ignore_names(&mut self, v: Vec<String>) {
        self.ignore_names = v.into_iter().filter(|s| !s.is_empty()).collect();
    }

    pub fn set_theme(&mut self, v: Theme) {
        self.theme = v;
    }
}

#[derive(Clone)]
pub struct SharedConfig(pub Arc<RwLock<ConfigState>>);

impl SharedConfig {
    pub fn new(state: ConfigState) -> Self { Self(Arc::new(RwLock::new(state))) }

    /// Per-request snapshot. Cheap to clone and safe to hold across awaits.
    pub fn snapshot(&self) -> ConfigState { self.0.read().clone() }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
