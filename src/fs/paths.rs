//! Path resolution anchored at the canonical root.
//!
//! API paths arrive as `/`-separated strings relative to the configured
//! root. Resolution happens in two stages: a lexical join against the
//! root's realpath (which neutralizes `..` and absolute-looking input
//! before anything touches the disk), then a canonicalization proof that
//! the on-disk location, after following every symlink, still lies inside
//! the root. Paths that do not exist yet are proved through their parent
//! chain instead, so new files can be created without weakening the check.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use path_absolutize::Absolutize;

use crate::error::{AppError, AppResult};

/// Resolver for one canonical root. Cheap to build from a config snapshot;
/// holds no handles, only the anchor path.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root_real: PathBuf,
}

impl Sandbox {
    /// `root_real` must already be canonical (the config layer keeps it so).
    pub fn new(root_real: &Path) -> Self {
        Self { root_real: root_real.to_path_buf() }
    }

    pub fn root_real(&self) -> &Path {
        &self.root_real
    }

    /// Join an API path under the root and prove containment lexically.
    /// Backslashes are treated as separators, a leading `/` is implied, and
    /// the combined path is normalized without consulting the filesystem.
    /// Traversal that escapes the root fails here with `forbidden`, even
    /// when the path does not exist.
    fn lexical_join(&self, api_path: &str) -> AppResult<PathBuf> {
        if api_path.contains('\0') {
            return Err(AppError::validation("validation_error", "Path contains an invalid character"));
        }
        let rel = api_path.replace('\\', "/");
        let rel = if rel.starts_with('/') { rel } else { format!("/{rel}") };
        // The "." prefix keeps absolute-looking input relative to the root.
        let combined = self.root_real.join(format!(".{rel}"));
        let combined = combined.absolutize()?.into_owned();
        if combined.strip_prefix(&self.root_real).is_err() {
            return Err(AppError::traversal());
        }
        Ok(combined)
    }

    /// Resolve an API path for operations that act through symlinks.
    ///
    /// Existing targets are canonicalized and the result must stay inside
    /// the root; a leaf or intermediate symlink escaping the root fails
    /// with `forbidden` before the caller performs any I/O. Targets that
    /// do not exist (new files, dangling links) are proved through the
    /// parent directory's canonical path instead, then rejoined with the
    /// leaf name. The returned path is the validated join, so callers
    /// reach the entry itself and the OS follows safe leaf symlinks.
    pub fn resolve(&self, api_path: &str) -> AppResult<PathBuf> {
        let combined = self.lexical_join(api_path)?;
        match fs::canonicalize(&combined) {
            Ok(real) => {
                if real.strip_prefix(&self.root_real).is_err() {
                    return Err(AppError::traversal());
                }
                Ok(combined)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let parent = combined.parent().ok_or_else(AppError::traversal)?;
                let leaf = combined.file_name().ok_or_else(AppError::traversal)?;
                let parent_real = fs::canonicalize(parent)?;
                if parent_real.strip_prefix(&self.root_real).is_err() {
                    return Err(AppError::traversal());
                }
                Ok(parent_real.join(leaf))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Resolve for operations that act on a link itself (delete). Only the
    /// parent chain is proved; the leaf is never followed, so a dangling or
    /// escaping link can still be removed. The root resolves to itself so
    /// callers can apply their root-protection checks.
    pub fn resolve_no_follow(&self, api_path: &str) -> AppResult<PathBuf> {
        let combined = self.lexical_join(api_path)?;
        if combined == self.root_real {
            return Ok(combined);
        }
        let parent = combined.parent().ok_or_else(AppError::traversal)?;
        let parent_real = fs::canonicalize(parent)?;
        if parent_real.strip_prefix(&self.root_real).is_err() {
            return Err(AppError::traversal());
        }
        Ok(combined)
    }

    /// Resolve a destination directory that may be several levels short of
    /// existing. The deepest existing ancestor of the combined path is
    /// canonicalized and must lie inside the root; every component below it
    /// is absent and will be created as a real directory. Returns the
    /// validated join, ready for `create_dir_all`.
    pub fn resolve_for_create(&self, api_path: &str) -> AppResult<PathBuf> {
        let combined = self.lexical_join(api_path)?;
        let anchor_real = fs::canonicalize(existing_ancestor(&combined))?;
        if anchor_real.strip_prefix(&self.root_real).is_err() {
            return Err(AppError::traversal());
        }
        Ok(combined)
    }

    /// Map an absolute path back to its API form ("/" for the root itself).
    /// Always `/`-separated regardless of host OS.
    pub fn api_path(&self, abs: &Path) -> String {
        let rel = abs.strip_prefix(&self.root_real).unwrap_or_else(|_| Path::new(""));
        let joined = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        format!("/{joined}")
    }
}

/// The path itself when it exists, otherwise the nearest existing parent.
/// Reaches the filesystem root in the worst case, which always exists.
pub(crate) fn existing_ancestor(path: &Path) -> &Path {
    let mut current = path;
    loop {
        if current.exists() {
            return current;
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return current,
        }
    }
}
