//! Symlink classification for directory listings.

use std::fs;
use std::path::Path;

use tracing::warn;

use super::Sandbox;

/// What a directory entry turned out to be once links are chased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
    /// Symlink whose target canonicalizes inside the root; carries the
    /// resolved target so callers can stat the real file.
    SafeSymlink(std::path::PathBuf),
    /// Symlink whose target canonicalizes outside the root. Listings must
    /// never leak the target's metadata.
    UnsafeSymlink,
    /// Symlink whose target cannot be resolved, or an entry that vanished
    /// between readdir and lstat.
    BrokenSymlink,
}

/// Classify one absolute path. Never fails: problems degrade to
/// `BrokenSymlink` with a warning so a single bad entry cannot take down
/// a whole listing.
pub fn classify(abs: &Path, sandbox: &Sandbox) -> EntryKind {
    let meta = match fs::symlink_metadata(abs) {
        Ok(meta) => meta,
        Err(err) => {
            warn!(target: "fs", "lstat failed for {}: {}", abs.display(), err);
            return EntryKind::BrokenSymlink;
        }
    };
    if !meta.file_type().is_symlink() {
        return if meta.is_dir() { EntryKind::Directory } else { EntryKind::Regular };
    }
    match fs::canonicalize(abs) {
        Ok(real) => {
            if real.strip_prefix(sandbox.root_real()).is_ok() {
                EntryKind::SafeSymlink(real)
            } else {
                EntryKind::UnsafeSymlink
            }
        }
        Err(err) => {
            warn!(target: "fs", "Broken symlink at {}: {}", abs.display(), err);
            EntryKind::BrokenSymlink
        }
    }
}
