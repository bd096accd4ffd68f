//! Mutation operations: mkdir, rename and delete, each re-validating
//! containment and protecting the root itself.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;
use walkdir::WalkDir;

use super::Sandbox;
use crate::error::{AppError, AppResult};

/// Matches an optional " (N)" counter at the end of a name.
static NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.*?)(?: \((\d+)\))?$").unwrap());

#[derive(Debug)]
pub struct MkdirOutcome {
    pub path: String,
    pub name: String,
}

#[derive(Debug)]
pub struct RenameOutcome {
    pub from: String,
    pub to: String,
}

#[derive(Debug)]
pub struct DeleteOutcome {
    pub path: String,
    pub target_type: &'static str,
}

/// Create a directory, never merging into an existing one: on collision
/// the name gets a " (N)" counter, continuing an existing counter if the
/// desired name already carries one.
pub fn make_directory(sandbox: &Sandbox, api_path: &str) -> AppResult<MkdirOutcome> {
    let target = sandbox.resolve(api_path)?;
    // The root's parent lies outside the sandbox, so the root itself can
    // never be a mkdir target.
    if target == sandbox.root_real() {
        return Err(AppError::traversal());
    }
    let parent = target.parent().ok_or_else(AppError::traversal)?.to_path_buf();
    let desired = target.file_name().ok_or_else(AppError::traversal)?.to_string_lossy().into_owned();

    let (final_path, final_name) = if target.exists() {
        unique_directory_name(&parent, &desired)
    } else {
        (target.clone(), desired)
    };
    fs::create_dir(&final_path)?;
    Ok(MkdirOutcome { path: sandbox.api_path(&final_path), name: final_name })
}

/// Rename or move an entry. Neither endpoint may be the root: the source
/// check keeps the root in place, the destination check keeps another
/// path from collapsing onto it.
pub fn rename_entry(sandbox: &Sandbox, from: &str, to: &str) -> AppResult<RenameOutcome> {
    let src = sandbox.resolve(from)?;
    let dst = sandbox.resolve(to)?;
    let from_api = sandbox.api_path(&src);
    let to_api = sandbox.api_path(&dst);
    if src == sandbox.root_real() || from_api == "/" {
        return Err(AppError::forbidden_root("Renaming root is forbidden"));
    }
    if dst == sandbox.root_real() || to_api == "/" {
        return Err(AppError::invalid_op("invalid_operation", "Invalid rename target: root"));
    }
    fs::rename(&src, &dst)?;
    Ok(RenameOutcome { from: from_api, to: to_api })
}

/// Delete a file, directory tree, or symlink. Resolution does not follow
/// the leaf, so deleting a symlink removes the link itself even when its
/// target is a directory or lies outside the root.
pub fn delete_entry(sandbox: &Sandbox, api_path: &str) -> AppResult<DeleteOutcome> {
    let target = sandbox.resolve_no_follow(api_path)?;
    if target == sandbox.root_real() || sandbox.api_path(&target) == "/" {
        return Err(AppError::forbidden_root("Deleting root is forbidden"));
    }
    let meta = fs::symlink_metadata(&target)?;
    let target_type = if meta.is_dir() { "directory" } else { "file" };
    if meta.file_type().is_symlink() {
        fs::remove_file(&target)?;
    } else if meta.is_dir() {
        remove_dir_recursive(&target)?;
    } else {
        fs::remove_file(&target)?;
    }
    Ok(DeleteOutcome { path: sandbox.api_path(&target), target_type })
}

/// First free "name (N)" variant in `parent`, starting after any counter
/// already present in `desired`.
pub fn unique_directory_name(parent: &Path, desired: &str) -> (PathBuf, String) {
    let (base, start) = next_counter(desired);
    let mut i = start;
    loop {
        let cand = format!("{base} ({i})");
        let abs = parent.join(&cand);
        if !abs.exists() {
            return (abs, cand);
        }
        i += 1;
    }
}

/// Find a free file name in `dir`, numbering before the extension:
/// "report.pdf" collides into "report (2).pdf". After thousands of
/// collisions fall back to a timestamp suffix.
pub fn unique_file_name(dir: &Path, desired: &str) -> String {
    if !dir.join(desired).exists() {
        return desired.to_string();
    }
    let (stem, ext) = split_extension(desired);
    let (base, start) = next_counter(stem);
    let mut i = start;
    let cap = start.saturating_add(10_000);
    while i < cap {
        let cand = join_extension(&format!("{base} ({i})"), ext);
        if !dir.join(&cand).exists() {
            return cand;
        }
        i += 1;
    }
    join_extension(&format!("{base}-{}", Utc::now().timestamp_millis()), ext)
}

fn next_counter(desired: &str) -> (String, u64) {
    match NUMBERED.captures(desired) {
        Some(caps) => {
            let base = caps.get(1).map(|m| m.as_str()).unwrap_or(desired).to_string();
            let start = caps
                .get(2)
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .and_then(|n| n.checked_add(1))
                .unwrap_or(2);
            (base, start)
        }
        None => (desired.to_string(), 2),
    }
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos < name.len() - 1 => (&name[..pos], &name[pos + 1..]),
        _ => (name, ""),
    }
}

fn join_extension(stem: &str, ext: &str) -> String {
    if ext.is_empty() { stem.to_string() } else { format!("{stem}.{ext}") }
}

/// Remove a directory tree without following symlinks. Entries that fail
/// to delete are logged and skipped; the call fails only if the top
/// directory itself survives.
fn remove_dir_recursive(top: &Path) -> AppResult<()> {
    for entry in WalkDir::new(top).contents_first(true).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(target: "fs", "Skipping unreadable entry under {}: {}", top.display(), err);
                continue;
            }
        };
        if entry.path() == top {
            continue;
        }
        let removed = if entry.file_type().is_dir() {
            fs::remove_dir(entry.path())
        } else {
            fs::remove_file(entry.path())
        };
        if let Err(err) = removed {
            warn!(target: "fs", "Failed to remove {}: {}", entry.path().display(), err);
        }
    }
    fs::remove_dir(top)?;
    Ok(())
}
