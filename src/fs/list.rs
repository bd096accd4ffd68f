//! Directory listing with sorting, pagination and symlink-aware metadata.

use std::cmp::Ordering;
use std::fs::{self, Metadata};
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::classify::{classify, EntryKind};
use super::Sandbox;
use crate::error::AppResult;

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

/// Raw query parameters, kept as strings so malformed numbers fall back to
/// defaults instead of rejecting the whole request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub path: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Name,
    Mtime,
    Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// One directory entry as exposed to the client. Unsafe and broken
/// symlinks carry zeroed metadata so nothing outside the root leaks.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FsEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub is_broken: bool,
    pub is_unsafe: bool,
    pub size: u64,
    pub mtime_ms: i64,
    pub mime: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub path: String,
    pub items: Vec<FsEntry>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub has_more: bool,
    pub sort: SortKey,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatResponse {
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub mtime_ms: i64,
}

/// List one directory. Ignore-names are filtered before pagination, so
/// `total` counts only visible entries.
pub fn list_directory(sandbox: &Sandbox, ignore_names: &[String], query: &ListQuery) -> AppResult<ListResponse> {
    let api_path = query.path.as_deref().unwrap_or("/");
    let target = sandbox.resolve(api_path)?;
    let page = coerce_page(query.page.as_deref());
    let limit = coerce_limit(query.limit.as_deref());
    let sort = coerce_sort(query.sort.as_deref());
    let order = coerce_order(query.order.as_deref());

    let mut all = Vec::new();
    for entry in fs::read_dir(&target)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if ignore_names.iter().any(|n| *n == name) {
            continue;
        }
        all.push(build_entry(sandbox, &target, name));
    }

    sort_entries(&mut all, sort, order);

    let total = all.len();
    let start = (page - 1).saturating_mul(limit);
    let end = start.saturating_add(limit).min(total);
    let items = if start < total { all[start..end].to_vec() } else { Vec::new() };
    let has_more = end < total;

    Ok(ListResponse {
        path: sandbox.api_path(&target),
        items,
        page,
        limit,
        total,
        has_more,
        sort,
        order,
    })
}

pub fn stat_path(sandbox: &Sandbox, api_path: &str) -> AppResult<StatResponse> {
    let target = sandbox.resolve(api_path)?;
    let meta = fs::metadata(&target)?;
    Ok(StatResponse {
        path: sandbox.api_path(&target),
        is_dir: meta.is_dir(),
        size: meta.len(),
        mtime_ms: mtime_millis(&meta),
    })
}

fn build_entry(sandbox: &Sandbox, dir: &Path, name: String) -> FsEntry {
    let abs = dir.join(&name);
    let api = sandbox.api_path(&abs);
    let (is_symlink, stat_target) = match classify(&abs, sandbox) {
        EntryKind::UnsafeSymlink => {
            return masked_entry(name, api, true, false, true);
        }
        EntryKind::BrokenSymlink => {
            return masked_entry(name, api, true, true, false);
        }
        EntryKind::SafeSymlink(real) => (true, real),
        EntryKind::Regular | EntryKind::Directory => (false, abs.clone()),
    };
    // Entries can vanish between readdir and stat; degrade, don't fail.
    let meta = match fs::metadata(&stat_target) {
        Ok(meta) => meta,
        Err(err) => {
            warn!(target: "fs", "stat failed for {}: {}", stat_target.display(), err);
            return masked_entry(name, api, is_symlink, true, false);
        }
    };
    let is_dir = meta.is_dir();
    let mime = if is_dir { None } else { mime_for(&name) };
    FsEntry {
        name,
        path: api,
        is_dir,
        is_symlink,
        is_broken: false,
        is_unsafe: false,
        size: meta.len(),
        mtime_ms: mtime_millis(&meta),
        mime,
    }
}

fn masked_entry(name: String, path: String, is_symlink: bool, is_broken: bool, is_unsafe: bool) -> FsEntry {
    FsEntry {
        name,
        path,
        is_dir: false,
        is_symlink,
        is_broken,
        is_unsafe,
        size: 0,
        mtime_ms: 0,
        mime: None,
    }
}

/// Directories always sort before files; the requested order reverses the
/// key comparison only.
fn sort_entries(items: &mut [FsEntry], sort: SortKey, order: SortOrder) {
    items.sort_by(|a, b| {
        let dirs = b.is_dir.cmp(&a.is_dir);
        if dirs != Ordering::Equal {
            return dirs;
        }
        let cmp = match sort {
            SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortKey::Mtime => a.mtime_ms.cmp(&b.mtime_ms),
            SortKey::Size => a.size.cmp(&b.size),
        };
        match order {
            SortOrder::Asc => cmp,
            SortOrder::Desc => cmp.reverse(),
        }
    });
}

fn coerce_page(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .map(|n| n.floor())
        .filter(|n| *n >= 1.0)
        .map(|n| n as usize)
        .unwrap_or(1)
}

fn coerce_limit(raw: Option<&str>) -> usize {
    let n = raw
        .and_then(|s| s.trim().parse::<f64>().ok())
        .map(|n| n.floor())
        .unwrap_or(f64::NAN);
    if !n.is_finite() || n == 0.0 {
        return DEFAULT_LIMIT;
    }
    (n as usize).clamp(1, MAX_LIMIT)
}

fn coerce_sort(raw: Option<&str>) -> SortKey {
    match raw {
        Some("mtime") => SortKey::Mtime,
        Some("size") => SortKey::Size,
        _ => SortKey::Name,
    }
}

fn coerce_order(raw: Option<&str>) -> SortOrder {
    if raw == Some("desc") {
        SortOrder::Desc
    } else {
        SortOrder::Asc
    }
}

pub fn mtime_millis(meta: &Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub fn mime_for(name: &str) -> Option<String> {
    mime_guess::from_path(name).first().map(|m| m.essence_str().to_string())
}
