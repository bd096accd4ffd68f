//! Small helpers shared by the upload and preview paths.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static UNDERSCORE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+").unwrap());
static WHITESPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

pub fn is_image_like(mime_type: &str) -> bool {
    mime_type.starts_with("image/")
}

/// Check a filename's extension against a comma-separated allow-list.
/// Matching is case-insensitive and an empty list allows everything.
/// A file without an extension never matches a non-empty list.
pub fn is_allowed_type(filename: &str, allowed: &str) -> bool {
    let list: Vec<String> = allowed
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if list.is_empty() {
        return true;
    }
    let ext = match filename.rfind('.') {
        Some(pos) => filename[pos + 1..].to_lowercase(),
        None => String::new(),
    };
    list.iter().any(|a| *a == ext)
}

/// Make a client-supplied filename safe to store:
/// Unicode is NFKC-normalized, path components are stripped down to the base
/// name, control characters and separators are removed, Windows-reserved
/// characters become '_', runs of underscores and whitespace collapse, and
/// leading/trailing dots are dropped. Empty or dot-only results become
/// "unnamed", and the total length is capped at 120 characters while keeping
/// the extension when possible.
pub fn sanitize_filename(input: &str) -> String {
    const MAX_LEN: usize = 120;
    let normalized: String = input.nfkc().collect();
    let normalized = normalized.trim();

    // Only the base name matters; anything before the last separator goes.
    let just_name = normalized.rsplit(['/', '\\']).next().unwrap_or("");

    // Dotfiles like ".env" and trailing-dot names carry no extension.
    let (base, ext) = match just_name.rfind('.') {
        Some(pos) if pos > 0 && pos < just_name.len() - 1 => {
            (&just_name[..pos], &just_name[pos + 1..])
        }
        _ => (just_name, ""),
    };

    let mut base = clean_component(base);
    let ext = clean_component(ext);

    if base.is_empty() || base == "." || base == ".." {
        base = "unnamed".to_string();
    }

    let mut candidate = if ext.is_empty() { base.clone() } else { format!("{base}.{ext}") };
    if candidate.chars().count() > MAX_LEN {
        let ext_len = ext.chars().count();
        if !ext.is_empty() && ext_len < MAX_LEN - 1 {
            let keep = (MAX_LEN - (ext_len + 1)).max(1);
            let kept: String = base.chars().take(keep).collect();
            candidate = format!("{kept}.{ext}");
        } else {
            candidate = candidate.chars().take(MAX_LEN).collect();
        }
    }
    candidate
}

fn clean_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        let code = ch as u32;
        if code < 32 || code == 127 || ch == '/' || ch == '\\' {
            continue;
        }
        if matches!(ch, '<' | '>' | ':' | '"' | '|' | '?' | '*') {
            out.push('_');
        } else {
            out.push(ch);
        }
    }
    let out = UNDERSCORE_RUNS.replace_all(&out, "_");
    let out = WHITESPACE_RUNS.replace_all(&out, " ");
    out.trim().trim_end_matches('.').trim_start_matches('.').trim().to_string()
}
