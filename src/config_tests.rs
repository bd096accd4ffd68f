use std::fs;

use tempfile::tempdir;

use super::*;
use crate::settings::SettingsDoc;

fn state_in(dir: &Path) -> ConfigState {
    ConfigState::bootstrap(8080, dir, 50.0, true).unwrap()
}

#[test]
fn bootstrap_creates_and_canonicalizes_root() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("data");
    assert!(!root.exists());
    let state = state_in(&root);
    assert!(root.is_dir());
    assert_eq!(state.root_real(), fs::canonicalize(&root).unwrap());
    assert_eq!(state.initial_root_real(), state.root_real());
}

#[test]
fn max_upload_mb_is_floored_and_clamped() {
    let tmp = tempdir().unwrap();
    let mut state = state_in(tmp.path());
    state.set_max_upload_mb(0.5);
    assert_eq!(state.max_upload_mb(), 1);
    state.set_max_upload_mb(2000.0);
    assert_eq!(state.max_upload_mb(), 1024);
    state.set_max_upload_mb(50.9);
    assert_eq!(state.max_upload_mb(), 50);
    assert_eq!(state.max_upload_bytes(), 50 * 1024 * 1024);
}

#[test]
fn allowed_types_falls_back_to_default() {
    let tmp = tempdir().unwrap();
    let mut state = state_in(tmp.path());
    assert_eq!(state.allowed_types(), DEFAULT_ALLOWED_TYPES);
    state.set_allowed_types(Some("pdf, txt".to_string()));
    assert_eq!(state.allowed_types(), "pdf, txt");
    state.set_allowed_types(None);
    assert_eq!(state.allowed_types(), DEFAULT_ALLOWED_TYPES);
}

#[test]
fn ignore_names_drops_empty_entries() {
    let tmp = tempdir().unwrap();
    let mut state = state_in(tmp.path());
    state.set_ignore_names(vec!["".to_string(), ".git".to_string(), "".to_string()]);
    assert_eq!(state.ignore_names(), &[".git".to_string()]);
}

#[test]
fn theme_parse_accepts_only_exact_values() {
    assert_eq!(Theme::parse("dark"), Some(Theme::Dark));
    assert_eq!(Theme::parse("light"), Some(Theme::Light));
    assert_eq!(Theme::parse("DARK"), None);
    assert_eq!(Theme::parse("solarized"), None);
    assert_eq!(Theme::parse(""), None);
}

#[test]
fn set_root_allows_descendants_of_initial_root() {
    let tmp = tempdir().unwrap();
    let mut state = state_in(tmp.path());
    let sub = tmp.path().join("projects");
    state.set_root(&sub).unwrap();
    assert!(sub.is_dir());
    assert_eq!(state.root_real(), fs::canonicalize(&sub).unwrap());
    // The guard stays anchored to the startup root.
    assert_eq!(state.initial_root_real(), fs::canonicalize(tmp.path()).unwrap());
}

#[test]
fn set_root_rejects_paths_outside_initial_root() {
    let tmp = tempdir().unwrap();
    let other = tempdir().unwrap();
    let mut state = state_in(tmp.path());
    let before = state.root_real().to_path_buf();
    let err = state.set_root(other.path()).unwrap_err();
    assert_eq!(err.code_str(), "forbidden");
    assert_eq!(state.root_real(), before);
}

#[test]
fn set_root_rejection_creates_nothing() {
    let outer = tempdir().unwrap();
    let mut state = state_in(&outer.path().join("root"));
    let evil = outer.path().join("evil").join("deep").join("chain");

    let err = state.set_root(&evil).unwrap_err();
    assert_eq!(err.code_str(), "forbidden");
    // The refused chain must not appear on disk, not even partially.
    assert!(!outer.path().join("evil").exists());
    assert_eq!(state.root_real(), fs::canonicalize(outer.path().join("root")).unwrap());
}

#[cfg(unix)]
#[test]
fn set_root_refuses_symlinked_escape_without_creating() {
    let outer = tempdir().unwrap();
    let root = outer.path().join("root");
    let mut state = state_in(&root);
    std::os::unix::fs::symlink(outer.path(), root.join("portal")).unwrap();

    let err = state.set_root(&root.join("portal").join("landing")).unwrap_err();
    assert_eq!(err.code_str(), "forbidden");
    assert!(!outer.path().join("landing").exists());
}

#[test]
fn apply_settings_moves_root_and_reanchors_guard() {
    let tmp = tempdir().unwrap();
    let elsewhere = tempdir().unwrap();
    let mut state = state_in(tmp.path());
    let doc = SettingsDoc {
        root: Some(elsewhere.path().to_string_lossy().into_owned()),
        max_upload_mb: Some(10.0),
        allowed_types: Some("pdf".to_string()),
        ignore_names: Some(vec!["tmp".to_string()]),
        theme: Some("dark".to_string()),
    };
    state.apply_settings(&doc).unwrap();
    assert_eq!(state.root_real(), fs::canonicalize(elsewhere.path()).unwrap());
    assert_eq!(state.initial_root_real(), state.root_real());
    assert_eq!(state.max_upload_mb(), 10);
    assert_eq!(state.allowed_types(), "pdf");
    assert_eq!(state.ignore_names(), &["tmp".to_string()]);
    assert_eq!(state.theme(), Theme::Dark);
    // The settings root is now the anchor, so the old one is off limits.
    let err = state.set_root(tmp.path()).unwrap_err();
    assert_eq!(err.code_str(), "forbidden");
}

#[test]
fn apply_settings_ignores_invalid_values() {
    let tmp = tempdir().unwrap();
    let mut state = state_in(tmp.path());
    let doc = SettingsDoc {
        root: Some("   ".to_string()),
        max_upload_mb: Some(-3.0),
        allowed_types: None,
        ignore_names: None,
        theme: Some("neon".to_string()),
    };
    state.apply_settings(&doc).unwrap();
    assert_eq!(state.root_real(), fs::canonicalize(tmp.path()).unwrap());
    assert_eq!(state.max_upload_mb(), 50);
    assert_eq!(state.theme(), Theme::Light);
}

#[test]
fn apply_settings_makes_allow_list_concrete() {
    let tmp = tempdir().unwrap();
    let mut state = state_in(tmp.path());
    state.apply_settings(&SettingsDoc { allowed_types: Some(String::new()), ..Default::default() }).unwrap();
    assert_eq!(state.allowed_types(), DEFAULT_ALLOWED_TYPES);

    let mut state = state_in(tmp.path());
    state.apply_settings(&SettingsDoc::default()).unwrap();
    assert_eq!(state.allowed_types(), DEFAULT_ALLOWED_TYPES);
}

#[test]
fn snapshot_is_isolated_from_later_updates() {
    let tmp = tempdir().unwrap();
    let shared = SharedConfig::new(state_in(tmp.path()));
    let snap = shared.snapshot();
    shared.0.write().set_max_upload_mb(7.0);
    assert_eq!(snap.max_upload_mb(), 50);
    assert_eq!(shared.snapshot().max_upload_mb(), 7);
}
