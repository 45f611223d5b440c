use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const EVO_DIR: &str = ".evo";
pub const CONFIG_FILE: &str = ".evo/config.yaml";
pub const STATE_FILE: &str = ".evo/state.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn evo_dir(root: &Path) -> PathBuf {
    root.join(EVO_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn state_path(root: &Path) -> PathBuf {
    root.join(STATE_FILE)
}

/// Default sandbox location: a sibling directory named `<repo>-sandbox`, so
/// the sandbox never shares the main repository's working tree.
pub fn default_sandbox_dir(root: &Path) -> PathBuf {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "repo".to_string());
    match root.parent() {
        Some(parent) => parent.join(format!("{name}-sandbox")),
        None => PathBuf::from(format!("{name}-sandbox")),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
