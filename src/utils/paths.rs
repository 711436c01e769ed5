use std::path::{Path, PathBuf};

fn ensure_dir(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    if std::fs::create_dir_all(path).is_ok() {
        return Some(path.to_path_buf());
    }
    None
}

pub fn resolve_root_dir() -> PathBuf {
    if let Ok(value) = std::env::var("LANGPACK_ROOT_DIR") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            let path = PathBuf::from(trimmed);
            if let Some(dir) = ensure_dir(&path) {
                return dir;
            }
        }
    }

    if let Some(data_dir) = dirs::data_dir() {
        let candidate = data_dir.join("langpack");
        if let Some(dir) = ensure_dir(&candidate) {
            return dir;
        }
    }

    if let Some(home) = dirs::home_dir() {
        let candidate = home.join(".langpack");
        if let Some(dir) = ensure_dir(&candidate) {
            return dir;
        }
    }

    PathBuf::from(".")
}

/// Engine-owned manifest cache, keyed by game id.
pub fn resolve_cache_dir() -> PathBuf {
    let root = resolve_root_dir();
    let cache = root.join("manifests");
    ensure_dir(&cache).unwrap_or(cache)
}

pub fn resolve_log_dir() -> PathBuf {
    if let Ok(value) = std::env::var("LANGPACK_LOG_DIR") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            let path = PathBuf::from(trimmed);
            if let Some(dir) = ensure_dir(&path) {
                return dir;
            }
        }
    }

    let root = resolve_root_dir();
    let logs = root.join("logs");
    ensure_dir(&logs).unwrap_or(logs)
}

/// Shared location for achievements files, outside any game directory.
/// Only Windows hosts one; elsewhere the achievements component is skipped.
pub fn default_achievements_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        dirs::config_dir().map(|dir| dir.join("langpack").join("achievements"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        None
    }
}
