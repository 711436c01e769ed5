use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::errors::Result;
use crate::models::InstallationManifest;
use crate::utils::file::write_atomic;

/// Fixed manifest file name inside an installed game directory.
pub const MANIFEST_FILE_NAME: &str = "langpack_manifest.json";

/// Durable record of installed translations, readable even when the game
/// directory itself cannot be located.
///
/// Every manifest is persisted twice: beside the installed content and in
/// the engine-owned cache keyed by game id. The copy next to the content is
/// authoritative whenever the game directory is reachable; the cache exists
/// for non-standard install paths.
#[derive(Clone)]
pub struct ManifestStore {
    cache_dir: PathBuf,
    installed_ids: Arc<Mutex<Option<Vec<String>>>>,
}

impl ManifestStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            installed_ids: Arc::new(Mutex::new(None)),
        }
    }

    fn cache_path(&self, game_id: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", game_id))
    }

    pub fn save(&self, manifest: &InstallationManifest) -> Result<()> {
        let payload = serde_json::to_string_pretty(manifest)?;

        let primary = manifest.target_directory.join(MANIFEST_FILE_NAME);
        write_atomic(&primary, payload.as_bytes())?;
        write_atomic(&self.cache_path(&manifest.game_id), payload.as_bytes())?;

        self.invalidate_ids_cache();
        Ok(())
    }

    /// Load the manifest for `game_id`.
    ///
    /// A manifest found in the currently locatable game directory wins over
    /// the cache copy, and the cache is resynced to it: the same game can be
    /// reinstalled through a standard location after a manual install to a
    /// custom path, and the standard location must win once it exists. The
    /// cache copy is only trusted while its recorded target directory still
    /// exists and still carries a manifest file; otherwise it is stale and
    /// gets dropped.
    pub fn load(
        &self,
        game_id: &str,
        located_dir: Option<&Path>,
    ) -> Result<Option<InstallationManifest>> {
        if let Some(dir) = located_dir {
            let primary = dir.join(MANIFEST_FILE_NAME);
            if primary.is_file() {
                let manifest = read_manifest(&primary)?;
                self.resync_cache(&manifest);
                return Ok(Some(manifest));
            }
        }

        let cache_path = self.cache_path(game_id);
        if !cache_path.is_file() {
            return Ok(None);
        }

        let manifest = read_manifest(&cache_path)?;
        let recorded_manifest = manifest.target_directory.join(MANIFEST_FILE_NAME);
        if !manifest.target_directory.is_dir() || !recorded_manifest.is_file() {
            tracing::info!(
                "dropping stale manifest cache entry for {} ({})",
                game_id,
                manifest.target_directory.display()
            );
            let _ = std::fs::remove_file(&cache_path);
            self.invalidate_ids_cache();
            return Ok(None);
        }

        Ok(Some(manifest))
    }

    fn resync_cache(&self, manifest: &InstallationManifest) {
        let cache_path = self.cache_path(&manifest.game_id);
        match serde_json::to_string_pretty(manifest) {
            Ok(payload) => {
                let current = std::fs::read_to_string(&cache_path).ok();
                if current.as_deref() != Some(payload.as_str()) {
                    if let Err(err) = write_atomic(&cache_path, payload.as_bytes()) {
                        tracing::warn!("manifest cache resync failed: {}", err);
                    } else {
                        self.invalidate_ids_cache();
                    }
                }
            }
            Err(err) => tracing::warn!("manifest cache resync failed: {}", err),
        }
    }

    /// Remove both manifest copies.
    pub fn delete(&self, game_id: &str, target_dir: Option<&Path>) -> Result<()> {
        if let Some(dir) = target_dir {
            let primary = dir.join(MANIFEST_FILE_NAME);
            if primary.exists() {
                std::fs::remove_file(&primary)?;
            }
        }
        let cache_path = self.cache_path(game_id);
        if cache_path.exists() {
            std::fs::remove_file(&cache_path)?;
        }
        self.invalidate_ids_cache();
        Ok(())
    }

    /// Ids with a cached manifest entry. The scan result is memoized until
    /// an install, uninstall or external change invalidates it.
    pub fn list_installed_ids(&self) -> Result<Vec<String>> {
        if let Ok(cached) = self.installed_ids.lock() {
            if let Some(ids) = cached.as_ref() {
                return Ok(ids.clone());
            }
        }

        let mut ids = Vec::new();
        if self.cache_dir.is_dir() {
            for entry in std::fs::read_dir(&self.cache_dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                    if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                        ids.push(stem.to_string());
                    }
                }
            }
        }
        ids.sort();

        if let Ok(mut cached) = self.installed_ids.lock() {
            *cached = Some(ids.clone());
        }
        Ok(ids)
    }

    pub fn invalidate_ids_cache(&self) {
        if let Ok(mut cached) = self.installed_ids.lock() {
            *cached = None;
        }
    }
}

fn read_manifest(path: &Path) -> Result<InstallationManifest> {
    let content = std::fs::read_to_string(path)?;
    let manifest: InstallationManifest = serde_json::from_str(&content)?;
    Ok(manifest.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComponentName, ComponentState};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn manifest_for(game_id: &str, target: &Path, version: &str) -> InstallationManifest {
        let mut components = BTreeMap::new();
        components.insert(
            ComponentName::Text,
            ComponentState {
                installed: true,
                files: vec!["data.txt".to_string()],
            },
        );
        InstallationManifest {
            game_id: game_id.to_string(),
            version: version.to_string(),
            installed_at: Utc::now(),
            target_directory: target.to_path_buf(),
            has_backup: true,
            installed_files: vec!["data.txt".to_string()],
            components,
        }
    }

    #[test]
    fn save_persists_both_copies() {
        let cache = tempdir().unwrap();
        let target = tempdir().unwrap();
        let store = ManifestStore::new(cache.path().to_path_buf());

        store
            .save(&manifest_for("gw-211", target.path(), "1.0"))
            .unwrap();

        assert!(target.path().join(MANIFEST_FILE_NAME).is_file());
        assert!(cache.path().join("gw-211.json").is_file());
    }

    #[test]
    fn located_directory_wins_and_resyncs_cache() {
        let cache = tempdir().unwrap();
        let standard = tempdir().unwrap();
        let custom = tempdir().unwrap();
        let store = ManifestStore::new(cache.path().to_path_buf());

        // Old manual install at a custom path, recorded in the cache.
        store
            .save(&manifest_for("gw-211", custom.path(), "1.0"))
            .unwrap();

        // Newer install through the standard location, cache not yet updated.
        let standard_manifest = manifest_for("gw-211", standard.path(), "2.0");
        let payload = serde_json::to_string_pretty(&standard_manifest).unwrap();
        std::fs::write(standard.path().join(MANIFEST_FILE_NAME), payload).unwrap();

        let loaded = store
            .load("gw-211", Some(standard.path()))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.version, "2.0");
        assert_eq!(loaded.target_directory, standard.path());

        let cached: InstallationManifest = serde_json::from_str(
            &std::fs::read_to_string(cache.path().join("gw-211.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(cached.version, "2.0");
        assert_eq!(cached.target_directory, standard.path());
    }

    #[test]
    fn stale_cache_entry_is_dropped() {
        let cache = tempdir().unwrap();
        let store = ManifestStore::new(cache.path().to_path_buf());

        let gone = cache.path().join("no-longer-there");
        store.save(&manifest_for("gw-211", &gone, "1.0")).unwrap();
        std::fs::remove_dir_all(&gone).unwrap();

        assert!(store.load("gw-211", None).unwrap().is_none());
        assert!(!cache.path().join("gw-211.json").exists());
    }

    #[test]
    fn cache_fallback_requires_manifest_at_recorded_target() {
        let cache = tempdir().unwrap();
        let target = tempdir().unwrap();
        let store = ManifestStore::new(cache.path().to_path_buf());

        store
            .save(&manifest_for("gw-211", target.path(), "1.0"))
            .unwrap();

        // Directory not locatable, but the recorded target is intact.
        let loaded = store.load("gw-211", None).unwrap().unwrap();
        assert_eq!(loaded.version, "1.0");

        // Once the primary copy disappears the cache entry is stale.
        std::fs::remove_file(target.path().join(MANIFEST_FILE_NAME)).unwrap();
        assert!(store.load("gw-211", None).unwrap().is_none());
    }

    #[test]
    fn installed_ids_are_cached_until_invalidated() {
        let cache = tempdir().unwrap();
        let target = tempdir().unwrap();
        let store = ManifestStore::new(cache.path().to_path_buf());

        store
            .save(&manifest_for("alpha", target.path(), "1.0"))
            .unwrap();
        assert_eq!(store.list_installed_ids().unwrap(), vec!["alpha"]);

        // External change the store has not been told about.
        std::fs::write(cache.path().join("beta.json"), b"{}").unwrap();
        assert_eq!(store.list_installed_ids().unwrap(), vec!["alpha"]);

        store.invalidate_ids_cache();
        assert_eq!(store.list_installed_ids().unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn delete_removes_both_copies() {
        let cache = tempdir().unwrap();
        let target = tempdir().unwrap();
        let store = ManifestStore::new(cache.path().to_path_buf());

        store
            .save(&manifest_for("gw-211", target.path(), "1.0"))
            .unwrap();
        store.delete("gw-211", Some(target.path())).unwrap();

        assert!(!target.path().join(MANIFEST_FILE_NAME).exists());
        assert!(!cache.path().join("gw-211.json").exists());
    }
}
