use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One independently downloadable sub-package of a translation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ComponentName {
    Text,
    Voice,
    Achievements,
}

impl ComponentName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentName::Text => "text",
            ComponentName::Voice => "voice",
            ComponentName::Achievements => "achievements",
        }
    }
}

/// A remote archive plus what we expect of it once it lands on disk.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RemoteObject {
    pub archive_ref: String,
    pub expected_hash: Option<String>,
    pub expected_size: u64,
}

/// Everything needed to install one translation package onto one game.
/// Immutable for the duration of a single install call.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PackageDescriptor {
    pub game_id: String,
    pub version: String,
    pub title: Option<String>,
    pub text: RemoteObject,
    #[serde(default)]
    pub voice: Option<RemoteObject>,
    #[serde(default)]
    pub achievements: Option<RemoteObject>,
    /// Named file inside the primary archive that, when recognized as an
    /// executable installer for the current platform, takes over the install.
    #[serde(default)]
    pub embedded_installer: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InstallOptions {
    #[serde(default)]
    pub target_dir_override: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub backup_enabled: bool,
    #[serde(default)]
    pub install_voice: bool,
    #[serde(default)]
    pub install_achievements: bool,
}

fn default_true() -> bool {
    true
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            target_dir_override: None,
            backup_enabled: true,
            install_voice: false,
            install_achievements: false,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DownloadProgress {
    pub bytes_transferred: u64,
    pub bytes_total: u64,
    pub percent: f64,
    pub bytes_per_second: u64,
    pub eta_seconds: u64,
}

/// Human-readable phase feedback for the UI. Never used for control flow.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InstallationStatus {
    pub message: String,
    pub percent: Option<f64>,
}

impl InstallationStatus {
    pub fn phase(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            percent: None,
        }
    }

    pub fn with_percent(message: impl Into<String>, percent: f64) -> Self {
        Self {
            message: message.into(),
            percent: Some(percent),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ComponentState {
    pub installed: bool,
    /// Target-relative paths, except for the achievements component whose
    /// files live outside the game directory and are stored absolute.
    #[serde(default)]
    pub files: Vec<String>,
}

/// Durable record of a completed install, used to drive uninstall.
///
/// Very old installs wrote only `installed_files`; `normalize` folds that
/// shape into the component map before any logic runs.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InstallationManifest {
    pub game_id: String,
    pub version: String,
    pub installed_at: DateTime<Utc>,
    pub target_directory: PathBuf,
    #[serde(default)]
    pub has_backup: bool,
    #[serde(default)]
    pub installed_files: Vec<String>,
    #[serde(default)]
    pub components: BTreeMap<ComponentName, ComponentState>,
}

impl InstallationManifest {
    pub fn normalize(mut self) -> Self {
        if self.components.is_empty() && !self.installed_files.is_empty() {
            self.components.insert(
                ComponentName::Text,
                ComponentState {
                    installed: true,
                    files: self.installed_files.clone(),
                },
            );
        }
        self
    }

    pub fn component(&self, name: ComponentName) -> Option<&ComponentState> {
        self.components.get(&name)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InstallSummary {
    pub game_id: String,
    pub delegated: bool,
    pub files_installed: u32,
    pub files_backed_up: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UninstallSummary {
    pub game_id: String,
    pub files_removed: u32,
    pub files_missing: u32,
    pub restored_backup: bool,
}

pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;
pub type StatusCallback = Arc<dyn Fn(InstallationStatus) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_manifest_normalizes_into_text_component() {
        let json = r#"{
            "game_id": "gw-211",
            "version": "1.4",
            "installed_at": "2024-03-01T10:00:00Z",
            "target_directory": "/games/gw",
            "has_backup": true,
            "installed_files": ["data.txt", "locale/ru.pak"]
        }"#;

        let manifest: InstallationManifest = serde_json::from_str(json).unwrap();
        let manifest = manifest.normalize();

        let text = manifest.component(ComponentName::Text).unwrap();
        assert!(text.installed);
        assert_eq!(text.files, vec!["data.txt", "locale/ru.pak"]);
        assert!(manifest.component(ComponentName::Voice).is_none());
    }

    #[test]
    fn component_manifest_is_left_untouched_by_normalize() {
        let json = r#"{
            "game_id": "gw-211",
            "version": "2.0",
            "installed_at": "2025-01-15T08:30:00Z",
            "target_directory": "/games/gw",
            "has_backup": false,
            "installed_files": ["data.txt"],
            "components": {
                "text": { "installed": true, "files": ["data.txt"] },
                "voice": { "installed": true, "files": ["audio/ru_voice.pak"] }
            }
        }"#;

        let manifest: InstallationManifest = serde_json::from_str::<InstallationManifest>(json).unwrap().normalize();
        assert_eq!(manifest.components.len(), 2);
        assert_eq!(
            manifest.component(ComponentName::Voice).unwrap().files,
            vec!["audio/ru_voice.pak"]
        );
    }
}
