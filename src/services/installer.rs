use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use sysinfo::Disks;

use crate::errors::{EngineError, Result};
use crate::models::{
    ComponentName, ComponentState, InstallOptions, InstallSummary, InstallationManifest,
    InstallationStatus, PackageDescriptor, ProgressCallback, RemoteObject, StatusCallback,
    UninstallSummary,
};
use crate::services::backup::{self, BACKUP_DIR_NAME};
use crate::services::download_manager::{CancelHandle, DownloadManager};
use crate::services::manifest_store::ManifestStore;
use crate::services::{archive, integrity};
use crate::utils::file::{copy_dir_recursive, prune_empty_parents};
use crate::utils::paths;

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Expected sizes are multiplied by this before the free-space comparison:
/// archive, extracted copy and final copy may coexist briefly.
const SPACE_HEADROOM_FACTOR: u64 = 3;

/// Resolves a game id to its install directory, probing candidate paths and
/// returning the first that exists on disk.
pub trait GameLocator: Send + Sync {
    fn locate(&self, game_id: &str) -> Option<PathBuf>;
}

/// Fixed candidate lists per game id.
#[derive(Default)]
pub struct StaticLocator {
    candidates: HashMap<String, Vec<PathBuf>>,
}

impl StaticLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_candidates(&mut self, game_id: impl Into<String>, paths: Vec<PathBuf>) {
        self.candidates.entry(game_id.into()).or_default().extend(paths);
    }
}

impl GameLocator for StaticLocator {
    fn locate(&self, game_id: &str) -> Option<PathBuf> {
        self.candidates
            .get(game_id)?
            .iter()
            .find(|path| path.is_dir())
            .cloned()
    }
}

/// Turns an archive reference from a package descriptor into a fetchable URL.
pub trait ArchiveResolver: Send + Sync {
    fn resolve_url(&self, archive_ref: &str) -> Result<String>;
}

/// Archive references that already are URLs.
pub struct DirectUrlResolver;

impl ArchiveResolver for DirectUrlResolver {
    fn resolve_url(&self, archive_ref: &str) -> Result<String> {
        Ok(archive_ref.to_string())
    }
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Engine-owned manifest cache directory.
    pub cache_dir: PathBuf,
    /// Root for per-install scratch workspaces.
    pub temp_root: PathBuf,
    /// Shared absolute location for achievements files. `None` means the
    /// platform does not support the achievements component.
    pub achievements_dir: Option<PathBuf>,
    pub max_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: paths::resolve_cache_dir(),
            temp_root: std::env::temp_dir(),
            achievements_dir: paths::default_achievements_dir(),
            max_retries: crate::services::download_manager::DEFAULT_MAX_RETRIES,
        }
    }
}

/// Sequences download, verification, extraction, backup, copy and manifest
/// persistence for translation packages, and reverses the whole thing.
#[derive(Clone)]
pub struct TranslationEngine {
    config: EngineConfig,
    downloads: DownloadManager,
    manifests: ManifestStore,
    locator: Arc<dyn GameLocator>,
    resolver: Arc<dyn ArchiveResolver>,
    target_locks: Arc<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>>,
}

struct StagedComponent {
    name: ComponentName,
    files: Vec<PathBuf>,
}

impl TranslationEngine {
    pub fn new(
        config: EngineConfig,
        locator: Arc<dyn GameLocator>,
        resolver: Arc<dyn ArchiveResolver>,
    ) -> Self {
        let manifests = ManifestStore::new(config.cache_dir.clone());
        Self {
            config,
            downloads: DownloadManager::new(),
            manifests,
            locator,
            resolver,
            target_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn manifest_store(&self) -> &ManifestStore {
        &self.manifests
    }

    /// Abort the currently running download, if any. The install call that
    /// owns it fails with a cancellation error and is not retried.
    pub fn abort_active_download(&self) {
        self.downloads.abort_active();
    }

    pub fn check_installation(&self, game_id: &str) -> Result<Option<InstallationManifest>> {
        let located = self.locator.locate(game_id);
        self.manifests.load(game_id, located.as_deref())
    }

    pub fn list_installed_ids(&self) -> Result<Vec<String>> {
        self.manifests.list_installed_ids()
    }

    pub fn invalidate_installed_ids_cache(&self) {
        self.manifests.invalidate_ids_cache();
    }

    /// Run the full install workflow for one package.
    ///
    /// Installs against the same target directory are serialized; phases that
    /// completed before a failure (a backup already taken) are not rolled
    /// back.
    pub async fn install(
        &self,
        package: &PackageDescriptor,
        options: &InstallOptions,
        on_progress: Option<&ProgressCallback>,
        on_status: Option<&StatusCallback>,
    ) -> Result<InstallSummary> {
        let target_dir = options
            .target_dir_override
            .clone()
            .filter(|path| path.is_dir())
            .or_else(|| self.locator.locate(&package.game_id))
            .ok_or_else(|| EngineError::TargetNotFound(package.game_id.clone()))?;

        let lock = self.target_lock(&target_dir);
        let _guard = lock.lock().await;

        let workspace = self
            .config
            .temp_root
            .join(format!("langpack_{}", package.game_id));
        let result = self
            .run_install(package, options, &target_dir, &workspace, on_progress, on_status)
            .await;

        if let Err(err) = std::fs::remove_dir_all(&workspace) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!("workspace cleanup failed: {}", err);
            }
        }
        result
    }

    async fn run_install(
        &self,
        package: &PackageDescriptor,
        options: &InstallOptions,
        target_dir: &Path,
        workspace: &Path,
        on_progress: Option<&ProgressCallback>,
        on_status: Option<&StatusCallback>,
    ) -> Result<InstallSummary> {
        let components = self.select_components(package, options);

        emit_status(on_status, InstallationStatus::phase("Checking disk space"));
        self.preflight_space(&components, target_dir)?;

        if workspace.exists() {
            std::fs::remove_dir_all(workspace)?;
        }
        let staging_dir = workspace.join("staging");
        let achievements_staging = workspace.join("achievements");
        std::fs::create_dir_all(&staging_dir)?;

        let token = CancelHandle::new();
        let mut staged: Vec<StagedComponent> = Vec::new();

        for (name, remote) in &components {
            let files = self
                .fetch_component(
                    *name,
                    remote,
                    workspace,
                    if *name == ComponentName::Achievements {
                        &achievements_staging
                    } else {
                        &staging_dir
                    },
                    &token,
                    on_progress,
                    on_status,
                )
                .await?;

            if *name == ComponentName::Text {
                if let Some(installer) = self.find_embedded_installer(package, &staging_dir) {
                    return self
                        .delegate_install(package, target_dir, &installer, on_status)
                        .await;
                }
            }

            staged.push(StagedComponent { name: *name, files });
        }

        let mut files_backed_up = 0u32;
        if options.backup_enabled {
            emit_status(on_status, InstallationStatus::phase("Backing up original files"));
            files_backed_up = backup::backup(&staging_dir, target_dir)?;
        }

        emit_status(on_status, InstallationStatus::phase("Copying files"));
        let mut files_installed = copy_dir_recursive(&staging_dir, target_dir)?;
        if achievements_staging.is_dir() {
            if let Some(achievements_dir) = &self.config.achievements_dir {
                files_installed += copy_dir_recursive(&achievements_staging, achievements_dir)?;
            }
        }

        emit_status(on_status, InstallationStatus::phase("Saving manifest"));
        let manifest = self.build_manifest(package, options, target_dir, &staged);
        self.manifests.save(&manifest)?;

        emit_status(on_status, InstallationStatus::phase("Installation complete"));
        tracing::info!(
            "installed translation {} v{} into {}",
            package.game_id,
            package.version,
            target_dir.display()
        );

        Ok(InstallSummary {
            game_id: package.game_id.clone(),
            delegated: false,
            files_installed,
            files_backed_up,
        })
    }

    fn select_components<'a>(
        &self,
        package: &'a PackageDescriptor,
        options: &InstallOptions,
    ) -> Vec<(ComponentName, &'a RemoteObject)> {
        let mut components = vec![(ComponentName::Text, &package.text)];

        if options.install_voice {
            if let Some(voice) = &package.voice {
                components.push((ComponentName::Voice, voice));
            }
        }

        if options.install_achievements {
            match (&package.achievements, &self.config.achievements_dir) {
                (Some(achievements), Some(_)) => {
                    components.push((ComponentName::Achievements, achievements));
                }
                (Some(_), None) => {
                    tracing::info!(
                        "achievements component not supported on this platform, skipping"
                    );
                }
                (None, _) => {}
            }
        }

        components
    }

    fn preflight_space(
        &self,
        components: &[(ComponentName, &RemoteObject)],
        target_dir: &Path,
    ) -> Result<()> {
        let expected: u64 = components
            .iter()
            .fold(0u64, |total, (_, remote)| {
                total.saturating_add(remote.expected_size)
            });
        let required = expected.saturating_mul(SPACE_HEADROOM_FACTOR);

        if let Some(available) = available_disk_space(target_dir) {
            if available < required {
                return Err(EngineError::InsufficientSpace {
                    required,
                    available,
                });
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn fetch_component(
        &self,
        name: ComponentName,
        remote: &RemoteObject,
        workspace: &Path,
        staging_dir: &Path,
        token: &CancelHandle,
        on_progress: Option<&ProgressCallback>,
        on_status: Option<&StatusCallback>,
    ) -> Result<Vec<PathBuf>> {
        let url = self.resolver.resolve_url(&remote.archive_ref)?;
        let archive_path = workspace.join(format!("{}.zip", name.as_str()));

        emit_status(
            on_status,
            InstallationStatus::phase(format!("Downloading {} package", name.as_str())),
        );
        self.downloads
            .download(
                &url,
                &archive_path,
                on_progress,
                on_status,
                self.config.max_retries,
                token,
            )
            .await?;

        let archive_size = std::fs::metadata(&archive_path).map(|m| m.len()).unwrap_or(0);
        if archive_size == 0 {
            return Err(EngineError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("downloaded archive {} is missing or empty", archive_path.display()),
            )));
        }

        if let Some(expected_hash) = &remote.expected_hash {
            emit_status(
                on_status,
                InstallationStatus::phase(format!("Verifying {} package", name.as_str())),
            );
            if !integrity::verify(&archive_path, expected_hash)? {
                let actual = integrity::full_hash(&archive_path)?;
                let _ = std::fs::remove_file(&archive_path);
                return Err(EngineError::Integrity {
                    path: archive_path,
                    expected: expected_hash.clone(),
                    actual,
                });
            }
        }

        emit_status(
            on_status,
            InstallationStatus::phase(format!("Extracting {} package", name.as_str())),
        );
        archive::extract(&archive_path, staging_dir, on_status)
    }

    fn find_embedded_installer(
        &self,
        package: &PackageDescriptor,
        staging_dir: &Path,
    ) -> Option<PathBuf> {
        let marker = package.embedded_installer.as_deref()?;
        if !is_installer_artifact(marker) {
            return None;
        }
        let candidate = staging_dir.join(marker);
        candidate.is_file().then_some(candidate)
    }

    /// Divergent terminal state: the package carries its own installer, which
    /// manages the target directory itself. No backup, no copy; the manifest
    /// records the text component with an empty file list.
    async fn delegate_install(
        &self,
        package: &PackageDescriptor,
        target_dir: &Path,
        installer_path: &Path,
        on_status: Option<&StatusCallback>,
    ) -> Result<InstallSummary> {
        emit_status(on_status, InstallationStatus::phase("Running package installer"));
        tracing::info!("delegating install to {}", installer_path.display());

        let mut command = std::process::Command::new(installer_path);
        if let Some(parent) = installer_path.parent() {
            command.current_dir(parent);
        }
        hide_console_window(&mut command);

        let status = command
            .status()
            .map_err(|err| EngineError::DelegatedInstaller(err.to_string()))?;
        if !status.success() {
            return Err(EngineError::DelegatedInstaller(format!(
                "installer exited with {}",
                status
            )));
        }

        let mut components = BTreeMap::new();
        components.insert(
            ComponentName::Text,
            ComponentState {
                installed: true,
                files: Vec::new(),
            },
        );
        let manifest = InstallationManifest {
            game_id: package.game_id.clone(),
            version: package.version.clone(),
            installed_at: Utc::now(),
            target_directory: target_dir.to_path_buf(),
            has_backup: false,
            installed_files: Vec::new(),
            components,
        };
        self.manifests.save(&manifest)?;

        Ok(InstallSummary {
            game_id: package.game_id.clone(),
            delegated: true,
            files_installed: 0,
            files_backed_up: 0,
        })
    }

    fn build_manifest(
        &self,
        package: &PackageDescriptor,
        options: &InstallOptions,
        target_dir: &Path,
        staged: &[StagedComponent],
    ) -> InstallationManifest {
        let mut components = BTreeMap::new();
        let mut installed_files = Vec::new();

        for component in staged {
            let files: Vec<String> = match component.name {
                ComponentName::Achievements => {
                    let achievements_dir = self
                        .config
                        .achievements_dir
                        .clone()
                        .unwrap_or_default();
                    component
                        .files
                        .iter()
                        .map(|relative| {
                            achievements_dir.join(relative).to_string_lossy().into_owned()
                        })
                        .collect()
                }
                _ => component
                    .files
                    .iter()
                    .map(|relative| relative.to_string_lossy().into_owned())
                    .collect(),
            };

            if component.name != ComponentName::Achievements {
                installed_files.extend(files.iter().cloned());
            }
            components.insert(
                component.name,
                ComponentState {
                    installed: true,
                    files,
                },
            );
        }

        InstallationManifest {
            game_id: package.game_id.clone(),
            version: package.version.clone(),
            installed_at: Utc::now(),
            target_directory: target_dir.to_path_buf(),
            has_backup: options.backup_enabled,
            installed_files,
            components,
        }
    }

    /// Reverse an install using only the manifest and the backup tree.
    pub async fn uninstall(&self, game_id: &str) -> Result<UninstallSummary> {
        let located = self.locator.locate(game_id);
        let manifest = self
            .manifests
            .load(game_id, located.as_deref())?
            .ok_or_else(|| EngineError::NotInstalled(game_id.to_string()))?;

        let target_dir = manifest.target_directory.clone();
        let lock = self.target_lock(&target_dir);
        let _guard = lock.lock().await;

        let mut files_removed = 0u32;
        let mut files_missing = 0u32;

        for (name, state) in &manifest.components {
            for file in &state.files {
                let path = if *name == ComponentName::Achievements {
                    PathBuf::from(file)
                } else {
                    target_dir.join(file)
                };

                if path.is_file() {
                    std::fs::remove_file(&path).map_err(|err| {
                        if err.kind() == io::ErrorKind::PermissionDenied {
                            EngineError::Permission(path.display().to_string())
                        } else {
                            EngineError::Io(err)
                        }
                    })?;
                    files_removed += 1;
                } else {
                    tracing::warn!("tracked file already gone: {}", path.display());
                    files_missing += 1;
                    continue;
                }

                if let Some(parent) = path.parent() {
                    let stop = if *name == ComponentName::Achievements {
                        self.config.achievements_dir.as_deref()
                    } else {
                        Some(target_dir.as_path())
                    };
                    if let Some(stop) = stop {
                        prune_empty_parents(parent, stop);
                    }
                }
            }
        }

        let backup_dir = target_dir.join(BACKUP_DIR_NAME);
        let mut restored_backup = false;
        if manifest.has_backup && backup_dir.is_dir() {
            backup::restore(&backup_dir, &target_dir)?;
            std::fs::remove_dir_all(&backup_dir)?;
            restored_backup = true;
        }

        self.manifests.delete(game_id, Some(&target_dir))?;

        tracing::info!(
            "uninstalled translation {} from {} ({} files removed, {} missing)",
            game_id,
            target_dir.display(),
            files_removed,
            files_missing
        );

        Ok(UninstallSummary {
            game_id: game_id.to_string(),
            files_removed,
            files_missing,
            restored_backup,
        })
    }

    fn target_lock(&self, target_dir: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .target_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(target_dir.to_path_buf())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

fn emit_status(on_status: Option<&StatusCallback>, status: InstallationStatus) {
    if let Some(callback) = on_status {
        callback(status);
    }
}

fn is_installer_artifact(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    cfg!(target_os = "windows") && lower.ends_with(".exe")
}

#[inline]
fn hide_console_window(command: &mut std::process::Command) {
    #[cfg(target_os = "windows")]
    {
        command.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(not(target_os = "windows"))]
    {
        let _ = command;
    }
}

fn nearest_existing_path(path: &Path) -> PathBuf {
    let mut candidate = path.to_path_buf();
    while !candidate.exists() {
        if !candidate.pop() {
            return PathBuf::from(".");
        }
    }
    candidate
}

fn available_disk_space(path: &Path) -> Option<u64> {
    let target = nearest_existing_path(path);
    let target = std::fs::canonicalize(&target).unwrap_or(target);
    let disks = Disks::new_with_refreshed_list();

    let mut best: Option<(usize, u64)> = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if target.starts_with(mount) {
            let score = mount.as_os_str().to_string_lossy().len();
            match best {
                Some((best_score, _)) if best_score >= score => {}
                _ => best = Some((score, disk.available_space())),
            }
        }
    }

    best.map(|(_, available)| available)
        .or_else(|| disks.list().first().map(|disk| disk.available_space()))
}
