//! Installation and integrity engine for game translation packages.
//!
//! Downloads translation archives, verifies them with a size-tiered hash,
//! extracts them, backs up the files about to be overwritten, copies the
//! result into an externally-owned game directory and keeps a recoverable
//! manifest so the whole operation can be reversed.

pub mod errors;
pub mod logging;
pub mod models;
pub mod services;
pub mod utils;

pub use errors::{EngineError, Result};
pub use models::{
    ComponentName, ComponentState, DownloadProgress, InstallOptions, InstallSummary,
    InstallationManifest, InstallationStatus, PackageDescriptor, ProgressCallback, RemoteObject,
    StatusCallback, UninstallSummary,
};
pub use services::{
    ArchiveResolver, CancelHandle, DirectUrlResolver, DownloadManager, EngineConfig, GameLocator,
    ManifestStore, StaticLocator, TranslationEngine,
};
