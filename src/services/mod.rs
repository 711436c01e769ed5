pub mod archive;
pub mod backup;
pub mod download_manager;
pub mod installer;
pub mod integrity;
pub mod manifest_store;

pub use download_manager::{CancelHandle, DownloadManager, DEFAULT_MAX_RETRIES};
pub use installer::{
    ArchiveResolver, DirectUrlResolver, EngineConfig, GameLocator, StaticLocator,
    TranslationEngine,
};
pub use manifest_store::{ManifestStore, MANIFEST_FILE_NAME};
