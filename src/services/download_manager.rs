use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::errors::{EngineError, Result};
use crate::models::{DownloadProgress, InstallationStatus, ProgressCallback, StatusCallback};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DownloadControl {
    Running,
    Cancelled,
}

/// Owned handle for one in-flight transfer. Cloned freely; triggering it
/// aborts the transfer and removes the partial destination file.
#[derive(Clone)]
pub struct CancelHandle {
    control: watch::Sender<DownloadControl>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (control, _rx) = watch::channel(DownloadControl::Running);
        Self { control }
    }

    pub fn cancel(&self) {
        let _ = self.control.send(DownloadControl::Cancelled);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.control.borrow() == DownloadControl::Cancelled
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Resilient transfer of one remote object to a local path.
///
/// At most one transfer is in flight process-wide; a second caller waits
/// for the slot. The handle of the active transfer is kept so it can be
/// aborted from outside the install call.
#[derive(Clone)]
pub struct DownloadManager {
    client: reqwest::Client,
    transfer_slot: Arc<tokio::sync::Mutex<()>>,
    active: Arc<Mutex<Option<CancelHandle>>>,
}

impl DownloadManager {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .pool_max_idle_per_host(4)
            .build()
            .unwrap_or_default();

        Self {
            client,
            transfer_slot: Arc::new(tokio::sync::Mutex::new(())),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Cancel whichever transfer currently holds the slot, if any.
    pub fn abort_active(&self) {
        if let Ok(active) = self.active.lock() {
            if let Some(handle) = active.as_ref() {
                handle.cancel();
            }
        }
    }

    /// Download `url` to `destination` with retries and cooperative
    /// cancellation. Any failure leaves no partial file behind.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        on_progress: Option<&ProgressCallback>,
        on_status: Option<&StatusCallback>,
        max_retries: u32,
        token: &CancelHandle,
    ) -> Result<()> {
        let _slot = self.transfer_slot.lock().await;
        if let Ok(mut active) = self.active.lock() {
            *active = Some(token.clone());
        }

        let result = self
            .download_with_retry(url, destination, on_progress, on_status, max_retries, token)
            .await;

        if let Ok(mut active) = self.active.lock() {
            *active = None;
        }
        result
    }

    async fn download_with_retry(
        &self,
        url: &str,
        destination: &Path,
        on_progress: Option<&ProgressCallback>,
        on_status: Option<&StatusCallback>,
        max_retries: u32,
        token: &CancelHandle,
    ) -> Result<()> {
        let attempts = max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                tracing::debug!(
                    "retry {}/{} for {} after {:?}",
                    attempt + 1,
                    attempts,
                    url,
                    delay
                );
                if let Some(callback) = on_status {
                    callback(InstallationStatus::phase(format!(
                        "Retrying download ({}/{})",
                        attempt + 1,
                        attempts
                    )));
                }
                sleep(delay).await;
            }

            if token.is_cancelled() {
                remove_partial(destination).await;
                return Err(EngineError::Cancelled);
            }

            match self
                .attempt_download(url, destination, on_progress, token)
                .await
            {
                Ok(()) => return Ok(()),
                Err(err) => {
                    remove_partial(destination).await;
                    if !err.is_retryable() {
                        tracing::warn!("download of {} failed without retry: {}", url, err);
                        return Err(err);
                    }
                    tracing::warn!("download attempt for {} failed: {}", url, err);
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or(EngineError::Cancelled))
    }

    async fn attempt_download(
        &self,
        url: &str,
        destination: &Path,
        on_progress: Option<&ProgressCallback>,
        token: &CancelHandle,
    ) -> Result<()> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let total_size = response.content_length().unwrap_or(0);
        let mut downloaded: u64 = 0;
        let started = Instant::now();
        let mut last_emit: Option<Instant> = None;

        let mut file = tokio::fs::File::create(destination).await?;
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = stream.next().await {
            if token.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let chunk = chunk_result?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            let due = last_emit.map_or(true, |at| at.elapsed() >= PROGRESS_INTERVAL);
            if due {
                if let Some(callback) = on_progress {
                    callback(make_progress(downloaded, total_size, started));
                }
                last_emit = Some(Instant::now());
            }
        }

        file.flush().await?;
        file.sync_all().await?;

        if let Some(callback) = on_progress {
            callback(make_progress(downloaded, total_size.max(downloaded), started));
        }

        tracing::info!("downloaded {} bytes from {}", downloaded, url);
        Ok(())
    }
}

impl Default for DownloadManager {
    fn default() -> Self {
        Self::new()
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exponential = Duration::from_secs(1 << attempt.min(4));
    exponential.min(MAX_BACKOFF)
}

fn make_progress(downloaded: u64, total: u64, started: Instant) -> DownloadProgress {
    let elapsed = started.elapsed().as_secs_f64();
    let speed = if elapsed > 0.0 {
        (downloaded as f64 / elapsed) as u64
    } else {
        0
    };
    let remaining = total.saturating_sub(downloaded);
    let eta = if speed > 0 { remaining / speed } else { 0 };

    DownloadProgress {
        bytes_transferred: downloaded,
        bytes_total: total,
        percent: if total > 0 {
            (downloaded as f64 / total as f64) * 100.0
        } else {
            0.0
        },
        bytes_per_second: speed,
        eta_seconds: eta,
    }
}

async fn remove_partial(destination: &Path) {
    if tokio::fs::remove_file(destination).await.is_ok() {
        tracing::debug!("removed partial file {}", destination.display());
    }
}
