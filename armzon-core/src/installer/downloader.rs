//! Async file downloader with progress reporting.
//!
//! This module streams a remote archive to disk using reqwest, reading the
//! body in fixed 8 KiB chunks so that cancellation and progress are checked
//! at a predictable granularity.

use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use super::error::InstallError;
use super::types::RemoteSource;

/// Size of each body read.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Bytes between progress reports when the server sends no length.
pub const INDETERMINATE_REPORT_INTERVAL: u64 = 1024 * 1024;

/// Client header sent with every request.
pub const DEFAULT_USER_AGENT: &str = "MobileApp/1.0";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Settings
// ============================================================================

/// Network settings for the downloader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSettings {
    /// Seconds allowed for establishing the connection.
    pub connect_timeout_secs: u64,
    /// Seconds allowed for each body read.
    pub read_timeout_secs: u64,
    /// Value of the `User-Agent` header.
    pub user_agent: String,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl DownloadSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

// ============================================================================
// URL Validation
// ============================================================================

/// Checks that the URL parses, uses HTTP(S) and names a host.
fn validate_url(url_str: &str) -> Result<Url, InstallError> {
    let url = Url::parse(url_str)
        .map_err(|e| InstallError::Network(format!("Invalid URL {}: {}", url_str, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(InstallError::Network(format!(
            "Unsupported URL scheme '{}': {}",
            url.scheme(),
            url_str
        )));
    }

    if url.host_str().is_none() {
        return Err(InstallError::Network(format!(
            "URL must have a host: {}",
            url_str
        )));
    }

    Ok(url)
}

// ============================================================================
// Download Progress
// ============================================================================

/// Progress information during a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Bytes written so far.
    pub bytes_downloaded: u64,
    /// Total bytes expected (if known from Content-Length header).
    pub total_bytes: Option<u64>,
    /// Whole percent (0 to 100), or None if total is unknown.
    pub percent: Option<u8>,
}

impl DownloadProgress {
    fn new(bytes_downloaded: u64, total_bytes: Option<u64>) -> Self {
        let percent = total_bytes.map(|total| {
            if total == 0 {
                0
            } else {
                (bytes_downloaded.saturating_mul(100) / total).min(100) as u8
            }
        });

        Self {
            bytes_downloaded,
            total_bytes,
            percent,
        }
    }

    fn completed(bytes_downloaded: u64, total_bytes: Option<u64>) -> Self {
        Self {
            bytes_downloaded,
            total_bytes,
            percent: total_bytes.map(|_| 100),
        }
    }

    /// Returns true if the server did not announce a length.
    pub fn is_indeterminate(&self) -> bool {
        self.percent.is_none()
    }
}

// ============================================================================
// Downloader
// ============================================================================

/// Streams remote resources to local files.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    read_timeout: Duration,
}

impl Downloader {
    /// Creates a downloader with the given timeouts and client header.
    pub fn new(settings: &DownloadSettings) -> Result<Self, InstallError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout())
            .user_agent(settings.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            read_timeout: settings.read_timeout(),
        })
    }

    /// Downloads `source.url` into `source.destination`.
    ///
    /// The destination is truncated first; nothing is resumed. A start and a
    /// completion update are always reported. With a known length, updates
    /// are sent only when the whole percent changes; without one, an
    /// indeterminate update is sent every [`INDETERMINATE_REPORT_INTERVAL`]
    /// bytes.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Network`] on connection, status, timeout or
    /// write failure (the partial file is left for the caller to remove) and
    /// [`InstallError::Cancelled`] if `cancel` fires.
    pub async fn download<F>(
        &self,
        source: &RemoteSource,
        cancel: &CancellationToken,
        mut progress_cb: F,
    ) -> Result<u64, InstallError>
    where
        F: FnMut(DownloadProgress),
    {
        let dest = source.destination.as_path();
        info!("Downloading {} to {}", source.url, dest.display());

        let url = validate_url(&source.url)?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                InstallError::Network(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        // The read timeout also bounds the wait for the response head.
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(InstallError::Cancelled),
            response = tokio::time::timeout(self.read_timeout, self.client.get(url).send()) => {
                response.map_err(|_| {
                    InstallError::Network(format!(
                        "No response within {}s",
                        self.read_timeout.as_secs()
                    ))
                })??
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(InstallError::Network(format!(
                "Download failed with status {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown error")
            )));
        }

        let total_bytes = response.content_length();
        debug!("Content-Length: {:?}", total_bytes);

        let mut file = File::create(dest).await.map_err(|e| {
            InstallError::Network(format!("Failed to create file {}: {}", dest.display(), e))
        })?;

        let body = Box::pin(response.bytes_stream().map_err(io::Error::other));
        let mut reader = StreamReader::new(body);
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut bytes_downloaded: u64 = 0;
        let mut last_reported_at: u64 = 0;

        let start = DownloadProgress::new(0, total_bytes);
        let mut last_percent = start.percent;
        progress_cb(start);

        loop {
            if cancel.is_cancelled() {
                return Err(InstallError::Cancelled);
            }

            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(InstallError::Cancelled),
                read = tokio::time::timeout(self.read_timeout, reader.read(&mut buffer)) => read,
            };

            let n = match read {
                Err(_) => {
                    return Err(InstallError::Network(format!(
                        "No data received for {}s",
                        self.read_timeout.as_secs()
                    )))
                }
                Ok(Err(e)) => {
                    return Err(InstallError::Network(format!(
                        "Failed to read response body: {}",
                        e
                    )))
                }
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => n,
            };

            file.write_all(&buffer[..n]).await.map_err(|e| {
                InstallError::Network(format!("Failed to write {}: {}", dest.display(), e))
            })?;
            bytes_downloaded += n as u64;

            let progress = DownloadProgress::new(bytes_downloaded, total_bytes);
            if progress.is_indeterminate() {
                if bytes_downloaded - last_reported_at >= INDETERMINATE_REPORT_INTERVAL {
                    last_reported_at = bytes_downloaded;
                    progress_cb(progress);
                }
            } else if progress.percent != last_percent {
                last_percent = progress.percent;
                progress_cb(progress);
            }
        }

        file.flush()
            .await
            .map_err(|e| InstallError::Network(format!("Failed to flush file: {}", e)))?;

        let done = DownloadProgress::completed(bytes_downloaded, total_bytes);
        if done.is_indeterminate() || done.percent != last_percent {
            progress_cb(done);
        }

        info!(
            "Download complete: {} bytes written to {}",
            bytes_downloaded,
            dest.display()
        );

        Ok(bytes_downloaded)
    }
}
