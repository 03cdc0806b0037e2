//! Direct HTTP download provider
//!
//! Streams the response body straight to a file named after the URL's final
//! path segment. Throughput is computed from byte deltas sampled no more
//! often than every 100ms to damp chunk-level noise.

use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::fsops;

use super::{CancellationHandle, DownloadProvider, ProviderUpdate, UpdateSender};

/// Minimum spacing between speed samples
const SPEED_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Provider for plain HTTP objects
pub struct DirectProvider {
    client: reqwest::Client,
}

impl DirectProvider {
    /// Create a provider with a fresh HTTP client
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for DirectProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DownloadProvider for DirectProvider {
    /// Issue a metadata-only request and read the declared content length
    ///
    /// A missing Content-Length yields `Ok(0)` ("unknown"); transport
    /// failures and error statuses propagate and abort job creation.
    async fn estimate_size(&self, url: &str) -> Result<u64> {
        let response = self.client.head(url).send().await?.error_for_status()?;

        // `Response::content_length()` derives from the body's size hint,
        // which hyper reports as 0 for HEAD responses even when the header
        // is present; read the header directly instead.
        let length = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        match length {
            Some(length) => Ok(length),
            None => {
                tracing::warn!(url, "Content-Length not declared, size unknown");
                Ok(0)
            }
        }
    }

    async fn start(
        &self,
        url: &str,
        destination: &Path,
        updates: UpdateSender,
    ) -> Result<CancellationHandle> {
        let token = CancellationToken::new();
        let handle = CancellationHandle::new(token.clone());

        let file_name = fsops::file_name_from_url(url);
        let download_path = destination.join(&file_name);
        let client = self.client.clone();
        let url = url.to_string();

        tokio::spawn(async move {
            run_transfer(client, url, download_path, updates, token).await;
        });

        Ok(handle)
    }
}

/// Drive one HTTP transfer to its terminal update
///
/// A cancellation-triggered abort is a non-error: the loop exits without
/// emitting a terminal update. Every other transport or filesystem failure
/// is reported as `Failed`.
async fn run_transfer(
    client: reqwest::Client,
    url: String,
    download_path: std::path::PathBuf,
    updates: UpdateSender,
    token: CancellationToken,
) {
    let response = tokio::select! {
        _ = token.cancelled() => {
            tracing::info!(url, "Direct download cancelled before connect");
            return;
        }
        result = client.get(&url).send() => match result.and_then(|r| r.error_for_status()) {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(url, error = %e, "Failed to start direct download");
                updates.send(ProviderUpdate::Failed(e.to_string())).ok();
                return;
            }
        },
    };

    let total_bytes = response
        .content_length()
        .map(|len| len as i64)
        .unwrap_or(-1);

    let mut file = match tokio::fs::File::create(&download_path).await {
        Ok(file) => file,
        Err(e) => {
            tracing::error!(path = %download_path.display(), error = %e, "Failed to create download file");
            updates.send(ProviderUpdate::Failed(e.to_string())).ok();
            return;
        }
    };

    updates.send(ProviderUpdate::Started).ok();

    let mut stream = response.bytes_stream();
    let mut downloaded_bytes: u64 = 0;
    let mut window_bytes: u64 = 0;
    let mut last_sample = Instant::now();

    loop {
        let chunk = tokio::select! {
            _ = token.cancelled() => {
                tracing::info!(path = %download_path.display(), "Direct download cancelled");
                return;
            }
            chunk = stream.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                if let Err(e) = file.write_all(&bytes).await {
                    tracing::error!(path = %download_path.display(), error = %e, "File system error during direct download");
                    updates.send(ProviderUpdate::Failed(e.to_string())).ok();
                    return;
                }

                downloaded_bytes += bytes.len() as u64;
                window_bytes += bytes.len() as u64;

                let elapsed = last_sample.elapsed();
                if elapsed >= SPEED_SAMPLE_INTERVAL {
                    let speed_bps = (window_bytes as f64 / elapsed.as_secs_f64()) as u64;
                    let eta_secs = if speed_bps > 0 && total_bytes >= 0 {
                        (total_bytes as u64).saturating_sub(downloaded_bytes) as i64
                            / speed_bps as i64
                    } else {
                        -1
                    };
                    updates
                        .send(ProviderUpdate::Progress {
                            downloaded_bytes,
                            total_bytes,
                            speed_bps,
                            eta_secs,
                        })
                        .ok();
                    window_bytes = 0;
                    last_sample = Instant::now();
                }
            }
            Some(Err(e)) => {
                tracing::error!(url, error = %e, "Error during direct download");
                updates.send(ProviderUpdate::Failed(e.to_string())).ok();
                return;
            }
            None => break,
        }
    }

    if let Err(e) = file.flush().await {
        updates.send(ProviderUpdate::Failed(e.to_string())).ok();
        return;
    }

    tracing::info!(path = %download_path.display(), bytes = downloaded_bytes, "Direct download completed");
    updates.send(ProviderUpdate::Completed).ok();
}
