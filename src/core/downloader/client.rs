use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{ArtifactDownloader, DownloadProgress, DownloadProgressFn};
use crate::core::cancel::CancelToken;
use crate::core::error::{UpdaterError, UpdaterResult};

/// Report at least this often when the server sends no `Content-Length`.
const UNKNOWN_SIZE_REPORT_BYTES: u64 = 1024 * 1024;

/// Streaming HTTP downloader backed by the shared client.
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArtifactDownloader for HttpDownloader {
    /// Stream `url` to `dest_dir/file_name`, creating the directory as
    /// needed. On failure the partial file is left where it is.
    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        file_name: &str,
        progress: DownloadProgressFn<'_>,
        cancel: &CancelToken,
    ) -> UpdaterResult<PathBuf> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| UpdaterError::io(dest_dir, e))?;
        let dest = dest_dir.join(file_name);

        cancel.check()?;
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdaterError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total_bytes = response.content_length();
        info!("Downloading {} ({:?} bytes) -> {:?}", url, total_bytes, dest);

        // Scoped so the handle is closed before the caller touches the file.
        let transferred = {
            let mut file = tokio::fs::File::create(&dest)
                .await
                .map_err(|e| UpdaterError::io(&dest, e))?;

            let started = Instant::now();
            let mut transferred = 0u64;
            let mut last_percent = None;
            let mut last_reported = 0u64;
            let mut stream = response.bytes_stream();

            while let Some(chunk) = stream.next().await {
                cancel.check()?;
                let chunk = chunk.map_err(|e| UpdaterError::Download {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| UpdaterError::io(&dest, e))?;
                transferred += chunk.len() as u64;

                let elapsed = started.elapsed().as_secs_f64();
                let snapshot = DownloadProgress {
                    transferred_bytes: transferred,
                    total_bytes,
                    bytes_per_sec: if elapsed > 0.0 {
                        (transferred as f64 / elapsed) as u64
                    } else {
                        0
                    },
                };

                let due = match total_bytes {
                    Some(_) => last_percent != Some(snapshot.percent()),
                    None => transferred - last_reported >= UNKNOWN_SIZE_REPORT_BYTES,
                };
                if due {
                    last_percent = Some(snapshot.percent());
                    last_reported = transferred;
                    progress(snapshot);
                }
            }

            file.flush().await.map_err(|e| UpdaterError::io(&dest, e))?;
            transferred
        };

        if let Some(expected) = total_bytes {
            if transferred != expected {
                return Err(UpdaterError::Download {
                    url: url.to_string(),
                    reason: format!("connection closed after {transferred} of {expected} bytes"),
                });
            }
        }

        debug!("Downloaded: {} -> {:?}", url, dest);
        Ok(dest)
    }
}
