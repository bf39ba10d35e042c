pub mod client;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::core::cancel::CancelToken;
use crate::core::error::UpdaterResult;

pub use client::HttpDownloader;

/// Snapshot of an in-flight download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub transferred_bytes: u64,
    pub total_bytes: Option<u64>,
    /// Average throughput since the request started.
    pub bytes_per_sec: u64,
}

impl DownloadProgress {
    /// Whole percent, 0 while the size is unknown.
    pub fn percent(&self) -> u8 {
        match self.total_bytes {
            Some(total) if total > 0 => {
                ((self.transferred_bytes.min(total) * 100) / total) as u8
            }
            _ => 0,
        }
    }

    /// Estimated seconds left at the current average rate.
    pub fn seconds_remaining(&self) -> Option<u64> {
        let total = self.total_bytes?;
        if self.bytes_per_sec == 0 {
            return None;
        }
        Some(total.saturating_sub(self.transferred_bytes) / self.bytes_per_sec)
    }
}

/// Progress callback shared by every download.
pub type DownloadProgressFn<'a> = &'a (dyn Fn(DownloadProgress) + Send + Sync);

/// Fetches one URL into `dest_dir/file_name`.
#[async_trait]
pub trait ArtifactDownloader: Send + Sync {
    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        file_name: &str,
        progress: DownloadProgressFn<'_>,
        cancel: &CancelToken,
    ) -> UpdaterResult<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_and_eta() {
        let progress = DownloadProgress {
            transferred_bytes: 25,
            total_bytes: Some(100),
            bytes_per_sec: 5,
        };
        assert_eq!(progress.percent(), 25);
        assert_eq!(progress.seconds_remaining(), Some(15));

        let unknown = DownloadProgress {
            transferred_bytes: 25,
            total_bytes: None,
            bytes_per_sec: 0,
        };
        assert_eq!(unknown.percent(), 0);
        assert_eq!(unknown.seconds_remaining(), None);
    }
}
