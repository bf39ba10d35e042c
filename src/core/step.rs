// ─── Download-Extract Step ───
// One artifact: download it next to its destination, unpack it in place,
// remove the archive. No rollback: a failing phase leaves whatever it
// produced on disk.

use std::path::Path;

use tracing::{info, warn};

use crate::core::cancel::CancelToken;
use crate::core::downloader::{ArtifactDownloader, DownloadProgress};
use crate::core::error::{UpdaterError, UpdaterResult};
use crate::core::events::{EventChannel, LauncherEvent};
use crate::core::extract::ArchiveExtractor;
use crate::core::http::{add_cache_busting_suffix, file_name_from_url};

pub struct ArtifactStep<'a> {
    pub downloader: &'a dyn ArtifactDownloader,
    pub extractor: &'a dyn ArchiveExtractor,
    pub events: &'a EventChannel,
    /// Game the progress events are attributed to.
    pub game: Option<&'a str>,
}

impl ArtifactStep<'_> {
    /// Download `url` into `dest_dir`, extract it there and delete the
    /// archive. `label` names the artifact in status text ("client",
    /// "patch 2").
    pub async fn run(
        &self,
        url: &str,
        dest_dir: &Path,
        label: &str,
        cancel: &CancelToken,
    ) -> UpdaterResult<()> {
        cancel.check()?;
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| UpdaterError::io(dest_dir, e))?;

        let file_name = file_name_from_url(url)?;
        let archive = dest_dir.join(&file_name);
        remove_if_exists(&archive).await?;

        self.events
            .status(self.game, format!("Downloading {label}"));
        let game = self.game.map(str::to_string);
        let events = self.events;
        let on_download = move |p: DownloadProgress| {
            events.emit(LauncherEvent::download(game.clone(), &p));
        };
        let downloaded = self
            .downloader
            .download(
                &add_cache_busting_suffix(url),
                dest_dir,
                &file_name,
                &on_download,
                cancel,
            )
            .await?;

        cancel.check()?;
        self.events
            .status(self.game, format!("Extracting {label}"));
        let game = self.game.map(str::to_string);
        let on_extract = move |percent: u8| {
            events.emit(LauncherEvent::ExtractProgress {
                game: game.clone(),
                percent,
            });
        };
        self.extractor
            .extract(&downloaded, dest_dir, &on_extract, cancel)
            .await?;

        // The content is in place; a leftover archive only costs disk space.
        if let Err(e) = tokio::fs::remove_file(&downloaded).await {
            warn!("Could not delete {:?} after extraction: {}", downloaded, e);
        }

        info!("{} applied from {}", label, url);
        Ok(())
    }
}

async fn remove_if_exists(path: &Path) -> UpdaterResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!("Removed stale {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(UpdaterError::io(path, e)),
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    //! In-memory collaborators shared by the step, sequencer and updater tests.

    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::core::cancel::CancelToken;
    use crate::core::downloader::{ArtifactDownloader, DownloadProgress, DownloadProgressFn};
    use crate::core::error::{UpdaterError, UpdaterResult};
    use crate::core::extract::{ArchiveExtractor, ExtractProgressFn};
    use crate::core::launch::ProcessSpawner;

    /// Writes the URL (sans cache-busting query) into the archive file.
    #[derive(Default)]
    pub struct FakeDownloader {
        pub requests: Mutex<Vec<String>>,
        pub fail_on: Option<String>,
    }

    impl FakeDownloader {
        pub fn failing_on(fragment: &str) -> Self {
            Self {
                fail_on: Some(fragment.to_string()),
                ..Self::default()
            }
        }

        pub fn requested(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ArtifactDownloader for FakeDownloader {
        async fn download(
            &self,
            url: &str,
            dest_dir: &Path,
            file_name: &str,
            progress: DownloadProgressFn<'_>,
            cancel: &CancelToken,
        ) -> UpdaterResult<PathBuf> {
            cancel.check()?;
            self.requests.lock().unwrap().push(url.to_string());
            if let Some(fragment) = &self.fail_on {
                if url.contains(fragment.as_str()) {
                    return Err(UpdaterError::DownloadFailed {
                        url: url.to_string(),
                        status: 503,
                    });
                }
            }
            let base = url.split('?').next().unwrap_or(url).to_string();
            let dest = dest_dir.join(file_name);
            tokio::fs::write(&dest, base.as_bytes()).await.unwrap();
            progress(DownloadProgress {
                transferred_bytes: base.len() as u64,
                total_bytes: Some(base.len() as u64),
                bytes_per_sec: 0,
            });
            Ok(dest)
        }
    }

    /// "Extracts" by appending the archive's contents to `applied.log` in the
    /// output directory, so tests can see exactly what landed and in which
    /// order.
    #[derive(Default)]
    pub struct FakeExtractor {
        pub fail_on: Option<String>,
        pub extracted: Mutex<Vec<PathBuf>>,
    }

    impl FakeExtractor {
        pub fn failing_on(fragment: &str) -> Self {
            Self {
                fail_on: Some(fragment.to_string()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ArchiveExtractor for FakeExtractor {
        async fn extract(
            &self,
            archive: &Path,
            output_dir: &Path,
            progress: ExtractProgressFn<'_>,
            cancel: &CancelToken,
        ) -> UpdaterResult<()> {
            cancel.check()?;
            self.extracted.lock().unwrap().push(archive.to_path_buf());
            let name = archive.file_name().unwrap().to_string_lossy().to_string();
            if let Some(fragment) = &self.fail_on {
                if name.contains(fragment.as_str()) {
                    tokio::fs::write(output_dir.join("half-written.pak"), b"partial")
                        .await
                        .unwrap();
                    return Err(UpdaterError::Extraction {
                        archive: archive.to_path_buf(),
                        reason: "corrupt archive".into(),
                    });
                }
            }
            progress(50);
            let log = output_dir.join("applied.log");
            let mut applied = tokio::fs::read_to_string(&log).await.unwrap_or_default();
            applied.push_str(&name);
            applied.push('\n');
            tokio::fs::write(&log, applied).await.unwrap();
            progress(100);
            Ok(())
        }
    }

    pub fn applied(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("applied.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[derive(Default)]
    pub struct FakeSpawner {
        pub spawned: Mutex<Vec<(String, PathBuf, bool)>>,
    }

    impl FakeSpawner {
        pub fn spawned(&self) -> Vec<(String, PathBuf, bool)> {
            self.spawned.lock().unwrap().clone()
        }
    }

    impl ProcessSpawner for FakeSpawner {
        fn spawn(&self, command: &str, cwd: &Path, detached: bool) -> UpdaterResult<u32> {
            self.spawned
                .lock()
                .unwrap()
                .push((command.to_string(), cwd.to_path_buf(), detached));
            Ok(4242)
        }
    }
}
