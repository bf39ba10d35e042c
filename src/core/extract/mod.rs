// ─── Archive Extraction ───
// Decoding runs on the blocking pool; percent-complete flows back to the
// async caller through a channel.

mod seven_zip;
mod zip_archive;

use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::cancel::CancelToken;
use crate::core::error::{UpdaterError, UpdaterResult};

const COPY_BUFFER_BYTES: usize = 64 * 1024;

/// Percent-complete callback, 0..=100.
pub type ExtractProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// Unpacks one archive into a directory, overwriting files that exist.
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    async fn extract(
        &self,
        archive: &Path,
        output_dir: &Path,
        progress: ExtractProgressFn<'_>,
        cancel: &CancelToken,
    ) -> UpdaterResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    SevenZip,
}

impl ArchiveFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "zip" => Some(ArchiveFormat::Zip),
            "7z" => Some(ArchiveFormat::SevenZip),
            _ => None,
        }
    }
}

/// Default extractor: picks the codec from the archive's extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveFormatExtractor;

#[async_trait]
impl ArchiveExtractor for ArchiveFormatExtractor {
    async fn extract(
        &self,
        archive: &Path,
        output_dir: &Path,
        progress: ExtractProgressFn<'_>,
        cancel: &CancelToken,
    ) -> UpdaterResult<()> {
        let format = ArchiveFormat::from_path(archive).ok_or_else(|| UpdaterError::Extraction {
            archive: archive.to_path_buf(),
            reason: "unsupported archive format".into(),
        })?;

        info!("Extracting {:?} ({:?}) into {:?}", archive, format, output_dir);

        let (tx, mut rx) = mpsc::unbounded_channel::<u8>();
        let archive_path = archive.to_path_buf();
        let output = output_dir.to_path_buf();
        let token = cancel.clone();

        let worker = tokio::task::spawn_blocking(move || {
            let mut reporter = PercentReporter::new(move |p| {
                let _ = tx.send(p);
            });
            match format {
                ArchiveFormat::Zip => {
                    zip_archive::extract(&archive_path, &output, &mut reporter, &token)
                }
                ArchiveFormat::SevenZip => {
                    seven_zip::extract(&archive_path, &output, &mut reporter, &token)
                }
            }
        });

        // The sender lives inside the worker; the loop ends when it finishes.
        while let Some(percent) = rx.recv().await {
            progress(percent);
        }

        worker.await??;
        progress(100);
        debug!("Extraction finished: {:?}", archive);
        Ok(())
    }
}

/// Tracks uncompressed bytes written and reports each new whole percent once.
pub(crate) struct PercentReporter<F: FnMut(u8)> {
    total: u64,
    done: u64,
    last: Option<u8>,
    sink: F,
}

impl<F: FnMut(u8)> PercentReporter<F> {
    pub(crate) fn new(sink: F) -> Self {
        Self {
            total: 0,
            done: 0,
            last: None,
            sink,
        }
    }

    pub(crate) fn set_total(&mut self, total: u64) {
        self.total = total;
        self.report();
    }

    pub(crate) fn advance(&mut self, bytes: u64) {
        self.done += bytes;
        self.report();
    }

    fn report(&mut self) {
        let percent = if self.total == 0 {
            0
        } else {
            ((self.done.min(self.total) * 100) / self.total) as u8
        };
        if self.last != Some(percent) {
            self.last = Some(percent);
            (self.sink)(percent);
        }
    }
}

/// Resolve an archive entry name under `output_dir`, refusing anything that
/// would land outside it.
pub(crate) fn entry_destination(
    archive: &Path,
    output_dir: &Path,
    entry_name: &str,
) -> UpdaterResult<PathBuf> {
    let mut relative = PathBuf::new();
    for component in Path::new(entry_name).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => {
                return Err(UpdaterError::Extraction {
                    archive: archive.to_path_buf(),
                    reason: format!("entry escapes output directory: {entry_name}"),
                })
            }
        }
    }
    Ok(output_dir.join(relative))
}

/// Copy one entry to disk in chunks, advancing the reporter as bytes land.
pub(crate) fn write_entry<F: FnMut(u8)>(
    reader: &mut dyn Read,
    out_path: &Path,
    reporter: &mut PercentReporter<F>,
    cancel: &CancelToken,
) -> UpdaterResult<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| UpdaterError::io(parent, e))?;
    }
    let mut out = std::fs::File::create(out_path).map_err(|e| UpdaterError::io(out_path, e))?;

    let mut buf = vec![0u8; COPY_BUFFER_BYTES];
    loop {
        cancel.check()?;
        let n = reader
            .read(&mut buf)
            .map_err(|e| UpdaterError::io(out_path, e))?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])
            .map_err(|e| UpdaterError::io(out_path, e))?;
        reporter.advance(n as u64);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension() {
        assert_eq!(
            ArchiveFormat::from_path(Path::new("client-2.7z")),
            Some(ArchiveFormat::SevenZip)
        );
        assert_eq!(
            ArchiveFormat::from_path(Path::new("patch-1.ZIP")),
            Some(ArchiveFormat::Zip)
        );
        assert_eq!(ArchiveFormat::from_path(Path::new("patch-1.rar")), None);
    }

    #[test]
    fn entry_paths_cannot_escape() {
        let out = Path::new("/games/alpha");
        let archive = Path::new("patch.zip");
        assert_eq!(
            entry_destination(archive, out, "data/./maps/a.pak").unwrap(),
            PathBuf::from("/games/alpha/data/maps/a.pak")
        );
        assert!(entry_destination(archive, out, "../evil.dll").is_err());
        assert!(entry_destination(archive, out, "/etc/passwd").is_err());
    }

    #[test]
    fn reporter_emits_each_percent_once() {
        let mut seen = Vec::new();
        {
            let mut reporter = PercentReporter::new(|p| seen.push(p));
            reporter.set_total(200);
            reporter.advance(1);
            reporter.advance(1);
            reporter.advance(98);
            reporter.advance(100);
        }
        assert_eq!(seen, vec![0, 1, 50, 100]);
    }

    #[tokio::test]
    async fn unsupported_format_fails_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArchiveFormatExtractor
            .extract(
                &dir.path().join("client.rar"),
                dir.path(),
                &|_| {},
                &CancelToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UpdaterError::Extraction { .. }));
    }
}
