use std::path::Path;

use crate::core::cancel::CancelToken;
use crate::core::error::{UpdaterError, UpdaterResult};

use super::{entry_destination, write_entry, PercentReporter};

pub(super) fn extract<F: FnMut(u8)>(
    archive_path: &Path,
    output_dir: &Path,
    reporter: &mut PercentReporter<F>,
    cancel: &CancelToken,
) -> UpdaterResult<()> {
    let file = std::fs::File::open(archive_path).map_err(|e| UpdaterError::io(archive_path, e))?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut total = 0u64;
    for index in 0..archive.len() {
        total += archive.by_index(index)?.size();
    }
    reporter.set_total(total);

    std::fs::create_dir_all(output_dir).map_err(|e| UpdaterError::io(output_dir, e))?;

    for index in 0..archive.len() {
        cancel.check()?;
        let mut zipped = archive.by_index(index)?;
        let out_path = entry_destination(archive_path, output_dir, zipped.name())?;

        if zipped.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| UpdaterError::io(&out_path, e))?;
            continue;
        }

        write_entry(&mut zipped, &out_path, reporter, cancel)?;
    }

    Ok(())
}
