use std::path::Path;

use sevenz_rust::{Password, SevenZReader};

use crate::core::cancel::CancelToken;
use crate::core::error::{UpdaterError, UpdaterResult};

use super::{entry_destination, write_entry, PercentReporter};

pub(super) fn extract<F: FnMut(u8)>(
    archive_path: &Path,
    output_dir: &Path,
    reporter: &mut PercentReporter<F>,
    cancel: &CancelToken,
) -> UpdaterResult<()> {
    let mut reader = SevenZReader::open(archive_path, Password::empty())?;

    let total: u64 = reader
        .archive()
        .files
        .iter()
        .filter(|entry| entry.has_stream)
        .map(|entry| entry.size)
        .sum();
    reporter.set_total(total);

    std::fs::create_dir_all(output_dir).map_err(|e| UpdaterError::io(output_dir, e))?;

    // The callback can only return the codec's error type, so our own
    // failures are parked here and iteration is stopped with `Ok(false)`.
    let mut failure: Option<UpdaterError> = None;
    reader.for_each_entries(|entry, entry_reader| {
        let result =
            entry_destination(archive_path, output_dir, &entry.name).and_then(|out_path| {
                if entry.is_directory {
                    std::fs::create_dir_all(&out_path)
                        .map_err(|e| UpdaterError::io(&out_path, e))
                } else {
                    write_entry(entry_reader, &out_path, reporter, cancel)
                }
            });
        match result {
            Ok(()) => Ok(true),
            Err(e) => {
                failure = Some(e);
                Ok(false)
            }
        }
    })?;

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
