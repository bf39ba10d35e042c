pub mod task;

use std::path::Path;

use crate::core::error::UpdaterResult;

pub use task::SystemSpawner;

/// Starts external processes: game clients and the replace script.
pub trait ProcessSpawner: Send + Sync {
    /// Run `command` through the platform shell with `cwd` as working
    /// directory and return the child's pid without waiting for it.
    /// A `detached` child must outlive the launcher process.
    fn spawn(&self, command: &str, cwd: &Path, detached: bool) -> UpdaterResult<u32>;
}
