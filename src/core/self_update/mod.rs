// ─── Launcher Self-Update ───
// Runs before any game is touched. A newer launcher build is staged next to
// the running executable as `<name>.new`, the new version is persisted, and
// a detached replace script takes over once this process exits.

pub mod script;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::core::cancel::CancelToken;
use crate::core::config::{ConfigField, ConfigStore, ConfigUpdate, LocalConfig, RemoteConfig};
use crate::core::downloader::{ArtifactDownloader, DownloadProgress};
use crate::core::error::{UpdaterError, UpdaterResult};
use crate::core::events::{EventChannel, LauncherEvent};
use crate::core::http::{add_cache_busting_suffix, file_name_from_url};
use crate::core::launch::ProcessSpawner;

use script::ReplacePlan;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SelfUpdateOutcome {
    UpToDate,
    /// A newer build exists but replacing the executable is disabled.
    Skipped { available: u32 },
    /// The replace script is running; the host must exit now.
    Restarting { launcher_ver: u32 },
}

pub struct SelfUpdater {
    pub store: Arc<ConfigStore>,
    pub downloader: Arc<dyn ArtifactDownloader>,
    pub spawner: Arc<dyn ProcessSpawner>,
    pub events: EventChannel,
    pub launcher_dir: PathBuf,
    pub current_exe: PathBuf,
    /// Development builds never replace themselves.
    pub skip: bool,
}

impl SelfUpdater {
    pub async fn run(
        &self,
        local: &LocalConfig,
        remote: &RemoteConfig,
        cancel: &CancelToken,
    ) -> UpdaterResult<SelfUpdateOutcome> {
        if remote.launcher_ver <= local.launcher_ver {
            return Ok(SelfUpdateOutcome::UpToDate);
        }
        if self.skip {
            info!(
                "Launcher v{} available, self-update disabled",
                remote.launcher_ver
            );
            return Ok(SelfUpdateOutcome::Skipped {
                available: remote.launcher_ver,
            });
        }

        info!(
            "Updating launcher v{} → v{}",
            local.launcher_ver, remote.launcher_ver
        );
        self.events.status(None, "Downloading launcher update");

        let staged_name = format!("{}.new", file_name_from_url(&remote.launcher_url)?);
        let staged = self.launcher_dir.join(&staged_name);
        match tokio::fs::remove_file(&staged).await {
            Ok(()) => info!("Removed stale {:?}", staged),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(UpdaterError::io(&staged, e)),
        }

        let events = &self.events;
        let on_progress = move |p: DownloadProgress| {
            events.emit(LauncherEvent::download(None, &p));
        };
        let staged = self
            .downloader
            .download(
                &add_cache_busting_suffix(&remote.launcher_url),
                &self.launcher_dir,
                &staged_name,
                &on_progress,
                cancel,
            )
            .await?;

        self.store
            .update(ConfigUpdate::Field(ConfigField::LauncherVer(
                remote.launcher_ver,
            )))
            .await?;

        let plan = ReplacePlan {
            pid: std::process::id(),
            current_exe: self.current_exe.clone(),
            new_exe: staged,
        };
        let script_path = self.launcher_dir.join(script::script_file_name());
        tokio::fs::write(&script_path, script::render(&plan))
            .await
            .map_err(|e| UpdaterError::io(&script_path, e))?;

        self.spawner.spawn(
            &script::launch_command(&script_path),
            &self.launcher_dir,
            true,
        )?;

        self.events.status(None, "Restarting launcher");
        self.events.close_requested();
        Ok(SelfUpdateOutcome::Restarting {
            launcher_ver: remote.launcher_ver,
        })
    }
}
