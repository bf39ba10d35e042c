use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::core::error::{UpdaterError, UpdaterResult};

const APP_DIR_NAME: &str = "Launchpad";
pub const CONFIG_FILE_NAME: &str = "launcher-config.json";
pub const DEFAULT_UPDATER_URL: &str = "https://updates.launchpad.invalid/config.json";

/// Runtime knobs. Nothing here is persisted; the persisted state lives in
/// the local config document.
#[derive(Debug, Clone)]
pub struct UpdaterSettings {
    /// Holds the config file, the launcher executable and one directory per game.
    pub launcher_dir: PathBuf,
    pub config_file_name: String,
    /// Written into a freshly generated config.
    pub default_updater_url: String,
    pub skip_self_update: bool,
    /// Headless host only: start the selected game once the pass is done.
    pub auto_launch: bool,
    pub connect_timeout: Duration,
}

impl Default for UpdaterSettings {
    fn default() -> Self {
        Self {
            launcher_dir: default_launcher_dir(),
            config_file_name: CONFIG_FILE_NAME.to_string(),
            default_updater_url: DEFAULT_UPDATER_URL.to_string(),
            skip_self_update: cfg!(debug_assertions),
            auto_launch: true,
            connect_timeout: Duration::from_secs(15),
        }
    }
}

impl UpdaterSettings {
    /// Defaults overridden by `LAUNCHPAD_DIR`, `LAUNCHPAD_UPDATER_URL`,
    /// `LAUNCHPAD_SKIP_SELF_UPDATE` and `LAUNCHPAD_AUTO_LAUNCH`.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(dir) = std::env::var_os("LAUNCHPAD_DIR").filter(|v| !v.is_empty()) {
            settings.launcher_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("LAUNCHPAD_UPDATER_URL") {
            if !url.trim().is_empty() {
                settings.default_updater_url = url;
            }
        }
        if let Some(skip) = env_flag("LAUNCHPAD_SKIP_SELF_UPDATE") {
            settings.skip_self_update = skip;
        }
        if let Some(launch) = env_flag("LAUNCHPAD_AUTO_LAUNCH") {
            settings.auto_launch = launch;
        }
        settings
    }

    pub fn config_path(&self) -> PathBuf {
        self.launcher_dir.join(&self.config_file_name)
    }

    /// `<launcher dir>/<game name>`. Game names come from the remote manifest
    /// and must be a single plain path component.
    pub fn game_dir(&self, game: &str) -> UpdaterResult<PathBuf> {
        let mut components = Path::new(game).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.launcher_dir.join(game)),
            _ => Err(UpdaterError::InvalidConfigValue {
                field: "name".into(),
                reason: format!("{game:?} is not usable as a directory name"),
            }),
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        other => {
            warn!("Ignoring {}={:?}", name, other);
            None
        }
    }
}

/// Next to the running executable, like a portable install; falls back to
/// the platform data directory.
fn default_launcher_dir() -> PathBuf {
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        return dir;
    }

    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}
