// ─── Remote Manifest ───
// The updater document describing the current launcher build and, per game,
// the current client package and the ordered patches on top of it.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::error::{UpdaterError, UpdaterResult};
use crate::core::http::add_cache_busting_suffix;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteGameDescriptor {
    pub name: String,
    pub start_cmd: String,
    pub client_ver: u32,
    pub client_url: String,
    /// Patch `i + 1` lives at index `i`.
    #[serde(default)]
    pub patch_urls: Vec<String>,
}

impl RemoteGameDescriptor {
    pub fn patch_count(&self) -> u32 {
        u32::try_from(self.patch_urls.len()).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    pub launcher_ver: u32,
    pub launcher_url: String,
    #[serde(default)]
    pub games: Vec<RemoteGameDescriptor>,
}

impl RemoteConfig {
    /// Fetch the manifest, bypassing any cache between us and the server.
    pub async fn fetch(client: &Client, updater_url: &str) -> UpdaterResult<Self> {
        let url = add_cache_busting_suffix(updater_url);
        info!("Fetching remote manifest from {}", url);

        let response = client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpdaterError::DownloadFailed {
                url,
                status: status.as_u16(),
            });
        }

        let manifest: RemoteConfig = response.json().await?;
        info!(
            "Remote manifest: launcher v{}, {} game(s)",
            manifest.launcher_ver,
            manifest.games.len()
        );
        Ok(manifest)
    }

    pub fn game(&self, name: &str) -> Option<&RemoteGameDescriptor> {
        self.games.iter().find(|g| g.name == name)
    }
}
