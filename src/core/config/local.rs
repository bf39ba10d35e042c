use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// Per-game version bookkeeping persisted in `launcher-config.json`.
///
/// `client_ver == 0` means the game is not installed. `patch_ver` counts the
/// patches applied on top of `client_ver` and resets whenever the client
/// advances.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocalGameRecord {
    pub name: String,
    #[serde(default, deserialize_with = "lenient_version")]
    pub client_ver: u32,
    #[serde(default, deserialize_with = "lenient_version")]
    pub patch_ver: u32,
}

impl LocalGameRecord {
    /// Record of a game that has never been installed.
    pub fn fresh(name: &str) -> Self {
        Self {
            name: name.to_string(),
            client_ver: 0,
            patch_ver: 0,
        }
    }
}

/// The full local document. Every field is required on disk; a document
/// missing any of them is regenerated from defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocalConfig {
    pub updater_url: String,
    pub launcher_ver: u32,
    pub last_selected_game: String,
    pub games: Vec<LocalGameRecord>,
}

impl LocalConfig {
    /// Document written on first run or after the on-disk copy was found corrupt.
    pub fn with_defaults(updater_url: &str) -> Self {
        Self {
            updater_url: updater_url.to_string(),
            launcher_ver: 1,
            last_selected_game: String::new(),
            games: Vec::new(),
        }
    }

    /// First record with this name. Names are unique; the store never writes
    /// a second record for an existing name.
    pub fn game(&self, name: &str) -> Option<&LocalGameRecord> {
        self.games.iter().find(|g| g.name == name)
    }
}

/// A version that is not a non-negative integer is unusable. Reading it as 0
/// makes the reconciler treat the game as a fresh install.
fn lenient_version<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    match raw.as_u64().and_then(|v| u32::try_from(v).ok()) {
        Some(v) => Ok(v),
        None => {
            if !raw.is_null() {
                warn!("Ignoring malformed version value {} in local config", raw);
            }
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_document() {
        let json = r#"{
            "updaterUrl": "https://updates.example.com/config.json",
            "launcherVer": 3,
            "lastSelectedGame": "alpha",
            "games": [{ "name": "alpha", "clientVer": 2, "patchVer": 4 }]
        }"#;
        let config: LocalConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.launcher_ver, 3);
        assert_eq!(
            config.game("alpha"),
            Some(&LocalGameRecord {
                name: "alpha".into(),
                client_ver: 2,
                patch_ver: 4
            })
        );
    }

    #[test]
    fn malformed_versions_read_as_not_installed() {
        let json = r#"{ "name": "alpha", "clientVer": -1, "patchVer": "seven" }"#;
        let record: LocalGameRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record, LocalGameRecord::fresh("alpha"));
    }

    #[test]
    fn missing_versions_default_to_zero() {
        let record: LocalGameRecord = serde_json::from_str(r#"{ "name": "alpha" }"#).unwrap();
        assert_eq!(record.client_ver, 0);
        assert_eq!(record.patch_ver, 0);
    }

    #[test]
    fn document_without_games_is_rejected() {
        let json = r#"{ "updaterUrl": "u", "launcherVer": 1, "lastSelectedGame": "" }"#;
        assert!(serde_json::from_str::<LocalConfig>(json).is_err());
    }
}
