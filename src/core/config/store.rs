// ─── Config Store ───
// Sole writer of `launcher-config.json`. Every mutation is one transaction:
// acquire the lock, re-read the whole document, apply exactly one change,
// write the whole document back, release. A crash can lose at most the
// transaction in flight.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::local::{LocalConfig, LocalGameRecord};
use crate::core::error::{UpdaterError, UpdaterResult};

/// A top-level scalar of the local document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigField {
    UpdaterUrl(String),
    LauncherVer(u32),
    LastSelectedGame(String),
}

impl ConfigField {
    pub fn key(&self) -> &'static str {
        match self {
            ConfigField::UpdaterUrl(_) => "updaterUrl",
            ConfigField::LauncherVer(_) => "launcherVer",
            ConfigField::LastSelectedGame(_) => "lastSelectedGame",
        }
    }

    fn to_value(&self) -> Value {
        match self {
            ConfigField::UpdaterUrl(v) | ConfigField::LastSelectedGame(v) => {
                Value::String(v.clone())
            }
            ConfigField::LauncherVer(v) => Value::from(*v),
        }
    }

    /// Build a field update from a name/value pair sent by an embedding
    /// host's settings panel. Names outside the schema are rejected rather
    /// than dropped.
    pub fn parse(field: &str, value: Value) -> UpdaterResult<Self> {
        let invalid = |reason: &str| UpdaterError::InvalidConfigValue {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        match field {
            "updaterUrl" => value
                .as_str()
                .map(|s| ConfigField::UpdaterUrl(s.to_string()))
                .ok_or_else(|| invalid("expected a string")),
            "lastSelectedGame" => value
                .as_str()
                .map(|s| ConfigField::LastSelectedGame(s.to_string()))
                .ok_or_else(|| invalid("expected a string")),
            "launcherVer" => value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(ConfigField::LauncherVer)
                .ok_or_else(|| invalid("expected a non-negative integer")),
            other => Err(UpdaterError::UnknownConfigField(other.to_string())),
        }
    }
}

/// Upsert of one game record. `None` sub-fields are left untouched on an
/// existing record and omitted when a new record is appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameUpdate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ver: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_ver: Option<u32>,
}

impl GameUpdate {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn client_ver(mut self, client_ver: u32) -> Self {
        self.client_ver = Some(client_ver);
        self
    }

    pub fn patch_ver(mut self, patch_ver: u32) -> Self {
        self.patch_ver = Some(patch_ver);
        self
    }
}

/// Exactly one change applied per transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigUpdate {
    Field(ConfigField),
    Game(GameUpdate),
}

pub struct ConfigStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles across every sequencer in the
    /// process.
    lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the config, regenerating defaults if it is missing, unparsable or
    /// lacks any required field.
    pub async fn load_or_init(&self, defaults: &LocalConfig) -> UpdaterResult<LocalConfig> {
        let _guard = self.lock.lock().await;

        match self.read_config().await {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("{}; writing default config", e);
                if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
                    tokio::fs::remove_file(&self.path)
                        .await
                        .map_err(|source| UpdaterError::ConfigWrite {
                            path: self.path.clone(),
                            source,
                        })?;
                }
                let document = serde_json::to_value(defaults)?;
                self.write_document(&document).await?;
                Ok(defaults.clone())
            }
        }
    }

    /// Consistent snapshot of the whole document.
    pub async fn read(&self) -> UpdaterResult<LocalConfig> {
        let _guard = self.lock.lock().await;
        self.read_config().await
    }

    pub async fn game_record(&self, name: &str) -> UpdaterResult<Option<LocalGameRecord>> {
        Ok(self.read().await?.game(name).cloned())
    }

    /// Apply one update and persist the full document.
    pub async fn update(&self, update: ConfigUpdate) -> UpdaterResult<LocalConfig> {
        self.transaction(|document| apply_update(document, &update))
            .await
    }

    /// Make sure `name` has a usable record, creating `{0, 0}` when it is
    /// absent or lacks a version field. Returns the record in effect.
    pub async fn ensure_game_record(&self, name: &str) -> UpdaterResult<LocalGameRecord> {
        let config = self
            .transaction(|document| {
                let complete = games_array(document)?.iter().any(|game| {
                    game.get("name").and_then(Value::as_str) == Some(name)
                        && has_version(game, "clientVer")
                        && has_version(game, "patchVer")
                });
                if !complete {
                    info!("Creating local record for {}", name);
                    apply_update(
                        document,
                        &ConfigUpdate::Game(GameUpdate::new(name).client_ver(0).patch_ver(0)),
                    )?;
                }
                Ok(())
            })
            .await?;

        Ok(config
            .game(name)
            .cloned()
            .unwrap_or_else(|| LocalGameRecord::fresh(name)))
    }

    /// Scoped acquire → read → mutate → write → release.
    pub async fn transaction<F>(&self, mutate: F) -> UpdaterResult<LocalConfig>
    where
        F: FnOnce(&mut Value) -> UpdaterResult<()>,
    {
        let _guard = self.lock.lock().await;

        let mut document = self.read_document().await?;
        mutate(&mut document)?;
        let config = parse_config(&self.path, &document)?;
        self.write_document(&document).await?;

        debug!("Committed {:?}", self.path);
        Ok(config)
    }

    async fn read_config(&self) -> UpdaterResult<LocalConfig> {
        let document = self.read_document().await?;
        parse_config(&self.path, &document)
    }

    async fn read_document(&self) -> UpdaterResult<Value> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| UpdaterError::ConfigRead {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        let document: Value =
            serde_json::from_str(&raw).map_err(|e| UpdaterError::ConfigRead {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        if !document.is_object() {
            return Err(UpdaterError::ConfigRead {
                path: self.path.clone(),
                reason: "top-level value is not an object".into(),
            });
        }
        Ok(document)
    }

    /// Write to a sibling temp file, then rename over the original so readers
    /// never observe a half-written document.
    async fn write_document(&self, document: &Value) -> UpdaterResult<()> {
        let json = to_pretty_json(document)?;
        let write_err = |source| UpdaterError::ConfigWrite {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await.map_err(write_err)?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(write_err)?;
        Ok(())
    }
}

/// Apply one update to a raw document. Fields the engine does not know about
/// survive untouched.
pub fn apply_update(document: &mut Value, update: &ConfigUpdate) -> UpdaterResult<()> {
    match update {
        ConfigUpdate::Field(field) => {
            let object = document
                .as_object_mut()
                .ok_or_else(|| UpdaterError::Other("config document is not an object".into()))?;
            object.insert(field.key().to_string(), field.to_value());
        }
        ConfigUpdate::Game(game) => {
            let games = games_array(document)?;
            match games
                .iter_mut()
                .find(|g| g.get("name").and_then(Value::as_str) == Some(game.name.as_str()))
            {
                Some(existing) => {
                    let record = existing.as_object_mut().ok_or_else(|| {
                        UpdaterError::VersionMismatch {
                            game: game.name.clone(),
                            reason: "record is not an object".into(),
                        }
                    })?;
                    if let Some(client_ver) = game.client_ver {
                        record.insert("clientVer".into(), Value::from(client_ver));
                    }
                    if let Some(patch_ver) = game.patch_ver {
                        record.insert("patchVer".into(), Value::from(patch_ver));
                    }
                }
                None => games.push(serde_json::to_value(game)?),
            }
        }
    }
    Ok(())
}

fn games_array(document: &mut Value) -> UpdaterResult<&mut Vec<Value>> {
    let object: &mut Map<String, Value> = document
        .as_object_mut()
        .ok_or_else(|| UpdaterError::Other("config document is not an object".into()))?;

    let games = object
        .entry("games")
        .or_insert_with(|| Value::Array(Vec::new()));
    if !games.is_array() {
        *games = Value::Array(Vec::new());
    }
    games
        .as_array_mut()
        .ok_or_else(|| UpdaterError::Other("games is not an array".into()))
}

fn has_version(game: &Value, key: &str) -> bool {
    game.get(key).is_some_and(|v| !v.is_null())
}

fn parse_config(path: &Path, document: &Value) -> UpdaterResult<LocalConfig> {
    LocalConfig::deserialize(document).map_err(|e| UpdaterError::ConfigRead {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn to_pretty_json(document: &Value) -> UpdaterResult<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    document.serialize(&mut serializer)?;
    Ok(out)
}
