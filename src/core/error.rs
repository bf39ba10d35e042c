use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the update engine.
/// Every module returns `Result<T, UpdaterError>`.
#[derive(Debug, Error)]
pub enum UpdaterError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Local config ────────────────────────────────────
    #[error("Cannot read local config {path:?}: {reason}")]
    ConfigRead { path: PathBuf, reason: String },

    #[error("Cannot write local config {path:?}: {source}")]
    ConfigWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unknown config field: {0}")]
    UnknownConfigField(String),

    #[error("Invalid value for config field {field}: {reason}")]
    InvalidConfigValue { field: String, reason: String },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    // ── Archive ─────────────────────────────────────────
    #[error("Extraction of {archive:?} failed: {reason}")]
    Extraction { archive: PathBuf, reason: String },

    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("7z extraction error: {0}")]
    SevenZip(#[from] sevenz_rust::Error),

    // ── Versions ────────────────────────────────────────
    #[error("Local record for {game} is inconsistent: {reason}")]
    VersionMismatch { game: String, reason: String },

    #[error("Unknown game: {0}")]
    GameNotFound(String),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Process ─────────────────────────────────────────
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    // ── Control ─────────────────────────────────────────
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type UpdaterResult<T> = Result<T, UpdaterError>;

impl From<std::io::Error> for UpdaterError {
    fn from(source: std::io::Error) -> Self {
        UpdaterError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl UpdaterError {
    /// Attach a path to an IO error, the same shape every module builds by hand.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UpdaterError::Io {
            path: path.into(),
            source,
        }
    }
}

// ── Serialization for event payloads ────────────────────
// Errors travel to observers as their display string.
impl serde::Serialize for UpdaterError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
