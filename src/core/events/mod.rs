// ─── Status / Event Channel ───
// One-way, fire-and-forget notifications from the update engine to whoever
// is listening. Late subscribers miss earlier events; slow subscribers lose
// events instead of slowing the engine down.

#[cfg(feature = "tauri")]
pub mod tauri_bridge;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::core::downloader::DownloadProgress;
use crate::core::reconcile::UpdateAction;

const CHANNEL_CAPACITY: usize = 256;

/// Structured progress notification. Presentation is entirely up to the
/// subscriber.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LauncherEvent {
    /// Human-readable status text. `game` is `None` for launcher-wide status.
    Status {
        game: Option<String>,
        text: String,
    },
    DownloadProgress {
        game: Option<String>,
        percent: u8,
        transferred_bytes: u64,
        total_bytes: Option<u64>,
        bytes_per_sec: u64,
        seconds_remaining: Option<u64>,
    },
    ExtractProgress {
        game: Option<String>,
        percent: u8,
    },
    /// Pending work for a game, with the label a host puts on its button.
    Evaluated {
        game: String,
        action: UpdateAction,
        prompt: String,
    },
    Warning {
        game: Option<String>,
        message: String,
    },
    Error {
        game: Option<String>,
        message: String,
    },
    /// Terminal signal: the game is up to date and may be launched.
    Ready { game: String },
    /// The host should shut down (game launched or launcher replaced).
    CloseRequested,
}

impl LauncherEvent {
    /// Event name used when forwarding to a webview.
    pub fn name(&self) -> &'static str {
        match self {
            LauncherEvent::Status { game: None, .. } => "launcher-global-status",
            LauncherEvent::Status { .. } => "launcher-status-update",
            LauncherEvent::DownloadProgress { .. } => "download-progress",
            LauncherEvent::ExtractProgress { .. } => "extraction-progress",
            LauncherEvent::Evaluated { .. } => "launcher-game-evaluated",
            LauncherEvent::Warning { .. } => "launcher-warning",
            LauncherEvent::Error { .. } => "launcher-error",
            LauncherEvent::Ready { .. } => "launcher-game-ready",
            LauncherEvent::CloseRequested => "close-app",
        }
    }

    pub fn download(game: Option<String>, progress: &DownloadProgress) -> Self {
        LauncherEvent::DownloadProgress {
            game,
            percent: progress.percent(),
            transferred_bytes: progress.transferred_bytes,
            total_bytes: progress.total_bytes,
            bytes_per_sec: progress.bytes_per_sec,
            seconds_remaining: progress.seconds_remaining(),
        }
    }
}

/// An event stamped with the moment it was emitted.
#[derive(Debug, Clone, Serialize)]
pub struct TimedEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: LauncherEvent,
}

/// Cheap-to-clone sender side of the channel.
#[derive(Debug, Clone)]
pub struct EventChannel {
    sender: broadcast::Sender<TimedEvent>,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Attach an observer. Only events emitted after this call are seen.
    pub fn subscribe(&self) -> broadcast::Receiver<TimedEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: LauncherEvent) {
        // No receivers is not an error: nobody is watching right now.
        let _ = self.sender.send(TimedEvent {
            at: Utc::now(),
            event,
        });
    }

    pub fn status(&self, game: Option<&str>, text: impl Into<String>) {
        let text = text.into();
        debug!(game = game.unwrap_or("-"), "status: {}", text);
        self.emit(LauncherEvent::Status {
            game: game.map(str::to_string),
            text,
        });
    }

    pub fn evaluated(&self, game: &str, action: UpdateAction) {
        self.emit(LauncherEvent::Evaluated {
            game: game.to_string(),
            action,
            prompt: action.prompt().to_string(),
        });
    }

    pub fn warn(&self, game: Option<&str>, message: impl Into<String>) {
        self.emit(LauncherEvent::Warning {
            game: game.map(str::to_string),
            message: message.into(),
        });
    }

    pub fn error(&self, game: Option<&str>, message: impl Into<String>) {
        self.emit(LauncherEvent::Error {
            game: game.map(str::to_string),
            message: message.into(),
        });
    }

    pub fn ready(&self, game: &str) {
        info!("{} is ready to play", game);
        self.emit(LauncherEvent::Ready {
            game: game.to_string(),
        });
    }

    pub fn close_requested(&self) {
        self.emit(LauncherEvent::CloseRequested);
    }
}

/// Mirror every event into the log. Used by the headless host.
pub async fn log_events(mut receiver: broadcast::Receiver<TimedEvent>) {
    loop {
        match receiver.recv().await {
            Ok(timed) => match &timed.event {
                LauncherEvent::Status { game, text } => {
                    info!("[{}] {}", game.as_deref().unwrap_or("launcher"), text)
                }
                LauncherEvent::DownloadProgress {
                    game,
                    percent,
                    transferred_bytes,
                    total_bytes,
                    bytes_per_sec,
                    seconds_remaining,
                } => debug!(
                    "[{}] download {}% ({} / {:?} bytes, {} B/s, eta {:?}s)",
                    game.as_deref().unwrap_or("launcher"),
                    percent,
                    transferred_bytes,
                    total_bytes,
                    bytes_per_sec,
                    seconds_remaining
                ),
                LauncherEvent::ExtractProgress { game, percent } => debug!(
                    "[{}] extract {}%",
                    game.as_deref().unwrap_or("launcher"),
                    percent
                ),
                LauncherEvent::Evaluated { game, prompt, .. } => {
                    info!("[{}] next: {}", game, prompt)
                }
                LauncherEvent::Warning { game, message } => {
                    warn!("[{}] {}", game.as_deref().unwrap_or("launcher"), message)
                }
                LauncherEvent::Error { game, message } => {
                    error!("[{}] {}", game.as_deref().unwrap_or("launcher"), message)
                }
                LauncherEvent::Ready { game } => info!("[{}] ready", game),
                LauncherEvent::CloseRequested => {
                    info!("host close requested");
                }
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("event logger skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn late_subscribers_miss_earlier_events() {
        let channel = EventChannel::new();
        channel.status(None, "before anyone listens");

        let mut receiver = channel.subscribe();
        channel.status(Some("alpha"), "Downloading patch 1");
        channel.ready("alpha");

        let first = receiver.recv().await.unwrap();
        assert_eq!(
            first.event,
            LauncherEvent::Status {
                game: Some("alpha".into()),
                text: "Downloading patch 1".into()
            }
        );
        let second = receiver.recv().await.unwrap();
        assert_eq!(
            second.event,
            LauncherEvent::Ready {
                game: "alpha".into()
            }
        );
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn emitting_without_observers_is_fine() {
        let channel = EventChannel::new();
        channel.status(None, "nobody home");
        channel.close_requested();
    }

    #[test]
    fn event_serializes_with_kind_tag_and_timestamp() {
        let timed = TimedEvent {
            at: Utc::now(),
            event: LauncherEvent::ExtractProgress {
                game: Some("alpha".into()),
                percent: 42,
            },
        };
        let value = serde_json::to_value(&timed).unwrap();
        assert_eq!(value["kind"], "extract-progress");
        assert_eq!(value["percent"], 42);
        assert!(value["at"].is_string());
    }

    #[test]
    fn download_event_carries_eta() {
        let progress = DownloadProgress {
            transferred_bytes: 250,
            total_bytes: Some(1_000),
            bytes_per_sec: 50,
        };
        let value = serde_json::to_value(LauncherEvent::download(None, &progress)).unwrap();
        assert_eq!(value["kind"], "download-progress");
        assert_eq!(value["percent"], 25);
        assert_eq!(value["seconds_remaining"], 15);
    }

    #[tokio::test]
    async fn evaluation_carries_button_label() {
        let channel = EventChannel::new();
        let mut receiver = channel.subscribe();
        channel.evaluated("alpha", UpdateAction::NeedsPatch);

        let timed = receiver.recv().await.unwrap();
        assert_eq!(timed.event.name(), "launcher-game-evaluated");
        assert_eq!(
            timed.event,
            LauncherEvent::Evaluated {
                game: "alpha".into(),
                action: UpdateAction::NeedsPatch,
                prompt: "Download Updates".into(),
            }
        );
    }

    #[test]
    fn global_status_uses_its_own_event_name() {
        let global = LauncherEvent::Status {
            game: None,
            text: "Checking for updates...".into(),
        };
        let per_game = LauncherEvent::Status {
            game: Some("alpha".into()),
            text: "Extracting client".into(),
        };
        assert_eq!(global.name(), "launcher-global-status");
        assert_eq!(per_game.name(), "launcher-status-update");
    }
}
