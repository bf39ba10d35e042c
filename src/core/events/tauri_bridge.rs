use tauri::{AppHandle, Emitter};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::EventChannel;

/// Re-emit every channel event to the webview under its event name.
///
/// The returned task ends when the channel is dropped.
pub fn forward_to_webview(
    channel: &EventChannel,
    handle: AppHandle,
) -> tauri::async_runtime::JoinHandle<()> {
    let mut receiver = channel.subscribe();
    tauri::async_runtime::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(timed) => {
                    if let Err(e) = handle.emit(timed.event.name(), &timed) {
                        warn!("Failed to forward {} to webview: {}", timed.event.name(), e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("webview bridge skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
