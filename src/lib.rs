pub mod core;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::core::cancel::CancelToken;
use crate::core::error::UpdaterResult;
use crate::core::events::log_events;
use crate::core::state::{UpdatePass, Updater, UpdaterSettings};

/// Headless host: one update pass, then start the selected game if one is
/// ready.
pub fn run() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,launchpad_lib=debug")),
        )
        .init();

    info!("Launchpad {} starting...", env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Could not start the async runtime: {}", e);
            return;
        }
    };

    if let Err(e) = runtime.block_on(run_pass(UpdaterSettings::from_env())) {
        error!("Update pass failed: {}", e);
    }
}

async fn run_pass(settings: UpdaterSettings) -> UpdaterResult<()> {
    let auto_launch = settings.auto_launch;
    let updater = Updater::new(settings)?;
    tokio::spawn(log_events(updater.events().subscribe()));

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping at the next checkpoint");
            on_interrupt.cancel();
        }
    });

    let pass = updater.check_for_updates(&cancel).await?;
    if let UpdatePass::Restarting { launcher_ver } = pass {
        info!("Exiting so launcher v{} can replace this build", launcher_ver);
        return Ok(());
    }

    for report in pass.reports() {
        match &report.error {
            None => info!("{}: {:?}", report.game, report.state),
            Some(e) => warn!("{}: {:?} ({})", report.game, report.state, e),
        }
    }

    if !auto_launch {
        return Ok(());
    }
    let local = updater.store().read().await?;
    match pass.launch_candidate(&local.last_selected_game) {
        Some(game) => {
            updater.launch_game(game).await?;
        }
        None => warn!("No game is ready to play"),
    }
    Ok(())
}
