// ─── Launchpad Core ───
// Update engine for a multi-game launcher: keeps the launcher executable and
// every game client current, one committed step at a time.
//
// Architecture:
//   core/
//     config/      — Local config document, remote manifest, Config Store
//     reconcile    — Version Reconciler (remote × local → pending work)
//     downloader/  — Streaming artifact downloads with progress
//     extract/     — zip / 7z extraction with progress
//     step         — Download-Extract Step (one artifact)
//     sequencer    — Patch Sequencer (per-game state machine)
//     self_update/ — Launcher replacement + replace script
//     launch/      — Process spawning (games, replace script)
//     events/      — Status / Event Channel
//     state/       — Runtime settings + the Updater facade

pub mod cancel;
pub mod config;
pub mod downloader;
pub mod error;
pub mod events;
pub mod extract;
pub mod http;
pub mod launch;
pub mod reconcile;
pub mod self_update;
pub mod sequencer;
pub mod state;
pub mod step;
