// ─── Patch Sequencer ───
// Brings one game from its local record to the remote descriptor, one
// download-extract step at a time. Each step's version is committed to the
// Config Store as soon as its extraction finishes, so an interrupted run
// resumes at the first step that never committed.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::core::cancel::CancelToken;
use crate::core::config::{
    ConfigStore, ConfigUpdate, GameUpdate, LocalGameRecord, RemoteGameDescriptor,
};
use crate::core::downloader::ArtifactDownloader;
use crate::core::error::{UpdaterError, UpdaterResult};
use crate::core::events::EventChannel;
use crate::core::extract::ArchiveExtractor;
use crate::core::reconcile::{reconcile, UpdateAction};
use crate::core::step::ArtifactStep;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "state", content = "patch", rename_all = "snake_case")]
pub enum SequencerState {
    Evaluating,
    InstallingClient,
    /// Zero-based index into the descriptor's patch list.
    ApplyingPatch(u32),
    Ready,
    Failed,
}

/// Collaborators shared by every sequencer of an update pass.
#[derive(Clone)]
pub struct SequencerContext {
    pub store: Arc<ConfigStore>,
    pub downloader: Arc<dyn ArtifactDownloader>,
    pub extractor: Arc<dyn ArchiveExtractor>,
    pub events: EventChannel,
}

pub struct PatchSequencer {
    ctx: SequencerContext,
    remote: RemoteGameDescriptor,
    install_dir: PathBuf,
    state: SequencerState,
}

impl PatchSequencer {
    pub fn new(ctx: SequencerContext, remote: RemoteGameDescriptor, install_dir: PathBuf) -> Self {
        Self {
            ctx,
            remote,
            install_dir,
            state: SequencerState::Evaluating,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn game(&self) -> &str {
        &self.remote.name
    }

    /// Pending work for this game, without doing any of it.
    pub async fn evaluate(&self) -> UpdaterResult<UpdateAction> {
        let record = self.current_record().await?;
        Ok(reconcile(&self.remote, Some(&record)))
    }

    /// Drive the game to READY. On error the sequencer ends in FAILED, an
    /// error event is emitted and the error is returned; every step committed
    /// before the failure stays committed.
    pub async fn run(&mut self, cancel: &CancelToken) -> UpdaterResult<()> {
        match self.drive(cancel).await {
            Ok(()) => {
                self.transition(SequencerState::Ready);
                self.ctx
                    .events
                    .status(Some(self.remote.name.as_str()), UpdateAction::UpToDate.describe());
                self.ctx.events.ready(&self.remote.name);
                Ok(())
            }
            Err(e) => {
                error!("Updating {} failed: {}", self.remote.name, e);
                self.transition(SequencerState::Failed);
                self.ctx
                    .events
                    .error(Some(self.remote.name.as_str()), e.to_string());
                Err(e)
            }
        }
    }

    async fn drive(&mut self, cancel: &CancelToken) -> UpdaterResult<()> {
        // One client install plus every patch; anything beyond that means the
        // record is not advancing.
        let max_steps = self.remote.patch_count() as usize + 1;
        let mut steps = 0usize;

        loop {
            cancel.check()?;
            self.transition(SequencerState::Evaluating);
            let record = self.current_record().await?;
            let action = reconcile(&self.remote, Some(&record));
            debug!(
                "{}: local v{}+{} vs remote v{}+{} → {:?}",
                self.remote.name,
                record.client_ver,
                record.patch_ver,
                self.remote.client_ver,
                self.remote.patch_count(),
                action
            );

            if action == UpdateAction::UpToDate {
                return Ok(());
            }
            if steps == max_steps {
                return Err(UpdaterError::Other(format!(
                    "{}: local record did not converge after {} steps",
                    self.remote.name, steps
                )));
            }
            steps += 1;

            if action.needs_client() {
                self.install_client(cancel).await?;
            } else {
                self.apply_patch(record.patch_ver, cancel).await?;
            }
        }
    }

    async fn install_client(&mut self, cancel: &CancelToken) -> UpdaterResult<()> {
        self.transition(SequencerState::InstallingClient);
        self.step()
            .run(&self.remote.client_url, &self.install_dir, "client", cancel)
            .await?;

        // A new client discards the patch baseline of the old one.
        self.commit(
            GameUpdate::new(&self.remote.name)
                .client_ver(self.remote.client_ver)
                .patch_ver(0),
        )
        .await?;
        self.ctx.events.status(
            Some(self.remote.name.as_str()),
            format!("Client v{} installed", self.remote.client_ver),
        );
        Ok(())
    }

    async fn apply_patch(&mut self, index: u32, cancel: &CancelToken) -> UpdaterResult<()> {
        let url = self
            .remote
            .patch_urls
            .get(index as usize)
            .cloned()
            .ok_or_else(|| UpdaterError::VersionMismatch {
                game: self.remote.name.clone(),
                reason: format!("no patch published at index {index}"),
            })?;

        self.transition(SequencerState::ApplyingPatch(index));
        let number = index + 1;
        self.step()
            .run(&url, &self.install_dir, &format!("patch {number}"), cancel)
            .await?;

        self.commit(GameUpdate::new(&self.remote.name).patch_ver(number))
            .await?;
        self.ctx
            .events
            .status(Some(self.remote.name.as_str()), format!("Patch {number} applied"));
        Ok(())
    }

    /// The record is re-read before every step: other writers may have
    /// changed it since the last one. Unparseable versions were already read
    /// as 0, so a malformed record reconciles as a fresh install.
    async fn current_record(&self) -> UpdaterResult<LocalGameRecord> {
        let name = &self.remote.name;
        Ok(self
            .ctx
            .store
            .game_record(name)
            .await?
            .unwrap_or_else(|| LocalGameRecord::fresh(name)))
    }

    async fn commit(&self, update: GameUpdate) -> UpdaterResult<()> {
        info!("Committing {:?}", update);
        self.ctx.store.update(ConfigUpdate::Game(update)).await?;
        Ok(())
    }

    fn step(&self) -> ArtifactStep<'_> {
        ArtifactStep {
            downloader: self.ctx.downloader.as_ref(),
            extractor: self.ctx.extractor.as_ref(),
            events: &self.ctx.events,
            game: Some(self.remote.name.as_str()),
        }
    }

    fn transition(&mut self, next: SequencerState) {
        if self.state != next {
            debug!("{}: {:?} → {:?}", self.remote.name, self.state, next);
            self.state = next;
        }
    }
}
