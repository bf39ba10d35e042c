// ─── Updater ───
// One update pass: bootstrap the local config, fetch the manifest, update
// the launcher itself, then bring every game up to date. Games run
// concurrently; each game's steps run strictly in order.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use super::settings::UpdaterSettings;
use crate::core::cancel::CancelToken;
use crate::core::config::{
    ConfigField, ConfigStore, ConfigUpdate, LocalConfig, RemoteConfig, RemoteGameDescriptor,
};
use crate::core::downloader::{ArtifactDownloader, HttpDownloader};
use crate::core::error::{UpdaterError, UpdaterResult};
use crate::core::events::EventChannel;
use crate::core::extract::{ArchiveExtractor, ArchiveFormatExtractor};
use crate::core::http::build_http_client;
use crate::core::launch::{ProcessSpawner, SystemSpawner};
use crate::core::reconcile::{reconcile, UpdateAction};
use crate::core::self_update::{SelfUpdateOutcome, SelfUpdater};
use crate::core::sequencer::{PatchSequencer, SequencerContext, SequencerState};

/// How one game's sequencer ended.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GameReport {
    pub game: String,
    /// Work pending when the pass started.
    pub action: Option<UpdateAction>,
    pub state: SequencerState,
    pub error: Option<String>,
}

impl GameReport {
    fn failed(game: &str, action: Option<UpdateAction>, error: &UpdaterError) -> Self {
        Self {
            game: game.to_string(),
            action,
            state: SequencerState::Failed,
            error: Some(error.to_string()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == SequencerState::Ready
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdatePass {
    /// The launcher is being replaced; no game was touched.
    Restarting { launcher_ver: u32 },
    Completed {
        manifest: RemoteConfig,
        games: Vec<GameReport>,
    },
}

impl UpdatePass {
    pub fn reports(&self) -> &[GameReport] {
        match self {
            UpdatePass::Restarting { .. } => &[],
            UpdatePass::Completed { games, .. } => games,
        }
    }

    /// The game to start: the last one played if it is ready, otherwise the
    /// first ready game in manifest order.
    pub fn launch_candidate(&self, last_selected: &str) -> Option<&RemoteGameDescriptor> {
        let UpdatePass::Completed { manifest, games } = self else {
            return None;
        };
        let ready = |name: &str| games.iter().any(|r| r.game == name && r.is_ready());

        manifest
            .game(last_selected)
            .filter(|g| ready(&g.name))
            .or_else(|| manifest.games.iter().find(|g| ready(&g.name)))
    }
}

pub struct Updater {
    settings: UpdaterSettings,
    http_client: Client,
    store: Arc<ConfigStore>,
    downloader: Arc<dyn ArtifactDownloader>,
    extractor: Arc<dyn ArchiveExtractor>,
    spawner: Arc<dyn ProcessSpawner>,
    events: EventChannel,
    current_exe: PathBuf,
    /// Games with a sequencer in flight. A second pass for the same game
    /// must not interleave steps with the first.
    active_games: Mutex<HashSet<String>>,
}

impl Updater {
    /// Production wiring: HTTP downloads, zip/7z extraction, shell spawning.
    pub fn new(settings: UpdaterSettings) -> UpdaterResult<Self> {
        let http_client = build_http_client(settings.connect_timeout)?;
        let downloader = Arc::new(HttpDownloader::new(http_client.clone()));
        Self::with_collaborators(
            settings,
            http_client,
            downloader,
            Arc::new(ArchiveFormatExtractor),
            Arc::new(SystemSpawner),
        )
    }

    pub fn with_collaborators(
        settings: UpdaterSettings,
        http_client: Client,
        downloader: Arc<dyn ArtifactDownloader>,
        extractor: Arc<dyn ArchiveExtractor>,
        spawner: Arc<dyn ProcessSpawner>,
    ) -> UpdaterResult<Self> {
        let current_exe = std::env::current_exe().map_err(|e| UpdaterError::Io {
            path: PathBuf::from("<current executable>"),
            source: e,
        })?;

        Ok(Self {
            store: Arc::new(ConfigStore::new(settings.config_path())),
            settings,
            http_client,
            downloader,
            extractor,
            spawner,
            events: EventChannel::new(),
            current_exe,
            active_games: Mutex::new(HashSet::new()),
        })
    }

    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn settings(&self) -> &UpdaterSettings {
        &self.settings
    }

    /// Read the local config, regenerating it from defaults if unusable.
    pub async fn load_local_config(&self) -> UpdaterResult<LocalConfig> {
        let defaults = LocalConfig::with_defaults(&self.settings.default_updater_url);
        self.store.load_or_init(&defaults).await
    }

    /// Full pass against the manifest at the configured updater URL.
    pub async fn check_for_updates(&self, cancel: &CancelToken) -> UpdaterResult<UpdatePass> {
        self.events.status(None, "Checking for updates...");
        let local = self.load_local_config().await?;

        let manifest = match RemoteConfig::fetch(&self.http_client, &local.updater_url).await {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Manifest fetch failed: {}", e);
                self.events.warn(
                    None,
                    format!("Could not reach the update server ({e}); check your connection"),
                );
                return Err(e);
            }
        };

        self.apply_manifest(&local, manifest, cancel).await
    }

    /// Everything after the manifest fetch: launcher first, then games.
    pub async fn apply_manifest(
        &self,
        local: &LocalConfig,
        manifest: RemoteConfig,
        cancel: &CancelToken,
    ) -> UpdaterResult<UpdatePass> {
        let self_updater = SelfUpdater {
            store: self.store.clone(),
            downloader: self.downloader.clone(),
            spawner: self.spawner.clone(),
            events: self.events.clone(),
            launcher_dir: self.settings.launcher_dir.clone(),
            current_exe: self.current_exe.clone(),
            skip: self.settings.skip_self_update,
        };

        match self_updater.run(local, &manifest, cancel).await {
            Ok(SelfUpdateOutcome::Restarting { launcher_ver }) => {
                return Ok(UpdatePass::Restarting { launcher_ver })
            }
            Ok(_) => {}
            Err(e) => {
                self.events
                    .error(None, format!("Launcher update failed: {e}"));
                return Err(e);
            }
        }

        let games = join_all(
            manifest
                .games
                .iter()
                .map(|game| self.update_game(game, cancel)),
        )
        .await;

        let ready = games.iter().filter(|r| r.is_ready()).count();
        info!("Update pass finished: {}/{} games ready", ready, games.len());
        Ok(UpdatePass::Completed { manifest, games })
    }

    /// Run one game's sequencer. Failures are reported, never propagated,
    /// so one broken game does not stop the others.
    pub async fn update_game(&self, game: &RemoteGameDescriptor, cancel: &CancelToken) -> GameReport {
        let name = game.name.as_str();
        let Some(_active) = ActiveGame::claim(&self.active_games, name) else {
            let e = UpdaterError::Other(format!("{name} is already being updated"));
            self.events.error(Some(name), e.to_string());
            return GameReport::failed(name, None, &e);
        };

        let prepared = async {
            let install_dir = self.settings.game_dir(name)?;
            self.store.ensure_game_record(name).await?;
            Ok::<_, UpdaterError>(install_dir)
        }
        .await;
        let install_dir = match prepared {
            Ok(dir) => dir,
            Err(e) => {
                self.events.error(Some(name), e.to_string());
                return GameReport::failed(name, None, &e);
            }
        };

        let mut sequencer = PatchSequencer::new(self.sequencer_context(), game.clone(), install_dir);
        let action = match sequencer.evaluate().await {
            Ok(action) => action,
            Err(e) => {
                self.events.error(Some(name), e.to_string());
                return GameReport::failed(name, None, &e);
            }
        };
        self.events.status(Some(name), action.describe());
        self.events.evaluated(name, action);

        let error = sequencer.run(cancel).await.err().map(|e| e.to_string());
        GameReport {
            game: sequencer.game().to_string(),
            action: Some(action),
            state: sequencer.state(),
            error,
        }
    }

    /// Start an up-to-date game from its install directory, remember it as
    /// the last selected game and ask the host to close.
    pub async fn launch_game(&self, game: &RemoteGameDescriptor) -> UpdaterResult<u32> {
        let record = self.store.game_record(&game.name).await?;
        if record.is_none() {
            return Err(UpdaterError::GameNotFound(game.name.clone()));
        }
        let action = reconcile(game, record.as_ref());
        if action != UpdateAction::UpToDate {
            return Err(UpdaterError::Other(format!(
                "{} is not ready to play: {}",
                game.name,
                action.describe()
            )));
        }

        let install_dir = self.settings.game_dir(&game.name)?;
        self.events.status(Some(game.name.as_str()), "Launching");
        let pid = self.spawner.spawn(&game.start_cmd, &install_dir, true)?;
        info!("Started {} (pid {})", game.name, pid);

        self.store
            .update(ConfigUpdate::Field(ConfigField::LastSelectedGame(
                game.name.clone(),
            )))
            .await?;
        self.events.close_requested();
        Ok(pid)
    }

    fn sequencer_context(&self) -> SequencerContext {
        SequencerContext {
            store: self.store.clone(),
            downloader: self.downloader.clone(),
            extractor: self.extractor.clone(),
            events: self.events.clone(),
        }
    }
}

/// Membership in the in-flight set, released on drop.
struct ActiveGame<'a> {
    set: &'a Mutex<HashSet<String>>,
    name: String,
}

impl<'a> ActiveGame<'a> {
    fn claim(set: &'a Mutex<HashSet<String>>, name: &str) -> Option<Self> {
        let mut active = set.lock().unwrap_or_else(|e| e.into_inner());
        active.insert(name.to_string()).then(|| Self {
            set,
            name: name.to_string(),
        })
    }
}

impl Drop for ActiveGame<'_> {
    fn drop(&mut self) {
        let mut active = self.set.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::LauncherEvent;
    use crate::core::step::fakes::{applied, FakeDownloader, FakeExtractor, FakeSpawner};

    struct Harness {
        _dir: tempfile::TempDir,
        updater: Updater,
        downloader: Arc<FakeDownloader>,
        spawner: Arc<FakeSpawner>,
    }

    fn harness_with(downloader: FakeDownloader, skip_self_update: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let settings = UpdaterSettings {
            launcher_dir: dir.path().to_path_buf(),
            default_updater_url: "http://127.0.0.1:1/config.json".into(),
            skip_self_update,
            ..UpdaterSettings::default()
        };
        let downloader = Arc::new(downloader);
        let spawner = Arc::new(FakeSpawner::default());
        let updater = Updater::with_collaborators(
            settings,
            Client::new(),
            downloader.clone(),
            Arc::new(FakeExtractor::default()),
            spawner.clone(),
        )
        .unwrap();
        Harness {
            _dir: dir,
            updater,
            downloader,
            spawner,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeDownloader::default(), true)
    }

    fn game(name: &str, client_ver: u32, patches: u32) -> RemoteGameDescriptor {
        RemoteGameDescriptor {
            name: name.into(),
            start_cmd: format!("{name}.exe -windowed"),
            client_ver,
            client_url: format!("https://cdn.example.com/{name}/client-{client_ver}.7z"),
            patch_urls: (1..=patches)
                .map(|i| format!("https://cdn.example.com/{name}/patch-{i}.7z"))
                .collect(),
        }
    }

    fn manifest(launcher_ver: u32, games: Vec<RemoteGameDescriptor>) -> RemoteConfig {
        RemoteConfig {
            launcher_ver,
            launcher_url: "https://cdn.example.com/launcher/launcher.exe".into(),
            games,
        }
    }

    #[tokio::test]
    async fn every_game_is_brought_up_to_date() {
        let h = harness();
        let local = h.updater.load_local_config().await.unwrap();

        let pass = h
            .updater
            .apply_manifest(
                &local,
                manifest(1, vec![game("alpha", 1, 2), game("beta", 3, 0)]),
                &CancelToken::new(),
            )
            .await
            .unwrap();

        let reports = pass.reports();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(GameReport::is_ready));
        assert_eq!(reports[0].action, Some(UpdateAction::NeedsInstall));

        let config = h.updater.store().read().await.unwrap();
        let alpha = config.game("alpha").unwrap();
        let beta = config.game("beta").unwrap();
        assert_eq!((alpha.client_ver, alpha.patch_ver), (1, 2));
        assert_eq!((beta.client_ver, beta.patch_ver), (3, 0));

        let root = &h.updater.settings().launcher_dir;
        assert_eq!(
            applied(&root.join("alpha")),
            vec!["client-1.7z", "patch-1.7z", "patch-2.7z"]
        );
        assert_eq!(applied(&root.join("beta")), vec!["client-3.7z"]);
    }

    #[tokio::test]
    async fn evaluation_is_announced_before_work_starts() {
        let h = harness();
        let mut rx = h.updater.events().subscribe();

        let report = h.updater.update_game(&game("alpha", 1, 0), &CancelToken::new()).await;
        assert!(report.is_ready());

        let mut events = Vec::new();
        while let Ok(timed) = rx.try_recv() {
            events.push(timed.event);
        }
        let evaluated = events
            .iter()
            .position(|e| matches!(e, LauncherEvent::Evaluated { .. }))
            .unwrap();
        assert_eq!(
            events[evaluated],
            LauncherEvent::Evaluated {
                game: "alpha".into(),
                action: UpdateAction::NeedsInstall,
                prompt: "Install".into(),
            }
        );
        let first_download = events
            .iter()
            .position(|e| matches!(e, LauncherEvent::DownloadProgress { .. }))
            .unwrap();
        assert!(evaluated < first_download);
    }

    #[tokio::test]
    async fn one_failing_game_does_not_stop_the_others() {
        let h = harness_with(FakeDownloader::failing_on("/beta/"), true);
        let local = h.updater.load_local_config().await.unwrap();

        let pass = h
            .updater
            .apply_manifest(
                &local,
                manifest(1, vec![game("alpha", 1, 1), game("beta", 1, 1)]),
                &CancelToken::new(),
            )
            .await
            .unwrap();

        let reports = pass.reports();
        assert!(reports[0].is_ready());
        assert_eq!(reports[1].state, SequencerState::Failed);
        assert!(reports[1].error.as_deref().unwrap().contains("503"));

        let config = h.updater.store().read().await.unwrap();
        let beta = config.game("beta").unwrap();
        assert_eq!((beta.client_ver, beta.patch_ver), (0, 0));
        assert_eq!(pass.launch_candidate("beta").unwrap().name, "alpha");
    }

    #[tokio::test]
    async fn launcher_update_preempts_games() {
        let h = harness_with(FakeDownloader::default(), false);
        let local = h.updater.load_local_config().await.unwrap();

        let pass = h
            .updater
            .apply_manifest(
                &local,
                manifest(2, vec![game("alpha", 1, 0)]),
                &CancelToken::new(),
            )
            .await
            .unwrap();

        assert!(matches!(pass, UpdatePass::Restarting { launcher_ver: 2 }));
        assert_eq!(h.downloader.requested().len(), 1);
        assert!(h.updater.store().read().await.unwrap().game("alpha").is_none());
    }

    #[tokio::test]
    async fn unusable_game_name_fails_only_that_game() {
        let h = harness();
        let local = h.updater.load_local_config().await.unwrap();

        let pass = h
            .updater
            .apply_manifest(
                &local,
                manifest(1, vec![game("../escape", 1, 0), game("alpha", 1, 0)]),
                &CancelToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(pass.reports()[0].state, SequencerState::Failed);
        assert!(pass.reports()[1].is_ready());
    }

    #[tokio::test]
    async fn launch_starts_ready_game_and_requests_close() {
        let h = harness();
        let local = h.updater.load_local_config().await.unwrap();
        let alpha = game("alpha", 1, 1);
        h.updater
            .apply_manifest(&local, manifest(1, vec![alpha.clone()]), &CancelToken::new())
            .await
            .unwrap();
        let mut rx = h.updater.events().subscribe();

        let pid = h.updater.launch_game(&alpha).await.unwrap();

        assert_eq!(pid, 4242);
        let spawned = h.spawner.spawned();
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0].0, "alpha.exe -windowed");
        assert_eq!(spawned[0].1, h.updater.settings().launcher_dir.join("alpha"));
        assert_eq!(
            h.updater.store().read().await.unwrap().last_selected_game,
            "alpha"
        );

        let mut closed = false;
        while let Ok(timed) = rx.try_recv() {
            closed |= timed.event == LauncherEvent::CloseRequested;
        }
        assert!(closed);
    }

    #[tokio::test]
    async fn launch_refuses_games_with_pending_work() {
        let h = harness();
        h.updater.load_local_config().await.unwrap();
        let alpha = game("alpha", 1, 0);

        assert!(matches!(
            h.updater.launch_game(&alpha).await,
            Err(UpdaterError::GameNotFound(_))
        ));

        h.updater.store().ensure_game_record("alpha").await.unwrap();
        assert!(h.updater.launch_game(&alpha).await.is_err());
        assert!(h.spawner.spawned().is_empty());
    }

    #[tokio::test]
    async fn same_game_is_not_updated_twice_at_once() {
        let h = harness();
        let _held = ActiveGame::claim(&h.updater.active_games, "alpha").unwrap();

        let report = h
            .updater
            .update_game(&game("alpha", 1, 0), &CancelToken::new())
            .await;

        assert_eq!(report.state, SequencerState::Failed);
        assert!(h.downloader.requested().is_empty());
    }

    #[tokio::test]
    async fn unreachable_server_is_reported_as_warning() {
        let h = harness();
        let mut rx = h.updater.events().subscribe();

        let result = h.updater.check_for_updates(&CancelToken::new()).await;

        assert!(result.is_err());
        let mut warned = false;
        while let Ok(timed) = rx.try_recv() {
            warned |= matches!(timed.event, LauncherEvent::Warning { game: None, .. });
        }
        assert!(warned);
        assert!(h.updater.store().path().exists());
    }
}
