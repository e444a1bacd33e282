//! Session coordination: mount, browse, play, tear down.
//!
//! [`SessionCoordinator::run`] drives one session through
//! `Idle → Mounting → Browsing → Selecting → Playing → Unmounting → Closed`,
//! with `Failed` reachable from mounting, browsing and playing. Whatever happens
//! in between, the teardown block at the end of `run` executes exactly once.
//!
//! The coordinator never touches the screen. Frontends subscribe to
//! [`SessionEvent`]s and feed [`UserAction`]s through an [`ActionSource`].
//!
//! A quit signal arrives through the coordinator's [`CancellationToken`]. It
//! is observed between operations: a pending action wait is abandoned, but a
//! running player is left to exit on its own before teardown starts.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::BtplayConfig;
use crate::mount::{
    CleanupWarning, MountController, MountError, MountFailure, MountProbe, MountSession,
    ReleaseReport, SystemMountProbe,
};
use crate::navigator::{EnterOutcome, ListingError, NavigationState, Navigator, PlayableFilter};
use crate::playback::{PlaybackDispatcher, PlaybackError, PlaybackOutcome};
use crate::process::{CommandRunner, SystemCommandRunner};

/// Lifecycle states of a mount session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Mounting,
    Browsing,
    /// A playable file was picked; playback is about to start
    Selecting,
    Playing,
    Unmounting,
    Closed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Mounting => "mounting",
            SessionState::Browsing => "browsing",
            SessionState::Selecting => "selecting",
            SessionState::Playing => "playing",
            SessionState::Unmounting => "unmounting",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Input from the user while browsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    MoveUp,
    MoveDown,
    /// Put the cursor on a specific entry
    Select(usize),
    /// Select a specific entry and enter it; ignored if out of range
    Open(usize),
    /// Enter the directory or play the file under the cursor
    Enter,
    /// Go to the parent directory
    Back,
    Quit,
}

/// Supplies user input between operations.
#[async_trait]
pub trait ActionSource: Send {
    /// Waits for the next action given the listing currently shown.
    async fn next_action(&mut self, state: &NavigationState) -> UserAction;
}

/// Notifications for presentation layers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    Status(String),
    Listing(NavigationState),
    NoContent {
        dir: PathBuf,
        listing_error: Option<ListingError>,
    },
    PlaybackStarted {
        file: PathBuf,
    },
    PlaybackFinished {
        player: PathBuf,
    },
    Cleanup(CleanupWarning),
}

/// Failures that end a session early.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Mount failed: {0}")]
    Mount(#[from] MountError),

    #[error("Playback failed: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Mount root unreadable: {0}")]
    Listing(#[from] ListingError),
}

/// How a session ended, before teardown.
#[derive(Debug)]
pub enum SessionEnd {
    Played(PlaybackOutcome),
    /// User quit
    Cancelled,
    /// The torrent exposes no directories or playable files
    NoContent,
    Failed(SessionError),
}

/// Summary returned once the session is closed.
#[derive(Debug)]
pub struct SessionReport {
    pub source: PathBuf,
    /// Mount point used, if one was created
    pub mount_point: Option<PathBuf>,
    /// Every state entered, starting with `Idle` and ending with `Closed`
    pub history: Vec<SessionState>,
    pub end: SessionEnd,
    /// Teardown result, if there was a mount point to release
    pub release: Option<ReleaseReport>,
}

impl SessionReport {
    pub fn final_state(&self) -> SessionState {
        self.history.last().copied().unwrap_or(SessionState::Idle)
    }

    /// True if the session passed through `Failed`.
    pub fn is_failed(&self) -> bool {
        matches!(self.end, SessionEnd::Failed(_))
    }

    pub fn error(&self) -> Option<&SessionError> {
        match &self.end {
            SessionEnd::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn cleanup_warnings(&self) -> &[CleanupWarning] {
        self.release
            .as_ref()
            .map(|report| report.warnings.as_slice())
            .unwrap_or(&[])
    }
}

/// Drives mount sessions. One session at a time per coordinator.
pub struct SessionCoordinator {
    mounts: MountController,
    playback: PlaybackDispatcher,
    filter: PlayableFilter,
    subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
    cancel: CancellationToken,
    state: SessionState,
    history: Vec<SessionState>,
}

impl SessionCoordinator {
    pub fn new(
        mounts: MountController,
        playback: PlaybackDispatcher,
        filter: PlayableFilter,
    ) -> Self {
        Self {
            mounts,
            playback,
            filter,
            subscribers: Vec::new(),
            cancel: CancellationToken::new(),
            state: SessionState::Idle,
            history: Vec::new(),
        }
    }

    /// Builds every component from `config` around one runner and probe.
    pub fn from_config(
        config: &BtplayConfig,
        runner: Arc<dyn CommandRunner>,
        probe: Arc<dyn MountProbe>,
    ) -> Self {
        let mounts = MountController::new(config.mount.clone(), runner.clone(), probe);
        let playback = PlaybackDispatcher::from_config(&config.playback, runner);
        let filter = PlayableFilter::new(&config.playback.playable_extensions);
        Self::new(mounts, playback, filter)
    }

    /// Builds a coordinator that runs real processes.
    pub fn with_system(config: &BtplayConfig) -> Self {
        Self::from_config(
            config,
            Arc::new(SystemCommandRunner::new()),
            Arc::new(SystemMountProbe),
        )
    }

    /// Registers a new event subscriber.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Uses `cancel` as the quit signal instead of a private token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that ends the running session as a user quit when cancelled.
    ///
    /// A fresh token is installed once a session closes after cancellation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs a complete session for the torrent at `source`.
    ///
    /// Returns only after the mount point has been unmounted and removed
    /// (or those steps have failed and been reported as warnings).
    pub async fn run(&mut self, source: &Path, actions: &mut dyn ActionSource) -> SessionReport {
        self.state = SessionState::Idle;
        self.history = vec![SessionState::Idle];
        tracing::info!("Starting session for {}", source.display());

        self.transition(SessionState::Mounting);
        self.status(format!("Mounting {}", source.display()));

        let (mut session, end) = match self.mounts.acquire(source).await {
            Ok(session) => {
                self.status(format!("Mounted at {}", session.mount_point().display()));
                self.transition(SessionState::Browsing);
                let end = self.browse(&session, actions).await;
                (Some(session), end)
            }
            Err(MountFailure { session, error }) => {
                tracing::error!("{}", error);
                self.status(error.to_string());
                self.transition(SessionState::Failed);
                (session, SessionEnd::Failed(error.into()))
            }
        };

        let release = self.teardown(session.as_mut()).await;
        let mount_point = session.as_ref().map(|s| s.mount_point().to_path_buf());
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        SessionReport {
            source: source.to_path_buf(),
            mount_point,
            history: std::mem::take(&mut self.history),
            end,
            release,
        }
    }

    async fn teardown(&mut self, session: Option<&mut MountSession>) -> Option<ReleaseReport> {
        self.transition(SessionState::Unmounting);

        let release = match session {
            Some(session) => {
                let report = self.mounts.release(session).await;
                for warning in &report.warnings {
                    self.emit(SessionEvent::Cleanup(warning.clone()));
                }
                Some(report)
            }
            None => None,
        };

        self.transition(SessionState::Closed);
        release
    }

    async fn browse(
        &mut self,
        session: &MountSession,
        actions: &mut dyn ActionSource,
    ) -> SessionEnd {
        let navigator = Navigator::new(session.mount_point(), self.filter.clone());
        let mut state = navigator.open_root().await;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Session interrupted");
                return SessionEnd::Cancelled;
            }

            if let Err(e) = navigator.check_content(&state) {
                self.status(e.to_string());
                self.emit(SessionEvent::NoContent {
                    dir: state.current_dir().to_path_buf(),
                    listing_error: state.listing_error().cloned(),
                });

                if !state.is_at_root() {
                    state = navigator.up(&state).await;
                    continue;
                }
                if let Some(error) = state.listing_error() {
                    self.transition(SessionState::Failed);
                    return SessionEnd::Failed(error.clone().into());
                }
                return SessionEnd::NoContent;
            }

            self.emit(SessionEvent::Listing(state.clone()));

            let cancel = self.cancel.clone();
            let action = tokio::select! {
                biased;
                _ = cancel.cancelled() => UserAction::Quit,
                action = actions.next_action(&state) => action,
            };

            match action {
                UserAction::MoveUp => state.move_selection(-1),
                UserAction::MoveDown => state.move_selection(1),
                UserAction::Select(index) => {
                    if !state.select(index) {
                        self.status(format!("No entry numbered {}", index + 1));
                    }
                }
                UserAction::Open(index) => {
                    if !state.select(index) {
                        self.status(format!("No entry numbered {}", index + 1));
                    } else if let Some(end) = self.open_selected(&navigator, &mut state).await {
                        return end;
                    }
                }
                UserAction::Enter => {
                    if let Some(end) = self.open_selected(&navigator, &mut state).await {
                        return end;
                    }
                }
                UserAction::Back => state = navigator.up(&state).await,
                UserAction::Quit => {
                    tracing::info!("Session cancelled by user");
                    return SessionEnd::Cancelled;
                }
            }
        }
    }

    /// Enters the entry under the cursor. Returns the session end once a file
    /// has been handed to a player.
    async fn open_selected(
        &mut self,
        navigator: &Navigator,
        state: &mut NavigationState,
    ) -> Option<SessionEnd> {
        match navigator.enter_selected(state).await {
            Ok(EnterOutcome::Navigated(next)) => {
                *state = next;
                None
            }
            Ok(EnterOutcome::Selected(file)) => {
                self.transition(SessionState::Selecting);
                Some(self.play(file).await)
            }
            Err(e) => {
                self.status(e.to_string());
                None
            }
        }
    }

    async fn play(&mut self, file: PathBuf) -> SessionEnd {
        self.transition(SessionState::Playing);
        self.emit(SessionEvent::PlaybackStarted { file: file.clone() });

        match self.playback.play_until_cancelled(&file, &self.cancel).await {
            Ok(outcome) => {
                self.emit(SessionEvent::PlaybackFinished {
                    player: outcome.player.clone(),
                });
                SessionEnd::Played(outcome)
            }
            Err(PlaybackError::Interrupted { attempts, .. }) => {
                tracing::info!(
                    "Playback interrupted after {} attempt(s)",
                    attempts.len()
                );
                self.status("Interrupted, not trying further players".to_string());
                SessionEnd::Cancelled
            }
            Err(error) => {
                tracing::error!("{}", error);
                self.status(error.to_string());
                self.transition(SessionState::Failed);
                SessionEnd::Failed(error.into())
            }
        }
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        tracing::debug!("Session state {} -> {}", from, to);
        self.state = to;
        self.history.push(to);
        self.emit(SessionEvent::StateChanged { from, to });
    }

    fn status(&mut self, message: String) {
        self.emit(SessionEvent::Status(message));
    }

    fn emit(&mut self, event: SessionEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("mounts", &self.mounts)
            .field("playback", &self.playback)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::test_fixtures::{FakeFuse, ScriptedActions, write_torrent_file};

    fn coordinator(root: &Path, fuse: &Arc<FakeFuse>) -> SessionCoordinator {
        let config = BtplayConfig::for_testing(root);
        SessionCoordinator::from_config(&config, fuse.clone(), fuse.clone())
    }

    #[tokio::test]
    async fn test_quit_immediately_tears_down() {
        let temp_dir = TempDir::new().unwrap();
        let source = write_torrent_file(temp_dir.path(), "movie");
        let fuse = Arc::new(FakeFuse::new().with_file("Movie.mkv", b"x"));
        let mut coordinator = coordinator(temp_dir.path(), &fuse);
        let mut actions = ScriptedActions::new([UserAction::Quit]);

        let report = coordinator.run(&source, &mut actions).await;

        assert!(matches!(report.end, SessionEnd::Cancelled));
        assert_eq!(
            report.history,
            vec![
                SessionState::Idle,
                SessionState::Mounting,
                SessionState::Browsing,
                SessionState::Unmounting,
                SessionState::Closed
            ]
        );
        assert_eq!(coordinator.state(), SessionState::Closed);
        assert!(!report.mount_point.unwrap().exists());
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let temp_dir = TempDir::new().unwrap();
        let source = write_torrent_file(temp_dir.path(), "movie");
        let fuse = Arc::new(FakeFuse::new().with_file("Movie.mkv", b"x"));
        let mut coordinator = coordinator(temp_dir.path(), &fuse);
        let mut events = coordinator.subscribe();
        let mut actions = ScriptedActions::new([UserAction::Quit]);

        coordinator.run(&source, &mut actions).await;

        let mut saw_listing = false;
        let mut last_state = None;
        while let Ok(event) = events.try_recv() {
            match event {
                SessionEvent::Listing(state) => {
                    saw_listing = true;
                    assert_eq!(state.entries()[0].name, "Movie.mkv");
                }
                SessionEvent::StateChanged { to, .. } => last_state = Some(to),
                _ => {}
            }
        }
        assert!(saw_listing);
        assert_eq!(last_state, Some(SessionState::Closed));
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let source = write_torrent_file(temp_dir.path(), "movie");
        let fuse = Arc::new(FakeFuse::new().with_file("Movie.mkv", b"x"));
        let mut coordinator = coordinator(temp_dir.path(), &fuse);
        drop(coordinator.subscribe());

        let report = coordinator
            .run(&source, &mut ScriptedActions::default())
            .await;

        assert_eq!(report.final_state(), SessionState::Closed);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Unmounting.to_string(), "unmounting");
        assert_eq!(SessionState::Failed.to_string(), "failed");
    }
}
