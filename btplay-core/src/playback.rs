//! Handoff of a selected media file to an external player.
//!
//! Candidates are tried strictly in priority order. A missing binary is
//! skipped without being run; a failing one is recorded and the next is
//! tried. The first candidate that exits cleanly wins. A quit requested
//! while a player runs lets that player finish and stops the fall-through.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::PlaybackConfig;
use crate::process::{CommandRunner, CommandSpec};

/// One external player binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCandidate {
    pub executable: PathBuf,
}

impl PlayerCandidate {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

/// Why a single candidate did not play the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// Binary does not exist; it was not run
    NotFound,
    /// Binary ran and exited non-zero
    ExitStatus {
        status: String,
        stdout: String,
        stderr: String,
    },
    /// Binary exists but could not be started
    Spawn { reason: String },
}

/// Record of one candidate that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerAttempt {
    pub player: PathBuf,
    pub failure: AttemptFailure,
}

impl fmt::Display for PlayerAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            AttemptFailure::NotFound => write!(f, "{}: not found", self.player.display()),
            AttemptFailure::ExitStatus { status, stderr, .. } => write!(
                f,
                "{}: failed with {} ({})",
                self.player.display(),
                status,
                stderr.trim()
            ),
            AttemptFailure::Spawn { reason } => {
                write!(f, "{}: could not start ({})", self.player.display(), reason)
            }
        }
    }
}

fn summarize(attempts: &[PlayerAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A completed playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackOutcome {
    /// Absolute path that was played
    pub file: PathBuf,
    pub file_size: u64,
    /// Candidate that played the file
    pub player: PathBuf,
    /// Candidates tried before the winner
    pub failed_attempts: Vec<PlayerAttempt>,
}

/// Errors from [`PlaybackDispatcher::play`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("{} is not a regular file", path.display())]
    NotAFile { path: PathBuf },

    #[error("No read permission for file {}: {reason}", path.display())]
    PermissionDenied { path: PathBuf, reason: String },

    #[error("No suitable media player found for {}: {}", file.display(), summarize(.attempts))]
    NoPlayerAvailable {
        file: PathBuf,
        attempts: Vec<PlayerAttempt>,
    },

    #[error("Playback of {} interrupted", file.display())]
    Interrupted {
        file: PathBuf,
        attempts: Vec<PlayerAttempt>,
    },
}

/// Tries configured players in order until one plays the file.
pub struct PlaybackDispatcher {
    candidates: Vec<PlayerCandidate>,
    runner: Arc<dyn CommandRunner>,
}

impl PlaybackDispatcher {
    pub fn new(candidates: Vec<PlayerCandidate>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { candidates, runner }
    }

    /// Creates a dispatcher for the players listed in `config`.
    pub fn from_config(config: &PlaybackConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let candidates = config
            .players
            .iter()
            .cloned()
            .map(PlayerCandidate::new)
            .collect();
        Self::new(candidates, runner)
    }

    pub fn candidates(&self) -> &[PlayerCandidate] {
        &self.candidates
    }

    /// Plays `file` with the first candidate that succeeds.
    ///
    /// Blocks until the winning player exits.
    ///
    /// # Errors
    /// - `PlaybackError::FileNotFound` - File does not exist
    /// - `PlaybackError::NotAFile` - Path is a directory or special file
    /// - `PlaybackError::PermissionDenied` - File cannot be opened for reading
    /// - `PlaybackError::NoPlayerAvailable` - Every candidate was absent or failed
    pub async fn play(&self, file: &Path) -> Result<PlaybackOutcome, PlaybackError> {
        self.play_until_cancelled(file, &CancellationToken::new())
            .await
    }

    /// Like [`play`](Self::play), but checks `cancel` before each candidate.
    ///
    /// A running player is never killed; once it exits, a cancelled token
    /// stops the search for another player.
    ///
    /// # Errors
    /// - `PlaybackError::Interrupted` - Cancelled before a player succeeded
    /// - Any error from [`play`](Self::play)
    pub async fn play_until_cancelled(
        &self,
        file: &Path,
        cancel: &CancellationToken,
    ) -> Result<PlaybackOutcome, PlaybackError> {
        let (resolved, file_size) = resolve_target(file).await?;
        tracing::info!(
            "Attempting to play {} ({} bytes)",
            resolved.display(),
            file_size
        );

        let mut attempts = Vec::new();

        for candidate in &self.candidates {
            if cancel.is_cancelled() {
                return Err(PlaybackError::Interrupted {
                    file: resolved,
                    attempts,
                });
            }

            let player = &candidate.executable;
            if !tokio::fs::try_exists(player).await.unwrap_or(false) {
                tracing::debug!("Player {} not found, skipping", player.display());
                attempts.push(PlayerAttempt {
                    player: player.clone(),
                    failure: AttemptFailure::NotFound,
                });
                continue;
            }

            let command = CommandSpec::new(player).arg(resolved.as_os_str());
            tracing::info!("Playing video with {}: {}", player.display(), command);

            let failure = match self.runner.run(&command).await {
                Ok(output) if output.success() => {
                    tracing::info!("Playback completed with {}", player.display());
                    return Ok(PlaybackOutcome {
                        file: resolved,
                        file_size,
                        player: player.clone(),
                        failed_attempts: attempts,
                    });
                }
                Ok(output) => AttemptFailure::ExitStatus {
                    status: output.status_text(),
                    stdout: output.stdout,
                    stderr: output.stderr,
                },
                Err(e) => AttemptFailure::Spawn {
                    reason: e.to_string(),
                },
            };

            let attempt = PlayerAttempt {
                player: player.clone(),
                failure,
            };
            tracing::warn!("{}", attempt);
            attempts.push(attempt);
        }

        Err(PlaybackError::NoPlayerAvailable {
            file: resolved,
            attempts,
        })
    }
}

impl fmt::Debug for PlaybackDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackDispatcher")
            .field("candidates", &self.candidates)
            .finish_non_exhaustive()
    }
}

/// Absolute path and size of a readable regular file.
async fn resolve_target(file: &Path) -> Result<(PathBuf, u64), PlaybackError> {
    let resolved = std::path::absolute(file).map_err(|_| PlaybackError::FileNotFound {
        path: file.to_path_buf(),
    })?;

    let metadata = match tokio::fs::metadata(&resolved).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PlaybackError::PermissionDenied {
                path: resolved,
                reason: e.to_string(),
            });
        }
        Err(_) => return Err(PlaybackError::FileNotFound { path: resolved }),
    };

    if !metadata.is_file() {
        return Err(PlaybackError::NotAFile { path: resolved });
    }

    if let Err(e) = tokio::fs::File::open(&resolved).await {
        return Err(PlaybackError::PermissionDenied {
            path: resolved,
            reason: e.to_string(),
        });
    }

    Ok((resolved, metadata.len()))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::test_fixtures::{FakeFuse, create_player_binaries};

    fn create_media_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, vec![7u8; 2048]).unwrap();
        path
    }

    fn dispatcher(players: Vec<PathBuf>, fuse: &Arc<FakeFuse>) -> PlaybackDispatcher {
        PlaybackDispatcher::new(
            players.into_iter().map(PlayerCandidate::new).collect(),
            fuse.clone(),
        )
    }

    #[tokio::test]
    async fn test_only_existing_candidate_is_run() {
        let temp_dir = TempDir::new().unwrap();
        let media = create_media_file(temp_dir.path(), "Movie.mkv");
        let existing = create_player_binaries(temp_dir.path(), &["mplayer"]);
        let bin = temp_dir.path().join("bin");
        let players = vec![bin.join("mpv"), existing[0].clone(), bin.join("vlc")];
        let fuse = Arc::new(FakeFuse::new());

        let outcome = dispatcher(players, &fuse).play(&media).await.unwrap();

        assert_eq!(outcome.player, existing[0]);
        assert_eq!(outcome.file_size, 2048);
        assert_eq!(outcome.failed_attempts.len(), 1);
        assert_eq!(outcome.failed_attempts[0].failure, AttemptFailure::NotFound);

        let runs = fuse.invocations();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].program, existing[0]);
        assert!(fuse.invocations_of("vlc").is_empty());
    }

    #[tokio::test]
    async fn test_failing_candidate_falls_through() {
        let temp_dir = TempDir::new().unwrap();
        let media = create_media_file(temp_dir.path(), "Movie.mkv");
        let players = create_player_binaries(temp_dir.path(), &["mpv", "mplayer", "vlc"]);
        let fuse = Arc::new(FakeFuse::new().with_player_exit("mpv", 2));

        let outcome = dispatcher(players.clone(), &fuse)
            .play(&media)
            .await
            .unwrap();

        assert_eq!(outcome.player, players[1]);
        assert!(matches!(
            outcome.failed_attempts[0].failure,
            AttemptFailure::ExitStatus { .. }
        ));
        assert!(fuse.invocations_of("vlc").is_empty());
    }

    #[tokio::test]
    async fn test_all_candidates_absent() {
        let temp_dir = TempDir::new().unwrap();
        let media = create_media_file(temp_dir.path(), "Movie.mkv");
        let bin = temp_dir.path().join("bin");
        let players = vec![bin.join("mpv"), bin.join("mplayer"), bin.join("vlc")];
        let fuse = Arc::new(FakeFuse::new());

        let error = dispatcher(players, &fuse).play(&media).await.unwrap_err();

        match &error {
            PlaybackError::NoPlayerAvailable { attempts, .. } => {
                assert_eq!(attempts.len(), 3);
                assert!(
                    attempts
                        .iter()
                        .all(|attempt| attempt.failure == AttemptFailure::NotFound)
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(error.to_string().matches("not found").count(), 3);
        assert!(fuse.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let fuse = Arc::new(FakeFuse::new());

        let error = dispatcher(vec![], &fuse)
            .play(&temp_dir.path().join("missing.mkv"))
            .await
            .unwrap_err();

        assert!(matches!(error, PlaybackError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_directory_is_not_playable() {
        let temp_dir = TempDir::new().unwrap();
        let fuse = Arc::new(FakeFuse::new());

        let error = dispatcher(vec![], &fuse)
            .play(temp_dir.path())
            .await
            .unwrap_err();

        assert!(matches!(error, PlaybackError::NotAFile { .. }));
    }

    /// Cancels the token whenever a player named `mpv` is run.
    struct QuitDuringMpv {
        fuse: Arc<FakeFuse>,
        cancel: CancellationToken,
    }

    #[async_trait::async_trait]
    impl CommandRunner for QuitDuringMpv {
        async fn run(
            &self,
            command: &CommandSpec,
        ) -> Result<crate::process::CommandOutput, crate::process::ProcessError> {
            if command.program_name() == "mpv" {
                self.cancel.cancel();
            }
            self.fuse.run(command).await
        }
    }

    #[tokio::test]
    async fn test_quit_while_playing_stops_fallthrough() {
        let temp_dir = TempDir::new().unwrap();
        let media = create_media_file(temp_dir.path(), "Movie.mkv");
        let players = create_player_binaries(temp_dir.path(), &["mpv", "mplayer"]);
        let fuse = Arc::new(FakeFuse::new().with_player_exit("mpv", 130));
        let cancel = CancellationToken::new();
        let runner = Arc::new(QuitDuringMpv {
            fuse: fuse.clone(),
            cancel: cancel.clone(),
        });
        let dispatcher = PlaybackDispatcher::new(
            players.into_iter().map(PlayerCandidate::new).collect(),
            runner,
        );

        let error = dispatcher
            .play_until_cancelled(&media, &cancel)
            .await
            .unwrap_err();

        match error {
            PlaybackError::Interrupted { attempts, .. } => {
                assert_eq!(attempts.len(), 1);
                assert!(matches!(
                    attempts[0].failure,
                    AttemptFailure::ExitStatus { .. }
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fuse.invocations_of("mpv").len(), 1);
        assert!(fuse.invocations_of("mplayer").is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_file() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let media = create_media_file(temp_dir.path(), "Movie.mkv");
        std::fs::set_permissions(&media, std::fs::Permissions::from_mode(0o000)).unwrap();
        if std::fs::File::open(&media).is_ok() {
            return;
        }
        let fuse = Arc::new(FakeFuse::new());

        let error = dispatcher(vec![], &fuse).play(&media).await.unwrap_err();

        assert!(matches!(error, PlaybackError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn test_path_with_spaces_is_single_argument() {
        let temp_dir = TempDir::new().unwrap();
        let media = create_media_file(temp_dir.path(), "My Movie (2024) & $HOME.mkv");
        let players = create_player_binaries(temp_dir.path(), &["mpv"]);
        let fuse = Arc::new(FakeFuse::new());

        dispatcher(players, &fuse).play(&media).await.unwrap();

        let runs = fuse.invocations();
        assert_eq!(runs[0].args.len(), 1);
        assert_eq!(Path::new(&runs[0].args[0]), media.as_path());
    }
}
