//! btplay core - mount a torrent, browse it, hand a file to a player
//!
//! A session mounts a `.torrent` as a read-only FUSE filesystem on a fresh
//! temporary directory, lets the user walk the tree below the mount point,
//! launches the first available external player on the chosen file, and
//! always unmounts and removes the mount point afterwards.
//!
//! The library also holds the torrents directory, magnet links and the
//! metadata downloader used by `btplay fetch`.

pub mod config;
pub mod library;
pub mod metadata;
pub mod mount;
pub mod navigator;
pub mod playback;
pub mod process;
pub mod session;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;
pub mod torrent;
pub mod tracing_setup;

pub use config::BtplayConfig;
pub use library::{LibraryError, TorrentLibrary};
pub use metadata::{MetadataDownloader, MetadataError};
pub use mount::{MountController, MountError, MountSession, ReleaseReport};
pub use navigator::{NavigationState, Navigator, PlayableFilter};
pub use playback::{PlaybackDispatcher, PlaybackError, PlaybackOutcome};
pub use process::{CommandRunner, ProcessError, SystemCommandRunner};
pub use session::{SessionCoordinator, SessionEnd, SessionReport, SessionState};
pub use torrent::{InfoHash, MagnetLink, TorrentError};

/// Errors that can reach the top level of any btplay command.
#[derive(Debug, thiserror::Error)]
pub enum BtplayError {
    #[error("Mount error: {0}")]
    Mount(#[from] MountError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Torrent error: {0}")]
    Torrent(#[from] TorrentError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BtplayError {
    /// Short message for the terminal, without the error chain.
    pub fn user_message(&self) -> String {
        match self {
            BtplayError::Mount(MountError::SourceNotFound { path }) => {
                format!("Torrent file not found: {}", path.display())
            }
            BtplayError::Mount(_) => "Could not mount the torrent".to_string(),
            BtplayError::Playback(PlaybackError::NoPlayerAvailable { .. }) => {
                "No media player could be started".to_string()
            }
            BtplayError::Playback(_) => "Could not play the selected file".to_string(),
            BtplayError::Library(LibraryError::TorrentNotFound { name, .. }) => {
                format!("No torrent named '{name}' in the library")
            }
            BtplayError::Library(_) => "Torrent library error occurred".to_string(),
            BtplayError::Metadata(_) => "Could not download torrent metadata".to_string(),
            BtplayError::Torrent(TorrentError::InvalidInfoHash { value, .. }) => {
                format!("Not a valid info hash: {value}")
            }
            BtplayError::Process(_) => "External command failed".to_string(),
            BtplayError::Configuration { reason } => format!("Configuration error: {reason}"),
            BtplayError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            BtplayError::Configuration { .. }
                | BtplayError::Torrent(_)
                | BtplayError::Library(LibraryError::TorrentNotFound { .. })
                | BtplayError::Mount(MountError::SourceNotFound { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, BtplayError>;
