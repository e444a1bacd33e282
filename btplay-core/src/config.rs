//! Centralized configuration for btplay.
//!
//! Every external program name, directory and URL lives here and is passed
//! into the component that needs it, so nothing reads process-wide globals.

use std::path::{Path, PathBuf};

/// Central configuration for all btplay components.
#[derive(Debug, Clone, Default)]
pub struct BtplayConfig {
    pub library: LibraryConfig,
    pub mount: MountConfig,
    pub playback: PlaybackConfig,
    pub search: SearchConfig,
    pub metadata: MetadataConfig,
}

/// Location of the torrents directory.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Directory holding `.torrent` files and saved search records
    pub torrents_dir: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            torrents_dir: home.join("torrents"),
        }
    }
}

/// External mount/unmount programs and mount point placement.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// FUSE helper invoked as `<program> <torrent> <mount point>`
    pub mount_program: PathBuf,
    /// Unmount helper invoked as `<program> <args...> <mount point>`
    pub unmount_program: PathBuf,
    pub unmount_args: Vec<String>,
    /// Prefix for generated mount point directories
    pub mount_point_prefix: String,
    /// Parent directory for mount points (None = system temp dir)
    pub temp_root: Option<PathBuf>,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            mount_program: PathBuf::from("btfs"),
            unmount_program: PathBuf::from("fusermount"),
            unmount_args: vec!["-u".to_string()],
            mount_point_prefix: "btplay-".to_string(),
            temp_root: None,
        }
    }
}

impl MountConfig {
    /// Directory under which mount points are created.
    pub fn mount_parent(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Media players and the playable extension set.
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Player executables in priority order
    pub players: Vec<PathBuf>,
    /// Lowercase file extensions treated as playable video
    pub playable_extensions: Vec<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            players: vec![
                PathBuf::from("/usr/bin/mpv"),
                PathBuf::from("/usr/bin/mplayer"),
                PathBuf::from("/usr/bin/vlc"),
            ],
            playable_extensions: ["mp4", "avi", "mkv"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

/// Torrent index search settings.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Base URL of a torrents-csv compatible index
    pub base_url: String,
    /// Results requested per page
    pub page_size: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://torrents-csv.com".to_string(),
            page_size: 10,
        }
    }
}

/// Metadata download settings.
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    /// Downloader program (aria2c compatible command line)
    pub downloader_program: PathBuf,
    /// Plain-text tracker list, one announce URL per line
    pub trackers_url: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            downloader_program: PathBuf::from("aria2c"),
            trackers_url:
                "https://raw.githubusercontent.com/ngosang/trackerslist/master/trackers_all.txt"
                    .to_string(),
        }
    }
}

impl BtplayConfig {
    /// Creates configuration with environment variable overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(dir) = std::env::var_os("BTPLAY_TORRENTS_DIR") {
            config.library.torrents_dir = PathBuf::from(dir);
        }

        if let Some(program) = std::env::var_os("BTPLAY_MOUNT_PROGRAM") {
            config.mount.mount_program = PathBuf::from(program);
        }

        if let Some(program) = std::env::var_os("BTPLAY_UNMOUNT_PROGRAM") {
            config.mount.unmount_program = PathBuf::from(program);
        }

        if let Some(root) = std::env::var_os("BTPLAY_TEMP_ROOT") {
            config.mount.temp_root = Some(PathBuf::from(root));
        }

        if let Ok(players) = std::env::var("BTPLAY_PLAYERS") {
            let parsed: Vec<PathBuf> = players
                .split(':')
                .filter(|player| !player.trim().is_empty())
                .map(PathBuf::from)
                .collect();
            if !parsed.is_empty() {
                config.playback.players = parsed;
            }
        }

        if let Ok(url) = std::env::var("BTPLAY_SEARCH_URL") {
            config.search.base_url = url;
        }

        config
    }

    /// Creates a configuration rooted in a scratch directory for tests.
    ///
    /// Torrents live in `<root>/torrents` and mount points in `<root>/mnt`.
    pub fn for_testing(root: &Path) -> Self {
        let mut config = Self::default();
        config.library.torrents_dir = root.join("torrents");
        config.mount.temp_root = Some(root.join("mnt"));
        config
    }
}
