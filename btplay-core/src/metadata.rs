//! Fetching `.torrent` metadata for a search result.
//!
//! Builds a magnet link with a public tracker list, asks an aria2c
//! compatible downloader to save only the metadata into the library, then
//! renames the file from `<infohash>.torrent` to `<name>.torrent`.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::MetadataConfig;
use crate::library::{LibraryError, TorrentLibrary};
use crate::process::{CommandRunner, CommandSpec, ProcessError};
use crate::torrent::{InfoHash, MagnetLink};

/// Errors from metadata download.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Failed to fetch trackers from {url}: {reason}")]
    TrackerFetch { url: String, reason: String },

    #[error("Tracker list is empty")]
    NoTrackers,

    #[error("Downloader could not be started: {0}")]
    Spawn(#[from] ProcessError),

    #[error("Error while running downloader: {status} ({stderr})")]
    DownloadFailed { status: String, stderr: String },

    #[error("Downloader finished but {} was not written", path.display())]
    MissingOutput { path: PathBuf },

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),
}

/// Source of BitTorrent tracker announce URLs.
#[async_trait]
pub trait TrackerSource: Send + Sync {
    /// Returns announce URLs, blank lines removed.
    ///
    /// # Errors
    /// - `MetadataError::TrackerFetch` - List could not be retrieved
    async fn fetch_trackers(&self) -> Result<Vec<String>, MetadataError>;
}

/// Tracker list served as plain text over HTTP, one URL per line.
#[derive(Debug, Clone)]
pub struct HttpTrackerList {
    client: reqwest::Client,
    url: String,
}

impl HttpTrackerList {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl TrackerSource for HttpTrackerList {
    async fn fetch_trackers(&self) -> Result<Vec<String>, MetadataError> {
        let fetch_error = |e: reqwest::Error| MetadataError::TrackerFetch {
            url: self.url.clone(),
            reason: e.to_string(),
        };

        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(fetch_error)?
            .text()
            .await
            .map_err(fetch_error)?;

        let trackers = parse_tracker_list(&body);
        tracing::debug!("Fetched {} trackers from {}", trackers.len(), self.url);
        Ok(trackers)
    }
}

/// Splits a tracker list into trimmed, non-empty lines.
pub fn parse_tracker_list(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Downloads torrent metadata into the library.
pub struct MetadataDownloader {
    config: MetadataConfig,
    library: TorrentLibrary,
    runner: Arc<dyn CommandRunner>,
    trackers: Arc<dyn TrackerSource>,
}

impl MetadataDownloader {
    pub fn new(
        config: MetadataConfig,
        library: TorrentLibrary,
        runner: Arc<dyn CommandRunner>,
        trackers: Arc<dyn TrackerSource>,
    ) -> Self {
        Self {
            config,
            library,
            runner,
            trackers,
        }
    }

    /// Command line for a metadata-only download of `magnet`.
    pub fn download_command(&self, info_hash: InfoHash, magnet: &MagnetLink) -> CommandSpec {
        CommandSpec::new(&self.config.downloader_program)
            .arg("--bt-metadata-only=true")
            .arg("--bt-save-metadata=true")
            .arg(format!("--dir={}", self.library.dir().display()))
            .arg(format!("--out={info_hash}.torrent"))
            .arg(magnet.to_uri())
    }

    /// Downloads metadata for `info_hash` and stores it as `<name>.torrent`.
    ///
    /// # Errors
    /// - `MetadataError::TrackerFetch` / `MetadataError::NoTrackers` - No trackers
    /// - `MetadataError::Spawn` - Downloader missing
    /// - `MetadataError::DownloadFailed` - Downloader exited non-zero
    /// - `MetadataError::MissingOutput` - Downloader wrote nothing
    /// - `MetadataError::Library` - Rename failed
    pub async fn download(&self, info_hash: InfoHash, name: &str) -> Result<PathBuf, MetadataError> {
        let trackers = self.trackers.fetch_trackers().await?;
        if trackers.is_empty() {
            return Err(MetadataError::NoTrackers);
        }

        let magnet = MagnetLink::new(info_hash)
            .with_display_name(name)
            .with_trackers(trackers);
        let command = self.download_command(info_hash, &magnet);

        tracing::info!("Downloading metadata for {}", name);
        let output = self.runner.run(&command).await?;
        if !output.success() {
            return Err(MetadataError::DownloadFailed {
                status: output.status_text(),
                stderr: output.stderr.trim().to_string(),
            });
        }

        let temporary = info_hash.to_string();
        match self.library.rename_torrent(&temporary, name).await? {
            Some(path) => {
                tracing::info!("Download complete: {}", path.display());
                Ok(path)
            }
            None => Err(MetadataError::MissingOutput {
                path: self.library.torrent_path(&temporary),
            }),
        }
    }
}

impl fmt::Debug for MetadataDownloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataDownloader")
            .field("config", &self.config)
            .field("library", &self.library)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use tempfile::TempDir;

    use super::*;
    use crate::process::CommandOutput;

    const HASH: &str = "08ada5a7a6183aae1e09d831df6748d566095a10";

    struct StaticTrackers(Vec<String>);

    #[async_trait]
    impl TrackerSource for StaticTrackers {
        async fn fetch_trackers(&self) -> Result<Vec<String>, MetadataError> {
            Ok(self.0.clone())
        }
    }

    /// Writes the file named by `--dir`/`--out`, like aria2c would.
    #[derive(Default)]
    struct Aria2Stub {
        exit: i32,
        write_output: bool,
        commands: Mutex<Vec<CommandSpec>>,
    }

    #[async_trait]
    impl CommandRunner for Aria2Stub {
        async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, ProcessError> {
            self.commands.lock().push(command.clone());
            if self.exit != 0 {
                return Ok(CommandOutput::failed(self.exit, "metadata timeout"));
            }
            if self.write_output {
                let arg = |prefix: &str| {
                    command
                        .args
                        .iter()
                        .find_map(|a| a.to_str()?.strip_prefix(prefix).map(str::to_string))
                        .unwrap()
                };
                let path = PathBuf::from(arg("--dir=")).join(arg("--out="));
                std::fs::write(path, b"d4:infode").unwrap();
            }
            Ok(CommandOutput::succeeded())
        }
    }

    async fn downloader(
        temp_dir: &TempDir,
        runner: Arc<Aria2Stub>,
        trackers: Vec<&str>,
    ) -> MetadataDownloader {
        let library = TorrentLibrary::open(temp_dir.path()).await.unwrap();
        MetadataDownloader::new(
            MetadataConfig::default(),
            library,
            runner,
            Arc::new(StaticTrackers(
                trackers.into_iter().map(str::to_string).collect(),
            )),
        )
    }

    #[test]
    fn test_parse_tracker_list() {
        let body = "udp://a:1/announce\n\n  http://b/announce  \r\n\n";

        assert_eq!(
            parse_tracker_list(body),
            vec!["udp://a:1/announce", "http://b/announce"]
        );
    }

    #[tokio::test]
    async fn test_download_renames_to_torrent_name() {
        let temp_dir = TempDir::new().unwrap();
        let runner = Arc::new(Aria2Stub {
            write_output: true,
            ..Default::default()
        });
        let downloader = downloader(&temp_dir, runner.clone(), vec!["udp://a:1/announce"]).await;

        let path = downloader
            .download(HASH.parse().unwrap(), "Sintel")
            .await
            .unwrap();

        assert_eq!(path, temp_dir.path().join("Sintel.torrent"));
        assert!(path.exists());

        let commands = runner.commands.lock();
        let command = &commands[0];
        assert_eq!(command.program_name(), "aria2c");
        assert_eq!(command.args[0], "--bt-metadata-only=true");
        assert_eq!(command.args[3], format!("--out={HASH}.torrent").as_str());
        let magnet = command.args[4].to_str().unwrap();
        assert!(magnet.starts_with(&format!("magnet:?xt=urn:btih:{HASH}&dn=Sintel&tr=")));
    }

    #[tokio::test]
    async fn test_download_requires_trackers() {
        let temp_dir = TempDir::new().unwrap();
        let runner = Arc::new(Aria2Stub::default());
        let downloader = downloader(&temp_dir, runner.clone(), vec![]).await;

        let result = downloader.download(HASH.parse().unwrap(), "Sintel").await;

        assert!(matches!(result, Err(MetadataError::NoTrackers)));
        assert!(runner.commands.lock().is_empty());
    }

    #[tokio::test]
    async fn test_download_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let runner = Arc::new(Aria2Stub {
            exit: 7,
            ..Default::default()
        });
        let downloader = downloader(&temp_dir, runner, vec!["udp://a:1/announce"]).await;

        let result = downloader.download(HASH.parse().unwrap(), "Sintel").await;

        match result {
            Err(MetadataError::DownloadFailed { status, stderr }) => {
                assert_eq!(status, "exit code 7");
                assert_eq!(stderr, "metadata timeout");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_output_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let runner = Arc::new(Aria2Stub::default());
        let downloader = downloader(&temp_dir, runner, vec!["udp://a:1/announce"]).await;

        let result = downloader.download(HASH.parse().unwrap(), "Sintel").await;

        assert!(matches!(result, Err(MetadataError::MissingOutput { .. })));
    }
}
