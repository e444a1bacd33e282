//! CLI command implementations

use std::sync::Arc;

use anyhow::Context;
use btplay_core::config::BtplayConfig;
use btplay_core::library::TorrentLibrary;
use btplay_core::metadata::{HttpTrackerList, MetadataDownloader};
use btplay_core::process::SystemCommandRunner;
use btplay_core::session::{SessionCoordinator, SessionEnd};
use btplay_core::torrent::InfoHash;
use btplay_core::{BtplayError, MagnetLink};
use btplay_search::{SearchPager, TorrentListing, TorrentsCsvProvider};
use clap::Subcommand;

use crate::terminal::{BROWSE_HELP, Prompt, TerminalActions, cancel_on_interrupt};

const SEARCH_HELP: &str =
    "n: next page | p: previous page | s <n>: save record | d <n>: download .torrent | q: quit";

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List .torrent files in the torrents directory
    List,
    /// Mount a torrent, browse it and play a file
    Play {
        /// Torrent name in the library, or a path to a .torrent file
        torrent: String,
    },
    /// Search the torrent index interactively
    Search {
        /// Search terms
        query: String,
        /// Results per page
        #[arg(short, long)]
        size: Option<u32>,
    },
    /// Download .torrent metadata for an info hash
    Fetch {
        /// 40 character hex info hash
        infohash: String,
        /// Name to save the torrent under
        name: String,
    },
    /// Print the magnet link for an info hash
    Magnet {
        /// 40 character hex info hash
        infohash: String,
        /// Display name
        #[arg(short, long)]
        name: Option<String>,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands, config: BtplayConfig) -> anyhow::Result<()> {
    match command {
        Commands::List => list_torrents(&config).await,
        Commands::Play { torrent } => play_torrent(&config, &torrent).await,
        Commands::Search { query, size } => search(&config, &query, size).await,
        Commands::Fetch { infohash, name } => fetch(&config, &infohash, &name).await,
        Commands::Magnet { infohash, name } => {
            let mut magnet = MagnetLink::new(parse_info_hash(&infohash)?);
            if let Some(name) = name {
                magnet = magnet.with_display_name(name);
            }
            println!("{magnet}");
            Ok(())
        }
    }
}

/// List all torrents in the library
///
/// # Errors
/// - Torrents directory cannot be created or read
pub async fn list_torrents(config: &BtplayConfig) -> anyhow::Result<()> {
    let library = open_library(config).await?;
    let torrents = library.torrents().await.map_err(BtplayError::from)?;

    println!("Torrents in {}", library.dir().display());
    println!("{:-<60}", "");

    if torrents.is_empty() {
        println!("No torrents yet.");
        println!("Use 'btplay search <query>' to find one.");
    }
    for (index, torrent) in torrents.iter().enumerate() {
        println!("{:>3}. {}", index + 1, torrent.name);
    }

    Ok(())
}

/// Run an interactive mount session
///
/// # Errors
/// - Torrent not found in the library
/// - Session ended in the failed state
pub async fn play_torrent(config: &BtplayConfig, torrent: &str) -> anyhow::Result<()> {
    let library = open_library(config).await?;
    let source = library
        .resolve(torrent)
        .map_err(|e| anyhow::anyhow!(BtplayError::from(e).user_message()))?;

    let mut coordinator = SessionCoordinator::with_system(config);
    let mut actions = TerminalActions::new(coordinator.subscribe());

    let interrupts = cancel_on_interrupt(coordinator.cancellation_token());

    println!("{BROWSE_HELP}");
    let report = coordinator.run(&source, &mut actions).await;
    interrupts.abort();
    actions.flush_events();

    tracing::info!("Session finished: {:?}", report.history);

    match report.end {
        SessionEnd::Played(outcome) => {
            println!(
                "Played {} with {}",
                outcome.file.display(),
                outcome.player.display()
            );
            Ok(())
        }
        SessionEnd::Cancelled => Ok(()),
        SessionEnd::NoContent => {
            println!("Nothing playable in {}", source.display());
            Ok(())
        }
        SessionEnd::Failed(error) => Err(error).context("Session failed"),
    }
}

/// Browse search results page by page
///
/// # Errors
/// - First page could not be fetched
pub async fn search(config: &BtplayConfig, query: &str, size: Option<u32>) -> anyhow::Result<()> {
    let library = open_library(config).await?;
    let provider = Arc::new(TorrentsCsvProvider::with_base_url(&config.search.base_url));
    let size = size.unwrap_or(config.search.page_size);

    let mut pager = SearchPager::start(provider, query, size)
        .await
        .with_context(|| format!("Search for '{query}' failed"))?;
    let mut prompt = Prompt::new();

    loop {
        print_page(&pager);
        let Some(line) = prompt.read("> ").await else {
            return Ok(());
        };
        let (command, argument) = line.split_once(' ').unwrap_or((line.as_str(), ""));

        let result = match command {
            "q" => return Ok(()),
            "n" => pager.next_page().await.map(|moved| {
                if !moved {
                    println!("Already on the last page");
                }
            }),
            "p" => pager.previous_page().await.map(|moved| {
                if !moved {
                    println!("Already on the first page");
                }
            }),
            "s" | "d" => {
                match pick(pager.current().torrents.as_slice(), argument) {
                    Some(listing) if command == "s" => save(&library, listing).await,
                    Some(listing) => download(config, &library, listing).await,
                    None => println!("No result numbered '{argument}'"),
                }
                Ok(())
            }
            _ => {
                println!("{SEARCH_HELP}");
                Ok(())
            }
        };

        if let Err(e) = result {
            println!("Error: {e}");
        }
    }
}

/// Download metadata for one info hash
///
/// # Errors
/// - Info hash is not valid hex
/// - Trackers, downloader or rename failed
pub async fn fetch(config: &BtplayConfig, infohash: &str, name: &str) -> anyhow::Result<()> {
    let info_hash = parse_info_hash(infohash)?;
    let library = open_library(config).await?;

    let path = downloader(config, library)
        .download(info_hash, name)
        .await
        .map_err(BtplayError::from)?;

    println!("Download complete: {}", path.display());
    Ok(())
}

fn print_page(pager: &SearchPager) {
    println!("\nPage {} for '{}'", pager.page_number(), pager.query());
    let torrents = &pager.current().torrents;
    if torrents.is_empty() {
        println!("  (no results)");
    }
    for (index, listing) in torrents.iter().enumerate() {
        let seeders = listing
            .seeders()
            .map(|s| format!("{s} seeders"))
            .unwrap_or_default();
        println!(
            "{:>3}. {} [{}] {}",
            index + 1,
            listing.name,
            listing.format_size(),
            seeders
        );
    }
    println!("{SEARCH_HELP}");
}

fn pick<'a>(torrents: &'a [TorrentListing], argument: &str) -> Option<&'a TorrentListing> {
    let index = argument.trim().parse::<usize>().ok()?.checked_sub(1)?;
    torrents.get(index)
}

async fn save(library: &TorrentLibrary, listing: &TorrentListing) {
    match library.save_record(&listing.name, listing).await {
        Ok(path) => println!("Saved torrent info to {}", path.display()),
        Err(e) => println!("Error: {e}"),
    }
}

async fn download(config: &BtplayConfig, library: &TorrentLibrary, listing: &TorrentListing) {
    println!("Downloading metadata for {}...", listing.name);
    match downloader(config, library.clone())
        .download(listing.infohash, &listing.name)
        .await
    {
        Ok(path) => println!("Download complete: {}", path.display()),
        Err(e) => println!("Error: {e}"),
    }
}

fn downloader(config: &BtplayConfig, library: TorrentLibrary) -> MetadataDownloader {
    MetadataDownloader::new(
        config.metadata.clone(),
        library,
        Arc::new(SystemCommandRunner::new()),
        Arc::new(HttpTrackerList::new(config.metadata.trackers_url.clone())),
    )
}

async fn open_library(config: &BtplayConfig) -> anyhow::Result<TorrentLibrary> {
    let library = TorrentLibrary::open(&config.library.torrents_dir)
        .await
        .map_err(BtplayError::from)?;
    Ok(library)
}

fn parse_info_hash(value: &str) -> anyhow::Result<InfoHash> {
    value
        .parse::<InfoHash>()
        .map_err(|e| anyhow::anyhow!(BtplayError::from(e).user_message()))
}
