//! Directory navigation inside a mounted torrent.
//!
//! Listings never fail: an unreadable directory produces an empty listing
//! annotated with a [`ListingError`], so the user can always back out.
//! Navigation is confined to the mount root, including through symlinks: a
//! link resolving outside the root is listed as [`EntryKind::Other`] and
//! never entered.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// What a directory entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    /// Dangling links, links leaving the mount root, sockets and anything
    /// that could not be inspected
    Other,
}

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: PathBuf,
    pub name: String,
    pub kind: EntryKind,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Failure to read one directory. Never propagated past the navigator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Error listing directory {}: {reason}", dir.display())]
pub struct ListingError {
    pub dir: PathBuf,
    pub kind: std::io::ErrorKind,
    pub reason: String,
}

impl ListingError {
    fn from_io(dir: &Path, error: &std::io::Error) -> Self {
        Self {
            dir: dir.to_path_buf(),
            kind: error.kind(),
            reason: error.to_string(),
        }
    }
}

/// Children of a directory sorted by name, or an empty annotated listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub entries: Vec<Entry>,
    pub error: Option<ListingError>,
}

/// Lists the children of `dir`, sorted by name.
///
/// Errors are absorbed into [`Listing::error`] with no entries.
pub async fn list(dir: &Path) -> Listing {
    match read_entries(dir).await {
        Ok(mut entries) => {
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Listing {
                entries,
                error: None,
            }
        }
        Err(e) => {
            let error = ListingError::from_io(dir, &e);
            tracing::warn!("{}", error);
            Listing {
                entries: Vec::new(),
                error: Some(error),
            }
        }
    }
}

async fn read_entries(dir: &Path) -> std::io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;

    while let Some(dir_entry) = read_dir.next_entry().await? {
        let path = dir_entry.path();
        // Follow symlinks so linked directories stay enterable.
        let kind = match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_dir() => EntryKind::Directory,
            Ok(metadata) if metadata.is_file() => EntryKind::File,
            _ => EntryKind::Other,
        };
        entries.push(Entry {
            name: dir_entry.file_name().to_string_lossy().into_owned(),
            path,
            kind,
        });
    }

    Ok(entries)
}

/// Recognizes playable video files by extension.
#[derive(Debug, Clone)]
pub struct PlayableFilter {
    extensions: HashSet<String>,
}

impl PlayableFilter {
    /// Creates a filter for the given extensions (with or without a dot).
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// True iff the extension of `path` matches the set, ignoring case.
    pub fn is_playable(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.contains(&ext))
    }

    /// Keeps directories and playable files; directories come first.
    pub fn filter(&self, entries: &[Entry]) -> Vec<Entry> {
        let directories = entries.iter().filter(|entry| entry.is_dir());
        let media = entries
            .iter()
            .filter(|entry| entry.kind == EntryKind::File && self.is_playable(&entry.path));
        directories.chain(media).cloned().collect()
    }
}

/// Where the user is and what they can pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationState {
    root: PathBuf,
    current_dir: PathBuf,
    entries: Vec<Entry>,
    selected_index: usize,
    listing_error: Option<ListingError>,
}

impl NavigationState {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    /// Visible entries: directories, then playable files.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn selected_index(&self) -> usize {
        self.selected_index
    }

    pub fn listing_error(&self) -> Option<&ListingError> {
        self.listing_error.as_ref()
    }

    /// Entry under the cursor, if any.
    pub fn selected(&self) -> Option<&Entry> {
        self.entries.get(self.selected_index)
    }

    pub fn has_content(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn is_at_root(&self) -> bool {
        self.current_dir == self.root
    }

    /// Current directory relative to the mount root.
    pub fn relative_dir(&self) -> &Path {
        self.current_dir
            .strip_prefix(&self.root)
            .unwrap_or(&self.current_dir)
    }

    /// Moves the cursor by `delta`, wrapping around both ends.
    pub fn move_selection(&mut self, delta: isize) {
        if self.entries.is_empty() {
            return;
        }
        let len = self.entries.len() as isize;
        self.selected_index = (self.selected_index as isize + delta).rem_euclid(len) as usize;
    }

    /// Puts the cursor on `index`. Returns false if out of range.
    pub fn select(&mut self, index: usize) -> bool {
        if index < self.entries.len() {
            self.selected_index = index;
            true
        } else {
            false
        }
    }
}

/// Result of entering an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnterOutcome {
    /// Moved into a directory
    Navigated(NavigationState),
    /// A file was chosen; navigation is over
    Selected(PathBuf),
}

/// Navigation requests that cannot be honored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    #[error("{} is outside the mount root", path.display())]
    OutsideRoot { path: PathBuf },

    #[error("No playable files or directories found in {}", dir.display())]
    NoContent { dir: PathBuf },

    #[error("{} cannot be opened", path.display())]
    NotEnterable { path: PathBuf },
}

/// Stateless navigation operations over one mount root.
#[derive(Debug, Clone)]
pub struct Navigator {
    root: PathBuf,
    filter: PlayableFilter,
}

impl Navigator {
    pub fn new(root: impl Into<PathBuf>, filter: PlayableFilter) -> Self {
        Self {
            root: root.into(),
            filter,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists the mount root.
    pub async fn open_root(&self) -> NavigationState {
        self.load(&self.root).await
    }

    /// Enters `target`: directories are navigated into, files are selected.
    ///
    /// # Errors
    /// - `NavigationError::OutsideRoot` - Target escapes the mount root
    /// - `NavigationError::NotEnterable` - Target is neither file nor directory
    pub async fn enter(
        &self,
        _state: &NavigationState,
        target: &Entry,
    ) -> Result<EnterOutcome, NavigationError> {
        if !self.contains(&target.path).await {
            return Err(NavigationError::OutsideRoot {
                path: target.path.clone(),
            });
        }

        match target.kind {
            EntryKind::Directory => Ok(EnterOutcome::Navigated(self.load(&target.path).await)),
            EntryKind::File => Ok(EnterOutcome::Selected(target.path.clone())),
            EntryKind::Other => Err(NavigationError::NotEnterable {
                path: target.path.clone(),
            }),
        }
    }

    /// Enters the entry under the cursor.
    ///
    /// # Errors
    /// - `NavigationError::NoContent` - Nothing to select
    /// - Any error from [`Navigator::enter`]
    pub async fn enter_selected(
        &self,
        state: &NavigationState,
    ) -> Result<EnterOutcome, NavigationError> {
        let target = state
            .selected()
            .ok_or_else(|| NavigationError::NoContent {
                dir: state.current_dir.clone(),
            })?;
        self.enter(state, target).await
    }

    /// Goes to the parent directory. At the mount root this is a no-op.
    pub async fn up(&self, state: &NavigationState) -> NavigationState {
        if state.current_dir == self.root {
            return state.clone();
        }
        match state.current_dir.parent() {
            Some(parent) if self.contains(parent).await => self.load(parent).await,
            _ => state.clone(),
        }
    }

    /// Signals an empty visible listing.
    ///
    /// # Errors
    /// - `NavigationError::NoContent` - No directories or playable files
    pub fn check_content(&self, state: &NavigationState) -> Result<(), NavigationError> {
        if state.has_content() {
            Ok(())
        } else {
            Err(NavigationError::NoContent {
                dir: state.current_dir.clone(),
            })
        }
    }

    /// Lexically under the root, and still under it once links are resolved.
    ///
    /// Paths that cannot be resolved (vanished entries) fall back to the
    /// lexical check; they cannot lead anywhere.
    async fn contains(&self, path: &Path) -> bool {
        let lexical = path.starts_with(&self.root)
            && !path
                .components()
                .any(|component| matches!(component, Component::ParentDir));
        if !lexical {
            return false;
        }

        match (
            tokio::fs::canonicalize(&self.root).await,
            tokio::fs::canonicalize(path).await,
        ) {
            (Ok(root), Ok(resolved)) => resolved.starts_with(root),
            _ => true,
        }
    }

    /// Demotes symlinks that resolve outside the root to [`EntryKind::Other`].
    async fn confine(&self, mut entries: Vec<Entry>) -> Vec<Entry> {
        for entry in &mut entries {
            let is_link = tokio::fs::symlink_metadata(&entry.path)
                .await
                .is_ok_and(|metadata| metadata.file_type().is_symlink());
            if is_link && entry.kind != EntryKind::Other && !self.contains(&entry.path).await {
                tracing::warn!(
                    "Ignoring {}: link leads outside {}",
                    entry.path.display(),
                    self.root.display()
                );
                entry.kind = EntryKind::Other;
            }
        }
        entries
    }

    async fn load(&self, dir: &Path) -> NavigationState {
        let mut listing = list(dir).await;
        listing.entries = self.confine(listing.entries).await;
        tracing::debug!(
            "Listed {}: {} entries",
            dir.display(),
            listing.entries.len()
        );
        NavigationState {
            root: self.root.clone(),
            current_dir: dir.to_path_buf(),
            entries: self.filter.filter(&listing.entries),
            selected_index: 0,
            listing_error: listing.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tempfile::TempDir;

    use super::*;

    fn default_filter() -> PlayableFilter {
        PlayableFilter::new(["mp4", "avi", "mkv"])
    }

    fn create_test_tree() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("Season 2")).unwrap();
        std::fs::create_dir_all(root.join("Season 1")).unwrap();
        std::fs::create_dir_all(root.join("Extras")).unwrap();
        std::fs::write(root.join("Season 1/E01.mkv"), b"x").unwrap();
        std::fs::write(root.join("Season 1/E02.MP4"), b"x").unwrap();
        std::fs::write(root.join("Season 2/E01.avi"), b"x").unwrap();
        std::fs::write(root.join("Movie.MKV"), b"x").unwrap();
        std::fs::write(root.join("Movie.mkvx"), b"x").unwrap();
        std::fs::write(root.join("readme.txt"), b"x").unwrap();
        temp_dir
    }

    fn names(state: &NavigationState) -> Vec<&str> {
        state.entries().iter().map(|e| e.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let temp_dir = create_test_tree();

        let listing = list(temp_dir.path()).await;

        assert!(listing.error.is_none());
        let listed: Vec<&str> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            listed,
            vec![
                "Extras",
                "Movie.MKV",
                "Movie.mkvx",
                "Season 1",
                "Season 2",
                "readme.txt"
            ]
        );
    }

    #[tokio::test]
    async fn test_list_missing_directory_is_annotated() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("gone");

        let listing = list(&missing).await;

        assert!(listing.entries.is_empty());
        let error = listing.error.unwrap();
        assert_eq!(error.dir, missing);
        assert_eq!(error.kind, std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_filter_is_case_insensitive_and_exact() {
        let filter = default_filter();

        assert!(filter.is_playable(Path::new("Movie.MKV")));
        assert!(filter.is_playable(Path::new("clip.Mp4")));
        assert!(!filter.is_playable(Path::new("Movie.mkvx")));
        assert!(!filter.is_playable(Path::new("mkv")));
        assert!(!filter.is_playable(Path::new("notes.txt")));
        assert!(PlayableFilter::new([".MKV"]).is_playable(Path::new("a.mkv")));
    }

    #[tokio::test]
    async fn test_open_root_shows_directories_then_media() {
        let temp_dir = create_test_tree();
        let navigator = Navigator::new(temp_dir.path(), default_filter());

        let state = navigator.open_root().await;

        assert!(state.is_at_root());
        assert_eq!(state.selected_index(), 0);
        assert_eq!(
            names(&state),
            vec!["Extras", "Season 1", "Season 2", "Movie.MKV"]
        );
    }

    #[tokio::test]
    async fn test_enter_directory_and_file() {
        let temp_dir = create_test_tree();
        let navigator = Navigator::new(temp_dir.path(), default_filter());
        let root = navigator.open_root().await;

        let season = root.entries()[1].clone();
        let EnterOutcome::Navigated(mut inside) = navigator.enter(&root, &season).await.unwrap()
        else {
            panic!("expected navigation");
        };
        assert_eq!(inside.current_dir(), temp_dir.path().join("Season 1"));
        assert_eq!(inside.relative_dir(), Path::new("Season 1"));
        assert_eq!(names(&inside), vec!["E01.mkv", "E02.MP4"]);

        inside.move_selection(1);
        let outcome = navigator.enter_selected(&inside).await.unwrap();
        assert_eq!(
            outcome,
            EnterOutcome::Selected(temp_dir.path().join("Season 1/E02.MP4"))
        );
    }

    #[tokio::test]
    async fn test_up_from_root_is_noop() {
        let temp_dir = create_test_tree();
        let navigator = Navigator::new(temp_dir.path(), default_filter());
        let root = navigator.open_root().await;

        let after = navigator.up(&root).await;

        assert_eq!(after.current_dir(), root.current_dir());
        assert_eq!(after, root);
    }

    #[tokio::test]
    async fn test_up_returns_to_parent() {
        let temp_dir = create_test_tree();
        let navigator = Navigator::new(temp_dir.path(), default_filter());
        let root = navigator.open_root().await;
        let EnterOutcome::Navigated(season) = navigator
            .enter(&root, &root.entries()[2].clone())
            .await
            .unwrap()
        else {
            panic!("expected navigation");
        };

        let back = navigator.up(&season).await;

        assert!(back.is_at_root());
        assert_eq!(back.selected_index(), 0);
    }

    #[tokio::test]
    async fn test_enter_outside_root_is_rejected() {
        let temp_dir = create_test_tree();
        let navigator = Navigator::new(temp_dir.path().join("Season 1"), default_filter());
        let state = navigator.open_root().await;
        let escape = Entry {
            path: temp_dir.path().join("Season 1/../Season 2"),
            name: "..".to_string(),
            kind: EntryKind::Directory,
        };

        let result = navigator.enter(&state, &escape).await;

        assert!(matches!(result, Err(NavigationError::OutsideRoot { .. })));
    }

    #[tokio::test]
    async fn test_vanished_directory_listing_is_recoverable() {
        let temp_dir = create_test_tree();
        let navigator = Navigator::new(temp_dir.path(), default_filter());
        let root = navigator.open_root().await;
        let extras = root.entries()[0].clone();
        std::fs::remove_dir(&extras.path).unwrap();

        let EnterOutcome::Navigated(broken) = navigator.enter(&root, &extras).await.unwrap() else {
            panic!("expected navigation");
        };
        assert!(!broken.has_content());
        assert!(broken.listing_error().is_some());
        assert!(navigator.check_content(&broken).is_err());

        let back = navigator.up(&broken).await;
        assert!(back.is_at_root());
        assert!(back.listing_error().is_none());

        let sibling = back
            .entries()
            .iter()
            .find(|e| e.name == "Season 2")
            .unwrap()
            .clone();
        let EnterOutcome::Navigated(sibling_state) =
            navigator.enter(&back, &sibling).await.unwrap()
        else {
            panic!("expected navigation");
        };
        assert!(sibling_state.listing_error().is_none());
        assert_eq!(names(&sibling_state), vec!["E01.avi"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_directory_listing_is_annotated() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = create_test_tree();
        let locked = temp_dir.path().join("Season 1");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users read through permission bits; nothing to check then.
        if std::fs::read_dir(&locked).is_ok() {
            std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let navigator = Navigator::new(temp_dir.path(), default_filter());
        let root = navigator.open_root().await;
        let target = root.entries()[1].clone();
        let EnterOutcome::Navigated(state) = navigator.enter(&root, &target).await.unwrap() else {
            panic!("expected navigation");
        };

        let error = state.listing_error().unwrap();
        assert_eq!(error.kind, std::io::ErrorKind::PermissionDenied);
        assert!(state.entries().is_empty());

        let back = navigator.up(&state).await;
        assert!(back.is_at_root());
        assert_eq!(back.entries().len(), 4);

        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_links_leaving_the_root_are_hidden() {
        let temp_dir = create_test_tree();
        let outside = TempDir::new().unwrap();
        std::fs::create_dir(outside.path().join("Secret")).unwrap();
        std::fs::write(outside.path().join("secret.mkv"), b"x").unwrap();
        let root = temp_dir.path();
        std::os::unix::fs::symlink(outside.path(), root.join("Away")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.mkv"), root.join("away.mkv"))
            .unwrap();
        std::os::unix::fs::symlink(root.join("Season 1"), root.join("Alias")).unwrap();
        let navigator = Navigator::new(root, default_filter());

        let state = navigator.open_root().await;

        assert_eq!(
            names(&state),
            vec!["Alias", "Extras", "Season 1", "Season 2", "Movie.MKV"]
        );
        let EnterOutcome::Navigated(alias) =
            navigator.enter(&state, &state.entries()[0].clone()).await.unwrap()
        else {
            panic!("expected navigation");
        };
        assert_eq!(names(&alias), vec!["E01.mkv", "E02.MP4"]);

        for name in ["Away", "away.mkv"] {
            let kind = if name == "Away" {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            let escape = Entry {
                path: root.join(name),
                name: name.to_string(),
                kind,
            };
            assert!(matches!(
                navigator.enter(&state, &escape).await,
                Err(NavigationError::OutsideRoot { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_move_selection_wraps() {
        let temp_dir = create_test_tree();
        let navigator = Navigator::new(temp_dir.path(), default_filter());
        let mut state = navigator.open_root().await;

        state.move_selection(-1);
        assert_eq!(state.selected_index(), 3);
        state.move_selection(1);
        assert_eq!(state.selected_index(), 0);
        assert!(!state.select(4));
        assert!(state.select(2));
        assert_eq!(state.selected().unwrap().name, "Season 2");
    }

    #[tokio::test]
    async fn test_move_selection_on_empty_listing() {
        let temp_dir = TempDir::new().unwrap();
        let navigator = Navigator::new(temp_dir.path(), default_filter());
        let mut state = navigator.open_root().await;

        state.move_selection(1);

        assert_eq!(state.selected_index(), 0);
        assert!(state.selected().is_none());
        assert!(matches!(
            navigator.enter_selected(&state).await,
            Err(NavigationError::NoContent { .. })
        ));
    }

    fn state_with_entries(count: usize) -> NavigationState {
        let root = PathBuf::from("/mnt/btplay-test");
        NavigationState {
            entries: (0..count)
                .map(|i| Entry {
                    path: root.join(format!("{i:03}.mkv")),
                    name: format!("{i:03}.mkv"),
                    kind: EntryKind::File,
                })
                .collect(),
            current_dir: root.clone(),
            root,
            selected_index: 0,
            listing_error: None,
        }
    }

    proptest! {
        #[test]
        fn prop_last_entry_wraps_to_first(count in 1usize..64) {
            let mut state = state_with_entries(count);
            prop_assert!(state.select(count - 1));
            state.move_selection(1);
            prop_assert_eq!(state.selected_index(), 0);
        }

        #[test]
        fn prop_selection_stays_in_range(count in 1usize..64, moves in proptest::collection::vec(-1isize..=1, 0..100)) {
            let mut state = state_with_entries(count);
            for delta in moves {
                state.move_selection(delta);
                prop_assert!(state.selected_index() < count);
            }
        }

        #[test]
        fn prop_directories_listed_before_files(
            dirs in proptest::collection::btree_set("[a-z]{1,8}", 0..6),
            files in proptest::collection::btree_set("[a-z]{1,8}", 0..6),
        ) {
            let temp_dir = tempfile::TempDir::new().unwrap();
            for dir in &dirs {
                std::fs::create_dir(temp_dir.path().join(format!("d_{dir}"))).unwrap();
            }
            for file in &files {
                std::fs::write(temp_dir.path().join(format!("f_{file}.mkv")), b"x").unwrap();
            }

            let navigator = Navigator::new(temp_dir.path(), PlayableFilter::new(["mkv"]));
            let state = tokio_test::block_on(navigator.open_root());

            let names: Vec<&str> = state.entries().iter().map(|e| e.name.as_str()).collect();
            let expected: Vec<String> = dirs
                .iter()
                .map(|d| format!("d_{d}"))
                .chain(files.iter().map(|f| format!("f_{f}.mkv")))
                .collect();
            prop_assert_eq!(names, expected);
        }
    }
}
