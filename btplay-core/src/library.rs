//! The torrents directory: `.torrent` files and saved search records.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// A `.torrent` file in the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryTorrent {
    /// File name without the `.torrent` extension
    pub name: String,
    pub path: PathBuf,
}

/// Errors from library file operations.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("Torrent file {}.torrent not found in {}", name, dir.display())]
    TorrentNotFound { name: String, dir: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize record for {name}: {source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Process-wide torrents directory, passed around explicitly.
#[derive(Debug, Clone)]
pub struct TorrentLibrary {
    dir: PathBuf,
}

impl TorrentLibrary {
    /// Opens the library at `dir`, creating the directory if needed.
    ///
    /// # Errors
    /// - `LibraryError::Io` - Directory cannot be created
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, LibraryError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| LibraryError::Io {
                path: dir.clone(),
                source,
            })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a torrent called `name` is stored under.
    pub fn torrent_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.torrent", file_stem_for(name)))
    }

    /// All `.torrent` files, sorted by name.
    ///
    /// # Errors
    /// - `LibraryError::Io` - Directory cannot be read
    pub async fn torrents(&self) -> Result<Vec<LibraryTorrent>, LibraryError> {
        let io_error = |source| LibraryError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut torrents = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io_error)?;

        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let path = entry.path();
            let is_torrent = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("torrent"));
            if !is_torrent || !path.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                torrents.push(LibraryTorrent {
                    name: stem.to_string_lossy().into_owned(),
                    path,
                });
            }
        }

        torrents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(torrents)
    }

    /// Resolves a torrent name or an explicit path to an existing file.
    ///
    /// # Errors
    /// - `LibraryError::TorrentNotFound` - Neither a file nor a library entry
    pub fn resolve(&self, name_or_path: &str) -> Result<PathBuf, LibraryError> {
        let direct = Path::new(name_or_path);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }

        let name = name_or_path.strip_suffix(".torrent").unwrap_or(name_or_path);
        let path = self.torrent_path(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(LibraryError::TorrentNotFound {
                name: name.to_string(),
                dir: self.dir.clone(),
            })
        }
    }

    /// Writes `record` as pretty JSON to `<name>.json`.
    ///
    /// # Errors
    /// - `LibraryError::Serialize` - Record cannot be serialized
    /// - `LibraryError::Io` - File cannot be written
    pub async fn save_record<T: Serialize>(
        &self,
        name: &str,
        record: &T,
    ) -> Result<PathBuf, LibraryError> {
        let json = serde_json::to_string_pretty(record).map_err(|source| {
            LibraryError::Serialize {
                name: name.to_string(),
                source,
            }
        })?;

        let path = self.dir.join(format!("{}.json", file_stem_for(name)));
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| LibraryError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::info!("Saved torrent info to {}", path.display());
        Ok(path)
    }

    /// Renames `<from>.torrent` to `<to>.torrent` if the former exists.
    ///
    /// Returns the new path, or `None` when there was nothing to rename.
    ///
    /// # Errors
    /// - `LibraryError::Io` - Rename failed
    pub async fn rename_torrent(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Option<PathBuf>, LibraryError> {
        let old_path = self.torrent_path(from);
        if !old_path.exists() {
            return Ok(None);
        }

        let new_path = self.torrent_path(to);
        tokio::fs::rename(&old_path, &new_path)
            .await
            .map_err(|source| LibraryError::Io {
                path: old_path.clone(),
                source,
            })?;

        Ok(Some(new_path))
    }
}

/// Torrent names come from remote indexes; keep them inside the directory.
fn file_stem_for(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_open_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("nested/torrents");

        let library = TorrentLibrary::open(&dir).await.unwrap();

        assert!(dir.is_dir());
        assert!(library.torrents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_torrents_sorted_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        let library = TorrentLibrary::open(temp_dir.path()).await.unwrap();
        std::fs::write(temp_dir.path().join("b.torrent"), b"x").unwrap();
        std::fs::write(temp_dir.path().join("a.torrent"), b"x").unwrap();
        std::fs::write(temp_dir.path().join("a.json"), b"{}").unwrap();
        std::fs::create_dir(temp_dir.path().join("dir.torrent")).unwrap();

        let names: Vec<String> = library
            .torrents()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();

        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_resolve_name_and_path() {
        let temp_dir = TempDir::new().unwrap();
        let library = TorrentLibrary::open(temp_dir.path()).await.unwrap();
        let path = temp_dir.path().join("Sintel.torrent");
        std::fs::write(&path, b"x").unwrap();

        assert_eq!(library.resolve("Sintel").unwrap(), path);
        assert_eq!(library.resolve("Sintel.torrent").unwrap(), path);
        assert_eq!(library.resolve(path.to_str().unwrap()).unwrap(), path);
        assert!(matches!(
            library.resolve("Missing"),
            Err(LibraryError::TorrentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_record_and_rename() {
        let temp_dir = TempDir::new().unwrap();
        let library = TorrentLibrary::open(temp_dir.path()).await.unwrap();

        let saved = library
            .save_record("AC/DC Live", &json!({"name": "AC/DC Live", "seeders": 4}))
            .await
            .unwrap();
        assert_eq!(saved, temp_dir.path().join("AC_DC Live.json"));
        let contents = std::fs::read_to_string(&saved).unwrap();
        assert!(contents.contains("\"seeders\": 4"));

        assert_eq!(library.rename_torrent("abc", "Named").await.unwrap(), None);
        std::fs::write(library.torrent_path("abc"), b"x").unwrap();
        let renamed = library.rename_torrent("abc", "Named").await.unwrap();
        assert_eq!(renamed, Some(temp_dir.path().join("Named.torrent")));
        assert!(!library.torrent_path("abc").exists());
    }
}
