//! Mount point lifecycle for torrent filesystems.
//!
//! A [`MountSession`] owns one temporary directory. The [`MountController`]
//! creates it, runs the external FUSE helper against it, verifies the result
//! with a [`MountProbe`], and tears everything down again in
//! [`MountController::release`], which never fails.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::MountConfig;
use crate::process::{CommandRunner, CommandSpec, ProcessError, SystemCommandRunner};

/// Answers whether a path is currently an active mount point.
pub trait MountProbe: Send + Sync {
    /// Returns true if the OS reports `path` as a mount point.
    fn is_mount_point(&self, path: &Path) -> bool;
}

/// [`MountProbe`] that compares device and inode numbers with the parent
/// directory.
#[derive(Debug, Default, Clone)]
pub struct SystemMountProbe;

impl MountProbe for SystemMountProbe {
    #[cfg(unix)]
    fn is_mount_point(&self, path: &Path) -> bool {
        use std::os::unix::fs::MetadataExt;

        let Ok(metadata) = std::fs::symlink_metadata(path) else {
            return false;
        };
        if !metadata.is_dir() {
            return false;
        }
        let Ok(parent) = std::fs::metadata(path.join("..")) else {
            return false;
        };

        metadata.dev() != parent.dev() || metadata.ino() == parent.ino()
    }

    #[cfg(not(unix))]
    fn is_mount_point(&self, _path: &Path) -> bool {
        false
    }
}

/// One mounted (or mountable) torrent.
///
/// `mounted` only becomes true after the mount helper succeeded and the
/// probe confirmed the mount. A session must be handed back to
/// [`MountController::release`]. Dropping it unreleased logs a warning and
/// hands it to a release task on the current tokio runtime; with no runtime
/// only a non-recursive directory removal is tried.
#[derive(Debug)]
pub struct MountSession {
    source_path: PathBuf,
    mount_point: PathBuf,
    mounted: bool,
    released: bool,
    controller: Option<MountController>,
}

impl MountSession {
    /// Torrent file this session mounts.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Directory the torrent is mounted on.
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Whether the mount was verified and not yet unmounted.
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Whether release already ran for this session.
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for MountSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        tracing::warn!(
            "Mount session for {} dropped without release",
            self.mount_point.display()
        );

        if let (Some(controller), Ok(runtime)) =
            (self.controller.take(), tokio::runtime::Handle::try_current())
        {
            // The orphan has no controller, so its own drop cannot respawn.
            let mut orphan = MountSession {
                source_path: std::mem::take(&mut self.source_path),
                mount_point: std::mem::take(&mut self.mount_point),
                mounted: self.mounted,
                released: false,
                controller: None,
            };
            runtime.spawn(async move {
                controller.release(&mut orphan).await;
            });
            return;
        }

        if !matches!(std::fs::exists(&self.mount_point), Ok(false))
            && let Err(e) = std::fs::remove_dir(&self.mount_point)
        {
            tracing::warn!(
                "Could not remove {} on drop: {}",
                self.mount_point.display(),
                e
            );
        }
    }
}

/// Errors that abort a mount attempt.
#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("Torrent file not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("Torrent file {} is not readable: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create mount point under {}: {source}", parent.display())]
    MountPointCreation {
        parent: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Mount helper could not be started: {0}")]
    Spawn(#[from] ProcessError),

    #[error("Mount command failed with {status} (stdout: {stdout:?}, stderr: {stderr:?})")]
    CommandFailed {
        status: String,
        stdout: String,
        stderr: String,
    },

    #[error("Mount command reported success but {} is not a mount point", mount_point.display())]
    Verification { mount_point: PathBuf },
}

/// Failed [`MountController::acquire`].
///
/// Carries the session whenever a mount point directory was already created,
/// so the caller can still release it.
#[derive(Debug)]
pub struct MountFailure {
    pub session: Option<MountSession>,
    pub error: MountError,
}

/// Non-fatal problems hit while tearing a session down.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CleanupWarning {
    #[error("Failed to unmount {}: {reason}", mount_point.display())]
    Unmount { mount_point: PathBuf, reason: String },

    #[error("Failed to remove {}: {reason}", mount_point.display())]
    DirectoryRemoval { mount_point: PathBuf, reason: String },
}

/// What [`MountController::release`] did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReleaseReport {
    /// Release had already run; only directory removal was retried
    pub already_released: bool,
    pub unmount_attempted: bool,
    pub directory_removed: bool,
    pub warnings: Vec<CleanupWarning>,
}

impl ReleaseReport {
    /// True when teardown finished without warnings.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

impl fmt::Display for ReleaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.already_released {
            return write!(
                f,
                "already released, directory removed: {}, warnings: {}",
                self.directory_removed,
                self.warnings.len()
            );
        }
        write!(
            f,
            "unmount attempted: {}, directory removed: {}, warnings: {}",
            self.unmount_attempted,
            self.directory_removed,
            self.warnings.len()
        )
    }
}

/// Owns allocation, mounting and teardown of torrent mount points.
#[derive(Clone)]
pub struct MountController {
    config: MountConfig,
    runner: Arc<dyn CommandRunner>,
    probe: Arc<dyn MountProbe>,
}

impl MountController {
    /// Creates a controller with explicit process runner and mount probe.
    pub fn new(
        config: MountConfig,
        runner: Arc<dyn CommandRunner>,
        probe: Arc<dyn MountProbe>,
    ) -> Self {
        Self {
            config,
            runner,
            probe,
        }
    }

    /// Creates a controller that runs real processes and probes the real OS.
    pub fn with_system(config: MountConfig) -> Self {
        Self::new(
            config,
            Arc::new(SystemCommandRunner::new()),
            Arc::new(SystemMountProbe),
        )
    }

    /// Creates a fresh mount point directory for `source`.
    ///
    /// # Errors
    /// - `MountError::SourceNotFound` - Torrent file does not exist
    /// - `MountError::SourceUnreadable` - Torrent file cannot be opened
    /// - `MountError::MountPointCreation` - Temporary directory creation failed
    pub async fn allocate(&self, source: &Path) -> Result<MountSession, MountError> {
        if let Err(e) = tokio::fs::File::open(source).await {
            return Err(match e.kind() {
                std::io::ErrorKind::NotFound => MountError::SourceNotFound {
                    path: source.to_path_buf(),
                },
                _ => MountError::SourceUnreadable {
                    path: source.to_path_buf(),
                    source: e,
                },
            });
        }

        let parent = self.config.mount_parent();
        let creation_error = |source| MountError::MountPointCreation {
            parent: parent.clone(),
            source,
        };

        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(creation_error)?;

        // The directory must outlive the builder's guard: removing a live
        // mount recursively would walk into the torrent contents.
        let mount_point = tempfile::Builder::new()
            .prefix(&self.config.mount_point_prefix)
            .tempdir_in(&parent)
            .map_err(creation_error)?
            .keep();

        tracing::info!("Created mount point {}", mount_point.display());

        Ok(MountSession {
            source_path: source.to_path_buf(),
            mount_point,
            mounted: false,
            released: false,
            controller: Some(self.clone()),
        })
    }

    /// Runs the mount helper for `session` and verifies the mount.
    ///
    /// # Errors
    /// - `MountError::Spawn` - Mount helper could not be started
    /// - `MountError::CommandFailed` - Mount helper exited non-zero
    /// - `MountError::Verification` - Helper succeeded but no mount exists
    pub async fn mount(&self, session: &mut MountSession) -> Result<(), MountError> {
        let command = CommandSpec::new(&self.config.mount_program)
            .arg(session.source_path.as_os_str())
            .arg(session.mount_point.as_os_str());

        tracing::info!("Mounting with command: {}", command);
        let output = self.runner.run(&command).await?;

        if !output.success() {
            return Err(MountError::CommandFailed {
                status: output.status_text(),
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        if !self.probe.is_mount_point(&session.mount_point) {
            tracing::error!(
                "{} exited cleanly but {} is not mounted",
                command.program_name(),
                session.mount_point.display()
            );
            return Err(MountError::Verification {
                mount_point: session.mount_point.clone(),
            });
        }

        session.mounted = true;
        tracing::info!("Mount successful: {}", session.mount_point.display());
        Ok(())
    }

    /// Allocates a mount point and mounts `source` on it.
    ///
    /// # Errors
    /// Returns a [`MountFailure`]; its `session` is present whenever a mount
    /// point directory exists and must still be released.
    pub async fn acquire(&self, source: &Path) -> Result<MountSession, MountFailure> {
        let mut session = self.allocate(source).await.map_err(|error| MountFailure {
            session: None,
            error,
        })?;

        match self.mount(&mut session).await {
            Ok(()) => Ok(session),
            Err(error) => Err(MountFailure {
                session: Some(session),
                error,
            }),
        }
    }

    /// Unmounts and removes the session's mount point.
    ///
    /// Unmount is attempted first when the session is mounted; directory
    /// removal is attempted afterwards regardless of the unmount result.
    /// Neither failure escapes: both come back as warnings. The unmount step
    /// runs at most once per session; later calls only retry removing the
    /// directory while it still exists.
    pub async fn release(&self, session: &mut MountSession) -> ReleaseReport {
        let mut report = ReleaseReport {
            already_released: session.released,
            ..Default::default()
        };
        session.released = true;

        if report.already_released {
            tracing::debug!(
                "Mount session {} already released, retrying directory removal",
                session.mount_point.display()
            );
        } else if session.mounted {
            report.unmount_attempted = true;
            if let Some(warning) = self.unmount(session).await {
                report.warnings.push(warning);
            } else {
                session.mounted = false;
            }
        }

        match self.remove_mount_point(&session.mount_point).await {
            Ok(removed) => report.directory_removed = removed,
            Err(warning) => report.warnings.push(warning),
        }

        for warning in &report.warnings {
            tracing::warn!("{}", warning);
        }
        tracing::info!(
            "Released mount session {}: {}",
            session.mount_point.display(),
            report
        );

        report
    }

    async fn unmount(&self, session: &MountSession) -> Option<CleanupWarning> {
        let command = CommandSpec::new(&self.config.unmount_program)
            .args(self.config.unmount_args.iter().map(String::as_str))
            .arg(session.mount_point.as_os_str());

        tracing::info!("Unmounting with command: {}", command);

        let reason = match self.runner.run(&command).await {
            Ok(output) if output.success() => return None,
            Ok(output) => format!(
                "{} (stdout: {:?}, stderr: {:?})",
                output.status_text(),
                output.stdout.trim(),
                output.stderr.trim()
            ),
            Err(e) => e.to_string(),
        };

        Some(CleanupWarning::Unmount {
            mount_point: session.mount_point.clone(),
            reason,
        })
    }

    /// Returns Ok(false) when there was nothing left to remove.
    async fn remove_mount_point(&self, mount_point: &Path) -> Result<bool, CleanupWarning> {
        // A failed stat (ENOTCONN on a dead FUSE endpoint) counts as present.
        if let Ok(false) = tokio::fs::try_exists(mount_point).await {
            return Ok(false);
        }

        // Still mounted: only the empty directory may go, never its contents.
        let result = if self.probe.is_mount_point(mount_point) {
            tokio::fs::remove_dir(mount_point).await
        } else {
            tokio::fs::remove_dir_all(mount_point).await
        };

        match result {
            Ok(()) => {
                tracing::info!("Removed directory: {}", mount_point.display());
                Ok(true)
            }
            Err(e) => Err(CleanupWarning::DirectoryRemoval {
                mount_point: mount_point.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }
}

impl fmt::Debug for MountController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountController")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
