//! Test fixtures for mount session testing.
//!
//! [`FakeFuse`] stands in for the whole external world at once: it answers
//! the mount helper by materializing a configured file tree inside the mount
//! point, answers the unmount helper by clearing it again, reports mounts
//! through [`MountProbe`], and treats every other program as a media player
//! with a configurable exit code.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::mount::MountProbe;
use crate::navigator::NavigationState;
use crate::process::{CommandOutput, CommandRunner, CommandSpec, ProcessError};
use crate::session::{ActionSource, UserAction};

/// Scripted stand-in for btfs, fusermount and media players.
#[derive(Debug)]
pub struct FakeFuse {
    mount_program: String,
    unmount_program: String,
    tree: Vec<(PathBuf, Vec<u8>)>,
    directories: Vec<PathBuf>,
    mount_exit: (i32, String),
    unmount_exit: (i32, String),
    verify: bool,
    player_exits: HashMap<String, i32>,
    mounted: Mutex<HashSet<PathBuf>>,
    invocations: Mutex<Vec<CommandSpec>>,
}

impl Default for FakeFuse {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeFuse {
    /// Creates a fake whose mounts succeed and expose an empty tree.
    pub fn new() -> Self {
        Self {
            mount_program: "btfs".to_string(),
            unmount_program: "fusermount".to_string(),
            tree: Vec::new(),
            directories: Vec::new(),
            mount_exit: (0, String::new()),
            unmount_exit: (0, String::new()),
            verify: true,
            player_exits: HashMap::new(),
            mounted: Mutex::new(HashSet::new()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Adds a file (relative to the mount root) to the mounted tree.
    pub fn with_file(mut self, relative: &str, contents: &[u8]) -> Self {
        self.tree.push((PathBuf::from(relative), contents.to_vec()));
        self
    }

    /// Adds an empty directory (relative to the mount root).
    pub fn with_dir(mut self, relative: &str) -> Self {
        self.directories.push(PathBuf::from(relative));
        self
    }

    /// Makes the mount helper exit with `code` and `stderr`.
    pub fn with_mount_exit(mut self, code: i32, stderr: &str) -> Self {
        self.mount_exit = (code, stderr.to_string());
        self
    }

    /// Makes the unmount helper exit with `code` and `stderr`.
    pub fn with_unmount_exit(mut self, code: i32, stderr: &str) -> Self {
        self.unmount_exit = (code, stderr.to_string());
        self
    }

    /// Mount helper exits 0 but nothing gets mounted.
    pub fn without_verification(mut self) -> Self {
        self.verify = false;
        self
    }

    /// Makes the player whose file name is `player` exit with `code`.
    pub fn with_player_exit(mut self, player: &str, code: i32) -> Self {
        self.player_exits.insert(player.to_string(), code);
        self
    }

    /// Every command run so far, in order.
    pub fn invocations(&self) -> Vec<CommandSpec> {
        self.invocations.lock().clone()
    }

    /// Commands run so far whose program file name equals `program`.
    pub fn invocations_of(&self, program: &str) -> Vec<CommandSpec> {
        self.invocations
            .lock()
            .iter()
            .filter(|command| command.program_name() == program)
            .cloned()
            .collect()
    }

    fn materialize(&self, mount_point: &Path) -> std::io::Result<()> {
        for dir in &self.directories {
            std::fs::create_dir_all(mount_point.join(dir))?;
        }
        for (relative, contents) in &self.tree {
            let path = mount_point.join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)?;
        }
        Ok(())
    }

    fn clear(mount_point: &Path) -> std::io::Result<()> {
        for entry in std::fs::read_dir(mount_point)? {
            let path = entry?.path();
            if path.is_dir() {
                std::fs::remove_dir_all(path)?;
            } else {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn handle_mount(&self, command: &CommandSpec) -> CommandOutput {
        let (code, stderr) = &self.mount_exit;
        if *code != 0 {
            return CommandOutput::failed(*code, stderr.clone());
        }
        if !self.verify {
            return CommandOutput::succeeded();
        }
        let Some(mount_point) = command.args.get(1).map(PathBuf::from) else {
            return CommandOutput::failed(2, "usage: btfs <torrent> <mountpoint>");
        };
        if let Err(e) = self.materialize(&mount_point) {
            return CommandOutput::failed(1, e.to_string());
        }
        self.mounted.lock().insert(mount_point);
        CommandOutput::succeeded()
    }

    fn handle_unmount(&self, command: &CommandSpec) -> CommandOutput {
        let (code, stderr) = &self.unmount_exit;
        if *code != 0 {
            return CommandOutput::failed(*code, stderr.clone());
        }
        let Some(mount_point) = command.args.last().map(PathBuf::from) else {
            return CommandOutput::failed(2, "usage: fusermount -u <mountpoint>");
        };
        if !self.mounted.lock().remove(&mount_point) {
            return CommandOutput::failed(1, "entry not found in /etc/mtab");
        }
        match Self::clear(&mount_point) {
            Ok(()) => CommandOutput::succeeded(),
            Err(e) => CommandOutput::failed(1, e.to_string()),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeFuse {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        self.invocations.lock().push(command.clone());

        let program = command.program_name();
        let output = if program == self.mount_program {
            self.handle_mount(command)
        } else if program == self.unmount_program {
            self.handle_unmount(command)
        } else {
            match self.player_exits.get(&program) {
                Some(&code) if code != 0 => CommandOutput::failed(code, "playback failed"),
                _ => CommandOutput::succeeded(),
            }
        };

        Ok(output)
    }
}

impl MountProbe for FakeFuse {
    fn is_mount_point(&self, path: &Path) -> bool {
        self.mounted.lock().contains(path)
    }
}

/// [`ActionSource`] replaying a fixed list of actions, then quitting.
#[derive(Debug, Default)]
pub struct ScriptedActions {
    actions: VecDeque<UserAction>,
    seen: Vec<NavigationState>,
}

impl ScriptedActions {
    /// Creates a source that yields `actions` in order.
    pub fn new(actions: impl IntoIterator<Item = UserAction>) -> Self {
        Self {
            actions: actions.into_iter().collect(),
            seen: Vec::new(),
        }
    }

    /// Navigation states shown before each action was requested.
    pub fn seen(&self) -> &[NavigationState] {
        &self.seen
    }
}

#[async_trait]
impl ActionSource for ScriptedActions {
    async fn next_action(&mut self, state: &NavigationState) -> UserAction {
        self.seen.push(state.clone());
        self.actions.pop_front().unwrap_or(UserAction::Quit)
    }
}

/// Writes a placeholder `<dir>/torrents/<name>.torrent` and returns its path.
///
/// # Panics
///
/// Panics if the file cannot be written. This is acceptable in test fixtures
/// where failures indicate environment issues.
pub fn write_torrent_file(dir: &Path, name: &str) -> PathBuf {
    let torrents = dir.join("torrents");
    std::fs::create_dir_all(&torrents).unwrap();
    let path = torrents.join(format!("{name}.torrent"));
    std::fs::write(&path, b"d4:infod4:name5:movieee").unwrap();
    path
}

/// Creates empty executable placeholders named like media players.
///
/// # Panics
///
/// Panics if a file cannot be created.
pub fn create_player_binaries(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    let bin = dir.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    names
        .iter()
        .map(|name| {
            let path = bin.join(name);
            std::fs::write(&path, b"#!/bin/sh\n").unwrap();
            path
        })
        .collect()
}
