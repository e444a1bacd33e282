//! Line-oriented terminal frontend.
//!
//! Prints session events as they arrive and turns typed lines into
//! [`UserAction`]s. Nothing here is drawn with cursor control; every screen
//! is plain text followed by a prompt.

use std::io::{BufRead, Write};

use async_trait::async_trait;
use btplay_core::navigator::NavigationState;
use btplay_core::session::{ActionSource, SessionEvent, SessionState, UserAction};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const BROWSE_HELP: &str =
    "j/k: move | <enter>: open/play | <n>: open entry n | b: back | q: quit";

/// Reads trimmed lines from stdin after printing a prompt.
///
/// Lines come from a plain reader thread, so a prompt abandoned mid-read
/// neither loses input nor keeps the runtime from shutting down.
pub struct Prompt {
    lines: mpsc::UnboundedReceiver<std::io::Result<String>>,
}

impl Prompt {
    pub fn new() -> Self {
        let (tx, lines) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self { lines }
    }

    /// Returns `None` at end of input or on a read error.
    pub async fn read(&mut self, prompt: &str) -> Option<String> {
        print!("{prompt}");
        if let Err(e) = std::io::stdout().flush() {
            tracing::debug!("Failed to flush prompt: {}", e);
        }

        match self.lines.recv().await {
            Some(Ok(line)) => Some(line.trim().to_string()),
            Some(Err(e)) => {
                tracing::warn!("Failed to read input: {}", e);
                None
            }
            None => None,
        }
    }
}

/// Cancels `cancel` on every Ctrl-C until aborted.
///
/// Once the handler is installed SIGINT no longer kills btplay, so a running
/// player exits by itself and the session still unmounts.
pub fn cancel_on_interrupt(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Cannot listen for Ctrl-C: {}", e);
                return;
            }
            tracing::info!("Interrupt received, closing session");
            cancel.cancel();
        }
    })
}

/// Parses one input line into the action it stands for.
///
/// A bare number opens that entry (1-based). Returns `None` for input that
/// means nothing.
pub fn parse_action(line: &str) -> Option<UserAction> {
    match line.trim().to_lowercase().as_str() {
        "" | "o" | "l" => Some(UserAction::Enter),
        "j" | "down" => Some(UserAction::MoveDown),
        "k" | "up" => Some(UserAction::MoveUp),
        "b" | "h" | ".." => Some(UserAction::Back),
        "q" | "quit" => Some(UserAction::Quit),
        other => match other.parse::<usize>() {
            Ok(n) if n > 0 => Some(UserAction::Open(n - 1)),
            _ => None,
        },
    }
}

/// Renders a directory listing with the cursor marked.
pub fn render_listing(state: &NavigationState) -> String {
    let mut out = format!("\n/{}\n", state.relative_dir().display());
    for (index, entry) in state.entries().iter().enumerate() {
        let marker = if index == state.selected_index() { '>' } else { ' ' };
        let suffix = if entry.is_dir() { "/" } else { "" };
        out.push_str(&format!("{marker} {:>3}. {}{suffix}\n", index + 1, entry.name));
    }
    out
}

/// Text shown for an event, if any.
pub fn render_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Listing(state) => Some(render_listing(state)),
        SessionEvent::Status(message) => Some(message.clone()),
        SessionEvent::NoContent { dir, listing_error } => Some(match listing_error {
            Some(error) => format!("Cannot read {}: {}", dir.display(), error.reason),
            None => format!("No directories or playable files in {}", dir.display()),
        }),
        SessionEvent::PlaybackStarted { file } => Some(format!("Playing {}", file.display())),
        SessionEvent::PlaybackFinished { player } => {
            Some(format!("Playback finished ({})", player.display()))
        }
        SessionEvent::Cleanup(warning) => Some(format!("Warning: {warning}")),
        SessionEvent::StateChanged {
            to: SessionState::Unmounting,
            ..
        } => Some("Unmounting...".to_string()),
        SessionEvent::StateChanged { .. } => None,
    }
}

/// [`ActionSource`] backed by the terminal.
pub struct TerminalActions {
    prompt: Prompt,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl TerminalActions {
    pub fn new(events: mpsc::UnboundedReceiver<SessionEvent>) -> Self {
        Self {
            prompt: Prompt::new(),
            events,
        }
    }

    /// Prints every event received so far.
    pub fn flush_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            if let Some(text) = render_event(&event) {
                println!("{text}");
            }
        }
    }
}

#[async_trait]
impl ActionSource for TerminalActions {
    async fn next_action(&mut self, _state: &NavigationState) -> UserAction {
        self.flush_events();
        loop {
            let Some(line) = self.prompt.read("> ").await else {
                return UserAction::Quit;
            };
            match parse_action(&line) {
                Some(action) => return action,
                None => println!("{BROWSE_HELP}"),
            }
        }
    }
}
