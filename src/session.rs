//! Playback session: current-track state machine and the outer poll loop.
//!
//! The engine never announces track transitions. The session infers them by
//! diffing the label of successive status polls against the queue mirror:
//! a change of resolved track is an edge, and every edge that leaves a
//! previously current track behind retires it into history.

use std::io::Write;
use std::time::Duration;

use log::warn;

use crate::catalog::Catalog;
use crate::commands::CommandMode;
use crate::engine::{EngineControl, EngineStatus};
use crate::error::Result;
use crate::format;
use crate::history::History;
use crate::hotkeys::{Hotkey, HotkeyTable};
use crate::queue::{Queue, QueueSync, Track};
use crate::terminal::{self, RawGuard};

/// How long each loop iteration waits for a keypress.
const KEY_TIMEOUT: Duration = Duration::from_secs(1);

/// Width the status line is padded to so redraws fully overwrite it.
const STATUS_WIDTH: usize = 120;

/// One playback session: queue mirror, history, and the current-track state.
pub struct Session<E: EngineControl> {
    sync: QueueSync<E>,
    history: History,
    /// Owned snapshot of the current track; `None` is the Idle state.
    current: Option<Track>,
    elapsed: i64,
    total: i64,
    running: bool,
}

impl<E: EngineControl> Session<E> {
    pub fn new(engine: E, history: History) -> Self {
        Self {
            sync: QueueSync::new(engine),
            history,
            current: None,
            elapsed: 0,
            total: 0,
            running: false,
        }
    }

    pub fn queue(&self) -> &Queue {
        self.sync.queue()
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn enqueue(&mut self, tracks: Vec<Track>) -> Result<usize> {
        self.sync.enqueue(tracks)
    }

    pub fn shuffle(&mut self) -> Result<()> {
        self.sync.shuffle()
    }

    /// Jumps to a queued track, dropping everything queued before it.
    pub fn jump(&mut self, id: u64) -> Result<Track> {
        self.sync.jump(id)
    }

    #[cfg(test)]
    pub(crate) fn sync_engine_for_tests(&self) -> &E {
        self.sync.engine()
    }

    /// Polls the engine once and advances the transition state machine.
    pub fn poll(&mut self) -> Result<()> {
        let status = self.sync.engine().status()?;
        self.observe(status)
    }

    /// State machine over `(current, polled label)`.
    fn observe(&mut self, status: EngineStatus) -> Result<()> {
        self.elapsed = status.elapsed;
        self.total = status.total;

        let resolved = status
            .label
            .as_deref()
            .and_then(|label| self.sync.queue().by_label(label))
            .cloned();

        match (self.current.take(), resolved) {
            // Idle, possibly becoming Playing.
            (None, next) => self.current = next,
            // Same track still playing; keep the fresher queue copy.
            (Some(previous), Some(next)) if previous.id == next.id => {
                self.current = Some(next);
            }
            // Advanced to another queued track.
            (Some(previous), Some(next)) => {
                self.retire(previous)?;
                self.current = Some(next);
            }
            // Stopped or ran off the end of everything the mirror knows.
            (Some(previous), None) => {
                self.retire(previous)?;
                if !self.sync.queue().is_empty() {
                    // The engine does not reliably advance on its own once
                    // entries have been deleted out from under it.
                    self.sync.engine().play(None)?;
                }
            }
        }
        Ok(())
    }

    /// Retires a track that stopped being current: history first, queue
    /// removal second. That order is what makes history trustworthy.
    fn retire(&mut self, track: Track) -> Result<()> {
        self.history.record(&track);
        self.sync.remove(track.id)?;
        Ok(())
    }

    /// Removes a track from the queue. Removing the current track advances
    /// the engine off the doomed slot first and resumes playback afterwards.
    pub fn remove_track(&mut self, id: u64) -> Result<Option<Track>> {
        let is_current = self.current.as_ref().map(|track| track.id) == Some(id);
        if !is_current {
            return self.sync.remove(id);
        }
        let track = self.current.take().expect("checked above");
        self.sync.engine().next()?;
        self.retire(track.clone())?;
        self.sync.engine().play(None)?;
        Ok(Some(track))
    }

    /// Runs one hotkey handler; returns an optional status message.
    pub fn apply_hotkey(&mut self, hotkey: Hotkey) -> Result<Option<String>> {
        match hotkey {
            Hotkey::SeekForward => self.sync.engine().seek(15).map(|_| None),
            Hotkey::SeekBack => self.sync.engine().seek(-15).map(|_| None),
            Hotkey::TogglePause => self.sync.engine().pause().map(|_| None),
            Hotkey::Advance => self.sync.engine().next().map(|_| Some("Next...".to_string())),
            Hotkey::Shuffle => self.shuffle().map(|_| Some("Shuffling...".to_string())),
            Hotkey::ListQueue => {
                let listing: Vec<String> = self
                    .sync
                    .queue()
                    .ordered()
                    .into_iter()
                    .map(format::queue_row)
                    .collect();
                Ok(Some(listing.join("\r\n")))
            }
            Hotkey::ShowUrl => Ok(Some(match self.current() {
                Some(track) => format!("URL: {}", track.permalink_url),
                None => "no current track".to_string(),
            })),
            Hotkey::ShowId => Ok(Some(match self.current() {
                Some(track) => format!("Track id: {}", track.id),
                None => "no current track".to_string(),
            })),
            Hotkey::RemoveCurrent => match self.current().map(|track| track.id) {
                Some(id) => {
                    let removed = self.remove_track(id)?;
                    Ok(removed.map(|track| format!("Removed {}", track.title)))
                }
                None => Ok(Some("no current track".to_string())),
            },
            Hotkey::Quit => {
                self.running = false;
                Ok(Some("Quitting...".to_string()))
            }
            // Handled by the loop itself; needs the terminal and catalog.
            Hotkey::CommandMode => Ok(None),
        }
    }

    fn render(&self) {
        let line = match self.current() {
            Some(track) => {
                format::now_playing(track, self.elapsed, self.total, self.queue().len())
            }
            None => format!("{} idle", format::timestamp(self.elapsed, self.total)),
        };
        let width = STATUS_WIDTH;
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "\r{line:<width$}");
        let _ = stdout.flush();
    }

    fn print_message(message: &str) {
        let width = STATUS_WIDTH;
        let mut stdout = std::io::stdout();
        for part in message.split('\n') {
            let part = part.trim_end_matches('\r');
            let _ = write!(stdout, "\r{part:<width$}\r\n");
        }
        let _ = stdout.flush();
    }

    /// The outer loop: poll, detect transitions, render, take one keypress.
    ///
    /// Single-threaded and cooperative; command mode is a nested blocking
    /// loop that owns the terminal until it exits.
    pub fn run<C: Catalog>(&mut self, catalog: &C) -> Result<()> {
        self.running = true;
        self.sync.engine().play(None)?;

        let table = HotkeyTable::new();
        let mut raw = Some(RawGuard::new()?);
        while self.running {
            if let Err(err) = self.poll() {
                // Transient transport failures are not fatal to the loop.
                warn!("status poll failed: {err}");
            }
            self.render();

            let Some(key) = terminal::read_key(KEY_TIMEOUT)? else {
                continue;
            };
            match table.lookup(key) {
                Some(Hotkey::CommandMode) => {
                    drop(raw.take());
                    println!();
                    let outcome = CommandMode::new(self, catalog).run();
                    if let Err(err) = outcome {
                        println!("{err}");
                    }
                    raw = Some(RawGuard::new()?);
                }
                Some(hotkey) => match self.apply_hotkey(hotkey) {
                    Ok(Some(message)) => Self::print_message(&message),
                    Ok(None) => {}
                    Err(err) => Self::print_message(&err.to_string()),
                },
                None => {}
            }
        }
        Ok(())
    }
}
