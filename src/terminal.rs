//! Terminal input primitives: one raw keypress with a timeout, and one
//! blocking line read.

use std::io::{BufRead, Write};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal;

use crate::error::Result;

/// Raw-mode scope guard; restores cooked mode on drop.
pub struct RawGuard;

impl RawGuard {
    pub fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Waits up to `timeout` for a single character keypress.
///
/// Returns `None` when the timeout elapses or a non-character event arrives;
/// the caller's loop never blocks here indefinitely.
pub fn read_key(timeout: Duration) -> Result<Option<char>> {
    if !event::poll(timeout)? {
        return Ok(None);
    }
    if let Event::Key(key) = event::read()? {
        if key.kind == KeyEventKind::Press {
            if let KeyCode::Char(ch) = key.code {
                return Ok(Some(ch));
            }
        }
    }
    Ok(None)
}

/// Prints `prompt` and reads one line, blocking. `None` means end-of-input.
pub fn read_line(prompt: &str) -> Result<Option<String>> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{prompt}")?;
    stdout.flush()?;

    let mut line = String::new();
    let read = std::io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}
