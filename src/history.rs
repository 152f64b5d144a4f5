//! Bounded, deduplicated play-history log.
//!
//! Entries accumulate chronologically in memory during a session and are
//! trimmed only when persisted: most-recent-first, one entry per track id,
//! capped at [`MAX_HIST`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::Result;
use crate::queue::Track;

/// Maximum number of entries kept in the persisted history file.
pub const MAX_HIST: usize = 50;

/// Immutable snapshot of a track taken at the moment it was retired.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub title: String,
    pub permalink_url: String,
    pub stream_url: String,
    pub username: String,
}

impl From<&Track> for HistoryEntry {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id,
            title: track.title.clone(),
            permalink_url: track.permalink_url.clone(),
            stream_url: track.stream_url.clone(),
            username: track.username.clone(),
        }
    }
}

/// Play-history log backed by a JSON file.
pub struct History {
    path: PathBuf,
    // Chronological: most recent entry is last.
    entries: Vec<HistoryEntry>,
}

impl History {
    /// Loads history from `path`. A missing or unparseable file is an empty
    /// history, never an error.
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<Vec<HistoryEntry>>(&raw) {
                Ok(mut persisted) => {
                    // File is most-recent-first; memory is chronological.
                    persisted.reverse();
                    persisted
                }
                Err(err) => {
                    warn!(
                        "history file unreadable, starting empty. path={} err={}",
                        path.display(),
                        err
                    );
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    /// Records a retired track. Unbounded in memory; trimming happens on save.
    pub fn record(&mut self, track: &Track) {
        self.entries.push(HistoryEntry::from(track));
    }

    /// Number of entries accumulated so far, persisted and session combined.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most-recent-first view of the trimmed history, as it would persist.
    pub fn recent(&self) -> Vec<HistoryEntry> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .rev()
            .filter(|entry| seen.insert(entry.id))
            .take(MAX_HIST)
            .cloned()
            .collect()
    }

    /// Persists the trimmed history, most-recent-first.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let trimmed = self.recent();
        let serialized =
            serde_json::to_string_pretty(&trimmed).expect("history entries always serialize");
        std::fs::write(&self.path, serialized)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{History, MAX_HIST};
    use crate::queue::Track;

    fn track(id: u64) -> Track {
        Track {
            id,
            title: format!("track {id}"),
            username: "someone".to_string(),
            stream_url: format!("https://stream.test/{id}"),
            permalink_url: format!("https://page.test/{id}"),
            idx: None,
            slot_id: None,
        }
    }

    #[test]
    fn test_missing_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::load(&dir.path().join("history.json"));
        assert!(history.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{not json").unwrap();
        let history = History::load(&path);
        assert!(history.is_empty());
    }

    #[test]
    fn test_round_trip_caps_and_orders() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut history = History::load(&path);
        for id in 0..60u64 {
            history.record(&track(id));
        }
        history.save().unwrap();

        let reloaded = History::load(&path);
        let recent = reloaded.recent();
        assert_eq!(recent.len(), MAX_HIST);
        // Most recent first: ids 59 down to 10.
        assert_eq!(recent[0].id, 59);
        assert_eq!(recent[MAX_HIST - 1].id, 10);
    }

    #[test]
    fn test_duplicates_collapse_keeping_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = History::load(&dir.path().join("history.json"));
        history.record(&track(1));
        history.record(&track(2));
        history.record(&track(1));

        let recent = history.recent();
        let ids: Vec<u64> = recent.iter().map(|entry| entry.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_session_appends_after_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut history = History::load(&path);
        history.record(&track(7));
        history.save().unwrap();

        let mut history = History::load(&path);
        history.record(&track(8));
        let ids: Vec<u64> = history.recent().iter().map(|entry| entry.id).collect();
        assert_eq!(ids, vec![8, 7]);
    }
}
