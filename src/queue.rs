//! Local queue mirror and its synchronization against the engine playlist.
//!
//! The engine's playlist is authoritative but only observable through polled
//! snapshots, and its per-entry slot ids are reused across shuffles and
//! removals. Identity is therefore carried by the catalog id, passed to the
//! engine as each entry's display label and read back on every sync.

use std::collections::HashMap;

use log::debug;

use crate::engine::EngineControl;
use crate::error::{Error, Result};

/// One playable item inside the queue.
///
/// `idx` and `slot_id` are assigned only by synchronization and must not be
/// trusted for remote commands between syncs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Stable catalog identifier.
    pub id: u64,
    pub title: String,
    pub username: String,
    pub stream_url: String,
    pub permalink_url: String,
    /// 0-based position in the local queue.
    pub idx: Option<usize>,
    /// Engine-assigned playlist entry id.
    pub slot_id: Option<i64>,
}

impl Track {
    /// Label carried to the engine: the catalog id as a string.
    pub fn label(&self) -> String {
        self.id.to_string()
    }
}

/// Local mirror of the engine playlist, keyed by catalog id.
#[derive(Debug, Default)]
pub struct Queue {
    tracks: HashMap<u64, Track>,
}

impl Queue {
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.tracks.contains_key(&id)
    }

    pub fn get(&self, id: u64) -> Option<&Track> {
        self.tracks.get(&id)
    }

    /// Resolves an engine label back to a queue track.
    pub fn by_label(&self, label: &str) -> Option<&Track> {
        label.parse().ok().and_then(|id| self.tracks.get(&id))
    }

    /// Looks a track up by its queue position.
    pub fn by_idx(&self, idx: usize) -> Option<&Track> {
        self.tracks.values().find(|track| track.idx == Some(idx))
    }

    /// Tracks ordered by position; unsynced tracks sort last.
    pub fn ordered(&self) -> Vec<&Track> {
        let mut tracks: Vec<&Track> = self.tracks.values().collect();
        tracks.sort_by_key(|track| (track.idx.is_none(), track.idx, track.id));
        tracks
    }

    fn insert(&mut self, track: Track) {
        self.tracks.insert(track.id, track);
    }

    /// Removes a track, shifting later positions down to keep the position
    /// set dense without waiting for a full sync.
    fn take(&mut self, id: u64) -> Option<Track> {
        let removed = self.tracks.remove(&id)?;
        if let Some(removed_idx) = removed.idx {
            for track in self.tracks.values_mut() {
                if let Some(idx) = track.idx {
                    if idx > removed_idx {
                        track.idx = Some(idx - 1);
                    }
                }
            }
        }
        Some(removed)
    }

    fn clear(&mut self) {
        self.tracks.clear();
    }
}

/// Owns the queue and the engine client; every queue mutation goes through
/// here.
pub struct QueueSync<E: EngineControl> {
    engine: E,
    queue: Queue,
}

impl<E: EngineControl> QueueSync<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            queue: Queue::default(),
        }
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Inserts tracks not already queued, then synchronizes to pick up their
    /// positions and slot ids. Returns how many tracks were inserted.
    pub fn enqueue(&mut self, tracks: Vec<Track>) -> Result<usize> {
        let mut added = 0;
        for track in tracks {
            if self.queue.contains(track.id) {
                debug!("track {} already queued, skipping", track.id);
                continue;
            }
            self.engine.enqueue(&track.stream_url, &track.label())?;
            self.queue.insert(track);
            added += 1;
        }
        self.sync()?;
        Ok(added)
    }

    /// Reconciles the mirror against a fresh playlist snapshot.
    ///
    /// Idempotent and race-tolerant: snapshot entries whose label is unknown
    /// are skipped, and local tracks missing from the snapshot keep their
    /// stale position until a later sync. Positions are assigned by
    /// enumerating matched entries, so they stay dense over the mirror even
    /// when the engine playlist carries entries the mirror dropped.
    pub fn sync(&mut self) -> Result<()> {
        let entries = self.engine.playlist()?;
        let mut position = 0;
        for entry in entries {
            let Some(id) = entry.label.parse::<u64>().ok() else {
                debug!("unparseable entry label '{}', skipping", entry.label);
                continue;
            };
            let Some(track) = self.queue.tracks.get_mut(&id) else {
                debug!("engine entry {} not mirrored, skipping", entry.label);
                continue;
            };
            track.idx = Some(position);
            track.slot_id = Some(entry.slot_id);
            position += 1;
        }
        Ok(())
    }

    /// Deletes a track from the engine playlist and the mirror. A track that
    /// is already gone locally is a no-op.
    pub fn remove(&mut self, id: u64) -> Result<Option<Track>> {
        let Some(track) = self.queue.get(id) else {
            return Ok(None);
        };
        if let Some(slot_id) = track.slot_id {
            self.engine.delete_slot(slot_id)?;
        }
        Ok(self.queue.take(id))
    }

    /// Jumps playback to a queued track and drops everything before it.
    ///
    /// Entries ahead of the target are unreachable under forward-only
    /// playback, so they are deleted rather than kept around.
    pub fn jump(&mut self, id: u64) -> Result<Track> {
        let track = self
            .queue
            .get(id)
            .ok_or_else(|| Error::not_found(format!("track {id}")))?;
        let slot_id = track
            .slot_id
            .ok_or_else(|| Error::not_found(format!("slot for track {id}")))?;
        let target_idx = track
            .idx
            .ok_or_else(|| Error::not_found(format!("position for track {id}")))?;
        let target = track.clone();

        self.engine.play(Some(slot_id))?;

        let passed: Vec<u64> = self
            .queue
            .tracks
            .values()
            .filter(|other| matches!(other.idx, Some(idx) if idx < target_idx))
            .map(|other| other.id)
            .collect();
        for passed_id in passed {
            self.remove(passed_id)?;
        }
        Ok(target)
    }

    /// Stops playback, empties the engine playlist, and drops the mirror.
    pub fn clear(&mut self) -> Result<()> {
        self.engine.stop()?;
        self.engine.empty()?;
        self.queue.clear();
        self.engine.status()?;
        Ok(())
    }

    /// Asks the engine to reorder randomly, then resyncs: every position and
    /// slot id is invalid afterwards.
    pub fn shuffle(&mut self) -> Result<()> {
        self.engine.sort_random()?;
        self.sync()
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Scripted in-memory engine used by queue and session tests.

    use std::cell::RefCell;

    use crate::engine::{EngineControl, EngineStatus, PlaylistEntry};
    use crate::error::{Error, Result};

    use super::Track;

    /// Deterministic engine double. Keeps a playlist in memory, hands out
    /// monotonically increasing slot ids, and simulates forward-only
    /// current-entry movement.
    #[derive(Default)]
    pub struct FakeEngine {
        pub slots: RefCell<Vec<PlaylistEntry>>,
        pub current_label: RefCell<Option<String>>,
        pub elapsed: RefCell<i64>,
        pub total: RefCell<i64>,
        pub commands: RefCell<Vec<String>>,
        pub failing: RefCell<bool>,
        next_slot_id: RefCell<i64>,
    }

    impl FakeEngine {
        pub fn new() -> Self {
            let engine = Self::default();
            *engine.next_slot_id.borrow_mut() = 1;
            *engine.total.borrow_mut() = 180;
            engine
        }

        pub fn set_current(&self, label: Option<&str>) {
            *self.current_label.borrow_mut() = label.map(ToOwned::to_owned);
        }

        pub fn set_failing(&self, failing: bool) {
            *self.failing.borrow_mut() = failing;
        }

        pub fn command_log(&self) -> Vec<String> {
            self.commands.borrow().clone()
        }

        fn check(&self, command: &str) -> Result<()> {
            if *self.failing.borrow() {
                return Err(Error::Transport(format!("{command}: connection refused")));
            }
            self.commands.borrow_mut().push(command.to_string());
            Ok(())
        }
    }

    impl EngineControl for FakeEngine {
        fn status(&self) -> Result<EngineStatus> {
            self.check("status")?;
            Ok(EngineStatus {
                label: self.current_label.borrow().clone(),
                elapsed: *self.elapsed.borrow(),
                total: *self.total.borrow(),
            })
        }

        fn playlist(&self) -> Result<Vec<PlaylistEntry>> {
            self.check("playlist")?;
            Ok(self.slots.borrow().clone())
        }

        fn enqueue(&self, _stream_url: &str, label: &str) -> Result<()> {
            self.check(&format!("enqueue {label}"))?;
            let slot_id = *self.next_slot_id.borrow();
            *self.next_slot_id.borrow_mut() = slot_id + 1;
            self.slots.borrow_mut().push(PlaylistEntry {
                slot_id,
                label: label.to_string(),
            });
            Ok(())
        }

        fn delete_slot(&self, slot_id: i64) -> Result<()> {
            self.check(&format!("delete {slot_id}"))?;
            self.slots
                .borrow_mut()
                .retain(|entry| entry.slot_id != slot_id);
            Ok(())
        }

        fn play(&self, slot_id: Option<i64>) -> Result<()> {
            self.check(&format!("play {slot_id:?}"))?;
            let slots = self.slots.borrow();
            let label = match slot_id {
                Some(slot_id) => slots
                    .iter()
                    .find(|entry| entry.slot_id == slot_id)
                    .map(|entry| entry.label.clone()),
                None => self
                    .current_label
                    .borrow()
                    .clone()
                    .or_else(|| slots.first().map(|entry| entry.label.clone())),
            };
            drop(slots);
            *self.current_label.borrow_mut() = label;
            Ok(())
        }

        fn pause(&self) -> Result<()> {
            self.check("pause")
        }

        fn stop(&self) -> Result<()> {
            self.check("stop")?;
            *self.current_label.borrow_mut() = None;
            Ok(())
        }

        fn next(&self) -> Result<()> {
            self.check("next")?;
            let slots = self.slots.borrow();
            let current = self.current_label.borrow().clone();
            let next_label = current
                .and_then(|label| slots.iter().position(|entry| entry.label == label))
                .and_then(|position| slots.get(position + 1))
                .map(|entry| entry.label.clone());
            drop(slots);
            *self.current_label.borrow_mut() = next_label;
            Ok(())
        }

        fn empty(&self) -> Result<()> {
            self.check("empty")?;
            self.slots.borrow_mut().clear();
            *self.current_label.borrow_mut() = None;
            Ok(())
        }

        fn seek(&self, delta_seconds: i64) -> Result<()> {
            self.check(&format!("seek {delta_seconds:+}"))
        }

        fn sort_random(&self) -> Result<()> {
            self.check("sort_random")?;
            // Deterministic "shuffle" for tests.
            self.slots.borrow_mut().reverse();
            Ok(())
        }
    }

    pub fn catalog_track(id: u64) -> Track {
        Track {
            id,
            title: format!("track {id}"),
            username: "uploader".to_string(),
            stream_url: format!("https://stream.test/{id}"),
            permalink_url: format!("https://page.test/{id}"),
            idx: None,
            slot_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{catalog_track, FakeEngine};
    use super::QueueSync;
    use crate::engine::EngineControl;
    use crate::error::Error;

    fn positions(sync: &QueueSync<FakeEngine>) -> Vec<(u64, usize)> {
        sync.queue()
            .ordered()
            .iter()
            .map(|track| (track.id, track.idx.unwrap()))
            .collect()
    }

    #[test]
    fn test_enqueue_assigns_dense_positions() {
        let mut sync = QueueSync::new(FakeEngine::new());
        sync.enqueue(vec![catalog_track(1), catalog_track(2), catalog_track(3)])
            .unwrap();
        assert_eq!(positions(&sync), vec![(1, 0), (2, 1), (3, 2)]);
        assert!(sync.queue().ordered().iter().all(|t| t.slot_id.is_some()));
    }

    #[test]
    fn test_enqueue_skips_duplicates() {
        let mut sync = QueueSync::new(FakeEngine::new());
        sync.enqueue(vec![catalog_track(1), catalog_track(2)])
            .unwrap();
        let added = sync.enqueue(vec![catalog_track(2), catalog_track(3)]).unwrap();
        assert_eq!(added, 1);
        assert_eq!(sync.queue().len(), 3);
    }

    #[test]
    fn test_positions_stay_dense_after_removals() {
        let mut sync = QueueSync::new(FakeEngine::new());
        sync.enqueue((1..=5).map(catalog_track).collect()).unwrap();

        sync.remove(2).unwrap();
        sync.remove(4).unwrap();
        assert_eq!(positions(&sync), vec![(1, 0), (3, 1), (5, 2)]);

        // A full sync reaches the same answer.
        sync.sync().unwrap();
        assert_eq!(positions(&sync), vec![(1, 0), (3, 1), (5, 2)]);
    }

    #[test]
    fn test_sync_is_idempotent() {
        let mut sync = QueueSync::new(FakeEngine::new());
        sync.enqueue(vec![catalog_track(1), catalog_track(2)])
            .unwrap();
        let before = positions(&sync);
        sync.sync().unwrap();
        sync.sync().unwrap();
        assert_eq!(positions(&sync), before);
    }

    #[test]
    fn test_sync_tolerates_unknown_engine_entries() {
        let mut sync = QueueSync::new(FakeEngine::new());
        // Entry the mirror never enqueued.
        sync.engine()
            .enqueue("https://stream.test/ghost", "999")
            .unwrap();
        sync.enqueue(vec![catalog_track(1)]).unwrap();
        // The ghost occupies playlist slot 0 but positions stay dense over
        // the mirror.
        assert_eq!(positions(&sync), vec![(1, 0)]);
    }

    #[test]
    fn test_remove_missing_track_is_noop() {
        let mut sync = QueueSync::new(FakeEngine::new());
        assert!(sync.remove(42).unwrap().is_none());
    }

    #[test]
    fn test_remove_failure_leaves_mirror_unchanged() {
        let mut sync = QueueSync::new(FakeEngine::new());
        sync.enqueue(vec![catalog_track(1), catalog_track(2)])
            .unwrap();
        sync.engine().set_failing(true);
        let err = sync.remove(1).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(sync.queue().len(), 2);
    }

    #[test]
    fn test_jump_drops_passed_tracks() {
        let mut sync = QueueSync::new(FakeEngine::new());
        sync.enqueue((1..=4).map(catalog_track).collect()).unwrap();

        sync.jump(3).unwrap();
        sync.sync().unwrap();
        assert_eq!(positions(&sync), vec![(3, 0), (4, 1)]);
        assert_eq!(
            sync.engine().current_label.borrow().as_deref(),
            Some("3")
        );
    }

    #[test]
    fn test_jump_to_unsynced_track_fails() {
        let mut sync = QueueSync::new(FakeEngine::new());
        sync.enqueue(vec![catalog_track(1)]).unwrap();
        let err = sync.jump(7).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_clear_discards_everything() {
        let mut sync = QueueSync::new(FakeEngine::new());
        sync.enqueue(vec![catalog_track(1), catalog_track(2)])
            .unwrap();
        sync.clear().unwrap();
        assert!(sync.queue().is_empty());
        assert!(sync.engine().slots.borrow().is_empty());
    }

    #[test]
    fn test_shuffle_resyncs_positions() {
        let mut sync = QueueSync::new(FakeEngine::new());
        sync.enqueue((1..=3).map(catalog_track).collect()).unwrap();
        sync.shuffle().unwrap();
        // FakeEngine reverses on sort; positions follow the new order.
        assert_eq!(positions(&sync), vec![(3, 0), (2, 1), (1, 2)]);
    }
}
