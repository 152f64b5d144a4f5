//! Single-key bindings consulted by the outer playback loop.

use std::collections::HashMap;

/// Actions reachable with one keypress during playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hotkey {
    SeekForward,
    SeekBack,
    TogglePause,
    Advance,
    Shuffle,
    ListQueue,
    ShowUrl,
    ShowId,
    RemoveCurrent,
    CommandMode,
    Quit,
}

/// Key-to-action table, built once at startup.
pub struct HotkeyTable {
    bindings: HashMap<char, Hotkey>,
}

impl HotkeyTable {
    pub fn new() -> Self {
        let bindings = HashMap::from([
            ('.', Hotkey::SeekForward),
            (',', Hotkey::SeekBack),
            (' ', Hotkey::TogglePause),
            ('n', Hotkey::Advance),
            ('s', Hotkey::Shuffle),
            ('l', Hotkey::ListQueue),
            ('u', Hotkey::ShowUrl),
            ('i', Hotkey::ShowId),
            ('d', Hotkey::RemoveCurrent),
            (':', Hotkey::CommandMode),
            ('q', Hotkey::Quit),
        ]);
        Self { bindings }
    }

    pub fn lookup(&self, key: char) -> Option<Hotkey> {
        self.bindings.get(&key).copied()
    }
}

impl Default for HotkeyTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Hotkey, HotkeyTable};

    #[test]
    fn test_bindings_resolve() {
        let table = HotkeyTable::new();
        assert_eq!(table.lookup('q'), Some(Hotkey::Quit));
        assert_eq!(table.lookup(':'), Some(Hotkey::CommandMode));
        assert_eq!(table.lookup(' '), Some(Hotkey::TogglePause));
        assert_eq!(table.lookup('x'), None);
    }
}
