//! Status-line and listing formatting helpers.

use crate::queue::Track;

/// Formats a seconds count as `MM:SS`, or `H:MM:SS` past one hour.
fn seconds_to_clock(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (hours, minutes, secs) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if seconds >= 3600 {
        format!("{hours:01}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

/// Formats an elapsed/total pair as `(MM:SS/MM:SS)`.
pub fn timestamp(elapsed: i64, total: i64) -> String {
    format!("({}/{})", seconds_to_clock(elapsed), seconds_to_clock(total))
}

/// One-line now-playing banner rendered on every poll cycle.
pub fn now_playing(track: &Track, elapsed: i64, total: i64, queue_len: usize) -> String {
    let position = track.idx.map(|idx| idx + 1).unwrap_or(0);
    format!(
        "{} [{}/{}] {} - {}",
        timestamp(elapsed, total),
        position,
        queue_len,
        track.username,
        track.title
    )
}

/// Queue listing row: left-aligned index column, then the track.
pub fn queue_row(track: &Track) -> String {
    format!(
        "{:<12} {} - {}",
        track.idx.map(|idx| idx.to_string()).unwrap_or_default(),
        track.username,
        track.title
    )
}

/// Generic listing row for enumerated results.
pub fn numbered_row(index: usize, text: &str) -> String {
    format!("{index:<12} {text}")
}

#[cfg(test)]
mod tests {
    use super::{seconds_to_clock, timestamp};

    #[test]
    fn test_clock_under_an_hour() {
        assert_eq!(seconds_to_clock(0), "00:00");
        assert_eq!(seconds_to_clock(75), "01:15");
        assert_eq!(seconds_to_clock(3599), "59:59");
    }

    #[test]
    fn test_clock_past_an_hour() {
        assert_eq!(seconds_to_clock(3600), "1:00:00");
        assert_eq!(seconds_to_clock(3725), "1:02:05");
    }

    #[test]
    fn test_timestamp_pair() {
        assert_eq!(timestamp(75, 210), "(01:15/03:30)");
    }

    #[test]
    fn test_negative_time_clamped() {
        assert_eq!(seconds_to_clock(-3), "00:00");
    }
}
