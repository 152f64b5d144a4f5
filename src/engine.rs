//! Playback-engine collaborator: the VLC HTTP control surface.
//!
//! The engine is a spawned VLC process controlled exclusively through its
//! loopback HTTP interface. It pushes nothing; everything the player knows
//! about playback comes from polling `status.json` and `playlist.json`.

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use base64::Engine as _;
use log::{debug, info, warn};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// One polled `status.json` snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStatus {
    /// Caller-supplied label of the currently playing slot, when one exists.
    pub label: Option<String>,
    /// Elapsed seconds of the current entry.
    pub elapsed: i64,
    /// Total seconds of the current entry.
    pub total: i64,
}

/// One entry of a polled `playlist.json` snapshot, in playlist order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    /// Engine-assigned slot id; unstable across shuffles and removals.
    pub slot_id: i64,
    /// Caller-supplied label (catalog id as a string).
    pub label: String,
}

/// Synchronous control surface over the playback engine.
///
/// Every call is one blocking HTTP request; a network-level failure maps to
/// [`Error::Transport`] and leaves nothing retried.
pub trait EngineControl {
    fn status(&self) -> Result<EngineStatus>;
    fn playlist(&self) -> Result<Vec<PlaylistEntry>>;
    /// Inserts a stream at the end of the playlist, carrying `label` as the
    /// entry's display name so identity survives the round trip.
    fn enqueue(&self, stream_url: &str, label: &str) -> Result<()>;
    fn delete_slot(&self, slot_id: i64) -> Result<()>;
    /// Resumes playback, or jumps to `slot_id` when given.
    fn play(&self, slot_id: Option<i64>) -> Result<()>;
    fn pause(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    fn next(&self) -> Result<()>;
    fn empty(&self) -> Result<()>;
    fn seek(&self, delta_seconds: i64) -> Result<()>;
    fn sort_random(&self) -> Result<()>;
}

/// `EngineControl` backed by `ureq` against a local VLC HTTP interface.
pub struct HttpEngine {
    http_client: ureq::Agent,
    base_url: String,
    auth_header: String,
}

impl HttpEngine {
    /// Creates a client for the engine listening on `127.0.0.1:<port>`.
    pub fn new(port: u16, password: &str) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(2))
            .timeout_read(Duration::from_secs(5))
            .timeout_write(Duration::from_secs(5))
            .build();
        // VLC uses basic auth with an empty username.
        let credentials = base64::engine::general_purpose::STANDARD.encode(format!(":{password}"));
        Self {
            http_client,
            base_url: format!("http://127.0.0.1:{port}/requests"),
            auth_header: format!("Basic {credentials}"),
        }
    }

    fn request_json(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value> {
        let query: Vec<String> = params
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect();
        let mut url = format!("{}/{endpoint}", self.base_url);
        if !query.is_empty() {
            url = format!("{url}?{}", query.join("&"));
        }
        let response = self
            .http_client
            .get(&url)
            .set("Authorization", &self.auth_header)
            .call()
            .map_err(|err| Error::Transport(format!("{endpoint}: {err}")))?;
        response
            .into_json()
            .map_err(|err| Error::Transport(format!("{endpoint}: bad response body ({err})")))
    }

    fn command(&self, params: &[(&str, &str)]) -> Result<()> {
        self.request_json("status.json", params).map(|_| ())
    }
}

fn value_as_i64(value: Option<&Value>) -> Option<i64> {
    match value {
        Some(Value::Number(number)) => number.as_i64(),
        Some(Value::String(raw)) => raw.parse().ok(),
        _ => None,
    }
}

fn parse_status(parsed: &Value) -> EngineStatus {
    let label = parsed
        .get("information")
        .and_then(|info| info.get("category"))
        .and_then(|category| category.get("meta"))
        .and_then(|meta| meta.get("title"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned);
    EngineStatus {
        label,
        elapsed: value_as_i64(parsed.get("time")).unwrap_or(0),
        total: value_as_i64(parsed.get("length")).unwrap_or(0),
    }
}

fn parse_playlist(parsed: &Value) -> Vec<PlaylistEntry> {
    // The playlist node is the first child; its children are the entries.
    let entries = parsed
        .get("children")
        .and_then(Value::as_array)
        .and_then(|nodes| nodes.first())
        .and_then(|node| node.get("children"))
        .and_then(Value::as_array);
    let Some(entries) = entries else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let slot_id = value_as_i64(entry.get("id"))?;
            let label = entry.get("name").and_then(Value::as_str)?.to_owned();
            Some(PlaylistEntry { slot_id, label })
        })
        .collect()
}

impl EngineControl for HttpEngine {
    fn status(&self) -> Result<EngineStatus> {
        Ok(parse_status(&self.request_json("status.json", &[])?))
    }

    fn playlist(&self) -> Result<Vec<PlaylistEntry>> {
        Ok(parse_playlist(&self.request_json("playlist.json", &[])?))
    }

    fn enqueue(&self, stream_url: &str, label: &str) -> Result<()> {
        self.command(&[
            ("command", "in_enqueue"),
            ("input", stream_url),
            ("name", label),
        ])
    }

    fn delete_slot(&self, slot_id: i64) -> Result<()> {
        self.command(&[("command", "pl_delete"), ("id", &slot_id.to_string())])
    }

    fn play(&self, slot_id: Option<i64>) -> Result<()> {
        match slot_id {
            Some(slot_id) => self.command(&[("command", "pl_play"), ("id", &slot_id.to_string())]),
            None => self.command(&[("command", "pl_play")]),
        }
    }

    fn pause(&self) -> Result<()> {
        self.command(&[("command", "pl_pause")])
    }

    fn stop(&self) -> Result<()> {
        self.command(&[("command", "pl_stop")])
    }

    fn next(&self) -> Result<()> {
        self.command(&[("command", "pl_next")])
    }

    fn empty(&self) -> Result<()> {
        self.command(&[("command", "pl_empty")])
    }

    fn seek(&self, delta_seconds: i64) -> Result<()> {
        let value = format!("{delta_seconds:+}");
        self.command(&[("command", "seek"), ("val", &value)])
    }

    fn sort_random(&self) -> Result<()> {
        self.command(&[("command", "pl_sort"), ("id", "0"), ("val", "random")])
    }
}

/// How long the startup handshake keeps retrying before giving up.
const HANDSHAKE_DEADLINE: Duration = Duration::from_secs(15);
const HANDSHAKE_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Retries the initial status poll until the engine's control port answers.
///
/// This is the only place a transport failure is retried. The retry window is
/// bounded; an engine that never opens its port is a startup error rather
/// than an indefinite hang.
pub fn await_engine(engine: &impl EngineControl) -> Result<()> {
    let deadline = Instant::now() + HANDSHAKE_DEADLINE;
    loop {
        match engine.status() {
            Ok(_) => {
                info!("engine control surface is up");
                return Ok(());
            }
            Err(err) if Instant::now() < deadline => {
                debug!("engine not answering yet: {err}");
                std::thread::sleep(HANDSHAKE_RETRY_DELAY);
            }
            Err(err) => {
                return Err(Error::Transport(format!(
                    "engine did not come up within {}s: {err}",
                    HANDSHAKE_DEADLINE.as_secs()
                )))
            }
        }
    }
}

/// Spawned engine process, terminated on drop.
pub struct EngineProcess {
    child: Child,
}

impl EngineProcess {
    /// Launches the engine with its HTTP interface enabled and nothing else.
    pub fn spawn(config: &EngineConfig) -> Result<Self> {
        let child = Command::new(&config.binary)
            .args([
                "--quiet",
                "--intf",
                "http",
                "--http-password",
                &config.password,
                "--http-port",
                &config.port.to_string(),
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                Error::Transport(format!(
                    "failed to launch engine '{}': {err}",
                    config.binary
                ))
            })?;
        info!("launched engine pid={}", child.id());
        Ok(Self { child })
    }

    /// Terminates the engine process. Safe to call more than once.
    pub fn terminate(&mut self) {
        if let Err(err) = self.child.kill() {
            debug!("engine already gone: {err}");
        }
        if let Err(err) = self.child.wait() {
            warn!("failed to reap engine process: {err}");
        }
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_playlist, parse_status};
    use serde_json::json;

    #[test]
    fn test_status_with_current_label() {
        let status = parse_status(&json!({
            "time": 42,
            "length": 180,
            "information": {"category": {"meta": {"title": "123456"}}}
        }));
        assert_eq!(status.label.as_deref(), Some("123456"));
        assert_eq!(status.elapsed, 42);
        assert_eq!(status.total, 180);
    }

    #[test]
    fn test_status_without_information_block() {
        let status = parse_status(&json!({"time": 0, "length": 0}));
        assert_eq!(status.label, None);
    }

    #[test]
    fn test_playlist_entries_in_order() {
        let entries = parse_playlist(&json!({
            "children": [{
                "children": [
                    {"id": "7", "name": "111", "uri": "http://a"},
                    {"id": "9", "name": "222", "uri": "http://b"}
                ]
            }]
        }));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].slot_id, 7);
        assert_eq!(entries[0].label, "111");
        assert_eq!(entries[1].slot_id, 9);
    }

    #[test]
    fn test_empty_playlist_document() {
        assert!(parse_playlist(&serde_json::json!({})).is_empty());
    }
}
