//! Per-channel check counters and live-session history.
//!
//! One JSON document per channel (`stats_<id>.json`):
//!
//! ```text
//! { "streamer", "total_checks", "online_detections", "offline_detections",
//!   "total_check_time", "fastest_check", "slowest_check",
//!   "sessions": [ { "start_time", "end_time", "duration" } ] }
//! ```
//!
//! Times are epoch seconds, check durations milliseconds.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::platform;
use crate::protocol::ChannelId;

pub const MAX_SESSIONS_HISTORY: usize = 1000;

/// Initial value of the fastest check; only ever lowered.
pub const FASTEST_CHECK_SENTINEL: u64 = 999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSession {
    #[serde(rename = "start_time")]
    pub start_epoch: i64,
    #[serde(rename = "end_time")]
    pub end_epoch: i64,
    #[serde(rename = "duration")]
    pub duration_seconds: i64,
}

impl StreamSession {
    /// Builds a session, clamping `end` so it never precedes `start`.
    pub fn new(start_epoch: i64, end_epoch: i64) -> Self {
        let end_epoch = end_epoch.max(start_epoch);
        Self {
            start_epoch,
            end_epoch,
            duration_seconds: end_epoch - start_epoch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub streamer: ChannelId,
    #[serde(default)]
    pub total_checks: u64,
    #[serde(default)]
    pub online_detections: u64,
    #[serde(default)]
    pub offline_detections: u64,
    #[serde(rename = "total_check_time", default)]
    pub total_check_time_ms: u64,
    #[serde(rename = "fastest_check", with = "fastest_on_disk", default = "fastest_default")]
    pub fastest_check_ms: u64,
    #[serde(rename = "slowest_check", default)]
    pub slowest_check_ms: u64,
    #[serde(default)]
    pub sessions: VecDeque<StreamSession>,
    /// Epoch seconds the open session started, 0 when none is open.
    #[serde(skip)]
    pub current_session_start: i64,
}

fn fastest_default() -> u64 {
    FASTEST_CHECK_SENTINEL
}

/// The sentinel is written as 0 ("no checks yet") and read back as the
/// sentinel so a reloaded file keeps lowering correctly.
mod fastest_on_disk {
    use super::FASTEST_CHECK_SENTINEL;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(if *value == FASTEST_CHECK_SENTINEL { 0 } else { *value })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let raw = u64::deserialize(d)?;
        Ok(if raw == 0 { FASTEST_CHECK_SENTINEL } else { raw })
    }
}

impl ChannelStats {
    pub fn new(streamer: ChannelId) -> Self {
        Self {
            streamer,
            total_checks: 0,
            online_detections: 0,
            offline_detections: 0,
            total_check_time_ms: 0,
            fastest_check_ms: FASTEST_CHECK_SENTINEL,
            slowest_check_ms: 0,
            sessions: VecDeque::new(),
            current_session_start: 0,
        }
    }

    pub fn record_check(&mut self, elapsed_ms: u64) {
        self.total_checks += 1;
        self.total_check_time_ms = self.total_check_time_ms.saturating_add(elapsed_ms);
        self.fastest_check_ms = self.fastest_check_ms.min(elapsed_ms);
        self.slowest_check_ms = self.slowest_check_ms.max(elapsed_ms);
    }

    /// Offline→Online edge.  Opens a session unless one is already open.
    pub fn record_online(&mut self, now: i64) {
        self.online_detections += 1;
        if self.current_session_start == 0 {
            self.current_session_start = now.max(1);
        }
    }

    /// Online→Offline edge.  Closes the open session, if any, and returns it.
    pub fn record_offline(&mut self, now: i64, max_sessions: usize) -> Option<StreamSession> {
        self.offline_detections += 1;
        if self.current_session_start == 0 {
            return None;
        }
        let session = StreamSession::new(self.current_session_start, now);
        self.current_session_start = 0;
        self.sessions.push_back(session);
        while self.sessions.len() > max_sessions {
            self.sessions.pop_front();
        }
        Some(session)
    }

    pub fn average_check_ms(&self) -> u64 {
        if self.total_checks == 0 {
            0
        } else {
            self.total_check_time_ms / self.total_checks
        }
    }

    pub fn fastest_check(&self) -> u64 {
        if self.fastest_check_ms == FASTEST_CHECK_SENTINEL {
            0
        } else {
            self.fastest_check_ms
        }
    }

    pub fn total_stream_secs(&self) -> i64 {
        self.sessions.iter().map(|s| s.duration_seconds).sum()
    }

    pub fn average_stream_secs(&self) -> i64 {
        if self.sessions.is_empty() {
            0
        } else {
            self.total_stream_secs() / self.sessions.len() as i64
        }
    }

    pub fn longest_stream_secs(&self) -> i64 {
        self.sessions
            .iter()
            .map(|s| s.duration_seconds)
            .max()
            .unwrap_or(0)
    }

    pub fn shortest_stream_secs(&self) -> i64 {
        self.sessions
            .iter()
            .map(|s| s.duration_seconds)
            .min()
            .unwrap_or(0)
    }

    /// Boxed text report printed by `--stats`.
    pub fn summary(&self) -> String {
        const WIDTH: usize = 60;
        let mut out = String::new();
        let rule = "═".repeat(WIDTH + 2);
        let mut row = |label: &str, value: String| {
            let _ = writeln!(out, "║ {:<32}{:>28} ║", label, value);
        };

        let mut head = String::new();
        let _ = writeln!(head, "╔{}╗", rule);
        let _ = writeln!(head, "║ {:<60} ║", format!("Statistics for {}", self.streamer));
        let _ = writeln!(head, "╠{}╣", rule);

        row("Total checks performed:", self.total_checks.to_string());
        row("Online detections:", self.online_detections.to_string());
        row("Offline detections:", self.offline_detections.to_string());
        row("Average check time:", format!("{} ms", self.average_check_ms()));
        row("Fastest check:", format!("{} ms", self.fastest_check()));
        row("Slowest check:", format!("{} ms", self.slowest_check_ms));
        row("Total streams recorded:", self.sessions.len().to_string());
        if !self.sessions.is_empty() {
            row("Total stream time:", hours_minutes(self.total_stream_secs()));
            row("Average stream duration:", hours_minutes(self.average_stream_secs()));
            row("Longest stream:", hours_minutes(self.longest_stream_secs()));
            row("Shortest stream:", hours_minutes(self.shortest_stream_secs()));
        }
        let _ = writeln!(out, "╚{}╝", rule);

        head + &out
    }

    pub fn load_file(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
        let stats = serde_json::from_str(&content).with_context(|| format!("parsing {:?}", path))?;
        Ok(stats)
    }
}

fn hours_minutes(secs: i64) -> String {
    format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
}

/// Shared statistics for every monitored channel.
///
/// Each mutation is its own short critical section; file writes happen
/// after the lock is released.
pub struct StatisticsRecorder {
    dir: Option<PathBuf>,
    max_sessions: usize,
    channels: Mutex<HashMap<ChannelId, ChannelStats>>,
}

impl StatisticsRecorder {
    /// Recorder persisting under `dir`.  `None` keeps everything in memory.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            max_sessions: MAX_SESSIONS_HISTORY,
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Recorder rooted at the platform stats directory.
    pub fn persistent() -> Self {
        Self::new(Some(platform::stats_dir()))
    }

    pub async fn record_check(&self, id: &ChannelId, elapsed_ms: u64) {
        self.ensure_loaded(id).await;
        let mut channels = self.channels.lock().await;
        entry(&mut channels, id).record_check(elapsed_ms);
    }

    pub async fn record_online(&self, id: &ChannelId, now: i64) {
        self.ensure_loaded(id).await;
        let mut channels = self.channels.lock().await;
        entry(&mut channels, id).record_online(now);
    }

    pub async fn record_offline(&self, id: &ChannelId, now: i64) -> Option<StreamSession> {
        self.ensure_loaded(id).await;
        let (session, snapshot) = {
            let mut channels = self.channels.lock().await;
            let stats = entry(&mut channels, id);
            let session = stats.record_offline(now, self.max_sessions);
            (session, session.map(|_| stats.clone()))
        };

        if let (Some(session), Some(stats)) = (session, snapshot) {
            info!(
                "{}: session closed after {}s",
                id, session.duration_seconds
            );
            self.persist(&stats).await;
        }
        session
    }

    pub async fn snapshot(&self, id: &ChannelId) -> ChannelStats {
        self.ensure_loaded(id).await;
        let mut channels = self.channels.lock().await;
        entry(&mut channels, id).clone()
    }

    /// Write every known channel to disk.
    pub async fn flush(&self) {
        let all: Vec<ChannelStats> = {
            let channels = self.channels.lock().await;
            channels.values().cloned().collect()
        };
        for stats in &all {
            self.persist(stats).await;
        }
    }

    /// Read a channel's file on first use.  The file is read without holding
    /// the channel map lock; if another task got there first its entry wins.
    async fn ensure_loaded(&self, id: &ChannelId) {
        if self.channels.lock().await.contains_key(id) {
            return;
        }
        let loaded = self.load_or_new(id).await;
        self.channels.lock().await.entry(id.clone()).or_insert(loaded);
    }

    async fn load_or_new(&self, id: &ChannelId) -> ChannelStats {
        let Some(dir) = &self.dir else {
            return ChannelStats::new(id.clone());
        };
        let path = platform::stats_file(dir, id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ChannelStats::new(id.clone());
            }
            Err(e) => {
                warn!("{}: could not read statistics {:?}: {}", id, path, e);
                return ChannelStats::new(id.clone());
            }
        };
        match serde_json::from_str::<ChannelStats>(&content) {
            Ok(mut stats) if stats.streamer == *id => {
                while stats.sessions.len() > self.max_sessions {
                    stats.sessions.pop_front();
                }
                debug!("{}: loaded statistics from {:?}", id, path);
                stats
            }
            Ok(_) => {
                warn!("{:?} belongs to another channel, starting fresh", path);
                ChannelStats::new(id.clone())
            }
            Err(e) => {
                warn!("{}: could not parse statistics {:?}: {}", id, path, e);
                ChannelStats::new(id.clone())
            }
        }
    }

    async fn persist(&self, stats: &ChannelStats) {
        let Some(dir) = &self.dir else {
            return;
        };
        if let Err(e) = save_stats(dir, stats).await {
            warn!("{}: failed to save statistics: {:#}", stats.streamer, e);
        }
    }
}

fn entry<'a>(
    channels: &'a mut HashMap<ChannelId, ChannelStats>,
    id: &ChannelId,
) -> &'a mut ChannelStats {
    channels
        .entry(id.clone())
        .or_insert_with(|| ChannelStats::new(id.clone()))
}

async fn save_stats(dir: &Path, stats: &ChannelStats) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let json = serde_json::to_string_pretty(stats)?;
    tokio::fs::write(platform::stats_file(dir, &stats.streamer), json).await?;
    Ok(())
}
