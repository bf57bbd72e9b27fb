//! Per-channel poll loop and its transition logic.
//!
//! A monitor owns its [`ChannelSnapshot`] and publishes a copy through a
//! `watch` channel after every change.  Shared state it touches (watch list,
//! statistics) is behind the locks of those types; a cycle never holds one
//! across a fetch.

use async_trait::async_trait;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::arbiter::TabArbiter;
use crate::classifier::{self, Classification};
use crate::platform;
use crate::protocol::{ChannelId, ChannelSnapshot, ChannelStatus};
use crate::schedule::PollScheduler;
use crate::stats::StatisticsRecorder;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
}

/// Per-request bounds handed to the fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub max_bytes: usize,
    pub timeout: Duration,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            max_bytes: 100_000,
            timeout: Duration::from_secs(20),
        }
    }
}

/// Outcome of the cheap existence probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Present,
    Absent,
    Unknown,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Download at most `limits.max_bytes` of the page.  Non-success
    /// responses are errors.
    async fn fetch(&self, url: &str, limits: FetchLimits) -> Result<String, FetchError>;

    async fn probe(&self, _url: &str) -> Probe {
        Probe::Unknown
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, message: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn open(&self, url: &str) -> anyhow::Result<()>;
    async fn close(&self, url: &str) -> anyhow::Result<()>;
}

/// Edge between the previous and current confirmed classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    WentOnline,
    WentOffline,
    StillOnline,
    StillOffline,
}

impl Transition {
    pub fn between(was_online: bool, is_online: bool) -> Self {
        match (was_online, is_online) {
            (false, true) => Self::WentOnline,
            (true, false) => Self::WentOffline,
            (true, true) => Self::StillOnline,
            (false, false) => Self::StillOffline,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Ranked below the cutoff while tab capacity is saturated.
    Skipped,
    Checked {
        transition: Transition,
        elapsed_ms: u64,
    },
}

/// Everything a monitor shares with the rest of the fleet.
#[derive(Clone)]
pub struct MonitorDeps {
    pub fetcher: Arc<dyn PageFetcher>,
    /// `None` disables notifications.
    pub notifier: Option<Arc<dyn Notifier>>,
    pub arbiter: Arc<TabArbiter>,
    /// `None` disables statistics.
    pub stats: Option<Arc<StatisticsRecorder>>,
    pub scheduler: PollScheduler,
    pub limits: FetchLimits,
    pub use_head_request: bool,
}

pub struct ChannelMonitor {
    id: ChannelId,
    url: String,
    deps: MonitorDeps,
    state: ChannelSnapshot,
    publisher: watch::Sender<ChannelSnapshot>,
}

impl ChannelMonitor {
    pub fn new(id: ChannelId, deps: MonitorDeps) -> Self {
        let state = ChannelSnapshot::new(id.clone());
        let (publisher, _) = watch::channel(state.clone());
        Self {
            url: platform::channel_url(&id),
            id,
            deps,
            state,
            publisher,
        }
    }

    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    pub fn state(&self) -> &ChannelSnapshot {
        &self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelSnapshot> {
        self.publisher.subscribe()
    }

    /// Poll until `cancel` fires.  A stop request interrupts the sleep
    /// between cycles but never an in-flight fetch.  Returns the monitor so
    /// it can be restarted with its state intact.
    pub async fn run(mut self, cancel: CancellationToken) -> Self {
        info!("{}: monitoring started ({})", self.id, self.url);

        while !cancel.is_cancelled() {
            self.poll_once(chrono::Utc::now().timestamp()).await;

            let wait = self
                .deps
                .scheduler
                .next_interval(self.state.last_online_timestamp, chrono::Utc::now().timestamp());
            debug!("{}: next check in {}s", self.id, wait.as_secs());

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!("{}: monitoring stopped", self.id);
        self
    }

    /// One full cycle at epoch time `now`.
    pub async fn poll_once(&mut self, now: i64) -> CycleOutcome {
        let arbiter = Arc::clone(&self.deps.arbiter);
        let list = Arc::clone(arbiter.watch_list());

        if !arbiter.should_check(&self.id).await {
            debug!("{}: below the priority cutoff, skipping", self.id);
            return CycleOutcome::Skipped;
        }

        self.state.status = ChannelStatus::Checking;
        list.update_status(&self.id, ChannelStatus::Checking, now).await;
        self.publish(&list).await;

        let started = Instant::now();
        let observed = AssertUnwindSafe(self.observe()).catch_unwind().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let online_now = match observed {
            Ok(Ok(classification)) => classification.is_live(),
            Ok(Err(e)) => {
                warn!("{}: check failed, treating as offline: {}", self.id, e);
                false
            }
            Err(_) => {
                error!("{}: check panicked, treating as offline", self.id);
                false
            }
        };

        if let Some(stats) = &self.deps.stats {
            stats.record_check(&self.id, elapsed_ms).await;
        }

        // The list sees the new status before any tab decision is made, so
        // promotion and cutoff use this cycle's answer.
        let status = ChannelStatus::from_live(online_now);
        list.update_status(&self.id, status, now).await;

        let transition = Transition::between(self.state.was_online_before, online_now);
        self.apply(transition, now).await;

        self.state.status = status;
        self.state.last_check_time = now;
        self.state.checks_completed += 1;
        self.publish(&list).await;

        CycleOutcome::Checked {
            transition,
            elapsed_ms,
        }
    }

    async fn observe(&self) -> Result<Classification, FetchError> {
        if self.deps.use_head_request && self.deps.fetcher.probe(&self.url).await == Probe::Absent {
            info!("{}: channel page does not exist", self.id);
            return Ok(Classification::Offline);
        }
        let content = self.deps.fetcher.fetch(&self.url, self.deps.limits).await?;
        Ok(classifier::classify_logged(self.id.as_str(), &content))
    }

    async fn apply(&mut self, transition: Transition, now: i64) {
        let arbiter = Arc::clone(&self.deps.arbiter);
        match transition {
            Transition::WentOnline => {
                info!("{}: went ONLINE", self.id);
                if let Some(stats) = &self.deps.stats {
                    stats.record_online(&self.id, now).await;
                }
                self.notify("Stream Started!", &format!("{} is now live on Twitch!", self.id))
                    .await;
                arbiter.open_if_capacity(&self.id, now).await;
                self.state.last_online_timestamp = now;
                self.state.was_online_before = true;
            }
            Transition::WentOffline => {
                info!("{}: went OFFLINE", self.id);
                if let Some(stats) = &self.deps.stats {
                    stats.record_offline(&self.id, now).await;
                }
                self.notify("Stream Ended", &format!("{} has gone offline.", self.id))
                    .await;
                arbiter.close_and_promote(&self.id, now).await;
                self.state.was_online_before = false;
            }
            Transition::StillOnline => {
                self.state.last_online_timestamp = now;
                if !arbiter.watch_list().is_tab_open(&self.id).await {
                    arbiter.retry_open(&self.id, now).await;
                }
            }
            Transition::StillOffline => {}
        }
    }

    async fn notify(&self, title: &str, message: &str) {
        let Some(notifier) = &self.deps.notifier else {
            return;
        };
        if let Err(e) = notifier.notify(title, message).await {
            warn!("{}: notification failed: {:#}", self.id, e);
        }
    }

    async fn publish(&mut self, list: &crate::watchlist::WatchList) {
        if let Some(entry) = list.entry(self.id.as_str()).await {
            self.state.tab_opened = entry.tab_opened;
            self.state.priority_index = entry.priority;
        }
        self.publisher.send_replace(self.state.clone());
    }
}
