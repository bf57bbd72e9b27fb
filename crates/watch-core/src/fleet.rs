//! Runs one [`ChannelMonitor`] task per channel.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::arbiter::TabArbiter;
use crate::monitor::{ChannelMonitor, MonitorDeps};
use crate::protocol::{ChannelId, ChannelIdError, ChannelSnapshot, FleetStatus};
use crate::stats::{ChannelStats, StatisticsRecorder};
use crate::watchlist::WatchListError;

/// Delay between consecutive monitor starts.
pub const START_STAGGER: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error(transparent)]
    InvalidId(#[from] ChannelIdError),
    #[error("{0} is already monitored")]
    Duplicate(ChannelId),
    #[error("{0} is not monitored")]
    UnknownChannel(String),
    #[error(transparent)]
    WatchList(#[from] WatchListError),
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<ChannelMonitor>,
}

struct Slot {
    id: ChannelId,
    /// Present while the monitor is not running.
    idle: Option<ChannelMonitor>,
    running: Option<Running>,
}

type SharedSnapshots = Arc<RwLock<Vec<watch::Receiver<ChannelSnapshot>>>>;

pub struct FleetCoordinator {
    deps: MonitorDeps,
    slots: Vec<Slot>,
    /// One receiver per slot, shared with every [`StatusHandle`].
    snapshots: SharedSnapshots,
    stagger: Duration,
}

impl FleetCoordinator {
    pub fn new(deps: MonitorDeps) -> Self {
        Self {
            deps,
            slots: Vec::new(),
            snapshots: Arc::new(RwLock::new(Vec::new())),
            stagger: START_STAGGER,
        }
    }

    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    pub fn arbiter(&self) -> &Arc<TabArbiter> {
        &self.deps.arbiter
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn channels(&self) -> Vec<ChannelId> {
        self.slots.iter().map(|s| s.id.clone()).collect()
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.slots
            .iter()
            .any(|s| s.id.as_str() == id && s.running.is_some())
    }

    /// Validate and register a channel without starting it.  Channels not yet
    /// on the watch list are appended to it.
    pub async fn add_channel(&mut self, raw: &str) -> Result<ChannelId, FleetError> {
        let id = ChannelId::parse(raw)?;
        if self.slots.iter().any(|s| s.id == id) {
            return Err(FleetError::Duplicate(id));
        }

        let list = self.deps.arbiter.watch_list();
        if !list.contains(id.as_str()).await {
            list.add_streamer(id.as_str(), None).await?;
        }

        let monitor = ChannelMonitor::new(id.clone(), self.deps.clone());
        self.snapshots.write().await.push(monitor.subscribe());
        self.slots.push(Slot {
            id: id.clone(),
            idle: Some(monitor),
            running: None,
        });
        info!("{}: registered", id);
        Ok(id)
    }

    /// Spawn every registered monitor that is not already running,
    /// `stagger` apart.
    pub async fn start_all(&mut self) {
        let mut started = 0usize;
        for slot in &mut self.slots {
            let Some(monitor) = slot.idle.take() else {
                continue;
            };
            if started > 0 && !self.stagger.is_zero() {
                tokio::time::sleep(self.stagger).await;
            }
            let cancel = CancellationToken::new();
            let handle = tokio::spawn(monitor.run(cancel.clone()));
            slot.running = Some(Running { cancel, handle });
            started += 1;
        }
        if started > 0 {
            info!("started {} monitor(s)", started);
        }
    }

    /// Signal every running monitor and wait for all of them to return.
    pub async fn stop_all(&mut self) {
        let running: Vec<usize> = (0..self.slots.len())
            .filter(|&i| self.slots[i].running.is_some())
            .collect();

        for &i in &running {
            if let Some(run) = &self.slots[i].running {
                run.cancel.cancel();
            }
        }
        for &i in &running {
            Self::join(&mut self.slots[i]).await;
        }

        if !running.is_empty() {
            info!("stopped {} monitor(s)", running.len());
        }
    }

    /// Stop (if running) and forget one channel, releasing its tab.
    pub async fn remove_channel(&mut self, id: &str) -> Result<(), FleetError> {
        let pos = self
            .slots
            .iter()
            .position(|s| s.id.as_str() == id)
            .ok_or_else(|| FleetError::UnknownChannel(id.to_string()))?;

        if let Some(run) = &self.slots[pos].running {
            run.cancel.cancel();
        }
        Self::join(&mut self.slots[pos]).await;
        let slot = self.slots.remove(pos);
        self.snapshots
            .write()
            .await
            .retain(|rx| rx.borrow().id != slot.id);

        let arbiter = Arc::clone(&self.deps.arbiter);
        if arbiter.watch_list().is_tab_open(&slot.id).await {
            arbiter
                .close_and_promote(&slot.id, chrono::Utc::now().timestamp())
                .await;
        }
        arbiter.watch_list().remove_streamer(slot.id.as_str()).await?;
        info!("{}: removed", slot.id);
        Ok(())
    }

    /// Cloneable read-only view for reporting.  It follows later
    /// `add_channel` and `remove_channel` calls.
    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle {
            arbiter: Arc::clone(&self.deps.arbiter),
            stats: self.deps.stats.clone(),
            snapshots: Arc::clone(&self.snapshots),
        }
    }

    pub async fn status(&self) -> FleetStatus {
        self.status_handle().status().await
    }

    async fn join(slot: &mut Slot) {
        let Some(run) = slot.running.take() else {
            return;
        };
        match run.handle.await {
            Ok(monitor) => slot.idle = Some(monitor),
            Err(e) => error!("{}: monitor task failed: {}", slot.id, e),
        }
    }
}

impl Drop for FleetCoordinator {
    fn drop(&mut self) {
        for slot in &self.slots {
            if let Some(run) = &slot.running {
                run.cancel.cancel();
            }
        }
    }
}

#[derive(Clone)]
pub struct StatusHandle {
    arbiter: Arc<TabArbiter>,
    stats: Option<Arc<StatisticsRecorder>>,
    snapshots: SharedSnapshots,
}

impl StatusHandle {
    pub async fn status(&self) -> FleetStatus {
        let latest: Vec<ChannelSnapshot> = self
            .snapshots
            .read()
            .await
            .iter()
            .map(|rx| rx.borrow().clone())
            .collect();

        let list = self.arbiter.watch_list();
        let mut channels = Vec::with_capacity(latest.len());
        for mut snapshot in latest {
            // The list is authoritative for rank and tab; both can change
            // outside the owning monitor.
            if let Some(entry) = list.entry(snapshot.id.as_str()).await {
                snapshot.priority_index = entry.priority;
                snapshot.tab_opened = entry.tab_opened;
            }
            channels.push(snapshot);
        }
        channels.sort_by_key(|s| s.priority_index);

        FleetStatus {
            channels,
            open_tabs: self.arbiter.open_tabs_count().await,
            max_open_tabs: self.arbiter.max_open_tabs(),
            tabs_paused: self.arbiter.is_paused().await,
        }
    }

    /// Counters for a monitored channel; `None` when unknown or statistics
    /// are disabled.
    pub async fn channel_stats(&self, id: &str) -> Option<ChannelStats> {
        let stats = self.stats.as_ref()?;
        let id = self
            .snapshots
            .read()
            .await
            .iter()
            .map(|rx| rx.borrow().id.clone())
            .find(|known| known.as_str() == id)?;
        Some(stats.snapshot(&id).await)
    }
}
