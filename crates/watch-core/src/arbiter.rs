use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::monitor::BrowserLauncher;
use crate::platform;
use crate::protocol::ChannelId;
use crate::watchlist::{TabReservation, WatchList};

pub const DEFAULT_MAX_OPEN_TABS: usize = 2;

/// Caps how many online channels hold a browser tab at once.
///
/// Slot accounting lives in the [`WatchList`]; the arbiter drives the
/// launcher once a slot is claimed or freed, always outside the list lock.
pub struct TabArbiter {
    list: Arc<WatchList>,
    launcher: Arc<dyn BrowserLauncher>,
    max_open_tabs: usize,
}

impl TabArbiter {
    pub fn new(list: Arc<WatchList>, launcher: Arc<dyn BrowserLauncher>, max_open_tabs: usize) -> Self {
        Self {
            list,
            launcher,
            max_open_tabs: max_open_tabs.max(1),
        }
    }

    pub fn watch_list(&self) -> &Arc<WatchList> {
        &self.list
    }

    pub fn max_open_tabs(&self) -> usize {
        self.max_open_tabs
    }

    pub async fn open_tabs_count(&self) -> usize {
        self.list.open_tabs_count().await
    }

    pub async fn streamers_to_check(&self) -> Vec<ChannelId> {
        self.list.streamers_to_check(self.max_open_tabs).await
    }

    pub async fn should_check(&self, id: &ChannelId) -> bool {
        self.list.should_check(id, self.max_open_tabs).await
    }

    /// Open a tab for `id` if a slot is free.  A denied request is not
    /// queued.
    pub async fn open_if_capacity(&self, id: &ChannelId, now: i64) -> TabReservation {
        let outcome = self.list.try_reserve_tab(id, self.max_open_tabs, now).await;
        match outcome {
            TabReservation::Opened => {
                let open = self.open_tabs_count().await;
                info!("{}: opening tab ({}/{})", id, open, self.max_open_tabs);
                self.launch(id).await;
            }
            TabReservation::CapacityDenied { open } => {
                warn!(
                    "{}: tab limit reached ({}/{}), not opening",
                    id, open, self.max_open_tabs
                );
            }
            TabReservation::Paused => info!("{}: tab opening paused, not opening", id),
            TabReservation::AlreadyOpen => debug!("{}: tab already open", id),
            TabReservation::Unknown => warn!("{}: not on the watch list, no tab", id),
        }
        outcome
    }

    /// Re-attempt for a channel that is still online without a tab.  Same as
    /// [`open_if_capacity`](Self::open_if_capacity) but denial is not
    /// re-logged as a warning every cycle.
    pub async fn retry_open(&self, id: &ChannelId, now: i64) -> TabReservation {
        let outcome = self.list.try_reserve_tab(id, self.max_open_tabs, now).await;
        if outcome == TabReservation::Opened {
            info!("{}: slot free, opening tab", id);
            self.launch(id).await;
        } else {
            debug!("{}: still waiting for a tab ({:?})", id, outcome);
        }
        outcome
    }

    /// Close `id`'s tab and give the slot to the first waiting online
    /// channel.  Returns the promoted channel.
    pub async fn close_and_promote(&self, id: &ChannelId, now: i64) -> Option<ChannelId> {
        let (released, promoted) = self
            .list
            .release_tab_and_promote(id, self.max_open_tabs, now)
            .await;

        if released {
            info!("{}: closing tab", id);
            if let Err(e) = self.launcher.close(&platform::channel_url(id)).await {
                warn!("{}: failed to close tab: {:#}", id, e);
            }
        }

        if let Some(next) = &promoted {
            info!("{}: promoted into the freed tab slot", next);
            self.launch(next).await;
        }
        promoted
    }

    pub async fn pause_tabs(&self) {
        self.list.set_paused(true).await;
        info!("tab opening paused, channels are still checked");
    }

    pub async fn resume_tabs(&self) {
        self.list.set_paused(false).await;
        info!("tab opening resumed");
    }

    pub async fn is_paused(&self) -> bool {
        self.list.is_paused().await
    }

    async fn launch(&self, id: &ChannelId) {
        if let Err(e) = self.launcher.open(&platform::channel_url(id)).await {
            warn!("{}: failed to open browser: {:#}", id, e);
        }
    }
}
