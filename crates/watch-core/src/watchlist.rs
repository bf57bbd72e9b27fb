//! The prioritized watch list.
//!
//! One structural lock guards every entry; priority renumbering, tab
//! accounting and status updates each happen inside a single critical
//! section, so readers never see a half-renumbered list or a tab count above
//! the cap.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::protocol::{ChannelId, ChannelIdError, ChannelStatus};

const FILE_HEADER: &str = "\
# Twitch Streamers List (Prioritized)
# One channel per line. Order = priority, first line is checked and opened first.
# Lines starting with # are comments.
";

#[derive(Debug, thiserror::Error)]
pub enum WatchListError {
    #[error(transparent)]
    InvalidId(#[from] ChannelIdError),
    #[error("{0} is already on the watch list")]
    Duplicate(ChannelId),
    #[error("{0} is not on the watch list")]
    NotFound(String),
    #[error("watch list I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WatchEntry {
    pub id: ChannelId,
    /// Dense rank, 0 = highest.  Always equal to the entry's position.
    pub priority: usize,
    pub status: ChannelStatus,
    /// Last confirmed classification.
    pub online: bool,
    pub tab_opened: bool,
    pub last_check_time: i64,
    /// Epoch seconds the current tab was opened, 0 when closed.
    pub online_detected_time: i64,
}

impl WatchEntry {
    fn new(id: ChannelId) -> Self {
        Self {
            id,
            priority: 0,
            status: ChannelStatus::Unknown,
            online: false,
            tab_opened: false,
            last_check_time: 0,
            online_detected_time: 0,
        }
    }

    fn waiting_for_tab(&self) -> bool {
        self.online && !self.tab_opened
    }
}

/// Result of an attempt to claim a tab slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabReservation {
    Opened,
    AlreadyOpen,
    CapacityDenied { open: usize },
    Paused,
    Unknown,
}

#[derive(Debug, Default)]
struct Entries {
    list: Vec<WatchEntry>,
    paused: bool,
    /// Set by structural edits, cleared once the file is rewritten.
    dirty: bool,
}

impl Entries {
    fn position(&self, id: &str) -> Option<usize> {
        self.list.iter().position(|e| e.id.as_str() == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut WatchEntry> {
        self.list.iter_mut().find(|e| e.id.as_str() == id)
    }

    fn renumber(&mut self) {
        for (i, entry) in self.list.iter_mut().enumerate() {
            entry.priority = i;
        }
        self.dirty = true;
    }

    fn open_tabs(&self) -> usize {
        self.list.iter().filter(|e| e.tab_opened).count()
    }

    /// Priority of the `slots`-th online channel, if that many are online.
    fn cutoff(&self, slots: usize) -> Option<usize> {
        // `list` is kept in priority order.
        self.list
            .iter()
            .filter(|e| e.online)
            .nth(slots.max(1) - 1)
            .map(|e| e.priority)
    }

    fn render(&self) -> String {
        let mut out = String::from(FILE_HEADER);
        out.push('\n');
        for entry in &self.list {
            out.push_str(entry.id.as_str());
            out.push('\n');
        }
        out
    }
}

/// Parse watch-list file content.  Returns the valid ids in file order
/// (duplicates dropped) and the rejected lines.
pub fn parse_watch_list(content: &str) -> (Vec<ChannelId>, Vec<String>) {
    let mut ids: Vec<ChannelId> = Vec::new();
    let mut rejected = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match ChannelId::parse(line) {
            Ok(id) if ids.contains(&id) => debug!("duplicate watch list entry {}", id),
            Ok(id) => ids.push(id),
            Err(e) => {
                warn!("skipping watch list line {:?}: {}", line, e);
                rejected.push(line.to_string());
            }
        }
    }

    (ids, rejected)
}

async fn write_file(path: &Path, content: String) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}

pub struct WatchList {
    entries: RwLock<Entries>,
    path: Option<PathBuf>,
}

impl WatchList {
    /// Empty in-memory list; mutations are not persisted.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            path: None,
        }
    }

    pub fn from_ids(ids: impl IntoIterator<Item = ChannelId>, path: Option<PathBuf>) -> Self {
        let mut entries = Entries::default();
        for id in ids {
            if entries.position(id.as_str()).is_none() {
                entries.list.push(WatchEntry::new(id));
            }
        }
        entries.renumber();
        entries.dirty = false;
        Self {
            entries: RwLock::new(entries),
            path,
        }
    }

    /// Load the list stored at `path`; later mutations are saved back there.
    pub fn load(path: &Path) -> Result<Self, WatchListError> {
        let content = std::fs::read_to_string(path)?;
        let (ids, rejected) = parse_watch_list(&content);
        info!(
            "loaded {} channel(s) from {:?} ({} invalid line(s) skipped)",
            ids.len(),
            path,
            rejected.len()
        );
        Ok(Self::from_ids(ids, Some(path.to_path_buf())))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the list back to its file if a structural edit happened since
    /// it was loaded or last saved.  An untouched file keeps its comments.
    async fn save(&self) -> Result<(), WatchListError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = {
            let mut entries = self.entries.write().await;
            if !entries.dirty {
                return Ok(());
            }
            entries.dirty = false;
            entries.render()
        };
        if let Err(e) = write_file(path, content).await {
            self.entries.write().await.dirty = true;
            return Err(e.into());
        }
        debug!("watch list saved to {:?}", path);
        Ok(())
    }

    async fn persist(&self) {
        if let Err(e) = self.save().await {
            warn!("failed to save watch list: {}", e);
        }
    }

    // ---- structural mutations ----

    /// Add a channel at `priority` (clamped), or at the end when `None`.
    pub async fn add_streamer(
        &self,
        raw: &str,
        priority: Option<usize>,
    ) -> Result<ChannelId, WatchListError> {
        let id = ChannelId::parse(raw)?;
        {
            let mut entries = self.entries.write().await;
            if entries.position(id.as_str()).is_some() {
                return Err(WatchListError::Duplicate(id));
            }
            let at = priority.unwrap_or(entries.list.len()).min(entries.list.len());
            entries.list.insert(at, WatchEntry::new(id.clone()));
            entries.renumber();
        }
        info!("added {} to the watch list", id);
        self.persist().await;
        Ok(id)
    }

    /// Remove a channel and return its last entry.  The caller owns closing
    /// any tab it still held.
    pub async fn remove_streamer(&self, id: &str) -> Result<WatchEntry, WatchListError> {
        let removed = {
            let mut entries = self.entries.write().await;
            let pos = entries
                .position(id)
                .ok_or_else(|| WatchListError::NotFound(id.to_string()))?;
            let removed = entries.list.remove(pos);
            entries.renumber();
            removed
        };
        info!("removed {} from the watch list", removed.id);
        self.persist().await;
        Ok(removed)
    }

    /// Swap with the next-higher priority.  No-op at the top.
    pub async fn move_up(&self, id: &str) -> Result<(), WatchListError> {
        {
            let mut entries = self.entries.write().await;
            let pos = entries
                .position(id)
                .ok_or_else(|| WatchListError::NotFound(id.to_string()))?;
            if pos == 0 {
                return Ok(());
            }
            entries.list.swap(pos, pos - 1);
            entries.renumber();
        }
        self.persist().await;
        Ok(())
    }

    /// Swap with the next-lower priority.  No-op at the bottom.
    pub async fn move_down(&self, id: &str) -> Result<(), WatchListError> {
        {
            let mut entries = self.entries.write().await;
            let pos = entries
                .position(id)
                .ok_or_else(|| WatchListError::NotFound(id.to_string()))?;
            if pos + 1 >= entries.list.len() {
                return Ok(());
            }
            entries.list.swap(pos, pos + 1);
            entries.renumber();
        }
        self.persist().await;
        Ok(())
    }

    /// Move a channel to `priority` (clamped to the end of the list).
    pub async fn set_priority(&self, id: &str, priority: usize) -> Result<(), WatchListError> {
        {
            let mut entries = self.entries.write().await;
            let pos = entries
                .position(id)
                .ok_or_else(|| WatchListError::NotFound(id.to_string()))?;
            let entry = entries.list.remove(pos);
            let at = priority.min(entries.list.len());
            entries.list.insert(at, entry);
            entries.renumber();
        }
        self.persist().await;
        Ok(())
    }

    // ---- status ----

    /// Record a status.  `Checking` only touches the display status;
    /// `Online`/`Offline` also update the confirmed flag and check time.
    pub async fn update_status(&self, id: &ChannelId, status: ChannelStatus, now: i64) -> bool {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(id.as_str()) else {
            return false;
        };
        entry.status = status;
        match status {
            ChannelStatus::Online => {
                entry.online = true;
                entry.last_check_time = now;
            }
            ChannelStatus::Offline => {
                entry.online = false;
                entry.last_check_time = now;
            }
            ChannelStatus::Checking | ChannelStatus::Unknown => {}
        }
        true
    }

    // ---- queries ----

    /// Channels to poll this cycle, in priority order.  Once `slots`
    /// channels are online, anything ranked below the last of them is
    /// skipped.
    pub async fn streamers_to_check(&self, slots: usize) -> Vec<ChannelId> {
        let entries = self.entries.read().await;
        let cutoff = entries.cutoff(slots);
        entries
            .list
            .iter()
            .filter(|e| cutoff.map_or(true, |c| e.priority <= c))
            .map(|e| e.id.clone())
            .collect()
    }

    pub async fn should_check(&self, id: &ChannelId, slots: usize) -> bool {
        let entries = self.entries.read().await;
        let Some(entry) = entries.list.iter().find(|e| &e.id == id) else {
            return false;
        };
        entries.cutoff(slots).map_or(true, |c| entry.priority <= c)
    }

    pub async fn online_streamers(&self) -> Vec<ChannelId> {
        let entries = self.entries.read().await;
        entries
            .list
            .iter()
            .filter(|e| e.online)
            .map(|e| e.id.clone())
            .collect()
    }

    pub async fn all_streamers(&self) -> Vec<WatchEntry> {
        self.entries.read().await.list.clone()
    }

    pub async fn entry(&self, id: &str) -> Option<WatchEntry> {
        let entries = self.entries.read().await;
        entries.list.iter().find(|e| e.id.as_str() == id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.entries.read().await.position(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.list.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.list.is_empty()
    }

    pub async fn open_tabs_count(&self) -> usize {
        self.entries.read().await.open_tabs()
    }

    pub async fn is_tab_open(&self, id: &ChannelId) -> bool {
        let entries = self.entries.read().await;
        entries.list.iter().any(|e| &e.id == id && e.tab_opened)
    }

    // ---- tab accounting ----

    pub async fn set_paused(&self, paused: bool) {
        self.entries.write().await.paused = paused;
    }

    pub async fn is_paused(&self) -> bool {
        self.entries.read().await.paused
    }

    /// Claim a tab slot for `id` if fewer than `max_open` are taken.  The
    /// count check and the claim are one critical section.
    pub async fn try_reserve_tab(&self, id: &ChannelId, max_open: usize, now: i64) -> TabReservation {
        let mut entries = self.entries.write().await;
        if entries.paused {
            return TabReservation::Paused;
        }
        let open = entries.open_tabs();
        let Some(entry) = entries.get_mut(id.as_str()) else {
            return TabReservation::Unknown;
        };
        if entry.tab_opened {
            return TabReservation::AlreadyOpen;
        }
        if open >= max_open {
            return TabReservation::CapacityDenied { open };
        }
        entry.tab_opened = true;
        entry.online_detected_time = now;
        TabReservation::Opened
    }

    /// Release `id`'s slot and hand it to the highest-priority channel that
    /// is online without a tab.  At most one channel is promoted.
    ///
    /// Returns whether `id` held a tab, and the promoted channel.
    pub async fn release_tab_and_promote(
        &self,
        id: &ChannelId,
        max_open: usize,
        now: i64,
    ) -> (bool, Option<ChannelId>) {
        let mut entries = self.entries.write().await;
        let released = match entries.get_mut(id.as_str()) {
            Some(entry) if entry.tab_opened => {
                entry.tab_opened = false;
                entry.online_detected_time = 0;
                true
            }
            _ => false,
        };

        if entries.paused || entries.open_tabs() >= max_open {
            return (released, None);
        }

        let promoted = entries
            .list
            .iter_mut()
            .find(|e| &e.id != id && e.waiting_for_tab())
            .map(|e| {
                e.tab_opened = true;
                e.online_detected_time = now;
                e.id.clone()
            });
        (released, promoted)
    }
}

impl Default for WatchList {
    fn default() -> Self {
        Self::new()
    }
}
