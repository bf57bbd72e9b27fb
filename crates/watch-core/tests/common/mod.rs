#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use watch_core::arbiter::TabArbiter;
use watch_core::monitor::{
    BrowserLauncher, FetchError, FetchLimits, MonitorDeps, Notifier, PageFetcher, Probe,
};
use watch_core::protocol::ChannelId;
use watch_core::schedule::PollScheduler;
use watch_core::stats::StatisticsRecorder;
use watch_core::watchlist::WatchList;

pub fn id(raw: &str) -> ChannelId {
    ChannelId::parse(raw).unwrap()
}

fn padded(body: &str) -> String {
    let mut page = format!("<html><head><script>{body}</script></head><body>");
    while page.len() < 2000 {
        page.push_str("<div class=\"layout\"></div>");
    }
    page.push_str("</body></html>");
    page
}

pub fn live_page() -> String {
    padded(r#"{"@type":"VideoObject","isLiveBroadcast":true}"#)
}

pub fn offline_page() -> String {
    padded(r#"{"stream":null}"#)
}

#[derive(Debug, Clone)]
pub enum Reply {
    Page(String),
    Status(u16),
    Panic,
}

/// Serves whatever was last set per channel; offline page by default.
#[derive(Default)]
pub struct ScriptedFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    absent: Mutex<Vec<String>>,
    fetches: AtomicUsize,
    probes: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn set(&self, channel: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .insert(format!("https://www.twitch.tv/{channel}"), reply);
    }

    pub fn live(&self, channel: &str) {
        self.set(channel, Reply::Page(live_page()));
    }

    pub fn offline(&self, channel: &str) {
        self.set(channel, Reply::Page(offline_page()));
    }

    pub fn mark_absent(&self, channel: &str) {
        self.absent
            .lock()
            .unwrap()
            .push(format!("https://www.twitch.tv/{channel}"));
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _limits: FetchLimits) -> Result<String, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let reply = self.replies.lock().unwrap().get(url).cloned();
        match reply.unwrap_or(Reply::Page(offline_page())) {
            Reply::Page(content) => Ok(content),
            Reply::Status(code) => Err(FetchError::Status(code)),
            Reply::Panic => panic!("scripted fetcher panic"),
        }
    }

    async fn probe(&self, url: &str) -> Probe {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.absent.lock().unwrap().iter().any(|u| u == url) {
            Probe::Absent
        } else {
            Probe::Present
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn titles(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, title: &str, message: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingLauncher {
    pub opened: Mutex<Vec<String>>,
    pub closed: Mutex<Vec<String>>,
}

impl RecordingLauncher {
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserLauncher for RecordingLauncher {
    async fn open(&self, url: &str) -> anyhow::Result<()> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn close(&self, url: &str) -> anyhow::Result<()> {
        self.closed.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

pub struct Harness {
    pub list: Arc<WatchList>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub notifier: Arc<RecordingNotifier>,
    pub launcher: Arc<RecordingLauncher>,
    pub arbiter: Arc<TabArbiter>,
    pub stats: Arc<StatisticsRecorder>,
    pub deps: MonitorDeps,
}

impl Harness {
    pub fn new(channels: &[&str], max_open_tabs: usize) -> Self {
        let list = Arc::new(WatchList::from_ids(channels.iter().map(|c| id(c)), None));
        let fetcher = Arc::new(ScriptedFetcher::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let launcher = Arc::new(RecordingLauncher::default());
        let arbiter = Arc::new(TabArbiter::new(
            list.clone(),
            launcher.clone(),
            max_open_tabs,
        ));
        let stats = Arc::new(StatisticsRecorder::new(None));
        let deps = MonitorDeps {
            fetcher: fetcher.clone(),
            notifier: Some(notifier.clone()),
            arbiter: arbiter.clone(),
            stats: Some(stats.clone()),
            scheduler: PollScheduler::default(),
            limits: FetchLimits::default(),
            use_head_request: true,
        };
        Self {
            list,
            fetcher,
            notifier,
            launcher,
            arbiter,
            stats,
            deps,
        }
    }
}
