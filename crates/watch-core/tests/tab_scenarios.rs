mod common;

use std::sync::Arc;

use common::{id, Harness};
use watch_core::monitor::{ChannelMonitor, CycleOutcome};
use watch_core::protocol::ChannelStatus;
use watch_core::watchlist::{TabReservation, WatchListError};

const T0: i64 = 1_700_000_000;

#[tokio::test]
async fn cap_denies_third_channel_then_promotes_it() {
    let h = Harness::new(&["a", "b", "c"], 2);
    let mut a = ChannelMonitor::new(id("a"), h.deps.clone());

    h.fetcher.live("a");
    a.poll_once(T0).await;
    assert_eq!(h.arbiter.open_tabs_count().await, 1);

    h.list.update_status(&id("b"), ChannelStatus::Online, T0 + 1).await;
    assert_eq!(
        h.arbiter.open_if_capacity(&id("b"), T0 + 1).await,
        TabReservation::Opened
    );
    assert_eq!(h.arbiter.open_tabs_count().await, 2);

    h.list.update_status(&id("c"), ChannelStatus::Online, T0 + 2).await;
    assert_eq!(
        h.arbiter.open_if_capacity(&id("c"), T0 + 2).await,
        TabReservation::CapacityDenied { open: 2 }
    );
    assert!(!h.list.entry("c").await.unwrap().tab_opened);
    assert_eq!(h.arbiter.open_tabs_count().await, 2);

    h.fetcher.offline("a");
    a.poll_once(T0 + 3).await;
    assert!(!h.list.entry("a").await.unwrap().tab_opened);
    assert!(h.list.entry("c").await.unwrap().tab_opened);
    assert_eq!(h.arbiter.open_tabs_count().await, 2);

    assert_eq!(
        h.launcher.opened(),
        vec![
            "https://www.twitch.tv/a",
            "https://www.twitch.tv/b",
            "https://www.twitch.tv/c",
        ]
    );
    assert_eq!(h.launcher.closed(), vec!["https://www.twitch.tv/a"]);
}

#[tokio::test]
async fn higher_priority_latecomer_waits_for_a_slot() {
    let h = Harness::new(&["a", "b", "c"], 2);
    let mut a = ChannelMonitor::new(id("a"), h.deps.clone());
    let mut b = ChannelMonitor::new(id("b"), h.deps.clone());
    let mut c = ChannelMonitor::new(id("c"), h.deps.clone());

    h.fetcher.live("c");
    h.fetcher.live("b");
    c.poll_once(T0).await;
    b.poll_once(T0).await;

    h.fetcher.live("a");
    assert!(matches!(a.poll_once(T0 + 1).await, CycleOutcome::Checked { .. }));
    assert!(a.state().was_online_before);
    assert!(!a.state().tab_opened);

    // While paused the freed slot is not handed over.
    h.arbiter.pause_tabs().await;
    h.fetcher.offline("b");
    b.poll_once(T0 + 10).await;
    assert_eq!(h.arbiter.open_tabs_count().await, 1);
    a.poll_once(T0 + 10).await;
    assert!(!a.state().tab_opened);

    // The waiting channel claims it on its next cycle after resume.
    h.arbiter.resume_tabs().await;
    a.poll_once(T0 + 20).await;
    assert!(a.state().tab_opened);
    assert_eq!(h.arbiter.open_tabs_count().await, 2);
    assert_eq!(h.notifier.titles().len(), 4);
}

#[tokio::test]
async fn saturated_capacity_skips_lower_priorities() {
    let h = Harness::new(&["a", "b", "c"], 2);
    let mut a = ChannelMonitor::new(id("a"), h.deps.clone());
    let mut b = ChannelMonitor::new(id("b"), h.deps.clone());
    let mut c = ChannelMonitor::new(id("c"), h.deps.clone());

    h.fetcher.live("a");
    h.fetcher.live("b");
    a.poll_once(T0).await;
    b.poll_once(T0).await;

    assert_eq!(c.poll_once(T0 + 1).await, CycleOutcome::Skipped);
    assert_eq!(h.arbiter.streamers_to_check().await, vec![id("a"), id("b")]);

    h.fetcher.offline("b");
    b.poll_once(T0 + 2).await;
    assert!(matches!(c.poll_once(T0 + 3).await, CycleOutcome::Checked { .. }));
}

#[tokio::test]
async fn invalid_id_is_rejected() {
    let h = Harness::new(&["a"], 2);
    let err = h.list.add_streamer("bad name!", None).await.unwrap_err();
    assert!(matches!(err, WatchListError::InvalidId(_)));
    assert_eq!(h.list.len().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_online_transitions_never_exceed_cap() {
    let names: Vec<String> = (0..16).map(|i| format!("chan_{i}")).collect();
    let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
    let h = Harness::new(&refs, 2);

    let mut tasks = Vec::new();
    for name in &names {
        let arbiter = Arc::clone(&h.arbiter);
        let list = Arc::clone(&h.list);
        let channel = id(name);
        tasks.push(tokio::spawn(async move {
            list.update_status(&channel, ChannelStatus::Online, T0).await;
            let outcome = arbiter.open_if_capacity(&channel, T0).await;
            assert!(arbiter.open_tabs_count().await <= 2);
            outcome
        }));
    }

    let mut opened = 0;
    for task in tasks {
        if task.await.unwrap() == TabReservation::Opened {
            opened += 1;
        }
    }
    assert_eq!(opened, 2);
    assert_eq!(h.arbiter.open_tabs_count().await, 2);
    assert_eq!(h.launcher.opened().len(), 2);
}
