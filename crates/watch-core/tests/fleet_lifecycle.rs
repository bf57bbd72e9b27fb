mod common;

use std::time::Duration;

use common::{id, Harness};
use watch_core::fleet::{FleetCoordinator, FleetError};
use watch_core::protocol::ChannelStatus;

#[tokio::test(start_paused = true)]
async fn start_poll_and_stop() {
    let h = Harness::new(&[], 2);
    h.fetcher.live("alpha");
    let mut fleet = FleetCoordinator::new(h.deps.clone());

    fleet.add_channel("alpha").await.unwrap();
    fleet.add_channel("beta").await.unwrap();
    assert_eq!(h.list.len().await, 2);
    assert!(!fleet.is_running("alpha"));

    fleet.start_all().await;
    assert!(fleet.is_running("alpha"));
    assert!(fleet.is_running("beta"));

    tokio::time::sleep(Duration::from_secs(45)).await;

    let status = fleet.status().await;
    assert_eq!(status.channels.len(), 2);
    assert_eq!(status.open_tabs, 1);
    assert_eq!(status.max_open_tabs, 2);
    assert_eq!(status.channels[0].id, id("alpha"));
    assert_eq!(status.channels[0].status, ChannelStatus::Online);
    assert!(status.channels[0].tab_opened);
    assert!(status.channels[0].checks_completed >= 2);
    assert_eq!(status.channels[1].status, ChannelStatus::Offline);

    fleet.stop_all().await;
    assert!(!fleet.is_running("alpha"));
    let fetched = h.fetcher.fetches();

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.fetcher.fetches(), fetched);

    // One Online edge, however many cycles saw it live.
    assert_eq!(h.notifier.titles(), vec!["Stream Started!"]);
    assert_eq!(h.stats.snapshot(&id("alpha")).await.online_detections, 1);
}

#[tokio::test(start_paused = true)]
async fn restart_keeps_monitor_state() {
    let h = Harness::new(&[], 2);
    h.fetcher.live("alpha");
    let mut fleet = FleetCoordinator::new(h.deps.clone());
    fleet.add_channel("alpha").await.unwrap();

    fleet.start_all().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    fleet.stop_all().await;

    fleet.start_all().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    fleet.stop_all().await;

    // The second run saw the channel as already online.
    assert_eq!(h.notifier.titles(), vec!["Stream Started!"]);
    assert_eq!(h.launcher.opened().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn remove_running_channel_releases_its_tab() {
    let h = Harness::new(&[], 1);
    h.fetcher.live("alpha");
    let mut fleet = FleetCoordinator::new(h.deps.clone()).with_stagger(Duration::ZERO);
    fleet.add_channel("beta").await.unwrap();
    fleet.add_channel("alpha").await.unwrap();
    h.list.move_up("alpha").await.unwrap();

    fleet.start_all().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.list.entry("alpha").await.unwrap().tab_opened);

    // beta is below the cutoff while alpha holds the single slot.
    h.fetcher.live("beta");

    fleet.remove_channel("alpha").await.unwrap();
    assert_eq!(fleet.len(), 1);
    assert!(!h.list.contains("alpha").await);
    assert_eq!(h.launcher.closed(), vec!["https://www.twitch.tv/alpha"]);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(h.list.entry("beta").await.unwrap().tab_opened);
    fleet.stop_all().await;
}

#[tokio::test]
async fn add_rejects_invalid_and_duplicate_ids() {
    let h = Harness::new(&["listed"], 2);
    let mut fleet = FleetCoordinator::new(h.deps.clone());

    assert!(matches!(
        fleet.add_channel("bad name!").await,
        Err(FleetError::InvalidId(_))
    ));
    // Already on the watch list but not yet monitored: accepted.
    fleet.add_channel("listed").await.unwrap();
    assert!(matches!(
        fleet.add_channel("listed").await,
        Err(FleetError::Duplicate(_))
    ));
    assert!(matches!(
        fleet.remove_channel("missing").await,
        Err(FleetError::UnknownChannel(_))
    ));
    assert_eq!(fleet.len(), 1);
    assert_eq!(h.list.len().await, 1);
}

#[tokio::test]
async fn status_handle_follows_later_changes() {
    let h = Harness::new(&[], 2);
    let mut fleet = FleetCoordinator::new(h.deps.clone());
    fleet.add_channel("alpha").await.unwrap();
    let handle = fleet.status_handle();

    fleet.add_channel("beta").await.unwrap();
    fleet.remove_channel("alpha").await.unwrap();

    let ids: Vec<_> = handle
        .status()
        .await
        .channels
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec![id("beta")]);
    assert!(handle.channel_stats("alpha").await.is_none());
    assert!(handle.channel_stats("beta").await.is_some());
}
