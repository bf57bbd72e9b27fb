mod browser;
mod fetch;
mod http;
mod notify;

use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use watch_core::arbiter::TabArbiter;
use watch_core::config::Config;
use watch_core::fleet::FleetCoordinator;
use watch_core::monitor::{MonitorDeps, Notifier};
use watch_core::platform;
use watch_core::protocol::ChannelId;
use watch_core::schedule::PollScheduler;
use watch_core::stats::{ChannelStats, StatisticsRecorder};
use watch_core::watchlist::WatchList;

use crate::browser::SystemBrowser;
use crate::fetch::HttpFetcher;
use crate::notify::SystemNotifier;

#[derive(Parser, Debug)]
#[command(
    name = "streamwatch",
    version,
    about = "Watches Twitch channels and opens them when they go live",
    after_help = "Examples:\n  streamwatch somechannel\n  streamwatch somechannel ./config.ini\n  streamwatch --multi\n  streamwatch --multi ./streamers.txt\n  streamwatch --stats somechannel"
)]
struct Cli {
    /// Channel to watch
    channel: Option<String>,

    /// Config file for single-channel mode
    config: Option<PathBuf>,

    /// Watch every channel in a watch list (default: streamers.txt in the config directory)
    #[arg(long, value_name = "FILE", num_args = 0..=1, conflicts_with_all = ["channel", "stats"])]
    multi: Option<Option<PathBuf>>,

    /// Print recorded statistics for a channel and exit
    #[arg(long, value_name = "ID", conflicts_with = "channel")]
    stats: Option<String>,

    /// Keep checking but never open tabs
    #[arg(long)]
    check_only: bool,
}

#[derive(Debug, PartialEq)]
enum Mode {
    Single {
        channel: String,
        config: Option<PathBuf>,
    },
    Multi {
        list: PathBuf,
    },
    Stats {
        channel: String,
    },
}

impl Cli {
    fn mode(&self) -> anyhow::Result<Mode> {
        if let Some(channel) = &self.stats {
            return Ok(Mode::Stats {
                channel: channel.clone(),
            });
        }
        if let Some(list) = &self.multi {
            return Ok(Mode::Multi {
                list: list.clone().unwrap_or_else(platform::default_watch_list_path),
            });
        }
        match &self.channel {
            Some(channel) => Ok(Mode::Single {
                channel: channel.clone(),
                config: self.config.clone(),
            }),
            None => bail!("no channel given (see --help)"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    match cli.mode()? {
        Mode::Stats { channel } => show_stats(&channel),
        Mode::Single { channel, config } => {
            let id = ChannelId::parse(&channel)?;
            let (config, warnings) = match config {
                Some(path) => Config::load_from(&path)?,
                None => Config::load()?,
            };
            init_tracing(&config, &warnings)?;
            let list = Arc::new(WatchList::from_ids([id], None));
            watch(config, list, cli.check_only).await
        }
        Mode::Multi { list } => {
            let (config, warnings) = Config::load()?;
            init_tracing(&config, &warnings)?;
            let watch_list = WatchList::load(&list)
                .with_context(|| format!("failed to read watch list {:?}", list))?;
            if watch_list.is_empty().await {
                bail!("no valid channels in {:?}", list);
            }
            watch(config, Arc::new(watch_list), cli.check_only).await
        }
    }
}

/// Install the log subscriber, then report what config loading ran into.
fn init_tracing(config: &Config, config_warnings: &[String]) -> anyhow::Result<()> {
    let log_path = platform::resolve_log_path(&config.log_file);
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {:?}", log_path))?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let console_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);

    let default_filter = if config.verbose_logging {
        "info,watch_core=debug,streamwatch=debug"
    } else {
        "info,watch_core=info,streamwatch=info"
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    info!("Log file: {:?}", log_path);
    for warning in config_warnings {
        warn!("{}", warning);
    }
    Ok(())
}

fn show_stats(channel: &str) -> anyhow::Result<()> {
    let id = ChannelId::parse(channel)?;
    let path = platform::stats_file(&platform::stats_dir(), &id);
    if !path.exists() {
        println!("No statistics recorded for {} yet ({:?})", id, path);
        return Ok(());
    }
    let stats = ChannelStats::load_file(&path)?;
    print!("{}", stats.summary());
    Ok(())
}

async fn watch(config: Config, list: Arc<WatchList>, check_only: bool) -> anyhow::Result<()> {
    let fetcher = HttpFetcher::new(&config)?;
    let arbiter = Arc::new(TabArbiter::new(
        Arc::clone(&list),
        Arc::new(SystemBrowser::from_config(&config)),
        config.max_open_tabs,
    ));
    let stats = config
        .enable_statistics
        .then(|| Arc::new(StatisticsRecorder::persistent()));
    let notifier = config
        .enable_notifications
        .then(|| Arc::new(SystemNotifier) as Arc<dyn Notifier>);

    let deps = MonitorDeps {
        fetcher: Arc::new(fetcher),
        notifier,
        arbiter: Arc::clone(&arbiter),
        stats: stats.clone(),
        scheduler: PollScheduler::from_config(&config),
        limits: HttpFetcher::limits(&config),
        use_head_request: config.use_head_request,
    };

    let mut fleet = FleetCoordinator::new(deps);
    for entry in list.all_streamers().await {
        fleet.add_channel(entry.id.as_str()).await?;
    }

    if check_only {
        arbiter.pause_tabs().await;
    }
    print_banner(&config, &fleet, list.path());

    if config.status_api {
        http::start_server(
            config.status_port,
            http::ApiState {
                status: fleet.status_handle(),
            },
        );
    }

    let interrupted = tokio::select! {
        _ = fleet.start_all() => false,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            true
        }
    };
    if !interrupted {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
    }

    info!("Shutdown requested, stopping monitors");
    fleet.stop_all().await;
    if let Some(stats) = &stats {
        stats.flush().await;
    }
    info!("Stopped");
    Ok(())
}

fn print_banner(config: &Config, fleet: &FleetCoordinator, list_path: Option<&Path>) {
    println!("streamwatch {}", env!("CARGO_PKG_VERSION"));
    let channels: Vec<String> = fleet.channels().iter().map(|c| c.to_string()).collect();
    println!("  channels:       {}", channels.join(", "));
    if let Some(path) = list_path {
        println!("  watch list:     {}", path.display());
    }
    println!(
        "  check interval: {}s ({}s for {}s after a channel was live)",
        config.check_interval, config.check_interval_fast, config.fast_mode_duration
    );
    println!("  max open tabs:  {}", config.max_open_tabs);
    if config.status_api {
        println!("  status API:     http://127.0.0.1:{}/api/status", config.status_port);
    }
    println!("Press Ctrl-C to stop.");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("streamwatch").chain(args.iter().copied()))
    }

    #[test]
    fn test_single_mode() {
        let cli = parse(&["somechannel"]).unwrap();
        assert_eq!(
            cli.mode().unwrap(),
            Mode::Single {
                channel: "somechannel".into(),
                config: None
            }
        );

        let cli = parse(&["somechannel", "my.ini"]).unwrap();
        assert_eq!(
            cli.mode().unwrap(),
            Mode::Single {
                channel: "somechannel".into(),
                config: Some(PathBuf::from("my.ini"))
            }
        );
    }

    #[test]
    fn test_multi_mode() {
        let cli = parse(&["--multi"]).unwrap();
        assert_eq!(
            cli.mode().unwrap(),
            Mode::Multi {
                list: platform::default_watch_list_path()
            }
        );

        let cli = parse(&["--multi", "list.txt"]).unwrap();
        assert_eq!(
            cli.mode().unwrap(),
            Mode::Multi {
                list: PathBuf::from("list.txt")
            }
        );
    }

    #[test]
    fn test_stats_mode() {
        let cli = parse(&["--stats", "someone"]).unwrap();
        assert_eq!(
            cli.mode().unwrap(),
            Mode::Stats {
                channel: "someone".into()
            }
        );
    }

    #[test]
    fn test_no_arguments_is_an_error() {
        assert!(parse(&[]).unwrap().mode().is_err());
    }

    #[test]
    fn test_help_is_not_an_error_exit() {
        let err = parse(&["--help"]).unwrap_err();
        assert!(!err.use_stderr());
        let err = parse(&["--bogus"]).unwrap_err();
        assert!(err.use_stderr());
    }
}
