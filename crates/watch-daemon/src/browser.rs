use anyhow::Context;
use async_trait::async_trait;
use rand::Rng;
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info};

use watch_core::config::Config;
use watch_core::monitor::BrowserLauncher;

/// Opens channel pages in the default browser.
///
/// Each open waits a random delay first.  There is no portable way to close
/// a single browser tab, so `close` only logs.
pub struct SystemBrowser {
    delay_min_ms: u64,
    delay_max_ms: u64,
    enabled: bool,
}

impl SystemBrowser {
    pub fn from_config(config: &Config) -> Self {
        Self {
            delay_min_ms: config.browser_delay_min,
            delay_max_ms: config.browser_delay_max.max(config.browser_delay_min),
            enabled: config.open_browser,
        }
    }

    fn delay(&self) -> Duration {
        let ms = rand::thread_rng().gen_range(self.delay_min_ms..=self.delay_max_ms);
        Duration::from_millis(ms)
    }
}

pub fn open_command(url: &str) -> (&'static str, Vec<String>) {
    #[cfg(target_os = "windows")]
    {
        // Empty window title, otherwise `start` takes the URL as the title.
        (
            "cmd",
            vec!["/C".into(), "start".into(), String::new(), url.to_string()],
        )
    }

    #[cfg(target_os = "macos")]
    {
        ("open", vec![url.to_string()])
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        ("xdg-open", vec![url.to_string()])
    }
}

#[async_trait]
impl BrowserLauncher for SystemBrowser {
    async fn open(&self, url: &str) -> anyhow::Result<()> {
        if !self.enabled {
            info!("browser disabled, would open {}", url);
            return Ok(());
        }

        let delay = self.delay();
        debug!("opening {} in {}ms", url, delay.as_millis());
        tokio::time::sleep(delay).await;

        let (program, args) = open_command(url);
        tokio::process::Command::new(program)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;
        info!("opened {}", url);
        Ok(())
    }

    async fn close(&self, url: &str) -> anyhow::Result<()> {
        info!("tab for {} can be closed", url);
        Ok(())
    }
}
