use anyhow::Context;
use serde::Serialize;
use std::fmt::Write as _;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::platform;

/// Settings read from the `key=value` config file.
///
/// Every field has a documented default; a key that is missing, malformed
/// or out of range falls back to it on its own without affecting the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    /// Seconds between polls while a channel is quiet.
    pub check_interval: u64,
    /// Seconds between polls shortly after a channel was live.
    pub check_interval_fast: u64,
    /// How long (seconds) fast polling lasts after the last live sighting.
    pub fast_mode_duration: u64,
    /// Byte budget for one page download.
    pub max_html_size: usize,
    /// Total request timeout in seconds.
    pub timeout: u64,
    pub connect_timeout: u64,
    /// Send a HEAD probe first and skip the download for missing channels.
    pub use_head_request: bool,
    pub ssl_verify_peer: bool,
    pub ssl_verify_host: bool,
    pub log_file: String,
    pub verbose_logging: bool,
    pub open_browser: bool,
    /// Human-like pause before a tab is opened, in milliseconds.
    pub browser_delay_min: u64,
    pub browser_delay_max: u64,
    /// Ceiling on simultaneously open tabs across all channels.
    pub max_open_tabs: usize,
    pub enable_notifications: bool,
    pub enable_statistics: bool,
    /// Serve the read-only status API on 127.0.0.1.
    pub status_api: bool,
    pub status_port: u16,
}

fn default_check_interval() -> u64 {
    30
}

fn default_check_interval_fast() -> u64 {
    10
}

fn default_fast_mode_duration() -> u64 {
    300
}

fn default_max_html_size() -> usize {
    100_000
}

fn default_timeout() -> u64 {
    20
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_log_file() -> String {
    "stream_monitor.log".to_string()
}

fn default_browser_delay_min() -> u64 {
    1200
}

fn default_browser_delay_max() -> u64 {
    3500
}

fn default_max_open_tabs() -> usize {
    2
}

fn default_status_port() -> u16 {
    8788
}

impl Default for Config {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            check_interval_fast: default_check_interval_fast(),
            fast_mode_duration: default_fast_mode_duration(),
            max_html_size: default_max_html_size(),
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            use_head_request: true,
            ssl_verify_peer: true,
            ssl_verify_host: true,
            log_file: default_log_file(),
            verbose_logging: false,
            open_browser: true,
            browser_delay_min: default_browser_delay_min(),
            browser_delay_max: default_browser_delay_max(),
            max_open_tabs: default_max_open_tabs(),
            enable_notifications: true,
            enable_statistics: true,
            status_api: false,
            status_port: default_status_port(),
        }
    }
}

impl Config {
    /// Load from the default location, creating the file if needed.
    ///
    /// Loading usually happens before logging is set up, so problems are
    /// returned alongside the config instead of being logged here.
    pub fn load() -> anyhow::Result<(Self, Vec<String>)> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<(Self, Vec<String>)> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            let note = format!("Config file {:?} not found, wrote defaults", path);
            return Ok((config, vec![note]));
        }

        let bytes = std::fs::read(path).with_context(|| format!("reading {:?}", path))?;
        match String::from_utf8(bytes) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(_) => {
                let config = Self::default();
                config.save_to(path)?;
                let note = format!("Config file {:?} is not valid text, regenerated defaults", path);
                Ok((config, vec![note]))
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.render()).with_context(|| format!("writing {:?}", path))?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::default_config_path()
    }

    /// Parse `key=value` text.  Never fails: anything unusable is replaced by
    /// its default and described in the returned warnings.
    pub fn parse(content: &str) -> (Self, Vec<String>) {
        let mut config = Self::default();
        let mut warnings = Vec::new();

        for (line_no, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warnings.push(format!(
                    "Config line {}: expected key=value, got {:?}",
                    line_no + 1,
                    line
                ));
                continue;
            };
            config.apply(key.trim(), value.trim(), &mut warnings);
        }

        if config.browser_delay_min > config.browser_delay_max {
            warnings.push(format!(
                "browser_delay_min ({}) exceeds browser_delay_max ({}), using min for both",
                config.browser_delay_min, config.browser_delay_max
            ));
            config.browser_delay_max = config.browser_delay_min;
        }

        (config, warnings)
    }

    fn apply(&mut self, key: &str, value: &str, warnings: &mut Vec<String>) {
        match key {
            "check_interval" => {
                self.check_interval = number(key, value, 5..=300, default_check_interval(), warnings)
            }
            "check_interval_fast" => {
                self.check_interval_fast =
                    number(key, value, 1..=300, default_check_interval_fast(), warnings)
            }
            "fast_mode_duration" => {
                self.fast_mode_duration =
                    number(key, value, 0..=86_400, default_fast_mode_duration(), warnings)
            }
            "max_html_size" => {
                self.max_html_size =
                    number(key, value, 10_000..=1_000_000, default_max_html_size(), warnings)
            }
            "timeout" => self.timeout = number(key, value, 5..=120, default_timeout(), warnings),
            "connect_timeout" => {
                self.connect_timeout = number(key, value, 1..=120, default_connect_timeout(), warnings)
            }
            "use_head_request" => self.use_head_request = flag(key, value, true, warnings),
            "ssl_verify_peer" => self.ssl_verify_peer = flag(key, value, true, warnings),
            "ssl_verify_host" => self.ssl_verify_host = flag(key, value, true, warnings),
            "log_file" => {
                self.log_file = if value.is_empty() {
                    warnings.push("log_file is empty, using default".to_string());
                    default_log_file()
                } else {
                    value.to_string()
                }
            }
            "verbose_logging" => self.verbose_logging = flag(key, value, false, warnings),
            "open_browser" => self.open_browser = flag(key, value, true, warnings),
            "browser_delay_min" => {
                self.browser_delay_min =
                    number(key, value, 0..=60_000, default_browser_delay_min(), warnings)
            }
            "browser_delay_max" => {
                self.browser_delay_max =
                    number(key, value, 0..=60_000, default_browser_delay_max(), warnings)
            }
            "max_open_tabs" => {
                self.max_open_tabs = number(key, value, 1..=32, default_max_open_tabs(), warnings)
            }
            "enable_notifications" => self.enable_notifications = flag(key, value, true, warnings),
            "enable_statistics" => self.enable_statistics = flag(key, value, true, warnings),
            "status_api" => self.status_api = flag(key, value, false, warnings),
            "status_port" => {
                self.status_port = number(key, value, 1..=u16::MAX, default_status_port(), warnings)
            }
            // Accepted by older config files, no longer used.
            "use_http2" | "dns_cache_timeout" | "auto_close_tab" => {}
            _ => warnings.push(format!("Unknown config key {:?} ignored", key)),
        }
    }

    /// Documented config file contents for these settings.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# streamwatch configuration");
        let _ = writeln!(out, "# key=value, lines starting with # or ; are comments");
        let _ = writeln!(out, "# Invalid values fall back to their defaults");
        let _ = writeln!(out);
        let _ = writeln!(out, "# Polling (seconds)");
        let _ = writeln!(out, "check_interval={}", self.check_interval);
        let _ = writeln!(out, "check_interval_fast={}", self.check_interval_fast);
        let _ = writeln!(out, "fast_mode_duration={}", self.fast_mode_duration);
        let _ = writeln!(out, "max_html_size={}", self.max_html_size);
        let _ = writeln!(out);
        let _ = writeln!(out, "# Network");
        let _ = writeln!(out, "timeout={}", self.timeout);
        let _ = writeln!(out, "connect_timeout={}", self.connect_timeout);
        let _ = writeln!(out, "use_head_request={}", self.use_head_request);
        let _ = writeln!(out, "ssl_verify_peer={}", self.ssl_verify_peer);
        let _ = writeln!(out, "ssl_verify_host={}", self.ssl_verify_host);
        let _ = writeln!(out);
        let _ = writeln!(out, "# Logging");
        let _ = writeln!(out, "log_file={}", self.log_file);
        let _ = writeln!(out, "verbose_logging={}", self.verbose_logging);
        let _ = writeln!(out);
        let _ = writeln!(out, "# Browser (delays in milliseconds)");
        let _ = writeln!(out, "open_browser={}", self.open_browser);
        let _ = writeln!(out, "browser_delay_min={}", self.browser_delay_min);
        let _ = writeln!(out, "browser_delay_max={}", self.browser_delay_max);
        let _ = writeln!(out, "max_open_tabs={}", self.max_open_tabs);
        let _ = writeln!(out);
        let _ = writeln!(out, "# Features");
        let _ = writeln!(out, "enable_notifications={}", self.enable_notifications);
        let _ = writeln!(out, "enable_statistics={}", self.enable_statistics);
        let _ = writeln!(out, "status_api={}", self.status_api);
        let _ = writeln!(out, "status_port={}", self.status_port);
        out
    }
}

fn number<T>(
    key: &str,
    value: &str,
    range: RangeInclusive<T>,
    default: T,
    warnings: &mut Vec<String>,
) -> T
where
    T: FromStr + PartialOrd + Copy + std::fmt::Display,
{
    match value.parse::<T>() {
        Ok(v) if range.contains(&v) => v,
        Ok(v) => {
            warnings.push(format!(
                "{} = {} out of range ({}-{}), using default {}",
                key,
                v,
                range.start(),
                range.end(),
                default
            ));
            default
        }
        Err(_) => {
            warnings.push(format!(
                "{} = {:?} is not a number, using default {}",
                key, value, default
            ));
            default
        }
    }
}

fn flag(key: &str, value: &str, default: bool, warnings: &mut Vec<String>) -> bool {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => {
            warnings.push(format!(
                "{} = {:?} is not a boolean, using default {}",
                key, value, default
            ));
            default
        }
    }
}
