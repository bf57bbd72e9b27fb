use std::path::{Path, PathBuf};

use crate::protocol::ChannelId;

/// Page every channel id is appended to.
pub const CHANNEL_BASE_URL: &str = "https://www.twitch.tv/";

pub const CONFIG_FILE_NAME: &str = "config.ini";
pub const WATCH_LIST_FILE_NAME: &str = "streamers.txt";

pub fn channel_url(id: &ChannelId) -> String {
    format!("{}{}", CHANNEL_BASE_URL, id.as_str())
}

pub fn data_dir() -> PathBuf {
    // XDG layout on every unix, macOS included.
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("streamwatch")
    }
    #[cfg(windows)]
    {
        // Portable install: a `data` folder beside the executable wins
        if let Some(portable) = beside_exe("data") {
            return portable;
        }

        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("streamwatch")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if beside_exe(CONFIG_FILE_NAME).is_some() {
            if let Some(dir) = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(Path::to_path_buf))
            {
                return dir;
            }
        }
    }

    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("streamwatch")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("streamwatch")
    }
}

#[cfg(windows)]
fn beside_exe(name: &str) -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe.parent()?.join(name);
    candidate.exists().then_some(candidate)
}

pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

pub fn default_watch_list_path() -> PathBuf {
    config_dir().join(WATCH_LIST_FILE_NAME)
}

pub fn stats_dir() -> PathBuf {
    data_dir().join("stats")
}

pub fn stats_file(dir: &Path, id: &ChannelId) -> PathBuf {
    dir.join(format!("stats_{}.json", id.as_str()))
}

/// Relative log paths from the config are anchored in the data directory.
pub fn resolve_log_path(log_file: &str) -> PathBuf {
    let path = PathBuf::from(log_file);
    if path.is_absolute() {
        path
    } else {
        data_dir().join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_url() {
        let id = ChannelId::parse("some_streamer").unwrap();
        assert_eq!(channel_url(&id), "https://www.twitch.tv/some_streamer");
    }

    #[test]
    fn test_stats_file_name() {
        let id = ChannelId::parse("abc").unwrap();
        let path = stats_file(Path::new("/x/stats"), &id);
        assert!(path.ends_with("stats_abc.json"));
    }

    #[test]
    fn test_resolve_log_path() {
        assert!(resolve_log_path("monitor.log").starts_with(data_dir()));
        #[cfg(unix)]
        assert_eq!(
            resolve_log_path("/var/log/monitor.log"),
            PathBuf::from("/var/log/monitor.log")
        );
    }
}
