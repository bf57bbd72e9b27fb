use std::time::Duration;

use crate::config::Config;

/// Adaptive poll interval: poll fast for a while after a channel was last
/// seen live, slow otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollScheduler {
    pub normal_interval_secs: u64,
    pub fast_interval_secs: u64,
    pub fast_mode_duration_secs: u64,
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self {
            normal_interval_secs: 30,
            fast_interval_secs: 10,
            fast_mode_duration_secs: 300,
        }
    }
}

impl PollScheduler {
    pub fn from_config(config: &Config) -> Self {
        Self {
            normal_interval_secs: config.check_interval,
            fast_interval_secs: config.check_interval_fast,
            fast_mode_duration_secs: config.fast_mode_duration,
        }
    }

    /// Seconds until the next poll.  `last_online_timestamp == 0` means the
    /// channel was never seen live.
    pub fn next_interval_secs(&self, last_online_timestamp: i64, now: i64) -> u64 {
        if self.in_fast_mode(last_online_timestamp, now) {
            self.fast_interval_secs
        } else {
            self.normal_interval_secs
        }
    }

    pub fn next_interval(&self, last_online_timestamp: i64, now: i64) -> Duration {
        Duration::from_secs(self.next_interval_secs(last_online_timestamp, now))
    }

    pub fn in_fast_mode(&self, last_online_timestamp: i64, now: i64) -> bool {
        if last_online_timestamp <= 0 {
            return false;
        }
        // A clock stepping backwards gives a negative age; treat as "just now".
        let age = now.saturating_sub(last_online_timestamp).max(0) as u64;
        age < self.fast_mode_duration_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_never_online_uses_normal_interval() {
        let s = PollScheduler::default();
        assert_eq!(s.next_interval_secs(0, NOW), 30);
        assert_eq!(s.next_interval_secs(0, 0), 30);
    }

    #[test]
    fn test_recently_online_uses_fast_interval() {
        let s = PollScheduler::default();
        assert_eq!(s.next_interval_secs(NOW, NOW), 10);
        assert_eq!(s.next_interval_secs(NOW - 299, NOW), 10);
    }

    #[test]
    fn test_boundary_is_normal() {
        let s = PollScheduler::default();
        assert_eq!(s.next_interval_secs(NOW - 300, NOW), 30);
        assert_eq!(s.next_interval_secs(NOW - 3600, NOW), 30);
    }

    #[test]
    fn test_clock_going_backwards_stays_fast() {
        let s = PollScheduler::default();
        assert_eq!(s.next_interval_secs(NOW + 5, NOW), 10);
    }

    #[test]
    fn test_from_config() {
        let config = Config {
            check_interval: 60,
            check_interval_fast: 5,
            fast_mode_duration: 120,
            ..Config::default()
        };
        let s = PollScheduler::from_config(&config);
        assert_eq!(s.next_interval(NOW - 100, NOW), Duration::from_secs(5));
        assert_eq!(s.next_interval(NOW - 120, NOW), Duration::from_secs(60));
    }
}
