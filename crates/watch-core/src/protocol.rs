use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest id the channel page accepts.
pub const MAX_CHANNEL_ID_LEN: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelIdError {
    #[error("channel id is empty")]
    Empty,
    #[error("channel id is longer than {MAX_CHANNEL_ID_LEN} characters: {0}")]
    TooLong(String),
    #[error("channel id may only contain ASCII letters, digits and '_': {0:?}")]
    InvalidChar(String),
}

/// A validated channel identifier (`^[A-Za-z0-9_]{1,25}$`).
///
/// The id ends up in URLs and shell arguments, so it can only be built
/// through [`ChannelId::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId(String);

impl ChannelId {
    pub fn parse(raw: &str) -> Result<Self, ChannelIdError> {
        if raw.is_empty() {
            return Err(ChannelIdError::Empty);
        }
        if raw.len() > MAX_CHANNEL_ID_LEN {
            return Err(ChannelIdError::TooLong(raw.to_string()));
        }
        if !raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return Err(ChannelIdError::InvalidChar(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ChannelId {
    type Error = ChannelIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ChannelId> for String {
    fn from(id: ChannelId) -> Self {
        id.0
    }
}

/// Display status of a channel.
///
/// `Checking` is only set for the duration of a fetch; transition logic never
/// looks at it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    #[default]
    Unknown,
    Checking,
    Online,
    Offline,
}

impl ChannelStatus {
    pub fn from_live(is_live: bool) -> Self {
        if is_live {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

/// Read-only view of one channel, published by its monitor after every
/// state change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelSnapshot {
    pub id: ChannelId,
    pub status: ChannelStatus,
    pub was_online_before: bool,
    /// Epoch seconds of the latest Online observation, 0 if never seen live.
    pub last_online_timestamp: i64,
    /// Epoch seconds of the latest completed check, 0 before the first one.
    pub last_check_time: i64,
    pub tab_opened: bool,
    pub priority_index: usize,
    pub checks_completed: u64,
}

impl ChannelSnapshot {
    pub fn new(id: ChannelId) -> Self {
        Self {
            id,
            status: ChannelStatus::Unknown,
            was_online_before: false,
            last_online_timestamp: 0,
            last_check_time: 0,
            tab_opened: false,
            priority_index: 0,
            checks_completed: 0,
        }
    }
}

/// Aggregated view served by the status API.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FleetStatus {
    pub channels: Vec<ChannelSnapshot>,
    pub open_tabs: usize,
    pub max_open_tabs: usize,
    pub tabs_paused: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        for raw in ["a", "Some_Streamer_42", "_", "abcdefghijklmnopqrstuvwxy"] {
            assert!(ChannelId::parse(raw).is_ok(), "{raw} should be valid");
        }
    }

    #[test]
    fn test_invalid_ids() {
        assert_eq!(ChannelId::parse(""), Err(ChannelIdError::Empty));
        assert!(matches!(
            ChannelId::parse("abcdefghijklmnopqrstuvwxyz"),
            Err(ChannelIdError::TooLong(_))
        ));
        for raw in ["bad name!", "a-b", "ü", "a\"b", "x;rm -rf"] {
            assert!(
                matches!(ChannelId::parse(raw), Err(ChannelIdError::InvalidChar(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_channel_id_serde_validates() {
        let id: ChannelId = serde_json::from_str("\"good_one\"").unwrap();
        assert_eq!(id.as_str(), "good_one");
        assert!(serde_json::from_str::<ChannelId>("\"bad one\"").is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ChannelStatus::Online).unwrap();
        assert_eq!(json, "\"online\"");
    }
}
