//! Live/offline classification of a downloaded channel page.
//!
//! The page embeds semi-structured JSON in its markup.  We never parse it;
//! we look for a handful of substrings that only show up while a broadcast is
//! running.  That is a heuristic, and the monitor is built to tolerate the
//! occasional wrong answer.

use tracing::{debug, info, warn};

/// Pages shorter than this are error pages or bot walls, not channel pages.
pub const MIN_PAGE_SIZE: usize = 1000;

/// How far past the `"stream":{` anchor the `"type":"live"` marker may sit.
pub const STREAM_SECTION_WINDOW: usize = 500;

pub const IS_LIVE_BROADCAST: &str = "\"isLiveBroadcast\"";
pub const STREAM_SECTION: &str = "\"stream\":{";
pub const TYPE_LIVE: &str = "\"type\":\"live\"";
pub const BROADCAST_TYPE_STREAM: &str = "\"broadcastType\":\"STREAM\"";

const ANTI_BOT_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "g-recaptcha",
    "Please enable JavaScript",
    "Access Denied",
];

/// Which marker confirmed the broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveMarker {
    IsLiveBroadcast,
    StreamTypeLive,
    BroadcastTypeStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InconclusiveReason {
    Empty,
    TooSmall(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Live(LiveMarker),
    Offline,
    /// Nothing usable came back; counts as offline.
    Inconclusive(InconclusiveReason),
}

impl Classification {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }
}

/// Classify page content.  Pure: same input, same answer, no I/O.
pub fn classify(content: &str) -> Classification {
    if content.is_empty() {
        return Classification::Inconclusive(InconclusiveReason::Empty);
    }
    if content.len() < MIN_PAGE_SIZE {
        return Classification::Inconclusive(InconclusiveReason::TooSmall(content.len()));
    }

    if content.contains(IS_LIVE_BROADCAST) {
        return Classification::Live(LiveMarker::IsLiveBroadcast);
    }

    if let Some(pos) = content.find(STREAM_SECTION) {
        let section = window(content.as_bytes(), pos, STREAM_SECTION_WINDOW);
        if contains_bytes(section, TYPE_LIVE.as_bytes()) {
            return Classification::Live(LiveMarker::StreamTypeLive);
        }
    }

    if content.contains(BROADCAST_TYPE_STREAM) {
        return Classification::Live(LiveMarker::BroadcastTypeStream);
    }

    Classification::Offline
}

/// Boolean shorthand for [`classify`].
pub fn is_live(content: &str) -> bool {
    classify(content).is_live()
}

/// Cheap unscoped check used by the fetcher to stop downloading early.
///
/// Looser than [`classify`]: `"type":"live"` counts anywhere, so a hit here
/// only means "stop reading", never "online".
pub fn contains_live_marker(buf: &[u8]) -> bool {
    [IS_LIVE_BROADCAST, TYPE_LIVE, BROADCAST_TYPE_STREAM]
        .iter()
        .any(|m| contains_bytes(buf, m.as_bytes()))
}

/// First anti-bot / challenge marker present in the page, if any.
pub fn detect_challenge(content: &str) -> Option<&'static str> {
    ANTI_BOT_MARKERS.iter().copied().find(|m| content.contains(m))
}

/// [`classify`] plus the diagnostic logging the monitor wants.  The
/// challenge probe is log-only and never changes the result.
pub fn classify_logged(channel: &str, content: &str) -> Classification {
    if let Some(marker) = detect_challenge(content) {
        warn!("{}: anti-bot page detected ({}), result may be wrong", channel, marker);
    }

    let result = classify(content);
    match result {
        Classification::Inconclusive(InconclusiveReason::Empty) => {
            warn!("{}: inconclusive, page empty; assuming offline", channel);
        }
        Classification::Inconclusive(InconclusiveReason::TooSmall(len)) => {
            warn!(
                "{}: inconclusive, page too small ({} bytes, likely blocked); assuming offline",
                channel, len
            );
        }
        Classification::Live(marker) => info!("{}: live ({:?})", channel, marker),
        Classification::Offline => debug!("{}: no live markers", channel),
    }
    result
}

fn window(bytes: &[u8], start: usize, len: usize) -> &[u8] {
    let end = start.saturating_add(len).min(bytes.len());
    &bytes[start..end]
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}
