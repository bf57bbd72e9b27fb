//! reqwest-backed page fetcher.
//!
//! The body is streamed and buffered up to the configured byte budget.
//! Reading stops early once any live marker has been seen.

use anyhow::Context;
use async_trait::async_trait;
use futures_util::StreamExt;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use watch_core::classifier;
use watch_core::config::Config;
use watch_core::monitor::{FetchError, FetchLimits, PageFetcher, Probe};

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

const MAX_REDIRECTS: usize = 5;

/// Overlap kept when scanning new chunks, so a marker split across two
/// chunks is still found.
const MARKER_OVERLAP: usize = 64;

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let verify = config.ssl_verify_peer && config.ssl_verify_host;
        if !verify {
            warn!("TLS certificate verification disabled");
        }

        let client = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .danger_accept_invalid_certs(!verify)
            .build()
            .context("failed to build HTTP client")?;

        debug!("HTTP client ready (user agent: {})", user_agent);
        Ok(Self { client })
    }

    pub fn limits(config: &Config) -> FetchLimits {
        FetchLimits {
            max_bytes: config.max_html_size,
            timeout: Duration::from_secs(config.timeout),
        }
    }
}

fn transport(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(e.to_string())
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, limits: FetchLimits) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(limits.timeout)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }

        let mut body = response.bytes_stream();
        let mut buf: Vec<u8> = Vec::with_capacity(limits.max_bytes.min(64 * 1024));

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(transport)?;
            let scan_from = buf.len().saturating_sub(MARKER_OVERLAP);
            let room = limits.max_bytes.saturating_sub(buf.len());
            buf.extend_from_slice(&chunk[..chunk.len().min(room)]);

            if buf.len() >= limits.max_bytes {
                debug!("{}: size limit reached at {} bytes", url, buf.len());
                break;
            }
            if classifier::contains_live_marker(&buf[scan_from..]) {
                debug!("{}: live marker after {} bytes, stopping early", url, buf.len());
                break;
            }
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    async fn probe(&self, url: &str) -> Probe {
        match self.client.head(url).send().await {
            Ok(r) if matches!(r.status(), StatusCode::NOT_FOUND | StatusCode::GONE) => Probe::Absent,
            Ok(_) => Probe::Present,
            Err(e) => {
                debug!("{}: HEAD failed, falling back to GET: {}", url, e);
                Probe::Unknown
            }
        }
    }
}
