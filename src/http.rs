//! Anonymous HTTP access to the product archive
//!
//! A probe is a `HEAD` request: it yields the authoritative size and
//! modification time without transferring the body.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDateTime};
use std::io::Read;
use std::time::Duration;

/// Size and modification time of a remote resource, fresh for every probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteFileState {
    pub size: u64,
    /// Unix seconds, UTC.
    pub modified_time: i64,
}

/// Transport timeouts. The defaults are applied to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(30),
            write: Duration::from_secs(30),
        }
    }
}

/// Seam between the transfer logic and the network.
pub trait RemoteSource: Send + Sync {
    /// Metadata-only query; any non-success status is an error.
    fn probe(&self, url: &str) -> Result<RemoteFileState>;
    /// Start a body transfer.
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>>;
}

pub struct HttpClient {
    agent: ureq::Agent,
}

impl HttpClient {
    pub fn new(timeouts: Timeouts) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeouts.connect)
            .timeout_read(timeouts.read)
            .timeout_write(timeouts.write)
            .user_agent(concat!("lics-sync/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }

    fn call(&self, method: &str, url: &str) -> Result<ureq::Response> {
        match self.agent.request(method, url).call() {
            Ok(response) => {
                let status = response.status();
                if !(200..300).contains(&status) {
                    bail!("{method} {url}: HTTP {status}");
                }
                Ok(response)
            }
            Err(ureq::Error::Status(code, _)) => Err(anyhow!("{method} {url}: HTTP {code}")),
            Err(err) => Err(anyhow!("{method} {url}: {err}")),
        }
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Timeouts::default())
    }
}

impl RemoteSource for HttpClient {
    fn probe(&self, url: &str) -> Result<RemoteFileState> {
        let response = self.call("HEAD", url)?;
        remote_state(
            response.header("Content-Length"),
            response.header("Last-Modified"),
        )
        .with_context(|| format!("probing {url}"))
    }

    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>> {
        let response = self.call("GET", url)?;
        Ok(Box::new(response.into_reader()))
    }
}

/// Build a [`RemoteFileState`] from the two probe headers. Both are required.
pub fn remote_state(
    content_length: Option<&str>,
    last_modified: Option<&str>,
) -> Result<RemoteFileState> {
    let size = content_length
        .ok_or_else(|| anyhow!("missing Content-Length"))?
        .trim()
        .parse::<u64>()
        .context("invalid Content-Length")?;
    let modified_time = parse_http_date(
        last_modified.ok_or_else(|| anyhow!("missing Last-Modified"))?,
    )?;
    Ok(RemoteFileState {
        size,
        modified_time,
    })
}

/// Parse an HTTP date (`Sun, 06 Nov 1994 08:49:37 GMT`) into Unix seconds.
pub fn parse_http_date(value: &str) -> Result<i64> {
    let value = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%a, %d %b %Y %H:%M:%S GMT") {
        return Ok(naive.and_utc().timestamp());
    }
    DateTime::parse_from_rfc2822(value)
        .map(|dt| dt.timestamp())
        .with_context(|| format!("invalid Last-Modified {value:?}"))
}
