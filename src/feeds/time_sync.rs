use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::feeds::TimeSyncProbe;

/// Clock-offset probe based on an HTTP `Date` response header.
///
/// Resolution is one second, so tolerances below ~1000ms are not meaningful.
pub struct HttpDateProbe {
    url: String,
    http: reqwest::Client,
}

impl HttpDateProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            http,
        }
    }
}

/// Offset of `server` relative to the midpoint of the local request window.
pub fn offset_ms(server: DateTime<Utc>, sent: DateTime<Utc>, received: DateTime<Utc>) -> i64 {
    let midpoint = sent + (received - sent) / 2;
    (server - midpoint).num_milliseconds()
}

#[async_trait]
impl TimeSyncProbe for HttpDateProbe {
    async fn clock_offset_ms(&self) -> Result<i64> {
        let sent = Utc::now();
        let resp = self
            .http
            .head(&self.url)
            .send()
            .await
            .with_context(|| format!("time sync request to {} failed", self.url))?;
        let received = Utc::now();

        let header = resp
            .headers()
            .get(reqwest::header::DATE)
            .context("response has no Date header")?
            .to_str()
            .context("Date header is not ASCII")?;
        let server = DateTime::parse_from_rfc2822(header)
            .with_context(|| format!("unparseable Date header: {header}"))?
            .with_timezone(&Utc);

        Ok(offset_ms(server, sent, received))
    }
}
