use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant as TickInstant;
use url::Url;

use crate::config::ConnectorConfig;

/// Source of page text. Failures are passed through to the caller untouched.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_text(&self, url: &Url) -> Result<String>;
}

/// `reqwest`-backed fetcher with a host allow-list and a politeness throttle.
pub struct HttpFetcher {
    client: reqwest::Client,
    rate_limit: Duration,
    slow_warn: Duration,
    allowed_hosts: Option<Vec<String>>,
    last_call: Mutex<Option<TickInstant>>,
}

impl HttpFetcher {
    pub fn new(cfg: &ConnectorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(Duration::from_millis(cfg.call_timeout_ms))
            .build()
            .context("building http client")?;
        Ok(Self {
            client,
            rate_limit: Duration::from_millis(cfg.rate_limit_ms),
            slow_warn: Duration::from_millis(cfg.slow_warn_ms),
            allowed_hosts: cfg.normalized_allowed_hosts(),
            last_call: Mutex::new(None),
        })
    }

    async fn throttle(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.rate_limit {
                tokio::time::sleep(self.rate_limit - elapsed).await;
            }
        }
        *last = Some(TickInstant::now());
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_text(&self, url: &Url) -> Result<String> {
        if !host_allowed(self.allowed_hosts.as_deref(), url) {
            bail!("host not allowed: {}", url.host_str().unwrap_or("<none>"));
        }
        self.throttle().await;

        let start = Instant::now();
        let resp = self.client.get(url.clone()).send().await.with_context(|| format!("GET {}", url))?;
        let status = resp.status();
        let text = resp
            .error_for_status()
            .with_context(|| format!("GET {}", url))?
            .text()
            .await
            .with_context(|| format!("reading body of {}", url))?;

        let elapsed = start.elapsed();
        if elapsed > self.slow_warn {
            tracing::warn!(%url, ?elapsed, "slow request");
        }
        tracing::debug!(%url, status = status.as_u16(), bytes = text.len(), "fetched");
        Ok(text)
    }
}

/// Only http(s) URLs whose host matches an entry. `None` allows everything.
pub fn host_allowed(allowed: Option<&[String]>, url: &Url) -> bool {
    let Some(list) = allowed else { return true };
    if list.is_empty() {
        return false;
    }
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = url.host_str() else { return false };
    let host = host.to_ascii_lowercase();
    list.iter().any(|entry| match entry.strip_prefix("*.") {
        Some(domain) => host == domain || host.ends_with(&format!(".{}", domain)),
        None => host == *entry,
    })
}
