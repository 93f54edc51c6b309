use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::ExchangeConfig;
use crate::feeds::ExchangeConnectivity;

/// Tracks reachability of the configured exchanges.
///
/// Exchanges with a `ping_url` are probed over HTTP; those without one are
/// simulated venues (paper mode) and always reachable once initialized.
pub struct ExchangeManager {
    exchanges: Vec<ExchangeConfig>,
    http: reqwest::Client,
    connected: DashMap<String, bool>,
}

impl ExchangeManager {
    pub fn new(exchanges: Vec<ExchangeConfig>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            exchanges,
            http,
            connected: DashMap::new(),
        }
    }

    async fn ping(&self, exchange: &ExchangeConfig) -> Result<()> {
        let Some(url) = &exchange.ping_url else {
            return Ok(()); // Simulated venue
        };
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("{}: ping {url} failed", exchange.name))?;
        if !resp.status().is_success() {
            anyhow::bail!("{}: ping {url} returned {}", exchange.name, resp.status());
        }
        Ok(())
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.connected.get(name).map(|v| *v).unwrap_or(false)
    }
}

#[async_trait]
impl ExchangeConnectivity for ExchangeManager {
    async fn initialize(&self) -> Result<()> {
        for exchange in &self.exchanges {
            self.ping(exchange).await?;
            self.connected.insert(exchange.name.clone(), true);
            info!(
                "Exchange {} connected ({} symbols{})",
                exchange.name,
                exchange.symbols.len(),
                if exchange.ping_url.is_none() { ", simulated" } else { "" }
            );
        }
        Ok(())
    }

    async fn test_connections(&self) -> bool {
        let mut all_ok = true;
        for exchange in &self.exchanges {
            let ok = self.is_connected(&exchange.name) && self.ping(exchange).await.is_ok();
            if !ok {
                warn!("Exchange {} unreachable", exchange.name);
                self.connected.insert(exchange.name.clone(), false);
                all_ok = false;
            }
        }
        all_ok
    }

    async fn cleanup(&self) -> Result<()> {
        self.connected.clear();
        info!("Exchange connections released");
        Ok(())
    }
}
