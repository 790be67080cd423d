//! Price feeds.
//!
//! The worker only needs a stream of recent prices to drive signal
//! evaluation and the dashboard chart. Two sources are provided:
//! a synthetic random-walk feed for simulation mode, and a CoinGecko
//! feed for deployments that want real market data.
//!
//! CoinGecko API: `https://api.coingecko.com/api/v3`
//! Auth: optional demo key via `x-cg-demo-key` header.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const COINGECKO_BASE: &str = "https://api.coingecko.com/api/v3";

/// Price bounds for the synthetic walk. Keeps the chart plausible even
/// over very long runs.
const SIM_PRICE_FLOOR: f64 = 500.0;
const SIM_PRICE_CEIL: f64 = 10_000.0;

/// Source of the latest price tick.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn latest(&mut self) -> Result<f64>;
}

// ---------------------------------------------------------------------------
// Synthetic feed
// ---------------------------------------------------------------------------

/// Random-walk price generator centred on a base price.
/// Each tick moves ±0.15% for subtle, realistic-looking movement.
pub struct SyntheticFeed {
    price: f64,
}

impl SyntheticFeed {
    pub fn new(base_price: f64) -> Self {
        Self { price: base_price }
    }

    fn step(&mut self, max_pct: f64) -> f64 {
        let change_pct = (rand::thread_rng().gen::<f64>() - 0.5) * max_pct * 2.0;
        self.price = (self.price * (1.0 + change_pct)).clamp(SIM_PRICE_FLOOR, SIM_PRICE_CEIL);
        (self.price * 100.0).round() / 100.0
    }

    /// Generate a backfilled history of `n` points, walking ±0.2% per step.
    /// Used to warm up SMA evaluation before the first live tick.
    pub fn history(&mut self, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.step(0.002)).collect()
    }
}

#[async_trait]
impl PriceFeed for SyntheticFeed {
    async fn latest(&mut self) -> Result<f64> {
        Ok(self.step(0.0015))
    }
}

// ---------------------------------------------------------------------------
// CoinGecko feed
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SimplePriceEntry {
    usd: f64,
}

/// Live price feed backed by CoinGecko's simple-price endpoint.
pub struct CoinGeckoFeed {
    client: Client,
    coin_id: String,
    api_key: Option<String>,
}

impl CoinGeckoFeed {
    pub fn new(coin_id: &str, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build CoinGecko HTTP client")?;
        Ok(Self {
            client,
            coin_id: coin_id.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl PriceFeed for CoinGeckoFeed {
    async fn latest(&mut self) -> Result<f64> {
        let url = format!("{COINGECKO_BASE}/simple/price");
        let mut req = self
            .client
            .get(&url)
            .query(&[("ids", self.coin_id.as_str()), ("vs_currencies", "usd")]);
        if let Some(key) = &self.api_key {
            req = req.header("x-cg-demo-key", key);
        }

        let resp = req
            .send()
            .await
            .context("CoinGecko price request failed")?
            .error_for_status()
            .context("CoinGecko returned an error status")?;

        let body: std::collections::HashMap<String, SimplePriceEntry> = resp
            .json()
            .await
            .context("Failed to parse CoinGecko price response")?;

        body.get(&self.coin_id)
            .map(|e| e.usd)
            .with_context(|| format!("CoinGecko response missing coin {}", self.coin_id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
