//! Price oracle client and read-through cache
//!
//! The oracle is opaque: symbols in, micro-unit prices out, partial
//! coverage tolerated. A background refresh task keeps a cache of every
//! active token symbol warm; the orchestrator reads through the cache and
//! falls back to a direct fetch for symbols the last refresh missed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arena_db::MirrorStore;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::OracleConfig;
use crate::error::{SyncError, SyncResult};

/// Price feed surface: symbols to micro-unit prices. Missing symbols are
/// simply absent from the map, never an error.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn fetch_prices(&self, symbols: &[String]) -> SyncResult<HashMap<String, u64>>;
}

#[derive(Debug, Deserialize)]
struct PriceFeedResponse {
    prices: HashMap<String, u64>,
}

/// HTTP price feed client.
pub struct HttpPriceOracle {
    client: Client,
    base_url: String,
}

impl HttpPriceOracle {
    pub fn new(config: &OracleConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Oracle(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn fetch_prices(&self, symbols: &[String]) -> SyncResult<HashMap<String, u64>> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }
        let url = format!("{}/prices?symbols={}", self.base_url, symbols.join(","));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SyncError::Oracle(e.to_string()))?
            .error_for_status()
            .map_err(|e| SyncError::Oracle(e.to_string()))?;
        let body: PriceFeedResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Oracle(e.to_string()))?;
        Ok(body.prices)
    }
}

/// Fixed-price oracle for tests and development.
#[derive(Default)]
pub struct StaticOracle {
    prices: RwLock<HashMap<String, u64>>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_price(&self, symbol: &str, price: u64) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    pub async fn remove_price(&self, symbol: &str) {
        self.prices.write().await.remove(symbol);
    }
}

#[async_trait]
impl PriceOracle for StaticOracle {
    async fn fetch_prices(&self, symbols: &[String]) -> SyncResult<HashMap<String, u64>> {
        let prices = self.prices.read().await;
        Ok(symbols
            .iter()
            .filter_map(|s| prices.get(s).map(|p| (s.clone(), *p)))
            .collect())
    }
}

/// Shutdown handle for the refresh task.
pub struct RefresherHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl RefresherHandle {
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

/// Read-through price cache over any [`PriceOracle`].
pub struct PriceCache {
    oracle: Arc<dyn PriceOracle>,
    cached: RwLock<HashMap<String, u64>>,
    refresh_interval: Duration,
    /// Refresh runs are mutually exclusive with direct-fetch fallbacks
    /// writing the cache.
    refresh_guard: Mutex<()>,
}

impl PriceCache {
    pub fn new(oracle: Arc<dyn PriceOracle>, config: &OracleConfig) -> Self {
        Self {
            oracle,
            cached: RwLock::new(HashMap::new()),
            refresh_interval: config.refresh_interval(),
            refresh_guard: Mutex::new(()),
        }
    }

    /// Cached price, falling back to a direct oracle fetch on a miss.
    /// `None` when the oracle has no coverage for the symbol.
    pub async fn price_for(&self, symbol: &str) -> SyncResult<Option<u64>> {
        if let Some(price) = self.cached.read().await.get(symbol) {
            return Ok(Some(*price));
        }
        debug!("price cache miss for {}, fetching directly", symbol);
        let fetched = self.oracle.fetch_prices(&[symbol.to_string()]).await?;
        let _guard = self.refresh_guard.lock().await;
        let mut cached = self.cached.write().await;
        for (sym, price) in &fetched {
            cached.insert(sym.clone(), *price);
        }
        Ok(fetched.get(symbol).copied())
    }

    /// Refresh the cache for all symbols the mirror considers active.
    pub async fn refresh(&self, store: &dyn MirrorStore) -> SyncResult<usize> {
        let symbols: Vec<String> = store
            .list_active_tokens()
            .await?
            .into_iter()
            .map(|t| t.symbol)
            .collect();
        if symbols.is_empty() {
            return Ok(0);
        }
        let fetched = self.oracle.fetch_prices(&symbols).await?;
        let count = fetched.len();
        let _guard = self.refresh_guard.lock().await;
        let mut cached = self.cached.write().await;
        for (symbol, price) in fetched {
            cached.insert(symbol, price);
        }
        Ok(count)
    }

    /// Spawn the periodic refresh loop.
    pub fn start(self: &Arc<Self>, store: Arc<dyn MirrorStore>) -> RefresherHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let cache = self.clone();

        let task = tokio::spawn(async move {
            let mut timer = interval(cache.refresh_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("price refresher stopped");
                        break;
                    }
                    _ = timer.tick() => {
                        match cache.refresh(store.as_ref()).await {
                            Ok(count) if count > 0 => {
                                debug!("price cache refreshed: {} symbols", count);
                            }
                            Ok(_) => {}
                            Err(e) => warn!("price refresh failed: {}", e),
                        }
                    }
                }
            }
        });

        RefresherHandle { shutdown_tx, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_db::{MemoryStore, TokenRow};
    use chrono::Utc;

    fn token(symbol: &str, index: u8, active: bool) -> TokenRow {
        TokenRow {
            address: format!("tok-{index}"),
            mint: format!("mint-{index}"),
            symbol: symbol.to_string(),
            asset_index: index,
            decimals: 6,
            active,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn static_oracle_tolerates_partial_coverage() {
        let oracle = StaticOracle::new();
        oracle.set_price("SOL", 145_000_000).await;

        let prices = oracle
            .fetch_prices(&["SOL".to_string(), "UNKNOWN".to_string()])
            .await
            .unwrap();
        assert_eq!(prices.get("SOL"), Some(&145_000_000));
        assert!(!prices.contains_key("UNKNOWN"));
    }

    #[tokio::test]
    async fn refresh_covers_active_tokens_only() {
        let oracle = Arc::new(StaticOracle::new());
        oracle.set_price("SOL", 145_000_000).await;
        oracle.set_price("DOGE", 80_000).await;

        let store = MemoryStore::new();
        store.upsert_token(&token("SOL", 0, true)).await.unwrap();
        store.upsert_token(&token("DOGE", 1, false)).await.unwrap();

        let cache = PriceCache::new(oracle, &OracleConfig::default());
        let refreshed = cache.refresh(&store).await.unwrap();
        assert_eq!(refreshed, 1);
        assert_eq!(cache.price_for("SOL").await.unwrap(), Some(145_000_000));
    }

    #[tokio::test]
    async fn cache_miss_falls_back_to_direct_fetch() {
        let oracle = Arc::new(StaticOracle::new());
        oracle.set_price("BTC", 64_000_000_000).await;

        let cache = PriceCache::new(oracle.clone(), &OracleConfig::default());
        // never refreshed, still resolvable
        assert_eq!(cache.price_for("BTC").await.unwrap(), Some(64_000_000_000));

        // now cached: removing it from the oracle does not lose it
        oracle.remove_price("BTC").await;
        assert_eq!(cache.price_for("BTC").await.unwrap(), Some(64_000_000_000));
    }

    #[tokio::test]
    async fn unknown_symbol_resolves_to_none() {
        let cache = PriceCache::new(Arc::new(StaticOracle::new()), &OracleConfig::default());
        assert_eq!(cache.price_for("NOPE").await.unwrap(), None);
    }
}
