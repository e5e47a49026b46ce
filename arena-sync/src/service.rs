//! Service composition
//!
//! Builds every collaborator explicitly from `AppConfig` and wires the
//! background loops: indexer poll/refresh, leader election, price
//! refresher, reconciliation scanner, job worker, ops API. Backends are
//! selected by config: empty database/redis/oracle URLs pick the
//! in-memory implementations for development runs.
//!
//! Leadership gates only the mutating side (scanner, worker, recovery);
//! indexing and serving run on every instance.

use std::sync::Arc;

use arena_db::{MemoryStore, MirrorStore, PostgresStore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::election::{LeaderElector, LockStore, MemoryLockStore, RedisLockStore};
use crate::error::SyncResult;
use crate::indexer::Indexer;
use crate::jobs::JobWorker;
use crate::metrics::SyncMetrics;
use crate::oracle::{HttpPriceOracle, PriceCache, PriceOracle, StaticOracle};
use crate::orchestrator::Orchestrator;
use crate::retry::RetryPolicy;
use crate::rpc::{ChainClient, HttpChainClient};
use crate::server::{self, ServerState};
use crate::signer::AuthoritySigner;

/// Fully wired service, ready to run.
pub struct SyncService {
    config: AppConfig,
    store: Arc<dyn MirrorStore>,
    elector: Arc<LeaderElector>,
    prices: Arc<PriceCache>,
    indexer: Arc<Indexer>,
    orchestrator: Arc<Orchestrator>,
    worker: Arc<JobWorker>,
    metrics: Arc<SyncMetrics>,
}

impl SyncService {
    /// Construct every collaborator. Connects to Postgres and Redis when
    /// configured; no background work starts yet.
    pub async fn build(config: AppConfig) -> SyncResult<Self> {
        config.validate()?;
        let metrics = Arc::new(SyncMetrics::new());

        let store: Arc<dyn MirrorStore> = if config.database.url.is_empty() {
            info!("mirror store: in-memory");
            Arc::new(MemoryStore::new())
        } else {
            info!("mirror store: postgres");
            let store =
                PostgresStore::connect(&config.database.url, config.database.max_connections)
                    .await?;
            store.initialize_schema().await?;
            Arc::new(store)
        };

        let chain: Arc<dyn ChainClient> = Arc::new(HttpChainClient::new(&config.chain)?);

        let lock_store: Arc<dyn LockStore> = if config.election.redis_url.is_empty() {
            warn!("leader lock: in-memory (single-instance only)");
            Arc::new(MemoryLockStore::new())
        } else {
            info!("leader lock: redis");
            Arc::new(RedisLockStore::connect(&config.election.redis_url).await?)
        };
        let elector = Arc::new(LeaderElector::new(
            lock_store,
            config.election.clone(),
            metrics.clone(),
        ));

        let oracle: Arc<dyn PriceOracle> = if config.oracle.url.is_empty() {
            warn!("price oracle: static (no live prices)");
            Arc::new(StaticOracle::new())
        } else {
            Arc::new(HttpPriceOracle::new(&config.oracle)?)
        };
        let prices = Arc::new(PriceCache::new(oracle, &config.oracle));

        let signer = AuthoritySigner::from_config(&config.signer)?;
        info!("authority address: {}", signer.address_base58());

        let retry = RetryPolicy::default();
        let indexer = Arc::new(Indexer::new(
            store.clone(),
            chain.clone(),
            config.chain.program_id.clone(),
            config.indexer.clone(),
            retry.clone(),
            metrics.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            chain,
            signer,
            prices.clone(),
            &config.chain.program_id,
            config.lifecycle.clone(),
            retry,
            metrics.clone(),
        )?);
        let worker = Arc::new(JobWorker::new(
            store.clone(),
            orchestrator.clone(),
            config.lifecycle.clone(),
            metrics.clone(),
        ));

        Ok(Self {
            config,
            store,
            elector,
            prices,
            indexer,
            orchestrator,
            worker,
            metrics,
        })
    }

    pub fn store(&self) -> Arc<dyn MirrorStore> {
        self.store.clone()
    }

    pub fn indexer(&self) -> Arc<Indexer> {
        self.indexer.clone()
    }

    /// Run until SIGINT/SIGTERM, then shut everything down gracefully:
    /// timers stop, the leader lock is released, in-flight chain
    /// submissions are abandoned to the job queue.
    pub async fn run(self) -> SyncResult<()> {
        info!(
            "arena-sync starting, instance {}",
            self.elector.instance_id()
        );

        let elector_handle = self.elector.start();
        let indexer_handle = self.indexer.start();
        let refresher_handle = self.prices.start(self.store.clone());

        let scanner_handle = {
            let elector = self.elector.clone();
            self.orchestrator.start(move || elector.is_leader())
        };
        let worker_handle = {
            let elector = self.elector.clone();
            self.worker.start(move || elector.is_leader())
        };
        let recovery_task = self.spawn_promotion_recovery();

        let server_handle = if self.config.api.enabled {
            let state = Arc::new(ServerState {
                store: self.store.clone(),
                elector: self.elector.clone(),
                metrics: self.metrics.clone(),
            });
            Some(server::start(&self.config.api, state).await?)
        } else {
            None
        };

        wait_for_shutdown_signal().await;
        info!("shutdown signal received");

        scanner_handle.stop().await;
        worker_handle.stop().await;
        recovery_task.abort();
        indexer_handle.stop().await;
        refresher_handle.stop().await;
        elector_handle.stop().await;
        if let Some(handle) = server_handle {
            handle.stop().await;
        }
        info!("arena-sync stopped");
        Ok(())
    }

    /// Watch leadership transitions; a fresh promotion triggers one
    /// recovery pass over everything non-terminal.
    fn spawn_promotion_recovery(&self) -> JoinHandle<()> {
        let mut states = self.elector.subscribe();
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            let mut was_leader = states.borrow().is_leader();
            while states.changed().await.is_ok() {
                let leading = states.borrow_and_update().is_leader();
                if leading && !was_leader {
                    if let Err(e) = orchestrator.recover().await {
                        error!("promotion recovery failed: {}", e);
                    }
                }
                was_leader = leading;
            }
        })
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("cannot install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::development();
        config.chain.program_id = "ArenaProg1111111111111111111111111111111111".to_string();
        config.api.enabled = false;
        config
    }

    #[tokio::test]
    async fn builds_with_in_memory_backends() {
        let service = SyncService::build(test_config()).await.unwrap();
        assert_eq!(service.store().stats().await.unwrap().arenas_total, 0);
    }

    #[tokio::test]
    async fn build_rejects_missing_program_id() {
        let mut config = test_config();
        config.chain.program_id.clear();
        assert!(SyncService::build(config).await.is_err());
    }
}
