//! Distributed leader election
//!
//! Mutual exclusion over one TTL-bounded key in a shared store. Exactly
//! one instance holds the key at a time; that instance runs the
//! orchestrator, everyone else serves reads. The heartbeat re-asserts the
//! TTL only while the key still carries this instance's identity, and
//! release deletes it only under the same condition, so no instance can
//! ever touch another holder's lock.
//!
//! Leadership is distributed as an explicit [`LeaderState`] value on a
//! watch channel; every interested task holds a receiver and observes
//! each promotion or demotion exactly once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ElectionConfig;
use crate::error::SyncResult;
use crate::metrics::SyncMetrics;

/// Whether this instance may mutate chain state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderState {
    Leader,
    Follower,
}

impl LeaderState {
    pub fn is_leader(&self) -> bool {
        matches!(self, Self::Leader)
    }
}

/// The shared lock store. All three mutations are atomic on the store
/// side; the compare-then-act forms never affect a foreign holder's key.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Create the key with `holder` and `ttl` only if absent.
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> SyncResult<bool>;

    /// Re-assert the TTL only while the key still holds `holder`.
    async fn extend_if_held(&self, key: &str, holder: &str, ttl: Duration) -> SyncResult<bool>;

    /// Delete the key only while it still holds `holder`.
    async fn release_if_held(&self, key: &str, holder: &str) -> SyncResult<bool>;

    /// Current holder identity, absent when no leader exists.
    async fn holder(&self, key: &str) -> SyncResult<Option<String>>;
}

// ============================================================================
// Redis lock store
// ============================================================================

// Compare-then-act scripts; GET/compare/mutate must be one atomic step on
// the store or two heartbeats could interleave.
const EXTEND_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("pexpire", KEYS[1], ARGV[2])
else
    return 0
end"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end"#;

/// Redis-backed lock store for deployments.
pub struct RedisLockStore {
    conn: redis::aio::ConnectionManager,
    extend: redis::Script,
    release: redis::Script,
}

impl RedisLockStore {
    pub async fn connect(url: &str) -> SyncResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn,
            extend: redis::Script::new(EXTEND_SCRIPT),
            release: redis::Script::new(RELEASE_SCRIPT),
        })
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> SyncResult<bool> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(holder)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(result.is_some())
    }

    async fn extend_if_held(&self, key: &str, holder: &str, ttl: Duration) -> SyncResult<bool> {
        let mut conn = self.conn.clone();
        let extended: i64 = self
            .extend
            .key(key)
            .arg(holder)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;
        Ok(extended == 1)
    }

    async fn release_if_held(&self, key: &str, holder: &str) -> SyncResult<bool> {
        let mut conn = self.conn.clone();
        let released: i64 = self
            .release
            .key(key)
            .arg(holder)
            .invoke_async(&mut conn)
            .await?;
        Ok(released == 1)
    }

    async fn holder(&self, key: &str) -> SyncResult<Option<String>> {
        let mut conn = self.conn.clone();
        let holder: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(holder)
    }
}

// ============================================================================
// In-memory lock store
// ============================================================================

/// Single-process lock store for tests and development, with the same
/// TTL and compare-then-act semantics as the Redis backend.
#[derive(Default)]
pub struct MemoryLockStore {
    locks: Mutex<HashMap<String, (String, Instant)>>,
    fail_mode: AtomicBool,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail, simulating store unavailability.
    pub fn set_fail_mode(&self, fail: bool) {
        self.fail_mode.store(fail, Ordering::SeqCst);
    }

    fn check_fail(&self) -> SyncResult<()> {
        if self.fail_mode.load(Ordering::SeqCst) {
            return Err(crate::error::SyncError::LockStore(
                "lock store unavailable".into(),
            ));
        }
        Ok(())
    }

    fn prune_expired(locks: &mut HashMap<String, (String, Instant)>, key: &str) {
        if let Some((_, expires)) = locks.get(key) {
            if *expires <= Instant::now() {
                locks.remove(key);
            }
        }
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> SyncResult<bool> {
        self.check_fail()?;
        let mut locks = self.locks.lock().expect("lock store poisoned");
        Self::prune_expired(&mut locks, key);
        if locks.contains_key(key) {
            return Ok(false);
        }
        locks.insert(key.to_string(), (holder.to_string(), Instant::now() + ttl));
        Ok(true)
    }

    async fn extend_if_held(&self, key: &str, holder: &str, ttl: Duration) -> SyncResult<bool> {
        self.check_fail()?;
        let mut locks = self.locks.lock().expect("lock store poisoned");
        Self::prune_expired(&mut locks, key);
        match locks.get_mut(key) {
            Some((current, expires)) if current == holder => {
                *expires = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_if_held(&self, key: &str, holder: &str) -> SyncResult<bool> {
        self.check_fail()?;
        let mut locks = self.locks.lock().expect("lock store poisoned");
        Self::prune_expired(&mut locks, key);
        match locks.get(key) {
            Some((current, _)) if current == holder => {
                locks.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn holder(&self, key: &str) -> SyncResult<Option<String>> {
        self.check_fail()?;
        let mut locks = self.locks.lock().expect("lock store poisoned");
        Self::prune_expired(&mut locks, key);
        Ok(locks.get(key).map(|(holder, _)| holder.clone()))
    }
}

// ============================================================================
// Elector
// ============================================================================

/// Shutdown handle for the election loop.
pub struct ElectorHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ElectorHandle {
    /// Stop the loop and release the lock if held, so a successor takes
    /// over immediately instead of waiting out the TTL.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

/// Drives acquisition, heartbeat and release against a [`LockStore`].
pub struct LeaderElector {
    store: Arc<dyn LockStore>,
    config: ElectionConfig,
    metrics: Arc<SyncMetrics>,
    state_tx: watch::Sender<LeaderState>,
}

impl LeaderElector {
    pub fn new(store: Arc<dyn LockStore>, config: ElectionConfig, metrics: Arc<SyncMetrics>) -> Self {
        let (state_tx, _) = watch::channel(LeaderState::Follower);
        Self {
            store,
            config,
            metrics,
            state_tx,
        }
    }

    /// A new receiver observing every promotion and demotion.
    pub fn subscribe(&self) -> watch::Receiver<LeaderState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> LeaderState {
        *self.state_tx.borrow()
    }

    pub fn is_leader(&self) -> bool {
        self.state().is_leader()
    }

    pub fn instance_id(&self) -> &str {
        &self.config.instance_id
    }

    /// One acquisition attempt. Contention is an expected branch, not an
    /// error; store failure means "assume follower".
    pub async fn try_acquire_once(&self) -> SyncResult<bool> {
        let acquired = self
            .store
            .try_acquire(
                &self.config.lock_key,
                &self.config.instance_id,
                self.config.lock_ttl(),
            )
            .await?;
        if acquired {
            self.promote();
        }
        Ok(acquired)
    }

    /// One heartbeat. Losing the lock or losing the store demotes to
    /// follower without killing the process.
    pub async fn heartbeat_once(&self) {
        match self
            .store
            .extend_if_held(
                &self.config.lock_key,
                &self.config.instance_id,
                self.config.lock_ttl(),
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    "leader lock no longer held by {}, demoting",
                    self.config.instance_id
                );
                self.demote();
            }
            Err(e) => {
                warn!("leader heartbeat failed, assuming follower: {}", e);
                self.metrics.heartbeat_error();
                self.demote();
            }
        }
    }

    /// Compare-then-delete release. Safe to call as a follower.
    pub async fn release(&self) {
        let was_leader = self.is_leader();
        match self
            .store
            .release_if_held(&self.config.lock_key, &self.config.instance_id)
            .await
        {
            Ok(released) => {
                if released {
                    info!("leader lock released by {}", self.config.instance_id);
                }
            }
            Err(e) => warn!("leader lock release failed (TTL will expire it): {}", e),
        }
        if was_leader {
            self.demote();
        }
    }

    fn promote(&self) {
        let previous = self.state_tx.send_replace(LeaderState::Leader);
        if previous != LeaderState::Leader {
            info!("instance {} promoted to leader", self.config.instance_id);
            self.metrics.promoted();
        }
    }

    fn demote(&self) {
        let previous = self.state_tx.send_replace(LeaderState::Follower);
        if previous != LeaderState::Follower {
            info!("instance {} demoted to follower", self.config.instance_id);
            self.metrics.demoted();
        }
    }

    /// Spawn the election loop: heartbeat cadence while leading, slower
    /// re-acquisition cadence while following.
    pub fn start(self: &Arc<Self>) -> ElectorHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let elector = self.clone();

        let task = tokio::spawn(async move {
            // Immediate first attempt so a lone instance leads without
            // waiting one retry interval.
            if let Err(e) = elector.try_acquire_once().await {
                warn!("initial lock acquisition failed, following: {}", e);
            }

            loop {
                let period = if elector.is_leader() {
                    elector.config.heartbeat_interval()
                } else {
                    elector.config.retry_interval()
                };

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        elector.release().await;
                        info!("election loop stopped");
                        break;
                    }
                    _ = tokio::time::sleep(period) => {
                        if elector.is_leader() {
                            elector.heartbeat_once().await;
                        } else {
                            match elector.try_acquire_once().await {
                                Ok(true) => {}
                                Ok(false) => debug!("leader lock held elsewhere"),
                                Err(e) => warn!("lock acquisition failed, following: {}", e),
                            }
                        }
                    }
                }
            }
        });

        ElectorHandle { shutdown_tx, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(instance: &str) -> ElectionConfig {
        ElectionConfig {
            redis_url: String::new(),
            lock_key: "test:leader".to_string(),
            lock_ttl_ms: 200,
            heartbeat_interval_ms: 20,
            retry_interval_ms: 20,
            instance_id: instance.to_string(),
        }
    }

    #[tokio::test]
    async fn exactly_one_of_many_concurrent_acquirers_wins() {
        let store = Arc::new(MemoryLockStore::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .try_acquire("k", &format!("instance-{i}"), Duration::from_secs(5))
                    .await
                    .unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(store.holder("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn compare_then_act_refuses_foreign_holder() {
        let store = MemoryLockStore::new();
        assert!(store.try_acquire("k", "a", Duration::from_secs(5)).await.unwrap());

        assert!(!store.extend_if_held("k", "b", Duration::from_secs(5)).await.unwrap());
        assert!(!store.release_if_held("k", "b").await.unwrap());
        assert_eq!(store.holder("k").await.unwrap().as_deref(), Some("a"));

        assert!(store.extend_if_held("k", "a", Duration::from_secs(5)).await.unwrap());
        assert!(store.release_if_held("k", "a").await.unwrap());
        assert_eq!(store.holder("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_lock_is_reacquirable() {
        let store = MemoryLockStore::new();
        assert!(store.try_acquire("k", "a", Duration::from_millis(20)).await.unwrap());
        assert!(!store.try_acquire("k", "b", Duration::from_secs(5)).await.unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.try_acquire("k", "b", Duration::from_secs(5)).await.unwrap());
        assert_eq!(store.holder("k").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn release_promotes_exactly_one_waiting_follower() {
        let store: Arc<dyn LockStore> = Arc::new(MemoryLockStore::new());
        let metrics = Arc::new(SyncMetrics::new());

        let first = Arc::new(LeaderElector::new(store.clone(), config("a"), metrics.clone()));
        assert!(first.try_acquire_once().await.unwrap());
        assert!(first.is_leader());

        let second = Arc::new(LeaderElector::new(store.clone(), config("b"), metrics.clone()));
        let third = Arc::new(LeaderElector::new(store.clone(), config("c"), metrics.clone()));
        assert!(!second.try_acquire_once().await.unwrap());
        assert!(!third.try_acquire_once().await.unwrap());

        first.release().await;
        assert!(!first.is_leader());

        let mut promoted = 0;
        if second.try_acquire_once().await.unwrap() {
            promoted += 1;
        }
        if third.try_acquire_once().await.unwrap() {
            promoted += 1;
        }
        assert_eq!(promoted, 1);
    }

    #[tokio::test]
    async fn heartbeat_mismatch_demotes_without_stealing() {
        let lock_store = Arc::new(MemoryLockStore::new());
        let metrics = Arc::new(SyncMetrics::new());
        let elector = LeaderElector::new(lock_store.clone(), config("a"), metrics.clone());
        assert!(elector.try_acquire_once().await.unwrap());

        // someone else took over after an expiry
        lock_store.release_if_held("test:leader", "a").await.unwrap();
        lock_store
            .try_acquire("test:leader", "b", Duration::from_secs(5))
            .await
            .unwrap();

        elector.heartbeat_once().await;
        assert!(!elector.is_leader());
        assert_eq!(
            lock_store.holder("test:leader").await.unwrap().as_deref(),
            Some("b")
        );
        assert_eq!(metrics.snapshot().demotions, 1);
    }

    #[tokio::test]
    async fn store_failure_degrades_to_follower() {
        let lock_store = Arc::new(MemoryLockStore::new());
        let metrics = Arc::new(SyncMetrics::new());
        let elector = LeaderElector::new(lock_store.clone(), config("a"), metrics.clone());
        assert!(elector.try_acquire_once().await.unwrap());

        lock_store.set_fail_mode(true);
        elector.heartbeat_once().await;
        assert!(!elector.is_leader());
        assert_eq!(metrics.snapshot().heartbeat_errors, 1);

        // acquisition while the store is down also reports follower
        lock_store.set_fail_mode(false);
        assert!(elector.try_acquire_once().await.unwrap());
        assert!(elector.is_leader());
    }

    #[tokio::test]
    async fn election_loop_promotes_and_successor_takes_over() {
        let store: Arc<dyn LockStore> = Arc::new(MemoryLockStore::new());
        let metrics = Arc::new(SyncMetrics::new());

        let first = Arc::new(LeaderElector::new(store.clone(), config("a"), metrics.clone()));
        let second = Arc::new(LeaderElector::new(store.clone(), config("b"), metrics.clone()));

        let mut second_states = second.subscribe();

        let first_handle = first.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(first.is_leader());

        let second_handle = second.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_leader());

        // graceful stop releases the lock; the follower promotes well
        // before the TTL would have expired it
        first_handle.stop().await;
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                second_states.changed().await.unwrap();
                if second_states.borrow_and_update().is_leader() {
                    break;
                }
            }
        })
        .await
        .expect("follower was not promoted after release");

        second_handle.stop().await;
        assert!(!second.is_leader());
        assert_eq!(store.holder("test:leader").await.unwrap(), None);
    }
}
