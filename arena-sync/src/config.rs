//! Sync Service Configuration
//!
//! Configuration for chain access, mirror database, leader election and
//! lifecycle driving. Supports loading from environment variables with
//! ARENA_ prefix, or from a TOML file.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

/// Chain RPC configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint URL
    pub rpc_url: String,
    /// Base58 address of the arena program
    pub program_id: String,
    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

fn default_rpc_timeout() -> u64 {
    30
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8899".to_string(),
            program_id: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Mirror database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection URL; empty selects the in-memory store
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
        }
    }
}

/// Transaction indexer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Signature poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Maximum signatures fetched per page
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    /// Program account refresh interval in milliseconds
    #[serde(default = "default_account_refresh")]
    pub account_refresh_interval_ms: u64,
}

fn default_poll_interval() -> u64 {
    5_000
}

fn default_page_limit() -> usize {
    1_000
}

fn default_account_refresh() -> u64 {
    20_000
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            page_limit: default_page_limit(),
            account_refresh_interval_ms: default_account_refresh(),
        }
    }
}

impl IndexerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn account_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.account_refresh_interval_ms)
    }
}

/// Round lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Countdown from first entry until the round must start, in milliseconds
    #[serde(default = "default_countdown")]
    pub countdown_ms: u64,
    /// Grace period past the on-chain end timestamp before ending, in milliseconds
    #[serde(default = "default_end_buffer")]
    pub end_buffer_ms: u64,
    /// Pause between consecutive submitted transactions, in milliseconds
    #[serde(default = "default_inter_tx_delay")]
    pub inter_tx_delay_ms: u64,
    /// Age after which a phase held in processing is considered stuck
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold_ms: u64,
    /// Reconciliation scan interval in milliseconds
    #[serde(default = "default_scan_interval")]
    pub scan_interval_ms: u64,
    /// Job attempts before a lifecycle job is marked dead
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Initial retry backoff in milliseconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Terminal jobs retained per status when pruning
    #[serde(default = "default_job_history")]
    pub job_history_keep: usize,
}

fn default_countdown() -> u64 {
    600_000
}

fn default_end_buffer() -> u64 {
    5_000
}

fn default_inter_tx_delay() -> u64 {
    300
}

fn default_stuck_threshold() -> u64 {
    120_000
}

fn default_scan_interval() -> u64 {
    15_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_backoff() -> u64 {
    2_000
}

fn default_max_backoff() -> u64 {
    60_000
}

fn default_job_history() -> usize {
    200
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            countdown_ms: default_countdown(),
            end_buffer_ms: default_end_buffer(),
            inter_tx_delay_ms: default_inter_tx_delay(),
            stuck_threshold_ms: default_stuck_threshold(),
            scan_interval_ms: default_scan_interval(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff(),
            max_backoff_ms: default_max_backoff(),
            job_history_keep: default_job_history(),
        }
    }
}

impl LifecycleConfig {
    pub fn countdown(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.countdown_ms as i64)
    }

    pub fn end_buffer(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.end_buffer_ms as i64)
    }

    pub fn inter_tx_delay(&self) -> Duration {
        Duration::from_millis(self.inter_tx_delay_ms)
    }

    pub fn stuck_threshold(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.stuck_threshold_ms as i64)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }
}

/// Leader election configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Redis URL for the lock store; empty selects the in-memory store
    #[serde(default)]
    pub redis_url: String,
    /// Lock key shared by all instances of one deployment
    #[serde(default = "default_lock_key")]
    pub lock_key: String,
    /// Lock TTL in milliseconds
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_ms: u64,
    /// Heartbeat interval while leading, in milliseconds
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_ms: u64,
    /// Acquisition retry interval while following, in milliseconds
    #[serde(default = "default_election_retry")]
    pub retry_interval_ms: u64,
    /// Unique identity of this instance; generated when absent
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
}

fn default_lock_key() -> String {
    "arena:sync:leader".to_string()
}

fn default_lock_ttl() -> u64 {
    30_000
}

fn default_heartbeat() -> u64 {
    10_000
}

fn default_election_retry() -> u64 {
    5_000
}

fn default_instance_id() -> String {
    Uuid::new_v4().to_string()
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            redis_url: String::new(),
            lock_key: default_lock_key(),
            lock_ttl_ms: default_lock_ttl(),
            heartbeat_interval_ms: default_heartbeat(),
            retry_interval_ms: default_election_retry(),
            instance_id: default_instance_id(),
        }
    }
}

impl ElectionConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Price oracle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Price feed endpoint; empty selects the static oracle
    #[serde(default)]
    pub url: String,
    /// Cache refresh interval in milliseconds
    #[serde(default = "default_oracle_refresh")]
    pub refresh_interval_ms: u64,
    /// Request timeout in seconds
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
}

fn default_oracle_refresh() -> u64 {
    10_000
}

fn default_oracle_timeout() -> u64 {
    10
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            refresh_interval_ms: default_oracle_refresh(),
            timeout_secs: default_oracle_timeout(),
        }
    }
}

impl OracleConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

/// Authority signer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Hex-encoded 32-byte signing key
    #[serde(default)]
    pub secret_key_hex: Option<String>,
    /// Path to a file holding the hex-encoded key
    #[serde(default)]
    pub key_file: Option<String>,
}

/// Operational HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_bind")]
    pub bind: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_api_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_api_bind(),
            enabled: true,
        }
    }
}

/// Full service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub election: ElectionConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - ARENA_RPC_URL: chain JSON-RPC endpoint
    /// - ARENA_PROGRAM_ID: base58 program address
    /// - ARENA_DATABASE_URL: Postgres URL (empty: in-memory mirror)
    /// - ARENA_REDIS_URL: Redis URL for the leader lock (empty: in-memory lock)
    /// - ARENA_ORACLE_URL: price feed endpoint (empty: static oracle)
    /// - ARENA_SIGNER_KEY / ARENA_SIGNER_KEY_FILE: authority signing key
    /// - ARENA_API_BIND: ops API listen address
    /// - ARENA_POLL_INTERVAL_MS, ARENA_PAGE_LIMIT, ARENA_ACCOUNT_REFRESH_MS
    /// - ARENA_COUNTDOWN_MS, ARENA_END_BUFFER_MS, ARENA_INTER_TX_DELAY_MS
    /// - ARENA_STUCK_THRESHOLD_MS, ARENA_SCAN_INTERVAL_MS
    /// - ARENA_LOCK_KEY, ARENA_LOCK_TTL_MS, ARENA_HEARTBEAT_MS
    /// - ARENA_INSTANCE_ID: stable instance identity (default: random v4)
    pub fn from_env() -> Self {
        let defaults = LifecycleConfig::default();
        Self {
            chain: ChainConfig {
                rpc_url: env_var("ARENA_RPC_URL")
                    .unwrap_or_else(|| ChainConfig::default().rpc_url),
                program_id: env_var("ARENA_PROGRAM_ID").unwrap_or_default(),
                timeout_secs: env_parse("ARENA_RPC_TIMEOUT_SECS", default_rpc_timeout()),
            },
            database: DatabaseConfig {
                url: env_var("ARENA_DATABASE_URL").unwrap_or_default(),
                max_connections: env_parse("ARENA_DATABASE_POOL", default_max_connections()),
            },
            indexer: IndexerConfig {
                poll_interval_ms: env_parse("ARENA_POLL_INTERVAL_MS", default_poll_interval()),
                page_limit: env_parse("ARENA_PAGE_LIMIT", default_page_limit()),
                account_refresh_interval_ms: env_parse(
                    "ARENA_ACCOUNT_REFRESH_MS",
                    default_account_refresh(),
                ),
            },
            lifecycle: LifecycleConfig {
                countdown_ms: env_parse("ARENA_COUNTDOWN_MS", defaults.countdown_ms),
                end_buffer_ms: env_parse("ARENA_END_BUFFER_MS", defaults.end_buffer_ms),
                inter_tx_delay_ms: env_parse("ARENA_INTER_TX_DELAY_MS", defaults.inter_tx_delay_ms),
                stuck_threshold_ms: env_parse(
                    "ARENA_STUCK_THRESHOLD_MS",
                    defaults.stuck_threshold_ms,
                ),
                scan_interval_ms: env_parse("ARENA_SCAN_INTERVAL_MS", defaults.scan_interval_ms),
                max_attempts: env_parse("ARENA_JOB_MAX_ATTEMPTS", defaults.max_attempts),
                retry_backoff_ms: env_parse("ARENA_RETRY_BACKOFF_MS", defaults.retry_backoff_ms),
                max_backoff_ms: env_parse("ARENA_MAX_BACKOFF_MS", defaults.max_backoff_ms),
                job_history_keep: env_parse("ARENA_JOB_HISTORY_KEEP", defaults.job_history_keep),
            },
            election: ElectionConfig {
                redis_url: env_var("ARENA_REDIS_URL").unwrap_or_default(),
                lock_key: env_var("ARENA_LOCK_KEY").unwrap_or_else(default_lock_key),
                lock_ttl_ms: env_parse("ARENA_LOCK_TTL_MS", default_lock_ttl()),
                heartbeat_interval_ms: env_parse("ARENA_HEARTBEAT_MS", default_heartbeat()),
                retry_interval_ms: env_parse("ARENA_ELECTION_RETRY_MS", default_election_retry()),
                instance_id: env_var("ARENA_INSTANCE_ID").unwrap_or_else(default_instance_id),
            },
            oracle: OracleConfig {
                url: env_var("ARENA_ORACLE_URL").unwrap_or_default(),
                refresh_interval_ms: env_parse("ARENA_ORACLE_REFRESH_MS", default_oracle_refresh()),
                timeout_secs: env_parse("ARENA_ORACLE_TIMEOUT_SECS", default_oracle_timeout()),
            },
            signer: SignerConfig {
                secret_key_hex: env_var("ARENA_SIGNER_KEY"),
                key_file: env_var("ARENA_SIGNER_KEY_FILE"),
            },
            api: ApiConfig {
                bind: env_var("ARENA_API_BIND").unwrap_or_else(default_api_bind),
                enabled: env_parse("ARENA_API_ENABLED", true),
            },
        }
    }

    /// Load from a TOML file, falling back to environment variables.
    pub fn load(path: Option<&str>) -> SyncResult<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| SyncError::Config(format!("read {path}: {e}")))?;
                toml::from_str(&raw).map_err(|e| SyncError::Config(format!("parse {path}: {e}")))
            }
            None => Ok(Self::from_env()),
        }
    }

    /// Preset for local development: fast cadence, in-memory backends.
    pub fn development() -> Self {
        let mut config = Self::default();
        config.indexer.poll_interval_ms = 1_000;
        config.indexer.account_refresh_interval_ms = 5_000;
        config.lifecycle.scan_interval_ms = 2_000;
        config.lifecycle.countdown_ms = 60_000;
        config.election.lock_ttl_ms = 6_000;
        config.election.heartbeat_interval_ms = 2_000;
        config.election.retry_interval_ms = 1_000;
        config
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.chain.program_id.is_empty() {
            return Err(SyncError::Config("program_id is required".into()));
        }
        if self.election.heartbeat_interval_ms >= self.election.lock_ttl_ms {
            return Err(SyncError::Config(
                "heartbeat interval must be shorter than lock TTL".into(),
            ));
        }
        if self.indexer.page_limit == 0 {
            return Err(SyncError::Config("page_limit must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let config = AppConfig::default();
        assert_eq!(config.indexer.poll_interval_ms, 5_000);
        assert_eq!(config.lifecycle.countdown_ms, 600_000);
        assert_eq!(config.lifecycle.end_buffer_ms, 5_000);
        assert_eq!(config.election.lock_ttl_ms, 30_000);
        assert_eq!(config.election.heartbeat_interval_ms, 10_000);
        assert!(config.election.heartbeat_interval_ms < config.election.lock_ttl_ms);
    }

    #[test]
    fn validation_requires_program_id() {
        let config = AppConfig::default();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.chain.program_id = "ArenaProg1111111111111111111111111111111111".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_rejects_heartbeat_slower_than_ttl() {
        let mut config = AppConfig::default();
        config.chain.program_id = "ArenaProg1111111111111111111111111111111111".to_string();
        config.election.heartbeat_interval_ms = 40_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_env_reads_documented_names() {
        let vars = [
            ("ARENA_RPC_URL", "http://rpc.example:8899"),
            (
                "ARENA_PROGRAM_ID",
                "ArenaProg1111111111111111111111111111111111",
            ),
            ("ARENA_DATABASE_POOL", "32"),
            ("ARENA_PAGE_LIMIT", "250"),
            ("ARENA_COUNTDOWN_MS", "90000"),
            ("ARENA_HEARTBEAT_MS", "4000"),
            ("ARENA_ELECTION_RETRY_MS", "1500"),
            ("ARENA_SIGNER_KEY_FILE", "/tmp/authority.hex"),
            ("ARENA_API_BIND", "127.0.0.1:9090"),
        ];
        for (name, value) in vars {
            env::set_var(name, value);
        }

        let config = AppConfig::from_env();
        assert_eq!(config.chain.rpc_url, "http://rpc.example:8899");
        assert_eq!(
            config.chain.program_id,
            "ArenaProg1111111111111111111111111111111111"
        );
        assert_eq!(config.database.max_connections, 32);
        assert_eq!(config.indexer.page_limit, 250);
        assert_eq!(config.lifecycle.countdown_ms, 90_000);
        assert_eq!(config.election.heartbeat_interval_ms, 4_000);
        assert_eq!(config.election.retry_interval_ms, 1_500);
        assert_eq!(config.signer.key_file.as_deref(), Some("/tmp/authority.hex"));
        assert_eq!(config.api.bind, "127.0.0.1:9090");

        for (name, _) in vars {
            env::remove_var(name);
        }
    }

    #[test]
    fn toml_round_trip_keeps_sections() {
        let mut config = AppConfig::development();
        config.chain.program_id = "ArenaProg1111111111111111111111111111111111".to_string();
        let raw = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.chain.program_id, config.chain.program_id);
        assert_eq!(parsed.lifecycle.countdown_ms, 60_000);
    }
}
