//! arena-sync CLI

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use arena_db::{MirrorStore, PostgresStore};
use arena_sync::{AppConfig, SyncError, SyncResult, SyncService};

#[derive(Parser)]
#[command(name = "arena-sync", version, about = "Arena chain sync service")]
struct Cli {
    /// TOML configuration file; environment variables when absent
    #[arg(long, short, global = true)]
    config: Option<String>,

    /// Use the fast in-memory development preset
    #[arg(long, global = true)]
    dev: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the sync service
    Run,
    /// Apply the Postgres mirror schema and exit
    Init,
    /// Re-apply history backward from the chain tip
    Backfill {
        /// Oldest slot to walk back to
        #[arg(long)]
        to_slot: Option<u64>,
    },
    /// Print mirror statistics as JSON
    Status,
}

impl Cli {
    fn load_config(&self) -> SyncResult<AppConfig> {
        if self.dev {
            let mut config = AppConfig::development();
            if config.chain.program_id.is_empty() {
                config.chain.program_id = AppConfig::from_env().chain.program_id;
            }
            return Ok(config);
        }
        AppConfig::load(self.config.as_deref())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> SyncResult<()> {
    let config = cli.load_config()?;

    match cli.command {
        Command::Run => {
            let service = SyncService::build(config).await?;
            service.run().await
        }
        Command::Init => {
            if config.database.url.is_empty() {
                return Err(SyncError::Config(
                    "init requires a configured database url".into(),
                ));
            }
            let store =
                PostgresStore::connect(&config.database.url, config.database.max_connections)
                    .await?;
            store.initialize_schema().await?;
            info!("mirror schema applied");
            Ok(())
        }
        Command::Backfill { to_slot } => {
            let service = SyncService::build(config).await?;
            let applied = service.indexer().backfill(to_slot).await?;
            info!("backfill done, {} transactions applied", applied);
            Ok(())
        }
        Command::Status => {
            let service = SyncService::build(config).await?;
            let stats = service.store().stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}
