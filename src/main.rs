mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use node_health_sentinel::api::{self, AppState};
use node_health_sentinel::config::Config;
use node_health_sentinel::dashboard::DashboardClient;
use node_health_sentinel::eval_stats::EvalStats;
use node_health_sentinel::evaluator::NodeHealthEvaluator;
use node_health_sentinel::explorer::ExplorerClient;
use node_health_sentinel::models::{Address, WatchedAddress};
use node_health_sentinel::scheduler::{ReportStore, Scheduler};
use node_health_sentinel::storage;
use node_health_sentinel::window::HealthPolicy;

use crate::cli::{Cli, Commands, WatchAction};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    let stats = Arc::new(EvalStats::new());

    match cli.command {
        Commands::Check { addresses } => {
            let addresses = addresses
                .iter()
                .map(|raw| raw.parse::<Address>())
                .collect::<Result<Vec<_>, _>>()?;
            let evaluator = build_evaluator(&config, stats)?;
            let reports = evaluator
                .evaluate(&addresses, &CancellationToken::new())
                .await;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Commands::Alerts { chat } => {
            let pool = storage::init_pool(&config.database_url).await?;
            let addresses: Vec<Address> = storage::list_addresses(&pool, chat)
                .await?
                .into_iter()
                .map(|entry| entry.address)
                .collect();
            let evaluator = build_evaluator(&config, stats)?;
            let alerts = evaluator
                .check_alerts(&addresses, &CancellationToken::new())
                .await;
            println!("{}", serde_json::to_string_pretty(&alerts)?);
        }
        Commands::Watch { action } => {
            let pool = storage::init_pool(&config.database_url).await?;
            match action {
                WatchAction::Add { chat, entry } => {
                    let entry = WatchedAddress::parse(&entry)?;
                    storage::add_address(&pool, chat, &entry).await?;
                    tracing::info!(chat, address = %entry.address, "address added");
                }
                WatchAction::Remove { chat, address } => {
                    let address: Address = address.parse()?;
                    storage::remove_address(&pool, chat, &address).await?;
                    tracing::info!(chat, %address, "address removed");
                }
                WatchAction::List { chat } => {
                    let entries = storage::list_addresses(&pool, chat).await?;
                    println!("{}", serde_json::to_string_pretty(&entries)?);
                }
            }
        }
        Commands::SetInterval { chat, secs } => {
            let pool = storage::init_pool(&config.database_url).await?;
            storage::set_update_interval(&pool, chat, secs).await?;
            tracing::info!(chat, secs, "auto update interval set");
        }
        Commands::Serve { addr } => {
            let bind = addr.unwrap_or_else(|| config.http_bind_addr.clone());
            let pool = storage::init_pool(&config.database_url).await?;
            let evaluator = Arc::new(build_evaluator(&config, stats.clone())?);
            let reports = ReportStore::default();

            let scheduler = Scheduler::new(pool, evaluator.clone(), reports.clone());
            let chats = scheduler
                .start_all(config.default_update_interval_secs)
                .await?;
            tracing::info!(chats, "scheduled auto updates");

            let shutdown = CancellationToken::new();
            let state = AppState {
                evaluator,
                dashboard: DashboardClient::new(&config.dashboard_api_url)?,
                reports,
                stats,
                shutdown: shutdown.clone(),
            };
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutdown requested");
                }
                signal.cancel();
            });

            api::run_http_server(&bind, state, shutdown).await?;
            scheduler.shutdown().await;
        }
    }

    Ok(())
}

fn build_evaluator(config: &Config, stats: Arc<EvalStats>) -> anyhow::Result<NodeHealthEvaluator> {
    let explorer = ExplorerClient::new(
        &config.explorer_api_url,
        config.explorer_api_key.clone(),
        stats.clone(),
    )?;
    Ok(NodeHealthEvaluator::new(
        Arc::new(explorer),
        HealthPolicy::default(),
        config.rate,
        stats,
    ))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}
