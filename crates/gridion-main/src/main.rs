// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of GridION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! GridION daemon entry point. Wires the provider client, fetch
//! coordinator, statistics store and refresh scheduler together.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::FmtSubscriber;

use gridion_adapters::{MemoryStatisticsStore, SqliteStatisticsStore, UtilityMeterAdapter};
use gridion_client::UtilityClient;
use gridion_core::{
    FetchCoordinator, MeterDataSource, RefreshScheduler, ResyncRequest, StatisticsImporter,
    StatisticsStore,
};
use gridion_types::AppConfig;

#[derive(Parser)]
#[command(name = "gridion")]
#[command(about = "Utility meter data retrieval and statistics daemon", long_about = None)]
struct Cli {
    /// Path to the configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single refresh cycle, import statistics and exit
    #[arg(long)]
    once: bool,

    /// Keep statistics in memory instead of the configured database
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(run(cli))
}

/// RUST_LOG wins over the configured level so operators can raise
/// verbosity without touching the config file.
fn init_tracing(configured_level: &str) {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(configured_level)),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    init_tracing(&config.system.log_level);

    info!("🚀 Starting GridION - Utility Meter Statistics");
    info!("📋 Configuration Summary:");
    info!("   Accounts: {}", config.provider.accounts.len());
    for account in &config.provider.accounts {
        info!("     - {}", account);
    }
    info!("   Statistics database: {}", config.statistics.database_path);
    info!("   Series namespace: {}", config.statistics.namespace);
    info!(
        "   Gas unit conversion: {:?}",
        config.statistics.gas_unit_conversion
    );
    info!(
        "   Update interval: {}s",
        config.scheduler.update_interval_secs
    );
    info!(
        "   Midnight offset: {}s",
        config.scheduler.midnight_offset_secs
    );

    let client = UtilityClient::new(
        config.provider.base_url.clone(),
        config.provider.api_token.clone(),
    )
    .context("Failed to initialize provider client")?;

    let source: Arc<dyn MeterDataSource> = Arc::new(UtilityMeterAdapter::new(client));
    info!("🔌 Meter data source: {}", source.name());

    let store: Arc<dyn StatisticsStore> = if cli.dry_run {
        info!("🔍 Dry run: statistics stay in memory and are discarded on exit");
        Arc::new(MemoryStatisticsStore::new())
    } else {
        Arc::new(
            SqliteStatisticsStore::open(&config.statistics.database_path)
                .context("Failed to open statistics database")?,
        )
    };
    info!("📊 Statistics store: {}", store.name());

    let coordinator = Arc::new(FetchCoordinator::new(
        source,
        config.provider.accounts.clone(),
    ));
    let importer = Arc::new(StatisticsImporter::new(
        store,
        config.statistics.namespace.clone(),
        config.statistics.gas_unit_conversion,
    ));

    let (resync_tx, resync_rx) = crossbeam_channel::bounded(4);
    let scheduler = RefreshScheduler::new(
        coordinator,
        importer,
        config.scheduler.clone(),
        resync_rx,
    );

    if cli.once {
        info!("🔄 Running a single refresh cycle");
        scheduler.run_once().await?;
        info!("✅ Single refresh complete");
        return Ok(());
    }

    spawn_resync_signal_task(resync_tx);

    tokio::select! {
        () = scheduler.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("👋 Shutdown signal received, exiting");
        }
    }

    Ok(())
}

/// SIGUSR1 queues a full resync: the next scheduler tick re-runs the
/// first-refresh window and rebuilds every statistic series.
fn spawn_resync_signal_task(resync: crossbeam_channel::Sender<ResyncRequest>) {
    tokio::spawn(async move {
        let mut stream = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::user_defined1(),
        ) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("⚠️ SIGUSR1 handler unavailable, manual resync disabled: {}", e);
                return;
            }
        };

        while stream.recv().await.is_some() {
            info!("🔄 SIGUSR1 received, queueing full resync");
            match resync.try_send(ResyncRequest { accounts: None }) {
                Ok(()) => {}
                Err(crossbeam_channel::TrySendError::Full(_)) => {
                    debug!("🔍 Resync already queued, ignoring repeated signal");
                }
                Err(crossbeam_channel::TrySendError::Disconnected(_)) => return,
            }
        }
    });
}
