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

//! Refresh scheduling: one startup refresh, then hourly ticks.
//!
//! The first tick of each UTC day (after a configurable offset that gives
//! the provider time to publish yesterday's AMI data) runs a midnight full
//! refresh; every other tick runs interval-only. Manual resync requests
//! arrive over a channel and re-arm the coordinator's first-refresh mode
//! before the next tick.

use crate::coordinator::FetchCoordinator;
use crate::model::RefreshMode;
use crate::statistics::StatisticsImporter;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use crossbeam_channel::Receiver;
use futures_timer::Delay;
use gridion_types::SchedulerConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Manual full-resync request delivered to the scheduler loop
#[derive(Debug, Clone)]
pub struct ResyncRequest {
    /// Restrict the resync to these accounts; `None` resyncs everything
    pub accounts: Option<Vec<String>>,
}

pub struct RefreshScheduler {
    coordinator: Arc<FetchCoordinator>,
    importer: Arc<StatisticsImporter>,
    config: SchedulerConfig,
    resync: Receiver<ResyncRequest>,
}

impl RefreshScheduler {
    pub fn new(
        coordinator: Arc<FetchCoordinator>,
        importer: Arc<StatisticsImporter>,
        config: SchedulerConfig,
        resync: Receiver<ResyncRequest>,
    ) -> Self {
        Self {
            coordinator,
            importer,
            config,
            resync,
        }
    }

    /// Run the scheduler loop. Never returns; the owning task is expected
    /// to be dropped on shutdown.
    pub async fn run(self) {
        info!(
            "🚀 [SCHED] Scheduler started (tick interval {}s, midnight offset {}s)",
            self.config.update_interval_secs, self.config.midnight_offset_secs
        );

        let mut last_full_date = self.execute(RefreshMode::Incremental, None).await;

        loop {
            let interval = Duration::from_secs(self.config.update_interval_secs);
            debug!("💤 [SCHED] Next refresh in {}s", interval.as_secs());
            Delay::new(interval).await;

            self.drain_resync_requests();

            let now = Utc::now();
            let mode = classify_tick(now, last_full_date, self.config.midnight_offset_secs);
            last_full_date = self.execute(mode, last_full_date).await;
        }
    }

    /// Run a single full refresh plus statistics import, then return.
    pub async fn run_once(&self) -> Result<()> {
        let snapshot = self
            .coordinator
            .run_cycle(RefreshMode::Incremental)
            .await
            .context("Refresh cycle failed")?;
        self.importer.import_all(&snapshot).await
    }

    /// One tick: refresh, then import statistics from the published
    /// snapshot. Returns the date of the last successful full refresh.
    async fn execute(
        &self,
        mode: RefreshMode,
        last_full_date: Option<NaiveDate>,
    ) -> Option<NaiveDate> {
        match self.coordinator.run_cycle(mode).await {
            Ok(snapshot) => {
                // The coordinator may promote the requested mode to First
                let latched = if snapshot.mode.fetches_full_feeds() {
                    Some(Utc::now().date_naive())
                } else {
                    last_full_date
                };
                if let Err(e) = self.importer.import_all(&snapshot).await {
                    error!("❌ [SCHED] Statistics import failed: {:#}", e);
                }
                latched
            }
            Err(e) if e.aborts_cycle() => {
                error!(
                    "❌ [SCHED] Refresh aborted, check the configured API token: {}",
                    e
                );
                last_full_date
            }
            Err(e) => {
                error!("❌ [SCHED] {} refresh failed: {}", mode, e);
                last_full_date
            }
        }
    }

    fn drain_resync_requests(&self) {
        while let Ok(request) = self.resync.try_recv() {
            info!("🔄 [SCHED] Manual resync request received");
            self.coordinator.reset_to_first_refresh(request.accounts);
        }
    }
}

/// Decide what kind of refresh an upcoming tick should run. The first
/// tick on a date with no full refresh yet, at or past UTC midnight plus
/// the offset, runs the daily full refresh.
fn classify_tick(
    now: DateTime<Utc>,
    last_full_date: Option<NaiveDate>,
    midnight_offset_secs: u64,
) -> RefreshMode {
    let today = now.date_naive();
    if last_full_date == Some(today) {
        return RefreshMode::IntervalOnly;
    }
    let threshold = today
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now)
        + ChronoDuration::seconds(midnight_offset_secs as i64);
    if now >= threshold {
        RefreshMode::Midnight
    } else {
        RefreshMode::IntervalOnly
    }
}
