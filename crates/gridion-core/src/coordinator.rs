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

//! Fetch coordinator: runs one refresh cycle at a time against the
//! provider, producing an immutable published snapshot per cycle.
//!
//! Each cycle seeds its snapshot from the previously published one, so a
//! failing account keeps its prior data in the published view. Fetch
//! windows depend on the cycle mode: the first refresh pulls the maximal
//! history (465 days of monthly usage, 5 years of AMI data), later cycles
//! pull trailing windows sized to the upstream feeds' own lag.

use crate::model::{
    AmiReading, BillingAccount, CoordinatorData, CostRecord, FuelType, MeterData, RefreshMode,
    UsageRecord,
};
use crate::traits::{FetchError, MeterDataSource};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// Monthly usage lookback on the first refresh (about 15 months)
const FIRST_REFRESH_USAGE_DAYS: i64 = 465;
/// AMI lookback on the first refresh (about 5 years)
const FIRST_REFRESH_AMI_DAYS: i64 = 1825;
/// AMI lookback on later full refreshes. The feed reports with a ~2 day
/// lag, so a few extra days catch readings that became available late.
const TRAILING_AMI_DAYS: i64 = 5;
/// Interval-read lookback. The upstream endpoint retains about 43 hours.
const INTERVAL_LOOKBACK_HOURS: i64 = 42;

pub struct FetchCoordinator {
    source: Arc<dyn MeterDataSource>,
    accounts: Vec<String>,
    current: RwLock<Arc<CoordinatorData>>,
    first_refresh: AtomicBool,
    service_available: AtomicBool,
    pending_filter: Mutex<Option<Vec<String>>>,
}

impl FetchCoordinator {
    pub fn new(source: Arc<dyn MeterDataSource>, accounts: Vec<String>) -> Self {
        Self {
            source,
            accounts,
            current: RwLock::new(Arc::new(CoordinatorData::empty())),
            first_refresh: AtomicBool::new(true),
            service_available: AtomicBool::new(true),
            pending_filter: Mutex::new(None),
        }
    }

    /// The last published snapshot
    pub fn current(&self) -> Arc<CoordinatorData> {
        self.current.read().clone()
    }

    /// Whether the next cycle will run as a full historical import
    pub fn is_first_refresh(&self) -> bool {
        self.first_refresh.load(Ordering::SeqCst)
    }

    /// Arm the next cycle to run a full historical import. An optional
    /// account filter restricts that cycle to the matching accounts;
    /// unknown accounts are ignored with a warning.
    pub fn reset_to_first_refresh(&self, filter: Option<Vec<String>>) {
        if let Some(wanted) = &filter {
            if !wanted.iter().any(|a| self.accounts.contains(a)) {
                warn!(
                    "⚠️ [COORD] Resync requested for unknown account(s) {:?}, ignoring",
                    wanted
                );
                return;
            }
            info!(
                "🔄 [COORD] Reset to first refresh for accounts {:?} (full historical import)",
                wanted
            );
        } else {
            info!("🔄 [COORD] Reset to first refresh (full historical import)");
        }
        *self.pending_filter.lock() = filter;
        self.first_refresh.store(true, Ordering::SeqCst);
    }

    /// Run one refresh cycle and publish its snapshot.
    ///
    /// A pending first refresh wins over the requested mode. Recoverable
    /// per-account errors are contained; an authentication error aborts
    /// the cycle and leaves the previous snapshot published.
    pub async fn run_cycle(
        &self,
        requested: RefreshMode,
    ) -> Result<Arc<CoordinatorData>, FetchError> {
        self.run_cycle_at(requested, Utc::now()).await
    }

    async fn run_cycle_at(
        &self,
        requested: RefreshMode,
        now: DateTime<Utc>,
    ) -> Result<Arc<CoordinatorData>, FetchError> {
        let first = self.first_refresh.load(Ordering::SeqCst);
        let mode = if first { RefreshMode::First } else { requested };
        let filter = self.pending_filter.lock().clone();

        let selected: Vec<String> = match &filter {
            Some(wanted) => self
                .accounts
                .iter()
                .filter(|a| wanted.contains(*a))
                .cloned()
                .collect(),
            None => self.accounts.clone(),
        };

        info!(
            "🔄 [COORD] Starting {} refresh for {} account(s)",
            mode,
            selected.len()
        );
        if mode == RefreshMode::First {
            info!("📊 [COORD] First refresh: importing full history (up to 5 years of AMI data)");
        }

        let today = now.date_naive();
        let from_month = if mode == RefreshMode::First {
            let from_date = today - Duration::days(FIRST_REFRESH_USAGE_DAYS);
            from_date.year() as u32 * 100 + from_date.month()
        } else {
            (today.year() - 1) as u32 * 100 + today.month()
        };
        if mode.fetches_full_feeds() {
            debug!("🔍 [COORD] Fetching usages from month {}", from_month);
        }

        let previous = self.current();
        let mut data = CoordinatorData::seeded_from(&previous, mode);
        let mut failed = 0usize;

        for account_number in &selected {
            match self
                .fetch_account(account_number, today, from_month, now, &mut data)
                .await
            {
                Ok(()) => {
                    data.refreshed_accounts.insert(account_number.clone());
                }
                Err(e) if e.aborts_cycle() => {
                    error!(
                        "❌ [COORD] Authentication failed during {} refresh: {}",
                        mode, e
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "⚠️ [COORD] Error fetching data for account {}: {}",
                        account_number, e
                    );
                    failed += 1;
                }
            }
        }

        let all_failed = !selected.is_empty() && failed == selected.len();
        if all_failed {
            if self.service_available.swap(false, Ordering::SeqCst) {
                warn!("⚠️ [COORD] Provider service unavailable: every account fetch failed");
            }
        } else if !self.service_available.swap(true, Ordering::SeqCst) {
            info!("✅ [COORD] Provider service recovered");
        }

        if first && !all_failed {
            self.first_refresh.store(false, Ordering::SeqCst);
            *self.pending_filter.lock() = None;
            info!("✅ [COORD] First refresh complete, switching to incremental updates");
        }

        let interval_count: usize = data.interval_reads.values().map(Vec::len).sum();
        if mode == RefreshMode::IntervalOnly {
            info!(
                "✅ [COORD] Interval-only refresh complete: {} interval read(s)",
                interval_count
            );
        } else {
            let ami_count: usize = data.ami_readings.values().map(Vec::len).sum();
            info!(
                "✅ [COORD] {} refresh complete: {} AMI record(s), {} interval read(s)",
                mode, ami_count, interval_count
            );
        }

        let published = Arc::new(data);
        *self.current.write() = Arc::clone(&published);
        Ok(published)
    }

    /// Fetch billing, monthly feeds and meter feeds for one account.
    /// Only authentication errors bubble out of the feed helpers.
    async fn fetch_account(
        &self,
        account_number: &str,
        today: NaiveDate,
        from_month: u32,
        now: DateTime<Utc>,
        data: &mut CoordinatorData,
    ) -> Result<(), FetchError> {
        debug!("🔍 [COORD] Fetching billing account {}", account_number);
        let account = self.source.fetch_billing_account(account_number).await?;
        debug!(
            "🔍 [COORD] Account {}: region={}, {} meter(s)",
            account_number,
            if account.region.is_empty() {
                "<none>"
            } else {
                &account.region
            },
            account.meters.len()
        );

        for meter in &account.meters {
            if meter.service_point_number.is_empty() {
                continue;
            }
            debug!(
                "🔍 [COORD] Found meter: service_point={}, fuel_type={}",
                meter.service_point_number, meter.fuel_type
            );
            data.meters.insert(
                meter.service_point_number.clone(),
                MeterData {
                    account_number: account_number.to_string(),
                    premise_number: account.premise_number.clone(),
                    meter: meter.clone(),
                },
            );
        }

        // Monthly feeds change at most daily; interval-only cycles skip them
        if data.mode.fetches_full_feeds() {
            let usages = self.fetch_usages(account_number, from_month).await?;
            data.usages.insert(account_number.to_string(), usages);

            let costs = self.fetch_costs(account_number, &account, today).await?;
            data.costs.insert(account_number.to_string(), costs);
        }

        self.fetch_meter_feeds(account_number, &account, today, now, data)
            .await?;

        data.accounts.insert(account_number.to_string(), account);
        Ok(())
    }

    /// Monthly usage feed. Recoverable errors degrade to an empty list,
    /// replacing any seeded records for the account.
    async fn fetch_usages(
        &self,
        account_number: &str,
        from_month: u32,
    ) -> Result<Vec<UsageRecord>, FetchError> {
        match self
            .source
            .fetch_energy_usages(account_number, from_month)
            .await
        {
            Ok(usages) => {
                debug!(
                    "🔍 [COORD] Fetched {} usage record(s) for account {}",
                    usages.len(),
                    account_number
                );
                Ok(usages)
            }
            Err(e) if e.aborts_cycle() => Err(e),
            Err(e) => {
                debug!(
                    "🔍 [COORD] Could not fetch energy usages for account {}: {}",
                    account_number, e
                );
                Ok(Vec::new())
            }
        }
    }

    /// Monthly cost feed. Accounts without a regional company code have
    /// no cost feed at all.
    async fn fetch_costs(
        &self,
        account_number: &str,
        account: &BillingAccount,
        today: NaiveDate,
    ) -> Result<Vec<CostRecord>, FetchError> {
        if account.region.is_empty() {
            debug!(
                "🔍 [COORD] No region for account {}, skipping costs",
                account_number
            );
            return Ok(Vec::new());
        }
        match self
            .source
            .fetch_energy_usage_costs(account_number, today, &account.region)
            .await
        {
            Ok(costs) => {
                debug!(
                    "🔍 [COORD] Fetched {} cost record(s) for account {}",
                    costs.len(),
                    account_number
                );
                Ok(costs)
            }
            Err(e) if e.aborts_cycle() => Err(e),
            Err(e) => {
                debug!(
                    "🔍 [COORD] Could not fetch energy costs for account {}: {}",
                    account_number, e
                );
                Ok(Vec::new())
            }
        }
    }

    /// AMI and interval feeds for the account's AMI-capable meters.
    /// Feed failures here keep the seeded entry instead of overwriting it,
    /// so one flaky meter feed never erases known history. The exception
    /// is a first refresh, whose import restarts cumulative sums at zero:
    /// there a seeded batch from an earlier cycle is dropped instead of
    /// left to replay against the fresh baseline.
    async fn fetch_meter_feeds(
        &self,
        account_number: &str,
        account: &BillingAccount,
        today: NaiveDate,
        now: DateTime<Utc>,
        data: &mut CoordinatorData,
    ) -> Result<(), FetchError> {
        for meter in &account.meters {
            if !meter.has_ami_smart_meter {
                continue;
            }
            let service_point = &meter.service_point_number;
            if service_point.is_empty() {
                continue;
            }

            if data.mode.fetches_full_feeds() {
                // The AMI endpoint only returns data older than ~2 days;
                // requesting up to today lets it decide what is available.
                let date_from = if data.mode == RefreshMode::First {
                    let from = today - Duration::days(FIRST_REFRESH_AMI_DAYS);
                    info!(
                        "📊 [COORD] First refresh: fetching AMI data from {} to {} for meter {}",
                        from, today, service_point
                    );
                    from
                } else {
                    let from = today - Duration::days(TRAILING_AMI_DAYS);
                    debug!(
                        "🔍 [COORD] Fetching AMI data from {} to {} for meter {}",
                        from, today, service_point
                    );
                    from
                };

                match self
                    .source
                    .fetch_ami_readings(meter, &account.premise_number, date_from, today)
                    .await
                {
                    Ok(readings) => {
                        let dates: Vec<&String> =
                            readings.iter().map(|r| &r.date).collect();
                        match (dates.iter().min(), dates.iter().max()) {
                            (Some(min), Some(max)) => info!(
                                "📊 [COORD] Fetched {} AMI record(s) for meter {} ({} to {})",
                                readings.len(),
                                service_point,
                                min,
                                max
                            ),
                            _ => debug!(
                                "🔍 [COORD] No AMI records returned for meter {}",
                                service_point
                            ),
                        }
                        data.ami_readings.insert(service_point.clone(), readings);
                    }
                    Err(e) if e.aborts_cycle() => return Err(e),
                    Err(e) => {
                        debug!(
                            "🔍 [COORD] Could not fetch AMI usages for meter {}: {}",
                            service_point, e
                        );
                        if data.mode == RefreshMode::First {
                            data.ami_readings.remove(service_point);
                        }
                    }
                }
            }

            // Gas meters have no interval feed
            if meter.fuel_type == FuelType::Gas {
                continue;
            }

            let start = (now - Duration::hours(INTERVAL_LOOKBACK_HOURS)).naive_utc();
            match self
                .source
                .fetch_interval_reads(&account.premise_number, service_point, start)
                .await
            {
                Ok(reads) => {
                    debug!(
                        "🔍 [COORD] Fetched {} interval read(s) for meter {} of account {}",
                        reads.len(),
                        service_point,
                        account_number
                    );
                    data.interval_reads.insert(service_point.clone(), reads);
                }
                Err(e) if e.aborts_cycle() => return Err(e),
                Err(e) => debug!(
                    "🔍 [COORD] Could not fetch interval reads for meter {}: {}",
                    service_point, e
                ),
            }
        }
        Ok(())
    }

    // ============= Published Snapshot Accessors =============

    /// Meter with account context for a service point
    pub fn meter_data(&self, service_point: &str) -> Option<MeterData> {
        self.current.read().meter_data(service_point).cloned()
    }

    /// Most recent monthly usage record for an account and fuel
    pub fn latest_usage(&self, account_number: &str, fuel: FuelType) -> Option<UsageRecord> {
        self.current.read().latest_usage(account_number, fuel).cloned()
    }

    /// All monthly usage records for an account
    pub fn all_usages(&self, account_number: &str) -> Vec<UsageRecord> {
        self.current.read().all_usages(account_number).to_vec()
    }

    /// Most recent monthly cost record for an account and fuel
    pub fn latest_cost(&self, account_number: &str, fuel: FuelType) -> Option<CostRecord> {
        self.current.read().latest_cost(account_number, fuel).cloned()
    }

    /// All monthly cost records for an account
    pub fn all_costs(&self, account_number: &str) -> Vec<CostRecord> {
        self.current.read().all_costs(account_number).to_vec()
    }

    /// Most recent AMI reading for a service point
    pub fn latest_ami_reading(&self, service_point: &str) -> Option<AmiReading> {
        self.current.read().latest_ami_reading(service_point).cloned()
    }
}
