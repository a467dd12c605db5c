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

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

// ============= Fuel Types =============

/// Fuel types measured by provider meters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FuelType {
    Electric,
    Gas,
}

impl FuelType {
    /// Get human-readable name for the fuel type
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Electric => "Electric",
            Self::Gas => "Gas",
        }
    }

    /// Usage-type tag carried by monthly usage records for this fuel
    pub fn usage_type_tag(&self) -> &'static str {
        match self {
            Self::Electric => "TOTAL_KWH",
            Self::Gas => "THERMS",
        }
    }

    /// List all supported fuel types
    pub fn all() -> &'static [FuelType] {
        &[Self::Electric, Self::Gas]
    }
}

impl fmt::Display for FuelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for FuelType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "electric" => Ok(Self::Electric),
            "gas" => Ok(Self::Gas),
            _ => Err(anyhow::anyhow!(
                "Unknown fuel type: '{}'. Supported types: {}",
                s,
                Self::all()
                    .iter()
                    .map(|t| t.display_name())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

// ============= Accounts & Meters =============

/// A provider billing account with its attached meters.
/// Fetched fresh every cycle; one immutable value per snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingAccount {
    pub account_number: String,
    /// Regional company code; empty for accounts without a billing region
    pub region: String,
    pub premise_number: String,
    pub meters: Vec<Meter>,
}

/// A single meter on a billing account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meter {
    pub meter_number: String,
    /// Stable identity key joining the AMI, interval and statistics feeds
    pub service_point_number: String,
    pub meter_point_number: String,
    pub fuel_type: FuelType,
    pub has_ami_smart_meter: bool,
    pub is_smart_meter: bool,
}

/// A meter together with its owning account context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterData {
    pub account_number: String,
    pub premise_number: String,
    pub meter: Meter,
}

// ============= Feed Records =============

/// One monthly usage record. `year_month` is encoded YYYYMM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub account_number: String,
    pub year_month: u32,
    /// Usage-type tag from the feed, e.g. "TOTAL_KWH" or "THERMS"
    pub usage_type: String,
    pub quantity: f64,
}

/// One monthly cost record in dollars
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    pub account_number: String,
    pub year_month: u32,
    /// Fuel tag as the feed spells it ("Electric" or "ELECTRIC" both occur)
    pub fuel_type: String,
    pub amount: f64,
}

impl CostRecord {
    /// Match the record's fuel tag against a fuel type, ignoring case
    pub fn matches_fuel(&self, fuel: FuelType) -> bool {
        self.fuel_type.eq_ignore_ascii_case(fuel.display_name())
    }
}

/// One hourly AMI reading. The timestamp stays the raw provider string;
/// parsing happens during reconciliation so one malformed record drops
/// with a debug log instead of failing the whole feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmiReading {
    pub date: String,
    /// Signed: positive = consumption, negative = return to grid
    pub quantity: f64,
}

/// One 15-minute interval read for an electric service point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalRead {
    pub start_time: String,
    pub value: f64,
}

// ============= Refresh Modes =============

/// Operating mode of one refresh cycle, mutually exclusive per cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshMode {
    /// Maximal historical window; runs once per process lifetime
    /// (or again after an explicit reset)
    First,
    /// Daily full refresh; sums are re-derived from before the trailing
    /// AMI window so backfilled readings merge without double counting
    Midnight,
    /// Hourly cycle fetching only the interval-read feed
    IntervalOnly,
    /// Default trailing-window refresh
    Incremental,
}

impl RefreshMode {
    /// Whether this cycle fetches the monthly and hourly AMI feeds.
    /// Interval-only cycles skip them; those feeds do not change intraday.
    pub fn fetches_full_feeds(&self) -> bool {
        !matches!(self, Self::IntervalOnly)
    }
}

impl fmt::Display for RefreshMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::Midnight => write!(f, "midnight"),
            Self::IntervalOnly => write!(f, "interval-only"),
            Self::Incremental => write!(f, "incremental"),
        }
    }
}

// ============= Coordinator Snapshot =============

/// Published data of one refresh cycle.
///
/// The keyed maps are seeded from the previous snapshot at the start of a
/// cycle, so an account whose fetch fails keeps its prior data instead of
/// dropping out of the published view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorData {
    /// Keyed by account number
    pub accounts: HashMap<String, BillingAccount>,
    /// Keyed by service point number
    pub meters: HashMap<String, MeterData>,
    /// Monthly usage records keyed by account number
    pub usages: HashMap<String, Vec<UsageRecord>>,
    /// Monthly cost records keyed by account number
    pub costs: HashMap<String, Vec<CostRecord>>,
    /// Hourly AMI readings keyed by service point number
    pub ami_readings: HashMap<String, Vec<AmiReading>>,
    /// 15-minute interval reads keyed by service point number
    pub interval_reads: HashMap<String, Vec<IntervalRead>>,
    /// Accounts the producing cycle actually fetched, as opposed to
    /// accounts only carried over from the seed. Statistics import only
    /// touches feeds of refreshed accounts; stale seeded batches must not
    /// be replayed against a first-refresh baseline.
    pub refreshed_accounts: HashSet<String>,
    /// Mode the producing cycle ran in
    pub mode: RefreshMode,
}

impl CoordinatorData {
    /// Empty snapshot used before the first successful cycle
    pub fn empty() -> Self {
        Self {
            accounts: HashMap::new(),
            meters: HashMap::new(),
            usages: HashMap::new(),
            costs: HashMap::new(),
            ami_readings: HashMap::new(),
            interval_reads: HashMap::new(),
            refreshed_accounts: HashSet::new(),
            mode: RefreshMode::First,
        }
    }

    /// Seed a new cycle's snapshot from the previously published one.
    /// The refreshed set starts empty; it records this cycle's fetches.
    pub fn seeded_from(previous: &CoordinatorData, mode: RefreshMode) -> Self {
        Self {
            accounts: previous.accounts.clone(),
            meters: previous.meters.clone(),
            usages: previous.usages.clone(),
            costs: previous.costs.clone(),
            ami_readings: previous.ami_readings.clone(),
            interval_reads: previous.interval_reads.clone(),
            refreshed_accounts: HashSet::new(),
            mode,
        }
    }

    /// Whether the producing cycle fetched this account itself
    pub fn is_refreshed(&self, account_number: &str) -> bool {
        self.refreshed_accounts.contains(account_number)
    }

    /// Meter (with account context) for a service point
    pub fn meter_data(&self, service_point: &str) -> Option<&MeterData> {
        self.meters.get(service_point)
    }

    /// Latest monthly usage record of the fuel's usage type for an account
    pub fn latest_usage(&self, account_number: &str, fuel: FuelType) -> Option<&UsageRecord> {
        self.usages
            .get(account_number)?
            .iter()
            .filter(|u| u.usage_type == fuel.usage_type_tag())
            .max_by_key(|u| u.year_month)
    }

    /// All monthly usage records for an account
    pub fn all_usages(&self, account_number: &str) -> &[UsageRecord] {
        self.usages
            .get(account_number)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Latest monthly cost record for an account and fuel
    pub fn latest_cost(&self, account_number: &str, fuel: FuelType) -> Option<&CostRecord> {
        self.costs
            .get(account_number)?
            .iter()
            .filter(|c| c.matches_fuel(fuel))
            .max_by_key(|c| c.year_month)
    }

    /// All monthly cost records for an account
    pub fn all_costs(&self, account_number: &str) -> &[CostRecord] {
        self.costs
            .get(account_number)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Latest AMI reading for a service point, by raw timestamp ordering.
    /// The feed's timestamp strings sort chronologically as text.
    pub fn latest_ami_reading(&self, service_point: &str) -> Option<&AmiReading> {
        self.ami_readings
            .get(service_point)?
            .iter()
            .max_by(|a, b| a.date.cmp(&b.date))
    }
}
