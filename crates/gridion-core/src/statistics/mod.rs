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

//! Statistics reconciliation engine.
//!
//! Turns the coordinator's published snapshot into append-only statistic
//! series with carried-forward cumulative sums: hourly AMI series per
//! service point (sign-split for electric), clear-and-replace interval
//! series over a rolling two-day window, and monthly usage/cost series
//! per account.

mod hourly;
mod interval;
mod monthly;

use crate::model::CoordinatorData;
use crate::traits::StatisticsStore;
use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use gridion_types::GasConversion;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const UNIT_KWH: &str = "kWh";
pub const UNIT_CCF: &str = "CCF";
pub const UNIT_USD: &str = "USD";

/// Direction of energy flow for sign-split electric series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlowDirection {
    Consumption,
    Return,
}

impl FlowDirection {
    /// Keep quantities flowing in this direction.
    /// Return flips the stored value to positive.
    pub(crate) fn filter_value(&self, quantity: f64) -> Option<f64> {
        match self {
            Self::Consumption if quantity >= 0.0 => Some(quantity),
            Self::Return if quantity < 0.0 => Some(quantity.abs()),
            _ => None,
        }
    }
}

/// Reconciles fetched meter data into the statistics store
pub struct StatisticsImporter {
    store: Arc<dyn StatisticsStore>,
    namespace: String,
    gas_conversion: GasConversion,
}

impl StatisticsImporter {
    pub fn new(
        store: Arc<dyn StatisticsStore>,
        namespace: impl Into<String>,
        gas_conversion: GasConversion,
    ) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            gas_conversion,
        }
    }

    /// Import everything a published snapshot carries: hourly AMI series,
    /// interval series, then monthly usage and cost series. Interval-only
    /// snapshots import only the interval feed; the others hold seed data
    /// that was already reconciled.
    pub async fn import_all(&self, snapshot: &CoordinatorData) -> Result<()> {
        info!(
            "📊 [STATS] Importing statistics ({} cycle, {} AMI feed(s), {} interval feed(s))",
            snapshot.mode,
            snapshot.ami_readings.len(),
            snapshot.interval_reads.len()
        );

        if snapshot.mode.fetches_full_feeds() {
            for (service_point, readings) in &snapshot.ami_readings {
                let Some(meter_data) = snapshot.meter_data(service_point) else {
                    warn!(
                        "⚠️ [STATS] No meter known for service point {}, skipping hourly import",
                        service_point
                    );
                    continue;
                };
                if !snapshot.is_refreshed(&meter_data.account_number) {
                    debug!(
                        "💤 [STATS] Account {} not fetched this cycle, keeping hourly series for {}",
                        meter_data.account_number, service_point
                    );
                    continue;
                }
                self.reconcile_hourly(
                    service_point,
                    readings,
                    meter_data.meter.fuel_type,
                    snapshot.mode,
                )
                .await?;
            }
        } else {
            debug!("💤 [STATS] Interval-only cycle, skipping hourly and monthly import");
        }

        for (service_point, reads) in &snapshot.interval_reads {
            let Some(meter_data) = snapshot.meter_data(service_point) else {
                warn!(
                    "⚠️ [STATS] No meter known for service point {}, skipping interval import",
                    service_point
                );
                continue;
            };
            if !snapshot.is_refreshed(&meter_data.account_number) {
                debug!(
                    "💤 [STATS] Account {} not fetched this cycle, keeping interval series for {}",
                    meter_data.account_number, service_point
                );
                continue;
            }
            self.reconcile_interval(service_point, reads).await?;
        }

        if snapshot.mode.fetches_full_feeds() {
            for (account_number, records) in &snapshot.usages {
                if !snapshot.is_refreshed(account_number) {
                    continue;
                }
                self.reconcile_monthly_usage(account_number, records).await?;
            }
            for (account_number, records) in &snapshot.costs {
                if !snapshot.is_refreshed(account_number) {
                    continue;
                }
                self.reconcile_monthly_cost(account_number, records).await?;
            }
        }

        info!("✅ [STATS] Statistics import complete");
        Ok(())
    }

    pub(crate) fn store(&self) -> &Arc<dyn StatisticsStore> {
        &self.store
    }

    pub(crate) fn gas_conversion(&self) -> GasConversion {
        self.gas_conversion
    }

    /// Series identifier: `{namespace}:{key}_{tag}`
    pub(crate) fn series_id(&self, key: &str, tag: &str) -> String {
        format!("{}:{}_{}", self.namespace, key, tag)
    }
}

/// Parse a feed timestamp and truncate it to the top of its UTC hour.
///
/// The upstream mixes formats: RFC 3339 with fractional seconds and a
/// trailing `Z`, offset-less ISO, and `YYYY-MM-DD HH:MM:SS`. Fractional
/// seconds are stripped and naive timestamps are taken as UTC. Returns
/// None for anything else; callers drop the record.
pub(crate) fn parse_feed_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let cleaned = strip_fractional_seconds(raw);
    let cleaned = match cleaned.strip_suffix('Z') {
        Some(stripped) => format!("{}+00:00", stripped),
        None => cleaned,
    };

    let parsed = DateTime::parse_from_rfc3339(&cleaned)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(&cleaned, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(&cleaned, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })?;

    Some(truncate_to_hour(parsed))
}

fn truncate_to_hour(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_minute(0)
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

/// Remove a fractional-seconds run (".123") so the second-resolution
/// parsers accept the string. A dot without digits stays untouched.
fn strip_fractional_seconds(raw: &str) -> String {
    match raw.find('.') {
        Some(pos) => {
            let rest = &raw[pos + 1..];
            let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
            if digits == 0 {
                raw.to_string()
            } else {
                format!("{}{}", &raw[..pos], &rest[digits..])
            }
        }
        None => raw.to_string(),
    }
}
