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

use super::{StatisticsImporter, UNIT_CCF, UNIT_KWH, UNIT_USD};
use crate::model::{CostRecord, FuelType, UsageRecord};
use crate::traits::{SeriesMetadata, StatisticPoint};
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use gridion_types::GasConversion;
use tracing::{debug, info, warn};

impl StatisticsImporter {
    /// Reconcile an account's monthly usage records into per-fuel series.
    ///
    /// Monthly feeds carry one record per fuel per billing month and never
    /// change intraday, so this is a plain incremental append: baseline from
    /// the store's last point, no first or midnight modes.
    pub async fn reconcile_monthly_usage(
        &self,
        account_number: &str,
        records: &[UsageRecord],
    ) -> Result<()> {
        for fuel in FuelType::all() {
            let (tag, unit) = match fuel {
                FuelType::Electric => ("electric_monthly_usage", UNIT_KWH),
                FuelType::Gas => ("gas_monthly_usage", UNIT_CCF),
            };
            let conversion = match fuel {
                FuelType::Electric => GasConversion::None,
                FuelType::Gas => self.gas_conversion(),
            };
            let usage_type = fuel.usage_type_tag();
            let entries: Vec<(u32, f64)> = records
                .iter()
                .filter(|r| r.usage_type == usage_type)
                .map(|r| (r.year_month, conversion.apply(r.quantity)))
                .collect();
            if entries.is_empty() {
                continue;
            }

            let metadata = SeriesMetadata {
                series_id: self.series_id(account_number, tag),
                display_name: format!(
                    "{} {} Monthly Usage",
                    account_number,
                    fuel.display_name()
                ),
                unit: unit.to_string(),
            };
            self.import_monthly_series(&metadata, entries).await?;
        }
        Ok(())
    }

    /// Reconcile an account's monthly cost records into per-fuel series.
    pub async fn reconcile_monthly_cost(
        &self,
        account_number: &str,
        records: &[CostRecord],
    ) -> Result<()> {
        for fuel in FuelType::all() {
            let tag = match fuel {
                FuelType::Electric => "electric_monthly_cost",
                FuelType::Gas => "gas_monthly_cost",
            };
            let entries: Vec<(u32, f64)> = records
                .iter()
                .filter(|r| r.matches_fuel(*fuel))
                .map(|r| (r.year_month, r.amount))
                .collect();
            if entries.is_empty() {
                continue;
            }

            let metadata = SeriesMetadata {
                series_id: self.series_id(account_number, tag),
                display_name: format!(
                    "{} {} Monthly Cost",
                    account_number,
                    fuel.display_name()
                ),
                unit: UNIT_USD.to_string(),
            };
            self.import_monthly_series(&metadata, entries).await?;
        }
        Ok(())
    }

    async fn import_monthly_series(
        &self,
        metadata: &SeriesMetadata,
        mut entries: Vec<(u32, f64)>,
    ) -> Result<()> {
        entries.sort_by_key(|(year_month, _)| *year_month);

        let (last_sum, mut last_ts) = match self
            .store()
            .get_last_statistic(&metadata.series_id)
            .await
            .with_context(|| format!("Failed to read last statistic for {}", metadata.series_id))?
        {
            Some(point) => (point.sum, point.start.timestamp()),
            None => (0.0, 0),
        };

        let mut running_sum = last_sum;
        let mut points = Vec::new();
        for (year_month, quantity) in entries {
            let Some(month_start) = month_start_utc(year_month) else {
                warn!(
                    "⚠️ [MONTHLY] {}: dropping record with year-month {}",
                    metadata.series_id, year_month
                );
                continue;
            };
            if month_start.timestamp() <= last_ts {
                continue;
            }
            last_ts = month_start.timestamp();
            running_sum += quantity;
            points.push(StatisticPoint {
                start: month_start,
                value: quantity,
                sum: running_sum,
            });
        }

        if points.is_empty() {
            debug!("💤 [MONTHLY] {}: no new months to import", metadata.series_id);
            return Ok(());
        }

        self.store()
            .append_statistics(metadata, &points)
            .await
            .with_context(|| {
                format!(
                    "Failed to append monthly statistics for {}",
                    metadata.series_id
                )
            })?;

        info!(
            "📊 [MONTHLY] Wrote {} month(s) to {} (sum {:.2})",
            points.len(),
            metadata.series_id,
            running_sum
        );
        Ok(())
    }
}

/// Decode an encoded YYYYMM integer into the month's first instant in UTC.
/// Returns `None` for months outside a sane range.
fn month_start_utc(year_month: u32) -> Option<DateTime<Utc>> {
    let year = year_month / 100;
    let month = year_month % 100;
    if !(2000..=2100).contains(&year) || !(1..=12).contains(&month) {
        return None;
    }
    Utc.with_ymd_and_hms(year as i32, month, 1, 0, 0, 0).single()
}
