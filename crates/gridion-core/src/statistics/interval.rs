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

use super::{FlowDirection, StatisticsImporter, UNIT_KWH, parse_feed_timestamp};
use crate::model::IntervalRead;
use crate::traits::{SeriesMetadata, StatisticPoint};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info};

impl StatisticsImporter {
    /// Reconcile one service point's 15-minute interval reads.
    ///
    /// Interval series cover from yesterday midnight UTC onward, picking
    /// up where hourly AMI data (which lags about two days) leaves off.
    /// Each import clears the window and rebuilds it, so corrected reads
    /// replace earlier values. The return series is touched only when the
    /// batch carries a negative value.
    pub async fn reconcile_interval(
        &self,
        service_point: &str,
        reads: &[IntervalRead],
    ) -> Result<()> {
        self.reconcile_interval_at(service_point, reads, Utc::now())
            .await
    }

    async fn reconcile_interval_at(
        &self,
        service_point: &str,
        reads: &[IntervalRead],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let consumption = SeriesMetadata {
            series_id: self.series_id(service_point, "electric_interval_usage"),
            display_name: format!("{} Electric Interval Usage", service_point),
            unit: UNIT_KWH.to_string(),
        };
        self.import_interval_series(&consumption, reads, FlowDirection::Consumption, now)
            .await?;

        if reads.iter().any(|r| r.value < 0.0) {
            let export = SeriesMetadata {
                series_id: self.series_id(service_point, "electric_interval_return_usage"),
                display_name: format!("{} Electric Interval Return Usage", service_point),
                unit: UNIT_KWH.to_string(),
            };
            self.import_interval_series(&export, reads, FlowDirection::Return, now)
                .await?;
        }

        Ok(())
    }

    async fn import_interval_series(
        &self,
        metadata: &SeriesMetadata,
        reads: &[IntervalRead],
        direction: FlowDirection,
        now: DateTime<Utc>,
    ) -> Result<()> {
        // Cutoff aligns with the interval fetch window: yesterday midnight
        // UTC. Hourly AMI stats cover up to today-2; interval covers the
        // days after that.
        let midnight_today = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or(now);
        let cutoff = midnight_today - Duration::days(1);

        info!(
            "🔄 [INTERVAL] {}: clearing and reimporting from {}",
            metadata.series_id,
            cutoff.format("%Y-%m-%d %H:%M UTC")
        );

        // Clearing completes before the rebuild starts
        self.store()
            .clear_statistics(std::slice::from_ref(&metadata.series_id))
            .await
            .with_context(|| format!("Failed to clear statistics for {}", metadata.series_id))?;

        let buckets = bucket_interval_reads(reads, cutoff, direction, &metadata.series_id);

        let mut running_sum = 0.0;
        let mut points = Vec::with_capacity(buckets.len());
        for (hour_start, hour_total) in buckets {
            running_sum += hour_total;
            points.push(StatisticPoint {
                start: hour_start,
                value: hour_total,
                sum: running_sum,
            });
        }

        if points.is_empty() {
            info!(
                "💤 [INTERVAL] {}: no data within the 2-day window",
                metadata.series_id
            );
            return Ok(());
        }

        self.store()
            .append_statistics(metadata, &points)
            .await
            .with_context(|| {
                format!(
                    "Failed to append interval statistics for {}",
                    metadata.series_id
                )
            })?;

        info!(
            "📊 [INTERVAL] Wrote {} point(s) to {} (sum {:.3})",
            points.len(),
            metadata.series_id,
            running_sum
        );
        Ok(())
    }
}

/// Bucket interval reads into hourly totals, filtering by direction and
/// dropping anything before the cutoff.
fn bucket_interval_reads(
    reads: &[IntervalRead],
    cutoff: DateTime<Utc>,
    direction: FlowDirection,
    series_id: &str,
) -> BTreeMap<DateTime<Utc>, f64> {
    let mut buckets: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
    let mut skipped_filtered = 0;
    let mut skipped_old = 0;

    for read in reads {
        if read.start_time.is_empty() {
            continue;
        }

        let Some(value) = direction.filter_value(read.value) else {
            skipped_filtered += 1;
            continue;
        };

        let Some(hour_start) = parse_feed_timestamp(&read.start_time) else {
            debug!(
                "🔍 [INTERVAL] Could not parse interval start time: {}",
                read.start_time
            );
            continue;
        };
        if hour_start < cutoff {
            skipped_old += 1;
            continue;
        }

        *buckets.entry(hour_start).or_insert(0.0) += value;
    }

    if skipped_filtered > 0 {
        debug!(
            "🔍 [INTERVAL] {}: filtered {} read(s) flowing the other way",
            series_id, skipped_filtered
        );
    }
    if skipped_old > 0 {
        info!(
            "💤 [INTERVAL] {}: skipped {} read(s) older than cutoff",
            series_id, skipped_old
        );
    }

    buckets
}
