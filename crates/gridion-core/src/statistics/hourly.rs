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

use super::{FlowDirection, StatisticsImporter, UNIT_CCF, UNIT_KWH, parse_feed_timestamp};
use crate::model::{AmiReading, FuelType, RefreshMode};
use crate::traits::{SeriesMetadata, StatisticPoint};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use gridion_types::GasConversion;
use tracing::{debug, info};

impl StatisticsImporter {
    /// Reconcile one service point's hourly AMI readings into the store.
    ///
    /// Electric batches always produce the consumption series and add the
    /// return series when the batch carries a negative quantity (solar
    /// export). Gas produces a single volume series with the configured
    /// unit conversion applied.
    pub async fn reconcile_hourly(
        &self,
        service_point: &str,
        readings: &[AmiReading],
        fuel: FuelType,
        mode: RefreshMode,
    ) -> Result<()> {
        if readings.is_empty() {
            debug!("💤 [HOURLY] No AMI readings for {}", service_point);
            return Ok(());
        }

        match fuel {
            FuelType::Electric => {
                let consumption = SeriesMetadata {
                    series_id: self.series_id(service_point, "electric_hourly_usage"),
                    display_name: format!("{} Electric Hourly Usage", service_point),
                    unit: UNIT_KWH.to_string(),
                };
                self.import_hourly_series(
                    &consumption,
                    readings,
                    Some(FlowDirection::Consumption),
                    GasConversion::None,
                    mode,
                )
                .await?;

                if readings.iter().any(|r| r.quantity < 0.0) {
                    let export = SeriesMetadata {
                        series_id: self.series_id(service_point, "electric_return_hourly_usage"),
                        display_name: format!("{} Electric Return Hourly Usage", service_point),
                        unit: UNIT_KWH.to_string(),
                    };
                    self.import_hourly_series(
                        &export,
                        readings,
                        Some(FlowDirection::Return),
                        GasConversion::None,
                        mode,
                    )
                    .await?;
                }
            }
            FuelType::Gas => {
                let series = SeriesMetadata {
                    series_id: self.series_id(service_point, "gas_hourly_usage"),
                    display_name: format!("{} Gas Hourly Usage", service_point),
                    unit: UNIT_CCF.to_string(),
                };
                self.import_hourly_series(&series, readings, None, self.gas_conversion(), mode)
                    .await?;
            }
        }

        Ok(())
    }

    async fn import_hourly_series(
        &self,
        metadata: &SeriesMetadata,
        readings: &[AmiReading],
        direction: Option<FlowDirection>,
        conversion: GasConversion,
        mode: RefreshMode,
    ) -> Result<()> {
        let (last_sum, last_ts) = self
            .hourly_baseline(&metadata.series_id, readings, mode)
            .await?;

        let points = build_hourly_points(readings, direction, conversion, last_sum, last_ts);
        if points.is_empty() {
            debug!("💤 [HOURLY] No new points for {}", metadata.series_id);
            return Ok(());
        }

        self.store()
            .append_statistics(metadata, &points)
            .await
            .with_context(|| {
                format!("Failed to append hourly statistics for {}", metadata.series_id)
            })?;

        if let Some(last) = points.last() {
            info!(
                "📊 [HOURLY] Wrote {} point(s) to {} (sum {:.3})",
                points.len(),
                metadata.series_id,
                last.sum
            );
        }
        Ok(())
    }

    /// Resolve the cumulative-sum baseline and skip threshold for a series.
    ///
    /// First refresh rebuilds from zero. Midnight refresh re-derives the sum
    /// from strictly before the batch window so backfilled readings merge
    /// without double counting; its threshold of 0 re-admits the whole
    /// window. Anything else continues from the store's last point.
    async fn hourly_baseline(
        &self,
        series_id: &str,
        readings: &[AmiReading],
        mode: RefreshMode,
    ) -> Result<(f64, i64)> {
        match mode {
            RefreshMode::First => Ok((0.0, 0)),
            RefreshMode::Midnight => {
                let Some(earliest) = earliest_parseable(readings) else {
                    return Ok((0.0, 0));
                };
                match self
                    .store()
                    .query_statistics_before(series_id, earliest)
                    .await?
                {
                    Some(point) => Ok((point.sum, 0)),
                    None => Ok((0.0, 0)),
                }
            }
            RefreshMode::Incremental | RefreshMode::IntervalOnly => {
                match self.store().get_last_statistic(series_id).await? {
                    Some(point) => Ok((point.sum, point.start.timestamp())),
                    None => Ok((0.0, 0)),
                }
            }
        }
    }
}

/// Build the ordered new points for one hourly series.
///
/// Readings are sorted by their raw timestamp string (the feed's formats
/// sort chronologically as text), filtered by direction, parsed, and
/// dropped when at or before `last_ts` (epoch seconds). Hours are strictly
/// increasing in the output; a second reading landing on an already
/// emitted hour is dropped.
fn build_hourly_points(
    readings: &[AmiReading],
    direction: Option<FlowDirection>,
    conversion: GasConversion,
    last_sum: f64,
    mut last_ts: i64,
) -> Vec<StatisticPoint> {
    let mut ordered: Vec<&AmiReading> = readings.iter().filter(|r| !r.date.is_empty()).collect();
    ordered.sort_by(|a, b| a.date.cmp(&b.date));

    let mut running_sum = last_sum;
    let mut points = Vec::new();
    for reading in ordered {
        let quantity = conversion.apply(reading.quantity);
        let quantity = match direction {
            Some(d) => match d.filter_value(quantity) {
                Some(q) => q,
                None => continue,
            },
            None => quantity,
        };

        let Some(hour_start) = parse_feed_timestamp(&reading.date) else {
            debug!(
                "🔍 [HOURLY] Dropping reading with unparseable timestamp '{}'",
                reading.date
            );
            continue;
        };
        if hour_start.timestamp() <= last_ts {
            continue;
        }
        last_ts = hour_start.timestamp();

        running_sum += quantity;
        points.push(StatisticPoint {
            start: hour_start,
            value: quantity,
            sum: running_sum,
        });
    }
    points
}

fn earliest_parseable(readings: &[AmiReading]) -> Option<DateTime<Utc>> {
    readings
        .iter()
        .filter(|r| !r.date.is_empty())
        .filter_map(|r| parse_feed_timestamp(&r.date))
        .min()
}

#[cfg(test)]
mod tests {
    use super::super::test_store::MemoryStore;
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn reading(date: &str, quantity: f64) -> AmiReading {
        AmiReading {
            date: date.to_string(),
            quantity,
        }
    }

    fn hour(day: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, h, 0, 0).unwrap()
    }

    fn importer(store: Arc<MemoryStore>) -> StatisticsImporter {
        StatisticsImporter::new(store, "gridion", GasConversion::None)
    }

    #[test]
    fn test_running_sum_accumulates_from_zero() {
        let readings = vec![
            reading("2025-01-15T10:00:00Z", 5.0),
            reading("2025-01-15T11:00:00Z", 3.0),
        ];

        let points = build_hourly_points(&readings, None, GasConversion::None, 0.0, 0);

        assert_eq!(points.len(), 2);
        assert!((points[0].value - 5.0).abs() < f64::EPSILON);
        assert!((points[0].sum - 5.0).abs() < f64::EPSILON);
        assert!((points[1].value - 3.0).abs() < f64::EPSILON);
        assert!((points[1].sum - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_baseline_skips_old_hours_and_carries_sum() {
        let readings = vec![
            reading("2025-01-15T10:00:00Z", 5.0),
            reading("2025-01-15T11:00:00Z", 3.0),
        ];
        let baseline_ts = hour(15, 10).timestamp();

        let points = build_hourly_points(&readings, None, GasConversion::None, 10.0, baseline_ts);

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].start, hour(15, 11));
        assert!((points[0].value - 3.0).abs() < f64::EPSILON);
        assert!((points[0].sum - 13.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unsorted_input_is_ordered_by_raw_timestamp() {
        let readings = vec![
            reading("2025-01-15T12:00:00Z", 2.0),
            reading("2025-01-15T10:00:00Z", 5.0),
            reading("2025-01-15T11:00:00Z", 3.0),
        ];

        let points = build_hourly_points(&readings, None, GasConversion::None, 0.0, 0);

        assert_eq!(points.len(), 3);
        assert_eq!(points[0].start, hour(15, 10));
        assert_eq!(points[1].start, hour(15, 11));
        assert_eq!(points[2].start, hour(15, 12));
        assert!((points[2].sum - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_direction_split_on_mixed_signs() {
        let readings = vec![
            reading("2025-01-15T10:00:00Z", 5.0),
            reading("2025-01-15T11:00:00Z", -2.0),
            reading("2025-01-15T12:00:00Z", 3.0),
        ];

        let consumption = build_hourly_points(
            &readings,
            Some(FlowDirection::Consumption),
            GasConversion::None,
            0.0,
            0,
        );
        assert_eq!(consumption.len(), 2);
        assert!((consumption[1].sum - 8.0).abs() < f64::EPSILON);

        let export = build_hourly_points(
            &readings,
            Some(FlowDirection::Return),
            GasConversion::None,
            0.0,
            0,
        );
        assert_eq!(export.len(), 1);
        assert!((export[0].value - 2.0).abs() < f64::EPSILON);
        assert!((export[0].sum - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bad_records_are_dropped() {
        let readings = vec![
            reading("", 1.0),
            reading("garbage", 2.0),
            reading("2025-01-15T10:00:00Z", 5.0),
        ];

        let points = build_hourly_points(&readings, None, GasConversion::None, 0.0, 0);

        assert_eq!(points.len(), 1);
        assert!((points[0].sum - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_duplicate_hour_keeps_first() {
        let readings = vec![
            reading("2025-01-15T10:05:00Z", 5.0),
            reading("2025-01-15T10:35:00Z", 7.0),
            reading("2025-01-15T11:00:00Z", 3.0),
        ];

        let points = build_hourly_points(&readings, None, GasConversion::None, 0.0, 0);

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].start, hour(15, 10));
        assert!((points[0].value - 5.0).abs() < f64::EPSILON);
        assert!((points[1].sum - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_gas_conversion_applies_to_quantities() {
        let readings = vec![reading("2025-01-15T10:00:00Z", 10.0)];

        let points = build_hourly_points(&readings, None, GasConversion::ThermsToCcf, 0.0, 0);

        assert_eq!(points.len(), 1);
        assert!((points[0].value - 10.38).abs() < 1e-9);
        assert!((points[0].sum - 10.38).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_electric_mixed_batch_writes_two_series() {
        let store = Arc::new(MemoryStore::default());
        let importer = importer(store.clone());

        let readings = vec![
            reading("2025-01-15T10:00:00Z", 5.0),
            reading("2025-01-15T11:00:00Z", -2.0),
        ];
        importer
            .reconcile_hourly("SP1", &readings, FuelType::Electric, RefreshMode::First)
            .await
            .unwrap();

        let appended = store.appended.lock().clone();
        assert_eq!(appended.len(), 2);
        assert_eq!(appended[0], "gridion:SP1_electric_hourly_usage");
        assert_eq!(appended[1], "gridion:SP1_electric_return_hourly_usage");

        let export = store.points("gridion:SP1_electric_return_hourly_usage");
        assert_eq!(export.len(), 1);
        assert!((export[0].value - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_electric_positive_batch_writes_consumption_only() {
        let store = Arc::new(MemoryStore::default());
        let importer = importer(store.clone());

        let readings = vec![
            reading("2025-01-15T10:00:00Z", 5.0),
            reading("2025-01-15T11:00:00Z", 3.0),
        ];
        importer
            .reconcile_hourly("SP1", &readings, FuelType::Electric, RefreshMode::First)
            .await
            .unwrap();

        let appended = store.appended.lock().clone();
        assert_eq!(appended, vec!["gridion:SP1_electric_hourly_usage"]);
    }

    #[tokio::test]
    async fn test_incremental_continues_from_last_point() {
        let store = Arc::new(MemoryStore::default());
        let metadata = SeriesMetadata {
            series_id: "gridion:SP1_electric_hourly_usage".to_string(),
            display_name: "SP1 Electric Hourly Usage".to_string(),
            unit: UNIT_KWH.to_string(),
        };
        store.seed(
            metadata,
            vec![StatisticPoint {
                start: hour(15, 10),
                value: 5.0,
                sum: 50.0,
            }],
        );
        let importer = importer(store.clone());

        let readings = vec![
            reading("2025-01-15T10:00:00Z", 5.0),
            reading("2025-01-15T11:00:00Z", 2.0),
        ];
        importer
            .reconcile_hourly(
                "SP1",
                &readings,
                FuelType::Electric,
                RefreshMode::Incremental,
            )
            .await
            .unwrap();

        let points = store.points("gridion:SP1_electric_hourly_usage");
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].start, hour(15, 11));
        assert!((points[1].sum - 52.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_midnight_rederives_sum_from_before_window() {
        let store = Arc::new(MemoryStore::default());
        let metadata = SeriesMetadata {
            series_id: "gridion:SP1_electric_hourly_usage".to_string(),
            display_name: "SP1 Electric Hourly Usage".to_string(),
            unit: UNIT_KWH.to_string(),
        };
        // Existing history ends on Jan 14 with a known sum; the midnight
        // window re-imports Jan 15 on top of it.
        store.seed(
            metadata,
            vec![
                StatisticPoint {
                    start: hour(14, 22),
                    value: 1.0,
                    sum: 99.0,
                },
                StatisticPoint {
                    start: hour(14, 23),
                    value: 1.0,
                    sum: 100.0,
                },
            ],
        );
        let importer = importer(store.clone());

        let readings = vec![
            reading("2025-01-15T00:00:00Z", 1.5),
            reading("2025-01-15T01:00:00Z", 2.5),
        ];
        importer
            .reconcile_hourly("SP1", &readings, FuelType::Electric, RefreshMode::Midnight)
            .await
            .unwrap();

        let points = store.points("gridion:SP1_electric_hourly_usage");
        assert_eq!(points.len(), 4);
        assert_eq!(points[2].start, hour(15, 0));
        assert!((points[2].sum - 101.5).abs() < f64::EPSILON);
        assert!((points[3].sum - 104.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_midnight_without_history_starts_at_zero() {
        let store = Arc::new(MemoryStore::default());
        let importer = importer(store.clone());

        let readings = vec![reading("2025-01-15T00:00:00Z", 1.5)];
        importer
            .reconcile_hourly("SP1", &readings, FuelType::Electric, RefreshMode::Midnight)
            .await
            .unwrap();

        let points = store.points("gridion:SP1_electric_hourly_usage");
        assert_eq!(points.len(), 1);
        assert!((points[0].sum - 1.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_first_refresh_rebuilds_overlapping_hours() {
        let store = Arc::new(MemoryStore::default());
        let metadata = SeriesMetadata {
            series_id: "gridion:SP1_gas_hourly_usage".to_string(),
            display_name: "SP1 Gas Hourly Usage".to_string(),
            unit: UNIT_CCF.to_string(),
        };
        store.seed(
            metadata,
            vec![StatisticPoint {
                start: hour(15, 10),
                value: 4.0,
                sum: 40.0,
            }],
        );
        let importer = importer(store.clone());

        let readings = vec![
            reading("2025-01-15T10:00:00Z", 1.0),
            reading("2025-01-15T11:00:00Z", 2.0),
        ];
        importer
            .reconcile_hourly("SP1", &readings, FuelType::Gas, RefreshMode::First)
            .await
            .unwrap();

        let points = store.points("gridion:SP1_gas_hourly_usage");
        assert_eq!(points.len(), 2);
        // The overlapping hour is replaced with the rebuilt-from-zero sum
        assert!((points[0].sum - 1.0).abs() < f64::EPSILON);
        assert!((points[1].sum - 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_empty_batch_writes_nothing() {
        let store = Arc::new(MemoryStore::default());
        let importer = importer(store.clone());

        importer
            .reconcile_hourly("SP1", &[], FuelType::Electric, RefreshMode::First)
            .await
            .unwrap();

        assert!(store.appended.lock().is_empty());
    }
}
