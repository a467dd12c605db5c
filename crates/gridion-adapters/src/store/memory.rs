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

//! In-memory statistics store for dry runs and tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use gridion_core::{SeriesMetadata, StatisticPoint, StatisticsStore};

/// Volatile statistics store. Everything lives in a process-local map and
/// vanishes on exit, which is exactly what `--dry-run` wants.
#[derive(Debug, Default)]
pub struct MemoryStatisticsStore {
    series: Mutex<HashMap<String, (SeriesMetadata, Vec<StatisticPoint>)>>,
}

impl MemoryStatisticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points of one series in ascending start order; empty for unknown series
    pub fn points(&self, series_id: &str) -> Vec<StatisticPoint> {
        self.series
            .lock()
            .get(series_id)
            .map(|(_, points)| points.clone())
            .unwrap_or_default()
    }

    /// Metadata of one series, if it exists
    pub fn metadata(&self, series_id: &str) -> Option<SeriesMetadata> {
        self.series
            .lock()
            .get(series_id)
            .map(|(metadata, _)| metadata.clone())
    }

    /// Number of series currently held
    pub fn series_count(&self) -> usize {
        self.series.lock().len()
    }
}

#[async_trait]
impl StatisticsStore for MemoryStatisticsStore {
    async fn get_last_statistic(&self, series_id: &str) -> Result<Option<StatisticPoint>> {
        Ok(self
            .series
            .lock()
            .get(series_id)
            .and_then(|(_, points)| points.last().cloned()))
    }

    async fn query_statistics_before(
        &self,
        series_id: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<StatisticPoint>> {
        Ok(self.series.lock().get(series_id).and_then(|(_, points)| {
            points.iter().rev().find(|p| p.start < before).cloned()
        }))
    }

    async fn append_statistics(
        &self,
        metadata: &SeriesMetadata,
        points: &[StatisticPoint],
    ) -> Result<()> {
        let mut series = self.series.lock();
        let entry = series
            .entry(metadata.series_id.clone())
            .or_insert_with(|| (metadata.clone(), Vec::new()));
        entry.0 = metadata.clone();

        for point in points {
            match entry.1.iter_mut().find(|existing| existing.start == point.start) {
                Some(existing) => *existing = point.clone(),
                None => entry.1.push(point.clone()),
            }
        }
        entry.1.sort_by_key(|p| p.start);
        Ok(())
    }

    async fn clear_statistics(&self, series_ids: &[String]) -> Result<()> {
        let mut series = self.series.lock();
        for series_id in series_ids {
            series.remove(series_id);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn point(ts: i64, value: f64, sum: f64) -> StatisticPoint {
        StatisticPoint {
            start: Utc.timestamp_opt(ts, 0).single().unwrap(),
            value,
            sum,
        }
    }

    fn metadata() -> SeriesMetadata {
        SeriesMetadata {
            series_id: "ng:SP1_electric_hourly_usage".to_string(),
            display_name: "SP1 Electric Hourly Usage".to_string(),
            unit: "kWh".to_string(),
        }
    }

    #[tokio::test]
    async fn test_append_sorts_and_replaces_duplicates() {
        let store = MemoryStatisticsStore::new();
        let meta = metadata();

        store
            .append_statistics(&meta, &[point(7200, 2.0, 3.0), point(3600, 1.0, 1.0)])
            .await
            .unwrap();
        store
            .append_statistics(&meta, &[point(3600, 4.0, 4.0)])
            .await
            .unwrap();

        let points = store.points(&meta.series_id);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].start.timestamp(), 3600);
        assert!((points[0].value - 4.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_query_before_strictly_earlier() {
        let store = MemoryStatisticsStore::new();
        let meta = metadata();
        store
            .append_statistics(&meta, &[point(3600, 1.0, 1.0), point(7200, 2.0, 3.0)])
            .await
            .unwrap();

        let before = store
            .query_statistics_before(&meta.series_id, Utc.timestamp_opt(7200, 0).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(before.start.timestamp(), 3600);
    }

    #[tokio::test]
    async fn test_clear_drops_series() {
        let store = MemoryStatisticsStore::new();
        let meta = metadata();
        store
            .append_statistics(&meta, &[point(3600, 1.0, 1.0)])
            .await
            .unwrap();

        store
            .clear_statistics(std::slice::from_ref(&meta.series_id))
            .await
            .unwrap();
        assert_eq!(store.series_count(), 0);
        assert!(
            store
                .get_last_statistic(&meta.series_id)
                .await
                .unwrap()
                .is_none()
        );
    }
}
