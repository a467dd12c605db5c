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

//! SQLite-backed long-term statistics store.
//!
//! Two tables: `statistics_meta` carries series identity and display
//! metadata, `statistics` carries the points keyed on (series, start).
//! Point timestamps are stored as unix seconds.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use gridion_core::{SeriesMetadata, StatisticPoint, StatisticsStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS statistics_meta (
    series_id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    unit TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS statistics (
    series_id TEXT NOT NULL,
    start_ts INTEGER NOT NULL,
    value REAL NOT NULL,
    cumulative_sum REAL NOT NULL,
    PRIMARY KEY (series_id, start_ts)
);
";

/// Statistics store backed by a local SQLite file.
/// Opens a fresh connection per call; the engine issues a handful of
/// queries per hour, so connection reuse buys nothing here.
#[derive(Debug)]
pub struct SqliteStatisticsStore {
    db_path: PathBuf,
}

impl SqliteStatisticsStore {
    /// Open the statistics database, creating the file and schema if needed
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let store = Self {
            db_path: db_path.as_ref().to_path_buf(),
        };

        let conn = store.connect()?;
        conn.execute_batch(SCHEMA)
            .context("Failed to create statistics schema")?;

        info!(
            "📊 [STORE] Statistics database ready at {}",
            store.db_path.display()
        );
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.db_path).with_context(|| {
            format!(
                "Failed to open statistics database at {}",
                self.db_path.display()
            )
        })
    }
}

fn point_from_row((start_ts, value, sum): (i64, f64, f64)) -> StatisticPoint {
    StatisticPoint {
        start: Utc.timestamp_opt(start_ts, 0).single().unwrap_or_default(),
        value,
        sum,
    }
}

#[async_trait]
impl StatisticsStore for SqliteStatisticsStore {
    async fn get_last_statistic(&self, series_id: &str) -> Result<Option<StatisticPoint>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT start_ts, value, cumulative_sum FROM statistics
                 WHERE series_id = ?1 ORDER BY start_ts DESC LIMIT 1",
                params![series_id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?, row.get::<_, f64>(2)?)),
            )
            .optional()
            .with_context(|| format!("Failed to query last statistic for {series_id}"))?;

        Ok(row.map(point_from_row))
    }

    async fn query_statistics_before(
        &self,
        series_id: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<StatisticPoint>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT start_ts, value, cumulative_sum FROM statistics
                 WHERE series_id = ?1 AND start_ts < ?2
                 ORDER BY start_ts DESC LIMIT 1",
                params![series_id, before.timestamp()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?, row.get::<_, f64>(2)?)),
            )
            .optional()
            .with_context(|| format!("Failed to query statistics before {before} for {series_id}"))?;

        Ok(row.map(point_from_row))
    }

    async fn append_statistics(
        &self,
        metadata: &SeriesMetadata,
        points: &[StatisticPoint],
    ) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction()
            .context("Failed to start statistics transaction")?;

        tx.execute(
            "INSERT INTO statistics_meta (series_id, display_name, unit) VALUES (?1, ?2, ?3)
             ON CONFLICT(series_id) DO UPDATE
             SET display_name = excluded.display_name, unit = excluded.unit",
            params![metadata.series_id, metadata.display_name, metadata.unit],
        )
        .with_context(|| format!("Failed to upsert metadata for {}", metadata.series_id))?;

        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO statistics (series_id, start_ts, value, cumulative_sum)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for point in points {
                stmt.execute(params![
                    metadata.series_id,
                    point.start.timestamp(),
                    point.value,
                    point.sum
                ])?;
            }
        }

        tx.commit().with_context(|| {
            format!(
                "Failed to commit {} point(s) for {}",
                points.len(),
                metadata.series_id
            )
        })?;

        debug!(
            "📊 [STORE] Committed {} point(s) for {}",
            points.len(),
            metadata.series_id
        );
        Ok(())
    }

    async fn clear_statistics(&self, series_ids: &[String]) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction()
            .context("Failed to start statistics transaction")?;

        for series_id in series_ids {
            let removed = tx.execute(
                "DELETE FROM statistics WHERE series_id = ?1",
                params![series_id],
            )?;
            tx.execute(
                "DELETE FROM statistics_meta WHERE series_id = ?1",
                params![series_id],
            )?;
            debug!("🔄 [STORE] Cleared {} row(s) of series {}", removed, series_id);
        }

        tx.commit().context("Failed to commit statistics clear")?;
        Ok(())
    }

    fn name(&self) -> &str {
        "Sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(ts: i64, value: f64, sum: f64) -> StatisticPoint {
        StatisticPoint {
            start: Utc.timestamp_opt(ts, 0).single().unwrap(),
            value,
            sum,
        }
    }

    fn metadata(series_id: &str) -> SeriesMetadata {
        SeriesMetadata {
            series_id: series_id.to_string(),
            display_name: "SP1 Electric Hourly Usage".to_string(),
            unit: "kWh".to_string(),
        }
    }

    #[tokio::test]
    async fn test_open_creates_schema_and_unknown_series_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStatisticsStore::open(dir.path().join("stats.db")).unwrap();

        assert!(store.get_last_statistic("nope").await.unwrap().is_none());
        assert_eq!(store.name(), "Sqlite");
    }

    #[tokio::test]
    async fn test_append_and_get_last_returns_latest_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStatisticsStore::open(dir.path().join("stats.db")).unwrap();

        let meta = metadata("ng:SP1_electric_hourly_usage");
        store
            .append_statistics(&meta, &[point(7200, 2.0, 3.0), point(3600, 1.0, 1.0)])
            .await
            .unwrap();

        let last = store
            .get_last_statistic(&meta.series_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last.start.timestamp(), 7200);
        assert!((last.sum - 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_append_same_timestamp_replaces_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStatisticsStore::open(dir.path().join("stats.db")).unwrap();

        let meta = metadata("ng:SP1_electric_hourly_usage");
        store
            .append_statistics(&meta, &[point(3600, 1.0, 1.0)])
            .await
            .unwrap();
        store
            .append_statistics(&meta, &[point(3600, 5.0, 5.0)])
            .await
            .unwrap();

        let last = store
            .get_last_statistic(&meta.series_id)
            .await
            .unwrap()
            .unwrap();
        assert!((last.value - 5.0).abs() < f64::EPSILON);
        assert!(
            store
                .query_statistics_before(&meta.series_id, Utc.timestamp_opt(3600, 0).unwrap())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_query_before_is_strict() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStatisticsStore::open(dir.path().join("stats.db")).unwrap();

        let meta = metadata("ng:SP1_electric_hourly_usage");
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
    async fn test_clear_removes_points_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStatisticsStore::open(dir.path().join("stats.db")).unwrap();

        let meta = metadata("ng:SP1_electric_hourly_usage");
        let other = metadata("ng:SP2_electric_hourly_usage");
        store
            .append_statistics(&meta, &[point(3600, 1.0, 1.0)])
            .await
            .unwrap();
        store
            .append_statistics(&other, &[point(3600, 9.0, 9.0)])
            .await
            .unwrap();

        store
            .clear_statistics(std::slice::from_ref(&meta.series_id))
            .await
            .unwrap();

        assert!(
            store
                .get_last_statistic(&meta.series_id)
                .await
                .unwrap()
                .is_none()
        );
        let untouched = store
            .get_last_statistic(&other.series_id)
            .await
            .unwrap()
            .unwrap();
        assert!((untouched.value - 9.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.db");

        let meta = metadata("ng:SP1_electric_hourly_usage");
        {
            let store = SqliteStatisticsStore::open(&path).unwrap();
            store
                .append_statistics(&meta, &[point(3600, 1.0, 1.0)])
                .await
                .unwrap();
        }

        let reopened = SqliteStatisticsStore::open(&path).unwrap();
        let last = reopened
            .get_last_statistic(&meta.series_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last.start.timestamp(), 3600);
    }
}
