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

use crate::model::{AmiReading, BillingAccount, CostRecord, IntervalRead, Meter, UsageRecord};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;

// ============= Fetch Error Taxonomy =============

/// Categorized errors from meter data sources. The category drives the
/// coordinator's control flow: authentication aborts a cycle, everything
/// else degrades per account or per feed.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("connection failed: {0}")]
    Connectivity(String),

    #[error("retries exhausted after {attempts} attempts: {message}")]
    RetryExhausted { attempts: u32, message: String },

    #[error("provider error: {0}")]
    Provider(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl FetchError {
    /// Whether this error must abort the whole refresh cycle.
    /// Only credential failures do; they affect every account equally.
    pub fn aborts_cycle(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

// ============= Meter Data Source =============

/// Generic source of provider meter data.
/// The coordinator works against this trait and never sees HTTP details.
#[async_trait]
pub trait MeterDataSource: Send + Sync {
    /// Fetch a billing account with its meters
    async fn fetch_billing_account(
        &self,
        account_number: &str,
    ) -> Result<BillingAccount, FetchError>;

    /// Fetch monthly usage records from `from_month` (YYYYMM) onward
    async fn fetch_energy_usages(
        &self,
        account_number: &str,
        from_month: u32,
    ) -> Result<Vec<UsageRecord>, FetchError>;

    /// Fetch monthly cost records for the account's regional company code
    async fn fetch_energy_usage_costs(
        &self,
        account_number: &str,
        date: NaiveDate,
        company_code: &str,
    ) -> Result<Vec<CostRecord>, FetchError>;

    /// Fetch 15-minute interval reads for a service point since `start` (UTC)
    async fn fetch_interval_reads(
        &self,
        premise_number: &str,
        service_point_number: &str,
        start: NaiveDateTime,
    ) -> Result<Vec<IntervalRead>, FetchError>;

    /// Fetch hourly AMI readings for one meter over a date range
    async fn fetch_ami_readings(
        &self,
        meter: &Meter,
        premise_number: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<Vec<AmiReading>, FetchError>;

    /// Get data source name for logging
    fn name(&self) -> &str;
}

// ============= Statistics Store =============

/// A single point in a statistic series
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticPoint {
    /// Start of the point's period (top of hour, or first of month)
    pub start: DateTime<Utc>,
    pub value: f64,
    /// Cumulative sum carried across imports
    pub sum: f64,
}

/// Series identity and presentation metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesMetadata {
    pub series_id: String,
    pub display_name: String,
    pub unit: String,
}

/// Long-term statistics storage.
/// The store keeps whatever it is given; ordering and duplicate-hour
/// invariants are the reconciliation engine's responsibility.
#[async_trait]
pub trait StatisticsStore: Send + Sync {
    /// Last recorded point of a series, or None for an unknown series
    async fn get_last_statistic(&self, series_id: &str) -> Result<Option<StatisticPoint>>;

    /// Last point strictly before the given time
    async fn query_statistics_before(
        &self,
        series_id: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<StatisticPoint>>;

    /// Append points to a series, creating or updating its metadata.
    /// A point whose timestamp already exists replaces the stored row.
    async fn append_statistics(
        &self,
        metadata: &SeriesMetadata,
        points: &[StatisticPoint],
    ) -> Result<()>;

    /// Delete all points and metadata for the given series.
    /// Completes before returning, so a following append starts clean.
    async fn clear_statistics(&self, series_ids: &[String]) -> Result<()>;

    /// Get store name for logging
    fn name(&self) -> &str;
}
