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

use crate::errors::{UtilityError, UtilityResult};
use crate::types::{
    AmiMeterQuery, AmiReadingDto, BillingAccountDto, EnergyUsageCostDto, EnergyUsageDto,
    IntervalReadDto,
};
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Utility provider customer API client
#[derive(Clone)]
pub struct UtilityClient {
    base_url: String,
    token: String,
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl UtilityClient {
    /// Create a new client with custom configuration
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> UtilityResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                UtilityError::ConfigError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            base_url: base_url.into(),
            token: token.into(),
            client,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        })
    }

    /// Create client from environment variables (development/testing)
    pub fn from_env() -> UtilityResult<Self> {
        let base_url = std::env::var("GRIDION_BASE_URL").map_err(|_| {
            UtilityError::ConfigError("GRIDION_BASE_URL environment variable not set".to_string())
        })?;
        let token = std::env::var("GRIDION_API_TOKEN").map_err(|_| {
            UtilityError::ConfigError("GRIDION_API_TOKEN environment variable not set".to_string())
        })?;

        info!("Initializing provider client for development: {}", base_url);
        Self::new(base_url, token)
    }

    /// Create client from configuration values
    /// Falls back to environment variables if config values are not set
    pub fn from_config(base_url: Option<String>, token: Option<String>) -> UtilityResult<Self> {
        // Try config values first, then fall back to env vars
        let base_url = base_url
            .or_else(|| std::env::var("GRIDION_BASE_URL").ok())
            .ok_or_else(|| {
                UtilityError::ConfigError(
                    "Provider base URL not found in config or GRIDION_BASE_URL environment variable"
                        .to_string(),
                )
            })?;

        let token = token
            .or_else(|| std::env::var("GRIDION_API_TOKEN").ok())
            .ok_or_else(|| {
                UtilityError::ConfigError(
                    "API token not found in config or GRIDION_API_TOKEN environment variable"
                        .to_string(),
                )
            })?;

        info!("Initializing provider client from configuration: {}", base_url);
        Self::new(base_url, token)
    }

    /// Fetch a billing account with its meters
    pub async fn get_billing_account(
        &self,
        account_number: &str,
    ) -> UtilityResult<BillingAccountDto> {
        let url = format!("{}/api/accounts/{}", self.base_url, account_number);
        debug!("🔍 [ACCOUNT] Fetching billing account: {}", account_number);
        debug!("   URL: {}", url);

        let response = self
            .retry_request(|| async { self.client.get(&url).bearer_auth(&self.token).send().await })
            .await?;

        match response.status() {
            StatusCode::OK => {
                let account = response.json::<BillingAccountDto>().await?;
                debug!(
                    "✅ [ACCOUNT] {} has {} meter(s), region '{}'",
                    account.account_number,
                    account.meters.len(),
                    account.region
                );
                Ok(account)
            }
            StatusCode::NOT_FOUND => {
                error!("❌ [ACCOUNT] Billing account not found: {}", account_number);
                Err(UtilityError::AccountNotFound(account_number.to_string()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!(
                    "❌ [ACCOUNT] Authentication failed for account: {}",
                    account_number
                );
                Err(UtilityError::AuthenticationFailed)
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                error!("❌ [ACCOUNT] Status {}: {}", status, error_text);
                Err(UtilityError::ApiError {
                    status: status.as_u16(),
                    message: error_text,
                })
            }
        }
    }

    /// Fetch monthly usage records for an account starting at `from_month` (YYYYMM)
    pub async fn get_energy_usages(
        &self,
        account_number: &str,
        from_month: u32,
    ) -> UtilityResult<Vec<EnergyUsageDto>> {
        let url = format!(
            "{}/api/accounts/{}/usages?fromMonth={}",
            self.base_url, account_number, from_month
        );
        debug!(
            "🔍 [USAGE] Fetching monthly usage for {} from {}",
            account_number, from_month
        );
        debug!("   URL: {}", url);

        let response = self
            .retry_request(|| async { self.client.get(&url).bearer_auth(&self.token).send().await })
            .await?;

        match response.status() {
            StatusCode::OK => {
                let usages = response.json::<Vec<EnergyUsageDto>>().await?;
                debug!(
                    "✅ [USAGE] Retrieved {} usage record(s) for {}",
                    usages.len(),
                    account_number
                );
                Ok(usages)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!(
                    "❌ [USAGE] Authentication failed for account: {}",
                    account_number
                );
                Err(UtilityError::AuthenticationFailed)
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                error!("❌ [USAGE] Status {}: {}", status, error_text);
                Err(UtilityError::ApiError {
                    status: status.as_u16(),
                    message: error_text,
                })
            }
        }
    }

    /// Fetch monthly cost records for an account
    ///
    /// # Arguments
    /// * `account_number` - Billing account identifier
    /// * `date` - Reference date for the cost window
    /// * `company_code` - Regional company code from the billing account
    pub async fn get_energy_usage_costs(
        &self,
        account_number: &str,
        date: NaiveDate,
        company_code: &str,
    ) -> UtilityResult<Vec<EnergyUsageCostDto>> {
        let url = format!(
            "{}/api/accounts/{}/costs?date={}&companyCode={}",
            self.base_url,
            account_number,
            date.format("%Y-%m-%d"),
            company_code
        );
        debug!(
            "🔍 [COST] Fetching monthly costs for {} (company {})",
            account_number, company_code
        );
        debug!("   URL: {}", url);

        let response = self
            .retry_request(|| async { self.client.get(&url).bearer_auth(&self.token).send().await })
            .await?;

        match response.status() {
            StatusCode::OK => {
                let costs = response.json::<Vec<EnergyUsageCostDto>>().await?;
                debug!(
                    "✅ [COST] Retrieved {} cost record(s) for {}",
                    costs.len(),
                    account_number
                );
                Ok(costs)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!(
                    "❌ [COST] Authentication failed for account: {}",
                    account_number
                );
                Err(UtilityError::AuthenticationFailed)
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                error!("❌ [COST] Status {}: {}", status, error_text);
                Err(UtilityError::ApiError {
                    status: status.as_u16(),
                    message: error_text,
                })
            }
        }
    }

    /// Fetch 15-minute interval reads for an electric service point
    ///
    /// # Arguments
    /// * `premise_number` - Premise the service point belongs to
    /// * `service_point_number` - Service point to read
    /// * `start` - Start of the window; the upstream retains roughly 42 hours
    pub async fn get_interval_reads(
        &self,
        premise_number: &str,
        service_point_number: &str,
        start: NaiveDateTime,
    ) -> UtilityResult<Vec<IntervalReadDto>> {
        let start_str = start.format("%Y-%m-%d %H:%M:%S").to_string();

        // URL-encode the start parameter since it contains a space and colons
        let start_encoded = urlencoding::encode(&start_str);

        let url = format!(
            "{}/api/premises/{}/service-points/{}/interval-reads?start={}",
            self.base_url, premise_number, service_point_number, start_encoded
        );
        debug!(
            "🔍 [INTERVAL] Fetching interval reads for service point {} since {}",
            service_point_number, start_str
        );
        debug!("   URL: {}", url);

        let response = self
            .retry_request(|| async { self.client.get(&url).bearer_auth(&self.token).send().await })
            .await?;

        match response.status() {
            StatusCode::OK => {
                let reads = response.json::<Vec<IntervalReadDto>>().await?;
                debug!(
                    "✅ [INTERVAL] Retrieved {} interval read(s) for {}",
                    reads.len(),
                    service_point_number
                );
                Ok(reads)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!(
                    "❌ [INTERVAL] Authentication failed for service point: {}",
                    service_point_number
                );
                Err(UtilityError::AuthenticationFailed)
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                error!("❌ [INTERVAL] Status {}: {}", status, error_text);
                Err(UtilityError::ApiError {
                    status: status.as_u16(),
                    message: error_text,
                })
            }
        }
    }

    /// Fetch hourly AMI readings for one meter over a date range
    pub async fn get_ami_energy_usages(
        &self,
        query: &AmiMeterQuery,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> UtilityResult<Vec<AmiReadingDto>> {
        let url = format!(
            "{}/api/ami/usages?meterNumber={}&premiseNumber={}&servicePointNumber={}&meterPointNumber={}&dateFrom={}&dateTo={}",
            self.base_url,
            query.meter_number,
            query.premise_number,
            query.service_point_number,
            query.meter_point_number,
            date_from.format("%Y-%m-%d"),
            date_to.format("%Y-%m-%d")
        );
        debug!(
            "🔍 [AMI] Fetching AMI readings for meter {} ({} to {})",
            query.meter_number, date_from, date_to
        );
        debug!("   URL: {}", url);

        let response = self
            .retry_request(|| async { self.client.get(&url).bearer_auth(&self.token).send().await })
            .await?;

        match response.status() {
            StatusCode::OK => {
                let readings = response.json::<Vec<AmiReadingDto>>().await?;
                debug!(
                    "✅ [AMI] Retrieved {} reading(s) for meter {}",
                    readings.len(),
                    query.meter_number
                );
                Ok(readings)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!(
                    "❌ [AMI] Authentication failed for meter: {}",
                    query.meter_number
                );
                Err(UtilityError::AuthenticationFailed)
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                error!("❌ [AMI] Status {}: {}", status, error_text);
                Err(UtilityError::ApiError {
                    status: status.as_u16(),
                    message: error_text,
                })
            }
        }
    }

    /// Retry a request with exponential backoff
    async fn retry_request<F, Fut>(&self, mut request_fn: F) -> UtilityResult<reqwest::Response>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut attempts = 0;
        let mut delay = self.retry_delay;

        loop {
            attempts += 1;
            match request_fn().await {
                Ok(response) => return Ok(response),
                Err(e) if attempts >= self.max_retries => {
                    error!("Request failed after {} attempts: {}", attempts, e);
                    return Err(UtilityError::RetryExhausted {
                        attempts,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempts, self.max_retries, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2; // Exponential backoff
                }
            }
        }
    }

    /// Set custom retry configuration
    pub fn with_retry_config(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }
}
