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

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Utility provider API configuration
    pub provider: ProviderConfig,

    /// Statistics store configuration
    #[serde(default)]
    pub statistics: StatisticsConfig,

    /// Refresh scheduling configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// System configuration
    #[serde(default)]
    pub system: SystemConfig,
}

/// Utility provider API configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the provider customer API
    pub base_url: String,

    /// API bearer token
    #[serde(default)]
    pub api_token: String,

    /// Billing account numbers to poll
    #[serde(default)]
    pub accounts: Vec<String>,
}

/// Statistics store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsConfig {
    /// SQLite database file for the long-term statistics store
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Namespace prefix for statistic series ids (e.g. "gridion:12345_electric_hourly_usage")
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Unit conversion applied to gas quantities before import.
    /// The current provider feed reports CCF directly; older feed revisions
    /// reported therms and need `therms_to_ccf`.
    #[serde(default)]
    pub gas_unit_conversion: GasConversion,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            namespace: default_namespace(),
            gas_unit_conversion: GasConversion::default(),
        }
    }
}

fn default_database_path() -> String {
    "gridion.db".to_owned()
}

fn default_namespace() -> String {
    "gridion".to_owned()
}

/// Refresh scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between refresh cycles
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,

    /// Delay after UTC midnight before the daily full refresh runs.
    /// Gives the provider time to publish the previous day's AMI data.
    #[serde(default = "default_midnight_offset")]
    pub midnight_offset_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval(),
            midnight_offset_secs: default_midnight_offset(),
        }
    }
}

fn default_update_interval() -> u64 {
    3600 // hourly, matching the interval feed cadence
}

fn default_midnight_offset() -> u64 {
    300
}

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_owned()
}

/// Multiplier from therms to CCF used by older provider feed revisions.
pub const CCF_PER_THERM: f64 = 1.038;

/// Unit conversion applied to raw gas quantities before they become
/// statistic points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GasConversion {
    /// Feed already reports the volume unit (CCF); quantities pass through.
    #[default]
    None,
    /// Feed reports therms; multiply by 1.038 to get CCF.
    ThermsToCcf,
}

impl GasConversion {
    /// Apply the conversion to a raw gas quantity.
    #[must_use]
    pub fn apply(self, quantity: f64) -> f64 {
        match self {
            Self::None => quantity,
            Self::ThermsToCcf => quantity * CCF_PER_THERM,
        }
    }
}

impl AppConfig {
    /// Load configuration from an explicit path or the default locations.
    ///
    /// Order: explicit path (if given), then `config.toml`, then
    /// `config.json`, then defaults with environment variable overrides.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            let config = Self::from_file(path)?;
            info!("✅ Loaded configuration from {}", path.display());
            config.validate()?;
            return Ok(config);
        }

        if let Ok(config_str) = std::fs::read_to_string("config.toml") {
            let config: AppConfig =
                toml::from_str(&config_str).context("Failed to parse config.toml")?;
            info!("✅ Loaded configuration from config.toml");
            config.validate()?;
            return Ok(config);
        }

        if let Ok(config_str) = std::fs::read_to_string("config.json") {
            let config: AppConfig =
                serde_json::from_str(&config_str).context("Failed to parse config.json")?;
            info!("✅ Loaded configuration from config.json");
            config.validate()?;
            return Ok(config);
        }

        warn!("No configuration file found, using defaults with environment overrides");
        let config = Self::from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file, picking the parser by extension.
    fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&config_str)
                .with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            toml::from_str(&config_str)
                .with_context(|| format!("Failed to parse {}", path.display()))
        }
    }

    /// Build from defaults plus environment variables (development/testing)
    fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("GRIDION_BASE_URL") {
            config.provider.base_url = url;
        }
        if let Ok(token) = std::env::var("GRIDION_API_TOKEN") {
            config.provider.api_token = token;
        }
        if let Ok(accounts) = std::env::var("GRIDION_ACCOUNTS") {
            config.provider.accounts = accounts
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Ok(path) = std::env::var("GRIDION_DB_PATH") {
            config.statistics.database_path = path;
        }
        if let Ok(interval) = std::env::var("GRIDION_UPDATE_INTERVAL_SECS")
            && let Ok(secs) = interval.parse::<u64>()
        {
            config.scheduler.update_interval_secs = secs;
        }
        if let Ok(level) = std::env::var("GRIDION_LOG_LEVEL") {
            config.system.log_level = level;
        }

        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.provider.base_url.is_empty() {
            anyhow::bail!("provider.base_url must be configured");
        }
        if self.provider.api_token.is_empty() {
            anyhow::bail!("provider.api_token must be configured");
        }
        if self.provider.accounts.is_empty() {
            anyhow::bail!("provider.accounts must list at least one billing account");
        }
        for (idx, account) in self.provider.accounts.iter().enumerate() {
            if account.is_empty() {
                anyhow::bail!("provider.accounts[{}] is empty", idx);
            }
        }

        if self.statistics.namespace.is_empty() {
            anyhow::bail!("statistics.namespace cannot be empty");
        }
        // Series ids are "<namespace>:<series>"; a colon inside the namespace
        // would make them ambiguous.
        if self.statistics.namespace.contains(':') {
            anyhow::bail!(
                "statistics.namespace must not contain ':' (got '{}')",
                self.statistics.namespace
            );
        }
        if self.statistics.database_path.is_empty() {
            anyhow::bail!("statistics.database_path cannot be empty");
        }

        if self.scheduler.update_interval_secs < 60 {
            anyhow::bail!("scheduler.update_interval_secs must be at least 60 seconds");
        }
        if self.scheduler.update_interval_secs > 21600 {
            warn!(
                "scheduler.update_interval_secs is very high ({}s), interval data may be lost \
                 (the provider retains roughly 43 hours)",
                self.scheduler.update_interval_secs
            );
        }
        if self.scheduler.midnight_offset_secs >= 86400 {
            anyhow::bail!("scheduler.midnight_offset_secs must be less than one day");
        }

        Ok(())
    }
}
