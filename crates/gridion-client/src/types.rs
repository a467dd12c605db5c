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

use serde::{Deserialize, Serialize};

// ============= Account & Meter =============

/// Billing account as returned by the customer API.
/// `region` doubles as the company code for the cost endpoint and
/// can be empty for accounts without a billing region.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingAccountDto {
    pub account_number: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub premise_number: String,
    #[serde(default)]
    pub meters: Vec<MeterDto>,
}

/// A meter attached to a billing account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterDto {
    pub meter_number: String,
    #[serde(default)]
    pub service_point_number: String,
    #[serde(default)]
    pub meter_point_number: String,
    /// "Electric" or "Gas"
    pub fuel_type: String,
    #[serde(default)]
    pub has_ami_smart_meter: bool,
    #[serde(default)]
    pub is_smart_meter: bool,
}

// ============= Monthly Feeds =============

/// One monthly usage record. `usage_year_month` is encoded YYYYMM
/// (e.g. 202501 for January 2025).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyUsageDto {
    #[serde(default)]
    pub account_number: String,
    pub usage_year_month: u32,
    /// Usage type tag, e.g. "TOTAL_KWH" or "THERMS"
    pub usage_type: String,
    pub usage: f64,
}

/// One monthly cost record. `month` uses the same YYYYMM encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyUsageCostDto {
    #[serde(default)]
    pub account_number: String,
    pub month: u32,
    pub fuel_type: String,
    /// Dollar amount for the month
    pub amount: f64,
}

// ============= Hourly & Interval Feeds =============

/// One hourly AMI reading. The timestamp stays a raw string here;
/// the upstream mixes several formats (fractional seconds, trailing Z,
/// naive local) and parsing is deferred to the reconciliation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmiReadingDto {
    pub date: String,
    /// Signed quantity: positive = consumption, negative = return to grid
    pub quantity: f64,
}

/// One 15-minute interval read for an electric service point
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalReadDto {
    #[serde(default)]
    pub service_point_number: String,
    pub start_time: String,
    pub value: f64,
}

// ============= Query Parameters =============

/// Identifies one meter for the AMI usage endpoint, which keys on all
/// four numbers rather than the service point alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmiMeterQuery {
    pub meter_number: String,
    pub premise_number: String,
    pub service_point_number: String,
    pub meter_point_number: String,
}
