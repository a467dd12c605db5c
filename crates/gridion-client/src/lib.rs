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

//! HTTP client for the utility provider customer API.
//!
//! Covers the five read endpoints GridION needs: billing account lookup,
//! monthly energy usage, monthly usage cost, 15-minute interval reads and
//! hourly AMI smart-meter readings. Errors are categorized so callers can
//! tell an expired token from a flaky connection.

pub mod client;
pub mod errors;
pub mod types;

pub use client::UtilityClient;
pub use errors::{UtilityError, UtilityResult};
pub use types::{
    AmiMeterQuery, AmiReadingDto, BillingAccountDto, EnergyUsageCostDto, EnergyUsageDto,
    IntervalReadDto, MeterDto,
};
