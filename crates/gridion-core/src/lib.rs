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

pub mod coordinator;
pub mod model;
pub mod scheduler;
pub mod statistics;
pub mod traits;

pub use coordinator::FetchCoordinator;
pub use model::{
    AmiReading, BillingAccount, CoordinatorData, CostRecord, FuelType, IntervalRead, Meter,
    MeterData, RefreshMode, UsageRecord,
};
pub use scheduler::{RefreshScheduler, ResyncRequest};
pub use statistics::StatisticsImporter;
pub use traits::{
    FetchError, MeterDataSource, SeriesMetadata, StatisticPoint, StatisticsStore,
};
