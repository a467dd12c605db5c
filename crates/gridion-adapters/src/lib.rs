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

//! Adapters binding the core seams to concrete backends: the provider
//! HTTP client on the fetch side, and SQLite or in-memory storage on the
//! statistics side.

pub mod provider;
pub mod store;

pub use provider::UtilityMeterAdapter;
pub use store::{MemoryStatisticsStore, SqliteStatisticsStore};
