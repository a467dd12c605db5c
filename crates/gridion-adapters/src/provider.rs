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

//! Provider adapter implementing `MeterDataSource` over the HTTP client.
//! Maps wire DTOs into domain types and client errors into the fetch
//! taxonomy the coordinator routes on.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, warn};

use gridion_client::{AmiMeterQuery, BillingAccountDto, MeterDto, UtilityClient, UtilityError};
use gridion_core::{
    AmiReading, BillingAccount, CostRecord, FetchError, FuelType, IntervalRead, Meter,
    MeterDataSource, UsageRecord,
};

/// Meter data source backed by the utility provider customer API
pub struct UtilityMeterAdapter {
    client: UtilityClient,
}

impl UtilityMeterAdapter {
    pub fn new(client: UtilityClient) -> Self {
        Self { client }
    }
}

/// Map a client error into the coordinator's fetch taxonomy.
/// Credential failures keep their own category so a cycle can abort on them.
fn map_fetch_error(err: UtilityError) -> FetchError {
    match err {
        UtilityError::AuthenticationFailed => {
            FetchError::Authentication("the provider rejected the API token".to_string())
        }
        UtilityError::HttpError(e) => FetchError::Connectivity(e.to_string()),
        UtilityError::RetryExhausted { attempts, message } => {
            FetchError::RetryExhausted { attempts, message }
        }
        UtilityError::ApiError { status, message } => {
            FetchError::Provider(format!("status {status}: {message}"))
        }
        UtilityError::AccountNotFound(account) => {
            FetchError::Provider(format!("billing account not found: {account}"))
        }
        UtilityError::ConfigError(message) => FetchError::Provider(message),
        UtilityError::InvalidResponse(message) => FetchError::InvalidData(message),
        UtilityError::JsonError(e) => FetchError::InvalidData(e.to_string()),
    }
}

/// Map one meter DTO, skipping meters whose fuel type GridION does not model
fn map_meter(dto: MeterDto) -> Option<Meter> {
    let fuel_type = match dto.fuel_type.parse::<FuelType>() {
        Ok(fuel) => fuel,
        Err(e) => {
            warn!("⚠️ [PROVIDER] Skipping meter {}: {:#}", dto.meter_number, e);
            return None;
        }
    };

    Some(Meter {
        meter_number: dto.meter_number,
        service_point_number: dto.service_point_number,
        meter_point_number: dto.meter_point_number,
        fuel_type,
        has_ami_smart_meter: dto.has_ami_smart_meter,
        is_smart_meter: dto.is_smart_meter,
    })
}

fn map_billing_account(dto: BillingAccountDto) -> BillingAccount {
    let meter_total = dto.meters.len();
    let meters: Vec<Meter> = dto.meters.into_iter().filter_map(map_meter).collect();
    if meters.len() < meter_total {
        debug!(
            "🔍 [PROVIDER] Dropped {} of {} meters on account {}",
            meter_total - meters.len(),
            meter_total,
            dto.account_number
        );
    }

    BillingAccount {
        account_number: dto.account_number,
        region: dto.region,
        premise_number: dto.premise_number,
        meters,
    }
}

#[async_trait]
impl MeterDataSource for UtilityMeterAdapter {
    async fn fetch_billing_account(
        &self,
        account_number: &str,
    ) -> Result<BillingAccount, FetchError> {
        let dto = self
            .client
            .get_billing_account(account_number)
            .await
            .map_err(map_fetch_error)?;
        Ok(map_billing_account(dto))
    }

    async fn fetch_energy_usages(
        &self,
        account_number: &str,
        from_month: u32,
    ) -> Result<Vec<UsageRecord>, FetchError> {
        let records = self
            .client
            .get_energy_usages(account_number, from_month)
            .await
            .map_err(map_fetch_error)?;

        Ok(records
            .into_iter()
            .map(|dto| UsageRecord {
                account_number: dto.account_number,
                year_month: dto.usage_year_month,
                usage_type: dto.usage_type,
                quantity: dto.usage,
            })
            .collect())
    }

    async fn fetch_energy_usage_costs(
        &self,
        account_number: &str,
        date: NaiveDate,
        company_code: &str,
    ) -> Result<Vec<CostRecord>, FetchError> {
        let records = self
            .client
            .get_energy_usage_costs(account_number, date, company_code)
            .await
            .map_err(map_fetch_error)?;

        Ok(records
            .into_iter()
            .map(|dto| CostRecord {
                account_number: dto.account_number,
                year_month: dto.month,
                fuel_type: dto.fuel_type,
                amount: dto.amount,
            })
            .collect())
    }

    async fn fetch_interval_reads(
        &self,
        premise_number: &str,
        service_point_number: &str,
        start: NaiveDateTime,
    ) -> Result<Vec<IntervalRead>, FetchError> {
        let reads = self
            .client
            .get_interval_reads(premise_number, service_point_number, start)
            .await
            .map_err(map_fetch_error)?;

        Ok(reads
            .into_iter()
            .map(|dto| IntervalRead {
                start_time: dto.start_time,
                value: dto.value,
            })
            .collect())
    }

    async fn fetch_ami_readings(
        &self,
        meter: &Meter,
        premise_number: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<Vec<AmiReading>, FetchError> {
        // The AMI endpoint keys on all four meter numbers, not just the
        // service point the rest of the pipeline uses.
        let query = AmiMeterQuery {
            meter_number: meter.meter_number.clone(),
            premise_number: premise_number.to_string(),
            service_point_number: meter.service_point_number.clone(),
            meter_point_number: meter.meter_point_number.clone(),
        };

        let readings = self
            .client
            .get_ami_energy_usages(&query, date_from, date_to)
            .await
            .map_err(map_fetch_error)?;

        Ok(readings
            .into_iter()
            .map(|dto| AmiReading {
                date: dto.date,
                quantity: dto.quantity,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "UtilityProvider"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn meter_dto(fuel: &str) -> MeterDto {
        MeterDto {
            meter_number: "M1".to_string(),
            service_point_number: "SP1".to_string(),
            meter_point_number: "MP1".to_string(),
            fuel_type: fuel.to_string(),
            has_ami_smart_meter: true,
            is_smart_meter: true,
        }
    }

    #[test]
    fn test_map_meter_known_fuels() {
        let electric = map_meter(meter_dto("Electric")).unwrap();
        assert_eq!(electric.fuel_type, FuelType::Electric);

        let gas = map_meter(meter_dto("Gas")).unwrap();
        assert_eq!(gas.fuel_type, FuelType::Gas);
    }

    #[test]
    fn test_map_meter_unknown_fuel_skipped() {
        assert!(map_meter(meter_dto("Water")).is_none());
        assert!(map_meter(meter_dto("")).is_none());
    }

    #[test]
    fn test_map_fetch_error_categories() {
        let auth = map_fetch_error(UtilityError::AuthenticationFailed);
        assert!(auth.aborts_cycle());

        let retry = map_fetch_error(UtilityError::RetryExhausted {
            attempts: 4,
            message: "timeout".to_string(),
        });
        assert!(!retry.aborts_cycle());
        assert!(matches!(retry, FetchError::RetryExhausted { attempts: 4, .. }));

        let api = map_fetch_error(UtilityError::ApiError {
            status: 503,
            message: "maintenance".to_string(),
        });
        assert!(matches!(api, FetchError::Provider(_)));

        let invalid = map_fetch_error(UtilityError::InvalidResponse("not json".to_string()));
        assert!(matches!(invalid, FetchError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_fetch_billing_account_maps_and_filters_meters() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/accounts/42")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "accountNumber": "42",
                    "region": "UNY",
                    "premiseNumber": "P-42",
                    "meters": [
                        {"meterNumber": "M1", "servicePointNumber": "SP1",
                         "meterPointNumber": "MP1", "fuelType": "Electric",
                         "hasAmiSmartMeter": true, "isSmartMeter": true},
                        {"meterNumber": "M2", "servicePointNumber": "SP2",
                         "meterPointNumber": "MP2", "fuelType": "Water"}
                    ]
                }"#,
            )
            .create_async()
            .await;

        let client = UtilityClient::new(server.url(), "test-token").unwrap();
        let adapter = UtilityMeterAdapter::new(client);

        let account = adapter.fetch_billing_account("42").await.unwrap();
        assert_eq!(account.account_number, "42");
        assert_eq!(account.region, "UNY");
        assert_eq!(account.meters.len(), 1);
        assert_eq!(account.meters[0].service_point_number, "SP1");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_billing_account_auth_failure_aborts() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/accounts/42")
            .with_status(401)
            .create_async()
            .await;

        let client = UtilityClient::new(server.url(), "bad-token").unwrap();
        let adapter = UtilityMeterAdapter::new(client);

        let err = adapter.fetch_billing_account("42").await.unwrap_err();
        assert!(matches!(err, FetchError::Authentication(_)));
        assert!(err.aborts_cycle());
    }

    #[tokio::test]
    async fn test_fetch_interval_reads_maps_fields() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex(r"^/api/premises/.*".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"servicePointNumber": "SP1",
                     "startTime": "2025-01-15 13:15:00", "value": 0.25}]"#,
            )
            .create_async()
            .await;

        let client = UtilityClient::new(server.url(), "test-token").unwrap();
        let adapter = UtilityMeterAdapter::new(client);

        let start = NaiveDate::from_ymd_opt(2025, 1, 14)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap();
        let reads = adapter
            .fetch_interval_reads("P-42", "SP1", start)
            .await
            .unwrap();

        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].start_time, "2025-01-15 13:15:00");
        assert!((reads[0].value - 0.25).abs() < f64::EPSILON);
    }
}
