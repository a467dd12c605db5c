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

//! Live provider smoke tests. These hit the real customer API and are
//! ignored by default. Run with valid credentials:
//!
//!   GRIDION_BASE_URL=... GRIDION_API_TOKEN=... GRIDION_ACCOUNTS=12345 \
//!     cargo test --test provider_live -- --ignored

use gridion_client::UtilityClient;

fn live_client() -> (UtilityClient, String) {
    let base_url = std::env::var("GRIDION_BASE_URL").expect("GRIDION_BASE_URL not set");
    let token = std::env::var("GRIDION_API_TOKEN").expect("GRIDION_API_TOKEN not set");
    let account = std::env::var("GRIDION_ACCOUNTS")
        .expect("GRIDION_ACCOUNTS not set")
        .split(',')
        .next()
        .expect("GRIDION_ACCOUNTS is empty")
        .trim()
        .to_string();

    let client = UtilityClient::new(base_url, token).expect("Failed to create client");
    (client, account)
}

#[tokio::test]
#[ignore] // Run with: cargo test --test provider_live -- --ignored
async fn test_live_billing_account() {
    let (client, account) = live_client();

    let result = client.get_billing_account(&account).await;
    assert!(result.is_ok(), "Failed to fetch account: {:?}", result.err());

    let dto = result.unwrap();
    println!(
        "✅ Account {} ({} meter(s), region '{}')",
        dto.account_number,
        dto.meters.len(),
        dto.region
    );
    for meter in &dto.meters {
        println!(
            "  - {} [{}] SP={} AMI={}",
            meter.meter_number, meter.fuel_type, meter.service_point_number,
            meter.has_ami_smart_meter
        );
    }
}

#[tokio::test]
#[ignore]
async fn test_live_usage_feed() {
    let (client, account) = live_client();

    let result = client.get_energy_usages(&account, 202401).await;
    assert!(result.is_ok(), "Failed to fetch usages: {:?}", result.err());

    let usages = result.unwrap();
    println!("📊 {} usage record(s) since 2024-01", usages.len());
    for usage in usages.iter().take(12) {
        println!(
            "  - {} {} = {}",
            usage.usage_year_month, usage.usage_type, usage.usage
        );
    }
}
