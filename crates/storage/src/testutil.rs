//! Shared test utilities for ticket storage testing.
//!
//! This module provides fixtures for building [`TicketRecord`] values with
//! controlled validity windows, and helpers for populating stores. It is
//! feature-gated behind `testutil` to prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! arca-sdk-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use arca_sdk_storage::testutil::{expired_record, valid_record};
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset, SecondsFormat, Utc};

use crate::{
    ticket::{
        Credentials, HEADER_DESTINATION, HEADER_EXPIRATION_TIME, HEADER_GENERATION_TIME,
        HEADER_SOURCE, HEADER_UNIQUE_ID, HEADER_VERSION, TicketRecord, TicketStore,
    },
    types::{Environment, TaxId, TicketKey},
};

/// Tax identifier used throughout the test fixtures.
pub const TEST_TAX_ID: i64 = 20_111_111_112;

/// Returns the UTC-3 offset the authentication service reports times in.
#[must_use]
pub fn argentina_offset() -> FixedOffset {
    FixedOffset::west_opt(3 * 3600).expect("UTC-3 is a valid offset")
}

/// Formats `time` the way the authentication service does
/// (`2024-04-25T15:35:27.431-03:00`).
#[must_use]
pub fn format_service_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&argentina_offset()).to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// Builds a well-formed record valid from `generation` until `expiration`.
#[must_use]
pub fn record_with_window(
    token: &str,
    sign: &str,
    generation: DateTime<Utc>,
    expiration: DateTime<Utc>,
) -> TicketRecord {
    let version = BTreeMap::from([(HEADER_VERSION.to_owned(), "1.0".to_owned())]);
    let fields = BTreeMap::from([
        (HEADER_SOURCE.to_owned(), "CN=wsaahomo, O=AFIP, C=AR, SERIALNUMBER=CUIT 33693450239".to_owned()),
        (HEADER_DESTINATION.to_owned(), format!("SERIALNUMBER=CUIT {TEST_TAX_ID}, CN=test")),
        (HEADER_UNIQUE_ID.to_owned(), generation.timestamp().to_string()),
        (HEADER_GENERATION_TIME.to_owned(), format_service_time(generation)),
        (HEADER_EXPIRATION_TIME.to_owned(), format_service_time(expiration)),
    ]);

    TicketRecord {
        header: vec![version, fields],
        credentials: Credentials { token: Some(token.to_owned()), sign: Some(sign.to_owned()) },
    }
}

/// Builds a record issued a minute ago and expiring in twelve hours.
#[must_use]
pub fn valid_record(token: &str, sign: &str) -> TicketRecord {
    let now = Utc::now();
    record_with_window(token, sign, now - Duration::minutes(1), now + Duration::hours(12))
}

/// Builds a record that expired an hour ago.
#[must_use]
pub fn expired_record(token: &str, sign: &str) -> TicketRecord {
    let now = Utc::now();
    record_with_window(token, sign, now - Duration::hours(13), now - Duration::hours(1))
}

/// Returns the homologation key for `service` and [`TEST_TAX_ID`].
#[must_use]
pub fn test_key(service: &str) -> TicketKey {
    TicketKey::new(service, TaxId::from(TEST_TAX_ID), Environment::Homologation)
}

/// Saves `record` under [`test_key`]`(service)`, panicking on failure.
pub async fn seed<S: TicketStore + ?Sized>(store: &S, service: &str, record: &TicketRecord) {
    store.save(&test_key(service), record).await.expect("seeding the store should succeed");
}
