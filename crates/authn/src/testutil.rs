//! Shared test utilities for authentication testing.
//!
//! This module provides test doubles for every seam of the gateway and the
//! dispatcher: a signer that needs no key material, a login client that
//! answers with generated ticket responses, and a remote service that
//! records the parameters it receives. It is feature-gated behind `testutil`
//! to prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! arca-sdk-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use arca_sdk_authn::testutil::{CountingSigner, ScriptedLoginClient, test_gateway};
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use arca_sdk_storage::{
    TaxId, TicketStore,
    testutil::{TEST_TAX_ID, format_service_time},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};

use crate::{
    config::GatewayConfig,
    dispatcher::{OperationDescriptor, RemoteService},
    error::{AuthError, Result},
    gateway::AuthenticationGateway,
    login::LoginClient,
    signer::TraSigner,
    ticket::AuthFormat,
};

/// Renders a `loginTicketResponse` document.
#[must_use]
pub fn login_response_xml(
    token: &str,
    sign: &str,
    generation: DateTime<Utc>,
    expiration: DateTime<Utc>,
) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<loginTicketResponse version="1.0">
    <header>
        <source>CN=wsaahomo, O=AFIP, C=AR, SERIALNUMBER=CUIT 33693450239</source>
        <destination>SERIALNUMBER=CUIT {TEST_TAX_ID}, CN=test</destination>
        <uniqueId>{unique_id}</uniqueId>
        <generationTime>{generation_time}</generationTime>
        <expirationTime>{expiration_time}</expirationTime>
    </header>
    <credentials>
        <token>{token}</token>
        <sign>{sign}</sign>
    </credentials>
</loginTicketResponse>"#,
        unique_id = generation.timestamp(),
        generation_time = format_service_time(generation),
        expiration_time = format_service_time(expiration),
    )
}

/// [`TraSigner`] that counts calls and returns a fixed placeholder.
#[derive(Debug, Default)]
pub struct CountingSigner {
    calls: AtomicU64,
    last_tra: Mutex<Option<String>>,
}

impl CountingSigner {
    /// Creates a signer with a zero count.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of signatures produced.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The last TRA document that was signed.
    #[must_use]
    pub fn last_tra(&self) -> Option<String> {
        self.last_tra.lock().clone()
    }
}

impl TraSigner for CountingSigner {
    fn sign(&self, tra: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_tra.lock() = Some(tra.to_owned());
        Ok("U0lHTkVELVRSQQ==".to_owned())
    }
}

/// [`LoginClient`] that issues a fresh twelve-hour ticket per call.
///
/// The n-th call (starting at 1) returns token `TOKEN-n` and sign `SIGN-n`.
#[derive(Debug, Default)]
pub struct ScriptedLoginClient {
    calls: AtomicU64,
    delay: Option<Duration>,
    failure: Option<String>,
}

impl ScriptedLoginClient {
    /// Creates a client that always succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client that sleeps for `delay` before answering.
    #[must_use]
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    /// Creates a client that always fails with `message`.
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self { failure: Some(message.to_owned()), ..Self::default() }
    }

    /// Number of login calls received.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LoginClient for ScriptedLoginClient {
    async fn login_cms(&self, _signed_tra: &str) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(AuthError::remote_login(message.clone()));
        }

        let now = Utc::now();
        Ok(login_response_xml(
            &format!("TOKEN-{n}"),
            &format!("SIGN-{n}"),
            now - chrono::Duration::minutes(1),
            now + chrono::Duration::hours(12),
        ))
    }
}

/// [`RemoteService`] that records every invocation and answers `{"ok": true}`.
pub struct RecordingRemoteService {
    name: String,
    auth_format: AuthFormat,
    operations: Vec<OperationDescriptor>,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl RecordingRemoteService {
    /// Creates a service with the given operations.
    #[must_use]
    pub fn new(
        name: &str,
        auth_format: AuthFormat,
        operations: Vec<OperationDescriptor>,
    ) -> Self {
        Self { name: name.to_owned(), auth_format, operations, calls: Mutex::new(Vec::new()) }
    }

    /// Invocations received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().clone()
    }

    /// Parameters of the most recent invocation.
    ///
    /// # Panics
    ///
    /// Panics if the service has not been invoked.
    #[must_use]
    pub fn last_params(&self) -> Map<String, Value> {
        self.calls.lock().last().map(|(_, p)| p.clone()).expect("service was never invoked")
    }
}

#[async_trait]
impl RemoteService for RecordingRemoteService {
    fn service_name(&self) -> &str {
        &self.name
    }

    fn auth_format(&self) -> AuthFormat {
        self.auth_format
    }

    fn operations(&self) -> Vec<OperationDescriptor> {
        self.operations.clone()
    }

    async fn invoke(&self, operation: &str, params: Map<String, Value>) -> Result<Value> {
        self.calls.lock().push((operation.to_owned(), params));
        Ok(json!({"ok": true}))
    }
}

/// Builds a homologation gateway for [`TEST_TAX_ID`] over `store`.
///
/// Returns the gateway together with its signer and login client so tests
/// can assert on call counts.
///
/// # Panics
///
/// Panics if the test configuration is rejected (it never is).
pub fn test_gateway(
    store: Arc<dyn TicketStore>,
    manual_ticket_mode: bool,
) -> (AuthenticationGateway, Arc<CountingSigner>, Arc<ScriptedLoginClient>) {
    let signer = Arc::new(CountingSigner::new());
    let client = Arc::new(ScriptedLoginClient::new());
    let gateway = AuthenticationGateway::builder()
        .config(test_config(manual_ticket_mode))
        .signer(signer.clone())
        .login_client(client.clone())
        .store(store)
        .build();
    (gateway, signer, client)
}

/// Gateway configuration for [`TEST_TAX_ID`] in homologation.
///
/// # Panics
///
/// Panics if the test configuration is rejected (it never is).
#[must_use]
pub fn test_config(manual_ticket_mode: bool) -> GatewayConfig {
    GatewayConfig::builder()
        .tax_id(TaxId::from(TEST_TAX_ID))
        .manual_ticket_mode(manual_ticket_mode)
        .build()
        .expect("test configuration is valid")
}
