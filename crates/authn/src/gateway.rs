//! WSAA login state machine.
//!
//! This module provides [`AuthenticationGateway`], which hands out valid
//! [`AccessTicket`]s for a service and talks to the login service only when
//! the [`TicketStore`] has nothing usable.
//!
//! # Architecture
//!
//! ```text
//! login(service) → manual mode with supplied ticket? → return it
//!                → check store (TicketKey = service, tax id, environment)
//!                → valid hit? → return it
//!                → request_login(service)
//!                     → per-service lock (single flight)
//!                     → re-check store
//!                     → build TRA → sign → loginCms → parse
//!                     → AccessTicket::create → save (unless manual mode)
//! ```
//!
//! # Ticket States
//!
//! Per service a ticket is either absent, valid or expired. An expired ticket
//! is left in the store and overwritten by the next successful login. There
//! is no revocation.
//!
//! # Examples
//!
//! ```no_run
//! // Requires the `openssl` feature and a certificate registered with WSAA.
//! # #[cfg(feature = "openssl")]
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use arca_sdk_authn::{
//!     AuthenticationGateway, GatewayConfig, OpensslCmsSigner, SoapTransportConfig,
//!     login::WsaaLoginClient, soap::HttpSoapTransport,
//! };
//! use arca_sdk_storage::{Environment, FileTicketStore, TaxId};
//!
//! let config = GatewayConfig::builder()
//!     .tax_id(TaxId::from(20111111112))
//!     .environment(Environment::Homologation)
//!     .build()?;
//! let transport = Arc::new(HttpSoapTransport::new(&SoapTransportConfig::default())?);
//!
//! let gateway = AuthenticationGateway::builder()
//!     .signer(Arc::new(OpensslCmsSigner::from_files("cert.pem", "key.pem", None)?))
//!     .login_client(Arc::new(WsaaLoginClient::new(transport, config.environment())))
//!     .store(Arc::new(FileTicketStore::new("tickets")))
//!     .config(config)
//!     .build();
//!
//! let ticket = gateway.login("wsfe").await?;
//! println!("ticket valid until {}", ticket.expiration_time());
//! # Ok(())
//! # }
//! ```

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use arca_sdk_storage::{MemoryTicketStore, TaxId, TicketKey, TicketStore};
use chrono::Utc;
use fail::fail_point;
use parking_lot::{Mutex, RwLock};

use crate::{
    config::GatewayConfig,
    error::{AuthError, Result},
    login::LoginClient,
    signer::TraSigner,
    ticket::{AccessTicket, AuthBlock},
    tra::{LoginTicketRequest, parse_login_response},
};

/// Obtains, caches and hands out WSAA access tickets.
///
/// One gateway serves one principal in one environment. It is cheap to share
/// behind an [`Arc`] and safe to call concurrently.
pub struct AuthenticationGateway {
    config: GatewayConfig,
    signer: Arc<dyn TraSigner>,
    login_client: Arc<dyn LoginClient>,
    store: Arc<dyn TicketStore>,
    /// Caller-supplied tickets, consulted in manual ticket mode only.
    supplied: RwLock<HashMap<String, AccessTicket>>,
    /// Per-service locks serializing remote logins.
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    remote_logins: AtomicU64,
    store_hits: AtomicU64,
}

#[bon::bon]
impl AuthenticationGateway {
    /// Creates a new gateway.
    ///
    /// # Arguments
    ///
    /// * `config` - Principal, environment and login behaviour.
    /// * `signer` - Signs login requests with the principal's certificate.
    /// * `login_client` - Submits signed requests to the login service.
    ///
    /// # Optional Fields
    ///
    /// * `store` - Ticket persistence (default: a fresh [`MemoryTicketStore`]).
    #[builder]
    pub fn new(
        config: GatewayConfig,
        signer: Arc<dyn TraSigner>,
        login_client: Arc<dyn LoginClient>,
        store: Option<Arc<dyn TicketStore>>,
    ) -> Self {
        Self {
            config,
            signer,
            login_client,
            store: store.unwrap_or_else(|| Arc::new(MemoryTicketStore::new())),
            supplied: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            remote_logins: AtomicU64::new(0),
            store_hits: AtomicU64::new(0),
        }
    }
}

impl AuthenticationGateway {
    /// Returns a valid ticket for `service`, logging in if necessary.
    ///
    /// In manual ticket mode a ticket installed with
    /// [`set_ticket`](Self::set_ticket) is returned as-is, without touching
    /// the store or the login service, even if it has expired.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Store`] if the store fails (a missing entry is not an error)
    /// - [`AuthError::MalformedTicket`] if the stored or received ticket is malformed
    /// - [`AuthError::Signing`] if the login request cannot be signed
    /// - [`AuthError::RemoteLogin`] if the login service call fails
    #[tracing::instrument(skip(self))]
    pub async fn login(&self, service: &str) -> Result<AccessTicket> {
        if self.config.manual_ticket_mode() {
            let supplied = self.supplied.read().get(service).cloned();
            if let Some(ticket) = supplied {
                tracing::debug!(cache = "supplied", "cache hit");
                return Ok(ticket);
            }
        } else if let Some(ticket) = self.lookup(service).await? {
            return Ok(ticket);
        }

        self.request_login(service).await
    }

    /// Obtains a ticket from the login service unless the store already holds
    /// a valid one.
    ///
    /// The store is re-checked after acquiring the per-service lock, so a
    /// caller that waited on a concurrent login reuses its ticket instead of
    /// logging in again. In manual ticket mode the store is neither read nor
    /// written.
    ///
    /// # Errors
    ///
    /// Same as [`login`](Self::login), plus [`AuthError::Tra`] if the login
    /// request cannot be built for `service`.
    #[tracing::instrument(skip(self))]
    pub async fn request_login(&self, service: &str) -> Result<AccessTicket> {
        let _flight = if self.config.single_flight() {
            Some(self.flight_lock(service).lock_owned().await)
        } else {
            None
        };

        let manual = self.config.manual_ticket_mode();
        if !manual && let Some(ticket) = self.lookup(service).await? {
            return Ok(ticket);
        }

        let key = self.key(service);
        let result = self.remote_login(service, &key, manual).await;
        match &result {
            Ok(ticket) => tracing::info!(
                audit.action = "remote_login",
                audit.resource = %key,
                audit.result = "success",
                expires = %ticket.expiration_time(),
                "audit_event"
            ),
            Err(error) => tracing::info!(
                audit.action = "remote_login",
                audit.resource = %key,
                audit.result = "failure",
                %error,
                "audit_event"
            ),
        }
        result
    }

    /// Formats `ticket` for `tax_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidPrincipal`] if `tax_id` is not positive.
    pub fn get_auth_params(&self, ticket: &AccessTicket, tax_id: TaxId) -> Result<AuthBlock> {
        ticket.format_for_principal(tax_id)
    }

    /// Installs a caller-supplied ticket for `service`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] unless manual ticket mode is enabled.
    pub fn set_ticket(&self, service: &str, ticket: AccessTicket) -> Result<()> {
        if !self.config.manual_ticket_mode() {
            return Err(AuthError::Config(
                "supplied tickets require manual_ticket_mode".into(),
            ));
        }
        self.supplied.write().insert(service.to_owned(), ticket);
        Ok(())
    }

    /// Forgets the ticket for `service`.
    ///
    /// Removes a supplied ticket and deletes the stored entry, so the next
    /// [`login`](Self::login) contacts the login service. Discarding a
    /// service without a ticket is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Store`] if the store fails to delete the entry.
    #[tracing::instrument(skip(self))]
    pub async fn discard_ticket(&self, service: &str) -> Result<()> {
        self.supplied.write().remove(service);

        let key = self.key(service);
        if !self.config.manual_ticket_mode() {
            self.store.delete(&key).await?;
        }
        tracing::info!(
            audit.action = "discard_ticket",
            audit.resource = %key,
            audit.result = "success",
            "audit_event"
        );
        Ok(())
    }

    /// Number of calls made to the login service.
    #[must_use]
    pub fn remote_login_count(&self) -> u64 {
        self.remote_logins.load(Ordering::Relaxed)
    }

    /// Number of valid tickets served from the store.
    #[must_use]
    pub fn store_hit_count(&self) -> u64 {
        self.store_hits.load(Ordering::Relaxed)
    }

    /// Returns the gateway configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Returns the ticket store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TicketStore> {
        &self.store
    }

    fn key(&self, service: &str) -> TicketKey {
        TicketKey::new(service, self.config.tax_id(), self.config.environment())
    }

    fn flight_lock(&self, service: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.in_flight.lock().entry(service.to_owned()).or_default())
    }

    /// Reads the store, treating a missing or expired entry as a miss.
    async fn lookup(&self, service: &str) -> Result<Option<AccessTicket>> {
        let Some(record) = self.store.get(&self.key(service)).await? else {
            tracing::debug!(cache = "store", "cache miss");
            return Ok(None);
        };

        let ticket = AccessTicket::create(record)?;
        if ticket.is_expired(Utc::now()) {
            tracing::debug!(
                cache = "store",
                expired_at = %ticket.expiration_time(),
                "cache miss (expired)"
            );
            return Ok(None);
        }

        self.store_hits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(cache = "store", "cache hit");
        Ok(Some(ticket))
    }

    async fn remote_login(
        &self,
        service: &str,
        key: &TicketKey,
        manual: bool,
    ) -> Result<AccessTicket> {
        let skew = chrono::Duration::from_std(self.config.clock_skew())
            .map_err(|e| AuthError::Config(format!("clock_skew out of range: {e}")))?;
        let tra = LoginTicketRequest::new(service, Utc::now(), skew)?;
        let signed = self.signer.sign(&tra.to_xml())?;

        fail_point!("gateway-before-remote-login", |_| {
            Err(AuthError::remote_login("injected failure before remote login"))
        });
        self.remote_logins.fetch_add(1, Ordering::Relaxed);
        let response =
            self.login_client.login_cms(&signed).await.map_err(AuthError::into_remote_login)?;

        let ticket = AccessTicket::create(parse_login_response(&response)?)?;

        if !manual {
            fail_point!("gateway-before-save", |_| {
                Err(AuthError::Store(arca_sdk_storage::StorageError::internal(
                    "injected failure before ticket save",
                )))
            });
            self.store.save(key, &ticket.to_record()).await?;
        }
        Ok(ticket)
    }
}
