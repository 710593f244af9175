//! # ARCA SDK Authentication
//!
//! WSAA ticket lifecycle and authenticated SOAP dispatch for the ARCA/AFIP
//! web services.
//!
//! This crate provides:
//! - **Access tickets**: Validation of login responses and persisted records into immutable
//!   [`AccessTicket`]s, and their projection into call parameters
//! - **Authentication gateway**: Store lookup, TRA signing and remote login with per-service
//!   single flight
//! - **Authenticating dispatcher**: Per-operation credential injection for any
//!   [`RemoteService`]
//! - **SOAP plumbing**: Envelope codec, HTTP transport and ready-made WSFE and Padrón A13
//!   services
//!
//! ## Example
//!
//! ```no_run
//! # #[cfg(feature = "openssl")]
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use arca_sdk_authn::{
//!     AuthenticatingCallDispatcher, AuthenticationGateway, GatewayConfig, OpensslCmsSigner,
//!     SoapService, SoapTransportConfig, login::WsaaLoginClient, soap::HttpSoapTransport,
//! };
//! use arca_sdk_storage::{Environment, FileTicketStore, TaxId};
//! use serde_json::{Map, json};
//!
//! let config = GatewayConfig::builder()
//!     .tax_id(TaxId::from(20111111112))
//!     .environment(Environment::Homologation)
//!     .build()?;
//! let transport = Arc::new(HttpSoapTransport::new(&SoapTransportConfig::default())?);
//!
//! let gateway = Arc::new(
//!     AuthenticationGateway::builder()
//!         .signer(Arc::new(OpensslCmsSigner::from_files("cert.pem", "key.pem", None)?))
//!         .login_client(Arc::new(WsaaLoginClient::new(transport.clone(), config.environment())))
//!         .store(Arc::new(FileTicketStore::new("tickets")))
//!         .config(config)
//!         .build(),
//! );
//!
//! let wsfe = AuthenticatingCallDispatcher::builder()
//!     .service(Arc::new(SoapService::wsfe(transport, Environment::Homologation)))
//!     .gateway(gateway)
//!     .build();
//!
//! let mut params = Map::new();
//! params.insert("PtoVta".into(), json!(1));
//! params.insert("CbteTipo".into(), json!(6));
//! let last = wsfe.call("FECompUltimoAutorizado", params).await?;
//! println!("{last}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - **`openssl`**: Enables [`OpensslCmsSigner`], the CMS signer backed by OpenSSL.
//! - **`testutil`**: Enables the [`testutil`] module with signer, login client and service
//!   doubles.
//! - **`failpoints`**: Activates fail points in the gateway for fault-injection tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Configuration types.
pub mod config;
/// Authenticating dispatch of remote operations.
pub mod dispatcher;
/// Authentication error types.
pub mod error;
/// WSAA login state machine.
pub mod gateway;
/// Remote login client.
pub mod login;
/// SOAP-backed remote services.
pub mod services;
/// Login request signing.
pub mod signer;
/// SOAP codec and transport.
pub mod soap;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
/// Validated access tickets.
pub mod ticket;
/// Login ticket requests and responses.
pub mod tra;
mod xml;

// Re-export key types for convenience
pub use config::{GatewayConfig, SoapTransportConfig};
pub use dispatcher::{
    AuthRequirement, AuthenticatingCallDispatcher, OperationDescriptor, OperationTable,
    RemoteService, merge_params,
};
pub use error::{AuthError, Result};
pub use gateway::AuthenticationGateway;
pub use login::{LoginClient, WsaaLoginClient};
pub use services::SoapService;
#[cfg(feature = "openssl")]
pub use signer::OpensslCmsSigner;
pub use signer::TraSigner;
pub use soap::{HttpSoapTransport, SoapTransport};
pub use ticket::{AccessTicket, AuthBlock, AuthFields, AuthFormat};
pub use tra::{LoginTicketRequest, parse_login_response};
