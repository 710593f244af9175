//! Ticket persistence for the ARCA/AFIP authentication SDK.
//!
//! This crate provides the [`TicketStore`] trait and related types that keep
//! WSAA access tickets between logins. The authentication gateway in
//! `arca-sdk-authn` consults a store before contacting the login service and
//! writes every freshly obtained ticket back to it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 AuthenticatingCallDispatcher                │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    AuthenticationGateway                    │
//! │        (validates TicketRecord → AccessTicket)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    arca-sdk-storage                         │
//! │                  TicketStore trait                          │
//! │                 (get, save, delete)                         │
//! ├──────────────────┬──────────────────────────────────────────┤
//! │ MemoryTicketStore│            FileTicketStore               │
//! │ (tests, daemons) │   (default, TA-<cuit>-<service>.json)    │
//! └──────────────────┴──────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use arca_sdk_storage::{
//!     Environment, MemoryTicketStore, TaxId, TicketKey, TicketRecord, TicketStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryTicketStore::new();
//!     let key = TicketKey::new("wsfe", TaxId::from(20111111112), Environment::Homologation);
//!
//!     store.save(&key, &TicketRecord::default()).await?;
//!     let record = store.get(&key).await?;
//!     assert!(record.is_some());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Implementing a Store
//!
//! 1. Implement the [`TicketStore`] trait
//! 2. Report a missing record as `Ok(None)`, never as an error
//! 3. Map backend-specific errors to [`StorageError`]
//! 4. Run the [`conformance`] suite against it
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` and `conformance` modules with record fixtures and
//!   the store contract test suite. Enable this in `[dev-dependencies]` for integration tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod conformance;
pub mod error;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod ticket;
pub mod types;

// Re-export primary types at crate root for convenience
pub use error::{BoxError, StorageError, StorageResult};
pub use ticket::{
    Credentials, FileTicketStore, HEADER_DESTINATION, HEADER_EXPIRATION_TIME,
    HEADER_GENERATION_TIME, HEADER_SOURCE, HEADER_UNIQUE_ID, HEADER_VERSION, MemoryTicketStore,
    TicketRecord, TicketStore,
};
pub use types::{Environment, TaxId, TicketKey};
