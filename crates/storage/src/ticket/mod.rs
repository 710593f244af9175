//! Access ticket persistence.
//!
//! A ticket obtained from the authentication service stays valid for several
//! hours, and requesting a second one for the same principal inside that
//! window is rejected by some services. Tickets are therefore persisted and
//! reused across processes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   get / save / delete   ┌─────────────────────┐
//! │ AuthenticationGateway│────────────────────────►│     TicketStore     │
//! │   (authn crate)      │◄────────────────────────│ File │ Memory │ ... │
//! └──────────────────────┘      TicketRecord       └─────────────────────┘
//! ```
//!
//! # Key Layout
//!
//! Records are keyed by [`TicketKey`](crate::TicketKey):
//! `(service, tax id, environment)`. Production and homologation tickets for
//! the same service never collide.
//!
//! # Examples
//!
//! ```
//! use arca_sdk_storage::{
//!     Environment, MemoryTicketStore, TaxId, TicketKey, TicketRecord, TicketStore,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let store = MemoryTicketStore::new();
//! let key = TicketKey::new("wsfe", TaxId::from(20111111112), Environment::Homologation);
//!
//! assert!(store.get(&key).await.unwrap().is_none());
//! store.save(&key, &TicketRecord::default()).await.unwrap();
//! assert!(store.get(&key).await.unwrap().is_some());
//! # });
//! ```

mod file;
mod record;
mod store;

pub use file::FileTicketStore;
pub use record::{
    Credentials, HEADER_DESTINATION, HEADER_EXPIRATION_TIME, HEADER_GENERATION_TIME,
    HEADER_SOURCE, HEADER_UNIQUE_ID, HEADER_VERSION, TicketRecord,
};
pub use store::{MemoryTicketStore, TicketStore};
