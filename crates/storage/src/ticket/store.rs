//! Storage trait for access ticket persistence.
//!
//! This module provides the [`TicketStore`] trait that abstracts where
//! previously obtained tickets are kept between logins. Implementations can
//! use different backends (file system by default, in-memory for tests or
//! short-lived processes, a shared cache for fleets of workers).
//!
//! # Usage
//!
//! ```no_run
//! // Demonstrates the trait interface; requires a concrete store implementation.
//! use arca_sdk_storage::{StorageResult, TicketKey, TicketRecord, TicketStore};
//!
//! async fn remember<S: TicketStore>(
//!     store: &S,
//!     key: &TicketKey,
//!     record: &TicketRecord,
//! ) -> StorageResult<()> {
//!     store.save(key, record).await
//! }
//! ```

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    error::StorageResult,
    ticket::TicketRecord,
    types::TicketKey,
};

/// Durable cache of access tickets.
///
/// Keys are `(service, tax id, environment)` triples; at most one record is
/// kept per key.
///
/// # Expiry
///
/// Stores know nothing about ticket validity. An expired record is returned
/// by [`get`](Self::get) like any other; callers treat it as a miss and
/// overwrite it on the next successful login. Stores never delete expired
/// records on their own.
///
/// # Error Handling
///
/// A missing record is `Ok(None)`, never an error. Every other failure is
/// reported as a [`StorageError`](crate::StorageError) and must be treated as
/// fatal by the caller.
///
/// # Concurrency
///
/// Implementations must be safe for sequential reuse across services.
/// Concurrent writers to the same key get last-write-wins semantics.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Retrieves the record stored under `key`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))` if a record exists (expired or not)
    /// - `Ok(None)` if no record exists
    /// - `Err(...)` on storage errors
    async fn get(&self, key: &TicketKey) -> StorageResult<Option<TicketRecord>>;

    /// Stores `record` under `key`, overwriting any previous record.
    async fn save(&self, key: &TicketKey, record: &TicketRecord) -> StorageResult<()>;

    /// Removes the record stored under `key`.
    ///
    /// This operation is idempotent: deleting an absent key succeeds.
    async fn delete(&self, key: &TicketKey) -> StorageResult<()>;
}

#[async_trait]
impl<T: TicketStore + ?Sized> TicketStore for Arc<T> {
    async fn get(&self, key: &TicketKey) -> StorageResult<Option<TicketRecord>> {
        (**self).get(key).await
    }

    async fn save(&self, key: &TicketKey, record: &TicketRecord) -> StorageResult<()> {
        (**self).save(key, record).await
    }

    async fn delete(&self, key: &TicketKey) -> StorageResult<()> {
        (**self).delete(key).await
    }
}

/// In-memory implementation of [`TicketStore`].
///
/// Stores records in a thread-safe hash map. Nothing survives a restart, so
/// a process using this store logs in again after every start. Cloning the
/// store shares the underlying map.
///
/// # Examples
///
/// ```
/// use arca_sdk_storage::{
///     Environment, MemoryTicketStore, TaxId, TicketKey, TicketRecord, TicketStore,
/// };
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryTicketStore::new();
///     let key = TicketKey::new("wsfe", TaxId::from(20111111112), Environment::Homologation);
///
///     store.save(&key, &TicketRecord::default()).await?;
///     assert!(store.get(&key).await?.is_some());
///
///     store.delete(&key).await?;
///     assert!(store.get(&key).await?.is_none());
///     Ok(())
/// }
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryTicketStore {
    records: Arc<RwLock<HashMap<TicketKey, TicketRecord>>>,
}

impl MemoryTicketStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns `true` if no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    #[tracing::instrument(skip(self, key), fields(key = %key))]
    async fn get(&self, key: &TicketKey) -> StorageResult<Option<TicketRecord>> {
        Ok(self.records.read().get(key).cloned())
    }

    #[tracing::instrument(skip(self, key, record), fields(key = %key))]
    async fn save(&self, key: &TicketKey, record: &TicketRecord) -> StorageResult<()> {
        self.records.write().insert(key.clone(), record.clone());
        Ok(())
    }

    #[tracing::instrument(skip(self, key), fields(key = %key))]
    async fn delete(&self, key: &TicketKey) -> StorageResult<()> {
        self.records.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{Environment, TaxId};

    fn key(service: &str) -> TicketKey {
        TicketKey::new(service, TaxId::from(20111111112), Environment::Homologation)
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let store = MemoryTicketStore::new();
        let clone = store.clone();

        store.save(&key("wsfe"), &TicketRecord::default()).await.unwrap();

        assert_eq!(clone.len(), 1);
        assert!(clone.get(&key("wsfe")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_arc_dyn_store_delegates() {
        let inner = MemoryTicketStore::new();
        let store: Arc<dyn TicketStore> = Arc::new(inner.clone());

        store.save(&key("wsfe"), &TicketRecord::default()).await.unwrap();
        assert!(!inner.is_empty());

        store.delete(&key("wsfe")).await.unwrap();
        assert!(inner.is_empty());
    }
}
