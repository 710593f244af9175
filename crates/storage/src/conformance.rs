//! Conformance test suite for [`TicketStore`] implementations.
//!
//! Every store (in-memory, file system, or third-party) can run the same
//! suite to check it honours the trait contract the authentication gateway
//! relies on.
//!
//! # Usage
//!
//! Enable the `testutil` feature and call each conformance function with
//! a fresh store instance:
//!
//! ```no_run
//! use arca_sdk_storage::{MemoryTicketStore, conformance};
//!
//! #[tokio::test]
//! async fn get_returns_none_for_missing_key() {
//!     conformance::get_returns_none_for_missing_key(&MemoryTicketStore::new()).await;
//! }
//! ```
//!
//! # Test Categories
//!
//! | Category | Functions | Contract aspect |
//! |----------|-----------|-----------------|
//! | CRUD | 5 tests | get/save/delete semantics |
//! | Isolation | 3 tests | Keys differ by service, tax id and environment |
//! | Expiry | 1 test | Expired records are returned, not pruned |
//! | Concurrent | 1 test | Parallel saves of one key are last-write-wins |

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::{
    testutil::{expired_record, record_with_window, test_key, valid_record},
    ticket::TicketStore,
    types::{Environment, TaxId, TicketKey},
};

// ============================================================================
// CRUD (5 tests)
// ============================================================================

/// `get` on a missing key returns `Ok(None)`.
pub async fn get_returns_none_for_missing_key<S: TicketStore>(store: &S) {
    let result = store.get(&test_key("wsfe")).await;
    assert!(result.is_ok(), "get should not error on missing key: {result:?}");
    assert_eq!(result.expect("checked above"), None, "missing key should return None");
}

/// `save` then `get` returns the exact record.
pub async fn save_then_get_returns_record<S: TicketStore>(store: &S) {
    let record = valid_record("token-1", "sign-1");
    store.save(&test_key("wsfe"), &record).await.expect("save should succeed");
    let loaded = store.get(&test_key("wsfe")).await.expect("get should succeed");
    assert_eq!(loaded, Some(record));
}

/// `save` on an existing key overwrites the record.
pub async fn save_overwrites_existing<S: TicketStore>(store: &S) {
    store.save(&test_key("wsfe"), &valid_record("old", "old")).await.expect("save");
    let replacement = valid_record("new", "new");
    store.save(&test_key("wsfe"), &replacement).await.expect("overwrite");
    let loaded = store.get(&test_key("wsfe")).await.expect("get");
    assert_eq!(loaded, Some(replacement));
}

/// `delete` on a missing key is a silent no-op.
pub async fn delete_missing_is_noop<S: TicketStore>(store: &S) {
    let result = store.delete(&test_key("ghost")).await;
    assert!(result.is_ok(), "delete of missing key should not error: {result:?}");
}

/// `delete` removes a saved record, and a second delete still succeeds.
pub async fn delete_removes_record<S: TicketStore>(store: &S) {
    store.save(&test_key("wsfe"), &valid_record("t", "s")).await.expect("save");
    store.delete(&test_key("wsfe")).await.expect("delete");
    assert_eq!(store.get(&test_key("wsfe")).await.expect("get after delete"), None);
    store.delete(&test_key("wsfe")).await.expect("second delete is idempotent");
}

// ============================================================================
// Isolation (3 tests)
// ============================================================================

/// Records for different services do not collide.
pub async fn keys_isolated_by_service<S: TicketStore>(store: &S) {
    store.save(&test_key("wsfe"), &valid_record("fe", "fe")).await.expect("save wsfe");
    store
        .save(&test_key("ws_sr_padron_a13"), &valid_record("a13", "a13"))
        .await
        .expect("save padron");

    let fe = store.get(&test_key("wsfe")).await.expect("get wsfe").expect("wsfe present");
    let a13 =
        store.get(&test_key("ws_sr_padron_a13")).await.expect("get padron").expect("present");
    assert_eq!(fe.credentials.token.as_deref(), Some("fe"));
    assert_eq!(a13.credentials.token.as_deref(), Some("a13"));
}

/// Records for different principals do not collide.
pub async fn keys_isolated_by_tax_id<S: TicketStore>(store: &S) {
    let first = TicketKey::new("wsfe", TaxId::from(20111111112), Environment::Homologation);
    let second = TicketKey::new("wsfe", TaxId::from(27222222223), Environment::Homologation);

    store.save(&first, &valid_record("first", "first")).await.expect("save first");
    assert_eq!(store.get(&second).await.expect("get second"), None);
}

/// Production and homologation records do not collide.
pub async fn keys_isolated_by_environment<S: TicketStore>(store: &S) {
    let homo = TicketKey::new("wsfe", TaxId::from(20111111112), Environment::Homologation);
    let prod = TicketKey::new("wsfe", TaxId::from(20111111112), Environment::Production);

    store.save(&homo, &valid_record("homo", "homo")).await.expect("save homologation");
    store.save(&prod, &valid_record("prod", "prod")).await.expect("save production");
    store.delete(&homo).await.expect("delete homologation");

    assert_eq!(store.get(&homo).await.expect("get homologation"), None);
    let prod_record = store.get(&prod).await.expect("get production").expect("present");
    assert_eq!(prod_record.credentials.token.as_deref(), Some("prod"));
}

// ============================================================================
// Expiry (1 test)
// ============================================================================

/// Expired records are returned unchanged; stores never prune them.
pub async fn expired_record_is_returned<S: TicketStore>(store: &S) {
    let record = expired_record("stale", "stale");
    store.save(&test_key("wsfe"), &record).await.expect("save expired");
    assert_eq!(store.get(&test_key("wsfe")).await.expect("get expired"), Some(record));

    let now = Utc::now();
    let fresh = record_with_window("fresh", "fresh", now, now + Duration::hours(12));
    store.save(&test_key("wsfe"), &fresh).await.expect("replace expired");
    assert_eq!(store.get(&test_key("wsfe")).await.expect("get fresh"), Some(fresh));
}

// ============================================================================
// Concurrent access (1 test)
// ============================================================================

/// Parallel saves of the same key all succeed and one of them wins.
///
/// Requires `S: 'static` so the store can be shared across spawned tasks
/// via `Arc`.
pub async fn concurrent_saves_to_same_key<S: TicketStore + 'static>(store: Arc<S>) {
    for round in 0..10 {
        let mut handles = Vec::new();
        for writer in 0..8 {
            let store = Arc::clone(&store);
            let token = format!("round-{round}-writer-{writer}");
            handles.push(tokio::spawn(async move {
                store
                    .save(&test_key("wsfe"), &valid_record(&token, &token))
                    .await
                    .expect("concurrent save");
            }));
        }
        for handle in handles {
            handle.await.expect("task join");
        }

        let record = store.get(&test_key("wsfe")).await.expect("get").expect("record present");
        let token = record.credentials.token.expect("token present");
        assert!(
            token.starts_with(&format!("round-{round}-")),
            "stored record must come from the latest round, got {token}"
        );
    }
}

/// Runs every conformance check against stores produced by `make`.
///
/// Each check gets a fresh store so checks cannot interfere.
pub async fn run_all<S, F>(mut make: F)
where
    S: TicketStore + 'static,
    F: FnMut() -> S,
{
    get_returns_none_for_missing_key(&make()).await;
    save_then_get_returns_record(&make()).await;
    save_overwrites_existing(&make()).await;
    delete_missing_is_noop(&make()).await;
    delete_removes_record(&make()).await;
    keys_isolated_by_service(&make()).await;
    keys_isolated_by_tax_id(&make()).await;
    keys_isolated_by_environment(&make()).await;
    expired_record_is_returned(&make()).await;
    concurrent_saves_to_same_key(Arc::new(make())).await;
}
