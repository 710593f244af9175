//! Integration tests for the ticket lifecycle of [`AuthenticationGateway`].

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use arca_sdk_authn::{
    AccessTicket, AuthError, AuthenticationGateway, GatewayConfig,
    testutil::{CountingSigner, ScriptedLoginClient, test_config, test_gateway},
};
use arca_sdk_storage::{
    FileTicketStore, MemoryTicketStore, StorageError, StorageResult, TaxId, TicketKey,
    TicketRecord, TicketStore,
    testutil::{TEST_TAX_ID, expired_record, seed, test_key, valid_record},
};
use async_trait::async_trait;
use serde_json::json;

/// Store wrapper counting every call.
#[derive(Default)]
struct CountingStore {
    inner: MemoryTicketStore,
    gets: AtomicU64,
    saves: AtomicU64,
}

impl CountingStore {
    fn gets(&self) -> u64 {
        self.gets.load(Ordering::SeqCst)
    }

    fn saves(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TicketStore for CountingStore {
    async fn get(&self, key: &TicketKey) -> StorageResult<Option<TicketRecord>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn save(&self, key: &TicketKey, record: &TicketRecord) -> StorageResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(key, record).await
    }

    async fn delete(&self, key: &TicketKey) -> StorageResult<()> {
        self.inner.delete(key).await
    }
}

/// Store that fails every operation.
struct BrokenStore;

#[async_trait]
impl TicketStore for BrokenStore {
    async fn get(&self, _key: &TicketKey) -> StorageResult<Option<TicketRecord>> {
        Err(StorageError::io("disk on fire"))
    }

    async fn save(&self, _key: &TicketKey, _record: &TicketRecord) -> StorageResult<()> {
        Err(StorageError::io("disk on fire"))
    }

    async fn delete(&self, _key: &TicketKey) -> StorageResult<()> {
        Err(StorageError::io("disk on fire"))
    }
}

// ============================================================================
// login
// ============================================================================

#[tokio::test]
async fn login_with_valid_stored_ticket_makes_no_remote_call() {
    let store = Arc::new(CountingStore::default());
    seed(store.as_ref(), "wsfe", &valid_record("T", "S")).await;
    let (gateway, signer, client) = test_gateway(store.clone(), false);

    let ticket = gateway.login("wsfe").await.unwrap();

    assert_eq!(ticket.token(), "T");
    assert_eq!(client.count(), 0);
    assert_eq!(signer.count(), 0);
    assert_eq!(store.saves(), 1, "only the seed save");
}

#[tokio::test]
async fn login_with_expired_stored_ticket_makes_one_remote_call_and_one_save() {
    let store = Arc::new(CountingStore::default());
    seed(store.as_ref(), "wsfe", &expired_record("OLD", "OLD")).await;
    let (gateway, _, client) = test_gateway(store.clone(), false);

    let ticket = gateway.login("wsfe").await.unwrap();

    assert_eq!(ticket.token(), "TOKEN-1");
    assert_eq!(client.count(), 1);
    assert_eq!(store.saves(), 2, "seed save plus one ticket save");

    let stored = store.get(&test_key("wsfe")).await.unwrap().unwrap();
    assert_eq!(AccessTicket::create(stored).unwrap(), ticket);
}

#[tokio::test]
async fn request_login_on_empty_store_signs_once_calls_once_saves_once() {
    let store = Arc::new(CountingStore::default());
    let (gateway, signer, client) = test_gateway(store.clone(), false);

    let ticket = gateway.request_login("wsfe").await.unwrap();

    assert_eq!(signer.count(), 1);
    assert_eq!(client.count(), 1);
    assert_eq!(store.saves(), 1);
    assert!(!ticket.is_expired(chrono::Utc::now()));

    let tra = signer.last_tra().unwrap();
    assert!(tra.contains("<service>wsfe</service>"), "{tra}");
}

#[tokio::test]
async fn request_login_with_valid_stored_ticket_does_not_sign_or_call() {
    let store = Arc::new(MemoryTicketStore::new());
    seed(store.as_ref(), "wsfe", &valid_record("T", "S")).await;
    let (gateway, signer, client) = test_gateway(store, false);

    let ticket = gateway.request_login("wsfe").await.unwrap();

    assert_eq!(ticket.token(), "T");
    assert_eq!(signer.count(), 0);
    assert_eq!(client.count(), 0);
}

#[tokio::test]
async fn sequential_logins_reuse_the_stored_ticket() {
    let (gateway, _, client) = test_gateway(Arc::new(MemoryTicketStore::new()), false);

    let first = gateway.login("wsfe").await.unwrap();
    let second = gateway.login("wsfe").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(client.count(), 1);
    assert_eq!(gateway.store_hit_count(), 1);
    assert_eq!(gateway.remote_login_count(), 1);
}

#[tokio::test]
async fn auth_block_is_identical_within_validity_window() {
    let (gateway, _, _) = test_gateway(Arc::new(MemoryTicketStore::new()), false);
    let tax_id = TaxId::from(TEST_TAX_ID);

    let first = gateway.login("wsfe").await.unwrap();
    let second = gateway.login("wsfe").await.unwrap();

    assert_eq!(
        gateway.get_auth_params(&first, tax_id).unwrap(),
        gateway.get_auth_params(&second, tax_id).unwrap()
    );
}

#[tokio::test]
async fn tickets_are_isolated_per_service() {
    let (gateway, _, client) = test_gateway(Arc::new(MemoryTicketStore::new()), false);

    let wsfe = gateway.login("wsfe").await.unwrap();
    let padron = gateway.login("ws_sr_padron_a13").await.unwrap();

    assert_ne!(wsfe.token(), padron.token());
    assert_eq!(client.count(), 2);
}

#[tokio::test]
async fn store_failure_propagates_as_store_error() {
    let (gateway, _, client) = test_gateway(Arc::new(BrokenStore), false);

    let err = gateway.login("wsfe").await.unwrap_err();

    assert!(matches!(err, AuthError::Store(_)), "got {err:?}");
    assert_eq!(client.count(), 0);
}

#[tokio::test]
async fn remote_login_failure_is_not_retried() {
    let client = Arc::new(ScriptedLoginClient::failing("wsaa down"));
    let gateway = AuthenticationGateway::builder()
        .config(test_config(false))
        .signer(Arc::new(CountingSigner::new()))
        .login_client(client.clone())
        .build();

    let err = gateway.login("wsfe").await.unwrap_err();

    assert!(matches!(err, AuthError::RemoteLogin { .. }));
    assert_eq!(client.count(), 1);
}

#[tokio::test]
async fn file_store_ticket_survives_a_new_gateway() {
    let dir = tempfile::tempdir().unwrap();

    let (first, _, first_client) =
        test_gateway(Arc::new(FileTicketStore::new(dir.path())), false);
    let ticket = first.login("wsfe").await.unwrap();
    assert_eq!(first_client.count(), 1);

    let (second, _, second_client) =
        test_gateway(Arc::new(FileTicketStore::new(dir.path())), false);
    let reused = second.login("wsfe").await.unwrap();

    assert_eq!(reused, ticket);
    assert_eq!(second_client.count(), 0);
    assert!(dir.path().join(format!("TA-{TEST_TAX_ID}-wsfe.json")).exists());
}

// ============================================================================
// manual ticket mode
// ============================================================================

#[tokio::test]
async fn manual_mode_with_supplied_ticket_touches_neither_store_nor_remote() {
    let store = Arc::new(CountingStore::default());
    let (gateway, signer, client) = test_gateway(store.clone(), true);
    let supplied = AccessTicket::create(valid_record("MANUAL", "MANUAL")).unwrap();
    gateway.set_ticket("wsfe", supplied.clone()).unwrap();

    let ticket = gateway.login("wsfe").await.unwrap();

    assert_eq!(ticket, supplied);
    assert_eq!(store.gets(), 0);
    assert_eq!(store.saves(), 0);
    assert_eq!(signer.count(), 0);
    assert_eq!(client.count(), 0);
}

#[tokio::test]
async fn manual_mode_returns_supplied_ticket_even_when_expired() {
    let (gateway, _, client) = test_gateway(Arc::new(MemoryTicketStore::new()), true);
    let supplied = AccessTicket::create(expired_record("OLD", "OLD")).unwrap();
    gateway.set_ticket("wsfe", supplied.clone()).unwrap();

    assert_eq!(gateway.login("wsfe").await.unwrap(), supplied);
    assert_eq!(client.count(), 0);
}

#[tokio::test]
async fn manual_mode_without_supplied_ticket_logs_in_but_does_not_persist() {
    let store = Arc::new(CountingStore::default());
    let (gateway, _, client) = test_gateway(store.clone(), true);

    let ticket = gateway.login("wsfe").await.unwrap();

    assert_eq!(ticket.token(), "TOKEN-1");
    assert_eq!(client.count(), 1);
    assert_eq!(store.gets(), 0);
    assert_eq!(store.saves(), 0);
}

// ============================================================================
// discard
// ============================================================================

#[tokio::test]
async fn discard_forces_a_new_login() {
    let store = Arc::new(MemoryTicketStore::new());
    let (gateway, _, client) = test_gateway(store.clone(), false);

    gateway.login("wsfe").await.unwrap();
    gateway.discard_ticket("wsfe").await.unwrap();
    assert!(store.is_empty());

    let fresh = gateway.login("wsfe").await.unwrap();
    assert_eq!(fresh.token(), "TOKEN-2");
    assert_eq!(client.count(), 2);
}

#[tokio::test]
async fn discard_without_ticket_is_noop() {
    let (gateway, _, _) = test_gateway(Arc::new(MemoryTicketStore::new()), false);
    gateway.discard_ticket("wsfe").await.unwrap();
}

// ============================================================================
// single flight
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_logins_for_one_service_share_one_remote_call() {
    let client = Arc::new(ScriptedLoginClient::with_delay(Duration::from_millis(50)));
    let gateway = Arc::new(
        AuthenticationGateway::builder()
            .config(test_config(false))
            .signer(Arc::new(CountingSigner::new()))
            .login_client(client.clone())
            .build(),
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move { gateway.login("wsfe").await })
        })
        .collect();

    let mut tokens = Vec::new();
    for handle in handles {
        tokens.push(handle.await.unwrap().unwrap().token().to_owned());
    }

    assert_eq!(client.count(), 1);
    assert!(tokens.iter().all(|t| t == "TOKEN-1"), "{tokens:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn without_single_flight_concurrent_logins_each_call_remote() {
    let client = Arc::new(ScriptedLoginClient::with_delay(Duration::from_millis(50)));
    let config = GatewayConfig::builder()
        .tax_id(TaxId::from(TEST_TAX_ID))
        .single_flight(false)
        .build()
        .unwrap();
    let gateway = Arc::new(
        AuthenticationGateway::builder()
            .config(config)
            .signer(Arc::new(CountingSigner::new()))
            .login_client(client.clone())
            .build(),
    );

    let (a, b) = tokio::join!(gateway.login("wsfe"), gateway.login("wsfe"));
    a.unwrap();
    b.unwrap();

    assert_eq!(client.count(), 2);
}

#[tokio::test]
async fn auth_params_have_exact_wire_shape() {
    let (gateway, _, _) = test_gateway(Arc::new(MemoryTicketStore::new()), false);
    let ticket = AccessTicket::create(valid_record("T", "S")).unwrap();

    let block = gateway.get_auth_params(&ticket, TaxId::from(TEST_TAX_ID)).unwrap();

    assert_eq!(
        serde_json::to_value(block).unwrap(),
        json!({"Auth": {"Token": "T", "Sign": "S", "Cuit": 20111111112_i64}})
    );
}
