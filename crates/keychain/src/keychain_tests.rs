// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use noetl_core::clock::FakeClock;
use noetl_core::id::CatalogId;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};

struct FixedStore {
    payload: Value,
    ttl_ms: Option<u64>,
}

impl CredentialStore for FixedStore {
    fn fetch(&self, _name: &str) -> Result<RawCredential, KeychainError> {
        Ok(RawCredential { payload: self.payload.clone(), ttl_ms: self.ttl_ms })
    }
}

struct FailingStore;

impl CredentialStore for FailingStore {
    fn fetch(&self, _name: &str) -> Result<RawCredential, KeychainError> {
        Err(KeychainError::CredentialFailure("provider down".into()))
    }
}

struct CountingProvider {
    calls: AtomicU64,
    ttl_ms: u64,
}

impl CredentialProvider for CountingProvider {
    fn derive_token(&self, _request: &TokenRequest) -> Result<TokenResponse, KeychainError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TokenResponse { token: json!({"access_token": format!("tok-{n}")}), expires_in_ms: Some(self.ttl_ms) })
    }
}

fn token_request() -> TokenRequest {
    TokenRequest { endpoint: "https://auth.example/token".into(), method: "POST".into(), headers: Default::default(), body_template: json!({}) }
}

#[test]
fn raw_credential_round_trips_through_encryption() {
    let kc = Keychain::new(FakeClock::new(), FixedStore { payload: json!({"user": "a", "pass": "b"}), ttl_ms: Some(10_000) }, CountingProvider { calls: AtomicU64::new(0), ttl_ms: 10_000 }, LocalAesGcmEncryption::new());
    let scope = KeychainScope::Local { execution_id: ExecutionId::new(1) };

    let payload = kc.fetch(CatalogId::new(1), scope, CredentialSource::Raw { name: "db" }, None).unwrap();

    assert_eq!(payload, json!({"user": "a", "pass": "b"}));
}

#[test]
fn cache_hit_does_not_re_derive_within_ttl() {
    let clock = FakeClock::new();
    let kc = Keychain::new(clock.clone(), FailingStore, CountingProvider { calls: AtomicU64::new(0), ttl_ms: 100_000 }, LocalAesGcmEncryption::new());
    let scope = KeychainScope::Global;
    let source = || CredentialSource::Derived { name: "auth0", request: token_request(), auto_renew: false };

    let first = kc.fetch(CatalogId::new(1), scope.clone(), source(), None).unwrap();
    let second = kc.fetch(CatalogId::new(1), scope, source(), None).unwrap();

    assert_eq!(first, second);
}

#[test]
fn auto_renew_re_derives_after_ninety_percent_of_ttl() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(0);
    let provider = CountingProvider { calls: AtomicU64::new(0), ttl_ms: 100_000 };
    let kc = Keychain::new(clock.clone(), FailingStore, provider, LocalAesGcmEncryption::new());
    let scope = KeychainScope::Global;
    let source = || CredentialSource::Derived { name: "auth0", request: token_request(), auto_renew: true };

    let first = kc.fetch(CatalogId::new(1), scope.clone(), source(), None).unwrap();
    clock.set_epoch_ms(95_000);
    let second = kc.fetch(CatalogId::new(1), scope, source(), None).unwrap();

    assert_ne!(first, second);
}

#[test]
fn expired_entry_is_re_derived_on_demand() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(0);
    let provider = CountingProvider { calls: AtomicU64::new(0), ttl_ms: 1_000 };
    let kc = Keychain::new(clock.clone(), FailingStore, provider, LocalAesGcmEncryption::new());
    let scope = KeychainScope::Global;
    let source = || CredentialSource::Derived { name: "auth0", request: token_request(), auto_renew: false };

    let first = kc.fetch(CatalogId::new(1), scope.clone(), source(), None).unwrap();
    clock.set_epoch_ms(10_000);
    let second = kc.fetch(CatalogId::new(1), scope, source(), None).unwrap();

    assert_ne!(first, second);
}

#[test]
fn schema_mismatch_is_rejected() {
    let kc = Keychain::new(FakeClock::new(), FixedStore { payload: json!({"user": "a"}), ttl_ms: Some(10_000) }, CountingProvider { calls: AtomicU64::new(0), ttl_ms: 10_000 }, LocalAesGcmEncryption::new());
    let scope = KeychainScope::Local { execution_id: ExecutionId::new(1) };

    let err = kc.fetch(CatalogId::new(1), scope, CredentialSource::Raw { name: "db" }, Some(vec!["user".into(), "pass".into()]));

    assert!(matches!(err, Err(KeychainError::CredentialSchemaError(_))));
}

#[test]
fn credential_failure_propagates() {
    let kc = Keychain::new(FakeClock::new(), FailingStore, CountingProvider { calls: AtomicU64::new(0), ttl_ms: 10_000 }, LocalAesGcmEncryption::new());
    let scope = KeychainScope::Local { execution_id: ExecutionId::new(1) };

    let err = kc.fetch(CatalogId::new(1), scope, CredentialSource::Raw { name: "db" }, None);

    assert!(matches!(err, Err(KeychainError::CredentialFailure(_))));
}

#[test]
fn drop_local_scope_removes_only_that_executions_entries() {
    let kc = Keychain::new(FakeClock::new(), FixedStore { payload: json!({"k": "v"}), ttl_ms: Some(100_000) }, CountingProvider { calls: AtomicU64::new(0), ttl_ms: 100_000 }, LocalAesGcmEncryption::new());
    let e1 = ExecutionId::new(1);
    let e2 = ExecutionId::new(2);
    kc.fetch(CatalogId::new(1), KeychainScope::Local { execution_id: e1 }, CredentialSource::Raw { name: "db" }, None).unwrap();
    kc.fetch(CatalogId::new(1), KeychainScope::Local { execution_id: e2 }, CredentialSource::Raw { name: "db" }, None).unwrap();

    kc.drop_local_scope(e1);

    assert!(kc.expires_at("db", CatalogId::new(1), &KeychainScope::Local { execution_id: e1 }).is_none());
    assert!(kc.expires_at("db", CatalogId::new(1), &KeychainScope::Local { execution_id: e2 }).is_some());
}
