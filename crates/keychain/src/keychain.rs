// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named, typed credential/token cache with TTL, scope, and
//! auto-renewal.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use noetl_core::clock::Clock;
use noetl_core::id::{CatalogId, ExecutionId};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

/// The safety margin subtracted from a credential's or token's natural
/// expiry before the keychain considers it expired, so callers never
/// observe a value that dies mid-use.
const SAFETY_MARGIN_MS: u64 = 30_000;

/// Auto-renew triggers once this fraction of the TTL has elapsed.
const AUTO_RENEW_THRESHOLD: f64 = 0.90;

#[derive(Debug, thiserror::Error)]
pub enum KeychainError {
    #[error("credential failure: {0}")]
    CredentialFailure(String),
    #[error("credential schema mismatch: {0}")]
    CredentialSchemaError(String),
    #[error("encryption error: {0}")]
    Encryption(String),
}

/// Where a [`KeychainEntry`] lives and what ends its life.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeychainScope {
    /// Expires when `execution_id` terminates.
    Local { execution_id: ExecutionId },
    /// Visible to the whole execution tree rooted at `root_execution_id`:
    /// a parent's `shared`-scope entries are visible to its children.
    Shared { root_execution_id: ExecutionId },
    /// Lives until the underlying token's own `expires_in`.
    Global,
}

impl KeychainScope {
    fn key(&self) -> String {
        match self {
            KeychainScope::Local { execution_id } => format!("local:{execution_id}"),
            KeychainScope::Shared { root_execution_id } => format!("shared:{root_execution_id}"),
            KeychainScope::Global => "global".to_string(),
        }
    }
}

/// A raw secret from the credential store — used as-is, just encrypted
/// at rest.
#[derive(Debug, Clone)]
pub struct RawCredential {
    pub payload: Value,
    pub ttl_ms: Option<u64>,
}

/// Declares how to derive a token: endpoint, method, headers, and a body
/// template.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub endpoint: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body_template: Value,
}

/// What a [`CredentialProvider`] hands back for a derived token.
#[derive(Debug, Clone)]
pub struct TokenResponse {
    pub token: Value,
    pub expires_in_ms: Option<u64>,
}

/// Resolves raw secrets by name. Implementations talk to whatever
/// backing secret store a deployment uses; this crate ships none.
pub trait CredentialStore: Send + Sync {
    fn fetch(&self, name: &str) -> Result<RawCredential, KeychainError>;
}

/// Calls out to an external token endpoint to derive a token.
pub trait CredentialProvider: Send + Sync {
    fn derive_token(&self, request: &TokenRequest) -> Result<TokenResponse, KeychainError>;
}

/// Encrypts/decrypts a keychain entry's payload at rest.
pub trait EncryptionProvider: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeychainError>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, KeychainError>;
}

/// Default [`EncryptionProvider`]: AES-256-GCM with a process-local key
/// generated at construction (see DESIGN.md for why `aes-gcm`).
pub struct LocalAesGcmEncryption {
    cipher: Aes256Gcm,
}

impl LocalAesGcmEncryption {
    pub fn new() -> Self {
        let mut key_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut key_bytes);
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Self { cipher: Aes256Gcm::new(key) }
    }
}

impl Default for LocalAesGcmEncryption {
    fn default() -> Self {
        Self::new()
    }
}

const NONCE_LEN: usize = 12;

impl EncryptionProvider for LocalAesGcmEncryption {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeychainError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let mut ciphertext = self.cipher.encrypt(nonce, plaintext).map_err(|e| KeychainError::Encryption(e.to_string()))?;
        let mut out = nonce_bytes.to_vec();
        out.append(&mut ciphertext);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, KeychainError> {
        if ciphertext.len() < NONCE_LEN {
            return Err(KeychainError::Encryption("ciphertext too short".into()));
        }
        let (nonce_bytes, body) = ciphertext.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher.decrypt(nonce, body).map_err(|e| KeychainError::Encryption(e.to_string()))
    }
}

/// Where a credential's value comes from, and how the keychain should
/// validate/derive it.
pub enum CredentialSource<'a> {
    Raw { name: &'a str },
    Derived { name: &'a str, request: TokenRequest, auto_renew: bool },
}

/// A cached credential/token entry.
struct KeychainEntry {
    encrypted_payload: Vec<u8>,
    created_at: u64,
    expires_at: u64,
    auto_renew: bool,
    access_count: u64,
    schema: Option<Vec<String>>,
}

/// The Keychain (C4): a typed credential/token cache keyed by
/// `(name, catalog_id, scope)`.
pub struct Keychain<C: Clock, S: CredentialStore, P: CredentialProvider, E: EncryptionProvider> {
    clock: C,
    store: S,
    provider: P,
    encryption: E,
    entries: Mutex<HashMap<(String, CatalogId, String), KeychainEntry>>,
}

impl<C: Clock, S: CredentialStore, P: CredentialProvider, E: EncryptionProvider> Keychain<C, S, P, E> {
    pub fn new(clock: C, store: S, provider: P, encryption: E) -> Self {
        Self { clock, store, provider, encryption, entries: Mutex::new(HashMap::new()) }
    }

    fn key(name: &str, catalog_id: CatalogId, scope: &KeychainScope) -> (String, CatalogId, String) {
        (name.to_string(), catalog_id, scope.key())
    }

    /// Fetch a credential, deriving or re-deriving it as needed.
    pub fn fetch(
        &self,
        catalog_id: CatalogId,
        scope: KeychainScope,
        source: CredentialSource<'_>,
        schema: Option<Vec<String>>,
    ) -> Result<Value, KeychainError> {
        let name = match &source {
            CredentialSource::Raw { name } => *name,
            CredentialSource::Derived { name, .. } => *name,
        };
        let key = Self::key(name, catalog_id, &scope);
        let now = self.clock.epoch_ms();

        {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get(&key) {
                if entry.expires_at > now {
                    let needs_renew = entry.auto_renew && Self::renew_due(entry.created_at, entry.expires_at, now);
                    if !needs_renew {
                        let payload = self.decrypt_and_validate(entry)?;
                        if let Some(entry) = entries.get_mut(&key) {
                            entry.access_count += 1;
                        }
                        return Ok(payload);
                    }
                } else {
                    entries.remove(&key);
                }
            }
        }

        let (payload, ttl_ms, auto_renew) = self.derive(&source)?;
        self.insert(key, payload.clone(), ttl_ms, auto_renew, now, schema)?;
        Ok(payload)
    }

    fn renew_due(created_at: u64, expires_at: u64, now: u64) -> bool {
        let total = expires_at.saturating_sub(created_at);
        if total == 0 {
            return true;
        }
        let elapsed = now.saturating_sub(created_at);
        (elapsed as f64 / total as f64) >= AUTO_RENEW_THRESHOLD
    }

    fn derive(&self, source: &CredentialSource<'_>) -> Result<(Value, Option<u64>, bool), KeychainError> {
        match source {
            CredentialSource::Raw { name } => {
                let raw = self.store.fetch(name)?;
                Ok((raw.payload, raw.ttl_ms, false))
            }
            CredentialSource::Derived { request, auto_renew, .. } => {
                let response = self.provider.derive_token(request)?;
                Ok((response.token, response.expires_in_ms, *auto_renew))
            }
        }
    }

    fn insert(
        &self,
        key: (String, CatalogId, String),
        payload: Value,
        ttl_ms: Option<u64>,
        auto_renew: bool,
        now: u64,
        schema: Option<Vec<String>>,
    ) -> Result<(), KeychainError> {
        if let Some(required) = &schema {
            validate_schema(&payload, required)?;
        }
        let bytes = serde_json::to_vec(&payload).map_err(|e| KeychainError::CredentialFailure(e.to_string()))?;
        let encrypted_payload = self.encryption.encrypt(&bytes)?;
        let ttl = ttl_ms.unwrap_or(u64::MAX / 2);
        let expires_at = now.saturating_add(ttl).saturating_sub(SAFETY_MARGIN_MS.min(ttl));
        self.entries.lock().insert(
            key,
            KeychainEntry { encrypted_payload, created_at: now, expires_at, auto_renew, access_count: 0, schema },
        );
        Ok(())
    }

    fn decrypt_and_validate(&self, entry: &KeychainEntry) -> Result<Value, KeychainError> {
        let bytes = self.encryption.decrypt(&entry.encrypted_payload)?;
        let payload: Value = serde_json::from_slice(&bytes).map_err(|e| KeychainError::CredentialFailure(e.to_string()))?;
        if let Some(required) = &entry.schema {
            validate_schema(&payload, required)?;
        }
        Ok(payload)
    }

    pub fn access_count(&self, name: &str, catalog_id: CatalogId, scope: &KeychainScope) -> Option<u64> {
        self.entries.lock().get(&Self::key(name, catalog_id, scope)).map(|e| e.access_count)
    }

    pub fn expires_at(&self, name: &str, catalog_id: CatalogId, scope: &KeychainScope) -> Option<u64> {
        self.entries.lock().get(&Self::key(name, catalog_id, scope)).map(|e| e.expires_at)
    }

    /// Drop every `local`-scope entry owned by `execution_id` — called
    /// when the owning execution terminates.
    pub fn drop_local_scope(&self, execution_id: ExecutionId) {
        let scope_key = KeychainScope::Local { execution_id }.key();
        self.entries.lock().retain(|(_, _, s), _| s != &scope_key);
    }
}

fn validate_schema(payload: &Value, required_fields: &[String]) -> Result<(), KeychainError> {
    let obj = payload.as_object().ok_or_else(|| KeychainError::CredentialSchemaError("payload is not an object".into()))?;
    for field in required_fields {
        if !obj.contains_key(field) {
            return Err(KeychainError::CredentialSchemaError(format!("missing required field {field}")));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "keychain_tests.rs"]
mod tests;
