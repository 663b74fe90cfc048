// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! noetl-keychain: the typed credential/token cache.
//!
//! Built on `core/src/decision.rs`'s named+scoped lookup pattern and
//! `core/src/timer.rs`'s TTL arithmetic against a `Clock`, generalized
//! to a fetch/derive/encrypt/auto-renew cycle. See DESIGN.md for the
//! encryption crate choice.

pub mod keychain;

pub use keychain::{
    CredentialProvider, CredentialStore, EncryptionProvider, Keychain, KeychainEntry, KeychainError, KeychainScope,
    LocalAesGcmEncryption, RawCredential, TokenRequest, TokenResponse,
};
