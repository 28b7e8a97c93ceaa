// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sealbox field encryption
//!
//! This crate protects sensitive fields (tokens, PII, credentials) at rest:
//!
//! - **Key Management**: per-purpose keys derived from one master secret, with
//!   explicit versions and rotation
//! - **Field Encryption**: AES-256-GCM envelopes (`v<version>$<base64>`) for
//!   text columns, bound to a caller-supplied context
//! - **Token Encryption**: opaque, timestamped encryption for bearer tokens
//! - **Hashing**: Argon2id password hashing, SHA-256 API key hashing, and
//!   secure random tokens and codes
//!
//! # Security Design
//!
//! - The master secret and derived keys are zeroized on drop and redacted
//!   in Debug output
//! - Every encryption uses a fresh random nonce
//! - Decryption failures are always surfaced as errors, never defaults
//! - Hash comparisons run in constant time

pub mod cipher;
pub mod column;
pub mod config;
pub mod envelope;
pub mod error;
pub mod field;
pub mod hashing;
pub mod key_manager;
pub mod secret;
pub mod store;
pub mod token;
pub mod types;

pub use cipher::{AeadCipher, NONCE_SIZE, TAG_SIZE};
pub use column::EncryptedTextColumn;
pub use config::CryptoConfig;
pub use envelope::Envelope;
pub use error::{CryptoError, CryptoResult, ErrorKind, FIELD_UNAVAILABLE};
pub use field::FieldEncryptor;
pub use hashing::{
	constant_time_eq, generate_secure_token, generate_verification_code, hash_api_key,
	hash_password, verify_password, PasswordHash,
};
pub use key_manager::KeyManager;
pub use secret::MasterSecret;
pub use store::{InMemorySecretStore, SecretStore, StoreError};
pub use token::TokenEncryptor;
pub use types::{DerivedKey, KeyVersion, Purpose, KEY_SIZE, TOKENS_PURPOSE};
