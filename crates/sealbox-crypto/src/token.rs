// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Symmetric encryption for short-lived bearer tokens.
//!
//! Tokens are encrypted under a single fixed key (`tokens`, version 1) and
//! carry no version marker. There is deliberately no rotation operation:
//! the data is transient, so rotating would only require re-issuing tokens.
//!
//! Wire layout, URL-safe base64 without padding:
//!
//! ```text
//! 0x80 | issued_at (u64 BE seconds) | nonce (12) | ciphertext | tag (16)
//! ```
//!
//! The 9-byte header is bound as associated data, so the timestamp cannot
//! be altered without failing authentication.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use chrono::Utc;
use tracing::{instrument, warn};

use crate::cipher::{AeadCipher, MIN_CIPHERTEXT_LEN};
use crate::error::{CryptoError, CryptoResult};
use crate::key_manager::KeyManager;
use crate::types::{KeyVersion, Purpose, TOKENS_PURPOSE};

/// Leading byte identifying the token format.
pub const TOKEN_FORMAT_VERSION: u8 = 0x80;

/// Tolerated clock skew for tokens stamped in the future.
const CLOCK_SKEW_SECONDS: i64 = 60;

const HEADER_LEN: usize = 1 + 8;

/// Encrypts and decrypts opaque bearer tokens.
#[derive(Clone)]
pub struct TokenEncryptor {
	cipher: AeadCipher,
}

impl TokenEncryptor {
	/// Derive the token key once for this instance.
	pub fn new(keys: &KeyManager) -> CryptoResult<Self> {
		let purpose = Purpose::new(TOKENS_PURPOSE)?;
		let key = keys.derive_key(&purpose, KeyVersion::FIRST)?;
		Ok(Self {
			cipher: AeadCipher::from_derived(&key),
		})
	}

	#[instrument(name = "token.encrypt", skip_all, fields(len = token.len()))]
	pub fn encrypt_token(&self, token: &str) -> CryptoResult<String> {
		self.encrypt_token_at(token, Utc::now().timestamp())
	}

	/// Decrypt a token regardless of its age.
	#[instrument(name = "token.decrypt", skip_all)]
	pub fn decrypt_token(&self, encrypted: &str) -> CryptoResult<String> {
		self.open(encrypted).map(|(_, token)| token)
	}

	/// Decrypt a token, rejecting it if it was issued more than `ttl` ago.
	#[instrument(name = "token.decrypt_with_ttl", skip_all, fields(ttl_secs = ttl.as_secs()))]
	pub fn decrypt_token_with_ttl(&self, encrypted: &str, ttl: Duration) -> CryptoResult<String> {
		self.decrypt_token_at(encrypted, ttl, Utc::now().timestamp())
	}

	fn encrypt_token_at(&self, token: &str, issued_at: i64) -> CryptoResult<String> {
		let issued_at = u64::try_from(issued_at)
			.map_err(|_| CryptoError::Encryption("token timestamp before epoch".into()))?;

		let mut header = [0u8; HEADER_LEN];
		header[0] = TOKEN_FORMAT_VERSION;
		header[1..].copy_from_slice(&issued_at.to_be_bytes());

		let sealed = self.cipher.encrypt(token.as_bytes(), Some(&header))?;

		let mut out = Vec::with_capacity(HEADER_LEN + sealed.len());
		out.extend_from_slice(&header);
		out.extend_from_slice(&sealed);
		Ok(BASE64URL.encode(out))
	}

	fn decrypt_token_at(&self, encrypted: &str, ttl: Duration, now: i64) -> CryptoResult<String> {
		let (issued_at, token) = self.open(encrypted)?;

		let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
		if issued_at.saturating_add(ttl_secs) < now {
			return Err(CryptoError::TokenExpired);
		}
		if issued_at > now.saturating_add(CLOCK_SKEW_SECONDS) {
			return Err(CryptoError::Encryption("token issued in the future".into()));
		}
		Ok(token)
	}

	fn open(&self, encrypted: &str) -> CryptoResult<(i64, String)> {
		let raw = BASE64URL
			.decode(encrypted)
			.map_err(|e| CryptoError::Decode(format!("invalid token encoding: {e}")))?;

		if raw.len() < HEADER_LEN + MIN_CIPHERTEXT_LEN {
			return Err(CryptoError::Truncated {
				len: raw.len(),
				min: HEADER_LEN + MIN_CIPHERTEXT_LEN,
			});
		}

		let (header, sealed) = raw.split_at(HEADER_LEN);
		if header[0] != TOKEN_FORMAT_VERSION {
			return Err(CryptoError::Decode(format!(
				"unknown token format: {:#04x}",
				header[0]
			)));
		}

		let plaintext = self.cipher.decrypt(sealed, Some(header)).map_err(|e| {
			warn!(error = %e, "token authentication failed");
			e
		})?;

		let mut ts = [0u8; 8];
		ts.copy_from_slice(&header[1..]);
		let issued_at = i64::try_from(u64::from_be_bytes(ts))
			.map_err(|_| CryptoError::Decode("token timestamp out of range".into()))?;

		let token = String::from_utf8(plaintext)
			.map_err(|_| CryptoError::Encryption("token is not valid UTF-8".into()))?;
		Ok((issued_at, token))
	}
}

impl std::fmt::Debug for TokenEncryptor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TokenEncryptor")
			.field("purpose", &TOKENS_PURPOSE)
			.field("key", &"[REDACTED]")
			.finish()
	}
}
