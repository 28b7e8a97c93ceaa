// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! AES-256-GCM authenticated encryption over raw byte buffers.
//!
//! Output layout is `nonce (12) || ciphertext || tag (16)`.

use aes_gcm::{
	aead::{Aead, KeyInit, OsRng, Payload},
	Aes256Gcm, Key, Nonce,
};
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};
use crate::types::{DerivedKey, KEY_SIZE};

/// Size of AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Shortest blob [`AeadCipher::decrypt`] accepts (empty plaintext).
pub const MIN_CIPHERTEXT_LEN: usize = NONCE_SIZE + TAG_SIZE;

/// Generate a random nonce.
///
/// Uses 96-bit random nonces from OsRng. Derived keys are long-lived, so a
/// counter would have to survive process restarts; random nonces keep the
/// collision probability negligible well past expected volumes per key.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
	let mut nonce = [0u8; NONCE_SIZE];
	OsRng.fill_bytes(&mut nonce);
	nonce
}

/// AEAD cipher bound to a single 256-bit key.
#[derive(Clone)]
pub struct AeadCipher {
	cipher: Aes256Gcm,
}

impl AeadCipher {
	/// Create a cipher from raw key bytes. The key must be exactly 32 bytes.
	pub fn new(key: &[u8]) -> CryptoResult<Self> {
		if key.len() != KEY_SIZE {
			return Err(CryptoError::InvalidKeySize {
				expected: KEY_SIZE,
				actual: key.len(),
			});
		}
		let key = Key::<Aes256Gcm>::from_slice(key);
		Ok(Self {
			cipher: Aes256Gcm::new(key),
		})
	}

	pub fn from_derived(key: &DerivedKey) -> Self {
		let key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
		Self {
			cipher: Aes256Gcm::new(key),
		}
	}

	/// Encrypt `plaintext`, binding `aad` into the tag when given.
	pub fn encrypt(&self, plaintext: &[u8], aad: Option<&[u8]>) -> CryptoResult<Vec<u8>> {
		let nonce_bytes = generate_nonce();
		let nonce = Nonce::from_slice(&nonce_bytes);

		let payload = Payload {
			msg: plaintext,
			aad: aad.unwrap_or_default(),
		};
		let ciphertext = self
			.cipher
			.encrypt(nonce, payload)
			.map_err(|e| CryptoError::Encryption(format!("AES-GCM encryption failed: {e}")))?;

		let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
		out.extend_from_slice(&nonce_bytes);
		out.extend_from_slice(&ciphertext);
		Ok(out)
	}

	/// Decrypt a blob produced by [`AeadCipher::encrypt`].
	///
	/// Fails with [`CryptoError::Authentication`] on tampering, truncation
	/// past the minimum length, wrong key, or mismatched `aad`.
	pub fn decrypt(&self, blob: &[u8], aad: Option<&[u8]>) -> CryptoResult<Vec<u8>> {
		if blob.len() < MIN_CIPHERTEXT_LEN {
			return Err(CryptoError::Truncated {
				len: blob.len(),
				min: MIN_CIPHERTEXT_LEN,
			});
		}

		let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
		let nonce = Nonce::from_slice(nonce_bytes);
		let payload = Payload {
			msg: ciphertext,
			aad: aad.unwrap_or_default(),
		};

		self
			.cipher
			.decrypt(nonce, payload)
			.map_err(|_| CryptoError::Authentication)
	}
}

impl std::fmt::Debug for AeadCipher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AeadCipher")
			.field("algorithm", &"AES-256-GCM")
			.field("key", &"[REDACTED]")
			.finish()
	}
}
