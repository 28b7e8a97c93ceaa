// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Versioned string encryption for database columns.
//!
//! Values are encrypted under the current key version for a purpose and
//! stored as [`Envelope`] strings. Decryption always uses the version
//! embedded in the envelope, so data written before a rotation stays
//! readable.
//!
//! An optional context string (typically the owning record's id) is bound
//! into the authentication tag. The same context must be supplied to
//! decrypt, which stops ciphertext being copied between records.

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::cipher::AeadCipher;
use crate::envelope::Envelope;
use crate::error::{CryptoError, CryptoResult};
use crate::key_manager::KeyManager;
use crate::types::{KeyVersion, Purpose};

/// Encrypts string fields for one purpose.
#[derive(Debug, Clone)]
pub struct FieldEncryptor {
	keys: Arc<KeyManager>,
	purpose: Purpose,
}

impl FieldEncryptor {
	pub fn new(keys: Arc<KeyManager>, purpose: impl Into<String>) -> CryptoResult<Self> {
		Ok(Self {
			keys,
			purpose: Purpose::new(purpose)?,
		})
	}

	pub fn purpose(&self) -> &Purpose {
		&self.purpose
	}

	/// Encrypt `value` under the current key version.
	///
	/// Empty values are returned unchanged.
	#[instrument(name = "field.encrypt", skip_all, fields(purpose = %self.purpose))]
	pub fn encrypt_field(&self, value: &str, context: Option<&str>) -> CryptoResult<String> {
		if value.is_empty() {
			return Ok(String::new());
		}
		let version = self.keys.get_current_version(&self.purpose);
		self.encrypt_with_version(value, context, version)
	}

	/// Decrypt an envelope using the key version it names.
	///
	/// Empty values are returned unchanged.
	#[instrument(name = "field.decrypt", skip_all, fields(purpose = %self.purpose))]
	pub fn decrypt_field(&self, envelope: &str, context: Option<&str>) -> CryptoResult<String> {
		if envelope.is_empty() {
			return Ok(String::new());
		}

		let envelope = Envelope::parse(envelope)?;
		let key = self.keys.derive_key(&self.purpose, envelope.version)?;
		let cipher = AeadCipher::from_derived(&key);

		let plaintext = cipher
			.decrypt(&envelope.payload, context.map(str::as_bytes))
			.map_err(|e| {
				warn!(
					purpose = %self.purpose,
					version = %envelope.version,
					has_context = context.is_some(),
					error = %e,
					"field decryption failed"
				);
				e
			})?;

		String::from_utf8(plaintext)
			.map_err(|_| CryptoError::Encryption("decrypted field is not valid UTF-8".into()))
	}

	/// Re-encrypt an envelope under the current key version.
	///
	/// The input envelope is not modified; callers persist the returned one.
	#[instrument(name = "field.rotate", skip_all, fields(purpose = %self.purpose))]
	pub fn rotate_encryption(&self, envelope: &str, context: Option<&str>) -> CryptoResult<String> {
		let plaintext = zeroize::Zeroizing::new(self.decrypt_field(envelope, context)?);
		let rotated = self.encrypt_field(&plaintext, context)?;
		tracing::debug!(
			from_version = ?Envelope::version_of(envelope).ok(),
			to_version = ?Envelope::version_of(&rotated).ok(),
			"field re-encrypted"
		);
		Ok(rotated)
	}

	/// Whether an envelope was written under an older key version.
	///
	/// Empty values never need rotation.
	pub fn needs_rotation(&self, envelope: &str) -> CryptoResult<bool> {
		if envelope.is_empty() {
			return Ok(false);
		}
		let version = Envelope::version_of(envelope)?;
		Ok(version < self.keys.get_current_version(&self.purpose))
	}

	fn encrypt_with_version(
		&self,
		value: &str,
		context: Option<&str>,
		version: KeyVersion,
	) -> CryptoResult<String> {
		let key = self.keys.derive_key(&self.purpose, version)?;
		let cipher = AeadCipher::from_derived(&key);
		let payload = cipher.encrypt(value.as_bytes(), context.map(str::as_bytes))?;
		Ok(Envelope::new(version, payload).encode())
	}
}
