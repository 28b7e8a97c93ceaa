// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persistence-mapping hooks for encrypted text columns.
//!
//! A repository layer calls [`EncryptedTextColumn::encode_for_storage`]
//! before writing a row and [`EncryptedTextColumn::decode_from_storage`]
//! after reading one. `NULL` and empty values pass through untouched.

use crate::error::CryptoResult;
use crate::field::FieldEncryptor;

/// An encrypted text column bound to one purpose.
#[derive(Debug, Clone)]
pub struct EncryptedTextColumn {
	encryptor: FieldEncryptor,
}

impl EncryptedTextColumn {
	pub fn new(encryptor: FieldEncryptor) -> Self {
		Self { encryptor }
	}

	pub fn encryptor(&self) -> &FieldEncryptor {
		&self.encryptor
	}

	/// Turn an in-memory value into the string persisted in the column.
	pub fn encode_for_storage(
		&self,
		value: Option<&str>,
		context: Option<&str>,
	) -> CryptoResult<Option<String>> {
		value
			.map(|v| self.encryptor.encrypt_field(v, context))
			.transpose()
	}

	/// Turn a persisted column value back into plaintext.
	///
	/// Decryption failures are returned as errors, never as `None`.
	pub fn decode_from_storage(
		&self,
		stored: Option<&str>,
		context: Option<&str>,
	) -> CryptoResult<Option<String>> {
		stored
			.map(|v| self.encryptor.decrypt_field(v, context))
			.transpose()
	}
}
