// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the field encryption subsystem.

use thiserror::Error;

use crate::store::StoreError;

/// Result type alias for encryption operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Message shown to end users when an encrypted field cannot be read.
pub const FIELD_UNAVAILABLE: &str = "field unavailable";

/// Broad class of a [`CryptoError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// Boot-time misconfiguration. Fatal.
	Configuration,
	/// Caller supplied an argument outside the accepted domain.
	Validation,
	/// Malformed, tampered, or otherwise undecryptable data.
	Encryption,
	/// The backing secret store failed where it cannot be bypassed.
	Store,
}

/// Errors that can occur during key management and encryption.
#[derive(Debug, Error)]
pub enum CryptoError {
	// =========================================================================
	// Configuration Errors
	// =========================================================================
	#[error("configuration error: {0}")]
	Configuration(String),

	#[error("master secret not configured")]
	MasterSecretNotConfigured,

	// =========================================================================
	// Validation Errors
	// =========================================================================
	#[error("validation error: {0}")]
	Validation(String),

	#[error("invalid key size: expected {expected}, got {actual}")]
	InvalidKeySize { expected: usize, actual: usize },

	// =========================================================================
	// Encryption Errors
	// =========================================================================
	#[error("encryption failed: {0}")]
	Encryption(String),

	#[error("authentication failed: ciphertext was tampered with or the wrong key or context was used")]
	Authentication,

	#[error("invalid envelope: {0}")]
	InvalidEnvelope(String),

	#[error("decode error: {0}")]
	Decode(String),

	#[error("ciphertext truncated: {len} bytes, need at least {min}")]
	Truncated { len: usize, min: usize },

	#[error("token has expired")]
	TokenExpired,

	// =========================================================================
	// Infrastructure Errors
	// =========================================================================
	#[error("secret store error: {0}")]
	Store(#[from] StoreError),
}

impl CryptoError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			CryptoError::Configuration(_) | CryptoError::MasterSecretNotConfigured => {
				ErrorKind::Configuration
			}
			CryptoError::Validation(_) | CryptoError::InvalidKeySize { .. } => ErrorKind::Validation,
			CryptoError::Encryption(_)
			| CryptoError::Authentication
			| CryptoError::InvalidEnvelope(_)
			| CryptoError::Decode(_)
			| CryptoError::Truncated { .. }
			| CryptoError::TokenExpired => ErrorKind::Encryption,
			CryptoError::Store(_) => ErrorKind::Store,
		}
	}

	/// Returns true if this error should be logged at error level.
	pub fn is_internal(&self) -> bool {
		matches!(self.kind(), ErrorKind::Configuration | ErrorKind::Store)
	}

	/// Returns true if the data being decrypted may be corrupted or tampered.
	pub fn is_encryption_error(&self) -> bool {
		self.kind() == ErrorKind::Encryption
	}

	/// Returns a message that is safe to show outside the process.
	///
	/// Encryption failures collapse to [`FIELD_UNAVAILABLE`]; the detailed
	/// error belongs in the logs.
	pub fn public_message(&self) -> &'static str {
		match self.kind() {
			ErrorKind::Encryption => FIELD_UNAVAILABLE,
			ErrorKind::Validation => "invalid input",
			ErrorKind::Configuration | ErrorKind::Store => "internal error",
		}
	}
}
