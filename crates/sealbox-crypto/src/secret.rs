// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Master secret wrapper.
//!
//! The master secret is the root of every derived key. It:
//!
//! - Never appears in logs (redacted Debug/Display)
//! - Is zeroized from memory on drop
//! - Requires an explicit `.expose()` call to read the bytes

use std::fmt;

use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// The redaction placeholder used in all output.
pub const REDACTED: &str = "[REDACTED]";

/// Process-wide master secret, held for the lifetime of a `KeyManager`.
#[derive(Clone)]
pub struct MasterSecret {
	bytes: Zeroizing<Vec<u8>>,
}

impl MasterSecret {
	/// Wrap raw secret bytes. Empty secrets are a configuration error.
	pub fn new(bytes: impl Into<Vec<u8>>) -> CryptoResult<Self> {
		let bytes = Zeroizing::new(bytes.into());
		if bytes.is_empty() {
			return Err(CryptoError::MasterSecretNotConfigured);
		}
		Ok(Self { bytes })
	}

	/// Explicitly access the secret bytes.
	pub fn expose(&self) -> &[u8] {
		&self.bytes
	}

	/// Leading bytes of the secret mixed into per-purpose salts.
	///
	/// Shorter secrets contribute all of their bytes.
	pub fn salt_prefix(&self, len: usize) -> &[u8] {
		&self.bytes[..len.min(self.bytes.len())]
	}
}

impl fmt::Debug for MasterSecret {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("MasterSecret").field(&REDACTED).finish()
	}
}

impl fmt::Display for MasterSecret {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}
