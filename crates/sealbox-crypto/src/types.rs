// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for key derivation.

use std::fmt;
use std::str::FromStr;

use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// Size of derived keys in bytes (256 bits for AES-256).
pub const KEY_SIZE: usize = 32;

/// Purpose used by [`crate::TokenEncryptor`].
pub const TOKENS_PURPOSE: &str = "tokens";

/// Key version for a purpose. Starts at 1 and only ever increases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyVersion(u32);

impl KeyVersion {
	pub const FIRST: KeyVersion = KeyVersion(1);

	pub fn new(version: u32) -> CryptoResult<Self> {
		if version == 0 {
			return Err(CryptoError::Validation(
				"key version must be at least 1".into(),
			));
		}
		Ok(Self(version))
	}

	pub fn get(self) -> u32 {
		self.0
	}

	pub fn next(self) -> CryptoResult<Self> {
		self.0
			.checked_add(1)
			.map(Self)
			.ok_or_else(|| CryptoError::Validation("key version overflow".into()))
	}
}

impl Default for KeyVersion {
	fn default() -> Self {
		Self::FIRST
	}
}

impl fmt::Display for KeyVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Parses canonical decimal: ASCII digits only, no sign, no leading zeros.
impl FromStr for KeyVersion {
	type Err = CryptoError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let canonical = !s.is_empty()
			&& s.bytes().all(|b| b.is_ascii_digit())
			&& !(s.len() > 1 && s.starts_with('0'));
		if !canonical {
			return Err(CryptoError::Validation(format!("invalid key version: {s:?}")));
		}
		let version: u32 = s
			.parse()
			.map_err(|_| CryptoError::Validation(format!("key version out of range: {s}")))?;
		Self::new(version)
	}
}

impl TryFrom<u64> for KeyVersion {
	type Error = CryptoError;

	fn try_from(value: u64) -> Result<Self, Self::Error> {
		let version = u32::try_from(value)
			.map_err(|_| CryptoError::Validation(format!("key version out of range: {value}")))?;
		Self::new(version)
	}
}

/// Namespace for derived keys, e.g. `user_data` or `tokens`.
///
/// Must be non-empty and free of `:` and `$`, which delimit cache keys and
/// envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Purpose(String);

impl Purpose {
	pub fn new(purpose: impl Into<String>) -> CryptoResult<Self> {
		let purpose = purpose.into();
		if purpose.is_empty() {
			return Err(CryptoError::Validation("purpose must not be empty".into()));
		}
		if purpose.contains([':', '$']) {
			return Err(CryptoError::Validation(format!(
				"purpose must not contain ':' or '$': {purpose}"
			)));
		}
		Ok(Self(purpose))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Purpose {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl AsRef<str> for Purpose {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

/// A 256-bit key derived for one `(purpose, version)` pair.
#[derive(Clone)]
pub struct DerivedKey(Zeroizing<[u8; KEY_SIZE]>);

impl DerivedKey {
	pub(crate) fn from_array(bytes: Zeroizing<[u8; KEY_SIZE]>) -> Self {
		Self(bytes)
	}

	pub(crate) fn from_slice(bytes: &[u8]) -> Option<Self> {
		if bytes.len() != KEY_SIZE {
			return None;
		}
		let mut key = Zeroizing::new([0u8; KEY_SIZE]);
		key.copy_from_slice(bytes);
		Some(Self(key))
	}

	pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
		&self.0
	}
}

impl PartialEq for DerivedKey {
	fn eq(&self, other: &Self) -> bool {
		crate::hashing::constant_time_eq(self.0.as_slice(), other.0.as_slice())
	}
}

impl Eq for DerivedKey {}

impl fmt::Debug for DerivedKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("DerivedKey").field(&"[REDACTED]").finish()
	}
}
