// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Versioned envelope string format.
//!
//! `v<version>$<urlsafe-base64(nonce || ciphertext || tag)>`
//!
//! The version is canonical decimal and the base64 keeps its `=` padding.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE, Engine};

use crate::error::{CryptoError, CryptoResult};
use crate::types::KeyVersion;

const VERSION_PREFIX: char = 'v';
const SEPARATOR: char = '$';

/// A parsed envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
	pub version: KeyVersion,
	pub payload: Vec<u8>,
}

impl Envelope {
	pub fn new(version: KeyVersion, payload: Vec<u8>) -> Self {
		Self { version, payload }
	}

	/// Parse an envelope string, decoding its payload.
	pub fn parse(s: &str) -> CryptoResult<Self> {
		let (version, encoded) = split(s)?;
		let payload = URL_SAFE
			.decode(encoded)
			.map_err(|e| CryptoError::Decode(format!("invalid envelope payload: {e}")))?;
		Ok(Self { version, payload })
	}

	/// Read only the key version of an envelope string.
	pub fn version_of(s: &str) -> CryptoResult<KeyVersion> {
		split(s).map(|(version, _)| version)
	}

	pub fn encode(&self) -> String {
		self.to_string()
	}
}

impl fmt::Display for Envelope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{VERSION_PREFIX}{}{SEPARATOR}{}",
			self.version,
			URL_SAFE.encode(&self.payload)
		)
	}
}

fn split(s: &str) -> CryptoResult<(KeyVersion, &str)> {
	let (prefix, encoded) = s
		.split_once(SEPARATOR)
		.ok_or_else(|| CryptoError::InvalidEnvelope("missing version separator".into()))?;

	let digits = prefix
		.strip_prefix(VERSION_PREFIX)
		.ok_or_else(|| CryptoError::InvalidEnvelope("missing version prefix".into()))?;

	let version = digits
		.parse::<KeyVersion>()
		.map_err(|_| CryptoError::InvalidEnvelope(format!("malformed version: {prefix:?}")))?;

	Ok((version, encoded))
}
