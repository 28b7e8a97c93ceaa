// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for key derivation and caching.
//!
//! This module handles loading and validating:
//! - The master secret every per-purpose key is derived from
//! - PBKDF2 iteration count
//! - How many master secret bytes are mixed into derivation salts
//! - How long derived keys stay in the secret store cache
//!
//! Unit-test builds use a reduced default iteration count so the suite stays
//! fast. Those values MUST NOT be used in production.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::instrument;

use crate::error::{CryptoError, CryptoResult};
use crate::secret::MasterSecret;

/// Default PBKDF2-HMAC-SHA256 iteration count.
#[cfg(not(test))]
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;
#[cfg(test)]
pub const DEFAULT_KDF_ITERATIONS: u32 = 1_000;

/// Minimum accepted PBKDF2 iteration count.
#[cfg(not(test))]
pub const MIN_KDF_ITERATIONS: u32 = 100_000;
#[cfg(test)]
pub const MIN_KDF_ITERATIONS: u32 = 1;

/// Default number of master secret bytes mixed into each salt.
pub const DEFAULT_SALT_PREFIX_LEN: usize = 8;

/// Upper bound on the salt prefix length.
pub const MAX_SALT_PREFIX_LEN: usize = 64;

/// Default lifetime of a derived key in the cache (1 hour).
const DEFAULT_KEY_CACHE_TTL_SECS: u64 = 3600;

/// Minimum allowed key cache TTL (1 second).
const MIN_KEY_CACHE_TTL_SECS: u64 = 1;

/// Maximum allowed key cache TTL (24 hours).
const MAX_KEY_CACHE_TTL_SECS: u64 = 86_400;

pub const ENV_MASTER_SECRET: &str = "SEALBOX_MASTER_SECRET";
pub const ENV_KDF_ITERATIONS: &str = "SEALBOX_KDF_ITERATIONS";
pub const ENV_SALT_PREFIX_LEN: &str = "SEALBOX_SALT_PREFIX_LEN";
pub const ENV_KEY_CACHE_TTL_SECS: &str = "SEALBOX_KEY_CACHE_TTL_SECS";

/// Configuration for the key manager.
#[derive(Clone)]
pub struct CryptoConfig {
	master_secret: MasterSecret,
	kdf_iterations: u32,
	salt_prefix_len: usize,
	key_cache_ttl: Duration,
}

impl CryptoConfig {
	/// Create a configuration with default derivation and cache settings.
	pub fn new(master_secret: MasterSecret) -> Self {
		Self {
			master_secret,
			kdf_iterations: DEFAULT_KDF_ITERATIONS,
			salt_prefix_len: DEFAULT_SALT_PREFIX_LEN,
			key_cache_ttl: Duration::from_secs(DEFAULT_KEY_CACHE_TTL_SECS),
		}
	}

	/// Override the PBKDF2 iteration count.
	///
	/// Changing this after data has been encrypted makes that data
	/// undecryptable, exactly like changing the master secret.
	pub fn with_kdf_iterations(mut self, iterations: u32) -> CryptoResult<Self> {
		if iterations < MIN_KDF_ITERATIONS {
			return Err(CryptoError::Configuration(format!(
				"KDF iterations must be at least {MIN_KDF_ITERATIONS}, got {iterations}"
			)));
		}
		self.kdf_iterations = iterations;
		Ok(self)
	}

	/// Override how many master secret bytes feed the derivation salt.
	pub fn with_salt_prefix_len(mut self, len: usize) -> CryptoResult<Self> {
		if len == 0 || len > MAX_SALT_PREFIX_LEN {
			return Err(CryptoError::Configuration(format!(
				"salt prefix length must be between 1 and {MAX_SALT_PREFIX_LEN}, got {len}"
			)));
		}
		self.salt_prefix_len = len;
		Ok(self)
	}

	/// Override the derived key cache TTL.
	pub fn with_key_cache_ttl(mut self, ttl: Duration) -> CryptoResult<Self> {
		if ttl.as_secs() < MIN_KEY_CACHE_TTL_SECS {
			return Err(CryptoError::Configuration(format!(
				"key cache TTL must be at least {MIN_KEY_CACHE_TTL_SECS} seconds"
			)));
		}
		if ttl.as_secs() > MAX_KEY_CACHE_TTL_SECS {
			return Err(CryptoError::Configuration(format!(
				"key cache TTL must be at most {MAX_KEY_CACHE_TTL_SECS} seconds"
			)));
		}
		self.key_cache_ttl = ttl;
		Ok(self)
	}

	/// Load configuration from environment variables.
	///
	/// Environment variables:
	/// - `SEALBOX_MASTER_SECRET` - Master secret
	/// - `SEALBOX_MASTER_SECRET_FILE` - Path to file containing the master secret
	/// - `SEALBOX_KDF_ITERATIONS` - PBKDF2 iterations (default: 100000)
	/// - `SEALBOX_SALT_PREFIX_LEN` - Secret bytes mixed into salts (default: 8)
	/// - `SEALBOX_KEY_CACHE_TTL_SECS` - Derived key cache TTL (default: 3600)
	#[instrument(skip_all)]
	pub fn from_env() -> CryptoResult<Self> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Same as [`CryptoConfig::from_env`], reading variables through `lookup`.
	pub(crate) fn from_lookup<F>(lookup: F) -> CryptoResult<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let master_secret = load_secret_from_env(&lookup, ENV_MASTER_SECRET)?
			.ok_or(CryptoError::MasterSecretNotConfigured)?;

		let mut config = Self::new(master_secret);

		if let Some(iterations) = parse_env::<u32, _>(&lookup, ENV_KDF_ITERATIONS)? {
			config = config.with_kdf_iterations(iterations)?;
		}
		if let Some(len) = parse_env::<usize, _>(&lookup, ENV_SALT_PREFIX_LEN)? {
			config = config.with_salt_prefix_len(len)?;
		}
		if let Some(secs) = parse_env::<u64, _>(&lookup, ENV_KEY_CACHE_TTL_SECS)? {
			config = config.with_key_cache_ttl(Duration::from_secs(secs))?;
		}

		tracing::debug!(
			kdf_iterations = config.kdf_iterations,
			salt_prefix_len = config.salt_prefix_len,
			key_cache_ttl_secs = config.key_cache_ttl.as_secs(),
			"loaded encryption configuration"
		);

		Ok(config)
	}

	pub fn master_secret(&self) -> &MasterSecret {
		&self.master_secret
	}

	pub fn kdf_iterations(&self) -> u32 {
		self.kdf_iterations
	}

	pub fn salt_prefix_len(&self) -> usize {
		self.salt_prefix_len
	}

	pub fn key_cache_ttl(&self) -> Duration {
		self.key_cache_ttl
	}
}

/// Load a secret from environment, with support for _FILE suffix.
///
/// Checks for:
/// 1. `{prefix}` - Direct value
/// 2. `{prefix}_FILE` - Path to file containing value
fn load_secret_from_env<F>(lookup: &F, prefix: &str) -> CryptoResult<Option<MasterSecret>>
where
	F: Fn(&str) -> Option<String>,
{
	if let Some(value) = lookup(prefix) {
		if !value.is_empty() {
			return MasterSecret::new(value).map(Some);
		}
	}

	let file_var = format!("{prefix}_FILE");
	if let Some(path_str) = lookup(&file_var) {
		return load_secret_from_file(&file_var, &PathBuf::from(path_str)).map(Some);
	}

	Ok(None)
}

fn load_secret_from_file(file_var: &str, path: &Path) -> CryptoResult<MasterSecret> {
	if !path.exists() {
		return Err(CryptoError::Configuration(format!(
			"file specified in {file_var} does not exist: {}",
			path.display()
		)));
	}
	let content = zeroize::Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
		CryptoError::Configuration(format!(
			"failed to read {file_var} from {}: {e}",
			path.display()
		))
	})?);
	MasterSecret::new(content.trim().as_bytes())
}

fn parse_env<T, F>(lookup: &F, name: &str) -> CryptoResult<Option<T>>
where
	T: std::str::FromStr,
	F: Fn(&str) -> Option<String>,
{
	match lookup(name) {
		Some(raw) if !raw.trim().is_empty() => raw
			.trim()
			.parse()
			.map(Some)
			.map_err(|_| CryptoError::Configuration(format!("{name} is not a valid number: {raw}"))),
		_ => Ok(None),
	}
}

impl std::fmt::Debug for CryptoConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CryptoConfig")
			.field("master_secret", &"[REDACTED]")
			.field("kdf_iterations", &self.kdf_iterations)
			.field("salt_prefix_len", &self.salt_prefix_len)
			.field("key_cache_ttl", &self.key_cache_ttl)
			.finish()
	}
}
