// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-purpose, versioned key derivation.
//!
//! Every key is derived from the master secret:
//!
//! ```text
//! salt = SHA-256(purpose ":" version ":" master_secret[..prefix_len])
//! key  = PBKDF2-HMAC-SHA256(master_secret, salt, iterations, 32)
//! ```
//!
//! Derived keys are memoized in the [`SecretStore`] with a bounded TTL. The
//! cache is an optimisation only: a miss, an eviction, or an unavailable
//! store falls back to re-derivation, which always yields the same bytes.

use std::sync::Arc;
use std::time::Duration;

use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use crate::config::CryptoConfig;
use crate::error::{CryptoError, CryptoResult};
use crate::secret::MasterSecret;
use crate::store::{parse_counter, SecretStore};
use crate::types::{DerivedKey, KeyVersion, Purpose, KEY_SIZE};

/// Derives and caches keys, and tracks the current version per purpose.
pub struct KeyManager {
	master_secret: MasterSecret,
	store: Arc<dyn SecretStore>,
	kdf_iterations: u32,
	salt_prefix_len: usize,
	key_cache_ttl: Duration,
}

impl KeyManager {
	pub fn new(config: &CryptoConfig, store: Arc<dyn SecretStore>) -> Self {
		Self {
			master_secret: config.master_secret().clone(),
			store,
			kdf_iterations: config.kdf_iterations(),
			salt_prefix_len: config.salt_prefix_len(),
			key_cache_ttl: config.key_cache_ttl(),
		}
	}

	/// Build a key manager from `SEALBOX_*` environment variables.
	///
	/// Fails with [`CryptoError::MasterSecretNotConfigured`] when no master
	/// secret is provisioned.
	pub fn from_env(store: Arc<dyn SecretStore>) -> CryptoResult<Self> {
		Self::from_lookup(|name| std::env::var(name).ok(), store)
	}

	pub(crate) fn from_lookup<F>(lookup: F, store: Arc<dyn SecretStore>) -> CryptoResult<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let config = CryptoConfig::from_lookup(lookup)?;
		Ok(Self::new(&config, store))
	}

	/// Derive the key for `(purpose, version)`, consulting the cache first.
	#[instrument(skip_all, fields(purpose = %purpose, version = %version))]
	pub fn derive_key(&self, purpose: &Purpose, version: KeyVersion) -> CryptoResult<DerivedKey> {
		let cache_key = key_cache_key(purpose, version);

		match self.store.get(&cache_key) {
			Ok(Some(bytes)) => {
				let bytes = Zeroizing::new(bytes);
				if let Some(key) = DerivedKey::from_slice(&bytes) {
					return Ok(key);
				}
				warn!(len = bytes.len(), "ignoring cached key with wrong length");
			}
			Ok(None) => {}
			Err(e) => warn!(error = %e, "key cache read failed, deriving directly"),
		}

		let key = self.derive_uncached(purpose, version);

		if let Err(e) = self
			.store
			.set(&cache_key, key.as_bytes(), Some(self.key_cache_ttl))
		{
			warn!(error = %e, "key cache write failed");
		}

		Ok(key)
	}

	/// Convenience wrapper over [`KeyManager::derive_key`] taking raw values.
	pub fn derive_key_for(&self, purpose: &str, version: u32) -> CryptoResult<DerivedKey> {
		self.derive_key(&Purpose::new(purpose)?, KeyVersion::new(version)?)
	}

	/// Version new encryptions for `purpose` should use.
	///
	/// Defaults to 1 when the counter was never set, is unreadable, or the
	/// store is down.
	pub fn get_current_version(&self, purpose: &Purpose) -> KeyVersion {
		let counter_key = version_counter_key(purpose);
		match self.store.get(&counter_key) {
			Ok(Some(bytes)) => parse_counter(&bytes)
				.and_then(|v| KeyVersion::try_from(v).ok())
				.unwrap_or_else(|| {
					warn!(purpose = %purpose, "unreadable key version counter, using version 1");
					KeyVersion::FIRST
				}),
			Ok(None) => KeyVersion::FIRST,
			Err(e) => {
				warn!(purpose = %purpose, error = %e, "key version read failed, using version 1");
				KeyVersion::FIRST
			}
		}
	}

	/// Advance the current version for `purpose` and return the new version.
	///
	/// Existing ciphertext and cached keys are untouched; only new
	/// encryptions pick up the new version.
	#[instrument(skip_all, fields(purpose = %purpose))]
	pub fn rotate_key(&self, purpose: &Purpose) -> CryptoResult<KeyVersion> {
		let counter_key = version_counter_key(purpose);
		let next = self
			.store
			.increment(&counter_key, u64::from(KeyVersion::FIRST.get()))
			.map_err(|e| {
				tracing::error!(error = %e, "key rotation failed");
				CryptoError::from(e)
			})?;
		let version = KeyVersion::try_from(next)?;

		info!(
			audit = true,
			purpose = %purpose,
			old_version = next.saturating_sub(1),
			new_version = %version,
			"encryption key rotated"
		);
		Ok(version)
	}

	/// Drop a cached key so the next use re-derives it.
	pub fn invalidate_cached_key(&self, purpose: &Purpose, version: KeyVersion) -> CryptoResult<()> {
		self.store.delete(&key_cache_key(purpose, version))?;
		Ok(())
	}

	fn derive_uncached(&self, purpose: &Purpose, version: KeyVersion) -> DerivedKey {
		let salt = self.salt_for(purpose, version);
		let mut key = Zeroizing::new([0u8; KEY_SIZE]);
		pbkdf2_hmac::<Sha256>(
			self.master_secret.expose(),
			&salt,
			self.kdf_iterations,
			key.as_mut(),
		);
		debug!(iterations = self.kdf_iterations, "derived key");
		DerivedKey::from_array(key)
	}

	fn salt_for(&self, purpose: &Purpose, version: KeyVersion) -> [u8; 32] {
		let mut hasher = Sha256::new();
		hasher.update(purpose.as_str().as_bytes());
		hasher.update(b":");
		hasher.update(version.to_string().as_bytes());
		hasher.update(b":");
		hasher.update(self.master_secret.salt_prefix(self.salt_prefix_len));
		hasher.finalize().into()
	}
}

fn key_cache_key(purpose: &Purpose, version: KeyVersion) -> String {
	format!("encryption_key:{purpose}:{version}")
}

fn version_counter_key(purpose: &Purpose) -> String {
	format!("key_version:{purpose}")
}

impl std::fmt::Debug for KeyManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("KeyManager")
			.field("master_secret", &"[REDACTED]")
			.field("kdf_iterations", &self.kdf_iterations)
			.field("salt_prefix_len", &self.salt_prefix_len)
			.field("key_cache_ttl", &self.key_cache_ttl)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::{InMemorySecretStore, StoreError};

	/// Store whose every operation fails, standing in for a downed cache.
	struct UnavailableStore;

	impl SecretStore for UnavailableStore {
		fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
			Err(StoreError::Unavailable("connection refused".into()))
		}

		fn set(&self, _key: &str, _value: &[u8], _ttl: Option<Duration>) -> Result<(), StoreError> {
			Err(StoreError::Unavailable("connection refused".into()))
		}

		fn delete(&self, _key: &str) -> Result<(), StoreError> {
			Err(StoreError::Unavailable("connection refused".into()))
		}

		fn increment(&self, _key: &str, _default: u64) -> Result<u64, StoreError> {
			Err(StoreError::Unavailable("connection refused".into()))
		}
	}

	fn config() -> CryptoConfig {
		CryptoConfig::new(MasterSecret::new("unit-test-master-secret").unwrap())
	}

	fn manager_with_store() -> (KeyManager, Arc<InMemorySecretStore>) {
		let store = Arc::new(InMemorySecretStore::new());
		(KeyManager::new(&config(), store.clone()), store)
	}

	fn purpose(p: &str) -> Purpose {
		Purpose::new(p).unwrap()
	}

	#[test]
	fn derivation_is_deterministic_across_cold_cache() {
		let (manager, store) = manager_with_store();
		let first = manager.derive_key(&purpose("user_data"), KeyVersion::FIRST).unwrap();
		store.clear();
		let second = manager.derive_key(&purpose("user_data"), KeyVersion::FIRST).unwrap();
		assert_eq!(first, second);
	}

	#[test]
	fn derivation_matches_documented_construction() {
		let (manager, _) = manager_with_store();
		let key = manager.derive_key_for("user_data", 1).unwrap();

		let mut hasher = Sha256::new();
		hasher.update(b"user_data:1:unit-tes");
		let salt: [u8; 32] = hasher.finalize().into();
		let mut expected = [0u8; KEY_SIZE];
		pbkdf2_hmac::<Sha256>(
			b"unit-test-master-secret",
			&salt,
			config().kdf_iterations(),
			&mut expected,
		);

		assert_eq!(key.as_bytes(), &expected);
	}

	#[test]
	fn different_managers_with_same_secret_agree() {
		let (a, _) = manager_with_store();
		let (b, _) = manager_with_store();
		assert_eq!(
			a.derive_key_for("user_data", 3).unwrap(),
			b.derive_key_for("user_data", 3).unwrap()
		);
	}

	#[test]
	fn purposes_and_versions_are_independent() {
		let (manager, _) = manager_with_store();
		let base = manager.derive_key_for("user_data", 1).unwrap();
		assert_ne!(base, manager.derive_key_for("tokens", 1).unwrap());
		assert_ne!(base, manager.derive_key_for("user_data", 2).unwrap());
	}

	#[test]
	fn salt_prefix_len_changes_key() {
		let store = Arc::new(InMemorySecretStore::new());
		let default = KeyManager::new(&config(), store.clone());
		let longer = KeyManager::new(
			&config().with_salt_prefix_len(16).unwrap(),
			Arc::new(InMemorySecretStore::new()),
		);
		assert_ne!(
			default.derive_key_for("user_data", 1).unwrap(),
			longer.derive_key_for("user_data", 1).unwrap()
		);
	}

	#[test]
	fn derived_key_is_cached_with_ttl() {
		let (manager, store) = manager_with_store();
		let key = manager.derive_key_for("user_data", 1).unwrap();
		let cached = store.get("encryption_key:user_data:1").unwrap().unwrap();
		assert_eq!(cached.as_slice(), key.as_bytes());
	}

	#[test]
	fn cache_hit_skips_derivation() {
		let (manager, store) = manager_with_store();
		store
			.set("encryption_key:user_data:1", &[9u8; KEY_SIZE], None)
			.unwrap();
		let key = manager.derive_key_for("user_data", 1).unwrap();
		assert_eq!(key.as_bytes(), &[9u8; KEY_SIZE]);
	}

	#[test]
	fn malformed_cache_entry_is_rederived() {
		let (manager, store) = manager_with_store();
		let expected = manager.derive_key_for("user_data", 1).unwrap();
		store
			.set("encryption_key:user_data:1", b"short", None)
			.unwrap();
		assert_eq!(manager.derive_key_for("user_data", 1).unwrap(), expected);
	}

	#[test]
	fn derive_rejects_invalid_inputs() {
		let (manager, _) = manager_with_store();
		assert!(matches!(
			manager.derive_key_for("", 1),
			Err(CryptoError::Validation(_))
		));
		assert!(matches!(
			manager.derive_key_for("user_data", 0),
			Err(CryptoError::Validation(_))
		));
	}

	#[test]
	fn current_version_defaults_to_one() {
		let (manager, _) = manager_with_store();
		assert_eq!(manager.get_current_version(&purpose("user_data")), KeyVersion::FIRST);
	}

	#[test]
	fn rotate_increments_and_is_visible() {
		let (manager, store) = manager_with_store();
		let p = purpose("user_data");

		assert_eq!(manager.rotate_key(&p).unwrap().get(), 2);
		assert_eq!(manager.get_current_version(&p).get(), 2);
		assert_eq!(manager.rotate_key(&p).unwrap().get(), 3);
		assert_eq!(manager.get_current_version(&p).get(), 3);
		assert_eq!(manager.get_current_version(&purpose("tokens")).get(), 1);
		assert_eq!(store.get("key_version:user_data").unwrap(), Some(b"3".to_vec()));
	}

	#[test]
	fn rotate_leaves_cached_keys_alone() {
		let (manager, store) = manager_with_store();
		let p = purpose("user_data");
		manager.derive_key(&p, KeyVersion::FIRST).unwrap();
		manager.rotate_key(&p).unwrap();
		assert!(store.get("encryption_key:user_data:1").unwrap().is_some());
	}

	#[test]
	fn corrupt_counter_falls_back_to_first_version() {
		let (manager, store) = manager_with_store();
		store.set("key_version:user_data", b"garbage", None).unwrap();
		assert_eq!(manager.get_current_version(&purpose("user_data")), KeyVersion::FIRST);
	}

	#[test]
	fn unavailable_store_still_derives() {
		let manager = KeyManager::new(&config(), Arc::new(UnavailableStore));
		let (reference, _) = manager_with_store();

		assert_eq!(
			manager.derive_key_for("user_data", 2).unwrap(),
			reference.derive_key_for("user_data", 2).unwrap()
		);
		assert_eq!(manager.get_current_version(&purpose("user_data")), KeyVersion::FIRST);
	}

	#[test]
	fn unavailable_store_fails_rotation() {
		let manager = KeyManager::new(&config(), Arc::new(UnavailableStore));
		assert!(matches!(
			manager.rotate_key(&purpose("user_data")),
			Err(CryptoError::Store(StoreError::Unavailable(_)))
		));
	}

	#[test]
	fn invalidate_forces_rederivation() {
		let (manager, store) = manager_with_store();
		let p = purpose("user_data");
		manager.derive_key(&p, KeyVersion::FIRST).unwrap();
		manager.invalidate_cached_key(&p, KeyVersion::FIRST).unwrap();
		assert!(store.get("encryption_key:user_data:1").unwrap().is_none());
	}

	#[test]
	fn from_env_without_secret_is_not_configured() {
		let result = KeyManager::from_lookup(|_| None, Arc::new(InMemorySecretStore::new()));
		assert!(matches!(result, Err(CryptoError::MasterSecretNotConfigured)));
	}

	#[test]
	fn from_env_derives_with_loaded_settings() {
		let env = |name: &str| match name {
			"SEALBOX_MASTER_SECRET" => Some("unit-test-master-secret".to_string()),
			"SEALBOX_KDF_ITERATIONS" => Some("1000".to_string()),
			_ => None,
		};
		let from_env = KeyManager::from_lookup(env, Arc::new(InMemorySecretStore::new())).unwrap();
		let direct = KeyManager::new(
			&config().with_kdf_iterations(1000).unwrap(),
			Arc::new(InMemorySecretStore::new()),
		);

		let purpose = Purpose::new("user_data").unwrap();
		assert_eq!(
			from_env.derive_key(&purpose, KeyVersion::FIRST).unwrap(),
			direct.derive_key(&purpose, KeyVersion::FIRST).unwrap()
		);
	}

	#[test]
	fn debug_does_not_leak_secret() {
		let (manager, _) = manager_with_store();
		let debug = format!("{manager:?}");
		assert!(!debug.contains("unit-test-master-secret"));
		assert!(debug.contains("[REDACTED]"));
	}
}
