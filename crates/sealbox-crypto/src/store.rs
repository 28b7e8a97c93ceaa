// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Key/value store used to memoize derived keys and track key versions.
//!
//! The host application usually backs this with its shared cache. The
//! in-memory implementation is suitable for single-process deployments and
//! tests.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

/// Errors raised by a [`SecretStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("store unavailable: {0}")]
	Unavailable(String),

	#[error("corrupt value under key {key}")]
	CorruptValue { key: String },
}

/// Process-wide key/value store.
///
/// Values are opaque bytes. Counters written by [`SecretStore::increment`]
/// are stored as decimal ASCII.
pub trait SecretStore: Send + Sync {
	/// Fetch a value. Expired entries are reported as absent.
	fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

	/// Store a value. `ttl = None` means the entry never expires.
	fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError>;

	/// Remove a value if present.
	fn delete(&self, key: &str) -> Result<(), StoreError>;

	/// Atomically increment a counter and return the new value.
	///
	/// An absent counter is treated as holding `default`, so the first call
	/// returns `default + 1`.
	fn increment(&self, key: &str, default: u64) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone)]
struct StoreEntry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl StoreEntry {
	fn is_live(&self, now: Instant) -> bool {
		!matches!(self.expires_at, Some(at) if at <= now)
	}
}

/// In-memory [`SecretStore`] guarded by a single mutex.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
	entries: Mutex<HashMap<String, StoreEntry>>,
}

impl InMemorySecretStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of live entries.
	pub fn len(&self) -> usize {
		let now = Instant::now();
		self.entries.lock().values().filter(|e| e.is_live(now)).count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Drop every entry, including version counters.
	pub fn clear(&self) {
		self.entries.lock().clear();
	}

	pub fn cleanup_expired(&self) {
		let now = Instant::now();
		self.entries.lock().retain(|_, entry| entry.is_live(now));
	}
}

impl SecretStore for InMemorySecretStore {
	fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
		let now = Instant::now();
		let mut entries = self.entries.lock();

		match entries.get(key) {
			Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
			Some(_) => {
				entries.remove(key);
				Ok(None)
			}
			None => Ok(None),
		}
	}

	fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError> {
		let expires_at = ttl.map(|ttl| Instant::now() + ttl);
		self.entries.lock().insert(
			key.to_string(),
			StoreEntry {
				value: value.to_vec(),
				expires_at,
			},
		);
		Ok(())
	}

	fn delete(&self, key: &str) -> Result<(), StoreError> {
		self.entries.lock().remove(key);
		Ok(())
	}

	fn increment(&self, key: &str, default: u64) -> Result<u64, StoreError> {
		let now = Instant::now();
		let mut entries = self.entries.lock();

		let current = match entries.get(key) {
			Some(entry) if entry.is_live(now) => {
				parse_counter(&entry.value).ok_or_else(|| StoreError::CorruptValue {
					key: key.to_string(),
				})?
			}
			_ => default,
		};

		let next = current
			.checked_add(1)
			.ok_or_else(|| StoreError::CorruptValue {
				key: key.to_string(),
			})?;

		entries.insert(
			key.to_string(),
			StoreEntry {
				value: next.to_string().into_bytes(),
				expires_at: None,
			},
		);
		Ok(next)
	}
}

/// Parse a counter written by [`SecretStore::increment`].
pub fn parse_counter(bytes: &[u8]) -> Option<u64> {
	std::str::from_utf8(bytes).ok()?.trim().parse().ok()
}
