// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end tests for key rotation across the public API.
//!
//! These run against production KDF parameters, so each test keeps the
//! number of distinct `(purpose, version)` derivations small.

use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Mutex};

use sealbox_crypto::{
	CryptoConfig, CryptoError, EncryptedTextColumn, Envelope, FieldEncryptor, InMemorySecretStore,
	KeyManager, KeyVersion, MasterSecret, Purpose, SecretStore, TokenEncryptor,
};

const MASTER_SECRET: &str = "integration-master-secret-7f3a9c";

fn key_manager() -> (Arc<KeyManager>, Arc<InMemorySecretStore>) {
	let store = Arc::new(InMemorySecretStore::new());
	let config = CryptoConfig::new(MasterSecret::new(MASTER_SECRET).unwrap());
	(Arc::new(KeyManager::new(&config, store.clone())), store)
}

/// Test that data written before two rotations is rotated to the newest key.
/// This is the migration path operators run after `rotate_key`.
#[test]
fn test_rotate_encryption_across_two_versions() {
	let (keys, _) = key_manager();
	let fields = FieldEncryptor::new(keys.clone(), "user_data").unwrap();

	let original = fields.encrypt_field("secret-value-42", Some("user:123")).unwrap();
	assert_eq!(Envelope::version_of(&original).unwrap(), KeyVersion::FIRST);

	let purpose = Purpose::new("user_data").unwrap();
	assert_eq!(keys.rotate_key(&purpose).unwrap().get(), 2);
	assert_eq!(keys.rotate_key(&purpose).unwrap().get(), 3);

	let rotated = fields.rotate_encryption(&original, Some("user:123")).unwrap();
	assert!(rotated.starts_with("v3$"));
	assert_eq!(
		fields.decrypt_field(&rotated, Some("user:123")).unwrap(),
		"secret-value-42"
	);
	assert_eq!(
		fields.decrypt_field(&original, Some("user:123")).unwrap(),
		"secret-value-42"
	);
}

/// Test that envelopes written by one process are readable by another that
/// shares only the master secret, even with a cold cache.
#[test]
fn test_envelopes_portable_between_processes() {
	let (writer_keys, _) = key_manager();
	let (reader_keys, reader_store) = key_manager();

	let writer = FieldEncryptor::new(writer_keys, "sensitive_data").unwrap();
	let reader = FieldEncryptor::new(reader_keys, "sensitive_data").unwrap();

	let envelope = writer.encrypt_field("ssn:078-05-1120", Some("person:1")).unwrap();
	assert!(reader_store.is_empty());
	assert_eq!(
		reader.decrypt_field(&envelope, Some("person:1")).unwrap(),
		"ssn:078-05-1120"
	);
}

/// Test that a cleared cache does not change decryption results.
#[test]
fn test_cache_is_not_source_of_truth() {
	let (keys, store) = key_manager();
	let fields = FieldEncryptor::new(keys, "user_data").unwrap();

	let envelope = fields.encrypt_field("value", None).unwrap();
	let before = store.get("encryption_key:user_data:1").unwrap();
	assert!(before.is_some());

	store.delete("encryption_key:user_data:1").unwrap();
	assert_eq!(fields.decrypt_field(&envelope, None).unwrap(), "value");
	assert_eq!(store.get("encryption_key:user_data:1").unwrap(), before);
}

/// Test that concurrent rotations never hand out the same version twice.
#[test]
fn test_concurrent_rotations_are_atomic() {
	let (keys, _) = key_manager();
	let purpose = Purpose::new("user_data").unwrap();

	let versions: Vec<u32> = std::thread::scope(|s| {
		let handles: Vec<_> = (0..8)
			.map(|_| {
				let keys = keys.clone();
				let purpose = purpose.clone();
				s.spawn(move || {
					(0..25)
						.map(|_| keys.rotate_key(&purpose).unwrap().get())
						.collect::<Vec<_>>()
				})
			})
			.collect();
		handles
			.into_iter()
			.flat_map(|h| h.join().unwrap())
			.collect()
	});

	let unique: HashSet<u32> = versions.iter().copied().collect();
	assert_eq!(unique.len(), 200);
	assert_eq!(keys.get_current_version(&purpose).get(), 201);
}

/// Test that encryption and decryption are safe to share across threads.
#[test]
fn test_concurrent_field_encryption() {
	let (keys, _) = key_manager();
	let fields = FieldEncryptor::new(keys, "user_data").unwrap();
	fields.encrypt_field("warm", None).unwrap();

	std::thread::scope(|s| {
		for t in 0..4 {
			let fields = &fields;
			s.spawn(move || {
				for i in 0..25 {
					let context = format!("user:{t}:{i}");
					let value = format!("value-{t}-{i}");
					let envelope = fields.encrypt_field(&value, Some(&context)).unwrap();
					assert_eq!(fields.decrypt_field(&envelope, Some(&context)).unwrap(), value);
				}
			});
		}
	});
}

/// Test that an encrypted column stays readable after a rotation and can be
/// migrated row by row.
#[test]
fn test_column_migration_after_rotation() {
	let (keys, _) = key_manager();
	let column = EncryptedTextColumn::new(FieldEncryptor::new(keys.clone(), "user_data").unwrap());

	let rows: Vec<(String, Option<String>)> = (0..3)
		.map(|i| {
			let ctx = format!("user:{i}");
			let stored = column
				.encode_for_storage(Some(&format!("email{i}@example.com")), Some(&ctx))
				.unwrap();
			(ctx, stored)
		})
		.collect();

	keys.rotate_key(column.encryptor().purpose()).unwrap();

	for (ctx, stored) in rows {
		let stored = stored.unwrap();
		assert!(column.encryptor().needs_rotation(&stored).unwrap());
		let migrated = column.encryptor().rotate_encryption(&stored, Some(&ctx)).unwrap();
		assert!(migrated.starts_with("v2$"));
		assert!(column
			.decode_from_storage(Some(&migrated), Some(&ctx))
			.unwrap()
			.unwrap()
			.ends_with("@example.com"));
	}
}

/// Test that tokens are unaffected by rotating the `tokens` purpose.
#[test]
fn test_token_encryptor_ignores_rotation() {
	let (keys, _) = key_manager();
	let tokens = TokenEncryptor::new(&keys).unwrap();
	let encrypted = tokens.encrypt_token("ya29.a0AfH6SMB").unwrap();

	keys.rotate_key(&Purpose::new("tokens").unwrap()).unwrap();

	let fresh = TokenEncryptor::new(&keys).unwrap();
	assert_eq!(fresh.decrypt_token(&encrypted).unwrap(), "ya29.a0AfH6SMB");
}

/// Test that a missing master secret is a construction-time error.
#[test]
fn test_empty_master_secret_fails_fast() {
	assert!(matches!(
		MasterSecret::new(""),
		Err(CryptoError::MasterSecretNotConfigured)
	));
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.lock().unwrap().extend_from_slice(buf);
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

impl CapturedLogs {
	fn contents(&self) -> String {
		String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
	}
}

/// Test that rotation is audit-logged and that no log line carries the
/// master secret, derived keys, or plaintext.
#[test]
fn test_logs_never_contain_secrets() {
	let logs = CapturedLogs::default();
	let writer = logs.clone();
	let subscriber = tracing_subscriber::fmt()
		.with_max_level(tracing::Level::DEBUG)
		.with_ansi(false)
		.with_writer(move || writer.clone())
		.finish();

	tracing::subscriber::with_default(subscriber, || {
		let (keys, _) = key_manager();
		let fields = FieldEncryptor::new(keys.clone(), "user_data").unwrap();
		let envelope = fields.encrypt_field("plaintext-canary", Some("user:1")).unwrap();
		keys.rotate_key(fields.purpose()).unwrap();
		assert!(fields.decrypt_field(&envelope, Some("user:2")).is_err());
	});

	let output = logs.contents();
	assert!(output.contains("encryption key rotated"));
	assert!(output.contains("old_version=1"));
	assert!(output.contains("new_version=2"));
	assert!(output.contains("field decryption failed"));
	assert!(!output.contains(MASTER_SECRET));
	assert!(!output.contains("plaintext-canary"));
}
