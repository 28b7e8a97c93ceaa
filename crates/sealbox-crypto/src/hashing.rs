// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! One-way hashing and secure random generation.
//!
//! - Passwords: Argon2id over a random 32-byte salt, compared in constant time
//! - API keys: plain SHA-256, since keys are already high-entropy random strings
//! - Tokens and verification codes: drawn from the OS CSPRNG
//!
//! # Security Note
//!
//! Production password hashing uses Argon2id with:
//! - Memory: 19456 KiB (~19 MiB)
//! - Iterations: 2
//! - Parallelism: 1
//!
//! Unit-test builds use reduced parameters that MUST NOT be used in production.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{
	engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD as BASE64URL},
	Engine,
};
use rand::{rngs::OsRng, Rng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::instrument;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// Length of generated password salts in bytes.
pub const PASSWORD_SALT_LEN: usize = 32;

/// Length of password hashes in bytes.
pub const PASSWORD_HASH_LEN: usize = 32;

/// Default number of random bytes in a secure token.
pub const DEFAULT_TOKEN_BYTES: usize = 32;

/// Default number of digits in a verification code.
pub const DEFAULT_CODE_LENGTH: usize = 6;

/// Stored form of a hashed password. Both fields are standard base64.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash {
	pub hash: String,
	pub salt: String,
}

impl std::fmt::Debug for PasswordHash {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PasswordHash")
			.field("hash", &"[REDACTED]")
			.field("salt", &self.salt)
			.finish()
	}
}

/// Returns an Argon2id instance configured for the build context.
fn argon2_instance() -> CryptoResult<Argon2<'static>> {
	#[cfg(test)]
	let params = Params::new(1024, 1, 1, Some(PASSWORD_HASH_LEN));

	#[cfg(not(test))]
	let params = Params::new(
		Params::DEFAULT_M_COST,
		Params::DEFAULT_T_COST,
		Params::DEFAULT_P_COST,
		Some(PASSWORD_HASH_LEN),
	);

	let params =
		params.map_err(|e| CryptoError::Configuration(format!("invalid Argon2 parameters: {e}")))?;
	Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

fn derive_password_hash(
	password: &str,
	salt: &[u8],
) -> CryptoResult<Zeroizing<[u8; PASSWORD_HASH_LEN]>> {
	let mut out = Zeroizing::new([0u8; PASSWORD_HASH_LEN]);
	argon2_instance()?
		.hash_password_into(password.as_bytes(), salt, out.as_mut())
		.map_err(|e| CryptoError::Validation(format!("password hashing failed: {e}")))?;
	Ok(out)
}

/// Hash a password for storage.
///
/// Generates a random salt when none is given. Salts shorter than 8 bytes
/// are rejected.
#[instrument(name = "password.hash", skip_all)]
pub fn hash_password(password: &str, salt: Option<&[u8]>) -> CryptoResult<PasswordHash> {
	let salt = match salt {
		Some(salt) => salt.to_vec(),
		None => {
			let mut salt = vec![0u8; PASSWORD_SALT_LEN];
			OsRng.fill_bytes(&mut salt);
			salt
		}
	};

	let hash = derive_password_hash(password, &salt)?;
	Ok(PasswordHash {
		hash: BASE64.encode(hash.as_slice()),
		salt: BASE64.encode(&salt),
	})
}

/// Verify a password against a stored hash and salt.
///
/// Returns `false` for malformed input instead of erroring. The final
/// comparison runs in constant time.
#[instrument(name = "password.verify", skip_all)]
pub fn verify_password(password: &str, hash: &str, salt: &str) -> bool {
	let (Ok(expected), Ok(salt)) = (BASE64.decode(hash), BASE64.decode(salt)) else {
		return false;
	};
	let expected = Zeroizing::new(expected);

	match derive_password_hash(password, &salt) {
		Ok(actual) => constant_time_eq(actual.as_slice(), &expected),
		Err(e) => {
			tracing::debug!(error = %e, "password verification failed to hash");
			false
		}
	}
}

/// Hash an API key for lookup. Lowercase hex SHA-256.
pub fn hash_api_key(api_key: &str) -> String {
	hex::encode(Sha256::digest(api_key.as_bytes()))
}

/// Generate a URL-safe token carrying `nbytes` bytes of entropy.
///
/// The result is unpadded URL-safe base64, so it is roughly `4/3 * nbytes`
/// characters long.
pub fn generate_secure_token(nbytes: usize) -> String {
	let mut bytes = Zeroizing::new(vec![0u8; nbytes]);
	OsRng.fill_bytes(&mut bytes);
	BASE64URL.encode(bytes.as_slice())
}

/// Generate a numeric code of `length` digits, each uniform over 0-9.
pub fn generate_verification_code(length: usize) -> String {
	let mut rng = OsRng;
	(0..length)
		.map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
		.collect()
}

/// Compare two byte strings in time independent of their contents.
///
/// Length differences are not hidden.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
	a.ct_eq(b).into()
}
