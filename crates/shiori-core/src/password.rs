//! One-way password hashing
//!
//! Passwords are stretched with PBKDF2-HMAC-SHA256 over a random salt and
//! stored in a self-describing form:
//!
//! ```text
//! pbkdf2-sha256$<iterations>$<base64 salt>$<base64 hash>
//! ```
//!
//! The iteration count travels with the hash, so raising it in the config
//! does not invalidate existing accounts.

use std::num::NonZeroU32;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

use crate::storage::{StoreError, StoreResult};

const SCHEME: &str = "pbkdf2-sha256";

/// Salt length in bytes
const SALT_LENGTH: usize = 16;

/// Derived hash length in bytes
const HASH_LENGTH: usize = 32;

/// Hash `password` with a fresh random salt
pub fn hash(password: &str, iterations: u32) -> StoreResult<String> {
    let rounds = NonZeroU32::new(iterations)
        .ok_or_else(|| StoreError::PasswordHash("iteration count must be positive".to_string()))?;

    let mut salt = [0u8; SALT_LENGTH];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| StoreError::PasswordHash("failed to generate salt".to_string()))?;

    let mut derived = [0u8; HASH_LENGTH];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        rounds,
        &salt,
        password.as_bytes(),
        &mut derived,
    );

    Ok(format!(
        "{SCHEME}${}${}${}",
        rounds,
        STANDARD.encode(salt),
        STANDARD.encode(derived)
    ))
}

/// Check `password` against an encoded hash
///
/// A malformed encoding never verifies.
pub fn verify(password: &str, encoded: &str) -> bool {
    let Some((rounds, salt, expected)) = decode(encoded) else {
        return false;
    };
    pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        rounds,
        &salt,
        password.as_bytes(),
        &expected,
    )
    .is_ok()
}

fn decode(encoded: &str) -> Option<(NonZeroU32, Vec<u8>, Vec<u8>)> {
    let mut parts = encoded.split('$');
    if parts.next()? != SCHEME {
        return None;
    }
    let rounds = parts.next()?.parse::<NonZeroU32>().ok()?;
    let salt = STANDARD.decode(parts.next()?).ok()?;
    let expected = STANDARD.decode(parts.next()?).ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((rounds, salt, expected))
}
