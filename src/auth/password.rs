use argon2::{password_hash::Output, Argon2};
use base64ct::{Base64, Base64Url, Encoding};
use lazy_static::lazy_static;
use rand::{rngs::OsRng, seq::SliceRandom, RngCore};
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::error;

use crate::error::{ModelError, ModelResult};

/// Bytes produced by the KDF; 44 characters once encoded.
pub const HASH_BYTES: usize = 32;
/// Random salt bytes; 24 characters once encoded.
pub const SALT_BYTES: usize = 16;
pub const HASH_LEN: usize = 44;
pub const SALT_LEN: usize = 24;

/// No 0/1/i/l/o: these are read aloud and typed in by hand.
const EASY_ALPHANUMERIC_CHARS: &[u8] = b"23456789abcdefghjkmnpqrstuvwxyz";
const ALPHANUMERIC_CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

pub const EASY_STRING_LEN: usize = 8;
pub const ENCRYPTION_KEY_LEN: usize = 32;

pub(crate) fn is_url_safe_base64(value: &str) -> bool {
    lazy_static! {
        static ref URL_SAFE_RE: Regex = Regex::new(r"^[0-9a-zA-Z_\-]+=*$").unwrap();
    }
    URL_SAFE_RE.is_match(value)
}

pub(crate) fn is_standard_base64(value: &str) -> bool {
    lazy_static! {
        static ref STANDARD_RE: Regex = Regex::new(r"^[0-9a-zA-Z+/]+$").unwrap();
    }
    STANDARD_RE.is_match(value)
}

/// The hash a mobile client computes before transmitting a password.
pub fn device_hash(plain: &str) -> String {
    Base64Url::encode_string(&Sha256::digest(plain.as_bytes()))
}

fn derive(prepared: &str, salt: &str) -> ModelResult<[u8; HASH_BYTES]> {
    let mut out = [0u8; HASH_BYTES];
    Argon2::default()
        .hash_password_into(prepared.as_bytes(), salt.as_bytes(), &mut out)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password_into error");
            ModelError::Hashing(e.to_string())
        })?;
    Ok(out)
}

fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    OsRng.fill_bytes(&mut bytes);
    Base64Url::encode_string(&bytes)
}

/// Hashes an already-prepared password under a fresh salt, returning
/// `(hash, salt)`. Callers go through a user kind's `HashScheme`.
pub(crate) fn hash_with_new_salt(prepared: &str) -> ModelResult<(String, String)> {
    let salt = generate_salt();
    let hash = derive(prepared, &salt)?;
    Ok((Base64Url::encode_string(&hash), salt))
}

/// Recomputes the hash of `proposed` under `salt` and compares it to
/// `stored_hash` in constant time. Any malformed input yields `false`.
pub fn compare_password(proposed: &str, salt: &str, stored_hash: &str) -> bool {
    let Ok(stored) = Base64Url::decode_vec(stored_hash) else {
        return false;
    };
    let Ok(stored) = Output::new(&stored) else {
        return false;
    };
    let Ok(computed) = derive(proposed, salt) else {
        return false;
    };
    match Output::new(&computed) {
        Ok(computed) => computed == stored,
        Err(_) => false,
    }
}

fn random_from(alphabet: &[u8], len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .filter_map(|_| alphabet.choose(&mut rng))
        .map(|&b| b as char)
        .collect()
}

/// Short lowercase string that survives being read over the phone.
pub fn generate_easy_alphanumeric_string(len: usize) -> String {
    random_from(EASY_ALPHANUMERIC_CHARS, len)
}

/// Standard-alphabet base64 of OS random bytes, truncated to `len`.
pub fn generate_random_string(len: usize) -> String {
    let mut bytes = vec![0u8; len.div_ceil(4) * 3];
    OsRng.fill_bytes(&mut bytes);
    let mut encoded = Base64::encode_string(&bytes);
    encoded.truncate(len);
    encoded
}

pub fn generate_encryption_key() -> String {
    random_from(ALPHANUMERIC_CHARS, ENCRYPTION_KEY_LEN)
}
