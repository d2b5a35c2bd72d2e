//! API keys are derived from the credentials they were issued for rather than
//! being the credentials themselves: the first part is a truncated salted
//! SHA-256 over identity and secret, the rest is the salt. A key store leak
//! therefore does not reveal any password.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

const DIGEST_LENGTH: usize = 30;
const SALT_BYTES: usize = 5;
pub const API_KEY_LENGTH: usize = DIGEST_LENGTH + SALT_BYTES * 2;

pub fn generate_api_key(identity: &str, secret: &str) -> String {
    derive_key(identity, secret, &generate_salt())
}

/// Whether `key` was derived from `identity` and `secret`.
pub fn validate_key(key: &str, identity: &str, secret: &str) -> bool {
    if key.len() != API_KEY_LENGTH || !key.is_ascii() {
        return false;
    }
    let salt = &key[DIGEST_LENGTH..];

    constant_time_eq(derive_key(identity, secret, salt).as_bytes(), key.as_bytes())
}

pub fn hash(token: &[u8]) -> Vec<u8> {
    Sha256::digest(token).as_slice().to_vec()
}

/// Compare two secrets in time that depends only on their lengths.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn derive_key(identity: &str, secret: &str, salt: &str) -> String {
    let digest = hash(format!("{identity}__{secret}__{salt}").as_bytes());
    let mut key = hex::encode(digest);
    key.truncate(DIGEST_LENGTH);
    key.push_str(salt);

    key
}

fn generate_salt() -> String {
    let mut salt = [0u8; SALT_BYTES];
    OsRng.fill_bytes(&mut salt);

    hex::encode(salt)
}
