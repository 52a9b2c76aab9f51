//! Legacy password digest.

use sha1::{Digest, Sha1};

/// SHA-1 hex digest of a plaintext password.
///
/// This is the digest format already present in stored user records: a
/// fast, unsalted legacy digest, not a password KDF. Known weakness;
/// upgrading it would invalidate every stored hash, so the format stays
/// until a migration re-hashes the collection.
#[must_use]
pub fn hash_password(password: &str) -> String {
    let digest = Sha1::digest(password.as_bytes());
    base16ct::lower::encode_string(&digest)
}
