//! Key derivation: BLAKE2s(secret) → scrypt → 256-bit key
//!
//! The scrypt parameters below are a compatibility contract. Every user's
//! keypair is a pure function of (username, passphrase) under them, so any
//! change silently locks every existing account out.

use scrypt::Params;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::error::{CryptoError, Result};
use crate::hash::blake2s_256;
use crate::KEY_SIZE;

/// scrypt cost factor, as log2(N)
pub const SCRYPT_LOG_N: u8 = 14;
/// scrypt block size
pub const SCRYPT_R: u32 = 8;
/// scrypt parallelization
pub const SCRYPT_P: u32 = 1;

/// A 256-bit key derived from a low-entropy secret.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive a key from a secret and a salt: `scrypt(BLAKE2s-256(secret), salt)`.
///
/// The secret is pre-hashed so scrypt always sees 32 bytes regardless of
/// passphrase length. This is CPU- and memory-heavy (16 MiB, hundreds of
/// milliseconds); async callers should go through
/// [`CryptoPool`](crate::pool::CryptoPool).
pub fn derive_key(secret: &SecretString, salt: &str) -> Result<DerivedKey> {
    let mut prehash = blake2s_256(secret.expose_secret().as_bytes());
    let derived = scrypt_raw(&prehash, salt.as_bytes(), SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P);
    prehash.zeroize();
    derived.map(DerivedKey::from_bytes)
}

fn scrypt_raw(password: &[u8], salt: &[u8], log_n: u8, r: u32, p: u32) -> Result<[u8; KEY_SIZE]> {
    let params = Params::new(log_n, r, p, KEY_SIZE)
        .map_err(|e| CryptoError::InvalidKey(format!("invalid scrypt params: {e}")))?;

    let mut key = [0u8; KEY_SIZE];
    scrypt::scrypt(password, salt, &params, &mut key)
        .map_err(|e| CryptoError::InvalidKey(format!("scrypt failed: {e}")))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::hex_to_bytes;

    #[test]
    fn test_scrypt_rfc7914_vector() {
        // RFC 7914 section 12, first vector (N=16, r=1, p=1); first 32 bytes
        let key = scrypt_raw(b"", b"", 4, 1, 1).unwrap();
        assert_eq!(
            key.to_vec(),
            hex_to_bytes("77d6576238657b203b19ca42c18a0497f16b4844e3074ae8dfdffa3fede21442")
        );
    }

    #[test]
    fn test_kdf_deterministic() {
        let secret = SecretString::from("test-passphrase-123");

        let key1 = derive_key(&secret, "alice").unwrap();
        let key2 = derive_key(&secret, "alice").unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes(), "KDF must be deterministic");
    }

    #[test]
    fn test_kdf_different_secrets() {
        let key1 = derive_key(&SecretString::from("passphrase-a"), "alice").unwrap();
        let key2 = derive_key(&SecretString::from("passphrase-b"), "alice").unwrap();

        assert_ne!(
            key1.as_bytes(),
            key2.as_bytes(),
            "different passphrases must produce different keys"
        );
    }

    #[test]
    fn test_kdf_different_salts() {
        let secret = SecretString::from("same-passphrase");

        let key1 = derive_key(&secret, "alice").unwrap();
        let key2 = derive_key(&secret, "bob").unwrap();

        assert_ne!(
            key1.as_bytes(),
            key2.as_bytes(),
            "different usernames must produce different keys"
        );
    }

    #[test]
    fn test_debug_redacts() {
        let key = DerivedKey::from_bytes([7u8; KEY_SIZE]);
        assert!(format!("{key:?}").contains("REDACTED"));
    }
}
