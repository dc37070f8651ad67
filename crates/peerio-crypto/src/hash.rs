//! BLAKE2s hashing
//!
//! Used three ways: 32-byte content hash over the chunk stream, 32-byte
//! passphrase pre-hash before scrypt, and a 1-byte digest as the checksum
//! byte of public-key IDs. The digest length is a BLAKE2 parameter, so a
//! 1-byte digest is not a truncated 32-byte one.

use blake2::digest::consts::U1;
use blake2::digest::{Mac, Update, VariableOutput};
use blake2::{Blake2s, Blake2s256, Blake2sMac256, Blake2sVar, Digest};

use crate::error::{CryptoError, Result};

/// Largest BLAKE2s digest in bytes
pub const MAX_DIGEST_LEN: usize = 32;

enum Inner {
    Plain(Blake2sVar),
    Keyed(Blake2sMac256),
}

/// Streaming BLAKE2s with a chosen digest length and optional key.
pub struct Blake2sHasher {
    inner: Inner,
    digest_len: usize,
}

impl Blake2sHasher {
    /// Unkeyed hasher producing `digest_len` bytes (1..=32).
    pub fn new(digest_len: usize) -> Result<Self> {
        let var = Blake2sVar::new(digest_len)
            .map_err(|_| CryptoError::InvalidKey(format!("BLAKE2s digest length {digest_len}")))?;
        Ok(Self {
            inner: Inner::Plain(var),
            digest_len,
        })
    }

    /// Keyed hasher (1..=32 byte key) producing a 32-byte digest.
    pub fn new_keyed(key: &[u8]) -> Result<Self> {
        let mac = <Blake2sMac256 as Mac>::new_from_slice(key)
            .map_err(|_| CryptoError::InvalidKey(format!("BLAKE2s key of {} bytes", key.len())))?;
        Ok(Self {
            inner: Inner::Keyed(mac),
            digest_len: MAX_DIGEST_LEN,
        })
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            Inner::Plain(var) => Update::update(var, data),
            Inner::Keyed(mac) => Mac::update(mac, data),
        }
    }

    pub fn digest_len(&self) -> usize {
        self.digest_len
    }

    pub fn finalize(self) -> Vec<u8> {
        match self.inner {
            Inner::Plain(var) => {
                let mut out = vec![0u8; self.digest_len];
                // Buffer length always equals the configured output size.
                let _ = var.finalize_variable(&mut out);
                out
            }
            Inner::Keyed(mac) => mac.finalize().into_bytes().to_vec(),
        }
    }
}

/// One-shot 32-byte BLAKE2s.
pub fn blake2s_256(data: &[u8]) -> [u8; 32] {
    <Blake2s256 as Digest>::digest(data).into()
}

/// One-shot BLAKE2s with a 1-byte digest, used as a key-ID checksum.
pub fn checksum_byte(data: &[u8]) -> u8 {
    <Blake2s<U1> as Digest>::digest(data)[0]
}
