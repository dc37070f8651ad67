//! Identities: keypairs derived from (username, passphrase), and the
//! checksummed Base58 public-key ID users share with each other

use secrecy::SecretString;
use zeroize::Zeroize;

use crate::encoding::{base58_decode, base58_encode};
use crate::error::{CryptoError, Result};
use crate::hash::checksum_byte;
use crate::kdf::{derive_key, DerivedKey};
use crate::nacl::{random_bytes, scalar_base_mult};
use crate::KEY_SIZE;

/// A Curve25519 keypair. The secret half is zeroized on drop.
#[derive(Clone)]
pub struct KeyPair {
    public_key: [u8; KEY_SIZE],
    secret_key: [u8; KEY_SIZE],
}

impl KeyPair {
    /// Build the keypair whose public key is `scalar_base_mult(secret_key)`.
    pub fn from_secret_key(secret_key: [u8; KEY_SIZE]) -> Self {
        Self {
            public_key: scalar_base_mult(&secret_key),
            secret_key,
        }
    }

    /// Fresh random keypair (used for per-header ephemeral keys).
    pub fn generate() -> Result<Self> {
        random_bytes().map(Self::from_secret_key)
    }

    pub fn public_key(&self) -> &[u8; KEY_SIZE] {
        &self.public_key
    }

    pub fn secret_key(&self) -> &[u8; KEY_SIZE] {
        &self.secret_key
    }

    /// The shareable Base58 ID of the public half.
    pub fn id(&self) -> String {
        public_key_to_string(&self.public_key)
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &public_key_to_string(&self.public_key))
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Deterministically derive a user's keypair.
///
/// `secret = scrypt(BLAKE2s(passphrase), username)`. The same inputs always
/// give the same keypair, which is what lets users log in anywhere without
/// stored keys.
pub fn derive_key_pair(username: &str, passphrase: &SecretString) -> Result<KeyPair> {
    let seed = derive_key(passphrase, username)?;
    Ok(KeyPair::from_secret_key(*seed.as_bytes()))
}

/// Derive a local-only key from a short PIN, for re-encrypting a cached
/// passphrase on this device. Never used for anything sent over the wire.
pub fn derive_key_from_pin(pin: &SecretString, username: &str) -> Result<DerivedKey> {
    derive_key(pin, username)
}

/// Base58 of `public_key || BLAKE2s-8(public_key)`.
pub fn public_key_to_string(public_key: &[u8; KEY_SIZE]) -> String {
    let mut bytes = [0u8; KEY_SIZE + 1];
    bytes[..KEY_SIZE].copy_from_slice(public_key);
    bytes[KEY_SIZE] = checksum_byte(public_key);
    base58_encode(&bytes)
}

/// Parse a public-key ID, verifying its checksum byte.
pub fn string_to_public_key(id: &str) -> Result<[u8; KEY_SIZE]> {
    let bytes = base58_decode(id)?;
    if bytes.len() != KEY_SIZE + 1 {
        return Err(CryptoError::InvalidKey(format!(
            "public key ID decodes to {} bytes, expected {}",
            bytes.len(),
            KEY_SIZE + 1
        )));
    }

    let mut public_key = [0u8; KEY_SIZE];
    public_key.copy_from_slice(&bytes[..KEY_SIZE]);
    if checksum_byte(&public_key) != bytes[KEY_SIZE] {
        return Err(CryptoError::PublicKeyChecksumMismatch);
    }
    Ok(public_key)
}

/// A user's long-term identity: username, keypair, and cached public ID.
#[derive(Debug, Clone)]
pub struct Identity {
    username: String,
    key_pair: KeyPair,
    id: String,
}

impl Identity {
    /// Derive the identity from credentials (runs scrypt).
    pub fn derive(username: &str, passphrase: &SecretString) -> Result<Self> {
        let key_pair = derive_key_pair(username, passphrase)?;
        Ok(Self::from_key_pair(username, key_pair))
    }

    pub fn from_key_pair(username: &str, key_pair: KeyPair) -> Self {
        let id = key_pair.id();
        Self {
            username: username.to_string(),
            key_pair,
            id,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub fn public_key(&self) -> &[u8; KEY_SIZE] {
        self.key_pair.public_key()
    }

    /// Base58 public-key ID
    pub fn id(&self) -> &str {
        &self.id
    }
}
