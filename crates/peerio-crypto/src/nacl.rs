//! NaCl-compatible primitives: X25519, box, secretbox, OS randomness
//!
//! Sealed output is `[16-byte Poly1305 tag][ciphertext]`, byte-compatible
//! with TweetNaCl's `box`/`secretbox` once its zero padding is stripped.
//! Opening verifies the tag before any plaintext exists; failures come back
//! as `None`, never as partial output.

use crypto_box::{PublicKey, SalsaBox, SecretKey};
use crypto_secretbox::aead::generic_array::GenericArray;
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::XSalsa20Poly1305;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, Result};
use crate::{KEY_SIZE, NONCE_SIZE};

/// Curve25519 scalar multiplication with the base point (u = 9).
pub fn scalar_base_mult(scalar: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    x25519_dalek::x25519(*scalar, x25519_dalek::X25519_BASEPOINT_BYTES)
}

/// Curve25519 Diffie-Hellman: `scalar * point`.
pub fn scalar_mult(scalar: &[u8; KEY_SIZE], point: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    x25519_dalek::x25519(*scalar, *point)
}

/// Public-key authenticated encryption (X25519 + HSalsa20 + XSalsa20-Poly1305).
pub fn crypto_box(
    msg: &[u8],
    nonce: &[u8; NONCE_SIZE],
    their_public: &[u8; KEY_SIZE],
    my_secret: &[u8; KEY_SIZE],
) -> Result<Vec<u8>> {
    let salsa_box = SalsaBox::new(
        &PublicKey::from(*their_public),
        &SecretKey::from(*my_secret),
    );
    salsa_box
        .encrypt(GenericArray::from_slice(nonce), msg)
        .map_err(|_| CryptoError::SealFailed)
}

/// Inverse of [`crypto_box`]. `None` if the tag does not verify.
pub fn crypto_box_open(
    sealed: &[u8],
    nonce: &[u8; NONCE_SIZE],
    their_public: &[u8; KEY_SIZE],
    my_secret: &[u8; KEY_SIZE],
) -> Option<Vec<u8>> {
    let salsa_box = SalsaBox::new(
        &PublicKey::from(*their_public),
        &SecretKey::from(*my_secret),
    );
    salsa_box.decrypt(GenericArray::from_slice(nonce), sealed).ok()
}

/// Symmetric authenticated encryption (XSalsa20-Poly1305).
pub fn secretbox(msg: &[u8], nonce: &[u8; NONCE_SIZE], key: &[u8; KEY_SIZE]) -> Result<Vec<u8>> {
    XSalsa20Poly1305::new(GenericArray::from_slice(key))
        .encrypt(GenericArray::from_slice(nonce), msg)
        .map_err(|_| CryptoError::SealFailed)
}

/// Inverse of [`secretbox`]. `None` if the tag does not verify.
pub fn secretbox_open(
    sealed: &[u8],
    nonce: &[u8; NONCE_SIZE],
    key: &[u8; KEY_SIZE],
) -> Option<Vec<u8>> {
    XSalsa20Poly1305::new(GenericArray::from_slice(key))
        .decrypt(GenericArray::from_slice(nonce), sealed)
        .ok()
}

/// Fill an array from the OS CSPRNG. There is no weaker fallback.
pub fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|_| CryptoError::NoPrng)?;
    Ok(bytes)
}
