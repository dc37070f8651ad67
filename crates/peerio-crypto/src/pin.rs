//! Local passphrase cache protected by a PIN
//!
//! The passphrase is sealed with a key derived from (PIN, username) so the
//! app can unlock with a short PIN on this device. The sealed blob stays on
//! the device; PIN entropy is far too low for anything sent over the wire.
//!
//! Format: `base64(secretbox):base64(nonce)`

use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::encoding::{b64_decode, b64_decode_array, b64_encode};
use crate::error::{CryptoError, Result};
use crate::keys::derive_key_from_pin;
use crate::nacl::{random_bytes, secretbox, secretbox_open};
use crate::NONCE_SIZE;

/// Seal `passphrase` under a key derived from `pin` and `username`.
pub fn encrypt_passphrase_with_pin(
    passphrase: &SecretString,
    pin: &SecretString,
    username: &str,
) -> Result<String> {
    let key = derive_key_from_pin(pin, username)?;
    let nonce: [u8; NONCE_SIZE] = random_bytes()?;
    let sealed = secretbox(passphrase.expose_secret().as_bytes(), &nonce, key.as_bytes())?;
    Ok(format!("{}:{}", b64_encode(&sealed), b64_encode(&nonce)))
}

/// Recover a passphrase sealed by [`encrypt_passphrase_with_pin`].
///
/// A wrong PIN fails authentication; nothing is returned.
pub fn decrypt_passphrase_with_pin(
    sealed: &str,
    pin: &SecretString,
    username: &str,
) -> Result<SecretString> {
    let (ciphertext, nonce) = sealed
        .split_once(':')
        .ok_or_else(|| CryptoError::InvalidEncoding("expected ciphertext:nonce".into()))?;
    let ciphertext = b64_decode(ciphertext)?;
    let nonce: [u8; NONCE_SIZE] = b64_decode_array(nonce)?;

    let key = derive_key_from_pin(pin, username)?;
    let plaintext =
        secretbox_open(&ciphertext, &nonce, key.as_bytes()).ok_or(CryptoError::AuthenticationFailed)?;

    String::from_utf8(plaintext)
        .map(SecretString::from)
        .map_err(|e| {
            e.into_bytes().zeroize();
            CryptoError::InvalidEncoding("passphrase is not UTF-8".into())
        })
}
