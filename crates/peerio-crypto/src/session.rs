//! Per-user orchestration of messages, files, and read receipts
//!
//! A [`Session`] binds one identity to the contact directory used to
//! resolve recipients. Nothing is global, so several sessions (different
//! users, different directories) can run side by side.

use std::io::Write;

use peerio_core::config::StreamConfig;
use peerio_core::{BlobSource, ContactDirectory, SliceBlob};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::container::{self, DecryptedFile};
use crate::encoding::{b64_decode, b64_decode_array, b64_encode};
use crate::error::{CryptoError, Result};
use crate::header::Header;
use crate::keys::{string_to_public_key, Identity};
use crate::nacl::{crypto_box, crypto_box_open, random_bytes};
use crate::{KEY_SIZE, MAX_CHUNK_SIZE, NONCE_SIZE};

/// File name carried in the name chunk of every message stream
pub const MESSAGE_FILE_NAME: &str = "message";

/// A message ready for the wire: header and body travel separately.
#[derive(Debug, Clone)]
pub struct EncryptedMessage {
    pub header: Header,
    /// base64 of the chunk stream
    pub body: String,
    /// Usernames that could not be resolved and did not receive the message
    pub failed_recipients: Vec<String>,
}

/// Outcome of [`Session::encrypt_file`]; the container itself went to the
/// caller's writer.
#[derive(Debug, Clone)]
pub struct EncryptedFile {
    pub header: Header,
    pub failed_recipients: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DecryptedMessage<T> {
    pub sender_id: String,
    pub message: T,
}

/// Recipients resolved to keys, plus the names that failed to resolve.
#[derive(Debug, Default)]
pub struct ResolvedRecipients {
    pub keys: Vec<[u8; KEY_SIZE]>,
    pub failed: Vec<String>,
}

pub struct Session<D: ContactDirectory> {
    identity: Identity,
    contacts: D,
    chunk_size: usize,
}

impl<D: ContactDirectory> Session<D> {
    /// `stream.chunk_size` only shapes what this session writes; it is
    /// clamped to `1..=MAX_CHUNK_SIZE`.
    pub fn new(identity: Identity, contacts: D, stream: &StreamConfig) -> Self {
        Self {
            identity,
            contacts,
            chunk_size: stream.chunk_size.clamp(1, MAX_CHUNK_SIZE),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn contacts(&self) -> &D {
        &self.contacts
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Public key for `username`. The session's own username maps to its
    /// own key even when the directory does not list it.
    pub fn public_key_for(&self, username: &str) -> Result<[u8; KEY_SIZE]> {
        if username == self.identity.username() {
            return Ok(*self.identity.public_key());
        }
        let contact = self
            .contacts
            .lookup(username)
            .ok_or_else(|| CryptoError::UnknownRecipient(username.to_string()))?;
        string_to_public_key(&contact.public_key)
    }

    /// Resolve usernames to keys, always including our own key first so we
    /// can read what we send. Unresolvable names are collected, not fatal.
    pub fn resolve_recipients(&self, usernames: &[&str]) -> ResolvedRecipients {
        let mut resolved = ResolvedRecipients {
            keys: vec![*self.identity.public_key()],
            failed: Vec::new(),
        };
        for &username in usernames {
            match self.public_key_for(username) {
                Ok(key) => {
                    if !resolved.keys.contains(&key) {
                        resolved.keys.push(key);
                    }
                }
                Err(e) => {
                    warn!(username, error = %e, "skipping recipient");
                    resolved.failed.push(username.to_string());
                }
            }
        }
        resolved
    }

    /// Serialize `message` to JSON and encrypt it for `recipients`.
    pub fn encrypt_message<T: Serialize>(
        &self,
        message: &T,
        recipients: &[&str],
    ) -> Result<EncryptedMessage> {
        let resolved = self.resolve_recipients(recipients);
        let json = Zeroizing::new(serde_json::to_vec(message)?);

        let mut body = Vec::new();
        let header = container::encrypt_stream(
            &mut SliceBlob::new(&json),
            MESSAGE_FILE_NAME,
            &resolved.keys,
            self.identity.key_pair(),
            self.chunk_size,
            &mut body,
        )?;

        debug!(
            recipients = resolved.keys.len(),
            failed = resolved.failed.len(),
            "encrypted message"
        );
        Ok(EncryptedMessage {
            header,
            body: b64_encode(&body),
            failed_recipients: resolved.failed,
        })
    }

    /// Decrypt a message body and deserialize it as `T`.
    pub fn decrypt_message<T: DeserializeOwned>(
        &self,
        header: &Header,
        body: &str,
    ) -> Result<DecryptedMessage<T>> {
        let chunks = b64_decode(body)?;
        let mut plaintext = Zeroizing::new(Vec::new());
        let file = container::decrypt_stream(
            &mut SliceBlob::new(&chunks),
            header,
            0,
            &self.identity,
            &mut *plaintext,
        )?;
        let message = serde_json::from_slice(&plaintext)?;
        Ok(DecryptedMessage {
            sender_id: file.sender_id,
            message,
        })
    }

    /// Encrypt `source` into a container on `out`.
    pub fn encrypt_file<S, W>(
        &self,
        source: &mut S,
        file_name: &str,
        recipients: &[&str],
        out: &mut W,
    ) -> Result<EncryptedFile>
    where
        S: BlobSource + ?Sized,
        W: Write + ?Sized,
    {
        let resolved = self.resolve_recipients(recipients);
        let header = container::encrypt_container(
            source,
            file_name,
            &resolved.keys,
            self.identity.key_pair(),
            self.chunk_size,
            out,
        )?;
        debug!(
            bytes = source.len(),
            recipients = resolved.keys.len(),
            failed = resolved.failed.len(),
            "encrypted file"
        );
        Ok(EncryptedFile {
            header,
            failed_recipients: resolved.failed,
        })
    }

    pub fn decrypt_file<S, W>(&self, source: &mut S, out: &mut W) -> Result<DecryptedFile>
    where
        S: BlobSource + ?Sized,
        W: Write + ?Sized,
    {
        container::decrypt_container(source, &self.identity, out)
    }

    pub fn decrypt_file_name<S>(&self, source: &mut S) -> Result<String>
    where
        S: BlobSource + ?Sized,
    {
        container::decrypt_file_name(source, &self.identity)
    }

    /// Box a short receipt for `recipient`: `base64(box):base64(nonce)`.
    pub fn encrypt_receipt(&self, receipt: &str, recipient: &str) -> Result<String> {
        let their_key = self.public_key_for(recipient)?;
        let nonce: [u8; NONCE_SIZE] = random_bytes()?;
        let sealed = crypto_box(
            receipt.as_bytes(),
            &nonce,
            &their_key,
            self.identity.key_pair().secret_key(),
        )?;
        Ok(format!("{}:{}", b64_encode(&sealed), b64_encode(&nonce)))
    }

    /// Open a receipt produced by `sender`'s [`Session::encrypt_receipt`].
    pub fn decrypt_receipt(&self, data: &str, sender: &str) -> Result<String> {
        let (sealed, nonce) = data
            .split_once(':')
            .ok_or_else(|| CryptoError::InvalidEncoding("expected ciphertext:nonce".into()))?;
        let sealed = b64_decode(sealed)?;
        let nonce: [u8; NONCE_SIZE] = b64_decode_array(nonce)?;

        let their_key = self.public_key_for(sender)?;
        let plaintext = crypto_box_open(
            &sealed,
            &nonce,
            &their_key,
            self.identity.key_pair().secret_key(),
        )
        .ok_or(CryptoError::AuthenticationFailed)?;
        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::InvalidEncoding("receipt is not UTF-8".into()))
    }
}
