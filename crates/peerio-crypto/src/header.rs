//! Multi-recipient envelope header
//!
//! ```text
//! {
//!   "version": 1,
//!   "ephemeral": b64(ephemeral public key),
//!   "decryptInfo": {
//!     b64(nonce_i): b64(box_{eph → R_i}(
//!         {"senderID", "recipientID",
//!          "fileInfo": b64(box_{sender → R_i}({"fileKey","fileNonce","fileHash"}))}))
//!   }
//! }
//! ```
//!
//! The inner box proves the sender's long-term key; the outer box, made
//! with a per-header ephemeral key, hides the sender's ID from everyone but
//! the recipients. Entries carry no recipient label, so a reader has to try
//! each one in turn.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace};
use zeroize::{Zeroize, Zeroizing};

use crate::encoding::{b64_decode, b64_decode_array, b64_encode};
use crate::error::{CryptoError, Result};
use crate::keys::{public_key_to_string, string_to_public_key, Identity, KeyPair};
use crate::nacl::{crypto_box, crypto_box_open, random_bytes};
use crate::{KEY_SIZE, NONCE_SIZE, STREAM_NONCE_SIZE};

/// The only header version this core reads or writes
pub const HEADER_VERSION: u32 = 1;

/// Envelope header as carried on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub version: u32,
    /// Ephemeral public key (base64)
    pub ephemeral: String,
    /// base64(nonce) → base64(outer box), one per recipient
    #[serde(rename = "decryptInfo")]
    pub decrypt_info: BTreeMap<String, String>,
}

impl Header {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| CryptoError::HeaderInvalid(format!("{e}")))
    }

    pub fn recipient_count(&self) -> usize {
        self.decrypt_info.len()
    }
}

/// Symmetric parameters of one encrypted stream. The key is zeroized on drop.
#[derive(Clone)]
pub struct FileInfo {
    pub key: [u8; KEY_SIZE],
    pub nonce: [u8; STREAM_NONCE_SIZE],
    /// BLAKE2s-256 over the wire chunk stream
    pub hash: [u8; 32],
}

impl Drop for FileInfo {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for FileInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileInfo")
            .field("key", &"[REDACTED]")
            .field("nonce", &b64_encode(&self.nonce))
            .field("hash", &b64_encode(&self.hash))
            .finish()
    }
}

/// What a recipient learns from the header.
#[derive(Debug, Clone)]
pub struct DecryptInfo {
    /// Base58 ID of the authenticated sender
    pub sender_id: String,
    pub file_info: FileInfo,
}

#[derive(Serialize, Deserialize)]
struct DecryptInfoEntry {
    #[serde(rename = "senderID")]
    sender_id: String,
    #[serde(rename = "recipientID")]
    recipient_id: String,
    #[serde(rename = "fileInfo")]
    file_info: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileInfoWire {
    file_key: String,
    file_nonce: String,
    file_hash: String,
}

impl Drop for FileInfoWire {
    fn drop(&mut self) {
        self.file_key.zeroize();
    }
}

/// Build a header granting each recipient access to `file_info`.
///
/// One ephemeral keypair covers the whole header; every recipient gets a
/// fresh random nonce. The list is used as given: the caller is
/// responsible for including the sender's own key.
pub fn build_header(
    recipients: &[[u8; KEY_SIZE]],
    sender: &KeyPair,
    file_info: &FileInfo,
) -> Result<Header> {
    let ephemeral = KeyPair::generate()?;
    let sender_id = sender.id();

    let file_info_json = Zeroizing::new(serde_json::to_vec(&FileInfoWire {
        file_key: b64_encode(&file_info.key),
        file_nonce: b64_encode(&file_info.nonce),
        file_hash: b64_encode(&file_info.hash),
    })?);

    let mut decrypt_info = BTreeMap::new();
    for recipient in recipients {
        let (nonce, nonce_b64) = loop {
            let nonce: [u8; NONCE_SIZE] = random_bytes()?;
            let encoded = b64_encode(&nonce);
            if !decrypt_info.contains_key(&encoded) {
                break (nonce, encoded);
            }
        };

        let inner = crypto_box(&file_info_json, &nonce, recipient, sender.secret_key())?;
        let entry = Zeroizing::new(serde_json::to_vec(&DecryptInfoEntry {
            sender_id: sender_id.clone(),
            recipient_id: public_key_to_string(recipient),
            file_info: b64_encode(&inner),
        })?);
        let outer = crypto_box(&entry, &nonce, recipient, ephemeral.secret_key())?;

        decrypt_info.insert(nonce_b64, b64_encode(&outer));
    }

    debug!(recipients = decrypt_info.len(), "built envelope header");
    Ok(Header {
        version: HEADER_VERSION,
        ephemeral: b64_encode(ephemeral.public_key()),
        decrypt_info,
    })
}

/// Find and open this identity's entry in `header`.
///
/// Every entry is tried (O(recipients)); malformed or foreign entries are
/// skipped, since a later one may still belong to us.
pub fn parse_header(header: &Header, identity: &Identity) -> Result<DecryptInfo> {
    if header.version != HEADER_VERSION {
        return Err(CryptoError::HeaderInvalid(format!(
            "unsupported version {}",
            header.version
        )));
    }
    let ephemeral: [u8; KEY_SIZE] = b64_decode_array(&header.ephemeral)
        .map_err(|_| CryptoError::HeaderInvalid("malformed ephemeral key".into()))?;

    for (nonce_b64, sealed_b64) in &header.decrypt_info {
        match open_entry(nonce_b64, sealed_b64, &ephemeral, identity) {
            Ok(info) => {
                debug!(sender = %info.sender_id, "opened envelope header entry");
                return Ok(info);
            }
            Err(reason) => trace!(reason, "skipping header entry"),
        }
    }
    Err(CryptoError::NoMatchingRecipient)
}

fn open_entry(
    nonce_b64: &str,
    sealed_b64: &str,
    ephemeral: &[u8; KEY_SIZE],
    identity: &Identity,
) -> std::result::Result<DecryptInfo, &'static str> {
    let secret = identity.key_pair().secret_key();
    let nonce: [u8; NONCE_SIZE] = b64_decode_array(nonce_b64).map_err(|_| "malformed nonce")?;
    let sealed = b64_decode(sealed_b64).map_err(|_| "malformed entry")?;

    let entry_json = Zeroizing::new(
        crypto_box_open(&sealed, &nonce, ephemeral, secret).ok_or("not addressed to us")?,
    );
    let entry: DecryptInfoEntry =
        serde_json::from_slice(&entry_json).map_err(|_| "malformed entry json")?;

    if entry.recipient_id != identity.id() {
        return Err("recipient ID mismatch");
    }
    let sender = string_to_public_key(&entry.sender_id).map_err(|_| "invalid sender ID")?;

    let inner = b64_decode(&entry.file_info).map_err(|_| "malformed file info")?;
    let file_info_json = Zeroizing::new(
        crypto_box_open(&inner, &nonce, &sender, secret).ok_or("sender authentication failed")?,
    );
    let wire: FileInfoWire =
        serde_json::from_slice(&file_info_json).map_err(|_| "malformed file info json")?;

    Ok(DecryptInfo {
        sender_id: entry.sender_id.clone(),
        file_info: FileInfo {
            key: b64_decode_array(&wire.file_key).map_err(|_| "bad file key")?,
            nonce: b64_decode_array(&wire.file_nonce).map_err(|_| "bad file nonce")?,
            hash: b64_decode_array(&wire.file_hash).map_err(|_| "bad file hash")?,
        },
    })
}
