//! peerio-crypto: end-to-end encryption core for Peerio
//!
//! Architecture: multi-recipient envelope + chunked XSalsa20-Poly1305 stream
//!
//! Pipeline: plaintext → 256-byte name chunk + fixed-size chunks → secretbox per chunk → BLAKE2s over wire chunks → header
//!
//! Key hierarchy:
//! ```text
//! User Keypair (Curve25519, secret = scrypt(BLAKE2s(passphrase), username))
//!   ├── Public-key ID: Base58(public_key || BLAKE2s-8 checksum)
//!   ├── Envelope header (per file/message)
//!   │   ├── Ephemeral keypair (random, one per header)
//!   │   └── Per recipient: box_eph(senderID, recipientID, box_sender(fileKey, fileNonce, fileHash))
//!   │       └── File Key (256-bit random)
//!   │           └── Chunk secretbox: nonce = fileNonce(16) || counter(u64 LE), 0x80 flag on last chunk
//!   └── PIN Key (scrypt(BLAKE2s(pin), username), local passphrase cache only)
//! ```

pub mod container;
pub mod encoding;
pub mod error;
pub mod hash;
pub mod header;
pub mod kdf;
pub mod keys;
pub mod nacl;
pub mod names;
pub mod pin;
pub mod pool;
pub mod session;
pub mod stream;

pub use container::{
    decrypt_container, decrypt_file_name, decrypt_stream, encrypt_container, encrypt_stream,
    read_container_header, write_container, DecryptedFile, SIGNATURE,
};
pub use error::{CryptoError, Result};
pub use header::{build_header, parse_header, DecryptInfo, FileInfo, Header};
pub use kdf::{derive_key, DerivedKey};
pub use keys::{
    derive_key_from_pin, derive_key_pair, public_key_to_string, string_to_public_key, Identity,
    KeyPair,
};
pub use names::{pad_file_name, unpad_file_name, FILE_NAME_LEN};
pub use pin::{decrypt_passphrase_with_pin, encrypt_passphrase_with_pin};
pub use pool::CryptoPool;
pub use session::{DecryptedMessage, EncryptedFile, EncryptedMessage, Session};
pub use stream::{read_chunk_len, StreamDecryptor, StreamEncryptor, StreamPhase};

/// Size of a Curve25519 key or secretbox key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XSalsa20 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Random prefix of a chunk-stream nonce; the remaining 8 bytes are the counter
pub const STREAM_NONCE_SIZE: usize = 16;

/// Largest plaintext chunk on the wire, independent of local configuration
pub use peerio_core::config::MAX_CHUNK_SIZE;
