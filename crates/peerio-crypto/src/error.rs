//! Error taxonomy for the crypto core.
//!
//! Primitives report failure as `None`; the protocol layers translate that
//! into one of these kinds. Messages never carry key material.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// MAC verification failed. No plaintext was produced.
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("invalid envelope header: {0}")]
    HeaderInvalid(String),

    /// No `decryptInfo` entry could be opened with this identity.
    #[error("no header entry for this recipient")]
    NoMatchingRecipient,

    /// Declared chunk length exceeds the maximum or the bytes available.
    /// Fatal for the rest of the stream.
    #[error("corrupt chunk framing: {0}")]
    ChunkFramingCorrupt(String),

    /// Content hash of the chunk stream does not match the header.
    #[error("stream integrity check failed")]
    IntegrityMismatch,

    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("public key checksum mismatch")]
    PublicKeyChecksumMismatch,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("secure random number generator unavailable")]
    NoPrng,

    #[error("stream already finished")]
    StreamFinished,

    #[error("chunk of {len} bytes exceeds maximum {max}")]
    ChunkTooLarge { len: usize, max: usize },

    #[error("file name of {0} bytes exceeds the padded name block")]
    FileNameTooLong(usize),

    #[error("unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error("encryption failed")]
    SealFailed,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("blob error: {0}")]
    Blob(#[from] peerio_core::CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Every worker queue slot is taken; retry later.
    #[error("crypto workers busy")]
    Busy,

    #[error("crypto worker unavailable")]
    WorkerGone,
}
