//! Chunked XSalsa20-Poly1305 stream cipher
//!
//! Wire chunk format (binary):
//! ```text
//! [4 bytes: plaintext length, u32 LE][16 bytes: Poly1305 tag][N bytes: ciphertext]
//! ```
//!
//! Every chunk is a secretbox under the file key with nonce
//! `base_nonce(16) || counter(u64 LE)`. The counter increments after each
//! chunk, binding chunks to their position. The final chunk additionally
//! sets bit 0x80 of nonce byte 23, so dropping trailing chunks turns the new
//! last chunk into an authentication failure.
//!
//! States: `Idle → Streaming → Done`, or `Streaming → Failed` (decryptor
//! only). Neither terminal state can be left. Key and nonce are wiped on
//! reaching a terminal state and on drop.

use zeroize::Zeroize;

use crate::encoding::{read_u32_le, write_u32_le};
use crate::error::{CryptoError, Result};
use crate::nacl::{secretbox, secretbox_open};
use crate::{KEY_SIZE, NONCE_SIZE, STREAM_NONCE_SIZE, TAG_SIZE};

/// Bytes of framing added to each chunk: length prefix + tag
pub const CHUNK_OVERHEAD: usize = 4 + TAG_SIZE;

const LAST_CHUNK_FLAG: u8 = 0x80;

/// Wire size of a chunk carrying `plaintext_len` bytes.
pub const fn wire_chunk_len(plaintext_len: usize) -> usize {
    CHUNK_OVERHEAD + plaintext_len
}

/// Declared plaintext length of a wire chunk, if the prefix is present.
pub fn read_chunk_len(wire: &[u8]) -> Option<usize> {
    read_u32_le(wire).map(|len| len as usize)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Streaming,
    Done,
    Failed,
}

impl StreamPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamPhase::Done | StreamPhase::Failed)
    }
}

/// Key, nonce, and position shared by both directions.
struct CipherState {
    key: [u8; KEY_SIZE],
    full_nonce: [u8; NONCE_SIZE],
    max_chunk_len: usize,
    phase: StreamPhase,
}

impl CipherState {
    fn new(key: &[u8; KEY_SIZE], nonce: &[u8; STREAM_NONCE_SIZE], max_chunk_len: usize) -> Self {
        let mut full_nonce = [0u8; NONCE_SIZE];
        full_nonce[..STREAM_NONCE_SIZE].copy_from_slice(nonce);
        Self {
            key: *key,
            full_nonce,
            // The length prefix is a u32.
            max_chunk_len: max_chunk_len.min(u32::MAX as usize),
            phase: StreamPhase::Idle,
        }
    }

    fn set_last_chunk_flag(&mut self) {
        self.full_nonce[NONCE_SIZE - 1] |= LAST_CHUNK_FLAG;
    }

    /// Little-endian increment of nonce bytes 16..24. `false` on overflow.
    fn increment_counter(&mut self) -> bool {
        for byte in &mut self.full_nonce[STREAM_NONCE_SIZE..] {
            *byte = byte.wrapping_add(1);
            if *byte != 0 {
                return true;
            }
        }
        false
    }

    fn finish(&mut self, phase: StreamPhase) {
        self.phase = phase;
        self.clean();
    }

    fn clean(&mut self) {
        self.key.zeroize();
        self.full_nonce.zeroize();
    }
}

impl Drop for CipherState {
    fn drop(&mut self) {
        self.clean();
    }
}

/// Encrypting half of the stream cipher.
pub struct StreamEncryptor {
    state: CipherState,
}

impl StreamEncryptor {
    pub fn new(key: &[u8; KEY_SIZE], nonce: &[u8; STREAM_NONCE_SIZE], max_chunk_len: usize) -> Self {
        Self {
            state: CipherState::new(key, nonce, max_chunk_len),
        }
    }

    /// Seal one chunk and return its wire form.
    ///
    /// Passing `is_last = true` ends the stream; any later call fails with
    /// [`CryptoError::StreamFinished`].
    pub fn encrypt_chunk(&mut self, chunk: &[u8], is_last: bool) -> Result<Vec<u8>> {
        if self.state.phase.is_terminal() {
            return Err(CryptoError::StreamFinished);
        }
        if chunk.len() > self.state.max_chunk_len {
            return Err(CryptoError::ChunkTooLarge {
                len: chunk.len(),
                max: self.state.max_chunk_len,
            });
        }
        self.state.phase = StreamPhase::Streaming;

        if is_last {
            self.state.set_last_chunk_flag();
        }
        let sealed = secretbox(chunk, &self.state.full_nonce, &self.state.key)?;

        let mut wire = Vec::with_capacity(4 + sealed.len());
        write_u32_le(&mut wire, chunk.len() as u32);
        wire.extend_from_slice(&sealed);

        if !self.state.increment_counter() {
            self.state.finish(StreamPhase::Failed);
            return Err(CryptoError::ChunkFramingCorrupt("nonce counter overflow".into()));
        }
        if is_last {
            self.state.finish(StreamPhase::Done);
        }
        Ok(wire)
    }

    pub fn phase(&self) -> StreamPhase {
        self.state.phase
    }

    /// Wipe key material now rather than at drop.
    pub fn clean(&mut self) {
        if !self.state.phase.is_terminal() {
            self.state.finish(StreamPhase::Done);
        }
    }
}

/// Decrypting half of the stream cipher. Fails closed: after the first bad
/// chunk every call returns `None` without doing any work.
pub struct StreamDecryptor {
    state: CipherState,
}

impl StreamDecryptor {
    pub fn new(key: &[u8; KEY_SIZE], nonce: &[u8; STREAM_NONCE_SIZE], max_chunk_len: usize) -> Self {
        Self {
            state: CipherState::new(key, nonce, max_chunk_len),
        }
    }

    /// Verify and open one wire chunk. `None` on any framing or MAC failure.
    pub fn decrypt_chunk(&mut self, wire: &[u8], is_last: bool) -> Option<Vec<u8>> {
        if self.state.phase.is_terminal() {
            return None;
        }
        self.state.phase = StreamPhase::Streaming;

        match self.open(wire, is_last) {
            Some(plaintext) => {
                if is_last {
                    self.state.finish(StreamPhase::Done);
                }
                Some(plaintext)
            }
            None => {
                self.state.finish(StreamPhase::Failed);
                None
            }
        }
    }

    fn open(&mut self, wire: &[u8], is_last: bool) -> Option<Vec<u8>> {
        let len = read_chunk_len(wire)?;
        if len > self.state.max_chunk_len || wire_chunk_len(len) != wire.len() {
            return None;
        }

        if is_last {
            self.state.set_last_chunk_flag();
        }
        let plaintext = secretbox_open(&wire[4..], &self.state.full_nonce, &self.state.key)?;
        if !self.state.increment_counter() {
            return None;
        }
        Some(plaintext)
    }

    pub fn phase(&self) -> StreamPhase {
        self.state.phase
    }

    pub fn is_failed(&self) -> bool {
        self.state.phase == StreamPhase::Failed
    }

    /// Wipe key material now rather than at drop.
    pub fn clean(&mut self) {
        if !self.state.phase.is_terminal() {
            self.state.finish(StreamPhase::Done);
        }
    }
}
