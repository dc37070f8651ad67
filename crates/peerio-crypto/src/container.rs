//! Encrypted container: signature, header, and the chunk stream
//!
//! ```text
//! "miniLock" (8) | header_len (u32 LE) | header JSON | chunk 0 (file name) | chunk 1 .. N
//! ```
//!
//! Inputs are pulled through [`BlobSource`] one chunk at a time, so file size
//! is bounded by disk rather than memory. On decryption, plaintext is spooled
//! and handed to the caller only after the content hash of the whole chunk
//! stream has matched the sender-authenticated `fileHash`.

use std::io::{self, Read, Seek, SeekFrom, Write};

use peerio_core::BlobSource;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::encoding::read_u32_le;
use crate::error::{CryptoError, Result};
use crate::hash::Blake2sHasher;
use crate::header::{build_header, parse_header, FileInfo, Header};
use crate::keys::{Identity, KeyPair};
use crate::nacl::random_bytes;
use crate::names::{pad_file_name, unpad_file_name, FILE_NAME_LEN};
use crate::stream::{wire_chunk_len, StreamDecryptor, StreamEncryptor};
use crate::{KEY_SIZE, MAX_CHUNK_SIZE, STREAM_NONCE_SIZE};

/// Magic bytes opening every container
pub const SIGNATURE: &[u8; 8] = b"miniLock";

const PREAMBLE_LEN: u64 = SIGNATURE.len() as u64 + 4;

/// Plaintext kept in memory before the spool moves to a temp file
const SPOOL_MEMORY_LIMIT: usize = 8 * 1024 * 1024;

/// Result of a successful decryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedFile {
    pub file_name: String,
    /// Base58 ID of the authenticated sender
    pub sender_id: String,
    /// Plaintext bytes written to the output
    pub size: u64,
}

/// Encrypt `source` into a chunk stream written to `chunks_out` and return
/// the header granting `recipients` access to it.
///
/// The header is built last because it carries the hash of every wire
/// chunk. `recipients` is used as given. `chunk_size` is clamped to
/// `1..=MAX_CHUNK_SIZE` so any reader can open the result.
pub fn encrypt_stream<S, W>(
    source: &mut S,
    file_name: &str,
    recipients: &[[u8; KEY_SIZE]],
    sender: &KeyPair,
    chunk_size: usize,
    chunks_out: &mut W,
) -> Result<Header>
where
    S: BlobSource + ?Sized,
    W: Write + ?Sized,
{
    let chunk_size = chunk_size.clamp(1, MAX_CHUNK_SIZE);
    let name_block = pad_file_name(file_name)?;

    let mut file_key: [u8; KEY_SIZE] = random_bytes()?;
    let file_nonce: [u8; STREAM_NONCE_SIZE] = random_bytes()?;
    let mut encryptor = StreamEncryptor::new(&file_key, &file_nonce, MAX_CHUNK_SIZE);
    let mut hasher = Blake2sHasher::new(32)?;

    let mut emit = |wire: Vec<u8>| -> Result<()> {
        hasher.update(&wire);
        chunks_out.write_all(&wire)?;
        Ok(())
    };

    emit(encryptor.encrypt_chunk(&name_block, false)?)?;

    let total = source.len();
    let mut offset = 0u64;
    let mut chunks = 1usize;
    loop {
        let end = offset.saturating_add(chunk_size as u64).min(total);
        let is_last = end == total;
        let plaintext = source.read_range(offset, end)?;
        emit(encryptor.encrypt_chunk(&plaintext, is_last)?)?;
        chunks += 1;
        offset = end;
        if is_last {
            break;
        }
    }

    let hash: [u8; 32] = hasher
        .finalize()
        .try_into()
        .map_err(|_| CryptoError::SealFailed)?;
    let file_info = FileInfo {
        key: file_key,
        nonce: file_nonce,
        hash,
    };
    file_key.zeroize();

    let header = build_header(recipients, sender, &file_info)?;
    debug!(bytes = total, chunks, recipients = recipients.len(), "encrypted stream");
    Ok(header)
}

/// Write a complete container: signature, header, then `chunks` copied
/// through unchanged. Returns the number of bytes written.
pub fn write_container<R, W>(header: &Header, chunks: &mut R, out: &mut W) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let json = header.to_json()?;
    let header_len = u32::try_from(json.len())
        .map_err(|_| CryptoError::HeaderInvalid("header exceeds u32 length".into()))?;

    out.write_all(SIGNATURE)?;
    out.write_all(&header_len.to_le_bytes())?;
    out.write_all(&json)?;
    let copied = io::copy(chunks, out)?;
    Ok(PREAMBLE_LEN + json.len() as u64 + copied)
}

/// Encrypt `source` straight into a container on `out`.
///
/// Chunks are spooled while the header (which needs their hash) is built.
pub fn encrypt_container<S, W>(
    source: &mut S,
    file_name: &str,
    recipients: &[[u8; KEY_SIZE]],
    sender: &KeyPair,
    chunk_size: usize,
    out: &mut W,
) -> Result<Header>
where
    S: BlobSource + ?Sized,
    W: Write + ?Sized,
{
    let mut spool = tempfile::spooled_tempfile(SPOOL_MEMORY_LIMIT);
    let header = encrypt_stream(source, file_name, recipients, sender, chunk_size, &mut spool)?;
    spool.seek(SeekFrom::Start(0))?;
    write_container(&header, &mut spool, out)?;
    Ok(header)
}

/// Read and check the container preamble.
///
/// Returns the header and the offset of the first chunk.
pub fn read_container_header<S>(source: &mut S) -> Result<(Header, u64)>
where
    S: BlobSource + ?Sized,
{
    let total = source.len();
    if total < PREAMBLE_LEN {
        return Err(CryptoError::HeaderInvalid("container too short".into()));
    }
    let preamble = source.read_range(0, PREAMBLE_LEN)?;
    if !bool::from(preamble[..SIGNATURE.len()].ct_eq(SIGNATURE)) {
        return Err(CryptoError::HeaderInvalid("bad signature".into()));
    }

    let header_len = read_u32_le(&preamble[SIGNATURE.len()..])
        .ok_or_else(|| CryptoError::HeaderInvalid("missing header length".into()))?;
    let header_end = PREAMBLE_LEN + u64::from(header_len);
    if header_end > total {
        return Err(CryptoError::HeaderInvalid(format!(
            "header length {header_len} exceeds container size {total}"
        )));
    }

    let header = Header::from_json(&source.read_range(PREAMBLE_LEN, header_end)?)?;
    Ok((header, header_end))
}

/// Read one wire chunk at `pos`, bounds-checking its declared length.
fn read_wire_chunk<S>(source: &mut S, pos: u64) -> Result<Vec<u8>>
where
    S: BlobSource + ?Sized,
{
    let total = source.len();
    if pos + 4 > total {
        return Err(CryptoError::ChunkFramingCorrupt("truncated length prefix".into()));
    }
    let len = read_u32_le(&source.read_range(pos, pos + 4)?)
        .ok_or_else(|| CryptoError::ChunkFramingCorrupt("truncated length prefix".into()))?
        as usize;
    if len > MAX_CHUNK_SIZE {
        return Err(CryptoError::ChunkFramingCorrupt(format!(
            "declared length {len} exceeds maximum {MAX_CHUNK_SIZE}"
        )));
    }
    let end = pos + wire_chunk_len(len) as u64;
    if end > total {
        return Err(CryptoError::ChunkFramingCorrupt("truncated chunk".into()));
    }
    Ok(source.read_range(pos, end)?)
}

/// Open the file-name chunk at `offset`. Returns the name and the offset
/// just past the chunk.
fn open_name_chunk<S>(
    source: &mut S,
    offset: u64,
    decryptor: &mut StreamDecryptor,
    hasher: &mut Blake2sHasher,
) -> Result<(String, u64)>
where
    S: BlobSource + ?Sized,
{
    let wire = read_wire_chunk(source, offset)?;
    if wire.len() != wire_chunk_len(FILE_NAME_LEN) {
        return Err(CryptoError::ChunkFramingCorrupt("bad file name chunk".into()));
    }
    let block = decryptor
        .decrypt_chunk(&wire, false)
        .ok_or(CryptoError::AuthenticationFailed)?;
    hasher.update(&wire);
    Ok((unpad_file_name(&block)?, offset + wire.len() as u64))
}

/// Decrypt the chunk stream starting at `offset` and write the plaintext to
/// `plaintext_out`.
///
/// Nothing is written unless every chunk authenticates and the content hash
/// matches; on error the output is untouched. The last chunk is the one
/// that ends exactly at the end of `source`. Chunks declaring more than
/// [`MAX_CHUNK_SIZE`] bytes are rejected whatever the local chunk size.
pub fn decrypt_stream<S, W>(
    source: &mut S,
    header: &Header,
    offset: u64,
    identity: &Identity,
    plaintext_out: &mut W,
) -> Result<DecryptedFile>
where
    S: BlobSource + ?Sized,
    W: Write + ?Sized,
{
    let info = parse_header(header, identity)?;
    let total = source.len();

    let mut decryptor =
        StreamDecryptor::new(&info.file_info.key, &info.file_info.nonce, MAX_CHUNK_SIZE);
    let mut hasher = Blake2sHasher::new(32)?;

    let (file_name, mut pos) = open_name_chunk(source, offset, &mut decryptor, &mut hasher)?;
    if pos == total {
        return Err(CryptoError::ChunkFramingCorrupt("stream has no payload chunks".into()));
    }

    let mut spool = tempfile::spooled_tempfile(SPOOL_MEMORY_LIMIT);
    let mut size = 0u64;
    let mut chunks = 1usize;
    while pos < total {
        let wire = read_wire_chunk(source, pos)?;
        pos += wire.len() as u64;
        let plaintext = decryptor
            .decrypt_chunk(&wire, pos == total)
            .ok_or(CryptoError::AuthenticationFailed)?;
        hasher.update(&wire);
        spool.write_all(&plaintext)?;
        size += plaintext.len() as u64;
        chunks += 1;
    }

    let computed = hasher.finalize();
    if !bool::from(computed.as_slice().ct_eq(&info.file_info.hash)) {
        warn!(sender = %info.sender_id, "content hash mismatch");
        return Err(CryptoError::IntegrityMismatch);
    }

    spool.seek(SeekFrom::Start(0))?;
    io::copy(&mut spool, plaintext_out)?;
    debug!(bytes = size, chunks, sender = %info.sender_id, "decrypted stream");

    Ok(DecryptedFile {
        file_name,
        sender_id: info.sender_id,
        size,
    })
}

/// Read a container from `source` and decrypt it into `plaintext_out`.
pub fn decrypt_container<S, W>(
    source: &mut S,
    identity: &Identity,
    plaintext_out: &mut W,
) -> Result<DecryptedFile>
where
    S: BlobSource + ?Sized,
    W: Write + ?Sized,
{
    let (header, offset) = read_container_header(source)?;
    decrypt_stream(source, &header, offset, identity, plaintext_out)
}

/// Recover only the file name, reading the header and the first chunk.
///
/// The name is authenticated by its chunk MAC but not yet covered by the
/// content hash, which needs the whole stream.
pub fn decrypt_file_name<S>(source: &mut S, identity: &Identity) -> Result<String>
where
    S: BlobSource + ?Sized,
{
    let (header, offset) = read_container_header(source)?;
    let info = parse_header(&header, identity)?;

    let mut decryptor =
        StreamDecryptor::new(&info.file_info.key, &info.file_info.nonce, MAX_CHUNK_SIZE);
    let mut hasher = Blake2sHasher::new(32)?;
    let (name, _) = open_name_chunk(source, offset, &mut decryptor, &mut hasher)?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerio_core::SliceBlob;

    const CHUNK: usize = 300;

    fn identity(seed: u8, name: &str) -> Identity {
        Identity::from_key_pair(name, KeyPair::from_secret_key([seed; KEY_SIZE]))
    }

    fn seal(data: &[u8], name: &str, from: &Identity, to: &[&Identity]) -> Vec<u8> {
        let recipients: Vec<_> = to.iter().map(|i| *i.public_key()).collect();
        let mut out = Vec::new();
        encrypt_container(
            &mut SliceBlob::new(data),
            name,
            &recipients,
            from.key_pair(),
            CHUNK,
            &mut out,
        )
        .unwrap();
        out
    }

    fn open(container: &[u8], who: &Identity) -> Result<(DecryptedFile, Vec<u8>)> {
        let mut out = Vec::new();
        let file = decrypt_container(&mut SliceBlob::new(container), who, &mut out)?;
        Ok((file, out))
    }

    fn count_chunks(container: &[u8]) -> usize {
        let (_, mut pos) = read_container_header(&mut SliceBlob::new(container)).unwrap();
        let mut n = 0;
        while (pos as usize) < container.len() {
            let len = read_u32_le(&container[pos as usize..]).unwrap() as usize;
            pos += wire_chunk_len(len) as u64;
            n += 1;
        }
        n
    }

    #[test]
    fn test_roundtrip() {
        let alice = identity(1, "alice");
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let container = seal(&data, "report.pdf", &alice, &[&alice]);

        let (file, out) = open(&container, &alice).unwrap();
        assert_eq!(out, data);
        assert_eq!(file.file_name, "report.pdf");
        assert_eq!(file.sender_id, alice.id());
        assert_eq!(file.size, 1000);
    }

    #[test]
    fn test_container_starts_with_signature() {
        let alice = identity(1, "alice");
        let container = seal(b"x", "x", &alice, &[&alice]);
        assert_eq!(&container[..8], b"miniLock");
    }

    #[test]
    fn test_empty_input_has_one_payload_chunk() {
        let alice = identity(1, "alice");
        let container = seal(b"", "empty", &alice, &[&alice]);
        assert_eq!(count_chunks(&container), 2);

        let (file, out) = open(&container, &alice).unwrap();
        assert!(out.is_empty());
        assert_eq!(file.size, 0);
    }

    #[test]
    fn test_exact_multiple_of_chunk_size() {
        let alice = identity(1, "alice");
        let data = vec![7u8; 3 * CHUNK];
        let container = seal(&data, "three", &alice, &[&alice]);
        assert_eq!(count_chunks(&container), 4);
        assert_eq!(open(&container, &alice).unwrap().1, data);
    }

    #[test]
    fn test_chunk_boundary_plus_one() {
        let alice = identity(1, "alice");
        let data = vec![7u8; 3 * CHUNK + 1];
        let container = seal(&data, "four", &alice, &[&alice]);
        assert_eq!(count_chunks(&container), 5);
        assert_eq!(open(&container, &alice).unwrap().1, data);
    }

    #[test]
    fn test_truncation_detected() {
        let alice = identity(1, "alice");
        let data = vec![1u8; 2 * CHUNK + 10];
        let container = seal(&data, "t", &alice, &[&alice]);

        // Drop the final chunk entirely; the new last chunk lacks the last flag.
        let last_len = wire_chunk_len(10);
        let truncated = &container[..container.len() - last_len];
        assert!(matches!(
            open(truncated, &alice),
            Err(CryptoError::AuthenticationFailed)
        ));

        // Cut mid-chunk.
        let cut = &container[..container.len() - 3];
        assert!(matches!(
            open(cut, &alice),
            Err(CryptoError::ChunkFramingCorrupt(_))
        ));
    }

    #[test]
    fn test_only_name_chunk_rejected() {
        let alice = identity(1, "alice");
        let container = seal(b"", "n", &alice, &[&alice]);
        let name_only = &container[..container.len() - wire_chunk_len(0)];
        assert!(matches!(
            open(name_only, &alice),
            Err(CryptoError::ChunkFramingCorrupt(_))
        ));
    }

    #[test]
    fn test_oversized_declared_length() {
        let alice = identity(1, "alice");
        let mut container = seal(b"abc", "n", &alice, &[&alice]);
        let (_, offset) = read_container_header(&mut SliceBlob::new(&container)).unwrap();
        let at = offset as usize;
        container[at..at + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            open(&container, &alice),
            Err(CryptoError::ChunkFramingCorrupt(_))
        ));
    }

    #[test]
    fn test_bad_signature() {
        let alice = identity(1, "alice");
        let mut container = seal(b"abc", "n", &alice, &[&alice]);
        container[0] ^= 0x20;
        assert!(matches!(
            open(&container, &alice),
            Err(CryptoError::HeaderInvalid(_))
        ));
    }

    #[test]
    fn test_header_length_beyond_blob() {
        let mut container = SIGNATURE.to_vec();
        container.extend_from_slice(&1000u32.to_le_bytes());
        container.extend_from_slice(b"{}");
        assert!(matches!(
            read_container_header(&mut SliceBlob::new(&container)),
            Err(CryptoError::HeaderInvalid(_))
        ));
        assert!(read_container_header(&mut SliceBlob::new(b"mini")).is_err());
    }

    #[test]
    fn test_hash_mismatch_writes_nothing() {
        let alice = identity(1, "alice");
        let data = b"payload that must not leak";
        let recipients = [*alice.public_key()];

        let mut chunks = Vec::new();
        let header = encrypt_stream(
            &mut SliceBlob::new(data),
            "n",
            &recipients,
            alice.key_pair(),
            CHUNK,
            &mut chunks,
        )
        .unwrap();

        // Re-seal the same stream under a header promising a different hash.
        let info = parse_header(&header, &alice).unwrap();
        let mut forged_info = info.file_info.clone();
        forged_info.hash[0] ^= 0xFF;
        let forged = build_header(&recipients, alice.key_pair(), &forged_info).unwrap();

        let mut out = Vec::new();
        let result = decrypt_stream(&mut SliceBlob::new(&chunks), &forged, 0, &alice, &mut out);
        assert!(matches!(result, Err(CryptoError::IntegrityMismatch)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_decrypt_file_name_only() {
        let alice = identity(1, "alice");
        let bob = identity(2, "bob");
        let container = seal(&vec![0u8; 5 * CHUNK], "holiday.jpg", &alice, &[&alice, &bob]);
        let name = decrypt_file_name(&mut SliceBlob::new(&container), &bob).unwrap();
        assert_eq!(name, "holiday.jpg");
    }

    #[test]
    fn test_chunk_size_clamped_to_protocol_maximum() {
        let alice = identity(1, "alice");
        let data = vec![3u8; MAX_CHUNK_SIZE + 1];
        let mut container = Vec::new();
        encrypt_container(
            &mut SliceBlob::new(&data),
            "big",
            &[*alice.public_key()],
            alice.key_pair(),
            4 * MAX_CHUNK_SIZE,
            &mut container,
        )
        .unwrap();

        // name chunk, one full chunk, one byte
        assert_eq!(count_chunks(&container), 3);
        assert_eq!(open(&container, &alice).unwrap().1, data);
    }

    #[test]
    fn test_declared_length_just_over_maximum() {
        let alice = identity(1, "alice");
        let mut container = seal(b"abc", "n", &alice, &[&alice]);
        let (_, offset) = read_container_header(&mut SliceBlob::new(&container)).unwrap();
        let at = offset as usize + wire_chunk_len(FILE_NAME_LEN);
        container[at..at + 4].copy_from_slice(&(MAX_CHUNK_SIZE as u32 + 1).to_le_bytes());
        assert!(matches!(
            open(&container, &alice),
            Err(CryptoError::ChunkFramingCorrupt(_))
        ));
    }
}
