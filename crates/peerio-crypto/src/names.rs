//! File-name block: the first plaintext chunk of every stream
//!
//! The name is UTF-8, NUL-padded to a fixed 256 bytes so its length does
//! not leak. Decoding strips every trailing NUL, so a name that really ends
//! in NUL bytes comes back without them. Known limitation of the format.

use crate::error::{CryptoError, Result};

/// Size of the padded file-name block in bytes
pub const FILE_NAME_LEN: usize = 256;

/// Pad `name` with NULs to exactly [`FILE_NAME_LEN`] bytes.
pub fn pad_file_name(name: &str) -> Result<[u8; FILE_NAME_LEN]> {
    let bytes = name.as_bytes();
    if bytes.len() > FILE_NAME_LEN {
        return Err(CryptoError::FileNameTooLong(bytes.len()));
    }
    let mut block = [0u8; FILE_NAME_LEN];
    block[..bytes.len()].copy_from_slice(bytes);
    Ok(block)
}

/// Recover the name from a decrypted block, trimming trailing NULs.
pub fn unpad_file_name(block: &[u8]) -> Result<String> {
    let end = block
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |last| last + 1);
    String::from_utf8(block[..end].to_vec())
        .map_err(|_| CryptoError::InvalidEncoding("file name is not UTF-8".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_unpad_roundtrip() {
        let block = pad_file_name("lalala").unwrap();
        assert_eq!(block.len(), FILE_NAME_LEN);
        assert_eq!(&block[..6], b"lalala");
        assert!(block[6..].iter().all(|&b| b == 0));
        assert_eq!(unpad_file_name(&block).unwrap(), "lalala");
    }

    #[test]
    fn test_unicode_name() {
        let name = "отчёт-2026.pdf";
        let block = pad_file_name(name).unwrap();
        assert_eq!(unpad_file_name(&block).unwrap(), name);
    }

    #[test]
    fn test_exact_length_name() {
        let name = "x".repeat(FILE_NAME_LEN);
        let block = pad_file_name(&name).unwrap();
        assert_eq!(unpad_file_name(&block).unwrap(), name);
    }

    #[test]
    fn test_too_long_name() {
        let name = "x".repeat(FILE_NAME_LEN + 1);
        assert!(matches!(
            pad_file_name(&name),
            Err(CryptoError::FileNameTooLong(257))
        ));
    }

    #[test]
    fn test_empty_name() {
        let block = pad_file_name("").unwrap();
        assert_eq!(unpad_file_name(&block).unwrap(), "");
    }

    #[test]
    fn test_trailing_nul_is_stripped() {
        let block = pad_file_name("name\0\0").unwrap();
        assert_eq!(unpad_file_name(&block).unwrap(), "name");
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let mut block = [0u8; FILE_NAME_LEN];
        block[0] = 0xFF;
        assert!(unpad_file_name(&block).is_err());
    }
}
