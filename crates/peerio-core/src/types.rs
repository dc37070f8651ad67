use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{CoreError, CoreResult};

/// A known contact: username plus their public-key ID (Base58 with checksum)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub username: String,
    pub public_key: String,
}

/// Read-only username → contact lookup consulted when resolving recipients.
///
/// Entries are validated before they reach the core; the core never mutates
/// the directory.
pub trait ContactDirectory {
    fn lookup(&self, username: &str) -> Option<Contact>;
}

impl<D: ContactDirectory + ?Sized> ContactDirectory for &D {
    fn lookup(&self, username: &str) -> Option<Contact> {
        (**self).lookup(username)
    }
}

impl<D: ContactDirectory + ?Sized> ContactDirectory for std::sync::Arc<D> {
    fn lookup(&self, username: &str) -> Option<Contact> {
        (**self).lookup(username)
    }
}

/// In-memory contact directory.
///
/// On disk it is a flat TOML table: `alice = "<public key ID>"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Contacts {
    entries: HashMap<String, String>,
}

impl Contacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, username: impl Into<String>, public_key: impl Into<String>) {
        self.entries.insert(username.into(), public_key.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| CoreError::Contacts(format!("parsing {}: {e}", path.display())))
    }
}

impl ContactDirectory for Contacts {
    fn lookup(&self, username: &str) -> Option<Contact> {
        self.entries.get(username).map(|pk| Contact {
            username: username.to_string(),
            public_key: pk.clone(),
        })
    }
}

/// Random-access byte source.
///
/// Lets the stream engine pull arbitrarily large inputs one range at a time
/// instead of holding the whole blob in memory.
pub trait BlobSource {
    /// Total length in bytes
    fn len(&self) -> u64;

    /// Read bytes `start..end`. The range must lie within `0..len()`.
    fn read_range(&mut self, start: u64, end: u64) -> CoreResult<Vec<u8>>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_range(start: u64, end: u64, len: u64) -> CoreResult<()> {
    if start > end || end > len {
        return Err(CoreError::OutOfRange { start, end, len });
    }
    Ok(())
}

/// A blob already resident in memory
#[derive(Debug, Clone, Copy)]
pub struct SliceBlob<'a> {
    data: &'a [u8],
}

impl<'a> SliceBlob<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl BlobSource for SliceBlob<'_> {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_range(&mut self, start: u64, end: u64) -> CoreResult<Vec<u8>> {
        check_range(start, end, self.len())?;
        Ok(self.data[start as usize..end as usize].to_vec())
    }
}

/// A blob backed by a file on disk, read range by range
#[derive(Debug)]
pub struct FileBlob {
    file: File,
    len: u64,
}

impl FileBlob {
    pub fn open(path: &Path) -> CoreResult<Self> {
        let file = File::open(path)?;
        Self::from_file(file)
    }

    pub fn from_file(file: File) -> CoreResult<Self> {
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }
}

impl BlobSource for FileBlob {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_range(&mut self, start: u64, end: u64) -> CoreResult<Vec<u8>> {
        check_range(start, end, self.len)?;
        let mut buf = vec![0u8; (end - start) as usize];
        self.file.seek(SeekFrom::Start(start))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}
