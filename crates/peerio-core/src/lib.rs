//! peerio-core: types shared by the crypto core and the applications that
//! drive it
//!
//! - `config`: TOML configuration schema (stream, worker pool, logging)
//! - `types`: collaborator seams the core consumes (contact directory, blob I/O)
//! - `error`: application-boundary error type

pub mod config;
pub mod error;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use types::{BlobSource, Contact, ContactDirectory, Contacts, FileBlob, SliceBlob};
