use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(String),

    #[error("contact directory error: {0}")]
    Contacts(String),

    #[error("blob range {start}..{end} out of bounds (length {len})")]
    OutOfRange { start: u64, end: u64, len: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
