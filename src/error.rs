use thiserror::Error;

/// Errors produced while encoding, decoding or reading an asar archive.
#[derive(Debug, Error)]
pub enum AsarError {
    /// A length prefix is inconsistent with the bytes that follow it.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// The header JSON does not follow the archive schema.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// A file's byte range lies past the end of the archive.
    #[error("entry range {offset}+{size} exceeds archive length {available}")]
    OutOfRange { offset: u64, size: u64, available: u64 },

    /// The entry's content lives outside the archive.
    #[error("entry is not stored in the archive: {0}")]
    NotStored(String),

    #[error("decrypt: {0}")]
    Decrypt(String),

    /// A builder or packer input breaks the tree contract.
    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AsarError>;
