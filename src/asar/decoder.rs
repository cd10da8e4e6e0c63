//! Header decoding and positioned reads of entry bodies.
//!
//! Opening an archive reads only the header. Entry ranges are checked
//! against the archive length when they are read, so opening stays
//! proportional to the header size.

use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::cipher::CipherConfig;
use super::encoder::CHUNK_SIZE;
use super::header;
use super::record::{self, MAX_RECORD_LEN, SIZE_RECORD_LEN};
use super::tree::{FileEntry, Tree, Walk};
use crate::error::{AsarError, Result};
use crate::io::ReadAt;

/// A parsed header and where the data section starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHeader {
    pub tree: Tree,
    /// Absolute offset of the first data-section byte.
    pub data_start: u64,
}

/// Parse the header records at the start of `reader`.
pub async fn decode<R: ReadAt + ?Sized>(reader: &R) -> Result<DecodedHeader> {
    let total = reader.size();
    if total < SIZE_RECORD_LEN as u64 {
        return Err(AsarError::MalformedRecord(format!(
            "archive of {} bytes is shorter than its size record",
            total
        )));
    }

    let mut prefix = [0u8; SIZE_RECORD_LEN];
    reader.read_exact_at(0, &mut prefix).await?;
    let header_size = record::decode_header_size(&prefix)? as u64;

    if header_size > MAX_RECORD_LEN as u64 + 4 {
        return Err(AsarError::MalformedRecord(format!(
            "header record of {} bytes exceeds the {} byte limit",
            header_size, MAX_RECORD_LEN
        )));
    }
    let data_start = SIZE_RECORD_LEN as u64 + header_size;
    if data_start > total {
        return Err(AsarError::MalformedRecord(format!(
            "header record of {} bytes runs past the archive end ({} bytes)",
            header_size, total
        )));
    }

    let mut inner = vec![0u8; header_size as usize];
    reader
        .read_exact_at(SIZE_RECORD_LEN as u64, &mut inner)
        .await?;
    let text = record::decode_header_text(&inner)?;
    let tree = header::parse(&text)?;

    tracing::debug!(header_size, data_start, "decoded header");
    Ok(DecodedHeader { tree, data_start })
}

/// An opened archive: the decoded tree plus positioned access to bodies.
///
/// All reads take `&self`; distinct entries can be read concurrently.
pub struct Archive<R: ReadAt> {
    reader: Arc<R>,
    tree: Tree,
    data_start: u64,
    cipher: CipherConfig,
}

impl<R: ReadAt> Archive<R> {
    pub async fn open(reader: Arc<R>, cipher: CipherConfig) -> Result<Self> {
        let DecodedHeader { tree, data_start } = decode(reader.as_ref()).await?;
        Ok(Self {
            reader,
            tree,
            data_start,
            cipher,
        })
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn walk(&self) -> Walk<'_> {
        self.tree.walk()
    }

    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    /// Read an entry's whole body.
    pub async fn read(&self, entry: &FileEntry) -> Result<Vec<u8>> {
        let start = self.locate(entry)?;
        let len = usize::try_from(entry.size()).map_err(|_| self.out_of_range(entry))?;
        let mut buf = vec![0u8; len];
        self.reader.read_exact_at(start, &mut buf).await?;
        self.cipher.decrypt(entry.offset(), &mut buf)?;
        Ok(buf)
    }

    /// Read an entry's body chunk by chunk.
    pub fn stream(&self, entry: &FileEntry) -> Result<EntryStream<'_, R>> {
        let start = self.locate(entry)?;
        Ok(EntryStream {
            archive: self,
            absolute: start,
            position: entry.offset(),
            remaining: entry.size(),
        })
    }

    /// Copy an entry's body into `writer`, returning the bytes copied.
    pub async fn copy_to<W: AsyncWrite + Unpin>(
        &self,
        entry: &FileEntry,
        writer: &mut W,
    ) -> Result<u64> {
        let mut stream = self.stream(entry)?;
        let mut copied = 0u64;
        while let Some(chunk) = stream.next_chunk().await? {
            writer.write_all(&chunk).await?;
            copied += chunk.len() as u64;
        }
        Ok(copied)
    }

    /// Absolute start of a stored entry, after bounds checking.
    fn locate(&self, entry: &FileEntry) -> Result<u64> {
        if entry.is_unpacked() {
            return Err(AsarError::NotStored(entry.name().to_string()));
        }
        let start = self.data_start.checked_add(entry.offset());
        match start.and_then(|s| s.checked_add(entry.size())) {
            Some(end) if end <= self.reader.size() => Ok(self.data_start + entry.offset()),
            _ => Err(self.out_of_range(entry)),
        }
    }

    fn out_of_range(&self, entry: &FileEntry) -> AsarError {
        AsarError::OutOfRange {
            offset: entry.offset(),
            size: entry.size(),
            available: self.reader.size().saturating_sub(self.data_start),
        }
    }
}

/// Chunked reader over one entry's body.
pub struct EntryStream<'a, R: ReadAt> {
    archive: &'a Archive<R>,
    absolute: u64,
    position: u64,
    remaining: u64,
}

impl<R: ReadAt> EntryStream<'_, R> {
    /// Next decrypted chunk, or `None` once the entry is exhausted.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let len = self.remaining.min(CHUNK_SIZE as u64) as usize;
        let mut buf = vec![0u8; len];
        self.archive
            .reader
            .read_exact_at(self.absolute, &mut buf)
            .await?;
        self.archive.cipher.decrypt(self.position, &mut buf)?;

        self.absolute += len as u64;
        self.position += len as u64;
        self.remaining -= len as u64;
        Ok(Some(buf))
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}
