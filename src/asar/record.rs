//! Length-prefixed records framing the archive header.
//!
//! A record is `[u32 LE payload length][payload][zero padding to 4 bytes]`,
//! where the length field counts the padded payload. The header is two
//! records back to back:
//!
//! ```text
//! outer record:  [4][H]                       payload = u32 length of inner record
//! inner record:  [H - 4][S][json ... pad]     payload = u32 string length + string
//! ```
//!
//! The outer record is redundant (H can be re-measured from the inner one)
//! but existing archives carry it, so it is always written and checked.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

use crate::error::{AsarError, Result};

/// Upper bound on a declared record length.
///
/// Guards allocations against corrupt or hostile length fields.
pub const MAX_RECORD_LEN: u32 = 256 * 1024 * 1024;

/// Byte length of the outer record (`[4][H]`).
pub const SIZE_RECORD_LEN: usize = 8;

/// Round `n` up to the next multiple of 4.
pub fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Wrap `payload` into a record, padding it with zeros to a 4-byte boundary.
pub fn encode_record(payload: &[u8]) -> Result<Vec<u8>> {
    let padded = align4(payload.len());
    if padded > MAX_RECORD_LEN as usize {
        return Err(AsarError::MalformedRecord(format!(
            "payload of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_RECORD_LEN
        )));
    }

    let mut out = Vec::with_capacity(4 + padded);
    out.write_u32::<LittleEndian>(padded as u32)?;
    out.extend_from_slice(payload);
    out.resize(4 + padded, 0);
    Ok(out)
}

/// Read one record and return its (padded) payload.
pub fn decode_record<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let len = reader
        .read_u32::<LittleEndian>()
        .map_err(|_| AsarError::MalformedRecord("truncated length prefix".into()))?;
    if len > MAX_RECORD_LEN {
        return Err(AsarError::MalformedRecord(format!(
            "declared length {} exceeds the {} byte limit",
            len, MAX_RECORD_LEN
        )));
    }

    let mut payload = Vec::new();
    reader.take(len as u64).read_to_end(&mut payload)?;
    if payload.len() != len as usize {
        return Err(AsarError::MalformedRecord(format!(
            "declared length {} but only {} bytes remain",
            len,
            payload.len()
        )));
    }
    Ok(payload)
}

/// Frame header text into the outer and inner records.
pub fn encode_header(text: &str) -> Result<Vec<u8>> {
    let mut string_payload = Vec::with_capacity(4 + text.len());
    string_payload.write_u32::<LittleEndian>(text.len() as u32)?;
    string_payload.extend_from_slice(text.as_bytes());
    let inner = encode_record(&string_payload)?;

    let mut size_payload = Vec::with_capacity(4);
    size_payload.write_u32::<LittleEndian>(inner.len() as u32)?;

    let mut out = encode_record(&size_payload)?;
    out.extend_from_slice(&inner);
    Ok(out)
}

/// Parse the outer record and return the byte length of the inner record.
pub fn decode_header_size(prefix: &[u8]) -> Result<u32> {
    let mut cursor = Cursor::new(prefix);
    let payload = decode_record(&mut cursor)?;
    if payload.len() != 4 {
        return Err(AsarError::MalformedRecord(format!(
            "size record carries {} bytes, expected 4",
            payload.len()
        )));
    }
    let size = Cursor::new(&payload).read_u32::<LittleEndian>()?;
    if size < 8 {
        return Err(AsarError::MalformedRecord(format!(
            "header record length {} is too small",
            size
        )));
    }
    Ok(size)
}

/// Parse the inner record (exactly the bytes announced by the outer one) into header text.
pub fn decode_header_text(record: &[u8]) -> Result<String> {
    let mut cursor = Cursor::new(record);
    let payload = decode_record(&mut cursor)?;
    if payload.len() + 4 != record.len() {
        return Err(AsarError::MalformedRecord(format!(
            "header record declares {} payload bytes, size record implies {}",
            payload.len(),
            record.len().saturating_sub(4)
        )));
    }

    let mut payload = Cursor::new(payload);
    let text_len = payload
        .read_u32::<LittleEndian>()
        .map_err(|_| AsarError::MalformedRecord("header record lacks a string length".into()))?
        as usize;
    let start = payload.position() as usize;
    let payload = payload.into_inner();
    if text_len > payload.len() - start {
        return Err(AsarError::MalformedRecord(format!(
            "header string of {} bytes overruns its {} byte record",
            text_len,
            payload.len() - start
        )));
    }

    String::from_utf8(payload[start..start + text_len].to_vec())
        .map_err(|e| AsarError::MalformedHeader(format!("header is not UTF-8: {}", e)))
}
