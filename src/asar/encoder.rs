use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};

use super::builder::{Body, PackPlan, PlannedBody};
use super::cipher::CipherConfig;
use super::{header, record};
use crate::error::{AsarError, Result};

/// Bodies are copied (and encrypted) in chunks of this size.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Write the header records followed by every stored body in pre-order.
///
/// Returns the number of bytes written. Output is deterministic for a given
/// plan and cipher configuration.
pub async fn encode<W: AsyncWrite + Unpin>(
    plan: &PackPlan,
    writer: &mut W,
    cipher: &CipherConfig,
) -> Result<u64> {
    let text = header::to_json(plan.root_directory());
    let header = record::encode_header(&text)?;
    tracing::debug!(
        header_len = header.len(),
        json_len = text.len(),
        data_len = plan.data_len(),
        encrypted = cipher.is_enabled(),
        "writing archive"
    );
    writer.write_all(&header).await?;

    let mut written = header.len() as u64;
    let mut buf = Vec::with_capacity(CHUNK_SIZE);
    for planned in plan.bodies() {
        tracing::trace!(path = %planned.path, offset = planned.offset, size = planned.size, "body");
        written += write_body(planned, writer, cipher, &mut buf).await?;
    }
    writer.flush().await?;
    Ok(written)
}

/// Create `path` and encode the plan into it.
pub async fn encode_to_path(plan: &PackPlan, path: &Path, cipher: &CipherConfig) -> Result<u64> {
    let mut writer = BufWriter::new(File::create(path).await?);
    let written = encode(plan, &mut writer, cipher).await?;
    writer.into_inner().sync_all().await?;
    Ok(written)
}

async fn write_body<W: AsyncWrite + Unpin>(
    planned: &PlannedBody,
    writer: &mut W,
    cipher: &CipherConfig,
    buf: &mut Vec<u8>,
) -> Result<u64> {
    let mut position = planned.offset;
    let mut copied = 0u64;

    match &planned.body {
        Body::Bytes(bytes) => {
            if bytes.len() as u64 != planned.size {
                return Err(size_mismatch(planned, bytes.len() as u64));
            }
            for chunk in bytes.chunks(CHUNK_SIZE) {
                buf.clear();
                buf.extend_from_slice(chunk);
                cipher.encrypt(position, buf)?;
                writer.write_all(&buf[..]).await?;
                position += chunk.len() as u64;
                copied += chunk.len() as u64;
            }
        }
        Body::Disk(path) => {
            // one byte past the planned size is enough to notice growth
            let mut file = File::open(path)
                .await?
                .take(planned.size.saturating_add(1));
            loop {
                buf.resize(CHUNK_SIZE, 0);
                let n = file.read(buf).await?;
                if n == 0 {
                    break;
                }
                if copied + n as u64 > planned.size {
                    return Err(size_mismatch(planned, copied + n as u64));
                }
                buf.truncate(n);
                cipher.encrypt(position, buf)?;
                writer.write_all(&buf[..]).await?;
                position += n as u64;
                copied += n as u64;
            }
            if copied != planned.size {
                return Err(size_mismatch(planned, copied));
            }
        }
    }
    Ok(copied)
}

fn size_mismatch(planned: &PlannedBody, actual: u64) -> AsarError {
    AsarError::InvalidEntry(format!(
        "{} was planned as {} bytes but has {}",
        planned.path, planned.size, actual
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asar::builder::{FileContent, TreeBuilder};
    use crate::asar::cipher::KeystreamCipher;
    use crate::asar::tree::Flags;
    use std::io::Write;

    fn plan() -> PackPlan {
        let mut b = TreeBuilder::new();
        b.add_file("a.txt", FileContent::Bytes(b"hi".to_vec()), Flags::NONE, true)
            .unwrap();
        b.open_directory("sub", Flags::DIRECTORY, true).unwrap();
        b.add_file("b.txt", FileContent::Bytes(b"bye".to_vec()), Flags::NONE, false)
            .unwrap();
        b.finish().unwrap()
    }

    #[tokio::test]
    async fn data_section_follows_padded_header() {
        let mut out = Vec::new();
        let written = encode(&plan(), &mut out, &CipherConfig::disabled())
            .await
            .unwrap();
        assert_eq!(written, out.len() as u64);

        let header_size = u32::from_le_bytes(out[4..8].try_into().unwrap()) as usize;
        assert_eq!(header_size % 4, 0);
        assert_eq!(&out[8 + header_size..], b"hibye");
    }

    #[tokio::test]
    async fn encoding_is_deterministic() {
        let cipher = CipherConfig::new(KeystreamCipher::from_key([3; 32]));
        let mut a = Vec::new();
        let mut b = Vec::new();
        encode(&plan(), &mut a, &cipher).await.unwrap();
        encode(&plan(), &mut b, &cipher).await.unwrap();
        assert_eq!(a, b);

        let mut plain = Vec::new();
        encode(&plan(), &mut plain, &CipherConfig::disabled())
            .await
            .unwrap();
        assert_eq!(a.len(), plain.len());
        assert_ne!(a, plain);
    }

    #[tokio::test]
    async fn disk_bodies_are_streamed_and_size_checked() {
        let mut src = tempfile::NamedTempFile::new().unwrap();
        src.write_all(b"from disk").unwrap();

        let mut b = TreeBuilder::new();
        b.insert_file(
            "",
            "d.bin",
            FileContent::Disk {
                path: src.path().to_path_buf(),
                size: 9,
            },
            Flags::NONE,
        )
        .unwrap();
        let mut out = Vec::new();
        encode(&b.finish().unwrap(), &mut out, &CipherConfig::disabled())
            .await
            .unwrap();
        assert!(out.ends_with(b"from disk"));

        let mut b = TreeBuilder::new();
        b.insert_file(
            "",
            "d.bin",
            FileContent::Disk {
                path: src.path().to_path_buf(),
                size: 4,
            },
            Flags::NONE,
        )
        .unwrap();
        let err = encode(&b.finish().unwrap(), &mut Vec::new(), &CipherConfig::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, AsarError::InvalidEntry(_)));
    }
}
