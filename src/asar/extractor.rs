use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{AsarError, Result};
use crate::io::ReadAt;

use super::cipher::CipherConfig;
use super::decoder::Archive;
use super::tree::{FileEntry, Node, Walk};

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Replace files that already exist at the destination.
    pub overwrite: bool,
    /// Where unpacked files live, usually `<archive>.unpacked`.
    pub unpacked_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub directories: usize,
    pub files: usize,
    pub skipped: usize,
}

/// asar archive extractor
pub struct AsarExtractor<R: ReadAt> {
    archive: Archive<R>,
}

impl<R: ReadAt> AsarExtractor<R> {
    pub async fn open(reader: Arc<R>, cipher: CipherConfig) -> Result<Self> {
        Ok(Self {
            archive: Archive::open(reader, cipher).await?,
        })
    }

    pub fn archive(&self) -> &Archive<R> {
        &self.archive
    }

    /// List all entries in pre-order
    pub fn list_entries(&self) -> Walk<'_> {
        self.archive.walk()
    }

    /// Resolve a `/` or `\` separated path to a file entry.
    pub fn file(&self, path: &str) -> Result<&FileEntry> {
        match self.archive.tree().find(path) {
            Some(Node::File(entry)) => Ok(entry),
            Some(Node::Directory(_)) => Err(AsarError::InvalidEntry(format!(
                "{:?} is a directory",
                path
            ))),
            None => Err(AsarError::InvalidEntry(format!("{:?} not found in archive", path))),
        }
    }

    /// Extract file data to memory
    pub async fn extract_to_memory(&self, entry: &FileEntry) -> Result<Vec<u8>> {
        self.archive.read(entry).await
    }

    /// Extract file to disk, applying its executable flag
    pub async fn extract_to_file(&self, entry: &FileEntry, output_path: &Path) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = fs::File::create(output_path).await?;
        self.archive.copy_to(entry, &mut file).await?;
        file.flush().await?;
        drop(file);

        set_mode(output_path, entry.is_executable()).await
    }

    /// Stream file data into `writer`, returning the number of bytes written.
    pub async fn extract_to_writer<W: AsyncWrite + Unpin>(
        &self,
        entry: &FileEntry,
        writer: &mut W,
    ) -> Result<u64> {
        let written = self.archive.copy_to(entry, writer).await?;
        writer.flush().await?;
        Ok(written)
    }

    /// Extract file to stdout
    pub async fn extract_to_stdout(&self, entry: &FileEntry) -> Result<u64> {
        self.extract_to_writer(entry, &mut tokio::io::stdout()).await
    }

    /// Recreate the whole tree under `dest`.
    ///
    /// Unpacked entries are copied from `options.unpacked_dir` when it holds
    /// them and skipped otherwise. Existing files are kept unless
    /// `options.overwrite` is set.
    pub async fn extract_all(
        &self,
        dest: &Path,
        options: &ExtractOptions,
    ) -> Result<ExtractSummary> {
        let mut summary = ExtractSummary::default();
        fs::create_dir_all(dest).await?;

        for (path, view) in self.archive.walk() {
            let rel = safe_relative_path(&path)?;
            let target = dest.join(&rel);

            let Some(entry) = view.as_file() else {
                fs::create_dir_all(&target).await?;
                summary.directories += 1;
                continue;
            };

            if !options.overwrite && fs::try_exists(&target).await? {
                tracing::warn!(path = %path, "skipping existing file");
                summary.skipped += 1;
                continue;
            }

            if entry.is_unpacked() {
                let source = options
                    .unpacked_dir
                    .as_ref()
                    .map(|dir| dir.join(&rel))
                    .filter(|source| source.is_file());
                let Some(source) = source else {
                    tracing::warn!(path = %path, "unpacked file not found beside the archive");
                    summary.skipped += 1;
                    continue;
                };
                fs::copy(&source, &target).await?;
                set_mode(&target, entry.is_executable()).await?;
            } else {
                self.extract_to_file(entry, &target).await?;
            }
            tracing::trace!(path = %path, size = entry.size(), "extracted");
            summary.files += 1;
        }

        Ok(summary)
    }
}

/// Turn an archive path into a relative filesystem path that cannot leave the destination.
fn safe_relative_path(path: &str) -> Result<PathBuf> {
    let rel = PathBuf::from(path);
    if rel
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        Ok(rel)
    } else {
        Err(AsarError::InvalidEntry(format!(
            "{:?} would be extracted outside the destination",
            path
        )))
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, executable: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = if executable { 0o755 } else { 0o644 };
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _executable: bool) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asar::builder::{FileContent, TreeBuilder};
    use crate::asar::encoder::encode;
    use crate::asar::tree::Flags;
    use crate::io::MemoryReader;

    async fn extractor() -> AsarExtractor<MemoryReader> {
        let mut b = TreeBuilder::new();
        b.insert_directory("", "sub", Flags::DIRECTORY).unwrap();
        b.insert_file("sub", "b.txt", FileContent::Bytes(b"bye".to_vec()), Flags::NONE)
            .unwrap();
        let mut out = Vec::new();
        encode(&b.finish().unwrap(), &mut out, &CipherConfig::disabled())
            .await
            .unwrap();
        AsarExtractor::open(Arc::new(MemoryReader::new(out)), CipherConfig::disabled())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn single_file_by_path() {
        let extractor = extractor().await;
        let entry = extractor.file("sub\\b.txt").unwrap();

        let mut out = Vec::new();
        let written = extractor.extract_to_writer(entry, &mut out).await.unwrap();
        assert_eq!(written, 3);
        assert_eq!(out, b"bye");

        assert!(matches!(extractor.file("sub"), Err(AsarError::InvalidEntry(_))));
        assert!(matches!(extractor.file("nope"), Err(AsarError::InvalidEntry(_))));
    }

    #[test]
    fn rejects_escaping_paths() {
        assert!(safe_relative_path("a/b.txt").is_ok());
        assert!(safe_relative_path("../etc/passwd").is_err());
        assert!(safe_relative_path("a/../../x").is_err());
        assert!(safe_relative_path("/abs").is_err());
    }
}
