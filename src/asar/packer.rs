//! Packing a directory from disk.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::builder::{FileContent, PackPlan, TreeBuilder};
use super::cipher::CipherConfig;
use super::encoder::encode_to_path;
use super::tree::Flags;
use crate::error::{AsarError, Result};
use crate::pattern::matches_any;

#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// Files matching any of these patterns are left out of the data section
    /// and copied next to the archive instead.
    pub unpack: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackSummary {
    pub directories: usize,
    pub files: usize,
    pub unpacked: usize,
    pub bytes_written: u64,
}

/// A planned archive and the unpacked files to copy beside it.
#[derive(Debug)]
pub struct DirectoryPlan {
    pub plan: PackPlan,
    /// `(relative path, source path)` of every unpacked file.
    pub unpacked: Vec<(String, PathBuf)>,
    pub directories: usize,
}

/// Directory that holds the unpacked files of `archive` (`<archive>.unpacked`).
pub fn unpacked_dir_for(archive: &Path) -> PathBuf {
    let mut name = OsString::from(archive.as_os_str());
    name.push(".unpacked");
    PathBuf::from(name)
}

/// Walk `src` in sorted pre-order and build the tree. `skip` is left out (the archive itself).
pub fn plan_directory(
    src: &Path,
    options: &PackOptions,
    skip: Option<&Path>,
) -> Result<DirectoryPlan> {
    let mut builder = TreeBuilder::new();
    let mut unpacked = Vec::new();
    let mut directories = 0;

    for ent in WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let ent = ent.map_err(|e| {
            let msg = e.to_string();
            AsarError::Io(e.into_io_error().unwrap_or_else(|| std::io::Error::other(msg)))
        })?;

        let rel = relative_path(src, ent.path())?;
        let (parent, name) = match rel.rsplit_once('/') {
            Some((parent, name)) => (parent, name),
            None => ("", rel.as_str()),
        };

        let file_type = ent.file_type();
        if file_type.is_dir() {
            builder.insert_directory(parent, name, Flags::DIRECTORY)?;
            directories += 1;
        } else if file_type.is_file() {
            if skip.is_some_and(|s| same_file(s, ent.path())) {
                continue;
            }
            let metadata = ent.metadata().map_err(|e| {
                let msg = e.to_string();
                AsarError::Io(e.into_io_error().unwrap_or_else(|| std::io::Error::other(msg)))
            })?;
            let size = metadata.len();

            let mut flags = Flags::NONE;
            if is_executable(&metadata) {
                flags |= Flags::EXECUTABLE;
            }

            let content = if matches_any(&options.unpack, &rel) {
                flags |= Flags::UNPACKED;
                unpacked.push((rel.clone(), ent.path().to_path_buf()));
                FileContent::Sized(size)
            } else {
                FileContent::Disk {
                    path: ent.path().to_path_buf(),
                    size,
                }
            };
            builder.insert_file(parent, name, content, flags)?;
        } else {
            tracing::warn!(path = %rel, "skipping symbolic link or special file");
        }
    }

    Ok(DirectoryPlan {
        plan: builder.finish()?,
        unpacked,
        directories,
    })
}

/// Pack `src` into `archive`, copying unpacked files into `<archive>.unpacked/`.
pub async fn pack_directory(
    src: &Path,
    archive: &Path,
    options: &PackOptions,
    cipher: &CipherConfig,
) -> Result<PackSummary> {
    let DirectoryPlan {
        plan,
        unpacked,
        directories,
    } = plan_directory(src, options, Some(archive))?;
    let files = plan.tree().files().count();

    let bytes_written = encode_to_path(&plan, archive, cipher).await?;

    if !unpacked.is_empty() {
        let root = unpacked_dir_for(archive);
        for (rel, source) in &unpacked {
            let target = root.join(rel);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(source, &target).await?;
            tracing::debug!(path = %rel, "copied unpacked file");
        }
    }

    tracing::info!(
        archive = %archive.display(),
        files,
        directories,
        unpacked = unpacked.len(),
        bytes_written,
        "packed"
    );
    Ok(PackSummary {
        directories,
        files,
        unpacked: unpacked.len(),
        bytes_written,
    })
}

fn relative_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(root).map_err(|_| {
        AsarError::InvalidEntry(format!("{} is outside {}", path.display(), root.display()))
    })?;

    let mut out = String::new();
    for comp in rel.components() {
        let part = comp.as_os_str().to_str().ok_or_else(|| {
            AsarError::InvalidEntry(format!("{} is not valid UTF-8", path.display()))
        })?;
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(part);
    }
    Ok(out)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn plans_sorted_pre_order_with_unpacked_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub/deep")).unwrap();
        fs::write(dir.path().join("b.txt"), "bb").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("sub/deep/x.node"), "native").unwrap();
        fs::write(dir.path().join("sub/c.txt"), "ccc").unwrap();

        let options = PackOptions {
            unpack: vec!["*.node".into()],
        };
        let planned = plan_directory(dir.path(), &options, None).unwrap();

        let paths: Vec<_> = planned.plan.tree().walk().map(|(p, _)| p).collect();
        assert_eq!(
            paths,
            ["a.txt", "b.txt", "sub", "sub/c.txt", "sub/deep", "sub/deep/x.node"]
        );
        assert_eq!(planned.directories, 2);
        assert_eq!(planned.unpacked.len(), 1);
        assert_eq!(planned.unpacked[0].0, "sub/deep/x.node");
        assert_eq!(planned.plan.data_len(), 6);
    }

    #[test]
    fn unpacked_dir_sits_next_to_the_archive() {
        assert_eq!(
            unpacked_dir_for(Path::new("out/app.asar")),
            PathBuf::from("out/app.asar.unpacked")
        );
    }
}
