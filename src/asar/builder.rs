//! Assembling a tree before encoding.
//!
//! Two ways in:
//!
//! - [`TreeBuilder::insert_directory`] / [`TreeBuilder::insert_file`] address
//!   the parent directory by path and insert straight into it.
//! - [`TreeBuilder::open_directory`] / [`TreeBuilder::add_file`] consume a
//!   flat pre-order event stream where each event only says whether it sits
//!   at the archive root. A stack of open directories tracks nesting, so the
//!   events must arrive in exact directory-walk order; an out-of-order stream
//!   produces a mis-nested tree and cannot be detected here.
//!
//! Offsets are assigned in pre-order when the builder is sealed with
//! [`TreeBuilder::finish`], giving a gapless data section.

use std::collections::HashMap;
use std::path::PathBuf;

use super::tree::{Directory, FileEntry, Flags, Node, Tree, UNPACKED_OFFSET, split_path};
use crate::error::{AsarError, Result};

/// Where a file's bytes come from when the archive is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Bytes(Vec<u8>),
    /// Streamed from disk at encode time; `size` must still match then.
    Disk { path: PathBuf, size: u64 },
    /// Size only. Valid for unpacked files, whose bytes never enter the archive.
    Sized(u64),
}

impl FileContent {
    pub fn size(&self) -> u64 {
        match self {
            FileContent::Bytes(bytes) => bytes.len() as u64,
            FileContent::Disk { size, .. } => *size,
            FileContent::Sized(size) => *size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Body {
    Bytes(Vec<u8>),
    Disk(PathBuf),
}

/// A stored file's body, positioned in the data section.
#[derive(Debug, Clone)]
pub(crate) struct PlannedBody {
    pub path: String,
    pub offset: u64,
    pub size: u64,
    pub body: Body,
}

/// A sealed tree plus the bodies of its stored files in pre-order.
#[derive(Debug, Clone)]
pub struct PackPlan {
    tree: Tree,
    bodies: Vec<PlannedBody>,
    data_len: u64,
}

impl PackPlan {
    pub fn root_directory(&self) -> &Directory {
        self.tree.root()
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn into_tree(self) -> Tree {
        self.tree
    }

    /// Total length of the data section.
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    pub(crate) fn bodies(&self) -> &[PlannedBody] {
        &self.bodies
    }
}

#[derive(Debug, Default)]
pub struct TreeBuilder {
    root: Directory,
    bodies: HashMap<String, Body>,
    open: Vec<String>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory under `parent` (`""` is the root).
    pub fn insert_directory(&mut self, parent: &str, name: &str, flags: Flags) -> Result<()> {
        check_name(name)?;
        if flags.intersects(Flags::EXECUTABLE | Flags::UNPACKED) {
            return Err(AsarError::InvalidEntry(format!(
                "directory {:?} carries file flags {:?}",
                name, flags
            )));
        }
        tracing::trace!(parent, name, "directory");
        self.directory_mut(parent)?
            .insert(Node::Directory(Directory::new(name)))
    }

    /// Add a file under `parent` (`""` is the root).
    pub fn insert_file(
        &mut self,
        parent: &str,
        name: &str,
        content: FileContent,
        flags: Flags,
    ) -> Result<()> {
        check_name(name)?;
        if flags.contains(Flags::DIRECTORY) {
            return Err(AsarError::InvalidEntry(format!(
                "file {:?} carries the directory flag",
                name
            )));
        }
        let unpacked = flags.contains(Flags::UNPACKED);
        if matches!(content, FileContent::Sized(_)) && !unpacked {
            return Err(AsarError::InvalidEntry(format!(
                "stored file {:?} has no content",
                name
            )));
        }

        let size = content.size();
        tracing::trace!(parent, name, size, ?flags, "file");
        self.directory_mut(parent)?.insert(Node::File(FileEntry::new(
            name.to_string(),
            size,
            UNPACKED_OFFSET,
            flags,
        )))?;

        let body = match content {
            FileContent::Bytes(bytes) => Some(Body::Bytes(bytes)),
            FileContent::Disk { path, .. } => Some(Body::Disk(path)),
            FileContent::Sized(_) => None,
        };
        if let (false, Some(body)) = (unpacked, body) {
            self.bodies.insert(join(parent, name), body);
        }
        Ok(())
    }

    /// Pre-order event: a directory. `top_level` closes every open directory first.
    ///
    /// A rejected event leaves the open directories as they were.
    pub fn open_directory(&mut self, name: &str, flags: Flags, top_level: bool) -> Result<()> {
        let parent = self.event_parent(top_level);
        self.insert_directory(&parent, name, flags)?;
        if top_level {
            self.open.clear();
        }
        self.open.push(name.to_string());
        Ok(())
    }

    /// Pre-order event: a file in the innermost open directory, or at the root when `top_level`.
    pub fn add_file(
        &mut self,
        name: &str,
        content: FileContent,
        flags: Flags,
        top_level: bool,
    ) -> Result<()> {
        let parent = self.event_parent(top_level);
        self.insert_file(&parent, name, content, flags)?;
        if top_level {
            self.open.clear();
        }
        Ok(())
    }

    /// Seal the builder, assigning data-section offsets in pre-order.
    pub fn finish(mut self) -> Result<PackPlan> {
        let mut planned = Vec::with_capacity(self.bodies.len());
        let mut cursor = 0u64;
        assign_offsets(&mut self.root, "", &mut cursor, &mut self.bodies, &mut planned)?;
        tracing::debug!(files = planned.len(), data_len = cursor, "sealed tree");

        Ok(PackPlan {
            tree: Tree::new(self.root),
            bodies: planned,
            data_len: cursor,
        })
    }

    fn event_parent(&self, top_level: bool) -> String {
        if top_level {
            String::new()
        } else {
            self.open.join("/")
        }
    }

    fn directory_mut(&mut self, path: &str) -> Result<&mut Directory> {
        let mut dir = &mut self.root;
        for name in split_path(path) {
            dir = match dir.child_mut(name) {
                Some(Node::Directory(child)) => child,
                Some(Node::File(_)) => {
                    return Err(AsarError::InvalidEntry(format!(
                        "parent {:?} is a file",
                        path
                    )));
                }
                None => {
                    return Err(AsarError::InvalidEntry(format!(
                        "parent directory {:?} does not exist",
                        path
                    )));
                }
            };
        }
        Ok(dir)
    }
}

fn assign_offsets(
    dir: &mut Directory,
    prefix: &str,
    cursor: &mut u64,
    bodies: &mut HashMap<String, Body>,
    planned: &mut Vec<PlannedBody>,
) -> Result<()> {
    for child in dir.children_mut() {
        let path = join(prefix, child.name());
        match child {
            Node::Directory(sub) => assign_offsets(sub, &path, cursor, bodies, planned)?,
            Node::File(file) if file.is_unpacked() => {}
            Node::File(file) => {
                let body = bodies.remove(&path).ok_or_else(|| {
                    AsarError::InvalidEntry(format!("no content recorded for {:?}", path))
                })?;
                file.set_offset(*cursor);
                planned.push(PlannedBody {
                    path,
                    offset: *cursor,
                    size: file.size(),
                    body,
                });
                *cursor = cursor.checked_add(file.size()).ok_or_else(|| {
                    AsarError::InvalidEntry("data section exceeds 2^64 bytes".into())
                })?;
            }
        }
    }
    Ok(())
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(AsarError::InvalidEntry(format!(
            "{:?} is not a valid entry name",
            name
        )));
    }
    Ok(())
}

fn join(parent: &str, name: &str) -> String {
    let parent: Vec<&str> = split_path(parent).collect();
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent.join("/"), name)
    }
}
