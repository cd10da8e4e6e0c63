use bitflags::bitflags;
use indexmap::IndexMap;
use indexmap::map::{Entry, Values};

use crate::error::{AsarError, Result};

bitflags! {
    /// Per-node flags.
    ///
    /// `DIRECTORY` never combines with the file flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u32 {
        const DIRECTORY = 1;
        /// Restored with executable permission bits on extraction.
        const EXECUTABLE = 1 << 1;
        /// Content is kept outside the data section.
        const UNPACKED = 1 << 2;
    }
}

impl Flags {
    pub const NONE: Flags = Flags::empty();
}

/// Offset carried by unpacked files; never used to address the data section.
pub const UNPACKED_OFFSET: u64 = u64::MAX;

/// A file entry: a byte range of the data section, or an unpacked placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    name: String,
    size: u64,
    offset: u64,
    flags: Flags,
}

impl FileEntry {
    pub(crate) fn new(name: String, size: u64, offset: u64, flags: Flags) -> Self {
        Self {
            name,
            size,
            offset,
            flags,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Offset relative to the start of the data section.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn is_unpacked(&self) -> bool {
        self.flags.contains(Flags::UNPACKED)
    }

    pub fn is_executable(&self) -> bool {
        self.flags.contains(Flags::EXECUTABLE)
    }

    pub(crate) fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }
}

/// A directory; children keep insertion order and have unique names.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    name: String,
    children: IndexMap<String, Node>,
}

impl Directory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> impl ExactSizeIterator<Item = &Node> + '_ {
        self.children.values()
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.get(name)
    }

    pub(crate) fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.children.get_mut(name)
    }

    pub(crate) fn children_mut(&mut self) -> impl Iterator<Item = &mut Node> + '_ {
        self.children.values_mut()
    }

    /// Append a child, rejecting a name already present in this directory.
    pub(crate) fn insert(&mut self, node: Node) -> Result<()> {
        match self.children.entry(node.name().to_string()) {
            Entry::Occupied(_) => Err(AsarError::InvalidEntry(format!(
                "duplicate entry {:?} in directory {:?}",
                node.name(),
                self.name
            ))),
            Entry::Vacant(slot) => {
                slot.insert(node);
                Ok(())
            }
        }
    }
}

// IndexMap equality ignores order; trees compare in child order.
impl PartialEq for Directory {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.children.iter().eq(other.children.iter())
    }
}

impl Eq for Directory {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Directory(Directory),
    File(FileEntry),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Directory(dir) => dir.name(),
            Node::File(file) => file.name(),
        }
    }

    pub fn flags(&self) -> Flags {
        match self {
            Node::Directory(_) => Flags::DIRECTORY,
            Node::File(file) => file.flags(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File,
}

/// Typed view of a node yielded by [`Tree::walk`].
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    node: &'a Node,
}

impl<'a> NodeView<'a> {
    pub fn name(&self) -> &'a str {
        self.node.name()
    }

    pub fn kind(&self) -> NodeKind {
        match self.node {
            Node::Directory(_) => NodeKind::Directory,
            Node::File(_) => NodeKind::File,
        }
    }

    /// Content size; zero for directories.
    pub fn size(&self) -> u64 {
        match self.node {
            Node::Directory(_) => 0,
            Node::File(file) => file.size(),
        }
    }

    pub fn flags(&self) -> Flags {
        self.node.flags()
    }

    pub fn is_dir(&self) -> bool {
        self.node.is_dir()
    }

    pub fn as_file(&self) -> Option<&'a FileEntry> {
        match self.node {
            Node::File(file) => Some(file),
            Node::Directory(_) => None,
        }
    }

    pub fn node(&self) -> &'a Node {
        self.node
    }
}

/// Lazy pre-order traversal of a tree.
#[derive(Debug, Clone)]
pub struct Walk<'a> {
    stack: Vec<(String, Values<'a, String, Node>)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (String, NodeView<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (prefix, children) = self.stack.last_mut()?;
            let Some(node) = children.next() else {
                self.stack.pop();
                continue;
            };

            let path = if prefix.is_empty() {
                node.name().to_string()
            } else {
                format!("{}/{}", prefix, node.name())
            };
            if let Node::Directory(dir) = node {
                self.stack.push((path.clone(), dir.children.values()));
            }
            return Some((path, NodeView { node }));
        }
    }
}

/// A complete archive directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    root: Directory,
}

impl Tree {
    pub fn new(root: Directory) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Directory {
        &self.root
    }

    /// Walk every node below the root in pre-order. Each call starts over.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![(String::new(), self.root.children.values())],
        }
    }

    /// Non-directory entries in pre-order with their full paths.
    pub fn files(&self) -> impl Iterator<Item = (String, &FileEntry)> + '_ {
        self.walk()
            .filter_map(|(path, view)| view.as_file().map(|file| (path, file)))
    }

    /// Look a node up by a `/` or `\` separated path. The empty path finds nothing.
    pub fn find(&self, path: &str) -> Option<&Node> {
        let mut components = split_path(path).peekable();
        let mut dir = &self.root;
        while let Some(name) = components.next() {
            let node = dir.child(name)?;
            if components.peek().is_none() {
                return Some(node);
            }
            match node {
                Node::Directory(child) => dir = child,
                Node::File(_) => return None,
            }
        }
        None
    }
}

pub(crate) fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\']).filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tree {
        let mut sub = Directory::new("sub");
        sub.insert(Node::File(FileEntry::new("b.txt".into(), 3, 2, Flags::EXECUTABLE)))
            .unwrap();
        let mut root = Directory::new("");
        root.insert(Node::File(FileEntry::new("a.txt".into(), 2, 0, Flags::NONE)))
            .unwrap();
        root.insert(Node::Directory(sub)).unwrap();
        root.insert(Node::Directory(Directory::new("empty"))).unwrap();
        Tree::new(root)
    }

    #[test]
    fn walk_is_pre_order_and_restartable() {
        let tree = sample();
        let paths: Vec<_> = tree.walk().map(|(p, _)| p).collect();
        assert_eq!(paths, ["a.txt", "sub", "sub/b.txt", "empty"]);

        let again: Vec<_> = tree.walk().map(|(p, _)| p).collect();
        assert_eq!(paths, again);
    }

    #[test]
    fn walk_yields_typed_views() {
        let tree = sample();
        let views: Vec<_> = tree.walk().map(|(_, v)| (v.kind(), v.size(), v.flags())).collect();
        assert_eq!(
            views,
            [
                (NodeKind::File, 2, Flags::NONE),
                (NodeKind::Directory, 0, Flags::DIRECTORY),
                (NodeKind::File, 3, Flags::EXECUTABLE),
                (NodeKind::Directory, 0, Flags::DIRECTORY),
            ]
        );
    }

    #[test]
    fn find_accepts_both_separators() {
        let tree = sample();
        assert!(tree.find("sub").unwrap().is_dir());
        assert_eq!(tree.find("sub/b.txt").unwrap().name(), "b.txt");
        assert_eq!(tree.find("sub\\b.txt").unwrap().name(), "b.txt");
        assert!(tree.find("a.txt/nope").is_none());
        assert!(tree.find("missing").is_none());
        assert!(tree.find("").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut dir = Directory::new("d");
        dir.insert(Node::Directory(Directory::new("x"))).unwrap();
        let err = dir
            .insert(Node::File(FileEntry::new("x".into(), 0, 0, Flags::NONE)))
            .unwrap_err();
        assert!(matches!(err, AsarError::InvalidEntry(_)));
    }

    #[test]
    fn equality_follows_child_order() {
        let file = |name: &str| Node::File(FileEntry::new(name.into(), 0, 0, Flags::NONE));
        let mut ab = Directory::new("");
        ab.insert(file("a")).unwrap();
        ab.insert(file("b")).unwrap();
        let mut ba = Directory::new("");
        ba.insert(file("b")).unwrap();
        ba.insert(file("a")).unwrap();
        assert_ne!(ab, ba);
        assert_eq!(ab, ab.clone());
    }
}
