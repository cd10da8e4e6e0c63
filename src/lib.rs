//! # rasar
//!
//! Pack, list and extract asar archives.
//!
//! An asar archive is a single file holding a JSON header that describes a
//! directory tree, followed by the concatenated bytes of every file. This
//! crate reads and writes the format bit-exactly, and can list or extract
//! archives served over HTTP by fetching only the byte ranges it needs.
//!
//! ## Features
//!
//! - Build archives from a directory or programmatically with [`TreeBuilder`]
//! - Read archives from the local filesystem, memory, or HTTP/HTTPS URLs
//! - Stream individual entries without loading the whole archive
//! - Leave selected files unpacked, next to the archive
//! - Optional, pluggable content encryption
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rasar::{Archive, CipherConfig, LocalFileReader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let reader = Arc::new(LocalFileReader::new("app.asar".as_ref())?);
//!     let archive = Archive::open(reader, CipherConfig::disabled()).await?;
//!
//!     for (path, node) in archive.walk() {
//!         println!("{} ({} bytes)", path, node.size());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod asar;
pub mod cli;
pub mod error;
pub mod io;
pub mod pattern;

pub use asar::{
    Archive, AsarExtractor, CipherConfig, FileContent, FileEntry, Flags, Node, NodeKind,
    NodeView, PackOptions, Tree, TreeBuilder,
};
pub use cli::Cli;
pub use error::{AsarError, Result};
pub use io::{HttpRangeReader, LocalFileReader, MemoryReader, ReadAt};
