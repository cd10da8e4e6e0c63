//! asar archive encoding, decoding and extraction.
//!
//! ## Format Overview
//!
//! An asar archive is:
//! 1. An 8-byte size record holding the length of the header record
//! 2. The header record: a length-prefixed JSON description of the
//!    directory tree, with size and data offset of every file
//! 3. The data section: file bodies concatenated in tree pre-order
//!
//! File offsets are relative to the data section, so a reader only needs
//! the header to locate any file, which keeps listing remote archives over
//! HTTP Range requests cheap.
//!
//! ## Architecture
//!
//! - [`record`]: the nested length-prefixed records framing the header
//! - [`tree`]: directory/file nodes, flags and pre-order walking
//! - [`header`]: the header JSON schema
//! - [`builder`]: building a tree and assigning offsets
//! - [`encoder`]: writing an archive
//! - [`decoder`]: opening an archive and reading entry bodies
//! - [`cipher`]: optional content encryption
//! - [`packer`] / [`extractor`]: filesystem glue for the command line
//!
//! ## Limitations
//!
//! - No compression
//! - Symbolic link entries are not supported
//! - `integrity` hashes in newer headers are ignored

pub mod builder;
pub mod cipher;
pub mod decoder;
pub mod encoder;
pub mod extractor;
pub mod header;
pub mod packer;
pub mod record;
pub mod tree;

pub use builder::{FileContent, PackPlan, TreeBuilder};
pub use cipher::{CipherConfig, ContentCipher, KeystreamCipher, DEFAULT_SALT};
pub use decoder::{decode, Archive, DecodedHeader, EntryStream};
pub use encoder::{encode, encode_to_path};
pub use extractor::{AsarExtractor, ExtractOptions, ExtractSummary};
pub use packer::{pack_directory, plan_directory, unpacked_dir_for, PackOptions, PackSummary};
pub use tree::{Directory, FileEntry, Flags, Node, NodeKind, NodeView, Tree, Walk};
