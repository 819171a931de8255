#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `vfs` models the nodes of a virtual filesystem whose files live in the
//! Content Addressable Storage. Filesystem clients see [`Directory`] and
//! [`Leaf`] nodes; the output service additionally manipulates
//! [`PrepopulatedDirectory`] trees, which can be populated in bulk and whose
//! subdirectories may be fetched lazily from a stored tree.
//!
//! # Design
//!
//! - [`Leaf`] and [`Directory`] expose the operations a filesystem frontend
//!   needs: attributes, lookup, open, enumeration and reads.
//! - [`PrepopulatedDirectory`] adds bulk creation, recursive removal and a
//!   filtering walk used to drop nodes whose blobs disappeared from storage.
//! - [`InMemoryPrepopulatedDirectory`] is the in-memory implementation. Its
//!   contents may come from an [`InitialContentsFetcher`] such as
//!   [`CasInitialContentsFetcher`], which is only consulted on first access.
//! - [`BlobAccessCasFileFactory`] and [`BasicSymlinkFactory`] create leaves.
//!   Errors that happen while reading lazily are passed to an
//!   [`ErrorLogger`].
//!
//! # Invariants
//!
//! - Directory locks are never held while calling into child nodes, fetchers
//!   or filter callbacks.
//! - Every child insertion receives a fresh cookie. Enumeration is ordered by
//!   cookie and resumes at the cookie reported with the previous entry.
//! - A [`ChildRemover`] removes exactly the child it was handed out for.
//!
//! # Errors
//!
//! All fallible operations return [`VfsError`], which wraps blob, digest and
//! path errors so callers can still tell a missing blob apart using
//! [`VfsError::is_blob_not_found`].
//!
//! # Examples
//!
//! ```
//! use std::collections::BTreeMap;
//! use vfs::{
//!     BasicSymlinkFactory, InMemoryPrepopulatedDirectory, InitialNode, PrepopulatedDirectory,
//!     PrepopulatedDirectoryChild, SymlinkFactory,
//! };
//! use vpath::Component;
//!
//! let root = InMemoryPrepopulatedDirectory::new();
//! let bin = root.create_and_enter_directory(&Component::new("bin")?)?;
//! let mut children = BTreeMap::new();
//! children.insert(
//!     Component::new("sh")?,
//!     InitialNode::Leaf(BasicSymlinkFactory.lookup_symlink("bash")),
//! );
//! bin.create_children(children, false)?;
//!
//! let PrepopulatedDirectoryChild::Leaf(sh) = bin.lookup_child(&Component::new("sh")?)? else {
//!     unreachable!();
//! };
//! assert_eq!(sh.readlink()?, "bash");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod attributes;
mod cas_contents;
mod cas_file;
mod error;
mod error_logger;
mod in_memory;
mod node;
mod symlink;

pub use crate::attributes::{
    Attributes, AttributesMask, EMPTY_DIRECTORY_LINK_COUNT, FileType, Permissions,
};
pub use crate::cas_contents::CasInitialContentsFetcher;
pub use crate::cas_file::{BlobAccessCasFileFactory, CasFileFactory};
pub use crate::error::VfsError;
pub use crate::error_logger::{
    ErrorLogger, ErrorLoggerFactory, TracingErrorLogger, TracingErrorLoggerFactory,
};
pub use crate::in_memory::InMemoryPrepopulatedDirectory;
pub use crate::node::{
    ChildRemover, Directory, DirectoryChild, DirectoryEntryReporter, FileStatus,
    InitialContentsFetcher, InitialNode, Leaf, OpenExistingOptions, PrepopulatedDirectory,
    PrepopulatedDirectoryChild, read_only_open_child_doesnt_exist,
    read_only_open_child_wrong_file_type,
};
pub use crate::symlink::{BasicSymlinkFactory, SymlinkFactory};
