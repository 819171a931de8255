#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `blobstore` is the boundary between the output service and the Content
//! Addressable Storage. It defines the [`BlobAccess`] capability (get, put,
//! find-missing), an in-memory implementation used by tests and embedders,
//! and the [`DirectoryFetcher`] that turns a tree digest into the directories
//! it contains.
//!
//! # Design
//!
//! - [`BlobAccess`] is object safe so stores can be shared as
//!   `Arc<dyn BlobAccess>`.
//! - [`MemoryBlobAccess`] verifies digests on insertion and counts
//!   `find_missing` batches so callers can observe batching behaviour.
//! - [`tree`] holds the serde model of directories and trees. Child
//!   directories are addressed by the digest of their JSON encoding.
//! - [`BlobAccessDirectoryFetcher`] loads tree messages through a
//!   [`BlobAccess`], bounded by a maximum message size.
//!
//! # Errors
//!
//! All operations return [`BlobError`]. [`BlobError::is_not_found`] lets
//! callers distinguish absent blobs from other failures.

mod access;
mod error;
mod fetcher;
mod memory;
pub mod tree;

pub use crate::access::{BlobAccess, RECOMMENDED_FIND_MISSING_DIGESTS_COUNT};
pub use crate::error::BlobError;
pub use crate::fetcher::{BlobAccessDirectoryFetcher, DirectoryFetcher};
pub use crate::memory::MemoryBlobAccess;
