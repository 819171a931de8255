use blobstore::BlobError;
use cas_digest::DigestError;
use thiserror::Error;
use vpath::ResolveError;

/// Errors returned by virtual filesystem nodes.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum VfsError {
    /// The name does not exist, or the directory no longer accepts children.
    #[error("No such file or directory")]
    NoEntry,
    /// A path component refers to a non-directory.
    #[error("Not a directory")]
    NotDirectory,
    /// The operation requires a non-directory.
    #[error("Is a directory")]
    IsDirectory,
    /// The name already exists.
    #[error("File exists")]
    Exists,
    /// The directory does not permit creating files.
    #[error("Read-only file system")]
    ReadOnly,
    /// `readlink` was called on something other than a symbolic link.
    #[error("Not a symbolic link")]
    NotSymlink,
    /// The operation is not supported by this kind of node.
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Reading file contents from the backing store failed.
    #[error("Input/output error")]
    Io,
    /// A directory listing obtained from the store is inconsistent.
    #[error("Invalid directory contents: {0}")]
    InvalidDirectory(String),
    /// A pathname component could not be parsed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// The backing store reported an error.
    #[error(transparent)]
    Blob(#[from] BlobError),
    /// A digest could not be parsed.
    #[error(transparent)]
    Digest(#[from] DigestError),
}

impl VfsError {
    /// Reports whether the error was caused by a blob that is absent from the
    /// store.
    #[must_use]
    pub const fn is_blob_not_found(&self) -> bool {
        matches!(self, Self::Blob(error) if error.is_not_found())
    }
}
