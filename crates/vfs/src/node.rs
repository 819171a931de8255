use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use cas_digest::{Digest, DigestSet, Function};
use vpath::Component;

use crate::attributes::{Attributes, AttributesMask};
use crate::error::VfsError;

/// Status of a file as reported through the batch stat protocol.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FileStatus {
    /// A regular file.
    File {
        /// Digest of the contents, when requested.
        digest: Option<Digest>,
        /// Whether the executable bit is set.
        is_executable: bool,
    },
    /// A symbolic link.
    Symlink {
        /// Literal target.
        target: String,
    },
    /// A directory.
    Directory {
        /// Time at which the directory contents last changed.
        last_modified_time: SystemTime,
    },
    /// The path leaves the managed tree. The caller must continue resolving
    /// `next_path` by itself.
    External {
        /// Resolved continuation path.
        next_path: String,
    },
}

/// A non-directory node: a regular file or a symbolic link.
pub trait Leaf: Send + Sync {
    /// Fills in the requested attributes.
    fn virtual_get_attributes(&self, requested: AttributesMask, attributes: &mut Attributes);

    /// Reads file contents at `offset`, returning the number of bytes copied.
    fn virtual_read(&self, buf: &mut [u8], offset: u64) -> Result<usize, VfsError>;

    /// Returns the target of a symbolic link, or [`VfsError::NotSymlink`].
    fn readlink(&self) -> Result<String, VfsError>;

    /// Returns the digests of all blobs this node depends on.
    fn containing_digests(&self) -> DigestSet;

    /// Returns the status of the node. When `digest_function` is provided,
    /// files report their digest computed with that function.
    fn output_service_file_status(
        &self,
        digest_function: Option<&Function>,
    ) -> Result<FileStatus, VfsError>;

    /// Releases resources after the node was removed from the tree, or was
    /// never successfully inserted.
    fn unlink(&self) {}
}

/// Options passed when opening an existing file.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct OpenExistingOptions {
    /// Whether the file should be truncated.
    pub truncate: bool,
}

/// A node returned by directory lookups.
#[derive(Clone)]
pub enum DirectoryChild {
    /// A directory.
    Directory(Arc<dyn Directory>),
    /// A file or symbolic link.
    Leaf(Arc<dyn Leaf>),
}

impl fmt::Debug for DirectoryChild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(_) => f.write_str("DirectoryChild::Directory"),
            Self::Leaf(_) => f.write_str("DirectoryChild::Leaf"),
        }
    }
}

/// Receives entries produced by [`Directory::virtual_read_dir`].
pub trait DirectoryEntryReporter {
    /// Reports one entry. `next_cookie` resumes enumeration after this entry.
    /// Returning false stops the enumeration.
    fn report_entry(
        &mut self,
        next_cookie: u64,
        name: &Component,
        child: DirectoryChild,
        attributes: &Attributes,
    ) -> bool;
}

/// A directory as seen by the virtual filesystem.
pub trait Directory: Send + Sync {
    /// Fills in the requested attributes.
    fn virtual_get_attributes(&self, requested: AttributesMask, attributes: &mut Attributes);

    /// Looks up a child, filling in its attributes.
    fn virtual_lookup(
        &self,
        name: &Component,
        requested: AttributesMask,
        attributes: &mut Attributes,
    ) -> Result<DirectoryChild, VfsError>;

    /// Opens a file. `create` carries the attributes of a file to create if
    /// the name does not exist; `existing` is absent when opening an existing
    /// file is not permitted.
    fn virtual_open_child(
        &self,
        name: &Component,
        create: Option<&Attributes>,
        existing: Option<&OpenExistingOptions>,
    ) -> Result<Arc<dyn Leaf>, VfsError>;

    /// Enumerates children whose cookie is at least `first_cookie`.
    fn virtual_read_dir(
        &self,
        first_cookie: u64,
        requested: AttributesMask,
        reporter: &mut dyn DirectoryEntryReporter,
    ) -> Result<(), VfsError>;
}

/// Error returned by read-only directories when the opened name exists.
#[must_use]
pub fn read_only_open_child_wrong_file_type(
    existing: Option<&OpenExistingOptions>,
    error: VfsError,
) -> VfsError {
    match existing {
        None => VfsError::Exists,
        Some(_) => error,
    }
}

/// Error returned by read-only directories when the opened name does not
/// exist.
#[must_use]
pub const fn read_only_open_child_doesnt_exist(create: Option<&Attributes>) -> VfsError {
    match create {
        Some(_) => VfsError::ReadOnly,
        None => VfsError::NoEntry,
    }
}

/// Produces the contents of a directory on first access.
pub trait InitialContentsFetcher: Send + Sync {
    /// Returns the children the directory should be populated with.
    fn fetch_contents(&self) -> Result<BTreeMap<Component, InitialNode>, VfsError>;

    /// Returns the digests of all blobs the directory depends on, including
    /// the digests of its descendants.
    fn containing_digests(&self) -> Result<DigestSet, VfsError>;
}

/// A child to be inserted into a prepopulated directory, or a child visited
/// by [`PrepopulatedDirectory::filter_children`].
#[derive(Clone)]
pub enum InitialNode {
    /// A directory whose contents are produced lazily.
    Directory(Arc<dyn InitialContentsFetcher>),
    /// A file or symbolic link.
    Leaf(Arc<dyn Leaf>),
}

impl fmt::Debug for InitialNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(_) => f.write_str("InitialNode::Directory"),
            Self::Leaf(_) => f.write_str("InitialNode::Leaf"),
        }
    }
}

/// A child of a prepopulated directory.
#[derive(Clone)]
pub enum PrepopulatedDirectoryChild {
    /// A directory.
    Directory(Arc<dyn PrepopulatedDirectory>),
    /// A file or symbolic link.
    Leaf(Arc<dyn Leaf>),
}

impl fmt::Debug for PrepopulatedDirectoryChild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(_) => f.write_str("PrepopulatedDirectoryChild::Directory"),
            Self::Leaf(_) => f.write_str("PrepopulatedDirectoryChild::Leaf"),
        }
    }
}

/// Removes the child it was created for from its parent directory, returning
/// whether it did.
///
/// Calling it after the child was already removed or replaced does nothing
/// and returns `false`.
pub type ChildRemover = Arc<dyn Fn() -> Result<bool, VfsError> + Send + Sync>;

/// A directory whose contents are managed by the process rather than by
/// filesystem clients.
pub trait PrepopulatedDirectory: Directory {
    /// Returns the child with the given name, or [`VfsError::NoEntry`].
    fn lookup_child(&self, name: &Component) -> Result<PrepopulatedDirectoryChild, VfsError>;

    /// Returns the subdirectory with the given name, creating it if needed.
    /// A non-directory in its place is removed.
    fn create_and_enter_directory(
        &self,
        name: &Component,
    ) -> Result<Arc<dyn PrepopulatedDirectory>, VfsError>;

    /// Inserts children. Existing children with the same names are replaced
    /// when `overwrite` is set; otherwise [`VfsError::Exists`] is returned and
    /// nothing is inserted.
    fn create_children(
        &self,
        children: BTreeMap<Component, InitialNode>,
        overwrite: bool,
    ) -> Result<(), VfsError>;

    /// Removes all children recursively. With `forbid_new_children`, later
    /// attempts to create children fail with [`VfsError::NoEntry`].
    fn remove_all_children(&self, forbid_new_children: bool) -> Result<(), VfsError>;

    /// Visits every leaf and every directory whose contents have not been
    /// fetched yet, top-down, passing a remover for the visited node. The
    /// callback is invoked without any directory lock held; returning false
    /// stops the traversal.
    fn filter_children(
        &self,
        callback: &mut dyn FnMut(InitialNode, ChildRemover) -> bool,
    ) -> Result<(), VfsError>;
}
