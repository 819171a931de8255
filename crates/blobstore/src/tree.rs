//! Serialized directory hierarchies.
//!
//! A [`Tree`] carries a root [`Directory`] together with every directory
//! reachable from it, so that a whole hierarchy can be fetched with a single
//! blob lookup. Directories reference their children by digest; the digest of
//! a child is computed over its JSON encoding with the function of the tree
//! that contains it.

use cas_digest::{Digest, DigestProto, Function};
use serde::{Deserialize, Serialize};

use crate::error::BlobError;

/// A regular file contained in a directory.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct FileNode {
    /// Name of the file.
    pub name: String,
    /// Digest of the file contents.
    pub digest: DigestProto,
    /// Whether the file has the executable bit set.
    #[serde(default)]
    pub is_executable: bool,
}

/// A subdirectory contained in a directory.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct DirectoryNode {
    /// Name of the subdirectory.
    pub name: String,
    /// Digest of the encoded child [`Directory`].
    pub digest: DigestProto,
}

/// A symbolic link contained in a directory.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct SymlinkNode {
    /// Name of the symbolic link.
    pub name: String,
    /// Literal target of the symbolic link.
    pub target: String,
}

/// Contents of a single directory.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Directory {
    /// Regular files.
    #[serde(default)]
    pub files: Vec<FileNode>,
    /// Subdirectories.
    #[serde(default)]
    pub directories: Vec<DirectoryNode>,
    /// Symbolic links.
    #[serde(default)]
    pub symlinks: Vec<SymlinkNode>,
}

/// A root directory plus all of its transitive children.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Tree {
    /// The root directory.
    pub root: Directory,
    /// Every directory reachable from the root, in any order.
    #[serde(default)]
    pub children: Vec<Directory>,
}

/// Encodes a directory the way it is hashed and stored.
#[must_use]
pub fn encode_directory(directory: &Directory) -> Vec<u8> {
    serde_json::to_vec(directory).unwrap_or_default()
}

/// Encodes a tree the way it is stored.
#[must_use]
pub fn encode_tree(tree: &Tree) -> Vec<u8> {
    serde_json::to_vec(tree).unwrap_or_default()
}

/// Computes the digest under which a child directory is referenced.
#[must_use]
pub fn directory_digest(function: &Function, directory: &Directory) -> Digest {
    function.compute(&encode_directory(directory))
}

/// Decodes a tree blob previously loaded under `digest`.
pub fn decode_tree(digest: &Digest, data: &[u8]) -> Result<Tree, BlobError> {
    serde_json::from_slice(data).map_err(|error| BlobError::Malformed {
        digest: digest.clone(),
        reason: error.to_string(),
    })
}
