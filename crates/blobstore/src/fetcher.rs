use std::sync::Arc;

use cas_digest::Digest;

use crate::access::BlobAccess;
use crate::error::BlobError;
use crate::tree::{Directory, Tree, decode_tree, directory_digest};

/// Loads the directories contained in a tree.
pub trait DirectoryFetcher: Send + Sync {
    /// Returns the root directory of the tree stored under `tree_digest`.
    fn get_tree_root_directory(&self, tree_digest: &Digest) -> Result<Directory, BlobError>;

    /// Returns the directory with digest `child_digest` contained in the tree
    /// stored under `tree_digest`.
    fn get_tree_child_directory(
        &self,
        tree_digest: &Digest,
        child_digest: &Digest,
    ) -> Result<Directory, BlobError>;
}

/// [`DirectoryFetcher`] that reads tree blobs from a [`BlobAccess`].
#[derive(Clone)]
pub struct BlobAccessDirectoryFetcher {
    blob_access: Arc<dyn BlobAccess>,
    maximum_message_size: usize,
}

impl BlobAccessDirectoryFetcher {
    /// Creates a fetcher that refuses tree blobs larger than
    /// `maximum_message_size` bytes.
    #[must_use]
    pub fn new(blob_access: Arc<dyn BlobAccess>, maximum_message_size: usize) -> Self {
        Self {
            blob_access,
            maximum_message_size,
        }
    }

    fn get_tree(&self, tree_digest: &Digest) -> Result<Tree, BlobError> {
        let too_large = usize::try_from(tree_digest.size_bytes())
            .map_or(true, |size| size > self.maximum_message_size);
        if too_large {
            return Err(BlobError::SizeLimit {
                digest: tree_digest.clone(),
                size_bytes: tree_digest.size_bytes(),
                maximum: self.maximum_message_size,
            });
        }
        let data = self.blob_access.get(tree_digest)?;
        decode_tree(tree_digest, &data)
    }
}

impl std::fmt::Debug for BlobAccessDirectoryFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobAccessDirectoryFetcher")
            .field("maximum_message_size", &self.maximum_message_size)
            .finish_non_exhaustive()
    }
}

impl DirectoryFetcher for BlobAccessDirectoryFetcher {
    fn get_tree_root_directory(&self, tree_digest: &Digest) -> Result<Directory, BlobError> {
        Ok(self.get_tree(tree_digest)?.root)
    }

    fn get_tree_child_directory(
        &self,
        tree_digest: &Digest,
        child_digest: &Digest,
    ) -> Result<Directory, BlobError> {
        let tree = self.get_tree(tree_digest)?;
        tree.children
            .into_iter()
            .find(|child| directory_digest(tree_digest.function(), child) == *child_digest)
            .ok_or_else(|| BlobError::NotFound(child_digest.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBlobAccess;
    use crate::tree::{DirectoryNode, FileNode, encode_tree};
    use cas_digest::{DigestFunction, Function, InstanceName};

    fn fixture() -> (Arc<MemoryBlobAccess>, Function, Digest, Digest) {
        let function = Function::new(InstanceName::default(), DigestFunction::Sha256);
        let child = Directory {
            files: vec![FileNode {
                name: "lib.rs".to_owned(),
                digest: function.compute(b"fn main() {}").to_proto(),
                is_executable: false,
            }],
            ..Directory::default()
        };
        let child_digest = directory_digest(&function, &child);
        let tree = Tree {
            root: Directory {
                directories: vec![DirectoryNode {
                    name: "src".to_owned(),
                    digest: child_digest.to_proto(),
                }],
                ..Directory::default()
            },
            children: vec![child],
        };
        let store = Arc::new(MemoryBlobAccess::new());
        let tree_digest = store.insert(&function, &encode_tree(&tree));
        (store, function, tree_digest, child_digest)
    }

    #[test]
    fn fetches_root_and_children() {
        let (store, _, tree_digest, child_digest) = fixture();
        let fetcher = BlobAccessDirectoryFetcher::new(store, 1 << 20);

        let root = fetcher
            .get_tree_root_directory(&tree_digest)
            .expect("root directory");
        assert_eq!(root.directories[0].name, "src");

        let child = fetcher
            .get_tree_child_directory(&tree_digest, &child_digest)
            .expect("child directory");
        assert_eq!(child.files[0].name, "lib.rs");
    }

    #[test]
    fn unknown_child_is_not_found() {
        let (store, function, tree_digest, _) = fixture();
        let fetcher = BlobAccessDirectoryFetcher::new(store, 1 << 20);
        let error = fetcher
            .get_tree_child_directory(&tree_digest, &function.compute(b"other"))
            .expect_err("child is absent");
        assert!(error.is_not_found());
    }

    #[test]
    fn oversized_trees_are_refused_without_loading() {
        let (store, _, tree_digest, _) = fixture();
        let fetcher = BlobAccessDirectoryFetcher::new(store.clone(), 4);
        let error = fetcher
            .get_tree_root_directory(&tree_digest)
            .expect_err("tree exceeds limit");
        assert!(matches!(error, BlobError::SizeLimit { maximum: 4, .. }));
        assert_eq!(store.get_calls(), 0);
    }
}
