use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use blobstore::DirectoryFetcher;
use blobstore::tree::Directory as TreeDirectory;
use cas_digest::{Digest, DigestSet, DigestSetBuilder, Function};
use rustc_hash::FxHashSet;
use vpath::Component;

use crate::cas_file::CasFileFactory;
use crate::error::VfsError;
use crate::node::{InitialContentsFetcher, InitialNode};
use crate::symlink::SymlinkFactory;

/// Collaborators shared by every directory of a tree.
struct Shared {
    directory_fetcher: Arc<dyn DirectoryFetcher>,
    cas_file_factory: Arc<dyn CasFileFactory>,
    symlink_factory: Arc<dyn SymlinkFactory>,
    digest_function: Function,
    tree_digest: Digest,
}

/// [`InitialContentsFetcher`] that populates a directory from a tree stored
/// in the Content Addressable Storage.
pub struct CasInitialContentsFetcher {
    shared: Arc<Shared>,
    child_digest: Option<Digest>,
}

impl CasInitialContentsFetcher {
    /// Creates a fetcher for the root directory of the tree stored under
    /// `tree_digest`.
    #[must_use]
    pub fn new(
        directory_fetcher: Arc<dyn DirectoryFetcher>,
        tree_digest: Digest,
        cas_file_factory: Arc<dyn CasFileFactory>,
        symlink_factory: Arc<dyn SymlinkFactory>,
        digest_function: Function,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                directory_fetcher,
                cas_file_factory,
                symlink_factory,
                digest_function,
                tree_digest,
            }),
            child_digest: None,
        }
    }

    fn directory(&self, child_digest: Option<&Digest>) -> Result<TreeDirectory, VfsError> {
        let fetcher = &self.shared.directory_fetcher;
        let directory = match child_digest {
            None => fetcher.get_tree_root_directory(&self.shared.tree_digest)?,
            Some(child) => fetcher.get_tree_child_directory(&self.shared.tree_digest, child)?,
        };
        Ok(directory)
    }

    fn populate(
        &self,
        directory: &TreeDirectory,
        children: &mut BTreeMap<Component, InitialNode>,
    ) -> Result<(), VfsError> {
        let function = &self.shared.digest_function;
        for node in &directory.directories {
            let name = Component::new(&node.name)?;
            let child_digest = function.new_digest_from_proto(&node.digest)?;
            let fetcher = Self {
                shared: Arc::clone(&self.shared),
                child_digest: Some(child_digest),
            };
            insert_unique(children, name, InitialNode::Directory(Arc::new(fetcher)))?;
        }
        for node in &directory.files {
            let name = Component::new(&node.name)?;
            let digest = function.new_digest_from_proto(&node.digest)?;
            let leaf = self
                .shared
                .cas_file_factory
                .lookup_file(digest, node.is_executable);
            insert_unique(children, name, InitialNode::Leaf(leaf))?;
        }
        for node in &directory.symlinks {
            let name = Component::new(&node.name)?;
            let leaf = self.shared.symlink_factory.lookup_symlink(&node.target);
            insert_unique(children, name, InitialNode::Leaf(leaf))?;
        }
        Ok(())
    }
}

fn insert_unique(
    children: &mut BTreeMap<Component, InitialNode>,
    name: Component,
    node: InitialNode,
) -> Result<(), VfsError> {
    match children.entry(name) {
        Entry::Vacant(entry) => {
            entry.insert(node);
            Ok(())
        }
        Entry::Occupied(entry) => {
            if let InitialNode::Leaf(leaf) = node {
                leaf.unlink();
            }
            Err(VfsError::InvalidDirectory(format!(
                "directory contains multiple children named {:?}",
                entry.key().as_str()
            )))
        }
    }
}

fn unlink_leaves(children: BTreeMap<Component, InitialNode>) {
    for node in children.into_values() {
        if let InitialNode::Leaf(leaf) = node {
            leaf.unlink();
        }
    }
}

impl InitialContentsFetcher for CasInitialContentsFetcher {
    fn fetch_contents(&self) -> Result<BTreeMap<Component, InitialNode>, VfsError> {
        let directory = self.directory(self.child_digest.as_ref())?;
        let mut children = BTreeMap::new();
        if let Err(error) = self.populate(&directory, &mut children) {
            unlink_leaves(children);
            return Err(error);
        }
        Ok(children)
    }

    fn containing_digests(&self) -> Result<DigestSet, VfsError> {
        let function = &self.shared.digest_function;
        let mut digests = DigestSetBuilder::new();
        digests.add(self.shared.tree_digest.clone());

        // Trees may reference the same directory under many names. Each one
        // is only loaded once.
        let mut visited = FxHashSet::default();
        let mut pending = vec![self.child_digest.clone()];
        while let Some(child_digest) = pending.pop() {
            let directory = self.directory(child_digest.as_ref())?;
            for node in &directory.files {
                digests.add(function.new_digest_from_proto(&node.digest)?);
            }
            for node in &directory.directories {
                let digest = function.new_digest_from_proto(&node.digest)?;
                if visited.insert(digest.clone()) {
                    pending.push(Some(digest));
                }
            }
        }
        Ok(digests.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cas_file::BlobAccessCasFileFactory;
    use crate::error_logger::TracingErrorLogger;
    use crate::symlink::BasicSymlinkFactory;
    use blobstore::tree::{DirectoryNode, FileNode, SymlinkNode, Tree, directory_digest, encode_tree};
    use blobstore::{BlobAccessDirectoryFetcher, MemoryBlobAccess};
    use cas_digest::{DigestFunction, InstanceName};

    struct Fixture {
        store: Arc<MemoryBlobAccess>,
        function: Function,
        tree_digest: Digest,
        file_digests: Vec<Digest>,
    }

    fn fixture(tree: impl FnOnce(&Function, &mut Vec<Digest>) -> Tree) -> Fixture {
        let function = Function::new(InstanceName::default(), DigestFunction::Sha256);
        let store = Arc::new(MemoryBlobAccess::new());
        let mut file_digests = Vec::new();
        let tree = tree(&function, &mut file_digests);
        let tree_digest = store.insert(&function, &encode_tree(&tree));
        Fixture {
            store,
            function,
            tree_digest,
            file_digests,
        }
    }

    fn fetcher(fixture: &Fixture) -> CasInitialContentsFetcher {
        let store: Arc<dyn blobstore::BlobAccess> = fixture.store.clone();
        CasInitialContentsFetcher::new(
            Arc::new(BlobAccessDirectoryFetcher::new(store.clone(), 1 << 20)),
            fixture.tree_digest.clone(),
            Arc::new(BlobAccessCasFileFactory::new(
                store,
                Arc::new(TracingErrorLogger::new("test")),
            )),
            Arc::new(BasicSymlinkFactory),
            fixture.function.clone(),
        )
    }

    fn nested_tree(function: &Function, files: &mut Vec<Digest>) -> Tree {
        let lib = function.compute(b"lib");
        let main = function.compute(b"main");
        files.extend([lib.clone(), main.clone()]);
        let child = TreeDirectory {
            files: vec![FileNode {
                name: "lib.rs".to_owned(),
                digest: lib.to_proto(),
                is_executable: false,
            }],
            ..TreeDirectory::default()
        };
        Tree {
            root: TreeDirectory {
                files: vec![FileNode {
                    name: "main".to_owned(),
                    digest: main.to_proto(),
                    is_executable: true,
                }],
                directories: vec![DirectoryNode {
                    name: "src".to_owned(),
                    digest: directory_digest(function, &child).to_proto(),
                }],
                symlinks: vec![SymlinkNode {
                    name: "link".to_owned(),
                    target: "main".to_owned(),
                }],
            },
            children: vec![child],
        }
    }

    #[test]
    fn fetch_contents_creates_lazy_children() {
        let fixture = fixture(nested_tree);
        let contents = fetcher(&fixture).fetch_contents().expect("contents");
        let names: Vec<&str> = contents.keys().map(Component::as_str).collect();
        assert_eq!(names, ["link", "main", "src"]);

        let InitialNode::Directory(src) = &contents[&Component::new("src").expect("name")] else {
            panic!("src should be a directory");
        };
        let nested = src.fetch_contents().expect("nested contents");
        assert!(nested.contains_key("lib.rs"));
    }

    #[test]
    fn containing_digests_include_tree_and_all_files() {
        let fixture = fixture(nested_tree);
        let digests = fetcher(&fixture).containing_digests().expect("digests");
        assert_eq!(digests.len(), 3);
        assert!(digests.contains(&fixture.tree_digest));
        for digest in &fixture.file_digests {
            assert!(digests.contains(digest));
        }
    }

    #[test]
    fn shared_directories_are_loaded_once() {
        const DEPTH: usize = 12;
        let fixture = fixture(|function, files| {
            let leaf = function.compute(b"leaf");
            files.push(leaf.clone());
            let mut directories = vec![TreeDirectory {
                files: vec![FileNode {
                    name: "leaf".to_owned(),
                    digest: leaf.to_proto(),
                    is_executable: false,
                }],
                ..TreeDirectory::default()
            }];
            for _ in 0..DEPTH {
                let child = directory_digest(function, &directories[0]).to_proto();
                let parent = TreeDirectory {
                    directories: ["a", "b"]
                        .into_iter()
                        .map(|name| DirectoryNode {
                            name: name.to_owned(),
                            digest: child.clone(),
                        })
                        .collect(),
                    ..TreeDirectory::default()
                };
                directories.insert(0, parent);
            }
            let root = directories.remove(0);
            Tree {
                root,
                children: directories,
            }
        });

        let digests = fetcher(&fixture).containing_digests().expect("digests");
        assert_eq!(digests.len(), 2);
        assert!(digests.contains(&fixture.file_digests[0]));
        // One read for the root and one for each distinct child directory.
        assert_eq!(fixture.store.get_calls(), DEPTH + 1);
    }

    #[test]
    fn missing_tree_is_reported_as_blob_not_found() {
        let fixture = fixture(nested_tree);
        fixture.store.remove(&fixture.tree_digest);
        let error = fetcher(&fixture)
            .containing_digests()
            .expect_err("tree is gone");
        assert!(error.is_blob_not_found());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let fixture = fixture(|function, _| Tree {
            root: TreeDirectory {
                files: vec![FileNode {
                    name: "x".to_owned(),
                    digest: function.compute(b"x").to_proto(),
                    is_executable: false,
                }],
                symlinks: vec![SymlinkNode {
                    name: "x".to_owned(),
                    target: "y".to_owned(),
                }],
                ..TreeDirectory::default()
            },
            children: Vec::new(),
        });
        assert!(matches!(
            fetcher(&fixture).fetch_contents(),
            Err(VfsError::InvalidDirectory(_))
        ));
    }
}
