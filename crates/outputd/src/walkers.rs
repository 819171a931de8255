//! Component walkers that resolve paths against an output path.
//!
//! Creating walkers mutate the tree as they go: every directory component is
//! created unless it already exists, replacing any file in its way. They
//! refuse to leave the directory they started in. The stat walker only
//! observes. Leaving the output path is not an error for it, but makes the
//! result [`FileStatus::External`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use cas_digest::Function;
use vfs::{
    Attributes, AttributesMask, Directory, FileStatus, InitialNode, PrepopulatedDirectory,
    PrepopulatedDirectoryChild, VfsError,
};
use vpath::{Component, ComponentWalker, GotDirectoryOrSymlink, GotSymlink, RelativeWalker};

use crate::error::{ServiceError, WrapErr};

/// The directories entered so far, starting at the directory the walk began
/// in. Never empty.
#[derive(Clone)]
pub(crate) struct DirectoryStack {
    root: Arc<dyn PrepopulatedDirectory>,
    descendants: Vec<Arc<dyn PrepopulatedDirectory>>,
}

impl DirectoryStack {
    pub(crate) const fn new(root: Arc<dyn PrepopulatedDirectory>) -> Self {
        Self {
            root,
            descendants: Vec::new(),
        }
    }

    pub(crate) fn peek(&self) -> &Arc<dyn PrepopulatedDirectory> {
        self.descendants.last().unwrap_or(&self.root)
    }

    fn push(&mut self, directory: Arc<dyn PrepopulatedDirectory>) {
        self.descendants.push(directory);
    }

    /// Returns false if the stack only holds the directory the walk began in.
    fn pop(&mut self) -> bool {
        self.descendants.pop().is_some()
    }

    fn pop_all(&mut self) {
        self.descendants.clear();
    }
}

/// Creates every directory along a path.
pub(crate) struct DirectoryCreatingWalker {
    stack: DirectoryStack,
}

impl DirectoryCreatingWalker {
    pub(crate) const fn new(stack: DirectoryStack) -> Self {
        Self { stack }
    }

    pub(crate) fn into_stack(self) -> DirectoryStack {
        self.stack
    }

    fn create_and_enter(&mut self, name: &Component) -> Result<(), ServiceError> {
        let child = self.stack.peek().create_and_enter_directory(name)?;
        self.stack.push(child);
        Ok(())
    }
}

impl ComponentWalker for DirectoryCreatingWalker {
    type Error = ServiceError;

    fn on_scope(&mut self, _absolute: bool) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_directory(&mut self, name: &Component) -> Result<GotDirectoryOrSymlink, Self::Error> {
        self.create_and_enter(name)?;
        Ok(GotDirectoryOrSymlink::Directory { reversible: true })
    }

    fn on_terminal(&mut self, name: &Component) -> Result<Option<GotSymlink>, Self::Error> {
        self.create_and_enter(name)?;
        Ok(None)
    }

    fn on_up(&mut self) -> Result<(), Self::Error> {
        if self.stack.pop() {
            Ok(())
        } else {
            Err(ServiceError::invalid_argument(
                "Path resolves to a location outside the output path",
            ))
        }
    }
}

/// Creates the parent directories of a path and records its final component.
pub(crate) struct ParentDirectoryCreatingWalker {
    directories: DirectoryCreatingWalker,
    terminal: Option<Component>,
}

impl ComponentWalker for ParentDirectoryCreatingWalker {
    type Error = ServiceError;

    fn on_scope(&mut self, absolute: bool) -> Result<(), Self::Error> {
        self.directories.on_scope(absolute)
    }

    fn on_directory(&mut self, name: &Component) -> Result<GotDirectoryOrSymlink, Self::Error> {
        self.directories.on_directory(name)
    }

    fn on_terminal(&mut self, name: &Component) -> Result<Option<GotSymlink>, Self::Error> {
        self.terminal = Some(name.clone());
        Ok(None)
    }

    fn on_up(&mut self) -> Result<(), Self::Error> {
        self.directories.on_up()
    }
}

/// Resolves the relative `path` below the top of `stack`, creating parent
/// directories as needed, and places `node` at its final component. Anything
/// already present under that name is replaced.
pub(crate) fn create_child(
    stack: &DirectoryStack,
    path: &str,
    node: InitialNode,
) -> Result<(), ServiceError> {
    let mut walker = ParentDirectoryCreatingWalker {
        directories: DirectoryCreatingWalker::new(stack.clone()),
        terminal: None,
    };
    vpath::resolve(path, &mut RelativeWalker(&mut walker))
        .wrap_err(|| "Failed to resolve path")?;
    let Some(name) = walker.terminal else {
        return Err(ServiceError::invalid_argument("Path resolves to a directory"));
    };
    let parent = walker.directories.into_stack();
    parent
        .peek()
        .create_children(BTreeMap::from([(name, node)]), true)?;
    Ok(())
}

#[derive(Debug)]
enum StatOutcome {
    Directory,
    External,
    Leaf(FileStatus),
}

/// Resolves a path without modifying the tree, recording what it resolves
/// to.
pub(crate) struct StatWalker {
    stack: DirectoryStack,
    digest_function: Option<Function>,
    follow_symlinks: bool,
    outcome: StatOutcome,
    left_output_path: bool,
}

impl StatWalker {
    /// `digest_function` is passed on to files, which report their digest
    /// only when it is set.
    pub(crate) const fn new(
        root: Arc<dyn PrepopulatedDirectory>,
        digest_function: Option<Function>,
        follow_symlinks: bool,
    ) -> Self {
        Self {
            stack: DirectoryStack::new(root),
            digest_function,
            follow_symlinks,
            outcome: StatOutcome::External,
            left_output_path: false,
        }
    }

    /// Converts the outcome of the walk into a status. `next_path` is the
    /// resolved path, reported for locations outside the output path.
    pub(crate) fn into_status(self, next_path: String) -> FileStatus {
        match self.outcome {
            StatOutcome::Directory => {
                let mut attributes = Attributes::default();
                self.stack.peek().virtual_get_attributes(
                    AttributesMask::LAST_DATA_MODIFICATION_TIME,
                    &mut attributes,
                );
                FileStatus::Directory {
                    last_modified_time: attributes
                        .last_data_modification_time()
                        .unwrap_or(UNIX_EPOCH),
                }
            }
            StatOutcome::External => FileStatus::External { next_path },
            StatOutcome::Leaf(status) => status,
        }
    }
}

impl ComponentWalker for StatWalker {
    type Error = VfsError;

    fn on_scope(&mut self, absolute: bool) -> Result<(), Self::Error> {
        if self.left_output_path {
            return Ok(());
        }
        if absolute {
            self.stack.pop_all();
        }
        self.outcome = StatOutcome::Directory;
        Ok(())
    }

    fn on_directory(&mut self, name: &Component) -> Result<GotDirectoryOrSymlink, Self::Error> {
        if self.left_output_path {
            return Ok(GotDirectoryOrSymlink::Directory { reversible: false });
        }
        match self.stack.peek().lookup_child(name)? {
            PrepopulatedDirectoryChild::Directory(directory) => {
                self.stack.push(directory);
                Ok(GotDirectoryOrSymlink::Directory { reversible: true })
            }
            PrepopulatedDirectoryChild::Leaf(leaf) => match leaf.readlink() {
                Ok(target) => {
                    self.outcome = StatOutcome::External;
                    Ok(GotDirectoryOrSymlink::Symlink(GotSymlink { target }))
                }
                Err(VfsError::NotSymlink) => Err(VfsError::NotDirectory),
                Err(error) => Err(error),
            },
        }
    }

    fn on_terminal(&mut self, name: &Component) -> Result<Option<GotSymlink>, Self::Error> {
        if self.left_output_path {
            return Ok(None);
        }
        let leaf = match self.stack.peek().lookup_child(name)? {
            PrepopulatedDirectoryChild::Directory(directory) => {
                self.stack.push(directory);
                return Ok(None);
            }
            PrepopulatedDirectoryChild::Leaf(leaf) => leaf,
        };
        if self.follow_symlinks {
            match leaf.readlink() {
                Ok(target) => {
                    self.outcome = StatOutcome::External;
                    return Ok(Some(GotSymlink { target }));
                }
                Err(VfsError::NotSymlink) => {}
                Err(error) => return Err(error),
            }
        }
        let status = leaf.output_service_file_status(self.digest_function.as_ref())?;
        self.outcome = StatOutcome::Leaf(status);
        Ok(None)
    }

    fn on_up(&mut self) -> Result<(), Self::Error> {
        if !self.left_output_path && !self.stack.pop() {
            self.outcome = StatOutcome::External;
            self.left_output_path = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;
    use blobstore::MemoryBlobAccess;
    use cas_digest::{DigestFunction, InstanceName};
    use vfs::{
        BasicSymlinkFactory, BlobAccessCasFileFactory, CasFileFactory, DirectoryChild,
        InMemoryPrepopulatedDirectory, SymlinkFactory, TracingErrorLogger,
    };
    use vpath::{Builder, VirtualRootFactory};

    fn name(value: &str) -> Component {
        Component::new(value).expect("valid component")
    }

    fn symlink(target: &str) -> InitialNode {
        InitialNode::Leaf(BasicSymlinkFactory.lookup_symlink(target))
    }

    fn stack() -> (Arc<InMemoryPrepopulatedDirectory>, DirectoryStack) {
        let root = InMemoryPrepopulatedDirectory::new();
        let stack = DirectoryStack::new(root.clone());
        (root, stack)
    }

    fn stat(
        root: &Arc<InMemoryPrepopulatedDirectory>,
        path: &str,
        follow_symlinks: bool,
    ) -> Result<FileStatus, VfsError> {
        let factory =
            VirtualRootFactory::new("/home/user/ob1", &BTreeMap::new()).expect("virtual root");
        let mut walker = Builder::new(factory.new_walker(StatWalker::new(
            root.clone(),
            None,
            follow_symlinks,
        )));
        vpath::resolve(path, &mut walker)?;
        let next_path = walker.to_string();
        Ok(walker.into_inner().into_inner().into_status(next_path))
    }

    #[test]
    fn create_child_creates_parent_directories() {
        let (root, stack) = stack();
        create_child(&stack, "a/b/link", symlink("target")).expect("create");

        let PrepopulatedDirectoryChild::Directory(a) = root.lookup_child(&name("a")).expect("a")
        else {
            panic!("a should be a directory");
        };
        let PrepopulatedDirectoryChild::Directory(b) = a.lookup_child(&name("b")).expect("b")
        else {
            panic!("b should be a directory");
        };
        let PrepopulatedDirectoryChild::Leaf(link) = b.lookup_child(&name("link")).expect("link")
        else {
            panic!("link should be a leaf");
        };
        assert_eq!(link.readlink().expect("readlink"), "target");
    }

    #[test]
    fn create_child_replaces_files_in_the_way() {
        let (root, stack) = stack();
        create_child(&stack, "a", symlink("old")).expect("create file");
        create_child(&stack, "a/b", symlink("new")).expect("create below file");
        assert!(matches!(
            root.lookup_child(&name("a")),
            Ok(PrepopulatedDirectoryChild::Directory(_))
        ));
    }

    #[test]
    fn create_child_rejects_directories_and_escapes() {
        let (_root, stack) = stack();
        for path in ["", "a/", "a/.", "a/b/.."] {
            let error = create_child(&stack, path, symlink("x")).expect_err(path);
            assert_eq!(error.code(), Code::InvalidArgument);
            assert_eq!(error.message(), "Path resolves to a directory", "{path}");
        }

        let error = create_child(&stack, "../x", symlink("x")).expect_err("escape");
        assert_eq!(
            error.message(),
            "Failed to resolve path: Path resolves to a location outside the output path"
        );
        let error = create_child(&stack, "/x", symlink("x")).expect_err("absolute");
        assert_eq!(error.code(), Code::InvalidArgument);
    }

    #[test]
    fn directory_creating_walker_stays_within_its_start() {
        let (root, stack) = stack();
        let mut walker = DirectoryCreatingWalker::new(stack);
        vpath::resolve("x/y/../z", &mut RelativeWalker(&mut walker)).expect("resolve");
        let top = walker.into_stack();

        let mut attributes = Attributes::default();
        root.virtual_get_attributes(AttributesMask::ALL, &mut attributes);
        assert_eq!(attributes.link_count(), Some(3));
        let DirectoryChild::Directory(_) = root
            .virtual_lookup(&name("x"), AttributesMask::NONE, &mut attributes)
            .expect("x")
        else {
            panic!("x should be a directory");
        };

        let mut escaping = DirectoryCreatingWalker::new(top);
        let error =
            vpath::resolve("../../..", &mut RelativeWalker(&mut escaping)).expect_err("escape");
        assert_eq!(error.code(), Code::InvalidArgument);
    }

    #[test]
    fn stat_reports_directories_and_leaves() {
        let (root, stack) = stack();
        create_child(&stack, "out/link", symlink("../bin")).expect("create");

        assert!(matches!(
            stat(&root, "out", false).expect("stat"),
            FileStatus::Directory { .. }
        ));
        assert_eq!(
            stat(&root, "out/link", false).expect("stat"),
            FileStatus::Symlink {
                target: "../bin".to_owned()
            }
        );
        assert_eq!(stat(&root, "out/missing", false), Err(VfsError::NoEntry));
    }

    #[test]
    fn stat_follows_symlinks_out_of_the_tree() {
        let (root, stack) = stack();
        create_child(&stack, "out/up", symlink("../../lib")).expect("create");
        create_child(&stack, "out/abs", symlink("/usr/lib")).expect("create");
        create_child(&stack, "out/beyond", symlink("../../x/../y")).expect("create");

        assert_eq!(
            stat(&root, "out/up", true).expect("stat"),
            FileStatus::External {
                next_path: "../lib".to_owned()
            }
        );
        assert_eq!(
            stat(&root, "out/abs/libc.so", false).expect("stat"),
            FileStatus::External {
                next_path: "/usr/lib/libc.so".to_owned()
            }
        );
        assert_eq!(
            stat(&root, "out/beyond", true).expect("stat"),
            FileStatus::External {
                next_path: "../x/../y".to_owned()
            }
        );
    }

    #[test]
    fn stat_rejects_files_used_as_directories() {
        let (root, stack) = stack();
        let files = BlobAccessCasFileFactory::new(
            Arc::new(MemoryBlobAccess::new()),
            Arc::new(TracingErrorLogger::new("ob1")),
        );
        let sha256 = Function::new(InstanceName::default(), DigestFunction::Sha256);
        let digest = sha256.compute(b"data");
        create_child(
            &stack,
            "dir/file",
            InitialNode::Leaf(files.lookup_file(digest, true)),
        )
        .expect("create");

        assert_eq!(
            stat(&root, "dir/file/inner", false),
            Err(VfsError::NotDirectory)
        );
        assert_eq!(
            stat(&root, "dir/file", false),
            Ok(FileStatus::File {
                digest: None,
                is_executable: true
            })
        );
    }
}
