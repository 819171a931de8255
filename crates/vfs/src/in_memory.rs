use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::SystemTime;

use vpath::Component;

use crate::attributes::{
    Attributes, AttributesMask, EMPTY_DIRECTORY_LINK_COUNT, FileType, Permissions,
};
use crate::error::VfsError;
use crate::node::{
    ChildRemover, Directory, DirectoryChild, DirectoryEntryReporter, InitialContentsFetcher,
    InitialNode, Leaf, OpenExistingOptions, PrepopulatedDirectory, PrepopulatedDirectoryChild,
    read_only_open_child_doesnt_exist, read_only_open_child_wrong_file_type,
};

#[derive(Clone)]
enum Node {
    Directory(Arc<InMemoryPrepopulatedDirectory>),
    Leaf(Arc<dyn Leaf>),
}

impl Node {
    fn from_initial(node: InitialNode) -> Self {
        match node {
            InitialNode::Directory(fetcher) => {
                Self::Directory(InMemoryPrepopulatedDirectory::with_fetcher(fetcher))
            }
            InitialNode::Leaf(leaf) => Self::Leaf(leaf),
        }
    }

    /// Tears down a node that has been detached from its parent.
    fn release(self) -> Result<(), VfsError> {
        match self {
            Self::Directory(directory) => directory.remove_all_children(true),
            Self::Leaf(leaf) => {
                leaf.unlink();
                Ok(())
            }
        }
    }

    fn attributes(&self, requested: AttributesMask) -> (DirectoryChild, Attributes) {
        let mut attributes = Attributes::default();
        let child = match self {
            Self::Directory(directory) => {
                directory.virtual_get_attributes(requested, &mut attributes);
                DirectoryChild::Directory(directory.clone())
            }
            Self::Leaf(leaf) => {
                leaf.virtual_get_attributes(requested, &mut attributes);
                DirectoryChild::Leaf(leaf.clone())
            }
        };
        (child, attributes)
    }
}

struct Entry {
    cookie: u64,
    node: Node,
}

struct State {
    children: BTreeMap<Component, Entry>,
    pending: Option<Arc<dyn InitialContentsFetcher>>,
    next_cookie: u64,
    forbid_new_children: bool,
    change_id: u64,
    last_modified: SystemTime,
}

impl State {
    fn new(pending: Option<Arc<dyn InitialContentsFetcher>>) -> Self {
        Self {
            children: BTreeMap::new(),
            pending,
            next_cookie: 0,
            forbid_new_children: false,
            change_id: 0,
            last_modified: SystemTime::now(),
        }
    }

    fn insert(&mut self, name: Component, node: Node) -> Option<Node> {
        let cookie = self.next_cookie;
        self.next_cookie += 1;
        self.children
            .insert(name, Entry { cookie, node })
            .map(|entry| entry.node)
    }

    fn touch(&mut self) {
        self.change_id += 1;
        self.last_modified = SystemTime::now();
    }
}

/// Directory held entirely in memory, optionally populated lazily from an
/// [`InitialContentsFetcher`].
///
/// Children are enumerated in insertion order. Each insertion is assigned a
/// fresh cookie, which is also how removers recognise that the child they
/// were created for has since been replaced.
pub struct InMemoryPrepopulatedDirectory {
    this: Weak<Self>,
    state: Mutex<State>,
}

impl InMemoryPrepopulatedDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::build(None)
    }

    /// Creates a directory whose contents are fetched on first access.
    #[must_use]
    pub fn with_fetcher(fetcher: Arc<dyn InitialContentsFetcher>) -> Arc<Self> {
        Self::build(Some(fetcher))
    }

    fn build(pending: Option<Arc<dyn InitialContentsFetcher>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            state: Mutex::new(State::new(pending)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the state once the initial contents are present.
    ///
    /// The fetcher runs without the lock held, and a failed fetch is retried
    /// on the next access. If another caller installed the contents or
    /// removed the directory's contents while fetching, the fetched nodes
    /// are discarded.
    fn lock_loaded(&self) -> Result<MutexGuard<'_, State>, VfsError> {
        let state = self.lock();
        let Some(fetcher) = state.pending.clone() else {
            return Ok(state);
        };
        drop(state);

        let initial = fetcher.fetch_contents()?;
        let mut state = self.lock();
        if state.pending.take().is_some() {
            for (name, node) in initial {
                state.insert(name, Node::from_initial(node));
            }
            return Ok(state);
        }
        drop(state);
        for node in initial.into_values() {
            if let InitialNode::Leaf(leaf) = node {
                leaf.unlink();
            }
        }
        Ok(self.lock())
    }

    fn lookup_node(&self, name: &Component) -> Result<Node, VfsError> {
        self.lock_loaded()?
            .children
            .get(name)
            .map(|entry| entry.node.clone())
            .ok_or(VfsError::NoEntry)
    }

    fn pending_fetcher(&self) -> Option<Arc<dyn InitialContentsFetcher>> {
        self.lock().pending.clone()
    }

    fn remover(&self, name: Component, cookie: u64) -> ChildRemover {
        let parent = self.this.clone();
        Arc::new(move || match parent.upgrade() {
            Some(parent) => parent.remove_child_if_unchanged(&name, cookie),
            None => Ok(false),
        })
    }

    fn remove_child_if_unchanged(&self, name: &Component, cookie: u64) -> Result<bool, VfsError> {
        let mut state = self.lock();
        if !state
            .children
            .get(name)
            .is_some_and(|entry| entry.cookie == cookie)
        {
            return Ok(false);
        }
        let removed = state.children.remove(name);
        state.touch();
        drop(state);
        match removed {
            Some(entry) => entry.node.release().map(|()| true),
            None => Ok(false),
        }
    }

    fn filter_children_inner(
        &self,
        callback: &mut dyn FnMut(InitialNode, ChildRemover) -> bool,
    ) -> Result<bool, VfsError> {
        let snapshot: Vec<(Component, u64, Node)> = {
            let state = self.lock_loaded()?;
            state
                .children
                .iter()
                .map(|(name, entry)| (name.clone(), entry.cookie, entry.node.clone()))
                .collect()
        };
        for (name, cookie, node) in snapshot {
            let remover = self.remover(name, cookie);
            let keep_going = match node {
                Node::Leaf(leaf) => callback(InitialNode::Leaf(leaf), remover),
                Node::Directory(directory) => match directory.pending_fetcher() {
                    Some(fetcher) => callback(InitialNode::Directory(fetcher), remover),
                    None => directory.filter_children_inner(callback)?,
                },
            };
            if !keep_going {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl fmt::Debug for InMemoryPrepopulatedDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("InMemoryPrepopulatedDirectory")
            .field("children", &state.children.keys().collect::<Vec<_>>())
            .field("initialized", &state.pending.is_none())
            .field("change_id", &state.change_id)
            .finish()
    }
}

impl Directory for InMemoryPrepopulatedDirectory {
    fn virtual_get_attributes(&self, _requested: AttributesMask, attributes: &mut Attributes) {
        let state = self.lock();
        let subdirectories = state
            .children
            .values()
            .filter(|entry| matches!(entry.node, Node::Directory(_)))
            .count();
        attributes
            .set_file_type(FileType::Directory)
            .set_permissions(Permissions::READ | Permissions::WRITE | Permissions::EXECUTE)
            .set_size_bytes(0)
            .set_change_id(state.change_id)
            .set_link_count(
                EMPTY_DIRECTORY_LINK_COUNT
                    .saturating_add(u32::try_from(subdirectories).unwrap_or(u32::MAX)),
            )
            .set_last_data_modification_time(state.last_modified);
    }

    fn virtual_lookup(
        &self,
        name: &Component,
        requested: AttributesMask,
        attributes: &mut Attributes,
    ) -> Result<DirectoryChild, VfsError> {
        let (child, child_attributes) = self.lookup_node(name)?.attributes(requested);
        *attributes = child_attributes;
        Ok(child)
    }

    fn virtual_open_child(
        &self,
        name: &Component,
        create: Option<&Attributes>,
        existing: Option<&OpenExistingOptions>,
    ) -> Result<Arc<dyn Leaf>, VfsError> {
        match self.lookup_node(name) {
            Ok(Node::Leaf(leaf)) if existing.is_some() => Ok(leaf),
            Ok(Node::Leaf(_)) => Err(VfsError::Exists),
            Ok(Node::Directory(_)) => Err(read_only_open_child_wrong_file_type(
                existing,
                VfsError::IsDirectory,
            )),
            Err(VfsError::NoEntry) => Err(read_only_open_child_doesnt_exist(create)),
            Err(error) => Err(error),
        }
    }

    fn virtual_read_dir(
        &self,
        first_cookie: u64,
        requested: AttributesMask,
        reporter: &mut dyn DirectoryEntryReporter,
    ) -> Result<(), VfsError> {
        let mut entries: Vec<(u64, Component, Node)> = {
            let state = self.lock_loaded()?;
            state
                .children
                .iter()
                .filter(|(_, entry)| entry.cookie >= first_cookie)
                .map(|(name, entry)| (entry.cookie, name.clone(), entry.node.clone()))
                .collect()
        };
        entries.sort_by_key(|(cookie, _, _)| *cookie);
        for (cookie, name, node) in entries {
            let (child, attributes) = node.attributes(requested);
            if !reporter.report_entry(cookie + 1, &name, child, &attributes) {
                break;
            }
        }
        Ok(())
    }
}

impl PrepopulatedDirectory for InMemoryPrepopulatedDirectory {
    fn lookup_child(&self, name: &Component) -> Result<PrepopulatedDirectoryChild, VfsError> {
        Ok(match self.lookup_node(name)? {
            Node::Directory(directory) => PrepopulatedDirectoryChild::Directory(directory),
            Node::Leaf(leaf) => PrepopulatedDirectoryChild::Leaf(leaf),
        })
    }

    fn create_and_enter_directory(
        &self,
        name: &Component,
    ) -> Result<Arc<dyn PrepopulatedDirectory>, VfsError> {
        let mut state = self.lock_loaded()?;
        if let Some(Entry {
            node: Node::Directory(directory),
            ..
        }) = state.children.get(name)
        {
            return Ok(directory.clone());
        }
        if state.forbid_new_children {
            return Err(VfsError::NoEntry);
        }
        let directory = Self::new();
        let replaced = state.insert(name.clone(), Node::Directory(directory.clone()));
        state.touch();
        drop(state);
        if let Some(node) = replaced {
            node.release()?;
        }
        Ok(directory)
    }

    fn create_children(
        &self,
        children: BTreeMap<Component, InitialNode>,
        overwrite: bool,
    ) -> Result<(), VfsError> {
        let mut state = self.lock_loaded()?;
        if state.forbid_new_children {
            return Err(VfsError::NoEntry);
        }
        if !overwrite && children.keys().any(|name| state.children.contains_key(name)) {
            return Err(VfsError::Exists);
        }
        let mut replaced = Vec::new();
        for (name, node) in children {
            replaced.extend(state.insert(name, Node::from_initial(node)));
        }
        state.touch();
        drop(state);
        for node in replaced {
            node.release()?;
        }
        Ok(())
    }

    fn remove_all_children(&self, forbid_new_children: bool) -> Result<(), VfsError> {
        let mut state = self.lock();
        let had_contents = state.pending.take().is_some() || !state.children.is_empty();
        let removed = std::mem::take(&mut state.children);
        if forbid_new_children {
            state.forbid_new_children = true;
        }
        if had_contents {
            state.touch();
        }
        drop(state);
        for entry in removed.into_values() {
            entry.node.release()?;
        }
        Ok(())
    }

    fn filter_children(
        &self,
        callback: &mut dyn FnMut(InitialNode, ChildRemover) -> bool,
    ) -> Result<(), VfsError> {
        self.filter_children_inner(callback).map(|_| ())
    }
}
