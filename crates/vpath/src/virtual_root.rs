use std::collections::BTreeMap;

use crate::component::Component;
use crate::error::ResolveError;
use crate::resolver::{resolve_absolute, resolve_relative};
use crate::walker::{ComponentWalker, GotDirectoryOrSymlink, GotSymlink};

#[derive(Debug)]
enum NodeKind {
    Intermediate,
    Root,
    Alias(String),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    children: BTreeMap<Component, usize>,
}

impl Node {
    const fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            children: BTreeMap::new(),
        }
    }
}

/// Maps absolute paths onto a tree mounted at a fixed location.
///
/// The factory holds a trie of the mount location and of any aliases that
/// refer to it. Walkers created by [`VirtualRootFactory::new_walker`] hand
/// relative paths straight to the inner walker. Absolute paths are matched
/// against the trie: reaching the mount location enters the tree, reaching an
/// alias behaves like a symbolic link into the tree, and anything else lies
/// outside and is only recorded.
#[derive(Debug)]
pub struct VirtualRootFactory {
    root_path: String,
    nodes: Vec<Node>,
}

impl VirtualRootFactory {
    /// Creates a factory for a tree mounted at `root_path`.
    ///
    /// `aliases` maps absolute alias paths to paths relative to the mount
    /// location. Aliases may not be equal to, lie beneath, contain, or
    /// overlap with the mount location or each other.
    pub fn new(root_path: &str, aliases: &BTreeMap<String, String>) -> Result<Self, ResolveError> {
        let root = resolve_absolute(root_path)?;
        let root_path = render_absolute(&root);
        let mut factory = Self {
            root_path,
            nodes: vec![Node::new(NodeKind::Intermediate)],
        };
        factory
            .insert(&root, NodeKind::Root)
            .map_err(|reason| ResolveError::InvalidAlias {
                alias: render_absolute(&root),
                reason,
            })?;

        for (alias, target) in aliases {
            let invalid = |reason| ResolveError::InvalidAlias {
                alias: alias.clone(),
                reason,
            };
            let components =
                resolve_absolute(alias).map_err(|_| invalid("alias must be an absolute path"))?;
            if components == root {
                return Err(invalid("alias is equal to the root"));
            }
            if components.starts_with(&root) {
                return Err(invalid("alias lies beneath the root"));
            }
            if root.starts_with(&components) {
                return Err(invalid("alias contains the root"));
            }
            let target = resolve_relative(target)
                .map_err(|_| invalid("alias target must be a relative path"))?;
            let target = if target == "." {
                factory.root_path.clone()
            } else {
                format!("{}/{}", factory.root_path, target)
            };
            factory
                .insert(&components, NodeKind::Alias(target))
                .map_err(invalid)?;
        }
        Ok(factory)
    }

    /// Returns the normalized mount location.
    #[must_use]
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// Wraps `inner`, which resolves paths relative to the mount location.
    pub const fn new_walker<W>(&self, inner: W) -> VirtualRootWalker<'_, W> {
        VirtualRootWalker {
            factory: self,
            inner,
            mode: Mode::Inside,
        }
    }

    fn insert(&mut self, path: &[Component], kind: NodeKind) -> Result<(), &'static str> {
        let mut current = 0;
        for name in path {
            if !matches!(self.nodes[current].kind, NodeKind::Intermediate) {
                return Err("alias overlaps with another alias");
            }
            current = match self.nodes[current].children.get(name) {
                Some(&child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(Node::new(NodeKind::Intermediate));
                    self.nodes[current].children.insert(name.clone(), child);
                    child
                }
            };
        }
        let node = &mut self.nodes[current];
        if !matches!(node.kind, NodeKind::Intermediate) || !node.children.is_empty() {
            return Err("alias overlaps with another alias");
        }
        node.kind = kind;
        Ok(())
    }
}

fn render_absolute(components: &[Component]) -> String {
    let mut rendered = String::new();
    for component in components {
        rendered.push('/');
        rendered.push_str(component.as_str());
    }
    if rendered.is_empty() {
        rendered.push('/');
    }
    rendered
}

#[derive(Debug)]
enum Mode {
    Inside,
    Outside {
        stack: Vec<usize>,
        unknown_depth: usize,
    },
}

/// Walker created by [`VirtualRootFactory::new_walker`].
#[derive(Debug)]
pub struct VirtualRootWalker<'a, W> {
    factory: &'a VirtualRootFactory,
    inner: W,
    mode: Mode,
}

enum Matched {
    Root,
    Alias(String),
    Other,
}

impl<W> VirtualRootWalker<'_, W> {
    /// Returns the inner walker.
    pub const fn inner(&self) -> &W {
        &self.inner
    }

    /// Unwraps the inner walker.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn step_outside(&mut self, name: &Component) -> Option<Matched> {
        let Mode::Outside {
            stack,
            unknown_depth,
        } = &mut self.mode
        else {
            return None;
        };
        if *unknown_depth > 0 {
            *unknown_depth += 1;
            return Some(Matched::Other);
        }
        let current = stack.last().copied().unwrap_or(0);
        match self.factory.nodes[current].children.get(name) {
            None => {
                *unknown_depth = 1;
                Some(Matched::Other)
            }
            Some(&child) => match &self.factory.nodes[child].kind {
                NodeKind::Root => Some(Matched::Root),
                NodeKind::Alias(target) => Some(Matched::Alias(target.clone())),
                NodeKind::Intermediate => {
                    stack.push(child);
                    Some(Matched::Other)
                }
            },
        }
    }
}

impl<W: ComponentWalker> ComponentWalker for VirtualRootWalker<'_, W> {
    type Error = W::Error;

    fn on_scope(&mut self, absolute: bool) -> Result<(), Self::Error> {
        if absolute {
            self.mode = Mode::Outside {
                stack: vec![0],
                unknown_depth: 0,
            };
            return Ok(());
        }
        match self.mode {
            Mode::Inside => self.inner.on_scope(false),
            Mode::Outside { .. } => Ok(()),
        }
    }

    fn on_directory(&mut self, name: &Component) -> Result<GotDirectoryOrSymlink, Self::Error> {
        match self.step_outside(name) {
            None => self.inner.on_directory(name),
            Some(Matched::Root) => {
                self.mode = Mode::Inside;
                self.inner.on_scope(true)?;
                Ok(GotDirectoryOrSymlink::Directory { reversible: false })
            }
            Some(Matched::Alias(target)) => {
                Ok(GotDirectoryOrSymlink::Symlink(GotSymlink { target }))
            }
            Some(Matched::Other) => Ok(GotDirectoryOrSymlink::Directory { reversible: false }),
        }
    }

    fn on_terminal(&mut self, name: &Component) -> Result<Option<GotSymlink>, Self::Error> {
        match self.step_outside(name) {
            None => self.inner.on_terminal(name),
            Some(Matched::Root) => {
                self.mode = Mode::Inside;
                self.inner.on_scope(true)?;
                Ok(None)
            }
            Some(Matched::Alias(target)) => Ok(Some(GotSymlink { target })),
            Some(Matched::Other) => Ok(None),
        }
    }

    fn on_up(&mut self) -> Result<(), Self::Error> {
        match &mut self.mode {
            Mode::Inside => self.inner.on_up(),
            Mode::Outside {
                stack,
                unknown_depth,
            } => {
                if *unknown_depth > 0 {
                    *unknown_depth -= 1;
                } else if stack.len() > 1 {
                    stack.pop();
                }
                Ok(())
            }
        }
    }
}
