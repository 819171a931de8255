use std::fmt;

use crate::component::Component;
use crate::walker::{ComponentWalker, GotDirectoryOrSymlink, GotSymlink};

#[derive(Clone, Debug)]
enum Entry {
    Name { name: Component, reversible: bool },
    Up,
}

/// Records the path that a wrapped walker actually resolved.
///
/// Absolute scopes reset the recorded path to `/`. Directories and terminals
/// append their name, while symbolic links append nothing, as their targets
/// are recorded in their place. `..` drops the last component when the walker
/// marked it reversible and is recorded literally otherwise.
#[derive(Debug)]
pub struct Builder<W> {
    inner: W,
    absolute: bool,
    entries: Vec<Entry>,
}

impl<W> Builder<W> {
    /// Wraps `inner`, starting from the empty relative path.
    pub const fn new(inner: W) -> Self {
        Self {
            inner,
            absolute: false,
            entries: Vec::new(),
        }
    }

    /// Returns the wrapped walker.
    pub const fn inner(&self) -> &W {
        &self.inner
    }

    /// Returns the wrapped walker mutably.
    pub const fn inner_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Unwraps the walker.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Reports whether the recorded path is absolute.
    #[must_use]
    pub const fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Returns the recorded names, or `None` if a `..` could not be
    /// cancelled against a preceding component.
    pub(crate) fn into_components(self) -> Option<Vec<Component>> {
        self.entries
            .into_iter()
            .map(|entry| match entry {
                Entry::Name { name, .. } => Some(name),
                Entry::Up => None,
            })
            .collect()
    }

    fn push_name(&mut self, name: &Component, reversible: bool) {
        self.entries.push(Entry::Name {
            name: name.clone(),
            reversible,
        });
    }
}

impl<W: ComponentWalker> ComponentWalker for Builder<W> {
    type Error = W::Error;

    fn on_scope(&mut self, absolute: bool) -> Result<(), Self::Error> {
        self.inner.on_scope(absolute)?;
        if absolute {
            self.absolute = true;
            self.entries.clear();
        }
        Ok(())
    }

    fn on_directory(&mut self, name: &Component) -> Result<GotDirectoryOrSymlink, Self::Error> {
        let outcome = self.inner.on_directory(name)?;
        if let GotDirectoryOrSymlink::Directory { reversible } = outcome {
            self.push_name(name, reversible);
        }
        Ok(outcome)
    }

    fn on_terminal(&mut self, name: &Component) -> Result<Option<GotSymlink>, Self::Error> {
        let outcome = self.inner.on_terminal(name)?;
        if outcome.is_none() {
            self.push_name(name, true);
        }
        Ok(outcome)
    }

    fn on_up(&mut self) -> Result<(), Self::Error> {
        self.inner.on_up()?;
        match self.entries.last() {
            Some(Entry::Name {
                reversible: true, ..
            }) => {
                self.entries.pop();
            }
            None if self.absolute => {}
            _ => self.entries.push(Entry::Up),
        }
        Ok(())
    }
}

impl<W> fmt::Display for Builder<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            f.write_str("/")?;
        } else if self.entries.is_empty() {
            return f.write_str(".");
        }
        for (index, entry) in self.entries.iter().enumerate() {
            if index > 0 {
                f.write_str("/")?;
            }
            match entry {
                Entry::Name { name, .. } => f.write_str(name.as_str())?,
                Entry::Up => f.write_str("..")?,
            }
        }
        Ok(())
    }
}
