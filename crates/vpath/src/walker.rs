use crate::component::Component;
use crate::error::ResolveError;

/// A symbolic link reported by a walker, to be expanded by the resolver.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GotSymlink {
    /// Literal target of the symbolic link.
    pub target: String,
}

/// Outcome of stepping into a non-terminal component.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GotDirectoryOrSymlink {
    /// The component is a directory that has been entered.
    Directory {
        /// Whether a subsequent `..` may be resolved lexically by dropping
        /// this component again.
        reversible: bool,
    },
    /// The component is a symbolic link that must be expanded first.
    Symlink(GotSymlink),
}

/// Capability set through which [`resolve`](crate::resolve) drives a
/// traversal.
pub trait ComponentWalker {
    /// Error type returned by the walker.
    type Error: From<ResolveError>;

    /// Called before the components of a path or symlink target are
    /// processed. `absolute` is true when those components start at the root.
    fn on_scope(&mut self, absolute: bool) -> Result<(), Self::Error>;

    /// Called for every component that is followed by more components.
    fn on_directory(&mut self, name: &Component) -> Result<GotDirectoryOrSymlink, Self::Error>;

    /// Called for the final component, unless the path ends with a slash.
    fn on_terminal(&mut self, name: &Component) -> Result<Option<GotSymlink>, Self::Error>;

    /// Called for every `..` component.
    fn on_up(&mut self) -> Result<(), Self::Error>;
}

impl<W: ComponentWalker + ?Sized> ComponentWalker for &mut W {
    type Error = W::Error;

    fn on_scope(&mut self, absolute: bool) -> Result<(), Self::Error> {
        (**self).on_scope(absolute)
    }

    fn on_directory(&mut self, name: &Component) -> Result<GotDirectoryOrSymlink, Self::Error> {
        (**self).on_directory(name)
    }

    fn on_terminal(&mut self, name: &Component) -> Result<Option<GotSymlink>, Self::Error> {
        (**self).on_terminal(name)
    }

    fn on_up(&mut self) -> Result<(), Self::Error> {
        (**self).on_up()
    }
}

/// Walker that accepts any path without inspecting it.
///
/// Nothing is known about the directories it passes through, so any of them
/// may be a symbolic link. They are reported as irreversible, which makes a
/// wrapping [`Builder`](crate::Builder) keep `..` components literally.
#[derive(Clone, Copy, Debug, Default)]
pub struct VoidWalker;

impl ComponentWalker for VoidWalker {
    type Error = ResolveError;

    fn on_scope(&mut self, _absolute: bool) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_directory(&mut self, _name: &Component) -> Result<GotDirectoryOrSymlink, Self::Error> {
        Ok(GotDirectoryOrSymlink::Directory { reversible: false })
    }

    fn on_terminal(&mut self, _name: &Component) -> Result<Option<GotSymlink>, Self::Error> {
        Ok(None)
    }

    fn on_up(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Walker that treats every component as a plain directory, so that `..`
/// cancels the preceding component.
#[derive(Clone, Copy, Debug, Default)]
pub struct LexicalWalker;

impl ComponentWalker for LexicalWalker {
    type Error = ResolveError;

    fn on_scope(&mut self, _absolute: bool) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_directory(&mut self, _name: &Component) -> Result<GotDirectoryOrSymlink, Self::Error> {
        Ok(GotDirectoryOrSymlink::Directory { reversible: true })
    }

    fn on_terminal(&mut self, _name: &Component) -> Result<Option<GotSymlink>, Self::Error> {
        Ok(None)
    }

    fn on_up(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Rejects absolute paths before delegating to the inner walker.
#[derive(Debug)]
pub struct RelativeWalker<W>(pub W);

impl<W: ComponentWalker> ComponentWalker for RelativeWalker<W> {
    type Error = W::Error;

    fn on_scope(&mut self, absolute: bool) -> Result<(), Self::Error> {
        if absolute {
            return Err(ResolveError::AbsolutePath.into());
        }
        self.0.on_scope(false)
    }

    fn on_directory(&mut self, name: &Component) -> Result<GotDirectoryOrSymlink, Self::Error> {
        self.0.on_directory(name)
    }

    fn on_terminal(&mut self, name: &Component) -> Result<Option<GotSymlink>, Self::Error> {
        self.0.on_terminal(name)
    }

    fn on_up(&mut self) -> Result<(), Self::Error> {
        self.0.on_up()
    }
}

/// Rejects relative paths before delegating to the inner walker.
#[derive(Debug)]
pub struct AbsoluteWalker<W>(pub W);

impl<W: ComponentWalker> ComponentWalker for AbsoluteWalker<W> {
    type Error = W::Error;

    fn on_scope(&mut self, absolute: bool) -> Result<(), Self::Error> {
        if !absolute {
            return Err(ResolveError::RelativePath.into());
        }
        self.0.on_scope(true)
    }

    fn on_directory(&mut self, name: &Component) -> Result<GotDirectoryOrSymlink, Self::Error> {
        self.0.on_directory(name)
    }

    fn on_terminal(&mut self, name: &Component) -> Result<Option<GotSymlink>, Self::Error> {
        self.0.on_terminal(name)
    }

    fn on_up(&mut self) -> Result<(), Self::Error> {
        self.0.on_up()
    }
}
