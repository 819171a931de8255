#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `vpath` resolves textual pathnames one component at a time against a
//! caller-supplied [`ComponentWalker`]. The walker decides what each
//! component means: it may enter a directory, report a symbolic link that the
//! resolver must expand in place, or refuse the step with an error. This keeps
//! pathname semantics (`.`, `..`, trailing slashes, symlink loops) in one
//! place while letting callers create, inspect or merely record the
//! directories they traverse.
//!
//! # Design
//!
//! - [`Component`] is a validated single pathname component.
//! - [`resolve`] splits a path, drives the walker and expands symlinks with a
//!   limit of [`MAX_SYMLINK_EXPANSIONS`].
//! - [`Builder`] wraps a walker and records the path that was actually
//!   resolved, which is what callers report back when a path leaves the tree
//!   they manage.
//! - [`VirtualRootFactory`] maps absolute paths onto a tree that is mounted at
//!   a known location, optionally reachable through aliases.
//!
//! # Invariants
//!
//! - A walker always receives [`ComponentWalker::on_scope`] before the first
//!   component of a path and before the first component of every symlink
//!   target.
//! - [`ComponentWalker::on_terminal`] is called at most once per path or
//!   symlink target, and only for the final named component.
//!
//! # Errors
//!
//! Resolution fails with [`ResolveError`] for malformed components and
//! symlink loops. Walkers add their own errors through their associated
//! error type, which must be constructible from [`ResolveError`].
//!
//! # Examples
//!
//! ```
//! use vpath::{Builder, LexicalWalker, resolve};
//!
//! let mut builder = Builder::new(LexicalWalker);
//! resolve("a/./b/../c/", &mut builder).unwrap();
//! assert_eq!(builder.to_string(), "a/c");
//! ```

mod builder;
mod component;
mod error;
mod resolver;
mod virtual_root;
mod walker;

pub use crate::builder::Builder;
pub use crate::component::Component;
pub use crate::error::ResolveError;
pub use crate::resolver::{MAX_SYMLINK_EXPANSIONS, resolve, resolve_absolute, resolve_relative};
pub use crate::virtual_root::{VirtualRootFactory, VirtualRootWalker};
pub use crate::walker::{
    AbsoluteWalker, ComponentWalker, GotDirectoryOrSymlink, GotSymlink, LexicalWalker,
    RelativeWalker, VoidWalker,
};
