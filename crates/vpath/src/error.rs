use thiserror::Error;

/// Errors produced while resolving pathnames.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ResolveError {
    /// A component is empty, `.`, `..`, or contains a slash or NUL byte.
    #[error("Invalid pathname component {0:?}")]
    InvalidComponent(String),
    /// Symlink expansion exceeded the loop limit.
    #[error("Too many levels of symbolic links")]
    TooManySymbolicLinks,
    /// An absolute path was required.
    #[error("Path is relative, while an absolute path was expected")]
    RelativePath,
    /// A relative path was required.
    #[error("Path is absolute, while a relative path was expected")]
    AbsolutePath,
    /// An alias of a virtual root is malformed or conflicts with the root.
    #[error("Invalid alias {alias:?}: {reason}")]
    InvalidAlias {
        /// The alias path as supplied.
        alias: String,
        /// Why the alias was rejected.
        reason: &'static str,
    },
}
