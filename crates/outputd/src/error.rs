use std::fmt;

use blobstore::BlobError;
use cas_digest::DigestError;
use thiserror::Error;
use vfs::VfsError;
use vpath::ResolveError;

/// Status code attached to every [`ServiceError`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Code {
    /// The request is malformed.
    InvalidArgument,
    /// The request is well formed, but the service is not in a state that
    /// permits it, such as a build ID that is not associated with a build.
    FailedPrecondition,
    /// An object referenced by the request does not exist.
    NotFound,
    /// An invariant of the service or of a collaborator was violated.
    Internal,
    /// A tree operation failed for a reason with no better mapping.
    Unknown,
}

impl Code {
    /// Returns the canonical upper-case name of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::NotFound => "NOT_FOUND",
            Self::Internal => "INTERNAL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by the remote output service.
///
/// Errors raised by collaborators are converted with [`From`], which picks the
/// code, and then prefixed with context through [`ServiceError::wrap`]. The
/// code survives any number of wraps.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct ServiceError {
    code: Code,
    message: String,
}

impl ServiceError {
    /// Creates an error with an explicit code.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Shorthand for [`Code::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// Shorthand for [`Code::FailedPrecondition`].
    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(Code::FailedPrecondition, message)
    }

    /// Returns the status code.
    #[must_use]
    pub const fn code(&self) -> Code {
        self.code
    }

    /// Returns the message, including any context added by wrapping.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Prefixes the message with `context`, keeping the code.
    #[must_use]
    pub fn wrap(self, context: impl fmt::Display) -> Self {
        Self {
            code: self.code,
            message: format!("{context}: {}", self.message),
        }
    }
}

impl From<ResolveError> for ServiceError {
    fn from(error: ResolveError) -> Self {
        Self::invalid_argument(error.to_string())
    }
}

impl From<DigestError> for ServiceError {
    fn from(error: DigestError) -> Self {
        Self::invalid_argument(error.to_string())
    }
}

impl From<BlobError> for ServiceError {
    fn from(error: BlobError) -> Self {
        let code = match &error {
            BlobError::NotFound(_) => Code::NotFound,
            BlobError::DigestMismatch { .. }
            | BlobError::Malformed { .. }
            | BlobError::SizeLimit { .. }
            | BlobError::Digest(_) => Code::InvalidArgument,
        };
        Self::new(code, error.to_string())
    }
}

impl From<VfsError> for ServiceError {
    fn from(error: VfsError) -> Self {
        match error {
            VfsError::Resolve(error) => error.into(),
            VfsError::Blob(error) => error.into(),
            VfsError::Digest(error) => error.into(),
            VfsError::NoEntry => Self::new(Code::NotFound, error.to_string()),
            VfsError::NotDirectory
            | VfsError::IsDirectory
            | VfsError::InvalidArgument(_)
            | VfsError::InvalidDirectory(_) => Self::invalid_argument(error.to_string()),
            VfsError::Io => Self::new(Code::Internal, error.to_string()),
            VfsError::Exists | VfsError::ReadOnly | VfsError::NotSymlink => {
                Self::new(Code::Unknown, error.to_string())
            }
        }
    }
}

/// Converts an error into a [`ServiceError`] and adds context to it.
pub(crate) trait WrapErr<T> {
    fn wrap_err<C: fmt::Display>(self, context: impl FnOnce() -> C) -> Result<T, ServiceError>;
}

impl<T, E: Into<ServiceError>> WrapErr<T> for Result<T, E> {
    fn wrap_err<C: fmt::Display>(self, context: impl FnOnce() -> C) -> Result<T, ServiceError> {
        self.map_err(|error| error.into().wrap(context()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cas_digest::{DigestFunction, Function, InstanceName};

    #[test]
    fn wrapping_keeps_code_and_nests_context() {
        let error = ServiceError::from(VfsError::NoEntry)
            .wrap("Failed to resolve path")
            .wrap("Failed to create file \"out/bin\"");
        assert_eq!(error.code(), Code::NotFound);
        assert_eq!(
            error.message(),
            "Failed to create file \"out/bin\": Failed to resolve path: No such file or directory"
        );
        assert!(error.to_string().starts_with("NOT_FOUND: "));
    }

    #[test]
    fn nested_collaborator_errors_keep_their_codes() {
        let digest = Function::new(InstanceName::default(), DigestFunction::Sha256).compute(b"x");
        let missing = VfsError::Blob(BlobError::NotFound(digest));
        assert_eq!(ServiceError::from(missing).code(), Code::NotFound);

        let invalid = VfsError::Resolve(ResolveError::TooManySymbolicLinks);
        assert_eq!(ServiceError::from(invalid).code(), Code::InvalidArgument);
        assert_eq!(
            ServiceError::from(VfsError::NotDirectory).code(),
            Code::InvalidArgument
        );
        assert_eq!(ServiceError::from(VfsError::Exists).code(), Code::Unknown);
    }

    #[test]
    fn wrap_err_converts_lazily() {
        let result: Result<(), DigestError> = Err(DigestError::NegativeSize(-1));
        let error = result
            .wrap_err(|| format!("Invalid digest for file {:?}", "a"))
            .expect_err("conversion keeps the failure");
        assert_eq!(error.code(), Code::InvalidArgument);
        assert!(error.message().starts_with("Invalid digest for file \"a\": "));
    }
}
