use cas_digest::{Digest, DigestError};
use thiserror::Error;

/// Errors returned by blob stores and tree fetchers.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum BlobError {
    /// The blob is not present in the store.
    #[error("Blob {0} not found")]
    NotFound(Digest),
    /// The contents of a blob do not hash to its digest.
    #[error("Blob has checksum {actual}, while {expected} was expected")]
    DigestMismatch {
        /// Digest under which the blob was supplied.
        expected: Digest,
        /// Hash computed over the supplied contents.
        actual: String,
    },
    /// The blob could not be decoded.
    #[error("Failed to decode blob {digest}: {reason}")]
    Malformed {
        /// Digest of the offending blob.
        digest: Digest,
        /// Decoder error.
        reason: String,
    },
    /// The blob exceeds the size the caller is willing to load.
    #[error("Blob {digest} is {size_bytes} bytes in size, while a maximum of {maximum} bytes is permitted")]
    SizeLimit {
        /// Digest of the offending blob.
        digest: Digest,
        /// Size of the blob.
        size_bytes: i64,
        /// Permitted maximum.
        maximum: usize,
    },
    /// A digest embedded in a blob is invalid.
    #[error("Invalid digest in blob: {0}")]
    Digest(#[from] DigestError),
}

impl BlobError {
    /// Reports whether the error indicates an absent blob.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
