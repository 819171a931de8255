use cas_digest::{Digest, DigestSet};

use crate::error::BlobError;

/// Number of digests a single `find_missing` call should carry.
pub const RECOMMENDED_FIND_MISSING_DIGESTS_COUNT: usize = 10_000;

/// Access to a Content Addressable Storage.
pub trait BlobAccess: Send + Sync {
    /// Loads the contents of a blob.
    fn get(&self, digest: &Digest) -> Result<Vec<u8>, BlobError>;

    /// Stores a blob under `digest`.
    fn put(&self, digest: &Digest, data: Vec<u8>) -> Result<(), BlobError>;

    /// Returns the subset of `digests` that is absent from the store.
    fn find_missing(&self, digests: &DigestSet) -> Result<DigestSet, BlobError>;
}
