use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use cas_digest::{Digest, DigestSet};
use rustc_hash::FxHashMap;

use crate::access::BlobAccess;
use crate::error::BlobError;

/// Blob store that keeps every blob in memory.
///
/// Blobs are verified against their digest when stored. Each call to
/// [`BlobAccess::find_missing`] is recorded, so callers can assert how many
/// batches a traversal issued and how large they were.
#[derive(Debug, Default)]
pub struct MemoryBlobAccess {
    blobs: RwLock<FxHashMap<Digest, Vec<u8>>>,
    get_calls: AtomicUsize,
    find_missing_batches: Mutex<Vec<usize>>,
}

impl MemoryBlobAccess {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the digest of `data` with `function` and stores it.
    pub fn insert(&self, function: &cas_digest::Function, data: &[u8]) -> Digest {
        let digest = function.compute(data);
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(digest.clone(), data.to_vec());
        digest
    }

    /// Drops a blob, returning whether it was present.
    pub fn remove(&self, digest: &Digest) -> bool {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(digest)
            .is_some()
    }

    /// Reports whether a blob is present.
    #[must_use]
    pub fn contains(&self, digest: &Digest) -> bool {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(digest)
    }

    /// Returns the number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Reports whether the store holds no blobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of `get` calls served so far.
    #[must_use]
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::Relaxed)
    }

    /// Returns the size of every `find_missing` batch, in call order.
    #[must_use]
    pub fn find_missing_batches(&self) -> Vec<usize> {
        self.find_missing_batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BlobAccess for MemoryBlobAccess {
    fn get(&self, digest: &Digest) -> Result<Vec<u8>, BlobError> {
        self.get_calls.fetch_add(1, Ordering::Relaxed);
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(digest)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(digest.clone()))
    }

    fn put(&self, digest: &Digest, data: Vec<u8>) -> Result<(), BlobError> {
        let actual = digest.digest_function().hash_hex(&data);
        let size_matches = i64::try_from(data.len()).is_ok_and(|size| size == digest.size_bytes());
        if actual != digest.hash() || !size_matches {
            return Err(BlobError::DigestMismatch {
                expected: digest.clone(),
                actual,
            });
        }
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(digest.clone(), data);
        Ok(())
    }

    fn find_missing(&self, digests: &DigestSet) -> Result<DigestSet, BlobError> {
        self.find_missing_batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(digests.len());
        let blobs = self.blobs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(digests
            .iter()
            .filter(|digest| !blobs.contains_key(*digest))
            .cloned()
            .collect())
    }
}
