//! Removal of output path contents whose blobs have disappeared from the
//! Content Addressable Storage.
//!
//! Files in an output path are only references to blobs. Between builds the
//! storage may have evicted some of them, so before a build starts every
//! reference is checked with `FindMissing` and dangling ones are dropped. The
//! build client then recreates whatever it still needs.

use blobstore::BlobAccess;
use cas_digest::{Digest, DigestSet, Function};
use rustc_hash::FxHashMap;
use tracing::debug;
use vfs::{ChildRemover, InitialNode, PrepopulatedDirectory};

use crate::error::{ServiceError, WrapErr};

/// Totals gathered by a filtering pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct FilterStats {
    pub(crate) find_missing_calls: usize,
    pub(crate) removed: usize,
}

struct MissingChildFilter<'a> {
    blob_access: &'a dyn BlobAccess,
    digest_function: &'a Function,
    batch_size: usize,
    queue: FxHashMap<Digest, Vec<ChildRemover>>,
    stats: FilterStats,
}

impl MissingChildFilter<'_> {
    fn remove(&mut self, remover: &ChildRemover) -> Result<(), ServiceError> {
        if remover()? {
            self.stats.removed += 1;
        }
        Ok(())
    }

    /// Queues the digests a node depends on, or removes the node right away
    /// when they cannot be checked.
    fn visit(&mut self, node: InitialNode, remover: ChildRemover) -> Result<(), ServiceError> {
        let digests = match node {
            InitialNode::Leaf(leaf) => leaf.containing_digests(),
            InitialNode::Directory(fetcher) => match fetcher.containing_digests() {
                Ok(digests) => digests,
                Err(error) if error.is_blob_not_found() => {
                    debug!(
                        target: "outputd::filter",
                        error = %error,
                        "removing directory whose tree is no longer present"
                    );
                    return self.remove(&remover);
                }
                Err(error) => return Err(error.into()),
            },
        };
        self.enqueue(&digests, remover)
    }

    fn enqueue(&mut self, digests: &DigestSet, remover: ChildRemover) -> Result<(), ServiceError> {
        for digest in digests {
            if !digest.uses_digest_function(self.digest_function) {
                return self.remove(&remover);
            }
            if !self.queue.contains_key(digest) && self.queue.len() >= self.batch_size {
                self.flush()?;
            }
            self.queue
                .entry(digest.clone())
                .or_default()
                .push(remover.clone());
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ServiceError> {
        let queue = std::mem::take(&mut self.queue);
        let digests: DigestSet = queue.keys().cloned().collect();
        let missing = self
            .blob_access
            .find_missing(&digests)
            .wrap_err(|| "Failed to find missing blobs")?;
        self.stats.find_missing_calls += 1;
        debug!(
            target: "outputd::filter",
            batch = digests.len(),
            missing = missing.len(),
            "checked output path contents against storage"
        );
        for digest in &missing {
            for remover in queue.get(digest).into_iter().flatten() {
                self.remove(remover).map_err(|error| {
                    error.wrap(format!(
                        "Failed to remove file with digest {:?}",
                        digest.to_string()
                    ))
                })?;
            }
        }
        Ok(())
    }
}

/// Removes every file and lazily loaded directory under `root` that refers
/// to a blob that is absent from `blob_access` or that was created with a
/// digest function other than `digest_function`.
///
/// `FindMissing` is called once per `batch_size` distinct digests.
pub(crate) fn filter_missing_children(
    root: &dyn PrepopulatedDirectory,
    digest_function: &Function,
    blob_access: &dyn BlobAccess,
    batch_size: usize,
) -> Result<FilterStats, ServiceError> {
    let mut filter = MissingChildFilter {
        blob_access,
        digest_function,
        batch_size: batch_size.max(1),
        queue: FxHashMap::default(),
        stats: FilterStats::default(),
    };
    let mut saved = None;
    root.filter_children(&mut |node, remover| match filter.visit(node, remover) {
        Ok(()) => true,
        Err(error) => {
            saved = Some(error);
            false
        }
    })?;
    if let Some(error) = saved {
        return Err(error);
    }
    if !filter.queue.is_empty() {
        filter.flush()?;
    }
    Ok(filter.stats)
}
