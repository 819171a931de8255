//! Service configuration.
//!
//! [`ServiceConfig`] is immutable once built. Hosts either start from
//! [`ServiceConfig::default`] or assemble one through [`ServiceConfigBuilder`].
//! With the `serde` feature enabled the configuration can also be deserialized
//! as part of a larger document; missing fields take their defaults.

use blobstore::RECOMMENDED_FIND_MISSING_DIGESTS_COUNT;

/// Default upper bound on the size of a tree message referenced by
/// `BatchCreate`.
pub const DEFAULT_MAXIMUM_TREE_SIZE_BYTES: u64 = 16 * 1024 * 1024;

/// Limits applied by the output service.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize),
    serde(default, deny_unknown_fields)
)]
pub struct ServiceConfig {
    maximum_tree_size_bytes: u64,
    find_missing_batch_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            maximum_tree_size_bytes: DEFAULT_MAXIMUM_TREE_SIZE_BYTES,
            find_missing_batch_size: RECOMMENDED_FIND_MISSING_DIGESTS_COUNT,
        }
    }
}

impl ServiceConfig {
    /// Creates a new [`ServiceConfigBuilder`].
    #[must_use]
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Largest tree digest, in bytes, that `BatchCreate` accepts.
    #[must_use]
    pub const fn maximum_tree_size_bytes(&self) -> u64 {
        self.maximum_tree_size_bytes
    }

    /// Number of distinct digests sent per `FindMissing` call while filtering
    /// an output path. Never zero.
    #[must_use]
    pub const fn find_missing_batch_size(&self) -> usize {
        if self.find_missing_batch_size == 0 {
            1
        } else {
            self.find_missing_batch_size
        }
    }
}

/// Builder used to assemble a [`ServiceConfig`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    /// Sets the largest tree digest `BatchCreate` accepts.
    #[must_use]
    pub const fn maximum_tree_size_bytes(mut self, bytes: u64) -> Self {
        self.config.maximum_tree_size_bytes = bytes;
        self
    }

    /// Sets the number of distinct digests per `FindMissing` call. Zero is
    /// treated as one.
    #[must_use]
    pub const fn find_missing_batch_size(mut self, digests: usize) -> Self {
        self.config.find_missing_batch_size = digests;
        self
    }

    /// Finalises the builder.
    #[must_use]
    pub fn build(self) -> ServiceConfig {
        self.config
    }
}
