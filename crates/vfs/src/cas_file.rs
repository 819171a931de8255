use std::sync::Arc;

use blobstore::BlobAccess;
use cas_digest::{Digest, DigestSet, Function};

use crate::attributes::{Attributes, AttributesMask, FileType, Permissions};
use crate::error::VfsError;
use crate::error_logger::ErrorLogger;
use crate::node::{FileStatus, Leaf};

/// Creates file nodes whose contents live in the Content Addressable Storage.
pub trait CasFileFactory: Send + Sync {
    /// Returns a read-only file with the contents of `digest`.
    fn lookup_file(&self, digest: Digest, is_executable: bool) -> Arc<dyn Leaf>;
}

/// [`CasFileFactory`] producing files that load their contents from a
/// [`BlobAccess`] on every read.
///
/// Read failures cannot be reported to the build client that created the
/// file, so they are passed to an [`ErrorLogger`] and surface to filesystem
/// clients as [`VfsError::Io`].
#[derive(Clone)]
pub struct BlobAccessCasFileFactory {
    blob_access: Arc<dyn BlobAccess>,
    error_logger: Arc<dyn ErrorLogger>,
}

impl BlobAccessCasFileFactory {
    /// Creates a factory reading from `blob_access`.
    #[must_use]
    pub fn new(blob_access: Arc<dyn BlobAccess>, error_logger: Arc<dyn ErrorLogger>) -> Self {
        Self {
            blob_access,
            error_logger,
        }
    }
}

impl CasFileFactory for BlobAccessCasFileFactory {
    fn lookup_file(&self, digest: Digest, is_executable: bool) -> Arc<dyn Leaf> {
        Arc::new(CasFile {
            blob_access: Arc::clone(&self.blob_access),
            error_logger: Arc::clone(&self.error_logger),
            digest,
            is_executable,
        })
    }
}

struct CasFile {
    blob_access: Arc<dyn BlobAccess>,
    error_logger: Arc<dyn ErrorLogger>,
    digest: Digest,
    is_executable: bool,
}

impl CasFile {
    fn load(&self) -> Result<Vec<u8>, VfsError> {
        self.blob_access.get(&self.digest).map_err(|error| {
            self.error_logger.log(&error);
            VfsError::Io
        })
    }
}

impl Leaf for CasFile {
    fn virtual_get_attributes(&self, _requested: AttributesMask, attributes: &mut Attributes) {
        let permissions = if self.is_executable {
            Permissions::READ | Permissions::EXECUTE
        } else {
            Permissions::READ
        };
        attributes
            .set_file_type(FileType::Regular)
            .set_permissions(permissions)
            .set_size_bytes(u64::try_from(self.digest.size_bytes()).unwrap_or(0))
            .set_link_count(1)
            .set_change_id(0);
    }

    fn virtual_read(&self, buf: &mut [u8], offset: u64) -> Result<usize, VfsError> {
        let data = self.load()?;
        let start = usize::try_from(offset).map_or(data.len(), |offset| offset.min(data.len()));
        let count = buf.len().min(data.len() - start);
        buf[..count].copy_from_slice(&data[start..start + count]);
        Ok(count)
    }

    fn readlink(&self) -> Result<String, VfsError> {
        Err(VfsError::NotSymlink)
    }

    fn containing_digests(&self) -> DigestSet {
        std::iter::once(self.digest.clone()).collect()
    }

    fn output_service_file_status(
        &self,
        digest_function: Option<&Function>,
    ) -> Result<FileStatus, VfsError> {
        let digest = match digest_function {
            None => None,
            Some(function) if self.digest.uses_digest_function(function) => {
                Some(self.digest.clone())
            }
            Some(function) => {
                let data = self.blob_access.get(&self.digest)?;
                tracing::debug!(
                    target: "vfs::cas",
                    digest = %self.digest,
                    function = %function,
                    "recomputing digest of CAS-backed file"
                );
                Some(function.compute(&data))
            }
        };
        Ok(FileStatus::File {
            digest,
            is_executable: self.is_executable,
        })
    }
}
