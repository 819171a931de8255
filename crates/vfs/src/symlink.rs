use std::sync::Arc;

use cas_digest::{DigestSet, Function};

use crate::attributes::{Attributes, AttributesMask, FileType, Permissions};
use crate::error::VfsError;
use crate::node::{FileStatus, Leaf};

/// Creates symbolic link nodes.
pub trait SymlinkFactory: Send + Sync {
    /// Returns a symbolic link pointing to `target`.
    fn lookup_symlink(&self, target: &str) -> Arc<dyn Leaf>;
}

/// [`SymlinkFactory`] producing immutable in-memory symbolic links.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicSymlinkFactory;

impl SymlinkFactory for BasicSymlinkFactory {
    fn lookup_symlink(&self, target: &str) -> Arc<dyn Leaf> {
        Arc::new(Symlink {
            target: target.to_owned(),
        })
    }
}

#[derive(Debug)]
struct Symlink {
    target: String,
}

impl Leaf for Symlink {
    fn virtual_get_attributes(&self, _requested: AttributesMask, attributes: &mut Attributes) {
        attributes
            .set_file_type(FileType::Symlink)
            .set_permissions(Permissions::READ | Permissions::WRITE | Permissions::EXECUTE)
            .set_size_bytes(self.target.len() as u64)
            .set_link_count(1)
            .set_change_id(0);
    }

    fn virtual_read(&self, _buf: &mut [u8], _offset: u64) -> Result<usize, VfsError> {
        Err(VfsError::InvalidArgument("cannot read the contents of a symbolic link"))
    }

    fn readlink(&self) -> Result<String, VfsError> {
        Ok(self.target.clone())
    }

    fn containing_digests(&self) -> DigestSet {
        DigestSet::empty()
    }

    fn output_service_file_status(
        &self,
        _digest_function: Option<&Function>,
    ) -> Result<FileStatus, VfsError> {
        Ok(FileStatus::Symlink {
            target: self.target.clone(),
        })
    }
}
