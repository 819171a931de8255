use std::fmt;
use std::sync::Arc;

use cas_digest::Function;
use vfs::{
    CasFileFactory, ErrorLogger, InMemoryPrepopulatedDirectory, PrepopulatedDirectory, VfsError,
};
use vpath::Component;

/// The tree of a single output base.
pub trait OutputPath: Send + Sync {
    /// Returns the root directory of the tree.
    fn root(&self) -> Arc<dyn PrepopulatedDirectory>;

    /// Called once a build using this output path has completed.
    fn finalize_build(&self, digest_function: &Function);
}

/// Creates and removes output paths.
pub trait OutputPathFactory: Send + Sync {
    /// Creates the output path for an output base that the service has not
    /// seen since it started.
    fn start_initial_build(
        &self,
        output_base: &Component,
        cas_file_factory: Arc<dyn CasFileFactory>,
        digest_function: &Function,
        error_logger: Arc<dyn ErrorLogger>,
    ) -> Arc<dyn OutputPath>;

    /// Removes whatever is stored for an output base that is not currently
    /// registered with the service.
    fn clean(&self, output_base: &Component) -> Result<(), VfsError>;
}

/// [`OutputPathFactory`] whose output paths live in memory only, so every
/// output path starts out empty and cleaning an unknown output base has
/// nothing to do.
#[derive(Clone, Copy, Debug, Default)]
pub struct InMemoryOutputPathFactory;

impl OutputPathFactory for InMemoryOutputPathFactory {
    fn start_initial_build(
        &self,
        output_base: &Component,
        _cas_file_factory: Arc<dyn CasFileFactory>,
        _digest_function: &Function,
        _error_logger: Arc<dyn ErrorLogger>,
    ) -> Arc<dyn OutputPath> {
        Arc::new(InMemoryOutputPath {
            output_base: output_base.clone(),
            root: InMemoryPrepopulatedDirectory::new(),
        })
    }

    fn clean(&self, _output_base: &Component) -> Result<(), VfsError> {
        Ok(())
    }
}

struct InMemoryOutputPath {
    output_base: Component,
    root: Arc<InMemoryPrepopulatedDirectory>,
}

impl fmt::Debug for InMemoryOutputPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryOutputPath")
            .field("output_base", &self.output_base)
            .finish_non_exhaustive()
    }
}

impl OutputPath for InMemoryOutputPath {
    fn root(&self) -> Arc<dyn PrepopulatedDirectory> {
        self.root.clone()
    }

    fn finalize_build(&self, digest_function: &Function) {
        tracing::debug!(
            target: "outputd::build",
            output_base = %self.output_base,
            digest_function = %digest_function,
            "in-memory output path has nothing to persist"
        );
    }
}
