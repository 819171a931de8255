use std::fmt;
use std::sync::{Arc, Mutex};

use blobstore::{BlobAccess, BlobAccessDirectoryFetcher, DirectoryFetcher};
use cas_digest::{Digest, Function, InstanceName};
use tracing::{debug, info, warn};
use vfs::{
    Attributes, AttributesMask, BasicSymlinkFactory, BlobAccessCasFileFactory, CasFileFactory,
    CasInitialContentsFetcher, Directory, DirectoryChild, DirectoryEntryReporter,
    EMPTY_DIRECTORY_LINK_COUNT, ErrorLoggerFactory, FileType, InitialNode, Leaf,
    OpenExistingOptions, Permissions, PrepopulatedDirectory, SymlinkFactory,
    TracingErrorLoggerFactory, VfsError, read_only_open_child_doesnt_exist,
    read_only_open_child_wrong_file_type,
};
use vpath::{AbsoluteWalker, Builder, Component, RelativeWalker, VirtualRootFactory, VoidWalker};

use crate::config::ServiceConfig;
use crate::error::{Code, ServiceError, WrapErr};
use crate::filter::filter_missing_children;
use crate::output_path::{InMemoryOutputPathFactory, OutputPathFactory};
use crate::protocol::{
    BatchCreateRequest, BatchStatRequest, BatchStatResponse, CleanRequest, FinalizeBuildRequest,
    RemoteOutputService, StartBuildRequest, StartBuildResponse, StatResponse,
};
use crate::registry::{self, BuildState, Commit, Registry};
use crate::walkers::{DirectoryCreatingWalker, DirectoryStack, StatWalker, create_child};

/// Informs a filesystem frontend that an entry of the output service
/// directory disappeared, so that it can invalidate cached lookups.
pub trait RemovalNotifier: Send + Sync {
    /// Called after `name` was removed from the output service directory.
    fn notify_removal(&self, name: &Component);
}

/// [`RemovalNotifier`] for frontends without a lookup cache.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRemovalNotifier;

impl RemovalNotifier for NoopRemovalNotifier {
    fn notify_removal(&self, _name: &Component) {}
}

/// Collaborators of [`OutputServiceDirectory`].
#[derive(Clone)]
pub struct Collaborators {
    /// Content Addressable Storage holding file contents and trees.
    pub blob_access: Arc<dyn BlobAccess>,
    /// Loads the directories of trees referenced by `BatchCreate`.
    pub directory_fetcher: Arc<dyn DirectoryFetcher>,
    /// Creates symbolic links.
    pub symlink_factory: Arc<dyn SymlinkFactory>,
    /// Creates and removes output paths.
    pub output_path_factory: Arc<dyn OutputPathFactory>,
    /// Provides an error logger to every output path.
    pub error_logger_factory: Arc<dyn ErrorLoggerFactory>,
    /// Receives notifications about removed output paths.
    pub removal_notifier: Arc<dyn RemovalNotifier>,
}

impl Collaborators {
    /// Keeps every output path in memory, loading trees of at most
    /// `maximum_message_size` bytes from `blob_access` and logging through
    /// `tracing`.
    #[must_use]
    pub fn in_memory(blob_access: Arc<dyn BlobAccess>, maximum_message_size: usize) -> Self {
        Self {
            directory_fetcher: Arc::new(BlobAccessDirectoryFetcher::new(
                Arc::clone(&blob_access),
                maximum_message_size,
            )),
            blob_access,
            symlink_factory: Arc::new(BasicSymlinkFactory),
            output_path_factory: Arc::new(InMemoryOutputPathFactory),
            error_logger_factory: Arc::new(TracingErrorLoggerFactory),
            removal_notifier: Arc::new(NoopRemovalNotifier),
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// What a running build needs once the registry lock is released.
struct ActiveBuild {
    root: Arc<dyn PrepopulatedDirectory>,
    cas_file_factory: Arc<dyn CasFileFactory>,
    digest_function: Function,
    virtual_root: Arc<VirtualRootFactory>,
}

/// The directory containing all output paths, served both to filesystem
/// clients through [`Directory`] and to build clients through
/// [`RemoteOutputService`].
///
/// Each output path appears as a child named after its output base. The
/// registry of output paths is guarded by a single mutex that is never held
/// while calling into output path trees.
pub struct OutputServiceDirectory {
    config: ServiceConfig,
    collaborators: Collaborators,
    registry: Mutex<Registry>,
}

impl fmt::Debug for OutputServiceDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = registry::lock(&self.registry);
        f.debug_struct("OutputServiceDirectory")
            .field("config", &self.config)
            .field("output_paths", &registry.len())
            .field("change_id", &registry.change_id())
            .finish_non_exhaustive()
    }
}

impl OutputServiceDirectory {
    /// Creates a service without any output paths.
    #[must_use]
    pub fn new(config: ServiceConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            registry: Mutex::new(Registry::new()),
        }
    }

    /// Returns the configuration the service was created with.
    #[must_use]
    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Number of output paths currently known to the service.
    #[must_use]
    pub fn output_path_count(&self) -> usize {
        registry::lock(&self.registry).len()
    }

    /// Change ID reported in the attributes of this directory.
    #[must_use]
    pub fn change_id(&self) -> u64 {
        registry::lock(&self.registry).change_id()
    }

    fn active_build(&self, build_id: &str) -> Result<ActiveBuild, ServiceError> {
        let registry = registry::lock(&self.registry);
        registry
            .lookup_build(build_id)
            .and_then(|id| registry.get(id))
            .and_then(|state| {
                state.build.as_ref().map(|build| ActiveBuild {
                    root: state.output_path.root(),
                    cas_file_factory: Arc::clone(&state.cas_file_factory),
                    digest_function: build.digest_function.clone(),
                    virtual_root: Arc::clone(&build.virtual_root),
                })
            })
            .ok_or_else(|| {
                ServiceError::failed_precondition(
                    "Build ID is not associated with any running build",
                )
            })
    }

    /// Registers the build under the registry lock, creating the output path
    /// if needed. Returns the root of the output path and the digest function
    /// the build uses.
    fn attach_build(
        &self,
        output_base: &Component,
        build: BuildState,
    ) -> Result<(Arc<dyn PrepopulatedDirectory>, Function), ServiceError> {
        let mut registry = registry::lock(&self.registry);
        if let Some(state) = registry
            .lookup_build(&build.build_id)
            .and_then(|id| registry.get(id))
        {
            if state.output_base != *output_base {
                return Err(ServiceError::failed_precondition(format!(
                    "Build ID {:?} is already associated with output base {:?}",
                    build.build_id,
                    state.output_base.as_str()
                )));
            }
            let digest_function = state
                .build
                .as_ref()
                .map_or(build.digest_function, |running| {
                    running.digest_function.clone()
                });
            debug!(
                target: "outputd::build",
                output_base = %output_base,
                build_id = %build.build_id,
                "build was already started; reusing it"
            );
            return Ok((state.output_path.root(), digest_function));
        }

        let id = match registry.lookup_output_base(output_base) {
            Some(id) => id,
            None => {
                let collaborators = &self.collaborators;
                let error_logger = collaborators.error_logger_factory.new_logger(output_base);
                let cas_file_factory: Arc<dyn CasFileFactory> =
                    Arc::new(BlobAccessCasFileFactory::new(
                        Arc::clone(&collaborators.blob_access),
                        Arc::clone(&error_logger),
                    ));
                let output_path = collaborators.output_path_factory.start_initial_build(
                    output_base,
                    Arc::clone(&cas_file_factory),
                    &build.digest_function,
                    error_logger,
                );
                info!(
                    target: "outputd::build",
                    output_base = %output_base,
                    "created output path"
                );
                registry.insert(output_base.clone(), output_path, cas_file_factory)
            }
        };
        let root = registry
            .get(id)
            .map(|state| state.output_path.root())
            .ok_or_else(|| ServiceError::new(Code::Internal, "Output path vanished"))?;
        let build_id = build.build_id.clone();
        let digest_function = build.digest_function.clone();
        if let Some(stale) = registry.install_build(id, build) {
            warn!(
                target: "outputd::build",
                output_base = %output_base,
                build_id = %stale.build_id,
                "closing build that was never finalized"
            );
        }
        info!(
            target: "outputd::build",
            output_base = %output_base,
            build_id = %build_id,
            digest_function = %digest_function,
            "started build"
        );
        Ok((root, digest_function))
    }

    fn parse_digest(
        function: &Function,
        proto: &cas_digest::DigestProto,
        what: &str,
        path: &str,
    ) -> Result<Digest, ServiceError> {
        function
            .new_digest_from_proto(proto)
            .wrap_err(|| format!("Invalid digest for {what} {path:?}"))
    }
}

impl RemoteOutputService for OutputServiceDirectory {
    fn clean(&self, request: &CleanRequest) -> Result<(), ServiceError> {
        let output_base = Component::new(&request.output_base_id)
            .map_err(|_| ServiceError::invalid_argument("Output base ID is not a valid filename"))?;

        let outcome = registry::compute_act_commit(
            &self.registry,
            |registry| {
                let id = registry.lookup_output_base(&output_base)?;
                registry.get(id).map(|state| (id, state.output_path.root()))
            },
            |root| root.remove_all_children(true),
            |registry, id, ()| registry.remove(id),
        )?;

        match outcome {
            Commit::Absent => {
                self.collaborators.output_path_factory.clean(&output_base)?;
                debug!(
                    target: "outputd::clean",
                    output_base = %output_base,
                    "cleaned output base that is not registered"
                );
            }
            Commit::Committed(removed) => {
                if let Some(build) = removed.as_ref().and_then(|state| state.build.as_ref()) {
                    warn!(
                        target: "outputd::clean",
                        output_base = %output_base,
                        build_id = %build.build_id,
                        "closing build of removed output path"
                    );
                }
                self.collaborators
                    .removal_notifier
                    .notify_removal(&output_base);
                info!(
                    target: "outputd::clean",
                    output_base = %output_base,
                    "removed output path"
                );
            }
            Commit::Stale => {
                debug!(
                    target: "outputd::clean",
                    output_base = %output_base,
                    "output path was removed concurrently"
                );
            }
        }
        Ok(())
    }

    fn start_build(
        &self,
        request: &StartBuildRequest,
    ) -> Result<StartBuildResponse, ServiceError> {
        let mut prefix = Builder::new(AbsoluteWalker(VoidWalker));
        vpath::resolve(&request.output_path_prefix, &mut prefix)
            .wrap_err(|| "Failed to resolve output path prefix")?;
        let output_base = Component::new(&request.output_base_id)
            .map_err(|_| ServiceError::invalid_argument("Output base ID is not a valid filename"))?;
        if request.build_id.is_empty() {
            return Err(ServiceError::invalid_argument("Build ID is empty"));
        }

        let prefix = prefix.to_string();
        let output_path = if prefix == "/" {
            format!("/{output_base}")
        } else {
            format!("{prefix}/{output_base}")
        };
        let virtual_root = VirtualRootFactory::new(&output_path, &request.output_path_aliases)
            .wrap_err(|| "Failed to create scope walker factory for output path")?;
        let instance_name = InstanceName::new(&request.instance_name)
            .wrap_err(|| format!("Failed to parse instance name {:?}", request.instance_name))?;
        let digest_function = instance_name
            .digest_function(&request.digest_function)
            .wrap_err(|| "Failed to parse digest function")?;

        let (root, digest_function) = self.attach_build(
            &output_base,
            BuildState {
                build_id: request.build_id.clone(),
                digest_function,
                virtual_root: Arc::new(virtual_root),
            },
        )?;

        let stats = filter_missing_children(
            root.as_ref(),
            &digest_function,
            self.collaborators.blob_access.as_ref(),
            self.config.find_missing_batch_size(),
        )
        .map_err(|error| error.wrap("Failed to filter contents of the output path"))?;
        debug!(
            target: "outputd::filter",
            output_base = %output_base,
            find_missing_calls = stats.find_missing_calls,
            removed = stats.removed,
            "filtered output path"
        );

        Ok(StartBuildResponse {
            output_path_suffix: output_base.as_str().to_owned(),
        })
    }

    fn batch_create(&self, request: &BatchCreateRequest) -> Result<(), ServiceError> {
        let build = self.active_build(&request.build_id)?;
        let function = &build.digest_function;

        // Reject the request before touching the tree.
        let files = request
            .files
            .iter()
            .map(|file| {
                Self::parse_digest(function, &file.digest, "file", &file.path)
                    .map(|digest| (file, digest))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let maximum = self.config.maximum_tree_size_bytes();
        let directories = request
            .directories
            .iter()
            .map(|directory| {
                let digest = Self::parse_digest(
                    function,
                    &directory.tree_digest,
                    "directory",
                    &directory.path,
                )?;
                let size_bytes = u64::try_from(digest.size_bytes()).unwrap_or(u64::MAX);
                if size_bytes > maximum {
                    return Err(ServiceError::invalid_argument(format!(
                        "Directory {:?} is {size_bytes} bytes in size, which exceeds the permitted maximum of {maximum} bytes",
                        directory.path
                    )));
                }
                Ok((directory, digest))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut prefix = DirectoryCreatingWalker::new(DirectoryStack::new(build.root));
        vpath::resolve(&request.path_prefix, &mut RelativeWalker(&mut prefix))
            .map_err(|error| error.wrap("Failed to create path prefix directory"))?;
        let stack = prefix.into_stack();
        if request.clean_path_prefix {
            stack
                .peek()
                .remove_all_children(false)
                .wrap_err(|| "Failed to clean path prefix directory")?;
        }

        for (file, digest) in files {
            let leaf = build.cas_file_factory.lookup_file(digest, file.is_executable);
            if let Err(error) = create_child(&stack, &file.path, InitialNode::Leaf(leaf.clone())) {
                leaf.unlink();
                return Err(error.wrap(format!("Failed to create file {:?}", file.path)));
            }
        }
        for (directory, digest) in directories {
            let fetcher = CasInitialContentsFetcher::new(
                Arc::clone(&self.collaborators.directory_fetcher),
                digest,
                Arc::clone(&build.cas_file_factory),
                Arc::clone(&self.collaborators.symlink_factory),
                function.clone(),
            );
            create_child(
                &stack,
                &directory.path,
                InitialNode::Directory(Arc::new(fetcher)),
            )
            .map_err(|error| {
                error.wrap(format!("Failed to create directory {:?}", directory.path))
            })?;
        }
        for symlink in &request.symlinks {
            let leaf = self
                .collaborators
                .symlink_factory
                .lookup_symlink(&symlink.target);
            if let Err(error) = create_child(&stack, &symlink.path, InitialNode::Leaf(leaf.clone())) {
                leaf.unlink();
                return Err(error.wrap(format!(
                    "Failed to create symbolic link {:?}",
                    symlink.path
                )));
            }
        }

        debug!(
            target: "outputd::build",
            build_id = %request.build_id,
            path_prefix = %request.path_prefix,
            files = request.files.len(),
            directories = request.directories.len(),
            symlinks = request.symlinks.len(),
            "created outputs"
        );
        Ok(())
    }

    fn batch_stat(&self, request: &BatchStatRequest) -> Result<BatchStatResponse, ServiceError> {
        let build = self.active_build(&request.build_id)?;
        let digest_function = request
            .include_file_digest
            .then(|| build.digest_function.clone());

        let mut responses = Vec::with_capacity(request.paths.len());
        for path in &request.paths {
            let mut walker = Builder::new(build.virtual_root.new_walker(StatWalker::new(
                Arc::clone(&build.root),
                digest_function.clone(),
                request.follow_symlinks,
            )));
            match vpath::resolve(path, &mut walker) {
                Ok(()) => {}
                Err(VfsError::NoEntry) => {
                    responses.push(StatResponse::default());
                    continue;
                }
                Err(error) => {
                    return Err(ServiceError::from(error).wrap(format!(
                        "Failed to resolve path {path:?} beyond {:?}",
                        walker.to_string()
                    )));
                }
            }
            let next_path = walker.to_string();
            let status = walker.into_inner().into_inner().into_status(next_path);
            responses.push(StatResponse {
                file_status: Some(status),
            });
        }
        Ok(BatchStatResponse { responses })
    }

    fn finalize_build(&self, request: &FinalizeBuildRequest) -> Result<(), ServiceError> {
        let finished = registry::lock(&self.registry).finish_build(&request.build_id);
        if let Some(finished) = finished {
            finished
                .output_path
                .finalize_build(&finished.build.digest_function);
            info!(
                target: "outputd::build",
                output_base = %finished.output_base,
                build_id = %finished.build.build_id,
                "finalized build"
            );
        }
        Ok(())
    }
}

impl Directory for OutputServiceDirectory {
    fn virtual_get_attributes(&self, _requested: AttributesMask, attributes: &mut Attributes) {
        let registry = registry::lock(&self.registry);
        attributes
            .set_file_type(FileType::Directory)
            .set_permissions(Permissions::READ | Permissions::EXECUTE)
            .set_size_bytes(0)
            .set_change_id(registry.change_id())
            .set_link_count(
                EMPTY_DIRECTORY_LINK_COUNT
                    .saturating_add(u32::try_from(registry.len()).unwrap_or(u32::MAX)),
            );
    }

    fn virtual_lookup(
        &self,
        name: &Component,
        requested: AttributesMask,
        attributes: &mut Attributes,
    ) -> Result<DirectoryChild, VfsError> {
        let root = {
            let registry = registry::lock(&self.registry);
            registry
                .lookup_output_base(name)
                .and_then(|id| registry.get(id))
                .map(|state| state.output_path.root())
                .ok_or(VfsError::NoEntry)?
        };
        root.virtual_get_attributes(requested, attributes);
        Ok(DirectoryChild::Directory(root))
    }

    fn virtual_open_child(
        &self,
        name: &Component,
        create: Option<&Attributes>,
        existing: Option<&OpenExistingOptions>,
    ) -> Result<Arc<dyn Leaf>, VfsError> {
        let exists = registry::lock(&self.registry)
            .lookup_output_base(name)
            .is_some();
        if exists {
            Err(read_only_open_child_wrong_file_type(
                existing,
                VfsError::IsDirectory,
            ))
        } else {
            Err(read_only_open_child_doesnt_exist(create))
        }
    }

    fn virtual_read_dir(
        &self,
        first_cookie: u64,
        requested: AttributesMask,
        reporter: &mut dyn DirectoryEntryReporter,
    ) -> Result<(), VfsError> {
        let entries = registry::lock(&self.registry).entries_from(first_cookie);
        for entry in entries {
            let mut attributes = Attributes::default();
            entry.root.virtual_get_attributes(requested, &mut attributes);
            if !reporter.report_entry(
                entry.cookie + 1,
                &entry.output_base,
                DirectoryChild::Directory(entry.root),
                &attributes,
            ) {
                break;
            }
        }
        Ok(())
    }
}
