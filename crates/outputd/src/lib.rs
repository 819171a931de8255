#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `outputd` implements a remote output service. Build clients store their
//! outputs as references to blobs in the Content Addressable Storage instead
//! of downloading them, and the service exposes those references as a
//! virtual filesystem. Each client directory ("output base") gets its own
//! output path, which appears as a child of [`OutputServiceDirectory`].
//!
//! # Design
//!
//! - [`RemoteOutputService`] is the RPC surface: `Clean`, `StartBuild`,
//!   `BatchCreate`, `BatchStat` and `FinalizeBuild`.
//!   [`OutputServiceDirectory`] implements it together with
//!   [`vfs::Directory`], so the same object serves build clients and
//!   filesystem clients.
//! - Output paths are created through an [`OutputPathFactory`]. The
//!   [`InMemoryOutputPathFactory`] keeps them in memory.
//! - At the start of every build, files and lazily loaded directories whose
//!   blobs disappeared from storage are removed from the output path, with
//!   `FindMissing` calls batched per [`ServiceConfig::find_missing_batch_size`]
//!   distinct digests.
//! - Paths in requests are resolved component by component. `BatchCreate`
//!   creates parent directories as it goes. `BatchStat` stops at symbolic
//!   links that leave the output path and reports where resolution has to
//!   continue, honouring the aliases passed to `StartBuild`.
//!
//! # Invariants
//!
//! - A build ID is associated with at most one output base, and an output
//!   base runs at most one build. Starting a new build on an output base
//!   closes the previous one.
//! - The registry lock is never held while calling into output path trees or
//!   storage.
//! - `BatchCreate` validates every digest and tree size before modifying the
//!   output path.
//! - Directory enumeration cookies are assigned once per output path and
//!   never reused.
//!
//! # Errors
//!
//! All RPCs return [`ServiceError`], which carries a [`Code`] and a message
//! that is prefixed with context as the error travels outwards.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use blobstore::MemoryBlobAccess;
//! use cas_digest::{DigestFunction, Function, InstanceName};
//! use outputd::{
//!     BatchCreateRequest, BatchStatRequest, Collaborators, FinalizeBuildRequest, OutputFile,
//!     OutputServiceDirectory, RemoteOutputService, ServiceConfig, StartBuildRequest,
//! };
//! use vfs::FileStatus;
//!
//! let storage = Arc::new(MemoryBlobAccess::new());
//! let sha256 = Function::new(InstanceName::default(), DigestFunction::Sha256);
//! let digest = storage.insert(&sha256, b"Hello");
//!
//! let service = OutputServiceDirectory::new(
//!     ServiceConfig::default(),
//!     Collaborators::in_memory(storage, 1 << 20),
//! );
//! let started = service.start_build(&StartBuildRequest {
//!     output_base_id: "ob1".to_owned(),
//!     build_id: "b1".to_owned(),
//!     digest_function: "SHA256".to_owned(),
//!     output_path_prefix: "/home/user/outputs".to_owned(),
//!     ..StartBuildRequest::default()
//! })?;
//! assert_eq!(started.output_path_suffix, "ob1");
//!
//! service.batch_create(&BatchCreateRequest {
//!     build_id: "b1".to_owned(),
//!     path_prefix: "bazel-out".to_owned(),
//!     files: vec![OutputFile {
//!         path: "k8-fastbuild/bin/hello.txt".to_owned(),
//!         digest: digest.to_proto(),
//!         is_executable: false,
//!     }],
//!     ..BatchCreateRequest::default()
//! })?;
//!
//! let stat = service.batch_stat(&BatchStatRequest {
//!     build_id: "b1".to_owned(),
//!     paths: vec!["bazel-out/k8-fastbuild/bin/hello.txt".to_owned()],
//!     include_file_digest: true,
//!     ..BatchStatRequest::default()
//! })?;
//! assert_eq!(
//!     stat.responses[0].file_status,
//!     Some(FileStatus::File { digest: Some(digest), is_executable: false }),
//! );
//!
//! service.finalize_build(&FinalizeBuildRequest { build_id: "b1".to_owned() })?;
//! # Ok::<(), outputd::ServiceError>(())
//! ```

mod config;
mod error;
mod filter;
mod output_path;
mod protocol;
mod registry;
mod service;
mod walkers;

pub use crate::config::{DEFAULT_MAXIMUM_TREE_SIZE_BYTES, ServiceConfig, ServiceConfigBuilder};
pub use crate::error::{Code, ServiceError};
pub use crate::output_path::{InMemoryOutputPathFactory, OutputPath, OutputPathFactory};
pub use crate::protocol::{
    BatchCreateRequest, BatchStatRequest, BatchStatResponse, CleanRequest, FinalizeBuildRequest,
    OutputDirectory, OutputFile, OutputSymlink, RemoteOutputService, StartBuildRequest,
    StartBuildResponse, StatResponse,
};
pub use crate::service::{
    Collaborators, NoopRemovalNotifier, OutputServiceDirectory, RemovalNotifier,
};
