//! Request and response messages of the remote output service, and the
//! [`RemoteOutputService`] trait that serves them.

use std::collections::BTreeMap;

use cas_digest::DigestProto;
use vfs::FileStatus;

use crate::error::ServiceError;

/// Removes all data stored for an output base.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CleanRequest {
    /// Output base to remove. Must be a single pathname component.
    pub output_base_id: String,
}

/// Announces the start of a build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct StartBuildRequest {
    /// Output base whose output path the build uses.
    pub output_base_id: String,
    /// Identifier of the build, used by all later calls.
    pub build_id: String,
    /// Instance name of the Content Addressable Storage.
    pub instance_name: String,
    /// Name of the digest function, such as `SHA256`.
    pub digest_function: String,
    /// Absolute path at which the client expects output paths to appear.
    pub output_path_prefix: String,
    /// Absolute paths that refer to the output path, mapped to locations
    /// relative to it. Symbolic links pointing into an alias are resolved
    /// through the output path.
    pub output_path_aliases: BTreeMap<String, String>,
}

/// Response to [`StartBuildRequest`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct StartBuildResponse {
    /// Location of the output path relative to the output path prefix.
    pub output_path_suffix: String,
}

/// A regular file to create.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct OutputFile {
    /// Location relative to the path prefix.
    pub path: String,
    /// Digest of the file contents.
    pub digest: DigestProto,
    /// Whether the executable bit is set.
    pub is_executable: bool,
}

/// A directory to create from a tree stored in the CAS.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct OutputDirectory {
    /// Location relative to the path prefix.
    pub path: String,
    /// Digest of the tree message.
    pub tree_digest: DigestProto,
}

/// A symbolic link to create.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct OutputSymlink {
    /// Location relative to the path prefix.
    pub path: String,
    /// Literal target.
    pub target: String,
}

/// Creates files, directories and symbolic links in the output path.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BatchCreateRequest {
    /// Build on whose output path the outputs are created.
    pub build_id: String,
    /// Directory, relative to the output path, under which all paths are
    /// resolved. Missing directories are created.
    pub path_prefix: String,
    /// Whether the contents of the path prefix are removed first.
    pub clean_path_prefix: bool,
    /// Files to create.
    pub files: Vec<OutputFile>,
    /// Directories to create.
    pub directories: Vec<OutputDirectory>,
    /// Symbolic links to create.
    pub symlinks: Vec<OutputSymlink>,
}

/// Obtains the status of paths in the output path.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BatchStatRequest {
    /// Build on whose output path the paths are resolved.
    pub build_id: String,
    /// Paths relative to the output path.
    pub paths: Vec<String>,
    /// Whether a symbolic link in the final component is followed.
    pub follow_symlinks: bool,
    /// Whether file statuses carry a digest.
    pub include_file_digest: bool,
}

/// Status of a single path of a [`BatchStatRequest`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StatResponse {
    /// Status of the path, or `None` if it does not exist.
    pub file_status: Option<FileStatus>,
}

/// Response to [`BatchStatRequest`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BatchStatResponse {
    /// One entry per requested path, in request order.
    pub responses: Vec<StatResponse>,
}

/// Announces the completion of a build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FinalizeBuildRequest {
    /// Build that completed.
    pub build_id: String,
}

/// The RPC surface of the remote output service.
pub trait RemoteOutputService: Send + Sync {
    /// Removes the output path of an output base, whether or not it is
    /// currently known to the service.
    fn clean(&self, request: &CleanRequest) -> Result<(), ServiceError>;

    /// Starts a build, creating the output path if needed.
    fn start_build(&self, request: &StartBuildRequest)
    -> Result<StartBuildResponse, ServiceError>;

    /// Creates outputs in the output path of a running build.
    fn batch_create(&self, request: &BatchCreateRequest) -> Result<(), ServiceError>;

    /// Reports the status of paths in the output path of a running build.
    fn batch_stat(&self, request: &BatchStatRequest) -> Result<BatchStatResponse, ServiceError>;

    /// Completes a build. Unknown build IDs are ignored.
    fn finalize_build(&self, request: &FinalizeBuildRequest) -> Result<(), ServiceError>;
}
