//! Shared fixtures for the `outputd` integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use blobstore::MemoryBlobAccess;
use blobstore::tree::{Directory, Tree, encode_tree};
use cas_digest::{Digest, DigestFunction, Function, InstanceName};
use outputd::{
    BatchCreateRequest, BatchStatRequest, Collaborators, OutputFile, OutputServiceDirectory,
    RemoteOutputService, ServiceConfig, ServiceError, StartBuildRequest, StartBuildResponse,
};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use vfs::FileStatus;

pub const OUTPUT_PATH_PREFIX: &str = "/home/user/bb_clientd/outputs";

pub struct Harness {
    pub storage: Arc<MemoryBlobAccess>,
    pub sha256: Function,
    pub service: OutputServiceDirectory,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        let storage = Arc::new(MemoryBlobAccess::new());
        let service = OutputServiceDirectory::new(
            config,
            Collaborators::in_memory(storage.clone(), 1 << 20),
        );
        Self {
            storage,
            sha256: Function::new(InstanceName::default(), DigestFunction::Sha256),
            service,
        }
    }

    pub fn start_request(output_base: &str, build_id: &str) -> StartBuildRequest {
        StartBuildRequest {
            output_base_id: output_base.to_owned(),
            build_id: build_id.to_owned(),
            digest_function: "SHA256".to_owned(),
            output_path_prefix: OUTPUT_PATH_PREFIX.to_owned(),
            output_path_aliases: BTreeMap::new(),
            ..StartBuildRequest::default()
        }
    }

    pub fn start_build(
        &self,
        output_base: &str,
        build_id: &str,
    ) -> Result<StartBuildResponse, ServiceError> {
        self.service
            .start_build(&Self::start_request(output_base, build_id))
    }

    /// Stores `contents` and returns an output file referring to it.
    pub fn file(&self, path: &str, contents: &[u8]) -> OutputFile {
        OutputFile {
            path: path.to_owned(),
            digest: self.storage.insert(&self.sha256, contents).to_proto(),
            is_executable: false,
        }
    }

    /// Stores an encoded tree and returns its digest.
    pub fn tree(&self, root: Directory, children: Vec<Directory>) -> Digest {
        self.storage
            .insert(&self.sha256, &encode_tree(&Tree { root, children }))
    }

    pub fn create_files(&self, build_id: &str, files: Vec<OutputFile>) -> Result<(), ServiceError> {
        self.service.batch_create(&BatchCreateRequest {
            build_id: build_id.to_owned(),
            files,
            ..BatchCreateRequest::default()
        })
    }

    pub fn stat(&self, build_id: &str, path: &str) -> Result<Option<FileStatus>, ServiceError> {
        self.stat_with(build_id, path, false, true)
    }

    pub fn stat_with(
        &self,
        build_id: &str,
        path: &str,
        follow_symlinks: bool,
        include_file_digest: bool,
    ) -> Result<Option<FileStatus>, ServiceError> {
        let mut response = self.service.batch_stat(&BatchStatRequest {
            build_id: build_id.to_owned(),
            paths: vec![path.to_owned()],
            follow_symlinks,
            include_file_digest,
        })?;
        assert_eq!(response.responses.len(), 1);
        Ok(response.responses.remove(0).file_status)
    }

    /// Number of `FindMissing` calls issued so far.
    pub fn find_missing_calls(&self) -> usize {
        self.storage.find_missing_batches().len()
    }
}

/// A tracing event recorded by [`capture_logs`].
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    pub level: tracing::Level,
    pub target: String,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

#[derive(Clone, Default)]
struct CapturingLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S> Layer<S> for CapturingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CapturedEvent {
                level: *metadata.level(),
                target: metadata.target().to_owned(),
                message: visitor.message.unwrap_or_default(),
                fields: visitor.fields,
            });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: BTreeMap<String, String>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let value = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_owned(), value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_owned());
        } else {
            self.fields
                .insert(field.name().to_owned(), value.to_owned());
        }
    }
}

/// Runs `f` with a subscriber that records every event emitted on the
/// current thread.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, Vec<CapturedEvent>) {
    let layer = CapturingLayer::default();
    let events = Arc::clone(&layer.events);
    let subscriber = tracing_subscriber::registry().with(layer);
    let result = tracing::subscriber::with_default(subscriber, f);
    let events = std::mem::take(&mut *events.lock().unwrap_or_else(PoisonError::into_inner));
    (result, events)
}
