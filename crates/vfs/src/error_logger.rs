use std::error::Error;
use std::sync::Arc;

use vpath::Component;

/// Sink for errors that occur outside of any request, such as failures to
/// load file contents lazily.
pub trait ErrorLogger: Send + Sync {
    /// Records an error.
    fn log(&self, error: &dyn Error);
}

/// Produces an [`ErrorLogger`] for every output path.
pub trait ErrorLoggerFactory: Send + Sync {
    /// Returns the logger used by the output path of `output_base`.
    fn new_logger(&self, output_base: &Component) -> Arc<dyn ErrorLogger>;
}

/// [`ErrorLogger`] that emits errors as `tracing` events.
#[derive(Clone, Debug)]
pub struct TracingErrorLogger {
    output_base: String,
}

impl TracingErrorLogger {
    /// Creates a logger that tags events with `output_base`.
    #[must_use]
    pub fn new(output_base: impl Into<String>) -> Self {
        Self {
            output_base: output_base.into(),
        }
    }
}

impl ErrorLogger for TracingErrorLogger {
    fn log(&self, error: &dyn Error) {
        tracing::error!(
            target: "vfs::cas",
            output_base = %self.output_base,
            error = %error,
            "failed to access CAS-backed file in output base {}: {}",
            self.output_base,
            error
        );
    }
}

/// [`ErrorLoggerFactory`] producing [`TracingErrorLogger`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingErrorLoggerFactory;

impl ErrorLoggerFactory for TracingErrorLoggerFactory {
    fn new_logger(&self, output_base: &Component) -> Arc<dyn ErrorLogger> {
        Arc::new(TracingErrorLogger::new(output_base.as_str()))
    }
}
