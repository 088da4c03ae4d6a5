//! Host status sink: where initialisation results, playlist sizes and fatal
//! errors are reported as formatted lines.

/// Receives human readable status lines from visualiser elements.
pub trait StatusSink: Send + Sync {
    fn info(&self, line: &str);
    fn error(&self, line: &str);
}

/// Default sink that forwards every line to `tracing` under the `status`
/// target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn info(&self, line: &str) {
        tracing::info!(target: "status", "{line}");
    }

    fn error(&self, line: &str) {
        tracing::error!(target: "status", "{line}");
    }
}
