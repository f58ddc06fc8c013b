//! Human-facing milestone reporting.

use tracing::{info, warn};

/// Receives milestone messages while a provisioning run progresses.
pub trait ProgressSink: Send + Sync {
    /// Reports a milestone.
    fn message(&self, text: &str);

    /// Reports a problem that does not stop the run by itself.
    fn error(&self, text: &str);
}

/// Sink that forwards messages to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn message(&self, text: &str) {
        info!(target: "aap_provisioner::progress", "{text}");
    }

    fn error(&self, text: &str) {
        warn!(target: "aap_provisioner::progress", "{text}");
    }
}
