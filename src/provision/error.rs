//! Errors surfaced by the provisioning workflow.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::error::ErrorKind;
use crate::host::HostDetailsError;
use crate::remote::{LaunchedJob, RemoteError};

/// Workflow step, used to report where a cancellation landed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProvisionStage {
    /// Creating the temporary inventory.
    Inventory,
    /// Registering the build host.
    Host,
    /// Creating the machine credential.
    Credential,
    /// Launching the template.
    Launch,
    /// Waiting for the job.
    Wait,
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Inventory => "inventory creation",
            Self::Host => "host registration",
            Self::Credential => "credential creation",
            Self::Launch => "job launch",
            Self::Wait => "job wait",
        };
        f.write_str(label)
    }
}

/// Errors surfaced while provisioning through the controller.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProvisionError {
    /// Raised when the build host's connection details are incomplete.
    #[error("host connection details unavailable: {0}")]
    HostDiscovery(#[source] HostDetailsError),
    /// Raised when the temporary inventory cannot be created.
    #[error("failed to create temporary inventory: {0}")]
    Inventory(#[source] RemoteError),
    /// Raised when the build host cannot be registered.
    #[error("failed to register host: {0}")]
    Host(#[source] RemoteError),
    /// Raised when the machine credential cannot be created.
    #[error("failed to create machine credential: {0}")]
    Credential(#[source] RemoteError),
    /// Raised when the launch request is rejected.
    #[error("failed to launch job: {0}")]
    Launch(#[source] RemoteError),
    /// Raised when a status fetch fails.
    #[error("failed to poll {job}: {source}")]
    Poll {
        /// Job being polled.
        job: LaunchedJob,
        /// Underlying remote error.
        #[source]
        source: RemoteError,
    },
    /// Raised when the job finishes unsuccessfully.
    #[error("{job} finished with status '{status}'{}", detail_suffix(.detail.as_deref()))]
    JobFailed {
        /// Failed job.
        job: LaunchedJob,
        /// Raw terminal status.
        status: String,
        /// Explanation or output tail, when available.
        detail: Option<String>,
    },
    /// Raised when the job is still running after the configured timeout.
    #[error("{job} did not finish within {}s", .timeout.as_secs())]
    Timeout {
        /// Job left running.
        job: LaunchedJob,
        /// Configured timeout.
        timeout: Duration,
    },
    /// Raised when the run is cancelled.
    #[error("provisioning cancelled during {stage}")]
    Cancelled {
        /// Step in progress when cancellation was observed.
        stage: ProvisionStage,
    },
}

fn detail_suffix(detail: Option<&str>) -> String {
    detail.map_or_else(String::new, |text| format!(": {text}"))
}

impl ProvisionError {
    /// Wraps a remote error, keeping cancellation distinct from rejection.
    pub(crate) fn from_remote(
        stage: ProvisionStage,
        wrap: fn(RemoteError) -> Self,
        source: RemoteError,
    ) -> Self {
        if source.is_cancelled() {
            Self::Cancelled { stage }
        } else {
            wrap(source)
        }
    }

    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::HostDiscovery(err) => err.kind(),
            Self::Inventory(err)
            | Self::Host(err)
            | Self::Credential(err)
            | Self::Launch(err)
            | Self::Poll { source: err, .. } => err.kind(),
            Self::JobFailed { .. } => ErrorKind::JobFailed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }
}
