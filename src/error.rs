//! Error classification shared by every layer.

use std::fmt;

/// Coarse classification of a failure, independent of the layer raising it.
///
/// Callers that need to distinguish a transport failure from a job-reported
/// failure inspect the kind rather than matching on concrete error types.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// A static precondition was violated before any remote call was made.
    ConfigurationInvalid,
    /// Required local discovery data was absent or unreadable.
    ConfigurationMissing,
    /// The remote server rejected a call or returned a malformed response.
    RemoteRejected,
    /// A named lookup (for example a credential type) had no match.
    NotFound,
    /// The job did not reach a terminal state within the configured budget.
    Timeout,
    /// External cancellation was observed.
    Cancelled,
    /// The job reached a terminal failed state.
    JobFailed,
}

impl ErrorKind {
    /// Returns a stable, lowercase label suitable for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConfigurationInvalid => "configuration_invalid",
            Self::ConfigurationMissing => "configuration_missing",
            Self::RemoteRejected => "remote_rejected",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::JobFailed => "job_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
