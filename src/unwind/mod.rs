//! Reverse-order teardown of temporary controller resources.
//!
//! Each successful creation pushes one entry. Unwinding walks the entries
//! newest first, so the credential goes before the host and the host before
//! its inventory. Deletes run under their own grace timeout and ignore
//! run cancellation; one failed delete never skips the rest.

use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

use crate::remote::{AutomationApi, CredentialId, HostId, InventoryId, RemoteError};

/// Temporary resource created during a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RemoteResource {
    /// Temporary inventory.
    Inventory(InventoryId),
    /// Host registered in the temporary inventory.
    Host(HostId),
    /// Machine credential attached to the launch.
    Credential(CredentialId),
}

impl fmt::Display for RemoteResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inventory(id) => write!(f, "inventory {id}"),
            Self::Host(id) => write!(f, "host {id}"),
            Self::Credential(id) => write!(f, "credential {id}"),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct UndoAction {
    resource: RemoteResource,
    retain: bool,
}

/// Ordered record of resources awaiting teardown.
#[derive(Clone, Debug, Default)]
pub struct UnwindStack {
    actions: Vec<UndoAction>,
}

impl UnwindStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly created resource. Retained resources are reported
    /// but never deleted.
    pub fn push(&mut self, resource: RemoteResource, retain: bool) {
        self.actions.push(UndoAction { resource, retain });
    }

    /// Returns the registered resources in creation order.
    #[must_use]
    pub fn resources(&self) -> Vec<RemoteResource> {
        self.actions.iter().map(|action| action.resource).collect()
    }

    /// Returns `true` when nothing was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Deletes every non-retained resource, newest first.
    pub async fn unwind<A>(self, api: &A, grace: Duration) -> CleanupReport
    where
        A: AutomationApi + ?Sized,
    {
        let mut report = CleanupReport::default();
        for action in self.actions.into_iter().rev() {
            let resource = action.resource;
            if action.retain {
                info!(%resource, "retaining temporary resource");
                report.retained.push(resource);
                continue;
            }
            match delete_with_grace(api, resource, grace).await {
                Ok(()) => {
                    info!(%resource, "deleted temporary resource");
                    report.removed.push(resource);
                }
                Err(error) => {
                    warn!(%resource, %error, "failed to delete temporary resource");
                    report.failures.push(CleanupFailure { resource, error });
                }
            }
        }
        report
    }
}

async fn delete_with_grace<A>(
    api: &A,
    resource: RemoteResource,
    grace: Duration,
) -> Result<(), RemoteError>
where
    A: AutomationApi + ?Sized,
{
    let delete = match resource {
        RemoteResource::Inventory(id) => api.delete_inventory(id),
        RemoteResource::Host(id) => api.delete_host(id),
        RemoteResource::Credential(id) => api.delete_credential(id),
    };
    tokio::time::timeout(grace, delete)
        .await
        .map_err(|_| RemoteError::Deadline {
            operation: format!("delete {resource}"),
            timeout: grace,
        })?
}

/// Delete that did not succeed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CleanupFailure {
    /// Resource left behind.
    pub resource: RemoteResource,
    /// Reason the delete failed.
    pub error: RemoteError,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.resource, self.error)
    }
}

/// Result of an unwind, in teardown order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CleanupReport {
    /// Resources deleted.
    pub removed: Vec<RemoteResource>,
    /// Resources kept on request.
    pub retained: Vec<RemoteResource>,
    /// Deletes that failed or timed out.
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    /// Returns `true` when every delete succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Joins the failures into a single line, if there are any.
    #[must_use]
    pub fn failure_summary(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        Some(
            self.failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}
