//! Remote resource abstraction for the automation controller.
//!
//! Every operation maps onto exactly one controller resource and holds no
//! orchestration logic. Implementations never retry; a failed call leaves no
//! local state behind.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value, json};

use crate::host::{ConnectionKind, HostConnectionDetails, WINRM_HTTP_PORT, WINRM_HTTPS_PORT};

mod error;
mod ids;

pub use error::RemoteError;
pub use ids::{
    CredentialId, CredentialTypeId, HostId, InventoryId, JobId, OrganizationId, TemplateId,
};

/// Name of the built-in credential type used for machine access.
pub const MACHINE_CREDENTIAL_TYPE: &str = "Machine";

/// Future returned by remote operations.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// Parameters for creating a temporary inventory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InventoryRequest {
    /// Unique inventory name.
    pub name: String,
    /// Free-form description shown in the controller UI.
    pub description: String,
    /// Organisation owning the inventory.
    pub organization_id: OrganizationId,
}

/// Parameters for creating a host inside an inventory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostRequest {
    /// Inventory receiving the host.
    pub inventory_id: InventoryId,
    /// Host address, also used as the host name.
    pub address: String,
    /// Connection port.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Transport the controller should use.
    pub kind: ConnectionKind,
}

impl HostRequest {
    /// Builds a host request from discovered connection details.
    #[must_use]
    pub fn from_details(inventory_id: InventoryId, details: &HostConnectionDetails) -> Self {
        Self {
            inventory_id,
            address: details.address.clone(),
            port: details.port,
            username: details.username.clone(),
            kind: details.kind,
        }
    }

    /// Returns the Ansible host variables for this host.
    ///
    /// Authentication secrets are never embedded; the launched job receives
    /// them through the temporary credential instead.
    #[must_use]
    pub fn variables(&self) -> Map<String, Value> {
        let mut vars = Map::new();
        vars.insert("ansible_host".into(), json!(self.address));
        vars.insert("ansible_port".into(), json!(self.port));
        vars.insert("ansible_user".into(), json!(self.username));
        vars.insert("ansible_connection".into(), json!(self.kind.as_str()));

        if self.kind == ConnectionKind::WinRm {
            vars.insert("ansible_winrm_server_cert_validation".into(), json!("ignore"));
            vars.insert("ansible_winrm_transport".into(), json!("basic"));
            vars.insert("ansible_become_method".into(), json!("runas"));
            vars.insert("ansible_become".into(), json!("yes"));
            vars.insert("ansible_become_user".into(), json!("Administrator"));
            match self.port {
                WINRM_HTTP_PORT => {
                    vars.insert("ansible_winrm_scheme".into(), json!("http"));
                }
                WINRM_HTTPS_PORT => {
                    vars.insert("ansible_winrm_scheme".into(), json!("https"));
                }
                _ => {}
            }
        }
        vars
    }
}

/// Flavour of machine credential to create.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CredentialKind {
    /// SSH private key authentication.
    SshKey,
    /// SSH password authentication.
    Password,
    /// `WinRM` password authentication.
    WinRm,
}

impl CredentialKind {
    /// Returns the name prefix used for credentials of this kind.
    #[must_use]
    pub const fn name_prefix(self) -> &'static str {
        match self {
            Self::SshKey => "packer-ssh-cred",
            Self::Password => "packer-password-cred",
            Self::WinRm => "packer-winrm-cred",
        }
    }

    /// Returns the description attached to credentials of this kind.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::SshKey => "SSH credential for Packer builds",
            Self::Password => "SSH password credential for Packer builds",
            Self::WinRm => "WinRM credential for Packer builds",
        }
    }
}

/// Parameters for creating a machine credential.
#[derive(Clone, Eq, PartialEq)]
pub struct CredentialRequest {
    /// Unique credential name.
    pub name: String,
    /// Credential flavour, selecting the input fields.
    pub kind: CredentialKind,
    /// Organisation owning the credential.
    pub organization_id: OrganizationId,
    /// Login user.
    pub username: String,
    /// Private key data or password, depending on [`CredentialRequest::kind`].
    pub secret: String,
}

impl CredentialRequest {
    /// Returns the `inputs` object for the controller's credential payload.
    #[must_use]
    pub fn inputs(&self) -> Value {
        match self.kind {
            CredentialKind::SshKey => json!({
                "username": self.username,
                "ssh_key_data": self.secret,
            }),
            CredentialKind::Password | CredentialKind::WinRm => json!({
                "username": self.username,
                "password": self.secret,
            }),
        }
    }
}

impl fmt::Debug for CredentialRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRequest")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("organization_id", &self.organization_id)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Template to launch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobTarget {
    /// A job template.
    JobTemplate(TemplateId),
    /// A workflow job template.
    WorkflowTemplate(TemplateId),
}

/// Parameters for launching a job or workflow.
#[derive(Clone, Debug, PartialEq)]
pub struct LaunchRequest {
    /// Template to launch.
    pub target: JobTarget,
    /// Inventory to run against.
    pub inventory_id: InventoryId,
    /// Credential to attach, when one was created for this run.
    pub credential_id: Option<CredentialId>,
    /// Extra variables passed through verbatim.
    pub extra_vars: Map<String, Value>,
}

/// Kind of job produced by a launch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobKind {
    /// A playbook job launched from a job template.
    Job,
    /// A workflow job launched from a workflow job template.
    Workflow,
}

/// Handle for a launched job.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LaunchedJob {
    /// Identifier assigned by the controller.
    pub id: JobId,
    /// Whether the job is a playbook job or a workflow job.
    pub kind: JobKind,
}

impl fmt::Display for LaunchedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            JobKind::Job => write!(f, "job {}", self.id),
            JobKind::Workflow => write!(f, "workflow job {}", self.id),
        }
    }
}

/// Coarse job status derived from the controller's status string.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobStatus {
    /// The job is queued, waiting, or running.
    Pending,
    /// The job finished successfully.
    Successful,
    /// The job finished unsuccessfully (failed, errored, or was cancelled).
    Failed,
}

impl JobStatus {
    /// Maps a controller status string onto a [`JobStatus`].
    #[must_use]
    pub fn from_wire(status: &str) -> Self {
        match status {
            "successful" => Self::Successful,
            "failed" | "error" | "canceled" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Latest status snapshot of a job.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobSnapshot {
    /// Raw status string reported by the controller.
    pub status: String,
    /// Explicit failure flag reported by the controller.
    pub failed: bool,
    /// Explanation supplied by the controller, if any.
    pub explanation: Option<String>,
}

impl JobSnapshot {
    /// Returns the coarse status, honouring the explicit failure flag.
    #[must_use]
    pub fn state(&self) -> JobStatus {
        if self.failed {
            return JobStatus::Failed;
        }
        JobStatus::from_wire(&self.status)
    }
}

/// Typed operations against the automation controller.
pub trait AutomationApi: Send + Sync {
    /// Creates an inventory and returns its identifier.
    fn create_inventory<'a>(
        &'a self,
        request: &'a InventoryRequest,
    ) -> RemoteFuture<'a, InventoryId>;

    /// Deletes an inventory.
    fn delete_inventory(&self, id: InventoryId) -> RemoteFuture<'_, ()>;

    /// Creates a host and returns its identifier.
    fn create_host<'a>(&'a self, request: &'a HostRequest) -> RemoteFuture<'a, HostId>;

    /// Deletes a host.
    fn delete_host(&self, id: HostId) -> RemoteFuture<'_, ()>;

    /// Resolves a credential type by exact, case-sensitive name.
    fn resolve_credential_type_id<'a>(
        &'a self,
        name: &'a str,
    ) -> RemoteFuture<'a, CredentialTypeId>;

    /// Creates a machine credential and returns its identifier.
    fn create_credential<'a>(
        &'a self,
        request: &'a CredentialRequest,
    ) -> RemoteFuture<'a, CredentialId>;

    /// Deletes a credential.
    fn delete_credential(&self, id: CredentialId) -> RemoteFuture<'_, ()>;

    /// Launches a job or workflow.
    fn launch_job<'a>(&'a self, request: &'a LaunchRequest) -> RemoteFuture<'a, LaunchedJob>;

    /// Fetches a single status snapshot.
    fn job_status<'a>(&'a self, job: &'a LaunchedJob) -> RemoteFuture<'a, JobSnapshot>;

    /// Fetches captured output, when the job kind has any.
    fn job_output<'a>(&'a self, job: &'a LaunchedJob) -> RemoteFuture<'a, Option<String>>;
}
