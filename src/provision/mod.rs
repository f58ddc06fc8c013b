//! Orchestrates one provisioning run against the automation controller.
//!
//! The workflow optionally creates a temporary inventory, host, and machine
//! credential, launches the configured template, and waits for the job.
//! Every creation is registered on an [`UnwindStack`] and torn down in
//! reverse once the workflow ends, whether it succeeded, failed, or was
//! cancelled. Cleanup problems are reported alongside the primary result and
//! never replace it.

mod error;

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{InventorySource, ProvisioningConfig};
use crate::host::{CredentialMaterial, HostConnectionDetails, HostDiscovery};
use crate::progress::ProgressSink;
use crate::remote::{
    AutomationApi, CredentialId, CredentialKind, CredentialRequest, HostRequest, InventoryId,
    InventoryRequest, JobSnapshot, LaunchRequest, LaunchedJob, OrganizationId,
};
use crate::unwind::{CleanupReport, RemoteResource, UnwindStack};
use crate::wait::{DEFAULT_OUTPUT_GRACE, JobFailure, JobWaiter, WaitOutcome, cancellable};

pub use error::{ProvisionError, ProvisionStage};

/// Upper bound on each cleanup delete.
pub const DEFAULT_CLEANUP_GRACE: Duration = Duration::from_secs(30);

/// Description attached to temporary inventories.
pub const INVENTORY_DESCRIPTION: &str = "Temporary inventory for packer provisioning";

const INVENTORY_NAME_PREFIX: &str = "packer-inv";

/// Job that finished successfully.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompletedJob {
    /// Launched job handle.
    pub job: LaunchedJob,
    /// Final status snapshot.
    pub snapshot: JobSnapshot,
}

/// Everything a run produced: its result, what it created, and how cleanup
/// went.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionOutcome {
    /// Primary result of the workflow.
    pub result: Result<CompletedJob, ProvisionError>,
    /// Temporary resources created, in creation order.
    pub created: Vec<RemoteResource>,
    /// Teardown report.
    pub cleanup: CleanupReport,
}

impl ProvisionOutcome {
    /// Returns `true` when the job succeeded. Cleanup failures do not change
    /// the answer.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    /// Formats the primary error with any cleanup failures appended.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        let message = match &self.result {
            Ok(_) => return None,
            Err(err) => err.to_string(),
        };
        Some(append_cleanup_note(message, self.cleanup.failure_summary()))
    }
}

fn append_cleanup_note(message: String, cleanup_failures: Option<String>) -> String {
    if let Some(failures) = cleanup_failures {
        format!("{message} (cleanup also failed: {failures})")
    } else {
        message
    }
}

/// Executes the provisioning workflow using the provided collaborators.
#[derive(Debug)]
pub struct ProvisionOrchestrator<A, D, P> {
    api: A,
    discovery: D,
    progress: P,
    cleanup_grace: Duration,
    output_grace: Duration,
}

struct CredentialScope<'a> {
    organization_id: OrganizationId,
    run_token: &'a str,
    retain: bool,
}

struct TemporaryInventory {
    inventory_id: InventoryId,
    credential_id: Option<CredentialId>,
}

impl<A, D, P> ProvisionOrchestrator<A, D, P>
where
    A: AutomationApi,
    D: HostDiscovery,
    P: ProgressSink,
{
    /// Creates a new orchestrator.
    #[must_use]
    pub const fn new(api: A, discovery: D, progress: P) -> Self {
        Self {
            api,
            discovery,
            progress,
            cleanup_grace: DEFAULT_CLEANUP_GRACE,
            output_grace: DEFAULT_OUTPUT_GRACE,
        }
    }

    /// Overrides the per-delete cleanup timeout.
    ///
    /// This is primarily used by tests to keep slow-delete scenarios fast.
    #[must_use]
    pub const fn with_cleanup_grace(mut self, grace: Duration) -> Self {
        self.cleanup_grace = grace;
        self
    }

    /// Overrides the bound on the diagnostic output fetch.
    #[must_use]
    pub const fn with_output_grace(mut self, grace: Duration) -> Self {
        self.output_grace = grace;
        self
    }

    /// Runs the workflow and unwinds every temporary resource it created.
    ///
    /// Cancelling `token` stops the workflow at the next remote call or
    /// poll sleep; cleanup still runs under its own grace timeout.
    pub async fn execute(
        &self,
        config: &ProvisioningConfig,
        token: &CancellationToken,
    ) -> ProvisionOutcome {
        let mut unwind = UnwindStack::new();
        let result = self.run_workflow(config, token, &mut unwind).await;
        match &result {
            Ok(completed) => info!(job = %completed.job, "provisioning succeeded"),
            Err(err) => warn!(error = %err, kind = %err.kind(), "provisioning failed"),
        }

        let created = unwind.resources();
        if !unwind.is_empty() {
            self.progress.message("Cleaning up temporary resources");
        }
        let cleanup = unwind.unwind(&self.api, self.cleanup_grace).await;
        self.report_cleanup(&cleanup);

        ProvisionOutcome {
            result,
            created,
            cleanup,
        }
    }

    async fn run_workflow(
        &self,
        config: &ProvisioningConfig,
        token: &CancellationToken,
        unwind: &mut UnwindStack,
    ) -> Result<CompletedJob, ProvisionError> {
        let (inventory_id, credential_id) = match config.inventory() {
            InventorySource::Existing(id) => {
                self.progress
                    .message(&format!("Using existing inventory {id}"));
                (id, None)
            }
            InventorySource::Dynamic { organization_id } => {
                let temporary = self
                    .provision_temporary(config, organization_id, token, unwind)
                    .await?;
                (temporary.inventory_id, temporary.credential_id)
            }
        };

        let request = LaunchRequest {
            target: config.target(),
            inventory_id,
            credential_id,
            extra_vars: config.extra_vars().clone(),
        };
        let job = cancellable(token, self.api.launch_job(&request))
            .await
            .map_err(|err| {
                ProvisionError::from_remote(ProvisionStage::Launch, ProvisionError::Launch, err)
            })?;
        info!(%job, inventory = %inventory_id, "launched job");
        self.progress.message(&format!("Launched {job}"));

        let waiter = JobWaiter::new(config.timeout(), config.poll_interval())
            .with_output_grace(self.output_grace);
        match waiter.wait(&self.api, &job, token).await {
            WaitOutcome::Succeeded(snapshot) => {
                self.progress
                    .message(&format!("{job} completed successfully"));
                Ok(CompletedJob { job, snapshot })
            }
            WaitOutcome::Failed(JobFailure::Reported { snapshot, detail }) => {
                Err(ProvisionError::JobFailed {
                    job,
                    status: snapshot.status,
                    detail,
                })
            }
            WaitOutcome::Failed(JobFailure::Poll(source)) => {
                Err(ProvisionError::Poll { job, source })
            }
            WaitOutcome::TimedOut { .. } => Err(ProvisionError::Timeout {
                job,
                timeout: config.timeout(),
            }),
            WaitOutcome::Cancelled => Err(ProvisionError::Cancelled {
                stage: ProvisionStage::Wait,
            }),
        }
    }

    async fn provision_temporary(
        &self,
        config: &ProvisioningConfig,
        organization_id: OrganizationId,
        token: &CancellationToken,
        unwind: &mut UnwindStack,
    ) -> Result<TemporaryInventory, ProvisionError> {
        let details = self
            .discovery
            .discover()
            .map_err(ProvisionError::HostDiscovery)?;
        let material = if config.create_credential() {
            Some(
                details
                    .credential_material()
                    .map_err(ProvisionError::HostDiscovery)?,
            )
        } else {
            None
        };
        let run_token = Uuid::new_v4().simple().to_string();

        let inventory_request = InventoryRequest {
            name: format!("{INVENTORY_NAME_PREFIX}-{run_token}"),
            description: INVENTORY_DESCRIPTION.to_owned(),
            organization_id,
        };
        let inventory_id = cancellable(token, self.api.create_inventory(&inventory_request))
            .await
            .map_err(|err| {
                ProvisionError::from_remote(
                    ProvisionStage::Inventory,
                    ProvisionError::Inventory,
                    err,
                )
            })?;
        unwind.push(
            RemoteResource::Inventory(inventory_id),
            config.keep_temp_inventory(),
        );
        info!(inventory = %inventory_id, name = %inventory_request.name, "created temporary inventory");
        self.progress
            .message(&format!("Created temporary inventory {inventory_id}"));

        let host_request = HostRequest::from_details(inventory_id, &details);
        let host_id = cancellable(token, self.api.create_host(&host_request))
            .await
            .map_err(|err| {
                ProvisionError::from_remote(ProvisionStage::Host, ProvisionError::Host, err)
            })?;
        unwind.push(RemoteResource::Host(host_id), config.keep_temp_inventory());
        info!(host = %host_id, address = %details.address, "registered host");
        self.progress.message(&format!(
            "Registered host {} ({})",
            details.address,
            details.kind.as_str()
        ));

        let credential_id = match material {
            Some(secret) => {
                let scope = CredentialScope {
                    organization_id,
                    run_token: &run_token,
                    retain: config.keep_temp_credential(),
                };
                Some(
                    self.create_credential(&scope, &details, secret, token, unwind)
                        .await?,
                )
            }
            None => None,
        };

        Ok(TemporaryInventory {
            inventory_id,
            credential_id,
        })
    }

    async fn create_credential(
        &self,
        scope: &CredentialScope<'_>,
        details: &HostConnectionDetails,
        material: CredentialMaterial,
        token: &CancellationToken,
        unwind: &mut UnwindStack,
    ) -> Result<CredentialId, ProvisionError> {
        let (kind, secret) = credential_parts(material);
        let request = CredentialRequest {
            name: format!("{}-{}", kind.name_prefix(), scope.run_token),
            kind,
            organization_id: scope.organization_id,
            username: details.username.clone(),
            secret,
        };
        let credential_id = cancellable(token, self.api.create_credential(&request))
            .await
            .map_err(|err| {
                ProvisionError::from_remote(
                    ProvisionStage::Credential,
                    ProvisionError::Credential,
                    err,
                )
            })?;
        unwind.push(RemoteResource::Credential(credential_id), scope.retain);
        info!(credential = %credential_id, name = %request.name, "created machine credential");
        self.progress
            .message(&format!("Created machine credential {credential_id}"));
        Ok(credential_id)
    }

    fn report_cleanup(&self, cleanup: &CleanupReport) {
        for resource in &cleanup.retained {
            self.progress
                .message(&format!("Keeping temporary {resource}"));
        }
        for failure in &cleanup.failures {
            self.progress
                .error(&format!("Failed to delete temporary {failure}"));
        }
    }
}

fn credential_parts(material: CredentialMaterial) -> (CredentialKind, String) {
    match material {
        CredentialMaterial::PrivateKey(key) => (CredentialKind::SshKey, key),
        CredentialMaterial::Password(password) => (CredentialKind::Password, password),
        CredentialMaterial::WinRmPassword(password) => (CredentialKind::WinRm, password),
    }
}
