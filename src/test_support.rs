//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::host::{HostConnectionDetails, HostDetailsError, HostDiscovery};
use crate::progress::ProgressSink;
use crate::remote::{
    AutomationApi, CredentialId, CredentialKind, CredentialRequest, CredentialTypeId, HostId,
    HostRequest, InventoryId, InventoryRequest, JobId, JobSnapshot, LaunchRequest, LaunchedJob,
    RemoteError, RemoteFuture,
};

/// Operations exposed by [`AutomationApi`], used to script failures and
/// delays.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ApiOperation {
    /// `create_inventory`.
    CreateInventory,
    /// `delete_inventory`.
    DeleteInventory,
    /// `create_host`.
    CreateHost,
    /// `delete_host`.
    DeleteHost,
    /// `resolve_credential_type_id`.
    ResolveCredentialType,
    /// `create_credential`.
    CreateCredential,
    /// `delete_credential`.
    DeleteCredential,
    /// `launch_job`.
    LaunchJob,
    /// `job_status`.
    JobStatus,
    /// `job_output`.
    JobOutput,
}

/// Records a single call made through [`ScriptedApi`].
#[derive(Clone, Debug, PartialEq)]
pub enum ApiCall {
    /// Inventory creation with the requested name.
    CreateInventory(InventoryRequest),
    /// Inventory deletion.
    DeleteInventory(InventoryId),
    /// Host creation.
    CreateHost(HostRequest),
    /// Host deletion.
    DeleteHost(HostId),
    /// Credential type lookup by name.
    ResolveCredentialType(String),
    /// Credential creation; the secret is not recorded.
    CreateCredential {
        /// Requested credential name.
        name: String,
        /// Requested credential flavour.
        kind: CredentialKind,
    },
    /// Credential deletion.
    DeleteCredential(CredentialId),
    /// Job launch.
    LaunchJob(LaunchRequest),
    /// Status fetch.
    JobStatus(JobId),
    /// Output fetch.
    JobOutput(JobId),
}

impl ApiCall {
    /// Returns the operation this call exercised.
    #[must_use]
    pub const fn operation(&self) -> ApiOperation {
        match self {
            Self::CreateInventory(_) => ApiOperation::CreateInventory,
            Self::DeleteInventory(_) => ApiOperation::DeleteInventory,
            Self::CreateHost(_) => ApiOperation::CreateHost,
            Self::DeleteHost(_) => ApiOperation::DeleteHost,
            Self::ResolveCredentialType(_) => ApiOperation::ResolveCredentialType,
            Self::CreateCredential { .. } => ApiOperation::CreateCredential,
            Self::DeleteCredential(_) => ApiOperation::DeleteCredential,
            Self::LaunchJob(_) => ApiOperation::LaunchJob,
            Self::JobStatus(_) => ApiOperation::JobStatus,
            Self::JobOutput(_) => ApiOperation::JobOutput,
        }
    }
}

/// Identifier assigned to the scripted inventory.
pub const SCRIPTED_INVENTORY_ID: u64 = 101;
/// Identifier assigned to the scripted host.
pub const SCRIPTED_HOST_ID: u64 = 202;
/// Identifier assigned to the scripted credential.
pub const SCRIPTED_CREDENTIAL_ID: u64 = 303;
/// Identifier assigned to the scripted job.
pub const SCRIPTED_JOB_ID: u64 = 404;

#[derive(Debug, Default)]
struct State {
    calls: Vec<ApiCall>,
    failures: HashMap<ApiOperation, RemoteError>,
    delays: HashMap<ApiOperation, Duration>,
    statuses: VecDeque<JobSnapshot>,
    last_status: Option<JobSnapshot>,
    output: Option<String>,
}

/// In-memory [`AutomationApi`] that records calls and replays scripted
/// responses.
///
/// Status snapshots are served in FIFO order; once the queue drains the last
/// snapshot repeats. Without any scripted status the job reports
/// `successful`.
#[derive(Clone, Debug, Default)]
pub struct ScriptedApi {
    state: Arc<Mutex<State>>,
}

/// Builds a status snapshot without a failure flag or explanation.
#[must_use]
pub fn job_snapshot(status: &str) -> JobSnapshot {
    JobSnapshot {
        status: status.to_owned(),
        failed: false,
        explanation: None,
    }
}

impl ScriptedApi {
    /// Creates a double that succeeds on every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Makes every call of `operation` fail with `error`.
    pub fn fail_on(&self, operation: ApiOperation, error: RemoteError) {
        self.with_state(|state| state.failures.insert(operation, error));
    }

    /// Delays every call of `operation` before it responds.
    pub fn delay(&self, operation: ApiOperation, duration: Duration) {
        self.with_state(|state| state.delays.insert(operation, duration));
    }

    /// Queues status snapshots returned by `job_status`.
    pub fn push_statuses(&self, snapshots: impl IntoIterator<Item = JobSnapshot>) {
        self.with_state(|state| state.statuses.extend(snapshots));
    }

    /// Sets the text returned by `job_output`.
    pub fn set_output(&self, output: impl Into<String>) {
        self.with_state(|state| state.output = Some(output.into()));
    }

    /// Returns a snapshot of all calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.with_state(|state| state.calls.clone())
    }

    /// Returns the recorded operations in call order.
    #[must_use]
    pub fn operations(&self) -> Vec<ApiOperation> {
        self.with_state(|state| state.calls.iter().map(ApiCall::operation).collect())
    }

    /// Counts the calls made to `operation`.
    #[must_use]
    pub fn count(&self, operation: ApiOperation) -> usize {
        self.with_state(|state| {
            state
                .calls
                .iter()
                .filter(|call| call.operation() == operation)
                .count()
        })
    }

    /// Returns the recorded launch request, if a launch happened.
    #[must_use]
    pub fn launch_request(&self) -> Option<LaunchRequest> {
        self.with_state(|state| {
            state.calls.iter().find_map(|call| match call {
                ApiCall::LaunchJob(request) => Some(request.clone()),
                _ => None,
            })
        })
    }

    async fn respond<T>(&self, call: ApiCall, value: T) -> Result<T, RemoteError> {
        let operation = call.operation();
        let (delay, failure) = self.with_state(|state| {
            state.calls.push(call);
            (
                state.delays.get(&operation).copied(),
                state.failures.get(&operation).cloned(),
            )
        });
        if let Some(duration) = delay {
            tokio::time::sleep(duration).await;
        }
        failure.map_or(Ok(value), Err)
    }

    fn next_status(&self) -> JobSnapshot {
        self.with_state(|state| {
            if let Some(next) = state.statuses.pop_front() {
                state.last_status = Some(next.clone());
                return next;
            }
            state
                .last_status
                .clone()
                .unwrap_or_else(|| job_snapshot("successful"))
        })
    }
}

impl AutomationApi for ScriptedApi {
    fn create_inventory<'a>(
        &'a self,
        request: &'a InventoryRequest,
    ) -> RemoteFuture<'a, InventoryId> {
        Box::pin(async move {
            self.respond(
                ApiCall::CreateInventory(request.clone()),
                InventoryId::new(SCRIPTED_INVENTORY_ID),
            )
            .await
        })
    }

    fn delete_inventory(&self, id: InventoryId) -> RemoteFuture<'_, ()> {
        Box::pin(async move { self.respond(ApiCall::DeleteInventory(id), ()).await })
    }

    fn create_host<'a>(&'a self, request: &'a HostRequest) -> RemoteFuture<'a, HostId> {
        Box::pin(async move {
            self.respond(
                ApiCall::CreateHost(request.clone()),
                HostId::new(SCRIPTED_HOST_ID),
            )
            .await
        })
    }

    fn delete_host(&self, id: HostId) -> RemoteFuture<'_, ()> {
        Box::pin(async move { self.respond(ApiCall::DeleteHost(id), ()).await })
    }

    fn resolve_credential_type_id<'a>(
        &'a self,
        name: &'a str,
    ) -> RemoteFuture<'a, CredentialTypeId> {
        Box::pin(async move {
            self.respond(
                ApiCall::ResolveCredentialType(name.to_owned()),
                CredentialTypeId::new(1),
            )
            .await
        })
    }

    fn create_credential<'a>(
        &'a self,
        request: &'a CredentialRequest,
    ) -> RemoteFuture<'a, CredentialId> {
        Box::pin(async move {
            self.respond(
                ApiCall::CreateCredential {
                    name: request.name.clone(),
                    kind: request.kind,
                },
                CredentialId::new(SCRIPTED_CREDENTIAL_ID),
            )
            .await
        })
    }

    fn delete_credential(&self, id: CredentialId) -> RemoteFuture<'_, ()> {
        Box::pin(async move { self.respond(ApiCall::DeleteCredential(id), ()).await })
    }

    fn launch_job<'a>(&'a self, request: &'a LaunchRequest) -> RemoteFuture<'a, LaunchedJob> {
        Box::pin(async move {
            let kind = match request.target {
                crate::remote::JobTarget::JobTemplate(_) => crate::remote::JobKind::Job,
                crate::remote::JobTarget::WorkflowTemplate(_) => crate::remote::JobKind::Workflow,
            };
            self.respond(
                ApiCall::LaunchJob(request.clone()),
                LaunchedJob {
                    id: JobId::new(SCRIPTED_JOB_ID),
                    kind,
                },
            )
            .await
        })
    }

    fn job_status<'a>(&'a self, job: &'a LaunchedJob) -> RemoteFuture<'a, JobSnapshot> {
        Box::pin(async move {
            let snapshot = self.next_status();
            self.respond(ApiCall::JobStatus(job.id), snapshot).await
        })
    }

    fn job_output<'a>(&'a self, job: &'a LaunchedJob) -> RemoteFuture<'a, Option<String>> {
        Box::pin(async move {
            let output = self.with_state(|state| state.output.clone());
            self.respond(ApiCall::JobOutput(job.id), output).await
        })
    }
}

/// Discovery that returns a fixed result.
#[derive(Clone, Debug)]
pub struct StaticDiscovery {
    result: Result<HostConnectionDetails, HostDetailsError>,
}

impl StaticDiscovery {
    /// Discovery that always yields `details`.
    #[must_use]
    pub const fn found(details: HostConnectionDetails) -> Self {
        Self {
            result: Ok(details),
        }
    }

    /// Discovery that always fails with `error`.
    #[must_use]
    pub const fn failing(error: HostDetailsError) -> Self {
        Self { result: Err(error) }
    }
}

impl HostDiscovery for StaticDiscovery {
    fn discover(&self) -> Result<HostConnectionDetails, HostDetailsError> {
        self.result.clone()
    }
}

/// Message captured by [`RecordingProgress`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProgressEvent {
    /// A milestone.
    Message(String),
    /// A reported problem.
    Error(String),
}

/// Progress sink that keeps every message for later assertions.
#[derive(Clone, Debug, Default)]
pub struct RecordingProgress {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl RecordingProgress {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded event in order.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns only the milestone messages.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::Message(text) => Some(text),
                ProgressEvent::Error(_) => None,
            })
            .collect()
    }

    fn push(&self, event: ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl ProgressSink for RecordingProgress {
    fn message(&self, text: &str) {
        self.push(ProgressEvent::Message(text.to_owned()));
    }

    fn error(&self, text: &str) {
        self.push(ProgressEvent::Error(text.to_owned()));
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        Self::apply(pairs, &[]).await
    }

    /// Sets `pairs` and removes `removed` while holding a global mutex.
    pub async fn apply(pairs: &[(&str, &str)], removed: &[&str]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs
                    .iter()
                    .map(|(key, _)| *key)
                    .chain(removed.iter().copied())
                    .all(|key| seen.insert(key))
            },
            "duplicate environment variable keys passed to EnvGuard"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len() + removed.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }
        for key in removed {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::remove_var(key) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
