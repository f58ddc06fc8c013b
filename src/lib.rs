//! Core library for the `aap-provision` tool.
//!
//! The crate drives one Ansible Automation Platform (AWX/Tower) job for an
//! image build: it optionally registers the build host in a temporary
//! inventory with a matching machine credential, launches a job or workflow
//! template, waits for it, and removes whatever it created
//! (create → launch → wait → unwind).

pub mod aap;
pub mod config;
pub mod error;
pub mod host;
pub mod progress;
pub mod provision;
pub mod remote;
pub mod test_support;
pub mod unwind;
pub mod wait;

pub use aap::AapClient;
pub use config::{
    Auth, ConfigError, ExtraVars, InventorySource, ProvisionerConfig, ProvisioningConfig,
    ProvisioningConfigBuilder, ServerSettings,
};
pub use error::ErrorKind;
pub use host::{ConnectionKind, EnvHostDiscovery, HostConnectionDetails, HostDetailsError, HostDiscovery};
pub use progress::{ProgressSink, TracingProgress};
pub use provision::{
    CompletedJob, ProvisionError, ProvisionOrchestrator, ProvisionOutcome, ProvisionStage,
};
pub use remote::{AutomationApi, JobSnapshot, JobStatus, LaunchedJob, RemoteError};
pub use unwind::{CleanupFailure, CleanupReport, RemoteResource, UnwindStack};
pub use wait::{JobFailure, JobWaiter, WaitOutcome};
