//! JSON shapes exchanged with the controller.

use serde::Deserialize;

/// Response carrying the identifier of a created record.
#[derive(Debug, Deserialize)]
pub(super) struct CreatedRecord {
    #[serde(default)]
    pub(super) id: Option<u64>,
}

/// Response of a template launch.
///
/// Job templates answer with `job`, workflow templates with `workflow_job`;
/// both also echo `id`.
#[derive(Debug, Deserialize)]
pub(super) struct LaunchResponse {
    #[serde(default)]
    pub(super) id: Option<u64>,
    #[serde(default)]
    pub(super) job: Option<u64>,
    #[serde(default)]
    pub(super) workflow_job: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct JobDetail {
    #[serde(default)]
    pub(super) status: String,
    #[serde(default)]
    pub(super) failed: bool,
    #[serde(default)]
    pub(super) job_explanation: Option<String>,
}

/// One entry of the credential type listing.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct CredentialTypeEntry {
    /// Credential type identifier.
    pub id: u64,
    /// Display name, matched case-sensitively.
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct CredentialTypePage {
    #[serde(default)]
    pub(super) results: Vec<CredentialTypeEntry>,
    #[serde(default)]
    pub(super) next: Option<String>,
}
