//! Job launch, status, and output retrieval.

use serde_json::{Map, Value, json};

use crate::remote::{
    JobId, JobKind, JobSnapshot, JobTarget, LaunchRequest, LaunchedJob, RemoteError,
};

use super::wire::{JobDetail, LaunchResponse};
use super::{AapClient, parse_body, require_id};

impl AapClient {
    pub(super) async fn post_launch(
        &self,
        request: &LaunchRequest,
    ) -> Result<LaunchedJob, RemoteError> {
        const OPERATION: &str = "launch job";
        let mut payload = Map::new();
        payload.insert("inventory".into(), json!(request.inventory_id));
        payload.insert(
            "extra_vars".into(),
            Value::Object(request.extra_vars.clone()),
        );
        if let Some(credential) = request.credential_id {
            payload.insert("credentials".into(), json!([credential]));
        }

        let (path, kind) = match request.target {
            JobTarget::JobTemplate(id) => {
                payload.insert("job_template".into(), json!(id));
                (format!("job_templates/{id}/launch/"), JobKind::Job)
            }
            JobTarget::WorkflowTemplate(id) => {
                payload.insert("workflow_template".into(), json!(id));
                (
                    format!("workflow_job_templates/{id}/launch/"),
                    JobKind::Workflow,
                )
            }
        };

        let body = self
            .post(OPERATION, &self.endpoint(&path), &Value::Object(payload))
            .await?;
        let launched: LaunchResponse = parse_body(OPERATION, &body)?;
        let raw_id = match kind {
            JobKind::Job => launched.job.or(launched.id),
            JobKind::Workflow => launched.workflow_job.or(launched.id),
        };
        let id = require_id(OPERATION, raw_id, &body)?;
        Ok(LaunchedJob {
            id: JobId::new(id),
            kind,
        })
    }

    pub(super) async fn fetch_status(&self, job: &LaunchedJob) -> Result<JobSnapshot, RemoteError> {
        const OPERATION: &str = "poll job";
        let path = match job.kind {
            JobKind::Job => format!("jobs/{}/", job.id),
            JobKind::Workflow => format!("workflow_jobs/{}/", job.id),
        };
        let body = self.get(OPERATION, &self.endpoint(&path)).await?;
        let detail: JobDetail = parse_body(OPERATION, &body)?;
        Ok(JobSnapshot {
            status: detail.status,
            failed: detail.failed,
            explanation: detail
                .job_explanation
                .filter(|text| !text.trim().is_empty()),
        })
    }

    pub(super) async fn fetch_stdout(&self, job: &LaunchedJob) -> Result<Option<String>, RemoteError> {
        if job.kind == JobKind::Workflow {
            return Ok(None);
        }
        let url = self.endpoint(&format!("jobs/{}/stdout/?format=txt", job.id));
        let request = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/plain");
        let body = self.execute("fetch job output", request).await?;
        Ok(Some(body).filter(|text| !text.trim().is_empty()))
    }
}
