//! Automation controller (AAP/AWX) implementation of [`AutomationApi`].

mod credentials;
mod jobs;
mod resources;
mod wire;

use std::time::Duration;

use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{Auth, ServerSettings};
use crate::remote::{
    AutomationApi, CredentialId, CredentialRequest, CredentialTypeId, HostId, HostRequest,
    InventoryId, InventoryRequest, JobSnapshot, LaunchRequest, LaunchedJob, RemoteError,
    RemoteFuture,
};

pub use credentials::CredentialTypePages;
pub use wire::CredentialTypeEntry;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the controller REST API.
///
/// Authentication, TLS policy, and the base timeout are fixed at construction;
/// the value is cheap to clone and never mutated afterwards.
#[derive(Clone, Debug)]
pub struct AapClient {
    http: reqwest::Client,
    base_url: Url,
    api_root: String,
    auth: Auth,
}

impl AapClient {
    /// Builds a client from validated server settings.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Transport`] when the HTTP client cannot be
    /// initialised (for example when the TLS backend fails to load).
    pub fn new(settings: &ServerSettings) -> Result<Self, RemoteError> {
        Self::with_timeout(settings, HTTP_TIMEOUT)
    }

    /// Builds a client with an explicit per-request timeout.
    ///
    /// # Errors
    ///
    /// See [`AapClient::new`].
    pub fn with_timeout(settings: &ServerSettings, timeout: Duration) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(settings.insecure_skip_verify)
            .build()
            .map_err(|err| RemoteError::Transport {
                operation: String::from("build http client"),
                message: err.to_string(),
            })?;
        let api_root = format!(
            "{}/{}",
            settings.base_url.as_str().trim_end_matches('/'),
            settings.api_prefix.trim_matches('/')
        );
        Ok(Self {
            http,
            base_url: settings.base_url.clone(),
            api_root,
            auth: settings.auth.clone(),
        })
    }

    /// Returns the absolute URL of an API path such as `inventories/`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_root, path.trim_start_matches('/'))
    }

    /// Rebases a pagination cursor onto the configured server.
    ///
    /// Relative cursors resolve against the page that returned them.
    /// Controllers behind proxies report absolute `next` links with their
    /// internal host name, so only the path and query are kept.
    fn rebase(&self, current: &Url, next: &str) -> Result<Url, RemoteError> {
        let parsed = current.join(next).map_err(|err| RemoteError::Malformed {
            operation: String::from("list credential types"),
            message: format!("invalid next cursor: {err}"),
            body: next.to_owned(),
        })?;
        let mut rebased = self.base_url.clone();
        rebased.set_path(parsed.path());
        rebased.set_query(parsed.query());
        Ok(rebased)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::Basic { username, password } => builder.basic_auth(username, Some(password)),
            Auth::Bearer { token } => builder.bearer_auth(token),
        }
    }

    /// Sends a request and returns the body of a successful response.
    async fn execute(&self, operation: &str, builder: RequestBuilder) -> Result<String, RemoteError> {
        let request = self.authorize(builder);
        let response = request.send().await.map_err(|err| RemoteError::Transport {
            operation: operation.to_owned(),
            message: err.to_string(),
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|err| RemoteError::Transport {
            operation: operation.to_owned(),
            message: err.to_string(),
        })?;
        debug!(operation, status = status.as_u16(), "controller responded");

        if status.is_success() {
            return Ok(body);
        }
        Err(RemoteError::Rejected {
            operation: operation.to_owned(),
            status: status.as_u16(),
            body,
        })
    }

    async fn get(&self, operation: &str, url: &str) -> Result<String, RemoteError> {
        debug!(operation, url, "GET");
        self.execute(operation, self.http.get(url)).await
    }

    async fn post(
        &self,
        operation: &str,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<String, RemoteError> {
        debug!(operation, url, "POST");
        self.execute(operation, self.http.post(url).json(payload))
            .await
    }

    async fn delete(&self, operation: &str, url: &str) -> Result<(), RemoteError> {
        debug!(operation, url, "DELETE");
        self.execute(operation, self.http.delete(url)).await?;
        Ok(())
    }
}

fn parse_body<T: DeserializeOwned>(operation: &str, body: &str) -> Result<T, RemoteError> {
    serde_json::from_str(body).map_err(|err| RemoteError::Malformed {
        operation: operation.to_owned(),
        message: err.to_string(),
        body: body.to_owned(),
    })
}

fn require_id(operation: &str, id: Option<u64>, body: &str) -> Result<u64, RemoteError> {
    match id {
        Some(value) if value != 0 => Ok(value),
        _ => Err(RemoteError::Malformed {
            operation: operation.to_owned(),
            message: String::from("missing or zero id"),
            body: body.to_owned(),
        }),
    }
}

impl AutomationApi for AapClient {
    fn create_inventory<'a>(
        &'a self,
        request: &'a InventoryRequest,
    ) -> RemoteFuture<'a, InventoryId> {
        Box::pin(async move { self.post_inventory(request).await })
    }

    fn delete_inventory(&self, id: InventoryId) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            let url = self.endpoint(&format!("inventories/{id}/"));
            self.delete("delete inventory", &url).await
        })
    }

    fn create_host<'a>(&'a self, request: &'a HostRequest) -> RemoteFuture<'a, HostId> {
        Box::pin(async move { self.post_host(request).await })
    }

    fn delete_host(&self, id: HostId) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            let url = self.endpoint(&format!("hosts/{id}/"));
            self.delete("delete host", &url).await
        })
    }

    fn resolve_credential_type_id<'a>(
        &'a self,
        name: &'a str,
    ) -> RemoteFuture<'a, CredentialTypeId> {
        Box::pin(async move { self.find_credential_type(name).await })
    }

    fn create_credential<'a>(
        &'a self,
        request: &'a CredentialRequest,
    ) -> RemoteFuture<'a, CredentialId> {
        Box::pin(async move { self.post_credential(request).await })
    }

    fn delete_credential(&self, id: CredentialId) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            let url = self.endpoint(&format!("credentials/{id}/"));
            self.delete("delete credential", &url).await
        })
    }

    fn launch_job<'a>(&'a self, request: &'a LaunchRequest) -> RemoteFuture<'a, LaunchedJob> {
        Box::pin(async move { self.post_launch(request).await })
    }

    fn job_status<'a>(&'a self, job: &'a LaunchedJob) -> RemoteFuture<'a, JobSnapshot> {
        Box::pin(async move { self.fetch_status(job).await })
    }

    fn job_output<'a>(&'a self, job: &'a LaunchedJob) -> RemoteFuture<'a, Option<String>> {
        Box::pin(async move { self.fetch_stdout(job).await })
    }
}
