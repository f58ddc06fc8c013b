//! HTTP-level tests for the controller client against a mock server.

use std::time::Duration;

use aap_provisioner::host::ConnectionKind;
use aap_provisioner::remote::{
    CredentialId, CredentialKind, CredentialRequest, HostRequest, InventoryId, InventoryRequest,
    JobId, JobKind, JobTarget, LaunchRequest, LaunchedJob, OrganizationId, TemplateId,
};
use aap_provisioner::{AapClient, AutomationApi, ErrorKind, ProvisioningConfig, RemoteError};
use rstest::*;
use serde_json::{Value, json};
use wiremock::matchers::{
    body_partial_json, header, method, path, query_param, query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API: &str = "/api/controller/v2";

fn client_for(server: &MockServer, token: Option<&str>) -> AapClient {
    let mut builder = ProvisioningConfig::builder()
        .tower_host(server.uri())
        .job_template_id(Some(1))
        .inventory_id(Some(1));
    builder = match token {
        Some(value) => builder.access_token(Some(value.to_owned())),
        None => builder
            .username(Some(String::from("admin")))
            .password(Some(String::from("secret"))),
    };
    let config = builder
        .build()
        .unwrap_or_else(|err| panic!("mock server config should be valid: {err}"));
    AapClient::new(config.server()).unwrap_or_else(|err| panic!("client should build: {err}"))
}

fn inventory_request() -> InventoryRequest {
    InventoryRequest {
        name: String::from("packer-inv-abc"),
        description: String::from("Temporary inventory for packer provisioning"),
        organization_id: OrganizationId::new(3),
    }
}

async fn last_body(server: &MockServer) -> Value {
    let requests = server.received_requests().await.unwrap_or_default();
    let last = requests
        .last()
        .unwrap_or_else(|| panic!("mock server should have received a request"));
    serde_json::from_slice(&last.body).unwrap_or_else(|err| panic!("body should be JSON: {err}"))
}

#[rstest]
#[tokio::test]
async fn create_inventory_returns_identifier() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/inventories/")))
        .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
        .and(body_partial_json(json!({
            "name": "packer-inv-abc",
            "description": "Temporary inventory for packer provisioning",
            "organization": 3,
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 123})))
        .expect(1)
        .mount(&server)
        .await;

    let id = client_for(&server, None)
        .create_inventory(&inventory_request())
        .await
        .unwrap_or_else(|err| panic!("inventory creation should succeed: {err}"));

    assert_eq!(id, InventoryId::new(123));
}

#[rstest]
#[tokio::test]
async fn bearer_token_is_sent_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/inventories/")))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 5})))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server, Some("tok-123"))
        .create_inventory(&inventory_request())
        .await;

    assert_eq!(result, Ok(InventoryId::new(5)));
}

#[rstest]
#[case::bad_request(400, r#"{"name":["already exists"]}"#)]
#[case::server_error(503, "maintenance")]
#[tokio::test]
async fn non_success_status_is_rejected(#[case] status: u16, #[case] body: &str) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/inventories/")))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(&server)
        .await;

    let err = client_for(&server, None)
        .create_inventory(&inventory_request())
        .await
        .err()
        .unwrap_or_else(|| panic!("status {status} should fail"));

    assert_eq!(err.status(), Some(status));
    assert_eq!(err.kind(), ErrorKind::RemoteRejected);
    assert!(err.to_string().contains(body), "{err}");
}

#[rstest]
#[case::zero_id(r#"{"id": 0}"#)]
#[case::missing_id(r#"{"name": "x"}"#)]
#[case::not_json("<html>")]
#[tokio::test]
async fn unusable_body_is_rejected(#[case] body: &str) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/inventories/")))
        .respond_with(ResponseTemplate::new(201).set_body_string(body))
        .mount(&server)
        .await;

    let result = client_for(&server, None)
        .create_inventory(&inventory_request())
        .await;

    assert!(
        matches!(result, Err(RemoteError::Malformed { .. })),
        "unexpected result: {result:?}"
    );
}

#[rstest]
#[tokio::test]
async fn create_host_encodes_variables_as_json_string() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/hosts/")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 456})))
        .expect(1)
        .mount(&server)
        .await;
    let request = HostRequest {
        inventory_id: InventoryId::new(123),
        address: String::from("10.0.0.5"),
        port: 5985,
        username: String::from("Administrator"),
        kind: ConnectionKind::WinRm,
    };

    let id = client_for(&server, None)
        .create_host(&request)
        .await
        .unwrap_or_else(|err| panic!("host creation should succeed: {err}"));

    assert_eq!(id.get(), 456);
    let body = last_body(&server).await;
    assert_eq!(body.get("name"), Some(&json!("10.0.0.5")));
    assert_eq!(body.get("inventory"), Some(&json!(123)));
    let raw_variables = body
        .get("variables")
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("variables should be a string: {body}"));
    let variables: Value = serde_json::from_str(raw_variables)
        .unwrap_or_else(|err| panic!("variables should hold JSON: {err}"));
    assert_eq!(variables.get("ansible_connection"), Some(&json!("winrm")));
    assert_eq!(variables.get("ansible_winrm_scheme"), Some(&json!("http")));
    assert_eq!(variables.get("ansible_port"), Some(&json!(5985)));
}

#[rstest]
#[tokio::test]
async fn credential_type_lookup_follows_next_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/credential_types/")))
        .and(query_param("page_size", "200"))
        .and(query_param_is_missing("page"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 1, "name": "Vault"}, {"id": 2, "name": "machine"}],
            "next": "https://controller.internal/api/controller/v2/credential_types/?page=2&page_size=200",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/credential_types/")))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 17, "name": "Machine"}],
            "next": null,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = client_for(&server, None)
        .resolve_credential_type_id("Machine")
        .await
        .unwrap_or_else(|err| panic!("lookup should succeed: {err}"));

    assert_eq!(id.get(), 17);
}

#[rstest]
#[tokio::test]
async fn credential_type_lookup_stops_when_cursors_cycle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/credential_types/")))
        .and(query_param_is_missing("page"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 1, "name": "Vault"}],
            "next": "?page=2&page_size=200",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/credential_types/")))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 4, "name": "Source Control"}],
            "next": "?page_size=200",
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server, None);

    let lookup = tokio::time::timeout(
        Duration::from_secs(5),
        client.resolve_credential_type_id("Machine"),
    )
    .await
    .unwrap_or_else(|_| panic!("lookup should finish despite the cursor cycle"));

    let err = lookup
        .err()
        .unwrap_or_else(|| panic!("lookup should fail without a match"));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let message = err.to_string();
    assert!(
        message.ends_with("available: Vault (ID: 1), Source Control (ID: 4)"),
        "{message}"
    );
}

#[rstest]
#[tokio::test]
async fn credential_type_lookup_lists_available_types() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/credential_types/")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 1, "name": "Vault"}, {"id": 4, "name": "Source Control"}],
            "next": null,
        })))
        .mount(&server)
        .await;

    let err = client_for(&server, None)
        .resolve_credential_type_id("Machine")
        .await
        .err()
        .unwrap_or_else(|| panic!("lookup should fail"));

    assert_eq!(err.kind(), ErrorKind::NotFound);
    let message = err.to_string();
    assert!(message.contains("Vault (ID: 1)"), "{message}");
    assert!(message.contains("Source Control (ID: 4)"), "{message}");
}

#[rstest]
#[tokio::test]
async fn credential_pages_are_walked_lazily() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/credential_types/")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 1, "name": "Vault"}],
            "next": null,
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server, None);
    let mut pages = client.credential_type_pages();

    let first = pages.next_page().await;
    let second = pages.next_page().await;

    assert!(matches!(first, Some(Ok(ref entries)) if entries.len() == 1));
    assert!(second.is_none());
}

#[rstest]
#[tokio::test]
async fn create_credential_resolves_machine_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/credential_types/")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 1, "name": "Machine"}],
            "next": null,
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/credentials/")))
        .and(body_partial_json(json!({
            "name": "packer-ssh-cred-abc",
            "credential_type": 1,
            "organization": 3,
            "inputs": {"username": "ec2-user", "ssh_key_data": "-----BEGIN KEY-----"},
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9})))
        .expect(1)
        .mount(&server)
        .await;
    let request = CredentialRequest {
        name: String::from("packer-ssh-cred-abc"),
        kind: CredentialKind::SshKey,
        organization_id: OrganizationId::new(3),
        username: String::from("ec2-user"),
        secret: String::from("-----BEGIN KEY-----"),
    };

    let id = client_for(&server, None)
        .create_credential(&request)
        .await
        .unwrap_or_else(|err| panic!("credential creation should succeed: {err}"));

    assert_eq!(id, CredentialId::new(9));
}

#[rstest]
#[tokio::test]
async fn create_credential_wraps_lookup_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/credential_types/")))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;
    let request = CredentialRequest {
        name: String::from("packer-password-cred-abc"),
        kind: CredentialKind::Password,
        organization_id: OrganizationId::new(3),
        username: String::from("builder"),
        secret: String::from("pw"),
    };

    let err = client_for(&server, None)
        .create_credential(&request)
        .await
        .err()
        .unwrap_or_else(|| panic!("credential creation should fail"));

    assert!(matches!(err, RemoteError::Prerequisite { .. }), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::RemoteRejected);
}

#[rstest]
#[tokio::test]
async fn launch_job_template_attaches_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/job_templates/42/launch/")))
        .and(body_partial_json(json!({
            "inventory": 123,
            "credentials": [9],
            "extra_vars": {"image": "rhel9"},
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"job": 77, "id": 77})))
        .expect(1)
        .mount(&server)
        .await;
    let request = LaunchRequest {
        target: JobTarget::JobTemplate(TemplateId::new(42)),
        inventory_id: InventoryId::new(123),
        credential_id: Some(CredentialId::new(9)),
        extra_vars: json!({"image": "rhel9"})
            .as_object()
            .cloned()
            .unwrap_or_default(),
    };

    let job = client_for(&server, None)
        .launch_job(&request)
        .await
        .unwrap_or_else(|err| panic!("launch should succeed: {err}"));

    assert_eq!(
        job,
        LaunchedJob {
            id: JobId::new(77),
            kind: JobKind::Job
        }
    );
}

#[rstest]
#[tokio::test]
async fn launch_without_credential_omits_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{API}/workflow_job_templates/8/launch/")))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"workflow_job": 88, "id": 88})),
        )
        .expect(1)
        .mount(&server)
        .await;
    let request = LaunchRequest {
        target: JobTarget::WorkflowTemplate(TemplateId::new(8)),
        inventory_id: InventoryId::new(5),
        credential_id: None,
        extra_vars: serde_json::Map::new(),
    };

    let job = client_for(&server, None)
        .launch_job(&request)
        .await
        .unwrap_or_else(|err| panic!("launch should succeed: {err}"));

    assert_eq!(job.kind, JobKind::Workflow);
    assert_eq!(job.id, JobId::new(88));
    let body = last_body(&server).await;
    assert!(body.get("credentials").is_none(), "{body}");
    assert_eq!(body.get("workflow_template"), Some(&json!(8)));
}

#[rstest]
#[case::job(JobKind::Job, "jobs/77/")]
#[case::workflow(JobKind::Workflow, "workflow_jobs/77/")]
#[tokio::test]
async fn job_status_reads_kind_specific_endpoint(#[case] kind: JobKind, #[case] endpoint: &str) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/{endpoint}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "failed",
            "failed": true,
            "job_explanation": "",
        })))
        .expect(1)
        .mount(&server)
        .await;
    let job = LaunchedJob {
        id: JobId::new(77),
        kind,
    };

    let snapshot = client_for(&server, None)
        .job_status(&job)
        .await
        .unwrap_or_else(|err| panic!("status should be readable: {err}"));

    assert_eq!(snapshot.status, "failed");
    assert!(snapshot.failed);
    assert_eq!(snapshot.explanation, None);
}

#[rstest]
#[tokio::test]
async fn job_output_returns_plain_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/jobs/77/stdout/")))
        .and(query_param("format", "txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("TASK [fail] fatal"))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server, None);

    let output = client
        .job_output(&LaunchedJob {
            id: JobId::new(77),
            kind: JobKind::Job,
        })
        .await;
    let workflow_output = client
        .job_output(&LaunchedJob {
            id: JobId::new(77),
            kind: JobKind::Workflow,
        })
        .await;

    assert_eq!(output, Ok(Some(String::from("TASK [fail] fatal"))));
    assert_eq!(workflow_output, Ok(None));
}

#[rstest]
#[tokio::test]
async fn delete_of_missing_resource_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{API}/inventories/123/")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server, None)
        .delete_inventory(InventoryId::new(123))
        .await;

    assert!(matches!(
        result,
        Err(RemoteError::Rejected { status: 404, .. })
    ));
}

#[rstest]
#[tokio::test]
async fn custom_api_prefix_is_honoured() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v2/hosts/456/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let config = ProvisioningConfig::builder()
        .tower_host(server.uri())
        .access_token(Some(String::from("tok")))
        .job_template_id(Some(1))
        .inventory_id(Some(1))
        .api_prefix("api/v2")
        .build()
        .unwrap_or_else(|err| panic!("config should be valid: {err}"));
    let client =
        AapClient::new(config.server()).unwrap_or_else(|err| panic!("client should build: {err}"));

    let result = client
        .delete_host(aap_provisioner::remote::HostId::new(456))
        .await;

    assert_eq!(result, Ok(()));
}
