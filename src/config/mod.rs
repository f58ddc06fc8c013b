//! Configuration loading via `ortho-config` and validation into an
//! immutable [`ProvisioningConfig`].
//!
//! [`ProvisionerConfig`] mirrors the layered sources (defaults, the
//! `aap-provisioner.toml` file, and `AAP_*` environment variables). It is
//! converted through [`ProvisioningConfigBuilder`], which applies defaults and
//! rejects inconsistent combinations before anything touches the network.

mod error;

use std::fmt;
use std::time::Duration;

use ortho_config::OrthoConfig;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::remote::{InventoryId, JobTarget, OrganizationId, TemplateId};

pub use error::ConfigError;

/// Default API prefix of AAP 2.x controllers.
pub const DEFAULT_API_PREFIX: &str = "/api/controller/v2";

/// Default upper bound on the time spent waiting for a job.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Default delay between two status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

const CONFIG_FILE: &str = "aap-provisioner.toml";

/// Provisioner settings derived from environment variables and configuration
/// files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "AAP",
    discovery(
        app_name = "aap-provisioner",
        env_var = "AAP_PROVISIONER_CONFIG_PATH",
        config_file_name = "aap-provisioner.toml",
        dotfile_name = ".aap-provisioner.toml",
        project_file_name = "aap-provisioner.toml"
    )
)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "configuration struct with user-facing toggle settings that are naturally expressed as booleans"
)]
pub struct ProvisionerConfig {
    /// Controller base URL, for example `https://aap.example.com`.
    pub tower_host: Option<String>,
    /// Username for basic authentication.
    pub username: Option<String>,
    /// Password for basic authentication.
    pub password: Option<String>,
    /// OAuth2 bearer token; replaces username and password.
    pub access_token: Option<String>,
    /// Job template to launch.
    pub job_template_id: Option<u64>,
    /// Workflow job template to launch.
    pub workflow_template_id: Option<u64>,
    /// Existing inventory to run against.
    pub inventory_id: Option<u64>,
    /// Whether to create a temporary inventory for the build host.
    #[ortho_config(default = false)]
    pub dynamic_inventory: bool,
    /// Organization owning temporary inventories and credentials.
    pub organization_id: Option<u64>,
    /// Variables forwarded as `extra_vars` on launch. Files may use a
    /// `[extra_vars]` table; `AAP_EXTRA_VARS` carries a JSON object string.
    #[ortho_config(skip_cli)]
    pub extra_vars: Option<ExtraVars>,
    /// Upper bound on the wait for job completion, in seconds.
    #[ortho_config(default = 900)]
    pub timeout_secs: u64,
    /// Delay between status polls, in seconds.
    #[ortho_config(default = 10)]
    pub poll_interval_secs: u64,
    /// Keep the temporary inventory and host after the run.
    #[ortho_config(default = false)]
    pub keep_temp_inventory: bool,
    /// Keep the temporary machine credential after the run.
    #[ortho_config(default = false)]
    pub keep_temp_credential: bool,
    /// Create a machine credential for the build host and attach it to the
    /// launch.
    #[ortho_config(default = true)]
    pub create_credential: bool,
    /// Accept invalid TLS certificates from the controller.
    #[ortho_config(default = false)]
    pub insecure_skip_verify: bool,
    /// API path prefix; AWX and older Tower releases use `/api/v2`.
    #[ortho_config(default = DEFAULT_API_PREFIX.to_owned())]
    pub api_prefix: String,
}

impl ProvisionerConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("aap-provisioner")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Converts the raw layered values into a builder.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `extra_vars` is not a JSON
    /// object.
    pub fn to_builder(&self) -> Result<ProvisioningConfigBuilder, ConfigError> {
        let mut builder = ProvisioningConfigBuilder::new()
            .username(self.username.clone())
            .password(self.password.clone())
            .access_token(self.access_token.clone())
            .job_template_id(self.job_template_id)
            .workflow_template_id(self.workflow_template_id)
            .inventory_id(self.inventory_id)
            .dynamic_inventory(self.dynamic_inventory)
            .organization_id(self.organization_id)
            .timeout(Duration::from_secs(self.timeout_secs))
            .poll_interval(Duration::from_secs(self.poll_interval_secs))
            .keep_temp_inventory(self.keep_temp_inventory)
            .keep_temp_credential(self.keep_temp_credential)
            .create_credential(self.create_credential)
            .insecure_skip_verify(self.insecure_skip_verify)
            .api_prefix(&self.api_prefix);
        if let Some(host) = &self.tower_host {
            builder = builder.tower_host(host);
        }
        if let Some(vars) = &self.extra_vars {
            builder = builder.extra_vars(vars.to_map()?);
        }
        Ok(builder)
    }

    /// Validates the layered values and produces the immutable run settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required value is missing or two
    /// options conflict.
    pub fn to_provisioning(&self) -> Result<ProvisioningConfig, ConfigError> {
        self.to_builder()?.build()
    }
}

/// Extra variables as written in one configuration source.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtraVars {
    /// A table from the configuration file.
    Table(Map<String, Value>),
    /// A JSON object string, as supplied through the environment.
    Json(String),
}

impl ExtraVars {
    /// Returns the variables as a JSON object. A blank string yields no
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the string is not a JSON object.
    pub fn to_map(&self) -> Result<Map<String, Value>, ConfigError> {
        match self {
            Self::Table(map) => Ok(map.clone()),
            Self::Json(raw) if raw.trim().is_empty() => Ok(Map::new()),
            Self::Json(raw) => parse_extra_vars(raw),
        }
    }
}

fn parse_extra_vars(raw: &str) -> Result<Map<String, Value>, ConfigError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ConfigError::Invalid {
            field: String::from("extra_vars"),
            message: format!("expected a JSON object, found {other}"),
        }),
        Err(err) => Err(ConfigError::Invalid {
            field: String::from("extra_vars"),
            message: err.to_string(),
        }),
    }
}

/// Controller authentication mode.
#[derive(Clone, Eq, PartialEq)]
pub enum Auth {
    /// HTTP basic authentication.
    Basic {
        /// Account name.
        username: String,
        /// Account password.
        password: String,
    },
    /// OAuth2 bearer token.
    Bearer {
        /// Token value.
        token: String,
    },
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// Connection settings for the controller API.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerSettings {
    /// Base URL of the controller.
    pub base_url: Url,
    /// Path prefix of the versioned API, always starting with `/`.
    pub api_prefix: String,
    /// Authentication mode.
    pub auth: Auth,
    /// Accept invalid TLS certificates.
    pub insecure_skip_verify: bool,
}

/// Where the job's inventory comes from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InventorySource {
    /// Run against a pre-existing inventory.
    Existing(InventoryId),
    /// Create a temporary inventory in the given organization.
    Dynamic {
        /// Organization owning the temporary resources.
        organization_id: OrganizationId,
    },
}

/// Validated, immutable settings for one provisioning run.
#[derive(Clone, Debug, PartialEq)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "retention and credential toggles are independent user choices"
)]
pub struct ProvisioningConfig {
    server: ServerSettings,
    target: JobTarget,
    inventory: InventorySource,
    extra_vars: Map<String, Value>,
    timeout: Duration,
    poll_interval: Duration,
    keep_temp_inventory: bool,
    keep_temp_credential: bool,
    create_credential: bool,
}

impl ProvisioningConfig {
    /// Returns a builder with the documented defaults.
    #[must_use]
    pub fn builder() -> ProvisioningConfigBuilder {
        ProvisioningConfigBuilder::new()
    }

    /// Controller connection settings.
    #[must_use]
    pub const fn server(&self) -> &ServerSettings {
        &self.server
    }

    /// Template to launch.
    #[must_use]
    pub const fn target(&self) -> JobTarget {
        self.target
    }

    /// Inventory selection.
    #[must_use]
    pub const fn inventory(&self) -> InventorySource {
        self.inventory
    }

    /// Variables forwarded on launch.
    #[must_use]
    pub const fn extra_vars(&self) -> &Map<String, Value> {
        &self.extra_vars
    }

    /// Upper bound on the wait for job completion.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Delay between status polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Whether the temporary inventory and host survive the run.
    #[must_use]
    pub const fn keep_temp_inventory(&self) -> bool {
        self.keep_temp_inventory
    }

    /// Whether the temporary credential survives the run.
    #[must_use]
    pub const fn keep_temp_credential(&self) -> bool {
        self.keep_temp_credential
    }

    /// Whether a machine credential is created for the build host.
    #[must_use]
    pub const fn create_credential(&self) -> bool {
        self.create_credential
    }

    /// Returns a builder holding exactly these settings.
    ///
    /// Building it again yields an equal value.
    #[must_use]
    pub fn to_builder(&self) -> ProvisioningConfigBuilder {
        let (username, password, access_token) = match &self.server.auth {
            Auth::Basic { username, password } => {
                (Some(username.clone()), Some(password.clone()), None)
            }
            Auth::Bearer { token } => (None, None, Some(token.clone())),
        };
        let (job_template_id, workflow_template_id) = match self.target {
            JobTarget::JobTemplate(id) => (Some(id.get()), None),
            JobTarget::WorkflowTemplate(id) => (None, Some(id.get())),
        };
        let (inventory_id, dynamic_inventory, organization_id) = match self.inventory {
            InventorySource::Existing(id) => (Some(id.get()), false, None),
            InventorySource::Dynamic { organization_id } => {
                (None, true, Some(organization_id.get()))
            }
        };
        ProvisioningConfigBuilder {
            tower_host: self.server.base_url.to_string(),
            username,
            password,
            access_token,
            job_template_id,
            workflow_template_id,
            inventory_id,
            dynamic_inventory,
            organization_id,
            extra_vars: self.extra_vars.clone(),
            timeout: Some(self.timeout),
            poll_interval: Some(self.poll_interval),
            keep_temp_inventory: self.keep_temp_inventory,
            keep_temp_credential: self.keep_temp_credential,
            create_credential: self.create_credential,
            insecure_skip_verify: self.server.insecure_skip_verify,
            api_prefix: Some(self.server.api_prefix.clone()),
        }
    }
}

/// Builder for [`ProvisioningConfig`].
///
/// Identifier setters treat `Some(0)` the same as `None`, matching how the
/// controller reserves zero.
#[derive(Clone, Debug, PartialEq)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "mirrors the user-facing toggles of ProvisionerConfig"
)]
pub struct ProvisioningConfigBuilder {
    tower_host: String,
    username: Option<String>,
    password: Option<String>,
    access_token: Option<String>,
    job_template_id: Option<u64>,
    workflow_template_id: Option<u64>,
    inventory_id: Option<u64>,
    dynamic_inventory: bool,
    organization_id: Option<u64>,
    extra_vars: Map<String, Value>,
    timeout: Option<Duration>,
    poll_interval: Option<Duration>,
    keep_temp_inventory: bool,
    keep_temp_credential: bool,
    create_credential: bool,
    insecure_skip_verify: bool,
    api_prefix: Option<String>,
}

impl Default for ProvisioningConfigBuilder {
    fn default() -> Self {
        Self {
            tower_host: String::new(),
            username: None,
            password: None,
            access_token: None,
            job_template_id: None,
            workflow_template_id: None,
            inventory_id: None,
            dynamic_inventory: false,
            organization_id: None,
            extra_vars: Map::new(),
            timeout: None,
            poll_interval: None,
            keep_temp_inventory: false,
            keep_temp_credential: false,
            create_credential: true,
            insecure_skip_verify: false,
            api_prefix: None,
        }
    }
}

/// Metadata for a configuration field, used to generate actionable error
/// messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to {CONFIG_FILE}",
            self.description, self.env_var, self.toml_key
        ))
    }
}

const TOWER_HOST: FieldMetadata =
    FieldMetadata::new("controller URL", "AAP_TOWER_HOST", "tower_host");
const USERNAME: FieldMetadata =
    FieldMetadata::new("controller username", "AAP_USERNAME", "username");
const PASSWORD: FieldMetadata =
    FieldMetadata::new("controller password", "AAP_PASSWORD", "password");
const ORGANIZATION: FieldMetadata = FieldMetadata::new(
    "organization for the temporary inventory",
    "AAP_ORGANIZATION_ID",
    "organization_id",
);
const INVENTORY: FieldMetadata = FieldMetadata::new(
    "inventory (or enable dynamic_inventory)",
    "AAP_INVENTORY_ID",
    "inventory_id",
);

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

fn non_zero(value: Option<u64>) -> Option<u64> {
    value.filter(|id| *id != 0)
}

fn non_zero_duration(value: Option<Duration>) -> Option<Duration> {
    value.filter(|duration| !duration.is_zero())
}

impl ProvisioningConfigBuilder {
    /// Creates a builder with defaults applied.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the controller base URL.
    #[must_use]
    pub fn tower_host(mut self, value: impl Into<String>) -> Self {
        self.tower_host = value.into();
        self
    }

    /// Sets the basic-auth username.
    #[must_use]
    pub fn username(mut self, value: Option<String>) -> Self {
        self.username = value;
        self
    }

    /// Sets the basic-auth password.
    #[must_use]
    pub fn password(mut self, value: Option<String>) -> Self {
        self.password = value;
        self
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn access_token(mut self, value: Option<String>) -> Self {
        self.access_token = value;
        self
    }

    /// Selects a job template.
    #[must_use]
    pub const fn job_template_id(mut self, value: Option<u64>) -> Self {
        self.job_template_id = value;
        self
    }

    /// Selects a workflow job template.
    #[must_use]
    pub const fn workflow_template_id(mut self, value: Option<u64>) -> Self {
        self.workflow_template_id = value;
        self
    }

    /// Selects an existing inventory.
    #[must_use]
    pub const fn inventory_id(mut self, value: Option<u64>) -> Self {
        self.inventory_id = value;
        self
    }

    /// Requests a temporary inventory.
    #[must_use]
    pub const fn dynamic_inventory(mut self, value: bool) -> Self {
        self.dynamic_inventory = value;
        self
    }

    /// Sets the organization owning temporary resources.
    #[must_use]
    pub const fn organization_id(mut self, value: Option<u64>) -> Self {
        self.organization_id = value;
        self
    }

    /// Sets the launch variables.
    #[must_use]
    pub fn extra_vars(mut self, value: Map<String, Value>) -> Self {
        self.extra_vars = value;
        self
    }

    /// Sets the job timeout; zero selects the default.
    #[must_use]
    pub const fn timeout(mut self, value: Duration) -> Self {
        self.timeout = Some(value);
        self
    }

    /// Sets the poll interval; zero selects the default.
    #[must_use]
    pub const fn poll_interval(mut self, value: Duration) -> Self {
        self.poll_interval = Some(value);
        self
    }

    /// Keeps the temporary inventory and host.
    #[must_use]
    pub const fn keep_temp_inventory(mut self, value: bool) -> Self {
        self.keep_temp_inventory = value;
        self
    }

    /// Keeps the temporary credential.
    #[must_use]
    pub const fn keep_temp_credential(mut self, value: bool) -> Self {
        self.keep_temp_credential = value;
        self
    }

    /// Enables or disables machine credential creation.
    #[must_use]
    pub const fn create_credential(mut self, value: bool) -> Self {
        self.create_credential = value;
        self
    }

    /// Accepts invalid TLS certificates.
    #[must_use]
    pub const fn insecure_skip_verify(mut self, value: bool) -> Self {
        self.insecure_skip_verify = value;
        self
    }

    /// Overrides the API path prefix.
    #[must_use]
    pub fn api_prefix(mut self, value: impl Into<String>) -> Self {
        self.api_prefix = Some(value.into());
        self
    }

    /// Applies defaults and validates the combination of settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required value is absent,
    /// [`ConfigError::Conflict`] when mutually exclusive options are both
    /// set, and [`ConfigError::Invalid`] when the controller URL is unusable.
    pub fn build(self) -> Result<ProvisioningConfig, ConfigError> {
        let server = ServerSettings {
            base_url: self.parse_base_url()?,
            api_prefix: self.normalised_api_prefix(),
            auth: self.resolve_auth()?,
            insecure_skip_verify: self.insecure_skip_verify,
        };
        Ok(ProvisioningConfig {
            server,
            target: self.resolve_target()?,
            inventory: self.resolve_inventory()?,
            extra_vars: self.extra_vars,
            timeout: non_zero_duration(self.timeout).unwrap_or(DEFAULT_TIMEOUT),
            poll_interval: non_zero_duration(self.poll_interval).unwrap_or(DEFAULT_POLL_INTERVAL),
            keep_temp_inventory: self.keep_temp_inventory,
            keep_temp_credential: self.keep_temp_credential,
            create_credential: self.create_credential,
        })
    }

    fn parse_base_url(&self) -> Result<Url, ConfigError> {
        let raw = self.tower_host.trim();
        if raw.is_empty() {
            return Err(TOWER_HOST.missing());
        }
        if !(raw.starts_with("http://") || raw.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: String::from("tower_host"),
                message: format!("'{raw}' must start with http:// or https://"),
            });
        }
        Url::parse(raw).map_err(|err| ConfigError::Invalid {
            field: String::from("tower_host"),
            message: format!("'{raw}': {err}"),
        })
    }

    fn normalised_api_prefix(&self) -> String {
        let prefix = self
            .api_prefix
            .as_deref()
            .map(|value| value.trim().trim_matches('/'))
            .filter(|value| !value.is_empty());
        prefix.map_or_else(|| DEFAULT_API_PREFIX.to_owned(), |value| format!("/{value}"))
    }

    fn resolve_auth(&self) -> Result<Auth, ConfigError> {
        let username = non_blank(self.username.as_deref());
        let password = non_blank(self.password.as_deref());
        if let Some(token) = non_blank(self.access_token.as_deref()) {
            if username.is_some() || password.is_some() {
                return Err(ConfigError::Conflict(String::from(
                    "access_token cannot be combined with username or password",
                )));
            }
            return Ok(Auth::Bearer { token });
        }
        let username = username.ok_or_else(|| USERNAME.missing())?;
        let password = password.ok_or_else(|| PASSWORD.missing())?;
        Ok(Auth::Basic { username, password })
    }

    fn resolve_target(&self) -> Result<JobTarget, ConfigError> {
        match (
            non_zero(self.job_template_id),
            non_zero(self.workflow_template_id),
        ) {
            (Some(job), None) => Ok(JobTarget::JobTemplate(TemplateId::new(job))),
            (None, Some(workflow)) => Ok(JobTarget::WorkflowTemplate(TemplateId::new(workflow))),
            (Some(_), Some(_)) => Err(ConfigError::Conflict(String::from(
                "set only one of job_template_id and workflow_template_id",
            ))),
            (None, None) => Err(ConfigError::MissingField(format!(
                "missing template: set AAP_JOB_TEMPLATE_ID or AAP_WORKFLOW_TEMPLATE_ID, or add \
                 job_template_id or workflow_template_id to {CONFIG_FILE}"
            ))),
        }
    }

    fn resolve_inventory(&self) -> Result<InventorySource, ConfigError> {
        let inventory = non_zero(self.inventory_id);
        if self.dynamic_inventory {
            if inventory.is_some() {
                return Err(ConfigError::Conflict(String::from(
                    "inventory_id cannot be combined with dynamic_inventory",
                )));
            }
            let organization = non_zero(self.organization_id).ok_or_else(|| ORGANIZATION.missing())?;
            return Ok(InventorySource::Dynamic {
                organization_id: OrganizationId::new(organization),
            });
        }
        inventory
            .map(|id| InventorySource::Existing(InventoryId::new(id)))
            .ok_or_else(|| INVENTORY.missing())
    }
}
