//! Binary entry point for the `aap-provision` CLI.

use std::io::{self, Write};
use std::process;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use aap_provisioner::{
    AapClient, Auth, ConfigError, EnvHostDiscovery, InventorySource, ProgressSink,
    ProvisionOrchestrator, ProvisionerConfig, ProvisioningConfig, RemoteError, TracingProgress,
    remote::JobTarget,
};

mod cli;

use cli::{Cli, RunCommand};

/// Exit status used when a second interrupt abandons cleanup.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("controller client error: {0}")]
    Client(#[source] RemoteError),
    #[error("provisioning failed: {0}")]
    Provision(String),
}

/// Progress sink that writes milestones to the console.
#[derive(Clone, Copy, Debug, Default)]
struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn message(&self, text: &str) {
        writeln!(io::stdout(), "==> {text}").ok();
    }

    fn error(&self, text: &str) {
        writeln!(io::stderr(), "==> {text}").ok();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Run(command) => run_command(command).await,
        Cli::Check => check_command(),
    }
}

fn load_config() -> Result<ProvisioningConfig, CliError> {
    let raw = ProvisionerConfig::load_without_cli_args()?;
    Ok(raw.to_provisioning()?)
}

fn check_command() -> Result<(), CliError> {
    let config = load_config()?;
    let mut stdout = io::stdout();
    for line in render_summary(&config) {
        writeln!(stdout, "{line}").ok();
    }
    Ok(())
}

async fn run_command(args: RunCommand) -> Result<(), CliError> {
    let config = load_config()?;
    let client = AapClient::new(config.server()).map_err(CliError::Client)?;

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if relay_interrupts(tokio::signal::ctrl_c, &trigger).await {
            writeln!(io::stderr(), "second interrupt received; abandoning cleanup").ok();
            process::exit(INTERRUPTED_EXIT_CODE);
        }
    });

    let grace = Duration::from_secs(args.cleanup_grace_secs);
    if args.quiet {
        execute(client, TracingProgress, grace, &config, &token).await
    } else {
        execute(client, ConsoleProgress, grace, &config, &token).await
    }
}

/// Cancels `token` on the first interrupt. Returns `true` once a second
/// interrupt arrives, or `false` if the signal source fails first.
async fn relay_interrupts<F, Fut>(mut next_interrupt: F, token: &CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    while next_interrupt().await.is_ok() {
        if token.is_cancelled() {
            return true;
        }
        writeln!(
            io::stderr(),
            "interrupt received; cancelling and cleaning up (interrupt again to abort)"
        )
        .ok();
        token.cancel();
    }
    false
}

async fn execute<P: ProgressSink>(
    client: AapClient,
    progress: P,
    grace: Duration,
    config: &ProvisioningConfig,
    token: &CancellationToken,
) -> Result<(), CliError> {
    let orchestrator =
        ProvisionOrchestrator::new(client, EnvHostDiscovery, progress).with_cleanup_grace(grace);
    let outcome = orchestrator.execute(config, token).await;
    match outcome.error_message() {
        None => Ok(()),
        Some(message) => Err(CliError::Provision(message)),
    }
}

fn render_summary(config: &ProvisioningConfig) -> Vec<String> {
    let server = config.server();
    let auth = match &server.auth {
        Auth::Basic { username, .. } => format!("basic ({username})"),
        Auth::Bearer { .. } => String::from("bearer token"),
    };
    let target = match config.target() {
        JobTarget::JobTemplate(id) => format!("job template {id}"),
        JobTarget::WorkflowTemplate(id) => format!("workflow template {id}"),
    };
    let inventory = match config.inventory() {
        InventorySource::Existing(id) => format!("existing inventory {id}"),
        InventorySource::Dynamic { organization_id } => {
            format!("temporary inventory in organization {organization_id}")
        }
    };
    let mut lines = vec![
        format!(
            "controller: {}{}",
            server.base_url.as_str().trim_end_matches('/'),
            server.api_prefix
        ),
        format!("auth: {auth}"),
        format!("target: {target}"),
        format!("inventory: {inventory}"),
        format!(
            "timeout: {}s, poll interval: {}s",
            config.timeout().as_secs(),
            config.poll_interval().as_secs()
        ),
    ];
    // Values may hold secrets; only the names are shown.
    let mut names: Vec<&str> = config.extra_vars().keys().map(String::as_str).collect();
    if !names.is_empty() {
        names.sort_unstable();
        lines.push(format!("extra vars: {}", names.join(", ")));
    }
    lines
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "s3cr3t-bearer-value";

    fn sample_config() -> ProvisioningConfig {
        ProvisioningConfig::builder()
            .tower_host("https://aap.example.com/")
            .access_token(Some(String::from(SECRET)))
            .workflow_template_id(Some(12))
            .dynamic_inventory(true)
            .organization_id(Some(3))
            .build()
            .unwrap_or_else(|err| panic!("sample config should be valid: {err}"))
    }

    #[test]
    fn summary_describes_dynamic_workflow_run() {
        let summary = render_summary(&sample_config());

        assert_eq!(
            summary,
            vec![
                String::from("controller: https://aap.example.com/api/controller/v2"),
                String::from("auth: bearer token"),
                String::from("target: workflow template 12"),
                String::from("inventory: temporary inventory in organization 3"),
                String::from("timeout: 900s, poll interval: 10s"),
            ]
        );
    }

    #[test]
    fn summary_never_prints_secrets() {
        let summary = render_summary(&sample_config()).join("\n");

        assert!(!summary.contains(SECRET));
    }

    #[test]
    fn summary_lists_extra_var_names_only() {
        let extra_vars = serde_json::json!({"vault_password": SECRET, "image": "rhel9"});
        let config = sample_config()
            .to_builder()
            .extra_vars(extra_vars.as_object().cloned().unwrap_or_default())
            .build()
            .unwrap_or_else(|err| panic!("config should be valid: {err}"));

        let summary = render_summary(&config);

        assert_eq!(
            summary.last().map(String::as_str),
            Some("extra vars: image, vault_password")
        );
        assert!(!summary.join("\n").contains(SECRET));
    }

    fn scripted_interrupts(
        script: Vec<io::Result<()>>,
    ) -> impl FnMut() -> std::future::Ready<io::Result<()>> {
        let mut remaining = script.into_iter();
        move || {
            std::future::ready(
                remaining
                    .next()
                    .unwrap_or_else(|| Err(io::Error::other("signal source closed"))),
            )
        }
    }

    #[tokio::test]
    async fn second_interrupt_requests_abort() {
        let token = CancellationToken::new();

        let aborted = relay_interrupts(scripted_interrupts(vec![Ok(()), Ok(())]), &token).await;

        assert!(aborted);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn single_interrupt_only_cancels() {
        let token = CancellationToken::new();

        let aborted = relay_interrupts(scripted_interrupts(vec![Ok(())]), &token).await;

        assert!(!aborted);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn failed_signal_source_neither_cancels_nor_aborts() {
        let token = CancellationToken::new();

        let aborted = relay_interrupts(scripted_interrupts(Vec::new()), &token).await;

        assert!(!aborted);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cli_definition_renders_for_man_page() {
        use clap::CommandFactory;

        let command = Cli::command();
        command.clone().debug_assert();

        assert_eq!(command.get_name(), "aap-provision");
        let subcommands: Vec<&str> = command.get_subcommands().map(|sub| sub.get_name()).collect();
        assert_eq!(subcommands, vec!["run", "check"]);
    }

    #[test]
    fn write_error_writes_cli_error() {
        let mut buf = Vec::new();
        let err = CliError::Provision(String::from("job 7 finished with status 'failed'"));
        write_error(&mut buf, &err);
        let rendered =
            String::from_utf8(buf).unwrap_or_else(|utf8| panic!("output should be utf8: {utf8}"));
        assert_eq!(
            rendered,
            "provisioning failed: job 7 finished with status 'failed'\n"
        );
    }
}
