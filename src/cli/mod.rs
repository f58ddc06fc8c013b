//! Command-line interface definitions for the `aap-provision` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `aap-provision` binary.
#[derive(Debug, Parser)]
#[command(
    name = "aap-provision",
    about = "Run an Ansible Automation Platform job against an image build host",
    long_about = "Run an Ansible Automation Platform job against an image build host.\n\n\
        Settings are read from aap-provisioner.toml and AAP_* environment \
        variables. The build host is described by the PACKER_SSH_* variables.",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Launch the configured template and wait for it.
    #[command(name = "run", about = "Launch the configured template and wait for it")]
    Run(RunCommand),
    /// Validate configuration without contacting the controller.
    #[command(
        name = "check",
        about = "Validate configuration without contacting the controller"
    )]
    Check,
}

/// Arguments for the `aap-provision run` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RunCommand {
    /// Seconds allowed for each cleanup delete, even after an interrupt.
    #[arg(long, value_name = "SECONDS", default_value_t = 30)]
    pub(crate) cleanup_grace_secs: u64,
    /// Send progress messages to the log instead of the console.
    #[arg(long)]
    pub(crate) quiet: bool,
}
