//! Local host connection details for dynamically provisioned inventories.
//!
//! The image builder exposes the connection parameters of the machine under
//! construction through `PACKER_SSH_*` environment variables. Discovery turns
//! them into [`HostConnectionDetails`], deciding once whether the host is
//! reached over SSH or `WinRM` so host and credential creation agree.

use std::env;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

use crate::error::ErrorKind;

/// Environment variable holding the host address.
pub const HOST_ENV: &str = "PACKER_SSH_HOST";
/// Environment variable holding the connection port.
pub const PORT_ENV: &str = "PACKER_SSH_PORT";
/// Environment variable holding the login user.
pub const USERNAME_ENV: &str = "PACKER_SSH_USERNAME";
/// Environment variable holding the private key path.
pub const KEY_FILE_ENV: &str = "PACKER_SSH_KEY_FILE";
/// Environment variable holding the login password.
pub const PASSWORD_ENV: &str = "PACKER_SSH_PASSWORD";
/// Optional environment variable forcing the connection kind (`ssh`/`winrm`).
pub const CONNECTION_TYPE_ENV: &str = "PACKER_CONNECTION_TYPE";

/// Plain-text `WinRM` listener port.
pub const WINRM_HTTP_PORT: u16 = 5985;
/// TLS `WinRM` listener port.
pub const WINRM_HTTPS_PORT: u16 = 5986;

/// Transport used by the automation server to reach the host.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionKind {
    /// Secure shell, used for Unix-like hosts.
    Ssh,
    /// Windows Remote Management.
    WinRm,
}

impl ConnectionKind {
    /// Infers the kind from the port unless an explicit hint is supplied.
    #[must_use]
    pub const fn infer(port: u16, hint: Option<Self>) -> Self {
        match hint {
            Some(kind) => kind,
            None if port == WINRM_HTTP_PORT || port == WINRM_HTTPS_PORT => Self::WinRm,
            None => Self::Ssh,
        }
    }

    /// Returns the value used for `ansible_connection`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ssh => "ssh",
            Self::WinRm => "winrm",
        }
    }

    fn parse_hint(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ssh" => Some(Self::Ssh),
            "winrm" => Some(Self::WinRm),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection parameters for the host under construction.
#[derive(Clone, Eq, PartialEq)]
pub struct HostConnectionDetails {
    /// Address (hostname or IP) of the host.
    pub address: String,
    /// TCP port of the SSH or `WinRM` listener.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Login password, when password authentication is available.
    pub password: Option<String>,
    /// Path to a private key, when key authentication is available.
    pub key_file: Option<Utf8PathBuf>,
    /// Transport decided at construction time.
    pub kind: ConnectionKind,
}

impl fmt::Debug for HostConnectionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostConnectionDetails")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("key_file", &self.key_file)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Secret used to build the temporary machine credential.
#[derive(Clone, Eq, PartialEq)]
pub enum CredentialMaterial {
    /// Private key contents read from the configured key file.
    PrivateKey(String),
    /// Password for SSH password authentication.
    Password(String),
    /// Password for `WinRM` authentication.
    WinRmPassword(String),
}

impl fmt::Debug for CredentialMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::PrivateKey(_) => "PrivateKey",
            Self::Password(_) => "Password",
            Self::WinRmPassword(_) => "WinRmPassword",
        };
        write!(f, "{label}(<redacted>)")
    }
}

impl HostConnectionDetails {
    /// Builds details from a key lookup function.
    ///
    /// # Errors
    ///
    /// Returns [`HostDetailsError`] when host, port, or username is missing,
    /// the port is invalid, or neither a key file nor a password is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HostDetailsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let address = present(HOST_ENV).ok_or(HostDetailsError::Missing { var: HOST_ENV })?;
        let raw_port = present(PORT_ENV).ok_or(HostDetailsError::Missing { var: PORT_ENV })?;
        let port = raw_port
            .trim()
            .parse::<u16>()
            .map_err(|err| HostDetailsError::InvalidPort {
                value: raw_port.clone(),
                message: err.to_string(),
            })?;
        let username =
            present(USERNAME_ENV).ok_or(HostDetailsError::Missing { var: USERNAME_ENV })?;
        let key_file = present(KEY_FILE_ENV).map(Utf8PathBuf::from);
        let password = present(PASSWORD_ENV);
        if key_file.is_none() && password.is_none() {
            return Err(HostDetailsError::NoSecret);
        }

        let hint = match present(CONNECTION_TYPE_ENV) {
            Some(value) => Some(ConnectionKind::parse_hint(&value).ok_or(
                HostDetailsError::InvalidConnectionType { value },
            )?),
            None => None,
        };

        Ok(Self {
            address: address.trim().to_owned(),
            port,
            username: username.trim().to_owned(),
            password,
            key_file,
            kind: ConnectionKind::infer(port, hint),
        })
    }

    /// Builds details from the process environment.
    ///
    /// # Errors
    ///
    /// See [`HostConnectionDetails::from_lookup`].
    pub fn from_env() -> Result<Self, HostDetailsError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolves the secret used for credential creation.
    ///
    /// `WinRM` hosts always use password authentication. SSH hosts prefer the
    /// private key and fall back to the password.
    ///
    /// # Errors
    ///
    /// Returns [`HostDetailsError::WinRmPasswordRequired`] for `WinRM` hosts
    /// without a password and [`HostDetailsError::KeyFile`] when the key file
    /// cannot be read.
    pub fn credential_material(&self) -> Result<CredentialMaterial, HostDetailsError> {
        if self.kind == ConnectionKind::WinRm {
            return self
                .password
                .clone()
                .map(CredentialMaterial::WinRmPassword)
                .ok_or(HostDetailsError::WinRmPasswordRequired);
        }
        match (&self.key_file, &self.password) {
            (Some(path), _) => read_key_file(path).map(CredentialMaterial::PrivateKey),
            (None, Some(password)) => Ok(CredentialMaterial::Password(password.clone())),
            (None, None) => Err(HostDetailsError::NoSecret),
        }
    }
}

fn read_key_file(path: &Utf8Path) -> Result<String, HostDetailsError> {
    let key_error = |message: String| HostDetailsError::KeyFile {
        path: path.to_owned(),
        message,
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| key_error(String::from("path has no file name")))?;
    let parent = match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => dir,
        _ => Utf8Path::new("."),
    };
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| key_error(err.to_string()))?;
    let contents = dir
        .read_to_string(file_name)
        .map_err(|err| key_error(err.to_string()))?;
    if contents.trim().is_empty() {
        return Err(key_error(String::from("key file is empty")));
    }
    Ok(contents)
}

/// Source of host connection details.
pub trait HostDiscovery {
    /// Discovers the connection details for the host under construction.
    ///
    /// # Errors
    ///
    /// Returns [`HostDetailsError`] when required parameters are absent.
    fn discover(&self) -> Result<HostConnectionDetails, HostDetailsError>;
}

/// Discovery backed by the `PACKER_SSH_*` environment variables.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvHostDiscovery;

impl HostDiscovery for EnvHostDiscovery {
    fn discover(&self) -> Result<HostConnectionDetails, HostDetailsError> {
        HostConnectionDetails::from_env()
    }
}

/// Errors raised while discovering or loading local connection details.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum HostDetailsError {
    /// Raised when a required variable is absent or blank.
    #[error("{var} environment variable is missing")]
    Missing {
        /// Name of the missing variable.
        var: &'static str,
    },
    /// Raised when the port is not a valid TCP port.
    #[error("invalid PACKER_SSH_PORT '{value}': {message}")]
    InvalidPort {
        /// Raw value supplied.
        value: String,
        /// Parser message.
        message: String,
    },
    /// Raised when the connection type hint is not recognised.
    #[error("invalid PACKER_CONNECTION_TYPE '{value}': expected ssh or winrm")]
    InvalidConnectionType {
        /// Raw value supplied.
        value: String,
    },
    /// Raised when neither a key file nor a password is available.
    #[error("either PACKER_SSH_KEY_FILE or PACKER_SSH_PASSWORD must be set")]
    NoSecret,
    /// Raised when a `WinRM` host has no password to build a credential from.
    #[error("PACKER_SSH_PASSWORD must be set for WinRM hosts")]
    WinRmPasswordRequired,
    /// Raised when the private key file cannot be read.
    #[error("failed to read private key {path}: {message}")]
    KeyFile {
        /// Path that could not be read.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
}

impl HostDetailsError {
    /// Classifies the error; every variant is missing local data.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::ConfigurationMissing
    }
}

#[cfg(test)]
mod tests;
