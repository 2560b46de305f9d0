// SFC-Ostack: Service Function Chains on OpenStack
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # Remote Execution
//!
//! Run shell commands on the chain members through their floating IP. Sessions use the `ssh`
//! binary of the system in batch mode, with the private key of the member.

use crate::cloud::CloudApi;
use crate::poll::{retry_with_backoff, ConnectionError, RetryPolicy};
use crate::server_chain::{ServerChain, ServerChainError};

use log::*;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Default port of the SSH server
pub const SSH_PORT: u16 = 22;

/// # Remote Execution Error
#[derive(Debug, Error)]
pub enum RemoteExecError {
    /// Cannot establish the session
    #[error("{0}")]
    Connection(#[from] ConnectionError),
    /// Cannot spawn the ssh process
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    /// The remote command was terminated by a signal
    #[error("Command `{command}` on {destination} was killed")]
    Killed {
        /// SSH destination
        destination: String,
        /// The command
        command: String,
    },
    /// Cannot get the addresses of the members
    #[error("{0}")]
    ServerChain(#[from] ServerChainError),
}

/// Something that can execute commands on a remote host
pub trait RemoteExec {
    /// Execute the command, and return its exit status.
    fn execute(&mut self, command: &str) -> Result<i32, RemoteExecError>;
}

/// SSH session to a chain member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshSession {
    destination: String,
    port: u16,
    key_file: PathBuf,
}

impl SshSession {
    /// Create a session without connecting.
    pub fn new(
        address: impl AsRef<str>,
        port: u16,
        user: impl AsRef<str>,
        key_file: impl AsRef<Path>,
    ) -> Self {
        Self {
            destination: format!("{}@{}", user.as_ref(), address.as_ref()),
            port,
            key_file: key_file.as_ref().to_path_buf(),
        }
    }

    /// Create a session, and probe it until the remote host answers. Freshly booted servers
    /// refuse connections for some time, which is why the probe is retried with backoff.
    pub fn connect(
        address: impl AsRef<str>,
        port: u16,
        user: impl AsRef<str>,
        key_file: impl AsRef<Path>,
        policy: &RetryPolicy,
    ) -> Result<Self, ConnectionError> {
        let session = Self::new(address, port, user, key_file);
        trace!("[{}] connecting...", session.name());
        retry_with_backoff(policy, format!("{}:{}", session.destination, port), |_| session.probe())?;
        trace!("[{}] connection established!", session.name());
        Ok(session)
    }

    /// SSH destination, like `ubuntu@172.24.4.10`
    pub fn name(&self) -> &str {
        &self.destination
    }

    fn probe(&self) -> Result<(), String> {
        let output = self
            .command()
            .arg("echo test")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| e.to_string())?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if output.status.success() && stdout.trim() == "test" {
            Ok(())
        } else {
            Err(format!(
                "unexpected answer (status {:?}): {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }

    /// Raw `ssh` command, up to (and including) the destination.
    pub(crate) fn command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-p")
            .arg(self.port.to_string())
            .arg("-i")
            .arg(&self.key_file)
            .args(["-o", "BatchMode=yes"])
            .args(["-o", "StrictHostKeyChecking=no"])
            .args(["-o", "UserKnownHostsFile=/dev/null"])
            .args(["-o", "ConnectTimeout=10"])
            .args(["-o", "LogLevel=ERROR"])
            .arg(&self.destination);
        cmd
    }
}

impl RemoteExec for SshSession {
    fn execute(&mut self, command: &str) -> Result<i32, RemoteExecError> {
        trace!("[{}] {}", self.name(), command);
        let output = self.command().arg(command).stdin(Stdio::null()).output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            debug!("[{}] stdout:\n{}", self.name(), stdout.trim_end());
        }
        if !stderr.trim().is_empty() {
            debug!("[{}] stderr:\n{}", self.name(), stderr.trim_end());
        }
        output.status.code().ok_or_else(|| RemoteExecError::Killed {
            destination: self.destination.clone(),
            command: command.to_string(),
        })
    }
}

/// Execute the command on every member with SSH access, in forwarding order. Members without
/// SSH access are skipped. Returns the exit status of each member.
pub fn exec_on_chain<C: CloudApi>(
    chain: &ServerChain<C>,
    command: &str,
    policy: &RetryPolicy,
) -> Result<Vec<(String, i32)>, RemoteExecError> {
    let addresses = chain.remote_access_addresses()?;
    let mut result = Vec::new();
    for (member, access) in chain.members().zip(addresses.iter()) {
        let ssh = match member.ssh.as_ref() {
            Some(ssh) => ssh,
            None => {
                warn!("Member {} has no SSH access configured, skipping", member.name);
                continue;
            }
        };
        let mut session =
            SshSession::connect(&access.address, SSH_PORT, &ssh.user_name, &ssh.pvt_key_file, policy)?;
        let status = session.execute(command)?;
        if status == 0 {
            info!("[{}] `{}` succeeded", member.name, command);
        } else {
            warn!("[{}] `{}` exited with status {}", member.name, command, status);
        }
        result.push((member.name.clone(), status));
    }
    Ok(result)
}
