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

//! Module containing all error types

use crate::cloud::CloudError;
use crate::config::ConfigError;
use crate::hot::TemplateError;
use crate::manager::SfcManagerError;
use crate::placement::PlacementError;
use crate::poll::ConnectionError;
use crate::port_chain::PortChainError;
use crate::readiness::ReadinessError;
use crate::remote_exec::RemoteExecError;
use crate::reorder::ReorderError;
use crate::server_chain::ServerChainError;

use thiserror::Error;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),
    /// Error while building a template
    #[error("Template Error: {0}")]
    Template(#[from] TemplateError),
    /// Error of the cloud
    #[error("Cloud Error: {0}")]
    Cloud(#[from] CloudError),
    /// Error of the server chain
    #[error("Server Chain Error: {0}")]
    ServerChain(#[from] ServerChainError),
    /// Error of the port chain
    #[error("Port Chain Error: {0}")]
    PortChain(#[from] PortChainError),
    /// Error during placement
    #[error("Placement Error: {0}")]
    Placement(#[from] PlacementError),
    /// Error during reordering
    #[error("Reorder Error: {0}")]
    Reorder(#[from] ReorderError),
    /// Error of the readiness barrier
    #[error("Readiness Error: {0}")]
    Readiness(#[from] ReadinessError),
    /// Remote target unreachable
    #[error("Connection Error: {0}")]
    Connection(#[from] ConnectionError),
    /// Error while executing a remote command
    #[error("Remote Execution Error: {0}")]
    RemoteExec(#[from] RemoteExecError),
    /// Operation not allowed
    #[error("Manager Error: {0}")]
    Manager(#[from] SfcManagerError),
    /// IO Error
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}
