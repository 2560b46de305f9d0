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

//! # Cloud API
//!
//! All operations of the cloud that are needed to deploy a chain. The chain logic is written
//! against the trait [`CloudApi`], the implementation for a real OpenStack deployment is provided
//! for [`ostack::OpenStack`].

mod openstack;

use crate::config::FlowClassifierRule;

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// # Cloud Error
#[derive(Debug, Error)]
pub enum CloudError {
    /// Error of the OpenStack API
    #[error("OpenStack Error: {0}")]
    OpenStack(#[from] ostack::Error),
    /// The cloud rejected the request
    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// Status of a stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackStatus {
    /// The stack does not exist (or it was deleted)
    NotFound,
    /// An operation on the stack is ongoing
    InProgress,
    /// The last operation on the stack is complete
    Complete,
    /// The last operation failed, with the reason
    Failed(String),
}

/// Server as seen by the compute service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// ID of the server
    pub id: String,
    /// Name of the server
    pub name: String,
    /// Status, like `ACTIVE`
    pub status: String,
    /// Host on which the server was started, if known
    pub host: Option<String>,
}

/// Resources of a flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flavor {
    /// Number of virtual CPUs
    pub vcpus: u32,
    /// Memory in MB
    pub ram_mb: u64,
    /// Disk in GB
    pub disk_gb: u64,
}

/// Resources of a compute host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// Name of the host
    pub name: String,
    /// Number of physical CPUs
    pub total_vcpus: u32,
    /// Number of free physical CPUs
    pub free_vcpus: u32,
    /// Total memory in MB
    pub total_ram_mb: u64,
    /// Free memory in MB
    pub free_ram_mb: u64,
    /// Total disk in GB
    pub total_disk_gb: u64,
    /// Free disk in GB
    pub free_disk_gb: u64,
}

/// Kind of a traffic steering resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SteeringKind {
    /// Ingress and egress port of one member
    PortPair,
    /// One stage of the chain
    PortPairGroup,
    /// Traffic selection rule
    FlowClassifier,
    /// The chain itself
    PortChain,
}

impl fmt::Display for SteeringKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortPair => write!(f, "port_pair"),
            Self::PortPairGroup => write!(f, "port_pair_group"),
            Self::FlowClassifier => write!(f, "flow_classifier"),
            Self::PortChain => write!(f, "port_chain"),
        }
    }
}

/// Port pair to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortPairSpec {
    /// Name of the port pair
    pub name: String,
    /// Description
    pub description: String,
    /// ID of the ingress port
    pub ingress: String,
    /// ID of the egress port
    pub egress: String,
}

/// Port pair group to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortPairGroupSpec {
    /// Name of the group
    pub name: String,
    /// Description
    pub description: String,
    /// IDs of the port pairs
    pub port_pairs: Vec<String>,
}

/// Port chain to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortChainSpec {
    /// Name of the port chain
    pub name: String,
    /// Description
    pub description: String,
    /// Ordered IDs of the port pair groups
    pub port_pair_groups: Vec<String>,
    /// IDs of the flow classifiers
    pub flow_classifiers: Vec<String>,
}

/// A traffic steering resource to create. The flow classifier refers to its logical ports by ID.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SteeringSpec {
    /// Port pair
    PortPair(PortPairSpec),
    /// Port pair group
    PortPairGroup(PortPairGroupSpec),
    /// Flow classifier
    FlowClassifier(FlowClassifierRule),
    /// Port chain
    PortChain(PortChainSpec),
}

impl SteeringSpec {
    /// Kind of the resource
    pub fn kind(&self) -> SteeringKind {
        match self {
            Self::PortPair(_) => SteeringKind::PortPair,
            Self::PortPairGroup(_) => SteeringKind::PortPairGroup,
            Self::FlowClassifier(_) => SteeringKind::FlowClassifier,
            Self::PortChain(_) => SteeringKind::PortChain,
        }
    }

    /// Name of the resource
    pub fn name(&self) -> &str {
        match self {
            Self::PortPair(s) => &s.name,
            Self::PortPairGroup(s) => &s.name,
            Self::FlowClassifier(s) => &s.name,
            Self::PortChain(s) => &s.name,
        }
    }
}

/// Existing traffic steering resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SteeringHandle {
    /// ID of the resource
    pub id: String,
    /// Name of the resource
    pub name: String,
}

/// # Cloud API
///
/// Lookups return `Ok(None)` if nothing with the given name exists. Mutating operations do not
/// wait for the cloud to finish, use [`CloudApi::stack_status`] to follow the progress of a stack.
pub trait CloudApi {
    /// Find the ID of a network
    fn find_network(&self, name: &str) -> Result<Option<String>, CloudError>;

    /// Find the ID of a subnet
    fn find_subnet(&self, name: &str) -> Result<Option<String>, CloudError>;

    /// Find the ID of a security group
    fn find_security_group(&self, name: &str) -> Result<Option<String>, CloudError>;

    /// Find the ID of a port
    fn find_port(&self, name: &str) -> Result<Option<String>, CloudError>;

    /// Find a server
    fn find_server(&self, name: &str) -> Result<Option<ServerInfo>, CloudError>;

    /// Find a flavor by name or ID
    fn find_flavor(&self, name: &str) -> Result<Option<Flavor>, CloudError>;

    /// Find a compute host
    fn find_host(&self, name: &str) -> Result<Option<HostInfo>, CloudError>;

    /// Public addresses bound to the port
    fn floating_ips(&self, port_id: &str) -> Result<Vec<String>, CloudError>;

    /// Create a new stack from a rendered template
    fn create_stack(&self, name: &str, template: &str) -> Result<(), CloudError>;

    /// Replace the template of an existing stack
    fn update_stack(&self, name: &str, template: &str) -> Result<(), CloudError>;

    /// Delete the stack and all its resources
    fn delete_stack(&self, name: &str) -> Result<(), CloudError>;

    /// Current status of the stack
    fn stack_status(&self, name: &str) -> Result<StackStatus, CloudError>;

    /// Create a steering resource, and return its ID
    fn create_steering(&self, spec: &SteeringSpec) -> Result<String, CloudError>;

    /// Find a steering resource by its name
    fn find_steering(&self, kind: SteeringKind, name: &str)
        -> Result<Option<SteeringHandle>, CloudError>;

    /// List all steering resources of one kind
    fn list_steering(&self, kind: SteeringKind) -> Result<Vec<SteeringHandle>, CloudError>;

    /// Delete a steering resource
    fn delete_steering(&self, kind: SteeringKind, id: &str) -> Result<(), CloudError>;
}
