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

//! # OpenStack Types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Credentials for the identity service, using the password method.
#[derive(Clone, PartialEq, Deserialize, Serialize)]
pub struct Credentials {
    /// URL of the identity service, like `http://controller/identity/v3`
    pub auth_url: String,
    /// Name of the user
    pub username: String,
    /// Password of the user
    pub password: String,
    /// Name of the project to scope the token
    pub project_name: String,
    /// Domain of the user
    #[serde(default = "default_domain")]
    pub user_domain_name: String,
    /// Domain of the project
    #[serde(default = "default_domain")]
    pub project_domain_name: String,
    /// Region used to select the endpoints from the catalog
    #[serde(default)]
    pub region_name: Option<String>,
    /// Endpoint interface (`public`, `internal` or `admin`)
    #[serde(default = "default_interface")]
    pub interface: String,
}

fn default_domain() -> String {
    "default".to_string()
}

fn default_interface() -> String {
    "public".to_string()
}

impl Credentials {
    /// Create credentials in the default domain, using the public interface.
    pub fn new(
        auth_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        project_name: impl Into<String>,
    ) -> Self {
        Self {
            auth_url: auth_url.into(),
            username: username.into(),
            password: password.into(),
            project_name: project_name.into(),
            user_domain_name: default_domain(),
            project_domain_name: default_domain(),
            region_name: None,
            interface: default_interface(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("auth_url", &self.auth_url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("project_name", &self.project_name)
            .field("user_domain_name", &self.user_domain_name)
            .field("project_domain_name", &self.project_domain_name)
            .field("region_name", &self.region_name)
            .field("interface", &self.interface)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct TokenResponse {
    pub token: Token,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct Token {
    #[serde(default)]
    pub catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct CatalogEntry {
    #[serde(rename = "type")]
    pub service: String,
    pub endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct CatalogEndpoint {
    pub interface: String,
    pub url: String,
    #[serde(default)]
    pub region: Option<String>,
}

/// Network Information
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Network {
    /// ID of the network
    pub id: String,
    /// Name of the network
    pub name: String,
    /// Status of the network
    #[serde(default)]
    pub status: String,
}

/// Subnet Information
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Subnet {
    /// ID of the subnet
    pub id: String,
    /// Name of the subnet
    pub name: String,
    /// Network to which the subnet belongs
    pub network_id: String,
    /// CIDR of the subnet
    pub cidr: String,
}

/// Security Group Information
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SecurityGroup {
    /// ID of the security group
    pub id: String,
    /// Name of the security group
    pub name: String,
}

/// Port Information
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Port {
    /// ID of the port
    pub id: String,
    /// Name of the port
    pub name: String,
    /// Network of the port
    pub network_id: String,
    /// Status of the port
    #[serde(default)]
    pub status: String,
}

/// Floating IP Information
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct FloatingIp {
    /// ID of the floating ip
    pub id: String,
    /// Public address
    pub floating_ip_address: String,
    /// Port to which the address is bound
    #[serde(default)]
    pub port_id: Option<String>,
    /// Status of the floating ip (`ACTIVE` or `DOWN`)
    #[serde(default)]
    pub status: String,
}

/// Server Information
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Server {
    /// ID of the server
    pub id: String,
    /// Name of the server
    pub name: String,
    /// Status of the server, like `ACTIVE` or `BUILD`
    pub status: String,
    /// Compute host on which the server is running (only visible for admins)
    #[serde(rename = "OS-EXT-SRV-ATTR:host", default)]
    pub host: Option<String>,
}

/// Flavor Information
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Flavor {
    /// ID of the flavor
    pub id: String,
    /// Name of the flavor
    pub name: String,
    /// Number of virtual CPUs
    pub vcpus: u32,
    /// Memory in MB
    pub ram: u64,
    /// Root disk in GB
    pub disk: u64,
}

/// Hypervisor Information
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Hypervisor {
    /// Hostname of the hypervisor
    pub hypervisor_hostname: String,
    /// State of the hypervisor (`up` or `down`)
    #[serde(default)]
    pub state: String,
    /// Number of physical CPUs
    pub vcpus: u32,
    /// Number of CPUs used by servers
    pub vcpus_used: u32,
    /// Memory in MB
    pub memory_mb: u64,
    /// Memory used by servers in MB
    pub memory_mb_used: u64,
    /// Local disk in GB
    pub local_gb: u64,
    /// Local disk used by servers in GB
    pub local_gb_used: u64,
}

/// Stack Information
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Stack {
    /// ID of the stack
    pub id: String,
    /// Name of the stack
    pub stack_name: String,
    /// Status of the stack, like `CREATE_IN_PROGRESS`
    pub stack_status: String,
    /// Reason for the current status
    #[serde(default)]
    pub stack_status_reason: Option<String>,
}

/// Resource of the networking-sfc extension
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SfcResource {
    /// ID of the resource
    pub id: String,
    /// Name of the resource
    pub name: String,
    /// Description of the resource
    #[serde(default)]
    pub description: String,
}

/// Kind of a resource of the networking-sfc extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SfcKind {
    /// Ingress and egress port of one service function
    PortPair,
    /// Set of port pairs, forming one stage of the chain
    PortPairGroup,
    /// Traffic selection rule
    FlowClassifier,
    /// Ordered list of port pair groups
    PortChain,
}

impl SfcKind {
    /// Name of a single resource, used as key in the request and response body.
    pub fn singular(&self) -> &'static str {
        match self {
            Self::PortPair => "port_pair",
            Self::PortPairGroup => "port_pair_group",
            Self::FlowClassifier => "flow_classifier",
            Self::PortChain => "port_chain",
        }
    }

    /// Name of the collection, used in the URL and as key for listings.
    pub fn plural(&self) -> &'static str {
        match self {
            Self::PortPair => "port_pairs",
            Self::PortPairGroup => "port_pair_groups",
            Self::FlowClassifier => "flow_classifiers",
            Self::PortChain => "port_chains",
        }
    }
}

impl fmt::Display for SfcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.singular())
    }
}
