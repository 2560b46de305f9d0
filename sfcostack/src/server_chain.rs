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

//! # Server Chain
//!
//! The compute instances of a chain, together with their ports and floating IPs, are managed as
//! one heat stack named after the chain. The stack is built in two steps: first only the
//! networking resources, then the servers are added by updating the same stack.
//!
//! ## Naming Convention
//!
//! For a member `X`, the following resources are created:
//!
//! - `X_pt_in`: ingress port (used by the port pair)
//! - `X_pt_out`: egress port (used by the port pair)
//! - `X_pt`: remote access port (only if the chain uses separate access ports)
//! - `X_fip`: floating IP, bound to `X_pt`, or to `X_pt_in` without separate access ports
//! - `X`: the server itself

use crate::cloud::{CloudApi, CloudError, StackStatus};
use crate::config::{ChainConfig, FunctionChainMeta, MemberGroup, MemberSpec, NetworkConfig};
use crate::hot::{get_attr, get_resource, GetResource, Template, TemplateError};
use crate::poll::{poll_until, PollSettings};

use log::*;
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

const SERVER_ACTIVE: &str = "ACTIVE";
const SERVER_ERROR: &str = "ERROR";

/// # Server Chain Error
#[derive(Debug, Error)]
pub enum ServerChainError {
    /// A network, subnet or security group does not exist
    #[error("Can not find the {kind} {name}!")]
    NetworkNotFound {
        /// Kind of the resource
        kind: &'static str,
        /// Name of the resource
        name: String,
    },
    /// The stack did not reach the expected state in time
    #[error("Stack {stack} did not reach {expected} within {timeout:?}!")]
    ResourceTimeout {
        /// Name of the stack
        stack: String,
        /// Expected state
        expected: &'static str,
        /// Time waited
        timeout: Duration,
    },
    /// The stack does not exist
    #[error("Can not find stack with name: {0}")]
    ResourceNotFound(String),
    /// Heat reports that the stack failed
    #[error("Stack {stack} failed: {reason}")]
    StackFailed {
        /// Name of the stack
        stack: String,
        /// Reason reported by heat
        reason: String,
    },
    /// A server of the chain went into the error state
    #[error("Server {0} is in the ERROR state!")]
    ServerFailed(String),
    /// The init script cannot be read
    #[error("Cannot read the init script {path:?}: {source}")]
    InitScript {
        /// Path to the script
        path: PathBuf,
        /// IO Error
        source: std::io::Error,
    },
    /// A port of the chain does not exist
    #[error("Can not find the port {0}!")]
    PortNotFound(String),
    /// A remote access port has no floating IP
    #[error("Port {0} has no floating IP!")]
    NoFloatingIp(String),
    /// Error while building the template
    #[error("Template Error: {0}")]
    Template(#[from] TemplateError),
    /// Error of the cloud
    #[error("Cloud Error: {0}")]
    Cloud(#[from] CloudError),
}

/// Role of a port of a chain member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortRole {
    /// Remote access port
    Access,
    /// Port receiving the traffic of the chain
    Ingress,
    /// Port sending the traffic of the chain
    Egress,
}

impl PortRole {
    /// Suffix appended to the member name
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Access => "pt",
            Self::Ingress => "pt_in",
            Self::Egress => "pt_out",
        }
    }
}

/// Name of a port of the member
pub fn port_name(member: impl AsRef<str>, role: PortRole) -> String {
    format!("{}_{}", member.as_ref(), role.suffix())
}

/// Name of the floating IP of the member
pub fn fip_name(member: impl AsRef<str>) -> String {
    format!("{}_fip", member.as_ref())
}

/// Resolved ingress and egress port of a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortPairEndpoint {
    /// Name of the member
    pub member: String,
    /// ID of the ingress port
    pub ingress: String,
    /// ID of the egress port
    pub egress: String,
}

/// Public address of a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAccess {
    /// Name of the member
    pub member: String,
    /// Floating IP
    pub address: String,
}

/// IDs of the networks to which all members are attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkIds {
    /// Network of the floating IPs
    pub public: String,
    /// Private network
    pub net: String,
    /// Subnet of the private network
    pub subnet: String,
    /// Security group of all ports
    pub security_group: Option<String>,
}

#[derive(Serialize)]
struct FixedIp<'a> {
    subnet_id: &'a str,
}

#[derive(Serialize)]
struct PortProperties<'a> {
    name: String,
    network_id: &'a str,
    fixed_ips: Vec<FixedIp<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    security_groups: Vec<&'a str>,
}

#[derive(Serialize)]
struct FloatingIpProperties<'a> {
    floating_network: &'a str,
    port_id: GetResource,
}

#[derive(Serialize)]
struct PortReference {
    port: GetResource,
}

#[derive(Serialize)]
struct ServerProperties<'a> {
    name: &'a str,
    image: &'a str,
    flavor: &'a str,
    networks: Vec<PortReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    availability_zone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data_format: Option<&'static str>,
}

/// # Server Chain
///
/// Handle of the stack containing all members of the chain. The member groups are owned by the
/// handle. Placement changes them before the compute phase, and reordering produces a new handle
/// (see [`ServerChain::with_groups`]) for the same instances.
#[derive(Debug, Clone)]
pub struct ServerChain<C> {
    cloud: C,
    name: String,
    description: String,
    groups: Vec<MemberGroup>,
    network: NetworkIds,
    separate_access_port: bool,
    poll: PollSettings,
}

impl<C: CloudApi> ServerChain<C> {
    /// Create a new handle, and resolve the IDs of all networks. This does not create anything.
    pub fn new(
        cloud: C,
        meta: &FunctionChainMeta,
        network: &NetworkConfig,
        groups: Vec<MemberGroup>,
        separate_access_port: bool,
    ) -> Result<Self, ServerChainError> {
        let network = Self::resolve_network(&cloud, network)?;
        Ok(Self {
            cloud,
            name: meta.name.clone(),
            description: meta.description.clone(),
            groups,
            network,
            separate_access_port,
            poll: PollSettings::default(),
        })
    }

    /// Create a new handle from the configuration, using the member groups of the configuration.
    pub fn from_config(cloud: C, config: &ChainConfig) -> Result<Self, ServerChainError> {
        let manager = config.manager();
        Ok(Self::new(
            cloud,
            config.function_chain(),
            config.network(),
            config.server_chain().to_vec(),
            manager.separate_access_port,
        )?
        .with_poll_settings(PollSettings::new(
            Duration::from_secs(manager.poll_interval_s),
            Duration::from_secs(manager.poll_timeout_s),
        )))
    }

    /// Change the interval and timeout used while waiting for the stack.
    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Create a handle for the same stack, but with a different order of the members.
    pub fn with_groups(&self, groups: Vec<MemberGroup>) -> Self
    where
        C: Clone,
    {
        Self { groups, ..self.clone() }
    }

    fn resolve_network(cloud: &C, network: &NetworkConfig) -> Result<NetworkIds, ServerChainError> {
        let not_found = |kind: &'static str, name: &str| ServerChainError::NetworkNotFound {
            kind,
            name: name.to_string(),
        };
        let public = cloud
            .find_network(&network.pubnet_name)?
            .ok_or_else(|| not_found("network", &network.pubnet_name))?;
        let net = cloud
            .find_network(&network.net_name)?
            .ok_or_else(|| not_found("network", &network.net_name))?;
        let subnet = cloud
            .find_subnet(&network.subnet_name)?
            .ok_or_else(|| not_found("subnet", &network.subnet_name))?;
        let security_group = match network.security_group_name.as_ref() {
            Some(name) => {
                Some(cloud.find_security_group(name)?.ok_or_else(|| not_found("security group", name))?)
            }
            None => None,
        };
        Ok(NetworkIds { public, net, subnet, security_group })
    }

    /// Name of the chain, which is also the name of the stack
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description of the chain
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Member groups in forwarding order
    pub fn groups(&self) -> &[MemberGroup] {
        &self.groups
    }

    /// Mutable access to the member groups, used to assign the host affinity.
    pub fn groups_mut(&mut self) -> &mut [MemberGroup] {
        &mut self.groups
    }

    /// Iterate over all members in forwarding order
    pub fn members(&self) -> impl Iterator<Item = &MemberSpec> {
        self.groups.iter().flat_map(|g| g.iter())
    }

    /// Number of members
    pub fn member_count(&self) -> usize {
        self.members().count()
    }

    /// The resolved network IDs
    pub fn network_ids(&self) -> &NetworkIds {
        &self.network
    }

    /// The cloud used by this chain
    pub fn cloud(&self) -> &C {
        &self.cloud
    }

    /// Returns true if each member has a dedicated remote access port
    pub fn separate_access_port(&self) -> bool {
        self.separate_access_port
    }

    /// Port names of the member, in the order in which they are attached to the server.
    pub fn member_ports(&self, member: impl AsRef<str>) -> Vec<String> {
        let roles: &[PortRole] = if self.separate_access_port {
            &[PortRole::Access, PortRole::Ingress, PortRole::Egress]
        } else {
            &[PortRole::Ingress, PortRole::Egress]
        };
        roles.iter().map(|r| port_name(member.as_ref(), *r)).collect()
    }

    /// Name of the port to which the floating IP is bound
    pub fn remote_access_port(&self, member: impl AsRef<str>) -> String {
        if self.separate_access_port {
            port_name(member, PortRole::Access)
        } else {
            port_name(member, PortRole::Ingress)
        }
    }

    /// Template containing only the ports and floating IPs
    pub fn network_template(&self) -> Result<Template, ServerChainError> {
        let mut tpl = Template::new(self.description.as_str());
        for member in self.members() {
            self.add_network_resources(&mut tpl, member)?;
        }
        Ok(tpl)
    }

    /// Template containing the networking resources and the servers
    pub fn compute_template(&self) -> Result<Template, ServerChainError> {
        let mut tpl = Template::new(self.description.as_str());
        for member in self.members() {
            self.add_network_resources(&mut tpl, member)?;
            self.add_server(&mut tpl, member)?;
        }
        Ok(tpl)
    }

    fn add_network_resources(
        &self,
        tpl: &mut Template,
        member: &MemberSpec,
    ) -> Result<(), ServerChainError> {
        for port in self.member_ports(&member.name) {
            let properties = PortProperties {
                name: port.clone(),
                network_id: &self.network.net,
                fixed_ips: vec![FixedIp { subnet_id: &self.network.subnet }],
                security_groups: self.network.security_group.iter().map(|s| s.as_str()).collect(),
            };
            tpl.add_resource(port, "port", properties)?;
        }
        let fip = fip_name(&member.name);
        tpl.add_resource(
            fip.as_str(),
            "floating-ip",
            FloatingIpProperties {
                floating_network: &self.network.public,
                port_id: get_resource(self.remote_access_port(&member.name)),
            },
        )?;
        tpl.add_output(
            format!("{}_address", member.name),
            get_attr(fip, "floating_ip_address"),
            Some(format!("Public address of {}", member.name)),
        )?;
        Ok(())
    }

    fn add_server(&self, tpl: &mut Template, member: &MemberSpec) -> Result<(), ServerChainError> {
        let user_data = match member.init_script.as_ref() {
            Some(path) => Some(std::fs::read_to_string(path).map_err(|source| {
                ServerChainError::InitScript { path: path.clone(), source }
            })?),
            None => None,
        };
        let properties = ServerProperties {
            name: &member.name,
            image: &member.image,
            flavor: &member.flavor,
            networks: self
                .member_ports(&member.name)
                .into_iter()
                .map(|p| PortReference { port: get_resource(p) })
                .collect(),
            key_name: member.ssh.as_ref().map(|s| s.pub_key_name.as_str()),
            availability_zone: member.availability_zone.as_deref(),
            user_data_format: user_data.as_ref().map(|_| "RAW"),
            user_data,
        };
        tpl.add_resource(member.name.as_str(), "server", properties)?;
        Ok(())
    }

    /// Create the stack with all ports and floating IPs, and wait until heat reports completion.
    pub fn create_network_phase(&self) -> Result<(), ServerChainError> {
        let start = Instant::now();
        let doc = self.network_template()?.render()?;
        debug!("[{}] network template:\n{}", self.name, doc);
        self.cloud.create_stack(&self.name, &doc)?;
        self.wait_stack(false, "CREATE_COMPLETE")?;
        info!(
            "[{}] network resources of {} members created after {:.1}s",
            self.name,
            self.member_count(),
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// Add the servers to the existing stack. If `wait` is true, block until heat reports
    /// completion and all servers are active.
    pub fn create_compute_phase(&self, wait: bool) -> Result<(), ServerChainError> {
        let start = Instant::now();
        let doc = self.compute_template()?.render()?;
        debug!("[{}] compute template:\n{}", self.name, doc);
        self.cloud.update_stack(&self.name, &doc)?;
        if wait {
            self.wait_compute_ready()?;
            info!(
                "[{}] {} servers active after {:.1}s",
                self.name,
                self.member_count(),
                start.elapsed().as_secs_f64()
            );
        }
        Ok(())
    }

    /// Block until the stack is complete and all servers are active.
    pub fn wait_compute_ready(&self) -> Result<(), ServerChainError> {
        self.wait_stack(true, "UPDATE_COMPLETE")
    }

    fn wait_stack(&self, check_servers: bool, expected: &'static str) -> Result<(), ServerChainError> {
        let result = poll_until(self.poll, || -> Result<Option<()>, ServerChainError> {
            match self.cloud.stack_status(&self.name)? {
                StackStatus::Complete => {}
                StackStatus::Failed(reason) => {
                    error!("[{}] stack failed: {}", self.name, reason);
                    return Err(ServerChainError::StackFailed { stack: self.name.clone(), reason });
                }
                StackStatus::InProgress | StackStatus::NotFound => return Ok(None),
            }
            if check_servers {
                for member in self.members() {
                    match self.cloud.find_server(&member.name)? {
                        Some(s) if s.status == SERVER_ACTIVE => {}
                        Some(s) if s.status == SERVER_ERROR => {
                            error!("[{}] server {} failed", self.name, s.name);
                            return Err(ServerChainError::ServerFailed(s.name));
                        }
                        _ => return Ok(None),
                    }
                }
            }
            Ok(Some(()))
        })?;
        result.ok_or_else(|| {
            error!("[{}] timeout while waiting for {}", self.name, expected);
            ServerChainError::ResourceTimeout {
                stack: self.name.clone(),
                expected,
                timeout: self.poll.timeout,
            }
        })
    }

    /// Delete the stack, including all servers, ports and floating IPs. If `wait` is true, block
    /// until the stack is gone.
    pub fn delete(&self, wait: bool) -> Result<(), ServerChainError> {
        if self.cloud.stack_status(&self.name)? == StackStatus::NotFound {
            return Err(ServerChainError::ResourceNotFound(self.name.clone()));
        }
        self.cloud.delete_stack(&self.name)?;
        if wait {
            let start = Instant::now();
            let gone = poll_until(self.poll, || -> Result<Option<()>, ServerChainError> {
                match self.cloud.stack_status(&self.name)? {
                    StackStatus::NotFound => Ok(Some(())),
                    StackStatus::Failed(reason) => {
                        Err(ServerChainError::StackFailed { stack: self.name.clone(), reason })
                    }
                    _ => Ok(None),
                }
            })?;
            if gone.is_none() {
                error!("[{}] timeout while deleting the stack", self.name);
                return Err(ServerChainError::ResourceTimeout {
                    stack: self.name.clone(),
                    expected: "DELETE_COMPLETE",
                    timeout: self.poll.timeout,
                });
            }
            info!("[{}] stack deleted after {:.1}s", self.name, start.elapsed().as_secs_f64());
        }
        Ok(())
    }

    /// Resolve the ingress and egress port of every member, grouped like the members.
    pub fn port_pair_endpoints(&self) -> Result<Vec<Vec<PortPairEndpoint>>, ServerChainError> {
        self.groups
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(|member| {
                        Ok(PortPairEndpoint {
                            member: member.name.clone(),
                            ingress: self.resolve_port(port_name(&member.name, PortRole::Ingress))?,
                            egress: self.resolve_port(port_name(&member.name, PortRole::Egress))?,
                        })
                    })
                    .collect()
            })
            .collect()
    }

    /// Public address of every member, in forwarding order.
    pub fn remote_access_addresses(&self) -> Result<Vec<RemoteAccess>, ServerChainError> {
        self.members()
            .map(|member| {
                let port = self.remote_access_port(&member.name);
                let port_id = self.resolve_port(&port)?;
                let address = self
                    .cloud
                    .floating_ips(&port_id)?
                    .into_iter()
                    .next()
                    .ok_or(ServerChainError::NoFloatingIp(port))?;
                Ok(RemoteAccess { member: member.name.clone(), address })
            })
            .collect()
    }

    fn resolve_port(&self, name: impl AsRef<str>) -> Result<String, ServerChainError> {
        self.cloud
            .find_port(name.as_ref())?
            .ok_or_else(|| ServerChainError::PortNotFound(name.as_ref().to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn naming_convention() {
        assert_eq!(port_name("X", PortRole::Ingress), "X_pt_in");
        assert_eq!(port_name("X", PortRole::Egress), "X_pt_out");
        assert_eq!(port_name("X", PortRole::Access), "X_pt");
        assert_eq!(fip_name("X"), "X_fip");
        // stable across calls
        assert_eq!(port_name("sf0", PortRole::Ingress), port_name("sf0", PortRole::Ingress));
    }
}
