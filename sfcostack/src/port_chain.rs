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

//! # Port Chain
//!
//! Traffic steering through the members of a [`ServerChain`]. Every member gets a port pair
//! (`pp_{g}_{m}` for member `m` of group `g`), every group a port pair group (`pp_grp_{g}`). The
//! chain connects the groups in order and selects the traffic with one flow classifier.
//!
//! Resources are created strictly bottom-up (pairs, groups, classifier, chain) and deleted
//! top-down, since the cloud refuses to delete resources that are still referenced.

use crate::cloud::{
    CloudApi, CloudError, PortChainSpec, PortPairGroupSpec, PortPairSpec, SteeringKind,
    SteeringSpec,
};
use crate::config::FlowClassifierRule;
use crate::server_chain::{ServerChain, ServerChainError};

use log::*;
use thiserror::Error;

/// # Port Chain Error
#[derive(Debug, Error)]
pub enum PortChainError {
    /// The server chain has no members
    #[error("Chain {0} has no members!")]
    EmptyChain(String),
    /// A logical port of the flow classifier does not exist
    #[error("Can not find the logical port {0} of the flow classifier!")]
    UnresolvedClassifierPort(String),
    /// Error of the underlying server chain
    #[error("Server Chain Error: {0}")]
    ServerChain(#[from] ServerChainError),
    /// Error of the cloud
    #[error("Cloud Error: {0}")]
    Cloud(#[from] CloudError),
}

/// Name of the port pair of member `member` in group `group`
pub fn port_pair_name(group: usize, member: usize) -> String {
    format!("pp_{}_{}", group, member)
}

/// Name of the port pair group `group`
pub fn port_pair_group_name(group: usize) -> String {
    format!("pp_grp_{}", group)
}

/// # Port Chain
#[derive(Debug, Clone)]
pub struct PortChain<C> {
    cloud: C,
    name: String,
    description: String,
    server_chain: ServerChain<C>,
    flow_classifier: FlowClassifierRule,
}

impl<C: CloudApi + Clone> PortChain<C> {
    /// Create a new handle. This does not create anything.
    pub fn new(server_chain: ServerChain<C>, flow_classifier: FlowClassifierRule) -> Self {
        Self {
            cloud: server_chain.cloud().clone(),
            name: server_chain.name().to_string(),
            description: server_chain.description().to_string(),
            server_chain,
            flow_classifier,
        }
    }
}

impl<C: CloudApi> PortChain<C> {
    /// Name of the port chain
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The steered server chain
    pub fn server_chain(&self) -> &ServerChain<C> {
        &self.server_chain
    }

    /// The flow classifier rule
    pub fn flow_classifier(&self) -> &FlowClassifierRule {
        &self.flow_classifier
    }

    /// Names of all port pairs, grouped like the members
    pub fn port_pair_names(&self) -> Vec<Vec<String>> {
        self.server_chain
            .groups()
            .iter()
            .enumerate()
            .map(|(g, group)| (0..group.len()).map(|m| port_pair_name(g, m)).collect())
            .collect()
    }

    /// Names of all port pair groups, in forwarding order
    pub fn port_pair_group_names(&self) -> Vec<String> {
        (0..self.server_chain.groups().len()).map(port_pair_group_name).collect()
    }

    /// Create all steering resources, and return the ID of the port chain.
    pub fn create(&self) -> Result<String, PortChainError> {
        if self.server_chain.member_count() == 0 {
            return Err(PortChainError::EmptyChain(self.name.clone()));
        }
        let endpoints = self.server_chain.port_pair_endpoints()?;

        let mut pair_ids: Vec<Vec<String>> = Vec::with_capacity(endpoints.len());
        for (g, group) in endpoints.iter().enumerate() {
            let mut ids = Vec::with_capacity(group.len());
            for (m, endpoint) in group.iter().enumerate() {
                let spec = SteeringSpec::PortPair(PortPairSpec {
                    name: port_pair_name(g, m),
                    description: format!("Port pair of {}", endpoint.member),
                    ingress: endpoint.ingress.clone(),
                    egress: endpoint.egress.clone(),
                });
                ids.push(self.create_steering(&spec)?);
            }
            pair_ids.push(ids);
        }

        let mut group_ids = Vec::with_capacity(pair_ids.len());
        for (g, port_pairs) in pair_ids.into_iter().enumerate() {
            let spec = SteeringSpec::PortPairGroup(PortPairGroupSpec {
                name: port_pair_group_name(g),
                description: self.description.clone(),
                port_pairs,
            });
            group_ids.push(self.create_steering(&spec)?);
        }

        let mut rule = self.flow_classifier.clone();
        rule.logical_source_port = self.resolve_port(&rule.logical_source_port)?;
        if let Some(port) = rule.logical_destination_port.take() {
            rule.logical_destination_port = Some(self.resolve_port(&port)?);
        }
        let classifier_id = self.create_steering(&SteeringSpec::FlowClassifier(rule))?;

        let chain_id = self.create_steering(&SteeringSpec::PortChain(PortChainSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            port_pair_groups: group_ids,
            flow_classifiers: vec![classifier_id],
        }))?;
        info!("[{}] port chain created", self.name);
        Ok(chain_id)
    }

    /// Delete all steering resources in the reverse order of their creation. Resources that do
    /// not exist are skipped.
    pub fn delete(&self) -> Result<(), PortChainError> {
        self.delete_by_name(SteeringKind::PortChain, &self.name)?;
        self.delete_by_name(SteeringKind::FlowClassifier, &self.flow_classifier.name)?;
        for group in self.port_pair_group_names().iter().rev() {
            self.delete_by_name(SteeringKind::PortPairGroup, group)?;
        }
        for pair in self.port_pair_names().iter().rev().flat_map(|g| g.iter().rev()) {
            self.delete_by_name(SteeringKind::PortPair, pair)?;
        }
        info!("[{}] port chain deleted", self.name);
        Ok(())
    }

    fn create_steering(&self, spec: &SteeringSpec) -> Result<String, PortChainError> {
        let id = self.cloud.create_steering(spec)?;
        debug!("[{}] created {} {}", self.name, spec.kind(), spec.name());
        Ok(id)
    }

    fn delete_by_name(&self, kind: SteeringKind, name: &str) -> Result<(), PortChainError> {
        match self.cloud.find_steering(kind, name)? {
            Some(handle) => {
                self.cloud.delete_steering(kind, &handle.id)?;
                debug!("[{}] deleted {} {}", self.name, kind, name);
            }
            None => warn!("[{}] {} {} does not exist, skipping", self.name, kind, name),
        }
        Ok(())
    }

    fn resolve_port(&self, name: &str) -> Result<String, PortChainError> {
        self.cloud
            .find_port(name)?
            .ok_or_else(|| PortChainError::UnresolvedClassifierPort(name.to_string()))
    }
}

/// Delete every steering resource of the project, regardless of the chain it belongs to. Returns
/// the number of deleted resources.
pub fn cleanup_steering<C: CloudApi>(cloud: &C) -> Result<usize, CloudError> {
    let mut deleted = 0;
    for kind in [
        SteeringKind::PortChain,
        SteeringKind::FlowClassifier,
        SteeringKind::PortPairGroup,
        SteeringKind::PortPair,
    ]
    .iter()
    {
        for handle in cloud.list_steering(*kind)? {
            cloud.delete_steering(*kind, &handle.id)?;
            debug!("deleted {} {}", kind, handle.name);
            deleted += 1;
        }
    }
    info!("Deleted {} steering resources", deleted);
    Ok(deleted)
}
