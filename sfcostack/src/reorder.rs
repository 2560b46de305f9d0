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

//! # Reordering
//!
//! After the compute phase, the members may be reordered based on their actual placement. The
//! `min-latency` policy makes all members on the same host adjacent in the chain, such that the
//! traffic crosses as few hosts as possible.

use crate::cloud::{CloudApi, CloudError};
use crate::config::MemberGroup;
use crate::manager::SfcManagerError;

use log::*;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// # Reorder Error
#[derive(Debug, Error)]
pub enum ReorderError {
    /// A member has no server
    #[error("Cannot find the server of member {0}")]
    UnknownServer(String),
    /// Error of the cloud
    #[error("Cloud Error: {0}")]
    Cloud(#[from] CloudError),
}

/// Reorder policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderPolicy {
    /// Keep the configured order
    Identity,
    /// Group members by host, in the order of the candidate hosts
    MinLatency,
}

impl FromStr for ReorderPolicy {
    type Err = SfcManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "identity" | "default" | "none" => Ok(Self::Identity),
            "min-latency" | "min_latency" | "min_lat" => Ok(Self::MinLatency),
            _ => Err(SfcManagerError::UnknownReorderPolicy(s.to_string())),
        }
    }
}

/// Reorder the members based on the host of each member. Members on hosts that are no candidate
/// (or with unknown host) keep their relative order and are appended at the end. With
/// `min-latency`, every member forms its own group.
pub fn reorder_by_host(
    policy: ReorderPolicy,
    groups: &[MemberGroup],
    hosts: &HashMap<String, Option<String>>,
    candidate_hosts: &[String],
) -> Vec<MemberGroup> {
    match policy {
        ReorderPolicy::Identity => groups.to_vec(),
        ReorderPolicy::MinLatency => {
            let rank = |name: &str| -> usize {
                hosts
                    .get(name)
                    .and_then(|h| h.as_ref())
                    .and_then(|h| candidate_hosts.iter().position(|c| c == h))
                    .unwrap_or(candidate_hosts.len())
            };
            let mut members: Vec<_> = groups.iter().flat_map(|g| g.iter()).cloned().collect();
            // stable sort keeps the forwarding order on each host
            members.sort_by_key(|m| rank(&m.name));
            members.into_iter().map(|m| vec![m]).collect()
        }
    }
}

/// Look up the actual host of every member and reorder the groups.
pub fn reorder<C: CloudApi>(
    policy: ReorderPolicy,
    groups: &[MemberGroup],
    cloud: &C,
    candidate_hosts: &[String],
) -> Result<Vec<MemberGroup>, ReorderError> {
    if policy == ReorderPolicy::Identity {
        return Ok(groups.to_vec());
    }
    let mut hosts = HashMap::new();
    for member in groups.iter().flat_map(|g| g.iter()) {
        let server = cloud
            .find_server(&member.name)?
            .ok_or_else(|| ReorderError::UnknownServer(member.name.clone()))?;
        if server.host.is_none() {
            warn!("Host of server {} is unknown", member.name);
        }
        hosts.insert(member.name.clone(), server.host);
    }
    let result = reorder_by_host(policy, groups, &hosts, candidate_hosts);
    debug!(
        "new member order: {:?}",
        result.iter().flat_map(|g| g.iter()).map(|m| m.name.as_str()).collect::<Vec<_>>()
    );
    Ok(result)
}
