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

//! # Placement
//!
//! Decide on which compute host each member is started, before the compute phase. The decision
//! is expressed as host affinity (`zone:host`) on each member.
//!
//! - `platform-default`: The scheduler of the cloud decides. Members without explicit affinity
//!   are only restricted to the availability zone of the chain.
//! - `fill-one`: Walk the candidate hosts in order (seed host first), and put as many members as
//!   possible on the current host before moving to the next one. Members pinned to a host in the
//!   configuration stay there.

use crate::cloud::{CloudApi, CloudError, Flavor, HostInfo};
use crate::config::{FunctionChainMeta, MemberGroup, MemberSpec};
use crate::manager::SfcManagerError;

use itertools::Itertools;
use log::*;
use std::str::FromStr;
use thiserror::Error;

/// # Placement Error
#[derive(Debug, Error)]
pub enum PlacementError {
    /// The candidate hosts cannot hold all members
    #[error("Insufficient capacity: {required} members, but only room for {available}")]
    InsufficientCapacity {
        /// Number of members to place
        required: usize,
        /// Number of members that fit on all candidate hosts
        available: usize,
    },
    /// A candidate host is unknown to the cloud
    #[error("Unknown compute host: {0}")]
    UnknownHost(String),
    /// A flavor is unknown to the cloud
    #[error("Unknown flavor: {0}")]
    UnknownFlavor(String),
    /// Error of the cloud
    #[error("Cloud Error: {0}")]
    Cloud(#[from] CloudError),
}

/// Placement policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementPolicy {
    /// Let the scheduler of the cloud decide
    PlatformDefault,
    /// Fill the candidate hosts one after the other
    FillOne,
}

impl FromStr for PlacementPolicy {
    type Err = SfcManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "platform-default" | "platform_default" | "nova_default" | "default" => {
                Ok(Self::PlatformDefault)
            }
            "fill-one" | "fill_one" => Ok(Self::FillOne),
            _ => Err(SfcManagerError::UnknownPlacementPolicy(s.to_string())),
        }
    }
}

/// Number of members a host can take
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCapacity {
    /// Name of the host
    pub name: String,
    /// Number of members that fit on the host
    pub capacity: usize,
}

/// Candidate hosts in the order in which they are filled: the seed host (the destination
/// hypervisor) first, followed by the available hypervisors.
pub fn candidate_hosts(meta: &FunctionChainMeta) -> Vec<String> {
    meta.destination_hypervisor
        .iter()
        .chain(meta.available_hypervisors.iter())
        .unique()
        .cloned()
        .collect()
}

/// Number of instances of the flavor that fit on the host. CPUs are overcommitted by
/// `cpu_allocation_ratio`, memory and disk are not.
pub fn capacity(host: &HostInfo, flavor: &Flavor, cpu_allocation_ratio: f64) -> usize {
    let fits = |free: f64, required: f64| -> usize {
        if required <= 0.0 {
            usize::MAX
        } else {
            (free / required).floor().max(0.0) as usize
        }
    };
    let cpu = fits(cpu_allocation_ratio * host.free_vcpus as f64, flavor.vcpus as f64);
    let ram = fits(host.free_ram_mb as f64, flavor.ram_mb as f64);
    let disk = fits(host.free_disk_gb as f64, flavor.disk_gb as f64);
    cpu.min(ram).min(disk)
}

/// Host named by an explicit `zone:host` affinity
fn pinned_host(member: &MemberSpec) -> Option<&str> {
    member.availability_zone.as_deref().and_then(|z| z.split_once(':')).map(|(_, host)| host)
}

/// Assign every member (in forwarding order) to the first host that still has room. Returns the
/// number of members on each host. Nothing is changed if the hosts are too small.
///
/// Members with an explicit affinity keep it. If it names one of the hosts, the member takes one
/// slot of that host.
pub fn fill_one(
    groups: &mut [MemberGroup],
    hosts: &[HostCapacity],
    zone: &str,
) -> Result<Vec<usize>, PlacementError> {
    let mut assigned = vec![0; hosts.len()];
    for member in groups.iter().flat_map(|g| g.iter()) {
        if let Some(host) = pinned_host(member) {
            match hosts.iter().position(|h| h.name == host) {
                Some(idx) => assigned[idx] += 1,
                None => debug!("{} is pinned to {}, which is not a candidate", member.name, host),
            }
        }
    }
    for (host, n) in hosts.iter().zip(assigned.iter()) {
        if *n > host.capacity {
            warn!("{} members are pinned to {}, which has room for {}", n, host.name, host.capacity);
        }
    }

    let required =
        groups.iter().flat_map(|g| g.iter()).filter(|m| m.availability_zone.is_none()).count();
    let available = hosts
        .iter()
        .zip(assigned.iter())
        .fold(0usize, |acc, (h, n)| acc.saturating_add(h.capacity.saturating_sub(*n)));
    if available < required {
        return Err(PlacementError::InsufficientCapacity { required, available });
    }

    let mut current = 0;
    for member in groups.iter_mut().flat_map(|g| g.iter_mut()) {
        if member.availability_zone.is_some() {
            continue;
        }
        while assigned[current] >= hosts[current].capacity {
            current += 1;
        }
        assigned[current] += 1;
        member.availability_zone = Some(format!("{}:{}", zone, hosts[current].name));
    }
    Ok(assigned)
}

/// Apply the placement policy to the member groups.
pub fn place<C: CloudApi>(
    policy: PlacementPolicy,
    groups: &mut [MemberGroup],
    cloud: &C,
    meta: &FunctionChainMeta,
    cpu_allocation_ratio: f64,
) -> Result<(), PlacementError> {
    match policy {
        PlacementPolicy::PlatformDefault => {
            for member in groups.iter_mut().flat_map(|g| g.iter_mut()) {
                if member.availability_zone.is_none() {
                    member.availability_zone = Some(meta.availability_zone.clone());
                }
            }
            Ok(())
        }
        PlacementPolicy::FillOne => {
            let flavor = largest_flavor(groups, cloud)?;
            let hosts = candidate_hosts(meta)
                .into_iter()
                .map(|name| {
                    let host = cloud
                        .find_host(&name)?
                        .ok_or_else(|| PlacementError::UnknownHost(name.clone()))?;
                    Ok(HostCapacity { capacity: capacity(&host, &flavor, cpu_allocation_ratio), name })
                })
                .collect::<Result<Vec<_>, PlacementError>>()?;
            let assigned = fill_one(groups, &hosts, &meta.availability_zone)?;
            info!(
                "fill-one placement: {}",
                hosts
                    .iter()
                    .zip(assigned.iter())
                    .filter(|(_, n)| **n > 0)
                    .map(|(h, n)| format!("{}: {}", h.name, n))
                    .join(", ")
            );
            Ok(())
        }
    }
}

/// Component-wise maximum of all flavors used by the members, such that the capacity of a host
/// is never overestimated.
fn largest_flavor<C: CloudApi>(groups: &[MemberGroup], cloud: &C) -> Result<Flavor, PlacementError> {
    let mut result = Flavor { vcpus: 0, ram_mb: 0, disk_gb: 0 };
    for name in groups.iter().flat_map(|g| g.iter()).map(|m| &m.flavor).unique() {
        let flavor =
            cloud.find_flavor(name)?.ok_or_else(|| PlacementError::UnknownFlavor(name.clone()))?;
        result.vcpus = result.vcpus.max(flavor.vcpus);
        result.ram_mb = result.ram_mb.max(flavor.ram_mb);
        result.disk_gb = result.disk_gb.max(flavor.disk_gb);
    }
    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;

    fn members(n: usize) -> Vec<MemberGroup> {
        (0..n)
            .map(|i| {
                vec![MemberSpec {
                    name: format!("sf{}", i),
                    image: "ubuntu-cloud".to_string(),
                    flavor: "sfc_test".to_string(),
                    init_script: None,
                    ssh: None,
                    availability_zone: None,
                }]
            })
            .collect()
    }

    fn host(name: &str, free_vcpus: u32, free_ram_mb: u64) -> HostInfo {
        HostInfo {
            name: name.to_string(),
            total_vcpus: free_vcpus,
            free_vcpus,
            total_ram_mb: free_ram_mb,
            free_ram_mb,
            total_disk_gb: 100,
            free_disk_gb: 100,
        }
    }

    #[test]
    fn policy_names() {
        assert_eq!("fill-one".parse::<PlacementPolicy>().unwrap(), PlacementPolicy::FillOne);
        assert_eq!("fill_one".parse::<PlacementPolicy>().unwrap(), PlacementPolicy::FillOne);
        assert_eq!("nova_default".parse::<PlacementPolicy>().unwrap(), PlacementPolicy::PlatformDefault);
        assert_eq!("default".parse::<PlacementPolicy>().unwrap(), PlacementPolicy::PlatformDefault);
        assert!("random".parse::<PlacementPolicy>().is_err());
    }

    #[test]
    fn host_capacity() {
        let flavor = Flavor { vcpus: 2, ram_mb: 1024, disk_gb: 10 };
        // cpu: 16 * 1 / 2 = 8, ram: 3, disk: 10
        assert_eq!(capacity(&host("h", 1, 3500), &flavor, 16.0), 3);
        // cpu: 1 * 3 / 2 = 1
        assert_eq!(capacity(&host("h", 3, 8192), &flavor, 1.0), 1);
        assert_eq!(capacity(&host("h", 0, 8192), &flavor, 16.0), 0);
    }

    #[test]
    fn fill_seed_first() {
        let mut groups = members(5);
        let hosts = vec![
            HostCapacity { name: "compute1".to_string(), capacity: 3 },
            HostCapacity { name: "compute2".to_string(), capacity: 4 },
        ];
        assert_eq!(fill_one(&mut groups, &hosts, "nova").unwrap(), vec![3, 2]);
        let zones: Vec<_> =
            groups.iter().map(|g| g[0].availability_zone.clone().unwrap()).collect();
        assert_eq!(
            zones,
            vec![
                "nova:compute1",
                "nova:compute1",
                "nova:compute1",
                "nova:compute2",
                "nova:compute2"
            ]
        );
    }

    #[test]
    fn fill_insufficient() {
        let mut groups = members(4);
        let hosts = vec![
            HostCapacity { name: "compute1".to_string(), capacity: 1 },
            HostCapacity { name: "compute2".to_string(), capacity: 2 },
        ];
        match fill_one(&mut groups, &hosts, "nova") {
            Err(PlacementError::InsufficientCapacity { required: 4, available: 3 }) => {}
            r => panic!("unexpected result: {:?}", r),
        }
        assert!(groups.iter().all(|g| g[0].availability_zone.is_none()));
    }

    #[test]
    fn fill_keeps_pinned_members() {
        let mut groups = members(4);
        groups[1][0].availability_zone = Some("nova:compute1".to_string());
        groups[3][0].availability_zone = Some("nova:compute9".to_string());
        let hosts = vec![
            HostCapacity { name: "compute1".to_string(), capacity: 2 },
            HostCapacity { name: "compute2".to_string(), capacity: 2 },
        ];
        assert_eq!(fill_one(&mut groups, &hosts, "nova").unwrap(), vec![2, 1]);
        let zones: Vec<_> =
            groups.iter().map(|g| g[0].availability_zone.clone().unwrap()).collect();
        assert_eq!(zones, vec!["nova:compute1", "nova:compute1", "nova:compute2", "nova:compute9"]);
    }

    #[test]
    fn pinned_members_use_capacity() {
        let mut groups = members(3);
        groups[2][0].availability_zone = Some("nova:compute1".to_string());
        let hosts = vec![
            HostCapacity { name: "compute1".to_string(), capacity: 1 },
            HostCapacity { name: "compute2".to_string(), capacity: 1 },
        ];
        match fill_one(&mut groups, &hosts, "nova") {
            Err(PlacementError::InsufficientCapacity { required: 2, available: 1 }) => {}
            r => panic!("unexpected result: {:?}", r),
        }
        assert!(groups[0][0].availability_zone.is_none());
    }

    #[test]
    fn seed_host_first() {
        let meta = FunctionChainMeta {
            name: "chain".to_string(),
            description: String::new(),
            availability_zone: "nova".to_string(),
            destination_hypervisor: Some("compute2".to_string()),
            available_hypervisors: vec!["compute1".to_string(), "compute2".to_string()],
        };
        assert_eq!(candidate_hosts(&meta), vec!["compute2", "compute1"]);
    }
}
