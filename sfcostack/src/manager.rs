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

//! # SFC Manager
//!
//! Orchestrates the creation of a complete service function chain:
//!
//! 1. Apply the placement policy to the members.
//! 2. Start the readiness listener (if requested), such that no early signal is lost.
//! 3. Create the ports and floating IPs (network phase).
//! 4. Add the servers and wait until they are active (compute phase).
//! 5. Wait for the ready signal of every member.
//! 6. Reorder the members based on their actual host.
//! 7. Create the traffic steering.
//!
//! A failure in any step aborts the creation and stops the readiness listener. Already created
//! resources are not rolled back, use the `cleanup` command of the CLI to remove them.

use crate::cloud::CloudApi;
use crate::config::{ChainConfig, ManagerConfig};
use crate::placement::{self, PlacementPolicy};
use crate::poll::PollSettings;
use crate::port_chain::PortChain;
use crate::readiness::ReadinessBarrier;
use crate::reorder::{self, ReorderPolicy};
use crate::server_chain::{ServerChain, ServerChainError};

use log::*;
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;

/// # SFC Manager Error
#[derive(Debug, Error)]
pub enum SfcManagerError {
    /// The placement policy is not known
    #[error("Unknown placement policy: {0}")]
    UnknownPlacementPolicy(String),
    /// The reorder policy is not known
    #[error("Unknown reorder policy: {0}")]
    UnknownReorderPolicy(String),
    /// The operation is not allowed in the current state of the chain
    #[error("Chain {chain} is {state}, but the operation requires it to be {expected}")]
    InvalidSequence {
        /// Name of the chain
        chain: String,
        /// Current state
        state: ChainState,
        /// Required state
        expected: ChainState,
    },
}

/// Lifecycle state of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainState {
    /// Nothing exists
    Uncreated,
    /// Ports and floating IPs are being created
    NetworkCreating,
    /// Ports and floating IPs exist
    NetworkReady,
    /// Servers are being created
    ComputeCreating,
    /// All servers are active
    ComputeReady,
    /// Waiting for the ready signals
    ReadinessWaiting,
    /// Members are in the final order
    Reordered,
    /// Steering is being created
    SteeringCreating,
    /// Traffic is steered through the chain
    Active,
    /// The chain is being deleted
    Deleting,
    /// Everything is deleted
    Deleted,
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uncreated => "UNCREATED",
            Self::NetworkCreating => "NETWORK_CREATING",
            Self::NetworkReady => "NETWORK_READY",
            Self::ComputeCreating => "COMPUTE_CREATING",
            Self::ComputeReady => "COMPUTE_READY",
            Self::ReadinessWaiting => "READINESS_WAITING",
            Self::Reordered => "REORDERED",
            Self::SteeringCreating => "STEERING_CREATING",
            Self::Active => "ACTIVE",
            Self::Deleting => "DELETING",
            Self::Deleted => "DELETED",
        };
        write!(f, "{}", s)
    }
}

/// Duration of each phase of the creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseDurations {
    /// Creating ports and floating IPs
    #[serde(rename = "network-create", serialize_with = "as_secs")]
    pub network_create: Duration,
    /// Creating the servers
    #[serde(rename = "compute-create", serialize_with = "as_secs")]
    pub compute_create: Duration,
    /// Waiting for the ready signals (after all servers are active)
    #[serde(rename = "readiness-wait", serialize_with = "as_secs")]
    pub readiness_wait: Duration,
    /// Reordering the members
    #[serde(rename = "reorder", serialize_with = "as_secs")]
    pub reorder: Duration,
    /// Creating the steering
    #[serde(rename = "steering-create", serialize_with = "as_secs")]
    pub steering_create: Duration,
}

impl PhaseDurations {
    /// Sum of all phases
    pub fn total(&self) -> Duration {
        self.network_create
            + self.compute_create
            + self.readiness_wait
            + self.reorder
            + self.steering_create
    }
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Handle of a deployed service function chain
#[derive(Debug)]
pub struct Sfc<C> {
    server_chain: ServerChain<C>,
    port_chain: PortChain<C>,
    state: ChainState,
}

impl<C> Sfc<C> {
    /// The server chain, in the final member order
    pub fn server_chain(&self) -> &ServerChain<C> {
        &self.server_chain
    }

    /// The port chain
    pub fn port_chain(&self) -> &PortChain<C> {
        &self.port_chain
    }

    /// Current lifecycle state
    pub fn state(&self) -> ChainState {
        self.state
    }
}

/// # SFC Manager
#[derive(Debug, Clone)]
pub struct SfcManager<C> {
    cloud: C,
    barrier: ReadinessBarrier,
    signal_addr: SocketAddr,
    poll: PollSettings,
    cpu_allocation_ratio: f64,
    separate_access_port: bool,
}

impl<C: CloudApi + Clone> SfcManager<C> {
    /// Create a new manager
    pub fn new(cloud: C, config: &ManagerConfig) -> Self {
        Self {
            cloud,
            barrier: ReadinessBarrier::from_config(config),
            signal_addr: config.signal_addr(),
            poll: PollSettings::new(
                Duration::from_secs(config.poll_interval_s),
                Duration::from_secs(config.poll_timeout_s),
            ),
            cpu_allocation_ratio: config.cpu_allocation_ratio,
            separate_access_port: config.separate_access_port,
        }
    }

    /// Change the poll settings used while waiting for the stack
    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Change the address on which the ready signals are received
    pub fn with_signal_addr(mut self, addr: SocketAddr) -> Self {
        self.signal_addr = addr;
        self
    }

    fn transition(chain: &str, state: &mut ChainState, next: ChainState) {
        debug!("[{}] {} -> {}", chain, state, next);
        *state = next;
    }

    /// Create a complete service function chain from the configuration.
    pub fn create_sfc(
        &self,
        config: &ChainConfig,
        placement: &str,
        reorder: &str,
        wait_for_ready: bool,
    ) -> Result<(Sfc<C>, PhaseDurations), crate::Error> {
        let placement_policy: PlacementPolicy = placement.parse()?;
        let reorder_policy: ReorderPolicy = reorder.parse()?;
        let meta = config.function_chain();
        let name = meta.name.as_str();
        let mut state = ChainState::Uncreated;
        let mut durations = PhaseDurations::default();

        let mut server_chain = ServerChain::new(
            self.cloud.clone(),
            meta,
            config.network(),
            config.server_chain().to_vec(),
            self.separate_access_port,
        )?
        .with_poll_settings(self.poll);
        let member_count = server_chain.member_count();
        info!("[{}] creating chain with {} members", name, member_count);

        placement::place(
            placement_policy,
            server_chain.groups_mut(),
            &self.cloud,
            meta,
            self.cpu_allocation_ratio,
        )?;

        // dropped (and thereby stopped) if any of the following phases fails
        let listener = if wait_for_ready {
            Some(self.barrier.listen(self.signal_addr, member_count)?)
        } else {
            None
        };

        Self::transition(name, &mut state, ChainState::NetworkCreating);
        let start = Instant::now();
        server_chain.create_network_phase()?;
        durations.network_create = start.elapsed();
        Self::transition(name, &mut state, ChainState::NetworkReady);

        Self::transition(name, &mut state, ChainState::ComputeCreating);
        let start = Instant::now();
        server_chain.create_compute_phase(true)?;
        durations.compute_create = start.elapsed();
        Self::transition(name, &mut state, ChainState::ComputeReady);

        if let Some(listener) = listener {
            Self::transition(name, &mut state, ChainState::ReadinessWaiting);
            let start = Instant::now();
            listener.join().map_err(|e| {
                error!("[{}] readiness barrier failed: {}", name, e);
                e
            })?;
            durations.readiness_wait = start.elapsed();
            info!("[{}] all {} members are ready", name, member_count);
        }

        let start = Instant::now();
        let candidates = placement::candidate_hosts(meta);
        let groups =
            reorder::reorder(reorder_policy, server_chain.groups(), &self.cloud, &candidates)?;
        let server_chain = server_chain.with_groups(groups);
        durations.reorder = start.elapsed();
        Self::transition(name, &mut state, ChainState::Reordered);

        Self::transition(name, &mut state, ChainState::SteeringCreating);
        let start = Instant::now();
        let port_chain = PortChain::new(server_chain.clone(), config.flow_classifier().clone());
        port_chain.create()?;
        durations.steering_create = start.elapsed();
        Self::transition(name, &mut state, ChainState::Active);

        info!("[{}] chain is active after {:.1}s", name, durations.total().as_secs_f64());
        Ok((Sfc { server_chain, port_chain, state }, durations))
    }

    /// Get the handle of an existing chain, as it is described in the configuration.
    pub fn attach(&self, config: &ChainConfig) -> Result<Sfc<C>, crate::Error> {
        let server_chain = ServerChain::new(
            self.cloud.clone(),
            config.function_chain(),
            config.network(),
            config.server_chain().to_vec(),
            self.separate_access_port,
        )?
        .with_poll_settings(self.poll);
        let port_chain = PortChain::new(server_chain.clone(), config.flow_classifier().clone());
        Ok(Sfc { server_chain, port_chain, state: ChainState::Active })
    }

    /// Delete the chain: first the steering, then the servers and their ports. A chain whose
    /// deletion failed half way stays `DELETING`, and the deletion can be retried on the same
    /// handle.
    pub fn delete_sfc(&self, sfc: &mut Sfc<C>) -> Result<(), crate::Error> {
        let name = sfc.server_chain.name().to_string();
        let retry = match sfc.state {
            ChainState::Active => false,
            ChainState::Deleting => true,
            state => {
                return Err(SfcManagerError::InvalidSequence {
                    chain: name,
                    state,
                    expected: ChainState::Active,
                }
                .into())
            }
        };
        if retry {
            info!("[{}] retrying the deletion", name);
        } else {
            Self::transition(&name, &mut sfc.state, ChainState::Deleting);
        }
        sfc.port_chain.delete()?;
        match sfc.server_chain.delete(true) {
            // the stack of the previous attempt finished deleting in the meantime
            Err(ServerChainError::ResourceNotFound(_)) if retry => {
                warn!("[{}] stack is already gone", name)
            }
            result => result?,
        }
        Self::transition(&name, &mut sfc.state, ChainState::Deleted);
        info!("[{}] chain deleted", name);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn durations_as_json() {
        let durations = PhaseDurations {
            network_create: Duration::from_millis(1500),
            compute_create: Duration::from_secs(30),
            ..Default::default()
        };
        let json = serde_json::to_value(&durations).unwrap();
        assert_eq!(json["network-create"], 1.5);
        assert_eq!(json["compute-create"], 30.0);
        assert_eq!(json["steering-create"], 0.0);
        assert_eq!(durations.total(), Duration::from_millis(31500));
    }

    #[test]
    fn state_names() {
        assert_eq!(ChainState::Active.to_string(), "ACTIVE");
        assert_eq!(ChainState::ReadinessWaiting.to_string(), "READINESS_WAITING");
    }
}
