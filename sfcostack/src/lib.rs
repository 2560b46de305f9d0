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

#![deny(missing_docs, missing_debug_implementations)]

//! # SFC-Ostack: Service Function Chains on OpenStack
//!
//! This library deploys service function chains on an OpenStack cloud with the networking-sfc
//! extension. A chain is an ordered list of member groups. Each member is a server with an
//! ingress and an egress port, and traffic matching a flow classifier is steered through one
//! member of every group, in order.
//!
//! ## Structure
//!
//! - **[`Config`](config)**: Typed and validated view over the YAML configuration of a chain.
//!
//! - **[`Cloud`](cloud)**: The operations of the cloud used by this library, collected in the
//!   trait [`CloudApi`](cloud::CloudApi). It is implemented for [`ostack::OpenStack`].
//!
//! - **[`HOT`](hot)**: Builder for heat orchestration templates.
//!
//! - **[`ServerChain`](server_chain)**: The servers of a chain, with their ports and floating
//!   IPs, managed as one heat stack which is created in two phases.
//!
//! - **[`PortChain`](port_chain)**: Traffic steering resources (port pairs, port pair groups,
//!   flow classifier and port chain) for a server chain.
//!
//! - **[`Placement`](placement)** and **[`Reorder`](reorder)**: Policies deciding on which host
//!   each member is started, and how the members are ordered once their host is known.
//!
//! - **[`Readiness`](readiness)**: Barrier waiting for the ready signal of every member.
//!
//! - **[`Manager`](manager)**: Orchestrates the whole lifecycle of a chain, see
//!   [`SfcManager`](manager::SfcManager).
//!
//! ## Example
//!
//! ```no_run
//! use sfcostack::config::ChainConfig;
//! use sfcostack::manager::SfcManager;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ChainConfig::load_file("./sfc_conf.yaml")?;
//!     let cloud = ostack::OpenStack::connect(config.cloud_auth())?;
//!     let manager = SfcManager::new(cloud, config.manager());
//!
//!     let (mut sfc, durations) = manager.create_sfc(&config, "fill-one", "min-latency", true)?;
//!     println!("chain created after {:?}", durations.total());
//!
//!     manager.delete_sfc(&mut sfc)?;
//!     Ok(())
//! }
//! ```

pub mod cloud;
pub mod config;
mod error;
pub mod hot;
pub mod manager;
pub mod placement;
pub mod poll;
pub mod port_chain;
pub mod readiness;
pub mod remote_exec;
pub mod reorder;
pub mod server_chain;

pub use error::Error;

#[cfg(test)]
mod test;
