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

use super::fake_cloud::{Call, FakeCloud};
use super::{member_names, test_config};
use crate::cloud::SteeringKind;
use crate::manager::*;
use crate::placement::PlacementError;
use crate::poll::PollSettings;
use crate::port_chain::{port_pair_group_name, port_pair_name};
use crate::server_chain::ServerChainError;
use crate::Error;

use std::net::UdpSocket;
use std::thread;
use std::time::Duration;

fn manager(cloud: &FakeCloud) -> SfcManager<FakeCloud> {
    SfcManager::new(cloud.clone(), test_config().manager())
        .with_poll_settings(PollSettings::new(Duration::from_millis(1), Duration::from_secs(5)))
}

fn steering(call: &Call) -> Option<(SteeringKind, String)> {
    match call {
        Call::CreateSteering(kind, name) | Call::DeleteSteering(kind, name) => {
            Some((*kind, name.clone()))
        }
        _ => None,
    }
}

/// Follow the IDs referenced by the port chain down to the ingress ports, and return the member
/// of each group, in forwarding order.
fn steered_members(cloud: &FakeCloud) -> Vec<String> {
    let group_names = cloud.steering_names(SteeringKind::PortPairGroup);
    assert_eq!(group_names, (0..3).map(port_pair_group_name).collect::<Vec<_>>());
    let mut chain_refs: Vec<String> = group_names
        .iter()
        .map(|g| cloud.steering_id(SteeringKind::PortPairGroup, g).unwrap())
        .collect();
    chain_refs.push(cloud.steering_id(SteeringKind::FlowClassifier, "udp_dst_9999").unwrap());
    assert_eq!(cloud.steering_refs(SteeringKind::PortChain, "udp_chain"), chain_refs);

    group_names
        .iter()
        .enumerate()
        .map(|(g, group)| {
            let pair = port_pair_name(g, 0);
            assert_eq!(
                cloud.steering_refs(SteeringKind::PortPairGroup, group),
                vec![cloud.steering_id(SteeringKind::PortPair, &pair).unwrap()]
            );
            let ingress = cloud.steering_refs(SteeringKind::PortPair, &pair)[0].clone();
            cloud.port_name(&ingress).unwrap().trim_end_matches("_pt_in").to_string()
        })
        .collect()
}

#[test]
fn create_and_delete() {
    let cloud = FakeCloud::new();
    let manager = manager(&cloud);
    let config = test_config();

    let (mut sfc, durations) =
        manager.create_sfc(&config, "platform-default", "identity", false).unwrap();
    assert_eq!(sfc.state(), ChainState::Active);
    assert_eq!(durations.readiness_wait, Duration::from_secs(0));
    assert!(sfc
        .server_chain()
        .members()
        .all(|m| m.availability_zone.as_deref() == Some("nova")));
    assert_eq!(cloud.steering_names(SteeringKind::PortChain), vec!["udp_chain"]);
    assert_eq!(cloud.server("ids").unwrap().status, "ACTIVE");
    assert_eq!(steered_members(&cloud), vec!["fw", "ids", "lb"]);

    manager.delete_sfc(&mut sfc).unwrap();
    assert_eq!(sfc.state(), ChainState::Deleted);
    assert_eq!(cloud.steering_count(), 0);
    assert!(!cloud.stack_exists("udp_chain"));

    let calls = cloud.calls();
    assert_eq!(calls[0], Call::CreateStack("udp_chain".to_string()));
    assert_eq!(calls[1], Call::UpdateStack("udp_chain".to_string()));
    assert_eq!(calls.last(), Some(&Call::DeleteStack("udp_chain".to_string())));

    // steering is deleted in exactly the reverse order of its creation
    let created: Vec<_> = calls
        .iter()
        .filter(|c| matches!(c, Call::CreateSteering(_, _)))
        .filter_map(steering)
        .collect();
    let mut deleted: Vec<_> = calls
        .iter()
        .filter(|c| matches!(c, Call::DeleteSteering(_, _)))
        .filter_map(steering)
        .collect();
    deleted.reverse();
    assert_eq!(created.len(), 8);
    assert_eq!(created, deleted);
}

#[test]
fn delete_twice() {
    let cloud = FakeCloud::new();
    let manager = manager(&cloud);
    let (mut sfc, _) =
        manager.create_sfc(&test_config(), "platform-default", "identity", false).unwrap();
    manager.delete_sfc(&mut sfc).unwrap();
    let calls = cloud.calls().len();
    match manager.delete_sfc(&mut sfc) {
        Err(Error::Manager(SfcManagerError::InvalidSequence { state, .. })) => {
            assert_eq!(state, ChainState::Deleted)
        }
        r => panic!("unexpected result: {:?}", r),
    }
    assert_eq!(cloud.calls().len(), calls);
}

#[test]
fn retry_delete_after_timeout() {
    let cloud = FakeCloud::new();
    let manager = manager(&cloud)
        .with_poll_settings(PollSettings::new(Duration::from_millis(1), Duration::from_millis(20)));
    let (mut sfc, _) =
        manager.create_sfc(&test_config(), "platform-default", "identity", false).unwrap();

    cloud.set_pending_polls(10_000);
    match manager.delete_sfc(&mut sfc) {
        Err(Error::ServerChain(ServerChainError::ResourceTimeout { .. })) => {}
        r => panic!("unexpected result: {:?}", r),
    }
    assert_eq!(sfc.state(), ChainState::Deleting);
    assert_eq!(cloud.steering_count(), 0);

    cloud.set_pending_polls(0);
    manager.delete_sfc(&mut sfc).unwrap();
    assert_eq!(sfc.state(), ChainState::Deleted);
    assert!(!cloud.stack_exists("udp_chain"));
}

#[test]
fn unknown_policies() {
    let cloud = FakeCloud::new();
    let manager = manager(&cloud);
    assert!(matches!(
        manager.create_sfc(&test_config(), "random", "identity", false),
        Err(Error::Manager(SfcManagerError::UnknownPlacementPolicy(_)))
    ));
    assert!(matches!(
        manager.create_sfc(&test_config(), "fill-one", "shortest", false),
        Err(Error::Manager(SfcManagerError::UnknownReorderPolicy(_)))
    ));
    assert!(cloud.calls().is_empty());
}

#[test]
fn fill_one_placement() {
    // flavor: 1 vcpu, 512 MB. compute1 fits two members, compute2 fits eight.
    let cloud = FakeCloud::new().with_host("compute1", 4, 1024).with_host("compute2", 4, 4096);
    let manager = manager(&cloud);
    let (sfc, _) = manager.create_sfc(&test_config(), "fill-one", "identity", false).unwrap();
    assert_eq!(cloud.server("fw").unwrap().host.as_deref(), Some("compute1"));
    assert_eq!(cloud.server("ids").unwrap().host.as_deref(), Some("compute1"));
    assert_eq!(cloud.server("lb").unwrap().host.as_deref(), Some("compute2"));
    let zones: Vec<_> =
        sfc.server_chain().members().map(|m| m.availability_zone.clone().unwrap()).collect();
    assert_eq!(zones, vec!["nova:compute1", "nova:compute1", "nova:compute2"]);
}

#[test]
fn insufficient_capacity() {
    let cloud = FakeCloud::new().with_host("compute1", 1, 512).with_host("compute2", 1, 512);
    let manager = manager(&cloud);
    match manager.create_sfc(&test_config(), "fill-one", "identity", false) {
        Err(Error::Placement(PlacementError::InsufficientCapacity { required, available })) => {
            assert_eq!(required, 3);
            assert_eq!(available, 2);
        }
        r => panic!("unexpected result: {:?}", r.map(|_| ())),
    }
    // nothing was created
    assert!(cloud.calls().is_empty());
}

#[test]
fn unknown_host() {
    let cloud = FakeCloud::new().with_host("compute1", 4, 4096);
    let manager = manager(&cloud);
    assert!(matches!(
        manager.create_sfc(&test_config(), "fill-one", "identity", false),
        Err(Error::Placement(PlacementError::UnknownHost(_)))
    ));
}

#[test]
fn min_latency_reorder() {
    let cloud = FakeCloud::new()
        .with_server_host("fw", "compute2")
        .with_server_host("ids", "compute1")
        .with_server_host("lb", "compute2");
    let manager = manager(&cloud);
    let (sfc, _) =
        manager.create_sfc(&test_config(), "platform-default", "min-latency", false).unwrap();
    assert_eq!(
        member_names(sfc.server_chain().groups()),
        vec![vec!["ids"], vec!["fw"], vec!["lb"]]
    );
    assert_eq!(member_names(sfc.port_chain().server_chain().groups())[0], vec!["ids"]);
    assert_eq!(cloud.steering_names(SteeringKind::PortPair), vec!["pp_0_0", "pp_1_0", "pp_2_0"]);
    assert_eq!(steered_members(&cloud), vec!["ids", "fw", "lb"]);
}

#[test]
fn attach_and_delete() {
    let cloud = FakeCloud::new();
    manager(&cloud).create_sfc(&test_config(), "platform-default", "identity", false).unwrap();

    // a new manager (like a second invocation of the CLI)
    let manager = manager(&cloud);
    let mut sfc = manager.attach(&test_config()).unwrap();
    assert_eq!(sfc.state(), ChainState::Active);
    manager.delete_sfc(&mut sfc).unwrap();
    assert_eq!(cloud.steering_count(), 0);
    assert!(!cloud.stack_exists("udp_chain"));
}

#[test]
fn wait_for_ready_signals() {
    // find a free port
    let addr = match UdpSocket::bind("127.0.0.1:0").and_then(|s| s.local_addr()) {
        Ok(addr) => addr,
        Err(_) => return, // skip the test
    };
    let mut manager_config = test_config().manager().clone();
    manager_config.ready_timeout_s = Some(10);
    let cloud = FakeCloud::new();
    let manager = SfcManager::new(cloud.clone(), &manager_config)
        .with_poll_settings(PollSettings::new(Duration::from_millis(1), Duration::from_secs(5)))
        .with_signal_addr(addr);

    let members = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        for _ in 0..3 {
            socket.send_to(b"ready", addr).unwrap();
        }
    });

    let (sfc, durations) =
        manager.create_sfc(&test_config(), "platform-default", "identity", true).unwrap();
    members.join().unwrap();
    assert_eq!(sfc.state(), ChainState::Active);
    assert!(durations.total() >= durations.readiness_wait);
}

#[test]
fn readiness_timeout() {
    let addr = match UdpSocket::bind("127.0.0.1:0").and_then(|s| s.local_addr()) {
        Ok(addr) => addr,
        Err(_) => return, // skip the test
    };
    let mut manager_config = test_config().manager().clone();
    manager_config.ready_timeout_s = Some(0);
    let cloud = FakeCloud::new();
    let manager = SfcManager::new(cloud.clone(), &manager_config)
        .with_poll_settings(PollSettings::new(Duration::from_millis(1), Duration::from_secs(5)))
        .with_signal_addr(addr);
    assert!(matches!(
        manager.create_sfc(&test_config(), "platform-default", "identity", true),
        Err(Error::Readiness(_))
    ));
    // no steering without ready members
    assert_eq!(cloud.steering_count(), 0);
}

#[test]
fn failed_creation_releases_signal_address() {
    let addr = match UdpSocket::bind("127.0.0.1:0").and_then(|s| s.local_addr()) {
        Ok(addr) => addr,
        Err(_) => return, // skip the test
    };
    let cloud = FakeCloud::new()
        .with_host("compute1", 1, 512)
        .with_host("compute2", 1, 512)
        .with_stack_failure("No valid host was found");
    let manager = manager(&cloud).with_signal_addr(addr);

    // placement fails before the listener is started
    assert!(matches!(
        manager.create_sfc(&test_config(), "fill-one", "identity", true),
        Err(Error::Placement(PlacementError::InsufficientCapacity { .. }))
    ));
    // the network phase fails while the listener is running
    assert!(matches!(
        manager.create_sfc(&test_config(), "platform-default", "identity", true),
        Err(Error::ServerChain(ServerChainError::StackFailed { .. }))
    ));
    // the stack of the previous attempt still exists, but the signal address is free again
    assert!(matches!(
        manager.create_sfc(&test_config(), "platform-default", "identity", true),
        Err(Error::ServerChain(_))
    ));
    assert!(UdpSocket::bind(addr).is_ok());
}
