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

use super::{member_names, test_config, TEST_CONFIG};
use crate::config::*;

use log::LevelFilter;
use serde_yaml_ng::Value;
use std::net::{IpAddr, Ipv4Addr};

fn modified(f: impl FnOnce(&mut Value)) -> Result<ChainConfig, ConfigError> {
    let mut doc: Value = serde_yaml_ng::from_str(TEST_CONFIG).unwrap();
    f(&mut doc);
    ChainConfig::from_value(doc)
}

#[test]
fn load_complete_config() {
    let config = test_config();
    assert_eq!(config.log().level_filter().unwrap(), LevelFilter::Debug);
    assert_eq!(config.cloud_auth().username, "admin");
    assert_eq!(config.cloud_auth().project_domain_name, "default");
    assert_eq!(config.function_chain().name, "udp_chain");
    assert_eq!(config.function_chain().destination_hypervisor.as_deref(), Some("compute1"));
    assert_eq!(config.network().security_group_name.as_deref(), Some("sfc_test"));

    let fc = config.flow_classifier();
    assert_eq!(fc.name, "udp_dst_9999");
    assert_eq!(fc.protocol.as_deref(), Some("UDP"));
    assert_eq!(fc.destination_port_range_min, Some(9999));
    assert_eq!(fc.logical_source_port, "src_pt");

    let manager = config.manager();
    assert_eq!(manager.mgr_ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert_eq!(manager.poll_timeout_s, 5);
    assert_eq!(manager.cpu_allocation_ratio, DEFAULT_CPU_ALLOCATION_RATIO);
    assert!(!manager.separate_access_port);
}

#[test]
fn members_ordered_by_seq_num() {
    let config = test_config();
    assert_eq!(
        member_names(config.server_chain()),
        vec![vec!["fw"], vec!["ids"], vec!["lb"]]
    );
    let fw = &config.server_chain()[0][0];
    assert_eq!(fw.ssh.as_ref().unwrap().user_name, "ubuntu");
    assert!(config.server_chain()[1][0].ssh.is_none());
}

#[test]
fn missing_sections() {
    for (parent, key, expected) in [
        (None, "log", "log"),
        (Some("cloud"), "auth", "cloud.auth"),
        (None, "SFC", "SFC"),
        (Some("SFC"), "function_chain", "SFC.function_chain"),
        (Some("SFC"), "network", "SFC.network"),
        (Some("SFC"), "flow_classifier", "SFC.flow_classifier"),
        (Some("SFC"), "server_chain", "SFC.server_chain"),
    ]
    .iter()
    {
        let result = modified(|doc| {
            let map = match parent {
                Some(p) => doc[*p].as_mapping_mut().unwrap(),
                None => doc.as_mapping_mut().unwrap(),
            };
            map.remove(*key);
        });
        match result {
            Err(ConfigError::MissingSection(s)) => assert_eq!(s, **expected),
            r => panic!("expected missing {}, got {:?}", expected, r),
        }
    }
}

#[test]
fn empty_server_chain() {
    let config = modified(|doc| {
        doc["SFC"]["server_chain"] = Value::Null;
    })
    .unwrap();
    assert!(config.server_chain().is_empty());
}

#[test]
fn optional_sections() {
    let config = modified(|doc| {
        let sfc = doc["SFC"].as_mapping_mut().unwrap();
        sfc.remove("manager");
        sfc.remove("sample_server");
    })
    .unwrap();
    assert_eq!(config.manager(), &ManagerConfig::default());
    assert_eq!(config.manager().mgr_port, DEFAULT_MGR_PORT);
    assert!(config.sample_server().is_none());
    assert!(config.sample_members(3).is_err());
}

#[test]
fn multiple_flow_classifiers() {
    let result = modified(|doc| {
        let rule = doc["SFC"]["flow_classifier"]["udp_dst_9999"].clone();
        doc["SFC"]["flow_classifier"].as_mapping_mut().unwrap().insert("other".into(), rule);
    });
    assert!(matches!(result, Err(ConfigError::MultipleFlowClassifiers)));
}

#[test]
fn sequence_numbers() {
    let duplicate = modified(|doc| {
        doc["SFC"]["server_chain"]["lb"]["seq_num"] = 1.into();
    });
    assert!(matches!(duplicate, Err(ConfigError::DuplicateSequenceNumber(_, _, 1))));

    let gap = modified(|doc| {
        doc["SFC"]["server_chain"]["lb"]["seq_num"] = 4.into();
    });
    assert!(matches!(gap, Err(ConfigError::InvalidSequenceNumber { seq_num: 4, len: 3, .. })));

    let missing = modified(|doc| {
        doc["SFC"]["server_chain"]["lb"].as_mapping_mut().unwrap().remove("seq_num");
    });
    match missing {
        Err(ConfigError::MissingSequenceNumber(name)) => assert_eq!(name, "lb"),
        r => panic!("unexpected result: {:?}", r),
    }
}

#[test]
fn unknown_log_level() {
    let result = modified(|doc| {
        doc["log"]["level"] = "LOUD".into();
    });
    assert!(matches!(result, Err(ConfigError::UnknownLogLevel(_))));
}

#[test]
fn sample_members() {
    let config = test_config();
    let groups = config.sample_members(4).unwrap();
    assert_eq!(member_names(&groups), vec![vec!["sf0"], vec!["sf1"], vec!["sf2"], vec!["sf3"]]);
    assert!(groups.iter().all(|g| g[0].flavor == "sfc_test"));

    let replaced = config.with_server_chain(groups);
    assert_eq!(replaced.server_chain().len(), 4);
    assert_eq!(replaced.function_chain(), config.function_chain());
    // the original is unchanged
    assert_eq!(config.server_chain().len(), 3);
}
