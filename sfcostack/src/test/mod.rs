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

#[cfg(test)]
mod test_config;
#[cfg(test)]
mod test_manager;

use crate::config::ChainConfig;

/// Configuration of a chain with three members: `fw`, `ids` and `lb`.
pub(crate) const TEST_CONFIG: &str = r#"
log:
  level: DEBUG
cloud:
  auth:
    auth_url: http://192.168.0.1/identity/v3
    project_name: admin
    user_domain_name: default
    project_domain_name: default
    username: admin
    password: stack
SFC:
  function_chain:
    name: udp_chain
    description: Chain for UDP traffic
    availability_zone: nova
    destination_hypervisor: compute1
    available_hypervisors: [compute1, compute2]
  flow_classifier:
    udp_dst_9999:
      ethertype: IPv4
      protocol: UDP
      destination_port_range_min: 9999
      destination_port_range_max: 9999
      logical_source_port: src_pt
      logical_destination_port: dst_pt
  network:
    pubnet_name: public
    net_name: net1
    subnet_name: subnet1
    security_group_name: sfc_test
  server_chain:
    lb:
      seq_num: 3
      image: ubuntu-cloud
      flavor: sfc_test
    fw:
      seq_num: 1
      image: ubuntu-cloud
      flavor: sfc_test
      ssh:
        user_name: ubuntu
        pub_key_name: sfc_test
        pvt_key_file: ./sfc_test.pem
    ids:
      seq_num: 2
      image: ubuntu-cloud
      flavor: sfc_test
  sample_server:
    image: ubuntu-cloud
    flavor: sfc_test
  manager:
    mgr_ip: 127.0.0.1
    mgr_port: 0
    poll_interval_s: 0
    poll_timeout_s: 5
"#;

pub(crate) fn test_config() -> ChainConfig {
    ChainConfig::load_str(TEST_CONFIG).unwrap()
}

/// Names of all members, grouped
pub(crate) fn member_names(groups: &[crate::config::MemberGroup]) -> Vec<Vec<String>> {
    groups.iter().map(|g| g.iter().map(|m| m.name.clone()).collect()).collect()
}
