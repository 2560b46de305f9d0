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

//! # Chain Configuration
//!
//! Typed view over the configuration document of one service function chain. The document is
//! validated completely when it is loaded, all getters afterwards are plain projections.
//!
//! The expected layout is the following:
//!
//! ```yaml
//! log:
//!   level: INFO
//! cloud:
//!   auth:
//!     auth_url: http://192.168.0.1/identity/v3
//!     project_name: admin
//!     user_domain_name: default
//!     project_domain_name: default
//!     username: admin
//!     password: stack
//! SFC:
//!   function_chain:
//!     name: udp_chain
//!     description: Chain for UDP traffic
//!     availability_zone: nova
//!     destination_hypervisor: compute1
//!     available_hypervisors: [compute1, compute2]
//!   flow_classifier:
//!     udp_dst_9999:
//!       ethertype: IPv4
//!       protocol: UDP
//!       destination_port_range_min: 9999
//!       destination_port_range_max: 9999
//!       logical_source_port: src_pt
//!   network:
//!     pubnet_name: public
//!     net_name: net1
//!     subnet_name: subnet1
//!     security_group_name: sfc_test
//!   server_chain:
//!     fw:
//!       seq_num: 1
//!       image: ubuntu-cloud
//!       flavor: sfc_test
//!       init_script: ./init_fw.sh
//!       ssh:
//!         user_name: ubuntu
//!         pub_key_name: sfc_test
//!         pvt_key_file: ./sfc_test.pem
//!   sample_server:
//!     image: ubuntu-cloud
//!     flavor: sfc_test
//! ```

use ostack::Credentials;

use log::LevelFilter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Port on which the manager expects the readiness signals
pub const DEFAULT_MGR_PORT: u16 = 6666;
/// Default CPU overcommit ratio of nova
pub const DEFAULT_CPU_ALLOCATION_RATIO: f64 = 16.0;
const DEFAULT_POLL_INTERVAL_S: u64 = 3;
const DEFAULT_POLL_TIMEOUT_S: u64 = 600;

/// # Configuration Error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file cannot be read
    #[error("Cannot read the configuration file: {0}")]
    Io(#[from] std::io::Error),
    /// The document is no valid YAML
    #[error("Cannot parse the configuration: {0}")]
    Parse(#[from] serde_yaml_ng::Error),
    /// A required section is missing
    #[error("Missing {0} configs!")]
    MissingSection(String),
    /// A section is present, but some field is missing or has the wrong type
    #[error("Invalid {section} configs: {reason}")]
    InvalidSection {
        /// Path of the section
        section: String,
        /// Message of the parser
        reason: String,
    },
    /// There must be exactly one flow classifier
    #[error("Multiple flow classifiers are not allowed!")]
    MultipleFlowClassifiers,
    /// A chain member has no sequence number
    #[error("Member {0} has no sequence number!")]
    MissingSequenceNumber(String),
    /// Two members share the same sequence number
    #[error("Members {0} and {1} share the same sequence number {2}!")]
    DuplicateSequenceNumber(String, String, usize),
    /// The sequence numbers do not form a dense sequence
    #[error("Member {member} has the sequence number {seq_num}, but the chain has {len} members!")]
    InvalidSequenceNumber {
        /// Name of the member
        member: String,
        /// Sequence number of the member
        seq_num: usize,
        /// Number of members in the chain
        len: usize,
    },
    /// The log level is not known
    #[error("Unknown log level: {0}")]
    UnknownLogLevel(String),
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LogConfig {
    /// Level name, like `INFO` or `DEBUG`
    pub level: String,
}

impl LogConfig {
    /// Parse the level name
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        match self.level.to_uppercase().as_str() {
            "DEBUG" => Ok(LevelFilter::Debug),
            "INFO" => Ok(LevelFilter::Info),
            "WARN" | "WARNING" => Ok(LevelFilter::Warn),
            "ERROR" | "CRITICAL" => Ok(LevelFilter::Error),
            "TRACE" => Ok(LevelFilter::Trace),
            _ => Err(ConfigError::UnknownLogLevel(self.level.clone())),
        }
    }
}

/// Traffic selection rule of the chain. The logical ports are given by name, and are resolved
/// when the port chain is created.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FlowClassifierRule {
    /// Name of the rule (the key in the configuration)
    #[serde(default)]
    pub name: String,
    /// Description of the rule
    #[serde(default)]
    pub description: String,
    /// Ethertype (`IPv4` or `IPv6`)
    #[serde(default = "default_ethertype")]
    pub ethertype: String,
    /// IP protocol, like `UDP`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Minimum source port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port_range_min: Option<u16>,
    /// Maximum source port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port_range_max: Option<u16>,
    /// Minimum destination port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_port_range_min: Option<u16>,
    /// Maximum destination port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_port_range_max: Option<u16>,
    /// Source prefix, like `10.0.0.0/24`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip_prefix: Option<String>,
    /// Destination prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_ip_prefix: Option<String>,
    /// Port through which the traffic enters the chain
    pub logical_source_port: String,
    /// Port through which the traffic leaves the chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_destination_port: Option<String>,
}

fn default_ethertype() -> String {
    "IPv4".to_string()
}

/// Networks to which all chain members are attached
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Network from which the floating IPs are allocated
    pub pubnet_name: String,
    /// Private network of the chain
    pub net_name: String,
    /// Subnet of the private network
    pub subnet_name: String,
    /// Security group applied to all ports
    #[serde(default)]
    pub security_group_name: Option<String>,
}

/// Identity of the chain, and the inputs for placement
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FunctionChainMeta {
    /// Name of the chain, used for the stack and the port chain
    pub name: String,
    /// Description of the chain
    #[serde(default)]
    pub description: String,
    /// Availability zone in which the members are started
    #[serde(default = "default_availability_zone")]
    pub availability_zone: String,
    /// Host which is filled first by the `fill-one` placement
    #[serde(default)]
    pub destination_hypervisor: Option<String>,
    /// Ordered list of hosts on which members may be placed
    #[serde(default)]
    pub available_hypervisors: Vec<String>,
}

fn default_availability_zone() -> String {
    "nova".to_string()
}

/// SSH access to a chain member
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SshSpec {
    /// Login name
    pub user_name: String,
    /// Name of the key pair registered in nova
    pub pub_key_name: String,
    /// Private key used to log in
    pub pvt_key_file: PathBuf,
}

/// Specification of one chain member
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MemberSpec {
    /// Name of the member (the key in the configuration)
    #[serde(default)]
    pub name: String,
    /// Image name or ID
    pub image: String,
    /// Flavor name or ID
    pub flavor: String,
    /// Script executed by cloud-init on the first boot
    #[serde(default)]
    pub init_script: Option<PathBuf>,
    /// SSH access
    #[serde(default)]
    pub ssh: Option<SshSpec>,
    /// Explicit host affinity, like `nova:compute1`
    #[serde(default)]
    pub availability_zone: Option<String>,
}

/// Chain members forming one stage. Traffic is balanced over all members of a group.
pub type MemberGroup = Vec<MemberSpec>;

#[derive(Debug, Deserialize)]
struct RawMember {
    #[serde(default)]
    seq_num: Option<usize>,
    #[serde(flatten)]
    spec: MemberSpec,
}

/// Settings of the manager, all of them optional.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ManagerConfig {
    /// Address on which the readiness signals are received
    #[serde(default = "default_mgr_ip")]
    pub mgr_ip: IpAddr,
    /// Port on which the readiness signals are received
    #[serde(default = "default_mgr_port")]
    pub mgr_port: u16,
    /// Give up waiting for readiness signals after this many seconds
    #[serde(default)]
    pub ready_timeout_s: Option<u64>,
    /// Count at most one readiness signal per sender address
    #[serde(default)]
    pub dedup_ready_signals: bool,
    /// CPU overcommit ratio used by the `fill-one` placement
    #[serde(default = "default_cpu_ratio")]
    pub cpu_allocation_ratio: f64,
    /// Interval between two stack status checks
    #[serde(default = "default_poll_interval")]
    pub poll_interval_s: u64,
    /// Maximum time to wait for a stack operation
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_s: u64,
    /// Create a dedicated remote access port per member
    #[serde(default)]
    pub separate_access_port: bool,
}

fn default_mgr_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_mgr_port() -> u16 {
    DEFAULT_MGR_PORT
}

fn default_cpu_ratio() -> f64 {
    DEFAULT_CPU_ALLOCATION_RATIO
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_S
}

fn default_poll_timeout() -> u64 {
    DEFAULT_POLL_TIMEOUT_S
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            mgr_ip: default_mgr_ip(),
            mgr_port: DEFAULT_MGR_PORT,
            ready_timeout_s: None,
            dedup_ready_signals: false,
            cpu_allocation_ratio: DEFAULT_CPU_ALLOCATION_RATIO,
            poll_interval_s: DEFAULT_POLL_INTERVAL_S,
            poll_timeout_s: DEFAULT_POLL_TIMEOUT_S,
            separate_access_port: false,
        }
    }
}

impl ManagerConfig {
    /// Socket address for the readiness signals
    pub fn signal_addr(&self) -> SocketAddr {
        SocketAddr::new(self.mgr_ip, self.mgr_port)
    }

    /// Timeout of the readiness barrier
    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_s.map(Duration::from_secs)
    }
}

/// # Chain Configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ChainConfig {
    log: LogConfig,
    auth: Credentials,
    flow_classifier: FlowClassifierRule,
    network: NetworkConfig,
    function_chain: FunctionChainMeta,
    server_chain: Vec<MemberGroup>,
    sample_server: Option<MemberSpec>,
    manager: ManagerConfig,
}

impl ChainConfig {
    /// Read and validate a YAML configuration file
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_str(&std::fs::read_to_string(path)?)
    }

    /// Parse and validate a YAML configuration document
    pub fn load_str(source: &str) -> Result<Self, ConfigError> {
        Self::from_value(serde_yaml_ng::from_str(source)?)
    }

    /// Validate an already parsed document.
    pub fn from_value(doc: Value) -> Result<Self, ConfigError> {
        let log: LogConfig = section(&doc, &["log"])?;
        log.level_filter()?;
        let auth: Credentials = section(&doc, &["cloud", "auth"])?;
        lookup(&doc, &["SFC"])?;

        let function_chain: FunctionChainMeta = section(&doc, &["SFC", "function_chain"])?;
        let network: NetworkConfig = section(&doc, &["SFC", "network"])?;

        let rules: BTreeMap<String, FlowClassifierRule> =
            section(&doc, &["SFC", "flow_classifier"])?;
        if rules.len() > 1 {
            return Err(ConfigError::MultipleFlowClassifiers);
        }
        let flow_classifier = match rules.into_iter().next() {
            Some((name, mut rule)) => {
                rule.name = name;
                rule
            }
            None => return Err(ConfigError::MissingSection("SFC.flow_classifier".to_string())),
        };

        let members: Option<BTreeMap<String, RawMember>> =
            section(&doc, &["SFC", "server_chain"])?;
        let server_chain = order_members(members.unwrap_or_default())?;

        let sample_server: Option<MemberSpec> = optional_section(&doc, &["SFC", "sample_server"])?;
        let manager: ManagerConfig =
            optional_section(&doc, &["SFC", "manager"])?.unwrap_or_default();

        Ok(Self {
            log,
            auth,
            flow_classifier,
            network,
            function_chain,
            server_chain,
            sample_server,
            manager,
        })
    }

    /// Logging configuration
    pub fn log(&self) -> &LogConfig {
        &self.log
    }

    /// Credentials for the cloud
    pub fn cloud_auth(&self) -> &Credentials {
        &self.auth
    }

    /// The single flow classifier of the chain
    pub fn flow_classifier(&self) -> &FlowClassifierRule {
        &self.flow_classifier
    }

    /// Network settings
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Name, description and placement inputs of the chain
    pub fn function_chain(&self) -> &FunctionChainMeta {
        &self.function_chain
    }

    /// Member groups, ordered by their sequence number. The group at index `i` has the sequence
    /// number `i + 1`.
    pub fn server_chain(&self) -> &[MemberGroup] {
        &self.server_chain
    }

    /// Template for members generated at runtime
    pub fn sample_server(&self) -> Option<&MemberSpec> {
        self.sample_server.as_ref()
    }

    /// Settings of the manager
    pub fn manager(&self) -> &ManagerConfig {
        &self.manager
    }

    /// Generate `n` singleton groups from the sample server, named `sf0` to `sf{n-1}`.
    pub fn sample_members(&self, n: usize) -> Result<Vec<MemberGroup>, ConfigError> {
        let sample = self
            .sample_server
            .as_ref()
            .ok_or_else(|| ConfigError::MissingSection("SFC.sample_server".to_string()))?;
        Ok((0..n)
            .map(|i| {
                let mut member = sample.clone();
                member.name = format!("sf{}", i);
                vec![member]
            })
            .collect())
    }

    /// Return a copy of the configuration with a different list of member groups.
    pub fn with_server_chain(&self, server_chain: Vec<MemberGroup>) -> Self {
        Self { server_chain, ..self.clone() }
    }
}

/// Order the members by their sequence number, and make sure that the numbers are dense.
fn order_members(members: BTreeMap<String, RawMember>) -> Result<Vec<MemberGroup>, ConfigError> {
    let len = members.len();
    let mut slots: Vec<Option<MemberSpec>> = vec![None; len];
    for (name, raw) in members {
        let seq_num = raw.seq_num.ok_or_else(|| ConfigError::MissingSequenceNumber(name.clone()))?;
        if seq_num == 0 || seq_num > len {
            return Err(ConfigError::InvalidSequenceNumber { member: name, seq_num, len });
        }
        let slot = &mut slots[seq_num - 1];
        if let Some(other) = slot {
            return Err(ConfigError::DuplicateSequenceNumber(other.name.clone(), name, seq_num));
        }
        let mut spec = raw.spec;
        spec.name = name;
        *slot = Some(spec);
    }
    // with `len` distinct numbers in `1..=len`, every slot is filled
    Ok(slots.into_iter().flatten().map(|m| vec![m]).collect())
}

fn lookup<'a>(doc: &'a Value, path: &[&str]) -> Result<&'a Value, ConfigError> {
    let mut v = doc;
    for (i, key) in path.iter().enumerate() {
        v = v.get(*key).ok_or_else(|| ConfigError::MissingSection(path[..=i].join(".")))?;
    }
    Ok(v)
}

fn section<T: DeserializeOwned>(doc: &Value, path: &[&str]) -> Result<T, ConfigError> {
    serde_yaml_ng::from_value(lookup(doc, path)?.clone()).map_err(|e| {
        ConfigError::InvalidSection { section: path.join("."), reason: e.to_string() }
    })
}

fn optional_section<T: DeserializeOwned>(
    doc: &Value,
    path: &[&str],
) -> Result<Option<T>, ConfigError> {
    match section(doc, path) {
        Ok(v) => Ok(Some(v)),
        Err(ConfigError::MissingSection(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
