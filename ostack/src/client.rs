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

//! # OpenStack Client

use crate::types::*;
use crate::{Error, Result};

use isahc::prelude::*;
use isahc::{Body, Request, Response};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;

const NETWORK_API_VERSION: &str = "v2.0";
const IDENTITY_API_VERSION: &str = "v3";

/// # OpenStack Handle
///
/// The handle holds a scoped token and the endpoints of the network, compute and orchestration
/// services, taken from the service catalog. It is cheap to clone. The token is not renewed, so a
/// handle should not be kept around for longer than the token lifetime (usually one hour).
#[derive(PartialEq, Clone)]
pub struct OpenStack {
    token: String,
    network_url: String,
    compute_url: String,
    orchestration_url: String,
}

impl fmt::Debug for OpenStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenStack")
            .field("network_url", &self.network_url)
            .field("compute_url", &self.compute_url)
            .field("orchestration_url", &self.orchestration_url)
            .finish()
    }
}

impl OpenStack {
    /// Authenticate at the identity service and create a new handle.
    pub fn connect(credentials: &Credentials) -> Result<Self> {
        let addr = format!("{}/auth/tokens", identity_url(&credentials.auth_url));
        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": credentials.username,
                            "domain": { "name": credentials.user_domain_name },
                            "password": credentials.password,
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": credentials.project_name,
                        "domain": { "name": credentials.project_domain_name },
                    }
                }
            }
        });
        let request = Request::post(addr)
            .header("Content-Type", "application/json")
            .body(body.to_string())?;
        let mut response = isahc::send(request)?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::ResponseError(status.as_u16(), response.text()?));
        }
        let token = response
            .headers()
            .get("X-Subject-Token")
            .and_then(|v| v.to_str().ok())
            .ok_or(Error::MissingToken)?
            .to_string();
        let catalog = serde_json::from_str::<TokenResponse>(&response.text()?)?.token.catalog;

        let endpoint = |service: &str| {
            select_endpoint(
                &catalog,
                service,
                &credentials.interface,
                credentials.region_name.as_deref(),
            )
        };

        Ok(Self {
            token,
            network_url: network_url(&endpoint("network")?),
            compute_url: endpoint("compute")?.trim_end_matches('/').to_string(),
            orchestration_url: endpoint("orchestration")?.trim_end_matches('/').to_string(),
        })
    }

    /// Find a network by its name
    pub fn find_network(&self, name: impl AsRef<str>) -> Result<Option<Network>> {
        self.neutron_find("networks", name.as_ref())
    }

    /// Find a subnet by its name
    pub fn find_subnet(&self, name: impl AsRef<str>) -> Result<Option<Subnet>> {
        self.neutron_find("subnets", name.as_ref())
    }

    /// Find a security group by its name
    pub fn find_security_group(&self, name: impl AsRef<str>) -> Result<Option<SecurityGroup>> {
        self.neutron_find("security-groups", name.as_ref())
    }

    /// Find a port by its name
    pub fn find_port(&self, name: impl AsRef<str>) -> Result<Option<Port>> {
        self.neutron_find("ports", name.as_ref())
    }

    /// Return all floating IPs bound to the given port
    pub fn floating_ips(&self, port_id: impl AsRef<str>) -> Result<Vec<FloatingIp>> {
        parse_list(
            &self.request_get(format!(
                "{}/floatingips?port_id={}",
                self.network_url,
                encode(port_id.as_ref())
            ))?,
            "floatingips",
        )
    }

    /// Return all resources of the given kind of the networking-sfc extension
    pub fn list_sfc(&self, kind: SfcKind) -> Result<Vec<SfcResource>> {
        parse_list(
            &self.request_get(format!("{}/sfc/{}", self.network_url, kind.plural()))?,
            kind.plural(),
        )
    }

    /// Find a resource of the networking-sfc extension by its name
    pub fn find_sfc(&self, kind: SfcKind, name: impl AsRef<str>) -> Result<Option<SfcResource>> {
        Ok(parse_list::<SfcResource>(
            &self.request_get(format!(
                "{}/sfc/{}?name={}",
                self.network_url,
                kind.plural(),
                encode(name.as_ref())
            ))?,
            kind.plural(),
        )?
        .into_iter()
        .next())
    }

    /// Create a new resource of the networking-sfc extension. The `body` contains the attributes
    /// of the resource, without the enclosing key.
    pub fn create_sfc(&self, kind: SfcKind, body: Value) -> Result<SfcResource> {
        let mut data = serde_json::Map::new();
        data.insert(kind.singular().to_string(), body);
        let response = self.request_post(
            format!("{}/sfc/{}", self.network_url, kind.plural()),
            Value::Object(data).to_string(),
        )?;
        parse_item(&response, kind.singular())
    }

    /// Delete a resource of the networking-sfc extension
    pub fn delete_sfc(&self, kind: SfcKind, id: impl AsRef<str>) -> Result<()> {
        self.request_delete(format!("{}/sfc/{}/{}", self.network_url, kind.plural(), id.as_ref()))
    }

    /// Find a server by its name
    pub fn find_server(&self, name: impl AsRef<str>) -> Result<Option<Server>> {
        let name = name.as_ref();
        // the name filter of nova is a regular expression
        let servers: Vec<Server> = parse_list(
            &self.request_get(format!(
                "{}/servers/detail?name={}",
                self.compute_url,
                encode(&format!("^{}$", regex::escape(name)))
            ))?,
            "servers",
        )?;
        Ok(servers.into_iter().find(|s| s.name == name))
    }

    /// Find a flavor by its name or ID
    pub fn find_flavor(&self, name: impl AsRef<str>) -> Result<Option<Flavor>> {
        let name = name.as_ref();
        let flavors: Vec<Flavor> = parse_list(
            &self.request_get(format!("{}/flavors/detail", self.compute_url))?,
            "flavors",
        )?;
        Ok(flavors.into_iter().find(|f| f.name == name || f.id == name))
    }

    /// Find a hypervisor by its hostname. The domain part of the hostname may be omitted.
    pub fn find_hypervisor(&self, hostname: impl AsRef<str>) -> Result<Option<Hypervisor>> {
        let hostname = hostname.as_ref();
        let hypervisors: Vec<Hypervisor> = parse_list(
            &self.request_get(format!("{}/os-hypervisors/detail", self.compute_url))?,
            "hypervisors",
        )?;
        Ok(hypervisors.into_iter().find(|h| {
            h.hypervisor_hostname == hostname
                || h.hypervisor_hostname.split('.').next() == Some(hostname)
        }))
    }

    /// Find a stack by its name. Deleted stacks are not returned.
    pub fn find_stack(&self, name: impl AsRef<str>) -> Result<Option<Stack>> {
        let name = name.as_ref();
        let stacks: Vec<Stack> = parse_list(
            &self.request_get(format!("{}/stacks?name={}", self.orchestration_url, encode(name)))?,
            "stacks",
        )?;
        Ok(stacks.into_iter().find(|s| s.stack_name == name))
    }

    /// Create a new stack from a template, and return its ID.
    pub fn create_stack(&self, name: impl AsRef<str>, template: impl AsRef<str>) -> Result<String> {
        let body = json!({
            "stack_name": name.as_ref(),
            "template": template.as_ref(),
        });
        let response =
            self.request_post(format!("{}/stacks", self.orchestration_url), body.to_string())?;
        let v: Value = serde_json::from_str(&response)?;
        Ok(v["stack"]["id"].as_str().unwrap_or_default().to_string())
    }

    /// Replace the template of an existing stack
    pub fn update_stack(&self, stack: &Stack, template: impl AsRef<str>) -> Result<()> {
        let body = json!({ "template": template.as_ref() });
        self.request_put(
            format!("{}/stacks/{}/{}", self.orchestration_url, stack.stack_name, stack.id),
            body.to_string(),
        )?;
        Ok(())
    }

    /// Delete an existing stack
    pub fn delete_stack(&self, stack: &Stack) -> Result<()> {
        self.request_delete(format!(
            "{}/stacks/{}/{}",
            self.orchestration_url, stack.stack_name, stack.id
        ))
    }

    fn neutron_find<T: DeserializeOwned>(&self, collection: &str, name: &str) -> Result<Option<T>> {
        let key = collection.replace('-', "_");
        Ok(parse_list::<T>(
            &self.request_get(format!("{}/{}?name={}", self.network_url, collection, encode(name)))?,
            &key,
        )?
        .into_iter()
        .next())
    }

    fn request_get(&self, addr: String) -> Result<String> {
        let request = Request::get(addr)
            .header("X-Auth-Token", self.token.as_str())
            .header("Accept", "application/json")
            .body(())?;
        self.handle_response(isahc::send(request)?)
    }

    fn request_post(&self, addr: String, data: String) -> Result<String> {
        let request = Request::post(addr)
            .header("X-Auth-Token", self.token.as_str())
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .body(data)?;
        self.handle_response(isahc::send(request)?)
    }

    fn request_put(&self, addr: String, data: String) -> Result<String> {
        let request = Request::put(addr)
            .header("X-Auth-Token", self.token.as_str())
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .body(data)?;
        self.handle_response(isahc::send(request)?)
    }

    fn request_delete(&self, addr: String) -> Result<()> {
        let request = Request::delete(addr)
            .header("X-Auth-Token", self.token.as_str())
            .body(())?;
        self.handle_response(isahc::send(request)?)?;
        Ok(())
    }

    fn handle_response(&self, mut response: Response<Body>) -> Result<String> {
        let status = response.status();
        if !status.is_success() {
            return Err(Error::ResponseError(status.as_u16(), response.text()?));
        }
        Ok(response.text()?)
    }
}

/// Make sure that the identity URL ends with the API version.
fn identity_url(auth_url: &str) -> String {
    let auth_url = auth_url.trim_end_matches('/');
    let version_re = Regex::new(r"/v3(\.\d+)?$").unwrap();
    if version_re.is_match(auth_url) {
        auth_url.to_string()
    } else {
        format!("{}/{}", auth_url, IDENTITY_API_VERSION)
    }
}

/// The network endpoint is registered with or without the API version, depending on the
/// deployment tool.
fn network_url(endpoint: &str) -> String {
    let version_re = Regex::new(r"(/v2\.0)?/*$").unwrap();
    format!("{}/{}", version_re.replace(endpoint, ""), NETWORK_API_VERSION)
}

/// Pick the endpoint of a service from the catalog
fn select_endpoint(
    catalog: &[CatalogEntry],
    service: &str,
    interface: &str,
    region: Option<&str>,
) -> Result<String> {
    catalog
        .iter()
        .filter(|e| e.service == service)
        .flat_map(|e| e.endpoints.iter())
        .filter(|e| e.interface == interface)
        .find(|e| region.is_none() || e.region.as_deref() == region)
        .map(|e| e.url.clone())
        .ok_or_else(|| Error::MissingEndpoint {
            service: service.to_string(),
            interface: interface.to_string(),
        })
}

/// Everything except the unreserved characters of RFC 3986
const QUERY_VALUE: &AsciiSet =
    &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Percent-encode a query value
fn encode(value: &str) -> String {
    utf8_percent_encode(value, QUERY_VALUE).to_string()
}

fn parse_list<T: DeserializeOwned>(response: &str, key: &str) -> Result<Vec<T>> {
    let mut v: Value = serde_json::from_str(response)?;
    Ok(serde_json::from_value(v[key].take())?)
}

fn parse_item<T: DeserializeOwned>(response: &str, key: &str) -> Result<T> {
    let mut v: Value = serde_json::from_str(response)?;
    Ok(serde_json::from_value(v[key].take())?)
}

#[cfg(test)]
mod test {
    use super::*;

    fn test_cloud() -> Option<OpenStack> {
        let var = |k: &str| std::env::var(k).ok();
        let credentials = Credentials::new(
            var("OS_AUTH_URL")?,
            var("OS_USERNAME")?,
            var("OS_PASSWORD")?,
            var("OS_PROJECT_NAME")?,
        );
        OpenStack::connect(&credentials).ok()
    }

    #[test]
    fn identity_url_version() {
        assert_eq!(identity_url("http://10.0.0.1/identity/v3"), "http://10.0.0.1/identity/v3");
        assert_eq!(identity_url("http://10.0.0.1/identity/v3/"), "http://10.0.0.1/identity/v3");
        assert_eq!(identity_url("http://10.0.0.1:5000"), "http://10.0.0.1:5000/v3");
    }

    #[test]
    fn network_url_version() {
        assert_eq!(network_url("http://10.0.0.1:9696"), "http://10.0.0.1:9696/v2.0");
        assert_eq!(network_url("http://10.0.0.1:9696/"), "http://10.0.0.1:9696/v2.0");
        assert_eq!(network_url("http://10.0.0.1:9696/v2.0/"), "http://10.0.0.1:9696/v2.0");
        assert_eq!(network_url("http://10.0.0.1/network"), "http://10.0.0.1/network/v2.0");
    }

    #[test]
    fn endpoint_selection() {
        let catalog: Vec<CatalogEntry> = serde_json::from_str(
            r#"[
                {"type": "network", "endpoints": [
                    {"interface": "admin", "url": "http://admin:9696", "region": "RegionOne"},
                    {"interface": "public", "url": "http://public:9696", "region": "RegionOne"},
                    {"interface": "public", "url": "http://other:9696", "region": "RegionTwo"}
                ]},
                {"type": "compute", "endpoints": [
                    {"interface": "public", "url": "http://public:8774/v2.1", "region": "RegionOne"}
                ]}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            select_endpoint(&catalog, "network", "public", None).unwrap(),
            "http://public:9696"
        );
        assert_eq!(
            select_endpoint(&catalog, "network", "public", Some("RegionTwo")).unwrap(),
            "http://other:9696"
        );
        assert!(matches!(
            select_endpoint(&catalog, "orchestration", "public", None),
            Err(Error::MissingEndpoint { .. })
        ));
    }

    #[test]
    fn query_encoding() {
        assert_eq!(encode("sf0_pt_in"), "sf0_pt_in");
        assert_eq!(encode("^sf0$"), "%5Esf0%24");
        assert_eq!(encode("my net"), "my%20net");
        assert_eq!(encode("sf~1.a-b"), "sf~1.a-b");
        assert_eq!(encode("fw/ü"), "fw%2F%C3%BC");
    }

    #[test]
    fn parse_server_list() {
        let servers: Vec<Server> = parse_list(
            r#"{"servers": [{"id": "1", "name": "sf0", "status": "ACTIVE",
                "OS-EXT-SRV-ATTR:host": "compute1"}]}"#,
            "servers",
        )
        .unwrap();
        assert_eq!(servers[0].host.as_deref(), Some("compute1"));
    }

    #[test]
    fn list_networks() {
        let cloud = match test_cloud() {
            Some(c) => c,
            None => return, // skip the test
        };
        cloud.find_network("public").unwrap();
    }

    #[test]
    fn list_port_chains() {
        let cloud = match test_cloud() {
            Some(c) => c,
            None => return, // skip the test
        };
        cloud.list_sfc(SfcKind::PortChain).unwrap();
    }
}
