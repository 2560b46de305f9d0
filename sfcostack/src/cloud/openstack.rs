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

//! Implementation of the cloud API for a real OpenStack deployment

use super::*;

use log::*;
use ostack::{OpenStack, SfcKind, SfcResource};

impl From<SteeringKind> for SfcKind {
    fn from(kind: SteeringKind) -> Self {
        match kind {
            SteeringKind::PortPair => SfcKind::PortPair,
            SteeringKind::PortPairGroup => SfcKind::PortPairGroup,
            SteeringKind::FlowClassifier => SfcKind::FlowClassifier,
            SteeringKind::PortChain => SfcKind::PortChain,
        }
    }
}

impl From<SfcResource> for SteeringHandle {
    fn from(r: SfcResource) -> Self {
        Self { id: r.id, name: r.name }
    }
}

/// Map the status string of heat
fn parse_stack_status(status: &str, reason: Option<&str>) -> StackStatus {
    if status == "DELETE_COMPLETE" {
        StackStatus::NotFound
    } else if status.ends_with("_IN_PROGRESS") {
        StackStatus::InProgress
    } else if status.ends_with("_FAILED") {
        StackStatus::Failed(reason.unwrap_or(status).to_string())
    } else if status.ends_with("_COMPLETE") {
        StackStatus::Complete
    } else {
        StackStatus::InProgress
    }
}

/// A delete answered with 404 means that the resource vanished after it was looked up.
fn ignore_not_found(
    result: ostack::Result<()>,
    kind: &str,
    name: &str,
) -> Result<(), CloudError> {
    match result {
        Err(e) if e.is_not_found() => {
            warn!("{} {} was already deleted", kind, name);
            Ok(())
        }
        r => Ok(r?),
    }
}

impl CloudApi for OpenStack {
    fn find_network(&self, name: &str) -> Result<Option<String>, CloudError> {
        Ok(OpenStack::find_network(self, name)?.map(|n| n.id))
    }

    fn find_subnet(&self, name: &str) -> Result<Option<String>, CloudError> {
        Ok(OpenStack::find_subnet(self, name)?.map(|n| n.id))
    }

    fn find_security_group(&self, name: &str) -> Result<Option<String>, CloudError> {
        Ok(OpenStack::find_security_group(self, name)?.map(|n| n.id))
    }

    fn find_port(&self, name: &str) -> Result<Option<String>, CloudError> {
        Ok(OpenStack::find_port(self, name)?.map(|n| n.id))
    }

    fn find_server(&self, name: &str) -> Result<Option<ServerInfo>, CloudError> {
        Ok(OpenStack::find_server(self, name)?.map(|s| ServerInfo {
            id: s.id,
            name: s.name,
            status: s.status,
            host: s.host,
        }))
    }

    fn find_flavor(&self, name: &str) -> Result<Option<Flavor>, CloudError> {
        Ok(OpenStack::find_flavor(self, name)?.map(|f| Flavor {
            vcpus: f.vcpus,
            ram_mb: f.ram,
            disk_gb: f.disk,
        }))
    }

    fn find_host(&self, name: &str) -> Result<Option<HostInfo>, CloudError> {
        Ok(self.find_hypervisor(name)?.map(|h| HostInfo {
            name: h.hypervisor_hostname,
            total_vcpus: h.vcpus,
            free_vcpus: h.vcpus.saturating_sub(h.vcpus_used),
            total_ram_mb: h.memory_mb,
            free_ram_mb: h.memory_mb.saturating_sub(h.memory_mb_used),
            total_disk_gb: h.local_gb,
            free_disk_gb: h.local_gb.saturating_sub(h.local_gb_used),
        }))
    }

    fn floating_ips(&self, port_id: &str) -> Result<Vec<String>, CloudError> {
        Ok(OpenStack::floating_ips(self, port_id)?
            .into_iter()
            .map(|f| f.floating_ip_address)
            .collect())
    }

    fn create_stack(&self, name: &str, template: &str) -> Result<(), CloudError> {
        let id = OpenStack::create_stack(self, name, template)?;
        debug!("Stack {} created with id {}", name, id);
        Ok(())
    }

    fn update_stack(&self, name: &str, template: &str) -> Result<(), CloudError> {
        let stack = OpenStack::find_stack(self, name)?
            .ok_or_else(|| CloudError::Rejected(format!("Stack {} does not exist", name)))?;
        Ok(OpenStack::update_stack(self, &stack, template)?)
    }

    fn delete_stack(&self, name: &str) -> Result<(), CloudError> {
        let stack = OpenStack::find_stack(self, name)?
            .ok_or_else(|| CloudError::Rejected(format!("Stack {} does not exist", name)))?;
        ignore_not_found(OpenStack::delete_stack(self, &stack), "stack", name)
    }

    fn stack_status(&self, name: &str) -> Result<StackStatus, CloudError> {
        Ok(match OpenStack::find_stack(self, name)? {
            Some(stack) => {
                parse_stack_status(&stack.stack_status, stack.stack_status_reason.as_deref())
            }
            None => StackStatus::NotFound,
        })
    }

    fn create_steering(&self, spec: &SteeringSpec) -> Result<String, CloudError> {
        let body = serde_json::to_value(spec)
            .map_err(|e| CloudError::Rejected(format!("Invalid {}: {}", spec.kind(), e)))?;
        Ok(self.create_sfc(spec.kind().into(), body)?.id)
    }

    fn find_steering(
        &self,
        kind: SteeringKind,
        name: &str,
    ) -> Result<Option<SteeringHandle>, CloudError> {
        Ok(self.find_sfc(kind.into(), name)?.map(SteeringHandle::from))
    }

    fn list_steering(&self, kind: SteeringKind) -> Result<Vec<SteeringHandle>, CloudError> {
        Ok(self.list_sfc(kind.into())?.into_iter().map(SteeringHandle::from).collect())
    }

    fn delete_steering(&self, kind: SteeringKind, id: &str) -> Result<(), CloudError> {
        ignore_not_found(self.delete_sfc(kind.into(), id), &kind.to_string(), id)
    }
}
