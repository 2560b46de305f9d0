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

//! # Heat Orchestration Templates
//!
//! In-memory model of a HOT document. Resources are kept in insertion order, and references to
//! other resources of the same template are emitted as `{ get_resource: name }`, such that heat
//! resolves them. Building a template never touches the cloud.
//!
//! ```
//! use sfcostack::hot::{get_resource, Template};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut tpl = Template::new("Example");
//! tpl.add_resource("sf0_pt", "port", json!({ "name": "sf0_pt", "network_id": "1234" }))?
//!     .add_resource(
//!         "sf0",
//!         "server",
//!         json!({ "name": "sf0", "networks": [{ "port": get_resource("sf0_pt") }] }),
//!     )?;
//! let doc = tpl.render()?;
//! assert!(doc.contains("get_resource: sf0_pt"));
//! # Ok(())
//! # }
//! ```

use serde::Serialize;
use serde_yaml_ng::{Mapping, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Template version understood by all supported heat releases
pub const HOT_VERSION: &str = "2017-02-24";

/// # Template Error
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The kind of a resource is not known
    #[error("Unknown resource kind: {0}")]
    UnknownResourceKind(String),
    /// Two resources or two parameters share the same name
    #[error("Resource {0} is already defined in the template")]
    DuplicateName(String),
    /// The properties cannot be represented in the template
    #[error("Cannot serialize the template: {0}")]
    Serialization(#[from] serde_yaml_ng::Error),
}

/// Kind of a template resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Neutron network
    Network,
    /// Neutron subnet
    Subnet,
    /// Neutron port
    Port,
    /// Neutron floating ip
    FloatingIp,
    /// Nova server
    Server,
}

impl ResourceKind {
    /// Resource type used by heat
    pub fn hot_type(&self) -> &'static str {
        match self {
            Self::Network => "OS::Neutron::Net",
            Self::Subnet => "OS::Neutron::Subnet",
            Self::Port => "OS::Neutron::Port",
            Self::FloatingIp => "OS::Neutron::FloatingIP",
            Self::Server => "OS::Nova::Server",
        }
    }
}

impl FromStr for ResourceKind {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network" | "net" => Ok(Self::Network),
            "subnet" => Ok(Self::Subnet),
            "port" => Ok(Self::Port),
            "floating-ip" | "fip" => Ok(Self::FloatingIp),
            "server" => Ok(Self::Server),
            _ => Err(TemplateError::UnknownResourceKind(s.to_string())),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hot_type())
    }
}

/// Reference to another resource of the same template, resolved by heat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetResource {
    get_resource: String,
}

/// Create a reference to the ID of the resource `name`.
pub fn get_resource(name: impl Into<String>) -> GetResource {
    GetResource { get_resource: name.into() }
}

/// Reference to an attribute of another resource, resolved by heat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetAttr {
    get_attr: (String, String),
}

/// Create a reference to the attribute `attr` of the resource `name`.
pub fn get_attr(name: impl Into<String>, attr: impl Into<String>) -> GetAttr {
    GetAttr { get_attr: (name.into(), attr.into()) }
}

/// A single resource of the template
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Name of the resource inside the template
    pub name: String,
    /// Kind of the resource
    pub kind: ResourceKind,
    /// Properties, as they are written into the template
    pub properties: Value,
}

/// Input parameter of the template
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Name of the parameter
    pub name: String,
    /// Type of the parameter, like `string` or `number`
    pub param_type: String,
    /// Default value
    pub default: Option<Value>,
    /// Human readable label
    pub label: Option<String>,
}

/// Output value of the template
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    /// Name of the output
    pub name: String,
    /// Description of the output
    pub description: Option<String>,
    /// Value (usually a `get_attr` reference)
    pub value: Value,
}

/// # Heat Orchestration Template
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    description: String,
    parameters: Vec<Parameter>,
    resources: Vec<Resource>,
    outputs: Vec<Output>,
}

impl Template {
    /// Create an empty template
    pub fn new(description: impl Into<String>) -> Self {
        Self { description: description.into(), ..Default::default() }
    }

    /// Add a new resource at the end of the template. The `kind` is one of `network`, `subnet`,
    /// `port`, `floating-ip` or `server`.
    pub fn add_resource(
        &mut self,
        name: impl Into<String>,
        kind: impl AsRef<str>,
        properties: impl Serialize,
    ) -> Result<&mut Self, TemplateError> {
        let kind: ResourceKind = kind.as_ref().parse()?;
        let name = name.into();
        if self.contains(&name) {
            return Err(TemplateError::DuplicateName(name));
        }
        let properties = serde_yaml_ng::to_value(properties)?;
        self.resources.push(Resource { name, kind, properties });
        Ok(self)
    }

    /// Add a new input parameter.
    pub fn add_parameter(
        &mut self,
        name: impl Into<String>,
        param_type: impl Into<String>,
        default: Option<Value>,
        label: Option<String>,
    ) -> Result<&mut Self, TemplateError> {
        let name = name.into();
        if self.parameters.iter().any(|p| p.name == name) {
            return Err(TemplateError::DuplicateName(name));
        }
        self.parameters.push(Parameter { name, param_type: param_type.into(), default, label });
        Ok(self)
    }

    /// Add a new output.
    pub fn add_output(
        &mut self,
        name: impl Into<String>,
        value: impl Serialize,
        description: Option<String>,
    ) -> Result<&mut Self, TemplateError> {
        let value = serde_yaml_ng::to_value(value)?;
        self.outputs.push(Output { name: name.into(), description, value });
        Ok(self)
    }

    /// Returns true if a resource with the given name exists
    pub fn contains(&self, name: impl AsRef<str>) -> bool {
        self.resources.iter().any(|r| r.name == name.as_ref())
    }

    /// Return all resources in insertion order
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Return all resources of a specific kind in insertion order
    pub fn resources_of(&self, kind: ResourceKind) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(move |r| r.kind == kind)
    }

    /// Build the document tree
    pub fn to_value(&self) -> Value {
        let mut doc = Mapping::new();
        doc.insert("heat_template_version".into(), HOT_VERSION.into());
        doc.insert("description".into(), self.description.as_str().into());

        if !self.parameters.is_empty() {
            let mut parameters = Mapping::new();
            for p in self.parameters.iter() {
                let mut param = Mapping::new();
                param.insert("type".into(), p.param_type.as_str().into());
                if let Some(label) = p.label.as_ref() {
                    param.insert("label".into(), label.as_str().into());
                }
                if let Some(default) = p.default.as_ref() {
                    param.insert("default".into(), default.clone());
                }
                parameters.insert(p.name.as_str().into(), Value::Mapping(param));
            }
            doc.insert("parameters".into(), Value::Mapping(parameters));
        }

        let mut resources = Mapping::new();
        for r in self.resources.iter() {
            let mut resource = Mapping::new();
            resource.insert("type".into(), r.kind.hot_type().into());
            resource.insert("properties".into(), r.properties.clone());
            resources.insert(r.name.as_str().into(), Value::Mapping(resource));
        }
        doc.insert("resources".into(), Value::Mapping(resources));

        if !self.outputs.is_empty() {
            let mut outputs = Mapping::new();
            for o in self.outputs.iter() {
                let mut output = Mapping::new();
                if let Some(description) = o.description.as_ref() {
                    output.insert("description".into(), description.as_str().into());
                }
                output.insert("value".into(), o.value.clone());
                outputs.insert(o.name.as_str().into(), Value::Mapping(output));
            }
            doc.insert("outputs".into(), Value::Mapping(outputs));
        }

        Value::Mapping(doc)
    }

    /// Render the template as a YAML document
    pub fn render(&self) -> Result<String, TemplateError> {
        Ok(serde_yaml_ng::to_string(&self.to_value())?)
    }
}
