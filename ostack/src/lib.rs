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

//! # OpenStack API
//!
//! This is a very simple blocking client for the parts of OpenStack needed to deploy service
//! function chains: the identity service (password authentication), neutron (including the
//! networking-sfc extension), nova and heat.
//!
//! ```no_run
//! use ostack::{Credentials, OpenStack, SfcKind};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = Credentials::new(
//!         "http://192.168.0.1/identity/v3",
//!         "admin",
//!         "stack",
//!         "admin",
//!     );
//!     let cloud = OpenStack::connect(&credentials)?;
//!
//!     // look up the network of the chain
//!     let net = cloud.find_network("net1")?.expect("network must exist");
//!     println!("net1 has the id {}", net.id);
//!
//!     // list all port chains
//!     for chain in cloud.list_sfc(SfcKind::PortChain)? {
//!         println!("port chain {} ({})", chain.name, chain.id);
//!     }
//!     Ok(())
//! }
//! ```
#![deny(missing_docs)]

mod client;
mod types;
pub use client::OpenStack;
pub use types::*;

use thiserror::Error;

/// # OpenStack Error type
#[derive(Debug, Error)]
pub enum Error {
    /// Error during handling of the HTTP request
    #[allow(clippy::upper_case_acronyms)]
    #[error("HTTP Error: {0}")]
    HTTPError(#[from] isahc::Error),
    /// The request could not be built
    #[error("Invalid HTTP request: {0}")]
    RequestError(#[from] isahc::http::Error),
    /// Cannot deserialize the response
    #[error("Cannot parse JSON response: {0}")]
    JsonError(#[from] serde_json::error::Error),
    /// IO Error
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
    /// HTTP Response Error
    #[error("HTTP Response Error: {0}. Message:\n{1}")]
    ResponseError(u16, String),
    /// The identity service did not return a token
    #[error("The identity service did not return a token!")]
    MissingToken,
    /// The service catalog does not contain the required endpoint
    #[error("No {interface} endpoint for the service {service} in the catalog!")]
    MissingEndpoint {
        /// Service type, like `network`
        service: String,
        /// Endpoint interface, like `public`
        interface: String,
    },
}

impl Error {
    /// Returns true if the error is a response with status 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ResponseError(404, _))
    }
}

/// OpenStack Result type
pub type Result<T> = core::result::Result<T, Error>;
