// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Multicast DNS backend using mdns-sd
//!
//! This crate provides the production [`MulticastBackend`] implementation
//! backed by the `mdns-sd` daemon, plus [`SystemInterfaces`] for
//! enumerating real network interfaces.
//!
//! [`MulticastBackend`]: connected_discovery::MulticastBackend
//!
//! # Example
//!
//! ```no_run
//! use connected_discovery::{DiscoveryCoordinator, ServiceRecord};
//! use connected_discovery_mdns::MdnsBackend;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(MdnsBackend::new()?);
//! let coordinator = DiscoveryCoordinator::new(backend);
//!
//! let record = ServiceRecord::new("living-room", "_myapp._tcp", 9000);
//! let handle = coordinator.advertise(record).await?;
//!
//! let found = coordinator
//!     .discover("_myapp._tcp", Duration::from_secs(10))
//!     .await?;
//! println!("found {} service(s)", found.len());
//!
//! coordinator.stop_advertising(handle).await;
//! # Ok(())
//! # }
//! ```

mod backend;
mod netif;
mod utils;

pub use backend::MdnsBackend;
pub use netif::SystemInterfaces;
