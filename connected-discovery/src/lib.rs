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

//! Local service discovery over multicast DNS
//!
//! This crate coordinates DNS-SD advertising and discovery on the local
//! network. A [`DiscoveryCoordinator`] owns every advertising and scan
//! session, enforces one advertisement per (service type, instance name)
//! pair and one scan per type, and talks to a pluggable
//! [`MulticastBackend`]. Backends live in companion crates:
//! `connected-discovery-mdns` speaks real multicast DNS through a system
//! daemon, `connected-discovery-mock` is an in-process network for tests.
//!
//! Discovery is windowed: [`DiscoveryCoordinator::discover`] browses for a
//! caller-chosen duration and returns the set of fully resolved instances,
//! holding the caller for the whole window so late announcers are caught.
//! Instances that cannot be resolved in time never appear in the result.
//!
//! # Example
//!
//! ```
//! use connected_discovery::ServiceRecord;
//!
//! let record = ServiceRecord::new("living-room", "_myapp._tcp", 9000)
//!     .canonicalize()
//!     .unwrap();
//! assert_eq!(record.service_type, "_myapp._tcp.local.");
//! assert!(!record.is_resolved());
//! ```

pub mod advertise;
pub mod backend;
pub mod coordinator;
pub mod discover;
pub mod error;
pub mod netif;
pub mod record;

pub use advertise::{AdvertiseHandle, AdvertiseState, AdvertisingSession};
pub use backend::{
    BackendError, BrowseEvent, BrowseHandle, BrowseSubscription, MulticastBackend,
    RegistrationHandle,
};
pub use coordinator::{CoordinatorConfig, DiscoveryCoordinator, DEFAULT_RESOLVE_TIMEOUT};
pub use discover::{DiscoverySession, ScanState};
pub use error::{DiscoveryError, Result};
pub use netif::{InterfaceAddr, InterfaceEnumerator, NetworkInterfaceResolver};
pub use record::{
    normalize_service_type, ServiceKey, ServiceRecord, MAX_ATTRIBUTES, MAX_INSTANCE_NAME_LEN,
    MAX_TXT_PAIR_LEN,
};
