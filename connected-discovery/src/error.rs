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

//! Coordinator error types

/// Result alias for coordinator operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Errors surfaced by coordinator operations
///
/// Per-record resolution failures are never surfaced here; a record that
/// fails or times out during resolution is dropped from the result set.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// An advertisement for this (service type, name) pair is already live
    #[error("Already advertising {name} as {service_type}")]
    AlreadyAdvertising {
        /// Canonical service type of the existing advertisement
        service_type: String,
        /// Instance name of the existing advertisement
        name: String,
    },

    /// A scan for this service type is already running
    #[error("Discovery already in progress for {0}")]
    DiscoveryInProgress(String),

    /// The multicast responder is not available on this host
    #[error("Multicast backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend rejected a service registration
    #[error("Service registration failed: {0}")]
    RegistrationFailed(String),

    /// The backend could not start a browse
    #[error("Failed to start browsing: {0}")]
    BrowseFailed(String),

    /// Service type string does not have the `_name._tcp` / `_name._udp` shape
    #[error("Invalid service type: {0}")]
    InvalidServiceType(String),

    /// Service record violates a bound (name length, attribute limits)
    #[error("Invalid service record: {0}")]
    InvalidRecord(String),

    /// No non-loopback IPv4 interface present
    #[error("No usable network interface found")]
    NoInterfaceFound,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
