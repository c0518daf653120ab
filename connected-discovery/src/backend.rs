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

//! Multicast service backend capability
//!
//! The coordinator drives every mDNS interaction through the
//! [`MulticastBackend`] trait. Implementations live in separate crates:
//! `connected-discovery-mdns` for real multicast DNS, and
//! `connected-discovery-mock` for in-memory testing.

use crate::ServiceRecord;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

/// Errors reported by a multicast backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The platform responder is absent or refused to start
    #[error("Multicast responder unavailable: {0}")]
    Unavailable(String),

    /// The responder rejected a service registration
    #[error("Registration rejected: {0}")]
    Rejected(String),

    /// A browse could not be started or stopped
    #[error("Browse failed: {0}")]
    BrowseFailed(String),

    /// A resolution attempt failed
    #[error("Failed to resolve service: {0}")]
    ResolveFailed(String),

    /// A resolution attempt exceeded its budget
    #[error("Resolution timed out after {0:?}")]
    ResolveTimeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other backend error
    #[error("{0}")]
    Other(String),
}

/// Handle for a live service registration
///
/// Backends identify registrations by the full service name
/// (`<instance>.<type>`), which is also what gets withdrawn on unregister.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationHandle {
    fullname: String,
}

impl RegistrationHandle {
    /// Create a handle for the given full service name
    pub fn new(fullname: impl Into<String>) -> Self {
        Self {
            fullname: fullname.into(),
        }
    }

    /// Full service name this registration was made under
    pub fn fullname(&self) -> &str {
        &self.fullname
    }
}

/// Handle for an active browse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseHandle {
    id: u64,
    service_type: String,
}

impl BrowseHandle {
    /// Create a handle with a backend-assigned id
    pub fn new(id: u64, service_type: impl Into<String>) -> Self {
        Self {
            id,
            service_type: service_type.into(),
        }
    }

    /// Backend-assigned browse id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Service type this browse watches
    pub fn service_type(&self) -> &str {
        &self.service_type
    }
}

/// Browse notifications (appearance and disappearance only)
///
/// Resolution is a separate, explicitly requested step; a `Found` event
/// carries no address information.
#[derive(Debug, Clone)]
pub enum BrowseEvent {
    /// An instance appeared on the network
    Found {
        /// Instance name
        name: String,
        /// Canonical service type the instance was seen under
        service_type: String,
    },

    /// An instance disappeared from the network
    Lost {
        /// Instance name
        name: String,
    },
}

/// An active browse: the handle to stop it plus its event stream
///
/// The stream is infinite while the browse is live and ends shortly after
/// [`MulticastBackend::stop_browse`] is called for the handle.
pub struct BrowseSubscription {
    /// Handle identifying this browse to the backend
    pub handle: BrowseHandle,

    /// Stream of browse events
    pub events: BoxStream<'static, BrowseEvent>,
}

/// Multicast DNS service backend
///
/// One backend instance is shared by every session of a coordinator.
/// Implementations must tolerate concurrent calls.
#[async_trait]
pub trait MulticastBackend: Send + Sync {
    /// Register a service for advertisement
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Unavailable` when the responder is absent and
    /// `BackendError::Rejected` when it refuses the registration.
    async fn register_service(
        &self,
        record: &ServiceRecord,
    ) -> Result<RegistrationHandle, BackendError>;

    /// Withdraw a previously registered service
    ///
    /// # Errors
    ///
    /// Returns an error if the responder cannot withdraw the registration.
    /// Callers treat this as best-effort.
    async fn unregister_service(&self, handle: RegistrationHandle) -> Result<(), BackendError>;

    /// Start browsing for instances of a service type
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Unavailable` or `BackendError::BrowseFailed`
    /// when the browse cannot be started.
    async fn browse(&self, service_type: &str) -> Result<BrowseSubscription, BackendError>;

    /// Resolve a discovered instance to a record with an address
    ///
    /// May complete out of order with respect to other resolutions, or not
    /// at all; callers bound it with their own timeout.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::ResolveFailed` when the instance cannot be
    /// resolved.
    async fn resolve(&self, name: &str, service_type: &str)
        -> Result<ServiceRecord, BackendError>;

    /// Stop an active browse
    ///
    /// # Errors
    ///
    /// Returns `BackendError::BrowseFailed` when the browse cannot be
    /// stopped. Callers treat this as best-effort.
    async fn stop_browse(&self, handle: BrowseHandle) -> Result<(), BackendError>;
}
