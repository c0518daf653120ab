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

//! Advertising session lifecycle
//!
//! ## State Flow
//!
//! ```text
//! Idle
//!   ↓ advertise() accepted
//! Registering
//!   ↓ backend OK            ↓ backend error
//! Active                    Failed (terminal, entry removed)
//!   ↓ stop_advertising()
//! Unregistering
//!   ↓ always (unregister errors are logged)
//! Stopped (terminal)
//! ```

use crate::backend::RegistrationHandle;
use crate::{ServiceKey, ServiceRecord};

/// Lifecycle states of an advertisement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseState {
    /// Created, registration not yet attempted
    Idle,
    /// Backend registration call in flight
    Registering,
    /// Advertisement live on the network
    Active,
    /// Backend withdrawal in flight
    Unregistering,
    /// Advertisement withdrawn (terminal)
    Stopped,
    /// Backend rejected the registration (terminal)
    Failed,
}

impl AdvertiseState {
    /// State name for logs
    pub fn name(&self) -> &'static str {
        match self {
            AdvertiseState::Idle => "Idle",
            AdvertiseState::Registering => "Registering",
            AdvertiseState::Active => "Active",
            AdvertiseState::Unregistering => "Unregistering",
            AdvertiseState::Stopped => "Stopped",
            AdvertiseState::Failed => "Failed",
        }
    }
}

/// One advertisement, owned by the coordinator
///
/// The coordinator keeps the session in its advertisement map while the
/// backend registration call runs, so the Registering -> Active / Failed
/// transitions are explicit steps around that await rather than a single
/// method holding a lock. Teardown is split the same way: `begin_stop`
/// under the lock, the backend withdrawal outside it, `finish_stop` once
/// it returns.
pub struct AdvertisingSession {
    id: u64,
    record: ServiceRecord,
    state: AdvertiseState,
    registration: Option<RegistrationHandle>,
}

impl AdvertisingSession {
    pub(crate) fn new(id: u64, record: ServiceRecord) -> Self {
        Self {
            id,
            record,
            state: AdvertiseState::Idle,
            registration: None,
        }
    }

    /// Session id, unique per coordinator
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The record being advertised
    pub fn record(&self) -> &ServiceRecord {
        &self.record
    }

    /// Current lifecycle state
    pub fn state(&self) -> AdvertiseState {
        self.state
    }

    /// Whether this session blocks a new advertisement for the same key
    ///
    /// Registering, Active and Unregistering all occupy the key; the pair
    /// is free again only once the backend withdrawal has completed.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self.state,
            AdvertiseState::Registering | AdvertiseState::Active | AdvertiseState::Unregistering
        )
    }

    pub(crate) fn mark_registering(&mut self) {
        self.transition(AdvertiseState::Registering);
    }

    pub(crate) fn complete_registration(&mut self, registration: RegistrationHandle) {
        self.registration = Some(registration);
        self.transition(AdvertiseState::Active);
    }

    pub(crate) fn fail_registration(&mut self) {
        self.transition(AdvertiseState::Failed);
    }

    /// Begin withdrawing the advertisement
    ///
    /// Transitions an Active session to Unregistering and yields the
    /// registration to unregister with the backend. Returns `None` when the
    /// session never became active or a teardown already owns it; the
    /// caller skips the backend in that case.
    pub(crate) fn begin_stop(&mut self) -> Option<RegistrationHandle> {
        match self.state {
            AdvertiseState::Active => {
                self.transition(AdvertiseState::Unregistering);
                self.registration.take()
            }
            _ => None,
        }
    }

    /// Complete the withdrawal started by [`begin_stop`]
    ///
    /// [`begin_stop`]: AdvertisingSession::begin_stop
    pub(crate) fn finish_stop(&mut self) {
        self.transition(AdvertiseState::Stopped);
        log::info!("Stopped advertising {}", self.record.key());
    }

    fn transition(&mut self, next: AdvertiseState) {
        log::trace!(
            "Advertisement {}: {} -> {}",
            self.record.key(),
            self.state.name(),
            next.name()
        );
        self.state = next;
    }
}

/// Handle returned by a successful `advertise` call
///
/// Carries the advertisement identity plus the session id, so a handle kept
/// after its session was stopped (and possibly replaced by a newer one for
/// the same key) stops nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertiseHandle {
    key: ServiceKey,
    id: u64,
}

impl AdvertiseHandle {
    pub(crate) fn new(key: ServiceKey, id: u64) -> Self {
        Self { key, id }
    }

    /// Identity of the advertisement this handle controls
    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}
