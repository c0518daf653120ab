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

//! Discovery coordinator
//!
//! The coordinator is the single owner of all advertising and discovery
//! state for one backend. It enforces one blocking advertisement per
//! (service type, instance name) pair and one scan per service type, and it
//! is the only component that talks to the [`MulticastBackend`] directly.
//!
//! All methods take `&self`; the coordinator is shared behind an `Arc` and
//! called from any task. Lock scopes never cover backend calls, so a slow
//! registration or a long scan never blocks unrelated operations.

use crate::advertise::{AdvertiseHandle, AdvertisingSession};
use crate::backend::{BackendError, MulticastBackend};
use crate::discover::DiscoverySession;
use crate::error::{DiscoveryError, Result};
use crate::record::{normalize_service_type, ServiceKey, ServiceRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

/// Per-record resolution budget applied inside a scan
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Tunables for a [`DiscoveryCoordinator`]
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long a single instance may take to resolve before its result is
    /// dropped from the scan.
    pub resolve_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }
}

/// Cancellation side of one running scan
struct ScanControl {
    cancel_tx: watch::Sender<bool>,
}

/// Single entry point for advertising and discovering services
pub struct DiscoveryCoordinator {
    backend: Arc<dyn MulticastBackend>,
    config: CoordinatorConfig,
    next_id: AtomicU64,
    advertisements: Mutex<HashMap<ServiceKey, AdvertisingSession>>,
    // Shared with the scan workers, which remove their own entry
    scans: Arc<Mutex<HashMap<String, ScanControl>>>,
}

impl DiscoveryCoordinator {
    /// Create a coordinator with default configuration
    pub fn new(backend: Arc<dyn MulticastBackend>) -> Self {
        Self::with_config(backend, CoordinatorConfig::default())
    }

    /// Create a coordinator with explicit configuration
    pub fn with_config(backend: Arc<dyn MulticastBackend>, config: CoordinatorConfig) -> Self {
        Self {
            backend,
            config,
            next_id: AtomicU64::new(1),
            advertisements: Mutex::new(HashMap::new()),
            scans: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Advertise a service record on the local network
    ///
    /// Validates and canonicalizes the record, then registers it with the
    /// backend. The returned handle stops exactly this advertisement.
    ///
    /// # Errors
    ///
    /// [`DiscoveryError::AlreadyAdvertising`] if a live advertisement
    /// already holds the same (service type, name) pair; the backend is not
    /// contacted in that case. [`DiscoveryError::InvalidRecord`] or
    /// [`DiscoveryError::InvalidServiceType`] if the record fails
    /// validation. [`DiscoveryError::BackendUnavailable`] or
    /// [`DiscoveryError::RegistrationFailed`] when registration fails; the
    /// pair becomes free for another attempt.
    pub async fn advertise(&self, record: ServiceRecord) -> Result<AdvertiseHandle> {
        let record = record.canonicalize()?;
        let key = record.key();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut ads = self.advertisements.lock().await;
            if let Some(existing) = ads.get(&key) {
                if existing.is_blocking() {
                    log::debug!("Rejecting advertise for {key}: already advertising");
                    return Err(DiscoveryError::AlreadyAdvertising {
                        service_type: key.service_type.clone(),
                        name: key.name.clone(),
                    });
                }
            }
            // Reserve the pair before touching the backend so a concurrent
            // advertise for the same key is rejected, not raced.
            let mut session = AdvertisingSession::new(id, record.clone());
            session.mark_registering();
            ads.insert(key.clone(), session);
        }

        log::info!("Advertising {record} on {}", key.service_type);
        let registration = match self.backend.register_service(&record).await {
            Ok(registration) => registration,
            Err(e) => {
                {
                    let mut ads = self.advertisements.lock().await;
                    if let Some(session) = ads.get_mut(&key) {
                        if session.id() == id {
                            session.fail_registration();
                            ads.remove(&key);
                        }
                    }
                }
                log::warn!("Registration for {key} failed: {e}");
                return Err(match e {
                    BackendError::Unavailable(msg) => DiscoveryError::BackendUnavailable(msg),
                    other => DiscoveryError::RegistrationFailed(other.to_string()),
                });
            }
        };

        let orphan = {
            let mut ads = self.advertisements.lock().await;
            match ads.get_mut(&key) {
                Some(session) if session.id() == id => {
                    session.complete_registration(registration);
                    None
                }
                _ => Some(registration),
            }
        };
        if let Some(registration) = orphan {
            log::warn!("Advertisement {key} vanished while registering, withdrawing");
            if let Err(e) = self.backend.unregister_service(registration).await {
                log::warn!("Failed to withdraw orphaned registration for {key}: {e}");
            }
        }

        Ok(AdvertiseHandle::new(key, id))
    }

    /// Stop the advertisement the handle was issued for
    ///
    /// Infallible and idempotent. A stale handle, one whose advertisement
    /// was already stopped or replaced, is a no-op. Backend unregistration
    /// failures are logged and absorbed; the advertisement is gone from the
    /// coordinator's view either way.
    ///
    /// The pair stays occupied while the withdrawal is in flight: an
    /// `advertise` for the same (service type, name) during that window is
    /// rejected with `AlreadyAdvertising`, so a fresh registration can never
    /// be torn down by the earlier withdrawal.
    pub async fn stop_advertising(&self, handle: AdvertiseHandle) {
        let registration = {
            let mut ads = self.advertisements.lock().await;
            match ads.get_mut(handle.key()) {
                Some(session) if session.id() == handle.id() => session.begin_stop(),
                _ => {
                    log::trace!("Ignoring stale stop for {}", handle.key());
                    return;
                }
            }
        };

        // None means a concurrent stop with the same handle owns the teardown
        let Some(registration) = registration else {
            log::trace!("Stop for {} already in progress", handle.key());
            return;
        };

        let fullname = registration.fullname().to_string();
        if let Err(e) = self.backend.unregister_service(registration).await {
            log::warn!("Failed to unregister {fullname}: {e}");
        }

        let mut ads = self.advertisements.lock().await;
        if ads.get(handle.key()).is_some_and(|s| s.id() == handle.id()) {
            if let Some(mut session) = ads.remove(handle.key()) {
                session.finish_stop();
            }
        }
    }

    /// Whether a live advertisement holds the given pair
    ///
    /// Returns false for service types that fail normalization.
    pub async fn is_advertising(&self, service_type: &str, name: &str) -> bool {
        let Ok(service_type) = normalize_service_type(service_type) else {
            return false;
        };
        let key = ServiceKey {
            service_type,
            name: name.to_string(),
        };
        let ads = self.advertisements.lock().await;
        ads.get(&key).is_some_and(|s| s.is_blocking())
    }

    /// Scan for services of one type and return every instance resolved
    /// within the window
    ///
    /// Blocks for the full `window` even when results arrive early, then
    /// returns the resolved set sorted by instance name. An empty network
    /// yields `Ok(vec![])` after the full window. [`cancel_discovery`]
    /// ends the scan early with whatever resolved by then.
    ///
    /// The scan itself runs in a spawned task. Dropping the returned future
    /// detaches from the scan but does not abort it: the window still runs
    /// out (or [`cancel_discovery`] ends it), after which the browse is
    /// stopped and the type freed for the next call.
    ///
    /// # Errors
    ///
    /// [`DiscoveryError::DiscoveryInProgress`] if a scan for the same
    /// canonical type is already running.
    /// [`DiscoveryError::InvalidServiceType`] if the type fails
    /// normalization. [`DiscoveryError::BackendUnavailable`] or
    /// [`DiscoveryError::BrowseFailed`] when the browse cannot start; the
    /// type becomes free for another attempt.
    ///
    /// [`cancel_discovery`]: DiscoveryCoordinator::cancel_discovery
    pub async fn discover(
        &self,
        service_type: &str,
        window: Duration,
    ) -> Result<Vec<ServiceRecord>> {
        let service_type = normalize_service_type(service_type)?;

        let cancel_rx = {
            let mut scans = self.scans.lock().await;
            if scans.contains_key(&service_type) {
                log::debug!("Rejecting discover for {service_type}: scan in progress");
                return Err(DiscoveryError::DiscoveryInProgress(service_type));
            }
            let (cancel_tx, cancel_rx) = watch::channel(false);
            scans.insert(service_type.clone(), ScanControl { cancel_tx });
            cancel_rx
        };

        let subscription = match self.backend.browse(&service_type).await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.scans.lock().await.remove(&service_type);
                log::warn!("Browse for {service_type} failed to start: {e}");
                return Err(match e {
                    BackendError::Unavailable(msg) => DiscoveryError::BackendUnavailable(msg),
                    other => DiscoveryError::BrowseFailed(other.to_string()),
                });
            }
        };

        log::info!("Scanning {service_type} for {window:?}");
        let session = DiscoverySession::new(
            service_type.clone(),
            self.backend.clone(),
            self.config.resolve_timeout,
        );

        // The worker owns the cleanup: the scan entry is removed when the
        // session finishes, whether or not the caller is still polling.
        let worker = {
            let scans = self.scans.clone();
            let service_type = service_type.clone();
            tokio::spawn(async move {
                let records = session.run(subscription, window, cancel_rx).await;
                scans.lock().await.remove(&service_type);
                records
            })
        };

        match worker.await {
            Ok(records) => Ok(records),
            Err(e) => {
                self.scans.lock().await.remove(&service_type);
                log::error!("Scan task for {service_type} failed: {e}");
                Err(DiscoveryError::BrowseFailed(format!(
                    "scan for {service_type} did not complete: {e}"
                )))
            }
        }
    }

    /// Cancel the scan for a service type, if one is running
    ///
    /// Returns true when a running scan was told to stop. The cancelled
    /// [`discover`] call itself returns normally with the partial result
    /// set.
    ///
    /// [`discover`]: DiscoveryCoordinator::discover
    pub async fn cancel_discovery(&self, service_type: &str) -> bool {
        let Ok(service_type) = normalize_service_type(service_type) else {
            return false;
        };

        let scans = self.scans.lock().await;
        match scans.get(&service_type) {
            Some(control) => {
                log::debug!("Cancelling scan for {service_type}");
                control.cancel_tx.send(true).is_ok()
            }
            None => false,
        }
    }
}
