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

//! mDNS backend implementation
//!
//! Each browse spawns a pump task that drains the daemon's event channel.
//! `Found` and `Lost` events are forwarded to the browse stream; resolved
//! details go into a shared cache keyed by fullname, where `resolve` picks
//! them up. Starting a browse clears the cached resolutions for its type,
//! and resolution only completes while a browse for the service type is
//! active; callers bound resolve with a timeout.

use crate::utils::{instance_name, record_from_resolved};
use async_trait::async_trait;
use connected_discovery::{
    BackendError, BrowseEvent, BrowseHandle, BrowseSubscription, MulticastBackend,
    RegistrationHandle, ServiceRecord,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};

/// Multicast DNS backend backed by an mdns-sd daemon
///
/// One daemon serves every registration and browse made through this
/// backend. Dropping the backend shuts the daemon down, withdrawing any
/// registrations still live.
pub struct MdnsBackend {
    daemon: mdns_sd::ServiceDaemon,
    resolutions: Arc<ResolutionCache>,
    next_browse_id: AtomicU64,
}

/// Resolved details observed by browse pump tasks, keyed by fullname
struct ResolutionCache {
    records: RwLock<HashMap<String, ServiceRecord>>,
    update_tx: broadcast::Sender<(String, ServiceRecord)>,
}

impl ResolutionCache {
    fn new() -> Self {
        let (update_tx, _) = broadcast::channel(100);
        Self {
            records: RwLock::new(HashMap::new()),
            update_tx,
        }
    }

    async fn store(&self, fullname: String, record: ServiceRecord) {
        log::debug!("Resolved {fullname} -> {record}");
        self.records
            .write()
            .await
            .insert(fullname.clone(), record.clone());
        let _ = self.update_tx.send((fullname, record));
    }

    async fn forget(&self, fullname: &str) {
        self.records.write().await.remove(fullname);
    }

    /// Drop every cached resolution for one service type
    async fn clear_type(&self, service_type: &str) {
        self.records
            .write()
            .await
            .retain(|_, record| record.service_type != service_type);
    }

    async fn lookup(&self, fullname: &str) -> Option<ServiceRecord> {
        self.records.read().await.get(fullname).cloned()
    }
}

impl MdnsBackend {
    /// Create a backend bound to a fresh mdns-sd daemon
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unavailable`] if the daemon cannot start,
    /// for example when no multicast-capable interface exists.
    pub fn new() -> Result<Self, BackendError> {
        let daemon = mdns_sd::ServiceDaemon::new()
            .map_err(|e| BackendError::Unavailable(format!("failed to start mDNS daemon: {e}")))?;

        Ok(Self {
            daemon,
            resolutions: Arc::new(ResolutionCache::new()),
            next_browse_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl MulticastBackend for MdnsBackend {
    async fn register_service(
        &self,
        record: &ServiceRecord,
    ) -> Result<RegistrationHandle, BackendError> {
        // With an explicit host the record advertises exactly that address;
        // otherwise mdns-sd picks addresses from all interfaces.
        let service_info = match record.host {
            Some(ip) => mdns_sd::ServiceInfo::new(
                &record.service_type,
                &record.name,
                &format!("{ip}.local."),
                ip,
                record.port,
                record.attributes.clone(),
            ),
            None => mdns_sd::ServiceInfo::new(
                &record.service_type,
                &record.name,
                &format!("{}.local.", record.name),
                (),
                record.port,
                record.attributes.clone(),
            )
            .map(|info| info.enable_addr_auto()),
        }
        .map_err(|e| BackendError::Rejected(format!("invalid service details: {e}")))?;

        let fullname = service_info.get_fullname().to_string();
        self.daemon
            .register(service_info)
            .map_err(|e| BackendError::Rejected(format!("failed to register: {e}")))?;

        log::info!("Registered mDNS service {fullname}");
        Ok(RegistrationHandle::new(fullname))
    }

    async fn unregister_service(&self, handle: RegistrationHandle) -> Result<(), BackendError> {
        self.daemon.unregister(handle.fullname()).map_err(|e| {
            BackendError::Other(format!("failed to unregister {}: {e}", handle.fullname()))
        })?;

        log::info!("Unregistered mDNS service {}", handle.fullname());
        Ok(())
    }

    async fn browse(&self, service_type: &str) -> Result<BrowseSubscription, BackendError> {
        // Each browse starts cold; resolutions cached by an earlier browse
        // of this type may describe services that are gone
        self.resolutions.clear_type(service_type).await;

        let receiver = self
            .daemon
            .browse(service_type)
            .map_err(|e| BackendError::BrowseFailed(format!("failed to start browse: {e}")))?;

        let id = self.next_browse_id.fetch_add(1, Ordering::Relaxed);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let cache = self.resolutions.clone();
        let target = service_type.to_string();

        tokio::spawn(async move {
            loop {
                let event = match receiver.recv_async().await {
                    Ok(event) => event,
                    Err(e) => {
                        log::debug!("mDNS event channel for {target} closed: {e}");
                        break;
                    }
                };

                match event {
                    mdns_sd::ServiceEvent::ServiceFound(_, fullname) => {
                        log::trace!("Found {fullname}");
                        let found = BrowseEvent::Found {
                            name: instance_name(&fullname, &target),
                            service_type: target.clone(),
                        };
                        if event_tx.send(found).is_err() {
                            break;
                        }
                    }
                    mdns_sd::ServiceEvent::ServiceResolved(info) => {
                        let fullname = info.get_fullname().to_string();
                        match record_from_resolved(&info) {
                            Ok(record) => cache.store(fullname, record).await,
                            Err(e) => {
                                log::warn!("Discarding resolution for {fullname}: {e}");
                            }
                        }
                    }
                    mdns_sd::ServiceEvent::ServiceRemoved(_, fullname) => {
                        log::trace!("Removed {fullname}");
                        cache.forget(&fullname).await;
                        let lost = BrowseEvent::Lost {
                            name: instance_name(&fullname, &target),
                        };
                        if event_tx.send(lost).is_err() {
                            break;
                        }
                    }
                    mdns_sd::ServiceEvent::SearchStarted(ty) => {
                        log::debug!("Search started for {ty}");
                    }
                    mdns_sd::ServiceEvent::SearchStopped(ty) => {
                        log::debug!("Search stopped for {ty}");
                        break;
                    }
                }
            }
        });

        let events = async_stream::stream! {
            while let Some(event) = event_rx.recv().await {
                yield event;
            }
        }
        .boxed();

        Ok(BrowseSubscription {
            handle: BrowseHandle::new(id, service_type),
            events,
        })
    }

    async fn resolve(
        &self,
        name: &str,
        service_type: &str,
    ) -> Result<ServiceRecord, BackendError> {
        let fullname = format!("{name}.{service_type}");

        // Subscribe before checking the cache so an update landing in
        // between is not missed
        let mut updates = self.resolutions.update_tx.subscribe();
        if let Some(record) = self.resolutions.lookup(&fullname).await {
            return Ok(record);
        }

        loop {
            match updates.recv().await {
                Ok((updated, record)) if updated == fullname => return Ok(record),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    // Missed updates; the cache has the latest state
                    if let Some(record) = self.resolutions.lookup(&fullname).await {
                        return Ok(record);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(BackendError::ResolveFailed(format!(
                        "resolution channel closed for {fullname}"
                    )));
                }
            }
        }
    }

    async fn stop_browse(&self, handle: BrowseHandle) -> Result<(), BackendError> {
        self.daemon.stop_browse(handle.service_type()).map_err(|e| {
            BackendError::Other(format!(
                "failed to stop browse for {}: {e}",
                handle.service_type()
            ))
        })?;

        log::debug!("Stopped browse for {}", handle.service_type());
        Ok(())
    }
}

impl Drop for MdnsBackend {
    fn drop(&mut self) {
        // Best-effort daemon shutdown; live registrations are withdrawn
        if let Err(e) = self.daemon.shutdown() {
            log::debug!("mDNS daemon shutdown failed: {e}");
        }
    }
}
