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

//! Simulated multicast network shared by publishers and browsers

use async_trait::async_trait;
use connected_discovery::{
    BackendError, BrowseEvent, BrowseHandle, BrowseSubscription, MulticastBackend,
    RegistrationHandle, ServiceRecord,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, RwLock};

/// Event on the simulated network segment
#[derive(Debug, Clone)]
enum NetworkEvent {
    Appeared { name: String, service_type: String },
    Disappeared { name: String, service_type: String },
}

/// In-memory multicast backend
///
/// Clones share one simulated network segment. Service types are matched
/// literally, so scripted records should use the canonical
/// `_name._proto.local.` form that the coordinator hands to the backend.
#[derive(Clone)]
pub struct MockBackend {
    inner: Arc<MockBackendInner>,
}

struct MockBackendInner {
    /// Instances visible on the network, keyed by (service type, name)
    services: RwLock<HashMap<(String, String), ServiceRecord>>,
    /// Registrations made through the trait, keyed by fullname
    registrations: RwLock<HashMap<String, (String, String)>>,
    /// Stop switches of browses not yet stopped, keyed by browse id
    stops: RwLock<HashMap<u64, watch::Sender<bool>>>,
    /// Event broadcast channel
    event_tx: broadcast::Sender<NetworkEvent>,
    /// Artificial latency applied to every resolve call
    resolve_delay: RwLock<Duration>,
    /// When set, register_service is refused
    refuse_registrations: RwLock<bool>,
    registration_count: AtomicU64,
    next_browse_id: AtomicU64,
}

impl MockBackend {
    /// Create a new simulated network
    ///
    /// # Example
    ///
    /// ```
    /// use connected_discovery_mock::MockBackend;
    ///
    /// let backend = MockBackend::new();
    /// ```
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            inner: Arc::new(MockBackendInner {
                services: RwLock::new(HashMap::new()),
                registrations: RwLock::new(HashMap::new()),
                stops: RwLock::new(HashMap::new()),
                event_tx,
                resolve_delay: RwLock::new(Duration::ZERO),
                refuse_registrations: RwLock::new(false),
                registration_count: AtomicU64::new(0),
                next_browse_id: AtomicU64::new(1),
            }),
        }
    }

    /// Make a record appear on the network without going through a
    /// coordinator (for testing)
    pub async fn publish_record(&self, record: ServiceRecord) {
        let key = (record.service_type.clone(), record.name.clone());
        self.inner.services.write().await.insert(key, record.clone());

        let _ = self.inner.event_tx.send(NetworkEvent::Appeared {
            name: record.name,
            service_type: record.service_type,
        });
    }

    /// Make a record disappear from the network (for testing)
    pub async fn remove_record(&self, service_type: &str, name: &str) {
        let key = (service_type.to_string(), name.to_string());
        self.inner.services.write().await.remove(&key);

        let _ = self.inner.event_tx.send(NetworkEvent::Disappeared {
            name: name.to_string(),
            service_type: service_type.to_string(),
        });
    }

    /// Delay every subsequent resolve call (for testing)
    pub async fn set_resolve_delay(&self, delay: Duration) {
        *self.inner.resolve_delay.write().await = delay;
    }

    /// Refuse or accept subsequent registrations (for testing)
    pub async fn refuse_registrations(&self, refuse: bool) {
        *self.inner.refuse_registrations.write().await = refuse;
    }

    /// Number of successful registrations made through the trait (for
    /// testing)
    pub fn registration_count(&self) -> u64 {
        self.inner.registration_count.load(Ordering::SeqCst)
    }

    /// Number of browses that have not been stopped yet (for testing)
    pub async fn active_browse_count(&self) -> usize {
        self.inner.stops.read().await.len()
    }

    /// Number of records currently on the network (for testing)
    pub async fn service_count(&self) -> usize {
        self.inner.services.read().await.len()
    }

    /// Remove every record from the network (for testing)
    pub async fn clear(&self) {
        self.inner.services.write().await.clear();
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MulticastBackend for MockBackend {
    async fn register_service(
        &self,
        record: &ServiceRecord,
    ) -> Result<RegistrationHandle, BackendError> {
        if *self.inner.refuse_registrations.read().await {
            return Err(BackendError::Rejected(format!(
                "registration refused for {}",
                record.name
            )));
        }

        let fullname = format!("{}.{}", record.name, record.service_type);
        let key = (record.service_type.clone(), record.name.clone());
        self.inner
            .registrations
            .write()
            .await
            .insert(fullname.clone(), key);
        self.inner.registration_count.fetch_add(1, Ordering::SeqCst);

        self.publish_record(record.clone()).await;
        Ok(RegistrationHandle::new(fullname))
    }

    async fn unregister_service(&self, handle: RegistrationHandle) -> Result<(), BackendError> {
        let removed = self
            .inner
            .registrations
            .write()
            .await
            .remove(handle.fullname());

        match removed {
            Some((service_type, name)) => {
                self.remove_record(&service_type, &name).await;
                Ok(())
            }
            None => {
                log::debug!("Ignoring unregister for unknown {}", handle.fullname());
                Ok(())
            }
        }
    }

    async fn browse(&self, service_type: &str) -> Result<BrowseSubscription, BackendError> {
        let id = self.inner.next_browse_id.fetch_add(1, Ordering::Relaxed);
        let (stop_tx, mut stop_rx) = watch::channel(false);
        self.inner.stops.write().await.insert(id, stop_tx);

        // Subscribe before snapshotting so nothing announced in between is
        // missed. A record caught by both is found twice, which browsers
        // tolerate.
        let mut receiver = self.inner.event_tx.subscribe();
        let snapshot: Vec<String> = {
            let services = self.inner.services.read().await;
            services
                .keys()
                .filter(|(ty, _)| ty.as_str() == service_type)
                .map(|(_, name)| name.clone())
                .collect()
        };
        let target = service_type.to_string();

        let events = async_stream::stream! {
            for name in snapshot {
                yield BrowseEvent::Found {
                    name,
                    service_type: target.clone(),
                };
            }

            loop {
                let event = tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                    event = receiver.recv() => event,
                };

                match event {
                    Ok(NetworkEvent::Appeared { name, service_type })
                        if service_type == target =>
                    {
                        yield BrowseEvent::Found { name, service_type };
                    }
                    Ok(NetworkEvent::Disappeared { name, service_type })
                        if service_type == target =>
                    {
                        yield BrowseEvent::Lost { name };
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        // Some events were missed, keep receiving
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
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
        let delay = *self.inner.resolve_delay.read().await;
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }

        let key = (service_type.to_string(), name.to_string());
        let record = self
            .inner
            .services
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| {
                BackendError::ResolveFailed(format!("unknown instance {name} on {service_type}"))
            })?;

        // Records scripted without an address resolve to loopback
        if record.host.is_none() {
            Ok(record.with_host(IpAddr::V4(Ipv4Addr::LOCALHOST)))
        } else {
            Ok(record)
        }
    }

    async fn stop_browse(&self, handle: BrowseHandle) -> Result<(), BackendError> {
        if let Some(stop_tx) = self.inner.stops.write().await.remove(&handle.id()) {
            let _ = stop_tx.send(true);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    const TYPE: &str = "_myapp._tcp.local.";

    fn record(name: &str) -> ServiceRecord {
        ServiceRecord::new(name, TYPE, 9000)
    }

    async fn next_event(subscription: &mut BrowseSubscription) -> BrowseEvent {
        timeout(Duration::from_millis(500), subscription.events.next())
            .await
            .expect("timeout waiting for browse event")
            .expect("browse stream ended")
    }

    #[tokio::test]
    async fn test_publish_and_resolve() {
        let backend = MockBackend::new();
        backend.publish_record(record("printer")).await;
        assert_eq!(backend.service_count().await, 1);

        let resolved = backend.resolve("printer", TYPE).await.unwrap();
        assert_eq!(resolved.host, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert_eq!(resolved.port, 9000);
    }

    #[tokio::test]
    async fn test_resolve_unknown_instance_fails() {
        let backend = MockBackend::new();
        let err = backend.resolve("ghost", TYPE).await.unwrap_err();
        assert!(matches!(err, BackendError::ResolveFailed(_)));
    }

    #[tokio::test]
    async fn test_browse_sees_existing_services() {
        let backend = MockBackend::new();
        backend.publish_record(record("early")).await;

        let mut subscription = backend.browse(TYPE).await.unwrap();
        let event = next_event(&mut subscription).await;
        assert!(matches!(event, BrowseEvent::Found { ref name, .. } if name == "early"));
    }

    #[tokio::test]
    async fn test_browse_sees_later_publications_and_removals() {
        let backend = MockBackend::new();
        let mut subscription = backend.browse(TYPE).await.unwrap();

        backend.publish_record(record("late")).await;
        let event = next_event(&mut subscription).await;
        assert!(matches!(event, BrowseEvent::Found { ref name, .. } if name == "late"));

        backend.remove_record(TYPE, "late").await;
        let event = next_event(&mut subscription).await;
        assert!(matches!(event, BrowseEvent::Lost { ref name } if name == "late"));
    }

    #[tokio::test]
    async fn test_browse_filters_other_types() {
        let backend = MockBackend::new();
        let mut subscription = backend.browse(TYPE).await.unwrap();

        backend
            .publish_record(ServiceRecord::new("other", "_other._tcp.local.", 1))
            .await;
        backend.publish_record(record("mine")).await;

        let event = next_event(&mut subscription).await;
        assert!(matches!(event, BrowseEvent::Found { ref name, .. } if name == "mine"));
    }

    #[tokio::test]
    async fn test_register_publishes_and_counts() {
        let backend = MockBackend::new();
        let handle = backend.register_service(&record("printer")).await.unwrap();

        assert_eq!(backend.registration_count(), 1);
        assert_eq!(backend.service_count().await, 1);

        backend.unregister_service(handle).await.unwrap();
        assert_eq!(backend.service_count().await, 0);
    }

    #[tokio::test]
    async fn test_unregister_unknown_handle_is_noop() {
        let backend = MockBackend::new();
        backend
            .unregister_service(RegistrationHandle::new("nobody._x._tcp.local."))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_refused_registration() {
        let backend = MockBackend::new();
        backend.refuse_registrations(true).await;

        let err = backend.register_service(&record("printer")).await.unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));
        assert_eq!(backend.registration_count(), 0);
        assert_eq!(backend.service_count().await, 0);
    }

    #[tokio::test]
    async fn test_stop_browse_ends_stream() {
        let backend = MockBackend::new();
        let subscription = backend.browse(TYPE).await.unwrap();
        assert_eq!(backend.active_browse_count().await, 1);

        let handle = subscription.handle.clone();
        let mut events = subscription.events;
        backend.stop_browse(handle).await.unwrap();

        let end = timeout(Duration::from_millis(500), events.next())
            .await
            .expect("stream did not end after stop");
        assert!(end.is_none());
        assert_eq!(backend.active_browse_count().await, 0);
    }
}
