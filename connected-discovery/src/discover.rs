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

//! Discovery scan sessions
//!
//! A session owns one browse for one service type. It consumes the backend's
//! `Found`/`Lost` events, resolves found instances concurrently, and keeps a
//! result map keyed by instance name. The scan runs for its full window even
//! if results stabilize early; cancellation closes it early with whatever
//! resolved so far.
//!
//! Resolutions can land after the instance they belong to has disappeared.
//! Each name carries a generation counter: `Found` bumps it and tags the
//! spawned resolution, `Lost` bumps it again, and a resolution whose tag is
//! no longer current is dropped on arrival. Within a name, the last current
//! resolution wins.

use crate::backend::{
    BackendError, BrowseEvent, BrowseSubscription, MulticastBackend,
};
use crate::ServiceRecord;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Lifecycle states of a discovery scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Created, browse not yet started
    Idle,
    /// Consuming browse events inside the window
    Browsing,
    /// Window elapsed (terminal trigger)
    TimedOut,
    /// Cancelled before the window elapsed (terminal trigger)
    Cancelled,
    /// Browse stopped, snapshot handed out (terminal)
    Closed,
}

impl ScanState {
    /// State name for logs
    pub fn name(&self) -> &'static str {
        match self {
            ScanState::Idle => "Idle",
            ScanState::Browsing => "Browsing",
            ScanState::TimedOut => "TimedOut",
            ScanState::Cancelled => "Cancelled",
            ScanState::Closed => "Closed",
        }
    }
}

type ResolveOutcome = (String, u64, Result<ServiceRecord, BackendError>);

/// One discovery scan, owned by the coordinator
pub struct DiscoverySession {
    service_type: String,
    resolve_timeout: Duration,
    backend: Arc<dyn MulticastBackend>,
    records: HashMap<String, ServiceRecord>,
    generations: HashMap<String, u64>,
    state: ScanState,
}

impl DiscoverySession {
    pub(crate) fn new(
        service_type: String,
        backend: Arc<dyn MulticastBackend>,
        resolve_timeout: Duration,
    ) -> Self {
        Self {
            service_type,
            resolve_timeout,
            backend,
            records: HashMap::new(),
            generations: HashMap::new(),
            state: ScanState::Idle,
        }
    }

    /// Canonical service type this scan watches
    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    /// Current lifecycle state
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Run the scan to completion and return the resolved snapshot
    ///
    /// Suspends for the full `window` unless `cancel_rx` flips to true
    /// first. The returned records are all resolved, deduplicated by
    /// instance name and sorted by it. Resolutions still in flight when the
    /// scan closes are dropped with the session.
    pub(crate) async fn run(
        mut self,
        subscription: BrowseSubscription,
        window: Duration,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> Vec<ServiceRecord> {
        let BrowseSubscription { handle, events } = subscription;
        let mut events = events.fuse();
        let mut resolutions: FuturesUnordered<BoxFuture<'static, ResolveOutcome>> =
            FuturesUnordered::new();

        self.transition(ScanState::Browsing);
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    self.transition(ScanState::TimedOut);
                    break;
                }
                _ = cancelled(&mut cancel_rx) => {
                    self.transition(ScanState::Cancelled);
                    break;
                }
                event = events.next(), if !events.is_done() => match event {
                    Some(event) => self.handle_event(event, &mut resolutions),
                    None => {
                        // The scan still waits out its window; in-flight
                        // resolutions may yet complete.
                        log::warn!(
                            "Browse event stream for {} ended before the window closed",
                            self.service_type
                        );
                    }
                },
                Some((name, generation, outcome)) = resolutions.next() => {
                    self.handle_resolution(name, generation, outcome);
                }
            }
        }

        if let Err(e) = self.backend.stop_browse(handle).await {
            log::warn!("Failed to stop browse for {}: {e}", self.service_type);
        }

        let mut snapshot: Vec<ServiceRecord> = self.records.drain().map(|(_, r)| r).collect();
        snapshot.sort_by(|a, b| a.name.cmp(&b.name));

        self.transition(ScanState::Closed);
        log::info!(
            "Scan for {} closed with {} record(s)",
            self.service_type,
            snapshot.len()
        );
        snapshot
    }

    /// Single entry point for browse events
    fn handle_event(
        &mut self,
        event: BrowseEvent,
        resolutions: &mut FuturesUnordered<BoxFuture<'static, ResolveOutcome>>,
    ) {
        match event {
            BrowseEvent::Found { name, service_type } => {
                if service_type != self.service_type {
                    log::trace!(
                        "Ignoring {name}: type {service_type} does not match {}",
                        self.service_type
                    );
                    return;
                }

                let generation = self.bump_generation(&name);
                log::debug!(
                    "Found {name} on {}, resolving (generation {generation})",
                    self.service_type
                );

                let backend = self.backend.clone();
                let target_type = self.service_type.clone();
                let budget = self.resolve_timeout;
                resolutions.push(Box::pin(async move {
                    let outcome =
                        match tokio::time::timeout(budget, backend.resolve(&name, &target_type))
                            .await
                        {
                            Ok(result) => result,
                            Err(_) => Err(BackendError::ResolveTimeout(budget)),
                        };
                    (name, generation, outcome)
                }));
            }
            BrowseEvent::Lost { name } => {
                self.bump_generation(&name);
                if self.records.remove(&name).is_some() {
                    log::debug!("Lost {name}, dropped from result set");
                } else {
                    log::trace!("Lost {name} before it resolved");
                }
            }
        }
    }

    /// Apply a completed resolution, dropping stale and unresolved ones
    fn handle_resolution(
        &mut self,
        name: String,
        generation: u64,
        outcome: Result<ServiceRecord, BackendError>,
    ) {
        if self.generation(&name) != generation {
            log::debug!("Dropping stale resolution for {name}");
            return;
        }

        match outcome {
            Ok(record) if record.is_resolved() => {
                log::debug!("Resolved {record}");
                self.records.insert(name, record);
            }
            Ok(_) => {
                log::debug!("Backend returned {name} without an address, ignoring");
            }
            Err(e) => {
                log::debug!("Resolution for {name} failed: {e}");
            }
        }
    }

    fn bump_generation(&mut self, name: &str) -> u64 {
        let counter = self.generations.entry(name.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    fn generation(&self, name: &str) -> u64 {
        self.generations.get(name).copied().unwrap_or(0)
    }

    fn transition(&mut self, next: ScanState) {
        log::trace!(
            "Scan {}: {} -> {}",
            self.service_type,
            self.state.name(),
            next.name()
        );
        self.state = next;
    }
}

/// Resolves once the cancel flag flips to true
///
/// If the sender goes away without cancelling, parks forever and lets the
/// deadline win.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BrowseHandle, RegistrationHandle};
    use async_trait::async_trait;
    use std::net::IpAddr;

    const TYPE: &str = "_myapp._tcp.local.";

    /// Resolves every instance to 127.0.0.1:9000 after a fixed delay
    struct FixedResolver {
        delay: Duration,
    }

    #[async_trait]
    impl MulticastBackend for FixedResolver {
        async fn register_service(
            &self,
            record: &ServiceRecord,
        ) -> Result<RegistrationHandle, BackendError> {
            Ok(RegistrationHandle::new(record.name.clone()))
        }

        async fn unregister_service(
            &self,
            _handle: RegistrationHandle,
        ) -> Result<(), BackendError> {
            Ok(())
        }

        async fn browse(&self, service_type: &str) -> Result<BrowseSubscription, BackendError> {
            Ok(BrowseSubscription {
                handle: BrowseHandle::new(0, service_type),
                events: futures::stream::pending().boxed(),
            })
        }

        async fn resolve(
            &self,
            name: &str,
            service_type: &str,
        ) -> Result<ServiceRecord, BackendError> {
            tokio::time::sleep(self.delay).await;
            Ok(ServiceRecord::new(name, service_type, 9000)
                .with_host("127.0.0.1".parse::<IpAddr>().unwrap()))
        }

        async fn stop_browse(&self, _handle: BrowseHandle) -> Result<(), BackendError> {
            Ok(())
        }
    }

    fn session(resolve_timeout: Duration) -> DiscoverySession {
        DiscoverySession::new(
            TYPE.to_string(),
            Arc::new(FixedResolver {
                delay: Duration::ZERO,
            }),
            resolve_timeout,
        )
    }

    fn found(name: &str) -> BrowseEvent {
        BrowseEvent::Found {
            name: name.to_string(),
            service_type: TYPE.to_string(),
        }
    }

    fn lost(name: &str) -> BrowseEvent {
        BrowseEvent::Lost {
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_found_resolves_and_inserts() {
        let mut session = session(Duration::from_secs(1));
        let mut resolutions = FuturesUnordered::new();

        session.handle_event(found("printer"), &mut resolutions);
        assert_eq!(resolutions.len(), 1);

        let (name, generation, outcome) = resolutions.next().await.unwrap();
        session.handle_resolution(name, generation, outcome);

        assert_eq!(session.records.len(), 1);
        assert!(session.records["printer"].is_resolved());
    }

    #[tokio::test]
    async fn test_mismatched_type_spawns_no_resolution() {
        let mut session = session(Duration::from_secs(1));
        let mut resolutions = FuturesUnordered::new();

        session.handle_event(
            BrowseEvent::Found {
                name: "printer".to_string(),
                service_type: "_other._tcp.local.".to_string(),
            },
            &mut resolutions,
        );
        assert!(resolutions.is_empty());
    }

    #[tokio::test]
    async fn test_loss_invalidates_inflight_resolution() {
        let mut session = session(Duration::from_secs(1));
        let mut resolutions = FuturesUnordered::new();

        session.handle_event(found("printer"), &mut resolutions);
        let (name, generation, outcome) = resolutions.next().await.unwrap();

        // The instance disappears before its resolution is applied
        session.handle_event(lost("printer"), &mut resolutions);
        session.handle_resolution(name, generation, outcome);

        assert!(session.records.is_empty());
    }

    #[tokio::test]
    async fn test_found_lost_found_keeps_exactly_one() {
        let mut session = session(Duration::from_secs(1));
        let mut resolutions = FuturesUnordered::new();

        session.handle_event(found("printer"), &mut resolutions);
        let first = resolutions.next().await.unwrap();

        session.handle_event(lost("printer"), &mut resolutions);
        session.handle_event(found("printer"), &mut resolutions);
        let second = resolutions.next().await.unwrap();

        // First resolution belongs to the lost incarnation
        session.handle_resolution(first.0, first.1, first.2);
        assert!(session.records.is_empty());

        session.handle_resolution(second.0, second.1, second.2);
        assert_eq!(session.records.len(), 1);
    }

    #[tokio::test]
    async fn test_last_resolution_wins() {
        let mut session = session(Duration::from_secs(1));
        let mut resolutions = FuturesUnordered::new();

        session.handle_event(found("printer"), &mut resolutions);
        let (name, generation, _) = resolutions.next().await.unwrap();
        let earlier = ServiceRecord::new("printer", TYPE, 9000)
            .with_host("10.0.0.1".parse::<IpAddr>().unwrap());
        session.handle_resolution(name, generation, Ok(earlier));

        // Re-announced with a new address
        session.handle_event(found("printer"), &mut resolutions);
        let (name, generation, _) = resolutions.next().await.unwrap();
        let later = ServiceRecord::new("printer", TYPE, 9000)
            .with_host("10.0.0.2".parse::<IpAddr>().unwrap());
        session.handle_resolution(name, generation, Ok(later));

        assert_eq!(session.records.len(), 1);
        assert_eq!(
            session.records["printer"].host,
            Some("10.0.0.2".parse::<IpAddr>().unwrap())
        );
    }

    #[tokio::test]
    async fn test_unresolved_record_never_inserted() {
        let mut session = session(Duration::from_secs(1));
        let mut resolutions = FuturesUnordered::new();

        session.handle_event(found("printer"), &mut resolutions);
        let (name, generation, _) = resolutions.next().await.unwrap();
        session.handle_resolution(name, generation, Ok(ServiceRecord::new("printer", TYPE, 9000)));

        assert!(session.records.is_empty());
    }

    #[tokio::test]
    async fn test_resolution_error_absorbed() {
        let mut session = session(Duration::from_secs(1));
        let mut resolutions = FuturesUnordered::new();

        session.handle_event(found("printer"), &mut resolutions);
        let (name, generation, _) = resolutions.next().await.unwrap();
        session.handle_resolution(
            name,
            generation,
            Err(BackendError::ResolveTimeout(Duration::from_secs(1))),
        );

        assert!(session.records.is_empty());
    }

    #[tokio::test]
    async fn test_run_waits_out_full_window() {
        let session = session(Duration::from_secs(1));
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let events = async_stream::stream! {
            let mut rx = rx;
            while let Some(event) = rx.recv().await {
                yield event;
            }
        }
        .boxed();
        let subscription = BrowseSubscription {
            handle: BrowseHandle::new(0, TYPE),
            events,
        };
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        tx.send(found("printer")).unwrap();

        let window = Duration::from_millis(150);
        let started = tokio::time::Instant::now();
        let records = session.run(subscription, window, cancel_rx).await;

        // The record resolved almost immediately, yet the scan held the
        // caller for the whole window.
        assert!(started.elapsed() >= window);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "printer");
    }

    #[tokio::test]
    async fn test_run_cancel_returns_partial_set_early() {
        let session = session(Duration::from_secs(1));
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let events = async_stream::stream! {
            let mut rx = rx;
            while let Some(event) = rx.recv().await {
                yield event;
            }
        }
        .boxed();
        let subscription = BrowseSubscription {
            handle: BrowseHandle::new(0, TYPE),
            events,
        };
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let scan = tokio::spawn(session.run(subscription, Duration::from_secs(30), cancel_rx));

        tx.send(found("printer")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_tx.send(true).unwrap();

        let records = tokio::time::timeout(Duration::from_secs(1), scan)
            .await
            .expect("cancel did not end the scan")
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_run_sorts_snapshot_by_name() {
        let session = session(Duration::from_secs(1));
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let events = async_stream::stream! {
            let mut rx = rx;
            while let Some(event) = rx.recv().await {
                yield event;
            }
        }
        .boxed();
        let subscription = BrowseSubscription {
            handle: BrowseHandle::new(0, TYPE),
            events,
        };
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        tx.send(found("zebra")).unwrap();
        tx.send(found("alpha")).unwrap();
        tx.send(found("mango")).unwrap();

        let records = session
            .run(subscription, Duration::from_millis(100), cancel_rx)
            .await;
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mango", "zebra"]);
    }
}
