//! Loopback medium — an in-process stand-in for the wireless-discovery stack.
//!
//! Several [`LoopbackDevice`]s share one [`LoopbackMedium`]. A device publishing
//! a service is discovered by every other device subscribed to the same
//! service name, and a subscriber can then request a network to it. Service
//! names are matched by BLAKE3 hash, as the radio would match them by their
//! truncated hash on air.
//!
//! Every callback is delivered through the caller's event channel, never
//! re-entrantly, so the coordinator sees the same asynchrony it would on a
//! real radio.

use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use nearby_core::wire::{service_hash, ServiceHash};

use crate::connection::{AttemptId, ConnectionError};
use crate::service::{
    AttachError, AttachHandle, DiscoveryEvent, DiscoveryEvents, DiscoveryService,
    DiscoverySessionRef, NetworkEvent, NetworkEvents, NetworkInfo, NetworkNegotiator,
    NetworkRequest, NetworkSpecifier, PeerHandle, PublishConfig, PublishError, SubscribeConfig,
    SubscribeError,
};

const INTERFACE: &str = "nan0";

type DeviceId = u64;

// ── Medium state ──────────────────────────────────────────────────────────────

enum SessionKind {
    Publisher {
        info: Bytes,
    },
    Subscriber {
        /// publisher session → handle issued to this subscriber for it.
        peers: HashMap<DiscoverySessionRef, PeerHandle>,
        next_peer: u32,
    },
}

struct Session {
    device: DeviceId,
    attach: AttachHandle,
    service: ServiceHash,
    events: DiscoveryEvents,
    kind: SessionKind,
}

struct Network {
    /// The requesting (subscriber) session.
    session: DiscoverySessionRef,
    /// The publisher the network goes to. None if it never came up.
    publisher: Option<DiscoverySessionRef>,
    attempt: AttemptId,
    events: NetworkEvents,
}

#[derive(Default)]
struct MediumState {
    next_token: u64,
    /// attach handle → owning device.
    attachments: HashMap<AttachHandle, DeviceId>,
    sessions: HashMap<DiscoverySessionRef, Session>,
    networks: HashMap<NetworkRequest, Network>,
}

impl MediumState {
    fn token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn device_of(&self, attach: AttachHandle, device: DeviceId) -> bool {
        self.attachments
            .get(&attach)
            .is_some_and(|owner| *owner == device)
    }

    /// Tell a subscriber about a publisher, once.
    fn announce(&mut self, subscriber: DiscoverySessionRef, publisher: DiscoverySessionRef) {
        let info = match self.sessions.get(&publisher) {
            Some(Session {
                kind: SessionKind::Publisher { info },
                ..
            }) => info.clone(),
            _ => return,
        };
        let Some(session) = self.sessions.get_mut(&subscriber) else {
            return;
        };
        let SessionKind::Subscriber { peers, next_peer } = &mut session.kind else {
            return;
        };
        if peers.contains_key(&publisher) {
            return;
        }
        *next_peer += 1;
        let peer = PeerHandle::from_raw(*next_peer);
        peers.insert(publisher, peer);
        let _ = session.events.send(DiscoveryEvent::ServiceDiscovered {
            session: subscriber,
            peer,
            info,
        });
    }

    /// Drop a session and report every live network through it as lost.
    fn remove_session(&mut self, session: DiscoverySessionRef) {
        if self.sessions.remove(&session).is_none() {
            return;
        }
        let affected: Vec<NetworkRequest> = self
            .networks
            .iter()
            .filter(|(_, n)| n.session == session || n.publisher == Some(session))
            .map(|(r, _)| *r)
            .collect();
        for request in affected {
            self.drop_network(request);
        }
    }

    fn drop_network(&mut self, request: NetworkRequest) {
        let Some(network) = self.networks.remove(&request) else {
            return;
        };
        if network.publisher.is_some() {
            tracing::debug!(%request, attempt = %network.attempt, "loopback network lost");
            let _ = network.events.send((network.attempt, NetworkEvent::Lost));
        }
    }
}

/// The shared air between loopback devices.
#[derive(Default)]
pub struct LoopbackMedium {
    state: Mutex<MediumState>,
    next_device: AtomicU64,
}

impl LoopbackMedium {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A new radio on this medium.
    pub fn device(self: &Arc<Self>, name: &str) -> Arc<LoopbackDevice> {
        let id = self.next_device.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(device = id, name, "loopback device joined");
        Arc::new(LoopbackDevice {
            id,
            name: name.to_string(),
            medium: Arc::clone(self),
            available: AtomicBool::new(true),
            deny_attach: AtomicBool::new(false),
            reject_configs: AtomicBool::new(false),
            fail_configs: AtomicBool::new(false),
        })
    }

    /// Open discovery sessions across every device.
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Requested networks, live or not, across every device.
    pub fn network_count(&self) -> usize {
        self.lock().networks.len()
    }

    fn lock(&self) -> MutexGuard<'_, MediumState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Device ────────────────────────────────────────────────────────────────────

/// One radio on a [`LoopbackMedium`].
pub struct LoopbackDevice {
    id: DeviceId,
    name: String,
    medium: Arc<LoopbackMedium>,
    available: AtomicBool,
    deny_attach: AtomicBool,
    reject_configs: AtomicBool,
    fail_configs: AtomicBool,
}

impl LoopbackDevice {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Link-local address other devices reach this one at.
    pub fn addr(&self) -> Ipv6Addr {
        link_local(self.id)
    }

    /// Attach requests complete with `AttachFailed` while set.
    pub fn set_deny_attach(&self, deny: bool) {
        self.deny_attach.store(deny, Ordering::Relaxed);
    }

    /// Publish/subscribe calls are refused synchronously while set.
    pub fn set_reject_configs(&self, reject: bool) {
        self.reject_configs.store(reject, Ordering::Relaxed);
    }

    /// Publish/subscribe calls are accepted, then fail with
    /// `SessionConfigFailed`, while set.
    pub fn set_fail_configs(&self, fail: bool) {
        self.fail_configs.store(fail, Ordering::Relaxed);
    }

    /// Switch the radio off. Every session it holds is terminated by the
    /// service and every attachment released.
    pub fn power_off(&self) {
        self.available.store(false, Ordering::Relaxed);
        let mut st = self.medium.lock();
        let sessions: Vec<DiscoverySessionRef> = st
            .sessions
            .iter()
            .filter(|(_, s)| s.device == self.id)
            .map(|(r, _)| *r)
            .collect();
        for session in sessions {
            terminate_locked(&mut st, session);
        }
        st.attachments.retain(|_, owner| *owner != self.id);
        tracing::info!(device = %self.name, "loopback radio off");
    }

    pub fn power_on(&self) {
        self.available.store(true, Ordering::Relaxed);
    }

    /// End one session from the service side.
    pub fn terminate(&self, session: DiscoverySessionRef) {
        let mut st = self.medium.lock();
        if st.sessions.get(&session).is_some_and(|s| s.device == self.id) {
            terminate_locked(&mut st, session);
        }
    }

    /// Open a session. `Ok(None)` means the config was accepted and then
    /// failed asynchronously.
    fn open_session(
        &self,
        attach: AttachHandle,
        service_name: &str,
        events: DiscoveryEvents,
        kind: SessionKind,
    ) -> Result<Option<DiscoverySessionRef>, String> {
        if self.reject_configs.load(Ordering::Relaxed) {
            return Err("configuration rejected".into());
        }
        let mut st = self.medium.lock();
        if !st.device_of(attach, self.id) {
            return Err(format!("unknown {attach}"));
        }
        if self.fail_configs.load(Ordering::Relaxed) {
            let _ = events.send(DiscoveryEvent::SessionConfigFailed(
                "session configuration failed".into(),
            ));
            return Ok(None);
        }

        let session = DiscoverySessionRef::from_raw(st.token());
        let service = service_hash(service_name);
        tracing::trace!(%session, service = %hex::encode(&service[..6]), "loopback session opened");
        let started = match kind {
            SessionKind::Publisher { .. } => DiscoveryEvent::PublishStarted(session),
            SessionKind::Subscriber { .. } => DiscoveryEvent::SubscribeStarted(session),
        };
        // Started must reach the owner before any match it takes part in.
        let _ = events.send(started);
        st.sessions.insert(
            session,
            Session {
                device: self.id,
                attach,
                service,
                events,
                kind,
            },
        );
        Ok(Some(session))
    }
}

fn terminate_locked(st: &mut MediumState, session: DiscoverySessionRef) {
    if let Some(s) = st.sessions.get(&session) {
        let _ = s.events.send(DiscoveryEvent::SessionTerminated(session));
    }
    st.remove_session(session);
}

fn link_local(device: DeviceId) -> Ipv6Addr {
    Ipv6Addr::new(
        0xfe80,
        0,
        0,
        0,
        0,
        0,
        (device >> 16) as u16,
        device as u16,
    )
}

/// Matching sessions of the opposite kind on other devices.
fn counterparts(
    st: &MediumState,
    device: DeviceId,
    service: ServiceHash,
    publishers: bool,
) -> Vec<DiscoverySessionRef> {
    let mut found: Vec<DiscoverySessionRef> = st
        .sessions
        .iter()
        .filter(|(_, s)| s.device != device && s.service == service)
        .filter(|(_, s)| matches!(s.kind, SessionKind::Publisher { .. }) == publishers)
        .map(|(r, _)| *r)
        .collect();
    found.sort_by_key(|r| r.raw());
    found
}

impl DiscoveryService for LoopbackDevice {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    fn attach(&self, events: DiscoveryEvents) -> Result<(), AttachError> {
        if !self.is_available() {
            return Err(AttachError::Unavailable);
        }
        if self.deny_attach.load(Ordering::Relaxed) {
            let _ = events.send(DiscoveryEvent::AttachFailed("attach refused".into()));
            return Ok(());
        }

        let mut st = self.medium.lock();
        let attach = AttachHandle::from_raw(st.token());
        let _ = events.send(DiscoveryEvent::Attached(attach));
        st.attachments.insert(attach, self.id);
        tracing::debug!(device = %self.name, %attach, "loopback attached");
        Ok(())
    }

    fn publish(
        &self,
        attach: AttachHandle,
        config: PublishConfig,
        events: DiscoveryEvents,
    ) -> Result<(), PublishError> {
        let kind = SessionKind::Publisher {
            info: config.service_info,
        };
        let session = match self.open_session(attach, &config.service_name, events, kind) {
            Ok(Some(session)) => session,
            Ok(None) => return Ok(()),
            Err(reason) => return Err(PublishError::ConfigRejected(reason)),
        };

        let mut st = self.medium.lock();
        let service = service_hash(&config.service_name);
        for subscriber in counterparts(&st, self.id, service, false) {
            st.announce(subscriber, session);
        }
        tracing::debug!(device = %self.name, %session, service = %config.service_name, "loopback publishing");
        Ok(())
    }

    fn subscribe(
        &self,
        attach: AttachHandle,
        config: SubscribeConfig,
        events: DiscoveryEvents,
    ) -> Result<(), SubscribeError> {
        let kind = SessionKind::Subscriber {
            peers: HashMap::new(),
            next_peer: 0,
        };
        let session = match self.open_session(attach, &config.service_name, events, kind) {
            Ok(Some(session)) => session,
            Ok(None) => return Ok(()),
            Err(reason) => return Err(SubscribeError::ConfigRejected(reason)),
        };

        let mut st = self.medium.lock();
        let service = service_hash(&config.service_name);
        for publisher in counterparts(&st, self.id, service, true) {
            st.announce(session, publisher);
        }
        tracing::debug!(device = %self.name, %session, service = %config.service_name, "loopback subscribing");
        Ok(())
    }

    fn close(&self, session: DiscoverySessionRef) {
        let mut st = self.medium.lock();
        if st.sessions.get(&session).is_some_and(|s| s.device == self.id) {
            st.remove_session(session);
        }
    }

    fn detach(&self, attach: AttachHandle) {
        let mut st = self.medium.lock();
        if !st.device_of(attach, self.id) {
            return;
        }
        let sessions: Vec<DiscoverySessionRef> = st
            .sessions
            .iter()
            .filter(|(_, s)| s.attach == attach)
            .map(|(r, _)| *r)
            .collect();
        for session in sessions {
            st.remove_session(session);
        }
        st.attachments.remove(&attach);
    }
}

impl NetworkNegotiator for LoopbackDevice {
    fn request_network(
        &self,
        target: NetworkSpecifier,
        attempt: AttemptId,
        events: NetworkEvents,
    ) -> Result<NetworkRequest, ConnectionError> {
        if !self.is_available() {
            return Err(ConnectionError::Unavailable("radio is off".into()));
        }

        let mut st = self.medium.lock();
        let own = st
            .sessions
            .get(&target.session)
            .filter(|s| s.device == self.id)
            .ok_or_else(|| ConnectionError::Unavailable(format!("unknown {}", target.session)))?;

        let publisher = match &own.kind {
            SessionKind::Subscriber { peers, .. } => peers
                .iter()
                .find(|(_, handle)| **handle == target.peer)
                .map(|(publisher, _)| *publisher),
            SessionKind::Publisher { .. } => None,
        }
        .filter(|publisher| st.sessions.contains_key(publisher));

        let request = NetworkRequest::from_raw(st.token());
        match publisher.and_then(|p| st.sessions.get(&p).map(|s| s.device)) {
            Some(device) => {
                let info = NetworkInfo {
                    interface: INTERFACE.to_string(),
                    peer_addr: link_local(device),
                };
                let _ = events.send((attempt, NetworkEvent::Available(info)));
            }
            None => {
                let _ = events.send((attempt, NetworkEvent::Unavailable));
            }
        }
        // A request that never came up is released as soon as the owner sees
        // Unavailable; keep it until then so release stays symmetric.
        st.networks.insert(
            request,
            Network {
                session: target.session,
                publisher,
                attempt,
                events,
            },
        );
        tracing::debug!(device = %self.name, %request, %attempt, up = publisher.is_some(), "loopback network requested");
        Ok(request)
    }

    fn release(&self, request: NetworkRequest) {
        self.medium.lock().drop_network(request);
    }
}
