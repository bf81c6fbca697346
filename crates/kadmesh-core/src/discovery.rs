// Copyright (c) 2024-2026 Vanyo Vanev / Tech Art Ltd
// SPDX-License-Identifier: MPL-2.0
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! LAN peer discovery over organization-local multicast.
//!
//! Two packet shapes travel on the wire: the probe atom `"q"` soliciting
//! immediate publication, and an announcement map of service name to
//! opaque payload. One [`DomainPeerDiscovery`] runs per address family;
//! [`PeerDiscovery`] fans every operation out to both.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, error, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::config::DiscoveryConfig;
use crate::msgpack as mp;
use crate::sockaddr::{Family, SockAddr};

/// IPv4 multicast group (organization-local scope).
pub const MULTICAST_ADDR_V4: Ipv4Addr = Ipv4Addr::new(239, 192, 0, 1);
/// IPv6 multicast group (organization-local scope).
pub const MULTICAST_ADDR_V6: Ipv6Addr = Ipv6Addr::new(0xff08, 0, 0, 0, 0, 0, 0, 0x101);

/// The single-atom datagram soliciting announcements.
const PROBE: &str = "q";
/// Largest datagram the listener accepts.
const RECV_BUF_SIZE: usize = 64 * 1024;

const BACKOFF_PERIOD: Duration = Duration::from_secs(10);
const BACKOFF_PERIOD_MAX: Duration = Duration::from_secs(60);

/// Invoked on the I/O runtime for every matching advertisement, with the
/// entry's payload and the sender's endpoint.
pub type ServiceDiscoveredCallback = Arc<dyn Fn(mp::Value, SockAddr) + Send + Sync>;

/// Ready-made advertisement payload for a DHT node: enough for a peer to
/// connect back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAdvert {
    /// Raw 160-bit node id.
    #[serde(with = "serde_bytes")]
    pub node_id: Vec<u8>,
    /// Transport port the node listens on.
    pub port: u16,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct DiscoveryState {
    callbacks: HashMap<String, ServiceDiscoveredCallback>,
    running: bool,
}

struct PublishState {
    messages: BTreeMap<String, Vec<u8>>,
    /// Serialized announcement, rebuilt on every registry mutation.
    packed: Vec<u8>,
    running: bool,
}

struct BackoffState {
    period: Duration,
    timer: Option<JoinHandle<()>>,
}

struct ListenerState {
    armed: bool,
    task: Option<JoinHandle<()>>,
}

/// Serialize the advertisement registry as one announcement datagram: a
/// map of service name to pre-encoded payload, streamed so each payload's
/// bytes land verbatim.
pub(crate) fn build_announcement(messages: &BTreeMap<String, Vec<u8>>) -> Vec<u8> {
    let mut buf = Vec::new();
    if rmp::encode::write_map_len(&mut buf, messages.len() as u32).is_err() {
        return buf;
    }
    for (name, payload) in messages {
        let _ = rmp::encode::write_str(&mut buf, name);
        buf.extend_from_slice(payload);
    }
    buf
}

/// Reuse-address socket joined to the family's multicast group and bound
/// to `(any, port)`.
fn make_multicast_socket(family: Family, port: u16, handle: &Handle) -> io::Result<UdpSocket> {
    use socket2::{Domain, Protocol, Socket, Type};

    let (domain, bind_ip): (Domain, IpAddr) = match family {
        Family::Ipv4 => (Domain::IPV4, IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
        Family::Ipv6 => (Domain::IPV6, IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    match family {
        Family::Ipv4 => socket.join_multicast_v4(&MULTICAST_ADDR_V4, &Ipv4Addr::UNSPECIFIED)?,
        Family::Ipv6 => {
            socket.set_only_v6(true)?;
            socket.join_multicast_v6(&MULTICAST_ADDR_V6, 0)?;
        }
    }
    socket.bind(&SocketAddr::new(bind_ip, port).into())?;
    socket.set_nonblocking(true)?;

    let _guard = handle.enter();
    UdpSocket::from_std(socket.into())
}

/// Discovery endpoint for one address family.
struct DomainPeerDiscovery {
    handle: Handle,
    socket: Arc<UdpSocket>,
    /// Multicast destination for this family.
    send_addr: SocketAddr,
    discovery: Mutex<DiscoveryState>,
    publish: Mutex<PublishState>,
    backoff: Mutex<BackoffState>,
    listener: Mutex<ListenerState>,
}

impl DomainPeerDiscovery {
    fn new(family: Family, port: u16, handle: Handle) -> io::Result<Arc<Self>> {
        let socket = make_multicast_socket(family, port, &handle)?;
        let group = match family {
            Family::Ipv4 => IpAddr::V4(MULTICAST_ADDR_V4),
            Family::Ipv6 => IpAddr::V6(MULTICAST_ADDR_V6),
        };
        Ok(Arc::new(Self {
            handle,
            socket: Arc::new(socket),
            send_addr: SocketAddr::new(group, port),
            discovery: Mutex::new(DiscoveryState { callbacks: HashMap::new(), running: false }),
            publish: Mutex::new(PublishState {
                messages: BTreeMap::new(),
                packed: Vec::new(),
                running: false,
            }),
            backoff: Mutex::new(BackoffState { period: BACKOFF_PERIOD, timer: None }),
            listener: Mutex::new(ListenerState { armed: false, task: None }),
        }))
    }

    fn start_discovery(self: &Arc<Self>, name: &str, callback: ServiceDiscoveredCallback) {
        {
            let mut state = lock(&self.discovery);
            state.callbacks.insert(name.to_owned(), callback);
            state.running = true;
        }
        self.ensure_listening();
        self.query(self.send_addr);
    }

    fn start_publish(self: &Arc<Self>, name: &str, payload: Vec<u8>) {
        {
            let mut state = lock(&self.publish);
            state.messages.insert(name.to_owned(), payload);
            state.packed = build_announcement(&state.messages);
            state.running = true;
        }
        self.ensure_listening();
        self.publish_to(self.send_addr);
    }

    fn stop_discovery(&self, name: &str) -> bool {
        let mut state = lock(&self.discovery);
        if state.callbacks.remove(name).is_none() {
            return false;
        }
        if state.callbacks.is_empty() {
            state.running = false;
        }
        true
    }

    fn stop_publish(&self, name: &str) -> bool {
        let mut state = lock(&self.publish);
        if state.messages.remove(name).is_none() {
            return false;
        }
        if state.messages.is_empty() {
            state.running = false;
        } else {
            state.packed = build_announcement(&state.messages);
        }
        true
    }

    fn stop(&self) {
        lock(&self.discovery).running = false;
        lock(&self.publish).running = false;
    }

    /// Arm the receive loop if it is not already running. Listening serves
    /// both sides: advertisement dispatch and probe replies.
    fn ensure_listening(self: &Arc<Self>) {
        let mut listener = lock(&self.listener);
        if listener.armed {
            return;
        }
        listener.armed = true;
        let this = Arc::clone(self);
        listener.task = Some(self.handle.spawn(async move { this.listen_loop().await }));
    }

    async fn listen_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; RECV_BUF_SIZE];
        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, from)) => self.handle_packet(&buf[..len], from),
                Err(err) => {
                    // Transient by nature on UDP; keep the loop alive.
                    error!("discovery receive failed: {err}");
                }
            }
        }
    }

    fn handle_packet(&self, bytes: &[u8], from: SocketAddr) {
        let value = match mp::read_value(bytes) {
            Ok(value) => value,
            Err(err) => {
                warn!("dropping undecodable discovery packet from {from}: {err}");
                return;
            }
        };
        match value {
            mp::Value::String(atom) if atom.as_str() == Some(PROBE) => {
                self.publish_to(from);
            }
            mp::Value::Map(entries) => {
                for (key, payload) in entries {
                    let Some(name) = key.as_str() else { continue };
                    // Copy the handle out so the callback runs without the
                    // registry lock held; a concurrently removed entry is
                    // simply not invoked.
                    let callback = {
                        let state = lock(&self.discovery);
                        if !state.running {
                            return;
                        }
                        state.callbacks.get(name).cloned()
                    };
                    if let Some(callback) = callback {
                        callback(payload, SockAddr::from(from));
                    }
                }
            }
            _ => warn!("dropping discovery packet with unexpected shape from {from}"),
        }
    }

    /// Solicit announcements from `peer` (usually the multicast group).
    fn query(&self, peer: SocketAddr) {
        if !lock(&self.discovery).running {
            return;
        }
        let mut probe = Vec::new();
        if rmp::encode::write_str(&mut probe, PROBE).is_ok() {
            self.send(probe, peer);
        }
    }

    /// Send the cached announcement to `peer` if publishing is active.
    fn publish_to(&self, peer: SocketAddr) {
        let packed = {
            let state = lock(&self.publish);
            if !state.running || state.packed.is_empty() {
                return;
            }
            state.packed.clone()
        };
        self.send(packed, peer);
    }

    /// Fire-and-forget datagram send with an error-reporting completion.
    fn send(&self, bytes: Vec<u8>, peer: SocketAddr) {
        let socket = Arc::clone(&self.socket);
        self.handle.spawn(async move {
            if let Err(err) = socket.send_to(&bytes, peer).await {
                warn!("failed to send discovery packet to {peer}: {err}");
            }
        });
    }

    /// Re-join the multicast group after a connectivity change. Failure is
    /// expected when the membership survived; log and carry on.
    fn re_join(&self) {
        let result = match self.send_addr.ip() {
            IpAddr::V4(group) => self.socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(group) => self.socket.join_multicast_v6(&group, 0),
        };
        if let Err(err) = result {
            warn!("cannot re-join multicast group {}: {err}", self.send_addr.ip());
        }
    }

    /// Rejoin, probe and re-announce, then schedule a recursive
    /// re-announcement. The delay starts at 10 s and doubles up to 60 s;
    /// a call arriving at the cap resets the ladder instead.
    fn connectivity_changed(self: &Arc<Self>) {
        debug!("peer discovery: connectivity changed");
        self.re_join();
        self.query(self.send_addr);
        self.publish_to(self.send_addr);

        let mut backoff = lock(&self.backoff);
        if backoff.period >= BACKOFF_PERIOD_MAX {
            backoff.period = BACKOFF_PERIOD;
        } else {
            let delay = backoff.period;
            let this = Arc::clone(self);
            if let Some(previous) = backoff.timer.take() {
                previous.abort();
            }
            backoff.timer = Some(self.handle.spawn(async move {
                tokio::time::sleep(delay).await;
                this.connectivity_changed();
            }));
            backoff.period = (backoff.period * 2).min(BACKOFF_PERIOD_MAX);
        }
    }

    fn stop_connectivity_changed(&self) {
        let mut backoff = lock(&self.backoff);
        if let Some(timer) = backoff.timer.take() {
            timer.abort();
        }
        backoff.period = BACKOFF_PERIOD;
    }

    fn shutdown(&self) {
        self.stop();
        self.stop_connectivity_changed();
        if let Some(task) = lock(&self.listener).task.take() {
            task.abort();
        }
    }

    #[cfg(test)]
    fn backoff_period(&self) -> Duration {
        lock(&self.backoff).period
    }
}

/// Ownership of the I/O runtime driving the discovery sockets.
enum IoRuntime {
    /// Created by the service, shut down when the service is dropped.
    Owned(Runtime),
    /// Supplied by the caller, never stopped by the service.
    Borrowed(Handle),
}

impl IoRuntime {
    fn handle(&self) -> Handle {
        match self {
            IoRuntime::Owned(runtime) => runtime.handle().clone(),
            IoRuntime::Borrowed(handle) => handle.clone(),
        }
    }
}

/// Dual-stack LAN peer discovery.
///
/// A family whose socket cannot be set up (no interface, no multicast
/// route) is disabled with a log line; the service stays usable as long as
/// one family is up.
pub struct PeerDiscovery {
    io: Option<IoRuntime>,
    v4: Option<Arc<DomainPeerDiscovery>>,
    v6: Option<Arc<DomainPeerDiscovery>>,
}

impl PeerDiscovery {
    /// Service with its own single-threaded I/O runtime.
    pub fn new(config: DiscoveryConfig) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("kadmesh-discovery")
            .enable_all()
            .build()?;
        Ok(Self::build(IoRuntime::Owned(runtime), config.port))
    }

    /// Service driven by the caller's runtime.
    pub fn with_handle(config: DiscoveryConfig, handle: Handle) -> Self {
        Self::build(IoRuntime::Borrowed(handle), config.port)
    }

    fn build(io: IoRuntime, port: u16) -> Self {
        let handle = io.handle();
        let v4 = match DomainPeerDiscovery::new(Family::Ipv4, port, handle.clone()) {
            Ok(domain) => Some(domain),
            Err(err) => {
                error!("cannot start IPv4 peer discovery: {err}");
                None
            }
        };
        let v6 = match DomainPeerDiscovery::new(Family::Ipv6, port, handle) {
            Ok(domain) => Some(domain),
            Err(err) => {
                error!("cannot start IPv6 peer discovery: {err}");
                None
            }
        };
        Self { io: Some(io), v4, v6 }
    }

    fn domains(&self) -> impl Iterator<Item = &Arc<DomainPeerDiscovery>> + '_ {
        self.v4.iter().chain(self.v6.iter())
    }

    /// Register (or replace) the listener for `name` and start listening.
    /// An initial probe is multicast to solicit announcements.
    pub fn start_discovery<F>(&self, name: &str, callback: F)
    where
        F: Fn(mp::Value, SockAddr) + Send + Sync + 'static,
    {
        let callback: ServiceDiscoveredCallback = Arc::new(callback);
        for domain in self.domains() {
            domain.start_discovery(name, Arc::clone(&callback));
        }
    }

    /// [`start_discovery`](Self::start_discovery) with the payload decoded
    /// into `T`; payloads that do not fit are logged and dropped.
    pub fn start_discovery_typed<T, F>(&self, name: &str, callback: F)
    where
        T: DeserializeOwned,
        F: Fn(T, SockAddr) + Send + Sync + 'static,
    {
        let service = name.to_owned();
        self.start_discovery(name, move |payload, from| match mp::from_value::<T>(payload) {
            Ok(decoded) => callback(decoded, from),
            Err(err) => warn!("dropping malformed {service} advertisement: {err}"),
        });
    }

    /// Store `payload` under `name` and announce immediately on both
    /// families.
    pub fn start_publish(&self, name: &str, payload: Vec<u8>) {
        for domain in self.domains() {
            domain.start_publish(name, payload.clone());
        }
    }

    /// [`start_publish`](Self::start_publish) restricted to one family.
    pub fn start_publish_family(&self, family: Family, name: &str, payload: Vec<u8>) {
        let domain = match family {
            Family::Ipv4 => &self.v4,
            Family::Ipv6 => &self.v6,
        };
        if let Some(domain) = domain {
            domain.start_publish(name, payload);
        }
    }

    /// [`start_publish`](Self::start_publish) with a serialized payload.
    pub fn start_publish_typed<T: Serialize>(&self, name: &str, payload: &T) -> anyhow::Result<()> {
        let bytes = mp::to_vec(payload)?;
        self.start_publish(name, bytes);
        Ok(())
    }

    /// Unregister `name`'s listener. True iff it was registered on any
    /// family.
    pub fn stop_discovery(&self, name: &str) -> bool {
        self.domains().fold(false, |stopped, domain| domain.stop_discovery(name) || stopped)
    }

    /// Withdraw `name`'s advertisement. True iff it was published on any
    /// family.
    pub fn stop_publish(&self, name: &str) -> bool {
        self.domains().fold(false, |stopped, domain| domain.stop_publish(name) || stopped)
    }

    pub fn stop_publish_family(&self, family: Family, name: &str) -> bool {
        let domain = match family {
            Family::Ipv4 => &self.v4,
            Family::Ipv6 => &self.v6,
        };
        domain.as_ref().map(|domain| domain.stop_publish(name)).unwrap_or(false)
    }

    /// Mark both sides idle; pending asynchronous operations unwind.
    pub fn stop(&self) {
        for domain in self.domains() {
            domain.stop();
        }
    }

    /// Rejoin the multicast groups, re-probe and re-announce, and schedule
    /// re-announcements with a growing delay.
    pub fn connectivity_changed(&self) {
        for domain in self.domains() {
            domain.connectivity_changed();
        }
    }

    /// Cancel scheduled re-announcements and reset the backoff ladder.
    pub fn stop_connectivity_changed(&self) {
        for domain in self.domains() {
            domain.stop_connectivity_changed();
        }
    }
}

impl Drop for PeerDiscovery {
    fn drop(&mut self) {
        for domain in self.v4.iter().chain(self.v6.iter()) {
            domain.shutdown();
        }
        if let Some(IoRuntime::Owned(runtime)) = self.io.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    fn payload_bytes(n: u32) -> Vec<u8> {
        mp::write_value(&mp::Value::from(n)).expect("encode payload")
    }

    #[test]
    fn announcement_matches_registry() {
        let mut registry = BTreeMap::new();
        registry.insert("dht".to_owned(), payload_bytes(7));
        registry.insert("proxy".to_owned(), payload_bytes(9));

        let packed = build_announcement(&registry);
        let decoded = mp::read_value(&packed).expect("announcement decodes");
        let mp::Value::Map(entries) = &decoded else {
            panic!("announcement must be a map");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(mp::find_map_value(&decoded, "dht"), Some(&mp::Value::from(7u32)));
        assert_eq!(mp::find_map_value(&decoded, "proxy"), Some(&mp::Value::from(9u32)));

        registry.remove("proxy");
        let repacked = build_announcement(&registry);
        let decoded = mp::read_value(&repacked).expect("announcement decodes");
        assert_eq!(mp::find_map_value(&decoded, "proxy"), None);
        assert_eq!(mp::find_map_value(&decoded, "dht"), Some(&mp::Value::from(7u32)));
    }

    #[test]
    fn node_advert_roundtrip() {
        let advert = NodeAdvert { node_id: vec![0x42; 20], port: 4222 };
        let bytes = mp::to_vec(&advert).expect("encode advert");
        let value = mp::read_value(&bytes).expect("reread advert");
        let back: NodeAdvert = mp::from_value(value).expect("decode advert");
        assert_eq!(back, advert);
    }

    #[tokio::test]
    async fn probe_solicits_unicast_announcement() {
        let service = PeerDiscovery::with_handle(DiscoveryConfig { port: 28851 }, Handle::current());
        if service.v4.is_none() {
            eprintln!("skipping: no multicast-capable IPv4 interface");
            return;
        }
        service.start_publish("svc", payload_bytes(7));

        let prober = UdpSocket::bind("127.0.0.1:0").await.expect("bind prober");
        prober.send_to(&[0xa1, b'q'], ("127.0.0.1", 28851)).await.expect("send probe");

        let mut buf = [0u8; 1024];
        let (len, _) = timeout(RECV_TIMEOUT, prober.recv_from(&mut buf))
            .await
            .expect("announcement within timeout")
            .expect("receive announcement");
        let decoded = mp::read_value(&buf[..len]).expect("announcement decodes");
        assert_eq!(mp::find_map_value(&decoded, "svc"), Some(&mp::Value::from(7u32)));
    }

    #[tokio::test]
    async fn announcement_dispatches_to_callback() {
        let service = PeerDiscovery::with_handle(DiscoveryConfig { port: 28852 }, Handle::current());
        if service.v4.is_none() {
            eprintln!("skipping: no multicast-capable IPv4 interface");
            return;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        service.start_discovery_typed::<NodeAdvert, _>("svc", move |advert, from| {
            let _ = tx.send((advert, from));
        });

        let advert = NodeAdvert { node_id: vec![0x11; 20], port: 4222 };
        let mut registry = BTreeMap::new();
        registry.insert("svc".to_owned(), mp::to_vec(&advert).expect("encode advert"));
        registry.insert("other".to_owned(), payload_bytes(1));
        let announcement = build_announcement(&registry);

        let sender = UdpSocket::bind("127.0.0.1:0").await.expect("bind sender");
        sender
            .send_to(&announcement, ("127.0.0.1", 28852))
            .await
            .expect("send announcement");

        let (received, from) = timeout(RECV_TIMEOUT, rx.recv())
            .await
            .expect("callback within timeout")
            .expect("callback fired");
        assert_eq!(received, advert);
        assert_eq!(from.family(), Some(Family::Ipv4));
        // the unmatched "other" entry must not fire anything
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn registration_state_reported_by_stop_calls() {
        let service = PeerDiscovery::with_handle(DiscoveryConfig { port: 28853 }, Handle::current());
        if service.v4.is_none() && service.v6.is_none() {
            eprintln!("skipping: no multicast-capable interface");
            return;
        }

        service.start_discovery("a", |_, _| {});
        assert!(service.stop_discovery("a"));
        assert!(!service.stop_discovery("a"));
        assert!(!service.stop_discovery("never-registered"));

        service.start_publish("b", payload_bytes(1));
        assert!(service.stop_publish("b"));
        assert!(!service.stop_publish("b"));
    }

    #[tokio::test]
    async fn connectivity_backoff_ladder() {
        let domain = match DomainPeerDiscovery::new(Family::Ipv4, 28854, Handle::current()) {
            Ok(domain) => domain,
            Err(err) => {
                eprintln!("skipping: {err}");
                return;
            }
        };

        assert_eq!(domain.backoff_period(), Duration::from_secs(10));
        domain.connectivity_changed();
        assert_eq!(domain.backoff_period(), Duration::from_secs(20));
        domain.connectivity_changed();
        assert_eq!(domain.backoff_period(), Duration::from_secs(40));
        domain.connectivity_changed();
        assert_eq!(domain.backoff_period(), Duration::from_secs(60));
        // at the cap, a further change resets the ladder
        domain.connectivity_changed();
        assert_eq!(domain.backoff_period(), Duration::from_secs(10));

        domain.connectivity_changed();
        assert_eq!(domain.backoff_period(), Duration::from_secs(20));
        domain.stop_connectivity_changed();
        assert_eq!(domain.backoff_period(), Duration::from_secs(10));

        domain.shutdown();
    }

    #[test]
    fn owned_runtime_service_starts_and_drops() {
        let service = match PeerDiscovery::new(DiscoveryConfig { port: 28856 }) {
            Ok(service) => service,
            Err(err) => {
                eprintln!("skipping: {err}");
                return;
            }
        };
        service.start_publish("svc", payload_bytes(3));
        service.stop();
        drop(service);
    }

    #[tokio::test]
    async fn publish_registry_survives_partial_stop() {
        let domain = match DomainPeerDiscovery::new(Family::Ipv4, 28855, Handle::current()) {
            Ok(domain) => domain,
            Err(err) => {
                eprintln!("skipping: {err}");
                return;
            }
        };

        domain.start_publish("a", payload_bytes(1));
        domain.start_publish("b", payload_bytes(2));
        assert!(domain.stop_publish("a"));

        let packed = lock(&domain.publish).packed.clone();
        let decoded = mp::read_value(&packed).expect("announcement decodes");
        assert_eq!(mp::find_map_value(&decoded, "a"), None);
        assert_eq!(mp::find_map_value(&decoded, "b"), Some(&mp::Value::from(2u32)));
        assert!(lock(&domain.publish).running);

        assert!(domain.stop_publish("b"));
        assert!(!lock(&domain.publish).running);

        domain.shutdown();
    }
}
