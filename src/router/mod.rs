//! The router actor: owns all connection state and applies the MAVLink
//! routing rules.
//!
//! A single thread consumes a bounded event channel. Transport workers,
//! subscription calls and reconnect cycles only enqueue events; every
//! mutation of the connection map, the route table and the subscription set
//! happens on the router thread, so routing state needs no locks.
//!
//! Routing policy for a validated frame received on connection `src`:
//!
//! 1. If `src` is not local, learn `(source_system, source_component) ->
//!    src` in the route table (last writer wins).
//! 2. Broadcast frames go to every connection except `src`, plus the local
//!    connection (subscribers hear everything; locally originated
//!    broadcasts echo locally unless `echo_local_broadcast` is off).
//! 3. Targeted frames go to every connection with a matching learned route
//!    (zero target fields are wildcards), plus the local connection. The
//!    source is *not* excluded: targeting is address-based.
//! 4. Frames from the router's own address that reach nobody but the local
//!    connection are logged as unreachable at debug level.

pub mod local;
pub mod routes;
pub mod subscription;

use crate::config::TransportSpec;
use crate::connection::{serial, tcp, udp, Connection, ConnectionKey, TransportId};
use crate::dialect::{Dialect, EncodedMessage, Message, Target, UNKNOWN_MESSAGE};
use crate::error::{Error, Result};
use crate::protocol::{Frame, MavVersion, Parser};
use crossbeam_channel::{bounded, Receiver, Sender};
use local::LocalConnection;
use routes::RouteTable;
use std::collections::{HashMap, HashSet};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use subscription::{Query, SubscriberHandle, SubscriberId, SubscriptionCache};

/// Capacity of the router event queue
const EVENT_QUEUE_CAP: usize = 1024;

/// Router startup configuration
pub struct RouterConfig {
    /// Message-set knowledge; the router cannot start without one
    pub dialect: Option<Arc<dyn Dialect>>,
    /// MAVLink system id of the router itself
    pub system: u8,
    /// MAVLink component id of the router itself
    pub component: u8,
    /// Deliver locally-originated broadcasts back to local subscribers
    pub echo_local_broadcast: bool,
    pub transports: Vec<TransportSpec>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            dialect: None,
            system: 255,
            component: 190,
            echo_local_broadcast: true,
            transports: Vec::new(),
        }
    }
}

/// Internal events consumed by the router loop
pub(crate) enum Event {
    AddConnection(ConnectionKey, Connection),
    Bytes(ConnectionKey, Vec<u8>),
    Datagram {
        transport: TransportId,
        peer: SocketAddr,
        bytes: Vec<u8>,
    },
    Closed(ConnectionKey),
    Subscribe(Query, SubscriberHandle),
    Unsubscribe(SubscriberId),
    SubscriberDown(SubscriberId),
    Send {
        message: Message,
        encoded: EncodedMessage,
        version: MavVersion,
    },
    Shutdown,
}

pub struct Router {
    dialect: Arc<dyn Dialect>,
    echo_local_broadcast: bool,
    events: Receiver<Event>,
    events_tx: Sender<Event>,
    connections: HashMap<ConnectionKey, Connection>,
    udp_listeners: HashMap<TransportId, Arc<UdpSocket>>,
    routes: RouteTable,
    local: LocalConnection,
    cache: SubscriptionCache,
    monitored: HashSet<SubscriberId>,
}

impl Router {
    /// Launch the router thread and its transports.
    ///
    /// UDP sockets are bound synchronously so configuration problems fail
    /// startup; TCP and serial transports connect from their worker threads
    /// and enqueue `AddConnection` when they succeed. The cache is created
    /// by the caller and outlives the router, so a restarted router
    /// reinstalls the previous subscriptions.
    pub fn start(config: RouterConfig, cache: SubscriptionCache) -> Result<RouterHandle> {
        let dialect = config.dialect.ok_or(Error::NoDialect)?;
        if config.system == 0 || config.component == 0 {
            return Err(Error::Config(
                "router system and component ids must be nonzero".to_string(),
            ));
        }

        let (events_tx, events_rx) = bounded(EVENT_QUEUE_CAP);
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::new();
        let mut udp_listeners = HashMap::new();

        for (id, spec) in config.transports.iter().enumerate() {
            match spec {
                TransportSpec::UdpIn(addr) => {
                    let (socket, worker) =
                        udp::spawn_udp_in(id, *addr, events_tx.clone(), Arc::clone(&shutdown))?;
                    udp_listeners.insert(id, socket);
                    workers.push(worker);
                }
                TransportSpec::UdpOut(addr) => {
                    workers.push(udp::spawn_udp_out(
                        id,
                        *addr,
                        events_tx.clone(),
                        Arc::clone(&shutdown),
                    )?);
                }
                TransportSpec::TcpOut(addr) => {
                    workers.push(tcp::spawn_tcp_out(
                        id,
                        *addr,
                        events_tx.clone(),
                        Arc::clone(&shutdown),
                    )?);
                }
                TransportSpec::Serial { path, baud } => {
                    workers.push(serial::spawn_serial(
                        path.clone(),
                        *baud,
                        events_tx.clone(),
                        Arc::clone(&shutdown),
                    )?);
                }
            }
        }

        let mut router = Router {
            dialect: Arc::clone(&dialect),
            echo_local_broadcast: config.echo_local_broadcast,
            events: events_rx,
            events_tx: events_tx.clone(),
            connections: HashMap::new(),
            udp_listeners,
            routes: RouteTable::new(),
            local: LocalConnection::new(config.system, config.component),
            cache,
            monitored: HashSet::new(),
        };
        router.reinstall_cached();

        let thread = std::thread::Builder::new()
            .name("router".to_string())
            .spawn(move || router.run())?;

        Ok(RouterHandle {
            events: events_tx,
            dialect,
            shutdown,
            thread: Some(thread),
            workers,
        })
    }

    /// Re-register subscriptions left in the cache by a previous router,
    /// pruning those whose subscriber has since died.
    fn reinstall_cached(&mut self) {
        let cached = self.cache.get();
        if cached.is_empty() {
            return;
        }
        log::info!("reinstalling {} cached subscription(s)", cached.len());
        for sub in cached {
            if sub.handle.is_down() {
                log::debug!("cached subscriber {} is gone, pruning", sub.handle.id());
                continue;
            }
            let handle = sub.handle.clone();
            if self.local.subscribe(sub.query, sub.handle) {
                self.monitor(&handle);
            }
        }
        self.store_subscriptions();
    }

    fn run(mut self) {
        log::info!(
            "router started (system {}, component {})",
            self.local.system,
            self.local.component
        );
        while let Ok(event) = self.events.recv() {
            match event {
                Event::Shutdown => break,
                Event::AddConnection(key, connection) => {
                    log::info!("connection added: {}", key);
                    self.connections.insert(key, connection);
                }
                Event::Closed(key) => {
                    if let Some(mut connection) = self.connections.remove(&key) {
                        let stats = connection.parser_mut().stats();
                        log::info!(
                            "connection closed: {} ({} frames, {} checksum failures, {} unknown ids)",
                            key,
                            stats.frames,
                            stats.checksum_failures,
                            stats.unknown_dropped
                        );
                    }
                }
                Event::Bytes(key, bytes) => self.on_bytes(key, &bytes),
                Event::Datagram {
                    transport,
                    peer,
                    bytes,
                } => self.on_datagram(transport, peer, &bytes),
                Event::Subscribe(query, handle) => self.on_subscribe(query, handle),
                Event::Unsubscribe(id) | Event::SubscriberDown(id) => self.on_subscriber_gone(id),
                Event::Send {
                    message,
                    encoded,
                    version,
                } => self.on_send(message, encoded, version),
            }
        }
        log::info!("router stopped");
    }

    /// A datagram on a UDP server socket; first contact mints a new
    /// per-peer connection with its own parser.
    fn on_datagram(&mut self, transport: TransportId, peer: SocketAddr, bytes: &[u8]) {
        let key = ConnectionKey::Peer(transport, peer);
        if !self.connections.contains_key(&key) {
            let Some(socket) = self.udp_listeners.get(&transport) else {
                return;
            };
            log::info!("new udp peer: {}", key);
            self.connections.insert(
                key.clone(),
                Connection::UdpPeer {
                    socket: Arc::clone(socket),
                    peer,
                    parser: Parser::new(),
                },
            );
        }
        self.on_bytes(key, bytes);
    }

    fn on_bytes(&mut self, key: ConnectionKey, bytes: &[u8]) {
        let dialect = Arc::clone(&self.dialect);
        let Some(connection) = self.connections.get_mut(&key) else {
            // bytes for a connection that was torn down; parser state went
            // with it, nothing to do
            return;
        };
        let frames = connection.parser_mut().push_bytes(bytes, dialect.as_ref());
        for frame in frames {
            self.route(key.clone(), frame);
        }
    }

    /// Apply the routing policy to a validated frame received on `src`
    fn route(&mut self, src: ConnectionKey, frame: Frame) {
        if src != ConnectionKey::Local {
            self.routes
                .learn(frame.source_system, frame.source_component, src.clone());
        }

        let recipients = select_recipients(
            self.connections.keys(),
            &self.routes,
            &src,
            frame.target,
            self.echo_local_broadcast,
        );

        if recipients.len() == 1
            && recipients.contains(&ConnectionKey::Local)
            && frame.source_system == self.local.system
            && frame.source_component == self.local.component
        {
            log::debug!(
                "destination unreachable for {:?}, delivering locally only",
                frame.target
            );
        }

        let bytes = frame.pack();
        for key in recipients {
            if key == ConnectionKey::Local {
                let dead = self.local.deliver(&frame);
                self.forget_subscribers(&dead);
            } else if let Some(connection) = self.connections.get_mut(&key) {
                if let Err(e) = connection.forward(&bytes) {
                    log::warn!("forward to {} failed: {}", key, e);
                }
            } else {
                log::debug!("route to {} is stale, connection gone", key);
            }
        }
    }

    fn on_subscribe(&mut self, query: Query, handle: SubscriberHandle) {
        if handle.is_down() {
            return;
        }
        let id = handle.id();
        if self.local.subscribe(query, handle.clone()) {
            log::debug!("subscription added for subscriber {}", id);
        }
        self.monitor(&handle);
        self.store_subscriptions();
    }

    /// Watch a subscriber handle; fires `SubscriberDown` exactly once when
    /// it becomes un-deliverable.
    fn monitor(&mut self, handle: &SubscriberHandle) {
        if !self.monitored.insert(handle.id()) {
            return;
        }
        let watched = handle.clone();
        let events = self.events_tx.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("monitor-{}", handle.id()))
            .spawn(move || {
                watched.wait_down();
                let _ = events.send(Event::SubscriberDown(watched.id()));
            });
        if let Err(e) = spawned {
            log::error!("failed to spawn subscriber monitor: {}", e);
        }
    }

    fn on_subscriber_gone(&mut self, id: SubscriberId) {
        self.monitored.remove(&id);
        if self.local.unsubscribe(id) {
            log::debug!("removed subscriptions for subscriber {}", id);
            self.store_subscriptions();
        }
    }

    fn forget_subscribers(&mut self, ids: &[SubscriberId]) {
        if ids.is_empty() {
            return;
        }
        for id in ids {
            self.monitored.remove(id);
        }
        self.store_subscriptions();
    }

    fn store_subscriptions(&self) {
        self.cache.set(self.local.subscriptions().to_vec());
    }

    /// A locally originated message: stamp source and sequence, then route
    /// it exactly as if it had arrived on the local connection.
    fn on_send(&mut self, message: Message, encoded: EncodedMessage, version: MavVersion) {
        let sequence = self.local.next_sequence();
        let frame = Frame::from_encoded(
            version,
            sequence,
            self.local.system,
            self.local.component,
            encoded,
            message,
        );
        self.route(ConnectionKey::Local, frame);
    }
}

/// Recipient set per the MAVLink routing rules.
///
/// Broadcast: every connection except the source, plus local (unless the
/// frame originated locally and echo is off). Targeted: every connection
/// with a matching learned route under wildcard-zero, plus local; the
/// source is not excluded because targeting is address-based.
fn select_recipients<'a, I>(
    connections: I,
    routes: &RouteTable,
    src: &ConnectionKey,
    target: Target,
    echo_local_broadcast: bool,
) -> HashSet<ConnectionKey>
where
    I: IntoIterator<Item = &'a ConnectionKey>,
{
    let mut recipients = HashSet::new();
    match target {
        Target::Broadcast => {
            for key in connections {
                if key != src {
                    recipients.insert(key.clone());
                }
            }
            if *src != ConnectionKey::Local || echo_local_broadcast {
                recipients.insert(ConnectionKey::Local);
            }
        }
        Target::System(system) => {
            targeted(&mut recipients, routes, system, 0);
        }
        Target::Component(system, component) => {
            targeted(&mut recipients, routes, system, component);
        }
    }
    recipients
}

fn targeted(
    recipients: &mut HashSet<ConnectionKey>,
    routes: &RouteTable,
    system: u8,
    component: u8,
) {
    for key in routes.matching(system, component) {
        recipients.insert(key.clone());
    }
    recipients.insert(ConnectionKey::Local);
}

/// Handle to a running router.
///
/// Operations are fire-and-forget: anything reportable to the caller is
/// checked eagerly, the rest is enqueued onto the router loop and the call
/// returns once queued. Dropping the handle shuts the router down.
pub struct RouterHandle {
    events: Sender<Event>,
    dialect: Arc<dyn Dialect>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl RouterHandle {
    /// Register a subscription. Fails with `InvalidMessageType` if the
    /// query names a message type the dialect does not know.
    pub fn subscribe(&self, query: Query, handle: SubscriberHandle) -> Result<()> {
        if let Some(name) = query.message_type.as_deref() {
            if name != UNKNOWN_MESSAGE && self.dialect.message_id(name).is_none() {
                return Err(Error::InvalidMessageType(name.to_string()));
            }
        }
        self.events
            .send(Event::Subscribe(query, handle))
            .map_err(|_| Error::RouterStopped)
    }

    /// Remove every subscription registered for `handle`
    pub fn unsubscribe(&self, handle: &SubscriberHandle) -> Result<()> {
        self.events
            .send(Event::Unsubscribe(handle.id()))
            .map_err(|_| Error::RouterStopped)
    }

    /// Encode and route a locally originated message. The frame is routed
    /// exactly as if it had arrived on the local connection, so remote
    /// transports and matching local subscribers both see it.
    pub fn pack_and_send(&self, message: Message, version: MavVersion) -> Result<()> {
        let encoded = self.dialect.encode(&message)?;
        if version == MavVersion::V1 && encoded.message_id > u8::MAX as u32 {
            return Err(Error::ProtocolUndefined(format!(
                "message id {} does not fit a v1 frame",
                encoded.message_id
            )));
        }
        self.events
            .send(Event::Send {
                message,
                encoded,
                version,
            })
            .map_err(|_| Error::RouterStopped)
    }

    /// Stop the router loop and all transport workers
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.events.send(Event::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for RouterHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::subscription::{subscriber, Delivery};
    use super::*;
    use crate::dialect::common::{messages, CommonDialect};
    use std::time::{Duration, Instant};

    const RECV_TIMEOUT: Duration = Duration::from_secs(2);
    const SILENCE: Duration = Duration::from_millis(200);

    fn test_config(transports: Vec<TransportSpec>) -> RouterConfig {
        RouterConfig {
            dialect: Some(Arc::new(CommonDialect)),
            transports,
            ..Default::default()
        }
    }

    /// Probe the OS for a currently-free UDP port
    fn free_udp_addr() -> SocketAddr {
        let probe = UdpSocket::bind("127.0.0.1:0").expect("bind probe socket");
        probe.local_addr().expect("probe addr")
    }

    fn heartbeat_bytes(system: u8, component: u8, sequence: u8) -> Vec<u8> {
        let dialect = CommonDialect;
        let message = messages::heartbeat(2, 3, 81, 0, 4);
        let encoded = dialect.encode(&message).expect("encode heartbeat");
        Frame::from_encoded(MavVersion::V2, sequence, system, component, encoded, message).pack()
    }

    fn parse_one(bytes: &[u8]) -> Frame {
        let mut parser = Parser::new();
        let mut frames = parser.push_bytes(bytes, &CommonDialect);
        assert_eq!(frames.len(), 1, "expected exactly one frame");
        frames.remove(0)
    }

    fn wait_until<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        cond()
    }

    #[test]
    fn start_requires_a_dialect() {
        let config = RouterConfig {
            dialect: None,
            ..Default::default()
        };
        assert!(matches!(
            Router::start(config, SubscriptionCache::new()),
            Err(Error::NoDialect)
        ));
    }

    #[test]
    fn start_rejects_zero_ids() {
        let config = RouterConfig {
            dialect: Some(Arc::new(CommonDialect)),
            system: 0,
            ..Default::default()
        };
        assert!(Router::start(config, SubscriptionCache::new()).is_err());
    }

    #[test]
    fn subscribe_rejects_unknown_message_type() {
        let router = Router::start(test_config(Vec::new()), SubscriptionCache::new()).unwrap();
        let (handle, _sub) = subscriber();
        let query = Query {
            message_type: Some("NOT_A_MESSAGE".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            router.subscribe(query, handle),
            Err(Error::InvalidMessageType(_))
        ));
    }

    #[test]
    fn pack_and_send_rejects_unencodable_message() {
        let router = Router::start(test_config(Vec::new()), SubscriptionCache::new()).unwrap();
        assert!(matches!(
            router.pack_and_send(Message::new("NOT_A_MESSAGE"), MavVersion::V2),
            Err(Error::ProtocolUndefined(_))
        ));
    }

    #[test]
    fn udp_in_frame_reaches_subscriber_and_learns_route() {
        let addr = free_udp_addr();
        let router =
            Router::start(test_config(vec![TransportSpec::UdpIn(addr)]), SubscriptionCache::new())
                .unwrap();

        let (handle, sub) = subscriber();
        router.subscribe(Query::default(), handle).unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client.set_read_timeout(Some(RECV_TIMEOUT)).unwrap();
        client.send_to(&heartbeat_bytes(1, 1, 0), addr).unwrap();

        match sub.recv_timeout(RECV_TIMEOUT) {
            Some(Delivery::Message(m)) => assert_eq!(m.name, "HEARTBEAT"),
            other => panic!("expected heartbeat delivery, got {:?}", other.is_some()),
        }

        // the route back to (1,1) was learned from the inbound frame: a
        // targeted send produces exactly one datagram, to this client
        router
            .pack_and_send(
                messages::command_long(1, 1, 400, 0, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
                MavVersion::V2,
            )
            .unwrap();

        let mut buf = [0u8; 512];
        let (n, _) = client.recv_from(&mut buf).expect("targeted datagram");
        let frame = parse_one(&buf[..n]);
        assert_eq!(frame.message.as_ref().map(|m| m.name), Some("COMMAND_LONG"));
        assert_eq!(frame.target, Target::Component(1, 1));
        assert_eq!(frame.source_system, 255);
        assert_eq!(frame.source_component, 190);
        assert_eq!(frame.sequence, 0);

        // no broadcast fanout: nothing else arrives
        client.set_read_timeout(Some(SILENCE)).unwrap();
        assert!(client.recv_from(&mut buf).is_err());
    }

    #[test]
    fn broadcast_excludes_source_peer() {
        let addr = free_udp_addr();
        let router =
            Router::start(test_config(vec![TransportSpec::UdpIn(addr)]), SubscriptionCache::new())
                .unwrap();

        let (handle, sub) = subscriber();
        router.subscribe(Query::default(), handle).unwrap();

        let peer_a = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer_b = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer_a.set_read_timeout(Some(RECV_TIMEOUT)).unwrap();
        peer_b.set_read_timeout(Some(RECV_TIMEOUT)).unwrap();

        // A introduces itself; only the local subscriber hears it
        peer_a.send_to(&heartbeat_bytes(1, 1, 0), addr).unwrap();
        assert!(sub.recv_timeout(RECV_TIMEOUT).is_some());

        // B introduces itself; A is a known connection and gets a copy
        peer_b.send_to(&heartbeat_bytes(2, 1, 0), addr).unwrap();
        assert!(sub.recv_timeout(RECV_TIMEOUT).is_some());
        let mut buf = [0u8; 512];
        let (n, _) = peer_a.recv_from(&mut buf).expect("broadcast forwarded to A");
        assert_eq!(parse_one(&buf[..n]).source_system, 2);

        // A broadcasts again: B and local get it, A does not
        peer_a.send_to(&heartbeat_bytes(1, 1, 1), addr).unwrap();
        assert!(sub.recv_timeout(RECV_TIMEOUT).is_some());
        let (n, _) = peer_b.recv_from(&mut buf).expect("broadcast forwarded to B");
        let forwarded = parse_one(&buf[..n]);
        assert_eq!(forwarded.source_system, 1);
        assert_eq!(forwarded.sequence, 1);

        peer_a.set_read_timeout(Some(SILENCE)).unwrap();
        assert!(
            peer_a.recv_from(&mut buf).is_err(),
            "source peer must not hear its own broadcast"
        );
    }

    #[test]
    fn local_broadcast_echoes_to_subscribers() {
        let router = Router::start(test_config(Vec::new()), SubscriptionCache::new()).unwrap();
        let (handle, sub) = subscriber();
        router.subscribe(Query::default(), handle).unwrap();

        router
            .pack_and_send(messages::heartbeat(6, 8, 0, 0, 4), MavVersion::V2)
            .unwrap();
        match sub.recv_timeout(RECV_TIMEOUT) {
            Some(Delivery::Message(m)) => assert_eq!(m.name, "HEARTBEAT"),
            _ => panic!("expected local echo of local broadcast"),
        }
    }

    #[test]
    fn local_broadcast_echo_can_be_disabled() {
        let config = RouterConfig {
            echo_local_broadcast: false,
            ..test_config(Vec::new())
        };
        let router = Router::start(config, SubscriptionCache::new()).unwrap();
        let (handle, sub) = subscriber();
        router.subscribe(Query::default(), handle).unwrap();

        router
            .pack_and_send(messages::heartbeat(6, 8, 0, 0, 4), MavVersion::V2)
            .unwrap();
        assert!(sub.recv_timeout(SILENCE).is_none());

        // targeted frames still deliver locally regardless of echo
        router
            .pack_and_send(messages::ping(1, 1, 9, 9), MavVersion::V2)
            .unwrap();
        assert!(sub.recv_timeout(RECV_TIMEOUT).is_some());
    }

    #[test]
    fn dead_subscriber_is_pruned() {
        let cache = SubscriptionCache::new();
        let router = Router::start(test_config(Vec::new()), cache.clone()).unwrap();

        let (dead_handle, dead_sub) = subscriber();
        let (live_handle, live_sub) = subscriber();
        let dead_id = dead_handle.id();
        router.subscribe(Query::default(), dead_handle).unwrap();
        router.subscribe(Query::default(), live_handle).unwrap();
        assert!(wait_until(|| cache.get().len() == 2, RECV_TIMEOUT));

        // the monitor notices the drop and the router prunes the entry
        drop(dead_sub);
        assert!(wait_until(
            || cache.get().iter().all(|s| s.handle.id() != dead_id),
            RECV_TIMEOUT
        ));

        router
            .pack_and_send(messages::heartbeat(6, 8, 0, 0, 4), MavVersion::V2)
            .unwrap();
        assert!(live_sub.recv_timeout(RECV_TIMEOUT).is_some());
    }

    #[test]
    fn unsubscribe_restores_prior_state() {
        let cache = SubscriptionCache::new();
        let router = Router::start(test_config(Vec::new()), cache.clone()).unwrap();
        let (handle, _sub) = subscriber();

        router.subscribe(Query::default(), handle.clone()).unwrap();
        assert!(wait_until(|| cache.get().len() == 1, RECV_TIMEOUT));
        router.unsubscribe(&handle).unwrap();
        assert!(wait_until(|| cache.get().is_empty(), RECV_TIMEOUT));
    }

    #[test]
    fn warm_restart_reinstalls_subscriptions() {
        let cache = SubscriptionCache::new();
        let (handle, sub) = subscriber();

        {
            let router = Router::start(test_config(Vec::new()), cache.clone()).unwrap();
            router.subscribe(Query::default(), handle).unwrap();
            assert!(wait_until(|| cache.get().len() == 1, RECV_TIMEOUT));
            // router dropped here: stopped without unsubscribing
        }

        let router = Router::start(test_config(Vec::new()), cache.clone()).unwrap();
        router
            .pack_and_send(messages::heartbeat(6, 8, 0, 0, 4), MavVersion::V2)
            .unwrap();
        match sub.recv_timeout(RECV_TIMEOUT) {
            Some(Delivery::Message(m)) => assert_eq!(m.name, "HEARTBEAT"),
            _ => panic!("cached subscription should survive a router restart"),
        }
    }

    #[test]
    fn recipients_broadcast_excludes_source() {
        let a = ConnectionKey::Socket(0);
        let b = ConnectionKey::Socket(1);
        let keys = vec![a.clone(), b.clone()];
        let routes = RouteTable::new();

        let recipients = select_recipients(&keys, &routes, &a, Target::Broadcast, true);
        assert!(!recipients.contains(&a));
        assert!(recipients.contains(&b));
        assert!(recipients.contains(&ConnectionKey::Local));
    }

    #[test]
    fn recipients_local_broadcast_respects_echo_flag() {
        let a = ConnectionKey::Socket(0);
        let keys = vec![a.clone()];
        let routes = RouteTable::new();

        let echoing = select_recipients(&keys, &routes, &ConnectionKey::Local, Target::Broadcast, true);
        assert!(echoing.contains(&ConnectionKey::Local));
        assert!(echoing.contains(&a));

        let silent = select_recipients(&keys, &routes, &ConnectionKey::Local, Target::Broadcast, false);
        assert!(!silent.contains(&ConnectionKey::Local));
        assert!(silent.contains(&a));
    }

    #[test]
    fn recipients_targeted_uses_routes_not_connections() {
        let a = ConnectionKey::Socket(0);
        let b = ConnectionKey::Socket(1);
        let keys = vec![a.clone(), b.clone()];
        let mut routes = RouteTable::new();
        routes.learn(1, 1, a.clone());
        routes.learn(2, 1, b.clone());

        let exact = select_recipients(&keys, &routes, &ConnectionKey::Local, Target::Component(1, 1), true);
        assert_eq!(
            exact,
            HashSet::from([a.clone(), ConnectionKey::Local])
        );

        // system-wide target with component wildcard
        let system_wide = select_recipients(&keys, &routes, &ConnectionKey::Local, Target::System(2), true);
        assert_eq!(system_wide, HashSet::from([b.clone(), ConnectionKey::Local]));

        // targeting does not exclude the source connection
        let from_a = select_recipients(&keys, &routes, &a, Target::Component(1, 1), true);
        assert!(from_a.contains(&a));

        // nothing learned for system 9: local only
        let unknown = select_recipients(&keys, &routes, &ConnectionKey::Local, Target::Component(9, 9), true);
        assert_eq!(unknown, HashSet::from([ConnectionKey::Local]));
    }
}
