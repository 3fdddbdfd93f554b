//! Subscriber endpoint.
//!
//! A subscriber keeps one connection task per publisher address. Connection
//! tasks reconnect with exponential backoff, decode frames and hand them to
//! a single dispatch task over a bounded channel. The dispatch task applies
//! the topic filters and invokes the [`SubscriberHandler`], so callbacks are
//! serialized and arrive in the order each publisher sent them.

use crate::config::EndpointConfig;
use crate::context::ContextGate;
use crate::endpoint::{EndpointState, Lifecycle, Role, Running, Shutdown};
use crate::error::{EzmqError, RegistryError};
use crate::registry::TopicRegistry;
use crate::transport;
use async_trait::async_trait;
use bytes::BytesMut;
use ezmq_wire::{Envelope, Frame, FrameDecoder, Topic, WireError};
use futures::future::join_all;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Receives messages delivered to a subscriber.
///
/// Both methods run on the subscriber's dispatch task and must not block
/// for long; delivery to the next message waits for them.
pub trait SubscriberHandler: Send + Sync {
    /// Message published without a topic, delivered when the subscriber
    /// called [`Subscriber::subscribe`]
    fn on_message(&self, envelope: &Envelope);

    /// Message published on a topic claimed by one of the subscriber's filters
    fn on_topic_message(&self, topic: &Topic, envelope: &Envelope);
}

/// Publisher address as given by the caller.
///
/// Two addresses name the same publisher when they resolve to a common
/// socket address; the subscriber then keeps the first one as the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddr {
    /// Host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl PeerAddr {
    fn new(host: &str, port: u16) -> Result<Self, EzmqError> {
        if host.is_empty() {
            return Err(EzmqError::InvalidArgument("empty publisher address".into()));
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Socket addresses this peer resolves to, empty if resolution fails
    async fn resolve(&self) -> Vec<SocketAddr> {
        match tokio::net::lookup_host((self.host.as_str(), self.port)).await {
            Ok(addrs) => addrs.collect(),
            Err(e) => {
                debug!("Resolving {} failed: {}", self, e);
                Vec::new()
            }
        }
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Default)]
struct Filters {
    global: TopicRegistry,
    per_peer: HashMap<PeerAddr, TopicRegistry>,
}

enum Delivery<'a> {
    Topic(&'a Topic),
    Unfiltered,
    Drop,
}

impl Filters {
    fn route<'a>(&self, peer: &PeerAddr, topic: Option<&'a Topic>) -> Delivery<'a> {
        if let Some(topic) = topic {
            let peer_claims = self
                .per_peer
                .get(peer)
                .map(|registry| registry.claims(topic))
                .unwrap_or(false);
            if peer_claims || self.global.claims(topic) {
                return Delivery::Topic(topic);
            }
        }
        if self.global.is_unfiltered() {
            Delivery::Unfiltered
        } else {
            Delivery::Drop
        }
    }
}

/// Subscribing endpoint
pub struct Subscriber {
    peer: PeerAddr,
    config: EndpointConfig,
    context: ContextGate,
    handler: Arc<dyn SubscriberHandler>,
    filters: Arc<RwLock<Filters>>,
    lifecycle: Lifecycle<SubscriberRunning>,
}

struct SubscriberRunning {
    shutdown_tx: watch::Sender<bool>,
    shutdown: Shutdown,
    frames_tx: mpsc::Sender<(PeerAddr, Frame)>,
    peers: HashMap<PeerAddr, JoinHandle<()>>,
    resolved: HashMap<SocketAddr, PeerAddr>,
    dispatch_task: JoinHandle<()>,
}

impl SubscriberRunning {
    /// Connected peer that reaches the same publisher as `peer`, or `peer`
    fn canonical(&self, peer: PeerAddr, addrs: &[SocketAddr]) -> PeerAddr {
        if self.peers.contains_key(&peer) {
            return peer;
        }
        match addrs.iter().find_map(|addr| self.resolved.get(addr)) {
            Some(known) => {
                debug!("{} reaches the same publisher as {}", peer, known);
                known.clone()
            }
            None => peer,
        }
    }

    fn connect(&mut self, peer: PeerAddr, addrs: Vec<SocketAddr>, config: &EndpointConfig) {
        if self.peers.contains_key(&peer) {
            return;
        }
        for addr in addrs {
            self.resolved.entry(addr).or_insert_with(|| peer.clone());
        }
        let task = tokio::spawn(peer_connection(
            peer.clone(),
            config.clone(),
            self.frames_tx.clone(),
            self.shutdown.clone(),
        ));
        self.peers.insert(peer, task);
    }
}

#[async_trait]
impl Running for SubscriberRunning {
    async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);

        let peer_count = self.peers.len();
        for result in join_all(self.peers.into_values()).await {
            if let Err(e) = result {
                error!("Subscriber connection task failed: {}", e);
            }
        }
        if let Err(e) = self.dispatch_task.await {
            error!("Subscriber dispatch task failed: {}", e);
        }
        info!("Subscriber stopped ({} publisher connection(s) closed)", peer_count);
    }
}

impl Subscriber {
    pub(crate) fn new(
        ip: &str,
        port: u16,
        handler: Arc<dyn SubscriberHandler>,
        config: EndpointConfig,
        context: ContextGate,
    ) -> Self {
        Self {
            peer: PeerAddr {
                host: ip.to_string(),
                port,
            },
            config,
            context,
            handler,
            filters: Arc::new(RwLock::new(Filters::default())),
            lifecycle: Lifecycle::new(Role::Subscriber),
        }
    }

    /// Start the dispatch task and connect to the publisher.
    ///
    /// An unreachable publisher is not an error; the connection is retried
    /// in the background until it succeeds or the subscriber is stopped.
    pub async fn start(&self) -> Result<(), EzmqError> {
        self.context.ensure_initialized()?;

        self.lifecycle
            .start(|| async {
                let addrs = self.peer.resolve().await;
                let (shutdown_tx, shutdown) = Shutdown::channel();
                let (frames_tx, frames_rx) = mpsc::channel(self.config.receive_queue.max(1));

                let dispatch_task = tokio::spawn(dispatch_loop(
                    frames_rx,
                    self.filters.clone(),
                    self.handler.clone(),
                    shutdown.clone(),
                ));

                let mut running = SubscriberRunning {
                    shutdown_tx,
                    shutdown,
                    frames_tx,
                    peers: HashMap::new(),
                    resolved: HashMap::new(),
                    dispatch_task,
                };
                running.connect(self.peer.clone(), addrs, &self.config);

                info!("Subscriber started for publisher {}", self.peer);
                Ok(running)
            })
            .await
    }

    /// Stop every connection and the dispatch task.
    ///
    /// No callback runs once this returns.
    pub async fn stop(&self) -> Result<(), EzmqError> {
        self.lifecycle.stop().await
    }

    /// Receive messages published without a topic
    pub async fn subscribe(&self) -> Result<(), EzmqError> {
        self.lifecycle.lock().await.running()?;
        self.filters.write().await.global.set_unfiltered();
        debug!("Subscribed to untopiced messages");
        Ok(())
    }

    /// Receive messages published on `topic` or below it
    pub async fn subscribe_for_topic(&self, topic: &str) -> Result<(), EzmqError> {
        let topic = Topic::new(topic)?;
        self.subscribe_topics(vec![topic]).await
    }

    /// Subscribe to every topic of the list, or to none if one is invalid
    pub async fn subscribe_for_topic_list<S: AsRef<str>>(&self, topics: &[S]) -> Result<(), EzmqError> {
        if topics.is_empty() {
            return Err(EzmqError::empty_topic_list());
        }
        let topics = Topic::list(topics)?;
        self.subscribe_topics(topics).await
    }

    async fn subscribe_topics(&self, topics: Vec<Topic>) -> Result<(), EzmqError> {
        self.lifecycle.lock().await.running()?;
        let mut filters = self.filters.write().await;
        for topic in topics {
            absorb(filters.global.add(topic));
        }
        Ok(())
    }

    /// Stop receiving messages published without a topic
    pub async fn unsubscribe(&self) -> Result<(), EzmqError> {
        self.lifecycle.lock().await.running()?;
        self.filters.write().await.global.clear_unfiltered();
        debug!("Unsubscribed from untopiced messages");
        Ok(())
    }

    /// Remove a topic filter
    pub async fn unsubscribe_for_topic(&self, topic: &str) -> Result<(), EzmqError> {
        let topic = Topic::new(topic)?;
        self.unsubscribe_topics(vec![topic]).await
    }

    /// Remove every topic of the list, or none if one is invalid
    pub async fn unsubscribe_for_topic_list<S: AsRef<str>>(&self, topics: &[S]) -> Result<(), EzmqError> {
        if topics.is_empty() {
            return Err(EzmqError::empty_topic_list());
        }
        let topics = Topic::list(topics)?;
        self.unsubscribe_topics(topics).await
    }

    async fn unsubscribe_topics(&self, topics: Vec<Topic>) -> Result<(), EzmqError> {
        self.lifecycle.lock().await.running()?;
        let mut filters = self.filters.write().await;
        for topic in &topics {
            absorb(filters.global.remove(topic));
        }
        Ok(())
    }

    /// Connect to another publisher and receive `topic` from it only.
    ///
    /// An address resolving to a publisher the subscriber is already
    /// connected to (`localhost` next to `127.0.0.1`) reuses that
    /// connection, so frames are not delivered twice. Addresses that reach
    /// the same host through different interfaces are not merged.
    pub async fn subscribe_with_endpoint(&self, ip: &str, port: u16, topic: &str) -> Result<(), EzmqError> {
        let peer = PeerAddr::new(ip, port)?;
        let topic = Topic::new(topic)?;
        let addrs = peer.resolve().await;

        let mut phase = self.lifecycle.lock().await;
        let running = phase.running_mut()?;
        let peer = running.canonical(peer, &addrs);

        // Register before connecting so the first frames are not dropped
        absorb(
            self.filters
                .write()
                .await
                .per_peer
                .entry(peer.clone())
                .or_default()
                .add(topic),
        );
        running.connect(peer, addrs, &self.config);
        Ok(())
    }

    /// Remove a filter registered with [`subscribe_with_endpoint`](Self::subscribe_with_endpoint)
    pub async fn unsubscribe_with_endpoint(&self, ip: &str, port: u16, topic: &str) -> Result<(), EzmqError> {
        let peer = PeerAddr::new(ip, port)?;
        let topic = Topic::new(topic)?;
        let addrs = peer.resolve().await;

        let phase = self.lifecycle.lock().await;
        let peer = phase.running()?.canonical(peer, &addrs);
        let mut filters = self.filters.write().await;
        match filters.per_peer.get_mut(&peer) {
            Some(registry) => absorb(registry.remove(&topic)),
            None => debug!("No filters registered for {}", peer),
        }
        Ok(())
    }

    /// Topic filters registered through the global subscribe calls
    pub async fn topics(&self) -> Vec<Topic> {
        self.filters.read().await.global.topics().cloned().collect()
    }

    /// Primary publisher host
    pub fn ip(&self) -> &str {
        &self.peer.host
    }

    /// Primary publisher port
    pub fn port(&self) -> u16 {
        self.peer.port
    }

    /// Always [`Role::Subscriber`]
    pub fn role(&self) -> Role {
        self.lifecycle.role()
    }

    /// Current lifecycle state
    pub async fn state(&self) -> EndpointState {
        self.lifecycle.state().await
    }
}

/// Duplicate and missing filters are not errors for the caller
fn absorb(result: Result<(), RegistryError>) {
    if let Err(e) = result {
        debug!("{}", e);
    }
}

enum ReadOutcome {
    Shutdown,
    Disconnected,
}

async fn peer_connection(
    peer: PeerAddr,
    config: EndpointConfig,
    frames: mpsc::Sender<(PeerAddr, Frame)>,
    mut shutdown: Shutdown,
) {
    let mut delay = config.reconnect_interval;

    loop {
        let connected = tokio::select! {
            biased;
            _ = shutdown.triggered() => return,
            connected = connect_and_greet(&peer, &config) => connected,
        };

        match connected {
            Ok(stream) => {
                info!("Connected to publisher {}", peer);
                delay = config.reconnect_interval;
                match read_frames(&peer, stream, &config, &frames, &mut shutdown).await {
                    ReadOutcome::Shutdown => return,
                    ReadOutcome::Disconnected => warn!("Lost connection to publisher {}", peer),
                }
            }
            Err(e) => debug!("Connecting to {} failed: {}", peer, e),
        }

        tokio::select! {
            biased;
            _ = shutdown.triggered() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        delay = config.next_backoff(delay);
    }
}

async fn connect_and_greet(peer: &PeerAddr, config: &EndpointConfig) -> Result<TcpStream, EzmqError> {
    let mut stream = transport::connect(&peer.host, peer.port).await?;
    transport::recv_greeting(&mut stream, config.handshake_timeout).await?;
    Ok(stream)
}

async fn read_frames(
    peer: &PeerAddr,
    mut stream: TcpStream,
    config: &EndpointConfig,
    frames: &mpsc::Sender<(PeerAddr, Frame)>,
    shutdown: &mut Shutdown,
) -> ReadOutcome {
    let mut decoder = FrameDecoder::with_max_frame_size(config.max_frame_size);
    let mut buffer = BytesMut::with_capacity(8 * 1024);

    loop {
        let received = tokio::select! {
            biased;
            _ = shutdown.triggered() => return ReadOutcome::Shutdown,
            received = transport::recv_frame(&mut stream, &mut decoder, &mut buffer) => received,
        };

        match received {
            Ok(Some(frame)) => {
                debug!(
                    "Frame from {} on {:?}, {} payload bytes",
                    peer,
                    frame.topic.as_ref().map(Topic::as_str),
                    frame.payload.len()
                );
                tokio::select! {
                    biased;
                    _ = shutdown.triggered() => return ReadOutcome::Shutdown,
                    sent = frames.send((peer.clone(), frame)) => {
                        if sent.is_err() {
                            return ReadOutcome::Shutdown;
                        }
                    }
                }
            }
            Ok(None) => return ReadOutcome::Disconnected,
            Err(EzmqError::Decode(WireError::Size(size))) => {
                warn!("Frame of {} bytes from {} exceeds limit, dropping connection", size, peer);
                return ReadOutcome::Disconnected;
            }
            Err(EzmqError::Decode(e)) => warn!("Dropping bad frame from {}: {}", peer, e),
            Err(e) => {
                warn!("Read from {} failed: {}", peer, e);
                return ReadOutcome::Disconnected;
            }
        }
    }
}

async fn dispatch_loop(
    mut frames: mpsc::Receiver<(PeerAddr, Frame)>,
    filters: Arc<RwLock<Filters>>,
    handler: Arc<dyn SubscriberHandler>,
    mut shutdown: Shutdown,
) {
    loop {
        let (peer, frame) = tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            next = frames.recv() => match next {
                Some(next) => next,
                None => break,
            },
        };

        let delivery = filters.read().await.route(&peer, frame.topic.as_ref());
        if let Delivery::Drop = delivery {
            debug!("No filter claims frame from {}, dropping", peer);
            continue;
        }

        let envelope = match frame.envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping undecodable {:?} payload from {}: {}", frame.content_type, peer, e);
                continue;
            }
        };

        // A panicking handler loses this message only
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| match delivery {
            Delivery::Topic(topic) => handler.on_topic_message(topic, &envelope),
            Delivery::Unfiltered => handler.on_message(&envelope),
            Delivery::Drop => {}
        }));
        if delivered.is_err() {
            error!("Subscriber handler panicked on a frame from {}", peer);
        }
    }
    debug!("Subscriber dispatch task exiting");
}
