//! Publisher endpoint.
//!
//! A publisher listens on a TCP port and fans every published frame out to
//! all connected subscribers. Each accepted connection gets a greeting and
//! its own writer task fed by a bounded channel of `send_queue` frames, so
//! `publish` never waits on a slow peer. A subscriber whose queue is full is
//! disconnected, the way a ZeroMQ PUB socket drops peers past the high water
//! mark. Publishing with nobody connected succeeds and the frame is dropped.

use crate::config::EndpointConfig;
use crate::context::ContextGate;
use crate::endpoint::{EndpointState, Lifecycle, Role, Running, Shutdown};
use crate::error::EzmqError;
use crate::transport;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use ezmq_wire::{Envelope, Frame, Topic};
use futures::future::join_all;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type PeerMap = DashMap<u64, PeerHandle>;

/// Publisher side of one subscriber connection
struct PeerHandle {
    frames: mpsc::Sender<Bytes>,
    evict: Arc<Notify>,
}

impl PeerHandle {
    /// Wake the writer so it closes the connection without draining
    fn evict(&self) {
        self.evict.notify_one();
    }
}

/// Publishing endpoint bound to one port
pub struct Publisher {
    port: u16,
    config: EndpointConfig,
    context: ContextGate,
    lifecycle: Lifecycle<PublisherRunning>,
}

struct PublisherRunning {
    local_addr: SocketAddr,
    peers: Arc<PeerMap>,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

#[async_trait]
impl Running for PublisherRunning {
    async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.accept_task.await {
            error!("Publisher accept task failed: {}", e);
        }
        self.peers.clear();
        info!("Publisher on {} stopped", self.local_addr);
    }
}

impl Publisher {
    pub(crate) fn new(port: u16, config: EndpointConfig, context: ContextGate) -> Self {
        Self {
            port,
            config,
            context,
            lifecycle: Lifecycle::new(Role::Publisher),
        }
    }

    /// Bind the port and start accepting subscribers
    pub async fn start(&self) -> Result<(), EzmqError> {
        self.context.ensure_initialized()?;

        self.lifecycle
            .start(|| async {
                let listener = transport::listen(self.port).await?;
                let local_addr = listener.local_addr()?;
                let peers = Arc::new(PeerMap::new());
                let (shutdown_tx, shutdown) = Shutdown::channel();

                let accept_task = tokio::spawn(accept_loop(
                    listener,
                    peers.clone(),
                    self.config.send_queue.max(1),
                    shutdown,
                ));

                info!("Publisher listening on {}", local_addr);
                Ok(PublisherRunning {
                    local_addr,
                    peers,
                    shutdown_tx,
                    accept_task,
                })
            })
            .await
    }

    /// Close the listener and every subscriber connection
    pub async fn stop(&self) -> Result<(), EzmqError> {
        self.lifecycle.stop().await
    }

    /// Publish on the default channel (no topic segment)
    pub async fn publish(&self, envelope: &Envelope) -> Result<(), EzmqError> {
        self.send(vec![None], envelope).await
    }

    /// Publish on a single topic
    pub async fn publish_on_topic(&self, topic: &str, envelope: &Envelope) -> Result<(), EzmqError> {
        let topic = Topic::new(topic)?;
        self.send(vec![Some(topic)], envelope).await
    }

    /// Publish once per topic.
    ///
    /// Every topic is validated before anything is sent; one bad entry fails
    /// the whole call.
    pub async fn publish_on_topic_list<S: AsRef<str>>(
        &self,
        topics: &[S],
        envelope: &Envelope,
    ) -> Result<(), EzmqError> {
        if topics.is_empty() {
            return Err(EzmqError::empty_topic_list());
        }
        let topics = Topic::list(topics)?;
        self.send(topics.into_iter().map(Some).collect(), envelope)
            .await
    }

    async fn send(&self, topics: Vec<Option<Topic>>, envelope: &Envelope) -> Result<(), EzmqError> {
        let phase = self.lifecycle.lock().await;
        let running = phase.running()?;

        let content_type = envelope.content_type();
        let payload = envelope.serialize();
        let frames = topics
            .into_iter()
            .map(|topic| {
                Frame {
                    topic,
                    content_type,
                    payload: payload.clone(),
                }
                .encode(self.config.max_frame_size)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut dead = Vec::new();
        for peer in running.peers.iter() {
            for bytes in &frames {
                match peer.value().frames.try_send(bytes.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!("Subscriber {} send queue full, disconnecting", peer.key());
                        dead.push(*peer.key());
                        break;
                    }
                    Err(TrySendError::Closed(_)) => {
                        dead.push(*peer.key());
                        break;
                    }
                }
            }
        }
        for id in dead {
            if let Some((_, peer)) = running.peers.remove(&id) {
                peer.evict();
            }
        }

        debug!(
            "Published {} frame(s) of {} bytes to {} peer(s)",
            frames.len(),
            payload.len(),
            running.peers.len()
        );
        Ok(())
    }

    /// Configured port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address the listener is bound to
    pub async fn local_addr(&self) -> Result<SocketAddr, EzmqError> {
        Ok(self.lifecycle.lock().await.running()?.local_addr)
    }

    /// Number of connected subscribers
    pub async fn peer_count(&self) -> usize {
        self.lifecycle
            .lock()
            .await
            .running()
            .map(|running| running.peers.len())
            .unwrap_or(0)
    }

    /// Always [`Role::Publisher`]
    pub fn role(&self) -> Role {
        self.lifecycle.role()
    }

    /// Current lifecycle state
    pub async fn state(&self) -> EndpointState {
        self.lifecycle.state().await
    }
}

async fn accept_loop(
    listener: TcpListener,
    peers: Arc<PeerMap>,
    send_queue: usize,
    mut shutdown: Shutdown,
) {
    let mut peer_tasks: Vec<JoinHandle<()>> = Vec::new();
    let mut next_id = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    next_id += 1;
                    let (tx, rx) = mpsc::channel(send_queue);
                    let evict = Arc::new(Notify::new());
                    peers.insert(
                        next_id,
                        PeerHandle {
                            frames: tx,
                            evict: evict.clone(),
                        },
                    );
                    info!("Subscriber {} connected from {}", next_id, addr);

                    peer_tasks.retain(|task| !task.is_finished());
                    peer_tasks.push(tokio::spawn(peer_writer(
                        next_id,
                        stream,
                        rx,
                        evict,
                        peers.clone(),
                        shutdown.clone(),
                    )));
                }
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            },
        }
    }

    drop(listener);
    join_all(peer_tasks).await;
}

async fn peer_writer(
    id: u64,
    stream: TcpStream,
    mut frames: mpsc::Receiver<Bytes>,
    evict: Arc<Notify>,
    peers: Arc<PeerMap>,
    mut shutdown: Shutdown,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY for subscriber {}: {}", id, e);
    }
    let (mut reader, mut writer) = stream.into_split();

    if let Err(e) = transport::send_greeting(&mut writer).await {
        warn!("Greeting to subscriber {} failed: {}", id, e);
        peers.remove(&id);
        return;
    }

    // Subscribers never send; reads only detect a closed connection
    let mut scratch = [0u8; 64];
    loop {
        tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            _ = evict.notified() => break,
            frame = frames.recv() => {
                let Some(bytes) = frame else { break };
                tokio::select! {
                    _ = shutdown.triggered() => break,
                    _ = evict.notified() => break,
                    written = writer.write_all(&bytes) => {
                        if let Err(e) = written {
                            warn!("Write to subscriber {} failed: {}", id, e);
                            break;
                        }
                    }
                }
            }
            read = reader.read(&mut scratch) => match read {
                Ok(0) => {
                    info!("Subscriber {} disconnected", id);
                    break;
                }
                Ok(n) => debug!("Ignoring {} bytes from subscriber {}", n, id),
                Err(e) => {
                    warn!("Subscriber {} connection error: {}", id, e);
                    break;
                }
            },
        }
    }

    peers.remove(&id);
    let _ = writer.shutdown().await;
}
