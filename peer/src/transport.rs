//! Transport channels between peers
//!
//! A [`TransportChannel`] is an ordered, exactly-once link to one remote
//! peer. Whatever arrives on it is funnelled into a single
//! `mpsc::UnboundedSender<TransportEvent>` owned by the runtime, tagged with
//! the peer it came from. A link ends with exactly one
//! [`TransportEvent::Closed`].
//!
//! Two implementations live here:
//! - [`MemoryChannel`], an in-process pair used by tests and local sessions
//! - [`TcpChannel`], length-prefixed bincode frames over a TCP stream, with
//!   one reader task and one writer task per link
//!
//! Stream links start with a `Hello` frame naming the dialing peer.

use crate::error::TransportError;
use log::{debug, error, info, warn};
use shared::protocol::{check_frame_len, decode, encode, encode_frame};
use shared::{ClientId, Message};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;

/// Messages sent from link tasks to the runtime loop
#[derive(Debug)]
pub enum TransportEvent {
    Message { from: ClientId, message: Message },
    /// Terminal; nothing else arrives from this peer afterwards.
    Closed { peer: ClientId },
}

/// Membership changes reported by the signaling directory
pub enum DirectoryEvent {
    PeerJoined {
        id: ClientId,
        link: Box<dyn TransportChannel>,
    },
    PeerLeft {
        id: ClientId,
    },
}

pub trait TransportChannel: Send {
    /// The remote end of this link.
    fn peer(&self) -> &ClientId;

    fn send(&self, message: &Message) -> Result<(), TransportError>;

    /// Tears the link down. Safe to call more than once.
    fn close(&self);
}

/// One direction of an in-process link.
///
/// Messages still pass through the wire codec so anything that would fail to
/// serialize fails here too.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    local: ClientId,
    peer: ClientId,
    to_remote: mpsc::UnboundedSender<TransportEvent>,
    to_local: mpsc::UnboundedSender<TransportEvent>,
    closed: Arc<AtomicBool>,
}

/// Connects two peers in memory, returning (a's handle to b, b's handle to a).
pub fn memory_link(
    a: ClientId,
    a_inbox: mpsc::UnboundedSender<TransportEvent>,
    b: ClientId,
    b_inbox: mpsc::UnboundedSender<TransportEvent>,
) -> (MemoryChannel, MemoryChannel) {
    let closed = Arc::new(AtomicBool::new(false));
    let a_to_b = MemoryChannel {
        local: a.clone(),
        peer: b.clone(),
        to_remote: b_inbox.clone(),
        to_local: a_inbox.clone(),
        closed: Arc::clone(&closed),
    };
    let b_to_a = MemoryChannel {
        local: b,
        peer: a,
        to_remote: a_inbox,
        to_local: b_inbox,
        closed,
    };
    (a_to_b, b_to_a)
}

impl TransportChannel for MemoryChannel {
    fn peer(&self) -> &ClientId {
        &self.peer
    }

    fn send(&self, message: &Message) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let message = decode(&encode(message)?)?;
        self.to_remote
            .send(TransportEvent::Message {
                from: self.local.clone(),
                message,
            })
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Closing in-memory link {} <-> {}", self.local, self.peer);
        if self
            .to_remote
            .send(TransportEvent::Closed {
                peer: self.local.clone(),
            })
            .is_err()
        {
            debug!("{} already stopped listening", self.peer);
        }
        if self
            .to_local
            .send(TransportEvent::Closed {
                peer: self.peer.clone(),
            })
            .is_err()
        {
            debug!("{} already stopped listening", self.local);
        }
    }
}

#[derive(Debug)]
enum Outbound {
    Frame(Vec<u8>),
    Shutdown,
}

/// Handle to a TCP link; the socket itself lives in the link's tasks.
#[derive(Debug, Clone)]
pub struct TcpChannel {
    peer: ClientId,
    outbound: mpsc::UnboundedSender<Outbound>,
    closed: Arc<AtomicBool>,
}

impl TransportChannel for TcpChannel {
    fn peer(&self) -> &ClientId {
        &self.peer
    }

    fn send(&self, message: &Message) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let frame = encode_frame(message)?;
        self.outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) && self.outbound.send(Outbound::Shutdown).is_err() {
            debug!("Writer for {} already gone", self.peer);
        }
    }
}

/// Connects to `peer` and introduces ourselves as `local`.
pub async fn dial(
    addr: impl ToSocketAddrs,
    local: &ClientId,
    peer: ClientId,
    events: mpsc::UnboundedSender<TransportEvent>,
) -> Result<TcpChannel, TransportError> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    let hello = encode_frame(&Message::Hello { id: local.clone() })?;
    stream.write_all(&hello).await?;
    info!("Connected to peer {} at {}", peer, stream.peer_addr()?);
    Ok(spawn_link(stream, peer, events))
}

/// Completes the handshake on an accepted stream and returns the dialer's link.
pub async fn accept(
    mut stream: TcpStream,
    events: mpsc::UnboundedSender<TransportEvent>,
) -> Result<TcpChannel, TransportError> {
    stream.set_nodelay(true)?;
    let body = read_frame(&mut stream).await?;
    match decode(&body)? {
        Message::Hello { id } => {
            info!("Peer {} connected from {}", id, stream.peer_addr()?);
            Ok(spawn_link(stream, id, events))
        }
        other => {
            warn!("Unexpected first frame {:?}", other);
            Err(TransportError::Handshake)
        }
    }
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, TransportError> {
    let len = reader.read_u32().await? as usize;
    check_frame_len(len)?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Spawns the reader and writer tasks for an established stream
fn spawn_link(stream: TcpStream, peer: ClientId, events: mpsc::UnboundedSender<TransportEvent>) -> TcpChannel {
    let (mut reader, mut writer) = stream.into_split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));

    let reader_peer = peer.clone();
    let reader_closed = Arc::clone(&closed);
    tokio::spawn(async move {
        loop {
            match read_frame(&mut reader).await {
                Ok(body) => match decode(&body) {
                    Ok(message) => {
                        let event = TransportEvent::Message {
                            from: reader_peer.clone(),
                            message,
                        };
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Discarding malformed message from {}: {}", reader_peer, e),
                },
                Err(TransportError::Protocol(e)) => {
                    // the stream cannot be resynchronised after a bad length
                    error!("Dropping link to {}: {}", reader_peer, e);
                    break;
                }
                Err(e) => {
                    debug!("Link to {} ended: {}", reader_peer, e);
                    break;
                }
            }
        }
        reader_closed.store(true, Ordering::Release);
        info!("Peer {} disconnected", reader_peer);
        if events.send(TransportEvent::Closed { peer: reader_peer }).is_err() {
            debug!("Runtime stopped before link close was reported");
        }
    });

    let writer_peer = peer.clone();
    tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            match outbound {
                Outbound::Frame(frame) => {
                    if let Err(e) = writer.write_all(&frame).await {
                        error!("Failed to send to {}: {}", writer_peer, e);
                        break;
                    }
                }
                Outbound::Shutdown => {
                    if let Err(e) = writer.shutdown().await {
                        debug!("Shutdown of link to {} failed: {}", writer_peer, e);
                    }
                    break;
                }
            }
        }
    });

    TcpChannel {
        peer,
        outbound: outbound_tx,
        closed,
    }
}
