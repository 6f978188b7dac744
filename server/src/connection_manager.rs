//! Connection tracking for the room server
//!
//! Every accepted TCP stream gets a `Connection` with:
//! - A unique id assigned by the server (starting from 1)
//! - An [`Outbox`] drained in order by that connection's writer task
//!
//! Sends never block the server loop. Periodic physics states are the only
//! packets that may be dropped: once a connection has `capacity` of them
//! queued, further states are discarded for that connection only. Replies and
//! the snapshot forced by a reset are always queued.

use log::{info, warn};
use shared::Packet;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Server-assigned connection number, starting at 1.
pub type ConnectionId = u32;

/// How a queued packet may be treated when the connection falls behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Always delivered, in order with everything else.
    Reliable,
    /// Superseded by the next tick; dropped when the outbox is saturated.
    Droppable,
}

/// Why a packet was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// Too many droppable packets are already waiting.
    Saturated,
    /// The writer task is gone.
    Closed,
}

/// Creates the queue between the server loop and one connection's writer.
/// `capacity` bounds how many droppable packets may wait at once.
pub fn outbox(capacity: usize) -> (Outbox, OutboxReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let queued_droppable = Arc::new(AtomicUsize::new(0));
    (
        Outbox {
            tx,
            queued_droppable: queued_droppable.clone(),
            capacity: capacity.max(1),
        },
        OutboxReceiver {
            rx,
            queued_droppable,
        },
    )
}

/// Sending half of a connection's queue, held by the server loop.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<(Packet, Delivery)>,
    queued_droppable: Arc<AtomicUsize>,
    capacity: usize,
}

impl Outbox {
    pub fn push(&self, packet: Packet, delivery: Delivery) -> Result<(), SendError> {
        if delivery == Delivery::Droppable {
            if self.queued_droppable.load(Ordering::Acquire) >= self.capacity {
                return Err(SendError::Saturated);
            }
            self.queued_droppable.fetch_add(1, Ordering::AcqRel);
        }

        self.tx.send((packet, delivery)).map_err(|_| {
            if delivery == Delivery::Droppable {
                self.queued_droppable.fetch_sub(1, Ordering::AcqRel);
            }
            SendError::Closed
        })
    }

    /// Droppable packets queued and not yet taken by the writer.
    pub fn queued_droppable(&self) -> usize {
        self.queued_droppable.load(Ordering::Acquire)
    }
}

/// Receiving half of a connection's queue, owned by its writer task.
#[derive(Debug)]
pub struct OutboxReceiver {
    rx: mpsc::UnboundedReceiver<(Packet, Delivery)>,
    queued_droppable: Arc<AtomicUsize>,
}

impl OutboxReceiver {
    /// Next packet in send order, or None once every `Outbox` is dropped.
    pub async fn recv(&mut self) -> Option<Packet> {
        let item = self.rx.recv().await?;
        Some(self.release(item))
    }

    /// Non-blocking variant of [`OutboxReceiver::recv`].
    pub fn try_recv(&mut self) -> Option<Packet> {
        let item = self.rx.try_recv().ok()?;
        Some(self.release(item))
    }

    fn release(&self, (packet, delivery): (Packet, Delivery)) -> Packet {
        if delivery == Delivery::Droppable {
            self.queued_droppable.fetch_sub(1, Ordering::AcqRel);
        }
        packet
    }
}

/// A connected client as seen by the server loop.
#[derive(Debug)]
pub struct Connection {
    /// Server-assigned id, also used as the participant id in rooms
    pub id: ConnectionId,
    /// Remote address, for logging
    pub addr: SocketAddr,
    /// When the connection was accepted
    pub connected_at: Instant,
    outbox: Outbox,
    /// Droppable packets discarded because the outbox was saturated
    pub dropped_packets: u64,
}

impl Connection {
    pub fn new(id: ConnectionId, addr: SocketAddr, outbox: Outbox) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            outbox,
            dropped_packets: 0,
        }
    }

    /// Queues a packet for the writer task. Returns false if it was dropped.
    pub fn send(&mut self, packet: Packet, delivery: Delivery) -> bool {
        match self.outbox.push(packet, delivery) {
            Ok(()) => true,
            Err(SendError::Saturated) => {
                self.dropped_packets += 1;
                warn!(
                    "Outbox full for connection {}, dropped packet ({} total)",
                    self.id, self.dropped_packets
                );
                false
            }
            Err(SendError::Closed) => false,
        }
    }
}

/// Registry of live connections, enforcing the server's capacity limit.
pub struct ConnectionManager {
    connections: HashMap<ConnectionId, Connection>,
    next_connection_id: ConnectionId,
    max_connections: usize,
}

impl ConnectionManager {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            next_connection_id: 1,
            max_connections,
        }
    }

    /// Registers a connection. Returns None if the server is at capacity.
    pub fn add_connection(&mut self, addr: SocketAddr, outbox: Outbox) -> Option<ConnectionId> {
        if self.connections.len() >= self.max_connections {
            warn!("Rejecting connection from {}: server full", addr);
            return None;
        }

        let id = self.next_connection_id;
        self.next_connection_id += 1;

        info!("Connection {} opened from {}", id, addr);
        self.connections
            .insert(id, Connection::new(id, addr, outbox));
        Some(id)
    }

    /// Forgets a connection, dropping its outbox so the writer task ends.
    pub fn remove_connection(&mut self, id: ConnectionId) -> bool {
        match self.connections.remove(&id) {
            Some(connection) => {
                info!(
                    "Connection {} closed after {:.1}s",
                    id,
                    connection.connected_at.elapsed().as_secs_f32()
                );
                true
            }
            None => false,
        }
    }

    /// Whether the connection is still registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Reliably sends to a single connection. Returns false if it is unknown
    /// or its writer is gone.
    pub fn send_to(&mut self, id: ConnectionId, packet: Packet) -> bool {
        match self.connections.get_mut(&id) {
            Some(connection) => connection.send(packet, Delivery::Reliable),
            None => false,
        }
    }

    /// Sends a copy of `packet` to each listed connection and returns how
    /// many accepted it.
    pub fn broadcast<I>(&mut self, recipients: I, packet: &Packet, delivery: Delivery) -> usize
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        recipients
            .into_iter()
            .filter(|id| match self.connections.get_mut(id) {
                Some(connection) => connection.send(packet.clone(), delivery),
                None => false,
            })
            .count()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
