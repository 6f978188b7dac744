//! Server network layer: TCP sessions, room event routing and the tick loop

use crate::config::ServerConfig;
use crate::connection_manager::{outbox, ConnectionId, ConnectionManager, Delivery, OutboxReceiver};
use crate::registry::{generate_room_id, DispatchOutcome, RoomEvent, RoomRegistry};
use crate::room::Snapshot;
use log::{debug, error, info, warn};
use shared::{read_packet, write_packet, Packet};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    Accepted {
        stream: TcpStream,
        addr: SocketAddr,
    },
    PacketReceived {
        connection_id: ConnectionId,
        packet: Packet,
    },
    ConnectionClosed {
        connection_id: ConnectionId,
    },
}

/// Everything the main loop mutates. Only ever touched from that loop, so
/// room state needs no locking.
pub struct ServerState {
    pub connections: ConnectionManager,
    pub registry: RoomRegistry,
    outbox_capacity: usize,
}

impl ServerState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            connections: ConnectionManager::new(config.max_connections),
            registry: RoomRegistry::new(config.simulation()),
            outbox_capacity: config.outbox_capacity.max(1),
        }
    }

    /// Processes one packet from a connection. Packets still in flight from a
    /// connection that has already disconnected are ignored.
    pub fn handle_packet(&mut self, connection_id: ConnectionId, packet: Packet) {
        if !self.connections.contains(connection_id) {
            debug!("Ignoring packet from closed connection {}", connection_id);
            return;
        }

        match packet {
            Packet::CreateRoom => {
                // Only a token is minted; the room exists once someone joins it.
                let room_id = generate_room_id();
                info!("Connection {} requested room {}", connection_id, room_id);
                self.connections
                    .send_to(connection_id, Packet::RoomCreated { room_id });
            }

            Packet::JoinRoom { room_id } => {
                if room_id.is_empty() {
                    debug!("Connection {} sent an empty room id", connection_id);
                    return;
                }
                self.registry.join(&room_id, connection_id, Instant::now());
                self.connections
                    .send_to(connection_id, Packet::JoinedRoom { room_id });
            }

            Packet::CreateObject { room_id, object } => {
                if let Err(e) = self
                    .registry
                    .dispatch(&room_id, RoomEvent::CreateObject(object))
                {
                    warn!("Ignoring createObject from {}: {}", connection_id, e);
                }
            }

            Packet::ResetScene { room_id } => {
                match self.registry.dispatch(&room_id, RoomEvent::Reset) {
                    Ok(DispatchOutcome::Snapshot(snapshot)) => {
                        // Later ticks stay silent, so this one must arrive.
                        self.broadcast_snapshot(snapshot, Delivery::Reliable)
                    }
                    Ok(DispatchOutcome::ObjectCreated(_)) => {}
                    Err(e) => warn!("Ignoring resetScene from {}: {}", connection_id, e),
                }
            }

            Packet::LeaveRoom { room_id } => {
                if let Err(e) = self.registry.leave(&room_id, connection_id) {
                    warn!("Ignoring leaveRoom from {}: {}", connection_id, e);
                }
            }

            Packet::Disconnect => self.close_connection(connection_id),

            Packet::RoomCreated { .. } | Packet::JoinedRoom { .. } | Packet::PhysicsState { .. } => {
                warn!("Unexpected server-only packet from connection {}", connection_id);
            }
        }
    }

    /// Leaves every room of the connection and forgets it. Safe to call twice.
    pub fn close_connection(&mut self, connection_id: ConnectionId) {
        let left = self.registry.disconnect(connection_id);
        if !left.is_empty() {
            debug!("Connection {} left rooms {:?}", connection_id, left);
        }
        self.connections.remove_connection(connection_id);
    }

    /// Runs all due room ticks and broadcasts their snapshots.
    pub fn run_due_ticks(&mut self, now: Instant) {
        for snapshot in self.registry.tick_due(now) {
            self.broadcast_snapshot(snapshot, Delivery::Droppable);
        }
    }

    fn broadcast_snapshot(&mut self, snapshot: Snapshot, delivery: Delivery) {
        let recipients: Vec<ConnectionId> = match self.registry.get(&snapshot.room_id) {
            Some(room) => room.participants().collect(),
            None => return,
        };
        self.connections
            .broadcast(recipients, &snapshot.into_packet(), delivery);
    }
}

/// TCP room server
pub struct Server {
    listener: TcpListener,
    state: ServerState,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn bind(config: &ServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.address()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        Ok(Self {
            listener,
            state: ServerState::new(config),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Main server loop: network events and room ticks, interleaved on one task.
    pub async fn run(self) -> std::io::Result<()> {
        let Server {
            listener,
            mut state,
            server_tx,
            mut server_rx,
        } = self;

        spawn_acceptor(listener, server_tx.clone());
        info!("Server started successfully");

        loop {
            let deadline = state.registry.next_deadline();

            tokio::select! {
                message = server_rx.recv() => {
                    match message {
                        Some(ServerMessage::Accepted { stream, addr }) => {
                            accept_connection(&mut state, &server_tx, stream, addr);
                        }
                        Some(ServerMessage::PacketReceived { connection_id, packet }) => {
                            state.handle_packet(connection_id, packet);
                        }
                        Some(ServerMessage::ConnectionClosed { connection_id }) => {
                            state.close_connection(connection_id);
                        }
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = sleep_until_deadline(deadline) => {
                    state.run_due_ticks(Instant::now());
                },
            }
        }

        Ok(())
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Spawns the task that accepts incoming TCP connections
fn spawn_acceptor(listener: TcpListener, server_tx: mpsc::UnboundedSender<ServerMessage>) {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                    }
                    if server_tx
                        .send(ServerMessage::Accepted { stream, addr })
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                }
            }
        }
    });
}

fn accept_connection(
    state: &mut ServerState,
    server_tx: &mpsc::UnboundedSender<ServerMessage>,
    stream: TcpStream,
    addr: SocketAddr,
) {
    let (outbox_tx, outbox_rx) = outbox(state.outbox_capacity);
    let Some(connection_id) = state.connections.add_connection(addr, outbox_tx) else {
        // Dropping the stream closes it.
        return;
    };

    let (reader, writer) = stream.into_split();
    spawn_reader(connection_id, reader, server_tx.clone());
    spawn_writer(connection_id, writer, outbox_rx);
}

/// Spawns the task that decodes frames from one connection
fn spawn_reader(
    connection_id: ConnectionId,
    mut reader: OwnedReadHalf,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    tokio::spawn(async move {
        loop {
            match read_packet(&mut reader).await {
                Ok(Some(packet)) => {
                    if server_tx
                        .send(ServerMessage::PacketReceived {
                            connection_id,
                            packet,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Dropping connection {}: {}", connection_id, e);
                    break;
                }
            }
        }
        let _ = server_tx.send(ServerMessage::ConnectionClosed { connection_id });
    });
}

/// Spawns the task that drains one connection's outbox onto the socket
fn spawn_writer(
    connection_id: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut outbox_rx: OutboxReceiver,
) {
    tokio::spawn(async move {
        while let Some(packet) = outbox_rx.recv().await {
            if let Err(e) = write_packet(&mut writer, &packet).await {
                debug!("Write to connection {} failed: {}", connection_id, e);
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{ObjectRequest, Vec3};

    struct Harness {
        state: ServerState,
        outboxes: Vec<OutboxReceiver>,
        capacity: usize,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_capacity(16)
        }

        fn with_capacity(capacity: usize) -> Self {
            Self {
                state: ServerState::new(&ServerConfig::default()),
                outboxes: Vec::new(),
                capacity,
            }
        }

        fn connect(&mut self) -> ConnectionId {
            let (tx, rx) = outbox(self.capacity);
            let addr: SocketAddr = format!("127.0.0.1:{}", 9000 + self.outboxes.len())
                .parse()
                .unwrap();
            self.outboxes.push(rx);
            self.state.connections.add_connection(addr, tx).unwrap()
        }

        fn drain(&mut self, connection_id: ConnectionId) -> Vec<Packet> {
            let rx = &mut self.outboxes[connection_id as usize - 1];
            std::iter::from_fn(|| rx.try_recv()).collect()
        }
    }

    fn sphere() -> ObjectRequest {
        ObjectRequest::sphere(0.5, Vec3::new(0.0, 5.0, 0.0))
    }

    #[test]
    fn test_create_room_only_mints_token() {
        let mut harness = Harness::new();
        let id = harness.connect();

        harness.state.handle_packet(id, Packet::CreateRoom);

        let packets = harness.drain(id);
        assert_eq!(packets.len(), 1);
        match &packets[0] {
            Packet::RoomCreated { room_id } => assert_eq!(room_id.len(), 6),
            other => panic!("unexpected packet {:?}", other),
        }
        assert!(harness.state.registry.is_empty());
    }

    #[test]
    fn test_join_replies_and_starts_room() {
        let mut harness = Harness::new();
        let id = harness.connect();

        harness.state.handle_packet(
            id,
            Packet::JoinRoom {
                room_id: "AB12CD".to_string(),
            },
        );

        assert_eq!(
            harness.drain(id),
            vec![Packet::JoinedRoom {
                room_id: "AB12CD".to_string()
            }]
        );
        assert!(harness.state.registry.get("AB12CD").unwrap().is_running());
    }

    #[test]
    fn test_empty_room_id_is_ignored() {
        let mut harness = Harness::new();
        let id = harness.connect();

        harness.state.handle_packet(
            id,
            Packet::JoinRoom {
                room_id: String::new(),
            },
        );

        assert!(harness.drain(id).is_empty());
        assert!(harness.state.registry.is_empty());
    }

    #[test]
    fn test_unknown_room_events_are_ignored() {
        let mut harness = Harness::new();
        let id = harness.connect();

        harness.state.handle_packet(
            id,
            Packet::CreateObject {
                room_id: "NOPE00".to_string(),
                object: sphere(),
            },
        );
        harness.state.handle_packet(
            id,
            Packet::ResetScene {
                room_id: "NOPE00".to_string(),
            },
        );
        harness.state.handle_packet(
            id,
            Packet::LeaveRoom {
                room_id: "NOPE00".to_string(),
            },
        );

        assert!(harness.drain(id).is_empty());
        assert!(harness.state.registry.is_empty());
    }

    #[test]
    fn test_reset_broadcasts_empty_state_to_room_only() {
        let mut harness = Harness::new();
        let a = harness.connect();
        let b = harness.connect();
        let outsider = harness.connect();
        let room_id = "AB12CD".to_string();

        for id in [a, b] {
            harness.state.handle_packet(
                id,
                Packet::JoinRoom {
                    room_id: room_id.clone(),
                },
            );
        }
        harness.state.handle_packet(
            a,
            Packet::CreateObject {
                room_id: room_id.clone(),
                object: sphere(),
            },
        );
        harness.drain(a);
        harness.drain(b);

        harness.state.handle_packet(
            b,
            Packet::ResetScene {
                room_id: room_id.clone(),
            },
        );

        for id in [a, b] {
            match harness.drain(id).as_slice() {
                [Packet::PhysicsState { objects, .. }] => assert!(objects.is_empty()),
                other => panic!("unexpected packets {:?}", other),
            }
        }
        assert!(harness.drain(outsider).is_empty());
    }

    #[test]
    fn test_ticks_broadcast_physics_state() {
        let mut harness = Harness::new();
        let id = harness.connect();
        harness.state.handle_packet(
            id,
            Packet::JoinRoom {
                room_id: "AB12CD".to_string(),
            },
        );
        harness.state.handle_packet(
            id,
            Packet::CreateObject {
                room_id: "AB12CD".to_string(),
                object: sphere(),
            },
        );
        harness.drain(id);

        let deadline = harness.state.registry.next_deadline().unwrap();
        harness.state.run_due_ticks(deadline);

        match harness.drain(id).as_slice() {
            [Packet::PhysicsState {
                room_id, objects, ..
            }] => {
                assert_eq!(room_id, "AB12CD");
                assert_eq!(objects.len(), 1);
                assert_eq!(objects[0].id, 0);
            }
            other => panic!("unexpected packets {:?}", other),
        }
    }

    #[test]
    fn test_disconnect_packet_leaves_rooms() {
        let mut harness = Harness::new();
        let id = harness.connect();
        for room_id in ["ROOM01", "ROOM02"] {
            harness.state.handle_packet(
                id,
                Packet::JoinRoom {
                    room_id: room_id.to_string(),
                },
            );
        }

        harness.state.handle_packet(id, Packet::Disconnect);

        assert!(harness.state.registry.is_empty());
        assert!(harness.state.connections.is_empty());

        // The reader task reports the closed socket afterwards.
        harness.state.close_connection(id);
        assert!(harness.state.connections.is_empty());
    }

    #[test]
    fn test_packets_after_disconnect_are_ignored() {
        let mut harness = Harness::new();
        let id = harness.connect();
        harness.state.handle_packet(id, Packet::Disconnect);

        // Still buffered in the reader task when the disconnect was handled.
        harness.state.handle_packet(
            id,
            Packet::JoinRoom {
                room_id: "AB12CD".to_string(),
            },
        );
        harness.state.handle_packet(id, Packet::CreateRoom);

        assert!(harness.state.registry.is_empty());
        assert!(harness.drain(id).is_empty());
    }

    #[test]
    fn test_reset_state_survives_saturated_outbox() {
        let mut harness = Harness::with_capacity(1);
        let id = harness.connect();
        let room_id = "AB12CD".to_string();

        harness.state.handle_packet(
            id,
            Packet::JoinRoom {
                room_id: room_id.clone(),
            },
        );
        harness.state.handle_packet(
            id,
            Packet::CreateObject {
                room_id: room_id.clone(),
                object: sphere(),
            },
        );

        // The writer is stalled: two ticks, only one state fits.
        let first = harness.state.registry.next_deadline().unwrap();
        harness.state.run_due_ticks(first);
        let second = harness.state.registry.next_deadline().unwrap();
        harness.state.run_due_ticks(second);

        harness.state.handle_packet(
            id,
            Packet::ResetScene {
                room_id: room_id.clone(),
            },
        );

        let packets = harness.drain(id);
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0], Packet::JoinedRoom { room_id });
        match packets.as_slice() {
            [_, Packet::PhysicsState { objects: ticked, .. }, Packet::PhysicsState { objects: reset, .. }] =>
            {
                assert_eq!(ticked.len(), 1);
                assert!(reset.is_empty());
            }
            other => panic!("unexpected packets {:?}", other),
        }
    }

    #[test]
    fn test_server_only_packets_are_ignored() {
        let mut harness = Harness::new();
        let id = harness.connect();

        harness.state.handle_packet(
            id,
            Packet::PhysicsState {
                room_id: "AB12CD".to_string(),
                tick: 1,
                objects: Vec::new(),
            },
        );

        assert!(harness.drain(id).is_empty());
        assert!(harness.state.registry.is_empty());
    }
}
