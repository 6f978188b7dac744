//! Background network thread: owns a tokio runtime and the TCP session, and
//! hands packets to the render loop through a queue drained between frames.

use log::{debug, error, info, warn};
use shared::{read_packet, write_packet, Packet, ProtocolError};
use std::sync::mpsc as std_mpsc;
use std::thread;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// What the network thread reports to the render loop.
/// What the network thread reports to the render loop.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    Connected,
    Packet(Packet),
    Disconnected(String),
}

/// Render-loop side of the network thread.
pub struct NetworkHandle {
    /// Packets to write to the server.
    outbound: mpsc::UnboundedSender<Packet>,
    inbound: std_mpsc::Receiver<NetworkEvent>,
}

impl NetworkHandle {
    /// Starts the network thread and begins connecting to `server_addr`.
    pub fn spawn(server_addr: String) -> std::io::Result<Self> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = std_mpsc::channel();

        thread::Builder::new()
            .name("network".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = inbound_tx.send(NetworkEvent::Disconnected(e.to_string()));
                        return;
                    }
                };

                let result = runtime.block_on(run_session(
                    &server_addr,
                    outbound_rx,
                    inbound_tx.clone(),
                ));
                let reason = match result {
                    Ok(()) => "connection closed".to_string(),
                    Err(e) => {
                        error!("Network error: {}", e);
                        e.to_string()
                    }
                };
                let _ = inbound_tx.send(NetworkEvent::Disconnected(reason));
            })?;

        Ok(Self {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }

    /// Queues a packet for the server. Returns false once the session is gone.
    pub fn send(&self, packet: Packet) -> bool {
        self.outbound.send(packet).is_ok()
    }

    /// Everything that arrived since the last call, without blocking.
    pub fn poll(&self) -> Vec<NetworkEvent> {
        self.inbound.try_iter().collect()
    }
}

/// Runs one TCP session until the server closes it or the handle is dropped.
pub async fn run_session(
    server_addr: &str,
    mut outbound: mpsc::UnboundedReceiver<Packet>,
    inbound: std_mpsc::Sender<NetworkEvent>,
) -> Result<(), ProtocolError> {
    info!("Connecting to {}", server_addr);
    let stream = TcpStream::connect(server_addr).await?;
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();

    if inbound.send(NetworkEvent::Connected).is_err() {
        return Ok(());
    }
    info!("Connected to {}", server_addr);

    let reader_inbound = inbound.clone();
    let mut reader_task = tokio::spawn(async move {
        loop {
            match read_packet(&mut reader).await {
                Ok(Some(packet)) => {
                    if reader_inbound.send(NetworkEvent::Packet(packet)).is_err() {
                        return Ok(());
                    }
                }
                Ok(None) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    });

    loop {
        tokio::select! {
            packet = outbound.recv() => {
                match packet {
                    Some(packet) => {
                        let disconnecting = packet == Packet::Disconnect;
                        write_packet(&mut writer, &packet).await?;
                        if disconnecting {
                            debug!("Sent disconnect");
                            return Ok(());
                        }
                    }
                    None => return Ok(()),
                }
            }
            result = &mut reader_task => {
                return match result {
                    Ok(inner) => inner,
                    Err(e) => {
                        warn!("Reader task failed: {}", e);
                        Ok(())
                    }
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_session_forwards_packets_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = stream.into_split();
            let received = read_packet(&mut reader).await.unwrap();
            write_packet(
                &mut writer,
                &Packet::RoomCreated {
                    room_id: "AB12CD".to_string(),
                },
            )
            .await
            .unwrap();
            received
        });

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = std_mpsc::channel();
        outbound_tx.send(Packet::CreateRoom).unwrap();

        let session = tokio::spawn(async move { run_session(&addr, outbound_rx, inbound_tx).await });

        assert_eq!(server.await.unwrap(), Some(Packet::CreateRoom));
        // The server side closes after replying, which ends the session.
        session.await.unwrap().unwrap();

        let events: Vec<NetworkEvent> = inbound_rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                NetworkEvent::Connected,
                NetworkEvent::Packet(Packet::RoomCreated {
                    room_id: "AB12CD".to_string()
                }),
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let (_outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = std_mpsc::channel();

        let result = run_session(&addr, outbound_rx, inbound_tx).await;
        assert!(matches!(result, Err(ProtocolError::Io(_))));
        assert!(inbound_rx.try_iter().next().is_none());
    }

    #[test]
    fn test_handle_reports_unreachable_server() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let handle = NetworkHandle::spawn(addr).unwrap();
        let event = handle
            .inbound
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap();
        assert!(matches!(event, NetworkEvent::Disconnected(_)));
    }
}
