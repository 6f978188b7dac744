//! Headless test client: creates a room, drops a sphere into it and prints the
//! states the server sends back.

use shared::{read_packet, write_packet, ObjectRequest, Packet, Vec3};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

const STATES_TO_PRINT: usize = 10;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server_addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string());

    println!("Connecting to {}", server_addr);
    let stream = TcpStream::connect(&server_addr).await?;
    let (mut reader, mut writer) = stream.into_split();

    write_packet(&mut writer, &Packet::CreateRoom).await?;
    let room_id = match read_packet(&mut reader).await? {
        Some(Packet::RoomCreated { room_id }) => room_id,
        other => return Err(format!("expected roomCreated, got {:?}", other).into()),
    };
    println!("Room created: {}", room_id);

    write_packet(
        &mut writer,
        &Packet::JoinRoom {
            room_id: room_id.clone(),
        },
    )
    .await?;
    write_packet(
        &mut writer,
        &Packet::CreateObject {
            room_id: room_id.clone(),
            object: ObjectRequest::sphere(0.5, Vec3::new(0.0, 5.0, 0.0)),
        },
    )
    .await?;

    let mut printed = 0;
    while printed < STATES_TO_PRINT {
        match timeout(Duration::from_secs(2), read_packet(&mut reader)).await {
            Ok(Ok(Some(Packet::PhysicsState { tick, objects, .. }))) => {
                for object in &objects {
                    println!(
                        "tick {:>4} object {} ({}) at ({:.3}, {:.3}, {:.3})",
                        tick,
                        object.id,
                        object.shape.tag(),
                        object.position.x,
                        object.position.y,
                        object.position.z
                    );
                }
                printed += 1;
            }
            Ok(Ok(Some(packet))) => println!("Received packet: {:?}", packet),
            Ok(Ok(None)) => {
                println!("Server closed the connection");
                return Ok(());
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                println!("No state received within 2s");
                break;
            }
        }
    }

    write_packet(
        &mut writer,
        &Packet::ResetScene {
            room_id: room_id.clone(),
        },
    )
    .await?;
    write_packet(&mut writer, &Packet::LeaveRoom { room_id }).await?;
    write_packet(&mut writer, &Packet::Disconnect).await?;
    println!("Done");

    Ok(())
}
