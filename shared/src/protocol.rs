//! Session protocol between clients and the room server.
//!
//! Packets are bincode-encoded and sent as frames: a big-endian `u32` payload
//! length followed by the payload. Every `PhysicsState` is self-contained; a
//! client that missed earlier states only relies on an object id keeping its
//! meaning until the id disappears from a later state.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::shape::Shape;

/// Largest payload accepted on the wire.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Short uppercase token naming a room.
pub type RoomId = String;
/// Per-room object number, assigned from 0 in creation order.
pub type ObjectId = u32;

/// Wire form of a position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<Vector3<f32>> for Vec3 {
    fn from(v: Vector3<f32>) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<Vec3> for Vector3<f32> {
    fn from(v: Vec3) -> Self {
        Vector3::new(v.x, v.y, v.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

impl From<UnitQuaternion<f32>> for Quat {
    fn from(q: UnitQuaternion<f32>) -> Self {
        let c = q.quaternion().coords;
        Self {
            x: c.x,
            y: c.y,
            z: c.z,
            w: c.w,
        }
    }
}

impl From<Quat> for UnitQuaternion<f32> {
    /// Normalizes on the way in; a degenerate quaternion maps to identity.
    fn from(q: Quat) -> Self {
        let raw = Quaternion::new(q.w, q.x, q.y, q.z);
        if raw.norm() > f32::EPSILON && raw.norm().is_finite() {
            UnitQuaternion::from_quaternion(raw)
        } else {
            UnitQuaternion::identity()
        }
    }
}

/// One object in a room snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectState {
    pub id: ObjectId,
    pub shape: Shape,
    pub position: Vec3,
    pub quaternion: Quat,
}

/// Object creation request as sent by a client. The type tag stays a string
/// here so that unsupported shapes can be received, logged and dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub position: Vec3,
    pub radius: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub depth: Option<f32>,
}

impl ObjectRequest {
    pub fn sphere(radius: f32, position: Vec3) -> Self {
        Self {
            kind: "sphere".to_string(),
            position,
            radius: Some(radius),
            width: None,
            height: None,
            depth: None,
        }
    }

    pub fn cuboid(width: f32, height: f32, depth: f32, position: Vec3) -> Self {
        Self {
            kind: "box".to_string(),
            position,
            radius: None,
            width: Some(width),
            height: Some(height),
            depth: Some(depth),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    // Client -> server
    CreateRoom,
    JoinRoom {
        room_id: RoomId,
    },
    CreateObject {
        room_id: RoomId,
        object: ObjectRequest,
    },
    ResetScene {
        room_id: RoomId,
    },
    LeaveRoom {
        room_id: RoomId,
    },
    Disconnect,

    // Server -> client
    RoomCreated {
        room_id: RoomId,
    },
    JoinedRoom {
        room_id: RoomId,
    },
    PhysicsState {
        room_id: RoomId,
        tick: u64,
        objects: Vec<ObjectState>,
    },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },
}

/// Encodes a packet into a length-prefixed frame.
pub fn encode_frame(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    let payload = bincode::serialize(packet)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Reads the next packet. Returns `Ok(None)` when the stream ends cleanly on
/// a frame boundary.
pub async fn read_packet<R>(reader: &mut R) -> Result<Option<Packet>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(bincode::deserialize(&payload)?))
}

pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(packet)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
