//! Wire protocol shared by server and client.
//!
//! Logical message shapes, the version handshake and a length-prefixed
//! bincode framing for reliable ordered streams. The core assumes every packet
//! arrives whole and in send order per connection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MIN_VERSION: u32 = 1;

/// Largest frame accepted by [`read_packet`].
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Two peers can talk when both speak at least [`MIN_VERSION`].
pub fn compatible(local: u32, remote: u32) -> bool {
    remote >= MIN_VERSION && local >= MIN_VERSION
}

/// Checks a peer's advertised version against ours.
pub fn verify_version(remote: u32) -> Result<(), ProtocolError> {
    if compatible(PROTOCOL_VERSION, remote) {
        Ok(())
    } else {
        Err(ProtocolError::IncompatibleVersion {
            local: PROTOCOL_VERSION,
            remote,
        })
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_SIZE} byte limit")]
    FrameTooLarge(usize),
    #[error("incompatible protocol version (local {local}, remote {remote})")]
    IncompatibleVersion { local: u32, remote: u32 },
    #[error("connection rejected: {0}")]
    Rejected(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("unexpected packet: expected {0}")]
    UnexpectedPacket(&'static str),
}

/// Bitmask of logical actions requested for one tick.
///
/// Travels as a bare `u8`; unknown bits are dropped on the way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct Intent(u8);

impl Intent {
    pub const NONE: Intent = Intent(0);
    pub const LEFT: Intent = Intent(1 << 1);
    pub const RIGHT: Intent = Intent(1 << 2);
    pub const JUMP: Intent = Intent(1 << 3);
    pub const ATTACK: Intent = Intent(1 << 4);
    pub const USE: Intent = Intent(1 << 5);

    const ALL: u8 = Self::LEFT.0 | Self::RIGHT.0 | Self::JUMP.0 | Self::ATTACK.0 | Self::USE.0;

    /// Builds an intent from raw bits, dropping unknown ones.
    pub fn from_bits(bits: u8) -> Self {
        Intent(bits & Self::ALL)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Intent) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Intent) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Intent) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Net horizontal direction: -1, 0 or 1. Left and right together cancel.
    pub fn horizontal(self) -> i8 {
        match (self.contains(Intent::LEFT), self.contains(Intent::RIGHT)) {
            (true, false) => -1,
            (false, true) => 1,
            _ => 0,
        }
    }
}

impl From<u8> for Intent {
    fn from(bits: u8) -> Self {
        Intent::from_bits(bits)
    }
}

impl From<Intent> for u8 {
    fn from(intent: Intent) -> Self {
        intent.0
    }
}

impl BitOr for Intent {
    type Output = Intent;

    fn bitor(self, rhs: Intent) -> Intent {
        Intent(self.0 | rhs.0)
    }
}

impl BitOrAssign for Intent {
    fn bitor_assign(&mut self, rhs: Intent) {
        self.0 |= rhs.0;
    }
}

/// Input tagged with the tick it is meant to affect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFrame {
    pub tick: u64,
    pub intents: Intent,
}

impl InputFrame {
    pub fn new(tick: u64, intents: Intent) -> Self {
        Self { tick, intents }
    }
}

/// Network identifier of an entity (arena generation in the high half, slot in the low half).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.0 & 0xFFFF_FFFF, self.0 >> 32)
    }
}

/// One entity's serialized component bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEntity {
    pub id: EntityId,
    pub components: Vec<u8>,
}

/// Server-to-client world state.
///
/// With `full` set, `entities` describes the whole world and `baseline` and
/// `removed` are ignored. Otherwise `entities` holds only entities that are new
/// or changed since the `baseline` tick and `removed` lists those that existed
/// at the baseline but no longer do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub tick: u64,
    pub full: bool,
    pub baseline: u64,
    pub entities: Vec<WireEntity>,
    pub removed: Vec<EntityId>,
}

impl StateSnapshot {
    pub fn full(tick: u64, entities: Vec<WireEntity>) -> Self {
        Self {
            tick,
            full: true,
            baseline: 0,
            entities,
            removed: Vec::new(),
        }
    }
}

/// Exchanged once when a connection opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub version: u32,
    pub player_name: String,
}

impl Handshake {
    pub fn new(player_name: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            player_name: player_name.into(),
        }
    }

    /// Rejects peers whose version cannot talk to ours.
    pub fn verify(&self) -> Result<(), ProtocolError> {
        verify_version(self.version)
    }
}

/// Level dimensions a remote client needs to rebuild the host's level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelInfo {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    // Client to server
    Handshake(Handshake),
    Input { frames: Vec<InputFrame> },
    Ack { tick: u64 },
    RequestFull,
    Ping { timestamp: u64 },
    Disconnect,

    // Server to client
    Accepted {
        version: u32,
        session_id: u32,
        player_id: u32,
        tick: u64,
        level: LevelInfo,
    },
    Rejected { reason: String },
    State(StateSnapshot),
    Pong { timestamp: u64 },
}

pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    Ok(bincode::serialize(packet)?)
}

pub fn decode_packet(bytes: &[u8]) -> Result<Packet, ProtocolError> {
    Ok(bincode::deserialize(bytes)?)
}

/// Writes one length-prefixed packet (u32 big-endian length, then bincode body).
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let body = encode_packet(packet)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(body.len()));
    }
    writer.write_u32(body.len() as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed packet. A clean EOF before the prefix maps to
/// [`ProtocolError::ConnectionClosed`].
pub async fn read_packet<R>(reader: &mut R) -> Result<Packet, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    decode_packet(&body)
}
