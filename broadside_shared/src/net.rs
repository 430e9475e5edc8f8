//! Networking primitives.
//!
//! Goals:
//! - One persistent, bidirectional TCP stream per client.
//! - Length-prefixed frames (4-byte big-endian length, then UTF-8 JSON).
//! - Every frame is an event envelope: `{"event": "<name>", "data": <payload>}`.
//!
//! Reading and writing are split so a session can drain its outbound queue
//! on one task while another task parses inbound frames.

use std::{
    collections::BTreeMap,
    fmt,
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

use tracing::debug;

use crate::{
    math::Vec3,
    model::{Player, Ship, Wind, WorldState},
};

/// Frames larger than this are treated as a protocol violation.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque per-connection key. Never reused within a process.
///
/// Serialized as a string so it can key JSON objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new_unique() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// First five characters of the textual id, used for default names.
    pub fn short(&self) -> String {
        self.to_string().chars().take(5).collect()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ConnectionId> for String {
    fn from(id: ConnectionId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ConnectionId {
    type Error = std::num::ParseIntError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse().map(ConnectionId)
    }
}

// ─── Inbound (client → server) ───

/// Client → server events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMsg {
    Join(JoinRequest),
    UpdatePosition(PositionUpdate),
    ShipAction(ShipAction),
}

/// Every field is optional; the server fills in defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ship_type: Option<String>,
    #[serde(default)]
    pub customization: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PositionUpdate {
    pub position: Vec3,
    pub rotation: Vec3,
}

/// Ship commands, discriminated by the `action` field.
///
/// `position` defaults to the actor's last reported position when omitted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ShipAction {
    AdjustSails {
        raised: bool,
        angle: f32,
    },
    FireCannon {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<Vec3>,
        direction: f32,
    },
    Ram {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<Vec3>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        direction: Option<f32>,
    },
}

impl ClientMsg {
    /// False if any coordinate or angle overflowed `f32` while decoding.
    ///
    /// Such values would be stored and later re-encoded as `null`, which no
    /// client can decode.
    pub fn is_finite(&self) -> bool {
        let opt = |v: Option<Vec3>| v.map_or(true, Vec3::is_finite);
        match self {
            ClientMsg::Join(_) => true,
            ClientMsg::UpdatePosition(u) => u.position.is_finite() && u.rotation.is_finite(),
            ClientMsg::ShipAction(ShipAction::AdjustSails { angle, .. }) => angle.is_finite(),
            ClientMsg::ShipAction(ShipAction::FireCannon {
                position,
                direction,
            }) => opt(*position) && direction.is_finite(),
            ClientMsg::ShipAction(ShipAction::Ram {
                position,
                direction,
            }) => opt(*position) && direction.map_or(true, f32::is_finite),
        }
    }
}

// ─── Outbound (server → client) ───

/// Server → client events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerMsg {
    /// Full snapshot for a player that just joined.
    GameState(GameSnapshot),
    PlayerJoined {
        player: Player,
        ship: Ship,
    },
    PlayerMoved {
        id: ConnectionId,
        position: Vec3,
        rotation: Vec3,
    },
    ShipUpdated {
        id: ConnectionId,
        ship: Ship,
    },
    CannonFired {
        id: ConnectionId,
        position: Vec3,
        direction: f32,
    },
    CannonHit {
        shooter: ConnectionId,
        target: ConnectionId,
        damage: u32,
        position: Vec3,
    },
    ShipCollision {
        rammer: ConnectionId,
        rammed: ConnectionId,
        rammer_damage: u32,
        rammed_damage: u32,
        position: Vec3,
    },
    ShipDestroyed {
        id: ConnectionId,
        position: Vec3,
    },
    Respawn {
        position: Vec3,
        rotation: Vec3,
    },
    CannonsReloaded,
    PlayerLeft(ConnectionId),
    WindChanged(Wind),
}

impl ServerMsg {
    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ServerMsg::GameState(_) => "gameState",
            ServerMsg::PlayerJoined { .. } => "playerJoined",
            ServerMsg::PlayerMoved { .. } => "playerMoved",
            ServerMsg::ShipUpdated { .. } => "shipUpdated",
            ServerMsg::CannonFired { .. } => "cannonFired",
            ServerMsg::CannonHit { .. } => "cannonHit",
            ServerMsg::ShipCollision { .. } => "shipCollision",
            ServerMsg::ShipDestroyed { .. } => "shipDestroyed",
            ServerMsg::Respawn { .. } => "respawn",
            ServerMsg::CannonsReloaded => "cannonsReloaded",
            ServerMsg::PlayerLeft(_) => "playerLeft",
            ServerMsg::WindChanged(_) => "windChanged",
        }
    }
}

/// Everything a newly joined client needs to draw the world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub players: BTreeMap<ConnectionId, Player>,
    pub ships: BTreeMap<ConnectionId, Ship>,
    pub world_state: WorldState,
    pub self_id: ConnectionId,
}

// ─── Framing ───

/// Reads length-prefixed frames.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    max_frame: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame: usize) -> Self {
        Self { inner, max_frame }
    }

    /// Reads one frame payload. `Ok(None)` on a clean close between frames.
    pub async fn read_frame(&mut self) -> anyhow::Result<Option<Bytes>> {
        let mut len_buf = [0u8; 4];
        match self.inner.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e).context("tcp read len"),
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.max_frame {
            anyhow::bail!("frame of {len} bytes exceeds limit of {}", self.max_frame);
        }
        let mut payload = BytesMut::zeroed(len);
        self.inner
            .read_exact(&mut payload)
            .await
            .context("tcp read payload")?;
        Ok(Some(payload.freeze()))
    }

    /// Reads and decodes one frame.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<Option<T>> {
        match self.read_frame().await? {
            Some(payload) => {
                let msg = serde_json::from_slice(&payload).context("deserialize msg")?;
                Ok(Some(msg))
            }
            None => Ok(None),
        }
    }
}

/// Writes length-prefixed frames.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Writes an already-encoded payload.
    pub async fn write_frame(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        let mut buf = BytesMut::with_capacity(4 + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(payload);
        self.inner.write_all(&buf).await.context("tcp write")?;
        Ok(())
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(msg).context("serialize msg")?;
        self.write_frame(&payload).await
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.inner.shutdown().await.context("tcp shutdown")
    }
}

/// Reliable connection over TCP, split into read and write halves.
#[derive(Debug)]
pub struct ReliableConn {
    pub reader: FrameReader<OwnedReadHalf>,
    pub writer: FrameWriter<OwnedWriteHalf>,
    peer: SocketAddr,
}

impl ReliableConn {
    pub fn new(stream: TcpStream, max_frame: usize) -> anyhow::Result<Self> {
        let peer = stream.peer_addr().context("peer addr")?;
        stream.set_nodelay(true).context("set nodelay")?;
        let (read, write) = stream.into_split();
        Ok(Self {
            reader: FrameReader::new(read, max_frame),
            writer: FrameWriter::new(write),
            peer,
        })
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        Self::new(stream, DEFAULT_MAX_FRAME_BYTES)
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        self.writer.send(msg).await
    }

    /// Receives one message; errors if the peer closed the stream.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        self.reader
            .recv()
            .await?
            .context("connection closed by peer")
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn into_split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        (self.reader, self.writer)
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
    max_frame: usize,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr, max_frame: usize) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self {
            listener,
            max_frame,
        })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        debug!(peer = %addr, "Accepted connection");
        Ok((ReliableConn::new(stream, self.max_frame)?, addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Encodes an event once so it can be fanned out to many sessions.
pub fn encode_to_bytes<T: Serialize>(msg: &T) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

/// Decodes an inbound event, refusing numbers that do not fit in `f32`.
pub fn decode_client_msg(b: &[u8]) -> anyhow::Result<ClientMsg> {
    let msg: ClientMsg = serde_json::from_slice(b).context("deserialize client msg")?;
    if !msg.is_finite() {
        anyhow::bail!("client msg carries a non-finite number");
    }
    Ok(msg)
}

pub fn decode_server_msg(b: &[u8]) -> anyhow::Result<ServerMsg> {
    serde_json::from_slice(b).context("deserialize server msg")
}
