//! Client implementation.
//!
//! The client maintains:
//! - One reliable stream to the server (events both ways); a reader task
//!   decodes inbound frames into a channel so timeouts never cut a frame
//! - A local mirror of the world, updated from every received event
//! - Helpers for each inbound action the server understands

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use broadside_shared::{
    math::Vec3,
    net::{
        ClientMsg, ConnectionId, FrameReader, FrameWriter, JoinRequest, PositionUpdate,
        ReliableConn, ServerMsg, ShipAction,
    },
};
use tokio::{
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    console::{self, Command},
    world::ClientWorld,
};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Stream open, `join` not yet acknowledged.
    Connected,
    /// `gameState` received.
    Playing,
    /// Stream closed.
    Disconnected,
}

/// High-level game client.
pub struct GameClient {
    pub state: ClientState,
    pub world: ClientWorld,
    writer: FrameWriter<OwnedWriteHalf>,
    inbound: mpsc::Receiver<ServerMsg>,
    reader_task: JoinHandle<()>,
    peer: SocketAddr,
}

async fn read_loop(mut reader: FrameReader<OwnedReadHalf>, tx: mpsc::Sender<ServerMsg>) {
    loop {
        match reader.recv::<ServerMsg>().await {
            Ok(Some(msg)) => {
                if tx.send(msg).await.is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Server stream error");
                return;
            }
        }
    }
}

impl GameClient {
    /// Opens a stream to the server. Call [`GameClient::join`] next.
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        info!(server = %addr, "Connecting to server");
        let conn = ReliableConn::connect(addr).await?;
        let peer = conn.peer_addr();
        let (reader, writer) = conn.into_split();
        let (tx, inbound) = mpsc::channel(256);
        let reader_task = tokio::spawn(read_loop(reader, tx));
        Ok(Self {
            state: ClientState::Connected,
            world: ClientWorld::new(),
            writer,
            inbound,
            reader_task,
            peer,
        })
    }

    pub fn self_id(&self) -> Option<ConnectionId> {
        self.world.self_id
    }

    pub async fn send(&mut self, msg: &ClientMsg) -> anyhow::Result<()> {
        self.writer.send(msg).await
    }

    /// Sends `join` and waits for the `gameState` reply.
    pub async fn join(&mut self, req: JoinRequest) -> anyhow::Result<ConnectionId> {
        self.send(&ClientMsg::Join(req)).await?;
        loop {
            if let ServerMsg::GameState(snap) = self.recv().await? {
                info!(self_id = %snap.self_id, players = snap.players.len(), "Joined game");
                return Ok(snap.self_id);
            }
        }
    }

    pub async fn update_position(&mut self, position: Vec3, rotation: Vec3) -> anyhow::Result<()> {
        self.send(&ClientMsg::UpdatePosition(PositionUpdate { position, rotation }))
            .await
    }

    pub async fn adjust_sails(&mut self, raised: bool, angle: f32) -> anyhow::Result<()> {
        self.send(&ClientMsg::ShipAction(ShipAction::AdjustSails { raised, angle }))
            .await
    }

    /// Fires from the last reported position along `direction`.
    pub async fn fire_cannon(&mut self, direction: f32) -> anyhow::Result<()> {
        self.send(&ClientMsg::ShipAction(ShipAction::FireCannon {
            position: None,
            direction,
        }))
        .await
    }

    pub async fn ram(&mut self) -> anyhow::Result<()> {
        self.send(&ClientMsg::ShipAction(ShipAction::Ram {
            position: None,
            direction: None,
        }))
        .await
    }

    /// Waits for the next event and folds it into the mirror.
    pub async fn recv(&mut self) -> anyhow::Result<ServerMsg> {
        let Some(msg) = self.inbound.recv().await else {
            self.state = ClientState::Disconnected;
            anyhow::bail!("connection closed by server");
        };
        debug!(event = msg.name(), "Event received");
        if matches!(msg, ServerMsg::GameState(_)) {
            self.state = ClientState::Playing;
        }
        self.world.apply(&msg);
        Ok(msg)
    }

    /// Like [`GameClient::recv`], but gives up after `timeout`.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> anyhow::Result<Option<ServerMsg>> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(msg) => msg.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Receives until an event named `name` shows up, returning it.
    pub async fn recv_until(&mut self, name: &str, timeout: Duration) -> anyhow::Result<ServerMsg> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            let msg = self
                .recv_timeout(left)
                .await?
                .with_context(|| format!("timed out waiting for {name}"))?;
            if msg.name() == name {
                return Ok(msg);
            }
        }
    }

    /// Reads whatever arrives within `window`.
    pub async fn drain(&mut self, window: Duration) -> anyhow::Result<Vec<ServerMsg>> {
        let mut out = Vec::new();
        while let Some(msg) = self.recv_timeout(window).await? {
            out.push(msg);
        }
        Ok(out)
    }

    /// Closes the write side so the server sees a clean disconnect.
    pub async fn disconnect(mut self) -> anyhow::Result<()> {
        self.state = ClientState::Disconnected;
        self.writer.shutdown().await?;
        self.reader_task.abort();
        Ok(())
    }

    /// Runs one console line. Returns lines to print and whether to quit.
    pub async fn exec_console(&mut self, line: &str) -> anyhow::Result<(Vec<String>, bool)> {
        let Some(cmd) = console::parse(line)? else {
            return Ok((Vec::new(), false));
        };

        let out = match cmd {
            Command::Join { name, ship } => {
                let id = self
                    .join(JoinRequest {
                        name,
                        ship_type: ship,
                        customization: None,
                    })
                    .await?;
                vec![format!("Joined as {id}")]
            }
            Command::Move { x, z, heading } => {
                self.update_position(Vec3::new(x, 0.0, z), Vec3::new(0.0, heading, 0.0))
                    .await?;
                Vec::new()
            }
            Command::Sails { raised, angle } => {
                self.adjust_sails(raised, angle).await?;
                Vec::new()
            }
            Command::Fire { direction } => {
                self.fire_cannon(direction).await?;
                Vec::new()
            }
            Command::Ram => {
                self.ram().await?;
                Vec::new()
            }
            Command::Status => self.status_lines(),
            Command::Quit => return Ok((vec!["Bye".to_string()], true)),
        };
        Ok((out, false))
    }

    fn status_lines(&self) -> Vec<String> {
        let mut out = vec![format!("State: {:?}", self.state)];
        if let Some(w) = &self.world.world {
            out.push(format!(
                "Wind: direction {:.2} strength {:.2}",
                w.wind.direction, w.wind.strength
            ));
        }
        for (id, p) in &self.world.players {
            let marker = if Some(*id) == self.world.self_id { "*" } else { " " };
            let ship = self.world.ships.get(id);
            out.push(format!(
                "{marker} {id} {:<12} hp {:>3} score {:>3} at ({:.1}, {:.1}) {} loaded={}",
                p.name,
                p.health,
                p.score,
                p.position.x,
                p.position.z,
                ship.map(|s| s.ship_type.as_str()).unwrap_or("?"),
                ship.map(|s| s.cannons.loaded).unwrap_or(false),
            ));
        }
        out
    }

    pub fn server_peer(&self) -> SocketAddr {
        self.peer
    }
}
