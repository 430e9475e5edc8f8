//! Session manager.
//!
//! One session per transport connection:
//!
//! ```text
//! connect ──> Joining ──join──> Active ──close──> Disconnected
//! ```
//!
//! The read loop decodes frames and dispatches them; a separate writer task
//! drains the session's outbound queue so a slow socket only slows itself.
//! Malformed frames are logged and skipped; the connection stays up.

use std::{sync::Arc, time::Duration};

use broadside_shared::net::{decode_client_msg, ClientMsg, ConnectionId, FrameWriter, ReliableConn};
use bytes::Bytes;
use tokio::{io::AsyncWrite, sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::game::Game;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no entity yet.
    Joining,
    /// Player and ship exist.
    Active,
    /// Entity removed; nothing more is processed.
    Disconnected,
}

/// Per-connection state machine.
#[derive(Debug)]
pub struct Session {
    pub id: ConnectionId,
    pub state: SessionState,
}

impl Session {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            state: SessionState::Joining,
        }
    }

    /// Dispatches one inbound message according to the current state.
    pub async fn handle(&mut self, game: &Arc<Game>, msg: ClientMsg) {
        match (self.state, msg) {
            (SessionState::Joining, ClientMsg::Join(req)) => match game.join(self.id, req).await {
                Ok(()) => self.state = SessionState::Active,
                Err(e) => warn!(conn = %self.id, error = %e, "Join failed"),
            },
            (SessionState::Active, ClientMsg::Join(_)) => {
                debug!(conn = %self.id, "Repeated join ignored");
            }
            (SessionState::Active, ClientMsg::UpdatePosition(update)) => {
                game.update_position(self.id, update).await;
            }
            (SessionState::Active, ClientMsg::ShipAction(action)) => {
                game.ship_action(self.id, action).await;
            }
            (SessionState::Joining, _) => {
                debug!(conn = %self.id, "Message before join dropped");
            }
            (SessionState::Disconnected, _) => {}
        }
    }

    /// Removes the entity and announces the departure.
    pub async fn close(&mut self, game: &Game) {
        if self.state != SessionState::Disconnected {
            game.disconnect(self.id).await;
            self.state = SessionState::Disconnected;
        }
    }
}

/// How long a closed session's writer may spend flushing before it is aborted.
pub const WRITER_GRACE: Duration = Duration::from_secs(2);

async fn write_loop<W: AsyncWrite + Unpin>(
    id: ConnectionId,
    mut writer: FrameWriter<W>,
    mut outbound: mpsc::Receiver<Bytes>,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = writer.write_frame(&frame).await {
            debug!(conn = %id, error = %e, "Write failed, stopping writer");
            return;
        }
    }
    let _ = writer.shutdown().await;
}

/// Waits for a writer whose queue has been dropped, aborting it after `grace`.
///
/// A peer that stops reading leaves `write_all` pending forever; the abort
/// releases the task and its socket half.
async fn finish_writer(id: ConnectionId, writer: JoinHandle<()>, grace: Duration) {
    let abort = writer.abort_handle();
    if tokio::time::timeout(grace, writer).await.is_err() {
        debug!(conn = %id, "Writer stalled, aborting");
        abort.abort();
    }
}

/// Serves one connection until the peer goes away.
pub async fn run_session(game: Arc<Game>, conn: ReliableConn) {
    let peer = conn.peer_addr();
    let (id, outbound) = game.connect().await;
    info!(conn = %id, addr = %peer, "Player connected");

    let (mut reader, writer) = conn.into_split();
    let writer = tokio::spawn(write_loop(id, writer, outbound));

    let mut session = Session::new(id);
    loop {
        match reader.read_frame().await {
            Ok(Some(frame)) => match decode_client_msg(&frame) {
                Ok(msg) => session.handle(&game, msg).await,
                Err(e) => warn!(conn = %id, error = %e, "Rejected malformed message"),
            },
            Ok(None) => break,
            Err(e) => {
                warn!(conn = %id, error = %e, "Connection error");
                break;
            }
        }
    }

    session.close(&game).await;
    finish_writer(id, writer, WRITER_GRACE).await;
    info!(conn = %id, "Player disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use broadside_shared::{
        config::ServerConfig,
        math::Vec3,
        net::{JoinRequest, PositionUpdate, ShipAction},
    };

    #[tokio::test]
    async fn state_machine_walks_join_to_disconnect() {
        let game = Arc::new(Game::new(ServerConfig::default()));
        let (id, _rx) = game.connect().await;
        let mut session = Session::new(id);

        let pose = PositionUpdate {
            position: Vec3::new(1.0, 0.0, 1.0),
            rotation: Vec3::ZERO,
        };
        session.handle(&game, ClientMsg::UpdatePosition(pose)).await;
        assert_eq!(session.state, SessionState::Joining);
        assert!(!game.store.contains(id).await);

        session.handle(&game, ClientMsg::Join(JoinRequest::default())).await;
        assert_eq!(session.state, SessionState::Active);
        assert!(game.store.contains(id).await);

        session.handle(&game, ClientMsg::Join(JoinRequest::default())).await;
        assert_eq!(game.store.len().await, 1);

        session.handle(&game, ClientMsg::UpdatePosition(pose)).await;
        assert_eq!(game.store.get(id).await.unwrap().0.position, pose.position);

        session.close(&game).await;
        assert_eq!(session.state, SessionState::Disconnected);
        assert!(!game.store.contains(id).await);

        session
            .handle(
                &game,
                ClientMsg::ShipAction(ShipAction::AdjustSails {
                    raised: true,
                    angle: 0.0,
                }),
            )
            .await;
        assert!(game.store.is_empty().await);
    }

    #[tokio::test]
    async fn writer_drains_queue_then_shuts_down() -> anyhow::Result<()> {
        use broadside_shared::net::{FrameReader, DEFAULT_MAX_FRAME_BYTES};

        let (a, b) = tokio::io::duplex(4096);
        let (tx, rx) = mpsc::channel(4);
        tx.send(Bytes::from_static(b"{\"event\":\"cannonsReloaded\"}")).await?;
        drop(tx);
        write_loop(ConnectionId::new_unique(), FrameWriter::new(a), rx).await;

        let mut reader = FrameReader::new(b, DEFAULT_MAX_FRAME_BYTES);
        assert!(reader.read_frame().await?.is_some());
        assert!(reader.read_frame().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn stalled_writer_is_aborted_after_grace() {
        // The far end of the pipe is kept alive but never read.
        let (near, _far) = tokio::io::duplex(8);
        let (tx, rx) = mpsc::channel(4);
        let id = ConnectionId::new_unique();
        let writer = tokio::spawn(write_loop(id, FrameWriter::new(near), rx));
        let abort = writer.abort_handle();

        tx.send(Bytes::from_static(&[b'x'; 64])).await.unwrap();
        drop(tx);

        tokio::time::timeout(
            Duration::from_secs(2),
            finish_writer(id, writer, Duration::from_millis(50)),
        )
        .await
        .expect("finish_writer returns after its grace period");
        tokio::time::timeout(Duration::from_secs(1), async {
            while !abort.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("writer task aborted");
    }

    #[tokio::test]
    async fn drained_writer_finishes_on_its_own() {
        let (near, mut far) = tokio::io::duplex(1024);
        let (tx, rx) = mpsc::channel(4);
        let id = ConnectionId::new_unique();
        let writer = tokio::spawn(write_loop(id, FrameWriter::new(near), rx));

        tx.send(Bytes::from_static(b"{}")).await.unwrap();
        drop(tx);
        finish_writer(id, writer, Duration::from_secs(2)).await;

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut far, &mut buf).await.unwrap();
        assert_eq!(buf, [0, 0, 0, 2, b'{', b'}']);
    }
}
