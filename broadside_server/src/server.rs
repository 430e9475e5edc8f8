//! Server implementation.
//!
//! Accepts TCP connections and gives each one its own session task. The
//! world clock runs alongside on its own task. All tasks share one
//! [`Game`]; there is no global state.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use broadside_shared::{config::ServerConfig, net::ReliableListener};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{clock::spawn_world_clock, game::Game, session::run_session};

/// Game server.
pub struct GameServer {
    game: Arc<Game>,
    tcp: ReliableListener,
}

impl GameServer {
    /// Binds the listener described by `cfg`.
    pub async fn bind(cfg: ServerConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.listen_addr.parse().context("parse listen_addr")?;
        let tcp = ReliableListener::bind(addr, cfg.max_frame_bytes).await?;
        Ok(Self {
            game: Arc::new(Game::new(cfg)),
            tcp,
        })
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    pub fn game(&self) -> Arc<Game> {
        Arc::clone(&self.game)
    }

    /// Accepts connections forever, one session task per client.
    pub async fn run(self) -> anyhow::Result<()> {
        let clock = spawn_world_clock(Arc::clone(&self.game));
        let result = self.accept_loop().await;
        clock.abort();
        result
    }

    async fn accept_loop(&self) -> anyhow::Result<()> {
        loop {
            match self.tcp.accept().await {
                Ok((conn, _peer)) => {
                    tokio::spawn(run_session(Arc::clone(&self.game), conn));
                }
                Err(e) => {
                    // Usually fd exhaustion; back off instead of spinning.
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }

    /// Runs the server on a background task.
    pub fn spawn(self) -> JoinHandle<anyhow::Result<()>> {
        tokio::spawn(self.run())
    }
}

/// Helper for tests: bind to an ephemeral loopback port.
pub async fn bind_ephemeral(cfg: ServerConfig) -> anyhow::Result<(GameServer, SocketAddr)> {
    let cfg = ServerConfig {
        listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string(),
        ..cfg
    };
    let server = GameServer::bind(cfg).await?;
    let addr = server.local_addr()?;
    info!(%addr, "Ephemeral server bound");
    Ok((server, addr))
}
