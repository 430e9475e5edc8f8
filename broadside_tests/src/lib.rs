//! Shared fixtures for the integration tests.
//!
//! Every test gets its own server on an ephemeral loopback port, so tests
//! can run in parallel without sharing players.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use broadside_client::GameClient;
use broadside_server::{game::Game, server::bind_ephemeral};
use broadside_shared::{
    config::ServerConfig,
    math::Vec3,
    net::{ConnectionId, JoinRequest, ServerMsg},
};
use tokio::task::JoinHandle;

/// How long a test waits for an event it expects.
pub const WAIT: Duration = Duration::from_secs(3);

/// A server running on a background task.
pub struct TestServer {
    pub addr: SocketAddr,
    pub game: Arc<Game>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Routes server logs through the test harness' captured output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Config with short timers so reload and wind tests finish quickly.
pub fn fast_config() -> ServerConfig {
    ServerConfig {
        reload_ms: 100,
        ..ServerConfig::default()
    }
}

pub async fn start_server(cfg: ServerConfig) -> anyhow::Result<TestServer> {
    init_tracing();
    let (server, addr) = bind_ephemeral(cfg).await?;
    let game = server.game();
    let handle = server.spawn();
    Ok(TestServer { addr, game, handle })
}

/// Connects and joins with the given name and ship type.
pub async fn join_as(
    addr: SocketAddr,
    name: &str,
    ship: &str,
) -> anyhow::Result<(GameClient, ConnectionId)> {
    let mut client = GameClient::connect(addr).await?;
    let id = client
        .join(JoinRequest {
            name: Some(name.to_string()),
            ship_type: Some(ship.to_string()),
            customization: None,
        })
        .await?;
    Ok((client, id))
}

/// Moves `client` to `(x, 0, z)` and waits until `observer` has seen it,
/// which means the server has stored the new position.
pub async fn place(
    client: &mut GameClient,
    observer: &mut GameClient,
    x: f32,
    z: f32,
) -> anyhow::Result<()> {
    let position = Vec3::new(x, 0.0, z);
    client.update_position(position, Vec3::ZERO).await?;
    let me = client.self_id();
    loop {
        observer.recv_until("playerMoved", WAIT).await?;
        let seen = me
            .and_then(|id| observer.world.players.get(&id))
            .map(|p| p.position);
        if seen == Some(position) {
            return Ok(());
        }
    }
}

/// Collects events up to and including the first one named `name`.
pub async fn events_until(client: &mut GameClient, name: &str) -> anyhow::Result<Vec<ServerMsg>> {
    let mut out = Vec::new();
    loop {
        let msg = client
            .recv_timeout(WAIT)
            .await?
            .with_context(|| format!("timed out waiting for {name}"))?;
        let done = msg.name() == name;
        out.push(msg);
        if done {
            return Ok(out);
        }
    }
}

pub fn names(events: &[ServerMsg]) -> Vec<&'static str> {
    events.iter().map(ServerMsg::name).collect()
}
