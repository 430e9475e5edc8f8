//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p broadside_server -- [--port 3001] [--addr 0.0.0.0:3001] [--config server.json]
//!
//! `PORT` in the environment sets the listen port when `--port` is absent.
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::env;

use anyhow::Context;
use broadside_server::server::GameServer;
use broadside_shared::config::ServerConfig;
use tracing::info;

fn parse_args() -> anyhow::Result<ServerConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = ServerConfig::default();
    if let Some(i) = args.iter().position(|a| a == "--config") {
        let path = args.get(i + 1).context("--config needs a path")?;
        let text = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
        cfg = ServerConfig::from_json_str(&text).with_context(|| format!("parse {path}"))?;
    }

    if let Ok(port) = env::var("PORT") {
        cfg.set_port(port.parse().context("parse PORT")?);
    }

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.listen_addr = args[i + 1].clone();
                i += 2;
            }
            "--port" if i + 1 < args.len() => {
                cfg.set_port(args[i + 1].parse().context("parse --port")?);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(addr = %cfg.listen_addr, reload_ms = cfg.reload_ms, wind_period_ms = cfg.wind_period_ms, "Starting server");

    let server = GameServer::bind(cfg).await.context("create server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening");

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    }
}
