//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p broadside_client -- [--addr 127.0.0.1:3001] [--name Anne] [--ship galleon]
//!
//! Connects, joins immediately when `--name` or `--ship` is given, then reads
//! console commands from stdin while printing every event the server pushes.
//!
//! Console commands:
//!   join [name] [ship]       - Join the game
//!   move <x> <z> [heading]   - Report a new position
//!   sails <up|down> <angle>  - Adjust sails
//!   fire <direction>         - Fire cannons
//!   ram                      - Ram the nearest ship
//!   status                   - Show the local world mirror
//!   quit                     - Exit client

use std::env;
use std::io::{BufRead, Write};
use std::net::SocketAddr;

use anyhow::Context;
use broadside_client::client::{ClientState, GameClient};
use broadside_shared::{config::DEFAULT_PORT, net::JoinRequest, net::ServerMsg};
use tokio::sync::mpsc;
use tracing::info;

struct Args {
    addr: SocketAddr,
    join: Option<JoinRequest>,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().collect();
    let mut addr = format!("127.0.0.1:{DEFAULT_PORT}");
    let mut name = None;
    let mut ship = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                addr = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                name = Some(args[i + 1].clone());
                i += 2;
            }
            "--ship" if i + 1 < args.len() => {
                ship = Some(args[i + 1].clone());
                i += 2;
            }
            _ => i += 1,
        }
    }

    let join = (name.is_some() || ship.is_some()).then(|| JoinRequest {
        name,
        ship_type: ship,
        customization: None,
    });
    Ok(Args {
        addr: addr.parse().with_context(|| format!("parse --addr {addr}"))?,
        join,
    })
}

fn describe(msg: &ServerMsg) -> String {
    match msg {
        ServerMsg::GameState(snap) => format!(
            "gameState: {} players, you are {}",
            snap.players.len(),
            snap.self_id
        ),
        ServerMsg::PlayerJoined { player, ship } => format!(
            "{} joined ({}) sailing a {}",
            player.name,
            player.id,
            ship.ship_type.as_str()
        ),
        ServerMsg::CannonHit {
            shooter,
            target,
            damage,
            ..
        } => format!("{shooter} hit {target} for {damage}"),
        ServerMsg::ShipCollision {
            rammer,
            rammed,
            rammer_damage,
            rammed_damage,
            ..
        } => format!("{rammer} rammed {rammed} ({rammer_damage}/{rammed_damage})"),
        ServerMsg::ShipDestroyed { id, .. } => format!("{id} was sunk"),
        ServerMsg::PlayerLeft(id) => format!("{id} left"),
        other => other.name().to_string(),
    }
}

enum Step {
    Line(String),
    StdinClosed,
    Event(anyhow::Result<ServerMsg>),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args()?;
    info!(server = %args.addr, "Starting client");

    let mut client = GameClient::connect(args.addr).await.context("connect")?;
    if let Some(req) = args.join {
        let id = client.join(req).await.context("join")?;
        println!("Joined as {id}");
    }

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Stdin is blocking, so it gets its own thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Client connected. Type 'status' for info, 'quit' to exit.");
    println!();

    loop {
        let step = tokio::select! {
            line = console_rx.recv() => match line {
                Some(line) => Step::Line(line),
                None => Step::StdinClosed,
            },
            event = client.recv() => Step::Event(event),
        };

        match step {
            Step::Line(line) => match client.exec_console(&line).await {
                Ok((output, quit)) => {
                    for line in output {
                        println!("{line}");
                    }
                    if quit {
                        break;
                    }
                }
                Err(e) => println!("Error: {e:#}"),
            },
            Step::StdinClosed => break,
            Step::Event(Ok(msg)) => println!("{}", describe(&msg)),
            Step::Event(Err(e)) => {
                if client.state == ClientState::Disconnected {
                    println!("Disconnected from server.");
                    return Ok(());
                }
                return Err(e);
            }
        }
    }

    client.disconnect().await
}
