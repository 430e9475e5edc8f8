//! Console command parsing for the interactive client.
//!
//! Grammar, one command per line:
//!   join [name] [ship]       - join as `name` sailing a sloop/frigate/galleon
//!   move <x> <z> [heading]   - report a new position (heading in radians)
//!   sails <up|down> <angle>  - raise or lower sails and set their angle
//!   fire <direction>         - fire cannons along a heading
//!   ram                      - ram the nearest ship
//!   status                   - print the local mirror
//!   quit                     - disconnect and exit

use anyhow::{bail, Context};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Join {
        name: Option<String>,
        ship: Option<String>,
    },
    Move {
        x: f32,
        z: f32,
        heading: f32,
    },
    Sails {
        raised: bool,
        angle: f32,
    },
    Fire {
        direction: f32,
    },
    Ram,
    Status,
    Quit,
}

fn number(token: Option<&&str>, what: &str) -> anyhow::Result<f32> {
    let token = token.with_context(|| format!("missing {what}"))?;
    token
        .parse()
        .with_context(|| format!("{what} must be a number, got '{token}'"))
}

/// Parses one console line. `Ok(None)` for blank input.
pub fn parse(line: &str) -> anyhow::Result<Option<Command>> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(head) = tokens.first() else {
        return Ok(None);
    };

    let cmd = match *head {
        "join" => Command::Join {
            name: tokens.get(1).map(|s| s.to_string()),
            ship: tokens.get(2).map(|s| s.to_string()),
        },
        "move" => Command::Move {
            x: number(tokens.get(1), "x")?,
            z: number(tokens.get(2), "z")?,
            heading: match tokens.get(3) {
                Some(_) => number(tokens.get(3), "heading")?,
                None => 0.0,
            },
        },
        "sails" => {
            let raised = match tokens.get(1).copied() {
                Some("up") => true,
                Some("down") => false,
                other => bail!("Usage: sails <up|down> <angle> (got {other:?})"),
            };
            Command::Sails {
                raised,
                angle: number(tokens.get(2), "angle")?,
            }
        }
        "fire" => Command::Fire {
            direction: number(tokens.get(1), "direction")?,
        },
        "ram" => Command::Ram,
        "status" => Command::Status,
        "quit" | "exit" => Command::Quit,
        other => bail!("Unknown command '{other}'"),
    };
    Ok(Some(cmd))
}
