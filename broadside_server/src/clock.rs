//! World clock.
//!
//! Drifts the wind on a fixed period, independent of player activity. The
//! wind is not tied to any entity, so a tick never needs to check who is
//! still connected.

use std::sync::Arc;

use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::info;

use crate::game::Game;

/// Ticks forever. Cancel by aborting the task.
pub async fn run_world_clock(game: Arc<Game>) {
    let period = game.cfg.wind_period();
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Skip the first tick since it fires immediately.
    timer.tick().await;

    info!(period_ms = period.as_millis() as u64, "World clock started");
    loop {
        timer.tick().await;
        game.tick_wind().await;
    }
}

pub fn spawn_world_clock(game: Arc<Game>) -> JoinHandle<()> {
    tokio::spawn(run_world_clock(game))
}
