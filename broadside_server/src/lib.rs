//! `broadside_server`
//!
//! Server-side systems:
//! - Entity store (per-entity locking, join-ordered iteration)
//! - Session manager (join, actions, disconnect cleanup)
//! - Combat dispatch and damage/respawn
//! - Broadcast hub with explicit audiences
//! - World clock (wind drift)
//!
//! Networking model:
//! - TCP: one persistent stream per client, length-prefixed JSON events

pub mod broadcast;
pub mod clock;
pub mod damage;
pub mod game;
pub mod server;
pub mod session;
pub mod store;

pub use game::Game;
pub use server::GameServer;
