//! `broadside_client`
//!
//! Headless client-side systems:
//! - Connection management (one reliable event stream)
//! - Action helpers for every inbound event the server accepts
//! - A local world mirror maintained from server events
//!
//! Rendering, audio and input capture live elsewhere.

pub mod client;
pub mod console;
pub mod world;

pub use client::GameClient;
