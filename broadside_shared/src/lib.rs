//! `broadside_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - Combat rules are pure and deterministic given a snapshot.
//! - Wire types mirror the JSON events clients already speak.
//! - No `unsafe`.

pub mod combat;
pub mod config;
pub mod math;
pub mod model;
pub mod net;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::combat::*;
    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::model::*;
    pub use crate::net::*;
}
