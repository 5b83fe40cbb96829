//! `sync_shared`
//!
//! Protocol libraries shared by the client and by test harnesses that
//! stand in for the server.
//!
//! Design goals:
//! - Deterministic and modular where practical.
//! - Explicit, compile-time codecs (no runtime type inspection).
//! - Clear separation of concerns (framing, state codec, clock, math).
//! - No `unsafe`.

pub mod clock;
pub mod config;
pub mod math;
pub mod messages;
pub mod movement;
pub mod serial;
pub mod sync_array;
pub mod wire;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::clock::*;
    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::messages::*;
    pub use crate::movement::*;
    pub use crate::serial::*;
    pub use crate::wire::*;
}
