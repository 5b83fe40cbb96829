//! `sync_client`
//!
//! Client-side systems:
//! - Connection driver (read/flush loops, framing, lost detection)
//! - Message routing to an explicit handler table
//! - Entity table with full/delta state sync
//! - Movement reconciliation (direct, interpolate, predict)
//! - Combat state with locally-predicted skills and swings
//! - Movement upload for the autonomous entity

pub mod client;
pub mod combat;
pub mod connection;
pub mod entity;
pub mod movement;
pub mod router;
pub mod upload;

pub use client::{default_router, ClientWorld, GameClient, GameEvent};
pub use entity::{Eid, EntityKind, GameEntity, NetRole};
pub use movement::{FreeIntegrator, MotionIntegrator, MovementSync, PoseFrame, PoseSink};
