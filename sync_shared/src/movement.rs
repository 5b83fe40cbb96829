//! Movement data shared by upload and reconciliation.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::math::Vec3;
use crate::serial::{NetReader, NetState, NetWriter, SerialError};

bitflags! {
    /// Animation-relevant movement state, authoritative from the server.
    ///
    /// These bits are applied verbatim on every sample regardless of the
    /// reconciliation strategy; they are never predicted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MoveMode: u32 {
        const GROUNDED = 1;
        const JUMPING = 2;
        const FALLING = 4;
        const FLYING = 8;
        const MOVEMENT_ENABLED = 16;
    }
}

/// How a simulated entity turns periodic server movement packets into
/// local motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Replace pose outright on every sample.
    Direct,
    /// Queue samples and walk between them over the sync interval.
    #[default]
    Interpolate,
    /// Simulate locally and converge on RTT-compensated server state.
    Predict,
}

/// One authoritative movement snapshot.
///
/// Produced once per upload tick on the autonomous side, consumed once
/// per reconciliation tick on the simulated side. Rotations are Euler
/// angles in degrees; `timestamp` is the sender's clock in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MovementSample {
    pub position: Vec3,
    pub rotation: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
    pub angular_velocity: Vec3,
    pub mode: u32,
    pub timestamp: f32,
}

impl MovementSample {
    pub fn mode_flags(&self) -> MoveMode {
        MoveMode::from_bits_truncate(self.mode)
    }
}

fn read_vec3(r: &mut NetReader<'_>) -> Result<Vec3, SerialError> {
    Ok(Vec3::new(r.read_f32()?, r.read_f32()?, r.read_f32()?))
}

fn write_vec3(w: &mut NetWriter, v: Vec3) {
    w.write_f32(v.x);
    w.write_f32(v.y);
    w.write_f32(v.z);
}

impl NetState for MovementSample {
    fn read_full(r: &mut NetReader<'_>) -> Result<Self, SerialError> {
        Ok(Self {
            position: read_vec3(r)?,
            rotation: read_vec3(r)?,
            velocity: read_vec3(r)?,
            acceleration: read_vec3(r)?,
            angular_velocity: read_vec3(r)?,
            mode: r.read_u32()?,
            timestamp: r.read_f32()?,
        })
    }

    fn write_full(&self, w: &mut NetWriter) {
        write_vec3(w, self.position);
        write_vec3(w, self.rotation);
        write_vec3(w, self.velocity);
        write_vec3(w, self.acceleration);
        write_vec3(w, self.angular_velocity);
        w.write_u32(self.mode);
        w.write_f32(self.timestamp);
    }

    // Movement is small and volatile; the server always ships a complete
    // sample, so the delta form is the full form.
    fn read_delta(&mut self, r: &mut NetReader<'_>) -> Result<(), SerialError> {
        *self = Self::read_full(r)?;
        Ok(())
    }

    fn write_delta(&self, w: &mut NetWriter, _dirty: u32) {
        self.write_full(w);
    }
}
