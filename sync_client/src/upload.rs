//! Movement upload for the autonomous entity.
//!
//! The locally-controlled character moves under player input (owned by
//! the embedder); this side only samples the resulting pose on a fixed
//! cadence, derives acceleration and angular velocity from frame deltas,
//! and produces the `upload_movement` sample for the server.

use sync_shared::math::{wrap_angle_deg, Quat, Vec3};
use sync_shared::movement::{MoveMode, MovementSample};

/// Snapshot of the locally-simulated character, fed in once per tick.
#[derive(Debug, Clone, Copy)]
pub struct LocalPose {
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub mode: MoveMode,
}

impl Default for LocalPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            mode: MoveMode::GROUNDED | MoveMode::MOVEMENT_ENABLED,
        }
    }
}

/// Fixed-cadence movement sampler.
#[derive(Debug)]
pub struct MovementUploader {
    interval: f32,
    next_time: Option<f32>,
    last_velocity: Vec3,
    last_rotation: Quat,
}

impl MovementUploader {
    pub fn new(interval: f32) -> Self {
        Self {
            interval,
            next_time: None,
            last_velocity: Vec3::ZERO,
            last_rotation: Quat::IDENTITY,
        }
    }

    /// Feeds one tick's pose; returns a sample when an upload is due.
    ///
    /// The cadence advances by whole intervals from the first call, so a
    /// slow tick catches up instead of drifting.
    pub fn sample(&mut self, now: f32, dt: f32, pose: &LocalPose) -> Option<MovementSample> {
        let next = *self.next_time.get_or_insert(now);

        let out = if now >= next && dt > 0.0 {
            self.next_time = Some(next + self.interval);

            let acceleration = (pose.velocity - self.last_velocity) / dt;

            // The rotation delta comes back as positive angles even for a
            // small backwards turn (359 for -1); wrap each axis to the
            // minimal angle before dividing by dt.
            let delta = pose.rotation * self.last_rotation.inverse();
            let e = delta.to_euler_deg();
            let angular_velocity = Vec3::new(
                wrap_angle_deg(e.x),
                wrap_angle_deg(e.y),
                wrap_angle_deg(e.z),
            ) / dt;

            Some(MovementSample {
                position: pose.position,
                rotation: pose.rotation.to_euler_deg(),
                velocity: pose.velocity,
                acceleration,
                angular_velocity,
                mode: pose.mode.bits(),
                timestamp: now,
            })
        } else {
            None
        };

        self.last_velocity = pose.velocity;
        self.last_rotation = pose.rotation;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_skips_in_between_ticks() {
        let mut up = MovementUploader::new(1.0 / 30.0);
        let pose = LocalPose::default();

        // 60 Hz ticks against a 30 Hz upload cadence: every other tick.
        let mut uploads = 0;
        let dt = 1.0 / 60.0;
        for i in 0..8 {
            let now = i as f32 * dt;
            if up.sample(now, dt, &pose).is_some() {
                uploads += 1;
            }
        }
        assert_eq!(uploads, 4);
    }

    #[test]
    fn derives_acceleration_from_velocity_delta() {
        let mut up = MovementUploader::new(0.0);
        let dt = 0.1;

        let mut pose = LocalPose {
            velocity: Vec3::new(1.0, 0.0, 0.0),
            ..Default::default()
        };
        up.sample(0.0, dt, &pose);

        pose.velocity = Vec3::new(2.0, 0.0, 0.0);
        let s = up.sample(0.1, dt, &pose).unwrap();
        assert!((s.acceleration.x - 10.0).abs() < 1e-4);
    }

    #[test]
    fn angular_velocity_takes_the_short_way_around() {
        let mut up = MovementUploader::new(0.0);
        let dt = 0.1;

        let mut pose = LocalPose {
            rotation: Quat::from_euler_deg(Vec3::new(0.0, 359.0, 0.0)),
            ..Default::default()
        };
        up.sample(0.0, dt, &pose);

        // 359° -> 1°: two degrees forward, not 358 back.
        pose.rotation = Quat::from_euler_deg(Vec3::new(0.0, 1.0, 0.0));
        let s = up.sample(0.1, dt, &pose).unwrap();
        assert!((s.angular_velocity.y - 20.0).abs() < 0.1, "{:?}", s.angular_velocity);
    }

    #[test]
    fn mode_bits_ride_along() {
        let mut up = MovementUploader::new(0.0);
        let pose = LocalPose {
            mode: MoveMode::JUMPING,
            ..Default::default()
        };
        let s = up.sample(0.0, 0.016, &pose).unwrap();
        assert_eq!(s.mode, MoveMode::JUMPING.bits());
    }
}
