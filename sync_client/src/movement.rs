//! Movement reconciliation.
//!
//! The server sends discrete movement samples at sync-interval boundaries.
//! Each simulated entity runs one of three strategies for turning that
//! stream into smooth local motion:
//! - `Direct`: replace the pose outright.
//! - `Interpolate`: queue samples and walk between them, phase-locked to
//!   arrival timing.
//! - `Predict`: simulate locally and converge on RTT-compensated server
//!   state, with blended corrections and hard snaps past thresholds.
//!
//! Movement-mode bits are authoritative and applied on every sample no
//! matter the strategy.

use std::collections::VecDeque;

use tracing::debug;

use sync_shared::config::MovementConfig;
use sync_shared::math::{Quat, Vec3};
use sync_shared::movement::{MoveMode, MovementSample, SyncMode};

use crate::entity::Eid;

/// Displacement below which an interpolation target counts as "already
/// there" and rotation snaps instead of lerping.
const INTERP_SNAP_EPSILON: f32 = 0.01;

/// Collision-aware motion seam.
///
/// The engine never writes positions directly into the scene; it asks the
/// integrator to attempt a displacement and uses whatever pose resulted.
/// Kinematic forward extrapolation goes through the same seam so predicted
/// motion cannot tunnel through geometry the real motion would hit.
pub trait MotionIntegrator {
    fn try_move(&mut self, from: Vec3, displacement: Vec3) -> Vec3;
}

/// Integrator with no collision environment; every displacement lands.
#[derive(Debug, Default)]
pub struct FreeIntegrator;

impl MotionIntegrator for FreeIntegrator {
    fn try_move(&mut self, from: Vec3, displacement: Vec3) -> Vec3 {
        from + displacement
    }
}

/// Pose published to collaborators once per tick.
#[derive(Debug, Clone, Copy)]
pub struct PoseFrame {
    pub position: Vec3,
    pub rotation: Quat,
    /// Inferred velocity for locomotion blending only; never fed back
    /// into motion.
    pub velocity: Vec3,
    pub mode: MoveMode,
    pub animation_speed: f32,
}

/// Receives the per-tick pose output for each simulated entity.
pub trait PoseSink {
    fn apply(&mut self, eid: Eid, frame: &PoseFrame);
}

/// Sink that ignores everything; headless runs and tests.
#[derive(Debug, Default)]
pub struct NullPoseSink;

impl PoseSink for NullPoseSink {
    fn apply(&mut self, _eid: Eid, _frame: &PoseFrame) {}
}

fn forward_position(
    integ: &mut dyn MotionIntegrator,
    from: Vec3,
    vel: Vec3,
    acc: Vec3,
    t: f32,
) -> Vec3 {
    integ.try_move(from, vel * t + acc * (0.5 * t * t))
}

fn forward_rotation(rot: Quat, ang_vel_deg: Vec3, t: f32) -> Quat {
    rot * Quat::from_euler_deg(ang_vel_deg * t)
}

/// Per-entity movement reconciliation state machine.
#[derive(Debug)]
pub struct MovementSync {
    cfg: MovementConfig,

    pos: Vec3,
    rot: Quat,
    cur_velocity: Vec3,
    move_mode: MoveMode,
    anim_speed: f32,

    // Interpolate
    queue: VecDeque<MovementSample>,
    start_pos: Vec3,
    start_rot: Quat,
    end_pos: Vec3,
    end_rot: Quat,
    lerp_elapsed: f32,
    interpolating: bool,
    last_sample_ts: f32,

    // Predict
    local_velocity: Vec3,
    server_velocity: Vec3,
    server_accel: Vec3,
    local_position: Vec3,
    server_position: Vec3,
    pos_blending: bool,
    pos_blend_time: f32,
    local_rotation: Quat,
    server_rotation: Quat,
    server_ang_vel: Vec3,
    rot_blending: bool,
    rot_blend_time: f32,
}

impl MovementSync {
    pub fn new(cfg: MovementConfig) -> Self {
        Self {
            cfg,
            pos: Vec3::ZERO,
            rot: Quat::IDENTITY,
            cur_velocity: Vec3::ZERO,
            move_mode: MoveMode::GROUNDED | MoveMode::MOVEMENT_ENABLED,
            anim_speed: 0.0,
            queue: VecDeque::new(),
            start_pos: Vec3::ZERO,
            start_rot: Quat::IDENTITY,
            end_pos: Vec3::ZERO,
            end_rot: Quat::IDENTITY,
            lerp_elapsed: 0.0,
            interpolating: false,
            last_sample_ts: 0.0,
            local_velocity: Vec3::ZERO,
            server_velocity: Vec3::ZERO,
            server_accel: Vec3::ZERO,
            local_position: Vec3::ZERO,
            server_position: Vec3::ZERO,
            pos_blending: false,
            pos_blend_time: 0.0,
            local_rotation: Quat::IDENTITY,
            server_rotation: Quat::IDENTITY,
            server_ang_vel: Vec3::ZERO,
            rot_blending: false,
            rot_blend_time: 0.0,
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.cfg.mode
    }

    pub fn position(&self) -> Vec3 {
        self.pos
    }

    pub fn rotation(&self) -> Quat {
        self.rot
    }

    pub fn velocity(&self) -> Vec3 {
        self.cur_velocity
    }

    pub fn move_mode(&self) -> MoveMode {
        self.move_mode
    }

    /// Places the entity before any sample arrives (spawn pose).
    pub fn set_pose(&mut self, pos: Vec3, rot: Quat) {
        self.pos = pos;
        self.rot = rot;
    }

    /// Applies an initial full snapshot.
    ///
    /// The pose is taken verbatim; under `Predict` the sample also seeds
    /// the server trajectory and the local timeline is immediately
    /// forward-extrapolated by the current RTT, aligning simulation start
    /// with the server's "now".
    pub fn apply_full(
        &mut self,
        sample: &MovementSample,
        rtt: f32,
        integ: &mut dyn MotionIntegrator,
    ) {
        self.apply_direct(sample);
        if self.cfg.mode == SyncMode::Predict {
            self.server_position = sample.position;
            self.server_rotation = Quat::from_euler_deg(sample.rotation);
            self.server_velocity = sample.velocity;
            self.server_accel = sample.acceleration;
            self.server_ang_vel = sample.angular_velocity;
            self.align_to_server(rtt, integ);
        }
    }

    /// One-time forward extrapolation by RTT at simulation start.
    fn align_to_server(&mut self, rtt: f32, integ: &mut dyn MotionIntegrator) {
        self.server_position = forward_position(
            integ,
            self.server_position,
            self.server_velocity,
            self.server_accel,
            rtt,
        );
        self.server_rotation = forward_rotation(self.server_rotation, self.server_ang_vel, rtt);
        self.server_velocity = self.server_velocity + self.server_accel * rtt;

        self.pos = self.server_position;
        self.rot = self.server_rotation;
        self.local_position = self.pos;
        self.local_rotation = self.rot;
        self.local_velocity = self.server_velocity;
        self.cur_velocity = self.local_velocity;
    }

    /// Feeds one authoritative movement sample into the active strategy.
    pub fn apply_sync(
        &mut self,
        sample: &MovementSample,
        rtt: f32,
        integ: &mut dyn MotionIntegrator,
    ) {
        // Mode bits are never predicted.
        self.move_mode = sample.mode_flags();

        match self.cfg.mode {
            SyncMode::Direct => self.apply_direct(sample),
            SyncMode::Interpolate => self.queue.push_back(*sample),
            SyncMode::Predict => self.apply_predict_sample(sample, rtt, integ),
        }
    }

    /// Advances one tick and returns the pose to publish.
    pub fn update(&mut self, dt: f32, integ: &mut dyn MotionIntegrator) -> PoseFrame {
        match self.cfg.mode {
            SyncMode::Direct => {}
            SyncMode::Interpolate => self.update_interpolate(dt),
            SyncMode::Predict => {
                self.update_predict_position(dt, integ);
                self.update_predict_rotation(dt);
            }
        }

        // Root motion owns the pose while movement is disabled; feeding a
        // locomotion speed then would fight it.
        if self.move_mode.contains(MoveMode::MOVEMENT_ENABLED) {
            self.anim_speed = self.cur_velocity.horizontal_length();
        }

        PoseFrame {
            position: self.pos,
            rotation: self.rot,
            velocity: self.cur_velocity,
            mode: self.move_mode,
            animation_speed: self.anim_speed,
        }
    }

    fn apply_direct(&mut self, sample: &MovementSample) {
        self.cur_velocity = (sample.position - self.pos) / self.cfg.sync_interval;
        self.pos = sample.position;
        self.rot = Quat::from_euler_deg(sample.rotation);
        self.move_mode = sample.mode_flags();
    }

    // ─── Interpolate ───

    fn update_interpolate(&mut self, dt: f32) {
        if self.interpolating {
            self.lerp_elapsed += dt;
            let t = (self.lerp_elapsed / self.cfg.sync_interval).min(1.0);
            self.pos = self.start_pos.lerp(self.end_pos, t);
            self.rot = self.start_rot.slerp(self.end_rot, t);

            if self.lerp_elapsed >= self.cfg.sync_interval {
                // Carry the overshoot so interpolation stays phase-locked
                // to arrival timing instead of resetting each segment.
                self.lerp_elapsed -= self.cfg.sync_interval;
                self.advance_segment();
            }
        } else {
            self.advance_segment();
        }
    }

    fn advance_segment(&mut self) {
        let Some(sample) = self.queue.pop_front() else {
            self.interpolating = false;
            self.lerp_elapsed = 0.0;
            self.cur_velocity = Vec3::ZERO;
            return;
        };

        let dist = self.pos.distance(sample.position);
        if dist > INTERP_SNAP_EPSILON {
            self.start_pos = self.pos;
            self.start_rot = self.rot;
            self.end_pos = sample.position;
            self.end_rot = Quat::from_euler_deg(sample.rotation);

            let t = (self.lerp_elapsed / self.cfg.sync_interval).min(1.0);
            self.pos = self.start_pos.lerp(self.end_pos, t);
            self.rot = self.start_rot.slerp(self.end_rot, t);

            // Infer velocity from real inter-sample spacing when known.
            let mut real_interval = self.cfg.sync_interval;
            if self.last_sample_ts > 0.0 {
                let spacing = sample.timestamp - self.last_sample_ts;
                if spacing > f32::EPSILON {
                    real_interval = spacing;
                }
            }
            self.last_sample_ts = sample.timestamp;
            self.cur_velocity = (self.end_pos - self.start_pos) / real_interval;
            self.interpolating = true;

            debug!(velocity = ?self.cur_velocity, real_interval, dist, "interpolation segment");
        } else {
            self.interpolating = false;
            self.lerp_elapsed = 0.0;
            self.cur_velocity = Vec3::ZERO;
            self.rot = Quat::from_euler_deg(sample.rotation);
        }
    }

    // ─── Predict ───

    fn apply_predict_sample(
        &mut self,
        sample: &MovementSample,
        rtt: f32,
        integ: &mut dyn MotionIntegrator,
    ) {
        // One-way latency has already elapsed by the time the packet
        // lands; project the server trajectory forward to compensate.
        let server_pos = forward_position(
            integ,
            sample.position,
            sample.velocity,
            sample.acceleration,
            rtt,
        );
        let server_vel = sample.velocity + sample.acceleration * rtt;

        self.server_position = server_pos;
        self.server_accel = sample.acceleration;
        self.server_velocity = server_vel;

        let dist = server_pos.distance(self.pos);
        if dist > self.cfg.hard_snap_distance {
            self.pos = server_pos;
            self.local_velocity = server_vel;
            self.local_position = server_pos;
            self.pos_blending = false;
        } else {
            self.local_velocity = self.cur_velocity;
            self.local_position = self.pos;
            self.pos_blending = dist > self.cfg.correction_distance;
        }
        self.pos_blend_time = 0.0;

        self.server_ang_vel = sample.angular_velocity;
        let sample_rot = Quat::from_euler_deg(sample.rotation);
        self.server_rotation = if self.cfg.predict_rotation {
            forward_rotation(sample_rot, sample.angular_velocity, rtt)
        } else {
            sample_rot
        };

        let divergence = self.rot.yaw_delta_deg(self.server_rotation).abs();
        if divergence > self.cfg.hard_snap_rotation {
            self.rot = self.server_rotation;
            self.rot_blending = false;
        } else {
            self.local_rotation = self.rot;
            self.rot_blending = divergence > self.cfg.correction_rotation;
        }
        self.rot_blend_time = 0.0;
    }

    fn update_predict_position(&mut self, dt: f32, integ: &mut dyn MotionIntegrator) {
        self.pos_blend_time += dt;
        let rate = (self.pos_blend_time / self.cfg.sync_interval).min(1.0);
        self.cur_velocity =
            self.local_velocity + (self.server_velocity - self.local_velocity) * rate;

        if !self.pos_blending {
            self.pos = integ.try_move(self.pos, self.cur_velocity * dt);
        } else {
            // Reconcile the two trajectories with the same kinematics so
            // the blend chases a moving target, not a stale snapshot.
            let local = forward_position(
                integ,
                self.local_position,
                self.cur_velocity,
                self.server_accel,
                self.pos_blend_time,
            );
            let server = forward_position(
                integ,
                self.server_position,
                self.server_velocity,
                self.server_accel,
                self.pos_blend_time,
            );
            let target = local + (server - local) * rate;
            self.pos = integ.try_move(self.pos, target - self.pos);
        }
    }

    fn update_predict_rotation(&mut self, dt: f32) {
        self.rot_blend_time += dt;
        let rate = (self.rot_blend_time / self.cfg.sync_interval).min(1.0);

        if !self.rot_blending || !self.cfg.predict_rotation {
            self.rot = forward_rotation(self.rot, self.server_ang_vel, dt);
        } else {
            let local = forward_rotation(self.local_rotation, self.server_ang_vel, self.rot_blend_time);
            let server = forward_rotation(self.server_rotation, self.server_ang_vel, self.rot_blend_time);
            self.rot = local.slerp(server, rate);
        }

        if self.cfg.clamp_prediction_pitch {
            let mut e = self.rot.to_euler_deg();
            if e.x != 0.0 {
                e.x = 0.0;
                self.rot = Quat::from_euler_deg(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(pos: Vec3, vel: Vec3, ts: f32) -> MovementSample {
        MovementSample {
            position: pos,
            velocity: vel,
            timestamp: ts,
            mode: (MoveMode::GROUNDED | MoveMode::MOVEMENT_ENABLED).bits(),
            ..Default::default()
        }
    }

    fn engine(mode: SyncMode) -> MovementSync {
        MovementSync::new(MovementConfig {
            mode,
            ..Default::default()
        })
    }

    #[test]
    fn direct_replaces_pose_and_infers_velocity() {
        let mut integ = FreeIntegrator;
        let mut m = engine(SyncMode::Direct);

        m.apply_sync(&sample(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO, 1.0), 0.0, &mut integ);
        assert_eq!(m.position(), Vec3::new(1.0, 0.0, 0.0));
        // 1 unit over the 0.1s sync interval.
        assert!((m.velocity().x - 10.0).abs() < 1e-4);
    }

    #[test]
    fn interpolate_reaches_midpoint_at_half_interval() {
        let mut integ = FreeIntegrator;
        let mut m = engine(SyncMode::Interpolate);

        m.apply_sync(&sample(Vec3::ZERO, Vec3::ZERO, 1.0), 0.0, &mut integ);
        m.apply_sync(&sample(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO, 1.1), 0.0, &mut integ);

        // First tick consumes the "already there" sample, second starts
        // the segment toward (1,0,0).
        m.update(0.0, &mut integ);
        m.update(0.0, &mut integ);

        let frame = m.update(0.05, &mut integ);
        assert!((frame.position.x - 0.5).abs() < 1e-4, "{:?}", frame.position);
    }

    #[test]
    fn interpolate_carries_interval_overshoot() {
        let mut integ = FreeIntegrator;
        let mut m = engine(SyncMode::Interpolate);

        m.apply_sync(&sample(Vec3::ZERO, Vec3::ZERO, 1.0), 0.0, &mut integ);
        m.apply_sync(&sample(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO, 1.1), 0.0, &mut integ);
        m.apply_sync(&sample(Vec3::new(2.0, 0.0, 0.0), Vec3::ZERO, 1.2), 0.0, &mut integ);

        m.update(0.0, &mut integ);
        m.update(0.0, &mut integ);

        // Overshooting the 0.1s interval by 0.02s must land 0.02s into
        // the next segment, not at its start.
        let frame = m.update(0.12, &mut integ);
        assert!((frame.position.x - 1.2).abs() < 1e-4, "{:?}", frame.position);
    }

    #[test]
    fn interpolate_freezes_when_queue_empties() {
        let mut integ = FreeIntegrator;
        let mut m = engine(SyncMode::Interpolate);

        m.apply_sync(&sample(Vec3::new(5.0, 0.0, 0.0), Vec3::ZERO, 1.0), 0.0, &mut integ);
        m.update(0.0, &mut integ);
        let frame = m.update(0.1, &mut integ);
        let parked = frame.position;

        let frame = m.update(0.1, &mut integ);
        assert_eq!(frame.position, parked);
        assert_eq!(frame.velocity, Vec3::ZERO);
    }

    #[test]
    fn predict_extrapolates_by_rtt_and_hard_snaps() {
        let mut integ = FreeIntegrator;
        let mut m = engine(SyncMode::Predict);
        m.set_pose(Vec3::new(5.0, 0.0, 0.0), Quat::IDENTITY);

        // Server reports (0,0,0) moving +x at 1 u/s with RTT 0.2s: the
        // extrapolated position is (0.2,0,0), 4.8 units from the local
        // pose — beyond the 3-unit hard snap threshold.
        m.apply_sync(
            &sample(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 1.0),
            0.2,
            &mut integ,
        );
        let p = m.position();
        assert!((p.x - 0.2).abs() < 1e-4, "{p:?}");
        assert_eq!((p.y, p.z), (0.0, 0.0));
    }

    #[test]
    fn predict_free_runs_on_server_velocity_inside_thresholds() {
        let mut integ = FreeIntegrator;
        let mut m = engine(SyncMode::Predict);

        // Sample at the local pose: no correction, free simulation
        // converging on the server velocity over one sync interval.
        m.apply_sync(
            &sample(Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0), 1.0),
            0.0,
            &mut integ,
        );
        let frame = m.update(0.1, &mut integ);
        assert!(frame.position.x > 0.0);
        assert!((frame.velocity.x - 2.0).abs() < 1e-4);
    }

    #[test]
    fn predict_blends_toward_server_past_correction_threshold() {
        let mut integ = FreeIntegrator;
        let mut m = engine(SyncMode::Predict);
        m.set_pose(Vec3::new(2.0, 0.0, 0.0), Quat::IDENTITY);

        // 2 units of divergence: more than correction (1), less than
        // hard snap (3) — blending, not teleporting.
        m.apply_sync(&sample(Vec3::ZERO, Vec3::ZERO, 1.0), 0.0, &mut integ);
        assert!((m.position().x - 2.0).abs() < 1e-4);

        let frame = m.update(0.05, &mut integ);
        assert!(frame.position.x < 2.0, "should move toward the server pose");
        assert!(frame.position.x > 0.0, "should not teleport");

        // A full interval later the divergence is gone.
        m.update(0.05, &mut integ);
        assert!(m.position().x.abs() < 1e-3, "{:?}", m.position());
    }

    #[test]
    fn predict_integrates_angular_velocity_when_rotation_prediction_off() {
        let mut integ = FreeIntegrator;
        let mut m = engine(SyncMode::Predict);

        let mut s = sample(Vec3::ZERO, Vec3::ZERO, 1.0);
        s.angular_velocity = Vec3::new(0.0, 90.0, 0.0);
        m.apply_sync(&s, 0.0, &mut integ);

        let frame = m.update(0.5, &mut integ);
        let yaw = frame.rotation.to_euler_deg().y;
        assert!((yaw - 45.0).abs() < 1e-2, "yaw {yaw}");
        // Pitch stays pinned by the clamp.
        assert!(frame.rotation.to_euler_deg().x.abs() < 1e-3);
    }

    #[test]
    fn mode_bits_apply_verbatim_on_every_sample() {
        let mut integ = FreeIntegrator;
        let mut m = engine(SyncMode::Interpolate);

        let mut s = sample(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO, 1.0);
        s.mode = (MoveMode::JUMPING | MoveMode::MOVEMENT_ENABLED).bits();
        m.apply_sync(&s, 0.0, &mut integ);
        assert!(m.move_mode().contains(MoveMode::JUMPING));
        assert!(!m.move_mode().contains(MoveMode::GROUNDED));
    }
}
