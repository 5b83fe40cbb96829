//! Math types.
//!
//! This module intentionally stays small and deterministic.
//! It avoids SIMD/unsafe and focuses on stable semantics. Rotations are
//! kept as unit quaternions internally; the wire format carries Euler
//! angles in degrees (y-x-z order), so conversions both ways live here.

use serde::{Deserialize, Serialize};

/// 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn len_sq(self) -> f32 {
        self.dot(self)
    }

    pub fn length(self) -> f32 {
        self.len_sq().sqrt()
    }

    pub fn distance(self, rhs: Self) -> f32 {
        (rhs - self).length()
    }

    /// Horizontal (xz-plane) speed, used for locomotion blending.
    pub fn horizontal_length(self) -> f32 {
        (self.x * self.x + self.z * self.z).sqrt()
    }

    pub fn lerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self::new(
            self.x + (to.x - self.x) * t,
            self.y + (to.y - self.y) * t,
            self.z + (to.z - self.z) * t,
        )
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl std::ops::Div<f32> for Vec3 {
    type Output = Self;
    fn div(self, rhs: f32) -> Self {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

/// Wraps an angle in degrees to the minimal representation in `[-180, 180)`.
///
/// A rotation delta of 359 degrees is really -1 degree; angular-velocity
/// and divergence math must use the short way around.
pub fn wrap_angle_deg(deg: f32) -> f32 {
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

/// Unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Builds a rotation from Euler angles in degrees, applied y (yaw),
    /// then x (pitch), then z (roll) — the order the server uses.
    pub fn from_euler_deg(e: Vec3) -> Self {
        let (sx, cx) = (e.x.to_radians() * 0.5).sin_cos();
        let (sy, cy) = (e.y.to_radians() * 0.5).sin_cos();
        let (sz, cz) = (e.z.to_radians() * 0.5).sin_cos();

        let qy = Self {
            x: 0.0,
            y: sy,
            z: 0.0,
            w: cy,
        };
        let qx = Self {
            x: sx,
            y: 0.0,
            z: 0.0,
            w: cx,
        };
        let qz = Self {
            x: 0.0,
            y: 0.0,
            z: sz,
            w: cz,
        };
        qy * qx * qz
    }

    /// Inverse of [`Quat::from_euler_deg`]. Angles come back in degrees;
    /// at the pitch singularity roll is folded into yaw.
    pub fn to_euler_deg(self) -> Vec3 {
        let (x, y, z, w) = (self.x, self.y, self.z, self.w);

        let sin_pitch = (2.0 * (w * x - y * z)).clamp(-1.0, 1.0);
        if sin_pitch.abs() < 0.9999 {
            let pitch = sin_pitch.asin();
            let yaw = (2.0 * (x * z + w * y)).atan2(1.0 - 2.0 * (x * x + y * y));
            let roll = (2.0 * (x * y + w * z)).atan2(1.0 - 2.0 * (x * x + z * z));
            Vec3::new(pitch.to_degrees(), yaw.to_degrees(), roll.to_degrees())
        } else {
            let pitch = std::f32::consts::FRAC_PI_2.copysign(sin_pitch);
            let yaw = (2.0 * (w * y - x * z)).atan2(1.0 - 2.0 * (y * y + z * z));
            Vec3::new(pitch.to_degrees(), yaw.to_degrees(), 0.0)
        }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z + self.w * rhs.w
    }

    /// Conjugate; equals the inverse for unit quaternions.
    pub fn inverse(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
            w: self.w,
        }
    }

    pub fn normalized(self) -> Self {
        let len = self.dot(self).sqrt();
        if len <= f32::EPSILON {
            return Self::IDENTITY;
        }
        Self {
            x: self.x / len,
            y: self.y / len,
            z: self.z / len,
            w: self.w / len,
        }
    }

    /// Spherical interpolation along the shorter arc.
    pub fn slerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mut dot = self.dot(to);
        let mut to = to;
        if dot < 0.0 {
            to = Self {
                x: -to.x,
                y: -to.y,
                z: -to.z,
                w: -to.w,
            };
            dot = -dot;
        }

        // Nearly parallel: fall back to a normalized lerp.
        if dot > 0.9995 {
            return Self {
                x: self.x + (to.x - self.x) * t,
                y: self.y + (to.y - self.y) * t,
                z: self.z + (to.z - self.z) * t,
                w: self.w + (to.w - self.w) * t,
            }
            .normalized();
        }

        let theta0 = dot.clamp(-1.0, 1.0).acos();
        let theta = theta0 * t;
        let sin_theta0 = theta0.sin();
        let s0 = (theta0 - theta).sin() / sin_theta0;
        let s1 = theta.sin() / sin_theta0;
        Self {
            x: self.x * s0 + to.x * s1,
            y: self.y * s0 + to.y * s1,
            z: self.z * s0 + to.z * s1,
            w: self.w * s0 + to.w * s1,
        }
        .normalized()
    }

    /// Yaw difference to `rhs` in degrees, wrapped to the short way around.
    pub fn yaw_delta_deg(self, rhs: Self) -> f32 {
        wrap_angle_deg((self * rhs.inverse()).to_euler_deg().y)
    }
}

impl std::ops::Mul for Quat {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self {
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            z: self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_lerp_midpoint() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(2.0, 4.0, 6.0);
        let mid = a.lerp(b, 0.5);
        assert_eq!(mid, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn euler_roundtrip() {
        let e = Vec3::new(10.0, 75.0, -20.0);
        let back = Quat::from_euler_deg(e).to_euler_deg();
        assert!((back.x - e.x).abs() < 1e-3);
        assert!((back.y - e.y).abs() < 1e-3);
        assert!((back.z - e.z).abs() < 1e-3);
    }

    #[test]
    fn slerp_halfway_yaw() {
        let a = Quat::from_euler_deg(Vec3::new(0.0, 0.0, 0.0));
        let b = Quat::from_euler_deg(Vec3::new(0.0, 90.0, 0.0));
        let mid = a.slerp(b, 0.5).to_euler_deg();
        assert!((mid.y - 45.0).abs() < 1e-3);
    }

    #[test]
    fn wrap_picks_short_way() {
        assert_eq!(wrap_angle_deg(359.0), -1.0);
        assert_eq!(wrap_angle_deg(-190.0), 170.0);
        assert_eq!(wrap_angle_deg(45.0), 45.0);
    }

    #[test]
    fn yaw_delta_is_signed_and_short() {
        let a = Quat::from_euler_deg(Vec3::new(0.0, 350.0, 0.0));
        let b = Quat::from_euler_deg(Vec3::new(0.0, 10.0, 0.0));
        let d = a.yaw_delta_deg(b);
        assert!((d + 20.0).abs() < 1e-3, "got {d}");
    }
}
