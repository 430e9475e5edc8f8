//! Math types.
//!
//! Positions and rotations travel over the wire as plain `{x, y, z}` objects.
//! The sea is the XZ plane; Y is up and ignored by every range check.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

/// 3D vector. Also used for Euler rotations (radians per axis).
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

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Distance to `other` on the sea plane, ignoring height.
    pub fn horizontal_distance(self, other: Self) -> f32 {
        let dx = other.x - self.x;
        let dz = other.z - self.z;
        (dx * dx + dz * dz).sqrt()
    }

    /// Heading from `self` towards `other`, as `atan2(dz, dx)`.
    pub fn heading_to(self, other: Self) -> f32 {
        (other.z - self.z).atan2(other.x - self.x)
    }
}

/// Wraps an angle into `(-π, π]`.
pub fn normalize_angle(mut angle: f32) -> f32 {
    if !angle.is_finite() {
        return angle;
    }
    angle %= 2.0 * PI;
    if angle > PI {
        angle -= 2.0 * PI;
    } else if angle <= -PI {
        angle += 2.0 * PI;
    }
    angle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizontal_distance_ignores_height() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 100.0, 4.0);
        assert_eq!(a.horizontal_distance(b), 5.0);
    }

    #[test]
    fn heading_follows_atan2_of_dz_dx() {
        let a = Vec3::ZERO;
        assert_eq!(a.heading_to(Vec3::new(10.0, 0.0, 0.0)), 0.0);
        assert!((a.heading_to(Vec3::new(0.0, 0.0, 10.0)) - PI / 2.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_wraps_into_half_open_range() {
        assert!((normalize_angle(3.0 * PI).abs() - PI).abs() < 1e-5);
        assert!((normalize_angle(-3.0 * PI).abs() - PI).abs() < 1e-5);
        assert!((normalize_angle(2.0 * PI + 0.25) - 0.25).abs() < 1e-5);
        assert!((normalize_angle(-0.25) + 0.25).abs() < 1e-6);
        assert_eq!(normalize_angle(0.0), 0.0);
    }
}
