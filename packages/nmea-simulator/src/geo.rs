//! geo.rs — Plane vectors and coastal-scale position math
//!
//! Velocities are 2-D vectors in a local East-North frame, in knots. Positions
//! move by the equirectangular approximation (longitude scaled by cos(lat)),
//! which is accurate enough over the few-mile legs a coastal scenario uses.

use std::ops::{Add, Mul, Neg, Sub};

use nmea_types::LatLon;
use serde::{Deserialize, Serialize};

pub const METERS_PER_NM: f64 = 1852.0;
pub const MPS_PER_KNOT: f64 = METERS_PER_NM / 3600.0;
pub const KMH_PER_KNOT: f64 = 1.852;

/// Vector in the local East-North frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64, // East
    pub y: f64, // North
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn zero() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    /// Vector of `magnitude` pointing toward compass `bearing_deg` (0 = N, 90 = E).
    pub fn from_polar(magnitude: f64, bearing_deg: f64) -> Self {
        let b = bearing_deg.to_radians();
        Self::new(magnitude * b.sin(), magnitude * b.cos())
    }

    pub fn magnitude(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Compass bearing of the vector in [0, 360). Zero vector reports 0.
    pub fn bearing_deg(&self) -> f64 {
        normalize_deg(self.x.atan2(self.y).to_degrees())
    }

    pub fn dot(&self, other: &Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn unit(&self) -> Option<Vec2> {
        let m = self.magnitude();
        (m > f64::EPSILON).then(|| Vec2::new(self.x / m, self.y / m))
    }

    /// Unit vector 90° clockwise (to starboard when facing along `self`).
    pub fn right_normal(&self) -> Vec2 {
        Vec2::new(self.y, -self.x)
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, o: Vec2) -> Vec2 {
        Vec2::new(self.x + o.x, self.y + o.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, o: Vec2) -> Vec2 {
        Vec2::new(self.x - o.x, self.y - o.y)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, s: f64) -> Vec2 {
        Vec2::new(self.x * s, self.y * s)
    }
}

// ── Angles ────────────────────────────────────────────────────────────────────

/// Wrap into [0, 360).
pub fn normalize_deg(a: f64) -> f64 {
    let r = a.rem_euclid(360.0);
    if r >= 360.0 { 0.0 } else { r }
}

/// Wrap into (-180, 180].
pub fn signed_deg(a: f64) -> f64 {
    let r = normalize_deg(a);
    if r > 180.0 { r - 360.0 } else { r }
}

/// Smallest absolute angle between two directions, [0, 180].
pub fn angle_between(a: f64, b: f64) -> f64 {
    signed_deg(a - b).abs()
}

// ── Positions ─────────────────────────────────────────────────────────────────

/// Offset of `to` from `from` in nautical miles (x = East, y = North).
pub fn offset_nm(from: LatLon, to: LatLon) -> Vec2 {
    let mean_lat = ((from.lat + to.lat) / 2.0).to_radians();
    let dlon = signed_deg(to.lon - from.lon);
    Vec2::new(dlon * 60.0 * mean_lat.cos(), (to.lat - from.lat) * 60.0)
}

pub fn bearing_deg(from: LatLon, to: LatLon) -> f64 {
    offset_nm(from, to).bearing_deg()
}

pub fn distance_nm(from: LatLon, to: LatLon) -> f64 {
    offset_nm(from, to).magnitude()
}

/// Move `pos` by a displacement in nautical miles.
pub fn displace(pos: LatLon, d: Vec2) -> LatLon {
    let cos_lat = pos.lat.to_radians().cos().max(1e-6);
    let lat = (pos.lat + d.y / 60.0).clamp(-90.0, 90.0);
    let lon = signed_deg(pos.lon + d.x / (60.0 * cos_lat));
    LatLon::new(lat, lon)
}

/// Signed perpendicular distance (nm) of `pos` from the line `origin → dest`,
/// positive when `pos` is to the right of the track.
pub fn cross_track_nm(origin: LatLon, dest: LatLon, pos: LatLon) -> f64 {
    match offset_nm(origin, dest).unit() {
        Some(track) => offset_nm(origin, pos).dot(&track.right_normal()),
        None => 0.0,
    }
}

/// Unit vector along `origin → dest`, if the leg has length.
pub fn track_unit(origin: LatLon, dest: LatLon) -> Option<Vec2> {
    offset_nm(origin, dest).unit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polar_round_trip() {
        for b in [0.0, 45.0, 90.0, 135.0, 210.0, 359.0] {
            let v = Vec2::from_polar(6.0, b);
            assert!((v.magnitude() - 6.0).abs() < 1e-9);
            assert!(angle_between(v.bearing_deg(), b) < 1e-9, "{b}");
        }
    }

    #[test]
    fn angle_wrapping() {
        assert_eq!(normalize_deg(-10.0), 350.0);
        assert_eq!(signed_deg(270.0), -90.0);
        assert_eq!(signed_deg(180.0), 180.0);
        assert!((angle_between(350.0, 10.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn east_leg_geometry() {
        let a = LatLon::new(50.0, -1.0);
        let b = LatLon::new(50.0, -0.8);
        assert!((bearing_deg(a, b) - 90.0).abs() < 1e-9);
        let expected = 0.2 * 60.0 * 50f64.to_radians().cos();
        assert!((distance_nm(a, b) - expected).abs() < 1e-9);

        // South of an eastbound track is to the right of it
        let south = LatLon::new(49.99, -0.9);
        assert!((cross_track_nm(a, b, south) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn displacement_scales_longitude() {
        let p = LatLon::new(60.0, 0.0);
        let q = displace(p, Vec2::new(1.0, 1.0));
        assert!((q.lat - (60.0 + 1.0 / 60.0)).abs() < 1e-12);
        assert!((q.lon - 1.0 / 30.0).abs() < 1e-9);
    }
}
