// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Integer ridge directions.
//!
//! Directions live in two rings: block ridge flow is a [`SemiDir`] on `[0, NDIRS)` covering a
//! semicircle, while minutia orientation is a [`FullDir`] on `[0, 2*NDIRS)` covering the full
//! circle. Keeping them as distinct types prevents mixing the rings. Direction 0 points up the
//! image (negative y) and values increase clockwise; a full direction `d` corresponds to the
//! unit vector `(sin a, -cos a)` with `a = d * PI / NDIRS`.

use crate::util::{sround, trunc_precision};

/// Number of integer directions in a semicircle.
pub const NDIRS: u8 = 16;

/// If both coordinate deltas of a line are below this threshold, its angle is taken as zero.
pub const MIN_SLOPE_DELTA: f64 = 0.5;

/// A block ridge-flow direction on the semicircle `[0, NDIRS)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemiDir(u8);

impl SemiDir {
    /// Wraps a raw value onto the semicircle.
    pub fn new(value: u8) -> Self {
        SemiDir(value % NDIRS)
    }

    /// Raw value on `[0, NDIRS)`.
    pub fn value(self) -> u8 {
        self.0
    }

    /// Whether the direction lies in the first quadrant half of the semicircle.
    ///
    /// That is `d <= NDIRS / 2`, the relatively vertical ridge flows.
    pub fn is_first_quadrant(self) -> bool {
        self.0 <= NDIRS / 2
    }

    /// Promotes the semicircle direction to the full circle, unchanged.
    pub fn widen(self) -> FullDir {
        FullDir(self.0)
    }
}

/// A minutia direction on the full circle `[0, 2*NDIRS)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FullDir(u8);

impl FullDir {
    /// Wraps a raw value onto the full circle.
    pub fn new(value: u8) -> Self {
        FullDir(value % (2 * NDIRS))
    }

    /// Raw value on `[0, 2*NDIRS)`.
    pub fn value(self) -> u8 {
        self.0
    }

    /// The opposite direction.
    pub fn opposite(self) -> FullDir {
        FullDir::new(self.0 + NDIRS)
    }

    /// Inner distance to another direction on the full circle, at most `NDIRS`.
    pub fn distance(self, other: FullDir) -> u8 {
        let delta = self.0.abs_diff(other.0);
        delta.min(2 * NDIRS - delta)
    }

    /// Angle in radians, `d * PI / NDIRS`.
    pub fn to_radians(self) -> f64 {
        self.0 as f64 * std::f64::consts::PI / NDIRS as f64
    }

    /// Pixel-space unit vector the direction points along.
    ///
    /// Up the image is `(0, -1)`; values increase clockwise.
    pub fn unit_vector(self) -> (f64, f64) {
        let a = self.to_radians();
        (a.sin(), -a.cos())
    }

    /// Direction in degrees scaled by `180 / NDIRS`, on `[0, 360)`.
    pub fn to_degrees(self) -> i32 {
        sround(self.0 as f64 * 180.0 / NDIRS as f64)
    }
}

/// Integer direction of the line from one pixel to another.
///
/// Degenerate lines (both deltas under [`MIN_SLOPE_DELTA`]) get direction 0.
pub fn line_to_direction(fx: i32, fy: i32, tx: i32, ty: i32) -> FullDir {
    let dx = (tx - fx) as f64;
    let dy = (ty - fy) as f64;
    if dx.abs() < MIN_SLOPE_DELTA && dy.abs() < MIN_SLOPE_DELTA {
        return FullDir::new(0);
    }
    // atan2(dx, -dy) is zero pointing up the image and increases clockwise, matching the ring.
    let theta = dx.atan2(-dy);
    let units = trunc_precision(theta * NDIRS as f64 / std::f64::consts::PI);
    let full = 2 * NDIRS as i32;
    FullDir::new(sround(units).rem_euclid(full) as u8)
}

/// Translates a point by `steps` pixels opposite to a direction.
///
/// This is the translation the pruning cascade uses to step off a feature tip and into its
/// interior.
pub fn translate_opposite(x: i32, y: i32, dir: FullDir, steps: i32) -> (i32, i32) {
    let a = dir.to_radians();
    let dx = trunc_precision(a.sin() * steps as f64);
    let dy = trunc_precision(a.cos() * steps as f64);
    (x - sround(dx), y + sround(dy))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinal_lines() {
        assert_eq!(line_to_direction(5, 5, 5, 0), FullDir::new(0)); // up
        assert_eq!(line_to_direction(5, 5, 10, 5), FullDir::new(NDIRS / 2)); // east
        assert_eq!(line_to_direction(5, 5, 5, 10), FullDir::new(NDIRS)); // down
        assert_eq!(line_to_direction(5, 5, 0, 5), FullDir::new(3 * NDIRS / 2)); // west
    }

    #[test]
    fn distance_wraps() {
        assert_eq!(FullDir::new(1).distance(FullDir::new(31)), 2);
        assert_eq!(FullDir::new(0).distance(FullDir::new(16)), 16);
    }

    #[test]
    fn opposite_translation_of_north_goes_south() {
        assert_eq!(translate_opposite(10, 10, FullDir::new(0), 4), (10, 14));
        assert_eq!(translate_opposite(10, 10, FullDir::new(NDIRS), 4), (10, 6));
    }
}
