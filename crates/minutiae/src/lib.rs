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

//! Minutiae detection and false-minutiae pruning.
//!
//! The pipeline operates on a binarized fingerprint image (black ridges as 1 on white valleys
//! as 0) together with block-level maps describing local ridge flow. It does not derive those
//! maps itself: the caller says what each block looks like. [`detect_minutiae`] scans the image
//! for candidate ridge endings and bifurcations, and [`remove::remove_false_minutiae`] prunes
//! the candidates through a cascade of geometric and topological tests.

use fprint_error::{Code, Error};

pub mod binarize;
pub mod contour;
pub mod detect;
pub mod dir;
pub mod loops;
pub mod maps;
pub mod params;
pub mod remove;
pub mod util;

pub use detect::detect_minutiae;
pub use dir::{FullDir, NDIRS, SemiDir};
pub use maps::BlockMaps;
pub use params::LfsParams;

/// Pixel value of a white (valley) pixel in a binarized image.
pub const WHITE_PIXEL: u8 = 0;

/// Pixel value of a black (ridge) pixel in a binarized image.
pub const BLACK_PIXEL: u8 = 1;

/// Reliability of a minutia detected in a block with dependable ridge flow.
pub const HIGH_RELIABILITY: f64 = 0.99;

/// Reliability of a minutia detected in a low-flow block.
pub const MEDIUM_RELIABILITY: f64 = 0.50;

/// Feature-pattern index assigned to minutiae extracted from loops.
pub const LOOP_ID: u8 = 10;

/// A binarized image: black ridges (1) on white valleys (0), row-major.
///
/// The pruning cascade edits the pixels (filled lakes and islands), so the pipeline owns a
/// mutable view of the buffer for its whole run.
#[derive(Debug, Clone)]
pub struct BinaryImage {
    /// Width in pixels.
    pub width: usize,

    /// Height in pixels.
    pub height: usize,

    /// Pixel data, `width * height` bytes of 0 or 1.
    pub pixels: Vec<u8>,
}

impl BinaryImage {
    /// Creates a binarized image, checking the buffer length.
    pub fn new(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self, Error> {
        Error::user(Code::InvalidLength).check(width * height <= pixels.len())?;
        Error::user(Code::InvalidArgument).check(width > 0 && height > 0)?;
        Ok(BinaryImage { width, height, pixels })
    }

    /// Whether a pixel coordinate is within the image.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        0 <= x && (x as usize) < self.width && 0 <= y && (y as usize) < self.height
    }

    /// Reads a pixel. The coordinate must be within the image.
    pub fn get(&self, x: i32, y: i32) -> u8 {
        debug_assert!(self.contains(x, y));
        self.pixels[y as usize * self.width + x as usize]
    }

    /// Writes a pixel. The coordinate must be within the image.
    pub fn set(&mut self, x: i32, y: i32, value: u8) {
        debug_assert!(self.contains(x, y));
        self.pixels[y as usize * self.width + x as usize] = value;
    }
}

/// Kind of a minutia feature.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MinutiaKind {
    /// A ridge splitting into two (detected as a valley ending).
    Bifurcation,

    /// A ridge terminating.
    RidgeEnding,
}

impl MinutiaKind {
    /// Derives the kind from the feature's interior pixel value.
    ///
    /// A white feature pixel is a valley ending, so a bifurcation. A black one is a ridge
    /// ending.
    pub fn from_pixel(pixel: u8) -> Self {
        if pixel == WHITE_PIXEL { MinutiaKind::Bifurcation } else { MinutiaKind::RidgeEnding }
    }

    /// The interior pixel value of features of this kind.
    pub fn pixel(self) -> u8 {
        match self {
            MinutiaKind::Bifurcation => WHITE_PIXEL,
            MinutiaKind::RidgeEnding => BLACK_PIXEL,
        }
    }
}

/// A ridge neighbor of a minutia, populated by downstream ridge-count analyses.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Neighbor {
    /// Index of the neighboring minutia in its list.
    pub index: usize,

    /// Number of ridges crossed on the way to the neighbor.
    pub ridge_count: u32,
}

/// A detected minutia point.
#[derive(Debug, Clone)]
pub struct Minutia {
    /// X pixel coordinate, interior to the feature.
    pub x: i32,

    /// Y pixel coordinate, interior to the feature.
    pub y: i32,

    /// X coordinate of the adjacent exterior edge pixel.
    pub ex: i32,

    /// Y coordinate of the adjacent exterior edge pixel.
    pub ey: i32,

    /// Direction perpendicular to the ridge at the minutia, on the full circle.
    pub direction: FullDir,

    /// Reliability, [`HIGH_RELIABILITY`] or [`MEDIUM_RELIABILITY`].
    pub reliability: f64,

    /// Feature kind.
    pub kind: MinutiaKind,

    /// Whether the feature opens away from the scan that detected it.
    pub appearing: bool,

    /// Index into the feature-pattern table, or [`LOOP_ID`] for loop-extracted minutiae.
    pub feature_id: u8,

    /// Nearest ridge neighbors, filled in by later analyses.
    pub neighbors: Option<Vec<Neighbor>>,
}

/// An ordered list of minutiae.
#[derive(Debug, Clone, Default)]
pub struct Minutiae(pub Vec<Minutia>);

impl Minutiae {
    /// Creates an empty list.
    pub fn new() -> Self {
        Minutiae(Vec::new())
    }

    /// Number of minutiae in the list.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the minutiae.
    pub fn iter(&self) -> std::slice::Iter<'_, Minutia> {
        self.0.iter()
    }

    /// Sorts the list top-to-bottom then left-to-right.
    pub fn sort_y_x(&mut self) {
        self.0.sort_by_key(|m| (m.y, m.x));
    }

    /// Removes minutiae sharing the exact pixel location of an earlier entry.
    ///
    /// The list must be sorted with [`Minutiae::sort_y_x`] first.
    pub fn remove_coincident(&mut self) {
        self.0.dedup_by(|b, a| a.x == b.x && a.y == b.y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_pixel_color() {
        assert_eq!(MinutiaKind::from_pixel(WHITE_PIXEL), MinutiaKind::Bifurcation);
        assert_eq!(MinutiaKind::from_pixel(BLACK_PIXEL), MinutiaKind::RidgeEnding);
    }

    #[test]
    fn coincident_minutiae_are_deduplicated() {
        let m = |x, y| Minutia {
            x,
            y,
            ex: x,
            ey: y - 1,
            direction: FullDir::new(0),
            reliability: HIGH_RELIABILITY,
            kind: MinutiaKind::RidgeEnding,
            appearing: true,
            feature_id: 0,
            neighbors: None,
        };
        let mut list = Minutiae(vec![m(3, 9), m(10, 4), m(3, 9), m(10, 5)]);
        list.sort_y_x();
        list.remove_coincident();
        let coords: Vec<_> = list.iter().map(|m| (m.x, m.y)).collect();
        assert_eq!(coords, [(10, 4), (10, 5), (3, 9)]);
    }
}
