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

//! Feature contour extraction and analysis.
//!
//! A feature's contour is the 8-connected chain of pixels on the interior edge of a ridge or
//! valley ending, with each contour pixel paired with an adjacent exterior pixel of the
//! opposite color. The walker is iterative and reports loops explicitly instead of recursing
//! through them.

use crate::BinaryImage;
use crate::util::trunc_precision;

/// X offset of each 8-neighbor, indexed N, NE, E, SE, S, SW, W, NW.
const NBR8_DX: [i32; 8] = [0, 1, 1, 1, 0, -1, -1, -1];

/// Y offset of each 8-neighbor, indexed N, NE, E, SE, S, SW, W, NW.
const NBR8_DY: [i32; 8] = [-1, -1, 0, 1, 1, 1, 0, -1];

/// A point on a feature's contour: the interior pixel and its exterior edge pixel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ContourPoint {
    /// X coordinate of the contour pixel (feature color).
    pub x: i32,

    /// Y coordinate of the contour pixel (feature color).
    pub y: i32,

    /// X coordinate of the adjacent edge pixel (opposite color).
    pub ex: i32,

    /// Y coordinate of the adjacent edge pixel (opposite color).
    pub ey: i32,
}

/// An extracted contour.
pub type Contour = Vec<ContourPoint>;

/// Outcome of a contour trace.
#[derive(Debug)]
pub enum Trace {
    /// The starting feature/edge pixels do not have opposite colors; no trace is possible.
    Ignore,

    /// The trace came back around to the designated loop point.
    Loop(Contour),

    /// The trace stopped, either at the requested length or where the contour ended.
    Done(Contour),
}

/// Outcome of a high-curvature contour extraction.
#[derive(Debug)]
pub enum HighCurvature {
    /// No contour of sufficient length could be extracted.
    Empty,

    /// The contour closes into a loop (starting feature point first).
    Loop(Contour),

    /// A full open contour, ordered first half reversed, feature point, second half.
    Extracted(Contour),
}

/// Outcome of a centered contour extraction.
#[derive(Debug)]
pub enum Centered {
    /// The trace was not possible from the starting pixel pair.
    Ignore,

    /// The contour closes into a loop.
    Loop,

    /// The contour ended before the requested length.
    Incomplete,

    /// A full open contour of length `2 * half + 1`.
    Extracted(Contour),
}

/// Relative position of the edge pixel: the 8-neighbor index of one N, S, E or W neighbor.
fn start_scan_nbr(x: i32, y: i32, ex: i32, ey: i32) -> usize {
    if x == ex && ey > y {
        4 // south
    } else if x == ex && ey < y {
        0 // north
    } else if ex > x {
        2 // east
    } else {
        6 // west
    }
}

/// Advances an 8-neighbor index one position clockwise or counter-clockwise.
fn next_scan_nbr(nbr: usize, clockwise: bool) -> usize {
    if clockwise { (nbr + 1) % 8 } else { (nbr + 7) % 8 }
}

/// Locates the next pixel pair on a feature's contour.
///
/// Neighbors of the current contour pixel are scanned in the given rotation until a pair of
/// adjacent neighbors transitions from edge color to feature color. An "exposed" corner (a
/// diagonal neighbor whose following neighbor is not feature-colored) is skipped.
fn next_contour_pixel(
    cur: ContourPoint, clockwise: bool, bin: &BinaryImage,
) -> Option<ContourPoint> {
    let feature_pix = bin.get(cur.x, cur.y);
    let edge_pix = bin.get(cur.ex, cur.ey);

    let mut nbr = start_scan_nbr(cur.x, cur.y, cur.ex, cur.ey);
    let mut prev = (cur.ex, cur.ey, edge_pix);

    let mut i = 0;
    while i < 8 {
        nbr = next_scan_nbr(nbr, clockwise);
        let nx = cur.x + NBR8_DX[nbr];
        let ny = cur.y + NBR8_DY[nbr];
        if !bin.contains(nx, ny) {
            return None;
        }
        let npix = bin.get(nx, ny);
        if npix == feature_pix && prev.2 == edge_pix {
            // Corners (odd neighbor indices) may be exposed: check the next neighbor too.
            if nbr % 2 == 1 {
                let ni = next_scan_nbr(nbr, clockwise);
                let nnx = cur.x + NBR8_DX[ni];
                let nny = cur.y + NBR8_DY[ni];
                if !bin.contains(nnx, nny) {
                    return None;
                }
                let nnpix = bin.get(nnx, nny);
                if nnpix == feature_pix {
                    return Some(ContourPoint { x: nx, y: ny, ex: prev.0, ey: prev.1 });
                }
                // Exposed corner: skip it, so that it becomes the previous neighbor.
                prev = (nnx, nny, nnpix);
                nbr = ni;
                i += 2;
                continue;
            }
            return Some(ContourPoint { x: nx, y: ny, ex: prev.0, ey: prev.1 });
        }
        prev = (nx, ny, npix);
        i += 1;
    }

    // A single isolated pixel has no contour neighbor.
    None
}

/// Extracts up to `max_len` contour points from a starting pixel pair.
///
/// The starting point itself is not part of the result. If `loop_point` is reached, the trace
/// stops and reports a loop; by passing the endpoint of a previous trace, loops spanning
/// successive calls are detected.
pub fn trace_contour(
    bin: &BinaryImage, max_len: usize, loop_point: (i32, i32), start: ContourPoint,
    clockwise: bool,
) -> Trace {
    if bin.get(start.x, start.y) == bin.get(start.ex, start.ey) {
        return Trace::Ignore;
    }
    let mut contour = Vec::with_capacity(max_len);
    let mut cur = start;
    for _ in 0 .. max_len {
        match next_contour_pixel(cur, clockwise, bin) {
            Some(next) => {
                if (next.x, next.y) == loop_point {
                    return Trace::Loop(contour);
                }
                contour.push(next);
                cur = next;
            }
            None => return Trace::Done(contour),
        }
    }
    Trace::Done(contour)
}

/// Walks a feature's contour searching for a specific pixel.
pub fn search_contour(
    search: (i32, i32), search_len: usize, start: ContourPoint, clockwise: bool,
    bin: &BinaryImage,
) -> bool {
    if bin.get(start.x, start.y) == bin.get(start.ex, start.ey) {
        return false;
    }
    let mut cur = start;
    for _ in 0 .. search_len {
        match next_contour_pixel(cur, clockwise, bin) {
            Some(next) => {
                if (next.x, next.y) == search {
                    return true;
                }
                cur = next;
            }
            None => return false,
        }
    }
    false
}

/// Concatenates two half contours around their common starting feature point.
///
/// The first half was traced clockwise so its points enter in reverse order; the result runs
/// from the far end of the first half, through the feature point, to the far end of the second.
fn join_halves(half1: &[ContourPoint], start: ContourPoint, half2: &[ContourPoint]) -> Contour {
    let mut contour = Vec::with_capacity(half1.len() + 1 + half2.len());
    contour.extend(half1.iter().rev());
    contour.push(start);
    contour.extend_from_slice(half2);
    contour
}

/// Extracts the contour surrounding a candidate minutia in a high-curvature area.
///
/// Walks `half` steps clockwise and then counter-clockwise from the feature point. A loop
/// discovered on the first half is returned with the feature point first for loop processing;
/// a loop discovered on the second half is returned in full walk order.
pub fn get_high_curvature_contour(
    bin: &BinaryImage, half: usize, start: ContourPoint,
) -> HighCurvature {
    let half1 = match trace_contour(bin, half, (start.x, start.y), start, true) {
        Trace::Ignore => return HighCurvature::Empty,
        Trace::Loop(half1) => {
            let mut contour = Vec::with_capacity(half1.len() + 1);
            contour.push(start);
            contour.extend(half1.iter().rev());
            return HighCurvature::Loop(contour);
        }
        Trace::Done(half1) => half1,
    };
    if half1.len() < half || half == 0 {
        return HighCurvature::Empty;
    }

    // Use the far end of the first half as the loop probe for the second.
    let probe = (half1[half1.len() - 1].x, half1[half1.len() - 1].y);
    match trace_contour(bin, half, probe, start, false) {
        Trace::Ignore => HighCurvature::Empty,
        Trace::Loop(half2) => HighCurvature::Loop(join_halves(&half1, start, &half2)),
        Trace::Done(half2) => {
            if half2.len() < half {
                return HighCurvature::Empty;
            }
            HighCurvature::Extracted(join_halves(&half1, start, &half2))
        }
    }
}

/// Extracts a contour of exactly `2 * half + 1` points centered on the feature point.
pub fn get_centered_contour(bin: &BinaryImage, half: usize, start: ContourPoint) -> Centered {
    let half1 = match trace_contour(bin, half, (start.x, start.y), start, true) {
        Trace::Ignore => return Centered::Ignore,
        Trace::Loop(_) => return Centered::Loop,
        Trace::Done(half1) => half1,
    };
    if half1.len() < half {
        return Centered::Incomplete;
    }
    let probe = (half1[half1.len() - 1].x, half1[half1.len() - 1].y);
    match trace_contour(bin, half, probe, start, false) {
        Trace::Ignore => Centered::Ignore,
        Trace::Loop(_) => Centered::Loop,
        Trace::Done(half2) => {
            if half2.len() < half {
                return Centered::Incomplete;
            }
            Centered::Extracted(join_halves(&half1, start, &half2))
        }
    }
}

/// Angle in radians of the line from one point to another, `[-PI, PI]`.
fn angle_to_line(fx: i32, fy: i32, tx: i32, ty: i32) -> f64 {
    let dy = (fy - ty) as f64;
    let dx = (tx - fx) as f64;
    if dx.abs() < crate::dir::MIN_SLOPE_DELTA && dy.abs() < crate::dir::MIN_SLOPE_DELTA {
        0.0
    } else {
        dy.atan2(dx)
    }
}

/// Finds the contour point of highest curvature.
///
/// At each candidate, two chords of `angle_edge` points extend left and right; the angle
/// between them measures the local curvature, and the point minimizing it wins. Returns `None`
/// if the contour is too short to analyze.
pub fn min_contour_theta(contour: &[ContourPoint], angle_edge: usize) -> Option<(usize, f64)> {
    if contour.len() < 2 * angle_edge + 1 {
        return None;
    }
    let mut min_theta = trunc_precision(std::f64::consts::PI);
    let mut min_i = None;
    for center in angle_edge .. contour.len() - angle_edge {
        let left = center - angle_edge;
        let right = center + angle_edge;
        let theta1 = angle_to_line(contour[center].x, contour[center].y, contour[left].x,
            contour[left].y);
        let theta2 = angle_to_line(contour[center].x, contour[center].y, contour[right].x,
            contour[right].y);
        let mut dtheta = (theta2 - theta1).abs();
        dtheta = dtheta.min(2.0 * std::f64::consts::PI - dtheta);
        let dtheta = trunc_precision(dtheta);
        if dtheta < min_theta {
            min_theta = dtheta;
            min_i = Some(center);
        }
    }
    // A perfectly flat contour has no strict minimum: use its center point.
    Some((min_i.unwrap_or(contour.len() >> 1), min_theta))
}

/// Repositions a diagonal feature/edge pixel pair to neighbor N, S, E, or W.
///
/// Contour tracing requires the edge pixel on a cardinal neighbor of the feature pixel. When
/// the pair neighbors diagonally, one of the two pixels completing the 2x2 square keeps the
/// pair's colors while restoring cardinal adjacency.
pub fn fix_edge_pixel_pair(
    feat: (i32, i32), edge: (i32, i32), bin: &BinaryImage,
) -> ((i32, i32), (i32, i32)) {
    let (cx, cy) = feat;
    let (mut px, mut py) = edge;
    let dx = px - cx;
    let dy = py - cy;
    if dx.abs() != 1 || dy.abs() != 1 {
        return (feat, edge);
    }
    let feature_pix = bin.get(cx, cy);
    if bin.get(px - dx, py) != feature_pix {
        px -= dx;
    } else if bin.get(px, py - dy) != feature_pix {
        py -= dy;
    } else {
        // The feature pixel sits on an exposed corner: slide it instead.
        return ((cx, cy + dy), (px, py));
    }
    ((cx, cy), (px, py))
}

#[cfg(test)]
mod tests {
    use super::*;

    // A 9x9 white field with a 3-pixel wide black bar in columns 3..6, rows 2..=8.
    // The ridge ends at row 2.
    fn bar_image() -> BinaryImage {
        let mut pixels = vec![0u8; 81];
        for y in 2 .. 9 {
            for x in 3 .. 6 {
                pixels[y * 9 + x] = 1;
            }
        }
        BinaryImage::new(9, 9, pixels).unwrap()
    }

    #[test]
    fn trace_follows_the_ridge_tip() {
        let bin = bar_image();
        let start = ContourPoint { x: 4, y: 2, ex: 4, ey: 1 };
        match trace_contour(&bin, 4, (start.x, start.y), start, true) {
            Trace::Done(contour) => {
                assert_eq!(contour.len(), 4);
                // Clockwise from the tip walks the right side of the bar downward.
                assert_eq!((contour[0].x, contour[0].y), (5, 2));
                assert_eq!((contour[1].x, contour[1].y), (5, 3));
            }
            other => panic!("unexpected trace outcome: {other:?}"),
        }
    }

    #[test]
    fn trace_with_mismatched_pair_is_ignored() {
        let bin = bar_image();
        let start = ContourPoint { x: 4, y: 2, ex: 4, ey: 3 };
        assert!(matches!(trace_contour(&bin, 4, (4, 2), start, true), Trace::Ignore));
    }

    #[test]
    fn centered_contour_is_symmetric() {
        let bin = bar_image();
        let start = ContourPoint { x: 4, y: 2, ex: 4, ey: 1 };
        match get_centered_contour(&bin, 3, start) {
            Centered::Extracted(contour) => {
                assert_eq!(contour.len(), 7);
                assert_eq!((contour[3].x, contour[3].y), (4, 2));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn min_theta_is_at_the_tip() {
        let bin = bar_image();
        let start = ContourPoint { x: 4, y: 2, ex: 4, ey: 1 };
        let contour = match get_centered_contour(&bin, 3, start) {
            Centered::Extracted(contour) => contour,
            other => panic!("unexpected outcome: {other:?}"),
        };
        let (min_i, theta) = min_contour_theta(&contour, 3).unwrap();
        assert_eq!(min_i, 3);
        assert!(theta < std::f64::consts::PI / 2.0);
    }

    #[test]
    fn fix_edge_pixel_pair_restores_cardinal_adjacency() {
        let bin = bar_image();
        // Feature (3,2) with a diagonal edge at (2,1).
        let (feat, edge) = fix_edge_pixel_pair((3, 2), (2, 1), &bin);
        let (dx, dy) = (edge.0 - feat.0, edge.1 - feat.1);
        assert_eq!(dx.abs() + dy.abs(), 1);
        assert_eq!(bin.get(feat.0, feat.1), 1);
        assert_eq!(bin.get(edge.0, edge.1), 0);
    }

    #[test]
    fn small_island_loops() {
        // A 2x2 black island in a white field.
        let mut pixels = vec![0u8; 64];
        for y in 3 .. 5 {
            for x in 3 .. 5 {
                pixels[y * 8 + x] = 1;
            }
        }
        let bin = BinaryImage::new(8, 8, pixels).unwrap();
        let start = ContourPoint { x: 3, y: 3, ex: 3, ey: 2 };
        assert!(matches!(trace_contour(&bin, 20, (3, 3), start, true), Trace::Loop(_)));
    }
}
