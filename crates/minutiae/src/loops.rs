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

//! Loop handling: islands, lakes, hooks, and the loop sub-procedure.
//!
//! Loops are closed feature contours. Small ones are artifacts (islands of ink, lakes, pores)
//! whose minutiae are false: they are filled in the binary image and their minutiae dropped.
//! Large elongated loops are genuine ridge structures whose two ends carry real minutiae.

use crate::contour::{Contour, ContourPoint, Trace, trace_contour};
use crate::detect::update_minutiae;
use crate::dir::line_to_direction;
use crate::maps::BlockMaps;
use crate::params::LfsParams;
use crate::util::{distance, trunc_precision};
use crate::{BinaryImage, HIGH_RELIABILITY, LOOP_ID, MEDIUM_RELIABILITY, Minutia, MinutiaKind,
    Minutiae};

/// Outcome of a loop test on a single minutia.
#[derive(Debug)]
pub enum LoopTest {
    /// The contour closes into a loop within the length limit.
    OnLoop,

    /// The contour does not close within the length limit.
    NotFound,

    /// The minutia's pixel pair can no longer seed a trace.
    Ignore,
}

/// Outcome of an island/lake test on a minutia pair.
#[derive(Debug)]
pub enum IslandLake {
    /// The pair bounds a closed loop; the full loop contour is returned.
    Loop(Contour),

    /// The pair is not on a common loop.
    NotFound,

    /// The first minutia's pixel pair can no longer seed a trace.
    Ignore,
}

/// Whether the feature's open end points away from the scan axis.
///
/// The edge pixel always neighbors the feature to the N, S, E, or W; an edge before the
/// feature on either axis means the feature appeared. Returns `None` for a malformed pair.
pub fn is_appearing(x: i32, y: i32, ex: i32, ey: i32) -> Option<bool> {
    if ex < x {
        Some(true)
    } else if ex > x {
        Some(false)
    } else if ey < y {
        Some(true)
    } else if ey > y {
        Some(false)
    } else {
        None
    }
}

/// Whether a closed contour is ordered clockwise.
///
/// Uses the signed area of the polygon in image coordinates (y grows down). Degenerate
/// contours return `default`.
pub fn is_loop_clockwise(contour: &[ContourPoint], default: bool) -> bool {
    let mut area2 = 0i64;
    for i in 0 .. contour.len() {
        let a = &contour[i];
        let b = &contour[(i + 1) % contour.len()];
        area2 += a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
    }
    if area2 == 0 { default } else { area2 > 0 }
}

/// Fills a closed loop with its feature color.
///
/// Each image row covered by the loop is filled between successive pairs of its boundary
/// pixels on that row.
pub fn fill_loop(contour: &[ContourPoint], bin: &mut BinaryImage) {
    let Some(first) = contour.first() else { return };
    let color = bin.get(first.x, first.y);
    let min_y = contour.iter().map(|p| p.y).min().unwrap();
    let max_y = contour.iter().map(|p| p.y).max().unwrap();
    for y in min_y ..= max_y {
        let mut xs: Vec<i32> = contour.iter().filter(|p| p.y == y).map(|p| p.x).collect();
        xs.sort_unstable();
        xs.dedup();
        let mut i = 0;
        while i + 1 < xs.len() {
            for x in xs[i] ..= xs[i + 1] {
                bin.set(x, y, color);
            }
            i += 2;
        }
        if i < xs.len() {
            bin.set(xs[i], y, color);
        }
    }
}

/// Tests whether a single minutia lies on a small closed loop.
pub fn on_loop(minutia: ContourPoint, loop_len: usize, bin: &BinaryImage) -> LoopTest {
    match trace_contour(bin, loop_len, (minutia.x, minutia.y), minutia, true) {
        Trace::Ignore => LoopTest::Ignore,
        Trace::Loop(_) => LoopTest::OnLoop,
        Trace::Done(_) => LoopTest::NotFound,
    }
}

/// Tests whether two same-type minutiae bound a common island or lake.
///
/// Traces from the first minutia clockwise and counter-clockwise, up to `half_loop` steps
/// each way, looking for the second. If both traces reach it, the two halves form a closed
/// loop around the feature.
pub fn on_island_lake(
    m1: ContourPoint, m2: ContourPoint, half_loop: usize, bin: &BinaryImage,
) -> IslandLake {
    let first = match trace_contour(bin, half_loop, (m2.x, m2.y), m1, true) {
        Trace::Ignore => return IslandLake::Ignore,
        Trace::Done(_) => return IslandLake::NotFound,
        Trace::Loop(half) => half,
    };
    let second = match trace_contour(bin, half_loop, (m2.x, m2.y), m1, false) {
        Trace::Ignore => return IslandLake::Ignore,
        Trace::Done(_) => return IslandLake::NotFound,
        Trace::Loop(half) => half,
    };
    let mut contour = Vec::with_capacity(first.len() + second.len() + 2);
    contour.push(m1);
    contour.extend_from_slice(&first);
    contour.push(m2);
    contour.extend(second.iter().rev());
    IslandLake::Loop(contour)
}

/// Tests whether two opposite-type minutiae sit on a common hook.
///
/// A hook is a thin protrusion carrying a ridge ending and a valley ending on the same
/// black/white boundary: walking the first minutia's contour reaches the second minutia's
/// edge pixel (which has the first one's color).
pub fn on_hook(m1: ContourPoint, m2: ContourPoint, hook_len: usize, bin: &BinaryImage) -> LoopTest {
    if bin.get(m1.x, m1.y) == bin.get(m1.ex, m1.ey) {
        return LoopTest::Ignore;
    }
    let target = (m2.ex, m2.ey);
    if crate::contour::search_contour(target, hook_len, m1, true, bin)
        || crate::contour::search_contour(target, hook_len, m1, false, bin)
    {
        LoopTest::OnLoop
    } else {
        LoopTest::NotFound
    }
}

/// Processes a closed loop discovered during detection.
///
/// Loops longer than [`LfsParams::min_loop_len`] whose shape is sufficiently elongated carry a
/// minutia at each end of their long axis; those are extracted and filed. Any other loop is an
/// artifact and is filled in the binary image.
pub fn process_loop(
    minutiae: &mut Minutiae, contour: &Contour, bin: &mut BinaryImage, maps: &BlockMaps,
    params: &LfsParams,
) {
    let n = contour.len();
    if n > params.min_loop_len {
        let half = n >> 1;
        let mut min_i = 0;
        let mut min_dist = f64::MAX;
        let mut max_dist = 0.0f64;
        for i in 0 .. half {
            let a = &contour[i];
            let b = &contour[i + half];
            let dist = trunc_precision(distance(a.x, a.y, b.x, b.y));
            if dist < min_dist {
                min_dist = dist;
                min_i = i;
            }
            max_dist = max_dist.max(dist);
        }
        let elongated = min_dist < params.min_loop_aspect_dist
            || (min_dist > 0.0
                && trunc_precision(max_dist / min_dist) >= params.min_loop_aspect_ratio);
        if elongated {
            extract_loop_minutia(minutiae, contour[min_i], contour[min_i + half], bin, maps,
                params);
            extract_loop_minutia(minutiae, contour[min_i + half], contour[min_i], bin, maps,
                params);
            return;
        }
    }
    fill_loop(contour, bin);
}

/// Files one end of an elongated loop as a minutia.
fn extract_loop_minutia(
    minutiae: &mut Minutiae, point: ContourPoint, other: ContourPoint, bin: &BinaryImage,
    maps: &BlockMaps, params: &LfsParams,
) {
    let Some(appearing) = is_appearing(point.x, point.y, point.ex, point.ey) else { return };
    let direction = line_to_direction(other.x, other.y, point.x, point.y);
    let reliability = if maps.low_flow_at_pixel(point.x, point.y) {
        MEDIUM_RELIABILITY
    } else {
        HIGH_RELIABILITY
    };
    let minutia = Minutia {
        x: point.x,
        y: point.y,
        ex: point.ex,
        ey: point.ey,
        direction,
        reliability,
        kind: MinutiaKind::from_pixel(bin.get(point.x, point.y)),
        appearing,
        feature_id: LOOP_ID,
        neighbors: None,
    };
    update_minutiae(minutiae, minutia, bin, params);
}

#[cfg(test)]
mod tests {
    use super::*;

    // An 8x3 black island in a white 16x16 field, rows 6..=8, columns 4..=11.
    fn island_image() -> BinaryImage {
        let mut pixels = vec![0u8; 256];
        for y in 6 .. 9 {
            for x in 4 .. 12 {
                pixels[y * 16 + x] = 1;
            }
        }
        BinaryImage::new(16, 16, pixels).unwrap()
    }

    #[test]
    fn island_pair_forms_a_loop_and_fills() {
        let bin = &mut island_image();
        let m1 = ContourPoint { x: 4, y: 7, ex: 3, ey: 7 };
        let m2 = ContourPoint { x: 11, y: 7, ex: 12, ey: 7 };
        let contour = match on_island_lake(m1, m2, 30, bin) {
            IslandLake::Loop(contour) => contour,
            other => panic!("unexpected outcome: {other:?}"),
        };
        fill_loop(&contour, bin);
        // The island stays black: filling with the feature color is idempotent here.
        assert_eq!(bin.get(7, 7), 1);
    }

    #[test]
    fn lake_is_filled_with_white() {
        // A white lake inside a black blob.
        let mut pixels = vec![0u8; 256];
        for y in 3 .. 13 {
            for x in 3 .. 13 {
                pixels[y * 16 + x] = 1;
            }
        }
        for y in 6 .. 9 {
            for x in 6 .. 10 {
                pixels[y * 16 + x] = 0;
            }
        }
        let bin = &mut BinaryImage::new(16, 16, pixels).unwrap();
        let m1 = ContourPoint { x: 6, y: 7, ex: 5, ey: 7 };
        let m2 = ContourPoint { x: 9, y: 7, ex: 10, ey: 7 };
        match on_island_lake(m1, m2, 30, bin) {
            IslandLake::Loop(contour) => {
                // Painting the lake's loop with its own (white) color has no effect; the
                // caller removes its minutiae either way.
                fill_loop(&contour, bin);
                assert_eq!(bin.get(7, 7), 0);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn far_pair_is_not_an_island() {
        let bin = &island_image();
        let m1 = ContourPoint { x: 4, y: 7, ex: 3, ey: 7 };
        let m2 = ContourPoint { x: 11, y: 7, ex: 12, ey: 7 };
        assert!(matches!(on_island_lake(m1, m2, 5, bin), IslandLake::NotFound));
    }

    #[test]
    fn single_minutia_loop_test() {
        let bin = &island_image();
        let m = ContourPoint { x: 4, y: 7, ex: 3, ey: 7 };
        assert!(matches!(on_loop(m, 30, bin), LoopTest::OnLoop));
        assert!(matches!(on_loop(m, 10, bin), LoopTest::NotFound));
        let bad = ContourPoint { x: 4, y: 7, ex: 5, ey: 7 };
        assert!(matches!(on_loop(bad, 30, bin), LoopTest::Ignore));
    }

    #[test]
    fn appearing_follows_edge_position() {
        assert_eq!(is_appearing(5, 5, 4, 5), Some(true));
        assert_eq!(is_appearing(5, 5, 6, 5), Some(false));
        assert_eq!(is_appearing(5, 5, 5, 4), Some(true));
        assert_eq!(is_appearing(5, 5, 5, 5), None);
    }
}
