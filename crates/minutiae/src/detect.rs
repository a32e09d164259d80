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

//! Minutiae detection scans.
//!
//! Two scans slide a two-pixel window over the binarized image, one horizontally (window of
//! two rows) and one vertically (window of two columns). A feature is detected when three
//! consecutive pixel pairs match one of the ten patterns below; the repeated middle pair may
//! occur any number of times.

use fprint_error::Error;
use fprint_logger as log;

use crate::contour::{ContourPoint, HighCurvature, get_high_curvature_contour, min_contour_theta,
    search_contour};
use crate::dir::{FullDir, NDIRS, SemiDir, line_to_direction};
use crate::loops::{is_loop_clockwise, process_loop};
use crate::maps::BlockMaps;
use crate::params::LfsParams;
use crate::{BinaryImage, HIGH_RELIABILITY, MEDIUM_RELIABILITY, Minutia, MinutiaKind, Minutiae};

/// Orientation of a detection scan.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScanOrientation {
    /// Window of two rows sliding left to right.
    Horizontal,

    /// Window of two columns sliding top to bottom.
    Vertical,
}

/// A 2x3 pixel-pair feature pattern.
///
/// Each pair is read along the scan window; the second pair may repeat. Appearing features
/// open away from the scan, toward increasing coordinate on the window axis.
#[derive(Debug, Copy, Clone)]
pub struct FeaturePattern {
    /// Feature kind the pattern detects.
    pub kind: MinutiaKind,

    /// Whether the feature is appearing.
    pub appearing: bool,

    /// First pixel pair.
    pub first: (u8, u8),

    /// Second (repeatable) pixel pair; its two values always differ.
    pub second: (u8, u8),

    /// Third pixel pair.
    pub third: (u8, u8),
}

/// The ten feature patterns characterizing ridge endings and bifurcations.
pub const FEATURE_PATTERNS: [FeaturePattern; 10] = [
    FeaturePattern {
        kind: MinutiaKind::RidgeEnding,
        appearing: true,
        first: (0, 0),
        second: (0, 1),
        third: (0, 0),
    },
    FeaturePattern {
        kind: MinutiaKind::RidgeEnding,
        appearing: false,
        first: (0, 0),
        second: (1, 0),
        third: (0, 0),
    },
    FeaturePattern {
        kind: MinutiaKind::Bifurcation,
        appearing: false,
        first: (1, 1),
        second: (0, 1),
        third: (1, 1),
    },
    FeaturePattern {
        kind: MinutiaKind::Bifurcation,
        appearing: true,
        first: (1, 1),
        second: (1, 0),
        third: (1, 1),
    },
    FeaturePattern {
        kind: MinutiaKind::Bifurcation,
        appearing: false,
        first: (1, 0),
        second: (0, 1),
        third: (1, 1),
    },
    FeaturePattern {
        kind: MinutiaKind::Bifurcation,
        appearing: false,
        first: (1, 1),
        second: (0, 1),
        third: (1, 0),
    },
    FeaturePattern {
        kind: MinutiaKind::Bifurcation,
        appearing: false,
        first: (1, 0),
        second: (0, 1),
        third: (1, 0),
    },
    FeaturePattern {
        kind: MinutiaKind::Bifurcation,
        appearing: true,
        first: (0, 1),
        second: (1, 0),
        third: (1, 1),
    },
    FeaturePattern {
        kind: MinutiaKind::Bifurcation,
        appearing: true,
        first: (1, 1),
        second: (1, 0),
        third: (0, 1),
    },
    FeaturePattern {
        kind: MinutiaKind::Bifurcation,
        appearing: true,
        first: (0, 1),
        second: (1, 0),
        third: (0, 1),
    },
];

/// Patterns whose first pair matches the given pixels.
fn match_first_pair(pair: (u8, u8)) -> Vec<u8> {
    (0 .. FEATURE_PATTERNS.len() as u8)
        .filter(|&i| FEATURE_PATTERNS[i as usize].first == pair)
        .collect()
}

/// Narrows the candidate set to patterns whose second pair matches.
fn match_second_pair(pair: (u8, u8), possible: &mut Vec<u8>) {
    possible.retain(|&i| FEATURE_PATTERNS[i as usize].second == pair);
}

/// Narrows the candidate set to patterns whose third pair matches.
fn match_third_pair(pair: (u8, u8), possible: &mut Vec<u8>) {
    possible.retain(|&i| FEATURE_PATTERNS[i as usize].third == pair);
}

/// Scan orientation suited to a block's ridge flow.
///
/// Relatively vertical flow is scanned horizontally and vice versa, so the scan crosses the
/// ridges.
pub fn choose_scan_direction(dir: SemiDir) -> ScanOrientation {
    let qtr = NDIRS / 4;
    if dir.value() <= qtr || dir.value() > 3 * qtr {
        ScanOrientation::Horizontal
    } else {
        ScanOrientation::Vertical
    }
}

/// Full-circle direction of a low-curvature minutia.
///
/// Maps the block's semicircle ridge flow to the full circle from the scan orientation, the
/// appearing flag, and which half of the semicircle the flow is in.
pub fn low_curvature_direction(
    scan: ScanOrientation, appearing: bool, dir: SemiDir,
) -> FullDir {
    let flip = match (scan, appearing, dir.is_first_quadrant()) {
        (ScanOrientation::Horizontal, true, true) => true,
        (ScanOrientation::Horizontal, false, true) => false,
        (ScanOrientation::Horizontal, true, false) => false,
        (ScanOrientation::Horizontal, false, false) => true,
        (ScanOrientation::Vertical, true, true) => false,
        (ScanOrientation::Vertical, false, true) => true,
        (ScanOrientation::Vertical, true, false) => true,
        (ScanOrientation::Vertical, false, false) => false,
    };
    if flip { FullDir::new(dir.value() + NDIRS) } else { dir.widen() }
}

/// Detects candidate minutiae on a binarized image.
///
/// Runs the horizontal and vertical scans over the whole image, then sorts the candidates
/// top-to-bottom, left-to-right and drops coincident points. The image is mutable because
/// loops discovered while adjusting high-curvature candidates are filled in place.
pub fn detect_minutiae(
    bin: &mut BinaryImage, maps: &BlockMaps, params: &LfsParams,
) -> Result<Minutiae, Error> {
    let mut minutiae = Minutiae::new();
    scan_horizontally(&mut minutiae, bin, maps, params);
    scan_vertically(&mut minutiae, bin, maps, params);
    minutiae.sort_y_x();
    minutiae.remove_coincident();
    log::debug!("detected {} minutiae", minutiae.len());
    Ok(minutiae)
}

fn scan_horizontally(
    minutiae: &mut Minutiae, bin: &mut BinaryImage, maps: &BlockMaps, params: &LfsParams,
) {
    let ex = bin.width as i32;
    let ey = bin.height as i32;
    let mut cy = 0;
    while cy + 1 < ey {
        let mut cx = 0;
        while cx < ex {
            let mut possible = match_first_pair((bin.get(cx, cy), bin.get(cx, cy + 1)));
            if possible.is_empty() {
                cx += 1;
                continue;
            }
            cx += 1;
            if cx >= ex {
                continue;
            }
            match_second_pair((bin.get(cx, cy), bin.get(cx, cy + 1)), &mut possible);
            if possible.is_empty() {
                // The failed pair is retried as a first pair.
                continue;
            }
            let x2 = cx;
            let repeated = (bin.get(x2, cy), bin.get(x2, cy + 1));
            while cx < ex && (bin.get(cx, cy), bin.get(cx, cy + 1)) == repeated {
                cx += 1;
            }
            if cx >= ex {
                continue;
            }
            let third = (bin.get(cx, cy), bin.get(cx, cy + 1));
            match_third_pair(third, &mut possible);
            if let Some(&feature_id) = possible.first() {
                process_scan_minutia(minutiae, ScanOrientation::Horizontal, cx, cy, x2,
                    feature_id, bin, maps, params);
            }
            // A third pair with differing values may itself continue a second pair: back up
            // one position so it is retried.
            if third.0 != third.1 {
                cx -= 1;
            }
        }
        cy += 1;
    }
}

fn scan_vertically(
    minutiae: &mut Minutiae, bin: &mut BinaryImage, maps: &BlockMaps, params: &LfsParams,
) {
    let ex = bin.width as i32;
    let ey = bin.height as i32;
    let mut cx = 0;
    while cx + 1 < ex {
        let mut cy = 0;
        while cy < ey {
            let mut possible = match_first_pair((bin.get(cx, cy), bin.get(cx + 1, cy)));
            if possible.is_empty() {
                cy += 1;
                continue;
            }
            cy += 1;
            if cy >= ey {
                continue;
            }
            match_second_pair((bin.get(cx, cy), bin.get(cx + 1, cy)), &mut possible);
            if possible.is_empty() {
                continue;
            }
            let y2 = cy;
            let repeated = (bin.get(cx, y2), bin.get(cx + 1, y2));
            while cy < ey && (bin.get(cx, cy), bin.get(cx + 1, cy)) == repeated {
                cy += 1;
            }
            if cy >= ey {
                continue;
            }
            let third = (bin.get(cx, cy), bin.get(cx + 1, cy));
            match_third_pair(third, &mut possible);
            if let Some(&feature_id) = possible.first() {
                process_scan_minutia(minutiae, ScanOrientation::Vertical, cy, cx, y2,
                    feature_id, bin, maps, params);
            }
            if third.0 != third.1 {
                cy -= 1;
            }
        }
        cx += 1;
    }
}

/// Derives a detected feature's attributes and files it into the list.
fn process_scan_minutia(
    minutiae: &mut Minutiae, scan: ScanOrientation, third_pos: i32, window_pos: i32,
    second_pos: i32, feature_id: u8, bin: &mut BinaryImage, maps: &BlockMaps,
    params: &LfsParams,
) {
    let pattern = &FEATURE_PATTERNS[feature_id as usize];

    // The feature point sits halfway between the start of the repeated pair and the third
    // pair, on the window row (or column) holding the feature's interior pixel.
    let (x_loc, y_loc, x_edge, y_edge) = match scan {
        ScanOrientation::Horizontal => {
            let x = (third_pos + second_pos) >> 1;
            if pattern.appearing {
                (x, window_pos + 1, x, window_pos)
            } else {
                (x, window_pos, x, window_pos + 1)
            }
        }
        ScanOrientation::Vertical => {
            let y = (third_pos + second_pos) >> 1;
            if pattern.appearing {
                (window_pos + 1, y, window_pos, y)
            } else {
                (window_pos, y, window_pos + 1, y)
            }
        }
    };

    let Some(block_dir) = maps.direction_at_pixel(x_loc, y_loc) else {
        return;
    };
    let low_flow = maps.low_flow_at_pixel(x_loc, y_loc);
    let high_curve = maps.high_curve_at_pixel(x_loc, y_loc);

    let start = ContourPoint { x: x_loc, y: y_loc, ex: x_edge, ey: y_edge };
    let (direction, point) = if high_curve {
        match adjust_high_curvature_minutia(minutiae, start, bin, maps, params) {
            Some(adjusted) => adjusted,
            None => return,
        }
    } else {
        (low_curvature_direction(scan, pattern.appearing, block_dir), start)
    };

    let reliability = if low_flow { MEDIUM_RELIABILITY } else { HIGH_RELIABILITY };
    let minutia = Minutia {
        x: point.x,
        y: point.y,
        ex: point.ex,
        ey: point.ey,
        direction,
        reliability,
        kind: pattern.kind,
        appearing: pattern.appearing,
        feature_id,
        neighbors: None,
    };
    update_minutiae_v2(minutiae, minutia, scan, Some(block_dir), bin, params);
}

/// Relocates a minutia detected in a high-curvature block.
///
/// The feature's contour is walked [`LfsParams::high_curve_half_contour`] pixels each way; the
/// point of highest curvature becomes the minutia location and its direction follows the line
/// from that point to the midpoint between the chord endpoints. A loop discovered on the way
/// runs the loop sub-procedure instead and the triggering candidate is dropped.
fn adjust_high_curvature_minutia(
    minutiae: &mut Minutiae, start: ContourPoint, bin: &mut BinaryImage, maps: &BlockMaps,
    params: &LfsParams,
) -> Option<(FullDir, ContourPoint)> {
    let half = params.high_curve_half_contour;
    let angle_edge = half >> 1;
    let feature_pix = bin.get(start.x, start.y);

    let contour = match get_high_curvature_contour(bin, half, start) {
        HighCurvature::Empty => return None,
        HighCurvature::Loop(loop_contour) => {
            // A clockwise loop contour lies outside its edge pixels; filling would paint the
            // exterior. Other candidates on the loop will produce an interior contour.
            if !is_loop_clockwise(&loop_contour, true) {
                process_loop(minutiae, &loop_contour, bin, maps, params);
            }
            return None;
        }
        HighCurvature::Extracted(contour) => contour,
    };

    let (min_i, min_theta) = min_contour_theta(&contour, angle_edge)?;
    if min_theta >= params.max_high_curve_theta {
        return None;
    }

    // The curvature must bend around feature-colored pixels.
    let mid_x = (contour[min_i - angle_edge].x + contour[min_i + angle_edge].x) >> 1;
    let mid_y = (contour[min_i - angle_edge].y + contour[min_i + angle_edge].y) >> 1;
    if bin.get(mid_x, mid_y) != feature_pix {
        return None;
    }

    let direction = line_to_direction(contour[min_i].x, contour[min_i].y, mid_x, mid_y);
    Some((direction, contour[min_i]))
}

/// Files a new minutia unless a similar one is already listed.
///
/// Two minutiae are similar when within [`LfsParams::max_minutia_delta`] pixels in X and Y, of
/// the same kind, with directions within 45 degrees. If the pair additionally shares a contour
/// path, the one detected with a scan orientation compatible with its block's ridge flow wins;
/// without a valid block direction the incumbent wins.
pub(crate) fn update_minutiae_v2(
    minutiae: &mut Minutiae, minutia: Minutia, scan: ScanOrientation,
    block_dir: Option<SemiDir>, bin: &BinaryImage, params: &LfsParams,
) {
    let qtr_ndirs = NDIRS / 4;
    for i in (0 .. minutiae.0.len()).rev() {
        let existing = &minutiae.0[i];
        let dx = (existing.x - minutia.x).abs();
        let dy = (existing.y - minutia.y).abs();
        if dx >= params.max_minutia_delta || dy >= params.max_minutia_delta {
            continue;
        }
        if existing.kind != minutia.kind {
            continue;
        }
        if existing.direction.distance(minutia.direction) > qtr_ndirs {
            continue;
        }
        if dx == 0 && dy == 0 {
            return;
        }
        let start = ContourPoint {
            x: existing.x,
            y: existing.y,
            ex: existing.ex,
            ey: existing.ey,
        };
        let steps = params.max_minutia_delta as usize;
        let on_contour = search_contour((minutia.x, minutia.y), steps, start, true, bin)
            || search_contour((minutia.x, minutia.y), steps, start, false, bin);
        if !on_contour {
            // Similar but on separate contours: genuinely two minutiae.
            continue;
        }
        match block_dir {
            Some(dir) if choose_scan_direction(dir) == scan => {
                // The new minutia was found by the compatible scan: replace the incumbent.
                minutiae.0.remove(i);
            }
            _ => return,
        }
    }
    minutiae.0.push(minutia);
}

/// Files a new minutia unless a similar one sharing a contour is already listed.
///
/// The loop sub-procedure uses this variant: there is no scan orientation to prefer, so the
/// incumbent always wins.
pub(crate) fn update_minutiae(
    minutiae: &mut Minutiae, minutia: Minutia, bin: &BinaryImage, params: &LfsParams,
) {
    let qtr_ndirs = NDIRS / 4;
    for existing in minutiae.iter() {
        let dx = (existing.x - minutia.x).abs();
        let dy = (existing.y - minutia.y).abs();
        if dx >= params.max_minutia_delta || dy >= params.max_minutia_delta {
            continue;
        }
        if existing.kind != minutia.kind {
            continue;
        }
        if existing.direction.distance(minutia.direction) > qtr_ndirs {
            continue;
        }
        if dx == 0 && dy == 0 {
            return;
        }
        let start = ContourPoint {
            x: existing.x,
            y: existing.y,
            ex: existing.ex,
            ey: existing.ey,
        };
        let steps = params.max_minutia_delta as usize;
        if search_contour((minutia.x, minutia.y), steps, start, true, bin)
            || search_contour((minutia.x, minutia.y), steps, start, false, bin)
        {
            return;
        }
    }
    minutiae.0.push(minutia);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_have_distinct_second_pair_values() {
        for pattern in FEATURE_PATTERNS {
            assert_ne!(pattern.second.0, pattern.second.1);
        }
    }

    #[test]
    fn scan_direction_crosses_the_ridge_flow() {
        assert_eq!(choose_scan_direction(SemiDir::new(0)), ScanOrientation::Horizontal);
        assert_eq!(choose_scan_direction(SemiDir::new(4)), ScanOrientation::Horizontal);
        assert_eq!(choose_scan_direction(SemiDir::new(8)), ScanOrientation::Vertical);
        assert_eq!(choose_scan_direction(SemiDir::new(13)), ScanOrientation::Horizontal);
    }

    #[test]
    fn low_curvature_direction_table() {
        let d = SemiDir::new(3); // first half
        assert_eq!(
            low_curvature_direction(ScanOrientation::Horizontal, true, d),
            FullDir::new(3 + NDIRS)
        );
        assert_eq!(
            low_curvature_direction(ScanOrientation::Horizontal, false, d),
            FullDir::new(3)
        );
        assert_eq!(
            low_curvature_direction(ScanOrientation::Vertical, true, d),
            FullDir::new(3)
        );
        let d = SemiDir::new(12); // second half
        assert_eq!(
            low_curvature_direction(ScanOrientation::Horizontal, true, d),
            FullDir::new(12)
        );
        assert_eq!(
            low_curvature_direction(ScanOrientation::Vertical, true, d),
            FullDir::new(12 + NDIRS)
        );
        assert_eq!(
            low_curvature_direction(ScanOrientation::Vertical, false, d),
            FullDir::new(12)
        );
    }

    // A vertical 1-pixel ridge in a 16x16 field, ending a few pixels from the borders on both
    // sides so edge-effects stay out of the scans.
    fn ridge_image() -> BinaryImage {
        let mut pixels = vec![0u8; 256];
        for y in 5 .. 12 {
            pixels[y * 16 + 8] = 1;
        }
        BinaryImage::new(16, 16, pixels).unwrap()
    }

    #[test]
    fn horizontal_scan_finds_both_ridge_endings() {
        let mut bin = ridge_image();
        // Vertical ridge flow, valid everywhere, ordinary curvature.
        let maps = BlockMaps::uniform(16, 16, 8, Some(SemiDir::new(0)), false, false);
        let minutiae = detect_minutiae(&mut bin, &maps, &LfsParams::default()).unwrap();
        let endings: Vec<_> = minutiae
            .iter()
            .filter(|m| m.kind == MinutiaKind::RidgeEnding)
            .map(|m| (m.x, m.y, m.appearing))
            .collect();
        // The top of the ridge appears (opens downward), the bottom disappears.
        assert!(endings.contains(&(8, 5, true)), "{endings:?}");
        assert!(endings.contains(&(8, 11, false)), "{endings:?}");
    }

    #[test]
    fn invalid_blocks_yield_no_minutiae() {
        let mut bin = ridge_image();
        let maps = BlockMaps::uniform(16, 16, 8, None, false, false);
        let minutiae = detect_minutiae(&mut bin, &maps, &LfsParams::default()).unwrap();
        assert!(minutiae.is_empty());
    }

    #[test]
    fn low_flow_blocks_lower_reliability() {
        let mut bin = ridge_image();
        let maps = BlockMaps::uniform(16, 16, 8, Some(SemiDir::new(0)), true, false);
        let minutiae = detect_minutiae(&mut bin, &maps, &LfsParams::default()).unwrap();
        assert!(!minutiae.is_empty());
        assert!(minutiae.iter().all(|m| m.reliability == MEDIUM_RELIABILITY));
    }
}
