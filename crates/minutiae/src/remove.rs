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

//! False-minutiae pruning cascade.
//!
//! The detected candidates are filtered by a fixed sequence of passes; each pass may delete
//! entries and later passes see only the survivors. The island/lake pass edits the binary
//! image by filling the loops it finds, so minutia pixel values are re-checked against the
//! image as the pair passes run.

use fprint_error::{Code, Error};
use fprint_logger as log;

use crate::contour::{Centered, ContourPoint, Trace, get_centered_contour, trace_contour};
use crate::dir::{NDIRS, line_to_direction, translate_opposite};
use crate::loops::{IslandLake, LoopTest, fill_loop, on_hook, on_island_lake, on_loop};
use crate::maps::BlockMaps;
use crate::params::LfsParams;
use crate::util::{distance, free_path, line_points, minmaxs, search_in_direction,
    squared_distance, sround, trunc_precision};
use crate::{BinaryImage, MinutiaKind, Minutiae};

/// Directions at least this many units apart (123.75 degrees) point away from each other
/// enough for the pair removal passes.
const MIN_DELTADIR: u8 = 3 * (NDIRS / 4) - 1;

/// Runs the full pruning cascade over a detected minutiae list.
pub fn remove_false_minutiae(
    minutiae: &mut Minutiae, bin: &mut BinaryImage, maps: &BlockMaps, params: &LfsParams,
) -> Result<(), Error> {
    minutiae.sort_y_x();
    remove_islands_and_lakes(minutiae, bin, params);
    remove_holes(minutiae, bin, params);
    remove_pointing_invblock(minutiae, maps, params);
    remove_near_invblock(minutiae, maps, params)?;
    remove_or_adjust_side_minutiae(minutiae, bin, maps, params);
    remove_hooks(minutiae, bin, params);
    remove_overlaps(minutiae, bin, params);
    remove_malformations(minutiae, bin, maps, params);
    remove_pores(minutiae, bin, maps, params);
    remove_perimeter_pts(minutiae, bin, params);
    log::debug!("{} minutiae survive pruning", minutiae.len());
    Ok(())
}

fn contour_point(minutiae: &Minutiae, i: usize) -> ContourPoint {
    let m = &minutiae.0[i];
    ContourPoint { x: m.x, y: m.y, ex: m.ex, ey: m.ey }
}

/// Drops every entry whose flag is set.
fn sweep(minutiae: &mut Minutiae, to_remove: &[bool]) {
    let mut i = 0;
    minutiae.0.retain(|_| {
        let keep = !to_remove[i];
        i += 1;
        keep
    });
}

/// Islands and lakes: same-type pairs bounding a small closed loop.
///
/// The loop interior is filled with the feature color and both minutiae are removed.
fn remove_islands_and_lakes(minutiae: &mut Minutiae, bin: &mut BinaryImage, params: &LfsParams) {
    let mut to_remove = vec![false; minutiae.len()];
    let mut f = 0;
    while minutiae.len() > 0 && f < minutiae.len() - 1 {
        if to_remove[f] {
            f += 1;
            continue;
        }
        let mut s = f + 1;
        while s < minutiae.len() {
            let m1 = &minutiae.0[f];
            let m2 = &minutiae.0[s];
            if m1.kind != m2.kind {
                s += 1;
                continue;
            }
            // The image may have been edited by an earlier fill: re-check the pixels.
            if bin.get(m1.x, m1.y) != m1.kind.pixel() {
                break;
            }
            if bin.get(m2.x, m2.y) != m2.kind.pixel() {
                to_remove[s] = true;
            }
            if !to_remove[s] {
                // The list is sorted by y: once the second minutia is too far below, every
                // later one is as well.
                if m2.y - m1.y > params.max_rmtest_dist {
                    break;
                }
                if distance(m1.x, m1.y, m2.x, m2.y) <= params.max_rmtest_dist as f64
                    && m1.direction.distance(m2.direction) >= MIN_DELTADIR
                {
                    match on_island_lake(contour_point(minutiae, f), contour_point(minutiae, s),
                        params.max_half_loop, bin)
                    {
                        IslandLake::Loop(contour) => {
                            fill_loop(&contour, bin);
                            to_remove[f] = true;
                            to_remove[s] = true;
                        }
                        IslandLake::Ignore => {
                            to_remove[f] = true;
                            break;
                        }
                        IslandLake::NotFound => {}
                    }
                }
            }
            s += 1;
        }
        f += 1;
    }
    sweep(minutiae, &to_remove);
}

/// Small holes: bifurcations whose contour closes into a short loop.
fn remove_holes(minutiae: &mut Minutiae, bin: &BinaryImage, params: &LfsParams) {
    let mut i = 0;
    while i < minutiae.len() {
        if minutiae.0[i].kind == MinutiaKind::Bifurcation {
            match on_loop(contour_point(minutiae, i), params.small_loop_len, bin) {
                LoopTest::OnLoop | LoopTest::Ignore => {
                    minutiae.0.remove(i);
                    continue;
                }
                LoopTest::NotFound => {}
            }
        }
        i += 1;
    }
}

/// Minutiae pointing at a block with invalid ridge flow.
fn remove_pointing_invblock(minutiae: &mut Minutiae, maps: &BlockMaps, params: &LfsParams) {
    let mut i = 0;
    while i < minutiae.len() {
        let m = &minutiae.0[i];
        let (nx, ny) = translate_opposite(m.x, m.y, m.direction, params.trans_dir_pix);
        if maps.direction_at_pixel(nx, ny).is_none() {
            minutiae.0.remove(i);
        } else {
            i += 1;
        }
    }
}

/// Minutiae within the margin of an invalid block or of the image edge.
fn remove_near_invblock(
    minutiae: &mut Minutiae, maps: &BlockMaps, params: &LfsParams,
) -> Result<(), Error> {
    // Neighbor scan ranges per (ix, iy) margin class; -1 marks the interior class with no
    // neighbors to inspect. Neighbor indices run clockwise from north with index 8 wrapping
    // back onto index 0's position.
    const STARTBLK: [i8; 9] = [6, 0, 0, 6, -1, 2, 4, 4, 2];
    const ENDBLK: [i8; 9] = [8, 0, 2, 6, -1, 2, 6, 4, 4];
    const BLKDX: [i32; 9] = [0, 1, 1, 1, 0, -1, -1, -1, 0];
    const BLKDY: [i32; 9] = [-1, -1, 0, 1, 1, 1, 0, -1, -1];

    let blocksize = params.blocksize as i32;
    Error::internal(Code::InvalidArgument)
        .check(params.inv_block_margin <= blocksize / 2)?;
    let lo_margin = params.inv_block_margin;
    let hi_margin = blocksize - params.inv_block_margin - 1;

    let mut i = 0;
    while i < minutiae.len() {
        let m = &minutiae.0[i];
        let bx = m.x / blocksize;
        let by = m.y / blocksize;
        let px = m.x % blocksize;
        let py = m.y % blocksize;
        let ix = if px < lo_margin {
            0
        } else if px > hi_margin {
            2
        } else {
            1
        };
        let iy = if py < lo_margin {
            0
        } else if py > hi_margin {
            2
        } else {
            1
        };

        let mut removed = false;
        if ix != 1 || iy != 1 {
            let sbi = STARTBLK[iy * 3 + ix];
            let ebi = ENDBLK[iy * 3 + ix];
            for ni in sbi ..= ebi {
                let nbx = bx + BLKDX[ni as usize];
                let nby = by + BLKDY[ni as usize];
                if nbx < 0
                    || nbx as usize >= maps.width
                    || nby < 0
                    || nby as usize >= maps.height
                {
                    // The margin borders the image edge itself.
                    minutiae.0.remove(i);
                    removed = true;
                    break;
                }
                if maps.direction_at_block(nbx as usize, nby as usize).is_none()
                    && maps.valid_neighbors(nbx, nby) < params.rm_valid_nbr_min
                {
                    minutiae.0.remove(i);
                    removed = true;
                    break;
                }
            }
        }
        if !removed {
            i += 1;
        }
    }
    Ok(())
}

/// Side minutiae: relocated to the contour extremum or removed.
///
/// The contour's y coordinates rotated by the negated minutia direction form a bowl for a
/// well-formed feature: one minimum relocates the minutia, a min-max-min shape relocates to
/// the lower minimum, anything else removes it.
fn remove_or_adjust_side_minutiae(
    minutiae: &mut Minutiae, bin: &BinaryImage, maps: &BlockMaps, params: &LfsParams,
) {
    let mut i = 0;
    while i < minutiae.len() {
        let contour = match get_centered_contour(bin, params.side_half_contour,
            contour_point(minutiae, i))
        {
            Centered::Extracted(contour) => contour,
            _ => {
                minutiae.0.remove(i);
                continue;
            }
        };

        let theta = minutiae.0[i].direction.to_radians();
        let (sin_theta, cos_theta) = (theta.sin(), theta.cos());
        let rot_y: Vec<i32> = contour
            .iter()
            .map(|p| sround(trunc_precision(p.x as f64 * sin_theta - p.y as f64 * cos_theta)))
            .collect();
        let extrema = minmaxs(&rot_y);

        let minloc = match extrema.as_slice() {
            [only] if !only.is_max => Some(only.index),
            [first, _, third] if !first.is_max => {
                Some(if first.value < third.value { first.index } else { third.index })
            }
            _ => None,
        };
        match minloc {
            Some(index) => {
                let point = contour[index];
                let m = &mut minutiae.0[i];
                m.x = point.x;
                m.y = point.y;
                m.ex = point.ex;
                m.ey = point.ey;
                // The adjusted location may have slid into an invalid block.
                if maps.direction_at_pixel(point.x, point.y).is_none() {
                    minutiae.0.remove(i);
                } else {
                    i += 1;
                }
            }
            None => {
                minutiae.0.remove(i);
            }
        }
    }
}

/// Hooks: opposite-type pairs on a short common contour.
fn remove_hooks(minutiae: &mut Minutiae, bin: &BinaryImage, params: &LfsParams) {
    let mut to_remove = vec![false; minutiae.len()];
    let mut f = 0;
    while minutiae.len() > 0 && f < minutiae.len() - 1 {
        if to_remove[f] {
            f += 1;
            continue;
        }
        let mut s = f + 1;
        while s < minutiae.len() {
            let m1 = &minutiae.0[f];
            let m2 = &minutiae.0[s];
            if bin.get(m1.x, m1.y) != m1.kind.pixel() {
                break;
            }
            if bin.get(m2.x, m2.y) != m2.kind.pixel() {
                to_remove[s] = true;
            }
            if !to_remove[s] {
                if m2.y - m1.y > params.max_rmtest_dist {
                    break;
                }
                if distance(m1.x, m1.y, m2.x, m2.y) <= params.max_rmtest_dist as f64
                    && m1.direction.distance(m2.direction) >= MIN_DELTADIR
                    && m1.kind != m2.kind
                {
                    match on_hook(contour_point(minutiae, f), contour_point(minutiae, s),
                        params.max_hook_len, bin)
                    {
                        LoopTest::OnLoop => {
                            to_remove[f] = true;
                            to_remove[s] = true;
                        }
                        LoopTest::Ignore => {
                            to_remove[f] = true;
                            break;
                        }
                        LoopTest::NotFound => {}
                    }
                }
            }
            s += 1;
        }
        f += 1;
    }
    sweep(minutiae, &to_remove);
}

/// Overlaps: same-type pairs on opposite sides of a broken ridge or valley.
fn remove_overlaps(minutiae: &mut Minutiae, bin: &BinaryImage, params: &LfsParams) {
    let half_ndirs = NDIRS / 2;
    let mut to_remove = vec![false; minutiae.len()];
    let mut f = 0;
    while minutiae.len() > 0 && f < minutiae.len() - 1 {
        if to_remove[f] {
            f += 1;
            continue;
        }
        let mut s = f + 1;
        while s < minutiae.len() {
            let m1 = &minutiae.0[f];
            let m2 = &minutiae.0[s];
            if bin.get(m1.x, m1.y) != m1.kind.pixel() {
                break;
            }
            if bin.get(m2.x, m2.y) != m2.kind.pixel() {
                to_remove[s] = true;
            }
            if !to_remove[s] {
                if m2.y - m1.y > params.max_overlap_dist {
                    break;
                }
                let dist = distance(m1.x, m1.y, m2.x, m2.y);
                if dist <= params.max_overlap_dist as f64
                    && m1.direction.distance(m2.direction) >= MIN_DELTADIR
                    && m1.kind == m2.kind
                {
                    let joindir = line_to_direction(m1.x, m1.y, m2.x, m2.y);
                    let joindelta = m1.direction.opposite().distance(joindir);
                    if (joindelta <= half_ndirs
                        || dist <= params.max_overlap_join_dist as f64)
                        && free_path(m1.x, m1.y, m2.x, m2.y, bin, params.max_trans)
                    {
                        to_remove[f] = true;
                        to_remove[s] = true;
                    }
                }
            }
            s += 1;
        }
        f += 1;
    }
    sweep(minutiae, &to_remove);
}

/// Malformations: irregularly shaped features.
///
/// The feature's cross distance is measured at two depths down its contour; a feature that
/// widens too fast past an opposite-colored gap is malformed.
fn remove_malformations(
    minutiae: &mut Minutiae, bin: &BinaryImage, maps: &BlockMaps, params: &LfsParams,
) {
    let steps_1 = params.malformation_steps_1;
    let steps_2 = params.malformation_steps_2;
    for i in (0 .. minutiae.len()).rev() {
        let start = contour_point(minutiae, i);
        let first = match trace_contour(bin, steps_2, (start.x, start.y), start, false) {
            Trace::Done(contour) if contour.len() >= steps_2 => contour,
            _ => {
                minutiae.0.remove(i);
                continue;
            }
        };
        let second = match trace_contour(bin, steps_2, (start.x, start.y), start, true) {
            Trace::Done(contour) if contour.len() >= steps_2 => contour,
            _ => {
                minutiae.0.remove(i);
                continue;
            }
        };
        let (a1, b1) = (first[steps_1 - 1], first[steps_2 - 1]);
        let (a2, b2) = (second[steps_1 - 1], second[steps_2 - 1]);
        let a_dist = distance(a1.x, a1.y, a2.x, a2.y);
        let b_dist = distance(b1.x, b1.y, b2.x, b2.y);
        if a_dist == 0.0 || b_dist == 0.0 {
            minutiae.0.remove(i);
            continue;
        }
        let m = &minutiae.0[i];
        if maps.low_flow_at_pixel(m.x, m.y) && b_dist > params.max_malformation_dist {
            minutiae.0.remove(i);
            continue;
        }
        for (x, y) in line_points(b1.x, b1.y, b2.x, b2.y) {
            if bin.get(x, y) != m.kind.pixel() {
                let ratio = trunc_precision(b_dist / a_dist);
                if ratio > params.min_malformation_ratio {
                    minutiae.0.remove(i);
                }
                break;
            }
        }
    }
}

/// Pores: short, symmetric loops in unreliable regions.
///
/// Off the feature tip, perpendicular edge points are traced forward and backward to the
/// four measurement points A, B, C, D; a pore keeps its across-distances comparable.
fn remove_pores(
    minutiae: &mut Minutiae, bin: &BinaryImage, maps: &BlockMaps, params: &LfsParams,
) {
    let mut i = 0;
    'minutiae: while i < minutiae.len() {
        let m = &minutiae.0[i];
        let in_scope = (maps.low_flow_at_pixel(m.x, m.y) || maps.high_curve_at_pixel(m.x, m.y))
            && maps.direction_at_pixel(m.x, m.y).is_some();
        if !in_scope {
            i += 1;
            continue;
        }
        let theta = m.direction.to_radians();
        let (sin_theta, cos_theta) = (theta.sin(), theta.cos());
        let (rx, ry) = translate_opposite(m.x, m.y, m.direction, params.pores_trans_r);
        if !bin.contains(rx, ry) || bin.get(rx, ry) == m.kind.pixel() {
            // Off the image, or still on the feature: not a pore configuration.
            i += 1;
            continue;
        }
        let feature_pixel = m.kind.pixel();

        // Find P and Q on either side of R, perpendicular to the feature direction.
        let mut endpoints = [None; 4];
        let sides = [(-cos_theta, -sin_theta, false), (cos_theta, sin_theta, true)];
        for (side, &(dx, dy, fwd_clockwise)) in sides.iter().enumerate() {
            let Some((point, edge)) = search_in_direction(feature_pixel, rx, ry, dx, dy,
                params.pores_perp_steps, bin)
            else {
                minutiae.0.remove(i);
                continue 'minutiae;
            };
            let start = ContourPoint { x: point.0, y: point.1, ex: edge.0, ey: edge.1 };
            for (slot, (steps, clockwise)) in [
                (params.pores_steps_fwd, fwd_clockwise),
                (params.pores_steps_bwd, !fwd_clockwise),
            ]
            .into_iter()
            .enumerate()
            {
                match trace_contour(bin, steps, (start.x, start.y), start, clockwise) {
                    Trace::Done(contour) if contour.len() >= steps => {
                        let last = contour[contour.len() - 1];
                        endpoints[2 * side + slot] = Some((last.x, last.y));
                    }
                    _ => {
                        minutiae.0.remove(i);
                        continue 'minutiae;
                    }
                }
            }
        }
        let (b, d) = (endpoints[0].unwrap(), endpoints[1].unwrap());
        let (a, c) = (endpoints[2].unwrap(), endpoints[3].unwrap());
        let ab2 = squared_distance(a.0, a.1, b.0, b.1);
        let cd2 = squared_distance(c.0, c.1, d.0, d.1);
        if cd2 > params.pores_min_dist2 {
            let ratio = trunc_precision(ab2 / cd2);
            if ratio <= params.pores_max_ratio {
                minutiae.0.remove(i);
                continue;
            }
        }
        i += 1;
    }
}

/// Perimeter points: minutiae near the scanned area's outline.
///
/// The left-most and right-most foreground pixels are located per row by a downward and an
/// upward pass; the merged outline removes every minutia close to it.
fn remove_perimeter_pts(minutiae: &mut Minutiae, bin: &BinaryImage, params: &LfsParams) {
    if !params.remove_perimeter_pts {
        return;
    }
    let iw = bin.width as i32;
    let ih = bin.height as i32;

    let pass = |rows: &mut dyn Iterator<Item = i32>| {
        let mut left = vec![-1i32; ih as usize];
        let mut right = vec![-1i32; ih as usize];
        let mut left_min = iw - 1;
        let mut right_max = 0;
        for i in rows {
            for j in 0 .. left_min {
                if bin.get(j, i) != 0 {
                    left_min = j;
                    break;
                }
            }
            left[i as usize] = if left_min == iw - 1 { -1 } else { left_min };
            for j in (right_max .. iw).rev() {
                if bin.get(j, i) != 0 {
                    right_max = j;
                    break;
                }
            }
            right[i as usize] = if right_max == 0 { -1 } else { right_max };
        }
        (left, right)
    };

    let (left_down, right_down) = pass(&mut (0 .. ih));
    let (left_up, right_up) = pass(&mut (0 .. ih).rev());

    // Prefer the downward-pass value except where it is the column's global extremum, which
    // only tells us the outline passed it at some earlier row.
    let left_min = left_down[ih as usize - 1];
    let right_max = right_down[ih as usize - 1];
    let mut to_remove = vec![false; minutiae.len()];
    for i in 0 .. ih {
        let left = if left_down[i as usize] != left_min {
            left_down[i as usize]
        } else {
            left_up[i as usize]
        };
        let right = if right_down[i as usize] != right_max {
            right_down[i as usize]
        } else {
            right_up[i as usize]
        };
        for x in [left, right] {
            if x == -1 {
                continue;
            }
            for (k, m) in minutiae.iter().enumerate() {
                if !to_remove[k]
                    && (distance(x, i, m.x, m.y) as i32) < params.min_pp_distance as i32
                {
                    to_remove[k] = true;
                }
            }
        }
    }
    sweep(minutiae, &to_remove);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::{FullDir, SemiDir};
    use crate::{HIGH_RELIABILITY, Minutia};

    fn minutia(x: i32, y: i32, ex: i32, ey: i32, dir: u8, kind: MinutiaKind) -> Minutia {
        Minutia {
            x,
            y,
            ex,
            ey,
            direction: FullDir::new(dir),
            reliability: HIGH_RELIABILITY,
            kind,
            appearing: true,
            feature_id: 0,
            neighbors: None,
        }
    }

    // 32x32 all-valid maps with 8-pixel blocks.
    fn valid_maps() -> BlockMaps {
        BlockMaps::uniform(32, 32, 8, Some(SemiDir::new(0)), false, false)
    }

    #[test]
    fn edge_minutia_is_removed_by_the_margin_pass() {
        let maps = valid_maps();
        let params = LfsParams::default();
        // One minutia hugging the top edge of the image, one safely in the interior.
        let mut minutiae = Minutiae(vec![
            minutia(9, 1, 9, 0, 0, MinutiaKind::RidgeEnding),
            minutia(14, 14, 14, 13, 0, MinutiaKind::RidgeEnding),
        ]);
        remove_near_invblock(&mut minutiae, &maps, &params).unwrap();
        let coords: Vec<_> = minutiae.iter().map(|m| (m.x, m.y)).collect();
        assert_eq!(coords, [(14, 14)]);
    }

    #[test]
    fn minutia_pointing_at_invalid_block_is_removed() {
        let mut maps = valid_maps();
        // Invalidate the block below the minutia: a north-pointing minutia at (12,12)
        // translates opposite (south) into block (1,2).
        maps.direction[2 * maps.width + 1] = None;
        let params = LfsParams::default();
        let mut minutiae = Minutiae(vec![minutia(12, 12, 12, 11, 0, MinutiaKind::RidgeEnding)]);
        remove_pointing_invblock(&mut minutiae, &maps, &params);
        assert!(minutiae.is_empty());
    }

    #[test]
    fn island_pair_is_filled_and_removed() {
        // A lone 8x3 island of ink with its two end minutiae pointing apart.
        let mut pixels = vec![0u8; 32 * 32];
        for y in 14 .. 17 {
            for x in 12 .. 20 {
                pixels[y * 32 + x] = 1;
            }
        }
        let mut bin = BinaryImage::new(32, 32, pixels).unwrap();
        let mut minutiae = Minutiae(vec![
            minutia(12, 15, 11, 15, 24, MinutiaKind::RidgeEnding), // west-pointing
            minutia(19, 15, 20, 15, 8, MinutiaKind::RidgeEnding),  // east-pointing
        ]);
        minutiae.sort_y_x();
        let params = LfsParams::default();
        remove_islands_and_lakes(&mut minutiae, &mut bin, &params);
        assert!(minutiae.is_empty());
        // The island pixels were (re)painted with the feature color.
        assert_eq!(bin.get(15, 15), 1);
    }

    #[test]
    fn overlap_pair_is_removed() {
        // Two ridge endings facing each other across a clean white gap.
        let mut pixels = vec![0u8; 32 * 32];
        for x in 4 ..= 12 {
            pixels[15 * 32 + x] = 1;
        }
        for x in 18 ..= 26 {
            pixels[15 * 32 + x] = 1;
        }
        let bin = BinaryImage::new(32, 32, pixels).unwrap();
        let mut minutiae = Minutiae(vec![
            minutia(12, 15, 13, 15, 8, MinutiaKind::RidgeEnding),  // east-pointing
            minutia(18, 15, 17, 15, 24, MinutiaKind::RidgeEnding), // west-pointing
        ]);
        minutiae.sort_y_x();
        let params = LfsParams::default();
        remove_overlaps(&mut minutiae, &bin, &params);
        assert!(minutiae.is_empty());
    }

    #[test]
    fn perimeter_points_require_the_partial_flag() {
        let mut pixels = vec![0u8; 32 * 32];
        for y in 10 .. 22 {
            for x in 10 .. 22 {
                pixels[y * 32 + x] = 1;
            }
        }
        let bin = BinaryImage::new(32, 32, pixels).unwrap();
        let near_outline = minutia(11, 15, 10, 15, 0, MinutiaKind::RidgeEnding);
        let mut params = LfsParams::default();

        let mut minutiae = Minutiae(vec![near_outline.clone()]);
        remove_perimeter_pts(&mut minutiae, &bin, &params);
        assert_eq!(minutiae.len(), 1);

        params.remove_perimeter_pts = true;
        let mut minutiae = Minutiae(vec![near_outline]);
        remove_perimeter_pts(&mut minutiae, &bin, &params);
        assert!(minutiae.is_empty());
    }
}
