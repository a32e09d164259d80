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

//! Frame and line assembly for swipe sensors.
//!
//! Swipe sensors deliver a stream of narrow frames as the finger moves across them. Each
//! frame carries an estimated displacement relative to the previous frame; when the hardware
//! cannot provide one, [`do_movement_estimation`] derives it by searching for the offset
//! minimizing the mean pixel difference over the overlap. [`assemble_frames`] then blits the
//! frames into one whole image. Scanline sensors use [`assemble_lines`] instead, which
//! resamples the line stream at a fixed vertical resolution.

use fprint_logger as log;

use crate::img::{Image, mean_sq_diff_norm};

/// One frame from a swipe sensor.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Estimated X displacement of this frame relative to the previous one.
    pub delta_x: i32,

    /// Estimated Y displacement of this frame relative to the previous one.
    pub delta_y: i32,

    /// Frame pixels, in the driver's packing.
    pub data: Vec<u8>,
}

/// Geometry and pixel access for frame assembly.
pub struct FrameAssemblyContext {
    /// Frame width in pixels.
    pub frame_width: usize,

    /// Frame height in pixels.
    pub frame_height: usize,

    /// Width of the assembled image.
    pub image_width: usize,

    /// Reads one frame pixel; drivers with packed formats override this.
    pub get_pixel: Box<dyn Fn(&FrameAssemblyContext, &Frame, usize, usize) -> u8>,
}

impl FrameAssemblyContext {
    /// Creates a context for row-major byte-per-pixel frames.
    pub fn new(frame_width: usize, frame_height: usize, image_width: usize) -> Self {
        FrameAssemblyContext {
            frame_width,
            frame_height,
            image_width,
            get_pixel: Box::new(|ctx, frame, x, y| frame.data[y * ctx.frame_width + x]),
        }
    }
}

/// Mean absolute pixel difference over the overlap of two frames at a candidate offset,
/// normalized by the overlap area.
fn calc_error(ctx: &FrameAssemblyContext, first: &Frame, second: &Frame, dx: i32, dy: i32) -> u32 {
    let width = ctx.frame_width - dx.unsigned_abs() as usize;
    let height = ctx.frame_height - dy as usize;
    let mut err = 0u64;
    for i in 0 .. height {
        let (mut x1, mut x2) = if dx < 0 { (0, (-dx) as usize) } else { (dx as usize, 0) };
        for _ in 0 .. width {
            let v1 = (ctx.get_pixel)(ctx, first, x1, i);
            let v2 = (ctx.get_pixel)(ctx, second, x2, i + dy as usize);
            err += v1.abs_diff(v2) as u64;
            x1 += 1;
            x2 += 1;
        }
    }
    // Normalize to the full frame area so offsets with different overlaps compare fairly.
    err = err * (ctx.frame_height * ctx.frame_width) as u64 / (height * width) as u64;
    if err == 0 {
        // An exactly identical overlap is a stuck frame, not a displacement estimate.
        return u32::MAX;
    }
    err.min(u32::MAX as u64) as u32
}

/// Searches the discrete offset space for the best overlap of two adjacent frames.
///
/// The horizontal search covers 8 pixels each way; vertical displacement is rarely below 2.
/// Ties keep the first minimum found. Returns the displacement of `first` relative to
/// `second` together with the residual error.
fn find_overlap(ctx: &FrameAssemblyContext, first: &Frame, second: &Frame) -> (i32, i32, u32) {
    let mut min_error = 255 * (ctx.frame_height * ctx.frame_width) as u32;
    let (mut delta_x, mut delta_y) = (0, 0);
    for dy in 2 .. ctx.frame_height as i32 {
        for dx in -8 .. 8 {
            let err = calc_error(ctx, first, second, dx, dy);
            if err < min_error {
                min_error = err;
                delta_x = -dx;
                delta_y = dy;
            }
        }
    }
    (delta_x, delta_y, min_error)
}

fn movement_estimation_pass(
    ctx: &FrameAssemblyContext, frames: &mut [Frame], reverse: bool,
) -> u64 {
    let mut total_error = 0u64;
    for i in 1 .. frames.len() {
        let (prev, cur) = (&frames[i - 1], &frames[i]);
        let (delta_x, delta_y, err) = if reverse {
            // Reversed orientation: estimate the previous frame against this one and negate.
            let (dx, dy, err) = find_overlap(ctx, prev, cur);
            (-dx, -dy, err)
        } else {
            find_overlap(ctx, cur, prev)
        };
        frames[i].delta_x = delta_x;
        frames[i].delta_y = delta_y;
        total_error += err as u64;
    }
    total_error / frames.len() as u64
}

/// Estimates per-frame displacements for a swipe.
///
/// The estimation runs once as given and once treating the frames in reverse order (negating
/// the resulting displacements); the orientation with smaller total error is kept. This is
/// CPU intensive: prefer hardware-provided displacement when the device has it.
pub fn do_movement_estimation(ctx: &FrameAssemblyContext, frames: &mut [Frame]) {
    if frames.len() < 2 {
        return;
    }
    let err = movement_estimation_pass(ctx, frames, false);
    let rev_err = movement_estimation_pass(ctx, frames, true);
    log::debug!("estimation errors: {err} reversed: {rev_err}");
    if err < rev_err {
        movement_estimation_pass(ctx, frames, false);
    }
}

/// Copies a frame into the canvas at an offset, clipping to the canvas bounds.
fn blit_frame(ctx: &FrameAssemblyContext, image: &mut Image, frame: &Frame, x: i32, y: i32) {
    let image_width = image.width() as i32;
    let image_height = image.height() as i32;
    for fy in 0 .. ctx.frame_height as i32 {
        let iy = y + fy;
        if iy < 0 || iy >= image_height {
            continue;
        }
        for fx in 0 .. ctx.frame_width as i32 {
            let ix = x + fx;
            if ix < 0 || ix >= image_width {
                continue;
            }
            let pixel = (ctx.get_pixel)(ctx, frame, fx as usize, fy as usize);
            image.data_mut()[(iy * image_width + ix) as usize] = pixel;
        }
    }
}

/// Assembles displaced frames into a whole image.
///
/// The canvas height is the sum of the vertical displacements plus one frame height. A
/// negative sum builds the canvas bottom-up and needs no flipping; a positive one is marked
/// for flipping. The raw canvas always carries inverted colors for the caller to standardize
/// away.
pub fn assemble_frames(ctx: &FrameAssemblyContext, frames: &mut [Frame]) -> Image {
    assert!(!frames.is_empty());
    assert!(ctx.image_width >= ctx.frame_width);

    // The first frame anchors the canvas.
    frames[0].delta_x = 0;
    frames[0].delta_y = 0;
    let height_sum: i32 = frames.iter().map(|f| f.delta_y).sum();
    log::debug!("assembled height offset {height_sum}");
    let reverse = height_sum < 0;
    let height = height_sum.unsigned_abs() as usize + ctx.frame_height;

    let mut image = Image::new(ctx.image_width, height);
    image.flags.colors_inverted = true;
    if !reverse {
        image.flags.h_flipped = true;
        image.flags.v_flipped = true;
    }

    let mut y = if reverse { (height - ctx.frame_height) as i32 } else { 0 };
    let mut x = ((ctx.image_width - ctx.frame_width) / 2) as i32;
    for frame in frames.iter() {
        y += frame.delta_y;
        x += frame.delta_x;
        blit_frame(ctx, &mut image, frame, x, y);
    }
    image
}

/// Geometry and pixel access for scanline assembly.
pub struct LineAssemblyContext {
    /// Line width in pixels.
    pub line_width: usize,

    /// Maximum height of the assembled image.
    pub max_height: usize,

    /// Number of output lines per unit offset between matched lines.
    pub resolution: usize,

    /// Window of forthcoming lines searched for the best match.
    pub max_search_offset: usize,

    /// Size of the median filter applied to the offset sequence.
    pub median_filter_size: usize,

    /// Reads one pixel of a line.
    pub get_pixel: Box<dyn Fn(&LineAssemblyContext, &[u8], usize) -> u8>,

    /// Deviation between two lines; smaller is a better match.
    pub get_deviation: Box<dyn Fn(&LineAssemblyContext, &[u8], &[u8]) -> u32>,
}

impl LineAssemblyContext {
    /// Creates a context for row-major byte-per-pixel lines.
    pub fn new(
        line_width: usize, max_height: usize, resolution: usize, max_search_offset: usize,
        median_filter_size: usize,
    ) -> Self {
        LineAssemblyContext {
            line_width,
            max_height,
            resolution,
            max_search_offset,
            median_filter_size,
            get_pixel: Box::new(|_, line, x| line[x]),
            get_deviation: Box::new(|ctx, a, b| {
                mean_sq_diff_norm(&a[.. ctx.line_width], &b[.. ctx.line_width])
            }),
        }
    }
}

/// Median filter over a sliding window of the given size.
fn median_filter(data: &mut [i32], filter_size: usize) {
    if data.is_empty() {
        return;
    }
    let half = filter_size.saturating_sub(1) / 2;
    let result: Vec<i32> = (0 .. data.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half).min(data.len() - 1);
            let mut window = data[lo ..= hi].to_vec();
            window.sort_unstable();
            window[window.len() / 2]
        })
        .collect();
    data.copy_from_slice(&result);
}

/// Linear interpolation between two source lines at a fractional position.
fn interpolate_lines(
    ctx: &LineAssemblyContext, line1: &[u8], y1: f32, line2: &[u8], y2: f32, output: &mut [u8],
    yi: f32,
) {
    for i in 0 .. ctx.line_width {
        let p1 = (ctx.get_pixel)(ctx, line1, i) as f32;
        let p2 = (ctx.get_pixel)(ctx, line2, i) as f32;
        output[i] = (p1 + (yi - y1) / (y2 - y1) * (p2 - p1)) as u8;
    }
}

/// Assembles a scanline stream, rescaling for variable swipe speed.
///
/// Every other line is matched against a window of forthcoming lines to estimate the local
/// swipe speed; the offsets are median filtered and the lines resampled at a fixed vertical
/// resolution.
pub fn assemble_lines(ctx: &LineAssemblyContext, lines: &[Vec<u8>]) -> Image {
    assert!(lines.len() >= 2);
    let mut offsets = vec![0i32; lines.len() / 2];
    let mut i = 0;
    while i + 1 < lines.len() {
        let first = i + 1;
        let last = (i + ctx.max_search_offset).min(lines.len() - 1);
        let mut best_match = i;
        let mut best_diff = 0;
        for j in first ..= last {
            let diff = (ctx.get_deviation)(ctx, &lines[i], &lines[j]);
            if j == first || diff < best_diff {
                best_diff = diff;
                best_match = j;
            }
        }
        offsets[i / 2] = (best_match - i) as i32;
        i += 2;
    }

    let filtered_len = (lines.len() / 2).saturating_sub(1);
    median_filter(&mut offsets[.. filtered_len], ctx.median_filter_size);

    let mut output = vec![0u8; ctx.line_width * ctx.max_height];
    let mut y = 0.0f32;
    let mut line_index = 0usize;
    'out: for i in 0 .. lines.len() - 1 {
        let offset = offsets[i / 2];
        if offset > 0 {
            let ynext = y + ctx.resolution as f32 / offset as f32;
            while (line_index as f32) < ynext {
                if line_index + 1 > ctx.max_height {
                    break 'out;
                }
                let row = &mut output[line_index * ctx.line_width ..][.. ctx.line_width];
                interpolate_lines(ctx, &lines[i], y, &lines[i + 1], ynext, row,
                    line_index as f32);
                line_index += 1;
            }
            y = ynext;
        }
    }

    output.truncate(ctx.line_width * line_index);
    let mut image = Image::from_data(ctx.line_width, line_index, output);
    image.flags.v_flipped = true;
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_W: usize = 16;
    const FRAME_H: usize = 8;

    // Frame k covers rows 3k .. 3k+8 of a synthetic finger whose pixel (row, x) has value
    // row * 13 + x * 7 (wrapping), plus a per-frame bias of k so exact overlaps never
    // degenerate to zero error.
    fn gradient_frames(count: usize) -> Vec<Frame> {
        (0 .. count)
            .map(|k| {
                let mut data = Vec::new();
                for row in 0 .. FRAME_H {
                    for x in 0 .. FRAME_W {
                        let value = ((3 * k + row) * 13 + x * 7) as u8;
                        data.push(value.wrapping_add(k as u8));
                    }
                }
                Frame { delta_x: 0, delta_y: 0, data }
            })
            .collect()
    }

    #[test]
    fn movement_estimation_recovers_the_step() {
        let ctx = FrameAssemblyContext::new(FRAME_W, FRAME_H, FRAME_W);
        let mut frames = gradient_frames(4);
        do_movement_estimation(&ctx, &mut frames);
        for frame in &frames[1 ..] {
            assert_eq!((frame.delta_x, frame.delta_y), (0, 3));
        }
    }

    #[test]
    fn single_frame_assembles_to_frame_height() {
        let ctx = FrameAssemblyContext::new(FRAME_W, FRAME_H, FRAME_W);
        let mut frames = gradient_frames(1);
        let image = assemble_frames(&ctx, &mut frames);
        assert_eq!((image.width(), image.height()), (FRAME_W, FRAME_H));
    }

    #[test]
    fn frames_blit_at_their_accumulated_offsets() {
        let ctx = FrameAssemblyContext::new(FRAME_W, FRAME_H, FRAME_W);
        let mut frames = gradient_frames(4);
        for frame in frames.iter_mut().skip(1) {
            frame.delta_y = 3;
        }
        let image = assemble_frames(&ctx, &mut frames);
        // Three 3-pixel steps plus one frame height.
        assert_eq!(image.height(), 17);
        assert!(image.flags.colors_inverted);
        assert!(image.flags.v_flipped && image.flags.h_flipped);
        // Rows covered only by the first and last frames carry their exact values.
        assert_eq!(image.data()[0], 0);
        assert_eq!(image.data()[1], 7);
        assert_eq!(image.data()[16 * FRAME_W], (16u8 * 13).wrapping_add(3));
    }

    #[test]
    fn line_assembly_resamples_at_fixed_resolution() {
        // Twenty lines of a slow uniform swipe: line i repeats value i * 8.
        let lines: Vec<Vec<u8>> = (0 .. 20).map(|i| vec![(i * 8) as u8; 4]).collect();
        let ctx = LineAssemblyContext::new(4, 100, 2, 6, 3);
        let image = assemble_lines(&ctx, &lines);
        assert_eq!(image.width(), 4);
        assert!(image.flags.v_flipped);
        assert!(image.height() > 0);
        // Output values are monotonically non-decreasing: resampling preserves the ramp.
        let column: Vec<u8> = (0 .. image.height()).map(|y| image.data()[y * 4]).collect();
        assert!(column.windows(2).all(|w| w[0] <= w[1]), "{column:?}");
    }
}
