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

//! Block-level ridge-flow maps.
//!
//! The maps are inputs to the pipeline: whoever binarized the image also says, per block, what
//! the local ridge flow looks like. An invalid direction marks a block with no dependable flow.

use fprint_error::{Code, Error};

use crate::dir::SemiDir;

/// Per-block ridge-flow maps covering an image.
#[derive(Debug, Clone)]
pub struct BlockMaps {
    /// Pixel dimension of a block.
    pub blocksize: usize,

    /// Width of the maps in blocks.
    pub width: usize,

    /// Height of the maps in blocks.
    pub height: usize,

    /// Ridge-flow direction per block; `None` marks an invalid block.
    pub direction: Vec<Option<SemiDir>>,

    /// Whether each block has low ridge flow.
    pub low_flow: Vec<bool>,

    /// Whether each block sits in a high-curvature area (core or delta).
    pub high_curve: Vec<bool>,
}

impl BlockMaps {
    /// Creates maps after checking the vector lengths against the block dimensions.
    pub fn new(
        blocksize: usize, width: usize, height: usize, direction: Vec<Option<SemiDir>>,
        low_flow: Vec<bool>, high_curve: Vec<bool>,
    ) -> Result<Self, Error> {
        let len = width * height;
        Error::user(Code::InvalidLength).check(
            direction.len() == len && low_flow.len() == len && high_curve.len() == len,
        )?;
        Error::user(Code::InvalidArgument).check(blocksize > 0)?;
        Ok(BlockMaps { blocksize, width, height, direction, low_flow, high_curve })
    }

    /// Creates maps assigning the same values to every block covering a `iw` by `ih` image.
    pub fn uniform(
        iw: usize, ih: usize, blocksize: usize, direction: Option<SemiDir>, low_flow: bool,
        high_curve: bool,
    ) -> Self {
        let width = iw.div_ceil(blocksize).max(1);
        let height = ih.div_ceil(blocksize).max(1);
        let len = width * height;
        BlockMaps {
            blocksize,
            width,
            height,
            direction: vec![direction; len],
            low_flow: vec![low_flow; len],
            high_curve: vec![high_curve; len],
        }
    }

    /// Block coordinates of a pixel, clamped to the map bounds.
    pub fn block_of_pixel(&self, x: i32, y: i32) -> (usize, usize) {
        let bx = (x.max(0) as usize / self.blocksize).min(self.width - 1);
        let by = (y.max(0) as usize / self.blocksize).min(self.height - 1);
        (bx, by)
    }

    fn index(&self, bx: usize, by: usize) -> usize {
        by * self.width + bx
    }

    /// Ridge-flow direction of a block.
    pub fn direction_at_block(&self, bx: usize, by: usize) -> Option<SemiDir> {
        self.direction[self.index(bx, by)]
    }

    /// Ridge-flow direction of the block containing a pixel.
    pub fn direction_at_pixel(&self, x: i32, y: i32) -> Option<SemiDir> {
        let (bx, by) = self.block_of_pixel(x, y);
        self.direction_at_block(bx, by)
    }

    /// Whether the block containing a pixel has low ridge flow.
    pub fn low_flow_at_pixel(&self, x: i32, y: i32) -> bool {
        let (bx, by) = self.block_of_pixel(x, y);
        self.low_flow[self.index(bx, by)]
    }

    /// Whether the block containing a pixel is in a high-curvature area.
    pub fn high_curve_at_pixel(&self, x: i32, y: i32) -> bool {
        let (bx, by) = self.block_of_pixel(x, y);
        self.high_curve[self.index(bx, by)]
    }

    /// Number of 8-neighbors of a block with a valid direction.
    pub fn valid_neighbors(&self, bx: i32, by: i32) -> usize {
        let mut valid = 0;
        for dy in -1 ..= 1 {
            for dx in -1 ..= 1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = bx + dx;
                let ny = by + dy;
                if 0 <= nx
                    && (nx as usize) < self.width
                    && 0 <= ny
                    && (ny as usize) < self.height
                    && self.direction_at_block(nx as usize, ny as usize).is_some()
                {
                    valid += 1;
                }
            }
        }
        valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_maps_cover_the_image() {
        let maps = BlockMaps::uniform(20, 9, 8, Some(SemiDir::new(3)), false, false);
        assert_eq!((maps.width, maps.height), (3, 2));
        assert_eq!(maps.block_of_pixel(19, 8), (2, 1));
        assert_eq!(maps.direction_at_pixel(0, 0), Some(SemiDir::new(3)));
    }

    #[test]
    fn valid_neighbors_counts_interior_blocks() {
        let mut maps = BlockMaps::uniform(24, 24, 8, Some(SemiDir::new(0)), false, false);
        assert_eq!(maps.valid_neighbors(1, 1), 8);
        assert_eq!(maps.valid_neighbors(0, 0), 3);
        maps.direction[0] = None;
        assert_eq!(maps.valid_neighbors(1, 1), 7);
    }
}
