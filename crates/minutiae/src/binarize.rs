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

//! Fallback binarization.
//!
//! A proper analysis front end binarizes directionally and derives the block maps along the
//! way. This module provides the simple fallback: a global threshold over the standardized
//! greyscale image, where dark pixels are ridges.

use fprint_error::{Code, Error};

use crate::{BLACK_PIXEL, BinaryImage, WHITE_PIXEL};

/// Binarizes a standardized greyscale image with a global threshold.
///
/// Pixels strictly darker than `threshold` become ridges.
pub fn threshold_binarize(
    data: &[u8], width: usize, height: usize, threshold: u8,
) -> Result<BinaryImage, Error> {
    Error::user(Code::InvalidLength).check(width * height <= data.len())?;
    let pixels = data[.. width * height]
        .iter()
        .map(|&p| if p < threshold { BLACK_PIXEL } else { WHITE_PIXEL })
        .collect();
    BinaryImage::new(width, height, pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dark_pixels_become_ridges() {
        let bin = threshold_binarize(&[0, 127, 128, 255], 4, 1, 128).unwrap();
        assert_eq!(bin.pixels, [1, 1, 0, 0]);
    }
}
