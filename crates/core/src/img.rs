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

//! Images.
//!
//! All images are 8-bit greyscale, row-major. Raw images from the hardware vary in
//! orientation and color scheme; [`Image::standardize`] converts them into standard form,
//! finger flesh dark on light background in natural upright orientation, and is idempotent.

use std::io::Write;

use fprint_error::{Code, Error};
use fprint_logger as log;
use fprint_match::{Template, Tunables};
use fprint_minutiae::{BinaryImage, BlockMaps, LfsParams, Minutiae, SemiDir, binarize,
    detect_minutiae, remove};
use fprint_store::{PrintData, PrintDataType};

/// Transforms still owed to an image before it is standard, plus content markers.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ImageFlags {
    /// The image is upside down.
    pub v_flipped: bool,

    /// The image is mirrored.
    pub h_flipped: bool,

    /// The colors are inverted (light ridges on dark background).
    pub colors_inverted: bool,

    /// The image is a binarized form.
    pub binarized: bool,

    /// The image only covers part of the sensor area.
    pub partial: bool,
}

impl ImageFlags {
    /// Whether any standardization transform is still pending.
    pub fn needs_standardization(self) -> bool {
        self.v_flipped || self.h_flipped || self.colors_inverted
    }
}

/// An 8-bit greyscale fingerprint image.
#[derive(Debug, Clone, Default)]
pub struct Image {
    width: usize,
    height: usize,
    /// Pending transforms and content markers.
    pub flags: ImageFlags,
    data: Vec<u8>,
    minutiae: Option<Minutiae>,
    binarized: Option<BinaryImage>,
}

impl Image {
    /// Creates a zeroed image.
    pub fn new(width: usize, height: usize) -> Image {
        Image { width, height, data: vec![0; width * height], ..Default::default() }
    }

    /// Wraps existing pixel data. The buffer may be longer than `width * height`.
    pub fn from_data(width: usize, height: usize, data: Vec<u8>) -> Image {
        Image { width, height, data, ..Default::default() }
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Overrides the image dimensions, keeping the pixel buffer.
    pub(crate) fn set_size(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
    }

    /// The greyscale pixels, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the greyscale pixels.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Basic consistency checks: nonzero dimensions and a large enough buffer.
    pub fn is_sane(&self) -> bool {
        self.width > 0 && self.height > 0 && self.width * self.height <= self.data.len()
    }

    fn vflip(&mut self) {
        let w = self.width;
        for y in 0 .. self.height / 2 {
            let (a, b) = (y * w, (self.height - 1 - y) * w);
            for x in 0 .. w {
                self.data.swap(a + x, b + x);
            }
        }
    }

    fn hflip(&mut self) {
        let w = self.width;
        for y in 0 .. self.height {
            self.data[y * w .. (y + 1) * w].reverse();
        }
    }

    fn invert_colors(&mut self) {
        for pixel in &mut self.data[.. self.width * self.height] {
            *pixel = 0xff - *pixel;
        }
    }

    /// Standardizes the image orientation and colors.
    ///
    /// Each pending transform is applied once and its flag cleared, so calling this again is
    /// a no-op.
    pub fn standardize(&mut self) {
        if self.flags.v_flipped {
            self.vflip();
            self.flags.v_flipped = false;
        }
        if self.flags.h_flipped {
            self.hflip();
            self.flags.h_flipped = false;
        }
        if self.flags.colors_inverted {
            self.invert_colors();
            self.flags.colors_inverted = false;
        }
    }

    /// Writes the image as a binary PGM file.
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), Error> {
        let mut file = std::fs::File::create(path.as_ref())?;
        self.write_pgm(&mut file)?;
        log::debug!("written to {:?}", path.as_ref());
        Ok(())
    }

    /// Writes the image in PGM format.
    pub fn write_pgm(&self, out: &mut impl Write) -> Result<(), Error> {
        write!(out, "P5 {} {} 255\n", self.width, self.height)?;
        out.write_all(&self.data[.. self.width * self.height])?;
        Ok(())
    }

    /// The minutiae detected on the image, if detection ran.
    pub fn minutiae(&self) -> Option<&Minutiae> {
        self.minutiae.as_ref()
    }

    /// The binarized form of the image, if detection ran.
    pub fn binarized(&self) -> Option<&BinaryImage> {
        self.binarized.as_ref()
    }

    /// Detects minutiae on a standardized image and attaches the results.
    ///
    /// Returns the number of detected minutiae.
    pub fn detect_minutiae(&mut self, extractor: &dyn FeatureExtractor) -> Result<usize, Error> {
        if self.flags.needs_standardization() {
            log::error!("cannot detect minutiae on a non-standardized image");
            return Err(Error::user(Code::InvalidState));
        }
        let (minutiae, binarized) = extractor.extract(self)?;
        log::debug!("detected {} minutiae", minutiae.len());
        let count = minutiae.len();
        self.minutiae = Some(minutiae);
        self.binarized = Some(binarized);
        Ok(count)
    }
}

/// Converts an image into print data, detecting minutiae if needed.
pub(crate) fn image_to_print_data(
    image: &mut Image, driver_id: u16, devtype: u32, extractor: &dyn FeatureExtractor,
) -> Result<PrintData, Error> {
    if image.minutiae.is_none() {
        image.detect_minutiae(extractor)?;
    }
    let minutiae = image.minutiae.as_ref().ok_or_else(|| Error::internal(Code::NotFound))?;
    let template = Template::from_minutiae(minutiae);
    let mut print = PrintData::new(driver_id, devtype, PrintDataType::Minutiae);
    print.items.push(template.serialize());
    Ok(print)
}

/// Scores a new scan against an enrolled print.
///
/// The new print must hold exactly one sample; the score is the best over the enrolled
/// samples.
pub(crate) fn compare_print_data(
    enrolled: &PrintData, new: &PrintData, tunables: &Tunables,
) -> Result<u32, Error> {
    if enrolled.data_type != PrintDataType::Minutiae || new.data_type != PrintDataType::Minutiae
    {
        log::error!("invalid print format");
        return Err(Error::user(Code::InvalidArgument));
    }
    if new.items.len() != 1 {
        log::error!("new print holds {} samples, expected one", new.items.len());
        return Err(Error::user(Code::InvalidArgument));
    }
    let probe = Template::parse(&new.items[0])?;
    let mut max_score = 0;
    for item in &enrolled.items {
        let gallery = Template::parse(item)?;
        let score = fprint_match::match_score(&probe, &gallery, tunables);
        log::debug!("score {score}");
        max_score = max_score.max(score);
    }
    Ok(max_score)
}

/// Scores a new scan against a gallery of enrolled prints.
///
/// Returns the index of the first gallery print with a sample meeting the threshold.
pub(crate) fn compare_print_data_to_gallery(
    new: &PrintData, gallery: &[PrintData], threshold: u32, tunables: &Tunables,
) -> Result<Option<usize>, Error> {
    if new.items.len() != 1 {
        log::error!("new print holds {} samples, expected one", new.items.len());
        return Err(Error::user(Code::InvalidArgument));
    }
    let probe = Template::parse(&new.items[0])?;
    for (offset, enrolled) in gallery.iter().enumerate() {
        if enrolled.data_type != PrintDataType::Minutiae {
            continue;
        }
        for item in &enrolled.items {
            let candidate = Template::parse(item)?;
            if fprint_match::match_score(&probe, &candidate, tunables) >= threshold {
                return Ok(Some(offset));
            }
        }
    }
    Ok(None)
}

/// Image-to-minutiae conversion seam.
///
/// The detection scans are told, per block, what the local ridge flow looks like; whoever
/// binarizes the image provides those maps. Implementations bundle the two so the acquisition
/// core can run against any analysis front end (including a stub one in tests).
pub trait FeatureExtractor {
    /// Binarizes a standardized image, detects its minutiae, and prunes false ones.
    fn extract(&self, image: &Image) -> Result<(Minutiae, BinaryImage), Error>;
}

/// Default extractor: global-threshold binarization with uniform block maps.
///
/// Real integrations substitute an analysis front end deriving per-block direction, low-flow
/// and curvature maps; a uniform vertical-flow map keeps the pipeline honest enough for
/// development and testing.
pub struct ThresholdExtractor {
    /// Detection and removal parameters.
    pub params: LfsParams,

    /// Pixels strictly darker than this are ridges.
    pub threshold: u8,
}

impl Default for ThresholdExtractor {
    fn default() -> Self {
        ThresholdExtractor { params: LfsParams::default(), threshold: 128 }
    }
}

impl FeatureExtractor for ThresholdExtractor {
    fn extract(&self, image: &Image) -> Result<(Minutiae, BinaryImage), Error> {
        let mut params = self.params.clone();
        params.remove_perimeter_pts = image.flags.partial;
        let mut bin = binarize::threshold_binarize(
            image.data(),
            image.width(),
            image.height(),
            self.threshold,
        )?;
        let maps = BlockMaps::uniform(
            image.width(),
            image.height(),
            params.blocksize,
            Some(SemiDir::new(0)),
            false,
            false,
        );
        let mut minutiae = detect_minutiae(&mut bin, &maps, &params)?;
        remove::remove_false_minutiae(&mut minutiae, &mut bin, &maps, &params)?;
        Ok((minutiae, bin))
    }
}

/// Squared standard deviation of a buffer.
///
/// Swipe drivers use this to detect empty frames.
pub fn std_sq_dev(buf: &[u8]) -> Result<u32, Error> {
    Error::user(Code::InvalidArgument).check(!buf.is_empty())?;
    Error::user(Code::Overflow).check(buf.len() <= i32::MAX as usize / 65536)?;
    let mean = (buf.iter().map(|&p| p as u64).sum::<u64>() / buf.len() as u64) as i64;
    let sum: i64 = buf.iter().map(|&p| (p as i64 - mean) * (p as i64 - mean)).sum();
    Ok((sum / buf.len() as i64) as u32)
}

/// Normalized mean square difference of two lines.
pub fn mean_sq_diff_norm(a: &[u8], b: &[u8]) -> u32 {
    assert_eq!(a.len(), b.len());
    let sum: i64 =
        a.iter().zip(b).map(|(&x, &y)| (x as i64 - y as i64) * (x as i64 - y as i64)).sum();
    (sum / a.len() as i64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardize_applies_all_pending_transforms_once() {
        let mut image = Image::from_data(2, 2, vec![10, 20, 30, 40]);
        image.flags.v_flipped = true;
        image.flags.h_flipped = true;
        image.flags.colors_inverted = true;
        image.standardize();
        // Rows swapped, mirrored, then inverted.
        assert_eq!(image.data(), [0xff - 40, 0xff - 30, 0xff - 20, 0xff - 10]);
        assert!(!image.flags.needs_standardization());

        let first = image.data().to_vec();
        image.standardize();
        assert_eq!(image.data(), first);
    }

    #[test]
    fn sanity_checks_dimensions_and_length() {
        assert!(Image::from_data(4, 4, vec![0; 16]).is_sane());
        assert!(Image::from_data(4, 4, vec![0; 20]).is_sane());
        assert!(!Image::from_data(0, 4, vec![0; 16]).is_sane());
        assert!(!Image::from_data(4, 4, vec![0; 15]).is_sane());
    }

    #[test]
    fn pgm_header_and_payload() {
        let image = Image::from_data(3, 2, vec![1, 2, 3, 4, 5, 6]);
        let mut out = Vec::new();
        image.write_pgm(&mut out).unwrap();
        assert_eq!(out, b"P5 3 2 255\n\x01\x02\x03\x04\x05\x06");
    }

    #[test]
    fn line_statistics() {
        assert_eq!(std_sq_dev(&[5, 5, 5, 5]).unwrap(), 0);
        assert!(std_sq_dev(&[0, 255, 0, 255]).unwrap() > 0);
        assert_eq!(mean_sq_diff_norm(&[1, 2, 3], &[1, 2, 3]), 0);
        assert_eq!(mean_sq_diff_norm(&[0, 0], &[4, 2]), 10);
    }
}
